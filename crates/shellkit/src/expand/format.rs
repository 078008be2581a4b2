//! printf-style formatting and backslash escapes
//!
//! Shared by the `printf` and `echo` builtins and by `$'...'` quoting.

use unicode_width::UnicodeWidthStr;

use crate::error::{Error, Result};

/// Expand `format` once against `args`.
///
/// Returns the output and how many arguments the directives consumed.
/// Directives past the end of `args` see an empty string (or zero).
pub fn format(format: &str, args: &[String]) -> Result<(String, usize)> {
    let mut output = String::new();
    let mut used = 0;
    let mut chars = format.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let (s, stop) = escape(&mut chars);
                output.push_str(&s);
                if stop {
                    break;
                }
            }
            '%' => {
                if chars.peek() == Some(&'%') {
                    chars.next();
                    output.push('%');
                    continue;
                }
                let mut spec = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || matches!(c, '-' | '+' | ' ' | '#' | '.') {
                        spec.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let Some(verb) = chars.next() else {
                    return Err(Error::Expansion("missing format character".into()));
                };
                let fmt_spec = FormatSpec::parse(&spec);
                let arg = args.get(used).map(String::as_str).unwrap_or("");
                used += 1;
                match verb {
                    's' => output.push_str(&fmt_spec.format_str(arg)),
                    'b' => {
                        let (s, stop) = expand_escapes(arg);
                        output.push_str(&fmt_spec.format_str(&s));
                        if stop {
                            break;
                        }
                    }
                    'q' => output.push_str(&fmt_spec.format_str(&shell_quote(arg))),
                    'c' => {
                        let c: String = arg.chars().take(1).collect();
                        output.push_str(&fmt_spec.format_str(&c));
                    }
                    'd' | 'i' => output.push_str(&fmt_spec.format_int(parse_int(arg)?)),
                    'u' | 'o' | 'x' | 'X' => {
                        // Negative values wrap like C's unsigned conversion
                        let n = parse_int(arg)? as u64;
                        let s = match verb {
                            'o' if fmt_spec.alternate && n != 0 => format!("0{n:o}"),
                            'o' => format!("{n:o}"),
                            'x' if fmt_spec.alternate && n != 0 => format!("0x{n:x}"),
                            'x' => format!("{n:x}"),
                            'X' if fmt_spec.alternate && n != 0 => format!("0X{n:X}"),
                            'X' => format!("{n:X}"),
                            _ => n.to_string(),
                        };
                        output.push_str(&fmt_spec.apply_width(&s, true));
                    }
                    'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                        let n: f64 = if arg.is_empty() {
                            0.0
                        } else {
                            arg.trim()
                                .parse()
                                .map_err(|_| Error::Expansion(format!("{arg}: invalid number")))?
                        };
                        let prec = fmt_spec.precision.unwrap_or(6);
                        let s = match verb {
                            'e' => format!("{n:.prec$e}"),
                            'E' => format!("{n:.prec$E}"),
                            'g' | 'G' => format!("{n}"),
                            _ => format!("{n:.prec$}"),
                        };
                        let s = if fmt_spec.sign_plus && n >= 0.0 {
                            format!("+{s}")
                        } else {
                            s
                        };
                        output.push_str(&fmt_spec.apply_width(&s, true));
                    }
                    other => {
                        return Err(Error::Expansion(format!(
                            "%{other}: invalid format character"
                        )));
                    }
                }
            }
            c => output.push(c),
        }
    }

    Ok((output, used.min(args.len())))
}

/// Parsed `%[flags][width][.precision]` prefix
#[derive(Debug, Default)]
struct FormatSpec {
    left_align: bool,
    zero_pad: bool,
    sign_plus: bool,
    alternate: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Self {
        let mut out = Self::default();
        let mut rest = spec;
        while let Some(c) = rest.chars().next() {
            match c {
                '-' => out.left_align = true,
                '0' => out.zero_pad = true,
                '+' => out.sign_plus = true,
                '#' => out.alternate = true,
                ' ' => {}
                _ => break,
            }
            rest = &rest[1..];
        }
        let (width, precision) = match rest.split_once('.') {
            Some((w, p)) => (w, Some(p.parse().unwrap_or(0))),
            None => (rest, None),
        };
        out.width = width.parse().ok();
        out.precision = precision;
        out
    }

    fn format_int(&self, n: i64) -> String {
        let mut s = n.unsigned_abs().to_string();
        if let Some(prec) = self.precision {
            while s.len() < prec {
                s.insert(0, '0');
            }
        }
        if n < 0 {
            s.insert(0, '-');
        } else if self.sign_plus {
            s.insert(0, '+');
        }
        self.apply_width(&s, true)
    }

    fn format_str(&self, s: &str) -> String {
        match self.precision {
            Some(prec) => {
                let cut: String = s.chars().take(prec).collect();
                self.apply_width(&cut, false)
            }
            None => self.apply_width(s, false),
        }
    }

    fn apply_width(&self, s: &str, numeric: bool) -> String {
        let Some(width) = self.width else {
            return s.to_string();
        };
        let len = s.width();
        if len >= width {
            return s.to_string();
        }
        let padding = width - len;
        if self.left_align {
            format!("{s}{}", " ".repeat(padding))
        } else if self.zero_pad && numeric && self.precision.is_none() {
            // Zeros go between the sign and the digits
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('-' | '+')) => (c.to_string(), &s[1..]),
                _ => (String::new(), s),
            };
            format!("{sign}{}{digits}", "0".repeat(padding))
        } else {
            format!("{}{s}", " ".repeat(padding))
        }
    }
}

/// Parse a printf integer argument: decimal, `0x` hex, leading-zero octal,
/// or `'c` for a character code. Empty means zero.
fn parse_int(arg: &str) -> Result<i64> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Some(c) = trimmed
        .strip_prefix('\'')
        .or_else(|| trimmed.strip_prefix('"'))
    {
        return Ok(c.chars().next().map(|c| c as i64).unwrap_or(0));
    }
    let (neg, digits) = match trimmed.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse()
    };
    parsed
        .map(|n| if neg { n.wrapping_neg() } else { n })
        .map_err(|_| Error::Expansion(format!("{arg}: invalid number")))
}

/// Expand backslash escapes as `echo -e` and `%b` do. The flag is set when
/// `\c` asked for output to stop.
pub fn expand_escapes(s: &str) -> (String, bool) {
    let mut output = String::new();
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        let (s, stop) = escape(&mut chars);
        output.push_str(&s);
        if stop {
            return (output, true);
        }
    }
    (output, false)
}

/// Expand the body of a `$'...'` string.
pub fn ansi_c(s: &str) -> String {
    expand_escapes(s).0
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// Decode one escape after a consumed backslash.
fn escape(chars: &mut Chars<'_>) -> (String, bool) {
    let Some(next) = chars.next() else {
        return ("\\".to_string(), false);
    };
    let c = match next {
        'a' => '\x07',
        'b' => '\x08',
        'e' | 'E' => '\x1b',
        'f' => '\x0c',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\x0b',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        '?' => '?',
        'c' => return (String::new(), true),
        '0'..='7' => {
            // \0NNN or \NNN
            let mut octal = String::new();
            if next != '0' {
                octal.push(next);
            }
            while octal.len() < 3 {
                match chars.peek() {
                    Some(&d @ '0'..='7') => {
                        octal.push(d);
                        chars.next();
                    }
                    _ => break,
                }
            }
            let val = u32::from_str_radix(if octal.is_empty() { "0" } else { &octal }, 8)
                .unwrap_or(0);
            char::from_u32(val & 0xff).unwrap_or('\0')
        }
        'x' => match parse_hex(chars, 2) {
            Some(c) => c,
            None => return ("\\x".to_string(), false),
        },
        'u' => match parse_hex(chars, 4) {
            Some(c) => c,
            None => return ("\\u".to_string(), false),
        },
        'U' => match parse_hex(chars, 8) {
            Some(c) => c,
            None => return ("\\U".to_string(), false),
        },
        other => return (format!("\\{other}"), false),
    };
    (c.to_string(), false)
}

/// Read up to `max_digits` hex digits as a character.
fn parse_hex(chars: &mut Chars<'_>, max_digits: usize) -> Option<char> {
    let mut hex = String::new();
    while hex.len() < max_digits {
        match chars.peek() {
            Some(&c) if c.is_ascii_hexdigit() => {
                hex.push(c);
                chars.next();
            }
            _ => break,
        }
    }
    if hex.is_empty() {
        return None;
    }
    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
}

/// Quote a string so the shell reads it back unchanged (`printf %q`).
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let safe = |c: char| c.is_ascii_alphanumeric() || "_/.:-=+@,%^".contains(c);
    if s.chars().all(safe) {
        return s.to_string();
    }
    if s.chars().any(|c| c.is_control()) {
        let mut out = String::from("$'");
        for ch in s.chars() {
            match ch {
                '\'' => out.push_str("\\'"),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
                c => out.push(c),
            }
        }
        out.push('\'');
        return out;
    }
    let mut out = String::new();
    for ch in s.chars() {
        if !safe(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(fmt: &str, args: &[&str]) -> (String, usize) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        format(fmt, &args).unwrap()
    }

    #[test]
    fn test_basic_verbs() {
        assert_eq!(f("%s-%d", &["a", "42"]), ("a-42".to_string(), 2));
        assert_eq!(f("%i %u", &["-3", "7"]).0, "-3 7");
        assert_eq!(f("%o %x %X", &["8", "255", "255"]).0, "10 ff FF");
        assert_eq!(f("%c", &["hello"]).0, "h");
        assert_eq!(f("100%%", &[]), ("100%".to_string(), 0));
    }

    #[test]
    fn test_consumed_count() {
        assert_eq!(f("%s", &["a", "b", "c"]).1, 1);
        // Missing arguments count as consumed only up to what exists
        assert_eq!(f("%s %s", &["a"]), ("a ".to_string(), 1));
        assert_eq!(f("plain", &["a"]).1, 0);
    }

    #[test]
    fn test_escapes_in_format() {
        assert_eq!(f("a\\tb\\n", &[]).0, "a\tb\n");
        assert_eq!(f("\\\\", &[]).0, "\\");
        assert_eq!(f("\\0101", &[]).0, "A");
        assert_eq!(f("\\u03bc", &[]).0, "\u{03bc}");
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(f("%05d", &["42"]).0, "00042");
        assert_eq!(f("%06d", &["-42"]).0, "-00042");
        assert_eq!(f("%04x", &["255"]).0, "00ff");
    }

    #[test]
    fn test_width_and_alignment() {
        assert_eq!(f("%5d", &["42"]).0, "   42");
        assert_eq!(f("%-5d|", &["42"]).0, "42   |");
        assert_eq!(f("%5s", &["hi"]).0, "   hi");
        assert_eq!(f("%-5s|", &["hi"]).0, "hi   |");
        assert_eq!(f("%.2s", &["hello"]).0, "he");
    }

    #[test]
    fn test_float_precision() {
        assert_eq!(f("%.2f", &["3.14159"]).0, "3.14");
        assert_eq!(f("%8.2f", &["3.14"]).0, "    3.14");
    }

    #[test]
    fn test_numeric_forms() {
        assert_eq!(f("%d", &["0x10"]).0, "16");
        assert_eq!(f("%d", &["010"]).0, "8");
        assert_eq!(f("%d", &["'A"]).0, "65");
        assert_eq!(f("%d", &[""]).0, "0");
    }

    #[test]
    fn test_invalid_number_is_error() {
        let args = vec!["abc".to_string()];
        assert!(format("%d", &args).is_err());
    }

    #[test]
    fn test_b_and_q() {
        assert_eq!(f("%b", &["a\\nb"]).0, "a\nb");
        assert_eq!(f("%q", &["a b"]).0, "a\\ b");
        assert_eq!(f("%q", &[""]).0, "''");
        assert_eq!(f("%q", &["a\tb"]).0, "$'a\\tb'");
    }

    #[test]
    fn test_expand_escapes_stop() {
        assert_eq!(expand_escapes("a\\cb"), ("a".to_string(), true));
        assert_eq!(expand_escapes("\\x41\\e"), ("A\x1b".to_string(), false));
        assert_eq!(expand_escapes("\\q"), ("\\q".to_string(), false));
    }

    #[test]
    fn test_ansi_c() {
        assert_eq!(ansi_c("it\\'s\\n"), "it's\n");
        assert_eq!(ansi_c("\\101"), "A");
    }
}
