//! Glob pattern to regular expression translation
//!
//! Shell patterns:
//! - `*` matches zero or more characters, `?` exactly one
//! - `[abc]`, `[a-z]`, `[!abc]`/`[^abc]` and POSIX classes like `[[:digit:]]`
//! - `\c` matches `c` literally
//! - with globstar, a `**` path component crosses directory levels
//!
//! An unterminated `[` is an ordinary character.

use regex::Regex;

use crate::error::{Error, Result};

/// How a pattern is translated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    /// Wildcards match as few characters as possible
    pub shortest: bool,
    /// Wildcards never match `/`
    pub filenames: bool,
    /// Anchor the pattern to the whole input
    pub entire_string: bool,
    /// Case-insensitive matching
    pub no_case: bool,
    /// `**` as a whole path component matches across directories
    pub globstar: bool,
}

impl Mode {
    /// Anchored, as used by `case`, `[[ == ]]` and file matching.
    pub fn entire() -> Self {
        Self {
            entire_string: true,
            ..Default::default()
        }
    }
}

/// Whether `pat` contains an unescaped wildcard or a complete bracket
/// expression.
pub fn has_meta(pat: &str) -> bool {
    let chars: Vec<char> = pat.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '*' | '?' => return true,
            '[' if bracket_end(&chars, i).is_some() => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Escape `s` so that it matches itself when used as a pattern.
pub fn quote_meta(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Remove pattern escapes, giving the literal text a pattern without
/// wildcards matches.
pub fn unescape(pat: &str) -> String {
    let mut out = String::with_capacity(pat.len());
    let mut chars = pat.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Translate a shell pattern into regex source.
pub fn regex(pat: &str, mode: Mode) -> String {
    let chars: Vec<char> = pat.chars().collect();
    let mut out = String::from("(?s)");
    if mode.no_case {
        out.push_str("(?i)");
    }
    if mode.entire_string {
        out.push('^');
    }
    let any = if mode.filenames { "[^/]" } else { "." };
    let lazy = if mode.shortest { "?" } else { "" };

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                let start = i;
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                let whole_component = i > start
                    && (start == 0 || chars[start - 1] == '/')
                    && (i + 1 == chars.len() || chars[i + 1] == '/');
                if mode.globstar && mode.filenames && whole_component {
                    if i + 1 < chars.len() {
                        // `**/` matches zero or more directories
                        out.push_str("(?:[^/]*/)*");
                        i += 1;
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str(any);
                    out.push('*');
                    out.push_str(lazy);
                }
            }
            '?' => out.push_str(any),
            '\\' => match chars.get(i + 1) {
                Some(next) => {
                    push_literal(&mut out, *next);
                    i += 1;
                }
                None => push_literal(&mut out, '\\'),
            },
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    push_bracket(&mut out, &chars[i + 1..end]);
                    i = end;
                }
                None => push_literal(&mut out, '['),
            },
            c => push_literal(&mut out, c),
        }
        i += 1;
    }
    if mode.entire_string {
        out.push('$');
    }
    out
}

/// Compile a shell pattern.
pub fn compile(pat: &str, mode: Mode) -> Result<Regex> {
    Regex::new(&regex(pat, mode)).map_err(|e| Error::Expansion(format!("invalid pattern: {e}")))
}

/// Whether `s` matches the whole pattern.
pub fn matches(pat: &str, s: &str) -> Result<bool> {
    Ok(compile(pat, Mode::entire())?.is_match(s))
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Index of the `]` closing the bracket expression opened at `start`.
fn bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        i += 1;
    }
    // A leading `]` is literal
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            ']' => return Some(i),
            '\\' => i += 1,
            '[' if chars.get(i + 1) == Some(&':') => {
                // Skip over a [:class:]
                let rest = &chars[i + 2..];
                if let Some(pos) = rest.windows(2).position(|w| w == [':', ']']) {
                    i += pos + 3;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn push_bracket(out: &mut String, body: &[char]) {
    out.push('[');
    let mut i = 0;
    if matches!(body.first(), Some('!') | Some('^')) {
        out.push('^');
        i = 1;
    }
    let first = i;
    while i < body.len() {
        let c = body[i];
        if c == '[' && body.get(i + 1) == Some(&':') {
            let rest = &body[i + 2..];
            if let Some(pos) = rest.windows(2).position(|w| w == [':', ']']) {
                let class: String = rest[..pos].iter().collect();
                out.push_str(&format!("[:{class}:]"));
                i += pos + 4;
                continue;
            }
        }
        if c == '\\' && i + 1 < body.len() {
            push_class_char(out, body[i + 1]);
            i += 2;
            continue;
        }
        if c == '-' && i > first && i + 1 < body.len() {
            out.push('-');
        } else {
            push_class_char(out, c);
        }
        i += 1;
    }
    out.push(']');
}

fn push_class_char(out: &mut String, c: char) {
    if c.is_alphanumeric() || c == '_' {
        out.push(c);
    } else {
        out.push('\\');
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pat: &str, s: &str) -> bool {
        matches(pat, s).unwrap()
    }

    #[test]
    fn test_wildcards() {
        assert!(m("*.rs", "main.rs"));
        assert!(m("a?c", "abc"));
        assert!(!m("a?c", "ac"));
        assert!(m("*", ""));
        assert!(m("**", "a/b"));
    }

    #[test]
    fn test_brackets() {
        assert!(m("[abc]", "b"));
        assert!(m("[a-c]x", "bx"));
        assert!(!m("[!a-c]", "b"));
        assert!(m("[^a-c]", "z"));
        assert!(m("[[:digit:]]*", "7up"));
        assert!(m("[]]", "]"));
        assert!(m("[a-]", "-"));
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        assert!(m("[abc", "[abc"));
        assert!(!has_meta("[abc"));
    }

    #[test]
    fn test_escapes() {
        assert!(m("\\*", "*"));
        assert!(!m("\\*", "x"));
        assert!(m("a.b", "a.b"));
        assert!(!m("a.b", "axb"));
        assert!(m("(x)+", "(x)+"));
    }

    #[test]
    fn test_quote_meta_round_trip() {
        let s = "a*b?[c]\\";
        assert!(m(&quote_meta(s), s));
        assert!(!has_meta(&quote_meta(s)));
        assert_eq!(unescape(&quote_meta(s)), s);
    }

    #[test]
    fn test_filenames_mode() {
        let mode = Mode {
            filenames: true,
            entire_string: true,
            ..Default::default()
        };
        let re = compile("*", mode).unwrap();
        assert!(re.is_match("file"));
        assert!(!re.is_match("dir/file"));
    }

    #[test]
    fn test_globstar() {
        let mode = Mode {
            filenames: true,
            entire_string: true,
            globstar: true,
            ..Default::default()
        };
        let re = compile("**/*.rs", mode).unwrap();
        assert!(re.is_match("main.rs"));
        assert!(re.is_match("src/a/main.rs"));
        assert!(!re.is_match("src/main.go"));
    }

    #[test]
    fn test_shortest() {
        let mode = Mode {
            shortest: true,
            ..Default::default()
        };
        let re = compile("a*b", mode).unwrap();
        assert_eq!(re.find("aXbYb").unwrap().as_str(), "aXb");
    }

    #[test]
    fn test_no_case() {
        let mode = Mode {
            no_case: true,
            entire_string: true,
            ..Default::default()
        };
        assert!(compile("*.TXT", mode).unwrap().is_match("a.txt"));
    }
}
