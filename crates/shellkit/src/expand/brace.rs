//! Brace expansion
//!
//! `{a,b}` alternatives and `{x..y[..incr]}` sequences are recognized in
//! the unquoted literal text of a word. Quoted parts and expansions are
//! opaque, so `"{a,b}"` and `${x}` never expand. Anything that does not
//! form a complete brace expression stays as written.

use crate::ast::{Word, WordPart};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Char(char),
    /// A backslash escape, kept so later stages still see it as quoted
    Escaped(char),
    Part(WordPart),
}

/// Expand braces in `word`, giving one or more words.
pub fn expand(word: &Word) -> Vec<Word> {
    let tokens = tokenize(word);
    if !tokens.contains(&Token::Char('{')) {
        return vec![word.clone()];
    }
    expand_tokens(&tokens).into_iter().map(rebuild).collect()
}

fn tokenize(word: &Word) -> Vec<Token> {
    let mut tokens = Vec::new();
    for part in &word.parts {
        match part {
            WordPart::Lit(s) => {
                let mut chars = s.chars();
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        match chars.next() {
                            Some(next) => tokens.push(Token::Escaped(next)),
                            None => tokens.push(Token::Char('\\')),
                        }
                    } else {
                        tokens.push(Token::Char(c));
                    }
                }
            }
            other => tokens.push(Token::Part(other.clone())),
        }
    }
    tokens
}

fn rebuild(tokens: Vec<Token>) -> Word {
    let mut parts = Vec::new();
    let mut lit = String::new();
    for token in tokens {
        match token {
            Token::Char(c) => lit.push(c),
            Token::Escaped(c) => {
                lit.push('\\');
                lit.push(c);
            }
            Token::Part(part) => {
                if !lit.is_empty() {
                    parts.push(WordPart::Lit(std::mem::take(&mut lit)));
                }
                parts.push(part);
            }
        }
    }
    if !lit.is_empty() {
        parts.push(WordPart::Lit(lit));
    }
    Word { parts }
}

fn expand_tokens(tokens: &[Token]) -> Vec<Vec<Token>> {
    for start in 0..tokens.len() {
        if tokens[start] != Token::Char('{') {
            continue;
        }
        let Some((end, commas)) = find_close(tokens, start) else {
            continue;
        };
        let alternatives: Vec<Vec<Token>> = if !commas.is_empty() {
            let mut alts = Vec::new();
            let mut from = start + 1;
            for &comma in commas.iter().chain(std::iter::once(&end)) {
                alts.extend(expand_tokens(&tokens[from..comma]));
                from = comma + 1;
            }
            alts
        } else {
            match sequence(&tokens[start + 1..end]) {
                Some(items) => items
                    .into_iter()
                    .map(|s| s.chars().map(Token::Char).collect())
                    .collect(),
                None => continue,
            }
        };

        let prefix = &tokens[..start];
        let suffixes = expand_tokens(&tokens[end + 1..]);
        let mut results = Vec::with_capacity(alternatives.len() * suffixes.len());
        for alt in &alternatives {
            for suffix in &suffixes {
                let mut out = prefix.to_vec();
                out.extend(alt.iter().cloned());
                out.extend(suffix.iter().cloned());
                results.push(out);
            }
        }
        return results;
    }
    vec![tokens.to_vec()]
}

/// Find the `}` matching the `{` at `start`, with the positions of the
/// top-level commas in between.
fn find_close(tokens: &[Token], start: usize) -> Option<(usize, Vec<usize>)> {
    let mut depth = 0;
    let mut commas = Vec::new();
    for (i, token) in tokens.iter().enumerate().skip(start) {
        match token {
            Token::Char('{') => depth += 1,
            Token::Char('}') => {
                depth -= 1;
                if depth == 0 {
                    return Some((i, commas));
                }
            }
            Token::Char(',') if depth == 1 => commas.push(i),
            _ => {}
        }
    }
    None
}

/// `x..y[..incr]` over integers or single letters.
fn sequence(tokens: &[Token]) -> Option<Vec<String>> {
    let mut text = String::new();
    for token in tokens {
        match token {
            Token::Char(c) => text.push(*c),
            _ => return None,
        }
    }
    let pieces: Vec<&str> = text.split("..").collect();
    let (from, to, incr) = match pieces.as_slice() {
        [from, to] => (*from, *to, None),
        [from, to, incr] => (*from, *to, Some(incr.parse::<i64>().ok()?)),
        _ => return None,
    };
    let step = incr.map(i64::unsigned_abs).filter(|&s| s != 0).unwrap_or(1);

    if let (Ok(x), Ok(y)) = (from.parse::<i64>(), to.parse::<i64>()) {
        let width = if has_leading_zero(from) || has_leading_zero(to) {
            from.len().max(to.len())
        } else {
            0
        };
        return Some(
            walk(x, y, step)
                .map(|n| {
                    if n < 0 {
                        format!("-{:0>w$}", n.unsigned_abs(), w = width.saturating_sub(1))
                    } else {
                        format!("{n:0>width$}")
                    }
                })
                .collect(),
        );
    }

    let single = |s: &str| {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Some(c),
            _ => None,
        }
    };
    let (x, y) = (single(from)?, single(to)?);
    Some(
        walk(x as i64, y as i64, step)
            .filter_map(|n| u8::try_from(n).ok())
            .map(|b| (b as char).to_string())
            .collect(),
    )
}

fn walk(x: i64, y: i64, step: u64) -> impl Iterator<Item = i64> {
    let step = i64::try_from(step).unwrap_or(i64::MAX);
    let mut next = Some(x);
    std::iter::from_fn(move || {
        let cur = next?;
        next = if x <= y {
            cur.checked_add(step).filter(|n| *n <= y)
        } else {
            cur.checked_sub(step).filter(|n| *n >= y)
        };
        Some(cur)
    })
}

fn has_leading_zero(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    digits.len() > 1 && digits.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use pretty_assertions::assert_eq;

    fn exp(s: &str) -> Vec<String> {
        expand(&lit(s))
            .into_iter()
            .map(|w| w.lit().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_alternatives() {
        assert_eq!(exp("{a,b}"), vec!["a", "b"]);
        assert_eq!(exp("x{a,b}y"), vec!["xay", "xby"]);
        assert_eq!(exp("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
        assert_eq!(exp("{a,{b,c}}"), vec!["a", "b", "c"]);
        assert_eq!(exp("{,x}"), vec!["", "x"]);
    }

    #[test]
    fn test_numeric_sequences() {
        assert_eq!(exp("a{1..3}"), vec!["a1", "a2", "a3"]);
        assert_eq!(exp("{3..1}"), vec!["3", "2", "1"]);
        assert_eq!(exp("{1..10..4}"), vec!["1", "5", "9"]);
        assert_eq!(exp("{-1..1}"), vec!["-1", "0", "1"]);
        assert_eq!(exp("{08..10}"), vec!["08", "09", "10"]);
    }

    #[test]
    fn test_char_sequences() {
        assert_eq!(exp("{a..c}"), vec!["a", "b", "c"]);
        assert_eq!(exp("{e..a..2}"), vec!["e", "c", "a"]);
    }

    #[test]
    fn test_malformed_stays_literal() {
        assert_eq!(exp("a{1,2"), vec!["a{1,2"]);
        assert_eq!(exp("{a}"), vec!["{a}"]);
        assert_eq!(exp("{}"), vec!["{}"]);
        assert_eq!(exp("{1..b}"), vec!["{1..b}"]);
        assert_eq!(exp("{a..b..c}"), vec!["{a..b..c}"]);
    }

    #[test]
    fn test_later_group_after_literal_one() {
        assert_eq!(exp("{x}{1,2}"), vec!["{x}1", "{x}2"]);
    }

    #[test]
    fn test_escaped_and_quoted_braces_do_not_expand() {
        assert_eq!(exp("\\{a,b}"), vec!["\\{a,b}"]);
        let w = word(vec![dbl(vec![part_lit("{a,b}")])]);
        assert_eq!(expand(&w), vec![w]);
    }

    #[test]
    fn test_expansions_inside_alternatives_are_kept() {
        let w = word(vec![part_lit("{a,"), param("x"), part_lit("}")]);
        let out = expand(&w);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], lit("a"));
        assert_eq!(out[1], word(vec![param("x")]));
    }
}
