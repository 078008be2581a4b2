//! read builtin - read a line of input

use async_trait::async_trait;
use std::io::IsTerminal;

use super::{Builtin, Context};
use crate::env::{Environ, Variable, WriteEnviron, valid_name};
use crate::error::Result;
use crate::interp::ExecResult;

const DEFAULT_IFS: &str = " \t\n";

/// A character of input and whether a backslash protected it.
type Ch = (char, bool);

fn is_ifs_space(ifs: &str, c: Ch) -> bool {
    !c.1 && ifs.contains(c.0) && matches!(c.0, ' ' | '\t' | '\n')
}

fn is_ifs_hard(ifs: &str, c: Ch) -> bool {
    !c.1 && ifs.contains(c.0) && !matches!(c.0, ' ' | '\t' | '\n')
}

/// Split `line` into at most `max` fields. The last field keeps the rest
/// of the line, separators included, minus trailing IFS whitespace.
fn split_fields(line: &[Ch], ifs: &str, max: usize) -> Vec<String> {
    let text = |s: &[Ch]| s.iter().map(|c| c.0).collect::<String>();
    if ifs.is_empty() {
        return vec![text(line)];
    }
    let mut i = 0;
    while i < line.len() && is_ifs_space(ifs, line[i]) {
        i += 1;
    }
    let mut end = line.len();
    while end > i && is_ifs_space(ifs, line[end - 1]) {
        end -= 1;
    }
    let line = &line[..end];

    let mut fields = Vec::new();
    while i < line.len() {
        if fields.len() + 1 == max {
            fields.push(text(&line[i..]));
            return fields;
        }
        let start = i;
        while i < line.len() && !is_ifs_space(ifs, line[i]) && !is_ifs_hard(ifs, line[i]) {
            i += 1;
        }
        fields.push(text(&line[start..i]));
        while i < line.len() && is_ifs_space(ifs, line[i]) {
            i += 1;
        }
        if i < line.len() && is_ifs_hard(ifs, line[i]) {
            i += 1;
            while i < line.len() && is_ifs_space(ifs, line[i]) {
                i += 1;
            }
        }
    }
    fields
}

/// Undo backslash escapes. A backslash before the delimiter asks for
/// another chunk of input; the returned flag says so.
fn unescape(raw: &str, out: &mut Vec<Ch>) -> bool {
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push((c, false));
            continue;
        }
        match chars.next() {
            Some(next) => out.push((next, true)),
            None => return true,
        }
    }
    false
}

/// read builtin - read a line of input into variables
///
/// Usage: read [-rs] [-a ARRAY] [-d DELIM] [-n COUNT] [-p PROMPT] [NAME...]
///
/// Words go to the NAMEs in order, the last one taking the rest of the
/// line. Without NAMEs the line lands in `REPLY`. Exits 1 at end of input.
pub struct Read;

#[async_trait]
impl Builtin for Read {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut raw = false;
        let mut array: Option<String> = None;
        let mut delim = b'\n';
        let mut count: Option<usize> = None;
        let mut prompt: Option<String> = None;

        let mut args = ctx.args.iter();
        let mut names: Vec<&str> = Vec::new();
        while let Some(arg) = args.next() {
            let Some(flags) = arg.strip_prefix('-').filter(|f| !f.is_empty() && names.is_empty()) else {
                names.push(arg);
                continue;
            };
            if flags == "-" {
                names.extend(args.by_ref().map(String::as_str));
                break;
            }
            for (i, flag) in flags.char_indices() {
                match flag {
                    'r' => raw = true,
                    's' => {}
                    'a' | 'd' | 'n' | 'p' => {
                        let rest = &flags[i + 1..];
                        let value = if rest.is_empty() {
                            match args.next() {
                                Some(v) => v.clone(),
                                None => {
                                    return Ok(ctx.failure(format!("-{flag}: option requires an argument"), 2));
                                }
                            }
                        } else {
                            rest.to_string()
                        };
                        match flag {
                            'a' => array = Some(value),
                            'd' => delim = value.bytes().next().unwrap_or(0),
                            'n' => match value.parse::<usize>() {
                                Ok(n) => count = Some(n),
                                Err(_) => {
                                    return Ok(ctx.error(format!("{value}: invalid number")));
                                }
                            },
                            _ => prompt = Some(value),
                        }
                        break;
                    }
                    other => return Ok(ctx.failure(format!("-{other}: invalid option"), 2)),
                }
            }
        }
        for name in names.iter().copied().chain(array.as_deref()) {
            if !valid_name(name) {
                return Ok(ctx.error(format!("`{name}': not a valid identifier")));
            }
        }

        let stdin = ctx.runner.stdin();
        let mut stderr = String::new();
        if let Some(prompt) = prompt {
            if stdin.is_process() && std::io::stdin().is_terminal() {
                stderr = prompt;
            }
        }

        let mut line: Vec<Ch> = Vec::new();
        let mut eof;
        loop {
            let mut buf = Vec::new();
            let found = match count {
                Some(n) => {
                    let want = n.saturating_sub(line.len());
                    let read = stdin.read_bounded(delim, want, &mut buf).await?;
                    eof = read == 0 && want > 0;
                    true
                }
                None => {
                    let read = stdin.read_until(delim, &mut buf).await?;
                    let found = buf.last() == Some(&delim);
                    if found {
                        buf.pop();
                    }
                    eof = read == 0 || !found;
                    found
                }
            };
            let chunk = String::from_utf8_lossy(&buf);
            if raw {
                line.extend(chunk.chars().map(|c| (c, false)));
                break;
            }
            let continued = unescape(&chunk, &mut line);
            if !continued || !found || eof {
                break;
            }
        }

        let ifs_var = ctx.runner.get("IFS");
        let ifs = if ifs_var.is_set() {
            ifs_var.str_value().to_string()
        } else {
            DEFAULT_IFS.to_string()
        };

        let res = if let Some(array) = &array {
            let fields = split_fields(&line, &ifs, usize::MAX);
            ctx.runner.set(array, Variable::indexed(fields))
        } else if names.is_empty() {
            let text = line.iter().map(|c| c.0).collect();
            ctx.runner.assign_scalar("REPLY", text, false)
        } else {
            let mut fields = split_fields(&line, &ifs, names.len()).into_iter();
            names.iter().try_for_each(|name| {
                let value = fields.next().unwrap_or_default();
                ctx.runner.assign_scalar(name, value, false)
            })
        };
        if let Err(e) = res {
            return Ok(ctx.error(e));
        }

        Ok(ExecResult {
            stderr,
            ..ExecResult::status(if eof { 1 } else { 0 })
        })
    }
}
