//! alias and unalias builtins
//!
//! Aliases are only substituted while `expand_aliases` is on; defining
//! them works either way.

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interp::ExecResult;

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn describe(name: &str, value: &str) -> String {
    format!("alias {name}={}\n", single_quote(value))
}

/// The alias builtin - define or show aliases.
///
/// Usage: alias [-p] [NAME[=VALUE]...]
pub struct Alias;

#[async_trait]
impl Builtin for Alias {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut operands = ctx.args;
        let mut list = operands.is_empty();
        while let Some(first) = operands.first() {
            match first.as_str() {
                "-p" => list = true,
                "--" => {
                    operands = &operands[1..];
                    break;
                }
                _ => break,
            }
            operands = &operands[1..];
        }

        let mut stdout = String::new();
        if list {
            for (name, value) in &ctx.runner.aliases {
                stdout.push_str(&describe(name, value));
            }
        }

        let mut stderr = String::new();
        let mut status = 0;
        for arg in operands {
            match arg.split_once('=') {
                Some((name, _)) if name.is_empty() || name.contains(['/', '$', '`', '\'', '"']) => {
                    stderr.push_str(&format!(
                        "{}: alias: `{name}': invalid alias name\n",
                        ctx.runner.shell_name()
                    ));
                    status = 1;
                }
                Some((name, value)) => {
                    ctx.runner.aliases.insert(name.to_string(), value.to_string());
                }
                None => match ctx.runner.aliases.get(arg) {
                    Some(value) => stdout.push_str(&describe(arg, value)),
                    None => {
                        stderr.push_str(&format!(
                            "{}: alias: {arg}: not found\n",
                            ctx.runner.shell_name()
                        ));
                        status = 1;
                    }
                },
            }
        }
        Ok(ExecResult {
            stdout,
            stderr,
            ..ExecResult::status(status)
        })
    }
}

/// The unalias builtin - remove aliases.
///
/// Usage: unalias [-a] NAME...
pub struct Unalias;

#[async_trait]
impl Builtin for Unalias {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.first().is_some_and(|a| a == "-a") {
            ctx.runner.aliases.clear();
            return Ok(ExecResult::status(0));
        }
        if ctx.args.is_empty() {
            return Ok(ctx.failure("usage: unalias [-a] name [name ...]", 2));
        }
        let mut missing = Vec::new();
        for name in ctx.args {
            if ctx.runner.aliases.remove(name).is_none() {
                missing.push(name.as_str());
            }
        }
        if missing.is_empty() {
            return Ok(ExecResult::status(0));
        }
        let prefix = ctx.runner.shell_name();
        let stderr = missing
            .iter()
            .map(|name| format!("{prefix}: unalias: {name}: not found\n"))
            .collect::<String>();
        Ok(ExecResult::err(stderr, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::testing::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_quote_escapes_quotes() {
        assert_eq!(single_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_define_and_list() {
        let mut r = runner();
        builtin(&mut r, &["alias", "ll=ls -l", "g=grep"]).await;
        let res = builtin(&mut r, &["alias"]).await;
        assert_eq!(res.stdout, "alias g='grep'\nalias ll='ls -l'\n");
        let res = builtin(&mut r, &["alias", "ll"]).await;
        assert_eq!(res.stdout, "alias ll='ls -l'\n");
    }

    #[tokio::test]
    async fn test_alias_not_found() {
        let mut r = runner();
        let res = builtin(&mut r, &["alias", "nope"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("alias: nope: not found"));
    }

    #[tokio::test]
    async fn test_unalias() {
        let mut r = runner();
        builtin(&mut r, &["alias", "a=x", "b=y", "c=z"]).await;
        assert_eq!(builtin(&mut r, &["unalias", "a"]).await.exit_code, 0);
        let res = builtin(&mut r, &["unalias", "a"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("unalias: a: not found"));
        builtin(&mut r, &["unalias", "-a"]).await;
        assert!(r.aliases.is_empty());
        assert_eq!(builtin(&mut r, &["unalias"]).await.exit_code, 2);
    }
}
