//! Navigation builtins (cd, pwd)

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{Builtin, Context};
use crate::env::{Environ, Variable, WriteEnviron};
use crate::error::Result;
use crate::interp::{ExecResult, Runner, test::can_enter};

/// Why a directory change failed, as `cd` words it.
fn check_dir(path: &Path) -> std::result::Result<(), &'static str> {
    match std::fs::metadata(path) {
        Err(_) => Err("No such file or directory"),
        Ok(meta) if !meta.is_dir() => Err("Not a directory"),
        Ok(_) if !can_enter(path) => Err("Permission denied"),
        Ok(_) => Ok(()),
    }
}

/// Make `path` the runner's working directory, updating `PWD` and
/// `OLDPWD`. `shown` is the operand as typed, for error messages.
pub(super) fn change_dir(runner: &mut Runner, path: PathBuf, shown: &str) -> std::result::Result<(), String> {
    check_dir(&path).map_err(|reason| format!("{shown}: {reason}"))?;
    let old = std::mem::replace(&mut runner.dir, path);
    let old = old.to_string_lossy().into_owned();
    let new = runner.dir.to_string_lossy().into_owned();
    runner.set("OLDPWD", Variable::exported(old)).map_err(|e| e.to_string())?;
    runner.set("PWD", Variable::exported(new)).map_err(|e| e.to_string())?;
    Ok(())
}

/// The cd builtin - change directory.
///
/// Fails with status 1 when the target is missing, is not a directory or
/// cannot be entered. `cd -` goes to `$OLDPWD` and prints it; `-P` resolves
/// symlinks.
pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut physical = false;
        let mut rest = ctx.args;
        while let Some(arg) = rest.first() {
            match arg.as_str() {
                "-P" => physical = true,
                "-L" => physical = false,
                "--" => {
                    rest = &rest[1..];
                    break;
                }
                _ => break,
            }
            rest = &rest[1..];
        }
        if rest.len() > 1 {
            return Ok(ctx.error("too many arguments"));
        }

        let mut print = false;
        let target = match rest.first().map(String::as_str) {
            None => match ctx.runner.get("HOME").str_value() {
                "" => return Ok(ctx.error("HOME not set")),
                home => home.to_string(),
            },
            Some("-") => match ctx.runner.get("OLDPWD").str_value() {
                "" => return Ok(ctx.error("OLDPWD not set")),
                old => {
                    print = true;
                    old.to_string()
                }
            },
            Some(dir) => dir.to_string(),
        };

        let mut path = ctx.resolve(&target);
        if physical {
            if let Ok(real) = std::fs::canonicalize(&path) {
                path = real;
            }
        }
        if let Err(msg) = change_dir(ctx.runner, path, &target) {
            return Ok(ctx.error(msg));
        }
        if print {
            return Ok(ExecResult::ok(format!("{}\n", ctx.runner.dir().display())));
        }
        Ok(ExecResult::status(0))
    }
}

/// The pwd builtin - print working directory.
pub struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let dir = ctx.runner.dir();
        let shown = if ctx.args.iter().any(|a| a == "-P") {
            std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
        } else {
            dir.to_path_buf()
        };
        Ok(ExecResult::ok(format!("{}\n", shown.display())))
    }
}
