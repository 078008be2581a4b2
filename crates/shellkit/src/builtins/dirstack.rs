//! Directory stack builtins - pushd, popd, dirs
//!
//! The runner keeps the stack, most recent entry last. The current directory
//! is always the implicit entry 0 and is not stored.

use async_trait::async_trait;
use std::path::PathBuf;

use super::navigation::change_dir;
use super::{Builtin, Context};
use crate::env::Environ;
use crate::error::Result;
use crate::interp::{ExecResult, Runner};

/// Entries from the top: the current directory first.
fn entries(runner: &Runner) -> Vec<PathBuf> {
    let mut all = vec![runner.dir().to_path_buf()];
    all.extend(runner.dir_stack.iter().rev().cloned());
    all
}

/// Show a directory with `$HOME` abbreviated to `~` unless `long`.
fn show(runner: &Runner, dir: &std::path::Path, long: bool) -> String {
    let text = dir.to_string_lossy().into_owned();
    let home = runner.get("HOME").str_value().to_string();
    if long || home.is_empty() || home == "/" {
        return text;
    }
    match text.strip_prefix(&home) {
        Some("") => "~".to_string(),
        Some(rest) if rest.starts_with('/') => format!("~{rest}"),
        _ => text,
    }
}

fn format_stack(runner: &Runner) -> String {
    let shown: Vec<String> = entries(runner).iter().map(|d| show(runner, d, false)).collect();
    format!("{}\n", shown.join(" "))
}

/// The pushd builtin - push directory onto stack and cd.
///
/// Usage: pushd [dir]
///
/// Without args, swaps the current directory with the top of the stack.
/// With dir, pushes the current dir onto the stack and changes to dir.
pub struct Pushd;

#[async_trait]
impl Builtin for Pushd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (target, shown) = match ctx.args.first() {
            None => match ctx.runner.dir_stack.last() {
                Some(top) => (top.clone(), top.to_string_lossy().into_owned()),
                None => return Ok(ctx.error("no other directory")),
            },
            Some(dir) => (ctx.resolve(dir), dir.clone()),
        };
        let old = ctx.runner.dir().to_path_buf();
        if let Err(msg) = change_dir(ctx.runner, target, &shown) {
            return Ok(ctx.error(msg));
        }
        if ctx.args.is_empty() {
            ctx.runner.dir_stack.pop();
        }
        ctx.runner.dir_stack.push(old);
        Ok(ExecResult::ok(format_stack(ctx.runner)))
    }
}

/// The popd builtin - pop directory from stack and cd.
///
/// Usage: popd
///
/// Removes the top entry from the stack and changes to it.
pub struct Popd;

#[async_trait]
impl Builtin for Popd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let Some(top) = ctx.runner.dir_stack.last().cloned() else {
            return Ok(ctx.error("directory stack empty"));
        };
        let shown = top.to_string_lossy().into_owned();
        if let Err(msg) = change_dir(ctx.runner, top, &shown) {
            return Ok(ctx.error(msg));
        }
        ctx.runner.dir_stack.pop();
        Ok(ExecResult::ok(format_stack(ctx.runner)))
    }
}

/// The dirs builtin - display directory stack.
///
/// Usage: dirs [-c] [-l] [-p] [-v]
///
/// -c: clear the stack
/// -l: long listing (no ~ substitution)
/// -p: one entry per line
/// -v: numbered one entry per line
pub struct Dirs;

#[async_trait]
impl Builtin for Dirs {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut clear = false;
        let mut per_line = false;
        let mut verbose = false;
        let mut long = false;

        for arg in ctx.args.iter() {
            match arg.as_str() {
                "-c" => clear = true,
                "-p" => per_line = true,
                "-v" => {
                    verbose = true;
                    per_line = true;
                }
                "-l" => long = true,
                other => return Ok(ctx.failure(format!("{other}: invalid option"), 2)),
            }
        }

        if clear {
            ctx.runner.dir_stack.clear();
            return Ok(ExecResult::status(0));
        }

        let runner = &*ctx.runner;
        let shown: Vec<String> = entries(runner).iter().map(|d| show(runner, d, long)).collect();
        let output = if verbose {
            shown
                .iter()
                .enumerate()
                .map(|(i, d)| format!("{i:2}  {d}\n"))
                .collect()
        } else if per_line {
            shown.iter().map(|d| format!("{d}\n")).collect()
        } else {
            format!("{}\n", shown.join(" "))
        };
        Ok(ExecResult::ok(output))
    }
}

#[cfg(test)]
mod tests {
    use crate::interp::testing::*;
    use crate::Runner;
    use pretty_assertions::assert_eq;

    fn tree() -> (tempfile::TempDir, Runner) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        let mut r = Runner::builder().dir(tmp.path()).capture().build();
        r.set_var("HOME", tmp.path().to_string_lossy()).unwrap();
        (tmp, r)
    }

    #[tokio::test]
    async fn test_pushd_popd_round_trip() {
        let (tmp, mut r) = tree();
        let res = builtin(&mut r, &["pushd", "a"]).await;
        assert_eq!(res.stdout, "~/a ~\n");
        let res = builtin(&mut r, &["pushd", "../b"]).await;
        assert_eq!(res.stdout, "~/b ~/a ~\n");
        assert_eq!(r.dir(), tmp.path().join("b"));

        let res = builtin(&mut r, &["popd"]).await;
        assert_eq!(res.stdout, "~/a ~\n");
        assert_eq!(r.dir(), tmp.path().join("a"));
        builtin(&mut r, &["popd"]).await;
        assert_eq!(r.dir(), tmp.path());

        let res = builtin(&mut r, &["popd"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("popd: directory stack empty"));
    }

    #[tokio::test]
    async fn test_pushd_without_args_swaps() {
        let (tmp, mut r) = tree();
        builtin(&mut r, &["pushd", "a"]).await;
        let res = builtin(&mut r, &["pushd"]).await;
        assert_eq!(res.stdout, "~ ~/a\n");
        assert_eq!(r.dir(), tmp.path());
    }

    #[tokio::test]
    async fn test_pushd_missing_dir_leaves_stack() {
        let (_tmp, mut r) = tree();
        let res = builtin(&mut r, &["pushd", "nope"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(r.dir_stack.is_empty());
        let res = builtin(&mut r, &["pushd"]).await;
        assert!(res.stderr.contains("no other directory"));
    }

    #[tokio::test]
    async fn test_dirs_formats() {
        let (tmp, mut r) = tree();
        builtin(&mut r, &["pushd", "a"]).await;
        let res = builtin(&mut r, &["dirs", "-v"]).await;
        assert_eq!(res.stdout, " 0  ~/a\n 1  ~\n");
        let res = builtin(&mut r, &["dirs", "-l", "-p"]).await;
        assert_eq!(
            res.stdout,
            format!("{}\n{}\n", tmp.path().join("a").display(), tmp.path().display())
        );
        builtin(&mut r, &["dirs", "-c"]).await;
        assert!(r.dir_stack.is_empty());
    }
}
