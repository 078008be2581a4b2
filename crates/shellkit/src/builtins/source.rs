//! source, . and eval builtins
//!
//! Both hand text to the runner's parse hook and run the resulting tree in
//! the current shell.

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::{Error, Result};
use crate::interp::{ExecResult, Flow, Runner};
use crate::logging::log_debug;

/// Run parsed statements one source level deeper. `return` ends the level.
async fn run_nested(runner: &mut Runner, name: &str, src: &str) -> Result<ExecResult> {
    let file = match runner.parse.parse(name, src) {
        Ok(file) => file,
        Err(Error::Parse(msg)) => {
            return Ok(ExecResult::err(
                format!("{}: {name}: {msg}\n", runner.shell_name()),
                1,
            ));
        }
        Err(e) => return Err(e),
    };
    runner.counters.push_source(&runner.limits)?;
    let res = runner.stmts(&file.stmts).await;
    runner.counters.pop_source();
    match res? {
        Flow::Return(code) => Ok(ExecResult::status(code)),
        flow => Ok(ExecResult::flow(runner.status(), flow)),
    }
}

/// The source builtin, also called as `.`.
///
/// Usage: source FILE [ARGS...]
///
/// Reads FILE relative to the working directory. With ARGS the positional
/// parameters are replaced while the file runs.
pub struct Source;

#[async_trait]
impl Builtin for Source {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let Some(file) = ctx.args.first() else {
            return Ok(ctx.failure("filename argument required", 2));
        };
        let path = ctx.resolve(file);
        let src = match tokio::fs::read_to_string(&path).await {
            Ok(src) => src,
            Err(e) => {
                let reason = Error::from_open(file, e).to_string();
                return Ok(ExecResult::err(
                    format!("{}: {reason}\n", ctx.runner.shell_name()),
                    1,
                ));
            }
        };
        log_debug!(path = %path.display(), "source");

        let params = (ctx.args.len() > 1)
            .then(|| std::mem::replace(&mut ctx.runner.params, ctx.args[1..].to_vec()));
        let res = run_nested(ctx.runner, file, &src).await;
        if let Some(params) = params {
            ctx.runner.params = params;
        }
        res
    }
}

/// The eval builtin - run its joined arguments as shell input.
pub struct Eval;

#[async_trait]
impl Builtin for Eval {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let src = ctx.args.join(" ");
        if src.trim().is_empty() {
            return Ok(ExecResult::status(0));
        }
        run_nested(ctx.runner, ctx.name, &src).await
    }
}
