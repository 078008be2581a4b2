//! Flow control builtins (true, false, :, exit, return, break, continue)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interp::{ExecResult, Flow};

/// The true builtin - always returns 0.
pub struct True;

#[async_trait]
impl Builtin for True {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::status(0))
    }
}

/// The false builtin - always returns 1.
pub struct False;

#[async_trait]
impl Builtin for False {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::status(1))
    }
}

/// The colon builtin (`:`) - does nothing, returns 0.
pub struct Colon;

#[async_trait]
impl Builtin for Colon {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::status(0))
    }
}

/// Parse the status operand of `exit` and `return`. Statuses wrap at 256.
fn status_arg(ctx: &Context<'_>) -> std::result::Result<i32, ExecResult> {
    match ctx.args.first() {
        None => Ok(ctx.runner.status()),
        Some(arg) => match arg.trim().parse::<i64>() {
            Ok(n) => Ok((n & 0xff) as i32),
            Err(_) => Err(ctx.failure(format!("{arg}: numeric argument required"), 2)),
        },
    }
}

/// The exit builtin - leave the shell with a status code.
///
/// Without an operand the status of the last command is used.
pub struct Exit;

#[async_trait]
impl Builtin for Exit {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.len() > 1 {
            return Ok(ctx.error("too many arguments"));
        }
        let code = match status_arg(&ctx) {
            Ok(code) => code,
            Err(mut res) => {
                res.flow = Flow::Exit(2);
                return Ok(res);
            }
        };
        Ok(ExecResult::flow(code, Flow::Exit(code)))
    }
}

/// The return builtin - leave the current function or sourced file.
pub struct Return;

#[async_trait]
impl Builtin for Return {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if !ctx.runner.vars.in_function() && ctx.runner.counters.source_depth == 0 {
            return Ok(ctx.error("can only `return' from a function or sourced script"));
        }
        let code = match status_arg(&ctx) {
            Ok(code) => code,
            Err(res) => return Ok(res),
        };
        Ok(ExecResult::flow(code, Flow::Return(code)))
    }
}

/// Parse the loop count of `break` and `continue`, clamped to the number of
/// enclosing loops.
fn loop_count(ctx: &Context<'_>) -> std::result::Result<Option<usize>, ExecResult> {
    let n = match ctx.args.first() {
        None => 1,
        Some(arg) => match arg.trim().parse::<i64>() {
            Ok(n) if n >= 1 => n as usize,
            Ok(_) => return Err(ctx.error(format!("{arg}: loop count out of range"))),
            Err(_) => return Err(ctx.failure(format!("{arg}: numeric argument required"), 2)),
        },
    };
    let depth = ctx.runner.loop_depth;
    if depth == 0 {
        return Ok(None);
    }
    Ok(Some(n.min(depth)))
}

/// The break builtin - leave enclosing loops.
pub struct Break;

#[async_trait]
impl Builtin for Break {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        match loop_count(&ctx) {
            Ok(Some(n)) => Ok(ExecResult::flow(0, Flow::Break(n))),
            Ok(None) => Ok(ExecResult::status(0)),
            Err(res) => Ok(res),
        }
    }
}

/// The continue builtin - start the next iteration of an enclosing loop.
pub struct Continue;

#[async_trait]
impl Builtin for Continue {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        match loop_count(&ctx) {
            Ok(Some(n)) => Ok(ExecResult::flow(0, Flow::Continue(n))),
            Ok(None) => Ok(ExecResult::status(0)),
            Err(res) => Ok(res),
        }
    }
}
