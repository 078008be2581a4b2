//! printf builtin - formatted output

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::env;
use crate::error::Result;
use crate::expand;
use crate::interp::ExecResult;

/// printf builtin - formatted string output
///
/// The format is reused until every argument is consumed. `-v name` stores
/// the output in a variable instead of printing it.
pub struct Printf;

#[async_trait]
impl Builtin for Printf {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut rest = ctx.args;
        let mut var_name: Option<&String> = None;
        if rest.first().is_some_and(|a| a == "-v") {
            match rest.get(1) {
                Some(name) => var_name = Some(name),
                None => return Ok(ctx.failure("-v: option requires an argument", 2)),
            }
            rest = &rest[2..];
        }
        if rest.first().is_some_and(|a| a == "--") {
            rest = &rest[1..];
        }
        let Some((format, args)) = rest.split_first() else {
            return Ok(ctx.failure("usage: printf [-v var] format [arguments]", 2));
        };
        if let Some(name) = var_name {
            if !env::valid_name(name) {
                return Ok(ctx.failure(format!("`{name}': not a valid identifier"), 2));
            }
        }

        let mut output = String::new();
        let mut failed = None;
        let mut pos = 0;
        // Bash printf repeats the format string until all args are consumed
        loop {
            match expand::format(format, &args[pos..]) {
                Ok((text, used)) => {
                    output.push_str(&text);
                    pos += used;
                    if used == 0 || pos >= args.len() {
                        break;
                    }
                }
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }

        let mut res = match failed {
            Some(e) => ctx.error(e),
            None => ExecResult::default(),
        };
        match var_name {
            Some(name) => {
                if let Err(e) = ctx.runner.set_var(name, output) {
                    return Ok(ctx.error(e));
                }
            }
            None => res.stdout = output,
        }
        Ok(res)
    }
}
