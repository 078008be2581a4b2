//! echo builtin command

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::expand::expand_escapes;
use crate::interp::ExecResult;

/// The echo builtin command.
///
/// Leading words made only of `n`, `e` and `E` flags are options; anything
/// else, including `--`, is printed.
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut add_newline = true;
        let mut interpret_escapes = false;
        let mut rest = ctx.args;

        // Parse options
        while let Some(arg) = rest.first() {
            let Some(flags) = arg.strip_prefix('-') else {
                break;
            };
            if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
                break;
            }
            for c in flags.chars() {
                match c {
                    'n' => add_newline = false,
                    'e' => interpret_escapes = true,
                    _ => interpret_escapes = false,
                }
            }
            rest = &rest[1..];
        }

        let mut output = String::new();
        for (i, arg) in rest.iter().enumerate() {
            if i > 0 {
                output.push(' ');
            }
            if interpret_escapes {
                let (text, stop) = expand_escapes(arg);
                output.push_str(&text);
                if stop {
                    return Ok(ExecResult::ok(output));
                }
            } else {
                output.push_str(arg);
            }
        }

        if add_newline {
            output.push('\n');
        }

        Ok(ExecResult::ok(output))
    }
}
