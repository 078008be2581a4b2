//! Declaration builtins: declare, typeset, local, export, readonly
//!
//! The same code serves the `Decl` syntax node; the builtin form only sees
//! words, so array literals arrive as `name=(a b)` text.

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interp::{self, DeclArg, ExecResult};

/// `declare` and its relatives. The variant is the name it is called as.
pub struct Declare;

#[async_trait]
impl Builtin for Declare {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let args = ctx.args.iter().cloned().map(DeclArg::Word).collect();
        interp::declare(ctx.runner, ctx.name, args).await
    }
}
