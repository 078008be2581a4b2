//! Shellkit - embeddable POSIX/Bash execution engine
//!
//! Shellkit executes shell syntax trees. It does not parse shell source:
//! a host hands it a [`ast::File`] (built in code, decoded from JSON, or
//! produced by a parser plugged in through [`ParseHandler`]) and a
//! [`Runner`] walks it with Bash semantics.
//!
//! The crate has three layers:
//!
//! - [`env`]: variables with attributes, scoped environments and namerefs
//! - [`expand`]: word expansion (parameters, arithmetic, braces, globs,
//!   field splitting, quote removal)
//! - [`Runner`]: control flow, redirections, pipelines, background jobs,
//!   builtins and cancellation
//!
//! Everything that reaches outside the process goes through hooks: an
//! [`ExecHandler`] runs programs, an [`OpenHandler`] opens redirection
//! targets. The defaults use the real system; hosts swap them to sandbox or
//! intercept commands.
//!
//! # Example
//!
//! ```rust
//! use shellkit::ast::build::*;
//! use shellkit::Runner;
//!
//! # tokio_test::block_on(async {
//! let mut runner = Runner::builder().env("NAME", "world").capture().build();
//! let script = file(vec![stmt(call(vec![
//!     lit("echo"),
//!     word(vec![part_lit("hello "), param("NAME")]),
//! ]))]);
//! let result = runner.run(&script).await.unwrap();
//! assert_eq!(result.stdout, "hello world\n");
//! assert_eq!(result.exit_code, 0);
//! # });
//! ```
//!
//! # Custom builtins
//!
//! ```rust
//! use shellkit::ast::build::*;
//! use shellkit::{Builtin, Context, ExecResult, Runner, async_trait};
//!
//! struct Shout;
//!
//! #[async_trait]
//! impl Builtin for Shout {
//!     async fn execute(&self, ctx: Context<'_>) -> shellkit::Result<ExecResult> {
//!         Ok(ExecResult::ok(format!("{}\n", ctx.args.join(" ").to_uppercase())))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let mut runner = Runner::builder()
//!     .builtin("shout", Box::new(Shout))
//!     .capture()
//!     .build();
//! let result = runner.run(&file(vec![cmd(&["shout", "hi"])])).await.unwrap();
//! assert_eq!(result.stdout, "HI\n");
//! # });
//! ```
//!
//! # Logging
//!
//! Enable the `logging` feature to get `tracing` events from the runner;
//! see [`LogConfig`] for redaction of sensitive values.

pub mod ast;
mod builtins;
pub mod env;
mod error;
pub mod expand;
mod hooks;
mod interp;
pub mod io;
mod limits;
mod logging;

pub use async_trait::async_trait;
pub use builtins::{Builtin, Context};
pub use error::{Error, Result};
pub use hooks::{
    DEFAULT_KILL_TIMEOUT, ExecHandler, HandlerContext, JsonParse, OpenFlags, OpenHandler,
    ParseHandler, ProcessExec, ProcessOpen, look_path,
};
pub use interp::{ExecResult, Flow, JobTable, Opt, OptionSet, Runner, RunnerBuilder};
pub use limits::{ExecutionLimits, LimitExceeded};
pub use logging::LogConfig;
pub use tokio_util::sync::CancellationToken;
