//! Built-in shell commands
//!
//! This module provides the [`Builtin`] trait for implementing custom commands
//! and the [`Context`] struct they run with.
//!
//! # Custom Builtins
//!
//! Implement the [`Builtin`] trait to create custom commands:
//!
//! ```rust
//! use shellkit::{Builtin, Context, ExecResult, async_trait};
//!
//! struct MyCommand;
//!
//! #[async_trait]
//! impl Builtin for MyCommand {
//!     async fn execute(&self, ctx: Context<'_>) -> shellkit::Result<ExecResult> {
//!         Ok(ExecResult::ok(format!("{} got {} args\n", ctx.name, ctx.args.len())))
//!     }
//! }
//! ```
//!
//! Register via [`RunnerBuilder::builtin`](crate::RunnerBuilder::builtin).
//! A registered builtin replaces a default one of the same name.

mod alias;
mod command;
mod declare;
mod dirstack;
mod echo;
mod flow;
mod getopts;
mod navigation;
mod printf;
mod read;
mod sleep;
mod source;
mod vars;
mod wait;

pub use alias::{Alias, Unalias};
pub use command::{BuiltinCmd, Command, Exec, Type};
pub use declare::Declare;
pub use dirstack::{Dirs, Popd, Pushd};
pub use echo::Echo;
pub use flow::{Break, Colon, Continue, Exit, False, Return, True};
pub use getopts::Getopts;
pub use navigation::{Cd, Pwd};
pub use printf::Printf;
pub use read::Read;
pub use sleep::Sleep;
pub use source::{Eval, Source};
pub use test::{Bracket, Test};
pub use vars::{Set, Shift, Shopt, Unset};
pub use wait::Wait;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::interp::{ExecResult, Runner};

/// Resolve a path relative to the current working directory.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the cwd.
///
/// # Example
///
/// ```ignore
/// let abs = resolve_path(Path::new("/home"), "/etc/passwd");
/// assert_eq!(abs, PathBuf::from("/etc/passwd"));
///
/// let rel = resolve_path(Path::new("/home"), "file.txt");
/// assert_eq!(rel, PathBuf::from("/home/file.txt"));
///
/// // Paths are normalized (. and .. resolved)
/// let dot = resolve_path(Path::new("/"), ".");
/// assert_eq!(dot, PathBuf::from("/"));
/// ```
pub fn resolve_path(cwd: &Path, path_str: &str) -> PathBuf {
    let path = Path::new(path_str);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    normalize_path(&joined)
}

/// Normalize a path by resolving `.` and `..` components lexically.
///
/// `/.` becomes `/` and `/tmp/../home` becomes `/home`.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::RootDir => {
                result.push("/");
            }
            Component::Normal(name) => {
                result.push(name);
            }
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir | Component::Prefix(_) => {}
        }
    }

    // "/.." leaves nothing behind
    if result.as_os_str().is_empty() {
        result.push("/");
    }

    result
}

/// Execution context for builtin commands.
///
/// A builtin gets the runner itself: variables, options, the working
/// directory and the descriptor table are all reachable through it. Output
/// goes in the returned [`ExecResult`]; builtins that run other commands
/// (`eval`, `source`, `command`) let those write to the runner's streams
/// directly.
///
/// # Example
///
/// ```rust
/// use shellkit::{Builtin, Context, ExecResult, async_trait};
///
/// struct Greet;
///
/// #[async_trait]
/// impl Builtin for Greet {
///     async fn execute(&self, ctx: Context<'_>) -> shellkit::Result<ExecResult> {
///         let who = ctx.args.first().cloned().unwrap_or_else(|| ctx.runner.var("USER"));
///         Ok(ExecResult::ok(format!("hello {who}\n")))
///     }
/// }
/// ```
pub struct Context<'a> {
    /// The name the builtin was called as.
    pub name: &'a str,

    /// Command arguments (not including the command name).
    ///
    /// For `mycommand arg1 arg2`, this contains `["arg1", "arg2"]`.
    pub args: &'a [String],

    /// The runner executing the command.
    pub runner: &'a mut Runner,
}

impl Context<'_> {
    /// A status-1 result with `shell: name: msg` on stderr.
    pub fn error(&self, msg: impl std::fmt::Display) -> ExecResult {
        self.failure(msg, 1)
    }

    /// Like [`Context::error`] with a chosen status.
    pub fn failure(&self, msg: impl std::fmt::Display, exit_code: i32) -> ExecResult {
        ExecResult::err(
            format!("{}: {}: {msg}\n", self.runner.shell_name(), self.name),
            exit_code,
        )
    }

    /// `path` relative to the runner's working directory, normalized.
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(self.runner.dir(), path)
    }
}

/// Trait for implementing builtin commands.
///
/// All builtins must implement this trait. The trait requires `Send + Sync`
/// so a runner can move between tasks.
///
/// # Example
///
/// ```rust
/// use shellkit::{Builtin, Context, ExecResult, Runner, async_trait};
///
/// struct Greet {
///     default_name: String,
/// }
///
/// #[async_trait]
/// impl Builtin for Greet {
///     async fn execute(&self, ctx: Context<'_>) -> shellkit::Result<ExecResult> {
///         let name = ctx.args.first()
///             .map(|s| s.as_str())
///             .unwrap_or(&self.default_name);
///         Ok(ExecResult::ok(format!("Hello, {}!\n", name)))
///     }
/// }
///
/// let runner = Runner::builder()
///     .builtin("greet", Box::new(Greet { default_name: "World".into() }))
///     .build();
/// assert!(runner.is_builtin("greet"));
/// ```
///
/// # Return Values
///
/// Return [`ExecResult::ok`](crate::ExecResult::ok) for success with output,
/// or [`ExecResult::err`](crate::ExecResult::err) for errors with exit code.
/// An `Err` that is not fatal is reported as `name: error` with status 1.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Execute the builtin command.
    ///
    /// # Returns
    ///
    /// * `Ok(ExecResult)` - Execution result with stdout, stderr, exit code
    ///   and any control-flow change
    /// * `Err(Error)` - Failure; fatal errors abort the runner
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult>;
}

/// The default builtin table.
pub(crate) fn defaults() -> HashMap<String, Arc<dyn Builtin>> {
    let table: Vec<(&str, Arc<dyn Builtin>)> = vec![
        ("true", Arc::new(True)),
        ("false", Arc::new(False)),
        (":", Arc::new(Colon)),
        ("exit", Arc::new(Exit)),
        ("return", Arc::new(Return)),
        ("break", Arc::new(Break)),
        ("continue", Arc::new(Continue)),
        ("set", Arc::new(Set)),
        ("shift", Arc::new(Shift)),
        ("unset", Arc::new(Unset)),
        ("shopt", Arc::new(Shopt)),
        ("echo", Arc::new(Echo)),
        ("printf", Arc::new(Printf)),
        ("cd", Arc::new(Cd)),
        ("pwd", Arc::new(Pwd)),
        ("dirs", Arc::new(Dirs)),
        ("pushd", Arc::new(Pushd)),
        ("popd", Arc::new(Popd)),
        ("wait", Arc::new(Wait)),
        ("sleep", Arc::new(Sleep)),
        ("source", Arc::new(Source)),
        (".", Arc::new(Source)),
        ("eval", Arc::new(Eval)),
        ("test", Arc::new(Test)),
        ("[", Arc::new(Bracket)),
        ("read", Arc::new(Read)),
        ("getopts", Arc::new(Getopts)),
        ("alias", Arc::new(Alias)),
        ("unalias", Arc::new(Unalias)),
        ("type", Arc::new(Type)),
        ("command", Arc::new(Command)),
        ("builtin", Arc::new(BuiltinCmd)),
        ("exec", Arc::new(Exec)),
        ("declare", Arc::new(Declare)),
        ("typeset", Arc::new(Declare)),
        ("local", Arc::new(Declare)),
        ("export", Arc::new(Declare)),
        ("readonly", Arc::new(Declare)),
    ];
    table
        .into_iter()
        .map(|(name, builtin)| (name.to_string(), builtin))
        .collect()
}
