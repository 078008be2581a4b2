//! Pluggable boundaries between the runner and its host
//!
//! - [`ExecHandler`] runs any command that is neither a function nor a
//!   builtin. [`ProcessExec`] spawns a real program.
//! - [`OpenHandler`] opens every redirection target. [`ProcessOpen`] uses
//!   the real filesystem.
//! - [`ParseHandler`] turns source text into a syntax tree for `source`,
//!   `.` and `eval`. [`JsonParse`] decodes the JSON form of [`File`].
//!
//! Hooks see the runner through a [`HandlerContext`] snapshot.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ast::File;
use crate::env::{Environ, ListEnviron, exported_pairs};
use crate::error::{Error, Result};
use crate::io::{FileStream, InputStream, OutputStream};
use crate::logging::{log_debug, log_warn};

/// Default grace period between the interrupt and the kill of a cancelled
/// child process.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// What a hook may see of the runner at call time.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Exported variables
    pub env: ListEnviron,
    /// Working directory
    pub dir: PathBuf,
    pub stdin: InputStream,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    /// Grace period after interrupting a cancelled child
    pub kill_timeout: Duration,
    pub cancel: CancellationToken,
}

impl HandlerContext {
    /// Resolve `path` against [`HandlerContext::dir`].
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }
}

/// Runs commands that are not functions or builtins.
///
/// Return `Ok(())` for status 0 and [`Error::ExitStatus`] for any other
/// status. Every other error stops the runner.
#[async_trait]
pub trait ExecHandler: Send + Sync {
    async fn exec(&self, ctx: &HandlerContext, args: &[String]) -> Result<()>;
}

/// How a redirection wants its target opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    /// `<`
    pub fn read() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// `>`
    pub fn write() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// `>>`
    pub fn append() -> Self {
        Self {
            write: true,
            append: true,
            create: true,
            ..Default::default()
        }
    }

    /// `<>`
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            ..Default::default()
        }
    }
}

/// Opens redirection targets.
///
/// Errors in the "path not usable" class ([`Error::Path`], see
/// [`Error::from_open`]) are reported and give status 1; any other error
/// stops the runner.
#[async_trait]
pub trait OpenHandler: Send + Sync {
    async fn open(
        &self,
        ctx: &HandlerContext,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn FileStream>>;
}

/// Turns shell source into a syntax tree.
pub trait ParseHandler: Send + Sync {
    fn parse(&self, name: &str, src: &str) -> Result<File>;
}

/// Finds programs on `PATH` and runs them as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExec;

#[async_trait]
impl ExecHandler for ProcessExec {
    async fn exec(&self, ctx: &HandlerContext, args: &[String]) -> Result<()> {
        let Some(name) = args.first() else {
            return Ok(());
        };
        let path = match look_path(ctx, name) {
            Ok(path) => path,
            Err(status) => {
                let msg = if status == 127 {
                    format!("{name}: command not found\n")
                } else {
                    format!("{name}: Permission denied\n")
                };
                ctx.stderr.write_str(&msg).await?;
                return Err(Error::ExitStatus(status));
            }
        };

        let mut cmd = tokio::process::Command::new(&path);
        cmd.args(&args[1..])
            .env_clear()
            .envs(exported_pairs(&ctx.env))
            .current_dir(&ctx.dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let stdin_mode = if ctx.stdin.is_null() {
            Stdio::null()
        } else if ctx.stdin.is_process() {
            Stdio::inherit()
        } else {
            Stdio::piped()
        };
        cmd.stdin(stdin_mode);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let status = if e.kind() == std::io::ErrorKind::PermissionDenied {
                    126
                } else {
                    127
                };
                ctx.stderr
                    .write_str(&format!("{name}: {}\n", crate::error::io_reason(&e)))
                    .await?;
                return Err(Error::ExitStatus(status));
            }
        };
        log_debug!(program = %path.display(), "spawned child process");

        let feed = child.stdin.take().map(|mut pipe| {
            let input = ctx.stdin.clone();
            tokio::spawn(async move { input.pump_into(&mut pipe).await })
        });
        let mut out = child.stdout.take();
        let mut err = child.stderr.take();
        let stdout = ctx.stdout.clone();
        let stderr = ctx.stderr.clone();
        let copy_out = async {
            match out.as_mut() {
                Some(r) => stdout.pump_from(r).await,
                None => Ok(()),
            }
        };
        let copy_err = async {
            match err.as_mut() {
                Some(r) => stderr.pump_from(r).await,
                None => Ok(()),
            }
        };

        let run = async {
            let (status, o, e) = tokio::join!(child.wait(), copy_out, copy_err);
            o?;
            e?;
            status
        };
        let status = tokio::select! {
            status = run => status?,
            _ = ctx.cancel.cancelled() => {
                interrupt(&child);
                match tokio::time::timeout(ctx.kill_timeout, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        log_warn!(program = %path.display(), "killing child after grace period");
                        child.kill().await?;
                        child.wait().await?
                    }
                }
            }
        };
        if let Some(feed) = feed {
            feed.abort();
        }
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match exit_code(status) {
            0 => Ok(()),
            code => Err(Error::ExitStatus(code)),
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &tokio::process::Child) {}

fn exit_code(status: std::process::ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return (code & 0xff) as u8;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (128 + sig) as u8;
        }
    }
    1
}

/// Find `name` as `PATH` lookup would. Names containing `/` are resolved
/// against the working directory. Errors carry the status to report: 127
/// when nothing is found, 126 when the match is not executable.
pub fn look_path(ctx: &HandlerContext, name: &str) -> std::result::Result<PathBuf, u8> {
    if name.contains('/') {
        let path = ctx.resolve(name);
        return match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Err(126),
            Ok(meta) if is_executable(&meta) => Ok(path),
            Ok(_) => Err(126),
            Err(_) => Err(127),
        };
    }
    let path_var = ctx.env.get("PATH");
    let mut denied = false;
    for dir in path_var.str_value().split(':') {
        let dir = if dir.is_empty() { "." } else { dir };
        let candidate = ctx.resolve(dir).join(name);
        if let Ok(meta) = std::fs::metadata(&candidate) {
            if meta.is_file() && is_executable(&meta) {
                return Ok(candidate);
            }
            denied |= meta.is_file();
        }
    }
    Err(if denied { 126 } else { 127 })
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Opens files on the real filesystem, relative to the runner's directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOpen;

#[async_trait]
impl OpenHandler for ProcessOpen {
    async fn open(
        &self,
        ctx: &HandlerContext,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn FileStream>> {
        let full = ctx.resolve(path);
        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(flags.read)
            .write(flags.write)
            .append(flags.append)
            .create(flags.create)
            .truncate(flags.truncate);
        #[cfg(unix)]
        opts.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        match opts.open(&full).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) => Err(Error::from_open(path, e)),
        }
    }
}

/// Decodes scripts given as the JSON form of [`File`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParse;

impl ParseHandler for JsonParse {
    fn parse(&self, name: &str, src: &str) -> Result<File> {
        let mut file: File = serde_json::from_str(src).map_err(|e| Error::Parse(e.to_string()))?;
        if file.name.is_empty() {
            file.name = name.to_string();
        }
        Ok(file)
    }
}
