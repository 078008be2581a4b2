//! Subshells: `( ... )`, pipelines, background jobs and substitutions

use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::task::JoinHandle;

use super::Runner;
use super::state::{Flow, Opt};
use crate::ast::{BinCmdOp, ProcSubstOp, Stmt};
use crate::error::{Error, Result};
use crate::io::{self, InputStream, OutputStream, Stream};
use crate::logging::{log_debug, log_warn};

/// Status of a pipeline stage killed by writing to a closed pipe.
const SIGPIPE_STATUS: i32 = 141;

/// A running `<(...)` or `>(...)`.
pub(crate) struct ProcSubst {
    #[cfg_attr(not(unix), allow(dead_code))]
    path: PathBuf,
    #[cfg_attr(not(unix), allow(dead_code))]
    op: ProcSubstOp,
    handle: JoinHandle<()>,
}

/// Status a finished subshell hands to its parent.
fn exit_status(res: &Result<Flow>, sub: &Runner) -> Option<i32> {
    match res {
        Ok(Flow::Exit(code) | Flow::Return(code)) => Some(*code),
        Ok(_) => Some(sub.status),
        Err(_) => None,
    }
}

impl Runner {
    pub(crate) async fn subshell_stmts(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        let mut sub = self.subshell();
        let res = sub.stmts(stmts).await;
        sub.finish().await;
        self.status = match exit_status(&res, &sub) {
            Some(code) => code,
            None => return res,
        };
        Ok(Flow::Normal)
    }

    /// `x | y` and `x |& y`. The left stage runs on its own task; the right
    /// stage runs here, on a subshell reading the pipe.
    pub(crate) async fn pipeline(&mut self, op: BinCmdOp, x: &Stmt, y: &Stmt) -> Result<Flow> {
        let (w, r) = io::pipe();
        let mut left = self.subshell();
        left.fds.insert(1, Stream::Output(w.clone()));
        if op == BinCmdOp::PipeAll {
            left.fds.insert(2, Stream::Output(w.clone()));
        }
        let x = x.clone();
        let handle = tokio::spawn(async move {
            let res = left.stmt(&x).await;
            left.finish().await;
            let status = exit_status(&res, &left);
            drop(left);
            let _ = w.shutdown().await;
            match res {
                Err(Error::Io(e)) if e.kind() == ErrorKind::BrokenPipe => Ok(SIGPIPE_STATUS),
                Err(e) => Err(e),
                Ok(_) => Ok(status.unwrap_or(1)),
            }
        });

        let mut right = self.subshell();
        right.fds.insert(0, Stream::Input(r));
        let res = right.stmt(y).await;
        right.finish().await;
        let right_status = exit_status(&res, &right);
        drop(right);

        let right_status = match res {
            Ok(_) => right_status.unwrap_or(1),
            Err(Error::Io(e)) if e.kind() == ErrorKind::BrokenPipe => SIGPIPE_STATUS,
            Err(e) => {
                handle.abort();
                return Err(e);
            }
        };
        let left_status = handle
            .await
            .map_err(|e| Error::Internal(format!("pipeline stage failed: {e}")))??;
        log_debug!(left_status, right_status, "pipeline done");

        self.status = if self.opts.get(Opt::PipeFail) && right_status == 0 {
            left_status
        } else {
            right_status
        };
        Ok(Flow::Normal)
    }

    /// Start `st` as a background job.
    pub(crate) fn background(&mut self, st: &Stmt) {
        let mut sub = self.subshell();
        sub.fds.insert(0, Stream::Input(InputStream::null()));
        let mut st = st.clone();
        st.background = false;
        let handle = tokio::spawn(async move {
            let res = sub.stmt(&st).await;
            sub.finish().await;
            match exit_status(&res, &sub) {
                Some(code) => code,
                None => {
                    if let Err(e) = &res {
                        log_warn!(error = %e, "background job failed");
                        let _ = sub.report(&e.to_string()).await;
                    }
                    1
                }
            }
        });
        self.jobs.spawn(handle);
    }

    /// Run `$(...)`: capture stdout and drop trailing newlines.
    pub(crate) async fn command_subst(&mut self, stmts: &[Stmt]) -> Result<String> {
        let (out, capture) = OutputStream::capture();
        let mut sub = self.subshell();
        sub.fds.insert(1, Stream::Output(out));
        let res = sub.stmts(stmts).await;
        sub.finish().await;
        let status = match exit_status(&res, &sub) {
            Some(code) => code,
            None => return res.map(|_| String::new()),
        };
        self.subst_status = Some(status);
        self.status = status;
        let mut text = capture.take_string();
        let trimmed = text.trim_end_matches('\n').len();
        text.truncate(trimmed);
        Ok(text)
    }

    /// Start `<(...)` or `>(...)` on a named pipe and return its path.
    #[cfg(unix)]
    pub(crate) async fn process_subst(&mut self, op: ProcSubstOp, stmts: &[Stmt]) -> Result<String> {
        let dir = tempfile::Builder::new().prefix("shellkit-").tempdir()?;
        let path = dir.path().join("fifo");
        mkfifo(&path)?;

        let mut sub = self.subshell();
        let stmts = stmts.to_vec();
        let fifo = path.clone();
        let handle = tokio::spawn(async move {
            let _dir = dir;
            let res: Result<Flow> = async {
                match op {
                    ProcSubstOp::In => {
                        let f = tokio::fs::OpenOptions::new().write(true).open(&fifo).await?;
                        sub.fds.insert(1, Stream::Output(OutputStream::from_writer(f)));
                        let res = sub.stmts(&stmts).await;
                        // Dropping the last handle closes the pipe for the reader.
                        sub.fds.remove(&1);
                        res
                    }
                    ProcSubstOp::Out => {
                        let f = tokio::fs::OpenOptions::new().read(true).open(&fifo).await?;
                        sub.fds.insert(0, Stream::Input(InputStream::from_reader(f)));
                        sub.stmts(&stmts).await
                    }
                }
            }
            .await;
            sub.finish().await;
            match res {
                Err(Error::Io(e)) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    let _ = sub.report(&e.to_string()).await;
                }
                Ok(_) => {}
            }
        });
        log_debug!(path = %path.display(), "process substitution started");
        let shown = path.to_string_lossy().into_owned();
        self.proc_substs.push(ProcSubst { path, op, handle });
        Ok(shown)
    }

    #[cfg(not(unix))]
    pub(crate) async fn process_subst(&mut self, _op: ProcSubstOp, _stmts: &[Stmt]) -> Result<String> {
        Err(Error::Internal("process substitution unsupported".into()))
    }

    /// Wait for process substitutions. One nobody opened is released by
    /// briefly opening the other end of its pipe.
    pub(crate) async fn finish(&mut self) {
        for ps in std::mem::take(&mut self.proc_substs) {
            if !ps.handle.is_finished() {
                release(&ps);
            }
            let _ = ps.handle.await;
        }
    }
}

#[cfg(unix)]
fn mkfifo(path: &std::path::Path) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| Error::Internal(e.to_string()))?;
    // SAFETY: c_path is a valid NUL-terminated string.
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) } != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(unix)]
fn release(ps: &ProcSubst) {
    use std::os::unix::fs::OpenOptionsExt;
    let mut opts = std::fs::OpenOptions::new();
    match ps.op {
        ProcSubstOp::In => opts.read(true),
        ProcSubstOp::Out => opts.write(true),
    };
    opts.custom_flags(libc::O_NONBLOCK);
    let _ = opts.open(&ps.path);
}

#[cfg(not(unix))]
fn release(_ps: &ProcSubst) {}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::ast::build::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_pipeline_status_is_last_stage() {
        let res = run(vec![pipe(cmd(&["false"]), cmd(&["true"]))]).await;
        assert_eq!(res.exit_code, 0);
        let res = run(vec![pipe(cmd(&["true"]), cmd(&["exit", "3"]))]).await;
        assert_eq!(res.exit_code, 3);
    }

    #[tokio::test]
    async fn test_pipefail_takes_rightmost_failure() {
        let res = run(vec![
            cmd(&["set", "-o", "pipefail"]),
            pipe(
                pipe(cmd(&["exit", "2"]), cmd(&["exit", "5"])),
                cmd(&["true"]),
            ),
        ])
        .await;
        assert_eq!(res.exit_code, 5);

        let res = run(vec![
            cmd(&["set", "-o", "pipefail"]),
            pipe(cmd(&["true"]), cmd(&["true"])),
        ])
        .await;
        assert_eq!(res.exit_code, 0);
    }
}
