//! Redirections
//!
//! Each statement's redirections edit the runner's descriptor table; the
//! statement restores the previous table afterwards unless `exec` asked to
//! keep it.

use super::{Flow, Runner};
use crate::ast::{RedirOp, Redirect};
use crate::error::{Error, Result};
use crate::expand;
use crate::hooks::OpenFlags;
use crate::io::{FileStream, InputStream, OutputStream, Stream};
use crate::logging::log_trace;

/// Mode for files a redirection creates.
const CREATE_MODE: u32 = 0o644;

fn strip_tabs(body: &str) -> String {
    body.split_inclusive('\n')
        .map(|line| line.trim_start_matches('\t'))
        .collect()
}

fn bad_fd(target: &str) -> Error {
    Error::Path {
        path: target.to_string(),
        reason: "Bad file descriptor".to_string(),
    }
}

impl Runner {
    /// Apply redirections in order. A target that could not be used is
    /// reported and yields the flow the statement must take instead of
    /// running.
    pub(crate) async fn redirect_all(&mut self, redirs: &[Redirect]) -> Result<Option<Flow>> {
        for rd in redirs {
            if let Err(e) = self.redirect(rd).await {
                return self.fail(e).await.map(Some);
            }
        }
        Ok(None)
    }

    async fn redirect(&mut self, rd: &Redirect) -> Result<()> {
        if matches!(rd.op, RedirOp::Hdoc | RedirOp::DashHdoc) {
            let mut body = match &rd.hdoc {
                Some(w) => expand::document(self, w).await?,
                None => String::new(),
            };
            if rd.op == RedirOp::DashHdoc {
                body = strip_tabs(&body);
            }
            self.fds
                .insert(rd.fd.unwrap_or(0), Stream::Input(InputStream::from_bytes(body)));
            return Ok(());
        }

        let target = expand::literal(self, &rd.word).await?;
        log_trace!(op = ?rd.op, fd = ?rd.fd, target = %target, "redirect");
        match rd.op {
            RedirOp::WordHdoc => {
                let body = format!("{target}\n");
                self.fds
                    .insert(rd.fd.unwrap_or(0), Stream::Input(InputStream::from_bytes(body)));
            }
            RedirOp::DplIn | RedirOp::DplOut => {
                let input = rd.op == RedirOp::DplIn;
                let fd = rd.fd.unwrap_or(if input { 0 } else { 1 });
                if target == "-" {
                    self.fds.remove(&fd);
                } else if let Ok(src) = target.parse::<u32>() {
                    let stream = self.fds.get(&src).cloned().ok_or_else(|| bad_fd(&target))?;
                    self.fds.insert(fd, stream);
                } else if !input && rd.fd.is_none() {
                    let out = self.open_output(&target, OpenFlags::write()).await?;
                    self.fds.insert(1, Stream::Output(out.clone()));
                    self.fds.insert(2, Stream::Output(out));
                } else {
                    return Err(Error::Path {
                        path: target,
                        reason: "ambiguous redirect".to_string(),
                    });
                }
            }
            RedirOp::RdrIn => {
                let f = self.open_target(&target, OpenFlags::read()).await?;
                self.fds
                    .insert(rd.fd.unwrap_or(0), Stream::Input(InputStream::from_reader(f)));
            }
            RedirOp::RdrInOut => {
                let fd = rd.fd.unwrap_or(0);
                let f = self.open_target(&target, OpenFlags::read_write()).await?;
                let stream = if fd == 0 {
                    Stream::Input(InputStream::from_reader(f))
                } else {
                    Stream::Output(OutputStream::from_writer(f))
                };
                self.fds.insert(fd, stream);
            }
            RedirOp::RdrOut | RedirOp::ClbOut | RedirOp::AppOut => {
                let flags = if rd.op == RedirOp::AppOut {
                    OpenFlags::append()
                } else {
                    OpenFlags::write()
                };
                let out = self.open_output(&target, flags).await?;
                self.fds.insert(rd.fd.unwrap_or(1), Stream::Output(out));
            }
            RedirOp::RdrAll | RedirOp::AppAll => {
                let flags = if rd.op == RedirOp::AppAll {
                    OpenFlags::append()
                } else {
                    OpenFlags::write()
                };
                let out = self.open_output(&target, flags).await?;
                self.fds.insert(1, Stream::Output(out.clone()));
                self.fds.insert(2, Stream::Output(out));
            }
            RedirOp::Hdoc | RedirOp::DashHdoc => {}
        }
        Ok(())
    }

    async fn open_target(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn FileStream>> {
        if path.is_empty() {
            return Err(Error::Path {
                path: String::new(),
                reason: "No such file or directory".to_string(),
            });
        }
        let ctx = self.handler_context();
        self.open.open(&ctx, path, flags, CREATE_MODE).await
    }

    async fn open_output(&self, path: &str, flags: OpenFlags) -> Result<OutputStream> {
        Ok(OutputStream::from_writer(self.open_target(path, flags).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{Command, Stmt, Word};
    use pretty_assertions::assert_eq;

    fn with_redir(st: Stmt, fd: Option<u32>, op: RedirOp, target: &str) -> Stmt {
        redirect(st, fd, op, lit(target))
    }

    fn heredoc(st: Stmt, op: RedirOp, body: Word) -> Stmt {
        let mut st = st;
        st.redirs.push(Redirect {
            fd: None,
            op,
            word: lit("EOF"),
            hdoc: Some(body),
        });
        st
    }

    #[test]
    fn test_strip_tabs() {
        assert_eq!(strip_tabs("\t\ta\n\tb\nc"), "a\nb\nc");
    }

    #[tokio::test]
    async fn test_output_then_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = crate::Runner::builder().dir(dir.path()).capture().build();
        let res = r
            .run(&file(vec![
                with_redir(cmd(&["echo", "one"]), None, RedirOp::RdrOut, "out.txt"),
                with_redir(cmd(&["echo", "two"]), None, RedirOp::AppOut, "out.txt"),
                with_redir(cmd(&["read", "first"]), None, RedirOp::RdrIn, "out.txt"),
                stmt(call(vec![lit("echo"), word(vec![param("first")])])),
            ]))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "one\ntwo\n"
        );
        assert_eq!(res.stdout, "one\n");
    }

    #[tokio::test]
    async fn test_redirection_is_reverted_after_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = crate::Runner::builder().dir(dir.path()).capture().build();
        let res = r
            .run(&file(vec![
                with_redir(cmd(&["echo", "to-file"]), None, RedirOp::RdrOut, "f"),
                cmd(&["echo", "to-stdout"]),
            ]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "to-stdout\n");
    }

    #[tokio::test]
    async fn test_exec_keeps_redirections() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = crate::Runner::builder().dir(dir.path()).capture().build();
        let res = r
            .run(&file(vec![
                with_redir(cmd(&["exec"]), None, RedirOp::RdrOut, "log"),
                cmd(&["echo", "kept"]),
            ]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("log")).unwrap(),
            "kept\n"
        );
    }

    #[tokio::test]
    async fn test_missing_input_reports_status_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = crate::Runner::builder().dir(dir.path()).capture().build();
        let res = r
            .run(&file(vec![with_redir(
                cmd(&["echo", "never"]),
                None,
                RedirOp::RdrIn,
                "missing.txt",
            )]))
            .await
            .unwrap();
        assert_eq!(res.exit_code, 1);
        assert_eq!(res.stdout, "");
        assert!(res.stderr.contains("missing.txt: No such file or directory"));
    }

    #[tokio::test]
    async fn test_nounset_target_exits_shell() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = crate::Runner::builder().dir(dir.path()).capture().build();
        let target = word(vec![dbl(vec![param("unset")])]);
        let res = r
            .run(&file(vec![
                cmd(&["set", "-u"]),
                redirect(cmd(&["echo", "x"]), None, RedirOp::RdrOut, target),
                cmd(&["echo", "after"]),
            ]))
            .await
            .unwrap();
        assert_eq!(res.exit_code, 1);
        assert_eq!(res.stdout, "");
        assert!(res.stderr.contains("unset"));
    }

    #[tokio::test]
    async fn test_dup_stderr_to_stdout() {
        let res = run(vec![with_redir(
            cmd(&["echo", "err"]),
            None,
            RedirOp::DplOut,
            "2",
        )])
        .await;
        assert_eq!(res.stdout, "");
        assert_eq!(res.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_close_descriptor() {
        let res = run(vec![with_redir(
            cmd(&["echo", "gone"]),
            Some(1),
            RedirOp::DplOut,
            "-",
        )])
        .await;
        assert_eq!(res.stdout, "");
    }

    #[tokio::test]
    async fn test_bad_descriptor() {
        let res = run(vec![with_redir(
            cmd(&["echo", "x"]),
            None,
            RedirOp::DplOut,
            "9",
        )])
        .await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("Bad file descriptor"));
    }

    #[tokio::test]
    async fn test_heredoc_expands_and_strips_tabs() {
        let mut r = runner();
        r.set_var("NAME", "world").unwrap();
        let body = word(vec![part_lit("\thello "), param("NAME"), part_lit("\n")]);
        let res = r
            .run(&file(vec![
                heredoc(cmd(&["read", "-r", "line"]), RedirOp::DashHdoc, body),
                stmt(call(vec![lit("echo"), word(vec![dbl(vec![param("line")])])])),
            ]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "hello world\n");
    }

    #[tokio::test]
    async fn test_here_string_feeds_read() {
        let res = run(vec![
            with_redir(cmd(&["read", "line"]), None, RedirOp::WordHdoc, "text"),
            stmt(call(vec![lit("echo"), word(vec![param("line")])])),
        ])
        .await;
        assert_eq!(res.stdout, "text\n");
    }

    #[tokio::test]
    async fn test_all_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = crate::Runner::builder().dir(dir.path()).capture().build();
        let script = file(vec![with_redir(
            stmt(Command::Block(vec![
                cmd(&["echo", "out"]),
                with_redir(cmd(&["echo", "err"]), None, RedirOp::DplOut, "2"),
            ])),
            None,
            RedirOp::RdrAll,
            "both",
        )]);
        let res = r.run(&script).await.unwrap();
        assert_eq!(res.stdout, "");
        let both = std::fs::read_to_string(dir.path().join("both")).unwrap();
        assert_eq!(both, "out\nerr\n");
    }
}
