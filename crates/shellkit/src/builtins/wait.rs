//! Wait builtin - wait for background jobs

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interp::ExecResult;

/// The wait builtin - wait for background jobs to complete.
///
/// Usage: wait [%JOB | ID...]
///
/// If no operand is given, waits for all background jobs and returns 0 when
/// there were none. Returns the exit status of the last job waited for, or
/// 127 when the last operand names no known job.
pub struct Wait;

#[async_trait]
impl Builtin for Wait {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            let code = ctx.runner.jobs.wait_all().await;
            return Ok(ExecResult::status(code));
        }

        let mut stderr = String::new();
        let mut code = 0;
        for arg in ctx.args {
            let id = arg.strip_prefix('%').unwrap_or(arg);
            let Ok(id) = id.parse::<usize>() else {
                stderr.push_str(&format!(
                    "{}: wait: `{arg}': not a pid or valid job spec\n",
                    ctx.runner.shell_name()
                ));
                code = 2;
                continue;
            };
            code = match ctx.runner.jobs.wait_for(id).await {
                Some(c) => c,
                None => {
                    stderr.push_str(&format!(
                        "{}: wait: {arg}: no such job\n",
                        ctx.runner.shell_name()
                    ));
                    127
                }
            };
        }
        Ok(ExecResult {
            stderr,
            ..ExecResult::status(code)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::interp::testing::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_wait_no_jobs() {
        let mut r = runner();
        assert_eq!(builtin(&mut r, &["wait"]).await.exit_code, 0);
    }

    #[tokio::test]
    async fn test_wait_returns_job_status() {
        let res = run(vec![
            background(cmd(&["exit", "3"])),
            stmt(call(vec![lit("wait"), word(vec![param("!")])])),
            stmt(call(vec![lit("echo"), word(vec![param("?")])])),
        ])
        .await;
        assert_eq!(res.stdout, "3\n");
    }

    #[tokio::test]
    async fn test_wait_all_joins_output() {
        let res = run(vec![
            background(cmd(&["echo", "bg"])),
            cmd(&["wait"]),
            cmd(&["echo", "done"]),
        ])
        .await;
        assert_eq!(res.stdout, "bg\ndone\n");
    }

    #[tokio::test]
    async fn test_wait_unknown_job() {
        let mut r = runner();
        let res = builtin(&mut r, &["wait", "%9"]).await;
        assert_eq!(res.exit_code, 127);
        assert!(res.stderr.contains("no such job"));
        let res = builtin(&mut r, &["wait", "x"]).await;
        assert_eq!(res.exit_code, 2);
    }
}
