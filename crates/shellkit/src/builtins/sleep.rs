//! Sleep builtin - pause execution for specified duration

use async_trait::async_trait;
use std::time::Duration;

use super::{Builtin, Context};
use crate::error::{Error, Result};
use crate::interp::ExecResult;

/// Parse `N[smhd]` with a fractional `N`.
fn interval(arg: &str) -> Option<f64> {
    let (num, scale) = match arg.char_indices().last()? {
        (i, 's') => (&arg[..i], 1.0),
        (i, 'm') => (&arg[..i], 60.0),
        (i, 'h') => (&arg[..i], 3600.0),
        (i, 'd') => (&arg[..i], 86400.0),
        _ => (arg, 1.0),
    };
    match num.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Some(n * scale),
        _ => None,
    }
}

/// The sleep builtin - pause execution for a number of seconds.
///
/// Usage: sleep NUMBER[SUFFIX]...
///
/// Operands add up. The wait ends early with a cancellation error when the
/// runner's token fires.
pub struct Sleep;

#[async_trait]
impl Builtin for Sleep {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            return Ok(ctx.error("missing operand"));
        }
        let mut seconds = 0.0;
        for arg in ctx.args {
            match interval(arg) {
                Some(s) => seconds += s,
                None => return Ok(ctx.error(format!("invalid time interval '{arg}'"))),
            }
        }

        let cancel = ctx.runner.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => Ok(ExecResult::status(0)),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::testing::*;
    use std::time::Instant;

    #[test]
    fn test_interval_suffixes() {
        assert_eq!(interval("1.5"), Some(1.5));
        assert_eq!(interval("2m"), Some(120.0));
        assert_eq!(interval("1h"), Some(3600.0));
        assert_eq!(interval("-1"), None);
        assert_eq!(interval("abc"), None);
        assert_eq!(interval(""), None);
    }

    #[tokio::test]
    async fn test_sleep_short() {
        let mut r = runner();
        let start = Instant::now();
        let res = builtin(&mut r, &["sleep", "0.05"]).await;
        assert_eq!(res.exit_code, 0);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_sleep_invalid() {
        let mut r = runner();
        let res = builtin(&mut r, &["sleep", "soon"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("invalid time interval 'soon'"));
        assert_eq!(builtin(&mut r, &["sleep"]).await.exit_code, 1);
    }

    #[tokio::test]
    async fn test_sleep_cancelled() {
        let mut r = runner();
        r.cancellation_token().cancel();
        let args = strings(&["100"]);
        let ctx = Context { name: "sleep", args: &args, runner: &mut r };
        let err = Sleep.execute(ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
