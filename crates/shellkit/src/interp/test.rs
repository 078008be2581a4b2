//! Conditional expressions: `[[ ... ]]` and the operators shared with the
//! `test` builtin

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::SystemTime;

use futures_util::future::{BoxFuture, FutureExt};

use super::Runner;
use super::state::Opt;
use crate::ast::{BinTestOp, TestExpr, UnTestOp};
use crate::env::{Environ, Variable, WriteEnviron};
use crate::error::{Error, Result};
use crate::expand::{self, pattern};

/// Evaluate `[[ expr ]]`.
pub(crate) fn eval<'a>(r: &'a mut Runner, expr: &'a TestExpr) -> BoxFuture<'a, Result<bool>> {
    async move {
        match expr {
            TestExpr::Word(w) => Ok(!expand::literal(r, w).await?.is_empty()),
            TestExpr::Paren(x) => eval(r, x).await,
            TestExpr::Unary {
                op: UnTestOp::Not,
                x,
            } => Ok(!eval(r, x).await?),
            TestExpr::Unary { op, x } => {
                let operand = operand(r, x).await?;
                Ok(unary(r, *op, &operand))
            }
            TestExpr::Binary {
                op: BinTestOp::AndTest,
                x,
                y,
            } => Ok(eval(r, x).await? && eval(r, y).await?),
            TestExpr::Binary {
                op: BinTestOp::OrTest,
                x,
                y,
            } => Ok(eval(r, x).await? || eval(r, y).await?),
            TestExpr::Binary { op, x, y } => {
                let lhs = operand(r, x).await?;
                match op {
                    BinTestOp::Match | BinTestOp::MatchShort | BinTestOp::NoMatch => {
                        let pat = match &**y {
                            TestExpr::Word(w) => expand::pattern(r, w).await?,
                            _ => return Err(invalid_operand()),
                        };
                        let hit = pattern::matches(&pat, &lhs)?;
                        Ok(hit != (*op == BinTestOp::NoMatch))
                    }
                    BinTestOp::RegexMatch => {
                        let re = operand(r, y).await?;
                        regex_match(r, &lhs, &re)
                    }
                    _ => {
                        let rhs = operand(r, y).await?;
                        if let Some(cmp) = int_op(*op) {
                            let a = expand::eval_str(r, &lhs, 0)?;
                            let b = expand::eval_str(r, &rhs, 0)?;
                            return Ok(cmp(a, b));
                        }
                        Ok(binary(r, *op, &lhs, &rhs))
                    }
                }
            }
        }
    }
    .boxed()
}

fn invalid_operand() -> Error {
    Error::InvalidTree("test operand must be a word".into())
}

async fn operand(r: &mut Runner, x: &TestExpr) -> Result<String> {
    match x {
        TestExpr::Word(w) => expand::literal(r, w).await,
        _ => Err(invalid_operand()),
    }
}

/// `=~`: an unanchored extended regex. Captures land in `BASH_REMATCH`.
fn regex_match(r: &mut Runner, s: &str, re: &str) -> Result<bool> {
    let re = regex::Regex::new(re)
        .map_err(|e| Error::Expansion(format!("{re}: invalid regular expression: {e}")))?;
    let Some(caps) = re.captures(s) else {
        r.set("BASH_REMATCH", Variable::indexed(Vec::new()))?;
        return Ok(false);
    };
    let groups = caps
        .iter()
        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect();
    r.set("BASH_REMATCH", Variable::indexed(groups))?;
    Ok(true)
}

/// Integer comparison for `-eq` and friends.
pub(crate) fn int_op(op: BinTestOp) -> Option<fn(i64, i64) -> bool> {
    Some(match op {
        BinTestOp::Eql => |a, b| a == b,
        BinTestOp::Neq => |a, b| a != b,
        BinTestOp::Leq => |a, b| a <= b,
        BinTestOp::Geq => |a, b| a >= b,
        BinTestOp::Lss => |a, b| a < b,
        BinTestOp::Gtr => |a, b| a > b,
        _ => return None,
    })
}

/// String and file operators taking two operands. `=`/`==`/`!=` compare
/// plain strings here; `[[ ]]` handles them as patterns before this.
pub(crate) fn binary(r: &Runner, op: BinTestOp, x: &str, y: &str) -> bool {
    match op {
        BinTestOp::Match | BinTestOp::MatchShort => x == y,
        BinTestOp::NoMatch => x != y,
        BinTestOp::Before => x < y,
        BinTestOp::After => x > y,
        BinTestOp::NewerThan | BinTestOp::OlderThan => {
            let (a, b) = (mtime(&path(r, x)), mtime(&path(r, y)));
            match (a, b, op) {
                (Some(a), Some(b), BinTestOp::NewerThan) => a > b,
                (Some(a), Some(b), _) => a < b,
                (Some(_), None, BinTestOp::NewerThan) => true,
                (None, Some(_), BinTestOp::OlderThan) => true,
                _ => false,
            }
        }
        BinTestOp::DevIno => same_file(&path(r, x), &path(r, y)),
        _ => false,
    }
}

fn path(r: &Runner, s: &str) -> PathBuf {
    r.dir.join(s)
}

fn mtime(p: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(p).and_then(|m| m.modified()).ok()
}

#[cfg(unix)]
fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Operators taking one operand.
pub(crate) fn unary(r: &Runner, op: UnTestOp, s: &str) -> bool {
    match op {
        UnTestOp::EmptyStr => s.is_empty(),
        UnTestOp::NonEmptyStr => !s.is_empty(),
        UnTestOp::OptSet => Opt::set_name(s).is_some_and(|o| r.opts.get(o)),
        UnTestOp::VarSet => r.get(s).is_set(),
        UnTestOp::RefVar => r.get(s).name_ref,
        UnTestOp::FdTerminal => match s.trim().parse::<u32>() {
            Ok(0) => r.stdin().is_process() && std::io::stdin().is_terminal(),
            _ => false,
        },
        UnTestOp::Not => s.is_empty(),
        _ => file_test(&path(r, s), op),
    }
}

fn file_test(p: &std::path::Path, op: UnTestOp) -> bool {
    if matches!(op, UnTestOp::Symlink | UnTestOp::SymlinkH) {
        return std::fs::symlink_metadata(p).is_ok_and(|m| m.file_type().is_symlink());
    }
    let Ok(meta) = std::fs::metadata(p) else {
        return false;
    };
    match op {
        UnTestOp::Exists => true,
        UnTestOp::RegFile => meta.is_file(),
        UnTestOp::Directory => meta.is_dir(),
        UnTestOp::NoEmpty => meta.len() > 0,
        UnTestOp::Readable => access(p, AccessMode::Read),
        UnTestOp::Writable => access(p, AccessMode::Write),
        UnTestOp::Executable => access(p, AccessMode::Exec),
        UnTestOp::Modified => match (meta.modified(), meta.accessed()) {
            (Ok(m), Ok(a)) => m > a,
            _ => false,
        },
        _ => unix_file_test(&meta, op),
    }
}

#[cfg(unix)]
fn unix_file_test(meta: &std::fs::Metadata, op: UnTestOp) -> bool {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};
    let ft = meta.file_type();
    match op {
        UnTestOp::CharSp => ft.is_char_device(),
        UnTestOp::BlockSp => ft.is_block_device(),
        UnTestOp::NamedPipe => ft.is_fifo(),
        UnTestOp::Socket => ft.is_socket(),
        UnTestOp::GidSet => meta.mode() & 0o2000 != 0,
        UnTestOp::UidSet => meta.mode() & 0o4000 != 0,
        UnTestOp::Sticky => meta.mode() & 0o1000 != 0,
        // SAFETY: geteuid and getegid cannot fail.
        UnTestOp::Owner => meta.uid() == unsafe { libc::geteuid() },
        UnTestOp::GroupOwner => meta.gid() == unsafe { libc::getegid() },
        _ => false,
    }
}

#[cfg(not(unix))]
fn unix_file_test(_meta: &std::fs::Metadata, _op: UnTestOp) -> bool {
    false
}

#[derive(Clone, Copy)]
enum AccessMode {
    Read,
    Write,
    Exec,
}

#[cfg(unix)]
fn access(p: &std::path::Path, mode: AccessMode) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = std::ffi::CString::new(p.as_os_str().as_bytes()) else {
        return false;
    };
    let mode = match mode {
        AccessMode::Read => libc::R_OK,
        AccessMode::Write => libc::W_OK,
        AccessMode::Exec => libc::X_OK,
    };
    // SAFETY: c_path is a valid NUL-terminated string.
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

#[cfg(not(unix))]
fn access(p: &std::path::Path, mode: AccessMode) -> bool {
    match mode {
        AccessMode::Write => std::fs::metadata(p).is_ok_and(|m| !m.permissions().readonly()),
        _ => p.exists(),
    }
}

/// Whether `path` names a directory the process may enter.
pub(crate) fn can_enter(p: &std::path::Path) -> bool {
    p.is_dir() && access(p, AccessMode::Exec)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ast::build::*;
    use crate::ast::Word;
    use pretty_assertions::assert_eq;

    fn w(word: Word) -> Box<TestExpr> {
        Box::new(TestExpr::Word(word))
    }

    fn bin(op: BinTestOp, x: Word, y: Word) -> TestExpr {
        TestExpr::Binary {
            op,
            x: w(x),
            y: w(y),
        }
    }

    fn un(op: UnTestOp, x: Word) -> TestExpr {
        TestExpr::Unary { op, x: w(x) }
    }

    async fn check(r: &mut Runner, expr: TestExpr) -> bool {
        eval(r, &expr).await.unwrap()
    }

    #[tokio::test]
    async fn test_pattern_match_and_quoting() {
        let mut r = runner();
        assert!(check(&mut r, bin(BinTestOp::Match, lit("hello"), lit("h*o"))).await);
        assert!(!check(&mut r, bin(BinTestOp::Match, lit("hello"), word(vec![dbl(vec![part_lit("h*o")])]))).await);
        assert!(check(&mut r, bin(BinTestOp::NoMatch, lit("abc"), lit("x*"))).await);
    }

    #[tokio::test]
    async fn test_integer_comparisons_are_arithmetic() {
        let mut r = runner();
        r.set_var("n", "5").unwrap();
        assert!(check(&mut r, bin(BinTestOp::Eql, lit("n"), lit("5"))).await);
        assert!(check(&mut r, bin(BinTestOp::Lss, lit("3"), lit("0x10"))).await);
        assert!(!check(&mut r, bin(BinTestOp::Gtr, lit("-1"), lit("1"))).await);
    }

    #[tokio::test]
    async fn test_regex_sets_rematch() {
        let mut r = runner();
        assert!(check(&mut r, bin(BinTestOp::RegexMatch, lit("key=value"), lit("^([a-z]+)=(.*)$"))).await);
        assert_eq!(r.get("BASH_REMATCH").elements(), vec!["key=value", "key", "value"]);
        assert!(!check(&mut r, bin(BinTestOp::RegexMatch, lit("nope"), lit("^[0-9]+$"))).await);
    }

    #[tokio::test]
    async fn test_invalid_regex_is_error() {
        let mut r = runner();
        let expr = bin(BinTestOp::RegexMatch, lit("x"), lit("("));
        assert!(eval(&mut r, &expr).await.is_err());
    }

    #[tokio::test]
    async fn test_logic_short_circuits() {
        let mut r = runner();
        let expr = TestExpr::Binary {
            op: BinTestOp::OrTest,
            x: Box::new(un(UnTestOp::NonEmptyStr, lit("x"))),
            y: Box::new(bin(BinTestOp::RegexMatch, lit("x"), lit("("))),
        };
        assert!(check(&mut r, expr).await);
        let not = TestExpr::Unary {
            op: UnTestOp::Not,
            x: Box::new(un(UnTestOp::EmptyStr, lit(""))),
        };
        assert!(!check(&mut r, not).await);
    }

    #[tokio::test]
    async fn test_file_operators() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("full"), "data").unwrap();
        std::fs::write(dir.path().join("empty"), "").unwrap();
        let mut r = Runner::builder().dir(dir.path()).capture().build();
        assert!(check(&mut r, un(UnTestOp::RegFile, lit("full"))).await);
        assert!(check(&mut r, un(UnTestOp::NoEmpty, lit("full"))).await);
        assert!(!check(&mut r, un(UnTestOp::NoEmpty, lit("empty"))).await);
        assert!(check(&mut r, un(UnTestOp::Directory, lit("."))).await);
        assert!(!check(&mut r, un(UnTestOp::Exists, lit("missing"))).await);
        assert!(check(&mut r, un(UnTestOp::Readable, lit("full"))).await);
        assert!(check(&mut r, bin(BinTestOp::DevIno, lit("full"), lit("./full"))).await);
    }

    #[tokio::test]
    async fn test_option_and_variable_operators() {
        let mut r = runner();
        r.set_opt(Opt::ErrExit, true);
        r.set_var("defined", "").unwrap();
        assert!(check(&mut r, un(UnTestOp::OptSet, lit("errexit"))).await);
        assert!(!check(&mut r, un(UnTestOp::OptSet, lit("nounset"))).await);
        assert!(check(&mut r, un(UnTestOp::VarSet, lit("defined"))).await);
        assert!(!check(&mut r, un(UnTestOp::VarSet, lit("undefined"))).await);
    }

    #[test]
    fn test_string_ordering() {
        let r = runner();
        assert!(super::binary(&r, BinTestOp::Before, "abc", "abd"));
        assert!(super::binary(&r, BinTestOp::After, "b", "a"));
        assert!(super::binary(&r, BinTestOp::MatchShort, "x*", "x*"));
    }
}
