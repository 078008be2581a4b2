//! Command lookup builtins: type, command, builtin, exec

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::hooks::look_path;
use crate::interp::{ExecResult, Lookup, Runner};

const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "in", "do", "done", "while", "until", "case",
    "esac", "function", "select", "time", "!", "{", "}", "[[", "]]", "coproc",
];

/// What a command name resolves to.
enum Kind {
    Alias(String),
    Keyword,
    Function,
    Builtin,
    File(String),
}

/// Resolve `name` the way the runner would. Aliases only count while
/// `expand_aliases` is on.
fn classify(runner: &Runner, name: &str, functions: bool) -> Option<Kind> {
    if functions && runner.opt(crate::interp::Opt::ExpandAliases) {
        if let Some(value) = runner.aliases.get(name) {
            return Some(Kind::Alias(value.clone()));
        }
    }
    if KEYWORDS.contains(&name) {
        return Some(Kind::Keyword);
    }
    if functions && runner.funcs.contains_key(name) {
        return Some(Kind::Function);
    }
    if runner.is_builtin(name) {
        return Some(Kind::Builtin);
    }
    look_path(&runner.handler_context(), name)
        .ok()
        .map(|p| Kind::File(p.to_string_lossy().into_owned()))
}

fn verbose(name: &str, kind: &Kind) -> String {
    match kind {
        Kind::Alias(value) => format!("{name} is aliased to `{value}'\n"),
        Kind::Keyword => format!("{name} is a shell keyword\n"),
        Kind::Function => format!("{name} is a function\n"),
        Kind::Builtin => format!("{name} is a shell builtin\n"),
        Kind::File(path) => format!("{name} is {path}\n"),
    }
}

fn terse(kind: &Kind) -> &'static str {
    match kind {
        Kind::Alias(_) => "alias",
        Kind::Keyword => "keyword",
        Kind::Function => "function",
        Kind::Builtin => "builtin",
        Kind::File(_) => "file",
    }
}

/// The type builtin - describe how names would be run.
///
/// Usage: type [-t] [-p] NAME...
///
/// -t: print one word (alias, keyword, function, builtin or file)
/// -p: print only the path of names that resolve to a file
pub struct Type;

#[async_trait]
impl Builtin for Type {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut short = false;
        let mut path_only = false;
        let mut names = ctx.args;
        while let Some(flags) = names.first().and_then(|a| a.strip_prefix('-')).filter(|f| !f.is_empty()) {
            for flag in flags.chars() {
                match flag {
                    't' => short = true,
                    'p' | 'P' => path_only = true,
                    other => return Ok(ctx.failure(format!("-{other}: invalid option"), 2)),
                }
            }
            names = &names[1..];
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut status = 0;
        for name in names {
            match classify(ctx.runner, name, true) {
                Some(Kind::File(path)) if path_only => stdout.push_str(&format!("{path}\n")),
                Some(_) if path_only => {}
                Some(kind) if short => stdout.push_str(&format!("{}\n", terse(&kind))),
                Some(kind) => stdout.push_str(&verbose(name, &kind)),
                None => {
                    if !short && !path_only {
                        stderr.push_str(&format!(
                            "{}: type: {name}: not found\n",
                            ctx.runner.shell_name()
                        ));
                    }
                    status = 1;
                }
            }
        }
        Ok(ExecResult {
            stdout,
            stderr,
            ..ExecResult::status(status)
        })
    }
}

/// The command builtin - run a command skipping functions, or describe it.
///
/// Usage: command [-v | -V] NAME [ARG...]
pub struct Command;

#[async_trait]
impl Builtin for Command {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut describe: Option<bool> = None;
        let mut args = ctx.args;
        while let Some(flags) = args.first().and_then(|a| a.strip_prefix('-')).filter(|f| !f.is_empty()) {
            if flags == "-" {
                args = &args[1..];
                break;
            }
            for flag in flags.chars() {
                match flag {
                    'v' => describe = Some(false),
                    'V' => describe = Some(true),
                    'p' => {}
                    other => return Ok(ctx.failure(format!("-{other}: invalid option"), 2)),
                }
            }
            args = &args[1..];
        }

        let Some(long) = describe else {
            let flow = ctx.runner.dispatch(args.to_vec(), Lookup::NoFunctions).await?;
            return Ok(ExecResult::flow(ctx.runner.status(), flow));
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut status = 0;
        for name in args {
            match classify(ctx.runner, name, true) {
                Some(kind) if long => stdout.push_str(&verbose(name, &kind)),
                Some(Kind::Alias(value)) => {
                    stdout.push_str(&format!("alias {name}='{}'\n", value.replace('\'', r"'\''")))
                }
                Some(Kind::File(path)) => stdout.push_str(&format!("{path}\n")),
                Some(_) => stdout.push_str(&format!("{name}\n")),
                None => {
                    if long {
                        stderr.push_str(&format!(
                            "{}: command: {name}: not found\n",
                            ctx.runner.shell_name()
                        ));
                    }
                    status = 1;
                }
            }
        }
        Ok(ExecResult {
            stdout,
            stderr,
            ..ExecResult::status(status)
        })
    }
}

/// The builtin builtin - run a builtin even when a function shadows it.
pub struct BuiltinCmd;

#[async_trait]
impl Builtin for BuiltinCmd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            return Ok(ExecResult::status(0));
        }
        let flow = ctx.runner.dispatch(ctx.args.to_vec(), Lookup::BuiltinOnly).await?;
        Ok(ExecResult::flow(ctx.runner.status(), flow))
    }
}

/// The exec builtin.
///
/// Without a command, the redirections of the current statement stay in
/// place for the rest of the run. With one, the command runs and the shell
/// exits with its status.
pub struct Exec;

#[async_trait]
impl Builtin for Exec {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let args = match ctx.args.first().map(String::as_str) {
            Some("--") => &ctx.args[1..],
            _ => ctx.args,
        };
        if args.is_empty() {
            ctx.runner.keep_redirs = true;
            return Ok(ExecResult::status(0));
        }
        let flow = ctx.runner.dispatch(args.to_vec(), Lookup::NoFunctions).await?;
        let status = match flow {
            crate::interp::Flow::Exit(code) => code,
            _ => ctx.runner.status(),
        };
        Ok(ExecResult::flow(status, crate::interp::Flow::Exit(status)))
    }
}
