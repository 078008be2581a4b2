//! Word expansion
//!
//! Turns syntax-tree words into strings. The entry points differ in which
//! steps run:
//!
//! | Function     | Tilde | Braces | Splitting | Globbing | Used for                  |
//! |--------------|-------|--------|-----------|----------|---------------------------|
//! | [`literal`]  | yes   | no     | no        | no       | assignments, redirections |
//! | [`document`] | no    | no     | no        | no       | heredoc bodies            |
//! | [`pattern`]  | yes   | no     | no        | no       | `case`, `[[ == ]]`, `${v#pat}` |
//! | [`fields`]   | yes   | yes    | yes       | yes      | command arguments         |
//!
//! Everything the expansion needs from its host (variables, options, command
//! substitution, directory listing) comes through [`Config`].

mod arith;
mod brace;
mod fields;
mod format;
mod glob;
mod param;
pub mod pattern;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};

use crate::ast::{ProcSubstOp, Stmt, Word, WordPart};
use crate::env::WriteEnviron;
use crate::error::{Error, Result};
use fields::{DEFAULT_IFS, FieldBuilder, FieldPart, Quote};
use param::Expanded;

pub use arith::{arithm, parse_number};
pub use format::{ansi_c, expand_escapes, format, shell_quote};
pub(crate) use arith::eval_str;

/// Shell options that change how words expand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// `set -f`: no pathname expansion
    pub no_glob: bool,
    /// `**` matches across directories
    pub glob_star: bool,
    /// Patterns without matches expand to nothing
    pub null_glob: bool,
    /// Patterns match hidden files
    pub dot_glob: bool,
    /// Case-insensitive pathname expansion
    pub no_case_glob: bool,
    /// `set -u`: expanding an unset parameter is an error
    pub no_unset: bool,
}

/// A directory entry as seen by pathname expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Directory, following symlinks
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// The host side of expansion.
///
/// Variable access comes from the [`WriteEnviron`] supertrait. The defaults
/// read the real filesystem and reject substitutions.
#[async_trait]
pub trait Config: WriteEnviron {
    fn options(&self) -> Options {
        Options::default()
    }

    /// Directory relative patterns are matched in.
    fn dir(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
    }

    /// Run `$(...)` and return its output with trailing newlines removed.
    async fn cmd_subst(&mut self, _stmts: &[Stmt]) -> Result<String> {
        Err(Error::Expansion(
            "command substitution is not supported".into(),
        ))
    }

    /// Start `<(...)` or `>(...)` and return the path that stands for it.
    async fn proc_subst(&mut self, _op: ProcSubstOp, _stmts: &[Stmt]) -> Result<String> {
        Err(Error::Expansion(
            "process substitution is not supported".into(),
        ))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let is_symlink = file_type.is_symlink();
            let is_dir = if is_symlink {
                std::fs::metadata(entry.path()).is_ok_and(|m| m.is_dir())
            } else {
                file_type.is_dir()
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
                is_symlink,
            });
        }
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }
}

/// Expand a word to one string without splitting or globbing.
pub async fn literal(cfg: &mut dyn Config, word: &Word) -> Result<String> {
    let mut fb = FieldBuilder::new(false, ifs(cfg));
    expand_into(cfg, &word.parts, Ctx::word(), &mut fb).await?;
    Ok(fb.finish_joined())
}

/// Expand a heredoc body: only what is legal inside double quotes.
pub async fn document(cfg: &mut dyn Config, word: &Word) -> Result<String> {
    let mut fb = FieldBuilder::new(false, ifs(cfg));
    let ctx = Ctx {
        quoted: true,
        tilde: false,
        split_lits: false,
    };
    expand_into(cfg, &word.parts, ctx, &mut fb).await?;
    Ok(fb.finish_joined())
}

/// Expand a word into a shell pattern: quoted text is escaped so that it
/// only matches itself.
pub async fn pattern(cfg: &mut dyn Config, word: &Word) -> Result<String> {
    let mut fb = FieldBuilder::new(false, ifs(cfg));
    expand_into(cfg, &word.parts, Ctx::word(), &mut fb).await?;
    let mut out = String::new();
    for field in fb.finish() {
        for part in field {
            match part.quote {
                Quote::None => out.push_str(&part.val),
                _ => out.push_str(&pattern::quote_meta(&part.val)),
            }
        }
    }
    Ok(out)
}

/// Expand command arguments: braces, expansions, field splitting and
/// pathname expansion.
pub async fn fields(cfg: &mut dyn Config, words: &[Word]) -> Result<Vec<String>> {
    let opts = cfg.options();
    let ifs = ifs(cfg);
    let mut out = Vec::new();
    for word in words {
        for word in brace::expand(word) {
            let mut fb = FieldBuilder::new(true, ifs.clone());
            expand_into(cfg, &word.parts, Ctx::word(), &mut fb).await?;
            for field in fb.finish() {
                glob_field(cfg, field, &opts, &mut out)?;
            }
        }
    }
    Ok(out)
}

/// Split a string on the current IFS, as `read` does.
pub fn split_ifs(cfg: &dyn Config, s: &str) -> Vec<String> {
    fields::split(s, &ifs(cfg))
}

fn ifs(cfg: &dyn Config) -> String {
    let vr = cfg.get("IFS");
    if vr.is_set() {
        vr.str_value().to_string()
    } else {
        DEFAULT_IFS.to_string()
    }
}

fn glob_field(
    cfg: &dyn Config,
    field: Vec<FieldPart>,
    opts: &Options,
    out: &mut Vec<String>,
) -> Result<()> {
    let plain: String = field.iter().map(|p| p.val.as_str()).collect();
    if opts.no_glob {
        out.push(plain);
        return Ok(());
    }
    let mut pat = String::new();
    let mut has_glob = false;
    for part in &field {
        if part.quote == Quote::None {
            has_glob |= pattern::has_meta(&part.val);
            pat.push_str(&part.val);
        } else {
            pat.push_str(&pattern::quote_meta(&part.val));
        }
    }
    if !has_glob {
        out.push(plain);
        return Ok(());
    }
    let matches = glob::glob(cfg, &pat, opts)?;
    if !matches.is_empty() {
        out.extend(matches);
    } else if !opts.null_glob {
        out.push(plain);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Ctx {
    /// Inside double quotes
    quoted: bool,
    /// A leading `~` may expand
    tilde: bool,
    /// Literal text is subject to splitting, as in `${v-a b}`
    split_lits: bool,
}

impl Ctx {
    fn word() -> Self {
        Self {
            quoted: false,
            tilde: true,
            split_lits: false,
        }
    }
}

fn expand_into<'a>(
    cfg: &'a mut dyn Config,
    parts: &'a [WordPart],
    ctx: Ctx,
    fb: &'a mut FieldBuilder,
) -> BoxFuture<'a, Result<()>> {
    async move {
        for (i, part) in parts.iter().enumerate() {
            match part {
                WordPart::Lit(s) => {
                    let mut s = s.as_str();
                    if ctx.quoted {
                        fb.push(unescape_double(s), Quote::Double);
                        continue;
                    }
                    if ctx.tilde && i == 0 {
                        let is_last = parts.len() == 1;
                        if let Some((home, rest)) = tilde(cfg, s, is_last) {
                            fb.push(home, Quote::Single);
                            s = rest;
                        }
                    }
                    push_unquoted(s, ctx.split_lits, fb);
                }
                WordPart::SglQuoted { dollar, value } => {
                    let value = if *dollar {
                        ansi_c(value)
                    } else {
                        value.clone()
                    };
                    fb.push(value, Quote::Single);
                }
                WordPart::DblQuoted(inner) => {
                    if inner.is_empty() {
                        fb.push("", Quote::Double);
                        continue;
                    }
                    let inner_ctx = Ctx {
                        quoted: true,
                        tilde: false,
                        split_lits: false,
                    };
                    expand_into(&mut *cfg, inner, inner_ctx, &mut *fb).await?;
                }
                WordPart::Param(pe) => match param::param_exp(&mut *cfg, pe).await? {
                    Expanded::Str(s) if ctx.quoted => fb.push(s, Quote::Double),
                    Expanded::Str(s) => fb.push_split(&s),
                    Expanded::Elems { items, star } => fb.push_elems(items, ctx.quoted, star),
                    Expanded::Word(w) => {
                        if ctx.quoted {
                            fb.push("", Quote::Double);
                        }
                        let word_ctx = Ctx {
                            quoted: ctx.quoted,
                            tilde: false,
                            split_lits: !ctx.quoted,
                        };
                        expand_into(&mut *cfg, &w.parts, word_ctx, &mut *fb).await?;
                    }
                },
                WordPart::CmdSubst(stmts) => {
                    let out = cfg.cmd_subst(stmts).await?;
                    if ctx.quoted {
                        fb.push(out, Quote::Double);
                    } else {
                        fb.push_split(&out);
                    }
                }
                WordPart::ArithmExp(expr) => {
                    let n = arithm(&mut *cfg, expr).await?;
                    if ctx.quoted {
                        fb.push(n.to_string(), Quote::Double);
                    } else {
                        fb.push_split(&n.to_string());
                    }
                }
                WordPart::ProcSubst { op, stmts } => {
                    let path = cfg.proc_subst(*op, stmts).await?;
                    fb.push(path, Quote::Single);
                }
            }
        }
        Ok(())
    }
    .boxed()
}

/// Unquoted literal text: backslash escapes become quoted single
/// characters and an escaped newline disappears.
fn push_unquoted(s: &str, split: bool, fb: &mut FieldBuilder) {
    let mut text = String::new();
    let flush = |text: &mut String, fb: &mut FieldBuilder| {
        if text.is_empty() {
            return;
        }
        let text = std::mem::take(text);
        if split {
            fb.push_split(&text);
        } else {
            fb.push(text, Quote::None);
        }
    };
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('\n') => {}
            Some(next) => {
                flush(&mut text, fb);
                fb.push(next.to_string(), Quote::Single);
            }
            None => text.push('\\'),
        }
    }
    flush(&mut text, fb);
}

/// Inside double quotes a backslash only escapes `$`, `` ` ``, `"`, `\` and
/// newline.
fn unescape_double(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\n') => {
                    chars.next();
                    continue;
                }
                Some(&next @ ('$' | '`' | '"' | '\\')) => {
                    chars.next();
                    out.push(next);
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

/// Expand a leading `~`, `~+` or `~-`. The tilde prefix runs to the first
/// `/`; without one it must be the whole word.
fn tilde<'s>(cfg: &dyn Config, s: &'s str, is_last: bool) -> Option<(String, &'s str)> {
    let rest = s.strip_prefix('~')?;
    let (prefix, tail) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None if is_last => (rest, ""),
        None => return None,
    };
    let vr = match prefix {
        "" => cfg.get("HOME"),
        "+" => cfg.get("PWD"),
        "-" => cfg.get("OLDPWD"),
        _ => return None,
    };
    vr.is_set().then(|| (vr.str_value().to_string(), tail))
}
