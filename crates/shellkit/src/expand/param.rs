//! Parameter expansion: `$name` and every `${...}` form

use futures_util::future::{BoxFuture, FutureExt};
use unicode_width::UnicodeWidthStr;

use super::arith::arithm;
use super::pattern::{self, Mode};
use super::{Config, literal};
use crate::ast::{ArithmExpr, NamesOp, ParExpOp, ParamExp, Replace, Slice, Word};
use crate::env::{self, Value, Variable};
use crate::error::{Error, Result};

/// The result of a parameter expansion, before quoting decides how it
/// becomes fields.
#[derive(Debug)]
pub(crate) enum Expanded<'a> {
    Str(String),
    /// `$@`, `${a[@]}` and friends; `star` for the `*` forms
    Elems { items: Vec<String>, star: bool },
    /// A default or alternate word, expanded in place by the caller so its
    /// own quoting is honored
    Word(&'a Word),
}

/// Names the runner answers itself rather than storing as variables.
pub(crate) fn is_special(name: &str) -> bool {
    matches!(name, "@" | "*" | "#" | "?" | "$" | "!" | "-" | "0")
        || (!name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
}

/// What the subscript of `${name[...]}` selects.
enum Subscript {
    All { star: bool },
    One(ArithmExpr),
}

fn subscript(pe: &ParamExp) -> Option<Subscript> {
    let index = pe.index.as_deref()?;
    if let ArithmExpr::Word(w) = index {
        match w.lit() {
            Some("@") => return Some(Subscript::All { star: false }),
            Some("*") => return Some(Subscript::All { star: true }),
            _ => {}
        }
    }
    Some(Subscript::One(index.clone()))
}

pub(crate) fn param_exp<'c, 'p: 'c>(
    cfg: &'c mut dyn Config,
    pe: &'p ParamExp,
) -> BoxFuture<'c, Result<Expanded<'p>>> {
    async move {
        if let Some(op) = pe.names {
            return Ok(Expanded::Elems {
                items: names_with_prefix(cfg, &pe.param),
                star: op == NamesOp::Star,
            });
        }

        let sub = subscript(pe);
        let (mut name, mut vr) = lookup_var(cfg, &pe.param);

        if pe.excl {
            if let Some(Subscript::All { star }) = sub {
                return Ok(Expanded::Elems {
                    items: vr.keys(),
                    star,
                });
            }
            let raw = cfg.get(&pe.param);
            if raw.name_ref {
                return Ok(Expanded::Str(raw.str_value().to_string()));
            }
            let target = vr.str_value().to_string();
            if !env::valid_name(&target) && !is_special(&target) {
                return Err(Error::Expansion(format!("{target}: invalid indirect expansion")));
            }
            (name, vr) = lookup_var(cfg, &target);
        }

        let all_params = matches!(pe.param.as_str(), "@" | "*");
        let (mut value, is_set) = match &sub {
            _ if all_params => {
                let items = vr.elements();
                let set = !items.is_empty();
                (
                    Expanded::Elems {
                        items,
                        star: pe.param == "*",
                    },
                    set,
                )
            }
            Some(Subscript::All { star }) => {
                let items = vr.elements();
                let set = !items.is_empty();
                (Expanded::Elems { items, star: *star }, set)
            }
            Some(Subscript::One(index)) => match element(cfg, &vr, index).await? {
                Some(s) => (Expanded::Str(s), true),
                None => (Expanded::Str(String::new()), false),
            },
            None => (Expanded::Str(vr.str_value().to_string()), vr.is_set()),
        };

        let defaults_op = pe.exp.as_ref().is_some_and(|e| {
            !matches!(
                e.op,
                ParExpOp::RemSmallPrefix
                    | ParExpOp::RemLargePrefix
                    | ParExpOp::RemSmallSuffix
                    | ParExpOp::RemLargeSuffix
                    | ParExpOp::UpperFirst
                    | ParExpOp::UpperAll
                    | ParExpOp::LowerFirst
                    | ParExpOp::LowerAll
            )
        });
        if !is_set && !defaults_op && !all_params && cfg.options().no_unset {
            return Err(Error::UnsetParameter {
                name: pe.param.clone(),
                message: "unbound variable".to_string(),
            });
        }

        if pe.length {
            let n = match &value {
                Expanded::Elems { items, .. } => items.len(),
                Expanded::Str(s) => s.chars().count(),
                Expanded::Word(_) => 0,
            };
            return Ok(Expanded::Str(n.to_string()));
        }
        if pe.width {
            let s = joined(&value);
            return Ok(Expanded::Str(s.width().to_string()));
        }

        if let Some(slice) = &pe.slice {
            if all_params {
                if let Expanded::Elems { items, .. } = &mut value {
                    items.insert(0, cfg.get("0").str_value().to_string());
                }
            }
            value = apply_slice(cfg, value, slice).await?;
        }

        if let Some(repl) = &pe.repl {
            let re = Replacer::new(cfg, repl).await?;
            value = map_each(value, |s| re.apply(s));
        }

        let Some(exp) = &pe.exp else {
            return Ok(value);
        };
        let null = match &value {
            Expanded::Str(s) => s.is_empty(),
            Expanded::Elems { items, .. } => items.iter().all(String::is_empty),
            Expanded::Word(_) => false,
        };
        let use_word = match exp.op {
            ParExpOp::DefaultUnset
            | ParExpOp::AssignUnset
            | ParExpOp::ErrorUnset
            | ParExpOp::AlternateUnset => !is_set,
            ParExpOp::DefaultUnsetOrNull
            | ParExpOp::AssignUnsetOrNull
            | ParExpOp::ErrorUnsetOrNull
            | ParExpOp::AlternateUnsetOrNull => !is_set || null,
            _ => false,
        };

        match exp.op {
            ParExpOp::DefaultUnset | ParExpOp::DefaultUnsetOrNull => Ok(match &exp.word {
                Some(w) if use_word => Expanded::Word(w),
                None if use_word => Expanded::Str(String::new()),
                _ => value,
            }),
            ParExpOp::AlternateUnset | ParExpOp::AlternateUnsetOrNull => Ok(match &exp.word {
                Some(w) if !use_word => Expanded::Word(w),
                _ => Expanded::Str(String::new()),
            }),
            ParExpOp::AssignUnset | ParExpOp::AssignUnsetOrNull => {
                if !use_word {
                    return Ok(value);
                }
                let s = match &exp.word {
                    Some(w) => literal(cfg, w).await?,
                    None => String::new(),
                };
                if is_special(&name) || !env::valid_name(&name) {
                    return Err(Error::Expansion(format!(
                        "${name}: cannot assign in this way"
                    )));
                }
                assign(cfg, &name, vr, sub, s.clone()).await?;
                Ok(Expanded::Str(s))
            }
            ParExpOp::ErrorUnset | ParExpOp::ErrorUnsetOrNull => {
                if !use_word {
                    return Ok(value);
                }
                let message = match &exp.word {
                    Some(w) => literal(cfg, w).await?,
                    None => String::new(),
                };
                let message = if !message.is_empty() {
                    message
                } else if exp.op == ParExpOp::ErrorUnsetOrNull {
                    "parameter null or not set".to_string()
                } else {
                    "parameter not set".to_string()
                };
                Err(Error::UnsetParameter {
                    name: pe.param.clone(),
                    message,
                })
            }
            op @ (ParExpOp::RemSmallPrefix
            | ParExpOp::RemLargePrefix
            | ParExpOp::RemSmallSuffix
            | ParExpOp::RemLargeSuffix) => {
                let pat = match &exp.word {
                    Some(w) => super::pattern(cfg, w).await?,
                    None => String::new(),
                };
                if pat.is_empty() {
                    return Ok(value);
                }
                let re = pattern::compile(&pat, Mode::entire())?;
                Ok(map_each(value, |s| remove_affix(op, &re, s)))
            }
            op => {
                let re = match &exp.word {
                    Some(w) => {
                        let pat = super::pattern(cfg, w).await?;
                        Some(pattern::compile(&pat, Mode::entire())?)
                    }
                    None => None,
                };
                Ok(map_each(value, |s| change_case(op, re.as_ref(), s)))
            }
        }
    }
    .boxed()
}

fn lookup_var(cfg: &dyn Config, name: &str) -> (String, Variable) {
    if is_special(name) {
        (name.to_string(), cfg.get(name))
    } else {
        env::resolve(cfg, name)
    }
}

fn names_with_prefix(cfg: &dyn Config, prefix: &str) -> Vec<String> {
    let mut names = std::collections::BTreeSet::new();
    cfg.each(&mut |name, vr| {
        if name.starts_with(prefix) {
            if vr.is_declared() {
                names.insert(name.to_string());
            } else {
                names.remove(name);
            }
        }
        true
    });
    names.into_iter().collect()
}

async fn element(cfg: &mut dyn Config, vr: &Variable, index: &ArithmExpr) -> Result<Option<String>> {
    if let Value::Associative(map) = &vr.value {
        let key = match index {
            ArithmExpr::Word(w) => literal(cfg, w).await?,
            other => arithm(cfg, other).await?.to_string(),
        };
        return Ok(map.get(&key).cloned());
    }
    let i = arithm(cfg, index).await?;
    Ok(vr.element(i).map(str::to_string))
}

async fn assign(
    cfg: &mut dyn Config,
    name: &str,
    current: Variable,
    sub: Option<Subscript>,
    value: String,
) -> Result<()> {
    let mut vr = if current.is_declared() {
        current
    } else {
        Variable::default()
    };
    match sub {
        Some(Subscript::One(index)) => {
            if matches!(vr.value, Value::Associative(_)) {
                let key = match &index {
                    ArithmExpr::Word(w) => literal(cfg, w).await?,
                    other => arithm(cfg, other).await?.to_string(),
                };
                vr.set_key(key, value);
            } else {
                let i = arithm(cfg, &index).await?;
                vr.set_element(i, value)?;
            }
        }
        _ => vr.set_scalar(value),
    }
    cfg.set(name, vr)
}

fn joined(value: &Expanded<'_>) -> String {
    match value {
        Expanded::Str(s) => s.clone(),
        Expanded::Elems { items, .. } => items.join(" "),
        Expanded::Word(_) => String::new(),
    }
}

fn map_each<'a>(value: Expanded<'a>, f: impl Fn(&str) -> String) -> Expanded<'a> {
    match value {
        Expanded::Str(s) => Expanded::Str(f(&s)),
        Expanded::Elems { items, star } => Expanded::Elems {
            items: items.iter().map(|s| f(s)).collect(),
            star,
        },
        other => other,
    }
}

/// `${v:offset:length}` over characters, or over elements for arrays.
async fn apply_slice<'a>(
    cfg: &mut dyn Config,
    value: Expanded<'a>,
    slice: &Slice,
) -> Result<Expanded<'a>> {
    let offset = arithm(cfg, &slice.offset).await?;
    let length = match &slice.length {
        Some(l) => Some(arithm(cfg, l).await?),
        None => None,
    };
    Ok(match value {
        Expanded::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), offset, length)?;
            Expanded::Str(chars[start..end].iter().collect())
        }
        Expanded::Elems { items, star } => {
            let (start, end) = slice_bounds(items.len(), offset, length)?;
            Expanded::Elems {
                items: items[start..end].to_vec(),
                star,
            }
        }
        other => other,
    })
}

/// Negative offsets count from the end and clamp at zero; lengths clamp to
/// what remains, and a negative length stops that far before the end.
fn slice_bounds(total: usize, offset: i64, length: Option<i64>) -> Result<(usize, usize)> {
    let total_i = i64::try_from(total).unwrap_or(i64::MAX);
    let start = if offset < 0 {
        (total_i + offset).max(0)
    } else {
        offset.min(total_i)
    };
    let end = match length {
        None => total_i,
        Some(l) if l < 0 => {
            let end = total_i + l;
            if end < start {
                return Err(Error::Expansion(format!("{l}: substring expression < 0")));
            }
            end
        }
        Some(l) => start.saturating_add(l).min(total_i),
    };
    Ok((start as usize, end as usize))
}

/// `${v/pat/repl}` and its anchored and global forms
struct Replacer {
    re: Option<regex::Regex>,
    anchor: Option<char>,
    all: bool,
    with: String,
}

impl Replacer {
    async fn new(cfg: &mut dyn Config, repl: &Replace) -> Result<Self> {
        let mut pat = super::pattern(cfg, &repl.orig).await?;
        let anchor = match pat.chars().next() {
            Some(c @ ('#' | '%')) => {
                pat.remove(0);
                Some(c)
            }
            _ => None,
        };
        let with = match &repl.with {
            Some(w) => literal(cfg, w).await?,
            None => String::new(),
        };
        let re = if pat.is_empty() && anchor.is_none() {
            None
        } else if anchor.is_some() {
            Some(pattern::compile(&pat, Mode::entire())?)
        } else {
            Some(pattern::compile(&pat, Mode::default())?)
        };
        Ok(Self {
            re,
            anchor,
            all: repl.all,
            with,
        })
    }

    fn apply(&self, s: &str) -> String {
        let Some(re) = &self.re else {
            return s.to_string();
        };
        match self.anchor {
            Some('#') => {
                for end in boundaries(s).rev() {
                    if re.is_match(&s[..end]) {
                        return format!("{}{}", self.with, &s[end..]);
                    }
                }
                s.to_string()
            }
            Some(_) => {
                for start in boundaries(s) {
                    if re.is_match(&s[start..]) {
                        return format!("{}{}", &s[..start], self.with);
                    }
                }
                s.to_string()
            }
            None => {
                let limit = if self.all { 0 } else { 1 };
                let mut out = String::with_capacity(s.len());
                let mut last = 0;
                let mut count = 0;
                for m in re.find_iter(s) {
                    if m.as_str().is_empty() {
                        continue;
                    }
                    out.push_str(&s[last..m.start()]);
                    out.push_str(&self.with);
                    last = m.end();
                    count += 1;
                    if count == limit {
                        break;
                    }
                }
                out.push_str(&s[last..]);
                out
            }
        }
    }
}

/// Byte offsets of every char boundary, including both ends.
fn boundaries(s: &str) -> impl DoubleEndedIterator<Item = usize> + '_ {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
}

fn remove_affix(op: ParExpOp, re: &regex::Regex, s: &str) -> String {
    let cuts: Vec<usize> = boundaries(s).collect();
    match op {
        ParExpOp::RemSmallPrefix => cuts.iter().find(|&&i| re.is_match(&s[..i])).map(|&i| s[i..].to_string()),
        ParExpOp::RemLargePrefix => cuts
            .iter()
            .rev()
            .find(|&&i| re.is_match(&s[..i]))
            .map(|&i| s[i..].to_string()),
        ParExpOp::RemSmallSuffix => cuts
            .iter()
            .rev()
            .find(|&&i| re.is_match(&s[i..]))
            .map(|&i| s[..i].to_string()),
        _ => cuts.iter().find(|&&i| re.is_match(&s[i..])).map(|&i| s[..i].to_string()),
    }
    .unwrap_or_else(|| s.to_string())
}

fn change_case(op: ParExpOp, re: Option<&regex::Regex>, s: &str) -> String {
    let upper = matches!(op, ParExpOp::UpperFirst | ParExpOp::UpperAll);
    let all = matches!(op, ParExpOp::UpperAll | ParExpOp::LowerAll);
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        let mut buf = [0u8; 4];
        let eligible = (all || i == 0) && re.is_none_or(|re| re.is_match(c.encode_utf8(&mut buf)));
        if !eligible {
            out.push(c);
        } else if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
