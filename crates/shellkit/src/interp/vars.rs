//! Variable access for the runner: special parameters, assignments and the
//! expansion host

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::Runner;
use super::state::Opt;
use crate::ast::{ArithmExpr, ArrayElem, Assign, ProcSubstOp, Stmt};
use crate::env::{self, Environ, Value, Variable, WriteEnviron};
use crate::error::{Error, Result};
use crate::expand::{self, Config, Options};
use crate::logging::log_trace;

impl Runner {
    /// Parameters computed on every lookup.
    fn special(&self, name: &str) -> Option<Variable> {
        let value = match name {
            "?" => self.status.to_string(),
            "#" => self.params.len().to_string(),
            "@" | "*" => return Some(Variable::indexed(self.params.clone())),
            "0" => self.name.clone(),
            "$" => std::process::id().to_string(),
            "!" => match self.jobs.last_job_id() {
                Some(id) => id.to_string(),
                None => return Some(Variable::default()),
            },
            "-" => self.opts.flags(),
            "RANDOM" => self.next_random().to_string(),
            "SECONDS" => self.started.elapsed().as_secs().to_string(),
            "LINENO" => "0".to_string(),
            "DIRSTACK" => {
                let mut dirs = vec![self.dir.to_string_lossy().into_owned()];
                dirs.extend(
                    self.dir_stack
                        .iter()
                        .rev()
                        .map(|d| d.to_string_lossy().into_owned()),
                );
                return Some(Variable::indexed(dirs));
            }
            _ if name.bytes().all(|b| b.is_ascii_digit()) => {
                let n: usize = name.parse().ok()?;
                return Some(match n.checked_sub(1).and_then(|i| self.params.get(i)) {
                    Some(p) => Variable::string(p.clone()),
                    None => Variable::default(),
                });
            }
            _ => return None,
        };
        Some(Variable::string(value))
    }

    /// Assign a string to `name` the way `name=value` does: namerefs are
    /// followed, attributes kept and applied.
    pub fn set_var(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.assign_scalar(name, value.into(), false)
    }

    pub(crate) fn assign_scalar(&mut self, name: &str, value: String, append: bool) -> Result<()> {
        let (name, old) = env::resolve(&*self, name);
        if old.read_only {
            return Err(Error::ReadOnly(name));
        }
        let mut vr = old.clone();
        let value = self.scalar_value(&old, old.str_value(), value, append)?;
        vr.set_scalar(value);
        log_trace!(assign = %self.log_config.assignment(&name, vr.str_value()), "set variable");
        self.set(&name, vr)
    }

    /// Apply `declare -i`, `-l` and `-u` to an assigned value. `current` is
    /// what `+=` appends to.
    pub(crate) fn scalar_value(&self, attrs: &Variable, current: &str, value: String, append: bool) -> Result<String> {
        if attrs.integer {
            let mut n = expand::eval_str(self, &value, 0)?;
            if append {
                n = n.wrapping_add(expand::eval_str(self, current, 0)?);
            }
            return Ok(n.to_string());
        }
        let value = if append {
            format!("{current}{value}")
        } else {
            value
        };
        Ok(if attrs.lower {
            value.to_lowercase()
        } else if attrs.upper {
            value.to_uppercase()
        } else {
            value
        })
    }

    /// Run one assignment.
    pub(crate) async fn assign(&mut self, a: &Assign) -> Result<()> {
        let (name, vr) = self.assigned(a).await?;
        log_trace!(assign = %self.log_config.assignment(&name, vr.str_value()), "set variable");
        self.set(&name, vr)
    }

    /// The variable an assignment produces and the name it lands on, without
    /// storing it.
    pub(crate) async fn assigned(&mut self, a: &Assign) -> Result<(String, Variable)> {
        if !env::valid_name(&a.name) {
            return Err(Error::InvalidName(a.name.clone()));
        }
        let (name, old) = env::resolve(&*self, &a.name);
        if old.read_only {
            return Err(Error::ReadOnly(name));
        }
        let mut vr = old.clone();

        if let Some(elems) = &a.array {
            self.assign_array(&name, &mut vr, elems, a.append).await?;
            return Ok((name, vr));
        }

        let value = match &a.value {
            Some(w) => expand::literal(self, w).await?,
            None => String::new(),
        };
        match &a.index {
            Some(index) if matches!(vr.value, Value::Associative(_)) => {
                let key = self.subscript_key(index).await?;
                let current = match &vr.value {
                    Value::Associative(map) => map.get(&key).cloned().unwrap_or_default(),
                    _ => String::new(),
                };
                let value = self.scalar_value(&old, &current, value, a.append)?;
                vr.set_key(key, value);
            }
            Some(index) => {
                let i = expand::arithm(self, index).await?;
                let current = vr.element(i).unwrap_or_default().to_string();
                let value = self.scalar_value(&old, &current, value, a.append)?;
                vr.set_element(i, value)?;
            }
            None => {
                let value = self.scalar_value(&old, old.str_value(), value, a.append)?;
                vr.set_scalar(value);
            }
        }
        Ok((name, vr))
    }

    async fn assign_array(
        &mut self,
        name: &str,
        vr: &mut Variable,
        elems: &[ArrayElem],
        append: bool,
    ) -> Result<()> {
        if let Value::Associative(current) = &vr.value {
            let mut map = if append { current.clone() } else { BTreeMap::new() };
            for elem in elems {
                let Some(index) = &elem.index else {
                    return Err(Error::Expansion(format!(
                        "{name}: must use subscript when assigning associative array"
                    )));
                };
                let key = self.subscript_key(index).await?;
                let value = expand::literal(self, &elem.value).await?;
                map.insert(key, value);
            }
            vr.value = Value::Associative(map);
            return Ok(());
        }

        let start = if append { vr.elements() } else { Vec::new() };
        let mut next = start.len() as i64;
        let mut items = Variable::indexed(start);
        for elem in elems {
            match &elem.index {
                Some(index) => {
                    let i = expand::arithm(self, index).await?;
                    let value = expand::literal(self, &elem.value).await?;
                    items.set_element(i, value)?;
                    next = i + 1;
                }
                None => {
                    for value in expand::fields(self, std::slice::from_ref(&elem.value)).await? {
                        items.set_element(next, value)?;
                        next += 1;
                    }
                }
            }
        }
        vr.value = items.value;
        Ok(())
    }

    /// Key of an associative array element: the subscript's text, not its
    /// arithmetic value.
    pub(crate) async fn subscript_key(&mut self, index: &ArithmExpr) -> Result<String> {
        match index {
            ArithmExpr::Word(w) => expand::literal(self, w).await,
            other => Ok(expand::arithm(self, other).await?.to_string()),
        }
    }
}

impl Environ for Runner {
    fn get(&self, name: &str) -> Variable {
        if let Some(vr) = self.special(name) {
            return vr;
        }
        self.vars.get(name)
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) {
        self.vars.each(visit)
    }
}

impl WriteEnviron for Runner {
    fn set(&mut self, name: &str, mut vr: Variable) -> Result<()> {
        if name == "RANDOM" {
            let seed = vr.str_value().trim().parse::<i64>().unwrap_or(0);
            self.seed_random(seed as u32);
            return Ok(());
        }
        if self.opts.get(Opt::AllExport) && vr.is_set() {
            vr.exported = true;
        }
        self.vars.set(name, vr)
    }
}

#[async_trait]
impl Config for Runner {
    fn options(&self) -> Options {
        Options {
            no_glob: self.opts.get(Opt::NoGlob),
            glob_star: self.opts.get(Opt::GlobStar),
            null_glob: self.opts.get(Opt::NullGlob),
            dot_glob: self.opts.get(Opt::DotGlob),
            no_case_glob: self.opts.get(Opt::NoCaseGlob),
            no_unset: self.opts.get(Opt::NoUnset),
        }
    }

    fn dir(&self) -> PathBuf {
        self.dir.clone()
    }

    async fn cmd_subst(&mut self, stmts: &[Stmt]) -> Result<String> {
        self.command_subst(stmts).await
    }

    async fn proc_subst(&mut self, op: ProcSubstOp, stmts: &[Stmt]) -> Result<String> {
        self.process_subst(op, stmts).await
    }
}
