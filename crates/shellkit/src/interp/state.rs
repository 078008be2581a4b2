//! Runner state types

use std::collections::HashMap;

use crate::env::{Environ, Overlay, Variable, WriteEnviron};
use crate::error::{Error, Result};

/// How a command finished, beyond its exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    /// Carry on with the next statement
    #[default]
    Normal,
    /// Leave this many enclosing loops
    Break(usize),
    /// Leave this many enclosing loops minus one, then start the next
    /// iteration of the outermost one left
    Continue(usize),
    /// Leave the current function or sourced file
    Return(i32),
    /// Leave the shell
    Exit(i32),
}

impl Flow {
    pub fn is_normal(self) -> bool {
        self == Flow::Normal
    }
}

/// Result of running a script or a builtin.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code
    pub exit_code: i32,
    /// Control flow requested by a builtin
    pub flow: Flow,
}

impl ExecResult {
    /// Create a successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Create a failed result with the given stderr.
    pub fn err(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Default::default()
        }
    }

    /// A result carrying only a status.
    pub fn status(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    /// A result that also changes control flow.
    pub fn flow(exit_code: i32, flow: Flow) -> Self {
        Self {
            exit_code,
            flow,
            ..Default::default()
        }
    }

    /// Check if the result indicates success.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Shell options, from `set` and `shopt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opt {
    AllExport,
    ErrExit,
    NoExec,
    NoGlob,
    NoUnset,
    XTrace,
    PipeFail,
    ExpandAliases,
    GlobStar,
    NullGlob,
    DotGlob,
    NoCaseGlob,
    ExtGlob,
}

/// `(option, long name, set flag)`; options without a flag belong to
/// `shopt`, except `pipefail`.
const OPTIONS: &[(Opt, &str, Option<char>)] = &[
    (Opt::AllExport, "allexport", Some('a')),
    (Opt::ErrExit, "errexit", Some('e')),
    (Opt::NoExec, "noexec", Some('n')),
    (Opt::NoGlob, "noglob", Some('f')),
    (Opt::NoUnset, "nounset", Some('u')),
    (Opt::XTrace, "xtrace", Some('x')),
    (Opt::PipeFail, "pipefail", None),
    (Opt::ExpandAliases, "expand_aliases", None),
    (Opt::GlobStar, "globstar", None),
    (Opt::NullGlob, "nullglob", None),
    (Opt::DotGlob, "dotglob", None),
    (Opt::NoCaseGlob, "nocaseglob", None),
    (Opt::ExtGlob, "extglob", None),
];

impl Opt {
    /// Options settable with `set -o`.
    pub fn set_options() -> impl Iterator<Item = (Opt, &'static str)> {
        OPTIONS
            .iter()
            .filter(|(opt, _, flag)| flag.is_some() || *opt == Opt::PipeFail)
            .map(|(opt, name, _)| (*opt, *name))
    }

    /// Options settable with `shopt`.
    pub fn shopt_options() -> impl Iterator<Item = (Opt, &'static str)> {
        OPTIONS
            .iter()
            .filter(|(opt, _, flag)| flag.is_none() && *opt != Opt::PipeFail)
            .map(|(opt, name, _)| (*opt, *name))
    }

    pub fn from_flag(c: char) -> Option<Opt> {
        OPTIONS
            .iter()
            .find(|(_, _, flag)| *flag == Some(c))
            .map(|(opt, _, _)| *opt)
    }

    pub fn flag(self) -> Option<char> {
        OPTIONS
            .iter()
            .find(|(opt, _, _)| *opt == self)
            .and_then(|(_, _, flag)| *flag)
    }

    pub fn set_name(name: &str) -> Option<Opt> {
        Self::set_options().find(|(_, n)| *n == name).map(|(o, _)| o)
    }

    pub fn shopt_name(name: &str) -> Option<Opt> {
        Self::shopt_options().find(|(_, n)| *n == name).map(|(o, _)| o)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// The fixed set of option switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionSet([bool; OPTIONS.len()]);

impl OptionSet {
    pub fn get(&self, opt: Opt) -> bool {
        self.0[opt.index()]
    }

    pub fn set(&mut self, opt: Opt, on: bool) {
        self.0[opt.index()] = on;
    }

    /// `$-`: the flags of the enabled `set` options.
    pub fn flags(&self) -> String {
        OPTIONS
            .iter()
            .filter(|(opt, _, _)| self.get(*opt))
            .filter_map(|(_, _, flag)| *flag)
            .collect()
    }
}

/// Variable scopes: per-command assignments, function frames and the
/// global overlay, searched in that order.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShellVars {
    pub global: Overlay,
    /// Function-local variables, innermost last
    pub frames: Vec<HashMap<String, Variable>>,
    /// `NAME=value cmd` assignments, live for one command
    pub inline: HashMap<String, Variable>,
}

impl ShellVars {
    pub fn new(global: Overlay) -> Self {
        Self {
            global,
            ..Default::default()
        }
    }

    /// The binding for `name`, from the innermost scope holding one.
    fn binding(&self, name: &str) -> Option<&Variable> {
        if let Some(vr) = self.inline.get(name) {
            return Some(vr);
        }
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn in_function(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Declare `name` in the innermost function frame, shadowing outer
    /// bindings. The new local starts unset unless `vr` holds a value.
    pub fn set_local(&mut self, name: &str, vr: Variable) -> Result<()> {
        if self.get(name).read_only && !self.frames.last().is_some_and(|f| f.contains_key(name)) {
            return Err(Error::ReadOnly(name.to_string()));
        }
        match self.frames.last_mut() {
            Some(frame) => {
                frame.insert(name.to_string(), Variable { local: true, ..vr });
                Ok(())
            }
            None => self.global.set(name, vr),
        }
    }

    /// Set `name` in the global scope, bypassing function frames.
    pub fn set_global(&mut self, name: &str, vr: Variable) -> Result<()> {
        self.global.set(name, vr)
    }
}

impl Environ for ShellVars {
    fn get(&self, name: &str) -> Variable {
        match self.binding(name) {
            Some(vr) => vr.clone(),
            None => self.global.get(name),
        }
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) {
        let mut stopped = false;
        self.global.each(&mut |name, vr| {
            stopped = !visit(name, vr);
            !stopped
        });
        for scope in self.frames.iter().chain(std::iter::once(&self.inline)) {
            if stopped {
                return;
            }
            for (name, vr) in scope {
                if !visit(name, vr) {
                    stopped = true;
                    break;
                }
            }
        }
    }
}

impl WriteEnviron for ShellVars {
    fn set(&mut self, name: &str, vr: Variable) -> Result<()> {
        if self.inline.contains_key(name) {
            if self.inline.get(name).is_some_and(|old| old.read_only) {
                return Err(Error::ReadOnly(name.to_string()));
            }
            self.inline.insert(name.to_string(), vr);
            return Ok(());
        }
        for frame in self.frames.iter_mut().rev() {
            if let Some(old) = frame.get(name) {
                if old.read_only {
                    return Err(Error::ReadOnly(name.to_string()));
                }
                frame.insert(name.to_string(), Variable { local: true, ..vr });
                return Ok(());
            }
        }
        self.global.set(name, vr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_result_helpers() {
        assert!(ExecResult::ok("x").is_success());
        let r = ExecResult::err("bad\n", 2);
        assert_eq!(r.exit_code, 2);
        assert_eq!(ExecResult::flow(0, Flow::Break(1)).flow, Flow::Break(1));
    }

    #[test]
    fn test_option_tables() {
        assert_eq!(Opt::from_flag('e'), Some(Opt::ErrExit));
        assert_eq!(Opt::set_name("pipefail"), Some(Opt::PipeFail));
        assert_eq!(Opt::shopt_name("globstar"), Some(Opt::GlobStar));
        assert_eq!(Opt::shopt_name("pipefail"), None);
        let mut opts = OptionSet::default();
        opts.set(Opt::ErrExit, true);
        opts.set(Opt::XTrace, true);
        opts.set(Opt::GlobStar, true);
        assert_eq!(opts.flags(), "ex");
    }

    #[test]
    fn test_locals_shadow_globals() {
        let mut vars = ShellVars::default();
        vars.set("x", Variable::string("global")).unwrap();
        vars.frames.push(HashMap::new());
        vars.set_local("x", Variable::string("local")).unwrap();
        assert_eq!(vars.get("x").str_value(), "local");
        vars.set("x", Variable::string("changed")).unwrap();
        vars.frames.pop();
        assert_eq!(vars.get("x").str_value(), "global");
    }

    #[test]
    fn test_assignment_reaches_global_without_local() {
        let mut vars = ShellVars::default();
        vars.frames.push(HashMap::new());
        vars.set("y", Variable::string("1")).unwrap();
        vars.frames.pop();
        assert_eq!(vars.get("y").str_value(), "1");
    }

    #[test]
    fn test_unset_local_stays_shadowing() {
        let mut vars = ShellVars::default();
        vars.set("z", Variable::string("outer")).unwrap();
        vars.frames.push(HashMap::new());
        vars.set_local("z", Variable::string("inner")).unwrap();
        vars.set("z", Variable::default()).unwrap();
        assert!(!vars.get("z").is_set());
        vars.frames.pop();
        assert_eq!(vars.get("z").str_value(), "outer");
    }

    #[test]
    fn test_inline_assignments_win() {
        let mut vars = ShellVars::default();
        vars.set("v", Variable::string("a")).unwrap();
        vars.inline.insert("v".into(), Variable::exported("b"));
        assert_eq!(vars.get("v").str_value(), "b");
        let mut last = String::new();
        vars.each(&mut |name, vr| {
            if name == "v" {
                last = vr.str_value().to_string();
            }
            true
        });
        assert_eq!(last, "b");
    }

    #[test]
    fn test_readonly_local_rejected() {
        let mut vars = ShellVars::default();
        vars.frames.push(HashMap::new());
        let mut ro = Variable::string("1");
        ro.read_only = true;
        vars.set_local("r", ro).unwrap();
        assert!(matches!(
            vars.set("r", Variable::string("2")),
            Err(Error::ReadOnly(_))
        ));
        assert_eq!(vars.get("r").str_value(), "1");
    }
}
