//! Variable and option builtins: set, shift, unset, shopt

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::env::{self, Environ, Value, Variable, WriteEnviron};
use crate::error::Result;
use crate::expand::{self, shell_quote};
use crate::interp::{ExecResult, Opt};

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

/// set builtin - shell options and positional parameters
///
/// - `set` lists variables
/// - `set -e`, `set +e`, `set -o pipefail`, ... switch options
/// - `set -o` / `set +o` list options
/// - `set -- a b` replaces the positional parameters
pub struct Set;

#[async_trait]
impl Builtin for Set {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            return Ok(ExecResult::ok(list_variables(&*ctx.runner)));
        }

        let mut out = String::new();
        let mut args = ctx.args.iter();
        let mut params = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--" => {
                    params = Some(args.by_ref().cloned().collect::<Vec<_>>());
                    break;
                }
                "-" => {
                    ctx.runner.set_opt(Opt::XTrace, false);
                    params = Some(args.by_ref().cloned().collect::<Vec<_>>());
                    break;
                }
                "-o" | "+o" => {
                    let on = arg.starts_with('-');
                    match args.next() {
                        Some(name) => match Opt::set_name(name) {
                            Some(opt) => ctx.runner.set_opt(opt, on),
                            None => {
                                return Ok(ctx.error(format!("{name}: invalid option name")));
                            }
                        },
                        None => {
                            for (opt, name) in Opt::set_options() {
                                let set = ctx.runner.opt(opt);
                                if on {
                                    out.push_str(&format!("{name:<15}\t{}\n", on_off(set)));
                                } else {
                                    let sign = if set { '-' } else { '+' };
                                    out.push_str(&format!("set {sign}o {name}\n"));
                                }
                            }
                        }
                    }
                }
                flags if flags.len() > 1 && (flags.starts_with('-') || flags.starts_with('+')) => {
                    let on = flags.starts_with('-');
                    for c in flags[1..].chars() {
                        match Opt::from_flag(c) {
                            Some(opt) => ctx.runner.set_opt(opt, on),
                            None => {
                                return Ok(ctx.failure(format!("{}{c}: invalid option", &flags[..1]), 2));
                            }
                        }
                    }
                }
                _ => {
                    let mut rest = vec![arg.clone()];
                    rest.extend(args.by_ref().cloned());
                    params = Some(rest);
                    break;
                }
            }
        }
        if let Some(params) = params {
            ctx.runner.params = params;
            ctx.runner.getopts_pos = 0;
        }
        Ok(ExecResult::ok(out))
    }
}

/// `set` without arguments: every variable with a value, sorted.
fn list_variables(r: &dyn Environ) -> String {
    let mut vars = BTreeMap::new();
    r.each(&mut |name, vr| {
        vars.insert(name.to_string(), vr.clone());
        true
    });
    let mut out = String::new();
    for (name, vr) in vars {
        match &vr.value {
            Value::Unset => continue,
            Value::String(s) => out.push_str(&format!("{name}={}\n", shell_quote(s))),
            Value::Indexed(items) => {
                let body: Vec<String> = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| format!("[{i}]={}", shell_quote(v)))
                    .collect();
                out.push_str(&format!("{name}=({})\n", body.join(" ")));
            }
            Value::Associative(map) => {
                let body: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("[{k}]={}", shell_quote(v)))
                    .collect();
                out.push_str(&format!("{name}=({})\n", body.join(" ")));
            }
        }
    }
    out
}

/// shift builtin - shift positional parameters
pub struct Shift;

#[async_trait]
impl Builtin for Shift {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let n = match ctx.args.first() {
            None => 1,
            Some(arg) => match expand::parse_number(arg.trim()) {
                Ok(n) if n >= 0 => n as usize,
                Ok(_) => return Ok(ctx.error(format!("{arg}: shift count out of range"))),
                Err(_) => return Ok(ctx.error(format!("{arg}: numeric argument required"))),
            },
        };
        if n > ctx.runner.params.len() {
            return Ok(ExecResult::status(1));
        }
        ctx.runner.params.drain(..n);
        Ok(ExecResult::status(0))
    }
}

/// unset builtin - remove variables or functions
///
/// `-v` (default) unsets variables, `-f` functions, `-n` a nameref itself
/// rather than the variable it points to. Without `-v` a name that is not
/// a variable falls back to a function of that name.
pub struct Unset;

#[async_trait]
impl Builtin for Unset {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (mut funcs, mut vars_only, mut no_deref) = (false, false, false);
        let mut names = ctx.args;
        while let Some(arg) = names.first() {
            if arg == "--" {
                names = &names[1..];
                break;
            }
            if !arg.starts_with('-') || arg.len() < 2 {
                break;
            }
            for c in arg[1..].chars() {
                match c {
                    'f' => funcs = true,
                    'v' => vars_only = true,
                    'n' => no_deref = true,
                    _ => return Ok(ctx.failure(format!("-{c}: invalid option"), 2)),
                }
            }
            names = &names[1..];
        }

        let mut res = ExecResult::default();
        for name in names {
            if funcs {
                ctx.runner.funcs.remove(name.as_str());
                continue;
            }
            let outcome = unset_var(ctx.runner, name, no_deref);
            match outcome {
                Ok(true) => {}
                Ok(false) if !vars_only => {
                    ctx.runner.funcs.remove(name.as_str());
                }
                Ok(false) => {}
                Err(msg) => {
                    res.stderr.push_str(&ctx.error(msg).stderr);
                    res.exit_code = 1;
                }
            }
        }
        Ok(res)
    }
}

/// Unset a variable or an array element. Returns whether a variable by
/// that name existed.
fn unset_var(
    r: &mut crate::interp::Runner,
    name: &str,
    no_deref: bool,
) -> std::result::Result<bool, String> {
    let (base, index) = match name.split_once('[') {
        Some((base, rest)) if rest.ends_with(']') => (base, Some(&rest[..rest.len() - 1])),
        _ => (name, None),
    };
    if !env::valid_name(base) {
        return Err(format!("`{name}': not a valid identifier"));
    }
    let (target, vr) = if no_deref {
        (base.to_string(), r.get(base))
    } else {
        env::resolve(&*r, base)
    };
    if !vr.is_declared() {
        return Ok(false);
    }
    if vr.read_only {
        return Err(format!("{target}: cannot unset: readonly variable"));
    }
    let updated = match index {
        None => Variable::default(),
        Some(index) => {
            let mut vr = vr;
            match &mut vr.value {
                Value::Associative(map) => {
                    map.remove(index);
                }
                Value::Indexed(items) => {
                    let i = expand::eval_str(&*r, index, 0).map_err(|e| e.to_string())?;
                    let len = items.len() as i64;
                    let i = if i < 0 { len + i } else { i };
                    if i == len - 1 {
                        items.pop();
                    } else if (0..len).contains(&i) {
                        items[i as usize].clear();
                    }
                }
                Value::String(_) if index == "0" => vr.value = Value::Unset,
                _ => {}
            }
            vr
        }
    };
    r.set(&target, updated).map_err(|e| e.to_string())?;
    Ok(true)
}

/// shopt builtin - shell behaviour switches
///
/// `-s` enables, `-u` disables, `-p` prints in reusable form, `-q` only sets
/// the status, `-o` works on the `set -o` options instead.
pub struct Shopt;

#[async_trait]
impl Builtin for Shopt {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (mut set, mut unset, mut print, mut quiet, mut set_opts) = (false, false, false, false, false);
        let mut names = ctx.args;
        while let Some(arg) = names.first() {
            if !arg.starts_with('-') || arg.len() < 2 {
                break;
            }
            for c in arg[1..].chars() {
                match c {
                    's' => set = true,
                    'u' => unset = true,
                    'p' => print = true,
                    'q' => quiet = true,
                    'o' => set_opts = true,
                    _ => return Ok(ctx.failure(format!("-{c}: invalid option"), 2)),
                }
            }
            names = &names[1..];
        }
        if set && unset {
            return Ok(ctx.error("cannot set and unset shell options simultaneously"));
        }

        let lookup = |name: &str| {
            if set_opts {
                Opt::set_name(name)
            } else {
                Opt::shopt_name(name)
            }
        };
        let all: Vec<(Opt, &str)> = if set_opts {
            Opt::set_options().collect()
        } else {
            Opt::shopt_options().collect()
        };
        let selected: Vec<(Opt, String)> = if names.is_empty() {
            all.iter().map(|(o, n)| (*o, n.to_string())).collect()
        } else {
            let mut selected = Vec::new();
            for name in names {
                match lookup(name) {
                    Some(opt) => selected.push((opt, name.clone())),
                    None => return Ok(ctx.error(format!("{name}: invalid shell option name"))),
                }
            }
            selected
        };

        if (set || unset) && !names.is_empty() {
            for (opt, _) in &selected {
                ctx.runner.set_opt(*opt, set);
            }
            return Ok(ExecResult::status(0));
        }

        let mut res = ExecResult::default();
        for (opt, name) in &selected {
            let on = ctx.runner.opt(*opt);
            // -s or -u with no names lists only the matching options.
            if (set && !on) || (unset && on) {
                continue;
            }
            if !on && !names.is_empty() {
                res.exit_code = 1;
            }
            if quiet {
                continue;
            }
            if print {
                let flag = match (set_opts, on) {
                    (true, true) => "-o",
                    (true, false) => "+o",
                    (false, true) => "-s",
                    (false, false) => "-u",
                };
                let cmd = if set_opts { "set" } else { "shopt" };
                res.stdout.push_str(&format!("{cmd} {flag} {name}\n"));
            } else {
                res.stdout.push_str(&format!("{name:<15}\t{}\n", on_off(on)));
            }
        }
        Ok(res)
    }
}
