//! `declare` and its relatives: `typeset`, `local`, `export`, `readonly`
//! and `nameref`

use std::collections::{BTreeMap, BTreeSet};

use super::Runner;
use super::state::Flow;
use crate::ast::{Assign, DeclClause, DeclOperand};
use crate::env::{self, Environ, Value, Variable, WriteEnviron};
use crate::error::{Error, Result};
use crate::expand;
use crate::interp::ExecResult;
use crate::logging::log_trace;

/// Attribute letters that can filter a listing.
const ATTR_FLAGS: &str = "aAilnrux";

/// One operand of a declaration, after expansion.
pub(crate) enum DeclArg<'a> {
    /// An option or `name[=value]` text
    Word(String),
    /// An assignment kept as syntax, such as an array literal
    Assign(&'a Assign),
}

/// Run a declaration clause: expand the word operands, then declare.
pub(crate) async fn decl_clause(r: &mut Runner, d: &DeclClause) -> Result<Flow> {
    let mut args = Vec::with_capacity(d.args.len());
    for op in &d.args {
        match op {
            DeclOperand::Word(w) => match expand::fields(r, std::slice::from_ref(w)).await {
                Ok(fields) => args.extend(fields.into_iter().map(DeclArg::Word)),
                Err(e) => return r.fail(e).await,
            },
            DeclOperand::Assign(a) => args.push(DeclArg::Assign(a)),
        }
    }
    let res = match declare(r, &d.variant, args).await {
        Ok(res) => res,
        Err(e) => return r.fail(e).await,
    };
    r.stdout().write_str(&res.stdout).await?;
    r.stderr().write_str(&res.stderr).await?;
    r.status = res.exit_code;
    Ok(Flow::Normal)
}

#[derive(Debug, Default)]
struct Flags {
    on: BTreeSet<char>,
    off: BTreeSet<char>,
}

impl Flags {
    fn has(&self, c: char) -> bool {
        self.on.contains(&c)
    }

    /// Attributes the operands should end up with, without the modes
    /// (`-p`, `-g`, `-f`, `-F`).
    fn changes_attrs(&self) -> bool {
        self.on.iter().chain(&self.off).any(|c| ATTR_FLAGS.contains(*c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Local,
    Global,
    Current,
}

fn valid_flags(variant: &str) -> &'static str {
    match variant {
        "export" => "fnp",
        "readonly" => "aAfp",
        "local" => "aAnxrilu",
        _ => "aAnxrgpiluFf",
    }
}

/// Run `declare`, `typeset`, `local`, `export`, `readonly` or `nameref`.
///
/// Per-operand failures are reported on the result's stderr with status 1
/// and do not stop later operands. Only fatal errors are returned.
pub(crate) async fn declare(r: &mut Runner, variant: &str, args: Vec<DeclArg<'_>>) -> Result<ExecResult> {
    let mut out = ExecResult::default();
    let prefix = format!("{}: {variant}", r.shell_name());

    let mut flags = Flags::default();
    let mut operands = Vec::new();
    let mut in_opts = true;
    for arg in args {
        match arg {
            DeclArg::Word(s) if in_opts && s == "--" => in_opts = false,
            DeclArg::Word(s)
                if in_opts && s.len() > 1 && (s.starts_with('-') || s.starts_with('+')) =>
            {
                let on = s.starts_with('-');
                for c in s[1..].chars() {
                    if !valid_flags(variant).contains(c) {
                        out.stderr = format!("{prefix}: {}{c}: invalid option\n", &s[..1]);
                        out.exit_code = 2;
                        return Ok(out);
                    }
                    // `export -n` takes the export attribute away.
                    let (c, on) = if variant == "export" && c == 'n' { ('x', false) } else { (c, on) };
                    if on {
                        flags.on.insert(c);
                    } else {
                        flags.off.insert(c);
                    }
                }
            }
            other => {
                in_opts = false;
                operands.push(other);
            }
        }
    }
    match variant {
        "export" if !flags.off.contains(&'x') => {
            flags.on.insert('x');
        }
        "readonly" => {
            flags.on.insert('r');
        }
        "nameref" => {
            flags.on.insert('n');
        }
        _ => {}
    }
    if flags.has('u') && flags.has('l') {
        flags.on.remove(&'l');
    }

    if variant == "local" && !r.vars.in_function() {
        out.stderr = format!("{prefix}: can only be used in a function\n");
        out.exit_code = 1;
        return Ok(out);
    }
    let scope = if variant == "local" {
        Scope::Local
    } else if matches!(variant, "declare" | "typeset") && r.vars.in_function() && !flags.has('g') {
        Scope::Local
    } else if flags.has('g') {
        Scope::Global
    } else {
        Scope::Current
    };

    if flags.has('f') || flags.has('F') {
        functions(r, variant, &flags, &operands, &prefix, &mut out);
        return Ok(out);
    }
    if operands.is_empty() {
        out.stdout = listing(r, variant, &flags);
        return Ok(out);
    }

    for operand in operands {
        let res = match operand {
            DeclArg::Word(s) if flags.has('p') => {
                let vr = r.get(&s);
                if vr.is_declared() {
                    out.stdout.push_str(&describe(&s, &vr));
                    out.stdout.push('\n');
                } else {
                    out.stderr.push_str(&format!("{prefix}: {s}: not found\n"));
                    out.exit_code = 1;
                }
                Ok(())
            }
            DeclArg::Word(s) => declare_word(r, &flags, scope, &s),
            DeclArg::Assign(a) => declare_assign(r, &flags, scope, a).await,
        };
        if let Err(e) = res {
            if e.is_fatal() || e.exits_shell() {
                return Err(e);
            }
            out.stderr.push_str(&format!("{prefix}: {e}\n"));
            out.exit_code = 1;
        }
    }
    Ok(out)
}

fn functions(
    r: &Runner,
    variant: &str,
    flags: &Flags,
    operands: &[DeclArg<'_>],
    prefix: &str,
    out: &mut ExecResult,
) {
    let listing = matches!(variant, "declare" | "typeset") || flags.has('p');
    if operands.is_empty() {
        if listing {
            let names: BTreeSet<&String> = r.funcs.keys().collect();
            for name in names {
                out.stdout.push_str(&format!("declare -f {name}\n"));
            }
        }
        return;
    }
    for operand in operands {
        let name = match operand {
            DeclArg::Word(s) => s.split_once('=').map_or(s.as_str(), |(n, _)| n),
            DeclArg::Assign(a) => a.name.as_str(),
        };
        if !r.funcs.contains_key(name) {
            if !listing {
                out.stderr.push_str(&format!("{prefix}: {name}: not a function\n"));
            }
            out.exit_code = 1;
        } else if listing {
            out.stdout.push_str(&format!("declare -f {name}\n"));
        }
    }
}

/// `declare` without operands: every variable carrying the requested
/// attributes, one `declare` line each.
fn listing(r: &Runner, variant: &str, flags: &Flags) -> String {
    let mut vars = BTreeMap::new();
    if variant == "local" {
        if let Some(frame) = r.vars.frames.last() {
            vars.extend(frame.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    } else {
        r.each(&mut |name, vr| {
            vars.insert(name.to_string(), vr.clone());
            true
        });
    }
    let wanted: Vec<char> = flags
        .on
        .iter()
        .copied()
        .filter(|c| ATTR_FLAGS.contains(*c))
        .collect();
    let mut out = String::new();
    for (name, vr) in vars {
        if !vr.is_declared() {
            continue;
        }
        let have = vr.flags();
        if wanted.iter().all(|c| have.contains(*c)) {
            out.push_str(&describe(&name, &vr));
            out.push('\n');
        }
    }
    out
}

/// The variable an operand starts from and the name it is stored under.
fn target(r: &Runner, flags: &Flags, scope: Scope, name: &str) -> (String, Variable) {
    match scope {
        Scope::Local => {
            let vr = r
                .vars
                .frames
                .last()
                .and_then(|f| f.get(name))
                .cloned()
                .unwrap_or_default();
            (name.to_string(), vr)
        }
        Scope::Global => (name.to_string(), r.vars.global.get(name)),
        Scope::Current if flags.has('n') || flags.off.contains(&'n') => {
            (name.to_string(), r.get(name))
        }
        Scope::Current => env::resolve(r, name),
    }
}

fn store(r: &mut Runner, scope: Scope, name: &str, vr: Variable) -> Result<()> {
    log_trace!(assign = %r.log_config.assignment(name, vr.str_value()), flags = %vr.flags(), "declare");
    match scope {
        Scope::Local => r.vars.set_local(name, vr),
        Scope::Global => r.vars.set_global(name, vr),
        Scope::Current => r.set(name, vr),
    }
}

/// Apply the attribute changes in `flags` to `vr`, except read-only, which
/// the caller applies after the value.
fn apply_attrs(name: &str, vr: &mut Variable, flags: &Flags) -> Result<()> {
    if flags.has('A') {
        match std::mem::take(&mut vr.value) {
            Value::Indexed(items) => {
                vr.value = Value::Indexed(items);
                return Err(Error::Expansion(format!(
                    "{name}: cannot convert indexed to associative array"
                )));
            }
            Value::String(s) => vr.value = Value::Associative(BTreeMap::from([("0".to_string(), s)])),
            Value::Unset => vr.value = Value::Associative(BTreeMap::new()),
            assoc => vr.value = assoc,
        }
    } else if flags.has('a') {
        match std::mem::take(&mut vr.value) {
            Value::Associative(map) => {
                vr.value = Value::Associative(map);
                return Err(Error::Expansion(format!(
                    "{name}: cannot convert associative to indexed array"
                )));
            }
            Value::String(s) => vr.value = Value::Indexed(vec![s]),
            Value::Unset => vr.value = Value::Indexed(Vec::new()),
            indexed => vr.value = indexed,
        }
    }
    for (c, on) in flags
        .on
        .iter()
        .map(|c| (*c, true))
        .chain(flags.off.iter().map(|c| (*c, false)))
    {
        match c {
            'x' => vr.exported = on,
            'n' => vr.name_ref = on,
            'i' => vr.integer = on,
            'l' => {
                vr.lower = on;
                if on {
                    vr.upper = false;
                }
            }
            'u' => {
                vr.upper = on;
                if on {
                    vr.lower = false;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether declaring over a read-only variable changes nothing.
fn unchanged_readonly(old: &Variable, flags: &Flags, has_value: bool) -> bool {
    if has_value || !flags.off.is_empty() {
        return false;
    }
    let have = old.flags();
    flags
        .on
        .iter()
        .filter(|c| ATTR_FLAGS.contains(**c))
        .all(|c| have.contains(*c))
}

struct WordOperand<'s> {
    name: &'s str,
    index: Option<&'s str>,
    append: bool,
    value: Option<&'s str>,
}

fn parse_word(s: &str) -> WordOperand<'_> {
    let (lhs, value) = match s.split_once('=') {
        Some((lhs, value)) => (lhs, Some(value)),
        None => (s, None),
    };
    let (lhs, append) = match lhs.strip_suffix('+') {
        Some(lhs) if value.is_some() => (lhs, true),
        _ => (lhs, false),
    };
    let (name, index) = match lhs.split_once('[') {
        Some((name, rest)) if rest.ends_with(']') => (name, Some(&rest[..rest.len() - 1])),
        _ => (lhs, None),
    };
    WordOperand {
        name,
        index,
        append,
        value,
    }
}

fn declare_word(r: &mut Runner, flags: &Flags, scope: Scope, s: &str) -> Result<()> {
    let op = parse_word(s);
    if !env::valid_name(op.name) {
        return Err(Error::InvalidName(s.to_string()));
    }
    let (name, old) = target(r, flags, scope, op.name);
    if old.read_only {
        if unchanged_readonly(&old, flags, op.value.is_some()) {
            return Ok(());
        }
        return Err(Error::ReadOnly(name));
    }
    let mut vr = old;
    apply_attrs(&name, &mut vr, flags)?;
    if let Some(value) = op.value {
        assign_text(r, &name, &mut vr, &op, value)?;
    }
    if flags.has('r') {
        vr.read_only = true;
    }
    store(r, scope, &name, vr)
}

/// Assign the text after `=` in a word operand.
fn assign_text(r: &Runner, name: &str, vr: &mut Variable, op: &WordOperand<'_>, value: &str) -> Result<()> {
    if op.index.is_none() && value.len() >= 2 && value.starts_with('(') && value.ends_with(')') {
        return compound(r, name, vr, &value[1..value.len() - 1], op.append);
    }
    match op.index {
        Some(key) if matches!(vr.value, Value::Associative(_)) => {
            let current = match &vr.value {
                Value::Associative(map) => map.get(key).cloned().unwrap_or_default(),
                _ => String::new(),
            };
            let value = r.scalar_value(vr, &current, value.to_string(), op.append)?;
            vr.set_key(key.to_string(), value);
        }
        Some(index) => {
            let i = expand::eval_str(r, index, 0)?;
            let current = vr.element(i).unwrap_or_default().to_string();
            let value = r.scalar_value(vr, &current, value.to_string(), op.append)?;
            vr.set_element(i, value)?;
        }
        None => {
            let current = vr.str_value().to_string();
            let value = r.scalar_value(vr, &current, value.to_string(), op.append)?;
            vr.set_scalar(value);
        }
    }
    Ok(())
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// `name=(a b [k]=v)` given as a single word, split on whitespace.
fn compound(r: &Runner, name: &str, vr: &mut Variable, body: &str, append: bool) -> Result<()> {
    let items = body.split_whitespace().map(|item| {
        match item.strip_prefix('[').and_then(|rest| rest.split_once("]=")) {
            Some((key, value)) => (Some(key), unquote(value)),
            None => (None, unquote(item)),
        }
    });
    if let Value::Associative(current) = &vr.value {
        let mut map = if append { current.clone() } else { BTreeMap::new() };
        for (key, value) in items {
            let Some(key) = key else {
                return Err(Error::Expansion(format!(
                    "{name}: must use subscript when assigning associative array"
                )));
            };
            map.insert(key.to_string(), value.to_string());
        }
        vr.value = Value::Associative(map);
        return Ok(());
    }
    let start = if append { vr.elements() } else { Vec::new() };
    let mut next = start.len() as i64;
    let mut list = Variable::indexed(start);
    for (key, value) in items {
        if let Some(key) = key {
            next = expand::eval_str(r, key, 0)?;
        }
        list.set_element(next, value.to_string())?;
        next += 1;
    }
    vr.value = list.value;
    Ok(())
}

async fn declare_assign(r: &mut Runner, flags: &Flags, scope: Scope, a: &Assign) -> Result<()> {
    if !env::valid_name(&a.name) {
        return Err(Error::InvalidName(a.name.clone()));
    }
    let has_value = a.value.is_some() || a.array.is_some();
    let (name, old) = target(r, flags, scope, &a.name);
    if old.read_only {
        if unchanged_readonly(&old, flags, has_value) {
            return Ok(());
        }
        return Err(Error::ReadOnly(name));
    }
    let mut vr = old;
    apply_attrs(&name, &mut vr, flags)?;
    if !has_value {
        if flags.has('r') {
            vr.read_only = true;
        }
        return store(r, scope, &name, vr);
    }

    // Store the attributes first so the assignment sees them.
    store(r, scope, &name, vr)?;
    let direct = Assign {
        name: name.clone(),
        ..a.clone()
    };
    let (assigned_name, mut assigned) = r.assigned(&direct).await?;
    if flags.has('r') {
        assigned.read_only = true;
    }
    if assigned_name == name {
        store(r, scope, &name, assigned)
    } else {
        r.set(&assigned_name, assigned)
    }
}

fn escape_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// One `declare -p` line, without the newline.
pub(crate) fn describe(name: &str, vr: &Variable) -> String {
    let flags = vr.flags();
    let flags = if flags.is_empty() {
        "--".to_string()
    } else {
        format!("-{flags}")
    };
    match &vr.value {
        Value::Unset => format!("declare {flags} {name}"),
        Value::String(s) => format!("declare {flags} {name}={}", escape_value(s)),
        Value::Indexed(items) => {
            let body: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, v)| format!("[{i}]={}", escape_value(v)))
                .collect();
            format!("declare {flags} {name}=({})", body.join(" "))
        }
        Value::Associative(map) => {
            let body: String = map
                .iter()
                .map(|(k, v)| format!("[{k}]={} ", escape_value(v)))
                .collect();
            format!("declare {flags} {name}=({body})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{Command, Stmt};
    use pretty_assertions::assert_eq;

    fn echo_param(name: &str) -> Stmt {
        stmt(call(vec![lit("echo"), word(vec![dbl(vec![param(name)])])]))
    }

    async fn words(r: &mut Runner, variant: &str, args: &[&str]) -> ExecResult {
        let args = args.iter().map(|s| DeclArg::Word(s.to_string())).collect();
        declare(r, variant, args).await.unwrap()
    }

    #[test]
    fn test_describe_forms() {
        assert_eq!(describe("x", &Variable::string("a\"b")), r#"declare -- x="a\"b""#);
        assert_eq!(
            describe("arr", &Variable::indexed(vec!["a".into(), "b".into()])),
            r#"declare -a arr=([0]="a" [1]="b")"#
        );
        let map = BTreeMap::from([("k".to_string(), "v".to_string())]);
        assert_eq!(
            describe("m", &Variable::associative(map)),
            r#"declare -A m=([k]="v" )"#
        );
        let mut exported = Variable::default();
        exported.exported = true;
        assert_eq!(describe("E", &exported), "declare -x E");
    }

    #[test]
    fn test_parse_word_operand() {
        let op = parse_word("a[3]+=x=y");
        assert_eq!(op.name, "a");
        assert_eq!(op.index, Some("3"));
        assert!(op.append);
        assert_eq!(op.value, Some("x=y"));
        assert_eq!(parse_word("plain").value, None);
    }

    #[tokio::test]
    async fn test_print_existing_and_missing() {
        let mut r = runner();
        r.set_var("x", "1").unwrap();
        let res = words(&mut r, "declare", &["-p", "x", "nope"]).await;
        assert_eq!(res.stdout, "declare -- x=\"1\"\n");
        assert!(res.stderr.contains("declare: nope: not found"));
        assert_eq!(res.exit_code, 1);
    }

    #[tokio::test]
    async fn test_invalid_identifier_continues() {
        let mut r = runner();
        let res = words(&mut r, "declare", &["1x=2", "ok=3"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("`1x=2': not a valid identifier"));
        assert_eq!(r.var("ok"), "3");
    }

    #[tokio::test]
    async fn test_invalid_option() {
        let mut r = runner();
        let res = words(&mut r, "declare", &["-z", "x"]).await;
        assert_eq!(res.exit_code, 2);
        assert!(res.stderr.contains("-z: invalid option"));
    }

    #[tokio::test]
    async fn test_export_and_unexport() {
        let mut r = runner();
        words(&mut r, "export", &["E=1"]).await;
        assert!(r.get("E").exported);
        words(&mut r, "export", &["-n", "E"]).await;
        assert!(!r.get("E").exported);
        assert_eq!(r.var("E"), "1");
    }

    #[tokio::test]
    async fn test_readonly_redeclare_without_change_is_quiet() {
        let mut r = runner();
        words(&mut r, "readonly", &["R=1"]).await;
        let res = words(&mut r, "readonly", &["R"]).await;
        assert_eq!(res.exit_code, 0);
        let res = words(&mut r, "declare", &["R=2"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("R: readonly variable"));
        assert_eq!(r.var("R"), "1");
    }

    #[tokio::test]
    async fn test_array_kind_conversion_errors() {
        let mut r = runner();
        words(&mut r, "declare", &["-a", "arr"]).await;
        let res = words(&mut r, "declare", &["-A", "arr"]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("cannot convert indexed to associative array"));
    }

    #[tokio::test]
    async fn test_compound_string_assignment() {
        let mut r = runner();
        words(&mut r, "declare", &["-a", "arr=(a 'b' [4]=e)"]).await;
        assert_eq!(r.get("arr").elements(), vec!["a", "b", "", "", "e"]);
        words(&mut r, "declare", &["-A", "m=([x]=1 [y]=2)"]).await;
        assert_eq!(r.get("m").keys(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_upper_wins_over_lower() {
        let mut r = runner();
        words(&mut r, "declare", &["-l", "-u", "v=MiXed"]).await;
        assert_eq!(r.var("v"), "MIXED");
    }

    #[tokio::test]
    async fn test_local_outside_function() {
        let res = run(vec![cmd(&["local", "x=1"])]).await;
        assert_eq!(res.exit_code, 1);
        assert!(res.stderr.contains("local: can only be used in a function"));
    }

    #[tokio::test]
    async fn test_local_and_global_scopes() {
        let body = vec![
            cmd(&["local", "x=inner"]),
            cmd(&["declare", "y=also-local"]),
            cmd(&["declare", "-g", "z=global"]),
            echo_param("x"),
        ];
        let res = run(vec![
            assigns(vec![assign("x", "outer")]),
            func("f", body),
            cmd(&["f"]),
            echo_param("x"),
            echo_param("y"),
            echo_param("z"),
        ])
        .await;
        assert_eq!(res.stdout, "inner\nouter\n\nglobal\n");
    }

    #[tokio::test]
    async fn test_listing_filters_by_attribute() {
        let mut r = runner();
        words(&mut r, "export", &["AA_EXPORTED=1"]).await;
        r.set_var("AA_PLAIN", "2").unwrap();
        let res = words(&mut r, "export", &[]).await;
        assert!(res.stdout.contains("declare -x AA_EXPORTED=\"1\""));
        assert!(!res.stdout.contains("AA_PLAIN"));
    }

    #[tokio::test]
    async fn test_function_listing() {
        let mut r = runner();
        r.run(&file(vec![func("greet", vec![cmd(&["true"])])]))
            .await
            .unwrap();
        let res = words(&mut r, "declare", &["-F"]).await;
        assert_eq!(res.stdout, "declare -f greet\n");
        let res = words(&mut r, "declare", &["-F", "missing"]).await;
        assert_eq!(res.exit_code, 1);
    }

    #[tokio::test]
    async fn test_clause_with_array_assign() {
        let mut r = runner();
        let clause = stmt(Command::Decl(DeclClause {
            variant: "declare".into(),
            args: vec![
                DeclOperand::Word(lit("-r")),
                DeclOperand::Assign(assign_array("list", vec![lit("a"), lit("b")])),
            ],
        }));
        r.run(&file(vec![clause])).await.unwrap();
        let vr = r.get("list");
        assert!(vr.read_only);
        assert_eq!(vr.elements(), vec!["a", "b"]);
    }
}
