//! Variables and environments
//!
//! A [`Variable`] is one of four value kinds plus attribute flags. An
//! [`Environ`] is anything that can look variables up and enumerate them;
//! [`WriteEnviron`] adds assignment. [`Overlay`] composes a read-only parent
//! (usually the host process environment) with a local map of shell
//! variables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Nameref chains longer than this resolve to an unset variable.
pub const MAX_NAMEREF_DEPTH: usize = 100;

/// The value held by a variable. Exactly one kind is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Unset,
    String(String),
    Indexed(Vec<String>),
    Associative(BTreeMap<String, String>),
}

/// A shell variable: a value plus attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variable {
    pub value: Value,
    pub exported: bool,
    pub read_only: bool,
    pub local: bool,
    /// The string value names another variable
    pub name_ref: bool,
    /// `declare -i`: assignments are evaluated arithmetically
    pub integer: bool,
    /// `declare -l`
    pub lower: bool,
    /// `declare -u`
    pub upper: bool,
}

impl Variable {
    /// A plain string variable.
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            value: Value::String(s.into()),
            ..Default::default()
        }
    }

    /// An exported string variable, as inherited from a process.
    pub fn exported(s: impl Into<String>) -> Self {
        Self {
            exported: true,
            ..Self::string(s)
        }
    }

    pub fn indexed(items: Vec<String>) -> Self {
        Self {
            value: Value::Indexed(items),
            ..Default::default()
        }
    }

    pub fn associative(map: BTreeMap<String, String>) -> Self {
        Self {
            value: Value::Associative(map),
            ..Default::default()
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.value, Value::Unset)
    }

    /// Whether the variable exists at all, even without a value
    /// (`declare x` or `export x` before assignment).
    pub fn is_declared(&self) -> bool {
        self.is_set() || self.exported || self.read_only || self.local || self.name_ref
    }

    /// Scalar view: the string, element 0 of an indexed array, or key `0` of
    /// an associative array.
    pub fn str_value(&self) -> &str {
        match &self.value {
            Value::Unset => "",
            Value::String(s) => s,
            Value::Indexed(items) => items.first().map(String::as_str).unwrap_or(""),
            Value::Associative(map) => map.get("0").map(String::as_str).unwrap_or(""),
        }
    }

    /// All elements in order: array items, associative values in key order,
    /// or the string as a single element.
    pub fn elements(&self) -> Vec<String> {
        match &self.value {
            Value::Unset => Vec::new(),
            Value::String(s) => vec![s.clone()],
            Value::Indexed(items) => items.clone(),
            Value::Associative(map) => map.values().cloned().collect(),
        }
    }

    /// Indices or keys, as `${!arr[@]}` lists them.
    pub fn keys(&self) -> Vec<String> {
        match &self.value {
            Value::Unset => Vec::new(),
            Value::String(_) => vec!["0".to_string()],
            Value::Indexed(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            Value::Associative(map) => map.keys().cloned().collect(),
        }
    }

    /// Element `index` of an indexed array; negative indices count from the
    /// end. A string is element 0.
    pub fn element(&self, index: i64) -> Option<&str> {
        match &self.value {
            Value::String(s) if index == 0 || index == -1 => Some(s),
            Value::Indexed(items) => {
                let i = if index < 0 {
                    items.len().checked_sub(index.unsigned_abs() as usize)?
                } else {
                    index as usize
                };
                items.get(i).map(String::as_str)
            }
            _ => None,
        }
    }

    /// Replace the scalar view, keeping the value kind: element 0 of an
    /// indexed array, key `0` of an associative one.
    pub fn set_scalar(&mut self, s: String) {
        match &mut self.value {
            Value::Indexed(items) if !items.is_empty() => items[0] = s,
            Value::Indexed(items) => items.push(s),
            Value::Associative(map) => {
                map.insert("0".to_string(), s);
            }
            _ => self.value = Value::String(s),
        }
    }

    /// Assign element `index`, turning a string or unset variable into an
    /// indexed array first. Gaps are filled with empty strings.
    pub fn set_element(&mut self, index: i64, s: String) -> Result<()> {
        let mut items = match std::mem::take(&mut self.value) {
            Value::Indexed(items) => items,
            Value::String(old) => vec![old],
            Value::Unset => Vec::new(),
            Value::Associative(mut map) => {
                map.insert(index.to_string(), s);
                self.value = Value::Associative(map);
                return Ok(());
            }
        };
        let i = if index < 0 {
            match items.len().checked_sub(index.unsigned_abs() as usize) {
                Some(i) => i,
                None => {
                    self.value = Value::Indexed(items);
                    return Err(Error::Expansion(format!("{index}: bad array subscript")));
                }
            }
        } else {
            index as usize
        };
        if i >= items.len() {
            items.resize(i + 1, String::new());
        }
        items[i] = s;
        self.value = Value::Indexed(items);
        Ok(())
    }

    /// Assign key `key` of an associative array.
    pub fn set_key(&mut self, key: String, s: String) {
        match &mut self.value {
            Value::Associative(map) => {
                map.insert(key, s);
            }
            _ => {
                let mut map = BTreeMap::new();
                map.insert(key, s);
                self.value = Value::Associative(map);
            }
        }
    }

    /// Copy the attribute flags of `other` onto this variable.
    pub fn with_attrs_of(mut self, other: &Variable) -> Self {
        self.exported = other.exported;
        self.read_only = other.read_only;
        self.local = other.local;
        self.name_ref = other.name_ref;
        self.integer = other.integer;
        self.lower = other.lower;
        self.upper = other.upper;
        self
    }

    /// `declare` flag letters for this variable, as printed by `declare -p`.
    pub fn flags(&self) -> String {
        let mut flags = String::new();
        match self.value {
            Value::Indexed(_) => flags.push('a'),
            Value::Associative(_) => flags.push('A'),
            _ => {}
        }
        if self.integer {
            flags.push('i');
        }
        if self.lower {
            flags.push('l');
        }
        if self.name_ref {
            flags.push('n');
        }
        if self.read_only {
            flags.push('r');
        }
        if self.upper {
            flags.push('u');
        }
        if self.exported {
            flags.push('x');
        }
        flags
    }
}

/// Read access to a set of variables.
pub trait Environ: Send + Sync {
    /// Look a variable up. Missing names give an unset variable.
    fn get(&self, name: &str) -> Variable;

    /// Visit every variable. Parents are visited before overlays, so a later
    /// visit of the same name shadows an earlier one. Return `false` from the
    /// visitor to stop.
    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool);
}

/// An environment that accepts assignments.
pub trait WriteEnviron: Environ {
    /// Assign a variable. Assigning [`Value::Unset`] removes the binding.
    /// Fails with [`Error::ReadOnly`] and leaves the old value in place when
    /// the current binding is read-only.
    fn set(&mut self, name: &str, vr: Variable) -> Result<()>;
}

/// Follow a nameref chain starting at `name`. Returns the final name and its
/// variable; chains deeper than [`MAX_NAMEREF_DEPTH`] give an unset variable.
pub fn resolve<E: Environ + ?Sized>(env: &E, name: &str) -> (String, Variable) {
    let mut name = name.to_string();
    for _ in 0..MAX_NAMEREF_DEPTH {
        let vr = env.get(&name);
        if !vr.name_ref {
            return (name, vr);
        }
        let target = vr.str_value();
        if target.is_empty() {
            return (name, vr);
        }
        name = target.to_string();
    }
    (name, Variable::default())
}

/// Exported string variables as `(name, value)` pairs, later visits winning.
pub fn exported_pairs<E: Environ + ?Sized>(env: &E) -> Vec<(String, String)> {
    let mut seen: BTreeMap<String, Option<String>> = BTreeMap::new();
    env.each(&mut |name, vr| {
        let keep = vr.exported && matches!(vr.value, Value::String(_));
        seen.insert(name.to_string(), keep.then(|| vr.str_value().to_string()));
        true
    });
    seen.into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
}

/// Whether `name` is a valid shell identifier.
pub fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// A fixed list of exported variables, such as the host process environment.
#[derive(Debug, Clone, Default)]
pub struct ListEnviron {
    vars: BTreeMap<String, Variable>,
}

impl ListEnviron {
    /// Build from `NAME=value` strings; entries without `=` are skipped and
    /// later duplicates win.
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vars = BTreeMap::new();
        for pair in pairs {
            if let Some((name, value)) = pair.as_ref().split_once('=') {
                if !name.is_empty() {
                    vars.insert(name.to_string(), Variable::exported(value));
                }
            }
        }
        Self { vars }
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        let vars = std::env::vars()
            .map(|(name, value)| (name, Variable::exported(value)))
            .collect();
        Self { vars }
    }

    /// Snapshot of another environment's exported string variables.
    pub fn snapshot<E: Environ + ?Sized>(env: &E) -> Self {
        Self::new(
            exported_pairs(env)
                .into_iter()
                .map(|(name, value)| format!("{name}={value}")),
        )
    }
}

impl Environ for ListEnviron {
    fn get(&self, name: &str) -> Variable {
        self.vars.get(name).cloned().unwrap_or_default()
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) {
        for (name, vr) in &self.vars {
            if !visit(name, vr) {
                return;
            }
        }
    }
}

/// A read-only parent plus a local map that shadows it.
#[derive(Clone)]
pub struct Overlay {
    parent: Arc<dyn Environ>,
    values: HashMap<String, Variable>,
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new(Arc::new(ListEnviron::default()))
    }
}

impl Overlay {
    pub fn new(parent: Arc<dyn Environ>) -> Self {
        Self {
            parent,
            values: HashMap::new(),
        }
    }

    /// Whether the local map holds a binding (or a tombstone) for `name`.
    pub fn has_local(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl Environ for Overlay {
    fn get(&self, name: &str) -> Variable {
        match self.values.get(name) {
            Some(vr) => vr.clone(),
            None => self.parent.get(name),
        }
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Variable) -> bool) {
        let mut stopped = false;
        self.parent.each(&mut |name, vr| {
            stopped = !visit(name, vr);
            !stopped
        });
        if stopped {
            return;
        }
        for (name, vr) in &self.values {
            if !visit(name, vr) {
                return;
            }
        }
    }
}

impl WriteEnviron for Overlay {
    fn set(&mut self, name: &str, vr: Variable) -> Result<()> {
        if self.get(name).read_only {
            return Err(Error::ReadOnly(name.to_string()));
        }
        if !vr.is_declared() && !self.parent.get(name).is_set() {
            self.values.remove(name);
            return Ok(());
        }
        self.values.insert(name.to_string(), vr);
        Ok(())
    }
}
