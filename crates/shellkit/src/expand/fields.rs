//! Field accumulation and IFS splitting
//!
//! Expansion results are appended to a [`FieldBuilder`] part by part.
//! Unquoted expansion results are split on IFS:
//!
//! - A run of IFS whitespace (space, tab or newline present in IFS) is one
//!   delimiter. It only ends a field that already has content, so leading,
//!   trailing and repeated whitespace never produce empty fields.
//! - An IFS non-whitespace character, together with any IFS whitespace
//!   around it, is one delimiter that always ends a field, empty or not.
//!   `a,,b` with `IFS=,` gives `a`, an empty field, and `b`; a trailing
//!   separator does not open a new field.

/// How a piece of a field was quoted, which decides whether it takes part
/// in globbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quote {
    None,
    Double,
    /// Single quotes and backslash escapes
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldPart {
    pub val: String,
    pub quote: Quote,
}

pub(crate) const DEFAULT_IFS: &str = " \t\n";

pub(crate) struct FieldBuilder {
    split: bool,
    ifs: String,
    fields: Vec<Vec<FieldPart>>,
    cur: Vec<FieldPart>,
}

impl FieldBuilder {
    /// `split` enables field splitting; without it everything lands in a
    /// single field.
    pub fn new(split: bool, ifs: impl Into<String>) -> Self {
        Self {
            split,
            ifs: ifs.into(),
            fields: Vec::new(),
            cur: Vec::new(),
        }
    }

    pub fn push(&mut self, val: impl Into<String>, quote: Quote) {
        self.cur.push(FieldPart {
            val: val.into(),
            quote,
        });
    }

    /// Append an unquoted expansion result, splitting it on IFS.
    pub fn push_split(&mut self, val: &str) {
        if !self.split || self.ifs.is_empty() {
            if !val.is_empty() {
                self.push(val, Quote::None);
            }
            return;
        }
        let mut text = String::new();
        let mut chars = val.chars().peekable();
        while let Some(c) = chars.next() {
            if !self.is_ifs(c) {
                text.push(c);
                continue;
            }
            let mut hard = !is_space(c);
            if !hard {
                while chars.peek().is_some_and(|&n| self.is_ifs_space(n)) {
                    chars.next();
                }
                if chars.peek().is_some_and(|&n| self.is_ifs(n) && !is_space(n)) {
                    chars.next();
                    hard = true;
                }
            }
            if hard {
                while chars.peek().is_some_and(|&n| self.is_ifs_space(n)) {
                    chars.next();
                }
            }
            if !text.is_empty() {
                self.push(std::mem::take(&mut text), Quote::None);
            }
            self.delimit(hard);
        }
        if !text.is_empty() {
            self.push(text, Quote::None);
        }
    }

    /// Append array elements (`$@`, `${a[*]}`...).
    pub fn push_elems(&mut self, items: Vec<String>, quoted: bool, star: bool) {
        let sep = if star {
            self.ifs.chars().next().map(String::from).unwrap_or_default()
        } else {
            " ".to_string()
        };
        match (quoted, self.split && !(quoted && star)) {
            (true, false) => self.push(items.join(&sep), Quote::Double),
            (false, false) => {
                let joined = items.join(&sep);
                if !joined.is_empty() {
                    self.push(joined, Quote::None);
                }
            }
            (true, true) => {
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        self.delimit(true);
                    }
                    self.push(item, Quote::Double);
                }
            }
            (false, true) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.delimit(false);
                    }
                    self.push_split(item);
                }
            }
        }
    }

    /// End the current field. A soft delimiter drops an empty field.
    fn delimit(&mut self, hard: bool) {
        if hard || !self.cur.is_empty() {
            self.fields.push(std::mem::take(&mut self.cur));
        }
    }

    pub fn finish(mut self) -> Vec<Vec<FieldPart>> {
        if !self.cur.is_empty() {
            self.fields.push(std::mem::take(&mut self.cur));
        }
        self.fields
    }

    /// Everything joined into one string, for contexts without splitting.
    pub fn finish_joined(self) -> String {
        let mut out = String::new();
        for (i, field) in self.finish().into_iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            for part in field {
                out.push_str(&part.val);
            }
        }
        out
    }

    fn is_ifs(&self, c: char) -> bool {
        self.ifs.contains(c)
    }

    fn is_ifs_space(&self, c: char) -> bool {
        is_space(c) && self.is_ifs(c)
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

/// Split `s` on IFS the way unquoted expansions are split.
pub fn split(s: &str, ifs: &str) -> Vec<String> {
    let mut fb = FieldBuilder::new(true, ifs);
    fb.push_split(s);
    fb.finish()
        .into_iter()
        .map(|parts| parts.into_iter().map(|p| p.val).collect())
        .collect()
}
