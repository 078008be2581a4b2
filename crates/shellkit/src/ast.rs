//! Syntax tree consumed by the runner
//!
//! Shellkit does not parse shell source. A parser (or any other producer)
//! hands the runner a [`File`]; the tree is plain owned data and
//! round-trips through serde so it can travel as JSON.
//!
//! Conventions shared with common shell parsers:
//! - [`WordPart::Lit`] holds raw unquoted source text, backslash escapes
//!   included (`\*` stays `\*` and is unescaped during expansion).
//! - `${arr[@]}` is a [`ParamExp`] whose `index` is the word `@`.
//! - An `else` branch is an [`IfClause`] with an empty `cond`.
//! - Heredoc bodies are words: an unquoted delimiter gives a body with
//!   expansions, a quoted one gives a single [`WordPart::SglQuoted`].

use serde::{Deserialize, Serialize};

/// A complete script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// Script name, used for `$0`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

/// A command with its modifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    /// `None` for a statement made only of redirections
    #[serde(default)]
    pub cmd: Option<Command>,
    /// `! cmd`
    #[serde(default)]
    pub negated: bool,
    /// `cmd &`
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub redirs: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Call(CallExpr),
    Block(Vec<Stmt>),
    Subshell(Vec<Stmt>),
    Binary(BinaryCmd),
    If(IfClause),
    While(WhileClause),
    For(ForClause),
    Case(CaseClause),
    Func(FuncDecl),
    Arithm(ArithmExpr),
    Test(TestExpr),
    Decl(DeclClause),
    Let(Vec<ArithmExpr>),
    Time(TimeClause),
}

/// Simple command: `a=1 b=2 name arg...`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    #[serde(default)]
    pub assigns: Vec<Assign>,
    #[serde(default)]
    pub args: Vec<Word>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinCmdOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `|`
    Pipe,
    /// `|&`
    PipeAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryCmd {
    pub op: BinCmdOp,
    pub x: Box<Stmt>,
    pub y: Box<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IfClause {
    /// Empty for a final `else`
    #[serde(default)]
    pub cond: Vec<Stmt>,
    #[serde(default)]
    pub then: Vec<Stmt>,
    #[serde(default)]
    pub else_branch: Option<Box<IfClause>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhileClause {
    /// `until` instead of `while`
    #[serde(default)]
    pub until: bool,
    pub cond: Vec<Stmt>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForClause {
    pub head: Loop,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loop {
    /// `for name in items`; `items: None` iterates over `"$@"`
    WordIter {
        name: String,
        #[serde(default)]
        items: Option<Vec<Word>>,
    },
    /// `for ((init; cond; post))`
    CStyle {
        #[serde(default)]
        init: Option<ArithmExpr>,
        #[serde(default)]
        cond: Option<ArithmExpr>,
        #[serde(default)]
        post: Option<ArithmExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseClause {
    pub word: Word,
    #[serde(default)]
    pub items: Vec<CaseItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOp {
    /// `;;`
    #[default]
    Break,
    /// `;&`
    Fallthrough,
    /// `;;&`
    Resume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseItem {
    #[serde(default)]
    pub op: CaseOp,
    pub patterns: Vec<Word>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub body: Box<Stmt>,
}

/// `declare`, `local`, `export`, `readonly`, `typeset` or `nameref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclClause {
    pub variant: String,
    #[serde(default)]
    pub args: Vec<DeclOperand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclOperand {
    /// A word expanded at run time: an option like `-x`, a name or `name=value`
    Word(Word),
    /// A static assignment, including array literals
    Assign(Assign),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeClause {
    /// `time -p`
    #[serde(default)]
    pub posix: bool,
    #[serde(default)]
    pub stmt: Option<Box<Stmt>>,
}

/// `name=value`, `name+=value`, `name[i]=value` or `name=(elems)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    pub name: String,
    /// `+=`
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub index: Option<ArithmExpr>,
    /// `None` for `name=` and for bare names in declarations
    #[serde(default)]
    pub value: Option<Word>,
    #[serde(default)]
    pub array: Option<Vec<ArrayElem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayElem {
    /// `[index]=value`
    #[serde(default)]
    pub index: Option<ArithmExpr>,
    pub value: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirOp {
    /// `>`
    RdrOut,
    /// `>>`
    AppOut,
    /// `<`
    RdrIn,
    /// `<>`
    RdrInOut,
    /// `<&`
    DplIn,
    /// `>&`
    DplOut,
    /// `>|`
    ClbOut,
    /// `<<`
    Hdoc,
    /// `<<-`
    DashHdoc,
    /// `<<<`
    WordHdoc,
    /// `&>`
    RdrAll,
    /// `&>>`
    AppAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    /// Explicit descriptor (`2>`); defaults depend on the operator
    #[serde(default)]
    pub fd: Option<u32>,
    pub op: RedirOp,
    pub word: Word,
    /// Heredoc body for `<<` and `<<-`
    #[serde(default)]
    pub hdoc: Option<Word>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// The word's text when it consists of plain literals only.
    pub fn lit(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Lit(s)] => Some(s),
            [] => Some(""),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcSubstOp {
    /// `<(cmd)`
    In,
    /// `>(cmd)`
    Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordPart {
    Lit(String),
    SglQuoted {
        /// `$'...'` with C-style escapes
        #[serde(default)]
        dollar: bool,
        value: String,
    },
    DblQuoted(Vec<WordPart>),
    Param(Box<ParamExp>),
    CmdSubst(Vec<Stmt>),
    ArithmExp(Box<ArithmExpr>),
    ProcSubst {
        op: ProcSubstOp,
        stmts: Vec<Stmt>,
    },
}

/// `$name`, `${name...}` and every operator form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamExp {
    pub param: String,
    /// `$name` as opposed to `${name}`
    #[serde(default)]
    pub short: bool,
    /// `${!name}` indirection, or `${!prefix*}` with `names`
    #[serde(default)]
    pub excl: bool,
    /// `${#name}`
    #[serde(default)]
    pub length: bool,
    /// `${%name}`
    #[serde(default)]
    pub width: bool,
    #[serde(default)]
    pub index: Option<Box<ArithmExpr>>,
    #[serde(default)]
    pub slice: Option<Slice>,
    #[serde(default)]
    pub repl: Option<Replace>,
    /// `${!prefix*}` or `${!prefix@}`
    #[serde(default)]
    pub names: Option<NamesOp>,
    #[serde(default)]
    pub exp: Option<Expansion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamesOp {
    /// `*`
    Star,
    /// `@`
    At,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub offset: ArithmExpr,
    #[serde(default)]
    pub length: Option<ArithmExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replace {
    /// `//` instead of `/`
    #[serde(default)]
    pub all: bool,
    pub orig: Word,
    #[serde(default)]
    pub with: Option<Word>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParExpOp {
    /// `+`
    AlternateUnset,
    /// `:+`
    AlternateUnsetOrNull,
    /// `-`
    DefaultUnset,
    /// `:-`
    DefaultUnsetOrNull,
    /// `?`
    ErrorUnset,
    /// `:?`
    ErrorUnsetOrNull,
    /// `=`
    AssignUnset,
    /// `:=`
    AssignUnsetOrNull,
    /// `#`
    RemSmallPrefix,
    /// `##`
    RemLargePrefix,
    /// `%`
    RemSmallSuffix,
    /// `%%`
    RemLargeSuffix,
    /// `^`
    UpperFirst,
    /// `^^`
    UpperAll,
    /// `,`
    LowerFirst,
    /// `,,`
    LowerAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    pub op: ParExpOp,
    #[serde(default)]
    pub word: Option<Word>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinAritOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    Pow,
    Eql,
    Neq,
    Lss,
    Gtr,
    Leq,
    Geq,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    Shl,
    Shr,
    /// `&&`
    AndArit,
    /// `||`
    OrArit,
    Comma,
    Assgn,
    AddAssgn,
    SubAssgn,
    MulAssgn,
    QuoAssgn,
    RemAssgn,
    AndAssgn,
    OrAssgn,
    XorAssgn,
    ShlAssgn,
    ShrAssgn,
}

impl BinAritOp {
    pub fn is_assign(self) -> bool {
        matches!(
            self,
            Self::Assgn
                | Self::AddAssgn
                | Self::SubAssgn
                | Self::MulAssgn
                | Self::QuoAssgn
                | Self::RemAssgn
                | Self::AndAssgn
                | Self::OrAssgn
                | Self::XorAssgn
                | Self::ShlAssgn
                | Self::ShrAssgn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnAritOp {
    /// `!`
    Not,
    /// `~`
    BitNegation,
    Inc,
    Dec,
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmExpr {
    /// A number, a variable name, or an expansion producing either
    Word(Word),
    Binary {
        op: BinAritOp,
        x: Box<ArithmExpr>,
        y: Box<ArithmExpr>,
    },
    Unary {
        op: UnAritOp,
        /// `x++` as opposed to `++x`
        #[serde(default)]
        post: bool,
        x: Box<ArithmExpr>,
    },
    Ternary {
        cond: Box<ArithmExpr>,
        then: Box<ArithmExpr>,
        otherwise: Box<ArithmExpr>,
    },
    Paren(Box<ArithmExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinTestOp {
    /// `=~`
    RegexMatch,
    /// `-nt`
    NewerThan,
    /// `-ot`
    OlderThan,
    /// `-ef`
    DevIno,
    /// `-eq`
    Eql,
    /// `-ne`
    Neq,
    /// `-le`
    Leq,
    /// `-ge`
    Geq,
    /// `-lt`
    Lss,
    /// `-gt`
    Gtr,
    /// `&&`
    AndTest,
    /// `||`
    OrTest,
    /// `=`
    MatchShort,
    /// `==`
    Match,
    /// `!=`
    NoMatch,
    /// `<`
    Before,
    /// `>`
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnTestOp {
    /// `-e`, `-a`
    Exists,
    /// `-f`
    RegFile,
    /// `-d`
    Directory,
    /// `-c`
    CharSp,
    /// `-b`
    BlockSp,
    /// `-p`
    NamedPipe,
    /// `-S`
    Socket,
    /// `-L`
    Symlink,
    /// `-h`
    SymlinkH,
    /// `-g`
    GidSet,
    /// `-u`
    UidSet,
    /// `-k`
    Sticky,
    /// `-r`
    Readable,
    /// `-w`
    Writable,
    /// `-x`
    Executable,
    /// `-s`
    NoEmpty,
    /// `-O`
    Owner,
    /// `-G`
    GroupOwner,
    /// `-N`
    Modified,
    /// `-t`
    FdTerminal,
    /// `-z`
    EmptyStr,
    /// `-n`
    NonEmptyStr,
    /// `-o`
    OptSet,
    /// `-v`
    VarSet,
    /// `-R`
    RefVar,
    /// `!`
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestExpr {
    Word(Word),
    Binary {
        op: BinTestOp,
        x: Box<TestExpr>,
        y: Box<TestExpr>,
    },
    Unary {
        op: UnTestOp,
        x: Box<TestExpr>,
    },
    Paren(Box<TestExpr>),
}

/// Constructors for hand-built trees.
///
/// ```rust
/// use shellkit::ast::build::*;
///
/// // echo "$HOME"/bin
/// let s = stmt(call(vec![lit("echo"), word(vec![dbl(vec![param("HOME")]), part_lit("/bin")])]));
/// assert!(s.cmd.is_some());
/// ```
pub mod build {
    use super::*;

    /// Unquoted literal word.
    pub fn lit(s: &str) -> Word {
        Word {
            parts: vec![WordPart::Lit(s.to_string())],
        }
    }

    /// Word from parts.
    pub fn word(parts: Vec<WordPart>) -> Word {
        Word { parts }
    }

    /// Literal words.
    pub fn lits(words: &[&str]) -> Vec<Word> {
        words.iter().map(|w| lit(w)).collect()
    }

    pub fn part_lit(s: &str) -> WordPart {
        WordPart::Lit(s.to_string())
    }

    /// `'...'`
    pub fn sgl(s: &str) -> WordPart {
        WordPart::SglQuoted {
            dollar: false,
            value: s.to_string(),
        }
    }

    /// `"..."`
    pub fn dbl(parts: Vec<WordPart>) -> WordPart {
        WordPart::DblQuoted(parts)
    }

    /// `$name`
    pub fn param(name: &str) -> WordPart {
        WordPart::Param(Box::new(ParamExp {
            param: name.to_string(),
            short: true,
            ..Default::default()
        }))
    }

    /// `${name...}` from a configured expansion.
    pub fn param_exp(pe: ParamExp) -> WordPart {
        WordPart::Param(Box::new(pe))
    }

    /// `${name<op>word}`
    pub fn param_op(name: &str, op: ParExpOp, w: Option<Word>) -> WordPart {
        param_exp(ParamExp {
            param: name.to_string(),
            exp: Some(Expansion { op, word: w }),
            ..Default::default()
        })
    }

    /// `${name[index]}` with a literal index such as `@`, `*` or `2`.
    pub fn param_index(name: &str, index: &str) -> WordPart {
        param_exp(ParamExp {
            param: name.to_string(),
            index: Some(Box::new(ArithmExpr::Word(lit(index)))),
            ..Default::default()
        })
    }

    /// `$(stmts)`
    pub fn cmd_subst(stmts: Vec<Stmt>) -> WordPart {
        WordPart::CmdSubst(stmts)
    }

    /// `$((expr))`
    pub fn arithm_exp(expr: ArithmExpr) -> WordPart {
        WordPart::ArithmExp(Box::new(expr))
    }

    /// Arithmetic operand from literal text.
    pub fn num(s: &str) -> ArithmExpr {
        ArithmExpr::Word(lit(s))
    }

    pub fn arith_bin(op: BinAritOp, x: ArithmExpr, y: ArithmExpr) -> ArithmExpr {
        ArithmExpr::Binary {
            op,
            x: Box::new(x),
            y: Box::new(y),
        }
    }

    pub fn arith_un(op: UnAritOp, post: bool, x: ArithmExpr) -> ArithmExpr {
        ArithmExpr::Unary {
            op,
            post,
            x: Box::new(x),
        }
    }

    /// Plain statement.
    pub fn stmt(cmd: Command) -> Stmt {
        Stmt {
            cmd: Some(cmd),
            ..Default::default()
        }
    }

    /// Simple command from words.
    pub fn call(args: Vec<Word>) -> Command {
        Command::Call(CallExpr {
            assigns: Vec::new(),
            args,
        })
    }

    /// Simple command from literal words, as a statement.
    pub fn cmd(words: &[&str]) -> Stmt {
        stmt(call(lits(words)))
    }

    /// `name=value` with a literal value.
    pub fn assign(name: &str, value: &str) -> Assign {
        Assign {
            name: name.to_string(),
            value: Some(lit(value)),
            ..Default::default()
        }
    }

    /// `name=value` with a word value.
    pub fn assign_word(name: &str, value: Word) -> Assign {
        Assign {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        }
    }

    /// `name=(elems...)`
    pub fn assign_array(name: &str, elems: Vec<Word>) -> Assign {
        Assign {
            name: name.to_string(),
            array: Some(
                elems
                    .into_iter()
                    .map(|value| ArrayElem { index: None, value })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Assignment-only statement.
    pub fn assigns(list: Vec<Assign>) -> Stmt {
        stmt(Command::Call(CallExpr {
            assigns: list,
            args: Vec::new(),
        }))
    }

    pub fn binary(op: BinCmdOp, x: Stmt, y: Stmt) -> Stmt {
        stmt(Command::Binary(BinaryCmd {
            op,
            x: Box::new(x),
            y: Box::new(y),
        }))
    }

    /// `x | y`
    pub fn pipe(x: Stmt, y: Stmt) -> Stmt {
        binary(BinCmdOp::Pipe, x, y)
    }

    /// `x && y`
    pub fn and(x: Stmt, y: Stmt) -> Stmt {
        binary(BinCmdOp::And, x, y)
    }

    /// `x || y`
    pub fn or(x: Stmt, y: Stmt) -> Stmt {
        binary(BinCmdOp::Or, x, y)
    }

    /// `x &`
    pub fn background(mut s: Stmt) -> Stmt {
        s.background = true;
        s
    }

    /// `! x`
    pub fn negated(mut s: Stmt) -> Stmt {
        s.negated = true;
        s
    }

    /// Add a redirection to a statement.
    pub fn redirect(mut s: Stmt, fd: Option<u32>, op: RedirOp, target: Word) -> Stmt {
        s.redirs.push(Redirect {
            fd,
            op,
            word: target,
            hdoc: None,
        });
        s
    }

    /// `name() { body }`
    pub fn func(name: &str, body: Vec<Stmt>) -> Stmt {
        stmt(Command::Func(FuncDecl {
            name: name.to_string(),
            body: Box::new(stmt(Command::Block(body))),
        }))
    }

    /// `if cond; then then; else otherwise; fi`
    pub fn if_else(cond: Vec<Stmt>, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
        stmt(Command::If(IfClause {
            cond,
            then,
            else_branch: otherwise.map(|stmts| {
                Box::new(IfClause {
                    cond: Vec::new(),
                    then: stmts,
                    else_branch: None,
                })
            }),
        }))
    }

    /// `for name in items; do body; done`
    pub fn for_in(name: &str, items: Vec<Word>, body: Vec<Stmt>) -> Stmt {
        stmt(Command::For(ForClause {
            head: Loop::WordIter {
                name: name.to_string(),
                items: Some(items),
            },
            body,
        }))
    }

    /// `while cond; do body; done`
    pub fn while_loop(cond: Vec<Stmt>, body: Vec<Stmt>) -> Stmt {
        stmt(Command::While(WhileClause {
            until: false,
            cond,
            body,
        }))
    }

    /// Script from statements.
    pub fn file(stmts: Vec<Stmt>) -> File {
        File {
            name: "shellkit".to_string(),
            stmts,
        }
    }
}
