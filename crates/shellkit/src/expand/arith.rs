//! Integer arithmetic over [`ArithmExpr`] trees
//!
//! Operands are numbers (decimal, `0x` hex, leading-zero octal, `base#digits`)
//! or variable names, looked up recursively so that `a=b; b=3; $((a))` is 3.
//! Overflow wraps like the C integers shells use.

use futures_util::future::{BoxFuture, FutureExt};

use super::{Config, literal};
use crate::ast::{ArithmExpr, BinAritOp, UnAritOp};
use crate::env::{self, Value, Variable};
use crate::error::{Error, Result};

/// Names referring to names deeper than this are an error.
const MAX_LOOKUP_DEPTH: usize = 100;

/// Evaluate an arithmetic expression.
pub fn arithm<'a>(cfg: &'a mut dyn Config, expr: &'a ArithmExpr) -> BoxFuture<'a, Result<i64>> {
    async move {
        match expr {
            ArithmExpr::Word(w) => {
                let s = literal(cfg, w).await?;
                eval_str(cfg, &s, 0)
            }
            ArithmExpr::Paren(x) => arithm(cfg, x).await,
            ArithmExpr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if arithm(cfg, cond).await? != 0 {
                    arithm(cfg, then).await
                } else {
                    arithm(cfg, otherwise).await
                }
            }
            ArithmExpr::Unary { op, post, x } => unary(cfg, *op, *post, x).await,
            ArithmExpr::Binary { op, x, y } => match op {
                BinAritOp::AndArit => {
                    if arithm(cfg, x).await? == 0 {
                        return Ok(0);
                    }
                    Ok(i64::from(arithm(cfg, y).await? != 0))
                }
                BinAritOp::OrArit => {
                    if arithm(cfg, x).await? != 0 {
                        return Ok(1);
                    }
                    Ok(i64::from(arithm(cfg, y).await? != 0))
                }
                BinAritOp::Comma => {
                    arithm(cfg, x).await?;
                    arithm(cfg, y).await
                }
                op if op.is_assign() => {
                    let target = target(cfg, x).await?;
                    let rhs = arithm(cfg, y).await?;
                    let value = match compound_base(*op) {
                        Some(base) => binary(base, target.current(cfg)?, rhs)?,
                        None => rhs,
                    };
                    target.store(cfg, value)?;
                    Ok(value)
                }
                op => {
                    let a = arithm(cfg, x).await?;
                    let b = arithm(cfg, y).await?;
                    binary(*op, a, b)
                }
            },
        }
    }
    .boxed()
}

async fn unary(cfg: &mut dyn Config, op: UnAritOp, post: bool, x: &ArithmExpr) -> Result<i64> {
    match op {
        UnAritOp::Inc | UnAritOp::Dec => {
            let target = target(cfg, x).await?;
            let old = target.current(cfg)?;
            let new = if op == UnAritOp::Inc {
                old.wrapping_add(1)
            } else {
                old.wrapping_sub(1)
            };
            target.store(cfg, new)?;
            Ok(if post { old } else { new })
        }
        UnAritOp::Not => Ok(i64::from(arithm(cfg, x).await? == 0)),
        UnAritOp::BitNegation => Ok(!arithm(cfg, x).await?),
        UnAritOp::Plus => arithm(cfg, x).await,
        UnAritOp::Minus => Ok(arithm(cfg, x).await?.wrapping_neg()),
    }
}

fn compound_base(op: BinAritOp) -> Option<BinAritOp> {
    Some(match op {
        BinAritOp::AddAssgn => BinAritOp::Add,
        BinAritOp::SubAssgn => BinAritOp::Sub,
        BinAritOp::MulAssgn => BinAritOp::Mul,
        BinAritOp::QuoAssgn => BinAritOp::Quo,
        BinAritOp::RemAssgn => BinAritOp::Rem,
        BinAritOp::AndAssgn => BinAritOp::And,
        BinAritOp::OrAssgn => BinAritOp::Or,
        BinAritOp::XorAssgn => BinAritOp::Xor,
        BinAritOp::ShlAssgn => BinAritOp::Shl,
        BinAritOp::ShrAssgn => BinAritOp::Shr,
        _ => return None,
    })
}

fn binary(op: BinAritOp, a: i64, b: i64) -> Result<i64> {
    Ok(match op {
        BinAritOp::Add => a.wrapping_add(b),
        BinAritOp::Sub => a.wrapping_sub(b),
        BinAritOp::Mul => a.wrapping_mul(b),
        BinAritOp::Quo | BinAritOp::Rem if b == 0 => {
            return Err(Error::Expansion("division by 0".into()));
        }
        BinAritOp::Quo => a.wrapping_div(b),
        BinAritOp::Rem => a.wrapping_rem(b),
        BinAritOp::Pow => {
            if b < 0 {
                return Err(Error::Expansion("exponent less than 0".into()));
            }
            a.wrapping_pow(u32::try_from(b).unwrap_or(u32::MAX))
        }
        BinAritOp::Eql => i64::from(a == b),
        BinAritOp::Neq => i64::from(a != b),
        BinAritOp::Lss => i64::from(a < b),
        BinAritOp::Gtr => i64::from(a > b),
        BinAritOp::Leq => i64::from(a <= b),
        BinAritOp::Geq => i64::from(a >= b),
        BinAritOp::And => a & b,
        BinAritOp::Or => a | b,
        BinAritOp::Xor => a ^ b,
        BinAritOp::Shl => a.wrapping_shl(b as u32),
        BinAritOp::Shr => a.wrapping_shr(b as u32),
        other => {
            return Err(Error::Internal(format!("{other:?} is not a plain operator")));
        }
    })
}

/// A variable, or one element of it, that an assignment writes to.
struct Target {
    name: String,
    subscript: Option<String>,
}

async fn target(cfg: &mut dyn Config, x: &ArithmExpr) -> Result<Target> {
    let ArithmExpr::Word(w) = x else {
        return Err(Error::Expansion(
            "attempted assignment to non-variable".into(),
        ));
    };
    let s = literal(cfg, w).await?;
    match split_subscript(s.trim()) {
        Some((name, subscript)) => Ok(Target {
            name: name.to_string(),
            subscript: subscript.map(str::to_string),
        }),
        None => Err(Error::Expansion(format!(
            "{s}: attempted assignment to non-variable"
        ))),
    }
}

impl Target {
    fn current(&self, cfg: &dyn Config) -> Result<i64> {
        let value = lookup(cfg, &self.name, self.subscript.as_deref())?;
        eval_str(cfg, &value, 1)
    }

    fn store(&self, cfg: &mut dyn Config, value: i64) -> Result<()> {
        let (name, current) = env::resolve(&*cfg, &self.name);
        let mut vr = if current.is_declared() {
            current
        } else {
            Variable::default()
        };
        match &self.subscript {
            None => vr.set_scalar(value.to_string()),
            Some(key) if matches!(vr.value, Value::Associative(_)) => {
                vr.set_key(key.clone(), value.to_string())
            }
            Some(index) => {
                let i = eval_str(cfg, index, 1)?;
                vr.set_element(i, value.to_string())?;
            }
        }
        cfg.set(&name, vr)
    }
}

/// Split `name` or `name[subscript]`.
fn split_subscript(s: &str) -> Option<(&str, Option<&str>)> {
    if let Some(open) = s.find('[') {
        let inner = s[open + 1..].strip_suffix(']')?;
        let name = &s[..open];
        return env::valid_name(name).then_some((name, Some(inner)));
    }
    env::valid_name(s).then_some((s, None))
}

fn lookup(cfg: &dyn Config, name: &str, subscript: Option<&str>) -> Result<String> {
    let (_, vr) = env::resolve(cfg, name);
    Ok(match (subscript, &vr.value) {
        (None, _) => vr.str_value().to_string(),
        (Some(key), Value::Associative(map)) => map.get(key).cloned().unwrap_or_default(),
        (Some(index), _) => {
            let i = eval_str(cfg, index, 1)?;
            vr.element(i).unwrap_or_default().to_string()
        }
    })
}

/// Evaluate the text of an operand: a number, a variable reference whose
/// value is evaluated in turn, or empty for zero.
pub(crate) fn eval_str(cfg: &dyn Config, s: &str, depth: usize) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if depth > MAX_LOOKUP_DEPTH {
        return Err(Error::Expansion(format!(
            "{s}: expression recursion level exceeded"
        )));
    }
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    if unsigned.starts_with(|c: char| c.is_ascii_digit()) {
        return parse_number(s);
    }
    if let Some((name, subscript)) = split_subscript(s) {
        let value = lookup(cfg, name, subscript)?;
        return eval_str(cfg, &value, depth + 1);
    }
    Err(Error::Expansion(format!(
        "{s}: arithmetic syntax error: operand expected"
    )))
}

/// Parse an integer literal: decimal, `0x` hex, leading-zero octal or
/// `base#digits` with a base from 2 to 64. A leading sign is accepted.
pub fn parse_number(s: &str) -> Result<i64> {
    let invalid = || Error::Expansion(format!("{s}: value too great for base"));
    let (neg, digits) = match s.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (base, digits) = if let Some((base, rest)) = digits.split_once('#') {
        let base: u32 = base
            .parse()
            .ok()
            .filter(|b| (2..=64).contains(b))
            .ok_or_else(|| Error::Expansion(format!("{s}: invalid arithmetic base")))?;
        (base, rest)
    } else if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.is_empty() {
        return Err(invalid());
    }
    let mut n: i64 = 0;
    for c in digits.chars() {
        let d = digit_value(c, base).ok_or_else(invalid)?;
        n = n.wrapping_mul(i64::from(base)).wrapping_add(i64::from(d));
    }
    Ok(if neg { n.wrapping_neg() } else { n })
}

fn digit_value(c: char, base: u32) -> Option<u32> {
    let d = match c {
        '0'..='9' => c as u32 - '0' as u32,
        'a'..='z' => c as u32 - 'a' as u32 + 10,
        'A'..='Z' if base <= 36 => c as u32 - 'A' as u32 + 10,
        'A'..='Z' => c as u32 - 'A' as u32 + 36,
        '@' => 62,
        '_' => 63,
        _ => return None,
    };
    (d < base).then_some(d)
}
