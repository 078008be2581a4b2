//! Property-based tests for the expansion engine
//!
//! Arithmetic against i64 semantics, IFS splitting and parameter defaults.

use proptest::prelude::*;
use shellkit::ast::build::*;
use shellkit::ast::{ArithmExpr, BinAritOp, ParExpOp};
use shellkit::expand;
use shellkit::Runner;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

fn eval(expr: &ArithmExpr) -> shellkit::Result<i64> {
    let mut runner = Runner::new();
    block_on(expand::arithm(&mut runner, expr))
}

fn int(n: i64) -> ArithmExpr {
    num(&n.to_string())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Addition, subtraction and multiplication match i64
    #[test]
    fn basic_ops_match_i64(a in 0i64..100_000, b in 0i64..100_000) {
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Add, int(a), int(b))).unwrap(), a + b);
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Sub, int(a), int(b))).unwrap(), a - b);
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Mul, int(a), int(b))).unwrap(), a * b);
    }

    /// Division and remainder truncate toward zero like C
    #[test]
    fn division_truncates(a in 0i64..100_000, b in 1i64..1000) {
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Quo, int(a), int(b))).unwrap(), a / b);
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Rem, int(a), int(b))).unwrap(), a % b);
    }

    /// Comparisons yield 1 or 0
    #[test]
    fn comparisons_are_boolean(a in 0i64..1000, b in 0i64..1000) {
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Lss, int(a), int(b))).unwrap(), i64::from(a < b));
        prop_assert_eq!(eval(&arith_bin(BinAritOp::Eql, int(a), int(b))).unwrap(), i64::from(a == b));
    }

    /// Decimal and hexadecimal literals parse back to the same value
    #[test]
    fn number_literals(n in 0i64..i64::MAX) {
        prop_assert_eq!(expand::parse_number(&n.to_string()).unwrap(), n);
        prop_assert_eq!(expand::parse_number(&format!("0x{n:x}")).unwrap(), n);
    }

    /// Runs of default IFS whitespace never produce empty fields
    #[test]
    fn whitespace_splitting_drops_empties(
        words in prop::collection::vec("[a-z]{1,5}", 0..6),
        gaps in prop::collection::vec("[ \t\n]{1,3}", 7),
    ) {
        let mut text = gaps[6].clone();
        for (i, w) in words.iter().enumerate() {
            text.push_str(w);
            text.push_str(&gaps[i]);
        }
        let runner = Runner::new();
        prop_assert_eq!(expand::split_ifs(&runner, &text), words);
    }

    /// Non-whitespace separators keep empty fields, except a trailing one
    #[test]
    fn hard_separators_keep_empties(
        mut fields in prop::collection::vec("[a-z]{0,3}", 1..6),
        last in "[a-z]{1,3}",
    ) {
        fields.push(last);
        let mut runner = Runner::new();
        runner.set_var("IFS", ",").unwrap();
        prop_assert_eq!(expand::split_ifs(&runner, &fields.join(",")), fields);
    }

    /// `${v:-d}` is the value when set and non-empty, else the default
    #[test]
    fn default_operator(value in "[a-z]{0,6}", default in "[A-Z]{1,6}") {
        let mut runner = Runner::builder().env("v", &value).build();
        let w = word(vec![param_op("v", ParExpOp::DefaultUnsetOrNull, Some(lit(&default)))]);
        let got = block_on(expand::literal(&mut runner, &w)).unwrap();
        let want = if value.is_empty() { default } else { value };
        prop_assert_eq!(got, want);
    }
}
