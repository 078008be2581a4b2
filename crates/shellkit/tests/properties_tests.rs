//! Script-level behaviour of the runner
//!
//! Covers: parameter defaults, substrings, field splitting, brace
//! expansion, pipefail, errexit, background jobs and read-only variables.

use pretty_assertions::assert_eq;
use shellkit::ast::build::*;
use shellkit::ast::{ArithmExpr, ParExpOp, ParamExp, Slice, Stmt, UnAritOp};
use shellkit::{ExecResult, Runner};
use std::time::{Duration, Instant};

async fn run(stmts: Vec<Stmt>) -> ExecResult {
    let mut runner = Runner::builder().capture().build();
    runner.run(&file(stmts)).await.unwrap()
}

fn echo(parts: Vec<shellkit::ast::WordPart>) -> Stmt {
    stmt(call(vec![lit("echo"), word(parts)]))
}

fn substr(name: &str, offset: ArithmExpr, length: Option<ArithmExpr>) -> shellkit::ast::WordPart {
    param_exp(ParamExp {
        param: name.to_string(),
        slice: Some(Slice { offset, length }),
        ..Default::default()
    })
}

/// `${var:-default}` uses the default for unset and empty values and
/// leaves the variable untouched
#[tokio::test]
async fn default_value_for_unset_and_empty() {
    let default = || Some(lit("fallback"));
    let res = run(vec![
        echo(vec![param_op("unset_var", ParExpOp::DefaultUnsetOrNull, default())]),
        assigns(vec![assign("empty", "")]),
        echo(vec![param_op("empty", ParExpOp::DefaultUnsetOrNull, default())]),
        assigns(vec![assign("full", "value")]),
        echo(vec![param_op("full", ParExpOp::DefaultUnsetOrNull, default())]),
        echo(vec![param_op("unset_var", ParExpOp::DefaultUnset, Some(lit("still-unset")))]),
        echo(vec![param_op("unset_var", ParExpOp::AlternateUnset, Some(lit("set")))]),
    ])
    .await;
    assert_eq!(res.stdout, "fallback\nfallback\nvalue\nstill-unset\n\n");
}

/// `${var:=word}` assigns
#[tokio::test]
async fn assign_default() {
    let res = run(vec![
        echo(vec![param_op("x", ParExpOp::AssignUnsetOrNull, Some(lit("given")))]),
        echo(vec![param("x")]),
    ])
    .await;
    assert_eq!(res.stdout, "given\ngiven\n");
}

/// `${var:?msg}` fails the command with the message
#[tokio::test]
async fn error_when_unset() {
    let res = run(vec![
        echo(vec![param_op("missing", ParExpOp::ErrorUnsetOrNull, Some(lit("is required")))]),
        echo(vec![part_lit("after")]),
    ])
    .await;
    assert!(res.stderr.contains("missing: is required"), "{}", res.stderr);
}

/// Substrings clamp offsets and lengths
#[tokio::test]
async fn substring_bounds() {
    let minus = |n: &str| arith_un(UnAritOp::Minus, false, num(n));
    let res = run(vec![
        assigns(vec![assign_word("var", word(vec![sgl("hello world")]))]),
        echo(vec![dbl(vec![substr("var", num("4"), Some(num("2")))])]),
        echo(vec![substr("var", minus("3"), None)]),
        echo(vec![substr("var", minus("50"), Some(num("5")))]),
        echo(vec![substr("var", num("6"), Some(num("100")))]),
    ])
    .await;
    assert_eq!(res.stdout, "o \nrld\nhello\nworld\n");
}

/// Whitespace runs collapse; explicit separators keep empty fields
#[tokio::test]
async fn field_splitting() {
    let count = |name: &str| {
        vec![
            stmt(call(vec![lit("set"), lit("--"), word(vec![param(name)])])),
            echo(vec![param("#")]),
        ]
    };
    let mut stmts = vec![
        assigns(vec![assign_word("ws", word(vec![sgl("a  b")]))]),
        assigns(vec![assign("csv", "a,,b")]),
    ];
    stmts.extend(count("ws"));
    stmts.push(assigns(vec![assign("IFS", ",")]));
    stmts.extend(count("csv"));
    stmts.push(stmt(call(vec![
        lit("printf"),
        word(vec![sgl("[%s]")]),
        word(vec![param("csv")]),
    ])));
    let res = run(stmts).await;
    assert_eq!(res.stdout, "2\n3\n[a][][b]");
}

/// Sequences and lists expand; malformed braces stay literal
#[tokio::test]
async fn brace_expansion() {
    let res = run(vec![
        cmd(&["echo", "a{1..3}"]),
        cmd(&["echo", "a{1,2"]),
        cmd(&["echo", "{x,y}{1,2}"]),
        cmd(&["echo", "{5..1..2}"]),
        cmd(&["echo", "{a..c}"]),
    ])
    .await;
    assert_eq!(res.stdout, "a1 a2 a3\na{1,2\nx1 x2 y1 y2\n5 3 1\na b c\n");
}

/// The last stage decides the status unless pipefail is on
#[tokio::test]
async fn pipefail_status() {
    let res = run(vec![pipe(cmd(&["false"]), cmd(&["true"]))]).await;
    assert_eq!(res.exit_code, 0);

    let res = run(vec![
        cmd(&["set", "-o", "pipefail"]),
        pipe(cmd(&["false"]), cmd(&["true"])),
    ])
    .await;
    assert_eq!(res.exit_code, 1);
}

/// errexit stops at the first failing command
#[tokio::test]
async fn errexit_stops_script() {
    let res = run(vec![cmd(&["set", "-e"]), cmd(&["false"]), cmd(&["echo", "never"])]).await;
    assert_eq!(res.stdout, "");
    assert_eq!(res.exit_code, 1);

    let res = run(vec![cmd(&["false"]), cmd(&["echo", "never"])]).await;
    assert_eq!(res.stdout, "never\n");
    assert_eq!(res.exit_code, 0);
}

/// Conditions, negations and && lists do not trip errexit
#[tokio::test]
async fn errexit_exempt_contexts() {
    let res = run(vec![
        cmd(&["set", "-e"]),
        if_else(vec![cmd(&["false"])], vec![], Some(vec![cmd(&["echo", "else"])])),
        negated(cmd(&["true"])),
        and(cmd(&["false"]), cmd(&["echo", "skipped"])),
        cmd(&["echo", "survived"]),
    ])
    .await;
    assert_eq!(res.stdout, "else\nsurvived\n");
}

/// wait blocks until background jobs are done
#[tokio::test]
async fn background_sleep_then_wait() {
    let start = Instant::now();
    let res = run(vec![
        background(cmd(&["sleep", "0.1"])),
        cmd(&["wait"]),
        cmd(&["echo", "done"]),
    ])
    .await;
    assert_eq!(res.stdout, "done\n");
    assert!(start.elapsed() >= Duration::from_millis(90));
}

/// A read-only variable keeps its value
#[tokio::test]
async fn readonly_assignment_fails() {
    let res = run(vec![
        cmd(&["readonly", "LOCKED=1"]),
        assigns(vec![assign("LOCKED", "2")]),
        echo(vec![param("?")]),
        echo(vec![param("LOCKED")]),
    ])
    .await;
    assert_eq!(res.stdout, "1\n1\n");
    assert!(res.stderr.contains("LOCKED: readonly variable"), "{}", res.stderr);
}

/// Functions see their own positional parameters and locals
#[tokio::test]
async fn function_scope() {
    let res = run(vec![
        assigns(vec![assign("v", "global")]),
        func(
            "f",
            vec![
                cmd(&["local", "v=local"]),
                echo(vec![param("1"), part_lit(":"), param("v")]),
                cmd(&["return", "3"]),
            ],
        ),
        cmd(&["f", "arg"]),
        echo(vec![param("?"), part_lit(":"), param("v")]),
    ])
    .await;
    assert_eq!(res.stdout, "arg:local\n3:global\n");
}

/// Nested loops unwind with break N
#[tokio::test]
async fn break_out_of_nested_loops() {
    let inner = for_in(
        "j",
        lits(&["1", "2"]),
        vec![echo(vec![param("i"), param("j")]), cmd(&["break", "2"])],
    );
    let res = run(vec![
        for_in("i", lits(&["a", "b"]), vec![inner]),
        cmd(&["echo", "end"]),
    ])
    .await;
    assert_eq!(res.stdout, "a1\nend\n");
}

/// Command substitution drops trailing newlines and runs in a subshell
#[tokio::test]
async fn command_substitution() {
    let res = run(vec![
        assigns(vec![assign_word(
            "out",
            word(vec![cmd_subst(vec![
                assigns(vec![assign("inner", "x")]),
                stmt(call(vec![lit("printf"), word(vec![sgl("line\\n\\n")])])),
            ])]),
        )]),
        echo(vec![part_lit("["), param("out"), part_lit("]"), param("inner")]),
    ])
    .await;
    assert_eq!(res.stdout, "[line]\n");
}

/// Pipeline stages do not leak assignments
#[tokio::test]
async fn pipeline_stages_are_subshells() {
    let res = run(vec![
        assigns(vec![assign("x", "before")]),
        pipe(cmd(&["echo", "data"]), assigns(vec![assign("x", "after")])),
        echo(vec![param("x")]),
    ])
    .await;
    assert_eq!(res.stdout, "before\n");
}

/// Arithmetic expansion follows C precedence
#[tokio::test]
async fn arithmetic_expansion() {
    use shellkit::ast::BinAritOp::*;
    let expr = arith_bin(
        Add,
        num("2"),
        arith_bin(Mul, num("3"), arith_bin(Pow, num("2"), num("3"))),
    );
    let res = run(vec![echo(vec![arithm_exp(expr)])]).await;
    assert_eq!(res.stdout, "26\n");
}
