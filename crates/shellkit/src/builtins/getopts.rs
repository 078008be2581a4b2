//! getopts builtin - parse positional options

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::env::{Variable, WriteEnviron, valid_name};
use crate::error::Result;
use crate::interp::ExecResult;

/// What one call found.
enum Found {
    /// An option, with its argument if it takes one.
    Opt(char, Option<String>),
    Unknown(char),
    MissingArg(char),
    End,
}

/// The getopts builtin - parse option arguments.
///
/// Usage: getopts OPTSTRING NAME [ARG...]
///
/// Each call stores the next option letter in NAME and its argument in
/// `OPTARG`, advancing `OPTIND`. The position inside a word of grouped
/// options (`-abc`) is kept on the runner between calls. A leading `:` in
/// OPTSTRING selects silent error reporting. Returns 1 when the options
/// are exhausted.
pub struct Getopts;

#[async_trait]
impl Builtin for Getopts {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (Some(optstring), Some(name)) = (ctx.args.first(), ctx.args.get(1)) else {
            return Ok(ctx.failure("usage: getopts optstring name [arg ...]", 2));
        };
        if !valid_name(name) {
            return Ok(ctx.error(format!("`{name}': not a valid identifier")));
        }
        let args: Vec<String> = if ctx.args.len() > 2 {
            ctx.args[2..].to_vec()
        } else {
            ctx.runner.params().to_vec()
        };
        let (silent, spec) = match optstring.strip_prefix(':') {
            Some(spec) => (true, spec),
            None => (false, optstring.as_str()),
        };

        let runner = &mut *ctx.runner;
        let optind = runner.var("OPTIND").trim().parse::<usize>().unwrap_or(1).max(1);
        let mut idx = optind - 1;
        let mut pos = runner.getopts_pos;

        let found = 'scan: {
            if pos == 0 {
                let Some(word) = args.get(idx) else {
                    break 'scan Found::End;
                };
                if word == "--" {
                    idx += 1;
                    break 'scan Found::End;
                }
                if !word.starts_with('-') || word == "-" {
                    break 'scan Found::End;
                }
                pos = 1;
            }
            let Some(word) = args.get(idx) else {
                pos = 0;
                break 'scan Found::End;
            };
            let chars: Vec<char> = word.chars().collect();
            let Some(&c) = chars.get(pos) else {
                idx += 1;
                pos = 0;
                break 'scan Found::End;
            };
            pos += 1;
            let rest: String = chars[pos..].iter().collect();
            if pos >= chars.len() {
                idx += 1;
                pos = 0;
            }

            let Some(at) = spec.find(c).filter(|_| c != ':') else {
                break 'scan Found::Unknown(c);
            };
            if !spec[at + c.len_utf8()..].starts_with(':') {
                break 'scan Found::Opt(c, None);
            }
            if pos != 0 {
                idx += 1;
                pos = 0;
                break 'scan Found::Opt(c, Some(rest));
            }
            match args.get(idx) {
                Some(arg) => {
                    idx += 1;
                    Found::Opt(c, Some(arg.clone()))
                }
                None => Found::MissingArg(c),
            }
        };

        runner.getopts_pos = pos;
        runner.set("OPTIND", Variable::string((idx + 1).to_string()))?;
        let report = !silent && runner.var("OPTERR") != "0";
        let prefix = runner.shell_name().to_string();
        let mut stderr = String::new();
        let (letter, optarg, status) = match found {
            Found::Opt(c, arg) => (c.to_string(), arg, 0),
            Found::End => ("?".to_string(), None, 1),
            Found::Unknown(c) if silent => ("?".to_string(), Some(c.to_string()), 0),
            Found::Unknown(c) => {
                if report {
                    stderr = format!("{prefix}: illegal option -- {c}\n");
                }
                ("?".to_string(), None, 0)
            }
            Found::MissingArg(c) if silent => (":".to_string(), Some(c.to_string()), 0),
            Found::MissingArg(c) => {
                if report {
                    stderr = format!("{prefix}: option requires an argument -- {c}\n");
                }
                ("?".to_string(), None, 0)
            }
        };
        if let Err(e) = runner.assign_scalar(name, letter, false) {
            return Ok(ctx.error(e));
        }
        let optarg = optarg.map(Variable::string).unwrap_or_default();
        runner.set("OPTARG", optarg)?;
        Ok(ExecResult {
            stderr,
            ..ExecResult::status(status)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::env::Environ;
    use crate::interp::testing::*;
    use crate::Runner;
    use pretty_assertions::assert_eq;

    async fn collect(optstring: &str, args: &[&str]) -> (Vec<String>, String) {
        let mut r = runner();
        let mut out = Vec::new();
        for _ in 0..10 {
            let mut argv = vec!["getopts", optstring, "opt"];
            argv.extend_from_slice(args);
            let res = builtin(&mut r, &argv).await;
            if res.exit_code != 0 {
                break;
            }
            let arg = r.get("OPTARG");
            let shown = if arg.is_set() {
                format!("{}={}", r.var("opt"), arg.str_value())
            } else {
                r.var("opt")
            };
            out.push(shown);
        }
        (out, r.var("OPTIND"))
    }

    #[tokio::test]
    async fn test_grouped_and_separate_arguments() {
        let (opts, optind) = collect("ab:c", &["-ac", "-bval", "-b", "x", "file"]).await;
        assert_eq!(opts, ["a", "c", "b=val", "b=x"]);
        assert_eq!(optind, "5");
    }

    #[tokio::test]
    async fn test_double_dash_ends_options() {
        let (opts, optind) = collect("a", &["-a", "--", "-a"]).await;
        assert_eq!(opts, ["a"]);
        assert_eq!(optind, "3");
    }

    #[tokio::test]
    async fn test_unknown_option_reporting() {
        let mut r = runner();
        let res = builtin(&mut r, &["getopts", "a", "o", "-z"]).await;
        assert_eq!(res.exit_code, 0);
        assert_eq!(r.var("o"), "?");
        assert!(res.stderr.contains("illegal option -- z"));
        assert!(!r.get("OPTARG").is_set());

        let mut r = runner();
        let res = builtin(&mut r, &["getopts", ":a", "o", "-z"]).await;
        assert_eq!(res.stderr, "");
        assert_eq!(r.var("o"), "?");
        assert_eq!(r.var("OPTARG"), "z");
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let mut r = runner();
        let res = builtin(&mut r, &["getopts", ":b:", "o", "-b"]).await;
        assert_eq!(res.exit_code, 0);
        assert_eq!(r.var("o"), ":");
        assert_eq!(r.var("OPTARG"), "b");

        let mut r = runner();
        let res = builtin(&mut r, &["getopts", "b:", "o", "-b"]).await;
        assert_eq!(r.var("o"), "?");
        assert!(res.stderr.contains("option requires an argument -- b"));
    }

    #[tokio::test]
    async fn test_reads_positional_parameters_in_loop() {
        let mut r = Runner::builder().params(["-x", "-y", "rest"]).capture().build();
        let getopts = stmt(call(vec![lit("getopts"), lit("xy"), lit("f")]));
        let body = vec![stmt(call(vec![lit("echo"), word(vec![param("f")])]))];
        let res = r
            .run(&file(vec![
                while_loop(vec![getopts], body),
                stmt(call(vec![lit("echo"), word(vec![param("OPTIND")])])),
            ]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "x\ny\n3\n");
    }
}
