//! Shellkit CLI - run shell syntax trees
//!
//! Shellkit has no parser of its own, so scripts arrive as the JSON form of
//! a syntax tree:
//!
//!   shellkit script.json a b       # Run a tree file with $1=a $2=b
//!   shellkit -c '{"stmts": [...]}'  # Run a tree given inline
//!   shellkit < script.json         # Read the tree from stdin
//!
//! Log output goes to stderr; `--log-level` or `RUST_LOG` selects it.

use anyhow::{Context, Result};
use clap::Parser;
use shellkit::ast::File;
use shellkit::env::ListEnviron;
use shellkit::{CancellationToken, JsonParse, ParseHandler, Runner};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Shellkit - run a shell syntax tree
#[derive(Parser, Debug)]
#[command(name = "shellkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run the given JSON syntax tree
    #[arg(short = 'c')]
    command: Option<String>,

    /// Syntax tree file to run; `-` or nothing reads stdin
    #[arg()]
    script: Option<PathBuf>,

    /// Positional parameters for the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Working directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Decode a syntax tree, naming it after where it came from.
fn load(name: &str, src: &str) -> Result<File> {
    JsonParse
        .parse(name, src)
        .with_context(|| format!("invalid syntax tree in {name}"))
}

async fn read_source(script: Option<&Path>) -> Result<(String, String)> {
    match script {
        Some(path) if path != Path::new("-") => {
            let src = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read script: {}", path.display()))?;
            Ok((path.display().to_string(), src))
        }
        _ => {
            let mut src = String::new();
            tokio::io::stdin()
                .read_to_string(&mut src)
                .await
                .context("failed to read stdin")?;
            Ok(("shellkit".to_string(), src))
        }
    }
}

/// Process exit byte for a shell status.
fn exit_byte(status: i32) -> u8 {
    (status & 0xff) as u8
}

async fn run(args: Args) -> Result<ExitCode> {
    let (name, src) = match args.command {
        Some(cmd) => ("shellkit".to_string(), cmd),
        None => read_source(args.script.as_deref()).await?,
    };
    let tree = load(&name, &src)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let mut builder = Runner::builder()
        .environ(ListEnviron::from_process())
        .stdin(shellkit::io::InputStream::stdin())
        .params(args.args)
        .name(&name)
        .cancellation(cancel);
    if let Some(dir) = args.dir {
        builder = builder.dir(dir);
    }
    let mut runner = builder.build();

    match runner.run(&tree).await {
        Ok(result) => Ok(ExitCode::from(exit_byte(result.exit_code))),
        Err(shellkit::Error::Cancelled) => Ok(ExitCode::from(130)),
        Err(e) => Err(e).context("execution failed"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("shellkit: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TREE: &str = r#"{"stmts": [{"cmd": {"call": {"args": [{"parts": [{"lit": "true"}]}]}}}]}"#;

    #[test]
    fn test_load_names_tree_after_source() {
        let file = load("job.json", TREE).unwrap();
        assert_eq!(file.name, "job.json");
        assert_eq!(file.stmts.len(), 1);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let err = load("bad.json", "{not json").unwrap_err();
        assert!(format!("{err:#}").contains("invalid syntax tree in bad.json"));
    }

    #[tokio::test]
    async fn test_read_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(&path, TREE).unwrap();
        let (name, src) = read_source(Some(&path)).await.unwrap();
        assert_eq!(name, path.display().to_string());
        assert_eq!(src, TREE);
    }

    #[tokio::test]
    async fn test_read_source_missing_file() {
        let err = read_source(Some(Path::new("/nonexistent/tree.json")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read script"));
    }

    #[test]
    fn test_args_parse_trailing_params() {
        let args = Args::parse_from(["shellkit", "--dir", "/tmp", "tree.json", "a", "-b"]);
        assert_eq!(args.script, Some(PathBuf::from("tree.json")));
        assert_eq!(args.args, vec!["a", "-b"]);
        assert_eq!(args.dir, Some(PathBuf::from("/tmp")));
        assert_eq!(args.log_level, "warn");
    }

    #[test]
    fn test_exit_byte_wraps() {
        assert_eq!(exit_byte(256), 0);
        assert_eq!(exit_byte(3), 3);
    }
}
