//! Tree-walking runner
//!
//! [`Runner`] executes a [`File`] against its own variables, functions,
//! options and descriptor table. Everything that touches the outside world
//! goes through the hooks in [`crate::hooks`]: commands that are neither
//! functions nor builtins go to the exec hook, redirection targets to the
//! open hook, and `source`/`eval` text to the parse hook.
//!
//! Subshells (`( ... )`, pipeline stages, background jobs, substitutions)
//! are independent copies of the runner; nothing they change leaks back.

mod decl;
mod exec;
mod jobs;
mod redirect;
mod state;
mod subst;
pub(crate) mod test;
mod vars;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::ast::{File, Stmt};
use crate::builtins::{self, Builtin};
use crate::env::{Environ, ListEnviron, Overlay, Variable, WriteEnviron};
use crate::error::{Error, Result};
use crate::hooks::{
    DEFAULT_KILL_TIMEOUT, ExecHandler, HandlerContext, JsonParse, OpenHandler, ParseHandler,
    ProcessExec, ProcessOpen,
};
use crate::io::{Capture, InputStream, OutputStream, Stream};
use crate::limits::{ExecutionCounters, ExecutionLimits};
use crate::logging::{LogConfig, log_debug};

pub(crate) use decl::{DeclArg, declare};
pub(crate) use exec::Lookup;
pub use jobs::JobTable;
pub use state::{ExecResult, Flow, Opt, OptionSet};
use state::ShellVars;
use subst::ProcSubst;

/// Executes syntax trees.
///
/// ```rust
/// use shellkit::ast::build::*;
/// use shellkit::Runner;
///
/// # tokio_test::block_on(async {
/// let mut runner = Runner::builder().capture().build();
/// let result = runner.run(&file(vec![cmd(&["echo", "hello"])])).await.unwrap();
/// assert_eq!(result.stdout, "hello\n");
/// # });
/// ```
pub struct Runner {
    pub(crate) exec: Arc<dyn ExecHandler>,
    pub(crate) open: Arc<dyn OpenHandler>,
    pub(crate) parse: Arc<dyn ParseHandler>,
    pub(crate) builtins: Arc<HashMap<String, Arc<dyn Builtin>>>,
    pub(crate) limits: ExecutionLimits,
    pub(crate) log_config: LogConfig,
    pub(crate) kill_timeout: Duration,
    pub(crate) cancel: CancellationToken,
    /// Environment the global scope starts from
    parent: Arc<dyn Environ>,
    initial_env: Vec<(String, String)>,
    initial_dir: PathBuf,
    initial_params: Vec<String>,
    initial_fds: BTreeMap<u32, Stream>,

    pub(crate) vars: ShellVars,
    pub(crate) funcs: HashMap<String, Arc<Stmt>>,
    pub(crate) aliases: BTreeMap<String, String>,
    pub(crate) params: Vec<String>,
    /// `$0`
    pub(crate) name: String,
    pub(crate) dir: PathBuf,
    /// `pushd` entries, most recent last; the current directory is not
    /// stored here
    pub(crate) dir_stack: Vec<PathBuf>,
    pub(crate) opts: OptionSet,
    /// `$?`
    pub(crate) status: i32,
    /// Status of the last command substitution in the current command
    pub(crate) subst_status: Option<i32>,
    pub(crate) fds: BTreeMap<u32, Stream>,
    /// Set by `exec` without a command: the statement's redirections stay
    pub(crate) keep_redirs: bool,
    pub(crate) jobs: JobTable,
    pub(crate) counters: ExecutionCounters,
    /// Non-zero while running a condition, where `set -e` does not apply
    pub(crate) no_errexit: usize,
    /// Enclosing loops in the current function
    pub(crate) loop_depth: usize,
    /// Character offset of `getopts` inside the current argument
    pub(crate) getopts_pos: usize,
    proc_substs: Vec<ProcSubst>,
    started: Instant,
    random: AtomicU32,
    exited: bool,
    captures: Option<(Capture, Capture)>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("params", &self.params)
            .field("status", &self.status)
            .field("opts", &self.opts)
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// A runner with the default hooks, an empty environment and the host's
    /// stdio.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::default()
    }

    /// Return to the state right after [`RunnerBuilder::build`]: variables,
    /// functions, aliases, options, directory and descriptors are rebuilt
    /// from the builder's configuration.
    pub fn reset(&mut self) {
        self.vars = ShellVars::new(Overlay::new(Arc::clone(&self.parent)));
        self.funcs.clear();
        self.aliases.clear();
        self.params = self.initial_params.clone();
        self.dir = self.initial_dir.clone();
        self.dir_stack.clear();
        self.opts = OptionSet::default();
        self.status = 0;
        self.subst_status = None;
        self.fds = self.initial_fds.clone();
        self.keep_redirs = false;
        self.jobs = JobTable::new();
        self.counters = ExecutionCounters::new();
        self.no_errexit = 0;
        self.loop_depth = 0;
        self.getopts_pos = 0;
        self.proc_substs.clear();
        self.started = Instant::now();
        self.random = AtomicU32::new(seed());
        self.exited = false;
        if let Err(_e) = self.seed_vars() {
            log_debug!(error = %_e, "seeding variables failed");
        }
    }

    fn seed_vars(&mut self) -> Result<()> {
        if !self.vars.get("HOME").is_set() {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
            self.vars.set("HOME", Variable::exported(home))?;
        }
        let (uid, euid, ppid) = ids();
        for (name, value) in [("UID", uid), ("EUID", euid), ("PPID", ppid)] {
            let mut vr = Variable::string(value.to_string());
            vr.read_only = true;
            self.vars.set_global(name, vr)?;
        }
        let pwd = self.dir.to_string_lossy().into_owned();
        self.vars.set("PWD", Variable::exported(pwd))?;
        self.vars.set("IFS", Variable::string(" \t\n"))?;
        self.vars.set("OPTIND", Variable::string("1"))?;
        for (name, value) in self.initial_env.clone() {
            self.vars.set(&name, Variable::exported(value))?;
        }
        Ok(())
    }

    /// Run a whole script.
    ///
    /// Non-fatal failures only change the exit status; the error side of the
    /// result is reserved for fatal errors such as I/O failures,
    /// cancellation and exceeded limits. After `exit`, further calls do
    /// nothing until [`Runner::reset`].
    pub async fn run(&mut self, file: &File) -> Result<ExecResult> {
        if self.exited {
            return Ok(self.result(Flow::Exit(self.status)));
        }
        if !file.name.is_empty() && self.name.is_empty() {
            self.name = file.name.clone();
        }
        log_debug!(script = %file.name, stmts = file.stmts.len(), "run");
        let res = self.stmts(&file.stmts).await;
        self.finish().await;
        let flow = match res {
            Ok(flow) => flow,
            Err(e) => {
                log_debug!(error = %e, "run failed");
                return Err(e);
            }
        };
        if let Flow::Exit(code) = flow {
            self.status = code;
            self.exited = true;
        }
        Ok(self.result(flow))
    }

    fn result(&self, flow: Flow) -> ExecResult {
        let (stdout, stderr) = match &self.captures {
            Some((out, err)) => (out.take_string(), err.take_string()),
            None => (String::new(), String::new()),
        };
        ExecResult {
            stdout,
            stderr,
            exit_code: self.status,
            flow,
        }
    }

    /// An independent copy for `( ... )` and friends. Variables, functions,
    /// aliases, options and descriptors are copied; jobs are not.
    pub fn subshell(&self) -> Runner {
        Runner {
            exec: Arc::clone(&self.exec),
            open: Arc::clone(&self.open),
            parse: Arc::clone(&self.parse),
            builtins: Arc::clone(&self.builtins),
            limits: self.limits.clone(),
            log_config: self.log_config.clone(),
            kill_timeout: self.kill_timeout,
            cancel: self.cancel.clone(),
            parent: Arc::clone(&self.parent),
            initial_env: self.initial_env.clone(),
            initial_dir: self.initial_dir.clone(),
            initial_params: self.initial_params.clone(),
            initial_fds: self.initial_fds.clone(),
            vars: self.vars.clone(),
            funcs: self.funcs.clone(),
            aliases: self.aliases.clone(),
            params: self.params.clone(),
            name: self.name.clone(),
            dir: self.dir.clone(),
            dir_stack: self.dir_stack.clone(),
            opts: self.opts,
            status: self.status,
            subst_status: None,
            fds: self.fds.clone(),
            keep_redirs: false,
            jobs: JobTable::new(),
            counters: self.counters.clone(),
            no_errexit: self.no_errexit,
            loop_depth: 0,
            getopts_pos: self.getopts_pos,
            proc_substs: Vec::new(),
            started: self.started,
            random: AtomicU32::new(self.next_random().wrapping_mul(2_654_435_761)),
            exited: false,
            captures: None,
        }
    }

    /// Exit status of the last command.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Whether `exit` ran.
    pub fn exited(&self) -> bool {
        self.exited
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Positional parameters.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn opt(&self, opt: Opt) -> bool {
        self.opts.get(opt)
    }

    pub fn set_opt(&mut self, opt: Opt, on: bool) {
        self.opts.set(opt, on);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The current value of a variable as a string, empty when unset.
    pub fn var(&self, name: &str) -> String {
        self.get(name).str_value().to_string()
    }

    /// The function named `name`, if one is defined.
    pub fn func(&self, name: &str) -> Option<&Stmt> {
        self.funcs.get(name).map(|f| f.as_ref())
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// What descriptor `fd` reads from. Closed or output descriptors read as
    /// empty.
    pub fn input(&self, fd: u32) -> InputStream {
        match self.fds.get(&fd) {
            Some(Stream::Input(r)) => r.clone(),
            _ => InputStream::null(),
        }
    }

    /// What descriptor `fd` writes to. Closed or input descriptors discard.
    pub fn output(&self, fd: u32) -> OutputStream {
        match self.fds.get(&fd) {
            Some(Stream::Output(w)) => w.clone(),
            _ => OutputStream::null(),
        }
    }

    pub fn stdin(&self) -> InputStream {
        self.input(0)
    }

    pub fn stdout(&self) -> OutputStream {
        self.output(1)
    }

    pub fn stderr(&self) -> OutputStream {
        self.output(2)
    }

    /// Snapshot of what hooks may see.
    pub fn handler_context(&self) -> HandlerContext {
        HandlerContext {
            env: ListEnviron::snapshot(self),
            dir: self.dir.clone(),
            stdin: self.stdin(),
            stdout: self.stdout(),
            stderr: self.stderr(),
            kill_timeout: self.kill_timeout,
            cancel: self.cancel.clone(),
        }
    }

    /// Name used as the prefix of error messages.
    pub(crate) fn shell_name(&self) -> &str {
        if self.name.is_empty() {
            "shellkit"
        } else {
            &self.name
        }
    }

    /// Print `msg` on stderr, prefixed with the shell name.
    pub(crate) async fn report(&self, msg: &str) -> Result<()> {
        let line = format!("{}: {msg}\n", self.shell_name());
        self.stderr().write_str(&line).await?;
        Ok(())
    }

    /// Turn a non-fatal error into a status. Fatal errors are returned.
    pub(crate) async fn fail(&mut self, err: Error) -> Result<Flow> {
        match err {
            Error::ExitStatus(code) => {
                self.status = i32::from(code);
                Ok(Flow::Normal)
            }
            e if e.is_fatal() => Err(e),
            e => {
                self.report(&e.to_string()).await?;
                self.status = 1;
                if e.exits_shell() {
                    log_debug!(error = %e, "error ends the shell");
                    return Ok(Flow::Exit(1));
                }
                Ok(Flow::Normal)
            }
        }
    }

    pub(crate) fn next_random(&self) -> u32 {
        let mut state = self.random.load(Ordering::Relaxed);
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.random.store(state, Ordering::Relaxed);
        (state >> 16) & 0x7fff
    }

    pub(crate) fn seed_random(&self, seed: u32) {
        self.random.store(seed, Ordering::Relaxed);
    }
}

fn seed() -> u32 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos ^ std::process::id()
}

#[cfg(unix)]
fn ids() -> (u32, u32, u32) {
    // SAFETY: these calls have no preconditions and cannot fail.
    unsafe {
        (
            libc::getuid(),
            libc::geteuid(),
            u32::try_from(libc::getppid()).unwrap_or(0),
        )
    }
}

#[cfg(not(unix))]
fn ids() -> (u32, u32, u32) {
    (0, 0, 0)
}

/// Builder for [`Runner`].
///
/// ```rust
/// use shellkit::{ExecutionLimits, Runner};
///
/// let runner = Runner::builder()
///     .env("GREETING", "hi")
///     .params(["a", "b"])
///     .limits(ExecutionLimits::new().max_loop_iterations(1000))
///     .capture()
///     .build();
/// assert_eq!(runner.var("GREETING"), "hi");
/// assert_eq!(runner.params(), ["a", "b"]);
/// ```
#[derive(Default)]
pub struct RunnerBuilder {
    env: Vec<(String, String)>,
    environ: Option<Arc<dyn Environ>>,
    dir: Option<PathBuf>,
    params: Vec<String>,
    name: String,
    stdin: Option<InputStream>,
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
    capture: bool,
    exec: Option<Arc<dyn ExecHandler>>,
    open: Option<Arc<dyn OpenHandler>>,
    parse: Option<Arc<dyn ParseHandler>>,
    builtins: HashMap<String, Arc<dyn Builtin>>,
    limits: ExecutionLimits,
    log_config: LogConfig,
    kill_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl RunnerBuilder {
    /// Set an exported variable.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Environment the global scope starts from. Defaults to an empty one;
    /// pass [`ListEnviron::from_process`] to inherit the host's.
    pub fn environ(mut self, env: impl Environ + 'static) -> Self {
        self.environ = Some(Arc::new(env));
        self
    }

    /// Working directory. Defaults to the host's.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Positional parameters `$1`, `$2`, ...
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// `$0`. Defaults to the name of the first script run.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn stdin(mut self, stdin: InputStream) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn stdout(mut self, stdout: OutputStream) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn stderr(mut self, stderr: OutputStream) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Collect stdout and stderr into each [`ExecResult`] instead of
    /// writing them anywhere.
    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn exec_hook(mut self, hook: impl ExecHandler + 'static) -> Self {
        self.exec = Some(Arc::new(hook));
        self
    }

    pub fn open_hook(mut self, hook: impl OpenHandler + 'static) -> Self {
        self.open = Some(Arc::new(hook));
        self
    }

    pub fn parse_hook(mut self, hook: impl ParseHandler + 'static) -> Self {
        self.parse = Some(Arc::new(hook));
        self
    }

    /// Register a builtin, replacing any default of the same name.
    pub fn builtin(mut self, name: &str, builtin: Box<dyn Builtin>) -> Self {
        self.builtins.insert(name.to_string(), Arc::from(builtin));
        self
    }

    pub fn limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Grace period between interrupting and killing a cancelled child.
    pub fn kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = Some(timeout);
        self
    }

    /// Token that stops the runner at the next statement and interrupts
    /// running children.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Runner {
        let mut table = builtins::defaults();
        table.extend(self.builtins);

        let mut fds = BTreeMap::new();
        let mut captures = None;
        let (stdout, stderr) = if self.capture {
            let (out, out_cap) = OutputStream::capture();
            let (err, err_cap) = OutputStream::capture();
            captures = Some((out_cap, err_cap));
            (out, err)
        } else {
            (
                self.stdout.unwrap_or_else(OutputStream::stdout),
                self.stderr.unwrap_or_else(OutputStream::stderr),
            )
        };
        fds.insert(0, Stream::Input(self.stdin.unwrap_or_default()));
        fds.insert(1, Stream::Output(stdout));
        fds.insert(2, Stream::Output(stderr));

        let dir = self
            .dir
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        let parent: Arc<dyn Environ> = self
            .environ
            .unwrap_or_else(|| Arc::new(ListEnviron::default()));

        let mut runner = Runner {
            exec: self.exec.unwrap_or_else(|| Arc::new(ProcessExec)),
            open: self.open.unwrap_or_else(|| Arc::new(ProcessOpen)),
            parse: self.parse.unwrap_or_else(|| Arc::new(JsonParse)),
            builtins: Arc::new(table),
            limits: self.limits,
            log_config: self.log_config,
            kill_timeout: self.kill_timeout.unwrap_or(DEFAULT_KILL_TIMEOUT),
            cancel: self.cancel.unwrap_or_default(),
            parent: Arc::clone(&parent),
            initial_env: self.env,
            initial_dir: dir.clone(),
            initial_params: self.params.clone(),
            initial_fds: fds.clone(),
            vars: ShellVars::new(Overlay::new(parent)),
            funcs: HashMap::new(),
            aliases: BTreeMap::new(),
            params: self.params,
            name: self.name,
            dir,
            dir_stack: Vec::new(),
            opts: OptionSet::default(),
            status: 0,
            subst_status: None,
            fds,
            keep_redirs: false,
            jobs: JobTable::new(),
            counters: ExecutionCounters::new(),
            no_errexit: 0,
            loop_depth: 0,
            getopts_pos: 0,
            proc_substs: Vec::new(),
            started: Instant::now(),
            random: AtomicU32::new(seed()),
            exited: false,
            captures,
        };
        runner.reset();
        runner
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::ast::build::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_builder_seeds_variables() {
        let r = Runner::builder()
            .env("FOO", "bar")
            .dir("/tmp")
            .params(["x"])
            .capture()
            .build();
        assert_eq!(r.var("FOO"), "bar");
        assert!(r.get("FOO").exported);
        assert_eq!(r.var("PWD"), "/tmp");
        assert_eq!(r.var("IFS"), " \t\n");
        assert_eq!(r.var("OPTIND"), "1");
        assert_eq!(r.var("1"), "x");
        assert_eq!(r.var("#"), "1");
        assert!(r.get("UID").read_only);
    }

    #[tokio::test]
    async fn test_handler_context_sees_exported_only() {
        let mut r = Runner::builder().env("FOO", "bar").capture().build();
        r.run(&file(vec![
            assigns(vec![assign("LOCAL_ONLY", "1")]),
            cmd(&["export", "LATER=2"]),
        ]))
        .await
        .unwrap();
        let ctx = r.handler_context();
        assert_eq!(ctx.env.get("FOO").str_value(), "bar");
        assert_eq!(ctx.env.get("LATER").str_value(), "2");
        assert!(!ctx.env.get("LOCAL_ONLY").is_set());
        assert_eq!(ctx.dir, r.dir());
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let mut r = Runner::builder().env("KEEP", "1").capture().build();
        let script = file(vec![
            assigns(vec![assign("X", "1")]),
            func("f", vec![cmd(&["true"])]),
            cmd(&["set", "-e"]),
            cmd(&["exit", "3"]),
        ]);
        let res = r.run(&script).await.unwrap();
        assert_eq!(res.exit_code, 3);
        assert!(r.exited());
        r.reset();
        assert!(!r.exited());
        assert_eq!(r.var("X"), "");
        assert_eq!(r.var("KEEP"), "1");
        assert!(r.func("f").is_none());
        assert!(!r.opt(Opt::ErrExit));
        assert_eq!(r.status(), 0);
    }

    #[tokio::test]
    async fn test_run_after_exit_is_noop() {
        let mut r = runner();
        r.run(&file(vec![cmd(&["exit", "4"])])).await.unwrap();
        let res = r.run(&file(vec![cmd(&["echo", "late"])])).await.unwrap();
        assert_eq!(res.stdout, "");
        assert_eq!(res.exit_code, 4);
    }

    #[tokio::test]
    async fn test_state_carries_between_runs() {
        let mut r = runner();
        r.run(&file(vec![assigns(vec![assign("A", "kept")])]))
            .await
            .unwrap();
        let res = r
            .run(&file(vec![stmt(call(vec![
                lit("echo"),
                word(vec![param("A")]),
            ]))]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "kept\n");
    }

    #[tokio::test]
    async fn test_special_parameters() {
        let mut r = Runner::builder().params(["a", "b", "c"]).capture().build();
        let res = r
            .run(&file(vec![
                cmd(&["false"]),
                stmt(call(vec![
                    lit("echo"),
                    word(vec![param("?")]),
                    word(vec![param("#")]),
                    word(vec![param("2")]),
                    word(vec![param("0")]),
                ])),
            ]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "1 3 b shellkit\n");
    }

    #[tokio::test]
    async fn test_random_is_seedable() {
        let mut a = runner();
        let mut b = runner();
        a.set("RANDOM", Variable::string("42")).unwrap();
        b.set("RANDOM", Variable::string("42")).unwrap();
        let x = a.var("RANDOM");
        assert_eq!(x, b.var("RANDOM"));
        assert!(x.parse::<u32>().unwrap() < 32768);
    }

    #[tokio::test]
    async fn test_subshell_is_independent() {
        let mut r = runner();
        let before = r.dir().to_path_buf();
        let res = r
            .run(&file(vec![
                assigns(vec![assign("V", "outer")]),
                stmt(crate::ast::Command::Subshell(vec![
                    assigns(vec![assign("V", "inner")]),
                    cmd(&["cd", "/"]),
                ])),
                stmt(call(vec![lit("echo"), word(vec![param("V")])])),
            ]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "outer\n");
        assert_eq!(r.dir(), before);
    }
}
