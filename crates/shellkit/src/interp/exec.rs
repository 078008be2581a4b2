//! Statements, commands and control flow

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};

use super::state::{Flow, Opt};
use super::{Runner, decl, test};
use crate::ast::{
    BinCmdOp, BinaryCmd, CallExpr, CaseClause, CaseOp, Command, ForClause, IfClause, Loop, Stmt,
    TimeClause, WhileClause, Word, build,
};
use crate::builtins::{Builtin, Context};
use crate::env::Variable;
use crate::error::{Error, Result};
use crate::expand::{self, pattern, shell_quote};
use crate::limits::LimitExceeded;
use crate::logging::{log_debug, log_trace, log_warn};

/// Which kinds of command [`Runner::dispatch`] may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Functions, then builtins, then the exec hook
    All,
    /// `command`: skip functions
    NoFunctions,
    /// `builtin`: builtins only
    BuiltinOnly,
}

enum LoopStep {
    Next,
    Stop,
    Leave(Flow),
}

fn loop_step(flow: Flow) -> LoopStep {
    match flow {
        Flow::Normal | Flow::Continue(1) => LoopStep::Next,
        Flow::Break(1) => LoopStep::Stop,
        Flow::Break(n) => LoopStep::Leave(Flow::Break(n - 1)),
        Flow::Continue(n) => LoopStep::Leave(Flow::Continue(n - 1)),
        other => LoopStep::Leave(other),
    }
}

/// `set -e` only looks at simple commands, subshells, pipelines and
/// test-like commands; compound commands report through their parts.
fn errexit_applies(cmd: Option<&Command>) -> bool {
    match cmd {
        Some(Command::Binary(b)) => matches!(b.op, BinCmdOp::Pipe | BinCmdOp::PipeAll),
        Some(
            Command::Call(_)
            | Command::Subshell(_)
            | Command::Arithm(_)
            | Command::Test(_)
            | Command::Let(_)
            | Command::Decl(_)
            | Command::Time(_),
        ) => true,
        _ => false,
    }
}

impl Runner {
    /// Run statements in order, stopping at the first one that changes
    /// control flow.
    pub fn stmts<'a>(&'a mut self, stmts: &'a [Stmt]) -> BoxFuture<'a, Result<Flow>> {
        async move {
            for st in stmts {
                let flow = self.stmt(st).await?;
                if !flow.is_normal() {
                    return Ok(flow);
                }
            }
            Ok(Flow::Normal)
        }
        .boxed()
    }

    pub(crate) fn stmt<'a>(&'a mut self, st: &'a Stmt) -> BoxFuture<'a, Result<Flow>> {
        async move {
            if self.cancel.is_cancelled() {
                log_warn!("cancelled before statement");
                return Err(Error::Cancelled);
            }
            if self.opts.get(Opt::NoExec) {
                return Ok(Flow::Normal);
            }
            if st.background {
                self.background(st);
                self.status = 0;
                return Ok(Flow::Normal);
            }

            let saved = (!st.redirs.is_empty()).then(|| self.fds.clone());
            let res = self.stmt_sync(st).await;
            let keep = std::mem::take(&mut self.keep_redirs);
            if let Some(saved) = saved {
                if !keep {
                    self.fds = saved;
                }
            }
            let flow = res?;

            if st.negated {
                self.status = i32::from(self.status == 0);
            } else if flow.is_normal()
                && self.status != 0
                && self.no_errexit == 0
                && self.opts.get(Opt::ErrExit)
                && errexit_applies(st.cmd.as_ref())
            {
                log_debug!(status = self.status, "errexit");
                return Ok(Flow::Exit(self.status));
            }
            Ok(flow)
        }
        .boxed()
    }

    async fn stmt_sync(&mut self, st: &Stmt) -> Result<Flow> {
        if let Some(flow) = self.redirect_all(&st.redirs).await? {
            return Ok(flow);
        }
        let Some(cmd) = &st.cmd else {
            self.status = 0;
            return Ok(Flow::Normal);
        };
        if st.negated {
            self.no_errexit += 1;
        }
        let res = self.cmd(cmd).await;
        if st.negated {
            self.no_errexit -= 1;
        }
        res
    }

    fn cmd<'a>(&'a mut self, cmd: &'a Command) -> BoxFuture<'a, Result<Flow>> {
        async move {
            match cmd {
                Command::Call(ce) => self.call(ce).await,
                Command::Block(stmts) => self.stmts(stmts).await,
                Command::Subshell(stmts) => self.subshell_stmts(stmts).await,
                Command::Binary(b) => self.binary(b).await,
                Command::If(c) => self.if_clause(c).await,
                Command::While(w) => {
                    self.loop_depth += 1;
                    let res = self.while_loop(w).await;
                    self.loop_depth -= 1;
                    res
                }
                Command::For(f) => {
                    self.loop_depth += 1;
                    let res = self.for_loop(f).await;
                    self.loop_depth -= 1;
                    res
                }
                Command::Case(c) => self.case(c).await,
                Command::Func(f) => {
                    log_trace!(function = %f.name, "define");
                    self.funcs.insert(f.name.clone(), Arc::new((*f.body).clone()));
                    self.status = 0;
                    Ok(Flow::Normal)
                }
                Command::Arithm(expr) => match expand::arithm(self, expr).await {
                    Ok(n) => {
                        self.status = i32::from(n == 0);
                        Ok(Flow::Normal)
                    }
                    Err(e) => self.fail(e).await,
                },
                Command::Test(expr) => match test::eval(self, expr).await {
                    Ok(b) => {
                        self.status = i32::from(!b);
                        Ok(Flow::Normal)
                    }
                    Err(e) => {
                        let flow = self.fail(e).await?;
                        if flow.is_normal() {
                            self.status = 2;
                        }
                        Ok(flow)
                    }
                },
                Command::Decl(d) => decl::decl_clause(self, d).await,
                Command::Let(exprs) => {
                    let mut last = 0;
                    for expr in exprs {
                        match expand::arithm(self, expr).await {
                            Ok(n) => last = n,
                            Err(e) => return self.fail(e).await,
                        }
                    }
                    self.status = i32::from(last == 0);
                    Ok(Flow::Normal)
                }
                Command::Time(t) => self.time(t).await,
            }
        }
        .boxed()
    }

    async fn binary(&mut self, b: &BinaryCmd) -> Result<Flow> {
        match b.op {
            BinCmdOp::And | BinCmdOp::Or => {
                self.no_errexit += 1;
                let res = self.stmt(&b.x).await;
                self.no_errexit -= 1;
                let flow = res?;
                if !flow.is_normal() {
                    return Ok(flow);
                }
                if (self.status == 0) == (b.op == BinCmdOp::And) {
                    self.stmt(&b.y).await
                } else {
                    Ok(Flow::Normal)
                }
            }
            BinCmdOp::Pipe | BinCmdOp::PipeAll => self.pipeline(b.op, &b.x, &b.y).await,
        }
    }

    async fn call(&mut self, ce: &CallExpr) -> Result<Flow> {
        let args = self.resolve_aliases(&ce.args)?;
        self.subst_status = None;
        let fields = match expand::fields(self, &args).await {
            Ok(fields) => fields,
            Err(e) => return self.fail(e).await,
        };

        if fields.is_empty() {
            for a in &ce.assigns {
                if let Err(e) = self.assign(a).await {
                    return self.fail(e).await;
                }
            }
            self.status = self.subst_status.take().unwrap_or(0);
            return Ok(Flow::Normal);
        }

        let saved = if ce.assigns.is_empty() {
            None
        } else {
            let mut inline = HashMap::new();
            for a in &ce.assigns {
                match self.assigned(a).await {
                    Ok((name, vr)) => {
                        inline.insert(name, Variable { exported: true, ..vr });
                    }
                    Err(e) => return self.fail(e).await,
                }
            }
            let mut merged = self.vars.inline.clone();
            merged.extend(inline);
            Some(std::mem::replace(&mut self.vars.inline, merged))
        };

        if self.opts.get(Opt::XTrace) {
            let line: Vec<String> = fields.iter().map(|f| shell_quote(f)).collect();
            self.stderr().write_str(&format!("+ {}\n", line.join(" "))).await?;
        }
        let res = self.dispatch(fields, Lookup::All).await;
        if let Some(saved) = saved {
            self.vars.inline = saved;
        }
        res
    }

    /// Replace a leading alias, following chains. An alias whose value ends
    /// in a blank makes the next word a candidate too.
    fn resolve_aliases<'w>(&self, args: &'w [Word]) -> Result<Cow<'w, [Word]>> {
        if !self.opts.get(Opt::ExpandAliases) || self.aliases.is_empty() {
            return Ok(Cow::Borrowed(args));
        }
        let mut words = args.to_vec();
        let mut seen = HashSet::new();
        let mut pos = 0;
        let mut blank_next = None;
        let mut expansions = 0;
        loop {
            let value = words
                .get(pos)
                .and_then(Word::lit)
                .filter(|name| !seen.contains(*name))
                .and_then(|name| self.aliases.get_key_value(name));
            let Some((name, value)) = value else {
                match blank_next.take() {
                    Some(next) => {
                        pos = next;
                        seen.clear();
                        continue;
                    }
                    None => break,
                }
            };
            expansions += 1;
            if expansions > self.limits.max_alias_depth {
                return Err(LimitExceeded::MaxAliasDepth(self.limits.max_alias_depth).into());
            }
            seen.insert(name.clone());
            let replacement: Vec<Word> = value.split_whitespace().map(build::lit).collect();
            let n = replacement.len();
            words.splice(pos..pos + 1, replacement);
            blank_next = value
                .ends_with([' ', '\t'])
                .then_some(pos + n)
                .or(blank_next.map(|next: usize| next + n - 1));
        }
        Ok(Cow::Owned(words))
    }

    /// Run an expanded command: a function, a builtin or the exec hook.
    pub(crate) fn dispatch(
        &mut self,
        args: Vec<String>,
        lookup: Lookup,
    ) -> BoxFuture<'_, Result<Flow>> {
        async move {
            let Some(name) = args.first().cloned() else {
                self.status = 0;
                return Ok(Flow::Normal);
            };
            if lookup == Lookup::All {
                if let Some(body) = self.funcs.get(&name).cloned() {
                    log_debug!(function = %name, "call function");
                    return self.call_func(body, args).await;
                }
            }
            if let Some(builtin) = self.builtins.get(&name).cloned() {
                log_trace!(builtin = %name, "call builtin");
                return self.run_builtin(builtin, &args).await;
            }
            if lookup == Lookup::BuiltinOnly {
                self.report(&format!("builtin: {name}: not a shell builtin"))
                    .await?;
                self.status = 1;
                return Ok(Flow::Normal);
            }
            log_debug!(command = %name, "exec hook");
            let ctx = self.handler_context();
            match self.exec.exec(&ctx, &args).await {
                Ok(()) => self.status = 0,
                Err(Error::ExitStatus(code)) => self.status = i32::from(code),
                Err(e) => return Err(e),
            }
            Ok(Flow::Normal)
        }
        .boxed()
    }

    async fn run_builtin(&mut self, builtin: Arc<dyn Builtin>, args: &[String]) -> Result<Flow> {
        let ctx = Context {
            name: &args[0],
            args: &args[1..],
            runner: self,
        };
        let res = match builtin.execute(ctx).await {
            Ok(res) => res,
            Err(Error::ExitStatus(code)) => {
                self.status = i32::from(code);
                return Ok(Flow::Normal);
            }
            Err(e) if e.is_fatal() || e.exits_shell() => return self.fail(e).await,
            Err(e) => {
                self.report(&format!("{}: {e}", args[0])).await?;
                self.status = 1;
                return Ok(Flow::Normal);
            }
        };
        self.stdout().write_str(&res.stdout).await?;
        self.stderr().write_str(&res.stderr).await?;
        self.status = res.exit_code;
        Ok(res.flow)
    }

    async fn call_func(&mut self, body: Arc<Stmt>, mut args: Vec<String>) -> Result<Flow> {
        self.counters.push_function(&self.limits)?;
        args.remove(0);
        let params = std::mem::replace(&mut self.params, args);
        let loops = std::mem::replace(&mut self.loop_depth, 0);
        self.vars.frames.push(HashMap::new());
        let res = self.stmt(&body).await;
        self.vars.frames.pop();
        self.loop_depth = loops;
        self.params = params;
        self.counters.pop_function();
        match res? {
            Flow::Return(code) => {
                self.status = code;
                Ok(Flow::Normal)
            }
            Flow::Exit(code) => Ok(Flow::Exit(code)),
            _ => Ok(Flow::Normal),
        }
    }

    /// Run a condition list, where `set -e` does not apply.
    async fn condition(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        self.no_errexit += 1;
        let res = self.stmts(stmts).await;
        self.no_errexit -= 1;
        res
    }

    fn if_clause<'a>(&'a mut self, c: &'a IfClause) -> BoxFuture<'a, Result<Flow>> {
        async move {
            if !c.cond.is_empty() {
                let flow = self.condition(&c.cond).await?;
                if !flow.is_normal() {
                    return Ok(flow);
                }
                if self.status != 0 {
                    return match &c.else_branch {
                        Some(next) => self.if_clause(next).await,
                        None => {
                            self.status = 0;
                            Ok(Flow::Normal)
                        }
                    };
                }
            }
            self.stmts(&c.then).await
        }
        .boxed()
    }

    async fn while_loop(&mut self, w: &WhileClause) -> Result<Flow> {
        let mut status = 0;
        let mut iterations = 0;
        loop {
            let flow = self.condition(&w.cond).await?;
            if !flow.is_normal() {
                return Ok(flow);
            }
            if (self.status == 0) == w.until {
                break;
            }
            iterations += 1;
            self.limits.check_loop(iterations)?;
            let flow = self.stmts(&w.body).await?;
            status = self.status;
            match loop_step(flow) {
                LoopStep::Next => {}
                LoopStep::Stop => break,
                LoopStep::Leave(flow) => return Ok(flow),
            }
        }
        self.status = status;
        Ok(Flow::Normal)
    }

    async fn for_loop(&mut self, f: &ForClause) -> Result<Flow> {
        match &f.head {
            Loop::WordIter { name, items } => {
                let items = match items {
                    Some(words) => match expand::fields(self, words).await {
                        Ok(items) => items,
                        Err(e) => return self.fail(e).await,
                    },
                    None => self.params.clone(),
                };
                let mut status = 0;
                for (i, item) in items.into_iter().enumerate() {
                    self.limits.check_loop(i + 1)?;
                    if let Err(e) = self.set_var(name, item) {
                        return self.fail(e).await;
                    }
                    let flow = self.stmts(&f.body).await?;
                    status = self.status;
                    match loop_step(flow) {
                        LoopStep::Next => {}
                        LoopStep::Stop => break,
                        LoopStep::Leave(flow) => return Ok(flow),
                    }
                }
                self.status = status;
                Ok(Flow::Normal)
            }
            Loop::CStyle { init, cond, post } => {
                if let Some(init) = init {
                    if let Err(e) = expand::arithm(self, init).await {
                        return self.fail(e).await;
                    }
                }
                let mut status = 0;
                let mut iterations = 0;
                loop {
                    if let Some(cond) = cond {
                        match expand::arithm(self, cond).await {
                            Ok(0) => break,
                            Ok(_) => {}
                            Err(e) => return self.fail(e).await,
                        }
                    }
                    iterations += 1;
                    self.limits.check_loop(iterations)?;
                    let flow = self.stmts(&f.body).await?;
                    status = self.status;
                    match loop_step(flow) {
                        LoopStep::Next => {}
                        LoopStep::Stop => break,
                        LoopStep::Leave(flow) => return Ok(flow),
                    }
                    if let Some(post) = post {
                        if let Err(e) = expand::arithm(self, post).await {
                            return self.fail(e).await;
                        }
                    }
                }
                self.status = status;
                Ok(Flow::Normal)
            }
        }
    }

    async fn case(&mut self, c: &CaseClause) -> Result<Flow> {
        let subject = match expand::literal(self, &c.word).await {
            Ok(s) => s,
            Err(e) => return self.fail(e).await,
        };
        self.status = 0;
        let mut fall = false;
        for item in &c.items {
            let mut hit = fall;
            if !hit {
                for p in &item.patterns {
                    let matched = match expand::pattern(self, p).await {
                        Ok(pat) => pattern::matches(&pat, &subject),
                        Err(e) => Err(e),
                    };
                    match matched {
                        Ok(true) => {
                            hit = true;
                            break;
                        }
                        Ok(false) => {}
                        Err(e) => return self.fail(e).await,
                    }
                }
            }
            if !hit {
                continue;
            }
            self.status = 0;
            let flow = self.stmts(&item.stmts).await?;
            if !flow.is_normal() {
                return Ok(flow);
            }
            match item.op {
                CaseOp::Break => break,
                CaseOp::Fallthrough => fall = true,
                CaseOp::Resume => fall = false,
            }
        }
        Ok(Flow::Normal)
    }

    async fn time(&mut self, t: &TimeClause) -> Result<Flow> {
        let start = Instant::now();
        let (user0, sys0) = cpu_times();
        let flow = match &t.stmt {
            Some(st) => self.stmt(st).await?,
            None => Flow::Normal,
        };
        let real = start.elapsed();
        let (user1, sys1) = cpu_times();
        let (user, sys) = (user1.saturating_sub(user0), sys1.saturating_sub(sys0));
        let report = if t.posix {
            format!(
                "real {:.2}\nuser {:.2}\nsys {:.2}\n",
                real.as_secs_f64(),
                user.as_secs_f64(),
                sys.as_secs_f64()
            )
        } else {
            format!(
                "\nreal\t{}\nuser\t{}\nsys\t{}\n",
                clock(real),
                clock(user),
                clock(sys)
            )
        };
        self.stderr().write_str(&report).await?;
        Ok(flow)
    }
}

/// `0m1.250s`
fn clock(d: Duration) -> String {
    let secs = d.as_secs_f64();
    let mins = (secs / 60.0).floor();
    format!("{}m{:.3}s", mins as u64, secs - mins * 60.0)
}

/// User and system CPU time of this process and its waited-for children.
#[cfg(unix)]
pub(crate) fn cpu_times() -> (Duration, Duration) {
    fn usage(who: libc::c_int) -> (Duration, Duration) {
        // SAFETY: rusage is plain data; getrusage fills it in.
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: ru is a valid, writable rusage.
        if unsafe { libc::getrusage(who, &mut ru) } != 0 {
            return (Duration::ZERO, Duration::ZERO);
        }
        let tv = |t: libc::timeval| {
            Duration::from_secs(t.tv_sec.max(0) as u64)
                + Duration::from_micros(t.tv_usec.max(0) as u64)
        };
        (tv(ru.ru_utime), tv(ru.ru_stime))
    }
    let (su, ss) = usage(libc::RUSAGE_SELF);
    let (cu, cs) = usage(libc::RUSAGE_CHILDREN);
    (su + cu, ss + cs)
}

#[cfg(not(unix))]
pub(crate) fn cpu_times() -> (Duration, Duration) {
    (Duration::ZERO, Duration::ZERO)
}
