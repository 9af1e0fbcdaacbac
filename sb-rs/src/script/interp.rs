//! Block-script interpreter.
//!
//! The [`Interpreter`] owns the scope stack, the positional-argument frames
//! and the error log.  It executes parsed [`Stmt`] trees and reports every
//! emitted value and every runtime error through a [`Pipe`], which decides
//! whether execution may go on.  It implements [`EvalContext`] so the
//! expression evaluator can call back into it for variables and functions.

use std::collections::HashMap;

use super::{
    builtins::call_builtin,
    expr::{eval_expr, EvalContext},
    stmt::Stmt,
    value::Value,
};
use crate::error::{ErrorKind, ErrorRecord};

// ── Pipe ──────────────────────────────────────────────────────────────────────

/// Why execution of a unit ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// The error policy said stop.
    Stopped(ErrorRecord),
    /// The consumer went away or asked for cancellation.
    Cancelled,
}

/// What became of a reported error that did not stop execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Kept in the interpreter's error log.
    Logged,
    /// Discarded without a trace.
    Dropped,
}

/// Where a running unit sends its output and errors.
pub trait Pipe {
    fn emit(&mut self, value: Value) -> Result<(), Interrupt>;

    /// Report a runtime error and learn whether to carry on.
    fn fail(&mut self, record: ErrorRecord) -> Result<Disposition, Interrupt>;

    /// Polled between statements and loop iterations.
    fn cancelled(&self) -> bool {
        false
    }
}

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-error control-flow signals that unwind blocks.
#[derive(Debug)]
pub enum ControlFlow {
    Break,
    Return(Option<Value>),
}

/// Everything that can abandon a statement.
#[derive(Debug)]
enum Fault {
    /// Evaluation failed; reported as a statement error.
    Eval(String),
    /// A terminating error was reported and allowed; the unit ends.
    Halt,
    Interrupt(Interrupt),
}

impl From<String> for Fault {
    fn from(msg: String) -> Self {
        Fault::Eval(msg)
    }
}

impl From<Interrupt> for Fault {
    fn from(i: Interrupt) -> Self {
        Fault::Interrupt(i)
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Value>,
}

/// The block-script interpreter.
#[derive(Debug)]
pub struct Interpreter {
    /// Variable scopes; `[0]` is the global scope and is never popped.
    scopes: Vec<Scope>,
    /// Positional arguments, one frame per active invocation.
    frames: Vec<Vec<Value>>,
    /// Errors that were reported and allowed to continue.
    errors: Vec<ErrorRecord>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            scopes: vec![Scope::default()],
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Look up a variable, innermost scope first.
    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.scopes.iter().rev().find_map(|s| s.vars.get(name)).cloned()
    }

    /// Set a variable in the innermost scope.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.current_scope().vars.insert(name.into(), value);
    }

    /// Set a variable in the global scope.
    pub fn set_global_var(&mut self, name: impl Into<String>, value: Value) {
        self.scopes[0].vars.insert(name.into(), value);
    }

    pub fn get_global_var(&self, name: &str) -> Option<&Value> {
        self.scopes[0].vars.get(name)
    }

    /// Remove `name` from the innermost scope that defines it.
    pub fn unset_var(&mut self, name: &str) -> bool {
        self.scopes.iter_mut().rev().any(|s| s.vars.remove(name).is_some())
    }

    /// Errors reported under a continuing policy, oldest first.
    pub fn error_log(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn clear_error_log(&mut self) {
        self.errors.clear();
    }

    /// Number of scopes currently on the stack (at least 1).
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub(crate) fn push_params(&mut self, args: Vec<Value>) {
        self.frames.push(args);
    }

    /// Drop scopes and argument frames above the given depths.  The global
    /// scope always survives.
    pub(crate) fn unwind_to(&mut self, scopes: usize, frames: usize) {
        self.scopes.truncate(scopes.max(1));
        self.frames.truncate(frames);
    }

    pub(crate) fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    fn current_scope(&mut self) -> &mut Scope {
        // scopes is never empty; see unwind_to
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Run a compiled unit to completion.
    ///
    /// A `/return` value is emitted before returning.  A terminating error
    /// that the pipe allowed ends the unit normally.
    pub fn run(&mut self, stmts: &[Stmt], pipe: &mut dyn Pipe) -> Result<(), Interrupt> {
        match self.exec_block(stmts, pipe) {
            Ok(Some(ControlFlow::Return(Some(v)))) => pipe.emit(v),
            Ok(_) | Err(Fault::Halt) => Ok(()),
            Err(Fault::Interrupt(i)) => Err(i),
            Err(Fault::Eval(msg)) => {
                // exec_block reports evaluation faults itself
                debug_assert!(false, "unreported evaluation fault: {msg}");
                Ok(())
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], pipe: &mut dyn Pipe) -> Result<Option<ControlFlow>, Fault> {
        for stmt in stmts {
            if pipe.cancelled() {
                return Err(Interrupt::Cancelled.into());
            }
            match self.exec_stmt(stmt, pipe) {
                Ok(Some(cf)) => return Ok(Some(cf)),
                Ok(None) => {}
                Err(Fault::Eval(msg)) => {
                    self.raise(ErrorRecord::new(ErrorKind::Statement, msg), pipe)?;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(None)
    }

    /// Hand an error to the pipe; afterwards either resume or halt.
    fn raise(&mut self, record: ErrorRecord, pipe: &mut dyn Pipe) -> Result<(), Fault> {
        let resumable = record.is_resumable();
        if pipe.fail(record.clone())? == Disposition::Logged {
            self.errors.push(record);
        }
        if resumable {
            Ok(())
        } else {
            Err(Fault::Halt)
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, pipe: &mut dyn Pipe) -> Result<Option<ControlFlow>, Fault> {
        match stmt {
            Stmt::Emit(text) => {
                let s = text.expand(self)?;
                pipe.emit(Value::Str(s))?;
            }

            Stmt::EmitExprs(items) => {
                for item in items {
                    let v = eval_expr(item, self)?;
                    pipe.emit(v)?;
                }
            }

            Stmt::Set { name, value, global } => {
                let v = Value::from_text(&value.expand(self)?);
                if *global {
                    self.set_global_var(name.as_str(), v);
                } else {
                    self.set_var(name.as_str(), v);
                }
            }

            Stmt::Unset { name } => {
                self.unset_var(name);
            }

            Stmt::Param { names } => {
                let bound: Vec<(String, Value)> = names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n.clone(), self.params().get(i).cloned().unwrap_or_default()))
                    .collect();
                for (n, v) in bound {
                    self.set_var(n, v);
                }
            }

            Stmt::Expr(e) => {
                eval_expr(e, self)?;
            }

            Stmt::If { branches, else_block } => {
                for (cond, block) in branches {
                    if eval_expr(cond, self)?.as_bool() {
                        return self.exec_block(block, pipe);
                    }
                }
                return self.exec_block(else_block, pipe);
            }

            Stmt::While { cond, body } => loop {
                if pipe.cancelled() {
                    return Err(Interrupt::Cancelled.into());
                }
                if !eval_expr(cond, self)?.as_bool() {
                    break;
                }
                match self.exec_block(body, pipe)? {
                    Some(ControlFlow::Break) => break,
                    Some(cf @ ControlFlow::Return(_)) => return Ok(Some(cf)),
                    None => {}
                }
            },

            Stmt::For { var, start, end, body } => {
                let from = parse_bound(&start.expand(self)?, "start")?;
                let to = parse_bound(&end.expand(self)?, "end")?;
                for i in from..=to {
                    if pipe.cancelled() {
                        return Err(Interrupt::Cancelled.into());
                    }
                    self.set_var(var.as_str(), Value::Int(i));
                    match self.exec_block(body, pipe)? {
                        Some(ControlFlow::Break) => break,
                        Some(cf @ ControlFlow::Return(_)) => return Ok(Some(cf)),
                        None => {}
                    }
                }
            }

            Stmt::Break => return Ok(Some(ControlFlow::Break)),

            Stmt::Return(value) => {
                let v = value.as_ref().map(|e| eval_expr(e, self)).transpose()?;
                return Ok(Some(ControlFlow::Return(v)));
            }

            Stmt::Error(text) => {
                let msg = text.expand(self)?;
                self.raise(ErrorRecord::new(ErrorKind::NonTerminating, msg), pipe)?;
            }

            Stmt::Throw(text) => {
                let msg = text.expand(self)?;
                self.raise(ErrorRecord::new(ErrorKind::Thrown, msg), pipe)?;
            }
        }
        Ok(None)
    }
}

fn parse_bound(s: &str, which: &str) -> Result<i64, String> {
    s.trim().parse().map_err(|_| format!("invalid /for {which} value: {s}"))
}

// ── EvalContext impl ──────────────────────────────────────────────────────────

impl EvalContext for Interpreter {
    fn get_var(&self, name: &str) -> Option<Value> {
        Interpreter::get_var(self, name)
    }

    fn set_var(&mut self, name: &str, value: Value) {
        Interpreter::set_var(self, name, value);
    }

    fn params(&self) -> &[Value] {
        self.frames.last().map(Vec::as_slice).unwrap_or(&[])
    }

    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, String> {
        match name {
            "arg" => {
                let n = args.first().map(Value::as_int).ok_or("arg: missing argument 1")?;
                let idx = usize::try_from(n.saturating_sub(1)).map_err(|_| format!("arg: bad index {n}"))?;
                Ok(self.params().get(idx).cloned().unwrap_or_default())
            }
            "argc" => Ok(Value::Int(self.params().len() as i64)),
            "defined" => {
                let var = args.first().map(Value::as_str).ok_or("defined: missing argument 1")?;
                Ok(Value::from(Interpreter::get_var(self, &var).is_some()))
            }
            _ => call_builtin(name, args).unwrap_or_else(|| Err(format!("unknown function: {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::stmt::parse_script;

    /// Collects output; errors stop, continue, or drop per `mode`.
    #[derive(Default)]
    struct TestPipe {
        out: Vec<String>,
        errors: Vec<ErrorRecord>,
        stop: bool,
        drop: bool,
        cancel_after: Option<usize>,
    }

    impl Pipe for TestPipe {
        fn emit(&mut self, value: Value) -> Result<(), Interrupt> {
            self.out.push(value.as_str());
            Ok(())
        }
        fn fail(&mut self, record: ErrorRecord) -> Result<Disposition, Interrupt> {
            if self.stop {
                return Err(Interrupt::Stopped(record));
            }
            self.errors.push(record);
            Ok(if self.drop { Disposition::Dropped } else { Disposition::Logged })
        }
        fn cancelled(&self) -> bool {
            self.cancel_after.is_some_and(|n| self.out.len() >= n)
        }
    }

    fn run_with(interp: &mut Interpreter, src: &str, pipe: &mut TestPipe) -> Result<(), Interrupt> {
        let stmts = parse_script(src).expect("parse");
        interp.run(&stmts, pipe)
    }

    fn run(src: &str) -> Vec<String> {
        let mut pipe = TestPipe::default();
        run_with(&mut Interpreter::new(), src, &mut pipe).expect("run");
        pipe.out
    }

    #[test]
    fn echo_and_bare_lines() {
        assert_eq!(run("hello\n/echo world\n\n"), vec!["hello", "world"]);
    }

    #[test]
    fn set_and_substitute() {
        assert_eq!(run("/set x=6\n/echo $[x * 7]"), vec!["42"]);
        assert_eq!(run("/set name=bob\nhi %name"), vec!["hi bob"]);
    }

    #[test]
    fn emit_keeps_types() {
        let mut pipe = TestPipe::default();
        let stmts = parse_script("/emit 1 + 1, \"a\"").unwrap();
        let mut interp = Interpreter::new();
        interp.run(&stmts, &mut pipe).unwrap();
        assert_eq!(pipe.out, vec!["2", "a"]);
    }

    #[test]
    fn if_elseif_else() {
        let src = "/set n=2\n/if (n == 1)\none\n/elseif (n == 2)\ntwo\n/else\nmany\n/endif";
        assert_eq!(run(src), vec!["two"]);
        assert_eq!(run("/if (0)\na\n/else\nb\n/endif"), vec!["b"]);
        assert!(run("/if (0)\na\n/endif").is_empty());
    }

    #[test]
    fn loops_and_break() {
        assert_eq!(run("/for i 1 3\n/emit i\n/done"), vec!["1", "2", "3"]);
        assert_eq!(
            run("/set i=0\n/while (i < 10)\n/expr i += 1\n/if (i == 3)\n/break\n/endif\n/emit i\n/done"),
            vec!["1", "2"]
        );
    }

    #[test]
    fn return_emits_and_ends() {
        assert_eq!(run("a\n/return 5\nb"), vec!["a", "5"]);
        assert_eq!(run("/for i 1 9\n/if (i == 2)\n/return\n/endif\n/emit i\n/done\nafter"), vec!["1"]);
    }

    #[test]
    fn params_and_arg_functions() {
        let mut interp = Interpreter::new();
        interp.push_params(vec!["bar".into(), Value::Int(7)]);
        let mut pipe = TestPipe::default();
        run_with(&mut interp, "/param foo\n/echo %foo\n/echo %2 %#\n/emit arg(1), argc()", &mut pipe).unwrap();
        assert_eq!(pipe.out, vec!["bar", "7 2", "bar", "2"]);
    }

    #[test]
    fn missing_params_bind_empty() {
        assert_eq!(run("/param a b\n[%a][%{b-none}]"), vec!["[][none]"]);
    }

    #[test]
    fn scopes_shadow_and_unwind() {
        let mut interp = Interpreter::new();
        interp.set_global_var("x", "outer".into());
        interp.push_scope();
        interp.set_var("x", "inner".into());
        assert_eq!(interp.get_var("x"), Some("inner".into()));
        assert_eq!(interp.scope_depth(), 2);
        interp.unwind_to(1, 0);
        assert_eq!(interp.get_var("x"), Some("outer".into()));
        interp.unwind_to(0, 0);
        assert_eq!(interp.scope_depth(), 1);
    }

    #[test]
    fn global_writes_root_scope() {
        let mut interp = Interpreter::new();
        interp.push_scope();
        run_with(&mut interp, "/global g=1\n/set l=2", &mut TestPipe::default()).unwrap();
        interp.unwind_to(1, 0);
        assert_eq!(interp.get_var("g"), Some(Value::Int(1)));
        assert_eq!(interp.get_var("l"), None);
    }

    #[test]
    fn unset_and_defined() {
        assert_eq!(run("/set a=1\n/emit defined(\"a\")\n/unset a\n/emit defined(\"a\")"), vec!["1", "0"]);
    }

    #[test]
    fn non_terminating_error_continues_and_logs() {
        let mut interp = Interpreter::new();
        let mut pipe = TestPipe::default();
        run_with(&mut interp, "a\n/error oops %1\nb", &mut pipe).unwrap();
        assert_eq!(pipe.out, vec!["a", "b"]);
        assert_eq!(pipe.errors[0].kind, ErrorKind::NonTerminating);
        assert_eq!(interp.error_log()[0].message, "oops ");
    }

    #[test]
    fn statement_error_skips_only_that_statement() {
        let mut pipe = TestPipe::default();
        run_with(&mut Interpreter::new(), "a\n/emit 1 / 0\nb", &mut pipe).unwrap();
        assert_eq!(pipe.out, vec!["a", "b"]);
        assert_eq!(pipe.errors[0].kind, ErrorKind::Statement);
        assert_eq!(pipe.errors[0].message, "division by zero");
    }

    #[test]
    fn throw_ends_unit_without_error() {
        let mut pipe = TestPipe::default();
        run_with(&mut Interpreter::new(), "a\n/throw boom\nb", &mut pipe).unwrap();
        assert_eq!(pipe.out, vec!["a"]);
        assert_eq!(pipe.errors[0].kind, ErrorKind::Thrown);
    }

    #[test]
    fn stop_policy_interrupts() {
        let mut pipe = TestPipe { stop: true, ..Default::default() };
        let r = run_with(&mut Interpreter::new(), "a\n/error bar\nb", &mut pipe);
        assert_eq!(r, Err(Interrupt::Stopped(ErrorRecord::new(ErrorKind::NonTerminating, "bar"))));
        assert_eq!(pipe.out, vec!["a"]);
    }

    #[test]
    fn dropped_errors_are_not_logged() {
        let mut interp = Interpreter::new();
        let mut pipe = TestPipe { drop: true, ..Default::default() };
        run_with(&mut interp, "/error x", &mut pipe).unwrap();
        assert!(interp.error_log().is_empty());
    }

    #[test]
    fn cancellation_breaks_infinite_loop() {
        let mut pipe = TestPipe { cancel_after: Some(3), ..Default::default() };
        let r = run_with(&mut Interpreter::new(), "/while (1)\ntick\n/done", &mut pipe);
        assert_eq!(r, Err(Interrupt::Cancelled));
        assert_eq!(pipe.out.len(), 3);
    }

    #[test]
    fn unknown_function_is_a_statement_error() {
        let mut pipe = TestPipe::default();
        run_with(&mut Interpreter::new(), "/emit nope(1)", &mut pipe).unwrap();
        assert_eq!(pipe.errors[0].message, "unknown function: nope");
    }
}
