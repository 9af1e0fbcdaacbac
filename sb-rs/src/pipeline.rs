//! Pipeline-composable Build and Run commands.
//!
//! Both commands follow the same lifecycle: construct, call `process` once
//! per pipeline input, then `end` when input is exhausted.
//!
//! - [`BuildCommand`] turns text fragments into exactly one unit.
//! - [`RunCommand`] accepts text fragments and ready units.  Text is
//!   buffered until a unit arrives or input ends; a unit arriving while text
//!   is buffered first runs the buffered text, then the unit.

use tracing::{debug, info_span};

use crate::aggregate::{Fragment, ScriptSource};
use crate::engine::{CancelToken, Engine, InvocationRequest, Outcome, ScopeMode, Sink};
use crate::error::{CompileError, EngineError};
use crate::policy::ErrorAction;
use crate::script::{Interpreter, Value};
use crate::unit::{ExecutableUnit, UnitInput};

// ── Build ─────────────────────────────────────────────────────────────────────

/// Aggregates text fragments into one unit.
#[derive(Debug, Default)]
pub struct BuildCommand {
    source: ScriptSource,
}

impl BuildCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, fragment: impl Into<Fragment>) {
        self.source.append(fragment);
    }

    /// Compile everything received.  No input yields an empty unit.
    pub fn end(mut self) -> Result<ExecutableUnit, CompileError> {
        let fragments = self.source.len();
        let unit = ExecutableUnit::compile(&self.source.finalize())?;
        debug!(fragments, statements = unit.statements().len(), "built unit");
        Ok(unit)
    }
}

// ── Run ───────────────────────────────────────────────────────────────────────

/// One pipeline input to [`RunCommand`].
#[derive(Debug, Clone)]
pub enum RunInput {
    Text(Fragment),
    Unit(ExecutableUnit),
}

impl From<&str> for RunInput {
    fn from(s: &str) -> Self {
        RunInput::Text(s.into())
    }
}

impl From<String> for RunInput {
    fn from(s: String) -> Self {
        RunInput::Text(s.into())
    }
}

impl From<Fragment> for RunInput {
    fn from(f: Fragment) -> Self {
        RunInput::Text(f)
    }
}

impl From<ExecutableUnit> for RunInput {
    fn from(unit: ExecutableUnit) -> Self {
        RunInput::Unit(unit)
    }
}

/// Options applying to every unit a [`RunCommand`] executes.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Positional arguments bound in each invocation.
    pub arguments: Option<Vec<Value>>,
    /// Run in the caller's scope instead of a child scope.
    pub no_new_scope: bool,
    /// Per-call error action; overrides the inherited preference.
    pub error_action: Option<ErrorAction>,
}

impl RunOptions {
    fn scope(&self) -> ScopeMode {
        if self.no_new_scope {
            ScopeMode::CallerScope
        } else {
            ScopeMode::NewScope
        }
    }
}

/// Executes units against a caller's interpreter, streaming into a sink.
///
/// Invocations run strictly one after another; each finishes (or fails)
/// before the next begins.  The first failure ends the command.
pub struct RunCommand<'a> {
    engine: &'a Engine,
    interp: &'a mut Interpreter,
    sink: &'a mut dyn Sink,
    options: RunOptions,
    cancel: CancelToken,
    source: ScriptSource,
    outcomes: Vec<Outcome>,
}

impl<'a> RunCommand<'a> {
    pub fn new(engine: &'a Engine, interp: &'a mut Interpreter, sink: &'a mut dyn Sink, options: RunOptions) -> Self {
        Self {
            engine,
            interp,
            sink,
            options,
            cancel: CancelToken::new(),
            source: ScriptSource::new(),
            outcomes: Vec::new(),
        }
    }

    /// Observe `cancel` instead of a private token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn process(&mut self, input: impl Into<RunInput>) -> Result<(), EngineError> {
        match input.into() {
            RunInput::Text(fragment) => {
                self.source.append(fragment);
                Ok(())
            }
            RunInput::Unit(unit) => {
                self.flush()?;
                self.execute(UnitInput::Unit(unit))
            }
        }
    }

    /// Run any text still buffered.  Returns what each invocation did.
    pub fn end(mut self) -> Result<Vec<Outcome>, EngineError> {
        self.flush()?;
        Ok(self.outcomes)
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        if self.source.is_empty() {
            return Ok(());
        }
        let text = self.source.finalize();
        self.execute(UnitInput::Source(text))
    }

    fn execute(&mut self, input: UnitInput) -> Result<(), EngineError> {
        let span = info_span!("run", n = self.outcomes.len() + 1);
        let _enter = span.enter();

        let unit = self.engine.prepare(input)?;
        let policy = self.engine.resolve_policy(&*self.interp, self.options.error_action)?;
        let mut request = InvocationRequest::new(unit)
            .scope(self.options.scope())
            .error_action(policy);
        request.arguments = self.options.arguments.clone();

        let outcome = self.engine.invoke(&mut *self.interp, request, &mut *self.sink, &self.cancel)?;
        self.outcomes.push(outcome);
        Ok(())
    }
}
