//! Nested execution engine.
//!
//! [`Engine::invoke`] runs one [`ExecutableUnit`] inside a [`NestedSession`]
//! opened over the caller's [`Interpreter`].  The unit executes on a scoped
//! worker thread and pushes every value and runtime error through a bounded
//! channel; the calling thread drains that channel in a consuming loop,
//! forwards values to the caller's [`Sink`] in production order and applies
//! the invocation's [`ErrorAction`] to each error.
//!
//! With the default channel depth of 0 the worker and the consumer run in
//! lockstep: the worker does not resume after an emit until the consumer
//! has handed the value to the sink.  A larger depth lets up to that many
//! values queue ahead of the sink.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use tracing::{debug, debug_span, trace, warn};

use crate::config::{EngineConfig, MAX_CHANNEL_DEPTH};
use crate::error::{CompileError, EngineError, ErrorRecord, InvalidPolicyError};
use crate::policy::{ChainResolver, ErrorAction, ErrorPolicyResolver, InvocationContext};
use crate::script::{Disposition, Interpreter, Interrupt, Pipe, Value};
use crate::unit::{ExecutableUnit, UnitInput};

// ── Invocation model ──────────────────────────────────────────────────────────

/// Whether a unit's variable writes stay inside the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    /// Run in a child scope that is discarded afterwards.
    #[default]
    NewScope,
    /// Run directly in the caller's scope.
    CallerScope,
}

/// Identifies one invocation in output events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub u64);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything needed to run one unit once.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub unit: ExecutableUnit,
    /// Positional arguments; `None` binds an empty list.
    pub arguments: Option<Vec<Value>>,
    pub scope: ScopeMode,
    /// Already resolved; see [`Engine::resolve_policy`].
    pub error_action: ErrorAction,
}

impl InvocationRequest {
    pub fn new(unit: ExecutableUnit) -> Self {
        Self {
            unit,
            arguments: None,
            scope: ScopeMode::default(),
            error_action: ErrorAction::default(),
        }
    }

    pub fn arguments(mut self, args: Vec<Value>) -> Self {
        self.arguments = Some(args);
        self
    }

    pub fn scope(mut self, scope: ScopeMode) -> Self {
        self.scope = scope;
        self
    }

    pub fn error_action(mut self, action: ErrorAction) -> Self {
        self.error_action = action;
        self
    }
}

/// A single value produced by a running unit.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    pub invocation: InvocationId,
    /// 0-based position within the invocation's output.
    pub seq: u64,
    pub value: Value,
}

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Compiling,
    Bound,
    Running,
    Completed,
    /// An error under a stopping policy ended the invocation.
    FailedStop,
    /// An error was reported and execution may resume.
    FailedReportedOnly,
}

/// Summary of an invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub invocation: InvocationId,
    pub state: InvocationState,
    /// Values delivered to the sink.
    pub emitted: u64,
    /// Runtime errors that were allowed to continue.
    pub errors: usize,
}

// ── Caller-facing seams ───────────────────────────────────────────────────────

/// Receives what an invocation produces.  Called on the invoking thread.
pub trait Sink {
    fn output(&mut self, event: OutputEvent);

    /// A runtime error reported under a continuing policy.
    fn error(&mut self, record: &ErrorRecord);

    /// Under [`ErrorAction::Inquire`]: continue after `record`?
    fn inquire(&mut self, record: &ErrorRecord) -> bool {
        let _ = record;
        false
    }
}

/// A [`Sink`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct Collector {
    pub events: Vec<OutputEvent>,
    pub errors: Vec<ErrorRecord>,
    /// Answer given to every inquiry.
    pub inquire_answer: bool,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<Value> {
        self.events.iter().map(|e| e.value.clone()).collect()
    }

    /// Output values rendered as text.
    pub fn lines(&self) -> Vec<String> {
        self.events.iter().map(|e| e.value.to_string()).collect()
    }
}

impl Sink for Collector {
    fn output(&mut self, event: OutputEvent) {
        self.events.push(event);
    }

    fn error(&mut self, record: &ErrorRecord) {
        self.errors.push(record.clone());
    }

    fn inquire(&mut self, _record: &ErrorRecord) -> bool {
        self.inquire_answer
    }
}

/// Shared cancellation flag.  Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── NestedSession ─────────────────────────────────────────────────────────────

/// A child execution context over the caller's interpreter.
///
/// Opening pushes the argument frame (and a child scope for
/// [`ScopeMode::NewScope`]); dropping restores the interpreter to the depths
/// it had before, whichever way the invocation ended.
pub struct NestedSession<'a> {
    interp: &'a mut Interpreter,
    scopes: usize,
    frames: usize,
}

impl<'a> NestedSession<'a> {
    pub fn open(interp: &'a mut Interpreter, scope: ScopeMode, arguments: Option<Vec<Value>>) -> Self {
        let scopes = interp.scope_depth();
        let frames = interp.frame_depth();
        if scope == ScopeMode::NewScope {
            interp.push_scope();
        }
        interp.push_params(arguments.unwrap_or_default());
        trace!(scopes, frames, ?scope, "session opened");
        Self { interp, scopes, frames }
    }
}

impl Deref for NestedSession<'_> {
    type Target = Interpreter;

    fn deref(&self) -> &Interpreter {
        self.interp
    }
}

impl DerefMut for NestedSession<'_> {
    fn deref_mut(&mut self) -> &mut Interpreter {
        self.interp
    }
}

impl Drop for NestedSession<'_> {
    fn drop(&mut self) {
        self.interp.unwind_to(self.scopes, self.frames);
        trace!(scopes = self.scopes, "session released");
    }
}

// ── Worker ↔ consumer protocol ────────────────────────────────────────────────

enum Event {
    Output(Value),
    Error(ErrorRecord),
}

/// The consumer's answer to an event that waits for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Resume,
    Log,
    Drop,
    Stop,
}

/// The worker's end of the channel.
struct ChannelPipe {
    events: SyncSender<Event>,
    verdicts: Receiver<Verdict>,
    lockstep: bool,
    cancel: CancelToken,
}

impl Pipe for ChannelPipe {
    fn emit(&mut self, value: Value) -> Result<(), Interrupt> {
        self.events.send(Event::Output(value)).map_err(|_| Interrupt::Cancelled)?;
        if self.lockstep {
            match self.verdicts.recv() {
                Ok(Verdict::Resume) => {}
                _ => return Err(Interrupt::Cancelled),
            }
        }
        Ok(())
    }

    fn fail(&mut self, record: ErrorRecord) -> Result<Disposition, Interrupt> {
        self.events
            .send(Event::Error(record.clone()))
            .map_err(|_| Interrupt::Cancelled)?;
        match self.verdicts.recv() {
            Ok(Verdict::Log) => Ok(Disposition::Logged),
            Ok(Verdict::Drop) => Ok(Disposition::Dropped),
            Ok(Verdict::Stop) => Err(Interrupt::Stopped(record)),
            Ok(Verdict::Resume) | Err(_) => Err(Interrupt::Cancelled),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What the consuming loop saw.
#[derive(Debug, Default)]
struct Drained {
    emitted: u64,
    errors: usize,
    cancelled: bool,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Runs units in nested sessions and resolves their error policies.
pub struct Engine {
    config: EngineConfig,
    resolver: Box<dyn ErrorPolicyResolver>,
    next_id: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Engine {
    /// An engine using the hint-then-variable resolution chain.
    pub fn new(config: EngineConfig) -> Self {
        let resolver = ChainResolver::new(config.preference_variable.clone());
        Self::with_resolver(config, Box::new(resolver))
    }

    pub fn with_resolver(config: EngineConfig, resolver: Box<dyn ErrorPolicyResolver>) -> Self {
        Self { config, resolver, next_id: AtomicU64::new(1) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compile `input` if it is still text; a supplied unit passes through.
    pub fn prepare(&self, input: UnitInput) -> Result<ExecutableUnit, CompileError> {
        if let UnitInput::Source(_) = &input {
            trace!(to = ?InvocationState::Compiling, "invocation state");
        }
        input.into_unit()
    }

    /// The effective error action for an invocation from `interp`.
    ///
    /// `hint` is the per-call override; without one the resolver consults
    /// the caller's scope chain, and an unset preference falls back to
    /// [`EngineConfig::fallback_action`].
    pub fn resolve_policy(
        &self,
        interp: &Interpreter,
        hint: Option<ErrorAction>,
    ) -> Result<ErrorAction, InvalidPolicyError> {
        let ctx = InvocationContext { hint, interp };
        let action = self.resolver.resolve(&ctx)?.unwrap_or(self.config.fallback_action);
        debug!(?hint, %action, "resolved error policy");
        Ok(action)
    }

    /// Run `request.unit` nested in `interp`, streaming its output to `sink`.
    ///
    /// Returns once the unit has finished and the nested session has been
    /// released.  A runtime error under [`ErrorAction::Stop`] (or a declined
    /// inquiry) surfaces as [`EngineError::Stopped`]; no output produced
    /// after that error reaches the sink.
    pub fn invoke(
        &self,
        interp: &mut Interpreter,
        request: InvocationRequest,
        sink: &mut dyn Sink,
        cancel: &CancelToken,
    ) -> Result<Outcome, EngineError> {
        let id = InvocationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let policy = request.error_action;
        let span = debug_span!("invoke", invocation = %id, policy = %policy);
        let _enter = span.enter();

        let mut state = InvocationState::Idle;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut session = NestedSession::open(interp, request.scope, request.arguments);
        transition(&mut state, InvocationState::Bound);

        let depth = self.config.channel_depth.min(MAX_CHANNEL_DEPTH);
        let (event_tx, event_rx) = sync_channel::<Event>(depth);
        let (verdict_tx, verdict_rx) = sync_channel::<Verdict>(1);
        let pipe = ChannelPipe {
            events: event_tx,
            verdicts: verdict_rx,
            lockstep: depth == 0,
            cancel: cancel.clone(),
        };
        let unit = request.unit;
        let interp: &mut Interpreter = &mut session;

        transition(&mut state, InvocationState::Running);
        let (drained, result) = std::thread::scope(|s| {
            let worker_span = span.clone();
            let worker = s.spawn(move || {
                let mut pipe = pipe;
                worker_span.in_scope(|| interp.run(unit.statements(), &mut pipe))
            });
            let drained = drain(event_rx, verdict_tx, depth == 0, policy, id, sink, cancel, &mut state);
            (drained, worker.join())
        });
        drop(session);

        let result = result.map_err(|payload| {
            let msg = panic_message(payload);
            warn!(%msg, "script worker panicked");
            EngineError::WorkerPanicked(msg)
        })?;

        match result {
            Err(Interrupt::Stopped(record)) => {
                transition(&mut state, InvocationState::FailedStop);
                debug!(error = %record, "invocation stopped");
                Err(EngineError::Stopped(record))
            }
            Err(Interrupt::Cancelled) => Err(EngineError::Cancelled),
            Ok(()) if drained.cancelled => Err(EngineError::Cancelled),
            Ok(()) => {
                transition(&mut state, InvocationState::Completed);
                debug!(emitted = drained.emitted, errors = drained.errors, "invocation completed");
                Ok(Outcome {
                    invocation: id,
                    state,
                    emitted: drained.emitted,
                    errors: drained.errors,
                })
            }
        }
    }
}

/// The consuming loop.  Returns when the worker hangs up or cancellation is
/// observed; the channel ends are dropped on return so a blocked worker
/// wakes up.
#[allow(clippy::too_many_arguments)]
fn drain(
    events: Receiver<Event>,
    verdicts: SyncSender<Verdict>,
    lockstep: bool,
    policy: ErrorAction,
    id: InvocationId,
    sink: &mut dyn Sink,
    cancel: &CancelToken,
    state: &mut InvocationState,
) -> Drained {
    let mut drained = Drained::default();
    for event in events.iter() {
        if cancel.is_cancelled() {
            debug!("cancellation observed");
            drained.cancelled = true;
            break;
        }
        let verdict = match event {
            Event::Output(value) => {
                sink.output(OutputEvent { invocation: id, seq: drained.emitted, value });
                drained.emitted += 1;
                if !lockstep {
                    continue;
                }
                Verdict::Resume
            }
            Event::Error(record) => {
                let verdict = apply_policy(policy, &record, sink);
                if verdict != Verdict::Stop {
                    transition(state, InvocationState::FailedReportedOnly);
                    transition(state, InvocationState::Running);
                }
                if verdict == Verdict::Log {
                    drained.errors += 1;
                }
                verdict
            }
        };
        if verdicts.send(verdict).is_err() {
            break;
        }
    }
    drained
}

fn apply_policy(policy: ErrorAction, record: &ErrorRecord, sink: &mut dyn Sink) -> Verdict {
    match policy {
        ErrorAction::Stop => Verdict::Stop,
        ErrorAction::Continue => {
            sink.error(record);
            Verdict::Log
        }
        ErrorAction::SilentlyContinue => Verdict::Log,
        ErrorAction::Ignore => Verdict::Drop,
        ErrorAction::Inquire => {
            if sink.inquire(record) {
                sink.error(record);
                Verdict::Log
            } else {
                Verdict::Stop
            }
        }
    }
}

fn transition(state: &mut InvocationState, next: InvocationState) {
    trace!(from = ?*state, to = ?next, "invocation state");
    *state = next;
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .unwrap_or_else(|| "unknown panic".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn unit(src: &str) -> ExecutableUnit {
        ExecutableUnit::compile(src).expect("compile")
    }

    fn invoke(
        interp: &mut Interpreter,
        request: InvocationRequest,
    ) -> (Result<Outcome, EngineError>, Collector) {
        let mut sink = Collector::new();
        let r = Engine::default().invoke(interp, request, &mut sink, &CancelToken::new());
        (r, sink)
    }

    #[test]
    fn values_arrive_in_order() {
        let (r, sink) = invoke(&mut Interpreter::new(), InvocationRequest::new(unit("/emit 1, 2\n3")));
        let outcome = r.unwrap();
        assert_eq!(sink.lines(), vec!["1", "2", "3"]);
        assert_eq!(sink.events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(outcome.emitted, 3);
        assert_eq!(outcome.state, InvocationState::Completed);
    }

    #[test]
    fn new_scope_isolates_writes() {
        let mut interp = Interpreter::new();
        let (r, _) = invoke(&mut interp, InvocationRequest::new(unit("/set foo=bar")));
        r.unwrap();
        assert_eq!(interp.get_var("foo"), None);
        assert_eq!(interp.scope_depth(), 1);
    }

    #[test]
    fn caller_scope_shares_writes() {
        let mut interp = Interpreter::new();
        let req = InvocationRequest::new(unit("/set foo=bar")).scope(ScopeMode::CallerScope);
        invoke(&mut interp, req).0.unwrap();
        assert_eq!(interp.get_var("foo"), Some(Value::from("bar")));
    }

    #[test]
    fn globals_stay_visible_inside() {
        let mut interp = Interpreter::new();
        interp.set_global_var("who", "world".into());
        let (_, sink) = invoke(&mut interp, InvocationRequest::new(unit("hello %who")));
        assert_eq!(sink.lines(), vec!["hello world"]);
    }

    #[test]
    fn arguments_bind_positionally() {
        let req = InvocationRequest::new(unit("/param foo\n/echo %foo")).arguments(vec!["bar".into()]);
        let (_, sink) = invoke(&mut Interpreter::new(), req);
        assert_eq!(sink.lines(), vec!["bar"]);
    }

    #[test]
    fn stop_raises_and_halts_output() {
        let mut interp = Interpreter::new();
        let req = InvocationRequest::new(unit("a\n/error bar\nb")).error_action(ErrorAction::Stop);
        let (r, sink) = invoke(&mut interp, req);
        match r {
            Err(EngineError::Stopped(rec)) => {
                assert_eq!(rec.message, "bar");
                assert_eq!(rec.kind, ErrorKind::NonTerminating);
            }
            other => panic!("expected Stopped, got {other:?}"),
        }
        assert_eq!(sink.lines(), vec!["a"]);
        assert!(sink.errors.is_empty());
        assert_eq!(interp.scope_depth(), 1);
    }

    #[test]
    fn continue_reports_and_resumes() {
        let mut interp = Interpreter::new();
        let (r, sink) = invoke(&mut interp, InvocationRequest::new(unit("a\n/error bar\nb")));
        assert_eq!(r.unwrap().errors, 1);
        assert_eq!(sink.lines(), vec!["a", "b"]);
        assert_eq!(sink.errors.len(), 1);
        assert_eq!(interp.error_log().len(), 1);
    }

    #[test]
    fn oversized_builtin_result_is_a_statement_error() {
        let src = "a\n/emit strrep(\"abc\", 9223372036854775807)\nb";
        let (r, sink) = invoke(&mut Interpreter::new(), InvocationRequest::new(unit(src)));
        assert_eq!(r.unwrap().errors, 1);
        assert_eq!(sink.lines(), vec!["a", "b"]);
        assert_eq!(sink.errors.len(), 1);
        assert_eq!(sink.errors[0].kind, ErrorKind::Statement);
    }

    #[test]
    fn silently_continue_logs_without_reporting() {
        let mut interp = Interpreter::new();
        let req = InvocationRequest::new(unit("/error x\ny")).error_action(ErrorAction::SilentlyContinue);
        let (_, sink) = invoke(&mut interp, req);
        assert!(sink.errors.is_empty());
        assert_eq!(sink.lines(), vec!["y"]);
        assert_eq!(interp.error_log().len(), 1);
    }

    #[test]
    fn ignore_drops_errors() {
        let mut interp = Interpreter::new();
        let req = InvocationRequest::new(unit("/error x\ny")).error_action(ErrorAction::Ignore);
        let (r, sink) = invoke(&mut interp, req);
        assert_eq!(r.unwrap().errors, 0);
        assert!(sink.errors.is_empty());
        assert!(interp.error_log().is_empty());
    }

    #[test]
    fn inquire_asks_the_sink() {
        let engine = Engine::default();
        let req = InvocationRequest::new(unit("/error x\ny")).error_action(ErrorAction::Inquire);

        let mut yes = Collector { inquire_answer: true, ..Default::default() };
        engine.invoke(&mut Interpreter::new(), req.clone(), &mut yes, &CancelToken::new()).unwrap();
        assert_eq!(yes.lines(), vec!["y"]);

        let mut no = Collector::new();
        let r = engine.invoke(&mut Interpreter::new(), req, &mut no, &CancelToken::new());
        assert!(matches!(r, Err(EngineError::Stopped(_))));
        assert!(no.events.is_empty());
    }

    #[test]
    fn thrown_error_ends_unit_under_continue() {
        let (r, sink) = invoke(&mut Interpreter::new(), InvocationRequest::new(unit("a\n/throw t\nb")));
        r.unwrap();
        assert_eq!(sink.lines(), vec!["a"]);
        assert_eq!(sink.errors[0].kind, ErrorKind::Thrown);
    }

    #[test]
    fn pre_cancelled_token_runs_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = Collector::new();
        let r = Engine::default().invoke(
            &mut Interpreter::new(),
            InvocationRequest::new(unit("a")),
            &mut sink,
            &cancel,
        );
        assert!(matches!(r, Err(EngineError::Cancelled)));
        assert!(sink.events.is_empty());
    }

    /// Cancels the token after a fixed number of values.
    struct CancelAfter {
        seen: usize,
        limit: usize,
        cancel: CancelToken,
    }

    impl Sink for CancelAfter {
        fn output(&mut self, _event: OutputEvent) {
            self.seen += 1;
            if self.seen == self.limit {
                self.cancel.cancel();
            }
        }
        fn error(&mut self, _record: &ErrorRecord) {}
    }

    #[test]
    fn infinite_unit_streams_until_cancelled() {
        let mut interp = Interpreter::new();
        let cancel = CancelToken::new();
        let mut sink = CancelAfter { seen: 0, limit: 5, cancel: cancel.clone() };
        let r = Engine::default().invoke(
            &mut interp,
            InvocationRequest::new(unit("/while (1)\ntick\n/done")),
            &mut sink,
            &cancel,
        );
        assert!(matches!(r, Err(EngineError::Cancelled)));
        assert_eq!(sink.seen, 5);
        assert_eq!(interp.scope_depth(), 1);
    }

    #[test]
    fn buffered_channel_keeps_order() {
        let config = EngineConfig { channel_depth: 4, ..EngineConfig::default() };
        let mut sink = Collector::new();
        Engine::new(config)
            .invoke(
                &mut Interpreter::new(),
                InvocationRequest::new(unit("/for i 1 20\n/emit i\n/done")),
                &mut sink,
                &CancelToken::new(),
            )
            .unwrap();
        let expected: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
        assert_eq!(sink.lines(), expected);
    }

    #[test]
    fn oversized_channel_depth_is_capped() {
        let engine = Engine::new(EngineConfig { channel_depth: 1 << 40, ..EngineConfig::default() });
        let mut sink = Collector::new();
        let req = InvocationRequest::new(unit("/for i 1 3\n/emit i\n/done"));
        engine.invoke(&mut Interpreter::new(), req, &mut sink, &CancelToken::new()).unwrap();
        assert_eq!(sink.lines(), vec!["1", "2", "3"]);
    }

    #[test]
    fn invocation_ids_increase() {
        let engine = Engine::default();
        let mut interp = Interpreter::new();
        let u = unit("x");
        let mut sink = Collector::new();
        let a = engine.invoke(&mut interp, InvocationRequest::new(u.clone()), &mut sink, &CancelToken::new()).unwrap();
        let b = engine.invoke(&mut interp, InvocationRequest::new(u), &mut sink, &CancelToken::new()).unwrap();
        assert!(b.invocation > a.invocation);
        assert_eq!(sink.events[1].invocation, b.invocation);
    }

    #[test]
    fn resolve_policy_chain() {
        let engine = Engine::default();
        let mut interp = Interpreter::new();
        assert_eq!(engine.resolve_policy(&interp, None), Ok(ErrorAction::Continue));
        interp.set_global_var("ErrorActionPreference", "stop".into());
        assert_eq!(engine.resolve_policy(&interp, None), Ok(ErrorAction::Stop));
        assert_eq!(engine.resolve_policy(&interp, Some(ErrorAction::Ignore)), Ok(ErrorAction::Ignore));
        interp.set_global_var("ErrorActionPreference", Value::Int(3));
        assert!(engine.resolve_policy(&interp, None).is_err());
    }

    #[test]
    fn fallback_action_is_configurable() {
        let config = EngineConfig { fallback_action: ErrorAction::Stop, ..EngineConfig::default() };
        let engine = Engine::new(config);
        assert_eq!(engine.resolve_policy(&Interpreter::new(), None), Ok(ErrorAction::Stop));
    }

    #[test]
    fn session_restores_depth() {
        let mut interp = Interpreter::new();
        {
            let mut session = NestedSession::open(&mut interp, ScopeMode::NewScope, Some(vec!["a".into()]));
            session.set_var("x", Value::Int(1));
            assert_eq!(session.scope_depth(), 2);
        }
        assert_eq!(interp.scope_depth(), 1);
        assert_eq!(interp.get_var("x"), None);
    }
}
