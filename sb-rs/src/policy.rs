//! Error-policy resolution.
//!
//! Every invocation runs under exactly one [`ErrorAction`], resolved once
//! before the unit starts.  Resolution is two-tier:
//!
//! 1. the host's per-call hint ([`HostContext::ambient_error_action`]), set by
//!    the pipeline machinery (e.g. the Run command's `error_action` option);
//! 2. otherwise the inherited preference variable, looked up through the
//!    caller's scope chain.
//!
//! An unset variable resolves to `None`; the engine then applies its
//! configured fallback (Continue unless changed).  A variable holding
//! anything that is not an error action is an [`InvalidPolicyError`].

use std::fmt;
use std::str::FromStr;

use crate::error::InvalidPolicyError;
use crate::script::{Interpreter, Value};

/// Name of the inherited variable consulted by [`ChainResolver`] by default.
pub const PREFERENCE_VARIABLE: &str = "ErrorActionPreference";

/// What happens when a runtime error is raised inside a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorAction {
    /// Record the error without reporting it, then carry on.
    SilentlyContinue,
    /// Abort the invocation and raise the error to the caller.
    Stop,
    /// Report the error through the host's error channel, then carry on.
    #[default]
    Continue,
    /// Ask the host whether to carry on.
    Inquire,
    /// Drop the error entirely.
    Ignore,
}

impl ErrorAction {
    pub const ALL: [ErrorAction; 5] = [
        ErrorAction::SilentlyContinue,
        ErrorAction::Stop,
        ErrorAction::Continue,
        ErrorAction::Inquire,
        ErrorAction::Ignore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorAction::SilentlyContinue => "SilentlyContinue",
            ErrorAction::Stop => "Stop",
            ErrorAction::Continue => "Continue",
            ErrorAction::Inquire => "Inquire",
            ErrorAction::Ignore => "Ignore",
        }
    }

    /// Case-insensitive lookup by variant name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|a| a.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ErrorAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let names: Vec<_> = Self::ALL.iter().map(|a| a.name()).collect();
            format!("unknown error action {s:?} (expected one of {})", names.join(", "))
        })
    }
}

// ── Host capability ───────────────────────────────────────────────────────────

/// What the resolver may ask of the invocation's host.
pub trait HostContext {
    /// Per-call override set by the immediate caller, if any.
    fn ambient_error_action(&self) -> Option<ErrorAction>;

    /// Look up a variable through the caller's scope chain.
    fn variable(&self, name: &str) -> Option<Value>;
}

/// The context an invocation is resolved against: the caller's hint plus the
/// caller's interpreter for inherited variables.
pub struct InvocationContext<'a> {
    pub hint: Option<ErrorAction>,
    pub interp: &'a Interpreter,
}

impl HostContext for InvocationContext<'_> {
    fn ambient_error_action(&self) -> Option<ErrorAction> {
        self.hint
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.interp.get_var(name)
    }
}

// ── Resolvers ─────────────────────────────────────────────────────────────────

/// Injectable policy lookup.  Hosts with their own preference chain supply
/// their own implementation to the engine.
pub trait ErrorPolicyResolver: Send + Sync {
    fn resolve(&self, ctx: &dyn HostContext) -> Result<Option<ErrorAction>, InvalidPolicyError>;
}

/// Hint first, then the inherited preference variable.
#[derive(Debug, Clone)]
pub struct ChainResolver {
    variable: String,
}

impl ChainResolver {
    pub fn new(variable: impl Into<String>) -> Self {
        Self { variable: variable.into() }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::new(PREFERENCE_VARIABLE)
    }
}

impl ErrorPolicyResolver for ChainResolver {
    fn resolve(&self, ctx: &dyn HostContext) -> Result<Option<ErrorAction>, InvalidPolicyError> {
        if let Some(action) = ctx.ambient_error_action() {
            return Ok(Some(action));
        }
        let invalid = |value: String| InvalidPolicyError {
            variable: self.variable.clone(),
            value,
        };
        match ctx.variable(&self.variable) {
            None => Ok(None),
            Some(Value::Action(action)) => Ok(Some(action)),
            Some(Value::Str(s)) => ErrorAction::parse(&s).map(Some).ok_or_else(|| invalid(s)),
            Some(other) => Err(invalid(format!("{other} ({})", other.type_name()))),
        }
    }
}

/// Always resolves to the same action, ignoring the host.
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver(pub ErrorAction);

impl ErrorPolicyResolver for FixedResolver {
    fn resolve(&self, _ctx: &dyn HostContext) -> Result<Option<ErrorAction>, InvalidPolicyError> {
        Ok(Some(self.0))
    }
}
