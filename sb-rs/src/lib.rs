//! Build executable script units from piecemeal text and run them in nested
//! interpreter sessions.
//!
//! The pieces, bottom-up:
//!
//! - [`aggregate`]: buffers text fragments into one ordered source
//! - [`unit`]: compiles a source into an immutable [`ExecutableUnit`]
//! - [`policy`]: resolves the [`ErrorAction`] for an invocation
//! - [`engine`]: runs a unit in a [`NestedSession`] and streams its output
//! - [`pipeline`]: the Build and Run commands composing the above
//!
//! ```rust
//! use scriptblock::{BuildCommand, Collector, Engine, Interpreter, RunCommand, RunOptions};
//!
//! let mut build = BuildCommand::new();
//! build.process("/param who");
//! build.process("hello %who");
//! let unit = build.end().unwrap();
//!
//! let engine = Engine::default();
//! let mut interp = Interpreter::new();
//! let mut sink = Collector::new();
//! let options = RunOptions { arguments: Some(vec!["world".into()]), ..Default::default() };
//! let mut run = RunCommand::new(&engine, &mut interp, &mut sink, options);
//! run.process(unit).unwrap();
//! run.end().unwrap();
//! assert_eq!(sink.lines(), vec!["hello world"]);
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod script;
pub mod unit;

pub use aggregate::{Fragment, ScriptSource};
pub use config::{Config, ConfigFile, EngineConfig};
pub use engine::{
    CancelToken, Collector, Engine, InvocationId, InvocationRequest, InvocationState, NestedSession,
    Outcome, OutputEvent, ScopeMode, Sink,
};
pub use error::{CompileError, ConfigError, EngineError, ErrorKind, ErrorRecord, InvalidPolicyError};
pub use pipeline::{BuildCommand, RunCommand, RunInput, RunOptions};
pub use policy::{ChainResolver, ErrorAction, ErrorPolicyResolver, FixedResolver, HostContext};
pub use script::{Interpreter, Value};
pub use unit::{ExecutableUnit, UnitInput};
