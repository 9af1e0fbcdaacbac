//! The block-script host language.
//!
//! A small line-oriented language that units are compiled to and run in:
//!
//! - Substitution in text (`%name`, `%{name-default}`, `%1`, `%*`, `$[expr]`)
//! - Arithmetic, string and matching expressions
//! - Control flow: `/if` … `/elseif` … `/else` … `/endif`, `/while` … `/done`,
//!   `/for` … `/done`, `/break`, `/return`
//! - Scoped variables with `/set`, `/global`, `/unset` and `/param`
//! - Errors with `/error` (non-terminating) and `/throw` (terminating)
//!
//! # Quick start
//!
//! ```rust
//! use scriptblock::script::{parse_script, Disposition, Interpreter, Interrupt, Pipe, Value};
//! use scriptblock::ErrorRecord;
//!
//! struct Print(Vec<String>);
//! impl Pipe for Print {
//!     fn emit(&mut self, v: Value) -> Result<(), Interrupt> {
//!         self.0.push(v.to_string());
//!         Ok(())
//!     }
//!     fn fail(&mut self, _: ErrorRecord) -> Result<Disposition, Interrupt> {
//!         Ok(Disposition::Logged)
//!     }
//! }
//!
//! let stmts = parse_script("/set x=6\n/echo $[x * 7]").unwrap();
//! let mut out = Print(Vec::new());
//! Interpreter::new().run(&stmts, &mut out).unwrap();
//! assert_eq!(out.0, vec!["42"]);
//! ```

pub mod builtins;
pub mod expr;
pub mod interp;
pub mod stmt;
pub mod template;
pub mod value;

pub use expr::EvalContext;
pub use interp::{Disposition, Interpreter, Interrupt, Pipe};
pub use stmt::{parse_script, Stmt};
pub use template::Template;
pub use value::Value;
