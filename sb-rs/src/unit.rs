//! Compiled, reusable script units.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::CompileError;
use crate::script::{parse_script, Stmt};

/// An immutable compiled script.
///
/// Cloning is cheap; clones share the parsed statements.  A unit holds no
/// run-time state, so the same unit may be invoked any number of times.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    source: Arc<str>,
    stmts: Arc<[Stmt]>,
}

impl ExecutableUnit {
    /// Compile `source`, rejecting it before anything runs if it does not
    /// parse.
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let stmts = parse_script(source)?;
        debug!(bytes = source.len(), statements = stmts.len(), "compiled unit");
        Ok(Self { source: source.into(), stmts: stmts.into() })
    }

    /// The text the unit was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn statements(&self) -> &[Stmt] {
        &self.stmts
    }

    /// True for a unit with nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl fmt::Display for ExecutableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for ExecutableUnit {
    fn eq(&self, other: &Self) -> bool {
        self.stmts == other.stmts
    }
}

/// Something that can become a unit: text still to compile, or a unit the
/// caller already has.
#[derive(Debug, Clone)]
pub enum UnitInput {
    Source(String),
    Unit(ExecutableUnit),
}

impl UnitInput {
    /// Compile if needed; a supplied unit passes through untouched.
    pub fn into_unit(self) -> Result<ExecutableUnit, CompileError> {
        match self {
            UnitInput::Source(src) => ExecutableUnit::compile(&src),
            UnitInput::Unit(unit) => Ok(unit),
        }
    }
}

impl From<ExecutableUnit> for UnitInput {
    fn from(unit: ExecutableUnit) -> Self {
        UnitInput::Unit(unit)
    }
}

impl From<String> for UnitInput {
    fn from(src: String) -> Self {
        UnitInput::Source(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_compiles_to_empty_unit() {
        let unit = ExecutableUnit::compile("").unwrap();
        assert!(unit.is_empty());
        assert_eq!(unit.source(), "");
    }

    #[test]
    fn compile_is_idempotent() {
        let a = ExecutableUnit::compile("/set x=1\n/emit x").unwrap();
        let b = ExecutableUnit::compile("/set x=1\n/emit x").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.statements().len(), 2);
    }

    #[test]
    fn syntax_errors_surface_at_compile_time() {
        let err = ExecutableUnit::compile("a\n/if (1)").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn deep_nesting_is_a_compile_error() {
        let deep = format!("x\n/emit {}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = ExecutableUnit::compile(&deep).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("nested too deeply"), "{err}");
    }

    #[test]
    fn supplied_unit_bypasses_compilation() {
        let unit = ExecutableUnit::compile("x").unwrap();
        let out = UnitInput::from(unit.clone()).into_unit().unwrap();
        assert!(Arc::ptr_eq(&unit.stmts, &out.stmts));
    }

    #[test]
    fn display_shows_source() {
        let unit = ExecutableUnit::compile("/echo hi").unwrap();
        assert_eq!(unit.to_string(), "/echo hi");
    }
}
