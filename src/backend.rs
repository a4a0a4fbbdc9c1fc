//! The seam between the template core and a guest scripting language.
//!
//! The core never interprets scriptlet bodies. It asks a [`Dialect`] to
//! spell each construct in the guest language, hands the resulting program
//! to [`ScriptingBackend::compile`], and later runs the compiled unit with
//! [`ScriptingBackend::execute`].

use std::path::PathBuf;

use crate::error::{CompileError, ExecutionError};
use crate::template::Bindings;

/// How template constructs are written out in a guest program.
///
/// Every method appends complete statements to `program`.
pub trait Dialect {
    fn begin(&self, _program: &mut String) {}

    /// An import declaration, prepended before any output statement.
    fn import(&self, program: &mut String, declaration: &str);

    /// Literal template text, written to the output sink unchanged.
    fn literal(&self, program: &mut String, text: &str);

    /// A block scriptlet body, spliced in verbatim.
    fn statements(&self, program: &mut String, body: &str);

    /// An expression whose value is written to the output sink.
    fn expression(&self, program: &mut String, body: &str);

    /// A dotted path looked up in the bindings and written to the output sink.
    fn reference(&self, program: &mut String, path: &str);

    fn end(&self, _program: &mut String) {}
}

pub trait ScriptingBackend {
    /// An invocable, compiled program.
    type Unit;
    /// Base capabilities every program can see.
    type Scope;

    fn dialect(&self) -> &dyn Dialect;

    /// Compiles `program`, resolving imports against `resources` and `parent`.
    fn compile(
        &self,
        program: &str,
        resources: &[PathBuf],
        parent: &Self::Scope,
    ) -> Result<Self::Unit, CompileError>;

    /// Runs `unit` with `bindings` visible, appending everything it outputs to `out`.
    fn execute(
        &self,
        unit: &Self::Unit,
        bindings: &Bindings,
        out: &mut String,
    ) -> Result<(), ExecutionError>;
}
