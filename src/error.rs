use std::path::PathBuf;

/// The generated program could not be turned into an invocable unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("unresolved import `{0}`")]
    UnresolvedImport(String),
    #[error("failed to load import `{path}` from {}: {message}", .location.display())]
    ImportLoad {
        path: String,
        location: PathBuf,
        message: String,
    },
}

/// A render failed. The template stays usable for later calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("unbound reference `{0}`")]
    UnboundReference(String),
    #[error("no property `{property}` on {target}")]
    MissingProperty { target: String, property: String },
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("{0}")]
    Fault(String),
    #[error("bindings must serialize to a map: {0}")]
    InvalidBindings(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
