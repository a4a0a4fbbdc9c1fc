//! gst: scriptlet templates over a pluggable scripting backend.
//!
//! A template is literal text interleaved with four kinds of construct:
//! - `<% statements %>`: block scriptlets, spliced into the program verbatim.
//! - `<%= expression %>`: expression scriptlets, whose value is output.
//! - `${ expression }`: dollar scriptlets, same as `<%= %>`.
//! - `$name` / `$a.b.c`: dollar references, looked up in the bindings.
//!
//! The extended grammar also accepts `<%@ import declarations %>`, which
//! are hoisted to the top of the generated program.
//!
//! Processing is a fixed pipeline:
//! - [`lexer::Tokenizer`] splits the source into typed byte spans.
//! - [`parser::Parser`] drives an [`parser::Accumulator`] with tree events
//!   and never fails; problems become [`Diagnostic`]s on the nodes.
//! - [`TemplateCreator`] lowers the tree to a guest program through the
//!   backend's [`Dialect`] and compiles it once.
//! - [`Template::make`] runs the compiled program against [`Bindings`].
//!
//! The bundled [`script`] backend is used by [`create`] and [`render`].
//! Any other [`ScriptingBackend`] can be plugged into a [`TemplateCreator`].

pub mod ast;
pub mod backend;
pub mod compiler;
pub mod diagnostic;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod provider;
pub mod script;
pub mod template;
pub mod value;

pub use backend::{Dialect, ScriptingBackend};
pub use compiler::{CreatorOptions, TemplateCreator};
pub use diagnostic::{Diagnosed, Diagnostic};
pub use error::{CompileError, Error, ExecutionError};
pub use parser::Grammar;
pub use template::{bindings, Bindings, Template};
pub use value::Value;

/// A creator over the bundled script backend with default options.
pub fn creator() -> TemplateCreator<script::ScriptBackend> {
    TemplateCreator::new(
        script::ScriptBackend::new(),
        script::Scope::new(),
        CreatorOptions::default(),
    )
}

/// Compiles `source` with the standard grammar and the bundled backend.
pub fn create(source: &str) -> Result<Diagnosed<Template<script::ScriptBackend>>, CompileError> {
    creator().create(source)
}

/// Compiles and renders `source` in one go, ignoring parse diagnostics.
pub fn render(source: &str, bindings: &Bindings) -> Result<String, Error> {
    let template = create(source)?.into_inner();
    Ok(template.make(bindings)?)
}
