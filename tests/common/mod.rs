#![allow(dead_code)]

use gst::script::{Scope, ScriptBackend};
use gst::{CreatorOptions, Grammar, TemplateCreator};

/// Routes `tracing` output through the test harness. Set `RUST_LOG=gst=debug`
/// to see generated programs and import resolution.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn creator(grammar: Grammar, scope: Scope) -> TemplateCreator<ScriptBackend> {
    init_tracing();
    let options = CreatorOptions::default()
        .with_grammar(grammar)
        .with_debug_program(true);
    TemplateCreator::new(ScriptBackend::new(), scope, options)
}

pub fn standard() -> TemplateCreator<ScriptBackend> {
    creator(Grammar::STANDARD, Scope::new())
}
