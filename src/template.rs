use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::ScriptingBackend;
use crate::error::ExecutionError;
use crate::value::Value;

/// Named values visible to a template while it renders.
pub type Bindings = BTreeMap<String, Value>;

/// Builds bindings from anything that serializes to a map.
pub fn bindings<S: Serialize + ?Sized>(context: &S) -> Result<Bindings, ExecutionError> {
    match serde_json::to_value(context) {
        Ok(serde_json::Value::Object(map)) => {
            Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
        }
        Ok(other) => Err(ExecutionError::InvalidBindings(format!(
            "got {}",
            Value::from(other).type_name()
        ))),
        Err(err) => Err(ExecutionError::InvalidBindings(err.to_string())),
    }
}

/// A compiled, reusable template.
pub struct Template<B: ScriptingBackend> {
    backend: Arc<B>,
    unit: B::Unit,
    program: String,
}

impl<B: ScriptingBackend> Template<B> {
    pub(crate) fn new(backend: Arc<B>, unit: B::Unit, program: String) -> Self {
        Self {
            backend,
            unit,
            program,
        }
    }

    /// Renders the template against `bindings`.
    pub fn make(&self, bindings: &Bindings) -> Result<String, ExecutionError> {
        let mut out = String::new();
        self.backend.execute(&self.unit, bindings, &mut out)?;
        Ok(out)
    }

    /// Renders against a serializable context, e.g. a `serde_json::json!` map.
    pub fn make_with<S: Serialize + ?Sized>(&self, context: &S) -> Result<String, ExecutionError> {
        self.make(&bindings(context)?)
    }

    /// The guest program this template was compiled from.
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl<B: ScriptingBackend> fmt::Debug for Template<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}
