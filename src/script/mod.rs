//! A small scripting language that templates compile into.
//!
//! Programs are sequences of statements: `import a.b [as c]`, `def x = e`,
//! `x = e`, `out << e << e`, `if (c) { } else { }`, `for (x in e) { }` and
//! bare expressions. Double-quoted strings interpolate `${ e }` and `$a.b`.

mod ast;
mod eval;
mod lexer;
mod parser;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{Dialect, ScriptingBackend};
use crate::error::{CompileError, ExecutionError};
use crate::template::Bindings;
use crate::value::Value;

use self::ast::{Import, Stmt};
use self::eval::Evaluator;

/// A host function callable from programs as `name(args)`.
pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// What every program compiled against it can see: global values, host
/// functions and importable modules.
#[derive(Clone, Default)]
pub struct Scope {
    globals: BTreeMap<String, Value>,
    functions: HashMap<String, HostFn>,
    modules: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A value readable by name. Bindings passed to `make` take precedence.
    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// A module importable as `import <path>`, e.g. `"app.config"`.
    pub fn with_module(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.modules.insert(path.into(), value.into());
        self
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&HostFn> {
        self.functions.get(name)
    }

    pub fn module(&self, path: &str) -> Option<&Value> {
        self.modules.get(path)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Scope")
            .field("globals", &self.globals)
            .field("functions", &functions)
            .field("modules", &self.modules)
            .finish()
    }
}

/// A compiled program with its imports already resolved.
#[derive(Debug, Clone)]
pub struct Program {
    body: Vec<Stmt>,
    modules: HashMap<String, Value>,
    scope: Scope,
}

impl Program {
    /// Dotted paths of the modules this program imports.
    pub fn imports(&self) -> Vec<&str> {
        let mut paths: Vec<_> = self.modules.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptDialect;

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

impl Dialect for ScriptDialect {
    fn import(&self, program: &mut String, declaration: &str) {
        let declaration = declaration.trim();
        if !declaration.is_empty() {
            program.push_str(declaration);
            program.push('\n');
        }
    }

    fn literal(&self, program: &mut String, text: &str) {
        program.push_str("out << ");
        program.push_str(&quote(text));
        program.push('\n');
    }

    fn statements(&self, program: &mut String, body: &str) {
        program.push_str(body);
        program.push('\n');
    }

    fn expression(&self, program: &mut String, body: &str) {
        program.push_str("out << (\n");
        program.push_str(body);
        program.push_str("\n)\n");
    }

    fn reference(&self, program: &mut String, path: &str) {
        program.push_str("out << ");
        program.push_str(path);
        program.push('\n');
    }
}

/// Compiles and runs programs written in [`ScriptDialect`].
///
/// Modules loaded from resource files are cached per file for the life of
/// the backend.
#[derive(Debug, Default)]
pub struct ScriptBackend {
    dialect: ScriptDialect,
    cache: Mutex<HashMap<PathBuf, Value>>,
}

impl ScriptBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resource files loaded so far.
    pub fn cached_modules(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn resolve(&self, import: &Import, resources: &[PathBuf], parent: &Scope) -> Result<Value, CompileError> {
        let dotted = import.dotted();
        if let Some(module) = parent.module(&dotted) {
            tracing::debug!(import = %dotted, "import resolved from scope");
            return Ok(module.clone());
        }

        for location in resources {
            let mut file = import.path.iter().fold(location.clone(), |dir, part| dir.join(part));
            file.set_extension("json");
            if let Some(module) = self.load(&dotted, location, &file)? {
                return Ok(module);
            }
        }

        Err(CompileError::UnresolvedImport(dotted))
    }

    fn load(&self, dotted: &str, location: &Path, file: &Path) -> Result<Option<Value>, CompileError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = cache.get(file) {
            tracing::debug!(import = %dotted, file = %file.display(), "import cache hit");
            return Ok(Some(module.clone()));
        }
        if !file.is_file() {
            return Ok(None);
        }

        let failed = |message: String| CompileError::ImportLoad {
            path: dotted.to_string(),
            location: location.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(file).map_err(|e| failed(e.to_string()))?;
        let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| failed(e.to_string()))?;
        let module = Value::from(json);

        tracing::debug!(import = %dotted, file = %file.display(), "import loaded");
        cache.insert(file.to_path_buf(), module.clone());
        Ok(Some(module))
    }
}

impl ScriptingBackend for ScriptBackend {
    type Unit = Program;
    type Scope = Scope;

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn compile(&self, program: &str, resources: &[PathBuf], parent: &Scope) -> Result<Program, CompileError> {
        let body = parser::parse_program(program)?;

        let mut modules = HashMap::new();
        for import in ast::imports(&body) {
            let dotted = import.dotted();
            if !modules.contains_key(&dotted) {
                let module = self.resolve(import, resources, parent)?;
                modules.insert(dotted, module);
            }
        }

        tracing::debug!(statements = body.len(), imports = modules.len(), "program compiled");
        Ok(Program {
            body,
            modules,
            scope: parent.clone(),
        })
    }

    fn execute(&self, unit: &Program, bindings: &Bindings, out: &mut String) -> Result<(), ExecutionError> {
        Evaluator::new(bindings, &unit.scope, &unit.modules).run(&unit.body, out)
    }
}
