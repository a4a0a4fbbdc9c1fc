//! Lowering a parsed template into a guest program and compiling it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{walk_children, LeafNode, TreeNode, TreeNodeType, Visitor};
use crate::backend::{Dialect, ScriptingBackend};
use crate::diagnostic::Diagnosed;
use crate::error::CompileError;
use crate::lexer::TokenType;
use crate::parser::{self, Grammar};
use crate::template::Template;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatorOptions {
    pub grammar: Grammar,
    /// Extra locations the backend searches when resolving imports.
    pub resources: Vec<PathBuf>,
    /// Import declarations prepended to every generated program.
    pub imports: Vec<String>,
    /// Log each generated program at debug level.
    pub debug_program: bool,
}

impl CreatorOptions {
    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn with_resource(mut self, location: impl Into<PathBuf>) -> Self {
        self.resources.push(location.into());
        self
    }

    pub fn with_import(mut self, declaration: impl Into<String>) -> Self {
        self.imports.push(declaration.into());
        self
    }

    pub fn with_debug_program(mut self, debug_program: bool) -> Self {
        self.debug_program = debug_program;
        self
    }
}

struct ProgramGenerator<'a> {
    input: &'a str,
    dialect: &'a dyn Dialect,
    program: String,
}

impl Visitor for ProgramGenerator<'_> {
    fn visit_tree(&mut self, node: &TreeNode) {
        match node.kind() {
            TreeNodeType::Template => walk_children(self, node),
            // Hoisted to the top of the program.
            TreeNodeType::ImportBlock => {}
            TreeNodeType::BlockScriptlet => {
                if let Some(body) = node.first_leaf(TokenType::ScriptletBody) {
                    self.dialect.statements(&mut self.program, body.text(self.input));
                }
            }
            TreeNodeType::ExpressionScriptlet => {
                if let Some(body) = node.first_leaf(TokenType::ScriptletBody) {
                    self.dialect.expression(&mut self.program, body.text(self.input));
                }
            }
            TreeNodeType::DollarScriptlet => {
                if let Some(body) = node.first_leaf(TokenType::DollarScriptletBody) {
                    self.dialect.expression(&mut self.program, body.text(self.input));
                }
            }
            TreeNodeType::DollarReference => {
                if let Some(body) = node.first_leaf(TokenType::DollarReferenceBody) {
                    self.dialect.reference(&mut self.program, body.text(self.input));
                }
            }
        }
    }

    fn visit_leaf(&mut self, leaf: &LeafNode) {
        if leaf.kind() == TokenType::Text {
            self.dialect.literal(&mut self.program, leaf.text(self.input));
        }
    }
}

/// Writes the guest program for `root`, which was parsed from `input`.
///
/// Import blocks are only honoured when `options.grammar` permits them.
pub fn generate(root: &TreeNode, input: &str, dialect: &dyn Dialect, options: &CreatorOptions) -> String {
    let mut generator = ProgramGenerator {
        input,
        dialect,
        program: String::new(),
    };

    dialect.begin(&mut generator.program);
    for declaration in &options.imports {
        dialect.import(&mut generator.program, declaration);
    }
    if options.grammar.import_block_legal {
        for block in root.import_blocks() {
            if let Some(body) = block.first_leaf(TokenType::ImportBlockBody) {
                dialect.import(&mut generator.program, body.text(input));
            }
        }
    }
    generator.visit_tree(root);
    dialect.end(&mut generator.program);

    generator.program
}

/// Turns template source into [`Template`]s through one backend.
///
/// Whatever the backend caches between compilations is shared by every
/// `create` made through the same creator.
pub struct TemplateCreator<B: ScriptingBackend> {
    backend: Arc<B>,
    scope: B::Scope,
    options: CreatorOptions,
}

impl<B: ScriptingBackend> TemplateCreator<B> {
    pub fn new(backend: B, scope: B::Scope, options: CreatorOptions) -> Self {
        Self {
            backend: Arc::new(backend),
            scope,
            options,
        }
    }

    pub fn options(&self) -> &CreatorOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Parses `source` and writes its guest program without compiling it.
    pub fn generate(&self, source: &str) -> Diagnosed<String> {
        let (root, diagnostics) = parser::parse(source, self.options.grammar).into_parts();
        let program = generate(&root, source, self.backend.dialect(), &self.options);
        if self.options.debug_program {
            tracing::debug!(program = %program, "generated program");
        }
        Diagnosed::new(program, diagnostics)
    }

    /// Parses and compiles `source`.
    ///
    /// Parse diagnostics ride along with the template; only a backend
    /// compilation failure prevents one from being produced.
    pub fn create(&self, source: &str) -> Result<Diagnosed<Template<B>>, CompileError> {
        let (program, diagnostics) = self.generate(source).into_parts();
        let unit = self
            .backend
            .compile(&program, &self.options.resources, &self.scope)
            .inspect_err(|err| tracing::debug!(error = %err, "template failed to compile"))?;
        Ok(Diagnosed::new(
            Template::new(Arc::clone(&self.backend), unit, program),
            diagnostics,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes one tagged line per construct.
    struct Tagged;

    impl Dialect for Tagged {
        fn begin(&self, program: &mut String) {
            program.push_str("begin\n");
        }
        fn import(&self, program: &mut String, declaration: &str) {
            program.push_str(&format!("import[{}]\n", declaration.trim()));
        }
        fn literal(&self, program: &mut String, text: &str) {
            program.push_str(&format!("text[{}]\n", text));
        }
        fn statements(&self, program: &mut String, body: &str) {
            program.push_str(&format!("stmt[{}]\n", body.trim()));
        }
        fn expression(&self, program: &mut String, body: &str) {
            program.push_str(&format!("expr[{}]\n", body.trim()));
        }
        fn reference(&self, program: &mut String, path: &str) {
            program.push_str(&format!("ref[{}]\n", path));
        }
        fn end(&self, program: &mut String) {
            program.push_str("end\n");
        }
    }

    fn lower(input: &str, options: &CreatorOptions) -> String {
        let root = parser::parse(input, options.grammar).into_inner();
        generate(&root, input, &Tagged, options)
    }

    #[test]
    fn constructs_lower_in_source_order() {
        let input = "Hi $user.name! <% x = 1 %><%= x %>${ x + 1 }<%==%>";
        assert_eq!(
            lower(input, &CreatorOptions::default()),
            "begin\ntext[Hi ]\nref[user.name]\ntext[! ]\nstmt[x = 1]\nexpr[x]\nexpr[x + 1]\nexpr[=]\nend\n"
        );
    }

    #[test]
    fn empty_bodies_emit_nothing() {
        assert_eq!(lower("<%%><%=%>${}", &CreatorOptions::default()), "begin\nend\n");
    }

    #[test]
    fn imports_are_hoisted_when_legal() {
        let input = "a<%@ import x.y %>b";
        let extended = CreatorOptions::default()
            .with_grammar(Grammar::EXTENDED)
            .with_import("import base");
        assert_eq!(
            lower(input, &extended),
            "begin\nimport[import base]\nimport[import x.y]\ntext[a]\ntext[b]\nend\n"
        );
        assert_eq!(
            lower(input, &CreatorOptions::default()),
            "begin\ntext[a]\ntext[b]\nend\n"
        );
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: CreatorOptions =
            serde_json::from_str(r#"{"grammar": {"import_block_legal": true}, "resources": ["/tmp/a"]}"#)
                .expect("options");
        assert_eq!(options.grammar, Grammar::EXTENDED);
        assert_eq!(options.resources, vec![PathBuf::from("/tmp/a")]);
        assert!(options.imports.is_empty());
        assert!(!options.debug_program);
    }
}
