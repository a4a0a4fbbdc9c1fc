//! Template grammar, driven into any [`Accumulator`].
//!
//! Parsing is total: every token is consumed, every opened node is closed,
//! and anomalies become diagnostics on the node they concern.

use serde::{Deserialize, Serialize};

use crate::ast::{AstNode, LeafNode, TreeNode, TreeNodeType};
use crate::diagnostic::{Diagnosed, Diagnostic};
use crate::lexer::{Token, TokenType};
use crate::provider::{TokenProvider, TokenizerProvider};

/// Event sink realizing whatever representation the caller wants.
///
/// `diagnostic` attaches to the node most recently started and not yet ended.
pub trait Accumulator {
    fn start_node(&mut self, kind: TreeNodeType);
    fn leaf(&mut self, kind: TokenType, start: usize, end: usize);
    fn diagnostic(&mut self, diagnostic: Diagnostic);
    fn end_node(&mut self);
}

/// The single capability that distinguishes grammar variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Grammar {
    pub import_block_legal: bool,
}

impl Grammar {
    pub const STANDARD: Grammar = Grammar {
        import_block_legal: false,
    };
    pub const EXTENDED: Grammar = Grammar {
        import_block_legal: true,
    };
}

pub const IMPORT_BLOCK_ILLEGAL: &str = "import block is illegal";
/// Reported on a construct whose close never arrives; the span covers what was read.
pub const UNEXPECTED_END: &str = "unexpected end of input";

const TOP_LEVEL: &[TokenType] = &[
    TokenType::Text,
    TokenType::ImportBlockOpen,
    TokenType::BlockScriptletOpen,
    TokenType::ExpressionScriptletOpen,
    TokenType::DollarReferenceDollar,
    TokenType::DollarScriptletOpen,
];

fn expected_message(prefix: &str, expected: &[TokenType]) -> String {
    match expected {
        [] => prefix.to_string(),
        [only] => format!("{}; expected {}", prefix, only),
        many => {
            let names: Vec<_> = many.iter().map(TokenType::as_str).collect();
            format!("{}; expected any of {}", prefix, names.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Parser {
    grammar: Grammar,
}

impl Parser {
    pub fn new(grammar: Grammar) -> Self {
        Self { grammar }
    }

    pub fn standard() -> Self {
        Self::new(Grammar::STANDARD)
    }

    pub fn extended() -> Self {
        Self::new(Grammar::EXTENDED)
    }

    /// Drains `tokens` completely, reporting the tree to `acc`.
    pub fn parse<P, A>(&self, mut tokens: P, acc: &mut A)
    where
        P: TokenProvider,
        A: Accumulator + ?Sized,
    {
        acc.start_node(TreeNodeType::Template);
        while let Some(token) = tokens.current() {
            match token.kind {
                TokenType::Text => {
                    acc.leaf(token.kind, token.start, token.end);
                    tokens.advance();
                }
                TokenType::ImportBlockOpen => self.delimited(
                    &mut tokens,
                    acc,
                    TreeNodeType::ImportBlock,
                    TokenType::ImportBlockBody,
                    TokenType::ImportBlockClose,
                ),
                TokenType::BlockScriptletOpen => self.delimited(
                    &mut tokens,
                    acc,
                    TreeNodeType::BlockScriptlet,
                    TokenType::ScriptletBody,
                    TokenType::ScriptletClose,
                ),
                TokenType::ExpressionScriptletOpen => self.delimited(
                    &mut tokens,
                    acc,
                    TreeNodeType::ExpressionScriptlet,
                    TokenType::ScriptletBody,
                    TokenType::ScriptletClose,
                ),
                TokenType::DollarScriptletOpen => self.delimited(
                    &mut tokens,
                    acc,
                    TreeNodeType::DollarScriptlet,
                    TokenType::DollarScriptletBody,
                    TokenType::DollarScriptletClose,
                ),
                TokenType::DollarReferenceDollar => self.dollar_reference(&mut tokens, acc),
                other => {
                    let message = expected_message(&format!("unexpected token {}", other), TOP_LEVEL);
                    acc.diagnostic(Diagnostic::new(message).with_span(token.start..token.end));
                    tokens.advance();
                }
            }
        }
        acc.end_node();
    }

    // open, optional body, close or a diagnostic
    fn delimited<P, A>(
        &self,
        tokens: &mut P,
        acc: &mut A,
        kind: TreeNodeType,
        body: TokenType,
        close: TokenType,
    ) where
        P: TokenProvider,
        A: Accumulator + ?Sized,
    {
        let Some(open) = tokens.current() else {
            return;
        };

        acc.start_node(kind);
        if kind == TreeNodeType::ImportBlock && !self.grammar.import_block_legal {
            acc.diagnostic(Diagnostic::new(IMPORT_BLOCK_ILLEGAL).with_span(open.start..open.end));
        }

        acc.leaf(open.kind, open.start, open.end);
        tokens.advance();
        let mut extent = open.end;

        if let Some(token) = tokens.current().filter(|t| t.kind == body) {
            acc.leaf(token.kind, token.start, token.end);
            tokens.advance();
            extent = token.end;
        }

        match tokens.current() {
            Some(token) if token.kind == close => {
                acc.leaf(token.kind, token.start, token.end);
                tokens.advance();
            }
            // Left in place for the top level to deal with.
            Some(token) => {
                let message = expected_message(&format!("unexpected token {}", token.kind), &[close]);
                acc.diagnostic(Diagnostic::new(message).with_span(token.start..token.end));
            }
            None => {
                acc.diagnostic(Diagnostic::new(UNEXPECTED_END).with_span(open.start..extent));
            }
        }

        acc.end_node();
    }

    fn dollar_reference<P, A>(&self, tokens: &mut P, acc: &mut A)
    where
        P: TokenProvider,
        A: Accumulator + ?Sized,
    {
        let Some(dollar) = tokens.current() else {
            return;
        };

        acc.start_node(TreeNodeType::DollarReference);
        acc.leaf(dollar.kind, dollar.start, dollar.end);
        tokens.advance();
        if let Some(token) = tokens
            .current()
            .filter(|t| t.kind == TokenType::DollarReferenceBody)
        {
            acc.leaf(token.kind, token.start, token.end);
            tokens.advance();
        }
        acc.end_node();
    }
}

/// Builds the in-memory tree.
#[derive(Debug, Default)]
pub struct TreeAccumulator {
    open: Vec<(TreeNodeType, Vec<AstNode>, Vec<Diagnostic>)>,
    result: Option<TreeNode>,
}

impl TreeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished root. Nodes still open are closed first, and an
    /// accumulator that saw no events yields an empty template.
    pub fn finish(mut self) -> TreeNode {
        while !self.open.is_empty() {
            self.end_node();
        }
        self.result
            .take()
            .unwrap_or_else(|| TreeNode::new(TreeNodeType::Template, Vec::new(), Vec::new()))
    }
}

impl Accumulator for TreeAccumulator {
    fn start_node(&mut self, kind: TreeNodeType) {
        self.open.push((kind, Vec::new(), Vec::new()));
    }

    fn leaf(&mut self, kind: TokenType, start: usize, end: usize) {
        match self.open.last_mut() {
            Some((_, children, _)) => {
                children.push(AstNode::Leaf(LeafNode::new(Token::new(kind, start, end), Vec::new())))
            }
            None => tracing::warn!(%kind, start, end, "leaf with no open node dropped"),
        }
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        match self.open.last_mut() {
            Some((_, _, diagnostics)) => diagnostics.push(diagnostic),
            None => tracing::warn!(%diagnostic, "diagnostic with no open node dropped"),
        }
    }

    fn end_node(&mut self) {
        let Some((kind, children, diagnostics)) = self.open.pop() else {
            tracing::warn!("end_node with no open node");
            return;
        };
        let node = TreeNode::new(kind, children, diagnostics);
        match self.open.last_mut() {
            Some((_, siblings, _)) => siblings.push(AstNode::Tree(node)),
            None => self.result = Some(node),
        }
    }
}

/// Keeps only the diagnostics, tagged with the kind of node they were raised on.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    open: Vec<TreeNodeType>,
    nodes: usize,
    diagnostics: Vec<(TreeNodeType, Diagnostic)>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[(TreeNodeType, Diagnostic)] {
        &self.diagnostics
    }

    /// Number of tree nodes seen.
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_iter().map(|(_, d)| d).collect()
    }
}

impl Accumulator for DiagnosticCollector {
    fn start_node(&mut self, kind: TreeNodeType) {
        self.open.push(kind);
        self.nodes += 1;
    }

    fn leaf(&mut self, _kind: TokenType, _start: usize, _end: usize) {}

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        let kind = self.open.last().copied().unwrap_or(TreeNodeType::Template);
        self.diagnostics.push((kind, diagnostic));
    }

    fn end_node(&mut self) {
        self.open.pop();
    }
}

/// Tokenizes and parses `input` into a tree plus all of its diagnostics.
pub fn parse(input: &str, grammar: Grammar) -> Diagnosed<TreeNode> {
    let mut acc = TreeAccumulator::new();
    Parser::new(grammar).parse(TokenizerProvider::new(input), &mut acc);
    let root = acc.finish();
    let diagnostics = root.all_diagnostics();
    if !diagnostics.is_empty() {
        tracing::debug!(count = diagnostics.len(), "template parsed with diagnostics");
    }
    Diagnosed::new(root, diagnostics)
}

/// Checks `input` without building a tree.
pub fn validate(input: &str, grammar: Grammar) -> Vec<Diagnostic> {
    let mut collector = DiagnosticCollector::new();
    Parser::new(grammar).parse(TokenizerProvider::new(input), &mut collector);
    collector.into_diagnostics()
}
