use std::fmt;
use std::fmt::Write as _;

use crate::diagnostic::Diagnostic;
use crate::lexer::{Token, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeNodeType {
    Template, // root
    ImportBlock,
    BlockScriptlet,
    ExpressionScriptlet,
    DollarScriptlet,
    DollarReference,
}

impl fmt::Display for TreeNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TreeNodeType::Template => "TEMPLATE",
            TreeNodeType::ImportBlock => "IMPORT_BLOCK",
            TreeNodeType::BlockScriptlet => "BLOCK_SCRIPTLET",
            TreeNodeType::ExpressionScriptlet => "EXPRESSION_SCRIPTLET",
            TreeNodeType::DollarScriptlet => "DOLLAR_SCRIPTLET",
            TreeNodeType::DollarReference => "DOLLAR_REFERENCE",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Tree(TreeNode),
    Leaf(LeafNode),
}

impl AstNode {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            AstNode::Tree(tree) => tree.diagnostics(),
            AstNode::Leaf(leaf) => leaf.diagnostics(),
        }
    }

    /// This node's diagnostics followed by those of its descendants, in source order.
    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        self.collect_diagnostics(&mut out);
        out
    }

    pub fn has_diagnostics(&self) -> bool {
        match self {
            AstNode::Tree(tree) => tree.has_diagnostics(),
            AstNode::Leaf(leaf) => !leaf.diagnostics.is_empty(),
        }
    }

    fn collect_diagnostics(&self, out: &mut Vec<Diagnostic>) {
        match self {
            AstNode::Tree(tree) => tree.collect_diagnostics(out),
            AstNode::Leaf(leaf) => out.extend(leaf.diagnostics.iter().cloned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    kind: TreeNodeType,
    children: Vec<AstNode>,
    diagnostics: Vec<Diagnostic>,
}

impl TreeNode {
    pub fn new(kind: TreeNodeType, children: Vec<AstNode>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            kind,
            children,
            diagnostics,
        }
    }

    pub fn kind(&self) -> TreeNodeType {
        self.kind
    }

    pub fn children(&self) -> &[AstNode] {
        &self.children
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// First direct child leaf holding a token of `kind`.
    pub fn first_leaf(&self, kind: TokenType) -> Option<&LeafNode> {
        self.children.iter().find_map(|child| match child {
            AstNode::Leaf(leaf) if leaf.kind() == kind => Some(leaf),
            _ => None,
        })
    }

    /// Descendant import blocks, in source order.
    pub fn import_blocks(&self) -> Vec<&TreeNode> {
        let mut blocks = Vec::new();
        for child in &self.children {
            if let AstNode::Tree(tree) = child {
                if tree.kind == TreeNodeType::ImportBlock {
                    blocks.push(tree);
                } else {
                    blocks.extend(tree.import_blocks());
                }
            }
        }
        blocks
    }

    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        self.collect_diagnostics(&mut out);
        out
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty() || self.children.iter().any(AstNode::has_diagnostics)
    }

    fn collect_diagnostics(&self, out: &mut Vec<Diagnostic>) {
        out.extend(self.diagnostics.iter().cloned());
        for child in &self.children {
            child.collect_diagnostics(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    token: Token,
    diagnostics: Vec<Diagnostic>,
}

impl LeafNode {
    pub fn new(token: Token, diagnostics: Vec<Diagnostic>) -> Self {
        Self { token, diagnostics }
    }

    pub fn kind(&self) -> TokenType {
        self.token.kind
    }

    pub fn start(&self) -> usize {
        self.token.start
    }

    pub fn end(&self) -> usize {
        self.token.end
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        self.token.text(input)
    }
}

/// Source-order traversal over a tree.
///
/// The default `visit_tree` descends into the children, so an implementor
/// only overrides the node kinds it cares about.
pub trait Visitor {
    fn visit_tree(&mut self, node: &TreeNode) {
        walk_children(self, node);
    }

    fn visit_leaf(&mut self, _leaf: &LeafNode) {}
}

pub fn walk_children<V: Visitor + ?Sized>(visitor: &mut V, node: &TreeNode) {
    for child in node.children() {
        match child {
            AstNode::Tree(tree) => visitor.visit_tree(tree),
            AstNode::Leaf(leaf) => visitor.visit_leaf(leaf),
        }
    }
}

struct PrettyPrinter<'a> {
    input: &'a str,
    out: String,
    depth: usize,
}

impl PrettyPrinter<'_> {
    fn line(&mut self, head: fmt::Arguments<'_>, diagnostics: &[Diagnostic]) {
        let _ = write!(self.out, "{}{}", "  ".repeat(self.depth), head);
        if !diagnostics.is_empty() {
            let messages: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
            let _ = write!(self.out, " (diagnostics: {})", messages.join(", "));
        }
        self.out.push('\n');
    }
}

impl Visitor for PrettyPrinter<'_> {
    fn visit_tree(&mut self, node: &TreeNode) {
        self.line(format_args!("{}", node.kind()), node.diagnostics());
        self.depth += 1;
        walk_children(self, node);
        self.depth -= 1;
    }

    fn visit_leaf(&mut self, leaf: &LeafNode) {
        let text = leaf.input_text(self.input);
        self.line(
            format_args!("{} [{}, {}) {:?}", leaf.kind(), leaf.start(), leaf.end(), text),
            leaf.diagnostics(),
        );
    }
}

impl LeafNode {
    // Tolerates trees that were built against a different input.
    fn input_text<'a>(&self, input: &'a str) -> &'a str {
        input.get(self.start()..self.end()).unwrap_or("")
    }
}

/// Renders one indented line per node, with kinds, spans and diagnostics.
pub fn pretty(root: &TreeNode, input: &str) -> String {
    let mut printer = PrettyPrinter {
        input,
        out: String::new(),
        depth: 0,
    };
    printer.visit_tree(root);
    printer.out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: TokenType, start: usize, end: usize) -> AstNode {
        AstNode::Leaf(LeafNode::new(Token::new(kind, start, end), Vec::new()))
    }

    fn sample() -> TreeNode {
        let import = TreeNode::new(
            TreeNodeType::ImportBlock,
            vec![
                leaf(TokenType::ImportBlockOpen, 0, 3),
                leaf(TokenType::ImportBlockBody, 3, 4),
            ],
            vec![Diagnostic::new("unexpected end of input")],
        );
        TreeNode::new(
            TreeNodeType::Template,
            vec![leaf(TokenType::Text, 0, 0), AstNode::Tree(import)],
            vec![Diagnostic::new("root")],
        )
    }

    #[test]
    fn all_diagnostics_is_preorder() {
        let root = sample();
        let messages: Vec<_> = root.all_diagnostics().into_iter().map(|d| d.message).collect();
        assert_eq!(messages, vec!["root", "unexpected end of input"]);
        assert!(root.has_diagnostics());
    }

    #[test]
    fn finds_import_blocks_and_leaves() {
        let root = sample();
        let blocks = root.import_blocks();
        assert_eq!(blocks.len(), 1);
        let body = blocks[0].first_leaf(TokenType::ImportBlockBody);
        assert_eq!(body.map(|l| (l.start(), l.end())), Some((3, 4)));
        assert!(blocks[0].first_leaf(TokenType::ImportBlockClose).is_none());
    }

    #[test]
    fn pretty_prints_nested_nodes() {
        let root = TreeNode::new(
            TreeNodeType::Template,
            vec![AstNode::Tree(TreeNode::new(
                TreeNodeType::DollarReference,
                vec![
                    leaf(TokenType::DollarReferenceDollar, 0, 1),
                    leaf(TokenType::DollarReferenceBody, 1, 5),
                ],
                Vec::new(),
            ))],
            Vec::new(),
        );
        let expected = "TEMPLATE\n  DOLLAR_REFERENCE\n    DOLLAR_REFERENCE_DOLLAR [0, 1) \"$\"\n    DOLLAR_REFERENCE_BODY [1, 5) \"test\"\n";
        assert_eq!(pretty(&root, "$test"), expected);
    }
}
