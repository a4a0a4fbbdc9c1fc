use std::collections::VecDeque;

use super::ast::*;
use super::lexer::{tokenize, Segment, Spanned, Token};
use crate::error::CompileError;

/// How deeply expressions and blocks may nest.
const MAX_DEPTH: usize = 128;

pub struct Parser {
    buffer: VecDeque<Spanned>,
    last_line: usize,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str, line: usize) -> Result<Self, CompileError> {
        let tokens = tokenize(input, line)?;
        let last_line = line + input.matches('\n').count();
        Ok(Self {
            buffer: tokens.into(),
            last_line,
            depth: 0,
        })
    }

    // Callers restore `depth` once the nested construct is built.
    fn descend(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn peek(&self, n: usize) -> Option<&Token> {
        self.buffer.get(n).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.buffer.front().map_or(self.last_line, |s| s.line)
    }

    fn consume(&mut self) -> Option<Token> {
        self.buffer.pop_front().map(|s| s.token)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match self.peek(0) {
            Some(t) => self.error(format!("expected {}, got {:?}", expected, t)),
            None => self.error(format!("expected {}, got end of program", expected)),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), CompileError> {
        if self.peek(0) == Some(&token) {
            self.consume();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn ident(&mut self, expected: &str) -> Result<String, CompileError> {
        match self.peek(0) {
            Some(Token::Ident(_)) => match self.consume() {
                Some(Token::Ident(name)) => Ok(name),
                _ => Err(self.unexpected(expected)),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while let Some(Token::Newline) = self.peek(0) {
            self.consume();
        }
    }

    pub fn parse(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let body = self.parse_statements()?;
        match self.peek(0) {
            None => Ok(body),
            Some(_) => Err(self.unexpected("a statement")),
        }
    }

    /// Statements up to a closing brace or the end of the program.
    fn parse_statements(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek(0) {
                None | Some(Token::RBrace) => break,
                _ => {}
            }
            body.push(self.parse_statement()?);
            match self.peek(0) {
                None | Some(Token::RBrace) | Some(Token::Newline) => {}
                _ => return Err(self.unexpected("end of statement")),
            }
        }
        Ok(body)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(Token::LBrace, "`{`")?;
        self.descend()?;
        let body = self.parse_statements()?;
        self.depth -= 1;
        self.expect(Token::RBrace, "`}`")?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek(0) {
            Some(Token::Import) => self.parse_import(),
            Some(Token::Def) => {
                self.consume();
                let name = self.ident("a variable name")?;
                let init = if let Some(Token::Assign) = self.peek(0) {
                    self.consume();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::Def(name, init))
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::For) => self.parse_for(),
            Some(Token::Ident(name)) if name == "out" && self.peek(1) == Some(&Token::Shl) => {
                self.consume();
                let mut exprs = Vec::new();
                while let Some(Token::Shl) = self.peek(0) {
                    self.consume();
                    exprs.push(self.parse_expr()?);
                }
                Ok(Stmt::Out(exprs))
            }
            Some(Token::Ident(_)) if self.peek(1) == Some(&Token::Assign) => {
                let name = self.ident("a variable name")?;
                self.consume(); // =
                Ok(Stmt::Assign(name, self.parse_expr()?))
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn parse_import(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        self.expect(Token::Import, "`import`")?;
        let mut path = vec![self.ident("a module name")?];
        while let Some(Token::Dot) = self.peek(0) {
            self.consume();
            path.push(self.ident("a module name")?);
        }
        let alias = if let Some(Token::As) = self.peek(0) {
            self.consume();
            self.ident("an alias")?
        } else {
            path.last().cloned().unwrap_or_default()
        };
        Ok(Stmt::Import(Import { path, alias, line }))
    }

    fn parse_condition(&mut self) -> Result<Expr, CompileError> {
        self.expect(Token::LParen, "`(`")?;
        let condition = self.parse_expr()?;
        self.expect(Token::RParen, "`)`")?;
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::If, "`if`")?;
        let condition = self.parse_condition()?;
        let body = self.parse_block()?;
        let mut cases = vec![(condition, body)];
        let mut else_body = None;

        loop {
            // `else` may sit on a later line than the closing brace.
            let mut n = 0;
            while let Some(Token::Newline) = self.peek(n) {
                n += 1;
            }
            if self.peek(n) != Some(&Token::Else) {
                break;
            }
            self.skip_newlines();
            self.consume(); // else

            if let Some(Token::If) = self.peek(0) {
                self.consume();
                let condition = self.parse_condition()?;
                let body = self.parse_block()?;
                cases.push((condition, body));
            } else {
                else_body = Some(self.parse_block()?);
                break;
            }
        }

        Ok(Stmt::If { cases, else_body })
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::For, "`for`")?;
        self.expect(Token::LParen, "`(`")?;
        let target = self.ident("a loop variable")?;
        self.expect(Token::In, "`in`")?;
        let iterable = self.parse_expr()?;
        self.expect(Token::RParen, "`)`")?;
        let body = self.parse_block()?;

        Ok(Stmt::For {
            target,
            iterable,
            body,
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let depth = self.depth;
        let mut lhs = self.parse_and()?;
        while let Some(Token::OrOr) = self.peek(0) {
            self.consume();
            self.descend()?;
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let depth = self.depth;
        let mut lhs = self.parse_eq()?;
        while let Some(Token::AndAnd) = self.peek(0) {
            self.consume();
            self.descend()?;
            let rhs = self.parse_eq()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr, CompileError> {
        let depth = self.depth;
        let mut lhs = self.parse_cmp()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let rhs = self.parse_cmp()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, CompileError> {
        let depth = self.depth;
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::LtEq) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::GtEq) => BinOp::Ge,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let rhs = self.parse_add()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, CompileError> {
        let depth = self.depth;
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, CompileError> {
        let depth = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek(0) {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.consume();
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_args(&mut self, close: Token, expected: &str) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        while self.peek(0) != Some(&close) {
            args.push(self.parse_expr()?);
            if let Some(Token::Comma) = self.peek(0) {
                self.consume();
            } else {
                break;
            }
        }
        self.expect(close, expected)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let line = self.line();
        let depth = self.depth;
        if matches!(self.peek(0), Some(Token::LParen | Token::LBracket | Token::Interpolated(_))) {
            self.descend()?;
        }
        let mut expr = match self.consume() {
            Some(Token::StringLit(s)) => Expr::StringLit(s),
            Some(Token::Interpolated(segments)) => self.interpolated(segments)?,
            Some(Token::IntLit(i)) => Expr::IntLit(i),
            Some(Token::FloatLit(x)) => Expr::FloatLit(x),
            Some(Token::True) => Expr::BoolLit(true),
            Some(Token::False) => Expr::BoolLit(false),
            Some(Token::Null) => Expr::Null,
            Some(Token::Ident(s)) => {
                if let Some(Token::LParen) = self.peek(0) {
                    self.consume();
                    self.descend()?;
                    Expr::Call(s, self.parse_args(Token::RParen, "`)`")?)
                } else {
                    Expr::Var(s)
                }
            }
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen, "`)`")?;
                e
            }
            Some(Token::LBracket) => Expr::List(self.parse_args(Token::RBracket, "`]`")?),
            Some(t) => {
                return Err(CompileError::Syntax {
                    line,
                    message: format!("expected expression, got {:?}", t),
                })
            }
            None => return Err(self.error("expected expression, got end of program")),
        };

        // Handle suffixes: .attr, .method(args), [index]
        loop {
            match self.peek(0) {
                Some(Token::Dot) => {
                    self.consume(); // .
                    self.descend()?;
                    let name = self.ident("a property name")?;
                    if let Some(Token::LParen) = self.peek(0) {
                        self.consume();
                        let args = self.parse_args(Token::RParen, "`)`")?;
                        expr = Expr::Method(Box::new(expr), name, args);
                    } else {
                        expr = Expr::Attribute(Box::new(expr), name);
                    }
                }
                Some(Token::LBracket) => {
                    self.consume(); // [
                    self.descend()?;
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket, "`]`")?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                _ => break,
            }
        }

        self.depth = depth;
        Ok(expr)
    }

    fn interpolated(&mut self, segments: Vec<Segment>) -> Result<Expr, CompileError> {
        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments {
            parts.push(match segment {
                Segment::Text(text) => StrPart::Lit(text),
                Segment::Path(path) => {
                    let depth = self.depth;
                    for _ in path.split('.').skip(1) {
                        self.descend()?;
                    }
                    self.depth = depth;
                    StrPart::Expr(reference(&path))
                }
                Segment::Code { source, line } => {
                    let mut parser = Parser::new(&source, line)?;
                    parser.depth = self.depth;
                    StrPart::Expr(parser.expression()?)
                }
            });
        }
        // An empty "" still needs a value.
        if parts.is_empty() {
            return Ok(Expr::StringLit(String::new()));
        }
        Ok(Expr::Interpolated(parts))
    }

    // A lone expression, surrounded by nothing but newlines.
    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.skip_newlines();
        let expr = self.parse_expr()?;
        self.skip_newlines();
        match self.peek(0) {
            None => Ok(expr),
            Some(_) => Err(self.unexpected("end of expression")),
        }
    }
}

/// `a.b.c` as a variable followed by property lookups.
pub fn reference(path: &str) -> Expr {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or_default();
    segments.fold(Expr::Var(head.to_string()), |expr, name| {
        Expr::Attribute(Box::new(expr), name.to_string())
    })
}

/// Parses a whole program.
pub fn parse_program(input: &str) -> Result<Vec<Stmt>, CompileError> {
    Parser::new(input, 1)?.parse()
}

/// Parses a single expression, e.g. the body of a `${ }` inside a string.
pub fn parse_expression(input: &str, line: usize) -> Result<Expr, CompileError> {
    Parser::new(input, line)?.expression()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn precedence() {
        let expr = parse_expression("a + b * 2 == c || !d", 1).expect("parse");
        let sum = Expr::BinOp(
            Box::new(var("a")),
            BinOp::Add,
            Box::new(Expr::BinOp(Box::new(var("b")), BinOp::Mul, Box::new(Expr::IntLit(2)))),
        );
        let eq = Expr::BinOp(Box::new(sum), BinOp::Eq, Box::new(var("c")));
        let not = Expr::Unary(UnaryOp::Not, Box::new(var("d")));
        assert_eq!(expr, Expr::BinOp(Box::new(eq), BinOp::Or, Box::new(not)));
    }

    #[test]
    fn postfix_chain() {
        let expr = parse_expression("user.tags[0].toUpperCase()", 1).expect("parse");
        let tags = Expr::Attribute(Box::new(var("user")), "tags".into());
        let first = Expr::Index(Box::new(tags), Box::new(Expr::IntLit(0)));
        assert_eq!(expr, Expr::Method(Box::new(first), "toUpperCase".into(), vec![]));
    }

    #[test]
    fn out_statement_with_parenthesized_multiline_expression() {
        let body = parse_program("out << 'a' << (\n x \n)\n").expect("parse");
        assert_eq!(
            body,
            vec![Stmt::Out(vec![Expr::StringLit("a".into()), var("x")])]
        );
    }

    #[test]
    fn statements() {
        let body = parse_program(
            "import a.b.c\nimport d as e; def x = 1\nx = x + 1\nfor (i in [1, 2]) { out << i }\nif (x) {\n} else if (y) { }\nelse { f(x) }",
        )
        .expect("parse");

        assert_eq!(body.len(), 6);
        assert_eq!(
            body[0],
            Stmt::Import(Import {
                path: vec!["a".into(), "b".into(), "c".into()],
                alias: "c".into(),
                line: 1,
            })
        );
        assert!(matches!(&body[1], Stmt::Import(Import { alias, line: 2, .. }) if alias == "e"));
        assert_eq!(body[2], Stmt::Def("x".into(), Some(Expr::IntLit(1))));
        assert!(matches!(&body[3], Stmt::Assign(name, _) if name == "x"));
        assert!(matches!(&body[4], Stmt::For { target, body, .. } if target == "i" && body.len() == 1));
        match &body[5] {
            Stmt::If { cases, else_body } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(
                    else_body.as_deref(),
                    Some(&[Stmt::Expr(Expr::Call("f".into(), vec![var("x")]))][..])
                );
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    fn too_deep(result: Result<impl std::fmt::Debug, CompileError>) {
        match result {
            Err(CompileError::Syntax { message, .. }) => assert_eq!(message, "expression nested too deeply"),
            other => panic!("expected a nesting error, got {:?}", other),
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |open: &str, close: &str, n: usize| format!("{}1{}", open.repeat(n), close.repeat(n));

        assert!(parse_expression(&nested("(", ")", 64), 1).is_ok());
        too_deep(parse_expression(&nested("(", ")", 200_000), 1));
        too_deep(parse_expression(&nested("[", "]", 1_000), 1));
        too_deep(parse_expression(&"-".repeat(1_000), 1));
        too_deep(parse_expression(&vec!["1"; 1_000].join(" + "), 1));
        too_deep(parse_expression(&format!("a{}", ".b".repeat(1_000)), 1));
        too_deep(parse_expression(&nested("\"${ ", " }\"", 200), 1));
        too_deep(parse_program(&nested("if (x) { ", " }", 1_000)));
    }

    #[test]
    fn interpolated_string() {
        let expr = parse_expression(r#""Hi $user.name and ${ n + 1 }!""#, 1).expect("parse");
        assert_eq!(
            expr,
            Expr::Interpolated(vec![
                StrPart::Lit("Hi ".into()),
                StrPart::Expr(Expr::Attribute(Box::new(var("user")), "name".into())),
                StrPart::Lit(" and ".into()),
                StrPart::Expr(Expr::BinOp(Box::new(var("n")), BinOp::Add, Box::new(Expr::IntLit(1)))),
                StrPart::Lit("!".into()),
            ])
        );
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let err = parse_program("out << 1\nout << (2\n\nx = ").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 4, .. }), "{:?}", err);

        let err = parse_program("if (x) {\n out << 1\n").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }), "{:?}", err);

        let err = parse_program("a b").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                line: 1,
                message: "expected end of statement, got Ident(\"b\")".into()
            }
        );
    }

    #[test]
    fn stray_closing_brace_is_rejected() {
        assert!(parse_program("}").is_err());
    }
}
