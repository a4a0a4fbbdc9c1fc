//! Finite-state tokenizer for template source.
//!
//! The tokenizer is cursor-style: [`Tokenizer::start`] positions it on the
//! first token, [`Tokenizer::current`] exposes the token just computed and
//! [`Tokenizer::advance`] moves on. Tokens cover the input without gaps, and
//! a construct cut off by the end of input simply has no close token.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Text,
    ImportBlockOpen,  // <%@
    ImportBlockBody,
    ImportBlockClose, // %>
    BlockScriptletOpen, // <%
    ScriptletBody,
    ScriptletClose,          // %>
    ExpressionScriptletOpen, // <%=
    DollarReferenceDollar,   // $
    DollarReferenceBody,
    DollarScriptletOpen, // ${
    DollarScriptletBody,
    DollarScriptletClose, // }
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Text => "TEXT",
            TokenType::ImportBlockOpen => "IMPORT_BLOCK_OPEN",
            TokenType::ImportBlockBody => "IMPORT_BLOCK_BODY",
            TokenType::ImportBlockClose => "IMPORT_BLOCK_CLOSE",
            TokenType::BlockScriptletOpen => "BLOCK_SCRIPTLET_OPEN",
            TokenType::ScriptletBody => "SCRIPTLET_BODY",
            TokenType::ScriptletClose => "SCRIPTLET_CLOSE",
            TokenType::ExpressionScriptletOpen => "EXPRESSION_SCRIPTLET_OPEN",
            TokenType::DollarReferenceDollar => "DOLLAR_REFERENCE_DOLLAR",
            TokenType::DollarReferenceBody => "DOLLAR_REFERENCE_BODY",
            TokenType::DollarScriptletOpen => "DOLLAR_SCRIPTLET_OPEN",
            TokenType::DollarScriptletBody => "DOLLAR_SCRIPTLET_BODY",
            TokenType::DollarScriptletClose => "DOLLAR_SCRIPTLET_CLOSE",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, half-open `[start, end)` span of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenType,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenType, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { kind, start, end }
    }

    /// The slice of `input` this token covers.
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerState {
    #[default]
    Text,
    InImportBlock,
    InBlockScriptlet,
    InExpressionScriptlet,
    InDollarScriptlet,
    InDollarReference,
}

#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    end: usize,
    cursor: usize,
    state: TokenizerState,
    current: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    /// A tokenizer over all of `input`, starting in [`TokenizerState::Text`].
    pub fn new(input: &'a str) -> Self {
        let mut tokenizer = Self {
            input,
            end: input.len(),
            cursor: 0,
            state: TokenizerState::Text,
            current: None,
        };
        tokenizer.start(input, 0, input.len(), TokenizerState::Text);
        tokenizer
    }

    /// Resets the cursor onto `input[from..to]` and computes the first token.
    ///
    /// Both bounds are clamped to the input and must fall on char boundaries.
    pub fn start(&mut self, input: &'a str, from: usize, to: usize, state: TokenizerState) {
        let to = to.min(input.len());
        self.input = input;
        self.end = to;
        self.cursor = from.min(to);
        self.state = state;
        self.current = None;
        self.pull();
    }

    pub fn state(&self) -> TokenizerState {
        self.state
    }

    pub fn current(&self) -> Option<Token> {
        self.current
    }

    pub fn current_type(&self) -> Option<TokenType> {
        self.current.map(|t| t.kind)
    }

    pub fn current_start(&self) -> Option<usize> {
        self.current.map(|t| t.start)
    }

    pub fn current_end(&self) -> Option<usize> {
        self.current.map(|t| t.end)
    }

    /// Moves past the current token. Once exhausted this is a no-op.
    pub fn advance(&mut self) {
        if let Some(token) = self.current {
            self.cursor = token.end;
            self.pull();
        }
    }

    fn pull(&mut self) {
        self.current = self.next_token();
        if let Some(token) = self.current {
            tracing::trace!(kind = %token.kind, start = token.start, end = token.end, "token");
        }
    }

    fn bytes(&self) -> &'a [u8] {
        &self.input.as_bytes()[..self.end]
    }

    fn emit(&self, kind: TokenType, len: usize) -> Option<Token> {
        Some(Token::new(kind, self.cursor, self.cursor + len))
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            if self.cursor >= self.end {
                return None;
            }

            match self.state {
                TokenizerState::Text => return self.text(),
                TokenizerState::InImportBlock => {
                    return self.scriptlet(TokenType::ImportBlockBody, TokenType::ImportBlockClose)
                }
                TokenizerState::InBlockScriptlet | TokenizerState::InExpressionScriptlet => {
                    return self.scriptlet(TokenType::ScriptletBody, TokenType::ScriptletClose)
                }
                TokenizerState::InDollarScriptlet => return self.dollar_scriptlet(),
                TokenizerState::InDollarReference => {
                    let end = scan_reference_path(self.bytes(), self.cursor, self.end);
                    self.state = TokenizerState::Text;
                    if end > self.cursor {
                        return self.emit(TokenType::DollarReferenceBody, end - self.cursor);
                    }
                    // Nothing to reference here; lex as text instead.
                }
            }
        }
    }

    fn text(&mut self) -> Option<Token> {
        let bytes = self.bytes();
        if let Some((kind, len, next)) = opener_at(bytes, self.cursor) {
            self.state = next;
            return self.emit(kind, len);
        }

        let mut i = self.cursor + 1;
        while i < bytes.len() && opener_at(bytes, i).is_none() {
            i += 1;
        }
        self.emit(TokenType::Text, i - self.cursor)
    }

    fn scriptlet(&mut self, body: TokenType, close: TokenType) -> Option<Token> {
        match find_close(self.bytes(), self.cursor) {
            Some(at) if at == self.cursor => {
                self.state = TokenizerState::Text;
                self.emit(close, 2)
            }
            // The close token is computed on the next pull, from its own position.
            Some(at) => self.emit(body, at - self.cursor),
            None => self.emit(body, self.end - self.cursor),
        }
    }

    fn dollar_scriptlet(&mut self) -> Option<Token> {
        let (at, closed) = scan_interpolation(self.bytes(), self.cursor, self.end);
        if closed && at == self.cursor {
            self.state = TokenizerState::Text;
            return self.emit(TokenType::DollarScriptletClose, 1);
        }
        self.emit(TokenType::DollarScriptletBody, at - self.cursor)
    }
}

/// Drains a fresh tokenizer over the whole of `input`.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.current() {
        tokens.push(token);
        tokenizer.advance();
    }
    tokens
}

/// Longest-match opener at `i`: `<%@` > `<%=` > `<%`, then `${` and `$name`.
fn opener_at(bytes: &[u8], i: usize) -> Option<(TokenType, usize, TokenizerState)> {
    match bytes.get(i)? {
        b'<' if bytes.get(i + 1) == Some(&b'%') => Some(match bytes.get(i + 2) {
            Some(b'@') => (TokenType::ImportBlockOpen, 3, TokenizerState::InImportBlock),
            Some(b'=') => (
                TokenType::ExpressionScriptletOpen,
                3,
                TokenizerState::InExpressionScriptlet,
            ),
            _ => (TokenType::BlockScriptletOpen, 2, TokenizerState::InBlockScriptlet),
        }),
        b'$' => match bytes.get(i + 1) {
            Some(b'{') => Some((TokenType::DollarScriptletOpen, 2, TokenizerState::InDollarScriptlet)),
            Some(&c) if is_ident_start(c) => Some((
                TokenType::DollarReferenceDollar,
                1,
                TokenizerState::InDollarReference,
            )),
            _ => None,
        },
        _ => None,
    }
}

fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..]
        .windows(2)
        .position(|w| w == b"%>")
        .map(|offset| from + offset)
}

pub(crate) fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

pub(crate) fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// End of the dotted identifier path starting at `from`, or `from` if none.
///
/// A `.` only extends the path when an identifier segment follows it.
pub(crate) fn scan_reference_path(bytes: &[u8], from: usize, to: usize) -> usize {
    let bytes = &bytes[..to];
    let segment = |start: usize| -> Option<usize> {
        if !bytes.get(start).copied().is_some_and(is_ident_start) {
            return None;
        }
        let mut i = start + 1;
        while bytes.get(i).copied().is_some_and(is_ident_continue) {
            i += 1;
        }
        Some(i)
    };

    let Some(mut end) = segment(from) else {
        return from;
    };
    while bytes.get(end) == Some(&b'.') {
        match segment(end + 1) {
            Some(next) => end = next,
            None => break,
        }
    }
    end
}

enum Frame {
    Code { depth: usize },
    Literal { quote: u8 },
}

/// Finds the brace that closes an interpolation whose body starts at `from`.
///
/// Returns the position of that brace and `true`, or `(to, false)` when the
/// input ends first. Quoted literals are skipped, except that a `${` inside a
/// double-quoted literal opens a nested interpolation which is tracked in turn.
pub(crate) fn scan_interpolation(bytes: &[u8], from: usize, to: usize) -> (usize, bool) {
    let mut stack = vec![Frame::Code { depth: 1 }];
    let mut i = from;

    while i < to {
        let c = bytes[i];
        if c == b'\\' {
            i += 2;
            continue;
        }

        match stack.last_mut() {
            Some(Frame::Code { depth }) => match c {
                b'{' => *depth += 1,
                b'}' => {
                    *depth -= 1;
                    if *depth == 0 {
                        stack.pop();
                        if stack.is_empty() {
                            return (i, true);
                        }
                    }
                }
                b'"' | b'\'' => stack.push(Frame::Literal { quote: c }),
                _ => {}
            },
            Some(Frame::Literal { quote }) => {
                if c == *quote {
                    stack.pop();
                } else if *quote == b'"' && c == b'$' && bytes.get(i + 1) == Some(&b'{') && i + 1 < to {
                    stack.push(Frame::Code { depth: 1 });
                    i += 1;
                }
            }
            None => break,
        }
        i += 1;
    }

    (to, false)
}
