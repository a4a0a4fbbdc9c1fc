use crate::error::CompileError;
use crate::lexer::{is_ident_continue, is_ident_start, scan_interpolation, scan_reference_path};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Newline, // statement separator, also `;`

    // Keywords
    Import,
    As,
    Def,
    If,
    Else,
    For,
    In,
    True,
    False,
    Null,

    // Symbols
    Shl,      // <<
    Assign,   // =
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    LtEq,     // <=
    Gt,       // >
    GtEq,     // >=
    AndAnd,   // &&
    OrOr,     // ||
    Bang,     // !
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Dot,      // .
    Comma,    // ,
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }

    // Data
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Interpolated(Vec<Segment>),
}

/// Raw piece of a double-quoted string, before its code is parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Code { source: String, line: usize }, // ${ ... }
    Path(String),                         // $a.b
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    // Open `(` and `[`; newlines inside them do not end a statement.
    nesting: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, line: usize) -> Self {
        Self {
            input,
            cursor: 0,
            line,
            nesting: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, CompileError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Option<Spanned>, CompileError> {
        loop {
            let rest = self.remaining();
            let Some(first) = rest.chars().next() else {
                return Ok(None);
            };

            if first == '\n' || first == ';' {
                let line = self.line;
                self.advance(1);
                if first == '\n' {
                    self.line += 1;
                    if self.nesting > 0 {
                        continue;
                    }
                }
                return Ok(Some(Spanned {
                    token: Token::Newline,
                    line,
                }));
            }
            if first.is_whitespace() {
                self.advance(first.len_utf8());
                continue;
            }
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.advance(len);
                continue;
            }

            let line = self.line;
            let token = self.symbol_or_literal(first)?;
            return Ok(Some(Spanned { token, line }));
        }
    }

    fn symbol_or_literal(&mut self, first: char) -> Result<Token, CompileError> {
        let rest = self.remaining();
        const PAIRS: [(&str, Token); 7] = [
            ("<<", Token::Shl),
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
            ("&&", Token::AndAnd),
            ("||", Token::OrOr),
        ];
        for (symbol, token) in PAIRS {
            if rest.starts_with(symbol) {
                self.advance(2);
                return Ok(token);
            }
        }

        let single = match first {
            '=' => Some(Token::Assign),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Bang),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '(' | '[' => {
                self.nesting += 1;
                Some(if first == '(' { Token::LParen } else { Token::LBracket })
            }
            ')' | ']' => {
                self.nesting = self.nesting.saturating_sub(1);
                Some(if first == ')' { Token::RParen } else { Token::RBracket })
            }
            _ => None,
        };
        if let Some(token) = single {
            self.advance(1);
            return Ok(token);
        }

        match first {
            '\'' => self.single_quoted(),
            '"' => self.double_quoted(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii() && is_ident_start(c as u8) => Ok(self.word()),
            c => Err(self.error(format!("unexpected character `{}`", c))),
        }
    }

    fn number(&mut self) -> Result<Token, CompileError> {
        let bytes = self.remaining().as_bytes();
        let mut len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        let is_float = bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit);
        if is_float {
            len += 1 + bytes[len + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        }
        let text = &self.remaining()[..len];
        self.advance(len);
        if is_float {
            text.parse()
                .map(Token::FloatLit)
                .map_err(|_| self.error(format!("invalid number `{}`", text)))
        } else {
            text.parse()
                .map(Token::IntLit)
                .map_err(|_| self.error(format!("integer `{}` is too large", text)))
        }
    }

    fn word(&mut self) -> Token {
        let len = self
            .remaining()
            .bytes()
            .take_while(|&b| is_ident_continue(b))
            .count();
        let ident = &self.remaining()[..len];
        self.advance(len);

        match ident {
            "import" => Token::Import,
            "as" => Token::As,
            "def" => Token::Def,
            "if" => Token::If,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(ident.to_string()),
        }
    }

    // Consumes one escaped char after a backslash at the cursor.
    fn escape(&mut self, s: &mut String) -> Result<(), CompileError> {
        self.advance(1);
        let Some(esc) = self.remaining().chars().next() else {
            return Err(self.error("unterminated string"));
        };
        self.advance(esc.len_utf8());
        match esc {
            'n' => s.push('\n'),
            'r' => s.push('\r'),
            't' => s.push('\t'),
            '\n' => self.line += 1,
            _ => s.push(esc),
        }
        Ok(())
    }

    fn single_quoted(&mut self) -> Result<Token, CompileError> {
        self.advance(1);
        let mut s = String::new();
        while let Some(c) = self.remaining().chars().next() {
            match c {
                '\'' => {
                    self.advance(1);
                    return Ok(Token::StringLit(s));
                }
                '\\' => self.escape(&mut s)?,
                _ => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    s.push(c);
                    self.advance(c.len_utf8());
                }
            }
        }
        Err(self.error("unterminated string"))
    }

    fn double_quoted(&mut self) -> Result<Token, CompileError> {
        self.advance(1);
        let mut segments = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.remaining().chars().next() {
            match c {
                '"' => {
                    self.advance(1);
                    if !text.is_empty() {
                        segments.push(Segment::Text(text));
                    }
                    return Ok(Token::Interpolated(segments));
                }
                '\\' => self.escape(&mut text)?,
                '$' => {
                    let bytes = self.input.as_bytes();
                    let at = self.cursor + 1;
                    if bytes.get(at) == Some(&b'{') {
                        let (close, closed) = scan_interpolation(bytes, at + 1, bytes.len());
                        if !closed {
                            return Err(self.error("unterminated `${` in string"));
                        }
                        let source = self.input[at + 1..close].to_string();
                        let line = self.line;
                        self.line += source.matches('\n').count();
                        self.cursor = close + 1;
                        if !text.is_empty() {
                            segments.push(Segment::Text(std::mem::take(&mut text)));
                        }
                        segments.push(Segment::Code { source, line });
                    } else {
                        let end = scan_reference_path(bytes, at, bytes.len());
                        if end == at {
                            text.push('$');
                            self.advance(1);
                        } else {
                            if !text.is_empty() {
                                segments.push(Segment::Text(std::mem::take(&mut text)));
                            }
                            segments.push(Segment::Path(self.input[at..end].to_string()));
                            self.cursor = end;
                        }
                    }
                }
                _ => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                    self.advance(c.len_utf8());
                }
            }
        }
        Err(self.error("unterminated string"))
    }
}

/// Tokenizes `input`, numbering lines from `line`.
pub fn tokenize(input: &str, line: usize) -> Result<Vec<Spanned>, CompileError> {
    Tokenizer::new(input, line).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input, 1)
            .expect("tokenize")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn out_statement() {
        assert_eq!(
            tokens("out << 'Hi\\n' << x"),
            vec![
                Token::Ident("out".into()),
                Token::Shl,
                Token::StringLit("Hi\n".into()),
                Token::Shl,
                Token::Ident("x".into()),
            ]
        );
    }

    #[test]
    fn operators_and_numbers() {
        assert_eq!(
            tokens("a <= 1.5 && !b || c != 20 % 3"),
            vec![
                Token::Ident("a".into()),
                Token::LtEq,
                Token::FloatLit(1.5),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("b".into()),
                Token::OrOr,
                Token::Ident("c".into()),
                Token::NotEq,
                Token::IntLit(20),
                Token::Percent,
                Token::IntLit(3),
            ]
        );
    }

    #[test]
    fn member_access_on_integer_is_not_a_float() {
        assert_eq!(
            tokens("1.size"),
            vec![Token::IntLit(1), Token::Dot, Token::Ident("size".into())]
        );
    }

    #[test]
    fn newlines_separate_statements_outside_brackets() {
        let spanned = tokenize("a\n(b\n)\nc; d", 1).expect("tokenize");
        let summary: Vec<_> = spanned.iter().map(|s| (s.token.clone(), s.line)).collect();
        assert_eq!(
            summary,
            vec![
                (Token::Ident("a".into()), 1),
                (Token::Newline, 1),
                (Token::LParen, 2),
                (Token::Ident("b".into()), 2),
                (Token::RParen, 3),
                (Token::Newline, 3),
                (Token::Ident("c".into()), 4),
                (Token::Newline, 4),
                (Token::Ident("d".into()), 4),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(tokens("x // note\n"), vec![Token::Ident("x".into()), Token::Newline]);
    }

    #[test]
    fn double_quoted_segments() {
        assert_eq!(
            tokens(r#""Hi $user.name, ${ "x}" } costs $5""#),
            vec![Token::Interpolated(vec![
                Segment::Text("Hi ".into()),
                Segment::Path("user.name".into()),
                Segment::Text(", ".into()),
                Segment::Code {
                    source: r#" "x}" "#.into(),
                    line: 1
                },
                Segment::Text(" costs $5".into()),
            ])]
        );
    }

    #[test]
    fn single_quotes_do_not_interpolate() {
        assert_eq!(tokens("'$a ${b}'"), vec![Token::StringLit("$a ${b}".into())]);
    }

    #[test]
    fn unterminated_string_reports_its_line() {
        let err = tokenize("a\n'oops", 1).unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                line: 2,
                message: "unterminated string".into()
            }
        );
    }

    #[test]
    fn unexpected_character() {
        assert!(matches!(
            tokenize("a # b", 1),
            Err(CompileError::Syntax { line: 1, .. })
        ));
    }
}
