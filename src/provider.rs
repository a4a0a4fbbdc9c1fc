//! Pull-based token sources for the parser.

use crate::lexer::{Token, Tokenizer};

/// One-token window over a token stream.
///
/// `current` is `None` once the stream is exhausted.
pub trait TokenProvider {
    fn current(&self) -> Option<Token>;
    fn advance(&mut self);
}

impl<P: TokenProvider + ?Sized> TokenProvider for &mut P {
    fn current(&self) -> Option<Token> {
        (**self).current()
    }

    fn advance(&mut self) {
        (**self).advance()
    }
}

/// Feeds the parser straight from a [`Tokenizer`].
pub struct TokenizerProvider<'a> {
    tokenizer: Tokenizer<'a>,
}

impl<'a> TokenizerProvider<'a> {
    /// Tokenizes all of `input` from the text state.
    pub fn new(input: &'a str) -> Self {
        Self {
            tokenizer: Tokenizer::new(input),
        }
    }

    /// Wraps a tokenizer that has already been started.
    pub fn from_tokenizer(tokenizer: Tokenizer<'a>) -> Self {
        Self { tokenizer }
    }
}

impl TokenProvider for TokenizerProvider<'_> {
    fn current(&self) -> Option<Token> {
        self.tokenizer.current()
    }

    fn advance(&mut self) {
        self.tokenizer.advance();
    }
}

/// Replays a prepared list of tokens.
#[derive(Debug, Clone, Default)]
pub struct VecProvider {
    tokens: Vec<Token>,
    position: usize,
}

impl VecProvider {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }
}

impl TokenProvider for VecProvider {
    fn current(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{tokenize, TokenType};

    fn drain(mut provider: impl TokenProvider) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = provider.current() {
            tokens.push(token);
            provider.advance();
        }
        tokens
    }

    #[test]
    fn tokenizer_provider_matches_tokenize() {
        let input = "Hello, $name! <%= 1 %>";
        assert_eq!(drain(TokenizerProvider::new(input)), tokenize(input));
    }

    #[test]
    fn vec_provider_replays_in_order() {
        let tokens = vec![
            Token::new(TokenType::Text, 0, 3),
            Token::new(TokenType::DollarReferenceDollar, 3, 4),
        ];
        let mut provider = VecProvider::new(tokens.clone());
        assert_eq!(provider.current(), Some(tokens[0]));
        provider.advance();
        assert_eq!(provider.current(), Some(tokens[1]));
        provider.advance();
        provider.advance();
        assert_eq!(provider.current(), None);
    }

    #[test]
    fn empty_input_is_exhausted_immediately() {
        assert!(TokenizerProvider::new("").current().is_none());
        assert!(VecProvider::default().current().is_none());
    }
}
