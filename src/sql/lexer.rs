//! SQL lexer/tokenizer.
//!
//! [`Lexer::tokenize`] converts a SQL string into a token vector ending
//! with an EOF token, failing fast on the first malformed literal. The
//! scanner works over ASCII bytes; multi-byte characters can only appear
//! inside string literals, where they are copied through verbatim.

use super::error::{Span, SyntaxError};
use super::token::{Keyword, Token, TokenKind};

/// SQL lexer.
///
/// Handles keywords (case-insensitive), identifiers, numeric and string
/// literals (single-quoted, with `''` escaping a quote), operators,
/// punctuation, and `--` / `/* */` comments.
pub struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given SQL input.
    pub fn new(text: &'a str) -> Self {
        Lexer {
            src: text.as_bytes(),
            text,
            pos: 0,
        }
    }

    /// Tokenizes the whole input. The result always ends with EOF.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.read_token()?;
            let done = token.is_eof();
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn read_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia()?;
        let start = self.pos;

        let Some(byte) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, Span::at(start)));
        };

        let kind = match byte {
            b'\'' => return self.read_string(),
            b'0'..=b'9' => return self.read_number(),
            b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                return self.read_number()
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return Ok(self.read_word()),
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Asterisk,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'.' => TokenKind::Dot,
            b'=' => TokenKind::Eq,
            b'<' => {
                self.pos += 1;
                let kind = match self.peek() {
                    Some(b'=') => TokenKind::LtEq,
                    Some(b'>') => TokenKind::Neq,
                    _ => return Ok(Token::new(TokenKind::Lt, Span::new(start, self.pos))),
                };
                self.pos += 1;
                return Ok(Token::new(kind, Span::new(start, self.pos)));
            }
            b'>' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    return Ok(Token::new(TokenKind::GtEq, Span::new(start, self.pos)));
                }
                return Ok(Token::new(TokenKind::Gt, Span::new(start, self.pos)));
            }
            b'!' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    return Ok(Token::new(TokenKind::Neq, Span::new(start, self.pos)));
                }
                return Err(SyntaxError::new(
                    "unexpected character '!'",
                    Span::at(start),
                ));
            }
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{}'", other as char),
                    Span::at(start),
                ))
            }
        };

        self.pos += 1;
        Ok(Token::new(kind, Span::new(start, self.pos)))
    }

    /// Skips whitespace, `--` line comments, and `/* */` block comments.
    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => self.pos += 1,
                (Some(b'-'), Some(b'-')) => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(SyntaxError::new(
                                    "unterminated block comment",
                                    Span::new(start, self.pos),
                                ))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SyntaxError::unterminated_string(Span::new(start, self.pos)))
                }
                Some(b'\'') => {
                    // '' escapes a single quote; a lone quote terminates.
                    if self.peek_at(1) == Some(b'\'') {
                        value.push('\'');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(_) => {
                    let ch = self.text[self.pos..].chars().next().expect("in bounds");
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Ok(Token::new(
            TokenKind::String(value),
            Span::new(start, self.pos),
        ))
    }

    fn read_number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.eat_digits();
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }

        let span = Span::new(start, self.pos);
        let text = &self.text[start..self.pos];
        let kind = if is_float {
            TokenKind::Float(
                text.parse()
                    .map_err(|_| SyntaxError::new("invalid number literal", span))?,
            )
        } else {
            TokenKind::Integer(
                text.parse()
                    .map_err(|_| SyntaxError::new("integer literal out of range", span))?,
            )
        };
        Ok(Token::new(kind, span))
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn read_word(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let word = &self.text[start..self.pos];
        let span = Span::new(start, self.pos);
        match Keyword::parse(word) {
            Some(kw) => Token::new(TokenKind::Keyword(kw), span),
            None => Token::new(TokenKind::Identifier(word.to_lowercase()), span),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }
}
