use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frontend::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Errors raised while scanning, plus the deferred invalid-number check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("empty source")]
    EmptySource,

    #[error("{line}:{col}: invalid numeric literal '{text}'")]
    InvalidNumber {
        text: String,
        line: usize,
        col: usize,
    },

    #[error("{line}:{col}: malformed character literal, expected 'x'")]
    InvalidChar { line: usize, col: usize },

    #[error("{line}:{col}: unterminated string literal")]
    UnterminatedString { line: usize, col: usize },

    #[error("{line}:{col}: unknown escape sequence: \\{escape}")]
    UnknownEscape {
        escape: char,
        line: usize,
        col: usize,
    },
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if is_space(ch) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Consumes everything up to the next whitespace character.
    fn read_run(&mut self) -> String {
        let mut run = String::new();
        while let Some(ch) = self.current() {
            if is_space(ch) {
                break;
            }
            run.push(ch);
            self.advance();
        }
        run
    }

    fn read_operator(&mut self) -> Token {
        let ch = self.advance();
        let followed_by_eq = self.current() == Some('=');

        match ch {
            Some('+') => Token::Add,
            Some('-') => Token::Sub,
            Some('*') => Token::Mul,
            Some('/') => Token::Div,
            Some('%') => Token::Mod,
            Some('=') => Token::Eq,
            Some('!') => Token::Nt,
            Some('>') if followed_by_eq => {
                self.advance();
                Token::Ge
            }
            Some('>') => Token::Gr,
            Some('<') if followed_by_eq => {
                self.advance();
                Token::Le
            }
            Some('<') => Token::Lt,
            _ => unreachable!("read_operator called on a non-operator"),
        }
    }

    /// A digit starts a number run. A run that is not all digits (or does not
    /// fit in 64 bits) becomes `Invalid` and is reported by `validate`.
    fn read_number(&mut self) -> Token {
        let run = self.read_run();
        if !run.chars().all(|c| c.is_ascii_digit()) {
            return Token::Invalid(run);
        }
        match run.parse::<u64>() {
            Ok(value) => Token::Int(value),
            Err(_) => Token::Invalid(run),
        }
    }

    fn read_char(&mut self) -> Result<Token, ScanError> {
        let span = self.span();
        let malformed = ScanError::InvalidChar {
            line: span.line,
            col: span.col,
        };

        let payload = match (self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
            (Some(ch), Some('\''), after)
                if ch.is_ascii() && ch != '\n' && after.is_none_or(is_space) =>
            {
                ch
            }
            _ => return Err(malformed),
        };

        for _ in 0..3 {
            self.advance();
        }
        Ok(Token::Chr(payload as u64))
    }

    fn read_string(&mut self) -> Result<Token, ScanError> {
        let start = self.span();
        self.advance();

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::Str(string));
                }
                Some('\\') => {
                    let (line, col) = (self.line, self.col);
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        Some(ch) => {
                            return Err(ScanError::UnknownEscape {
                                escape: ch,
                                line,
                                col,
                            });
                        }
                        None => {
                            return Err(ScanError::UnterminatedString {
                                line: start.line,
                                col: start.col,
                            });
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => {
                    return Err(ScanError::UnterminatedString {
                        line: start.line,
                        col: start.col,
                    });
                }
            }
        }
    }

    fn read_word(&mut self) -> Token {
        let word = self.read_run();
        Token::keyword(&word).unwrap_or(Token::Ident(word))
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, ScanError> {
        if self.source.is_empty() {
            return Err(ScanError::EmptySource);
        }

        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('$') => {
                    self.skip_comment();
                    continue;
                }
                Some(ch) if "+-*/%=!<>".contains(ch) => self.read_operator(),
                Some(ch) if ch.is_ascii_digit() => self.read_number(),
                Some('\'') => self.read_char()?,
                Some('"') => self.read_string()?,
                Some(_) => self.read_word(),
            };
            tokens.push(Spanned { token, span });
        }

        tracing::debug!(tokens = tokens.len(), lines = self.line, "scanned source");
        Ok(tokens)
    }
}

/// Rejects the first token the scanner marked invalid.
pub fn validate(tokens: &[Spanned]) -> Result<(), ScanError> {
    match tokens.iter().find(|s| matches!(s.token, Token::Invalid(_))) {
        Some(Spanned {
            token: Token::Invalid(text),
            span,
        }) => Err(ScanError::InvalidNumber {
            text: text.clone(),
            line: span.line,
            col: span.col,
        }),
        _ => Ok(()),
    }
}
