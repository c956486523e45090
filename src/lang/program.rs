use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frontend::lexer::Spanned;
use crate::frontend::linker::{LinkError, check_eof};
use crate::frontend::token::Token;

/// A linked token program: an index-addressed arena ending in one `Eof`.
///
/// Only the linker builds one from scanned tokens, so every `if`/`else` in
/// it carries a resolved jump target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    tokens: Vec<Spanned>,
}

#[derive(Debug, Error)]
pub enum ProgramLoadError {
    #[error("corrupt program image")]
    Decode(#[from] postcard::Error),

    #[error("invalid program image")]
    Link(#[from] LinkError),

    #[error("invalid program image: jump at index {index} has no valid target")]
    BadTarget { index: usize },
}

impl Program {
    pub(crate) fn from_linked(tokens: Vec<Spanned>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Spanned] {
        &self.tokens
    }

    /// True if any token in the program satisfies `pred`.
    pub fn contains(&self, pred: impl Fn(&Token) -> bool) -> bool {
        self.tokens.iter().any(|s| pred(&s.token))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decodes a program image and re-checks the structural guarantees the
    /// linker would have established.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramLoadError> {
        let program: Program = postcard::from_bytes(bytes)?;
        check_eof(&program.tokens)?;

        for (index, s) in program.tokens.iter().enumerate() {
            let resolved = match s.token {
                Token::If(target) => target.map(|t| {
                    matches!(
                        program.tokens.get(t).map(|s| &s.token),
                        Some(Token::Else(_) | Token::End)
                    )
                }),
                Token::Else(target) => target.map(|t| {
                    matches!(program.tokens.get(t).map(|s| &s.token), Some(Token::End))
                }),
                _ => continue,
            };
            if resolved != Some(true) || s.token.target().is_some_and(|t| t <= index) {
                return Err(ProgramLoadError::BadTarget { index });
            }
        }

        Ok(program)
    }
}
