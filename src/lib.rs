//! Front end and two backends for the glomp stack language.
//!
//! 1. [`frontend::lexer::Lexer`] scans source into spanned tokens.
//! 1. [`frontend::lexer::validate`] rejects runs the scanner marked invalid.
//! 1. [`frontend::linker::link`] resolves `if`/`else`/`end` and produces a
//!    [`lang::program::Program`].
//! 1. The program is either run by [`runtime::Vm`] or lowered to NASM by
//!    [`codegen::generate`] and built with a [`codegen::Toolchain`].
//!
//! ```
//! let program = glomp::parse("1 if 42 out else 7 out end 0").unwrap();
//! let mut vm = glomp::runtime::Vm::new(Vec::new());
//! assert_eq!(vm.run(&program).unwrap(), 0);
//! assert_eq!(vm.into_output(), b"42");
//! ```

pub mod codegen;
pub mod frontend;
pub mod lang;
pub mod runtime;

use thiserror::Error;

pub use frontend::lexer::{ScanError, Span, Spanned};
pub use frontend::linker::LinkError;
pub use frontend::token::Token;
pub use lang::program::Program;

use codegen::CodegenError;
use runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("scan error")]
    Scan(#[from] ScanError),

    #[error("link error")]
    Link(#[from] LinkError),

    #[error("runtime error")]
    Runtime(#[from] RuntimeError),

    #[error("codegen error")]
    Codegen(#[from] CodegenError),
}

/// Scans `source` without validating or linking, for the token dump.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScanError> {
    frontend::lexer::Lexer::new(source).tokenize()
}

/// Validates and links already scanned tokens.
pub fn build(tokens: Vec<Spanned>) -> Result<Program, Error> {
    frontend::lexer::validate(&tokens)?;
    Ok(frontend::linker::link(tokens)?)
}

/// Scans, validates and links `source`.
pub fn parse(source: &str) -> Result<Program, Error> {
    build(tokenize(source)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_each_stage() {
        assert!(matches!(parse(""), Err(Error::Scan(ScanError::EmptySource))));
        assert!(matches!(
            parse("1 2x +"),
            Err(Error::Scan(ScanError::InvalidNumber { .. }))
        ));
        assert!(matches!(
            parse("1 if 2"),
            Err(Error::Link(LinkError::UnclosedBlocks { .. }))
        ));
        assert!(parse("1 if 2 out end 0").is_ok());
    }

    #[test]
    fn test_invalid_number_wins_over_link_error() {
        // validation runs before linking, so no partial program reaches it
        assert!(matches!(
            parse("end 3z"),
            Err(Error::Scan(ScanError::InvalidNumber { .. }))
        ));
    }

    #[test]
    fn test_error_display_names_stage() {
        use std::error::Error as _;

        let err = parse("+ else").unwrap_err();
        assert_eq!(err.to_string(), "link error");
        assert_eq!(
            err.source().unwrap().to_string(),
            "1:3: 'else' without a matching 'if'"
        );
    }
}
