use std::path::PathBuf;

use thiserror::Error;

use crate::codegen::toolchain::ToolchainError;
use crate::frontend::lexer::Span;

#[derive(Debug, Error)]
pub enum CodegenError {
    /// A token the native backend cannot lower.
    #[error("{span}: cannot compile '{op}': not yet implemented")]
    Unimplemented { op: &'static str, span: Span },

    #[error("{span}: '{op}' has no resolved jump target")]
    UnresolvedJump { op: &'static str, span: Span },

    #[error("failed to write assembly")]
    Io(#[from] std::io::Error),

    #[error("unable to create file {}", .path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}
