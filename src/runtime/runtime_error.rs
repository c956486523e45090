use thiserror::Error;

use crate::frontend::lexer::Span;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{span}: stack underflow: '{op}' needs {needed} item(s), stack has {depth}")]
    StackUnderflow {
        op: &'static str,
        needed: usize,
        depth: usize,
        span: Span,
    },

    #[error("{span}: division by zero")]
    DivisionByZero { span: Span },

    #[error("{span}: '{op}' is not yet implemented")]
    Unimplemented { op: &'static str, span: Span },

    #[error("{span}: '{op}' has no resolved jump target")]
    UnresolvedJump { op: &'static str, span: Span },

    #[error("execution step limit exceeded ({max})")]
    StepLimit { max: usize },

    #[error("{span}: stack size limit exceeded ({max})")]
    StackLimit { max: usize, span: Span },

    #[error("failed to write program output")]
    Io(#[from] std::io::Error),
}
