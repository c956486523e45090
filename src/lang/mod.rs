//! Program representation and the operand-stack semantics both backends
//! implement.

pub mod effect;
pub mod program;
