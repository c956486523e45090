//! Operand-stack semantics shared by the interpreter and the code generator.
//!
//! Stack effects are written as `( before -- after )`.

use crate::frontend::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

const fn fx(pops: usize, pushes: usize) -> StackEffect {
    StackEffect { pops, pushes }
}

/// Returns the stack effect of a token, or None if no backend supports it.
pub fn effect(token: &Token) -> Option<StackEffect> {
    use Token::*;
    Some(match token {
        Int(_) | Chr(_) => fx(0, 1),

        Add | Sub | Mul | Div | Mod => fx(2, 1),
        Gr | Ge | Eq | Le | Lt | Nt => fx(2, 1),

        Out | Put => fx(1, 0),
        Dump => fx(0, 0),

        Dup => fx(1, 2),  // ( a -- a a )
        Dup2 => fx(2, 4), // ( a b -- a b a b )
        Rot => fx(3, 3),  // ( a b c -- b c a )
        Swap => fx(2, 2), // ( a b -- b a )
        Drop => fx(1, 0), // ( a -- )

        If(_) => fx(1, 0),
        Else(_) | End => fx(0, 0),

        // the return value
        Eof => fx(1, 0),

        Str(_) | Ident(_) | Invalid(_) => return None,
    })
}

/// Binary operators: `( a b -- a op b )`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gr,
    Ge,
    Eq,
    Le,
    Lt,
    Nt,
}

impl BinaryOp {
    pub fn of(token: &Token) -> Option<Self> {
        Some(match token {
            Token::Add => BinaryOp::Add,
            Token::Sub => BinaryOp::Sub,
            Token::Mul => BinaryOp::Mul,
            Token::Div => BinaryOp::Div,
            Token::Mod => BinaryOp::Mod,
            Token::Gr => BinaryOp::Gr,
            Token::Ge => BinaryOp::Ge,
            Token::Eq => BinaryOp::Eq,
            Token::Le => BinaryOp::Le,
            Token::Lt => BinaryOp::Lt,
            Token::Nt => BinaryOp::Nt,
            _ => return None,
        })
    }

    /// Unsigned 64-bit semantics of the native instructions: add, sub and mul
    /// wrap. Returns None when the divisor of `/` or `%` is zero.
    pub fn apply(self, a: u64, b: u64) -> Option<u64> {
        Some(match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => a.checked_div(b)?,
            BinaryOp::Mod => a.checked_rem(b)?,
            BinaryOp::Gr => (a > b) as u64,
            BinaryOp::Ge => (a >= b) as u64,
            BinaryOp::Eq => (a == b) as u64,
            BinaryOp::Le => (a <= b) as u64,
            BinaryOp::Lt => (a < b) as u64,
            BinaryOp::Nt => (a != b) as u64,
        })
    }
}
