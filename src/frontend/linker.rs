//! Block linking: resolves `if` / `else` / `end` into absolute token indices.
//!
//! The opening token of every block stores the index of the token that closes
//! it, so both backends skip a block by jumping to `target + 1`.

use thiserror::Error;

use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;
use crate::lang::program::Program;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("{span}: 'else' without a matching 'if'")]
    UnmatchedElse { span: Span },

    #[error("{span}: 'else' cannot close the 'else' opened at {open}")]
    ElseWithoutIf { span: Span, open: Span },

    #[error("{span}: 'end' without a matching 'if' or 'else'")]
    UnmatchedEnd { span: Span },

    #[error("incomplete conditional block(s) opened at {}", fmt_spans(.open))]
    UnclosedBlocks { open: Vec<Span> },

    #[error("program must end with exactly one EOF token")]
    MissingEof,
}

fn fmt_spans(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn set_target(token: &mut Token, index: usize) {
    match token {
        Token::If(target) | Token::Else(target) => *target = Some(index),
        _ => unreachable!("pending-block stack only holds if/else indices"),
    }
}

/// Resolves every block in `tokens` and hands back the linked program.
pub fn link(mut tokens: Vec<Spanned>) -> Result<Program, LinkError> {
    check_eof(&tokens)?;

    let mut pending: Vec<usize> = Vec::new();

    for ip in 0..tokens.len() {
        match tokens[ip].token {
            Token::If(_) => pending.push(ip),
            Token::Else(_) => {
                let span = tokens[ip].span;
                let open = pending.pop().ok_or(LinkError::UnmatchedElse { span })?;
                if !matches!(tokens[open].token, Token::If(_)) {
                    return Err(LinkError::ElseWithoutIf {
                        span,
                        open: tokens[open].span,
                    });
                }
                set_target(&mut tokens[open].token, ip);
                tracing::trace!(from = open, to = ip, "linked if -> else");
                pending.push(ip);
            }
            Token::End => {
                let span = tokens[ip].span;
                let open = pending.pop().ok_or(LinkError::UnmatchedEnd { span })?;
                set_target(&mut tokens[open].token, ip);
                tracing::trace!(from = open, to = ip, "linked block -> end");
            }
            _ => {}
        }
    }

    if !pending.is_empty() {
        return Err(LinkError::UnclosedBlocks {
            open: pending.iter().map(|&ip| tokens[ip].span).collect(),
        });
    }

    tracing::debug!(tokens = tokens.len(), "linked program");
    Ok(Program::from_linked(tokens))
}

pub(crate) fn check_eof(tokens: &[Spanned]) -> Result<(), LinkError> {
    let eofs = tokens.iter().filter(|s| s.token == Token::Eof).count();
    match tokens.last() {
        Some(last) if last.token == Token::Eof && eofs == 1 => Ok(()),
        _ => Err(LinkError::MissingEof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn link_src(source: &str) -> Result<Program, LinkError> {
        link(Lexer::new(source).tokenize().unwrap())
    }

    fn targets(source: &str) -> Vec<Option<usize>> {
        link_src(source)
            .unwrap()
            .tokens()
            .iter()
            .map(|s| s.token.target())
            .collect()
    }

    #[test]
    fn test_if_end() {
        // 0:1 1:if 2:42 3:out 4:end 5:EOF
        assert_eq!(
            targets("1 if 42 out end"),
            vec![None, Some(4), None, None, None, None]
        );
    }

    #[test]
    fn test_if_else_end() {
        // 0:1 1:if 2:42 3:else 4:7 5:end 6:EOF
        assert_eq!(
            targets("1 if 42 else 7 end"),
            vec![None, Some(3), None, Some(5), None, None, None]
        );
    }

    #[test]
    fn test_nested_blocks() {
        // 0:1 1:if 2:0 3:if 4:5 5:else 6:6 7:end 8:end 9:EOF
        let t = targets("1 if 0 if 5 else 6 end end");
        assert_eq!(t[1], Some(8));
        assert_eq!(t[3], Some(5));
        assert_eq!(t[5], Some(7));
    }

    #[test]
    fn test_sequential_blocks() {
        // 0:1 1:if 2:end 3:0 4:if 5:end 6:EOF
        let t = targets("1 if end 0 if end");
        assert_eq!(t[1], Some(2));
        assert_eq!(t[4], Some(5));
    }

    #[test]
    fn test_no_blocks() {
        assert!(targets("1 2 +").iter().all(Option::is_none));
    }

    #[test]
    fn test_stray_else() {
        assert_eq!(
            link_src("1 else").unwrap_err(),
            LinkError::UnmatchedElse {
                span: Span { line: 1, col: 3 }
            }
        );
    }

    #[test]
    fn test_double_else() {
        assert_eq!(
            link_src("1 if 2 else 3 else 4 end").unwrap_err(),
            LinkError::ElseWithoutIf {
                span: Span { line: 1, col: 15 },
                open: Span { line: 1, col: 8 },
            }
        );
    }

    #[test]
    fn test_stray_end() {
        assert_eq!(
            link_src("1 if 2 end\nend").unwrap_err(),
            LinkError::UnmatchedEnd {
                span: Span { line: 2, col: 1 }
            }
        );
    }

    #[test]
    fn test_unclosed_if() {
        let err = link_src("1 if 2 if 3 end").unwrap_err();
        assert_eq!(
            err,
            LinkError::UnclosedBlocks {
                open: vec![Span { line: 1, col: 3 }]
            }
        );
        assert_eq!(
            err.to_string(),
            "incomplete conditional block(s) opened at 1:3"
        );
    }

    #[test]
    fn test_unclosed_else() {
        assert_eq!(
            link_src("0 if 1 else 2").unwrap_err(),
            LinkError::UnclosedBlocks {
                open: vec![Span { line: 1, col: 8 }]
            }
        );
    }

    #[test]
    fn test_missing_eof() {
        let mut tokens = Lexer::new("1 2").tokenize().unwrap();
        tokens.pop();
        assert_eq!(link(tokens).unwrap_err(), LinkError::MissingEof);
    }

    #[test]
    fn test_balanced_iff_no_error() {
        let cases = [
            ("if end", true),
            ("if else end", true),
            ("if if end else end", true),
            ("if", false),
            ("else", false),
            ("end", false),
            ("if else else end", false),
            ("if end end", false),
            ("if if end", false),
        ];
        for (source, balanced) in cases {
            assert_eq!(link_src(source).is_ok(), balanced, "{}", source);
        }
    }
}
