use std::io::{self, Write};

use crate::frontend::lexer::Spanned;
use crate::frontend::token::{Token, escape};

pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const RED: &'static str = "\x1b[31m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    /// Writes one line per token: `<line>:<col> <NAME>[ - value: ...]`.
    pub fn dump<W: Write>(&self, tokens: &[Spanned], out: &mut W) -> io::Result<()> {
        for s in tokens {
            self.write_one(s, out)?;
        }
        Ok(())
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.dump(tokens, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn write_one<W: Write>(&self, s: &Spanned, out: &mut W) -> io::Result<()> {
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        write!(
            out,
            "{}:{} {}{}{}",
            s.span.line,
            s.span.col,
            colr,
            s.token.name(),
            reset
        )?;

        match &s.token {
            Token::Int(v) | Token::Chr(v) => write!(out, " - value: {}", v)?,
            Token::Str(text) | Token::Ident(text) | Token::Invalid(text) => {
                write!(out, " - value: \"{}\"", escape(text))?
            }
            Token::If(Some(target)) | Token::Else(Some(target)) => {
                write!(out, " - target: {}", target)?
            }
            _ => {}
        }
        writeln!(out)
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => Self::DIM,
            Str(_) => Self::GRN,
            Int(_) | Chr(_) => Self::CYN,
            Ident(_) => Self::YEL,
            Invalid(_) => Self::RED,
            Add | Sub | Mul | Div | Mod => Self::MAG,
            Gr | Ge | Eq | Le | Lt | Nt => Self::MAG,
            Out | Put | Dump | Dup | Dup2 | Rot | Swap | Drop | If(_) | Else(_) | End => {
                Self::RESET
            }
        }
    }
}
