use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Token {
    // Literals
    Int(u64),
    Chr(u64),
    Str(String),

    // Identifier (no user-defined words yet)
    Ident(String),

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // I/O
    Out,
    Put,
    Dump,

    // Stack operations
    Dup,
    Dup2,
    Rot,
    Swap,
    Drop,

    // Control flow. The payload is the index of the token closing the block,
    // filled in by the linker.
    If(Option<usize>),
    Else(Option<usize>),
    End,

    // Comparison
    Gr,
    Ge,
    Eq,
    Le,
    Lt,
    Nt,

    // Special
    Invalid(String),
    Eof,
}

impl Token {
    /// Upper-case opcode name used by the token dump.
    pub fn name(&self) -> &'static str {
        match self {
            Token::Int(_) => "INT",
            Token::Chr(_) => "CHR",
            Token::Str(_) => "STR",
            Token::Ident(_) => "IDN",
            Token::Add => "ADD",
            Token::Sub => "SUB",
            Token::Mul => "MUL",
            Token::Div => "DIV",
            Token::Mod => "MOD",
            Token::Out => "OUT",
            Token::Put => "PUT",
            Token::Dump => "DMP",
            Token::Dup => "DUP",
            Token::Dup2 => "DUP2",
            Token::Rot => "ROT",
            Token::Swap => "SWP",
            Token::Drop => "DROP",
            Token::If(_) => "IF",
            Token::Else(_) => "ELSE",
            Token::End => "END",
            Token::Gr => "GR",
            Token::Ge => "GE",
            Token::Eq => "EQ",
            Token::Le => "LE",
            Token::Lt => "LT",
            Token::Nt => "NT",
            Token::Invalid(_) => "INV",
            Token::Eof => "EOF",
        }
    }

    /// Maps a scanned word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<Token> {
        let token = match word {
            "out" => Token::Out,
            "put" => Token::Put,
            "dump" => Token::Dump,
            "dup" => Token::Dup,
            "dup2" => Token::Dup2,
            "rot" => Token::Rot,
            "swap" => Token::Swap,
            "drop" => Token::Drop,
            "if" => Token::If(None),
            "else" => Token::Else(None),
            "end" => Token::End,
            _ => return None,
        };
        Some(token)
    }

    /// Jump target of an `if`/`else`, once linked.
    pub fn target(&self) -> Option<usize> {
        match self {
            Token::If(target) | Token::Else(target) => *target,
            _ => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::Chr(c) => match char::from_u32(*c as u32) {
                Some(ch) => write!(f, "'{}'", ch),
                None => write!(f, "'\\u{{{:x}}}'", c),
            },
            Token::Str(s) => write!(f, "\"{}\"", escape(s)),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Add => write!(f, "+"),
            Token::Sub => write!(f, "-"),
            Token::Mul => write!(f, "*"),
            Token::Div => write!(f, "/"),
            Token::Mod => write!(f, "%"),
            Token::Out => write!(f, "out"),
            Token::Put => write!(f, "put"),
            Token::Dump => write!(f, "dump"),
            Token::Dup => write!(f, "dup"),
            Token::Dup2 => write!(f, "dup2"),
            Token::Rot => write!(f, "rot"),
            Token::Swap => write!(f, "swap"),
            Token::Drop => write!(f, "drop"),
            Token::If(_) => write!(f, "if"),
            Token::Else(_) => write!(f, "else"),
            Token::End => write!(f, "end"),
            Token::Gr => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Eq => write!(f, "="),
            Token::Le => write!(f, "<="),
            Token::Lt => write!(f, "<"),
            Token::Nt => write!(f, "!"),
            Token::Invalid(s) => write!(f, "{}", s),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Re-escapes a string payload for diagnostics.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
