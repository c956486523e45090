//! Lowering of a linked program to NASM x86-64 assembly for Linux.
//!
//! The operand stack is the native stack. `rbp` holds the stack pointer at
//! entry, so `rbp - rsp` is always eight times the operand count; every block
//! that pops checks it first and bails out through `glomp_underflow`, the
//! same fault the interpreter raises.

use std::collections::BTreeSet;
use std::io::Write;

use crate::codegen::codegen_error::CodegenError;
use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;
use crate::lang::effect::effect;
use crate::lang::program::Program;

const PRINTINT: &str = "\
glomp_printint:
    sub     rsp, 40
    mov     ecx, 31
    mov     r9, -3689348814741910323
.digit:
    mov     rax, rdi
    mov     r8, rcx
    sub     rcx, 1
    mul     r9
    mov     rax, rdi
    shr     rdx, 3
    lea     rsi, [rdx+rdx*4]
    add     rsi, rsi
    sub     rax, rsi
    add     eax, 48
    mov     BYTE [rsp+1+rcx], al
    mov     rax, rdi
    mov     rdi, rdx
    cmp     rax, 9
    ja      .digit
    mov     edx, 31
    lea     rsi, [rsp+r8]
    mov     edi, 1
    sub     rdx, rcx
    mov     rax, 1
    syscall
    add     rsp, 40
    ret
";

const PRINTCHAR: &str = "\
glomp_printchar:
    push    rdi
    mov     rax, 1
    mov     rdi, 1
    mov     rsi, rsp
    mov     rdx, 1
    syscall
    pop     rdi
    ret
";

// r12 = operand count, [rsp + 8*r13] walks from the top item down; the
// return address sits at [rsp].
const DUMPSTACK: &str = "\
glomp_dumpstack:
    mov     rax, 1
    mov     rdi, 1
    mov     rsi, glomp_dumpstr
    mov     rdx, glomp_dumpstr_len
    syscall
    mov     r12, rbp
    sub     r12, rsp
    sub     r12, 8
    shr     r12, 3
    mov     r13, 1
.next:
    cmp     r13, r12
    ja      .done
    mov     rdi, '['
    call    glomp_printchar
    mov     rdi, r12
    sub     rdi, r13
    call    glomp_printint
    mov     rdi, ']'
    call    glomp_printchar
    mov     rdi, ' '
    call    glomp_printchar
    mov     rdi, [rsp+r13*8]
    call    glomp_printint
    mov     rdi, 10
    call    glomp_printchar
    inc     r13
    jmp     .next
.done:
    ret
";

const FAULTS: &str = "\
glomp_underflow:
    mov     rsi, glomp_underflow_msg
    mov     rdx, glomp_underflow_len
    jmp     glomp_fault

glomp_divzero:
    mov     rsi, glomp_divzero_msg
    mov     rdx, glomp_divzero_len

glomp_fault:
    mov     rax, 1
    mov     rdi, 2
    syscall
    mov     rax, 60
    mov     rdi, 1
    syscall
";

/// Emits the assembly for `program` into `out`.
///
/// Fails on the first token the native backend cannot lower; whatever was
/// already written is then incomplete and must be discarded by the caller.
pub fn emit<W: Write>(program: &Program, out: &mut W) -> Result<(), CodegenError> {
    let dump_used = program.contains(|t| matches!(t, Token::Dump));
    let jump_targets = collect_jump_targets(program)?;

    writeln!(out, "BITS 64")?;
    writeln!(out)?;
    writeln!(out, "segment .text")?;
    writeln!(out)?;
    writeln!(out, "{}", PRINTINT)?;
    writeln!(out, "{}", PRINTCHAR)?;
    if dump_used {
        writeln!(out, "{}", DUMPSTACK)?;
    }
    writeln!(out, "{}", FAULTS)?;

    writeln!(out, "global _start")?;
    writeln!(out, "_start:")?;
    writeln!(out, "    mov     rbp, rsp")?;

    for (ip, spanned) in program.tokens().iter().enumerate() {
        if jump_targets.contains(&ip) {
            writeln!(out, "{}:", label(ip))?;
        }
        emit_token(spanned, out)?;
    }

    writeln!(out)?;
    writeln!(out, "segment .data")?;
    if dump_used {
        writeln!(out, "glomp_dumpstr:          db  \"Dumping stack:\",10")?;
        writeln!(out, "glomp_dumpstr_len:      equ $ - glomp_dumpstr")?;
    }
    writeln!(out, "glomp_underflow_msg:    db  \"runtime error: stack underflow\",10")?;
    writeln!(out, "glomp_underflow_len:    equ $ - glomp_underflow_msg")?;
    writeln!(out, "glomp_divzero_msg:      db  \"runtime error: division by zero\",10")?;
    writeln!(out, "glomp_divzero_len:      equ $ - glomp_divzero_msg")?;

    Ok(())
}

/// Lowers `program` to a complete assembly listing.
pub fn generate(program: &Program) -> Result<String, CodegenError> {
    let mut buf = Vec::new();
    emit(program, &mut buf)?;
    tracing::debug!(bytes = buf.len(), "generated assembly");
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn label(ip: usize) -> String {
    format!("glomp_addr_{}", ip)
}

/// Token indices that some `if`/`else` jumps to (`target + 1`).
fn collect_jump_targets(program: &Program) -> Result<BTreeSet<usize>, CodegenError> {
    let mut targets = BTreeSet::new();
    for s in program.tokens() {
        if let Token::If(target) | Token::Else(target) = &s.token {
            let target = target.ok_or(CodegenError::UnresolvedJump {
                op: s.token.name(),
                span: s.span,
            })?;
            targets.insert(target + 1);
        }
    }
    Ok(targets)
}

/// Literal operand for `mov r64, imm64`.
fn imm(value: u64) -> String {
    if value <= i64::MAX as u64 {
        value.to_string()
    } else {
        format!("0x{:x}", value)
    }
}

fn emit_token<W: Write>(s: &Spanned, out: &mut W) -> Result<(), CodegenError> {
    let Spanned { token, span } = s;
    let unimplemented = || CodegenError::Unimplemented {
        op: token.name(),
        span: *span,
    };

    let pops = effect(token).ok_or_else(unimplemented)?.pops;
    writeln!(out, "; {} {}", span, token.name())?;
    if pops > 0 {
        writeln!(out, "    mov     rax, rbp")?;
        writeln!(out, "    sub     rax, rsp")?;
        writeln!(out, "    cmp     rax, {}", pops * 8)?;
        writeln!(out, "    jb      glomp_underflow")?;
    }

    let lines: Vec<String> = match token {
        Token::Int(v) | Token::Chr(v) => vec![format!("mov     rax, {}", imm(*v)), push("rax")],

        Token::Add => binary(&["add     rax, rcx"]),
        Token::Sub => binary(&["sub     rax, rcx"]),
        Token::Mul => binary(&["mul     rcx"]),
        Token::Div => divide("rax"),
        Token::Mod => divide("rdx"),

        Token::Gr => compare("seta"),
        Token::Ge => compare("setae"),
        Token::Eq => compare("sete"),
        Token::Le => compare("setbe"),
        Token::Lt => compare("setb"),
        Token::Nt => compare("setne"),

        Token::Out => vec![pop("rdi"), "call    glomp_printint".into()],
        Token::Put => vec![pop("rdi"), "call    glomp_printchar".into()],
        Token::Dump => vec!["call    glomp_dumpstack".into()],

        // ( a -- a a )
        Token::Dup => vec![pop("rax"), push("rax"), push("rax")],
        // ( a b -- a b a b )
        Token::Dup2 => vec![
            pop("rax"),
            pop("rcx"),
            push("rcx"),
            push("rax"),
            push("rcx"),
            push("rax"),
        ],
        // ( a b c -- b c a )
        Token::Rot => vec![
            pop("rax"),
            pop("rcx"),
            pop("rdx"),
            push("rcx"),
            push("rax"),
            push("rdx"),
        ],
        // ( a b -- b a )
        Token::Swap => vec![pop("rax"), pop("rcx"), push("rax"), push("rcx")],
        Token::Drop => vec!["add     rsp, 8".into()],

        Token::If(target) => {
            let target = target.ok_or(CodegenError::UnresolvedJump {
                op: token.name(),
                span: *span,
            })?;
            vec![
                pop("rax"),
                "test    rax, rax".into(),
                format!("jz      {}", label(target + 1)),
            ]
        }
        Token::Else(target) => {
            let target = target.ok_or(CodegenError::UnresolvedJump {
                op: token.name(),
                span: *span,
            })?;
            vec![format!("jmp     {}", label(target + 1))]
        }
        Token::End => vec![],

        Token::Eof => vec![
            "mov     rax, 60".into(),
            pop("rdi"),
            "syscall".into(),
        ],

        Token::Str(_) | Token::Ident(_) | Token::Invalid(_) => return Err(unimplemented()),
    };

    for line in lines {
        writeln!(out, "    {}", line)?;
    }
    Ok(())
}

fn push(reg: &str) -> String {
    format!("push    {}", reg)
}

fn pop(reg: &str) -> String {
    format!("pop     {}", reg)
}

/// `rcx` holds the right operand, `rax` the left; the result is pushed from rax.
fn binary(body: &[&str]) -> Vec<String> {
    let mut lines = vec![pop("rcx"), pop("rax")];
    lines.extend(body.iter().map(|s| s.to_string()));
    lines.push(push("rax"));
    lines
}

fn divide(result: &str) -> Vec<String> {
    vec![
        pop("rcx"),
        pop("rax"),
        "test    rcx, rcx".into(),
        "jz      glomp_divzero".into(),
        "xor     edx, edx".into(),
        "div     rcx".into(),
        push(result),
    ]
}

fn compare(set: &str) -> Vec<String> {
    let set = format!("{:<7} al", set);
    binary(&["cmp     rax, rcx", set.as_str(), "movzx   eax, al"])
}
