use std::io::Write;

use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;
use crate::lang::effect::{BinaryOp, effect};
use crate::lang::program::Program;
use crate::runtime::runtime_error::RuntimeError;

/// Execution limits. Both default to unlimited so the interpreter behaves
/// exactly like the compiled program.
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    pub max_steps: Option<usize>,
    pub max_stack_size: Option<usize>,
}

pub struct Vm<W: Write> {
    stack: Vec<u64>,
    config: VmConfig,
    steps: usize,
    out: W,
}

impl<W: Write> Vm<W> {
    pub fn new(out: W) -> Self {
        Self::with_config(out, VmConfig::default())
    }

    pub fn with_config(out: W, config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            config,
            steps: 0,
            out,
        }
    }

    pub fn stack(&self) -> &[u64] {
        &self.stack
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs a linked program and returns the value popped by `Eof`.
    ///
    /// Output written before a fault is still flushed.
    pub fn run(&mut self, program: &Program) -> Result<u64, RuntimeError> {
        self.stack.clear();
        self.steps = 0;

        let result = self.exec(program);
        self.out.flush()?;
        if let Ok(value) = &result {
            tracing::debug!(steps = self.steps, exit = *value, "program finished");
        }
        result
    }

    fn check_limits(&mut self, span: Span) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimit { max });
            }
        }

        if let Some(max) = self.config.max_stack_size {
            if self.stack.len() > max {
                return Err(RuntimeError::StackLimit { max, span });
            }
        }

        Ok(())
    }

    fn exec(&mut self, program: &Program) -> Result<u64, RuntimeError> {
        let tokens = program.tokens();
        let mut return_value = 0;
        let mut pc: usize = 0;

        while pc < tokens.len() {
            let Spanned { token, span } = &tokens[pc];
            let span = *span;
            self.check_limits(span)?;

            let needed = match effect(token) {
                Some(fx) => fx.pops,
                None => {
                    return Err(RuntimeError::Unimplemented {
                        op: token.name(),
                        span,
                    });
                }
            };
            if self.stack.len() < needed {
                return Err(RuntimeError::StackUnderflow {
                    op: token.name(),
                    needed,
                    depth: self.stack.len(),
                    span,
                });
            }

            pc += 1;

            match token {
                // Literals
                Token::Int(v) | Token::Chr(v) => self.push(*v),

                // Arithmetic and comparison
                Token::Add
                | Token::Sub
                | Token::Mul
                | Token::Div
                | Token::Mod
                | Token::Gr
                | Token::Ge
                | Token::Eq
                | Token::Le
                | Token::Lt
                | Token::Nt => {
                    let b = self.pop(token, span)?;
                    let a = self.pop(token, span)?;
                    let op = BinaryOp::of(token).ok_or(RuntimeError::Unimplemented {
                        op: token.name(),
                        span,
                    })?;
                    let value = op
                        .apply(a, b)
                        .ok_or(RuntimeError::DivisionByZero { span })?;
                    self.push(value);
                }

                // I/O
                Token::Out => {
                    let a = self.pop(token, span)?;
                    write!(self.out, "{}", a)?;
                }
                Token::Put => {
                    let a = self.pop(token, span)?;
                    self.out.write_all(&[a as u8])?;
                }
                Token::Dump => self.dump_stack()?,

                // Stack operations
                Token::Dup => {
                    let a = self.pop(token, span)?;
                    self.push(a);
                    self.push(a);
                }
                Token::Dup2 => {
                    let b = self.pop(token, span)?;
                    let a = self.pop(token, span)?;
                    self.push(a);
                    self.push(b);
                    self.push(a);
                    self.push(b);
                }
                Token::Rot => {
                    let c = self.pop(token, span)?;
                    let b = self.pop(token, span)?;
                    let a = self.pop(token, span)?;
                    self.push(b);
                    self.push(c);
                    self.push(a);
                }
                Token::Swap => {
                    let b = self.pop(token, span)?;
                    let a = self.pop(token, span)?;
                    self.push(b);
                    self.push(a);
                }
                Token::Drop => {
                    self.pop(token, span)?;
                }

                // Control flow
                Token::If(target) => {
                    let target = target.ok_or(RuntimeError::UnresolvedJump {
                        op: token.name(),
                        span,
                    })?;
                    if self.pop(token, span)? == 0 {
                        pc = target + 1;
                    }
                }
                // Only reached when the `if` branch ran: skip the else branch.
                Token::Else(target) => {
                    let target = target.ok_or(RuntimeError::UnresolvedJump {
                        op: token.name(),
                        span,
                    })?;
                    pc = target + 1;
                }
                Token::End => {}

                Token::Eof => return_value = self.pop(token, span)?,

                Token::Str(_) | Token::Ident(_) | Token::Invalid(_) => {
                    return Err(RuntimeError::Unimplemented {
                        op: token.name(),
                        span,
                    });
                }
            }
        }

        Ok(return_value)
    }

    fn push(&mut self, value: u64) {
        self.stack.push(value);
    }

    fn pop(&mut self, token: &Token, span: Span) -> Result<u64, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow {
            op: token.name(),
            needed: 1,
            depth: 0,
            span,
        })
    }

    fn dump_stack(&mut self) -> Result<(), RuntimeError> {
        writeln!(self.out, "Dumping stack:")?;
        for (i, value) in self.stack.iter().enumerate().rev() {
            writeln!(self.out, "[{}] {}", i, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::linker::link;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn program(source: &str) -> Program {
        link(Lexer::new(source).tokenize().unwrap()).unwrap()
    }

    /// Run source and return (exit value, stdout).
    fn run(source: &str) -> Result<(u64, String), RuntimeError> {
        let mut vm = Vm::new(Vec::new());
        let value = vm.run(&program(source))?;
        Ok((value, String::from_utf8(vm.into_output()).unwrap()))
    }

    fn output(source: &str) -> String {
        run(source).expect("execution should succeed").1
    }

    fn exit_value(source: &str) -> u64 {
        run(source).expect("execution should succeed").0
    }

    /// Stack left behind when execution stops right before `Eof`.
    fn stack_before_eof(source: &str) -> Vec<u64> {
        // A trailing literal keeps `Eof` from consuming a value under test.
        let mut vm = Vm::new(Vec::new());
        vm.run(&program(&format!("{} 0", source))).unwrap();
        vm.stack().to_vec()
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    #[test]
    fn test_add_sub_mul() {
        assert_eq!(exit_value("2 3 +"), 5);
        assert_eq!(exit_value("10 4 -"), 6);
        assert_eq!(exit_value("6 7 *"), 42);
    }

    #[test]
    fn test_operand_order() {
        // second-popped value is the left operand
        assert_eq!(exit_value("20 5 /"), 4);
        assert_eq!(exit_value("3 10 <"), 1);
    }

    #[test]
    fn test_division_semantics() {
        assert_eq!(exit_value("10 3 /"), 3);
        assert_eq!(exit_value("10 3 %"), 1);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let err = run("10 0 /").unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::DivisionByZero {
                span: Span { line: 1, col: 6 }
            }
        ));
    }

    #[test]
    fn test_modulo_by_zero_is_fatal() {
        assert!(matches!(
            run("10 0 %").unwrap_err(),
            RuntimeError::DivisionByZero { .. }
        ));
    }

    #[test]
    fn test_wrapping_subtraction() {
        assert_eq!(exit_value("0 1 -"), u64::MAX);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(exit_value("5 3 >"), 1);
        assert_eq!(exit_value("3 3 >="), 1);
        assert_eq!(exit_value("3 3 ="), 1);
        assert_eq!(exit_value("4 3 <="), 0);
        assert_eq!(exit_value("4 3 <"), 0);
        assert_eq!(exit_value("4 3 !"), 1);
    }

    // ============================================================
    // Stack shuffles
    // ============================================================

    #[test]
    fn test_dup() {
        assert_eq!(stack_before_eof("7 dup"), vec![7, 7]);
    }

    #[test]
    fn test_dup2_preserves_order() {
        assert_eq!(stack_before_eof("1 2 dup2"), vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_rot() {
        assert_eq!(stack_before_eof("1 2 3 rot"), vec![2, 3, 1]);
    }

    #[test]
    fn test_swap() {
        assert_eq!(stack_before_eof("1 2 swap"), vec![2, 1]);
    }

    #[test]
    fn test_drop() {
        assert_eq!(stack_before_eof("1 2 drop"), vec![1]);
    }

    #[test]
    fn test_arity_matches_effect_table() {
        let cases = [
            ("+", 2),
            ("-", 2),
            ("*", 2),
            ("/", 2),
            ("%", 2),
            (">", 2),
            (">=", 2),
            ("=", 2),
            ("<=", 2),
            ("<", 2),
            ("!", 2),
            ("dup", 1),
            ("dup2", 2),
            ("rot", 3),
            ("swap", 2),
            ("drop", 1),
        ];
        for (op, pops) in cases {
            let token = Lexer::new(op).tokenize().unwrap().remove(0).token;
            let fx = effect(&token).unwrap();
            assert_eq!(fx.pops, pops, "{}", op);

            // Four filler values below the operands must survive untouched.
            let before = "9 9 9 9 5 6 7";
            let stack = stack_before_eof(&format!("{} {}", before, op));
            assert_eq!(stack.len(), 7 - fx.pops + fx.pushes, "{}", op);
            assert_eq!(&stack[..4], &[9, 9, 9, 9], "{}", op);
        }
    }

    // ============================================================
    // I/O
    // ============================================================

    #[test]
    fn test_out_and_put() {
        assert_eq!(output("42 out 'A' put 10 put 0"), "42A\n");
    }

    #[test]
    fn test_put_writes_low_byte() {
        assert_eq!(output("321 put 0"), "A");
    }

    #[test]
    fn test_dump_does_not_consume() {
        let (value, out) = run("10 20 dump +").unwrap();
        assert_eq!(out, "Dumping stack:\n[1] 20\n[0] 10\n");
        assert_eq!(value, 30);
    }

    #[test]
    fn test_dump_empty_stack() {
        assert_eq!(output("dump 0"), "Dumping stack:\n");
    }

    // ============================================================
    // Control flow
    // ============================================================

    #[test]
    fn test_if_else_true_branch() {
        assert_eq!(output("1 if 42 out else 7 out end 0"), "42");
    }

    #[test]
    fn test_if_else_false_branch() {
        assert_eq!(output("0 if 42 out else 7 out end 0"), "7");
    }

    #[test]
    fn test_if_without_else() {
        assert_eq!(output("1 if 42 out end 0"), "42");
        assert_eq!(output("0 if 42 out end 0"), "");
    }

    #[test]
    fn test_nested_conditionals() {
        let source = "1 if 0 if 1 out else 2 out end 3 out else 4 out end 0";
        assert_eq!(output(source), "23");
    }

    #[test]
    fn test_any_nonzero_is_true() {
        assert_eq!(output("99 if 1 out end 0"), "1");
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_underflow_is_fatal_and_prints_nothing() {
        let mut vm = Vm::new(Vec::new());
        let err = vm.run(&program("+")).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::StackUnderflow {
                op: "ADD",
                needed: 2,
                depth: 0,
                ..
            }
        ));
        assert!(vm.output().is_empty());
    }

    #[test]
    fn test_eof_on_empty_stack_is_underflow() {
        assert!(matches!(
            run("1 out").unwrap_err(),
            RuntimeError::StackUnderflow { op: "EOF", .. }
        ));
    }

    #[test]
    fn test_output_before_fault_is_kept() {
        let mut vm = Vm::new(Vec::new());
        assert!(vm.run(&program("5 out drop")).is_err());
        assert_eq!(vm.output().as_slice(), b"5");
    }

    #[test]
    fn test_string_is_unimplemented() {
        assert!(matches!(
            run("\"hi\" 0").unwrap_err(),
            RuntimeError::Unimplemented { op: "STR", .. }
        ));
    }

    #[test]
    fn test_identifier_is_unimplemented() {
        assert!(matches!(
            run("1 foo").unwrap_err(),
            RuntimeError::Unimplemented { op: "IDN", .. }
        ));
    }

    #[test]
    fn test_step_limit() {
        let config = VmConfig {
            max_steps: Some(3),
            ..VmConfig::default()
        };
        let mut vm = Vm::with_config(Vec::new(), config);
        assert!(matches!(
            vm.run(&program("1 2 3 4 +")).unwrap_err(),
            RuntimeError::StepLimit { max: 3 }
        ));
    }

    #[test]
    fn test_stack_limit() {
        let config = VmConfig {
            max_stack_size: Some(2),
            ..VmConfig::default()
        };
        let mut vm = Vm::with_config(Vec::new(), config);
        assert!(matches!(
            vm.run(&program("1 2 3 + + ")).unwrap_err(),
            RuntimeError::StackLimit { max: 2, .. }
        ));
    }

    #[test]
    fn test_vm_is_reusable() {
        let mut vm = Vm::new(Vec::new());
        assert_eq!(vm.run(&program("1 2 3")).unwrap(), 3);
        assert_eq!(vm.run(&program("4")).unwrap(), 4);
        assert!(vm.stack().is_empty());
    }
}
