mod builtins;
mod error;
mod grammar;
pub mod regid;
mod symbol;
mod vartable;

pub use error::ParseError;
pub use grammar::Parser;
pub use symbol::{CompiledScript, OpCode, OperandKind, Symbol, SymbolKind, VariableBounds};
pub use vartable::{TempAllocator, VariableTable};

use hyperdbg_lexer::NameResolver;

/// Bridges the symbol resolver (§4.3) into the lexer's eager `!`-rewrite
/// callback (§4.1 implementation note), so `compile`'s caller only has to
/// hand over a `SymbolResolver` rather than implement `NameResolver` itself.
impl NameResolver for hyperdbg_symbols::SymbolResolver {
    fn resolve(&self, spelling: &str) -> Option<u64> {
        self.name_to_address(spelling)
    }
}

/// Compiles source text into a flat symbol stream against the given variable
/// capacity bounds, using `resolver` to eagerly fold `!`-qualified
/// identifiers to addresses at lex time.
pub fn compile(
    source: &str,
    resolver: &dyn NameResolver,
    bounds: VariableBounds,
) -> Result<CompiledScript, ParseError> {
    Parser::with_resolver(source, resolver, bounds).compile()
}

/// Compiles with default bounds and no module resolver; any `!`-qualified
/// identifier in `source` is then reported as undefined.
pub fn compile_default(source: &str) -> Result<CompiledScript, ParseError> {
    Parser::new(source, VariableBounds::default()).compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_ops(script: &CompiledScript) -> Vec<OpCode> {
        script
            .symbol_stream
            .iter()
            .filter_map(|s| match s.kind {
                SymbolKind::Operator(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn compiles_decimal_arithmetic_expression() {
        let script = compile_default("0n10 + 0n5;").unwrap();
        assert_eq!(decode_ops(&script), vec![OpCode::Add]);
    }

    #[test]
    fn compiles_hex_default_literal() {
        let script = compile_default("1234;").unwrap();
        let first = script.symbol_stream[0];
        match first.kind {
            SymbolKind::Operand(OperandKind::Num) => assert_eq!(first.value, 0x1234),
            other => panic!("expected Num operand, got {:?}", other),
        }
    }

    #[test]
    fn compiles_if_else_with_correct_jump_targets() {
        let script = compile_default("if (@rax == 0n1) { @rbx = 0n2; } else { @rbx = 0n3; }").unwrap();
        let ops = decode_ops(&script);
        assert!(ops.contains(&OpCode::CmpEq));
        assert!(ops.contains(&OpCode::JmpIfZero));
        assert!(ops.contains(&OpCode::Jmp));
        assert!(ops.contains(&OpCode::Mov));

        // every forward-patched jump target must be a valid in-bounds index
        for (idx, sym) in script.symbol_stream.iter().enumerate() {
            if let SymbolKind::Operator(OpCode::Jmp | OpCode::JmpIfZero | OpCode::JmpIfNotZero) = sym.kind {
                let target = script.symbol_stream[idx + 1..]
                    .iter()
                    .find(|s| matches!(s.kind, SymbolKind::Operand(OperandKind::Num)));
                if let Some(t) = target {
                    assert!((t.value as usize) <= script.symbol_stream.len());
                }
            }
        }
    }

    #[test]
    fn compiles_conditional_action_shorthand() {
        let script = compile_default("@rax == 0x1234 ? { @rbx = 0n1; }").unwrap();
        let ops = decode_ops(&script);
        assert!(ops.contains(&OpCode::CmpEq));
        assert!(ops.contains(&OpCode::JmpIfZero));
    }

    #[test]
    fn compiles_while_loop_backward_jump() {
        let script = compile_default("while (@rax < 0n10) { @rax++; }").unwrap();
        let ops = decode_ops(&script);
        assert!(ops.contains(&OpCode::CmpLt));
        assert!(ops.contains(&OpCode::Inc));
        assert!(ops.contains(&OpCode::Jmp));
    }

    #[test]
    fn printf_call_compiles_variable_argc() {
        let script = compile_default(r#"printf("hello %d", 0n1);"#).unwrap();
        let ops = decode_ops(&script);
        assert_eq!(ops, vec![OpCode::Printf]);
        assert_eq!(script.string_pool.len(), 1);
    }

    #[test]
    fn undefined_bang_identifier_errors() {
        let err = compile_default("nt!DoesNotExist = 0n1;").unwrap_err();
        assert!(matches!(err, ParseError::UndefinedIdentifier { .. }));
    }

    #[test]
    fn unknown_function_call_errors() {
        let err = compile_default("totally_unknown_fn(0n1);").unwrap_err();
        assert!(matches!(err, ParseError::UnknownOperator { .. }));
    }

    #[test]
    fn repeated_global_name_reuses_slot() {
        let script = compile_default(".foo = 0n1; .foo = 0n2;").unwrap();
        let global_operands: Vec<u64> = script
            .symbol_stream
            .iter()
            .filter_map(|s| match s.kind {
                SymbolKind::Operand(OperandKind::GlobalId) => Some(s.value),
                _ => None,
            })
            .collect();
        assert!(global_operands.iter().all(|&v| v == global_operands[0]));
    }

    #[test]
    fn for_loop_splices_post_expression_after_body() {
        let script = compile_default("for (.i = 0n0; .i < 0n3; .i++) { @rax++; }").unwrap();
        let ops = decode_ops(&script);
        assert!(ops.contains(&OpCode::CmpLt));
        assert!(ops.contains(&OpCode::Inc));
        assert!(ops.contains(&OpCode::Jmp));
    }
}
