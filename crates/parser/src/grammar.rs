use hyperdbg_lexer::{NameResolver, NullResolver, SourcePos, Token, TokenKind};

use crate::builtins::builtin_opcode;
use crate::error::ParseError;
use crate::regid;
use crate::symbol::{CompiledScript, OpCode, OperandKind, Symbol, VariableBounds};
use crate::vartable::{TempAllocator, VariableTable};

/// Recursive-descent parser with standard C-family precedence climbing.
/// Produces a flat symbol stream; see `OpCode::fixed_arity` for the operand
/// layout emitted after each operator.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    vars: VariableTable,
    temps: TempAllocator,
    stream: Vec<Symbol>,
    strings: Vec<String>,
    bounds: VariableBounds,
}

impl Parser {
    pub fn new(source: &str, bounds: VariableBounds) -> Self {
        Self::with_resolver(source, &NullResolver, bounds)
    }

    pub fn with_resolver(source: &str, resolver: &dyn NameResolver, bounds: VariableBounds) -> Self {
        let tokens = hyperdbg_lexer::lex_all_with_resolver(source, resolver);
        Self {
            tokens,
            pos: 0,
            vars: VariableTable::new(bounds.global_slots, bounds.local_slots),
            temps: TempAllocator::new(bounds.temp_slots),
            stream: Vec::new(),
            strings: Vec::new(),
            bounds,
        }
    }

    pub fn compile(mut self) -> Result<CompiledScript, ParseError> {
        while !self.at_end() {
            self.parse_statement()?;
        }
        Ok(CompiledScript {
            symbol_stream: self.stream,
            entry_offset: 0,
            variable_bounds: self.bounds,
            string_pool: self.strings,
        })
    }

    // --- token plumbing -----------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_end(&self) -> bool {
        self.current().kind == TokenKind::EndOfStream
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn pos_now(&self) -> SourcePos {
        self.current().pos
    }

    fn is_special(&self, s: &str) -> bool {
        let t = self.current();
        t.kind == TokenKind::Special && t.value == s
    }

    fn is_keyword(&self, s: &str) -> bool {
        let t = self.current();
        t.kind == TokenKind::Keyword && t.value.eq_ignore_ascii_case(s)
    }

    fn eat_special(&mut self, s: &str) -> Result<(), ParseError> {
        if self.is_special(s) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::syntax(
                self.pos_now(),
                format!("expected '{}', found '{}'", s, self.current().value),
            ))
        }
    }

    fn eat_keyword(&mut self, s: &str) -> Result<(), ParseError> {
        if self.is_keyword(s) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::syntax(
                self.pos_now(),
                format!("expected keyword '{}', found '{}'", s, self.current().value),
            ))
        }
    }

    // --- stream emission ------------------------------------------------

    fn push(&mut self, sym: Symbol) -> usize {
        let idx = self.stream.len();
        self.stream.push(sym);
        idx
    }

    fn here(&self) -> u64 {
        self.stream.len() as u64
    }

    fn patch(&mut self, idx: usize, target: u64) {
        self.stream[idx].value = target;
    }

    fn free_if_temp(&mut self, sym: Symbol) {
        if let crate::symbol::SymbolKind::Operand(OperandKind::Temp) = sym.kind {
            self.temps.free_temp(sym.value as u32);
        }
    }

    fn new_temp_operand(&mut self) -> Result<Symbol, ParseError> {
        let slot = self.temps.new_temp()?;
        Ok(Symbol::operand(OperandKind::Temp, slot as u64))
    }

    fn emit_binary(&mut self, op: OpCode, lhs: Symbol, rhs: Symbol) -> Result<Symbol, ParseError> {
        let dest = self.new_temp_operand()?;
        self.push(Symbol::operator(op));
        self.push(lhs);
        self.push(rhs);
        self.push(dest);
        self.free_if_temp(lhs);
        self.free_if_temp(rhs);
        Ok(dest)
    }

    fn emit_unary(&mut self, op: OpCode, operand: Symbol) -> Result<Symbol, ParseError> {
        let dest = self.new_temp_operand()?;
        self.push(Symbol::operator(op));
        self.push(operand);
        self.push(dest);
        self.free_if_temp(operand);
        Ok(dest)
    }

    fn emit_mov(&mut self, dest: Symbol, src: Symbol) {
        self.push(Symbol::operator(OpCode::Mov));
        self.push(src);
        self.push(dest);
        self.free_if_temp(src);
    }

    // --- statements -------------------------------------------------------

    fn parse_statement(&mut self) -> Result<(), ParseError> {
        if self.is_special(";") {
            self.advance();
            return Ok(());
        }
        if self.is_special("{") {
            return self.parse_block();
        }
        if self.is_keyword("if") {
            return self.parse_if();
        }
        if self.is_keyword("while") {
            return self.parse_while();
        }
        if self.is_keyword("do") {
            return self.parse_do_while();
        }
        if self.is_keyword("for") {
            return self.parse_for();
        }

        // bare expression statement, optionally followed by HyperDbg's
        // `cond ? { action }` conditional-action shorthand.
        let value = self.parse_expression()?;
        if self.is_special("?") {
            self.advance();
            self.push(Symbol::operator(OpCode::JmpIfZero));
            self.push(value);
            let patch_idx = self.push(Symbol::operand(OperandKind::Num, 0));
            self.free_if_temp(value);
            self.parse_block()?;
            let target = self.here();
            self.patch(patch_idx, target);
            return Ok(());
        }
        self.free_if_temp(value);
        self.eat_special(";")?;
        Ok(())
    }

    fn parse_block(&mut self) -> Result<(), ParseError> {
        self.eat_special("{")?;
        while !self.is_special("}") {
            if self.at_end() {
                return Err(ParseError::syntax(self.pos_now(), "unterminated block"));
            }
            self.parse_statement()?;
        }
        self.eat_special("}")?;
        Ok(())
    }

    /// A statement position that accepts either a `{}` block or a single
    /// bare statement, matching C's dangling-else-friendly grammar.
    fn parse_block_or_single(&mut self) -> Result<(), ParseError> {
        if self.is_special("{") {
            self.parse_block()
        } else {
            self.parse_statement()
        }
    }

    fn parse_if(&mut self) -> Result<(), ParseError> {
        self.eat_keyword("if")?;
        self.eat_special("(")?;
        let cond = self.parse_expression()?;
        self.eat_special(")")?;

        self.push(Symbol::operator(OpCode::JmpIfZero));
        self.push(cond);
        let false_patch = self.push(Symbol::operand(OperandKind::Num, 0));
        self.free_if_temp(cond);

        self.parse_block_or_single()?;

        if self.is_keyword("else") {
            self.advance();
            self.push(Symbol::operator(OpCode::Jmp));
            let end_patch = self.push(Symbol::operand(OperandKind::Num, 0));
            let else_start = self.here();
            self.patch(false_patch, else_start);
            self.parse_block_or_single()?;
            let end = self.here();
            self.patch(end_patch, end);
        } else {
            let end = self.here();
            self.patch(false_patch, end);
        }
        Ok(())
    }

    fn parse_while(&mut self) -> Result<(), ParseError> {
        self.eat_keyword("while")?;
        let loop_start = self.here();
        self.eat_special("(")?;
        let cond = self.parse_expression()?;
        self.eat_special(")")?;

        self.push(Symbol::operator(OpCode::JmpIfZero));
        self.push(cond);
        let exit_patch = self.push(Symbol::operand(OperandKind::Num, 0));
        self.free_if_temp(cond);

        self.parse_block_or_single()?;

        self.push(Symbol::operator(OpCode::Jmp));
        self.push(Symbol::operand(OperandKind::Num, loop_start));

        let exit = self.here();
        self.patch(exit_patch, exit);
        Ok(())
    }

    fn parse_do_while(&mut self) -> Result<(), ParseError> {
        self.eat_keyword("do")?;
        let loop_start = self.here();
        self.parse_block_or_single()?;
        self.eat_keyword("while")?;
        self.eat_special("(")?;
        let cond = self.parse_expression()?;
        self.eat_special(")")?;
        self.eat_special(";")?;

        self.push(Symbol::operator(OpCode::JmpIfNotZero));
        self.push(cond);
        self.push(Symbol::operand(OperandKind::Num, loop_start));
        self.free_if_temp(cond);
        Ok(())
    }

    fn parse_for(&mut self) -> Result<(), ParseError> {
        self.eat_keyword("for")?;
        self.eat_special("(")?;
        if !self.is_special(";") {
            let init = self.parse_expression()?;
            self.free_if_temp(init);
        }
        self.eat_special(";")?;

        let loop_start = self.here();
        let mut exit_patch = None;
        if !self.is_special(";") {
            let cond = self.parse_expression()?;
            self.push(Symbol::operator(OpCode::JmpIfZero));
            self.push(cond);
            exit_patch = Some(self.push(Symbol::operand(OperandKind::Num, 0)));
            self.free_if_temp(cond);
        }
        self.eat_special(";")?;

        // The post-expression is parsed here but must execute *after* the
        // body, so its symbols are emitted into a side buffer and spliced in.
        let saved_stream_len = self.stream.len();
        let mut post_symbols: Vec<Symbol> = Vec::new();
        if !self.is_special(")") {
            let post = self.parse_expression()?;
            self.free_if_temp(post);
            post_symbols = self.stream.split_off(saved_stream_len);
        }
        self.eat_special(")")?;

        self.parse_block_or_single()?;

        // splice the post-expression in after the body, before the backward jump
        self.stream.extend(post_symbols);

        self.push(Symbol::operator(OpCode::Jmp));
        self.push(Symbol::operand(OperandKind::Num, loop_start));

        let exit = self.here();
        if let Some(idx) = exit_patch {
            self.patch(idx, exit);
        }
        Ok(())
    }

    // --- expressions (precedence climbing) --------------------------------

    fn parse_expression(&mut self) -> Result<Symbol, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Symbol, ParseError> {
        let lhs_start = self.pos;
        let lhs = self.parse_logical_or()?;

        let compound_op = if self.is_special("=") {
            None
        } else if self.is_special("+=") {
            Some(OpCode::Add)
        } else if self.is_special("-=") {
            Some(OpCode::Sub)
        } else if self.is_special("*=") {
            Some(OpCode::Mul)
        } else if self.is_special("/=") {
            Some(OpCode::Div)
        } else {
            return Ok(lhs);
        };

        // Re-resolve the left side as a write target; it must have parsed as
        // a bare identifier/register for assignment to make sense.
        if !lhs.kind_is_writable() {
            return Err(ParseError::syntax(
                self.pos_now(),
                "left-hand side of assignment is not assignable",
            ));
        }
        let _ = lhs_start;
        self.advance(); // consume '=' / '+=' / ...
        let rhs = self.parse_assignment()?;

        match compound_op {
            None => {
                self.emit_mov(lhs, rhs);
            }
            Some(op) => {
                let combined = self.emit_binary(op, lhs, rhs)?;
                self.emit_mov(lhs, combined);
            }
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while self.is_special("||") {
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = self.emit_binary(OpCode::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_bit_or()?;
        while self.is_special("&&") {
            self.advance();
            let rhs = self.parse_bit_or()?;
            lhs = self.emit_binary(OpCode::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_bit_xor()?;
        while self.is_special("|") {
            self.advance();
            let rhs = self.parse_bit_xor()?;
            lhs = self.emit_binary(OpCode::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_bit_and()?;
        while self.is_special("^") {
            self.advance();
            let rhs = self.parse_bit_and()?;
            lhs = self.emit_binary(OpCode::Xor, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.is_special("&") {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = self.emit_binary(OpCode::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.is_special("==") {
                OpCode::CmpEq
            } else if self.is_special("!=") {
                OpCode::CmpNeq
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = self.emit_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = if self.is_special("<") {
                OpCode::CmpLt
            } else if self.is_special("<=") {
                OpCode::CmpLte
            } else if self.is_special(">") {
                OpCode::CmpGt
            } else if self.is_special(">=") {
                OpCode::CmpGte
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = self.emit_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.is_special("<<") {
                OpCode::Asl
            } else if self.is_special(">>") {
                OpCode::Asr
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = self.emit_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.is_special("+") {
                OpCode::Add
            } else if self.is_special("-") {
                OpCode::Sub
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.emit_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Symbol, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.is_special("*") {
                OpCode::Mul
            } else if self.is_special("/") {
                OpCode::Div
            } else if self.is_special("%") {
                OpCode::Mod
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.emit_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Symbol, ParseError> {
        if self.is_special("-") {
            self.advance();
            let operand = self.parse_unary()?;
            return self.emit_unary(OpCode::Neg, operand);
        }
        if self.is_special("~") {
            self.advance();
            let operand = self.parse_unary()?;
            return self.emit_unary(OpCode::Not, operand);
        }
        if self.is_special("!") {
            self.advance();
            let operand = self.parse_unary()?;
            return self.emit_binary(OpCode::CmpEq, operand, Symbol::operand(OperandKind::Num, 0));
        }
        if self.is_special("++") {
            self.advance();
            let target = self.parse_unary()?;
            return self.emit_in_place(OpCode::Inc, target);
        }
        if self.is_special("--") {
            self.advance();
            let target = self.parse_unary()?;
            return self.emit_in_place(OpCode::Dec, target);
        }
        self.parse_postfix()
    }

    fn emit_in_place(&mut self, op: OpCode, target: Symbol) -> Result<Symbol, ParseError> {
        if !target.kind_is_writable() {
            return Err(ParseError::syntax(self.pos_now(), "++/-- target is not assignable"));
        }
        self.push(Symbol::operator(op));
        self.push(target);
        self.push(target);
        Ok(target)
    }

    fn parse_postfix(&mut self) -> Result<Symbol, ParseError> {
        let mut value = self.parse_primary()?;
        loop {
            if self.is_special("++") {
                self.advance();
                value = self.emit_in_place(OpCode::Inc, value)?;
            } else if self.is_special("--") {
                self.advance();
                value = self.emit_in_place(OpCode::Dec, value)?;
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_primary(&mut self) -> Result<Symbol, ParseError> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Hex => {
                self.advance();
                self.numeric_operand(&tok.value, 16)
            }
            TokenKind::Octal => {
                self.advance();
                self.numeric_operand(&tok.value, 8)
            }
            TokenKind::Decimal => {
                self.advance();
                self.numeric_operand(&tok.value, 10)
            }
            TokenKind::Binary => {
                self.advance();
                self.numeric_operand(&tok.value, 2)
            }
            TokenKind::String => {
                self.advance();
                let idx = self.strings.len();
                self.strings.push(tok.value.clone());
                Ok(Symbol::operand(OperandKind::StringRef, idx as u64))
            }
            TokenKind::Register => {
                self.advance();
                let id = regid::name_to_id(&tok.value).ok_or_else(|| {
                    ParseError::syntax(tok.pos, format!("unknown register '{}'", tok.value))
                })?;
                Ok(Symbol::operand(OperandKind::Register, id as u64))
            }
            TokenKind::PseudoRegister => {
                self.advance();
                let id = regid::pseudo_name_to_id(&tok.value).ok_or_else(|| {
                    ParseError::syntax(tok.pos, format!("unknown pseudo-register '{}'", tok.value))
                })?;
                Ok(Symbol::operand(OperandKind::PseudoRegister, id as u64))
            }
            TokenKind::Keyword => self.parse_call(&tok),
            TokenKind::UnresolvedGlobalId | TokenKind::UnresolvedLocalId => {
                self.parse_identifier_or_call(&tok)
            }
            TokenKind::Special if tok.value == "(" => {
                self.advance();
                let inner = self.parse_expression()?;
                self.eat_special(")")?;
                Ok(inner)
            }
            _ => Err(ParseError::syntax(
                tok.pos,
                format!("unexpected token '{}'", tok.value),
            )),
        }
    }

    fn numeric_operand(&mut self, digits: &str, radix: u32) -> Result<Symbol, ParseError> {
        let value = if digits.is_empty() {
            0
        } else {
            u64::from_str_radix(digits, radix).map_err(|_| {
                ParseError::syntax(self.pos_now(), format!("invalid numeric literal '{}'", digits))
            })?
        };
        Ok(Symbol::operand(OperandKind::Num, value))
    }

    fn parse_identifier_or_call(&mut self, tok: &Token) -> Result<Symbol, ParseError> {
        if tok.value.contains('!') {
            return Err(ParseError::UndefinedIdentifier {
                name: tok.value.clone(),
                line: tok.pos.line,
            });
        }

        self.advance();
        if self.is_special("(") {
            return self.parse_call(tok);
        }

        let name = tok.value.trim_start_matches('.');
        if tok.kind == TokenKind::UnresolvedGlobalId {
            let slot = self.vars.global_slot(name)?;
            Ok(Symbol::operand(OperandKind::GlobalId, slot as u64))
        } else {
            let slot = self.vars.local_slot(name)?;
            Ok(Symbol::operand(OperandKind::LocalId, slot as u64))
        }
    }

    fn parse_call(&mut self, tok: &Token) -> Result<Symbol, ParseError> {
        let Some(op) = builtin_opcode(&tok.value) else {
            return Err(ParseError::UnknownOperator {
                name: tok.value.clone(),
                line: tok.pos.line,
            });
        };
        // `parse_identifier_or_call` already advanced past the name for
        // identifier-shaped tokens; keyword-shaped tokens (builtins spelled
        // as keywords) have not been consumed yet.
        if self.current().value == tok.value && self.current().kind == TokenKind::Keyword {
            self.advance();
        }
        self.eat_special("(")?;

        if op == OpCode::Printf {
            return self.parse_printf_call();
        }

        let (get_arity, set_arity) = op.fixed_arity();
        let mut args = Vec::with_capacity(get_arity);
        if !self.is_special(")") {
            loop {
                args.push(self.parse_assignment()?);
                if self.is_special(",") {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat_special(")")?;

        if args.len() != get_arity {
            return Err(ParseError::syntax(
                tok.pos,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    tok.value,
                    get_arity,
                    args.len()
                ),
            ));
        }

        self.push(Symbol::operator(op));
        for a in &args {
            self.push(*a);
        }
        let dest = if set_arity == 1 {
            Some(self.new_temp_operand()?)
        } else {
            None
        };
        if let Some(d) = dest {
            self.push(d);
        }
        for a in args {
            self.free_if_temp(a);
        }
        Ok(dest.unwrap_or(Symbol::operand(OperandKind::Num, 0)))
    }

    fn parse_printf_call(&mut self) -> Result<Symbol, ParseError> {
        let fmt = self.parse_assignment()?;
        let mut args = Vec::new();
        while self.is_special(",") {
            self.advance();
            args.push(self.parse_assignment()?);
        }
        self.eat_special(")")?;

        self.push(Symbol::operator(OpCode::Printf));
        self.push(fmt);
        self.push(Symbol::operand(OperandKind::Num, args.len() as u64));
        for a in &args {
            self.push(*a);
        }
        self.free_if_temp(fmt);
        for a in args {
            self.free_if_temp(a);
        }
        Ok(Symbol::operand(OperandKind::Num, 0))
    }
}

impl Symbol {
    fn kind_is_writable(self) -> bool {
        matches!(
            self.kind,
            crate::symbol::SymbolKind::Operand(k) if k.is_writable()
        )
    }
}
