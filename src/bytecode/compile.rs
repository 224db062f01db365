use tracing::{debug, trace};

use crate::bytecode::code::ByteCode;
use crate::bytecode::compile_error::{CompileError, SyntaxError};
use crate::bytecode::op::{Instr, Slot};
use crate::frontend::lexer::{Lexer, Span, Spanned};
use crate::frontend::token::Token;

/// Static kind of a compiled expression.
///
/// Only used to choose between the integer and float opcode families; the VM
/// still checks tags at run time. Parameters and call results are always
/// `Integer`, so arithmetic on a float argument or a float-returning call
/// emits integer opcodes and fails with a tag mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
}

impl ValueKind {
    fn join(self, other: ValueKind) -> ValueKind {
        if self == ValueKind::Float || other == ValueKind::Float {
            ValueKind::Float
        } else {
            ValueKind::Integer
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Created by `ident = expr`.
    Local,
    /// Declared in a `func (...)` parameter list.
    Param,
}

/// One named binding.
#[derive(Debug, Clone)]
struct Item {
    kind: ItemKind,
    ident: String,
    /// Frame-relative slot.
    slot: usize,
    value_kind: ValueKind,
}

/// Compile-time lexical scope.
#[derive(Debug, Default)]
struct Scope {
    items: Vec<Item>,
    /// Values the code compiled so far in this scope keeps above the frame base.
    stack_size: usize,
}

impl Scope {
    fn find(&self, ident: &str) -> Option<&Item> {
        // newest binding wins
        self.items.iter().rev().find(|item| item.ident == ident)
    }
}

/// Single-pass recursive-descent compiler.
///
/// Parsing and code generation are interleaved; there is no AST. Grammar:
///
/// ```text
/// program   := sep* exprList sep*
/// exprList  := expr ( sep+ expr )*
/// expr      := term
/// term      := factor ( ('+' | '-') factor )*
/// factor    := call ( ('*' | '/') call )*
/// call      := val ( '(' args ')' )*
/// val       := INTEGER | FLOAT | '(' expr ')'
///            | 'func' '(' params ')' '{' exprList '}'
///            | IDENT '=' expr
///            | IDENT
/// ```
pub struct Compiler {
    lexer: Lexer,
    code: Vec<u8>,
    /// Most recently read token.
    tok: Spanned,
    /// Innermost scope.
    scope: Scope,
    /// Enclosing scopes, outermost first.
    enclosing: Vec<Scope>,
}

impl Compiler {
    pub fn new(source: &str) -> Self {
        Self {
            lexer: Lexer::new(source),
            code: Vec::new(),
            tok: Spanned {
                token: Token::Eof,
                span: Span { line: 1, col: 1 },
            },
            scope: Scope::default(),
            enclosing: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<ByteCode, CompileError> {
        self.skip_separators()?;
        self.read_expr_list(&Token::Eof)?;
        debug!(bytes = self.code.len(), "compiled program");
        Ok(ByteCode::new(self.code))
    }

    // Tokens

    fn read_token(&mut self) -> Result<(), CompileError> {
        self.tok = self.lexer.read_token()?;
        Ok(())
    }

    fn unread_token(&mut self) -> Result<(), CompileError> {
        self.lexer.unread_token(self.tok.clone())?;
        Ok(())
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), CompileError> {
        self.read_token()?;
        if self.tok.token != token {
            return Err(self.unexpected_token(expected));
        }
        Ok(())
    }

    fn skip_separators(&mut self) -> Result<(), CompileError> {
        loop {
            self.read_token()?;
            if !self.tok.token.is_separator() {
                return self.unread_token();
            }
        }
    }

    fn unexpected_token(&self, expected: &str) -> CompileError {
        SyntaxError {
            message: format!("unexpected token '{}', {} expected", self.tok.token, expected),
            line: self.tok.span.line,
            col: self.tok.span.col,
        }
        .into()
    }

    // Grammar

    /// Compiles statements up to `terminator`, which is consumed.
    ///
    /// Every statement but the last is followed by a `drop`, so exactly one
    /// value survives the list.
    fn read_expr_list(&mut self, terminator: &Token) -> Result<(), CompileError> {
        self.read_expr()?;
        loop {
            self.read_token()?;
            if self.tok.token == *terminator {
                return Ok(());
            }
            if !self.tok.token.is_separator() {
                let expected = format!("';', newline or '{}'", terminator);
                return Err(self.unexpected_token(&expected));
            }
            self.skip_separators()?;

            self.read_token()?;
            if self.tok.token == *terminator {
                return Ok(());
            }
            self.unread_token()?;

            self.emit(Instr::Drop);
            self.read_expr()?;
        }
    }

    fn read_expr(&mut self) -> Result<ValueKind, CompileError> {
        self.read_term()
    }

    fn read_term(&mut self) -> Result<ValueKind, CompileError> {
        let mut kind = self.read_factor()?;
        loop {
            self.read_token()?;
            let (int_op, float_op) = match self.tok.token {
                Token::Plus => (Instr::AddI, Instr::AddF),
                Token::Minus => (Instr::SubI, Instr::SubF),
                _ => {
                    self.unread_token()?;
                    return Ok(kind);
                }
            };
            kind = kind.join(self.read_factor()?);
            self.emit_arith(kind, int_op, float_op);
        }
    }

    fn read_factor(&mut self) -> Result<ValueKind, CompileError> {
        let mut kind = self.read_call()?;
        loop {
            self.read_token()?;
            let (int_op, float_op) = match self.tok.token {
                Token::Star => (Instr::MulI, Instr::MulF),
                Token::Slash => (Instr::DivI, Instr::DivF),
                _ => {
                    self.unread_token()?;
                    return Ok(kind);
                }
            };
            kind = kind.join(self.read_call()?);
            self.emit_arith(kind, int_op, float_op);
        }
    }

    fn read_call(&mut self) -> Result<ValueKind, CompileError> {
        let mut kind = self.read_val()?;
        loop {
            self.read_token()?;
            if self.tok.token != Token::LParen {
                self.unread_token()?;
                return Ok(kind);
            }
            let argc = self.read_args()?;
            self.emit(Instr::Call(argc));
            // the callee's result kind is unknown here
            kind = ValueKind::Integer;
        }
    }

    /// Compiles call arguments after `(` up to and including `)`.
    fn read_args(&mut self) -> Result<usize, CompileError> {
        self.read_token()?;
        if self.tok.token == Token::RParen {
            return Ok(0);
        }
        self.unread_token()?;

        let mut argc = 0;
        loop {
            self.read_expr()?;
            argc += 1;
            self.read_token()?;
            match self.tok.token {
                Token::Comma => continue,
                Token::RParen => return Ok(argc),
                _ => return Err(self.unexpected_token("',' or ')'")),
            }
        }
    }

    fn read_val(&mut self) -> Result<ValueKind, CompileError> {
        self.read_token()?;
        match self.tok.token.clone() {
            Token::Integer(n) => {
                self.emit(Instr::PushInt(n));
                Ok(ValueKind::Integer)
            }
            Token::Float(x) => {
                self.emit(Instr::PushFloat(x));
                Ok(ValueKind::Float)
            }
            Token::LParen => {
                let kind = self.read_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(kind)
            }
            Token::Func => {
                self.read_func()?;
                Ok(ValueKind::Integer)
            }
            Token::Ident(ident) => {
                let span = self.tok.span;
                self.read_token()?;
                if self.tok.token == Token::Assign {
                    // the value stays as the binding and a copy is the
                    // expression's result; inside a larger expression an
                    // operator may consume both
                    let kind = self.read_expr()?;
                    self.bind_local(ident, kind);
                    self.emit(Instr::Dup);
                    Ok(kind)
                } else {
                    self.unread_token()?;
                    self.read_variable(&ident, span)
                }
            }
            _ => Err(self.unexpected_token("value")),
        }
    }

    fn read_variable(&mut self, ident: &str, span: Span) -> Result<ValueKind, CompileError> {
        let (slot, kind) = if let Some(item) = self.scope.find(ident) {
            trace!(ident, kind = ?item.kind, slot = item.slot, "resolved binding");
            (item.slot, item.value_kind)
        } else if self.enclosing.iter().rev().any(|scope| scope.find(ident).is_some()) {
            return Err(CompileError::capture(ident, span));
        } else {
            return Err(CompileError::unknown_identifier(ident, span));
        };

        self.emit(Instr::Get(Slot::FrameRelative(slot)));
        Ok(kind)
    }

    /// Compiles a function literal after the `func` keyword.
    ///
    /// Layout: `pushi entry; jump end; entry: body; ret; end:`. The value of
    /// the literal is its entry address.
    fn read_func(&mut self) -> Result<(), CompileError> {
        let entry = self.code.len()
            + Instr::PushInt(0).encoded_len()
            + Instr::Jump(0).encoded_len();
        self.emit(Instr::PushInt(entry as i64));
        let patch_at = self.code.len() + 1;
        self.emit(Instr::Jump(0));

        self.expect(Token::LParen, "'('")?;
        let params = self.read_params()?;
        self.expect(Token::LBrace, "'{'")?;

        self.push_scope(params);
        self.skip_separators()?;
        self.read_expr_list(&Token::RBrace)?;
        self.emit(Instr::Return);
        self.pop_scope();

        let end = self.code.len();
        self.patch_word(patch_at, end as i64);
        Ok(())
    }

    /// Parameter names after `(` up to and including `)`.
    fn read_params(&mut self) -> Result<Vec<String>, CompileError> {
        let mut params = Vec::new();
        self.read_token()?;
        if self.tok.token == Token::RParen {
            return Ok(params);
        }
        loop {
            match &self.tok.token {
                Token::Ident(name) => params.push(name.clone()),
                _ => return Err(self.unexpected_token("identifier")),
            }
            self.read_token()?;
            match self.tok.token {
                Token::Comma => self.read_token()?,
                Token::RParen => return Ok(params),
                _ => return Err(self.unexpected_token("',' or ')'")),
            }
        }
    }

    // Scopes

    fn push_scope(&mut self, params: Vec<String>) {
        let items: Vec<Item> = params
            .into_iter()
            .enumerate()
            .map(|(pos, ident)| Item {
                kind: ItemKind::Param,
                ident,
                slot: pos,
                value_kind: ValueKind::Integer,
            })
            .collect();
        let scope = Scope {
            stack_size: items.len(),
            items,
        };
        let outer = std::mem::replace(&mut self.scope, scope);
        self.enclosing.push(outer);
    }

    fn pop_scope(&mut self) {
        if let Some(outer) = self.enclosing.pop() {
            self.scope = outer;
        }
    }

    /// Binds `ident` to the value currently on top of the stack.
    fn bind_local(&mut self, ident: String, value_kind: ValueKind) {
        let slot = self.scope.stack_size - 1;
        self.scope.items.push(Item {
            kind: ItemKind::Local,
            ident,
            slot,
            value_kind,
        });
    }

    // Emission

    fn emit(&mut self, instr: Instr) {
        instr.encode(&mut self.code);

        let size = &mut self.scope.stack_size;
        match instr {
            Instr::PushInt(_) | Instr::PushFloat(_) | Instr::Dup | Instr::Over | Instr::Get(_) => {
                *size += 1
            }
            Instr::Drop
            | Instr::AddI
            | Instr::SubI
            | Instr::MulI
            | Instr::DivI
            | Instr::AddF
            | Instr::SubF
            | Instr::MulF
            | Instr::DivF => *size -= 1,
            Instr::Call(argc) => *size -= argc,
            Instr::Swap
            | Instr::Rot
            | Instr::SetInt(..)
            | Instr::SetFloat(..)
            | Instr::Return
            | Instr::Jump(_) => {}
        }
    }

    fn emit_arith(&mut self, kind: ValueKind, int_op: Instr, float_op: Instr) {
        match kind {
            ValueKind::Integer => self.emit(int_op),
            ValueKind::Float => self.emit(float_op),
        }
    }

    fn patch_word(&mut self, at: usize, value: i64) {
        self.code[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disasm::decode_all;

    fn instrs(source: &str) -> Vec<Instr> {
        let code = Compiler::new(source).compile().expect("compile should succeed");
        decode_all(&code)
            .expect("compiler output should decode")
            .into_iter()
            .map(|(_, instr)| instr)
            .collect()
    }

    fn compile_error(source: &str) -> CompileError {
        match Compiler::new(source).compile() {
            Ok(code) => panic!("expected compile error, got {} bytes", code.len()),
            Err(e) => e,
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            instrs("1 + 2 * 3"),
            vec![
                Instr::PushInt(1),
                Instr::PushInt(2),
                Instr::PushInt(3),
                Instr::MulI,
                Instr::AddI
            ]
        );
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            instrs("8 - 2 - 1"),
            vec![
                Instr::PushInt(8),
                Instr::PushInt(2),
                Instr::SubI,
                Instr::PushInt(1),
                Instr::SubI
            ]
        );
    }

    #[test]
    fn test_grouping() {
        assert_eq!(
            instrs("(1 + 2) * 3"),
            vec![
                Instr::PushInt(1),
                Instr::PushInt(2),
                Instr::AddI,
                Instr::PushInt(3),
                Instr::MulI
            ]
        );
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(
            instrs("\n1 ;; \n ; 2;\n"),
            vec![Instr::PushInt(1), Instr::Drop, Instr::PushInt(2)]
        );
    }

    #[test]
    fn test_assignment_binds_top_and_dups() {
        assert_eq!(
            instrs("x = 7; x + 2; y = 8; x + y"),
            vec![
                Instr::PushInt(7),
                Instr::Dup,
                Instr::Drop,
                Instr::Get(Slot::FrameRelative(0)),
                Instr::PushInt(2),
                Instr::AddI,
                Instr::Drop,
                Instr::PushInt(8),
                Instr::Dup,
                Instr::Drop,
                Instr::Get(Slot::FrameRelative(0)),
                Instr::Get(Slot::FrameRelative(1)),
                Instr::AddI
            ]
        );
    }

    #[test]
    fn test_shadowing_uses_newest_binding() {
        let code = instrs("x = 1; x = 2; x");
        assert_eq!(code.last(), Some(&Instr::Get(Slot::FrameRelative(1))));
    }

    #[test]
    fn test_float_ops_selected() {
        assert_eq!(
            instrs("1.5 * 2.0 + 1"),
            vec![
                Instr::PushFloat(1.5),
                Instr::PushFloat(2.0),
                Instr::MulF,
                Instr::PushInt(1),
                Instr::AddF
            ]
        );
        assert_eq!(instrs("f = 0.5; f / f").last(), Some(&Instr::DivF));
    }

    #[test]
    fn test_function_literal_layout() {
        assert_eq!(
            instrs("func(a, b) { a - b }"),
            vec![
                Instr::PushInt(18),
                Instr::Jump(38),
                Instr::Get(Slot::FrameRelative(0)),
                Instr::Get(Slot::FrameRelative(1)),
                Instr::SubI,
                Instr::Return
            ]
        );
    }

    #[test]
    fn test_function_locals_follow_params() {
        let code = instrs("func(a) {\n t = a * 2\n t + a\n}");
        assert_eq!(
            &code[2..],
            &[
                Instr::Get(Slot::FrameRelative(0)),
                Instr::PushInt(2),
                Instr::MulI,
                Instr::Dup,
                Instr::Drop,
                Instr::Get(Slot::FrameRelative(1)),
                Instr::Get(Slot::FrameRelative(0)),
                Instr::AddI,
                Instr::Return
            ]
        );
    }

    #[test]
    fn test_call() {
        assert_eq!(
            instrs("f = func() { 1 }; f(2, 3)")[6..].to_vec(),
            vec![
                Instr::Get(Slot::FrameRelative(0)),
                Instr::PushInt(2),
                Instr::PushInt(3),
                Instr::Call(2)
            ]
        );
    }

    #[test]
    fn test_call_keeps_slot_accounting() {
        // after f(1) the stack holds f and the call result; y binds the latter
        let code = instrs("f = func(a) { a }; y = f(1); y");
        assert_eq!(code.last(), Some(&Instr::Get(Slot::FrameRelative(1))));
    }

    #[test]
    fn test_unknown_identifier() {
        let err = compile_error("x = 1\ny + x");
        assert_eq!(
            err,
            CompileError::UnknownIdentifier {
                name: "y".to_string(),
                line: 2,
                col: 1
            }
        );
        assert!(err.to_string().contains("'y'"));
    }

    #[test]
    fn test_capture_rejected() {
        let err = compile_error("x = 1; func() { x }");
        assert!(matches!(err, CompileError::Capture { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_params_not_visible_outside() {
        let err = compile_error("func(a) { a }; a");
        assert!(matches!(err, CompileError::UnknownIdentifier { .. }));
    }

    #[test]
    fn test_unexpected_token() {
        let err = compile_error("1 + )");
        assert_eq!(err.position(), (1, 5));
        assert!(err.to_string().contains("value expected"));
    }

    #[test]
    fn test_missing_separator() {
        let err = compile_error("1 2");
        assert!(err.to_string().contains("';', newline or 'EOF' expected"));
    }

    #[test]
    fn test_unclosed_function_body() {
        let err = compile_error("func(a) { a");
        assert!(err.to_string().contains("'}'"));
    }

    #[test]
    fn test_equality_is_not_an_operator() {
        assert!(matches!(
            compile_error("1 == 1"),
            CompileError::Syntax(_)
        ));
    }

    #[test]
    fn test_lexical_error_propagates() {
        let err = compile_error("1 + $");
        assert!(matches!(err, CompileError::Lex(_)));
        assert_eq!(err.position(), (1, 5));
    }

    #[test]
    fn test_empty_program_rejected() {
        assert!(matches!(compile_error("\n\n"), CompileError::Syntax(_)));
    }
}
