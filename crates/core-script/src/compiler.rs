//! Single-pass Gza compiler: recursive-descent statements with a Pratt
//! expression core, emitting [`Op`]s directly into a [`Chunk`].
//!
//! Statement terminators are newlines or semicolons; newlines are skipped
//! freely between declarations, inside blocks and table literals. The first
//! syntax error aborts compilation; a plugin script is small enough that
//! recovery buys nothing over a precise position.

use std::rc::Rc;

use crate::chunk::{Chunk, Op};
use crate::lexer::{Lexer, Token, TokenKind, unescape};
use crate::value::{Function, Value};
use crate::{Result, ScriptError};

/// Compile `source` into the implicit top-level script function.
pub fn compile(source: &str) -> Result<Function> {
    let mut parser = Parser::new(source)?;
    parser.skip_newlines();
    while !parser.check(TokenKind::Eof) {
        parser.declaration()?;
        parser.skip_newlines();
    }
    let mut script = parser.take_function("<script>", 0);
    script.chunk.emit(Op::Nil, parser.previous.line);
    script.chunk.emit(Op::Return, parser.previous.line);
    Ok(script)
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment, // =
    Or,
    And,
    Equality,   // == !=
    Comparison, // < <= > >=
    Concat,     // ..
    Term,       // + -
    Factor,     // * / %
    Unary,      // not -
    Call,       // () [] .
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Concat,
            Precedence::Concat => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Call,
        }
    }
}

fn infix_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual => Precedence::Comparison,
        TokenKind::DotDot => Precedence::Concat,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::Dot => Precedence::Call,
        _ => Precedence::None,
    }
}

struct Local {
    name: String,
    depth: usize,
}

/// Per-function compilation state. Function declarations nest by pushing a
/// fresh state and restoring the enclosing one when the body is done.
struct FuncState {
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: usize,
}

impl FuncState {
    fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
        }
    }
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    func: FuncState,
    enclosing: Vec<FuncState>,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let first = lexer.next_token()?;
        Ok(Self {
            lexer,
            previous: first.clone(),
            current: first,
            func: FuncState::new(),
            enclosing: Vec::new(),
        })
    }

    fn take_function(&mut self, name: &str, arity: u8) -> Function {
        let state = std::mem::replace(&mut self.func, FuncState::new());
        Function {
            name: name.to_string(),
            arity,
            chunk: state.chunk,
        }
    }

    // ---------------------------------------------------------------- token plumbing

    fn advance(&mut self) -> Result<()> {
        self.previous = self.current.clone();
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> Result<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.error_at_current(&format!("expected {what}")))
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) || self.check(TokenKind::Semicolon) {
            let _ = self.advance();
        }
    }

    fn error_at_current(&self, message: &str) -> ScriptError {
        ScriptError::Parse {
            line: self.current.line,
            column: self.current.column,
            message: message.to_string(),
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        let line = self.previous.line;
        self.func.chunk.emit(op, line)
    }

    fn string_constant(&mut self, bytes: &[u8]) -> u16 {
        self.func.chunk.add_constant(Value::str_from(bytes))
    }

    // ---------------------------------------------------------------- declarations

    fn declaration(&mut self) -> Result<()> {
        if self.match_token(TokenKind::Var)? {
            self.var_declaration()
        } else if self.match_token(TokenKind::Fn)? {
            self.fn_declaration()
        } else {
            self.statement()
        }
    }

    fn var_declaration(&mut self) -> Result<()> {
        self.consume(TokenKind::Identifier, "variable name")?;
        let name = self.previous.lexeme.to_string();
        if self.match_token(TokenKind::Equal)? {
            self.expression()?;
        } else {
            self.emit(Op::Nil);
        }
        self.terminator()?;
        if self.func.scope_depth == 0 {
            let idx = self.string_constant(name.as_bytes());
            self.emit(Op::DefineGlobal(idx));
        } else {
            // The initializer value stays on the stack as the local's slot.
            self.func.locals.push(Local {
                name,
                depth: self.func.scope_depth,
            });
        }
        Ok(())
    }

    /// Function declarations always bind a global: the host looks plugin
    /// entry points up by name, and Gza has no closures to capture an
    /// enclosing scope anyway.
    fn fn_declaration(&mut self) -> Result<()> {
        self.consume(TokenKind::Identifier, "function name")?;
        let name = self.previous.lexeme.to_string();
        self.consume(TokenKind::LeftParen, "'(' after function name")?;

        self.enclosing.push(std::mem::replace(&mut self.func, FuncState::new()));
        // Function bodies compile at depth 1 so `var` inside them binds a
        // stack local, not a global.
        self.func.scope_depth = 1;
        let mut arity: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.consume(TokenKind::Identifier, "parameter name")?;
                arity += 1;
                if arity > u8::MAX as u16 {
                    return Err(self.error_at_current("too many parameters (max 255)"));
                }
                self.func.locals.push(Local {
                    name: self.previous.lexeme.to_string(),
                    depth: 1,
                });
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters")?;
        self.skip_newlines();
        self.consume(TokenKind::LeftBrace, "'{' before function body")?;
        self.block_body()?;
        let mut function = {
            let state = std::mem::replace(
                &mut self.func,
                self.enclosing.pop().expect("enclosing function state"),
            );
            Function {
                name: name.clone(),
                arity: arity as u8,
                chunk: state.chunk,
            }
        };
        function.chunk.emit(Op::Nil, self.previous.line);
        function.chunk.emit(Op::Return, self.previous.line);

        let idx = self
            .func
            .chunk
            .add_constant(Value::Function(Rc::new(function)));
        self.emit(Op::Constant(idx));
        let name_idx = self.string_constant(name.as_bytes());
        self.emit(Op::DefineGlobal(name_idx));
        Ok(())
    }

    // ---------------------------------------------------------------- statements

    fn statement(&mut self) -> Result<()> {
        if self.match_token(TokenKind::If)? {
            self.if_statement()
        } else if self.match_token(TokenKind::While)? {
            self.while_statement()
        } else if self.match_token(TokenKind::Return)? {
            self.return_statement()
        } else if self.match_token(TokenKind::LeftBrace)? {
            self.begin_scope();
            self.block_body()?;
            self.end_scope();
            Ok(())
        } else {
            self.expression()?;
            self.terminator()?;
            self.emit(Op::Pop);
            Ok(())
        }
    }

    fn if_statement(&mut self) -> Result<()> {
        self.expression()?;
        self.skip_newlines();
        self.consume(TokenKind::LeftBrace, "'{' after if condition")?;
        let else_jump = self.emit(Op::JumpIfFalse(0));
        self.emit(Op::Pop);
        self.begin_scope();
        self.block_body()?;
        self.end_scope();
        let end_jump = self.emit(Op::Jump(0));
        self.func.chunk.patch_jump(else_jump);
        self.emit(Op::Pop);
        if self.match_token(TokenKind::Else)? {
            self.skip_newlines();
            if self.match_token(TokenKind::If)? {
                self.if_statement()?;
            } else {
                self.consume(TokenKind::LeftBrace, "'{' after else")?;
                self.begin_scope();
                self.block_body()?;
                self.end_scope();
            }
        }
        self.func.chunk.patch_jump(end_jump);
        Ok(())
    }

    fn while_statement(&mut self) -> Result<()> {
        let loop_start = self.func.chunk.code.len() as u32;
        self.expression()?;
        self.skip_newlines();
        self.consume(TokenKind::LeftBrace, "'{' after while condition")?;
        let exit_jump = self.emit(Op::JumpIfFalse(0));
        self.emit(Op::Pop);
        self.begin_scope();
        self.block_body()?;
        self.end_scope();
        self.emit(Op::Jump(loop_start));
        self.func.chunk.patch_jump(exit_jump);
        self.emit(Op::Pop);
        Ok(())
    }

    fn return_statement(&mut self) -> Result<()> {
        if self.check(TokenKind::Newline)
            || self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RightBrace)
            || self.check(TokenKind::Eof)
        {
            self.emit(Op::Nil);
        } else {
            self.expression()?;
        }
        self.terminator()?;
        self.emit(Op::Return);
        Ok(())
    }

    fn block_body(&mut self) -> Result<()> {
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration()?;
            self.skip_newlines();
        }
        self.consume(TokenKind::RightBrace, "'}' after block")
    }

    fn begin_scope(&mut self) {
        self.func.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.func.scope_depth -= 1;
        while let Some(local) = self.func.locals.last() {
            if local.depth <= self.func.scope_depth {
                break;
            }
            self.func.locals.pop();
            self.emit(Op::Pop);
        }
    }

    /// A statement ends at a newline, semicolon, closing brace, or EOF.
    fn terminator(&mut self) -> Result<()> {
        if self.check(TokenKind::Newline) || self.check(TokenKind::Semicolon) {
            self.advance()
        } else if self.check(TokenKind::RightBrace) || self.check(TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error_at_current("expected end of statement"))
        }
    }

    // ---------------------------------------------------------------- expressions

    fn expression(&mut self) -> Result<()> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, precedence: Precedence) -> Result<()> {
        self.advance()?;
        let can_assign = precedence <= Precedence::Assignment;
        self.prefix(can_assign)?;
        while infix_precedence(self.current.kind) >= precedence
            && infix_precedence(self.current.kind) != Precedence::None
        {
            self.advance()?;
            self.infix(can_assign)?;
        }
        if can_assign && self.check(TokenKind::Equal) {
            return Err(self.error_at_current("invalid assignment target"));
        }
        Ok(())
    }

    fn prefix(&mut self, can_assign: bool) -> Result<()> {
        match self.previous.kind {
            TokenKind::Number => {
                let n: f64 = self
                    .previous
                    .lexeme
                    .parse()
                    .map_err(|_| self.error_at_current("malformed number"))?;
                let idx = self.func.chunk.add_constant(Value::Num(n));
                self.emit(Op::Constant(idx));
                Ok(())
            }
            TokenKind::String => {
                let bytes = unescape(self.previous.lexeme);
                let idx = self.func.chunk.add_constant(Value::str_from_owned(bytes));
                self.emit(Op::Constant(idx));
                Ok(())
            }
            TokenKind::True => {
                self.emit(Op::True);
                Ok(())
            }
            TokenKind::False => {
                self.emit(Op::False);
                Ok(())
            }
            TokenKind::Nil => {
                self.emit(Op::Nil);
                Ok(())
            }
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::LeftParen => {
                self.expression()?;
                self.consume(TokenKind::RightParen, "')' after expression")
            }
            TokenKind::LeftBracket => self.array_literal(),
            TokenKind::LeftBrace => self.table_literal(),
            TokenKind::Minus => {
                self.parse_precedence(Precedence::Unary)?;
                self.emit(Op::Negate);
                Ok(())
            }
            TokenKind::Not => {
                self.parse_precedence(Precedence::Unary)?;
                self.emit(Op::Not);
                Ok(())
            }
            _ => Err(ScriptError::Parse {
                line: self.previous.line,
                column: self.previous.column,
                message: "expected expression".to_string(),
            }),
        }
    }

    fn infix(&mut self, can_assign: bool) -> Result<()> {
        match self.previous.kind {
            TokenKind::Plus => self.binary(Precedence::Term, Op::Add),
            TokenKind::Minus => self.binary(Precedence::Term, Op::Sub),
            TokenKind::Star => self.binary(Precedence::Factor, Op::Mul),
            TokenKind::Slash => self.binary(Precedence::Factor, Op::Div),
            TokenKind::Percent => self.binary(Precedence::Factor, Op::Rem),
            TokenKind::DotDot => self.binary(Precedence::Concat, Op::Concat),
            TokenKind::EqualEqual => self.binary(Precedence::Equality, Op::Equal),
            TokenKind::BangEqual => self.binary(Precedence::Equality, Op::NotEqual),
            TokenKind::Less => self.binary(Precedence::Comparison, Op::Less),
            TokenKind::LessEqual => self.binary(Precedence::Comparison, Op::LessEqual),
            TokenKind::Greater => self.binary(Precedence::Comparison, Op::Greater),
            TokenKind::GreaterEqual => self.binary(Precedence::Comparison, Op::GreaterEqual),
            TokenKind::And => {
                // Short-circuit: leave lhs when falsey, else evaluate rhs.
                let skip = self.emit(Op::JumpIfFalse(0));
                self.emit(Op::Pop);
                self.parse_precedence(Precedence::And.next())?;
                self.func.chunk.patch_jump(skip);
                Ok(())
            }
            TokenKind::Or => {
                let skip = self.emit(Op::JumpIfTrue(0));
                self.emit(Op::Pop);
                self.parse_precedence(Precedence::Or.next())?;
                self.func.chunk.patch_jump(skip);
                Ok(())
            }
            TokenKind::LeftParen => self.call(),
            TokenKind::LeftBracket => {
                self.expression()?;
                self.consume(TokenKind::RightBracket, "']' after index")?;
                if can_assign && self.match_token(TokenKind::Equal)? {
                    self.expression()?;
                    self.emit(Op::IndexSet);
                } else {
                    self.emit(Op::IndexGet);
                }
                Ok(())
            }
            TokenKind::Dot => {
                self.consume(TokenKind::Identifier, "field name after '.'")?;
                let bytes = self.previous.lexeme.as_bytes().to_vec();
                let idx = self.string_constant(&bytes);
                self.emit(Op::Constant(idx));
                if can_assign && self.match_token(TokenKind::Equal)? {
                    self.expression()?;
                    self.emit(Op::IndexSet);
                } else {
                    self.emit(Op::IndexGet);
                }
                Ok(())
            }
            other => unreachable!("no infix rule for {other:?}"),
        }
    }

    fn binary(&mut self, precedence: Precedence, op: Op) -> Result<()> {
        self.parse_precedence(precedence.next())?;
        self.emit(op);
        Ok(())
    }

    fn call(&mut self) -> Result<()> {
        let mut argc: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression()?;
                argc += 1;
                if argc > u8::MAX as u16 {
                    return Err(self.error_at_current("too many arguments (max 255)"));
                }
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after arguments")?;
        self.emit(Op::Call(argc as u8));
        Ok(())
    }

    fn array_literal(&mut self) -> Result<()> {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightBracket) {
            loop {
                self.expression()?;
                count += 1;
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
                if self.check(TokenKind::RightBracket) {
                    break; // trailing comma
                }
            }
        }
        self.consume(TokenKind::RightBracket, "']' after array elements")?;
        self.emit(Op::MakeArray(count));
        Ok(())
    }

    fn table_literal(&mut self) -> Result<()> {
        let mut count: u16 = 0;
        self.skip_newlines();
        if !self.check(TokenKind::RightBrace) {
            loop {
                self.skip_newlines();
                let key = if self.match_token(TokenKind::Identifier)? {
                    self.previous.lexeme.as_bytes().to_vec()
                } else if self.match_token(TokenKind::String)? {
                    unescape(self.previous.lexeme)
                } else {
                    return Err(self.error_at_current("table key (identifier or string)"));
                };
                let idx = self.string_constant(&key);
                self.emit(Op::Constant(idx));
                self.consume(TokenKind::Equal, "'=' after table key")?;
                self.expression()?;
                count += 1;
                self.skip_newlines();
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
                self.skip_newlines();
                if self.check(TokenKind::RightBrace) {
                    break;
                }
            }
        }
        self.skip_newlines();
        self.consume(TokenKind::RightBrace, "'}' after table entries")?;
        self.emit(Op::MakeTable(count));
        Ok(())
    }

    fn variable(&mut self, can_assign: bool) -> Result<()> {
        let name = self.previous.lexeme.to_string();
        if let Some(slot) = self.resolve_local(&name) {
            if can_assign && self.match_token(TokenKind::Equal)? {
                self.expression()?;
                self.emit(Op::SetLocal(slot));
            } else {
                self.emit(Op::GetLocal(slot));
            }
        } else {
            let idx = self.string_constant(name.as_bytes());
            if can_assign && self.match_token(TokenKind::Equal)? {
                self.expression()?;
                self.emit(Op::SetGlobal(idx));
            } else {
                self.emit(Op::GetGlobal(idx));
            }
        }
        Ok(())
    }

    fn resolve_local(&self, name: &str) -> Option<u16> {
        self.func
            .locals
            .iter()
            .rposition(|l| l.name == name)
            .map(|i| i as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_empty_source() {
        let f = compile("").unwrap();
        assert_eq!(f.chunk.code, vec![Op::Nil, Op::Return]);
    }

    #[test]
    fn var_declaration_defines_global() {
        let f = compile("var x = 1").unwrap();
        assert!(f.chunk.code.contains(&Op::DefineGlobal(1)));
    }

    #[test]
    fn missing_initializer_is_a_parse_error_with_position() {
        let err = compile("var broken = ").unwrap_err();
        match err {
            ScriptError::Parse { line, column, .. } => {
                assert_eq!(line, 1);
                assert!(column > 1);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn statements_separated_by_newlines_and_semicolons() {
        assert!(compile("var a = 1\nvar b = 2; var c = 3").is_ok());
    }

    #[test]
    fn fn_declaration_produces_function_constant() {
        let f = compile("fn greet(name) {\n return \"hi \" .. name\n}").unwrap();
        let has_fn = f
            .chunk
            .constants
            .iter()
            .any(|c| matches!(c, Value::Function(func) if func.arity == 1));
        assert!(has_fn);
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(compile("1 + 2 = 3").is_err());
    }

    #[test]
    fn call_with_multiline_arguments() {
        assert!(compile("register_command(\"hello\",\n \"handler\")").is_ok());
    }

    #[test]
    fn if_else_chain_parses() {
        let src = "var x = 2\nif x > 1 {\n x = 1\n} else if x == 0 {\n x = 5\n} else {\n x = 9\n}";
        assert!(compile(src).is_ok());
    }

    #[test]
    fn table_literal_with_newlines() {
        let src = "var t = {\n name = \"a\",\n value = 2,\n}";
        assert!(compile(src).is_ok());
    }
}
