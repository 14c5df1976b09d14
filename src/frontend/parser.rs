//! Kernel body parser.
//!
//! Recursive descent over the body text, allocating nodes in the session
//! arena. Grammar, loosest binding first:
//!
//! ```text
//! expr       := additive (cmp_op additive)?
//! additive   := term (('+' | '-') term)*
//! term       := unary (('*' | '/' | '//' | '%') unary)*
//! unary      := ('-' | '+') unary | primary
//! primary    := number | 'True' | 'False' | ident | ident '(' args ')' | '(' expr ')'
//! ```

use super::ast::{BinaryOp, Builtin, CmpOp, Expr, ExprId, ExprKind, UnaryOp};
use super::types::NumericType;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use bumpalo::collections::Vec as BumpVec;

/// Deepest recursion the parser itself enters (parentheses, unary operators, call arguments).
const MAX_NESTING: u32 = 128;

/// Tallest expression tree accepted. Type inference and lowering recurse once per level.
const MAX_DEPTH: u32 = 512;

/// Result of parsing one kernel body.
pub struct ParsedBody<'a> {
    pub root: &'a Expr<'a>,
    /// Number of nodes; ids are `0..expr_count`.
    pub expr_count: u32,
}

pub fn parse_body<'a>(session: &CompilationSession<'a>, text: &str) -> CompileResult<ParsedBody<'a>> {
    let mut parser = Parser {
        session,
        text,
        pos: 0,
        next_id: 0,
        nesting: 0,
    };

    let root = parser.parse_expr()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(parser.error(format!("unexpected trailing input {:?}", parser.rest())));
    }

    Ok(ParsedBody {
        root,
        expr_count: parser.next_id,
    })
}

struct Parser<'s, 'a, 't> {
    session: &'s CompilationSession<'a>,
    text: &'t str,
    pos: usize,
    next_id: ExprId,
    nesting: u32,
}

impl<'s, 'a, 't> Parser<'s, 'a, 't> {
    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: String) -> CompileError {
        CompileError::Parse {
            offset: self.pos,
            message,
        }
    }

    /// Consume `token` if the input continues with it.
    fn try_read(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> CompileResult<()> {
        if !self.try_read(token) {
            return Err(self.error(format!(
                "expected '{}' but found {:?}",
                token,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn node(&mut self, offset: usize, kind: ExprKind<'a>) -> CompileResult<&'a Expr<'a>> {
        let depth = 1 + match &kind {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) | ExprKind::Param(_) => 0,
            ExprKind::Unary(_, operand) | ExprKind::Cast(_, operand) => operand.depth,
            ExprKind::Binary(_, lhs, rhs) | ExprKind::Compare(_, lhs, rhs) => lhs.depth.max(rhs.depth),
            ExprKind::Call(_, args) => args.iter().map(|arg| arg.depth).max().unwrap_or(0),
        };
        if depth > MAX_DEPTH {
            return Err(self.error(format!("expression is more than {} levels deep", MAX_DEPTH)));
        }

        let id = self.next_id;
        self.next_id += 1;
        Ok(self.session.alloc(Expr {
            id,
            offset,
            depth,
            kind,
        }))
    }

    /// Run `parse` one nesting level down.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error(format!("expression nested more than {} levels", MAX_NESTING)));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn parse_expr(&mut self) -> CompileResult<&'a Expr<'a>> {
        let lhs = self.parse_additive()?;
        self.skip_whitespace();
        let offset = self.pos;

        let Some(op) = self.read_cmp_op() else {
            return Ok(lhs);
        };
        let rhs = self.parse_additive()?;

        if self.read_cmp_op().is_some() {
            return Err(self.error("chained comparisons are not supported".to_string()));
        }
        self.node(offset, ExprKind::Compare(op, lhs, rhs))
    }

    fn read_cmp_op(&mut self) -> Option<CmpOp> {
        // Two-character operators first so `<=` isn't read as `<`.
        let ops = [
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ];
        ops.into_iter()
            .find(|(token, _)| self.try_read(token))
            .map(|(_, op)| op)
    }

    fn parse_additive(&mut self) -> CompileResult<&'a Expr<'a>> {
        let mut lhs = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let offset = self.pos;
            let op = if self.try_read("+") {
                BinaryOp::Add
            } else if self.try_read("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_term()?;
            lhs = self.node(offset, ExprKind::Binary(op, lhs, rhs))?;
        }
    }

    fn parse_term(&mut self) -> CompileResult<&'a Expr<'a>> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let offset = self.pos;
            let op = if self.rest().starts_with("**") {
                return Err(self.error("'**' is not supported".to_string()));
            } else if self.try_read("*") {
                BinaryOp::Mul
            } else if self.try_read("//") {
                BinaryOp::FloorDiv
            } else if self.try_read("/") {
                BinaryOp::Div
            } else if self.try_read("%") {
                BinaryOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = self.node(offset, ExprKind::Binary(op, lhs, rhs))?;
        }
    }

    fn parse_unary(&mut self) -> CompileResult<&'a Expr<'a>> {
        self.skip_whitespace();
        let offset = self.pos;
        if self.try_read("-") {
            let operand = self.nested(Self::parse_unary)?;
            return self.node(offset, ExprKind::Unary(UnaryOp::Neg, operand));
        }
        if self.try_read("+") {
            let operand = self.nested(Self::parse_unary)?;
            return self.node(offset, ExprKind::Unary(UnaryOp::Plus, operand));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> CompileResult<&'a Expr<'a>> {
        self.skip_whitespace();
        let offset = self.pos;

        match self.current_char() {
            Some('(') => {
                self.advance();
                let inner = self.nested(Self::parse_expr)?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.parse_number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let name = self.read_identifier();
                match name {
                    "True" => return self.node(offset, ExprKind::Bool(true)),
                    "False" => return self.node(offset, ExprKind::Bool(false)),
                    _ => {}
                }

                if !self.try_read("(") {
                    let name = self.session.intern_str(name);
                    return self.node(offset, ExprKind::Param(name));
                }

                let args = self.parse_args()?;
                if let Some(builtin) = Builtin::from_name(name) {
                    if args.len() != builtin.arity() {
                        return Err(CompileError::Arity {
                            callee: name.to_string(),
                            expected: builtin.arity(),
                            found: args.len(),
                        });
                    }
                    return self.node(offset, ExprKind::Call(builtin, args));
                }

                if let Ok(ty) = name.parse::<NumericType>() {
                    if args.len() != 1 {
                        return Err(CompileError::Arity {
                            callee: name.to_string(),
                            expected: 1,
                            found: args.len(),
                        });
                    }
                    return self.node(offset, ExprKind::Cast(ty, args[0]));
                }

                Err(CompileError::UnknownName {
                    name: name.to_string(),
                })
            }
            other => Err(self.error(format!("expected an expression but found {:?}", other))),
        }
    }

    fn parse_args(&mut self) -> CompileResult<&'a [&'a Expr<'a>]> {
        let mut args = BumpVec::new_in(self.session.arena());
        if self.try_read(")") {
            return Ok(args.into_bump_slice());
        }
        loop {
            args.push(self.nested(Self::parse_expr)?);
            if self.try_read(")") {
                return Ok(args.into_bump_slice());
            }
            self.expect(",")?;
        }
    }

    fn read_identifier(&mut self) -> &'t str {
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    fn parse_number(&mut self) -> CompileResult<&'a Expr<'a>> {
        let start = self.pos;
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() || ch == '_' {
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                self.advance();
            } else if ch == 'e' || ch == 'E' {
                is_float = true;
                self.advance();
                if matches!(self.current_char(), Some('+') | Some('-')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let literal: String = self.text[start..self.pos].chars().filter(|&c| c != '_').collect();
        let kind = if is_float {
            literal
                .parse::<f64>()
                .map(ExprKind::Float)
                .map_err(|_| self.error(format!("invalid float literal {:?}", literal)))?
        } else {
            literal
                .parse::<i64>()
                .map(ExprKind::Int)
                .map_err(|_| self.error(format!("invalid integer literal {:?}", literal)))?
        };
        self.node(start, kind)
    }
}
