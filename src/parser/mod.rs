//! Recursive-descent parser: token stream in, node tree out.
//!
//! Every expression, loop, function and catch clause receives a `NodeId`
//! so the tape builder can refer back into the tree by index.

use std::ops::Range;

use crate::ast::{
    AssignOp, BinOp, Block, CatchClause, ClassDecl, Else, Expr, ExprKind, ForStmt, FunDecl,
    IfStmt, Member, Module, NodeId, Note, Param, Span, Stmt, UnaryOp, VarDecl,
};
use crate::lexer::Token;

#[derive(Debug, thiserror::Error)]
#[error("parse error: {message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

pub fn parse(tokens: Vec<(Token, Range<usize>)>, source: &str) -> Result<Module, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        next_id: 0,
    };
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.stmt()?);
    }
    Ok(Module {
        body,
        source: Some(source.to_string()),
    })
}

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    next_id: u32,
}

impl Parser {
    // ---- Cursor helpers ----

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn span_here(&self) -> Span {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some((_, range)) => Span {
                start: range.start,
                end: range.end,
            },
            None => Span::UNKNOWN,
        }
    }

    fn prev_span(&self) -> Span {
        match self.tokens.get(self.pos.saturating_sub(1)) {
            Some((_, range)) => Span {
                start: range.start,
                end: range.end,
            },
            None => Span::UNKNOWN,
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.fail(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.fail(format!("expected {what}"))),
        }
    }

    fn fail(&self, message: impl Into<String>) -> ParseError {
        let mut message = message.into();
        match self.peek() {
            Some(token) => message.push_str(&format!(", found {token:?}")),
            None => message.push_str(", found end of input"),
        }
        ParseError {
            message,
            span: self.span_here(),
        }
    }

    // ---- Statements ----

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(Token::Var) | Some(Token::Final) => self.var_stmt(),
            Some(Token::Fun) if matches!(self.peek_at(1), Some(Token::Ident(_))) => {
                Ok(Stmt::Fun(self.fun_decl()?))
            }
            Some(Token::Class) => Ok(Stmt::Class(self.class_decl(Vec::new())?)),
            Some(Token::At) => {
                let notes = self.notes()?;
                Ok(Stmt::Class(self.class_decl(notes)?))
            }
            Some(Token::If) => Ok(Stmt::If(self.if_stmt()?)),
            Some(Token::For) => self.for_stmt(None),
            // `label: for ...`
            Some(Token::Ident(_))
                if self.peek_at(1) == Some(&Token::Colon)
                    && self.peek_at(2) == Some(&Token::For) =>
            {
                let label = self.expect_ident("loop label")?;
                self.expect(&Token::Colon, "':' after loop label")?;
                self.for_stmt(Some(label))
            }
            Some(Token::Try) => self.try_stmt(),
            Some(Token::Return) => self.return_stmt(),
            Some(Token::Throw) => {
                let span = self.span_here();
                self.pos += 1;
                let value = self.expr()?;
                let span = span.merge(value.span);
                Ok(Stmt::Throw { value, span })
            }
            Some(Token::Break) => {
                let span = self.span_here();
                self.pos += 1;
                let label = self.optional_label();
                Ok(Stmt::Break { label, span })
            }
            Some(Token::Continue) => {
                let span = self.span_here();
                self.pos += 1;
                let label = self.optional_label();
                Ok(Stmt::Continue { label, span })
            }
            Some(Token::LBrace) => {
                let span = self.span_here();
                let body = self.block()?;
                let span = span.merge(self.prev_span());
                Ok(Stmt::Block { body, span })
            }
            Some(_) => {
                let expr = self.expr()?;
                self.eat(&Token::Semi);
                Ok(Stmt::Expr(expr))
            }
            None => Err(self.fail("expected a statement")),
        }
    }

    fn optional_label(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        }
    }

    fn var_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span_here();
        let readonly = matches!(self.peek(), Some(Token::Final));
        self.pos += 1;

        // `var {a, b} = expr` claims one slot per listed name
        if self.eat(&Token::LBrace) {
            let mut names = Vec::new();
            loop {
                names.push(self.expect_ident("name in destructuring list")?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RBrace, "'}' after destructuring list")?;
            self.expect(&Token::Assign, "'=' after destructuring list")?;
            let init = self.expr()?;
            let span = span.merge(init.span);
            if readonly {
                return Err(ParseError {
                    message: "destructuring does not take 'final'".to_string(),
                    span,
                });
            }
            self.eat(&Token::Semi);
            return Ok(Stmt::VarSet { names, init, span });
        }

        let decl = self.var_decl_tail(readonly, span)?;
        self.eat(&Token::Semi);
        Ok(Stmt::Var(decl))
    }

    /// The part after `var`/`final`: `name (: type)? (= expr)?`.
    fn var_decl_tail(&mut self, readonly: bool, span: Span) -> Result<VarDecl, ParseError> {
        let name = self.expect_ident("variable name")?;
        let ty = if self.eat(&Token::Colon) {
            Some(self.expect_ident("type name")?)
        } else {
            None
        };
        let init = if self.eat(&Token::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        let span = match &init {
            Some(e) => span.merge(e.span),
            None => span.merge(self.prev_span()),
        };
        Ok(VarDecl {
            name,
            ty,
            readonly,
            init,
            span,
        })
    }

    fn fun_decl(&mut self) -> Result<FunDecl, ParseError> {
        let span = self.span_here();
        self.expect(&Token::Fun, "'fun'")?;
        let name = self.expect_ident("function name")?;
        let params = self.params()?;
        let body = self.block()?;
        let span = span.merge(self.prev_span());
        Ok(FunDecl {
            id: self.fresh_id(),
            name,
            params,
            body,
            span,
        })
    }

    fn params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&Token::LParen, "'(' before parameter list")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let name = self.expect_ident("parameter name")?;
                let ty = if self.eat(&Token::Colon) {
                    Some(self.expect_ident("parameter type")?)
                } else {
                    None
                };
                params.push(Param { name, ty });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')' after parameter list")?;
        Ok(params)
    }

    fn notes(&mut self) -> Result<Vec<Note>, ParseError> {
        let mut notes = Vec::new();
        while self.eat(&Token::At) {
            let name = self.expect_ident("annotation name")?;
            let mut args = Vec::new();
            if self.eat(&Token::LParen) {
                if !self.check(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen, "')' after annotation arguments")?;
            }
            notes.push(Note { name, args });
        }
        Ok(notes)
    }

    fn class_decl(&mut self, notes: Vec<Note>) -> Result<ClassDecl, ParseError> {
        let span = self.span_here();
        self.expect(&Token::Class, "'class'")?;
        let name = self.expect_ident("class name")?;

        let mut generics = Vec::new();
        if self.eat(&Token::Lt) {
            loop {
                generics.push(self.expect_ident("generic parameter")?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Gt, "'>' after generic parameters")?;
        }

        let heritage = if self.eat(&Token::Is) {
            Some(self.expect_ident("base class name")?)
        } else {
            None
        };

        self.expect(&Token::LBrace, "'{' before class body")?;
        let mut members = Vec::new();
        while !self.check(&Token::RBrace) && !self.at_end() {
            match self.peek() {
                Some(Token::Var) | Some(Token::Final) => {
                    let span = self.span_here();
                    let readonly = matches!(self.peek(), Some(Token::Final));
                    self.pos += 1;
                    let decl = self.var_decl_tail(readonly, span)?;
                    self.eat(&Token::Semi);
                    members.push(Member::Var(decl));
                }
                Some(Token::Fun) => {
                    // operator-overload methods are named by the symbol
                    let span = self.span_here();
                    self.pos += 1;
                    let name = self.method_name()?;
                    let params = self.params()?;
                    let body = self.block()?;
                    let span = span.merge(self.prev_span());
                    members.push(Member::Fun(FunDecl {
                        id: self.fresh_id(),
                        name,
                        params,
                        body,
                        span,
                    }));
                }
                _ => return Err(self.fail("expected 'var', 'final' or 'fun' in class body")),
            }
        }
        self.expect(&Token::RBrace, "'}' after class body")?;
        let span = span.merge(self.prev_span());
        Ok(ClassDecl {
            id: self.fresh_id(),
            name,
            generics,
            heritage,
            notes,
            members,
            span,
        })
    }

    fn method_name(&mut self) -> Result<String, ParseError> {
        let symbol = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            Some(Token::Plus) => "+".to_string(),
            Some(Token::Minus) => "-".to_string(),
            Some(Token::Star) => "*".to_string(),
            Some(Token::Slash) => "/".to_string(),
            Some(Token::Backslash) => "\\".to_string(),
            Some(Token::Percent) => "%".to_string(),
            Some(Token::StarStar) => "**".to_string(),
            Some(Token::EqEq) => "==".to_string(),
            Some(Token::NotEq) => "!=".to_string(),
            Some(Token::Lt) => "<".to_string(),
            Some(Token::Le) => "<=".to_string(),
            Some(Token::Gt) => ">".to_string(),
            Some(Token::Ge) => ">=".to_string(),
            Some(Token::Shl) => "<<".to_string(),
            Some(Token::Shr) => ">>".to_string(),
            Some(Token::Amp) => "&".to_string(),
            Some(Token::Pipe) => "|".to_string(),
            Some(Token::Caret) => "^".to_string(),
            _ => return Err(self.fail("expected method name")),
        };
        self.pos += 1;
        Ok(symbol)
    }

    fn if_stmt(&mut self) -> Result<IfStmt, ParseError> {
        let span = self.span_here();
        self.expect(&Token::If, "'if'")?;
        self.expect(&Token::LParen, "'(' after 'if'")?;
        let cond = self.expr()?;
        self.expect(&Token::RParen, "')' after condition")?;
        let then = self.block()?;
        let otherwise = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                Some(Box::new(Else::If(self.if_stmt()?)))
            } else {
                Some(Box::new(Else::Block(self.block()?)))
            }
        } else {
            None
        };
        let span = span.merge(self.prev_span());
        Ok(IfStmt {
            cond,
            then,
            otherwise,
            span,
        })
    }

    fn for_stmt(&mut self, label: Option<String>) -> Result<Stmt, ParseError> {
        let span = self.span_here();
        self.expect(&Token::For, "'for'")?;
        self.expect(&Token::LParen, "'(' after 'for'")?;

        let init = if self.eat(&Token::Semi) {
            None
        } else {
            let stmt = match self.peek() {
                Some(Token::Var) | Some(Token::Final) => self.var_stmt()?,
                _ => {
                    let expr = self.expr()?;
                    self.expect(&Token::Semi, "';' after loop initializer")?;
                    Stmt::Expr(expr)
                }
            };
            Some(Box::new(stmt))
        };

        let cond = if self.check(&Token::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&Token::Semi, "';' after loop condition")?;

        let step = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&Token::RParen, "')' after loop header")?;

        let body = self.block()?;
        let span = span.merge(self.prev_span());
        Ok(Stmt::For(ForStmt {
            id: self.fresh_id(),
            label,
            init,
            cond,
            step,
            body,
            span,
        }))
    }

    fn try_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span_here();
        self.expect(&Token::Try, "'try'")?;
        let body = self.block()?;
        let mut catches = Vec::new();
        while self.check(&Token::Catch) {
            let clause_span = self.span_here();
            self.pos += 1;
            self.expect(&Token::LParen, "'(' after 'catch'")?;
            let param = self.expect_ident("catch parameter")?;
            let ty = if self.eat(&Token::Colon) {
                Some(self.expect_ident("catch type")?)
            } else {
                None
            };
            self.expect(&Token::RParen, "')' after catch parameter")?;
            let body = self.block()?;
            let clause_span = clause_span.merge(self.prev_span());
            catches.push(CatchClause {
                id: self.fresh_id(),
                param,
                ty,
                body,
                span: clause_span,
            });
        }
        if catches.is_empty() {
            return Err(self.fail("'try' needs at least one 'catch'"));
        }
        let span = span.merge(self.prev_span());
        Ok(Stmt::Try {
            body,
            catches,
            span,
        })
    }

    fn return_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span_here();
        self.expect(&Token::Return, "'return'")?;
        let value = if self.peek().map_or(false, can_start_expr) {
            Some(self.expr()?)
        } else {
            None
        };
        let span = match &value {
            Some(e) => span.merge(e.span),
            None => span,
        };
        self.eat(&Token::Semi);
        Ok(Stmt::Return { value, span })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) && !self.at_end() {
            body.push(self.stmt()?);
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(body)
    }

    // ---- Expressions, lowest precedence first ----

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.ternary()?;
        let op = match self.peek() {
            Some(Token::Assign) => AssignOp::Set,
            Some(Token::AddAssign) => AssignOp::Add,
            Some(Token::SubAssign) => AssignOp::Sub,
            Some(Token::MulAssign) => AssignOp::Mul,
            Some(Token::DivAssign) => AssignOp::Div,
            Some(Token::FloorDivAssign) => AssignOp::FloorDiv,
            Some(Token::RemAssign) => AssignOp::Rem,
            Some(Token::ShlAssign) => AssignOp::Shl,
            Some(Token::ShrAssign) => AssignOp::Shr,
            Some(Token::AndAssign) => AssignOp::BitAnd,
            Some(Token::OrAssign) => AssignOp::BitOr,
            _ => return Ok(target),
        };
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Attr { .. } | ExprKind::Index { .. }
        ) {
            return Err(ParseError {
                message: "invalid assignment target".to_string(),
                span: target.span,
            });
        }
        self.pos += 1;
        let value = self.assignment()?;
        let span = target.span.merge(value.span);
        Ok(Expr {
            id: self.fresh_id(),
            span,
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
        })
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.expr()?;
        self.expect(&Token::Colon, "':' in conditional expression")?;
        let otherwise = self.expr()?;
        let span = cond.span.merge(otherwise.span);
        Ok(Expr {
            id: self.fresh_id(),
            span,
            kind: ExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        })
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::OrOr, BinOp::Or)], Parser::logical_and)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::AndAnd, BinOp::And)], Parser::bit_or)
    }

    fn bit_or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::Pipe, BinOp::BitOr)], Parser::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::Caret, BinOp::BitXor)], Parser::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::Amp, BinOp::BitAnd)], Parser::equality)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[(Token::EqEq, BinOp::Eq), (Token::NotEq, BinOp::Ne)],
            Parser::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                (Token::Lt, BinOp::Lt),
                (Token::Le, BinOp::Le),
                (Token::Gt, BinOp::Gt),
                (Token::Ge, BinOp::Ge),
            ],
            Parser::shift,
        )
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[(Token::Shl, BinOp::Shl), (Token::Shr, BinOp::Shr)],
            Parser::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
            Parser::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                (Token::Star, BinOp::Mul),
                (Token::Slash, BinOp::Div),
                (Token::Backslash, BinOp::FloorDiv),
                (Token::Percent, BinOp::Rem),
            ],
            Parser::power,
        )
    }

    /// `**` binds tighter than unary minus on its left and is
    /// right-associative: `2 ** 3 ** 2` is `2 ** (3 ** 2)`.
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.unary()?;
        if !self.eat(&Token::StarStar) {
            return Ok(base);
        }
        let exp = self.power()?;
        let span = base.span.merge(exp.span);
        Ok(Expr {
            id: self.fresh_id(),
            span,
            kind: ExprKind::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exp),
            },
        })
    }

    fn binary_level(
        &mut self,
        table: &[(Token, BinOp)],
        next: fn(&mut Parser) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in table {
                if self.check(token) {
                    self.pos += 1;
                    let right = next(self)?;
                    let span = left.span.merge(right.span);
                    left = Expr {
                        id: self.fresh_id(),
                        span,
                        kind: ExprKind::Binary {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Plus) => Some(UnaryOp::Plus),
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };
        match op {
            Some(op) => {
                let span = self.span_here();
                self.pos += 1;
                let operand = self.unary()?;
                let span = span.merge(operand.span);
                Ok(Expr {
                    id: self.fresh_id(),
                    span,
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                })
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if !self.check(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen, "')' after arguments")?;
                let span = expr.span.merge(self.prev_span());
                expr = Expr {
                    id: self.fresh_id(),
                    span,
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.eat(&Token::Dot) {
                let name = self.expect_ident("attribute name")?;
                let span = expr.span.merge(self.prev_span());
                expr = Expr {
                    id: self.fresh_id(),
                    span,
                    kind: ExprKind::Attr {
                        object: Box::new(expr),
                        name,
                    },
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.expr()?;
                self.expect(&Token::RBracket, "']' after index")?;
                let span = expr.span.merge(self.prev_span());
                expr = Expr {
                    id: self.fresh_id(),
                    span,
                    kind: ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span_here();
        let kind = match self.peek().cloned() {
            Some(Token::Int(digits)) => {
                self.pos += 1;
                ExprKind::Int(digits)
            }
            Some(Token::Float(digits)) => {
                self.pos += 1;
                ExprKind::Float(digits)
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                ExprKind::Str(s)
            }
            Some(Token::Char(c)) => {
                self.pos += 1;
                ExprKind::Char(c)
            }
            Some(Token::Null) => {
                self.pos += 1;
                ExprKind::Null
            }
            Some(Token::Undefined) => {
                self.pos += 1;
                ExprKind::Undefined
            }
            Some(Token::Nan) => {
                self.pos += 1;
                ExprKind::Nan
            }
            // true and false read as the integers 1 and 0
            Some(Token::True) => {
                self.pos += 1;
                ExprKind::Int("1".to_string())
            }
            Some(Token::False) => {
                self.pos += 1;
                ExprKind::Int("0".to_string())
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                ExprKind::Ident(name)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                return Ok(inner);
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.check(&Token::RBracket) {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "']' after tuple items")?;
                ExprKind::Tuple(items)
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                let mut pairs = Vec::new();
                if !self.check(&Token::RBrace) {
                    loop {
                        let key = match self.peek() {
                            Some(Token::Ident(name)) => {
                                let name = name.clone();
                                self.pos += 1;
                                name
                            }
                            Some(Token::Str(s)) => {
                                let s = s.clone();
                                self.pos += 1;
                                s
                            }
                            _ => return Err(self.fail("expected object key")),
                        };
                        self.expect(&Token::Colon, "':' after object key")?;
                        pairs.push((key, self.expr()?));
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace, "'}' after object entries")?;
                ExprKind::Object(pairs)
            }
            Some(Token::Fun) => {
                self.pos += 1;
                let params = self.params()?;
                let body = self.block()?;
                ExprKind::Lambda { params, body }
            }
            _ => return Err(self.fail("expected an expression")),
        };
        let span = span.merge(self.prev_span());
        Ok(Expr {
            id: self.fresh_id(),
            span,
            kind,
        })
    }
}

fn can_start_expr(token: &Token) -> bool {
    matches!(
        token,
        Token::Int(_)
            | Token::Float(_)
            | Token::Str(_)
            | Token::Char(_)
            | Token::Ident(_)
            | Token::Null
            | Token::Undefined
            | Token::Nan
            | Token::True
            | Token::False
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
            | Token::Fun
            | Token::Minus
            | Token::Plus
            | Token::Bang
            | Token::Tilde
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse_src(source: &str) -> Module {
        parse(lexer::lex(source).unwrap(), source).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        parse(lexer::lex(source).unwrap(), source).unwrap_err()
    }

    #[test]
    fn precedence_mul_over_add() {
        let module = parse_src("1 + 2 * 3");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!()
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!()
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn power_is_right_associative() {
        let module = parse_src("2 ** 3 ** 2");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!()
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!()
        };
        assert_eq!(*op, BinOp::Pow);
        assert!(matches!(
            right.kind,
            ExprKind::Binary { op: BinOp::Pow, .. }
        ));
    }

    #[test]
    fn floor_div_is_multiplicative() {
        let module = parse_src("1 + 6 \\ 2");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!()
        };
        let ExprKind::Binary { op, .. } = &expr.kind else {
            panic!()
        };
        assert_eq!(*op, BinOp::Add);
    }

    #[test]
    fn var_decl_with_type_and_final() {
        let module = parse_src("final pi: float = 3.14");
        let Stmt::Var(decl) = &module.body[0] else {
            panic!()
        };
        assert_eq!(decl.name, "pi");
        assert_eq!(decl.ty.as_deref(), Some("float"));
        assert!(decl.readonly);
        assert!(decl.init.is_some());
    }

    #[test]
    fn destructuring_var_set() {
        let module = parse_src("var {a, b, c} = point");
        let Stmt::VarSet { names, .. } = &module.body[0] else {
            panic!()
        };
        assert_eq!(names, &["a", "b", "c"]);
    }

    #[test]
    fn labeled_for_loop() {
        let module = parse_src("outer: for (var i = 0; i < 3; i += 1) { break outer }");
        let Stmt::For(f) = &module.body[0] else {
            panic!()
        };
        assert_eq!(f.label.as_deref(), Some("outer"));
        let Stmt::Break { label, .. } = &f.body[0] else {
            panic!()
        };
        assert_eq!(label.as_deref(), Some("outer"));
    }

    #[test]
    fn for_header_parts_optional() {
        let module = parse_src("for (;;) { break }");
        let Stmt::For(f) = &module.body[0] else {
            panic!()
        };
        assert!(f.init.is_none() && f.cond.is_none() && f.step.is_none());
    }

    #[test]
    fn else_if_chain_nests_in_otherwise() {
        let module = parse_src("if (a) { 1 } else if (b) { 2 } else { 3 }");
        let Stmt::If(stmt) = &module.body[0] else {
            panic!()
        };
        let Some(otherwise) = &stmt.otherwise else {
            panic!()
        };
        let Else::If(chained) = otherwise.as_ref() else {
            panic!()
        };
        assert!(matches!(
            chained.otherwise.as_deref(),
            Some(Else::Block(_))
        ));
    }

    #[test]
    fn class_with_everything() {
        let source = "
            @traced(1)
            class Box<T> is Base {
                var value = 0
                final tag = \"box\"
                fun init(v) { this.value = v }
                fun +(other) { return this.value + other.value }
            }
        ";
        let module = parse_src(source);
        let Stmt::Class(c) = &module.body[0] else {
            panic!()
        };
        assert_eq!(c.name, "Box");
        assert_eq!(c.generics, vec!["T"]);
        assert_eq!(c.heritage.as_deref(), Some("Base"));
        assert_eq!(c.notes[0].name, "traced");
        assert_eq!(c.members.len(), 4);
        let Member::Fun(op) = &c.members[3] else {
            panic!()
        };
        assert_eq!(op.name, "+");
    }

    #[test]
    fn try_with_typed_catches() {
        let module = parse_src("try { x } catch (e: int) { 1 } catch (e) { 2 }");
        let Stmt::Try { catches, .. } = &module.body[0] else {
            panic!()
        };
        assert_eq!(catches.len(), 2);
        assert_eq!(catches[0].ty.as_deref(), Some("int"));
        assert!(catches[1].ty.is_none());
    }

    #[test]
    fn try_without_catch_is_an_error() {
        let err = parse_err("try { x }");
        assert!(err.message.contains("catch"));
    }

    #[test]
    fn lambda_expression() {
        let module = parse_src("var f = fun (a, b) { return a + b }");
        let Stmt::Var(decl) = &module.body[0] else {
            panic!()
        };
        let Some(init) = &decl.init else { panic!() };
        assert!(matches!(init.kind, ExprKind::Lambda { .. }));
    }

    #[test]
    fn chained_postfix() {
        let module = parse_src("a.b[0](1, 2).c");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!()
        };
        let ExprKind::Attr { object, name } = &expr.kind else {
            panic!()
        };
        assert_eq!(name, "c");
        assert!(matches!(object.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let module = parse_src("a = b = 1");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!()
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!()
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn invalid_assignment_target_rejected() {
        let err = parse_err("1 + 2 = 3");
        assert!(err.message.contains("assignment target"));
    }

    #[test]
    fn true_false_read_as_ints() {
        let module = parse_src("true");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!()
        };
        assert_eq!(expr.kind, ExprKind::Int("1".to_string()));
    }

    #[test]
    fn node_ids_are_unique() {
        let module = parse_src("fun f(x) { return x + 1 } f(2)");
        let mut seen = std::collections::HashSet::new();
        fn walk_expr(e: &Expr, seen: &mut std::collections::HashSet<u32>) {
            assert!(seen.insert(e.id.0), "duplicate id {:?}", e.id);
            match &e.kind {
                ExprKind::Binary { left, right, .. } => {
                    walk_expr(left, seen);
                    walk_expr(right, seen);
                }
                ExprKind::Call { callee, args } => {
                    walk_expr(callee, seen);
                    for a in args {
                        walk_expr(a, seen);
                    }
                }
                _ => {}
            }
        }
        for stmt in &module.body {
            match stmt {
                Stmt::Fun(f) => {
                    assert!(seen.insert(f.id.0));
                }
                Stmt::Expr(e) => walk_expr(e, &mut seen),
                _ => {}
            }
        }
    }

    #[test]
    fn object_literal_keys() {
        let module = parse_src("var o = {a: 1, \"b c\": 2}");
        let Stmt::Var(decl) = &module.body[0] else {
            panic!()
        };
        let Some(Expr {
            kind: ExprKind::Object(pairs),
            ..
        }) = &decl.init
        else {
            panic!()
        };
        assert_eq!(pairs[0].0, "a");
        assert_eq!(pairs[1].0, "b c");
    }
}
