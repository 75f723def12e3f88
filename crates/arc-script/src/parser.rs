//! Recursive-descent parser: token stream → `Block`.

use crate::ast::{BinOp, Block, Expr, FnDef, LValue, Stmt, UnaryOp};
use crate::lexer::{Spanned, Token};

#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

pub fn parse(tokens: Vec<Spanned>) -> Result<Block, ParseError> {
    let mut parser = Parser { tokens, pos: 0 };
    let mut block = Vec::new();
    while !parser.at(Token::Eof) {
        block.push(parser.statement()?);
    }
    Ok(block)
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn at(&self, token: Token) -> bool {
        *self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.at(token.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError {
                message: format!("expected {token:?}, found {:?}", self.peek()),
                line: self.line(),
            })
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(ParseError {
                message: format!("expected identifier, found {other:?}"),
                line: self.line(),
            }),
        }
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(Token::RBrace) {
            stmts.push(self.statement()?);
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().clone() {
            Token::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(Token::Assign)?;
                let value = self.expr()?;
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Let(name, value))
            }
            Token::Fn => {
                self.advance();
                Ok(Stmt::FnDef(self.fn_def(false)?))
            }
            Token::Async => {
                self.advance();
                self.expect(Token::Fn)?;
                Ok(Stmt::FnDef(self.fn_def(true)?))
            }
            Token::If => Ok(self.if_stmt()?),
            Token::While => {
                self.advance();
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::While(cond, body))
            }
            Token::For => {
                self.advance();
                let var = self.ident()?;
                self.expect(Token::In)?;
                let iter = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::For(var, iter, body))
            }
            Token::Return => {
                self.advance();
                if self.at(Token::Semicolon) {
                    self.advance();
                    Ok(Stmt::Return(None))
                } else {
                    let value = self.expr()?;
                    self.expect(Token::Semicolon)?;
                    Ok(Stmt::Return(Some(value)))
                }
            }
            _ => {
                let expr = self.expr()?;
                if self.at(Token::Assign) {
                    self.advance();
                    let lvalue = expr_to_lvalue(expr, self.line())?;
                    let value = self.expr()?;
                    self.expect(Token::Semicolon)?;
                    Ok(Stmt::Assign(lvalue, value))
                } else {
                    self.expect(Token::Semicolon)?;
                    Ok(Stmt::ExprStmt(expr))
                }
            }
        }
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.expect(Token::If)?;
        let cond = self.expr()?;
        let then_block = self.block()?;
        let else_block = if self.at(Token::Else) {
            self.advance();
            if self.at(Token::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If(cond, then_block, else_block))
    }

    fn fn_def(&mut self, is_async: bool) -> Result<FnDef, ParseError> {
        let name = self.ident()?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.at(Token::RParen) {
            params.push(self.ident()?);
            if self.at(Token::Comma) {
                self.advance();
            }
        }
        self.expect(Token::RParen)?;
        let body = self.block()?;
        Ok(FnDef {
            name,
            params,
            is_async,
            body,
        })
    }

    // ── expressions, lowest to highest precedence ──────────────────

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.at(Token::OrOr) {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality_expr()?;
        while self.at(Token::AndAnd) {
            self.advance();
            let rhs = self.equality_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison_expr()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::NotEq => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.comparison_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::LtEq => BinOp::LtEq,
                Token::Gt => BinOp::Gt,
                Token::GtEq => BinOp::GtEq,
                _ => break,
            };
            self.advance();
            let rhs = self.additive_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn additive_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.multiplicative_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary_expr()?)))
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary_expr()?)))
            }
            Token::Await => {
                self.advance();
                Ok(Expr::Await(Box::new(self.unary_expr()?)))
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.ident()?;
                    expr = Expr::Attr(Box::new(expr), name);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::LParen => {
                    self.advance();
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.at(Token::RParen) {
            if let Token::Ident(name) = self.peek().clone() {
                if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::Colon) {
                    self.advance();
                    self.advance();
                    kwargs.push((name, self.expr()?));
                    if self.at(Token::Comma) {
                        self.advance();
                    }
                    continue;
                }
            }
            args.push(self.expr()?);
            if self.at(Token::Comma) {
                self.advance();
            }
        }
        self.expect(Token::RParen)?;
        Ok((args, kwargs))
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Null => Ok(Expr::Null),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.at(Token::RBracket) {
                    items.push(self.expr()?);
                    if self.at(Token::Comma) {
                        self.advance();
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                while !self.at(Token::RBrace) {
                    let key = match self.advance() {
                        Token::Str(s) => s,
                        Token::Ident(s) => s,
                        other => {
                            return Err(ParseError {
                                message: format!("expected map key, found {other:?}"),
                                line: self.line(),
                            })
                        }
                    };
                    self.expect(Token::Colon)?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if self.at(Token::Comma) {
                        self.advance();
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Map(entries))
            }
            other => Err(ParseError {
                message: format!("unexpected token {other:?}"),
                line: self.line(),
            }),
        }
    }
}

fn expr_to_lvalue(expr: Expr, line: u32) -> Result<LValue, ParseError> {
    match expr {
        Expr::Ident(name) => Ok(LValue::Ident(name)),
        Expr::Attr(base, name) => Ok(LValue::Attr(base, name)),
        Expr::Index(base, index) => Ok(LValue::Index(base, index)),
        _ => Err(ParseError {
            message: "invalid assignment target".into(),
            line,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Block {
        parse(lex(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_let_and_arithmetic_precedence() {
        let block = parse_src("let x = 1 + 2 * 3;");
        assert_eq!(
            block,
            vec![Stmt::Let(
                "x".into(),
                Expr::Binary(
                    Box::new(Expr::Int(1)),
                    BinOp::Add,
                    Box::new(Expr::Binary(Box::new(Expr::Int(2)), BinOp::Mul, Box::new(Expr::Int(3)))),
                )
            )]
        );
    }

    #[test]
    fn parses_call_with_positional_and_keyword_args() {
        let block = parse_src(r#"read_file(path: "a.rs", 1);"#);
        match &block[0] {
            Stmt::ExprStmt(Expr::Call { args, kwargs, .. }) => {
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs.len(), 1);
                assert_eq!(kwargs[0].0, "path");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_await_and_attribute_call() {
        let block = parse_src("let x = await shell.run(\"ls\");");
        match &block[0] {
            Stmt::Let(_, Expr::Await(inner)) => match inner.as_ref() {
                Expr::Call { callee, .. } => {
                    assert!(matches!(callee.as_ref(), Expr::Attr(_, name) if name == "run"));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_if_else_and_while() {
        let block = parse_src("if x > 0 { y = 1; } else { y = 2; } while y < 10 { y = y + 1; }");
        assert!(matches!(block[0], Stmt::If(..)));
        assert!(matches!(block[1], Stmt::While(..)));
    }

    #[test]
    fn parses_async_fn_def() {
        let block = parse_src("async fn greet(name) { return name; }");
        match &block[0] {
            Stmt::FnDef(def) => {
                assert!(def.is_async);
                assert_eq!(def.params, vec!["name".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        let tokens = lex("1 + 1 = 2;").unwrap();
        assert!(parse(tokens).is_err());
    }
}
