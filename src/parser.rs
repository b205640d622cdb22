use crate::{
    ast::{Ast, BinaryOperator, CallArg},
    error::{FramescriptError, FramescriptResult},
    functions::FunctionLibrary,
    lexer::{Token, TokenKind, tokenize},
};

/// Parse a formula into an AST. Function names are resolved against the
/// library here, so an unknown function fails at parse time rather than on
/// first invocation.
pub fn parse(text: &str, library: &FunctionLibrary) -> FramescriptResult<Ast> {
    let tokens = tokenize(text)?;
    Parser {
        tokens,
        pos: 0,
        library,
    }
    .parse()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    library: &'a FunctionLibrary,
}

impl Parser<'_> {
    fn parse(mut self) -> FramescriptResult<Ast> {
        let expr = self.boolean()?;
        if let Some(tok) = self.peek() {
            return Err(self.err_at(tok.line, tok.column, "unexpected trailing tokens"));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek2_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err_here(&self, message: impl Into<String>) -> FramescriptError {
        match self.peek() {
            Some(tok) => self.err_at(tok.line, tok.column, message),
            None => {
                let (line, column) = self
                    .tokens
                    .last()
                    .map(|t| (t.line, t.column))
                    .unwrap_or((1, 1));
                FramescriptError::parse(line, column, message)
            }
        }
    }

    fn err_at(&self, line: usize, column: usize, message: impl Into<String>) -> FramescriptError {
        FramescriptError::parse(line, column, message)
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> FramescriptResult<()> {
        if self.peek_kind() == Some(kind) {
            self.bump();
            Ok(())
        } else {
            Err(self.err_here(format!("expected {what}")))
        }
    }

    // Loosest binding: and/or (keyword or operator spelling).
    fn boolean(&mut self) -> FramescriptResult<Ast> {
        let mut node = self.comparison()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::And | TokenKind::AndAnd) => BinaryOperator::And,
                Some(TokenKind::Or | TokenKind::OrOr) => BinaryOperator::Or,
                _ => break,
            };
            self.bump();
            let rhs = self.comparison()?;
            node = Ast::BinaryOp {
                op,
                left: Box::new(node),
                right: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn comparison(&mut self) -> FramescriptResult<Ast> {
        let mut node = self.additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOperator::Lt,
                Some(TokenKind::Le) => BinaryOperator::Le,
                Some(TokenKind::Gt) => BinaryOperator::Gt,
                Some(TokenKind::Ge) => BinaryOperator::Ge,
                Some(TokenKind::EqEq) => BinaryOperator::Eq,
                Some(TokenKind::NotEq) => BinaryOperator::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.additive()?;
            node = Ast::BinaryOp {
                op,
                left: Box::new(node),
                right: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn additive(&mut self) -> FramescriptResult<Ast> {
        let mut node = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOperator::Add,
                Some(TokenKind::Minus) => BinaryOperator::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative()?;
            node = Ast::BinaryOp {
                op,
                left: Box::new(node),
                right: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn multiplicative(&mut self) -> FramescriptResult<Ast> {
        let mut node = self.negation()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOperator::Mul,
                Some(TokenKind::Slash) => BinaryOperator::Div,
                Some(TokenKind::Percent) => BinaryOperator::Mod,
                Some(TokenKind::Caret) => BinaryOperator::Pow,
                Some(TokenKind::Colon) => BinaryOperator::Weight,
                _ => break,
            };
            self.bump();
            let rhs = self.negation()?;
            node = Ast::BinaryOp {
                op,
                left: Box::new(node),
                right: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn negation(&mut self) -> FramescriptResult<Ast> {
        if self.peek_kind() == Some(&TokenKind::Minus) {
            self.bump();
            return Ok(Ast::Negation(Box::new(self.negation()?)));
        }
        self.unary()
    }

    fn unary(&mut self) -> FramescriptResult<Ast> {
        let tok = match self.peek() {
            Some(t) => t.clone(),
            None => return Err(self.err_here("unexpected end of expression")),
        };
        match tok.kind {
            TokenKind::Number { value, unit } => {
                self.bump();
                Ok(Ast::NumberLiteral { value, unit })
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Ast::StringLiteral(s))
            }
            TokenKind::True => {
                self.bump();
                Ok(Ast::BooleanLiteral(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Ast::BooleanLiteral(false))
            }
            TokenKind::If => self.if_expr(),
            TokenKind::Ident(name) => {
                self.bump();
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    self.call(name, tok.line, tok.column)
                } else {
                    Ok(Ast::VariableReference(name))
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.boolean()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.err_at(
                tok.line,
                tok.column,
                "expected a number, string, variable, function call, 'if' or '('",
            )),
        }
    }

    /// `if (cond) expr [else expr]`; `else if` chains are parsed as a
    /// first-class rule, with `else` binding to the nearest `if`.
    fn if_expr(&mut self) -> FramescriptResult<Ast> {
        self.expect(&TokenKind::If, "'if'")?;
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.boolean()?;
        self.expect(&TokenKind::RParen, "')' after if condition")?;
        let then = self.boolean()?;
        let otherwise = if self.peek_kind() == Some(&TokenKind::Else) {
            self.bump();
            if self.peek_kind() == Some(&TokenKind::If) {
                Some(Box::new(self.if_expr()?))
            } else {
                Some(Box::new(self.boolean()?))
            }
        } else {
            None
        };
        Ok(Ast::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
        })
    }

    /// Arguments are all positional or all named; mixing is a grammar
    /// violation, rejected here rather than at call validation.
    fn call(&mut self, name: String, line: usize, column: usize) -> FramescriptResult<Ast> {
        if !self.library.contains(&name) {
            return Err(self.err_at(line, column, format!("unknown function '{name}'")));
        }
        self.expect(&TokenKind::LParen, "'('")?;

        let mut args: Vec<CallArg> = Vec::new();
        if self.peek_kind() != Some(&TokenKind::RParen) {
            let named = self.at_named_arg();
            loop {
                if self.at_named_arg() != named {
                    return Err(self.err_here(format!(
                        "cannot mix named and positional arguments in call to '{name}'"
                    )));
                }
                if named {
                    let Some(TokenKind::Ident(arg_name)) = self.peek_kind().cloned() else {
                        return Err(self.err_here("expected argument name"));
                    };
                    self.bump();
                    self.expect(&TokenKind::Eq, "'=' after argument name")?;
                    let value = self.boolean()?;
                    args.push(CallArg::Named {
                        name: arg_name,
                        value,
                    });
                } else {
                    args.push(CallArg::Positional(self.boolean()?));
                }
                if self.peek_kind() == Some(&TokenKind::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')' to close argument list")?;
        Ok(Ast::FunctionCall { name, args })
    }

    fn at_named_arg(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(_)))
            && self.peek2_kind() == Some(&TokenKind::Eq)
    }
}
