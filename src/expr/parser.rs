use crate::{
    error::ExpressionError,
    expr::lexer::{Token, TokenKind, tokenize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Syntax tree of a label expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    Bool(bool),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Ast>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Call {
        name: String,
        args: Vec<Ast>,
    },
}

impl Ast {
    /// Folds the node into a number if it only contains literals and arithmetic.
    pub fn const_value(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.const_value().map(|v| -v),
            Self::Binary { op, lhs, rhs } => {
                let (l, r) = (lhs.const_value()?, rhs.const_value()?);
                match op {
                    BinaryOp::Add => Some(l + r),
                    BinaryOp::Sub => Some(l - r),
                    BinaryOp::Mul => Some(l * r),
                    BinaryOp::Div => Some(l / r),
                    BinaryOp::Rem => Some(l % r),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Visits every node depth-first, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Ast)) {
        visit(self);
        match self {
            Self::Unary { operand, .. } => operand.walk(visit),
            Self::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Self::Number(_) | Self::Bool(_) | Self::Var(_) => {}
        }
    }

    /// Free variable names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        self.walk(&mut |node| {
            if let Ast::Var(name) = node
                && !out.contains(name)
            {
                out.push(name.clone());
            }
        });
        out
    }
}

/// A user function definition: `name(p1, p2) = body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub params: Vec<String>,
    pub body: Ast,
}

pub fn parse_expression(src: &str) -> Result<Ast, ExpressionError> {
    let mut parser = Parser::new(src)?;
    let ast = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(ast)
}

pub fn parse_definition(src: &str) -> Result<Definition, ExpressionError> {
    let mut parser = Parser::new(src)?;
    let name = parser.expect_ident()?;
    parser.expect(TokenKind::LParen, "'('")?;

    let mut params = Vec::new();
    if !parser.eat(&TokenKind::RParen) {
        loop {
            let param = parser.expect_ident()?;
            if params.contains(&param) {
                return Err(parser.error(format!("duplicate parameter '{param}'")));
            }
            params.push(param);
            if parser.eat(&TokenKind::RParen) {
                break;
            }
            parser.expect(TokenKind::Comma, "',' or ')'")?;
        }
    }

    parser.expect(TokenKind::Assign, "'='")?;
    let body = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(Definition { name, params, body })
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ExpressionError> {
        Ok(Self {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: String) -> ExpressionError {
        ExpressionError::Parse {
            expr: self.src.to_string(),
            pos: self.tokens[self.pos].pos,
            msg,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ExpressionError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ExpressionError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_eof(&self) -> Result<(), ExpressionError> {
        match self.peek() {
            TokenKind::Eof => Ok(()),
            other => Err(self.error(format!("unexpected trailing token {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Pipe) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&TokenKind::Amp) {
            let rhs = self.parse_comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::GtEq,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Ast, ExpressionError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Tilde | TokenKind::Bang => UnaryOp::Not,
            TokenKind::Plus => {
                self.advance();
                return self.parse_unary();
            }
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;

        // Fold negative literals so `shift(x, -1)` carries a plain constant.
        if let (UnaryOp::Neg, Ast::Number(v)) = (op, &operand) {
            return Ok(Ast::Number(-v));
        }
        Ok(Ast::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Ast, ExpressionError> {
        let start = self.pos;
        match self.advance() {
            TokenKind::Number(v) => Ok(Ast::Number(v)),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Ast::Call { name, args });
                }
                Ok(match name.as_str() {
                    "NaN" | "nan" => Ast::Number(f64::NAN),
                    "True" | "true" => Ast::Bool(true),
                    "False" | "false" => Ast::Bool(false),
                    _ => Ast::Var(name),
                })
            }
            other => {
                self.pos = start;
                Err(self.error(format!("unexpected token {other:?}")))
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Ast>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(TokenKind::Comma, "',' or ')'")?;
        }
    }
}

fn binary(op: BinaryOp, lhs: Ast, rhs: Ast) -> Ast {
    Ast::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Ast> {
        Box::new(Ast::Var(name.to_string()))
    }

    #[test]
    fn test_parse_forward_return() {
        let ast = parse_expression("shift(close,-1)/close").unwrap();
        assert_eq!(
            ast,
            Ast::Binary {
                op: BinaryOp::Div,
                lhs: Box::new(Ast::Call {
                    name: "shift".to_string(),
                    args: vec![Ast::Var("close".to_string()), Ast::Number(-1.0)],
                }),
                rhs: var("close"),
            }
        );
    }

    #[test]
    fn test_precedence() {
        // a + b * c > d & e  ==  ((a + (b * c)) > d) & e
        let ast = parse_expression("a + b * c > d & e").unwrap();
        let expected = Ast::Binary {
            op: BinaryOp::And,
            lhs: Box::new(Ast::Binary {
                op: BinaryOp::Gt,
                lhs: Box::new(Ast::Binary {
                    op: BinaryOp::Add,
                    lhs: var("a"),
                    rhs: Box::new(Ast::Binary {
                        op: BinaryOp::Mul,
                        lhs: var("b"),
                        rhs: var("c"),
                    }),
                }),
                rhs: var("d"),
            }),
            rhs: var("e"),
        };
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_variables_are_unique_and_ordered() {
        let ast = parse_expression("where(shift(high, -1) == shift(low, -1), NaN, label)").unwrap();
        assert_eq!(ast.variables(), vec!["high", "low", "label"]);
    }

    #[test]
    fn test_const_value_folds_arithmetic() {
        let ast = parse_expression("-(2 * 3) + 1").unwrap();
        assert_eq!(ast.const_value(), Some(-5.0));
        assert_eq!(parse_expression("close + 1").unwrap().const_value(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expression("shift(close, ").is_err());
        assert!(parse_expression("close close").is_err());
        assert!(parse_expression("").is_err());
        assert!(parse_expression("(close").is_err());
    }

    #[test]
    fn test_parse_definition() {
        let def = parse_definition("ret(x, n) = shift(x, -n) / x").unwrap();
        assert_eq!(def.name, "ret");
        assert_eq!(def.params, vec!["x", "n"]);
        assert_eq!(def.body.variables(), vec!["x", "n"]);

        assert!(parse_definition("ret(x, x) = x").is_err());
        assert!(parse_definition("ret(x) x").is_err());
    }
}
