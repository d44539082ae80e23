// src/frontend/parse_expr.rs
//! Expression parsing: precedence climbing over the shared operator table,
//! with postfix member access, calls, and indexers.

use crate::errors::ParserError;
use crate::frontend::ast::*;
use crate::frontend::parser::{unescape_string, Parser};
use crate::frontend::token::Associativity;
use crate::frontend::Grammar;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ()> {
        self.parse_binary(0)
    }

    /// Precedence climbing. `min_precedence` is exclusive for left-assoc
    /// operators and inclusive for right-assoc ones.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ()> {
        let mut left = self.parse_unary()?;

        loop {
            let grammar = self.current().grammar;
            let Some(info) = grammar.binary_operator() else {
                break;
            };
            if info.precedence < min_precedence {
                break;
            }

            // `as` takes a type on the right, not an expression.
            if grammar == Grammar::KwAs {
                self.advance();
                let target = self.parse_type()?;
                let location = left.location.merge(&target.location);
                left = Expr::new(
                    self.ids.fresh(),
                    location,
                    ExprKind::TypeCast {
                        operand: Box::new(left),
                        target,
                    },
                );
                continue;
            }

            let op = match grammar {
                Grammar::Plus => BinaryOp::Add,
                Grammar::Minus => BinaryOp::Subtract,
                Grammar::Star => BinaryOp::Multiply,
                Grammar::Slash => BinaryOp::Divide,
                Grammar::Percent => BinaryOp::Modulo,
                Grammar::EqEq => BinaryOp::Equal,
                Grammar::BangEq => BinaryOp::NotEqual,
                Grammar::Lt => BinaryOp::Less,
                Grammar::Gt => BinaryOp::Greater,
                Grammar::LtEq => BinaryOp::LessEqual,
                Grammar::GtEq => BinaryOp::GreaterEqual,
                Grammar::AmpAmp => BinaryOp::And,
                Grammar::PipePipe => BinaryOp::Or,
                Grammar::Eq => BinaryOp::Assign,
                Grammar::PlusEq => BinaryOp::AddAssign,
                Grammar::MinusEq => BinaryOp::SubtractAssign,
                Grammar::StarEq => BinaryOp::MultiplyAssign,
                Grammar::SlashEq => BinaryOp::DivideAssign,
                Grammar::PercentEq => BinaryOp::ModuloAssign,
                _ => break,
            };
            self.advance();

            let next_min = match info.associativity {
                Associativity::Left => info.precedence + 1,
                Associativity::Right => info.precedence,
            };
            let right = self.parse_binary(next_min)?;
            let location = left.location.merge(&right.location);
            left = Expr::new(
                self.ids.fresh(),
                location,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ()> {
        let op = match self.current().grammar {
            Grammar::Minus => Some(UnaryOp::Negate),
            Grammar::Bang => Some(UnaryOp::Not),
            Grammar::PlusPlus => Some(UnaryOp::Increment),
            Grammar::MinusMinus => Some(UnaryOp::Decrement),
            _ => None,
        };
        if let Some(op) = op {
            let location = self.advance().location.clone();
            let operand = self.parse_unary()?;
            let location = location.merge(&operand.location);
            return Ok(Expr::new(
                self.ids.fresh(),
                location,
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ()> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current().grammar {
                Grammar::Dot => {
                    self.advance();
                    let name_token = self.consume(Grammar::Identifier, "a member name")?;
                    let location = expr.location.merge(&name_token.location);
                    expr = Expr::new(
                        self.ids.fresh(),
                        location,
                        ExprKind::MemberAccess {
                            base: Box::new(expr),
                            name: name_token.text.clone(),
                            name_location: name_token.location.clone(),
                        },
                    );
                }
                Grammar::LParen => {
                    self.advance();
                    let args = self.parse_argument_list(Grammar::RParen)?;
                    let close = self.consume(Grammar::RParen, "')'")?;
                    let location = expr.location.merge(&close.location);
                    expr = Expr::new(
                        self.ids.fresh(),
                        location,
                        ExprKind::FunctionCall {
                            callee: Box::new(expr),
                            args,
                        },
                    );
                }
                Grammar::LBracket => {
                    self.advance();
                    let indices = self.parse_argument_list(Grammar::RBracket)?;
                    let close = self.consume(Grammar::RBracket, "']'")?;
                    let location = expr.location.merge(&close.location);
                    expr = Expr::new(
                        self.ids.fresh(),
                        location,
                        ExprKind::Indexer {
                            base: Box::new(expr),
                            indices,
                        },
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_argument_list(&mut self, terminator: Grammar) -> Result<Vec<Expr>, ()> {
        let mut args = Vec::new();
        if !self.check(terminator) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(Grammar::Comma) {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ()> {
        let token = self.current().clone();
        match token.grammar {
            Grammar::IntegerLiteral => {
                self.advance();
                match token.text.parse::<i64>() {
                    Ok(value) => Ok(Expr::new(
                        self.ids.fresh(),
                        token.location.clone(),
                        ExprKind::Literal(LiteralValue::Integer(value)),
                    )),
                    Err(_) => {
                        self.error(ParserError::ExpectedExpression {
                            found: token.text.clone(),
                            span: token.location.span(),
                        });
                        self.error_expr(token.location.clone())
                    }
                }
            }
            Grammar::RealLiteral => {
                self.advance();
                match token.text.parse::<f64>() {
                    Ok(value) => Ok(Expr::new(
                        self.ids.fresh(),
                        token.location.clone(),
                        ExprKind::Literal(LiteralValue::Real(value)),
                    )),
                    Err(_) => {
                        self.error(ParserError::ExpectedExpression {
                            found: token.text.clone(),
                            span: token.location.span(),
                        });
                        self.error_expr(token.location.clone())
                    }
                }
            }
            Grammar::StringLiteral => {
                self.advance();
                Ok(Expr::new(
                    self.ids.fresh(),
                    token.location.clone(),
                    ExprKind::Literal(LiteralValue::String(unescape_string(&token.text))),
                ))
            }
            Grammar::StringInterpStart => self.parse_string_interpolant(),
            Grammar::KwTrue => {
                self.advance();
                Ok(Expr::new(
                    self.ids.fresh(),
                    token.location.clone(),
                    ExprKind::Literal(LiteralValue::Boolean(true)),
                ))
            }
            Grammar::KwFalse => {
                self.advance();
                Ok(Expr::new(
                    self.ids.fresh(),
                    token.location.clone(),
                    ExprKind::Literal(LiteralValue::Boolean(false)),
                ))
            }
            Grammar::KwNull => {
                self.advance();
                Ok(Expr::new(
                    self.ids.fresh(),
                    token.location.clone(),
                    ExprKind::Literal(LiteralValue::Null),
                ))
            }
            Grammar::KwThis => {
                self.advance();
                Ok(Expr::new(
                    self.ids.fresh(),
                    token.location.clone(),
                    ExprKind::This,
                ))
            }
            Grammar::Identifier => {
                self.advance();
                Ok(Expr::new(
                    self.ids.fresh(),
                    token.location.clone(),
                    ExprKind::Identifier(token.text.clone()),
                ))
            }
            Grammar::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(Grammar::RParen, "')'")?;
                Ok(expr)
            }
            Grammar::KwNew => {
                self.advance();
                let ty = self.parse_type()?;
                self.consume(Grammar::LParen, "'('")?;
                let args = self.parse_argument_list(Grammar::RParen)?;
                let close = self.consume(Grammar::RParen, "')'")?;
                let mut location = token.location.merge(&close.location);
                let new_expr = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::New { ty, args },
                );

                // Optional initializer list: new Array[Integer]() { 1, 2, 3 }
                if self.check(Grammar::LBrace) {
                    self.advance();
                    let values = self.parse_argument_list(Grammar::RBrace)?;
                    let close = self.consume(Grammar::RBrace, "'}'")?;
                    location = location.merge(&close.location);
                    return Ok(Expr::new(
                        self.ids.fresh(),
                        location,
                        ExprKind::Initializer {
                            base: Box::new(new_expr),
                            values,
                        },
                    ));
                }
                Ok(new_expr)
            }
            _ => {
                self.error(ParserError::ExpectedExpression {
                    found: token.text.clone(),
                    span: token.location.span(),
                });
                self.error_expr(token.location.clone())
            }
        }
    }

    /// `"text{` expr (`}text{` expr)* `}text"` becomes an interpolant node
    /// of interleaved string-literal pieces and expressions.
    fn parse_string_interpolant(&mut self) -> Result<Expr, ()> {
        let start = self.advance().clone();
        let mut pieces = Vec::new();

        // "text{  -> strip leading quote and trailing brace
        let lead = start
            .text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('{'))
            .unwrap_or("");
        if !lead.is_empty() {
            pieces.push(Expr::new(
                self.ids.fresh(),
                start.location.clone(),
                ExprKind::Literal(LiteralValue::String(unescape_string(&format!(
                    "\"{}\"",
                    lead
                )))),
            ));
        }

        loop {
            pieces.push(self.parse_expression()?);
            let token = self.current().clone();
            match token.grammar {
                Grammar::StringInterpMiddle => {
                    self.advance();
                    // }text{
                    let text = token
                        .text
                        .strip_prefix('}')
                        .and_then(|t| t.strip_suffix('{'))
                        .unwrap_or("");
                    if !text.is_empty() {
                        pieces.push(Expr::new(
                            self.ids.fresh(),
                            token.location.clone(),
                            ExprKind::Literal(LiteralValue::String(unescape_string(&format!(
                                "\"{}\"",
                                text
                            )))),
                        ));
                    }
                }
                Grammar::StringInterpEnd => {
                    self.advance();
                    // }text"
                    let text = token
                        .text
                        .strip_prefix('}')
                        .and_then(|t| t.strip_suffix('"'))
                        .unwrap_or("");
                    if !text.is_empty() {
                        pieces.push(Expr::new(
                            self.ids.fresh(),
                            token.location.clone(),
                            ExprKind::Literal(LiteralValue::String(unescape_string(&format!(
                                "\"{}\"",
                                text
                            )))),
                        ));
                    }
                    let location = start.location.merge(&token.location);
                    return Ok(Expr::new(
                        self.ids.fresh(),
                        location,
                        ExprKind::StringInterpolant(pieces),
                    ));
                }
                _ => {
                    self.error(ParserError::UnexpectedToken {
                        expected: "the rest of the interpolated string".into(),
                        found: token.text.clone(),
                        span: token.location.span(),
                    });
                    return Err(());
                }
            }
        }
    }

    /// Tolerant-mode placeholder; a hard error otherwise.
    fn error_expr(&mut self, location: crate::frontend::CodeLocation) -> Result<Expr, ()> {
        if self.diagnostics.tolerant {
            self.advance();
            Ok(Expr::new(self.ids.fresh(), location, ExprKind::Error))
        } else {
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::ast::*;
    use crate::frontend::parser::tests::parse_source;

    fn first_expr(source: &str) -> Expr {
        let (mut program, diags) = parse_source(source);
        assert!(!diags.has_errors(), "{:?}", diags.errors);
        let body = program.classes.remove(0).functions.remove(0).body;
        match body.into_iter().next().unwrap() {
            Statement::Expression(e) => e,
            Statement::Return { value, .. } => value.unwrap(),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = first_expr("class A { function F() : Integer { return 1 + 2 * 3; } }");
        let ExprKind::Binary { op, rhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = first_expr("class A { function F(a : Integer, b : Integer) { a = b = 1; } }");
        let ExprKind::Binary { op, rhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Assign);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Assign,
                ..
            }
        ));
    }

    #[test]
    fn member_access_chain_and_call() {
        let expr = first_expr("class A { function F() { this.Child.Update(1, 2); } }");
        let ExprKind::FunctionCall { callee, args } = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(callee.kind, ExprKind::MemberAccess { .. }));
    }

    #[test]
    fn indexer_with_multiple_indices() {
        let expr = first_expr("class A { function F(g : Grid) { g[1, 2]; } }");
        let ExprKind::Indexer { indices, .. } = expr.kind else {
            panic!("expected indexer");
        };
        assert_eq!(indices.len(), 2);
    }

    #[test]
    fn cast_expression() {
        let expr = first_expr("class A { function F(x : Real) { x as Integer; } }");
        let ExprKind::TypeCast { target, .. } = expr.kind else {
            panic!("expected cast");
        };
        assert_eq!(target.name, "Integer");
    }

    #[test]
    fn new_with_template_type() {
        let expr = first_expr("class A { function F() { new Array[Integer](); } }");
        let ExprKind::New { ty, args } = expr.kind else {
            panic!("expected new");
        };
        assert_eq!(ty.name, "Array");
        assert_eq!(ty.arguments.len(), 1);
        assert!(args.is_empty());
    }

    #[test]
    fn new_with_initializer_list() {
        let expr = first_expr("class A { function F() { new Array[Integer]() { 1, 2, 3 }; } }");
        let ExprKind::Initializer { values, .. } = expr.kind else {
            panic!("expected initializer");
        };
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn string_interpolant_pieces() {
        let expr = first_expr("class A { function F(x : Integer) { \"x = {x}!\"; } }");
        let ExprKind::StringInterpolant(pieces) = expr.kind else {
            panic!("expected interpolant");
        };
        // "x = ", x, "!"
        assert_eq!(pieces.len(), 3);
        assert!(matches!(
            pieces[0].kind,
            ExprKind::Literal(LiteralValue::String(_))
        ));
        assert!(matches!(pieces[1].kind, ExprKind::Identifier(_)));
    }

    #[test]
    fn unary_operators() {
        let expr = first_expr("class A { function F(x : Integer) { ++x; } }");
        assert!(matches!(
            expr.kind,
            ExprKind::Unary {
                op: UnaryOp::Increment,
                ..
            }
        ));
    }
}
