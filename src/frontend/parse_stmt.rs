// src/frontend/parse_stmt.rs
//! Statement parsing.

use crate::errors::ParserError;
use crate::frontend::ast::*;
use crate::frontend::parser::Parser;
use crate::frontend::Grammar;

impl<'a> Parser<'a> {
    /// Parse statements until the closing '}' (which is consumed).
    pub(crate) fn parse_statement_block(&mut self) -> Result<Vec<Statement>, ()> {
        let mut statements = Vec::new();
        while !self.check(Grammar::RBrace) && !self.at_end() {
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(()) => {
                    if self.diagnostics.tolerant {
                        self.recover_to_statement();
                    } else {
                        return Err(());
                    }
                }
            }
        }
        self.consume(Grammar::RBrace, "'}'")?;
        Ok(statements)
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ()> {
        match self.current().grammar {
            Grammar::KwVar => self.parse_local_variable(),
            Grammar::KwIf => self.parse_if(),
            Grammar::KwWhile => {
                let location = self.advance().location.clone();
                self.consume(Grammar::LParen, "'('")?;
                let condition = self.parse_expression()?;
                self.consume(Grammar::RParen, "')'")?;
                self.consume(Grammar::LBrace, "'{'")?;
                let body = self.parse_statement_block()?;
                Ok(Statement::While {
                    condition,
                    body,
                    location,
                })
            }
            Grammar::KwFor => self.parse_for(),
            Grammar::KwLoop => {
                let location = self.advance().location.clone();
                self.consume(Grammar::LBrace, "'{'")?;
                let body = self.parse_statement_block()?;
                Ok(Statement::Loop { body, location })
            }
            Grammar::LBrace => {
                let location = self.advance().location.clone();
                let body = self.parse_statement_block()?;
                Ok(Statement::Scope { body, location })
            }
            Grammar::KwBreak => {
                let location = self.advance().location.clone();
                self.consume(Grammar::Semicolon, "';'")?;
                Ok(Statement::Break(location))
            }
            Grammar::KwContinue => {
                let location = self.advance().location.clone();
                self.consume(Grammar::Semicolon, "';'")?;
                Ok(Statement::Continue(location))
            }
            Grammar::KwReturn => {
                let location = self.advance().location.clone();
                let value = if self.check(Grammar::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume(Grammar::Semicolon, "';'")?;
                Ok(Statement::Return { value, location })
            }
            Grammar::KwThrow => {
                let location = self.advance().location.clone();
                let value = self.parse_expression()?;
                self.consume(Grammar::Semicolon, "';'")?;
                Ok(Statement::Throw { value, location })
            }
            Grammar::KwDelete => {
                let location = self.advance().location.clone();
                let value = self.parse_expression()?;
                self.consume(Grammar::Semicolon, "';'")?;
                Ok(Statement::Delete { value, location })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume(Grammar::Semicolon, "';'")?;
                Ok(Statement::Expression(expr))
            }
        }
    }

    /// `var name (: Type)? = initializer;`
    fn parse_local_variable(&mut self) -> Result<Statement, ()> {
        let location = self.advance().location.clone();
        let name = self.consume(Grammar::Identifier, "a variable name")?.text.clone();
        let mut ty = None;
        if self.match_token(Grammar::Colon) {
            ty = Some(self.parse_type()?);
        }
        self.consume(Grammar::Eq, "'='")?;
        let initializer = self.parse_expression()?;
        self.consume(Grammar::Semicolon, "';'")?;
        Ok(Statement::Var(Box::new(LocalVariableNode {
            name,
            location,
            ty,
            initializer,
        })))
    }

    fn parse_if(&mut self) -> Result<Statement, ()> {
        let mut parts = Vec::new();
        let location = self.advance().location.clone();
        self.consume(Grammar::LParen, "'('")?;
        let condition = self.parse_expression()?;
        self.consume(Grammar::RParen, "')'")?;
        self.consume(Grammar::LBrace, "'{'")?;
        let body = self.parse_statement_block()?;
        parts.push(IfPart {
            condition: Some(condition),
            body,
            location,
        });

        while self.check(Grammar::KwElse) {
            let else_location = self.advance().location.clone();
            if self.check(Grammar::KwIf) {
                self.advance();
                self.consume(Grammar::LParen, "'('")?;
                let condition = self.parse_expression()?;
                self.consume(Grammar::RParen, "')'")?;
                self.consume(Grammar::LBrace, "'{'")?;
                let body = self.parse_statement_block()?;
                parts.push(IfPart {
                    condition: Some(condition),
                    body,
                    location: else_location,
                });
            } else {
                self.consume(Grammar::LBrace, "'{'")?;
                let body = self.parse_statement_block()?;
                parts.push(IfPart {
                    condition: None,
                    body,
                    location: else_location,
                });
                break;
            }
        }

        Ok(Statement::If(parts))
    }

    fn parse_for(&mut self) -> Result<Statement, ()> {
        let location = self.advance().location.clone();
        self.consume(Grammar::LParen, "'('")?;

        let init = if self.check(Grammar::Semicolon) {
            self.advance();
            None
        } else if self.check(Grammar::KwVar) {
            Some(Box::new(self.parse_local_variable()?))
        } else {
            let expr = self.parse_expression()?;
            self.consume(Grammar::Semicolon, "';'")?;
            Some(Box::new(Statement::Expression(expr)))
        };

        let condition = if self.check(Grammar::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(Grammar::Semicolon, "';'")?;

        let increment = if self.check(Grammar::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(Grammar::RParen, "')'")?;
        self.consume(Grammar::LBrace, "'{'")?;
        let body = self.parse_statement_block()?;

        Ok(Statement::For {
            init,
            condition,
            increment,
            body,
            location,
        })
    }

    /// Skip to a statement boundary after an error in tolerant mode.
    fn recover_to_statement(&mut self) {
        while !self.at_end() {
            match self.current().grammar {
                Grammar::Semicolon => {
                    self.advance();
                    return;
                }
                Grammar::RBrace
                | Grammar::KwVar
                | Grammar::KwIf
                | Grammar::KwWhile
                | Grammar::KwFor
                | Grammar::KwLoop
                | Grammar::KwReturn
                | Grammar::KwBreak
                | Grammar::KwContinue
                | Grammar::KwThrow
                | Grammar::KwDelete => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // Shared with parse_decl error paths.
    #[allow(dead_code)]
    pub(crate) fn expected_expression_error(&mut self) {
        let token = self.current().clone();
        self.error(ParserError::ExpectedExpression {
            found: token.text.clone(),
            span: token.location.span(),
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::ast::*;
    use crate::frontend::parser::tests::parse_source;

    fn body_of(source: &str) -> Vec<Statement> {
        let (mut program, diags) = parse_source(source);
        assert!(!diags.has_errors(), "{:?}", diags.errors);
        program.classes.remove(0).functions.remove(0).body
    }

    #[test]
    fn parse_if_else_chain() {
        let body = body_of(
            "class A { function F(x : Integer) {
                if (x > 1) { return; } else if (x > 0) { return; } else { return; }
            } }",
        );
        let Statement::If(parts) = &body[0] else {
            panic!("expected if");
        };
        assert_eq!(parts.len(), 3);
        assert!(parts[0].condition.is_some());
        assert!(parts[2].condition.is_none());
    }

    #[test]
    fn parse_while_and_loop() {
        let body = body_of(
            "class A { function F() { while (true) { break; } loop { continue; } } }",
        );
        assert!(matches!(body[0], Statement::While { .. }));
        assert!(matches!(body[1], Statement::Loop { .. }));
    }

    #[test]
    fn parse_for_with_all_clauses() {
        let body = body_of(
            "class A { function F() { for (var i = 0; i < 10; ++i) { } } }",
        );
        let Statement::For {
            init,
            condition,
            increment,
            ..
        } = &body[0]
        else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(condition.is_some());
        assert!(increment.is_some());
    }

    #[test]
    fn parse_var_with_explicit_type() {
        let body = body_of("class A { function F() { var x : Real = 1.5; } }");
        let Statement::Var(v) = &body[0] else {
            panic!("expected var");
        };
        assert_eq!(v.name, "x");
        assert_eq!(v.ty.as_ref().unwrap().name, "Real");
    }

    #[test]
    fn parse_throw_and_delete() {
        let body = body_of(
            "class A { function F(e : Exception) { throw e; delete this; } }",
        );
        assert!(matches!(body[0], Statement::Throw { .. }));
        assert!(matches!(body[1], Statement::Delete { .. }));
    }
}
