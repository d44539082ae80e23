// src/frontend/parser.rs
//! Recursive-descent parser over the token stream. Declarations live here;
//! statements and expressions are in `parse_stmt` / `parse_expr`.
//!
//! The first grammar violation aborts parsing, except in tolerant mode where
//! the parser records the diagnostic, inserts a placeholder node, and
//! resynchronizes so editor features keep working on malformed programs.

use crate::errors::{Diagnostics, ParserError};
use crate::frontend::ast::*;
use crate::frontend::{CodeLocation, Grammar, Token};

pub struct Parser<'a> {
    pub(crate) tokens: &'a [Token],
    pub(crate) index: usize,
    pub(crate) ids: NodeIdGen,
    pub(crate) diagnostics: &'a mut Diagnostics,
}

/// Parse a full token stream into a program.
pub fn parse(tokens: &[Token], diagnostics: &mut Diagnostics) -> Program {
    if tokens.is_empty() {
        return Program::default();
    }
    let mut parser = Parser {
        tokens,
        index: 0,
        ids: NodeIdGen::default(),
        diagnostics,
    };
    parser.parse_program()
}

impl<'a> Parser<'a> {
    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while !self.at_end() {
            let attributes = match self.parse_attributes() {
                Ok(a) => a,
                Err(()) => {
                    if !self.recover_to_declaration() {
                        break;
                    }
                    continue;
                }
            };
            let result = match self.current().grammar {
                Grammar::KwClass | Grammar::KwStruct => self
                    .parse_class(attributes)
                    .map(|c| program.classes.push(c)),
                Grammar::KwEnum | Grammar::KwFlags => {
                    self.parse_enum(attributes).map(|e| program.enums.push(e))
                }
                _ => {
                    let token = self.current().clone();
                    self.error(ParserError::ExpectedDeclaration {
                        found: token.text.clone(),
                        span: token.location.span(),
                    });
                    Err(())
                }
            };
            if result.is_err() && !self.recover_to_declaration() {
                break;
            }
        }

        program.ids = std::mem::take(&mut self.ids);
        program
    }

    /// `[Name]` or `[Name(literal, ...)]`, repeated.
    fn parse_attributes(&mut self) -> Result<Vec<AttributeNode>, ()> {
        let mut attributes: Vec<AttributeNode> = Vec::new();
        while self.check(Grammar::LBracket) {
            // Peek past the bracket: attributes only start with an identifier,
            // anything else is an indexer belonging to an expression.
            if self.peek(1).map(|t| t.grammar) != Some(Grammar::Identifier) {
                break;
            }
            let start = self.advance().location.clone();
            let name_token = self.consume(Grammar::Identifier, "an attribute name")?;
            let name = name_token.text.clone();

            if attributes.iter().any(|a| a.name == name) {
                self.error(ParserError::DuplicateAttribute {
                    name: name.clone(),
                    span: name_token.location.span(),
                });
                return Err(());
            }

            let mut arguments = Vec::new();
            if self.match_token(Grammar::LParen) {
                if !self.check(Grammar::RParen) {
                    loop {
                        arguments.push(self.parse_literal_value()?);
                        if !self.match_token(Grammar::Comma) {
                            break;
                        }
                    }
                }
                self.consume(Grammar::RParen, "')'")?;
            }
            let end = self.consume(Grammar::RBracket, "']'")?.location.clone();
            attributes.push(AttributeNode {
                name,
                arguments,
                location: start.merge(&end),
            });
        }
        Ok(attributes)
    }

    fn parse_literal_value(&mut self) -> Result<LiteralValue, ()> {
        let token = self.advance().clone();
        match token.grammar {
            Grammar::IntegerLiteral => token
                .text
                .parse::<i64>()
                .map(LiteralValue::Integer)
                .map_err(|_| self.literal_error(&token)),
            Grammar::RealLiteral => token
                .text
                .parse::<f64>()
                .map(LiteralValue::Real)
                .map_err(|_| self.literal_error(&token)),
            Grammar::StringLiteral => Ok(LiteralValue::String(unescape_string(&token.text))),
            Grammar::KwTrue => Ok(LiteralValue::Boolean(true)),
            Grammar::KwFalse => Ok(LiteralValue::Boolean(false)),
            Grammar::KwNull => Ok(LiteralValue::Null),
            _ => {
                self.error(ParserError::ExpectedExpression {
                    found: token.text.clone(),
                    span: token.location.span(),
                });
                Err(())
            }
        }
    }

    fn literal_error(&mut self, token: &Token) {
        self.error(ParserError::ExpectedExpression {
            found: token.text.clone(),
            span: token.location.span(),
        });
    }

    fn parse_class(&mut self, attributes: Vec<AttributeNode>) -> Result<ClassNode, ()> {
        let keyword = self.advance().clone();
        let is_struct = keyword.grammar == Grammar::KwStruct;
        let name_token = self.consume(Grammar::Identifier, "a type name")?;
        let name = name_token.text.clone();
        let name_location = name_token.location.clone();

        // Template parameters: class Pair[KeyType, ValueType]
        let mut template_params = Vec::new();
        if self.match_token(Grammar::LBracket) {
            loop {
                let param = self.consume(Grammar::Identifier, "a template parameter name")?;
                template_params.push((param.text.clone(), param.location.clone()));
                if !self.match_token(Grammar::Comma) {
                    break;
                }
            }
            self.consume(Grammar::RBracket, "']'")?;
        }

        let mut base = None;
        if self.match_token(Grammar::Colon) {
            base = Some(self.parse_type()?);
            if self.check(Grammar::Comma) {
                let span = self.current().location.span();
                self.error(ParserError::MultipleBaseTypes { span });
                return Err(());
            }
        }

        self.consume(Grammar::LBrace, "'{'")?;

        let mut class = ClassNode {
            name,
            name_location,
            location: keyword.location.clone(),
            is_struct,
            base,
            template_params,
            attributes,
            sends: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
            constructors: Vec::new(),
            destructor: None,
        };

        while !self.check(Grammar::RBrace) && !self.at_end() {
            if self.parse_member(&mut class).is_err() {
                if self.diagnostics.tolerant {
                    if !self.recover_to_member() {
                        break;
                    }
                } else {
                    return Err(());
                }
            }
        }

        let close = self.consume(Grammar::RBrace, "'}'")?;
        class.location = class.location.merge(&close.location);
        Ok(class)
    }

    fn parse_member(&mut self, class: &mut ClassNode) -> Result<(), ()> {
        let attributes = self.parse_attributes()?;
        match self.current().grammar {
            Grammar::KwVar => {
                let variable = self.parse_member_variable(attributes)?;
                class.variables.push(variable);
            }
            Grammar::KwFunction => {
                let function = self.parse_function(attributes)?;
                class.functions.push(function);
            }
            Grammar::KwConstructor => {
                let constructor = self.parse_constructor(attributes)?;
                class.constructors.push(constructor);
            }
            Grammar::KwDestructor => {
                let destructor = self.parse_destructor(attributes)?;
                class.destructor = Some(destructor);
            }
            Grammar::KwSends => {
                let keyword = self.advance().location.clone();
                let name = self.consume(Grammar::Identifier, "an event name")?.text.clone();
                self.consume(Grammar::Colon, "':'")?;
                let event_type = self.parse_type()?;
                self.consume(Grammar::Semicolon, "';'")?;
                class.sends.push(SendsNode {
                    name,
                    event_type,
                    location: keyword,
                });
            }
            _ => {
                let token = self.current().clone();
                self.error(ParserError::UnexpectedToken {
                    expected: "a member declaration".into(),
                    found: token.text.clone(),
                    span: token.location.span(),
                });
                return Err(());
            }
        }
        Ok(())
    }

    /// `var Name : Type = init;` or `var Name : Type { get {...} set {...} }`
    fn parse_member_variable(
        &mut self,
        attributes: Vec<AttributeNode>,
    ) -> Result<MemberVariableNode, ()> {
        let keyword = self.advance().location.clone();
        let name = self.consume(Grammar::Identifier, "a member name")?.text.clone();
        self.consume(Grammar::Colon, "':'")?;
        let ty = self.parse_type()?;

        let mut initializer = None;
        let mut property = None;

        if self.match_token(Grammar::Eq) {
            initializer = Some(self.parse_expression()?);
            self.consume(Grammar::Semicolon, "';'")?;
        } else if self.match_token(Grammar::LBrace) {
            let mut get = None;
            let mut set = None;
            loop {
                if self.match_token(Grammar::KwGet) {
                    self.consume(Grammar::LBrace, "'{'")?;
                    get = Some(self.parse_statement_block()?);
                } else if self.match_token(Grammar::KwSet) {
                    self.consume(Grammar::LBrace, "'{'")?;
                    set = Some(self.parse_statement_block()?);
                } else {
                    break;
                }
            }
            let close = self.consume(Grammar::RBrace, "'}'")?;
            if get.is_none() && set.is_none() {
                self.error(ParserError::EmptyProperty {
                    span: close.location.span(),
                });
                return Err(());
            }
            property = Some(PropertyBody { get, set });
        } else {
            self.consume(Grammar::Semicolon, "';'")?;
        }

        Ok(MemberVariableNode {
            name,
            location: keyword,
            attributes,
            ty,
            initializer,
            property,
        })
    }

    fn parse_function(&mut self, attributes: Vec<AttributeNode>) -> Result<FunctionNode, ()> {
        let keyword = self.advance().location.clone();
        let name_token = self.consume(Grammar::Identifier, "a function name")?;
        let name = name_token.text.clone();
        let name_location = name_token.location.clone();
        let params = self.parse_parameter_list()?;

        let mut return_type = None;
        if self.match_token(Grammar::Colon) {
            return_type = Some(self.parse_type()?);
        }

        self.consume(Grammar::LBrace, "'{'")?;
        let body = self.parse_statement_block()?;

        Ok(FunctionNode {
            name,
            name_location,
            location: keyword,
            kind: FunctionKind::Function,
            attributes,
            params,
            return_type,
            body,
        })
    }

    fn parse_constructor(&mut self, attributes: Vec<AttributeNode>) -> Result<FunctionNode, ()> {
        let keyword = self.advance().location.clone();
        let params = self.parse_parameter_list()?;
        self.consume(Grammar::LBrace, "'{'")?;
        let body = self.parse_statement_block()?;
        Ok(FunctionNode {
            name: "Constructor".into(),
            name_location: keyword.clone(),
            location: keyword,
            kind: FunctionKind::Constructor,
            attributes,
            params,
            return_type: None,
            body,
        })
    }

    fn parse_destructor(&mut self, attributes: Vec<AttributeNode>) -> Result<FunctionNode, ()> {
        let keyword = self.advance().location.clone();
        self.consume(Grammar::LParen, "'('")?;
        if !self.check(Grammar::RParen) {
            let span = self.current().location.span();
            self.error(ParserError::DestructorWithParameters { span });
            return Err(());
        }
        self.consume(Grammar::RParen, "')'")?;
        self.consume(Grammar::LBrace, "'{'")?;
        let body = self.parse_statement_block()?;
        Ok(FunctionNode {
            name: "Destructor".into(),
            name_location: keyword.clone(),
            location: keyword,
            kind: FunctionKind::Destructor,
            attributes,
            params: Vec::new(),
            return_type: None,
            body,
        })
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<ParamNode>, ()> {
        self.consume(Grammar::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(Grammar::RParen) {
            loop {
                let name_token = self.consume(Grammar::Identifier, "a parameter name")?;
                self.consume(Grammar::Colon, "':'")?;
                let ty = self.parse_type()?;
                params.push(ParamNode {
                    name: name_token.text.clone(),
                    ty,
                    location: name_token.location.clone(),
                });
                if !self.match_token(Grammar::Comma) {
                    break;
                }
            }
        }
        self.consume(Grammar::RParen, "')'")?;
        Ok(params)
    }

    fn parse_enum(&mut self, attributes: Vec<AttributeNode>) -> Result<EnumNode, ()> {
        let keyword = self.advance().clone();
        let is_flags = keyword.grammar == Grammar::KwFlags;
        let name = self.consume(Grammar::Identifier, "an enum name")?.text.clone();
        self.consume(Grammar::LBrace, "'{'")?;

        let mut values = Vec::new();
        while !self.check(Grammar::RBrace) && !self.at_end() {
            let value_name = self.consume(Grammar::Identifier, "an enum value name")?;
            let mut value = None;
            if self.match_token(Grammar::Eq) {
                let literal = self.consume(Grammar::IntegerLiteral, "an integer value")?;
                value = literal.text.parse::<i64>().ok();
            }
            values.push(EnumValueNode {
                name: value_name.text.clone(),
                value,
                location: value_name.location.clone(),
            });
            if !self.match_token(Grammar::Comma) {
                break;
            }
        }
        self.consume(Grammar::RBrace, "'}'")?;

        Ok(EnumNode {
            name,
            location: keyword.location.clone(),
            is_flags,
            attributes,
            values,
        })
    }

    /// `ref Name[Arg, ...]`
    pub(crate) fn parse_type(&mut self) -> Result<SyntaxTypeNode, ()> {
        let is_ref = self.match_token(Grammar::KwRef);
        let token = self.current().clone();
        let name = match token.grammar {
            Grammar::Identifier => self.advance().text.clone(),
            Grammar::KwAny => {
                self.advance();
                "Any".to_string()
            }
            _ => {
                self.error(ParserError::ExpectedType {
                    found: token.text.clone(),
                    span: token.location.span(),
                });
                return Err(());
            }
        };

        let mut arguments = Vec::new();
        if self.match_token(Grammar::LBracket) {
            loop {
                arguments.push(self.parse_type()?);
                if !self.match_token(Grammar::Comma) {
                    break;
                }
            }
            self.consume(Grammar::RBracket, "']'")?;
        }

        Ok(SyntaxTypeNode {
            name,
            arguments,
            is_ref,
            location: token.location.clone(),
        })
    }

    // ----- token stream helpers -----

    pub(crate) fn current(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[self.index.min(tokens.len() - 1)]
    }

    pub(crate) fn peek(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.index + offset)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.current().grammar == Grammar::End
    }

    pub(crate) fn advance(&mut self) -> &'a Token {
        let tokens = self.tokens;
        let token = &tokens[self.index.min(tokens.len() - 1)];
        if self.index < tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    pub(crate) fn check(&self, grammar: Grammar) -> bool {
        self.current().grammar == grammar
    }

    pub(crate) fn match_token(&mut self, grammar: Grammar) -> bool {
        if self.check(grammar) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, grammar: Grammar, expected: &str) -> Result<Token, ()> {
        if self.check(grammar) {
            Ok(self.advance().clone())
        } else {
            let token = self.current().clone();
            self.error(ParserError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.text.clone(),
                span: token.location.span(),
            });
            Err(())
        }
    }

    pub(crate) fn error(&mut self, error: ParserError) {
        let location = self.current().location.clone();
        self.diagnostics.parser_error(error, location);
    }

    pub(crate) fn fresh_location(&self) -> CodeLocation {
        self.current().location.clone()
    }

    /// Skip forward to the next plausible declaration start. Returns false
    /// at end of stream. Used only in tolerant mode (strict mode stops at
    /// the first error).
    fn recover_to_declaration(&mut self) -> bool {
        if !self.diagnostics.tolerant {
            return false;
        }
        while !self.at_end() {
            match self.current().grammar {
                Grammar::KwClass
                | Grammar::KwStruct
                | Grammar::KwEnum
                | Grammar::KwFlags => return true,
                _ => {
                    self.advance();
                }
            }
        }
        false
    }

    /// Skip forward to the next plausible member start inside a class body.
    fn recover_to_member(&mut self) -> bool {
        while !self.at_end() {
            match self.current().grammar {
                Grammar::KwVar
                | Grammar::KwFunction
                | Grammar::KwConstructor
                | Grammar::KwDestructor
                | Grammar::KwSends
                | Grammar::RBrace => return true,
                Grammar::Semicolon => {
                    self.advance();
                    return true;
                }
                _ => {
                    self.advance();
                }
            }
        }
        false
    }
}

/// Strip the surrounding quotes and process escape sequences.
pub(crate) fn unescape_string(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .unwrap_or(text)
        .strip_suffix('"')
        .unwrap_or(text);
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some('{') => result.push('{'),
                Some('}') => result.push('}'),
                Some(other) => result.push(other),
                None => {}
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frontend::{lexer, CodeEntry};

    pub(crate) fn parse_source(source: &str) -> (Program, Diagnostics) {
        let entry = CodeEntry::new(source, "test");
        let mut tokens = Vec::new();
        let mut comments = Vec::new();
        let mut diagnostics = Diagnostics::new();
        lexer::tokenize_entry(&entry, &mut tokens, &mut comments, &mut diagnostics);
        let program = parse(&tokens, &mut diagnostics);
        (program, diagnostics)
    }

    #[test]
    fn parse_simple_class() {
        let (program, diags) = parse_source(
            "class Foo { var X : Integer = 5; function Bump() { this.X += 1; } }",
        );
        assert!(!diags.has_errors(), "{:?}", diags.errors);
        assert_eq!(program.classes.len(), 1);
        let class = &program.classes[0];
        assert_eq!(class.name, "Foo");
        assert!(!class.is_struct);
        assert_eq!(class.variables.len(), 1);
        assert_eq!(class.functions.len(), 1);
        assert_eq!(class.functions[0].name, "Bump");
    }

    #[test]
    fn parse_struct_with_base_error() {
        let (program, diags) = parse_source("struct Vec2 { var X : Real = 0.0; var Y : Real = 0.0; }");
        assert!(!diags.has_errors());
        assert!(program.classes[0].is_struct);
        assert_eq!(program.classes[0].variables.len(), 2);
    }

    #[test]
    fn parse_inheritance() {
        let (program, diags) = parse_source("class Base { } class Derived : Base { }");
        assert!(!diags.has_errors());
        assert_eq!(program.classes.len(), 2);
        assert_eq!(
            program.classes[1].base.as_ref().unwrap().name,
            "Base"
        );
    }

    #[test]
    fn parse_template_class() {
        let (program, diags) = parse_source("class Pair[KeyType, ValueType] { }");
        assert!(!diags.has_errors());
        let class = &program.classes[0];
        assert!(class.is_template());
        assert_eq!(class.template_params.len(), 2);
    }

    #[test]
    fn parse_property_with_get_set() {
        let (program, diags) = parse_source(
            "class Foo { var Count : Integer { get { return 1; } set { } } }",
        );
        assert!(!diags.has_errors());
        let member = &program.classes[0].variables[0];
        let property = member.property.as_ref().unwrap();
        assert!(property.get.is_some());
        assert!(property.set.is_some());
    }

    #[test]
    fn parse_attributes_on_members() {
        let (program, diags) =
            parse_source("class Foo { [Static] var X : Integer = 0; [Virtual] function F() { } }");
        assert!(!diags.has_errors());
        assert!(program.classes[0].variables[0].is_static());
        assert!(program.classes[0].functions[0].has_attribute("Virtual"));
    }

    #[test]
    fn parse_enum_values() {
        let (program, diags) = parse_source("enum Color { Red, Green = 5, Blue }");
        assert!(!diags.has_errors());
        let node = &program.enums[0];
        assert_eq!(node.values.len(), 3);
        assert_eq!(node.values[1].value, Some(5));
    }

    #[test]
    fn parse_sends_declaration() {
        let (program, diags) =
            parse_source("class Foo { sends Damaged : Integer; }");
        assert!(!diags.has_errors());
        assert_eq!(program.classes[0].sends.len(), 1);
        assert_eq!(program.classes[0].sends[0].name, "Damaged");
    }

    #[test]
    fn parse_constructor_and_destructor() {
        let (program, diags) =
            parse_source("class Foo { constructor(x : Integer) { } destructor() { } }");
        assert!(!diags.has_errors());
        assert_eq!(program.classes[0].constructors.len(), 1);
        assert!(program.classes[0].destructor.is_some());
    }

    #[test]
    fn strict_mode_stops_at_first_error() {
        let (program, diags) = parse_source("class Foo { var : ; } class Bar { }");
        assert!(diags.has_errors());
        // Bar is never reached: the first error wins.
        assert!(program.classes.iter().all(|c| c.name != "Bar"));
    }

    #[test]
    fn tolerant_mode_continues_past_errors() {
        let entry = CodeEntry::new("class Foo { var : ; } class Bar { }", "test");
        let mut tokens = Vec::new();
        let mut comments = Vec::new();
        let mut diagnostics = Diagnostics::tolerant();
        lexer::tokenize_entry(&entry, &mut tokens, &mut comments, &mut diagnostics);
        let program = parse(&tokens, &mut diagnostics);
        assert!(diagnostics.has_errors());
        assert!(program.classes.iter().any(|c| c.name == "Bar"));
    }

    #[test]
    fn duplicate_attribute_rejected() {
        let (_, diags) = parse_source("class Foo { [Static] [Static] var X : Integer = 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn unescape_handles_sequences() {
        assert_eq!(unescape_string("\"a\\nb\""), "a\nb");
        assert_eq!(unescape_string("\"say \\\"hi\\\"\""), "say \"hi\"");
        assert_eq!(unescape_string("\"plain\""), "plain");
    }
}
