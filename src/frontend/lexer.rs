// src/frontend/lexer.rs
//! The tokenizer. It never fails outright: malformed input produces an
//! `Error` token plus a collected diagnostic, and scanning continues so the
//! parser can attempt recovery in tolerant mode.

use crate::errors::{Diagnostics, LexerError};
use crate::frontend::{CodeEntry, CodeLocation, Grammar, Token};

pub struct Tokenizer<'src> {
    source: &'src str,
    origin: &'src str,
    code_hash: u64,
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
    start: usize,
    current: usize,
    line: u32,
    character: u32,
    start_line: u32,
    start_character: u32,
    // Interpolation state
    interp_brace_depth: u32,
    in_interp_string: bool,
}

/// Tokenize one code entry, appending to the shared token and comment
/// streams. Concatenating entries keeps one monotonically increasing token
/// index; line/character counters reset per entry.
pub fn tokenize_entry(
    entry: &CodeEntry,
    tokens: &mut Vec<Token>,
    comments: &mut Vec<Token>,
    diagnostics: &mut Diagnostics,
) {
    let mut tokenizer = Tokenizer::new(&entry.code, &entry.origin, entry.code_hash);
    loop {
        let token = tokenizer.next_token(diagnostics);
        if token.grammar == Grammar::End {
            tokens.push(token);
            break;
        }
        if token.grammar == Grammar::Comment {
            comments.push(token);
        } else {
            tokens.push(token);
        }
    }
}

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str, origin: &'src str, code_hash: u64) -> Self {
        Self {
            source,
            origin,
            code_hash,
            chars: source.char_indices().peekable(),
            start: 0,
            current: 0,
            line: 1,
            character: 1,
            start_line: 1,
            start_character: 1,
            interp_brace_depth: 0,
            in_interp_string: false,
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self, diagnostics: &mut Diagnostics) -> Token {
        self.skip_whitespace();

        self.start = self.current;
        self.start_line = self.line;
        self.start_character = self.character;

        let Some(c) = self.advance() else {
            return self.make_token(Grammar::End);
        };

        match c {
            '(' => self.make_token(Grammar::LParen),
            ')' => self.make_token(Grammar::RParen),
            '[' => self.make_token(Grammar::LBracket),
            ']' => self.make_token(Grammar::RBracket),
            '{' => {
                if self.in_interp_string {
                    self.interp_brace_depth += 1;
                }
                self.make_token(Grammar::LBrace)
            }
            '}' => {
                if self.in_interp_string && self.interp_brace_depth > 0 {
                    self.interp_brace_depth -= 1;
                    if self.interp_brace_depth == 0 {
                        return self.string_interp_continue(diagnostics);
                    }
                }
                self.make_token(Grammar::RBrace)
            }
            ',' => self.make_token(Grammar::Comma),
            ':' => self.make_token(Grammar::Colon),
            ';' => self.make_token(Grammar::Semicolon),
            '.' => self.make_token(Grammar::Dot),
            '+' => {
                if self.match_char('=') {
                    self.make_token(Grammar::PlusEq)
                } else if self.match_char('+') {
                    self.make_token(Grammar::PlusPlus)
                } else {
                    self.make_token(Grammar::Plus)
                }
            }
            '-' => {
                if self.match_char('=') {
                    self.make_token(Grammar::MinusEq)
                } else if self.match_char('-') {
                    self.make_token(Grammar::MinusMinus)
                } else {
                    self.make_token(Grammar::Minus)
                }
            }
            '*' => {
                if self.match_char('=') {
                    self.make_token(Grammar::StarEq)
                } else {
                    self.make_token(Grammar::Star)
                }
            }
            '%' => {
                if self.match_char('=') {
                    self.make_token(Grammar::PercentEq)
                } else {
                    self.make_token(Grammar::Percent)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(Grammar::EqEq)
                } else {
                    self.make_token(Grammar::Eq)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(Grammar::BangEq)
                } else {
                    self.make_token(Grammar::Bang)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(Grammar::LtEq)
                } else {
                    self.make_token(Grammar::Lt)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(Grammar::GtEq)
                } else {
                    self.make_token(Grammar::Gt)
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(Grammar::AmpAmp)
                } else {
                    self.error_unexpected_char('&', diagnostics)
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(Grammar::PipePipe)
                } else {
                    self.error_unexpected_char('|', diagnostics)
                }
            }
            '/' => {
                if self.match_char('/') {
                    self.line_comment()
                } else if self.match_char('*') {
                    self.block_comment(diagnostics)
                } else if self.match_char('=') {
                    self.make_token(Grammar::SlashEq)
                } else {
                    self.make_token(Grammar::Slash)
                }
            }
            '"' => self.string(diagnostics),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            _ => self.error_unexpected_char(c, diagnostics),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((idx, c)) = self.chars.next() {
            self.current = idx + c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.character = 1;
            } else {
                self.character += 1;
            }
            Some(c)
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn location(&self) -> CodeLocation {
        CodeLocation {
            origin: self.origin.to_string(),
            code_hash: self.code_hash,
            start_line: self.start_line,
            start_character: self.start_character,
            start_position: self.start,
            primary_line: self.start_line,
            primary_character: self.start_character,
            primary_position: self.start,
            end_line: self.line,
            end_character: self.character,
            end_position: self.current,
            class_name: None,
            function_name: None,
            is_native: false,
        }
    }

    fn make_token(&self, grammar: Grammar) -> Token {
        let text = &self.source[self.start..self.current];
        Token::new(grammar, text, self.location())
    }

    fn error_unexpected_char(&mut self, c: char, diagnostics: &mut Diagnostics) -> Token {
        let location = self.location();
        diagnostics.lexer_error(
            LexerError::UnexpectedCharacter {
                ch: c,
                span: location.span(),
            },
            location.clone(),
        );
        Token::new(Grammar::Error, format!("unexpected character '{}'", c), location)
    }

    fn error_unterminated_string(&mut self, diagnostics: &mut Diagnostics) -> Token {
        let location = self.location();
        diagnostics.lexer_error(
            LexerError::UnterminatedString {
                span: location.span(),
            },
            location.clone(),
        );
        Token::new(Grammar::Error, "unterminated string literal", location)
    }

    /// Scan an identifier or keyword.
    fn identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[self.start..self.current];
        let grammar = Grammar::keyword(text).unwrap_or(Grammar::Identifier);
        self.make_token(grammar)
    }

    /// Scan a number literal (integer or real).
    fn number(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') {
            if let Some(next) = self.peek_next() {
                if next.is_ascii_digit() {
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_digit() {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    return self.make_token(Grammar::RealLiteral);
                }
            }
        }

        self.make_token(Grammar::IntegerLiteral)
    }

    /// Scan a string literal, possibly opening an interpolation.
    fn string(&mut self, diagnostics: &mut Diagnostics) -> Token {
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return self.error_unterminated_string(diagnostics);
                }
                Some('"') => {
                    self.advance();
                    return self.make_token(Grammar::StringLiteral);
                }
                Some('\\') => {
                    self.advance();
                    if self.peek().is_some() {
                        self.advance();
                    }
                }
                Some('{') => {
                    self.advance();
                    self.in_interp_string = true;
                    self.interp_brace_depth = 1;
                    return self.make_token(Grammar::StringInterpStart);
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Continue the string after an interpolation expression closes.
    fn string_interp_continue(&mut self, diagnostics: &mut Diagnostics) -> Token {
        // The '}' was just consumed; include it in this token.
        self.start = self.current - 1;

        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    self.in_interp_string = false;
                    return self.make_token(Grammar::StringInterpEnd);
                }
                Some('{') => {
                    self.advance();
                    self.interp_brace_depth = 1;
                    return self.make_token(Grammar::StringInterpMiddle);
                }
                Some('\\') => {
                    self.advance();
                    if self.peek().is_some() {
                        self.advance();
                    }
                }
                Some('\n') | None => {
                    return self.error_unterminated_string(diagnostics);
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Scan a line comment into a comment token.
    fn line_comment(&mut self) -> Token {
        while self.peek().is_some() && self.peek() != Some('\n') {
            self.advance();
        }
        self.make_token(Grammar::Comment)
    }

    /// Scan a block comment, reporting if it never terminates.
    fn block_comment(&mut self, diagnostics: &mut Diagnostics) -> Token {
        loop {
            match self.advance() {
                None => {
                    let location = self.location();
                    diagnostics.lexer_error(
                        LexerError::UnterminatedComment {
                            span: location.span(),
                        },
                        location.clone(),
                    );
                    return Token::new(Grammar::Error, "unterminated block comment", location);
                }
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return self.make_token(Grammar::Comment);
                }
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> (Vec<Token>, Vec<Token>, Diagnostics) {
        let entry = CodeEntry::new(source, "test");
        let mut tokens = Vec::new();
        let mut comments = Vec::new();
        let mut diagnostics = Diagnostics::new();
        tokenize_entry(&entry, &mut tokens, &mut comments, &mut diagnostics);
        (tokens, comments, diagnostics)
    }

    fn grammars(tokens: &[Token]) -> Vec<Grammar> {
        tokens.iter().map(|t| t.grammar).collect()
    }

    #[test]
    fn lex_class_declaration() {
        let (tokens, _, diags) = lex_all("class Foo { var X : Integer = 5; }");
        assert!(!diags.has_errors());
        assert_eq!(
            grammars(&tokens),
            vec![
                Grammar::KwClass,
                Grammar::Identifier,
                Grammar::LBrace,
                Grammar::KwVar,
                Grammar::Identifier,
                Grammar::Colon,
                Grammar::Identifier,
                Grammar::Eq,
                Grammar::IntegerLiteral,
                Grammar::Semicolon,
                Grammar::RBrace,
                Grammar::End,
            ]
        );
    }

    #[test]
    fn lex_compound_operators() {
        let (tokens, _, _) = lex_all("+= -= *= /= %= ++ --");
        assert_eq!(
            grammars(&tokens),
            vec![
                Grammar::PlusEq,
                Grammar::MinusEq,
                Grammar::StarEq,
                Grammar::SlashEq,
                Grammar::PercentEq,
                Grammar::PlusPlus,
                Grammar::MinusMinus,
                Grammar::End,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        let (tokens, _, _) = lex_all("42 3.14");
        assert_eq!(tokens[0].grammar, Grammar::IntegerLiteral);
        assert_eq!(tokens[0].text, "42");
        assert_eq!(tokens[1].grammar, Grammar::RealLiteral);
        assert_eq!(tokens[1].text, "3.14");
    }

    #[test]
    fn lex_string_interpolation() {
        let (tokens, _, _) = lex_all("\"x = {x}, y = {y}\"");
        assert_eq!(
            grammars(&tokens),
            vec![
                Grammar::StringInterpStart,
                Grammar::Identifier,
                Grammar::StringInterpMiddle,
                Grammar::Identifier,
                Grammar::StringInterpEnd,
                Grammar::End,
            ]
        );
    }

    #[test]
    fn comments_go_to_separate_stream() {
        let (tokens, comments, _) = lex_all("var // doc comment\n/* block */ x");
        assert_eq!(
            grammars(&tokens),
            vec![Grammar::KwVar, Grammar::Identifier, Grammar::End]
        );
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "// doc comment");
        assert_eq!(comments[1].text, "/* block */");
    }

    #[test]
    fn error_token_continues_stream() {
        let (tokens, _, diags) = lex_all("var @ x");
        assert_eq!(
            grammars(&tokens),
            vec![
                Grammar::KwVar,
                Grammar::Error,
                Grammar::Identifier,
                Grammar::End
            ]
        );
        assert_eq!(diags.errors.len(), 1);
    }

    #[test]
    fn unterminated_string_reported() {
        let (tokens, _, diags) = lex_all("\"oops");
        assert_eq!(tokens[0].grammar, Grammar::Error);
        assert!(diags.has_errors());
    }

    #[test]
    fn locations_track_lines_and_characters() {
        let (tokens, _, _) = lex_all("var\n  x");
        let x = &tokens[1];
        assert_eq!(x.location.start_line, 2);
        assert_eq!(x.location.start_character, 3);
        assert_eq!(x.location.origin, "test");
    }

    #[test]
    fn entry_boundary_resets_lines_not_index() {
        let a = CodeEntry::new("var x", "a");
        let b = CodeEntry::new("var y", "b");
        let mut tokens = Vec::new();
        let mut comments = Vec::new();
        let mut diags = Diagnostics::new();
        tokenize_entry(&a, &mut tokens, &mut comments, &mut diags);
        // Drop the End token between entries, as the parser driver does.
        tokens.pop();
        tokenize_entry(&b, &mut tokens, &mut comments, &mut diags);

        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[2].location.origin, "b");
        assert_eq!(tokens[2].location.start_line, 1);
    }
}
