// src/frontend/token.rs

use crate::frontend::CodeLocation;

/// All token kinds in the Quill grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    // Literals
    IntegerLiteral,
    RealLiteral,
    StringLiteral,
    StringInterpStart,  // "text{
    StringInterpMiddle, // }text{
    StringInterpEnd,    // }text"
    Identifier,

    // Keywords
    KwClass,
    KwStruct,
    KwEnum,
    KwFlags,
    KwFunction,
    KwConstructor,
    KwDestructor,
    KwVar,
    KwGet,
    KwSet,
    KwSends,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwLoop,
    KwBreak,
    KwContinue,
    KwReturn,
    KwThrow,
    KwDelete,
    KwNew,
    KwNull,
    KwTrue,
    KwFalse,
    KwThis,
    KwBase,
    KwAs,
    KwRef,
    KwAny,
    KwVoid,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    PlusPlus,
    MinusMinus,
    Eq,
    EqEq,
    BangEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AmpAmp,
    PipePipe,
    Bang,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,

    // Comments (routed to the separate comment stream)
    Comment,

    // Special
    Error,
    End,
}

impl Grammar {
    /// String representation for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntegerLiteral => "integer literal",
            Self::RealLiteral => "real literal",
            Self::StringLiteral => "string literal",
            Self::StringInterpStart | Self::StringInterpMiddle | Self::StringInterpEnd => {
                "string interpolation"
            }
            Self::Identifier => "identifier",
            Self::KwClass => "class",
            Self::KwStruct => "struct",
            Self::KwEnum => "enum",
            Self::KwFlags => "flags",
            Self::KwFunction => "function",
            Self::KwConstructor => "constructor",
            Self::KwDestructor => "destructor",
            Self::KwVar => "var",
            Self::KwGet => "get",
            Self::KwSet => "set",
            Self::KwSends => "sends",
            Self::KwIf => "if",
            Self::KwElse => "else",
            Self::KwWhile => "while",
            Self::KwFor => "for",
            Self::KwLoop => "loop",
            Self::KwBreak => "break",
            Self::KwContinue => "continue",
            Self::KwReturn => "return",
            Self::KwThrow => "throw",
            Self::KwDelete => "delete",
            Self::KwNew => "new",
            Self::KwNull => "null",
            Self::KwTrue => "true",
            Self::KwFalse => "false",
            Self::KwThis => "this",
            Self::KwBase => "base",
            Self::KwAs => "as",
            Self::KwRef => "ref",
            Self::KwAny => "any",
            Self::KwVoid => "Void",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::PlusEq => "+=",
            Self::MinusEq => "-=",
            Self::StarEq => "*=",
            Self::SlashEq => "/=",
            Self::PercentEq => "%=",
            Self::PlusPlus => "++",
            Self::MinusMinus => "--",
            Self::Eq => "=",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::AmpAmp => "&&",
            Self::PipePipe => "||",
            Self::Bang => "!",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::Comment => "comment",
            Self::Error => "error",
            Self::End => "end of file",
        }
    }

    /// Look up the keyword token for an identifier, if any.
    pub fn keyword(text: &str) -> Option<Grammar> {
        Some(match text {
            "class" => Self::KwClass,
            "struct" => Self::KwStruct,
            "enum" => Self::KwEnum,
            "flags" => Self::KwFlags,
            "function" => Self::KwFunction,
            "constructor" => Self::KwConstructor,
            "destructor" => Self::KwDestructor,
            "var" => Self::KwVar,
            "get" => Self::KwGet,
            "set" => Self::KwSet,
            "sends" => Self::KwSends,
            "if" => Self::KwIf,
            "else" => Self::KwElse,
            "while" => Self::KwWhile,
            "for" => Self::KwFor,
            "loop" => Self::KwLoop,
            "break" => Self::KwBreak,
            "continue" => Self::KwContinue,
            "return" => Self::KwReturn,
            "throw" => Self::KwThrow,
            "delete" => Self::KwDelete,
            "new" => Self::KwNew,
            "null" => Self::KwNull,
            "true" => Self::KwTrue,
            "false" => Self::KwFalse,
            "this" => Self::KwThis,
            "base" => Self::KwBase,
            "as" => Self::KwAs,
            "ref" => Self::KwRef,
            "any" => Self::KwAny,
            _ => return None,
        })
    }
}

/// Binary operator precedence and associativity, shared between the parser
/// and the semantic analyzer so operator resolution stays consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub struct OperatorInfo {
    pub precedence: u8,
    pub associativity: Associativity,
}

impl Grammar {
    /// Precedence-climbing table; `None` means not a binary operator.
    /// Higher binds tighter. Assignment is right-associative.
    pub fn binary_operator(&self) -> Option<OperatorInfo> {
        let (precedence, associativity) = match self {
            Self::Eq
            | Self::PlusEq
            | Self::MinusEq
            | Self::StarEq
            | Self::SlashEq
            | Self::PercentEq => (1, Associativity::Right),
            Self::PipePipe => (2, Associativity::Left),
            Self::AmpAmp => (3, Associativity::Left),
            Self::EqEq | Self::BangEq => (4, Associativity::Left),
            Self::Lt | Self::Gt | Self::LtEq | Self::GtEq => (5, Associativity::Left),
            Self::Plus | Self::Minus => (6, Associativity::Left),
            Self::Star | Self::Slash | Self::Percent => (7, Associativity::Left),
            Self::KwAs => (8, Associativity::Left),
            _ => return None,
        };
        Some(OperatorInfo {
            precedence,
            associativity,
        })
    }
}

/// A token with its exact location in source, immutable after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub grammar: Grammar,
    pub text: String,
    pub location: CodeLocation,
}

impl Token {
    pub fn new(grammar: Grammar, text: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            grammar,
            text: text.into(),
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup() {
        assert_eq!(Grammar::keyword("class"), Some(Grammar::KwClass));
        assert_eq!(Grammar::keyword("function"), Some(Grammar::KwFunction));
        assert_eq!(Grammar::keyword("Player"), None);
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let add = Grammar::Plus.binary_operator().unwrap();
        let mul = Grammar::Star.binary_operator().unwrap();
        assert!(mul.precedence > add.precedence);
    }

    #[test]
    fn assignment_is_right_associative() {
        let assign = Grammar::Eq.binary_operator().unwrap();
        assert_eq!(assign.associativity, Associativity::Right);
        assert_eq!(assign.precedence, 1);
    }

    #[test]
    fn non_operators_have_no_entry() {
        assert!(Grammar::LParen.binary_operator().is_none());
        assert!(Grammar::Identifier.binary_operator().is_none());
    }
}
