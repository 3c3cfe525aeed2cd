use std::fmt;

use crate::ast::{ArithmeticOp, ComparisonOp, LogicalOp};

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input sentinel
    Eof,

    // Identifiers
    /// Property name, function name, qualified type name or reserved name
    ///
    /// Starts with a letter, underscore or `$`, then letters, digits,
    /// underscores or dots.
    ///
    /// # Examples
    /// ```text
    /// Price
    /// geo.intersects
    /// Edm.Int32
    /// $it
    /// ```
    Identifier,

    // Literals
    /// Single-quoted string; doubled quotes escape a quote
    ///
    /// # Examples
    /// ```text
    /// 'Milk'
    /// 'O''Neil'
    /// ```
    String,

    /// Integer, decimal or exponent number, optionally signed
    ///
    /// # Examples
    /// ```text
    /// 42
    /// -3.5
    /// 1e10
    /// ```
    Number,

    /// `true` / `false`
    Boolean,

    /// `null`
    Null,

    /// `YYYY-MM-DD`
    Date,

    /// `HH:MM:SS[.fff]`
    Time,

    /// Date, `T`, time, optional `Z` or `+hh:mm`
    ///
    /// # Examples
    /// ```text
    /// 2024-01-15T10:30:00Z
    /// 2024-01-15T10:30:00.5+02:00
    /// ```
    DateTime,

    /// 8-4-4-4-12 hexadecimal GUID
    Guid,

    /// `geography'...'` spatial literal
    Geography,

    /// `geometry'...'` spatial literal
    Geometry,

    // Operators
    /// `eq`, `ne`, `gt`, `ge`, `lt`, `le`, `has`, `in`
    Comparison(ComparisonOp),

    /// `and`, `or`
    Logical(LogicalOp),

    /// `not`
    Not,

    /// `add`, `sub`, `mul`, `div`, `mod`, `+`, `-`, `*`, `/`
    Arithmetic(ArithmeticOp),

    // Delimiters
    /// Left parenthesis for grouping, calls, collections and lambdas
    LParen,

    /// Right parenthesis
    RParen,

    /// Comma separating arguments or collection items
    Comma,

    /// Colon after a lambda range variable
    Colon,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::String
                | TokenKind::Number
                | TokenKind::Boolean
                | TokenKind::Null
                | TokenKind::Date
                | TokenKind::Time
                | TokenKind::DateTime
                | TokenKind::Guid
                | TokenKind::Geography
                | TokenKind::Geometry
        )
    }

    /// Whether a token of this kind can end an operand. A sign directly
    /// after such a token is an operator, not part of a number.
    pub fn ends_operand(&self) -> bool {
        self.is_literal() || matches!(self, TokenKind::Identifier | TokenKind::RParen)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::Identifier => f.write_str("identifier"),
            TokenKind::String => f.write_str("string literal"),
            TokenKind::Number => f.write_str("number literal"),
            TokenKind::Boolean => f.write_str("boolean literal"),
            TokenKind::Null => f.write_str("null"),
            TokenKind::Date => f.write_str("date literal"),
            TokenKind::Time => f.write_str("time literal"),
            TokenKind::DateTime => f.write_str("date-time literal"),
            TokenKind::Guid => f.write_str("GUID literal"),
            TokenKind::Geography => f.write_str("geography literal"),
            TokenKind::Geometry => f.write_str("geometry literal"),
            TokenKind::Comparison(op) => write!(f, "'{}'", op),
            TokenKind::Logical(LogicalOp::And) => f.write_str("'and'"),
            TokenKind::Logical(LogicalOp::Or) => f.write_str("'or'"),
            TokenKind::Not => f.write_str("'not'"),
            TokenKind::Arithmetic(op) => write!(f, "'{}'", op),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Colon => f.write_str("':'"),
        }
    }
}

/// A lexical token.
///
/// `text` holds the decoded lexeme: the unescaped content for strings, the
/// quoted body for spatial literals, and the source slice for everything
/// else. `offset` is the character offset of the token's first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            offset,
        }
    }

    pub fn eof(offset: usize) -> Self {
        Token::new(TokenKind::Eof, "", offset)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}
