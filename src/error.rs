//! Error taxonomy for every compilation stage.
//!
//! Each stage has its own error type; [`QueryError`] wraps them all and is
//! what callers of [`Compiler::compile`](crate::Compiler::compile) see. All
//! errors are terminal for the construct being compiled: no partial results
//! are returned and nothing is retried.

use thiserror::Error;

use crate::ast::TokenKind;

/// Lexical errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("malformed {kind} literal '{text}' at offset {offset}")]
    MalformedLiteral {
        kind: &'static str,
        text: String,
        offset: usize,
    },
}

impl LexError {
    pub fn offset(&self) -> usize {
        match self {
            LexError::UnexpectedChar { offset, .. }
            | LexError::UnterminatedString { offset }
            | LexError::MalformedLiteral { offset, .. } => *offset,
        }
    }
}

/// Syntax errors. There is no error recovery: the first mismatch fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("expected {expected}, found {found} at offset {offset}")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        offset: usize,
    },

    #[error("unexpected end of input at offset {offset}: expected {expected}")]
    UnexpectedEof { expected: String, offset: usize },
}

impl ParseError {
    pub fn offset(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.offset(),
            ParseError::UnexpectedToken { offset, .. } | ParseError::UnexpectedEof { offset, .. } => {
                *offset
            }
        }
    }
}

/// Semantic errors raised while binding a syntax tree to the data model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    #[error("unknown property '{name}'{}", at(.offset))]
    UnknownProperty { name: String, offset: Option<usize> },

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("function '{function}' expects {expected} argument(s), got {found}{}", at(.offset))]
    WrongArity {
        function: String,
        expected: String,
        found: usize,
        offset: Option<usize>,
    },

    #[error("invalid argument for '{function}': {reason}{}", at(.offset))]
    WrongArgumentKind {
        function: String,
        reason: String,
        offset: Option<usize>,
    },

    #[error("malformed 'in' list: {reason}{}", at(.offset))]
    MalformedIn { reason: String, offset: Option<usize> },

    #[error("'in' list has {size} items, more than the allowed {max}")]
    InListTooLarge { size: usize, max: usize },

    #[error("literal {literal} is outside the 64-bit integer range of '{property}'")]
    NumericOverflow { property: String, literal: String },

    #[error("'{0}' is neither a primitive type nor a qualified entity type name")]
    InvalidTypeName(String),

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("expression is not a boolean predicate{}", at(.offset))]
    NotBoolean { offset: Option<usize> },
}

impl SemanticError {
    pub fn offset(&self) -> Option<usize> {
        match self {
            SemanticError::UnknownProperty { offset, .. }
            | SemanticError::WrongArity { offset, .. }
            | SemanticError::WrongArgumentKind { offset, .. }
            | SemanticError::MalformedIn { offset, .. }
            | SemanticError::NotBoolean { offset } => *offset,
            _ => None,
        }
    }
}

fn at(offset: &Option<usize>) -> String {
    offset.map(|o| format!(" at offset {}", o)).unwrap_or_default()
}

/// Errors raised while translating a filter expression to SQL.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlError {
    #[error("{construct} is not supported by the {dialect} dialect")]
    UnsupportedByDialect {
        construct: String,
        dialect: &'static str,
    },

    #[error("cannot translate {0}")]
    Untranslatable(String),

    #[error("navigation '{0}' has no known target in the data model")]
    UnknownNavigation(String),

    #[error("computed alias '{0}' has no registered definition")]
    UnknownAlias(String),
}

/// Errors raised while validating and dispatching the option set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
    #[error("unknown query option '{0}'")]
    UnknownOption(String),

    #[error("query option '{0}' is specified more than once")]
    DuplicateOption(String),

    #[error("query options '{0}' and '{1}' are mutually exclusive")]
    MutuallyExclusive(String, String),

    #[error("invalid value '{value}' for '{option}': {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },

    #[error("malformed {option} entry '{entry}': {reason}")]
    MalformedEntry {
        option: &'static str,
        entry: String,
        reason: String,
    },

    #[error("alias '{0}' is defined more than once or shadows a property")]
    DuplicateAlias(String),

    #[error("alias '{0}' is used before the entry that defines it")]
    AliasNotYetDefined(String),

    #[error("aggregate alias '{0}' cannot be used to filter rows")]
    AggregateInRowFilter(String),

    #[error("$expand nesting exceeds the maximum depth of {0}")]
    ExpandTooDeep(usize),
}

/// Any error produced while compiling a query.
///
/// Every variant is a client error: the request is malformed or refers to
/// something the data model does not define.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("lexical error: {0}")]
    Lex(#[from] LexError),

    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),

    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),

    #[error("translation error: {0}")]
    Sql(#[from] SqlError),

    #[error("query option error: {0}")]
    Option(#[from] OptionError),

    #[error("in {option}: {source}")]
    InOption {
        option: String,
        #[source]
        source: Box<QueryError>,
    },
}

impl QueryError {
    /// Attach the name of the option whose value failed.
    pub fn in_option(self, option: &str) -> Self {
        match self {
            // Option-level errors already name their option.
            QueryError::Option(_) | QueryError::InOption { .. } => self,
            other => QueryError::InOption {
                option: option.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Source offset of the failing construct, where one is known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            QueryError::Lex(e) => Some(e.offset()),
            QueryError::Parse(e) => Some(e.offset()),
            QueryError::Semantic(e) => e.offset(),
            QueryError::Sql(_) | QueryError::Option(_) => None,
            QueryError::InOption { source, .. } => source.offset(),
        }
    }
}
