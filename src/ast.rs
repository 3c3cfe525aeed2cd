//! # Query Expression Syntax Tree
//!
//! This module defines the tokens and syntax-tree nodes for the expression
//! language embedded in system query options (`$filter`, `$orderby`,
//! `$compute`, `$apply`).
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[nodes]** - Syntax-tree nodes produced by the parser
//! - **[operators]** - Comparison, logical, arithmetic and lambda operators
//!
//! ## Quick Start
//!
//! ```text
//! IsActive eq true and (Price add 10 mul 2) gt 100
//! ```
//!
//! ## Precedence (low to high)
//!
//! ```text
//! or
//! and
//! not
//! eq ne gt ge lt le has in
//! add sub + -
//! mul div mod * /
//! primary: ( ... ) | literal | identifier path | call | lambda
//! ```
//!
//! ## Disambiguation
//!
//! - `/` after an identifier is a path separator when an identifier follows,
//!   otherwise division: `Orders/Items` is a path, `Price/2` is a division
//! - `any`/`all` followed by `(` after a path introduces a lambda
//! - `add`, `sub`, `mul`, `div`, `mod` and `has` directly followed by `(`
//!   are function names, not operators
//!
//! ## Examples
//!
//! ### Lambda
//!
//! ```text
//! Tags/any(t: t/Name eq 'x')
//! ```
//!
//! ### Membership
//!
//! ```text
//! Category in ('Dairy', 'Produce')
//! ```
pub mod nodes;
pub mod operators;
pub mod tokens;

pub use nodes::Node;
pub use operators::{
    ArithmeticOp, BinaryOp, ComparisonOp, LambdaKind, LogicalOp, SortDirection, UnaryOp,
};
pub use tokens::{Token, TokenKind};
