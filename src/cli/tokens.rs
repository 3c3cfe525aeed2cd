//! Token listing for debugging expressions

use std::fmt;

use super::CliError;
use crate::{Token, TokenKind, tokenize};

/// Tokens of one expression, printable one per line.
#[derive(Debug)]
pub struct TokenListing(pub Vec<Token>);

impl fmt::Display for TokenListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            if token.kind == TokenKind::Eof {
                writeln!(f, "{:>4}  {}", token.offset, token.kind)?;
            } else {
                writeln!(f, "{:>4}  {:<16} {}", token.offset, token.kind.to_string(), token.text)?;
            }
        }
        Ok(())
    }
}

pub fn list_tokens(expression: &str) -> Result<TokenListing, CliError> {
    Ok(TokenListing(tokenize(expression)?))
}
