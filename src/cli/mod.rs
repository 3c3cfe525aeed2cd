//! CLI support for odata-sql
//!
//! Provides programmatic access to the command-line functionality for
//! embedding in other tools.

mod compile;
mod tokens;

pub use compile::{CompileOptions, execute_compile};
pub use tokens::{TokenListing, list_tokens};

use std::io;

use thiserror::Error;

use crate::{LexError, QueryError};

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    /// Query compilation error
    #[error("{}", with_offset(.0))]
    Query(#[from] QueryError),
    /// Tokenizer error
    #[error("Lexical error: {0}")]
    Lex(#[from] LexError),
    /// Malformed model or config file
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("No query provided. Pass it as an argument or pipe it to stdin.")]
    NoInput,
    /// Unrecognized dialect name
    #[error("{0}")]
    Dialect(String),
}

fn with_offset(e: &QueryError) -> String {
    match e.offset() {
        Some(offset) => format!("{} (offset {})", e, offset),
        None => e.to_string(),
    }
}
