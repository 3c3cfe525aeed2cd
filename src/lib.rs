pub mod alias;
pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compiler;
pub mod config;
pub mod converter;
pub mod error;
pub mod filter;
pub mod lexer;
pub mod model;
pub mod options;
pub mod output;
pub mod parser;
pub mod pool;
pub mod sql;
pub mod transform;
pub mod value;

pub use alias::{AliasDefinition, AliasRegistry, AliasSet, CompileContext};
pub use ast::{Node, SortDirection, Token, TokenKind};
pub use compiler::{CompiledExpand, CompiledQuery, Compiler};
pub use config::CompilerConfig;
pub use converter::{Converter, ExpressionResolver};
pub use error::{LexError, OptionError, ParseError, QueryError, SemanticError, SqlError};
pub use filter::{FilterExpression, FilterKind, Function, PropertyRef, ScalarExpr, TypeName};
pub use lexer::{Lexer, tokenize};
pub use model::{Catalog, EntityModel, MetadataProvider, NavigationModel, PrimitiveType, PropertyModel};
pub use options::{ExpandItem, OrderByItem, QueryOptions, SelectItem};
pub use output::{to_json, to_json_pretty};
pub use parser::{Parser, parse};
pub use pool::Pools;
pub use sql::{ApplySql, Dialect, SqlBuilder, SqlFragment};
pub use value::{Literal, SpatialKind, SpatialLiteral};
