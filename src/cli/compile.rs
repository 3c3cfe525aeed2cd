//! Compile query strings against a model file

use std::{fs, path::PathBuf};

use super::CliError;
use crate::{Catalog, Compiler, CompilerConfig, Dialect, output};

/// Options for the compile command
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Query string, e.g. `$filter=Price gt 10&$top=5`
    pub query: String,
    /// Entity the query targets
    pub entity: String,
    /// JSON catalog file
    pub model: PathBuf,
    /// Optional JSON compiler config file
    pub config: Option<PathBuf>,
    /// Overrides the config's dialect
    pub dialect: Option<String>,
    /// Overrides the config's `in` list limit
    pub max_in: Option<usize>,
    /// Pretty-print the output
    pub pretty: bool,
}

fn load_config(options: &CompileOptions) -> Result<CompilerConfig, CliError> {
    let mut config = match &options.config {
        Some(path) => CompilerConfig::from_json(&fs::read_to_string(path)?)?,
        None => CompilerConfig::default(),
    };

    if let Some(name) = &options.dialect {
        let dialect: Dialect = name.parse().map_err(CliError::Dialect)?;
        config = config.with_dialect(dialect);
    }
    if let Some(max) = options.max_in {
        config = config.with_max_in_clause_size(Some(max));
    }
    Ok(config)
}

/// Compile the query and render the result as JSON.
pub fn execute_compile(options: &CompileOptions) -> Result<String, CliError> {
    if options.query.trim().is_empty() {
        return Err(CliError::NoInput);
    }

    let catalog = Catalog::from_json(&fs::read_to_string(&options.model)?)?;
    let compiler = Compiler::new(catalog, load_config(options)?);
    let compiled = compiler.compile(&options.entity, options.query.trim())?;

    Ok(if options.pretty {
        output::to_json_pretty(&compiled)
    } else {
        output::to_json(&compiled)
    })
}
