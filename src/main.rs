use std::{
    io::{self, Read},
    path::PathBuf,
};

use clap::{Parser as ClapParser, Subcommand};
use odata_sql::cli::{self, CliError, CompileOptions};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "odata-sql")]
#[command(about = "Compile OData query options into parameterized SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query string against an entity
    Compile {
        /// The query string (reads from stdin if not provided)
        query: Option<String>,

        /// Entity the query targets
        #[arg(short, long)]
        entity: String,

        /// JSON catalog describing the entities
        #[arg(short, long)]
        model: PathBuf,

        /// JSON compiler config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// SQL dialect: sqlite, postgres, mysql or sqlserver
        #[arg(short, long)]
        dialect: Option<String>,

        /// Largest accepted 'in' list
        #[arg(long)]
        max_in: Option<usize>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Print the tokens of an expression
    Tokens {
        /// The expression (reads from stdin if not provided)
        expression: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ODATA_SQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            query,
            entity,
            model,
            config,
            dialect,
            max_in,
            pretty,
        } => read_input(query).and_then(|query| {
            let options = CompileOptions {
                query,
                entity,
                model,
                config,
                dialect,
                max_in,
                pretty,
            };
            cli::execute_compile(&options).map(|json| println!("{}", json))
        }),
        Commands::Tokens { expression } => read_input(expression)
            .and_then(|e| cli::list_tokens(e.trim()))
            .map(|listing| print!("{}", listing)),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn read_input(arg: Option<String>) -> Result<String, CliError> {
    match arg {
        Some(s) => Ok(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        None => Err(CliError::NoInput),
    }
}
