use clap::{Parser as ClapParser, Subcommand};
use selector_lang::cli::{self, CheckOptions, CheckResult, CliError};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "selector")]
#[command(about = "Selector - compile and evaluate message selectors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a selector and evaluate it against one message
    Check {
        /// The selector to compile
        selector: String,

        /// Message attributes as a JSON object
        #[arg(short, long)]
        fields: Option<String>,

        /// Message payload (reads from stdin if not provided)
        #[arg(short, long)]
        payload: Option<String>,

        /// Print the expression's value instead of TRUE/FALSE selection
        #[arg(long)]
        value: bool,

        /// Only validate syntax, don't evaluate
        #[arg(long)]
        syntax_only: bool,
    },

    /// List documentation categories
    Docs,

    /// Show documentation for a specific category
    Doc {
        /// Category name (use 'selector docs' to list categories)
        category: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            selector,
            fields,
            payload,
            value,
            syntax_only,
        } => run_check(selector, fields, payload, value, syntax_only),
        Commands::Docs => {
            print!("{}", cli::get_docs_overview());
            Ok(())
        }
        Commands::Doc { category } => cli::get_doc_category(&category).map(|content| {
            print!("{}", content);
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_check(
    selector: String,
    fields: Option<String>,
    payload: Option<String>,
    value: bool,
    syntax_only: bool,
) -> Result<(), CliError> {
    let payload = match payload {
        Some(s) => Some(s),
        None if !syntax_only && !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
        None => None,
    };

    let options = CheckOptions {
        selector,
        fields,
        payload,
        syntax_only,
        value,
    };

    match cli::execute_check(&options)? {
        CheckResult::SyntaxValid(canonical) => println!("Syntax is valid: {}", canonical),
        CheckResult::Selected(selected) => println!("{}", if selected { "TRUE" } else { "FALSE" }),
        CheckResult::Value(value) => {
            println!("{}", serde_json::to_string(&cli::value_to_json(value))?)
        }
    }
    Ok(())
}
