//! Tablecraft CLI - run text-to-table recipes
//!
//! # Main Commands
//!
//! ```bash
//! tablecraft run recipe.json -i input.txt    # Run a recipe, print the result JSON
//! tablecraft check recipe.json               # Validate a recipe without running it
//! ```
//!
//! # Reference Commands
//!
//! ```bash
//! tablecraft operations                      # Show available operations
//! tablecraft schema                          # Print the recipe JSON Schema
//! tablecraft example-recipe                  # Show an example recipe
//! ```
//!
//! Limits are read from `TABLECRAFT_*` environment variables (or `.env`).
//! Logs go to stderr, filtered by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tablecraft::{
    check_document, example_recipe, parse_recipe, read_input_file, recipe_schema, Engine, EngineConfig,
    ErrorKind, ExecutionError, ExecutionResult, InputFormat, RawInput, StepRegistry, ValidationError,
};

#[derive(Parser)]
#[command(name = "tablecraft")]
#[command(about = "Turn raw text into tables with declarative recipes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    /// One row per non-empty line, column "line"
    Text,
    /// Delimited text with a header row
    Csv,
    /// Array of flat JSON objects
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recipe against input text and print the result JSON
    Run {
        /// Recipe JSON file
        recipe: PathBuf,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// How to read the input
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// CSV input has no header row
        #[arg(long)]
        no_header: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a recipe and print its canonical form
    Check {
        /// Recipe JSON file
        recipe: PathBuf,
    },

    /// Show available operations
    Operations,

    /// Print the JSON Schema of recipe documents
    Schema,

    /// Show an example recipe
    ExampleRecipe,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            recipe,
            input,
            format,
            delimiter,
            no_header,
            output,
            pretty,
        } => {
            let format = match format {
                FormatArg::Text => InputFormat::Text,
                FormatArg::Csv => InputFormat::Csv {
                    delimiter,
                    has_header: !no_header,
                },
                FormatArg::Json => InputFormat::Json,
            };
            cmd_run(&recipe, input.as_deref(), format, output.as_deref(), pretty)
        }

        Commands::Check { recipe } => cmd_check(&recipe),

        Commands::Operations => cmd_operations(),

        Commands::Schema => cmd_schema(),

        Commands::ExampleRecipe => cmd_example_recipe(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    recipe_path: &Path,
    input: Option<&Path>,
    format: InputFormat,
    output: Option<&Path>,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    let engine = Engine::new(config.limits);

    let recipe_text = fs::read_to_string(recipe_path)?;
    let text = match input {
        Some(path) => read_input_file(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let result = match serde_json::from_str::<Value>(&recipe_text) {
        Ok(doc) => engine.execute(&doc, &RawInput::with_format(&text, format)),
        Err(e) => {
            let err = ValidationError::document(
                ErrorKind::InvalidArgumentType,
                format!("recipe is not valid JSON: {}", e),
            );
            ExecutionResult::Failure(ExecutionError::Invalid(vec![err]).into())
        }
    };

    let json = if pretty {
        result.to_json_pretty()?
    } else {
        result.to_json()?
    };
    write_output(&json, output)?;

    match result {
        ExecutionResult::Success(out) => {
            eprintln!("{} rows, {} columns", out.meta.row_count, out.meta.column_count);
            Ok(())
        }
        ExecutionResult::Failure(failure) => {
            for detail in failure.details.iter().skip(1) {
                eprintln!("  - [{}] {}", detail.error_kind, detail.message);
            }
            Err(format!("{}: {}", failure.error_kind, failure.message).into())
        }
    }
}

fn cmd_check(recipe_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let registry = StepRegistry::global();
    let text = fs::read_to_string(recipe_path)?;

    match parse_recipe(&text, registry) {
        Ok(recipe) => {
            // The schema is published for external tools; report any disagreement.
            if let Err(problems) = check_document(&recipe.to_document(), registry) {
                for problem in problems {
                    tracing::warn!(%problem, "canonical recipe does not match the published schema");
                }
            }
            eprintln!("Recipe is valid: {} step(s)", recipe.steps().len());
            println!("{}", recipe.to_json()?);
            Ok(())
        }
        Err(errors) => {
            for err in &errors {
                eprintln!("  - [{}] {}", err.kind, err.message);
            }
            Err(format!("recipe is invalid ({} error(s))", errors.len()).into())
        }
    }
}

fn cmd_operations() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", StepRegistry::global().operations_description());
    Ok(())
}

fn cmd_schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = recipe_schema(StepRegistry::global());
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn cmd_example_recipe() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", example_recipe().to_json()?);
    Ok(())
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("Output written to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
