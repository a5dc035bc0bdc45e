mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::Format;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sari",
    about = "Reconcile configured databases and users against AWS and Okta",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gather every source and emit the reconciled model
    Build {
        /// Write the model to FILE instead of stdout
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Document format of the model
        #[arg(long, value_enum, default_value = "json")]
        format: Format,
    },

    /// Check the configuration directory without contacting any system
    Validate,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Build { .. } => tracing::Level::INFO,
        Commands::Validate => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build { output, format } => cmd::build::run(output.as_deref(), format, cli.json),
        Commands::Validate => cmd::validate::run(cli.json),
    };

    if let Err(e) = result {
        // Full error chain
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
