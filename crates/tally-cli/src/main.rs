//! CLI application for identifying, extracting and archiving financial documents.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{archive, config, extract, identify, test};

/// tally - turn bank statements into ledger entries and file them away
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the handler responsible for each document
    Identify(identify::IdentifyArgs),

    /// Extract ledger entries from documents
    Extract(extract::ExtractArgs),

    /// Move documents into the dated archive tree
    Archive(archive::ArchiveArgs),

    /// Compare handler output with expected output files
    Test(test::TestArgs),

    /// Write expected output files for handler tests
    Generate(test::GenerateArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    let success = match cli.command {
        Commands::Identify(args) => identify::run(args, config_path)?,
        Commands::Extract(args) => extract::run(args, config_path)?,
        Commands::Archive(args) => archive::run(args, config_path)?,
        Commands::Test(args) => test::run_test(args, config_path)?,
        Commands::Generate(args) => test::run_generate(args, config_path)?,
        Commands::Config(args) => {
            config::run(args, config_path)?;
            true
        }
    };

    // Per-document errors were already reported inline.
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
