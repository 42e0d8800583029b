//! Extract command - extract entries from matched documents.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use tally_core::extract::{RenderOptions, render};
use tally_core::ledger::load_existing;
use tally_core::{Dispatcher, Document, Pipeline, WalkItem, Walker, drop_duplicates};

use super::{Reporter, load_config, load_handlers};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Files or directories to extract from
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Previously recorded entries (JSON) used for de-duplication
    #[arg(short, long)]
    existing: Option<PathBuf>,

    /// Do not write per-document section headers
    #[arg(long)]
    no_sections: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Leave out entries already present in the existing entries
    #[arg(long)]
    drop_duplicates: bool,

    /// Render entries in reverse order
    #[arg(short, long)]
    reverse: bool,

    /// Stop processing at the first error
    #[arg(short = 'x', long)]
    failfast: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Ledger text
    Text,
    /// JSON report with duplicate flags
    Json,
}

pub fn run(args: ExtractArgs, config_path: Option<&Path>) -> anyhow::Result<bool> {
    let config = load_config(config_path)?;
    let handlers = load_handlers(&config)?;
    let existing = match &args.existing {
        Some(path) => load_existing(path)?,
        None => Vec::new(),
    };
    info!("{} existing entries", existing.len());

    let items = Walker::new(&config.walk).walk(&args.sources)?;
    let dispatcher = Dispatcher::new(&handlers);
    let mut pipeline = Pipeline::new(&config.extract, existing);
    if args.drop_duplicates {
        pipeline = pipeline.with_hook(drop_duplicates());
    }
    let reporter = Reporter::stderr(args.quiet);

    for item in items {
        let path = match item {
            WalkItem::TooLarge { path, size } => {
                reporter.skipped(&path, size);
                continue;
            }
            WalkItem::Document(path) => path,
        };

        let document = Document::new(path);
        reporter.begin(document.path());

        match dispatcher.classify(&document).into_result() {
            Ok(None) => reporter.unmatched(),
            Ok(Some(handler)) => match pipeline.process(&document, handler) {
                Ok(_) => reporter.ok(),
                Err(err) => reporter.error(&err),
            },
            Err(err) => {
                pipeline.record_failure();
                reporter.error(&err);
            }
        }

        if args.failfast && pipeline.failures() > 0 {
            break;
        }
    }

    let (report, failures) = pipeline.finish();

    let rendered = match args.format {
        OutputFormat::Text => {
            let mut options = RenderOptions::from_config(&config.extract);
            options.sections = !args.no_sections;
            options.reverse |= args.reverse;
            render(&report, &options)
        }
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            json
        }
    };

    match &args.output {
        Some(path) => fs::write(path, rendered)?,
        None => print!("{}", rendered),
    }

    Ok(failures == 0)
}
