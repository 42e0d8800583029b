//! Archive command - file documents into the dated archive tree.

use std::path::{Path, PathBuf};

use clap::Args;

use tally_core::{ArchivePlanner, Dispatcher, Document, WalkItem, Walker};

use super::{Reporter, load_config, load_handlers};

/// Arguments for the archive command.
#[derive(Args)]
pub struct ArchiveArgs {
    /// Files or directories to archive
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Root of the archive tree (default: config, then current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only show where documents would be moved
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Replace files already present in the archive
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Separator between the date and the file name
    #[arg(long)]
    date_separator: Option<String>,

    /// Stop processing at the first error
    #[arg(short = 'x', long)]
    failfast: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

pub fn run(args: ArchiveArgs, config_path: Option<&Path>) -> anyhow::Result<bool> {
    let config = load_config(config_path)?;
    let handlers = load_handlers(&config)?;

    let root = match args.output.clone().or_else(|| config.archive.destination.clone()) {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let separator = args
        .date_separator
        .clone()
        .unwrap_or_else(|| config.archive.date_separator.clone());

    let items = Walker::new(&config.walk).walk(&args.sources)?;
    let dispatcher = Dispatcher::new(&handlers);
    let mut planner = ArchivePlanner::new(root, separator).overwriting(args.overwrite);
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
            Ok(Some(handler)) => match planner.plan(&document, handler) {
                Ok(planned) => {
                    reporter.ok();
                    reporter.detail(planned.destination.display());
                }
                Err(err) => reporter.error(&err),
            },
            Err(err) => {
                planner.record_failure();
                reporter.error(&err);
            }
        }

        if args.failfast && planner.errors() > 0 {
            break;
        }
    }

    let plan = match planner.finish() {
        Ok(plan) => plan,
        Err(_) => {
            reporter.note("# Errors detected: documents will not be filed.");
            return Ok(false);
        }
    };

    let moved = plan.execute(args.dry_run)?;
    if args.dry_run {
        reporter.note(format!("# Dry run: {} documents would be filed.", plan.len()));
    } else {
        tracing::info!("{} documents filed", moved);
    }

    Ok(true)
}
