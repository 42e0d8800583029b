//! Identify command - report which handler claims each document.

use std::path::{Path, PathBuf};

use clap::Args;

use tally_core::{Dispatcher, Document, WalkItem, Walker};

use super::{Reporter, load_config, load_handlers};

/// Arguments for the identify command.
#[derive(Args)]
pub struct IdentifyArgs {
    /// Files or directories to identify
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Stop processing at the first error
    #[arg(short = 'x', long)]
    failfast: bool,

    /// Show the account associated with each document
    #[arg(long)]
    verbose: bool,
}

pub fn run(args: IdentifyArgs, config_path: Option<&Path>) -> anyhow::Result<bool> {
    let config = load_config(config_path)?;
    let handlers = load_handlers(&config)?;
    let dispatcher = Dispatcher::new(&handlers);
    let reporter = Reporter::stdout(false);

    let mut errors = 0;
    for item in Walker::new(&config.walk).walk(&args.sources)? {
        let path = match item {
            WalkItem::TooLarge { path, size } => {
                reporter.skipped(&path, size);
                continue;
            }
            WalkItem::Document(path) => path,
        };

        let document = Document::new(path);
        reporter.begin(document.path());

        let result = dispatcher.classify(&document).into_result().and_then(|handler| {
            let Some(handler) = handler else {
                return Ok(None);
            };
            let account = if args.verbose {
                handler.account(&document)?
            } else {
                None
            };
            Ok(Some((handler.name(), account)))
        });

        match result {
            Ok(None) => reporter.unmatched(),
            Ok(Some((name, account))) => {
                reporter.ok();
                reporter.detail(name);
                if let Some(account) = account {
                    reporter.detail(account);
                }
            }
            Err(err) => {
                errors += 1;
                reporter.error(&err);
            }
        }

        if args.failfast && errors > 0 {
            break;
        }
    }

    Ok(errors == 0)
}
