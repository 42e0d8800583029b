//! Subcommands and the helpers they share.

pub mod archive;
pub mod config;
pub mod extract;
pub mod identify;

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::Context;
use console::{Term, style};

use tally_core::models::config::TallyConfig;
use tally_core::{CsvHandler, DocumentError, Handler};

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("config.json")
}

/// Load the configuration given with `--config`, else the default file
/// if present, else built-in defaults.
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<TallyConfig> {
    let config = match config_path {
        Some(path) => TallyConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                TallyConfig::from_file(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?
            } else {
                TallyConfig::default()
            }
        }
    };
    Ok(config)
}

/// Build the configured handler list, in configuration order.
pub fn load_handlers(config: &TallyConfig) -> anyhow::Result<Vec<Box<dyn Handler>>> {
    let handlers = CsvHandler::from_configs(&config.handlers)?;
    if handlers.is_empty() {
        tracing::warn!("no handlers configured; every document will be unmatched");
    }
    Ok(handlers)
}

/// Per-document progress lines.
///
/// Each document gets `* <path>`, followed on the same line by a status
/// token when it was matched, then indented detail lines.
pub struct Reporter {
    term: Term,
    quiet: bool,
}

impl Reporter {
    pub fn stdout(quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            quiet,
        }
    }

    pub fn stderr(quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            quiet,
        }
    }

    fn write(&self, text: &str) {
        if !self.quiet {
            let _ = self.term.write_str(text);
        }
    }

    pub fn begin(&self, path: &Path) {
        self.write(&format!("* {}", path.display()));
    }

    /// Close the line of a document no handler claimed.
    pub fn unmatched(&self) {
        self.write("\n");
    }

    pub fn status(&self, label: &str) {
        let styled = match label {
            "OK" | "PASSED" => style(label).green(),
            "ERROR" => style(label).red(),
            _ => style(label).yellow(),
        };
        self.write(&format!(" ... {}\n", styled));
    }

    pub fn ok(&self) {
        self.status("OK");
    }

    pub fn error(&self, err: &DocumentError) {
        self.status("ERROR");
        self.detail(err);
    }

    /// Indented lines under the current document.
    pub fn detail(&self, text: impl Display) {
        for line in text.to_string().lines() {
            self.write(&format!("  {}\n", line));
        }
    }

    pub fn skipped(&self, path: &Path, size: u64) {
        self.begin(path);
        self.status("SKIP");
        self.detail(format!("file too large ({} bytes)", size));
    }

    /// Free-standing line.
    pub fn note(&self, text: impl Display) {
        self.write(&format!("{}\n", text));
    }
}
