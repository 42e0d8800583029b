//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use tally_core::TallyConfig;

use super::default_config_path;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Write a configuration file with default values
    Init(InitArgs),

    /// Print one value, e.g. "archive.date_separator" or "handlers.0.account"
    Get {
        /// Dotted key path
        key: String,
    },

    /// Change one value; VALUE is parsed as JSON, else taken as a string
    Set {
        /// Dotted key path
        key: String,
        /// New value
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => {
            if !path.exists() {
                eprintln!("{} {} not found, showing defaults.", style("ℹ").blue(), path.display());
            }
            println!("{}", serde_json::to_string_pretty(&load_or_default(&path)?)?);
        }
        ConfigCommand::Init(init) => {
            let output = init.output.unwrap_or(path);
            if output.exists() && !init.force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    output.display()
                );
            }
            save(&TallyConfig::default(), &output)?;
            println!("{} Created {}", style("✓").green(), output.display());
        }
        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(load_or_default(&path)?)?;
            let value = lookup(&json, &key)
                .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        ConfigCommand::Set { key, value } => {
            let value = parse_value(&value);
            let mut json = serde_json::to_value(load_or_default(&path)?)?;
            assign(&mut json, &key, value.clone())?;
            let config: TallyConfig = serde_json::from_value(json)?;
            save(&config, &path)?;
            println!("{} {} = {}", style("✓").green(), key, value);
        }
        ConfigCommand::Path => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!(
                    "{} not created; run 'tally config init' to create it.",
                    style("ℹ").yellow()
                );
            }
        }
    }

    Ok(())
}

fn load_or_default(path: &Path) -> anyhow::Result<TallyConfig> {
    if path.exists() {
        Ok(TallyConfig::from_file(path)?)
    } else {
        Ok(TallyConfig::default())
    }
}

fn save(config: &TallyConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Follow a dotted path; numeric segments index arrays.
fn lookup<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(json, |current, part| match current {
        Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        _ => current.get(part),
    })
}

/// Set the value at a dotted path whose parent already exists.
fn assign(json: &mut Value, key: &str, value: Value) -> anyhow::Result<()> {
    let (parent, last) = match key.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, key),
    };

    let mut current = json;
    if let Some(parent) = parent {
        for part in parent.split('.') {
            current = match current {
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
                other => other.get_mut(part),
            }
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
        }
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
        }
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
            *slot = value;
        }
        _ => anyhow::bail!("Cannot set value at non-object path: {}", key),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_and_indexed() {
        let json = json!({"archive": {"date_separator": "."}, "handlers": [{"name": "bank"}]});

        assert_eq!(lookup(&json, "archive.date_separator"), Some(&json!(".")));
        assert_eq!(lookup(&json, "handlers.0.name"), Some(&json!("bank")));
        assert_eq!(lookup(&json, "handlers.1.name"), None);
        assert_eq!(lookup(&json, "archive.missing"), None);
    }

    #[test]
    fn test_assign_round_trips_through_config() {
        let mut json = serde_json::to_value(TallyConfig::default()).unwrap();
        assign(&mut json, "archive.date_separator", parse_value("_")).unwrap();
        assign(&mut json, "walk.max_file_size", parse_value("1024")).unwrap();
        assign(&mut json, "extract.fingerprint.meta_keys", parse_value("[\"txn\"]")).unwrap();

        let config: TallyConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.archive.date_separator, "_");
        assert_eq!(config.walk.max_file_size, 1024);
        assert_eq!(config.extract.fingerprint.meta_keys, vec!["txn".to_string()]);
    }

    #[test]
    fn test_assign_rejects_unknown_parent() {
        let mut json = json!({"archive": {}});
        assert!(assign(&mut json, "nope.key", json!(1)).is_err());
        assert!(assign(&mut json, "archive.date_separator.x", json!(1)).is_err());
    }
}
