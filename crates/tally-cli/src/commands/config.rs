//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use tally_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str =
    "data_dir, remote_url, sync_enabled, seed_defaults, batch_size, request_timeout_secs";

/// Show current configuration
pub fn show(config_path: &PathBuf, output: &Output) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "remote_url": config.remote_url,
                    "sync_enabled": config.sync_enabled,
                    "seed_defaults": config.seed_defaults,
                    "batch_size": config.batch_size,
                    "request_timeout_secs": config.request_timeout_secs
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!(
                "  remote_url:           {}",
                config.remote_url.as_deref().unwrap_or("(not set)")
            );
            println!("  sync_enabled:         {}", config.sync_enabled);
            println!("  seed_defaults:        {}", config.seed_defaults);
            println!("  batch_size:           {}", config.batch_size);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, config_path: &PathBuf, output: &Output) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    apply_setting(&mut config, &key, &value)?;

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "remote_url" => {
            config.remote_url = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "seed_defaults" => {
            config.seed_defaults = value
                .parse()
                .context("Invalid value for seed_defaults. Use 'true' or 'false'.")?;
        }
        "batch_size" => {
            let size: usize = value
                .parse()
                .context("Invalid value for batch_size. Use a positive number.")?;
            if size == 0 {
                bail!("batch_size must be at least 1");
            }
            config.batch_size = size;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a number of seconds.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_remote_url() {
        let mut config = Config::default();

        apply_setting(&mut config, "remote_url", "ws://mirror.local:3030").unwrap();
        assert_eq!(config.remote_url.as_deref(), Some("ws://mirror.local:3030"));

        apply_setting(&mut config, "remote_url", "none").unwrap();
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn test_apply_bool_and_numbers() {
        let mut config = Config::default();

        apply_setting(&mut config, "sync_enabled", "true").unwrap();
        apply_setting(&mut config, "seed_defaults", "false").unwrap();
        apply_setting(&mut config, "batch_size", "25").unwrap();
        apply_setting(&mut config, "request_timeout_secs", "3").unwrap();

        assert!(config.sync_enabled);
        assert!(!config.seed_defaults);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.request_timeout_secs, 3);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply_setting(&mut config, "sync_enabled", "maybe").is_err());
        assert!(apply_setting(&mut config, "batch_size", "0").is_err());
        assert!(apply_setting(&mut config, "batch_size", "lots").is_err());

        let err = apply_setting(&mut config, "favorite_tag", "x").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_set_writes_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        set("batch_size".to_string(), "7".to_string(), &path, &output).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("batch_size = 7"));
    }
}
