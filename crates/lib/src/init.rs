//! Initialize the configuration: write an example `config.json` at the resolved path.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

static EXAMPLE_CONFIG: &str = include_str!("../config/config.example.json");

/// Create the config directory and an example config file if it does not exist.
/// An existing config is left untouched. Returns the config directory.
pub fn init_config(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        std::fs::write(config_path, EXAMPLE_CONFIG)
            .with_context(|| format!("writing example config to {}", config_path.display()))?;
        log::info!("created example config at {}", config_path.display());
    }
    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Config};

    #[test]
    fn example_config_parses() {
        let config: Config = serde_json::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(config.message_filter.enabled);
        assert_eq!(config.message_filter.patterns.len(), 2);
    }

    #[test]
    fn init_writes_once() {
        let dir = std::env::temp_dir().join(format!("telezulip-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("config.json");
        init_config(&path).unwrap();
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.zulip.site.as_deref(), Some("https://chat.example.org"));

        std::fs::write(&path, "{}").unwrap();
        init_config(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
