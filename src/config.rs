use crate::database::{ensure_data_dir, DirectoryScripts, MANAGER_DB_NAME};
use anyhow::{anyhow, Result};
use config::Config;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct RegistryConfig {
    /// Directory holding the manager database
    pub data_dir: String,

    /// Root directory of migration scripts (`<table>/create.sql`, `<table>/update.N.M.sql`)
    pub script_dir: Option<String>,
}

const EMPTY_CONFIG: &str = r#"### dbregistry configuration file

### directory holding the manager database
# data_dir = "~/.dbregistry"

### root directory of migration scripts
# script_dir = "~/.dbregistry/sql"
"#;

/// `$HOME/.dbregistry`, or `./.dbregistry` without a home directory
pub fn default_data_dir() -> String {
    let home_dir = dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());
    format!("{}/.dbregistry", home_dir)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            script_dir: None,
        }
    }
}

impl RegistryConfig {
    /// Function to create and initialize a new configuration
    ///
    /// Reads the TOML file at `path` (default `$HOME/.dbregistry/dbregistry.toml`,
    /// written from a template when missing), then `DBREGISTRY_*` environment
    /// variables.
    pub fn new(path: &Option<String>) -> Result<RegistryConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let registry_dir = default_data_dir();
                ensure_data_dir(registry_dir.as_str())?;
                let p = format!("{}/dbregistry.toml", registry_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g., `DBREGISTRY_DATA_DIR=/var/lib/app ./dbregistry status`
        builder = builder.add_source(config::Environment::with_prefix("DBREGISTRY"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        let data_dir = match config.get("data_dir") {
            Some(p) => expand_home(p),
            None => default_data_dir(),
        };
        ensure_data_dir(data_dir.as_str())?;

        let script_dir = config.get("script_dir").map(String::as_str).map(expand_home);

        Ok(RegistryConfig {
            data_dir,
            script_dir,
        })
    }

    /// Path of the manager database file
    pub fn manager_path(&self) -> PathBuf {
        Path::new(self.data_dir.trim_end_matches('/')).join(MANAGER_DB_NAME)
    }

    /// Script source for the configured script directory
    pub fn scripts(&self) -> Option<DirectoryScripts> {
        self.script_dir.as_deref().map(DirectoryScripts::new)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Data Directory:     {}", self.data_dir),
            format!("Manager Database:   {}", self.manager_path().display()),
        ];
        match &self.script_dir {
            Some(dir) => lines.push(format!("Script Directory:   {}", dir)),
            None => lines.push("Script Directory:   (not configured)".to_string()),
        }
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        format!("{}/dbregistry.toml", default_data_dir())
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{}", home.to_string_lossy(), rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config_path = dir.path().join("dbregistry.toml");
        std::fs::write(
            &config_path,
            format!(
                "data_dir = \"{}\"\nscript_dir = \"{}\"\n",
                data_dir.display(),
                dir.path().join("sql").display()
            ),
        )
        .unwrap();

        let config = RegistryConfig::new(&Some(config_path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.data_dir, data_dir.to_string_lossy());
        assert!(data_dir.is_dir());
        assert!(config.scripts().is_some());
        assert_eq!(config.manager_path(), data_dir.join(MANAGER_DB_NAME));
    }

    #[test]
    fn test_missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("new.toml");

        // the template only holds comments, so nothing overrides the defaults
        let _ = RegistryConfig::new(&Some(config_path.to_string_lossy().to_string()));
        let written = std::fs::read_to_string(&config_path).unwrap();
        assert!(written.starts_with("### dbregistry configuration file"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), "/abs/path");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home("~/x"),
                format!("{}/x", home.to_string_lossy())
            );
        }
    }

    #[test]
    fn test_summary() {
        let config = RegistryConfig {
            data_dir: "/var/lib/app/".to_string(),
            script_dir: None,
        };
        let summary = config.summary();
        assert!(summary.contains("/var/lib/app/database_manager.db"));
        assert!(summary.contains("(not configured)"));
    }
}
