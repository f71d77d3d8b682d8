use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Value of `database_path` that selects an in-memory database
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateConfig {
    /// Prefix prepended to logical table names (`prefix_table`)
    pub prefix: String,

    /// Path to the SQLite database file, or `:memory:`
    pub database_path: String,

    /// Whether executed statements are recorded by the query logger
    pub query_logging: bool,

    /// Initial value of the connection's `safe` flag
    pub safe_writes: bool,
}

const EMPTY_CONFIG: &str = r#"### sqlgate configuration file

### prefix prepended to table names
# prefix = "xo"

### database file; ":memory:" for an in-memory database
# database_path = "~/.sqlgate/sqlgate.sqlite3"

### record every executed statement
# query_logging = true

### allow writes without forcing them
# safe_writes = false
"#;

impl Default for GateConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            prefix: "xo".to_string(),
            database_path: format!("{}/.sqlgate/sqlgate.sqlite3", home_dir),
            query_logging: true,
            safe_writes: false,
        }
    }
}

impl GateConfig {
    /// Load the configuration
    ///
    /// Settings are read from the given TOML file, or from
    /// `~/.sqlgate/sqlgate.toml` by default, and then from `SQLGATE_*`
    /// environment variables. A missing file is created with every setting
    /// commented out.
    pub fn new(path: &Option<String>) -> Result<GateConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let dir = Self::config_dir()?;
                std::fs::create_dir_all(dir.as_str())
                    .map_err(|e| anyhow!("Unable to create sqlgate directory: {}", e))?;
                let p = format!("{}/sqlgate.toml", dir);
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g. `SQLGATE_PREFIX=site1 sqlgate export`
        builder = builder.add_source(config::Environment::with_prefix("SQLGATE"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    fn from_map(config: &HashMap<String, String>) -> Result<GateConfig> {
        let defaults = GateConfig::default();

        let prefix = config.get("prefix").cloned().unwrap_or(defaults.prefix);

        let database_path = match config.get("database_path") {
            Some(p) if p == IN_MEMORY => p.clone(),
            Some(p) => expand_home(p),
            None => defaults.database_path,
        };

        let query_logging = match config.get("query_logging") {
            Some(v) => parse_bool("query_logging", v)?,
            None => defaults.query_logging,
        };

        let safe_writes = match config.get("safe_writes") {
            Some(v) => parse_bool("safe_writes", v)?,
            None => defaults.safe_writes,
        };

        Ok(GateConfig {
            prefix,
            database_path,
            query_logging,
            safe_writes,
        })
    }

    fn config_dir() -> Result<String> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();
        Ok(format!("{}/.sqlgate", home_dir))
    }

    /// Database path, or `None` for an in-memory database
    pub fn sqlite_path(&self) -> Option<&str> {
        if self.database_path == IN_MEMORY {
            None
        } else {
            Some(self.database_path.as_str())
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Table Prefix:       {}", self.prefix),
            format!("Database Path:      {}", self.database_path),
            format!("Query Logging:      {}", self.query_logging),
            format!("Safe Writes:        {}", self.safe_writes),
        ]
        .join("\n")
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Invalid boolean for {}: {}", key, other)),
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}/{}", home.to_string_lossy(), rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.prefix, "xo");
        assert!(config.database_path.ends_with("/.sqlgate/sqlgate.sqlite3"));
        assert!(config.query_logging);
        assert!(!config.safe_writes);
    }

    #[test]
    fn test_from_map() {
        let mut map = HashMap::new();
        map.insert("prefix".to_string(), "site".to_string());
        map.insert("database_path".to_string(), IN_MEMORY.to_string());
        map.insert("safe_writes".to_string(), "true".to_string());

        let config = GateConfig::from_map(&map).unwrap();
        assert_eq!(config.prefix, "site");
        assert_eq!(config.sqlite_path(), None);
        assert!(config.safe_writes);
        assert!(config.query_logging);
    }

    #[test]
    fn test_invalid_bool() {
        let mut map = HashMap::new();
        map.insert("query_logging".to_string(), "maybe".to_string());
        assert!(GateConfig::from_map(&map).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgate.toml");
        std::fs::write(
            &path,
            "prefix = \"test\"\ndatabase_path = \"/tmp/x.sqlite3\"\nquery_logging = false\n",
        )
        .unwrap();

        let config = GateConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.prefix, "test");
        assert_eq!(config.sqlite_path(), Some("/tmp/x.sqlite3"));
        assert!(!config.query_logging);
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");
        let config = GateConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        assert!(path.exists());
        assert_eq!(config.prefix, "xo");
    }
}
