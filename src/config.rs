use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Engine selected through configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Named shared-cache memory database, fresh per build
    InMemory,
    /// Private `:memory:` database held by the builder
    Sqlite,
    /// Database file in the data directory, held by the builder
    SqliteFile,
}

impl EngineKind {
    pub fn from_str(s: &str) -> Option<EngineKind> {
        match s.to_lowercase().as_str() {
            "in-memory" | "in_memory" | "memory" => Some(EngineKind::InMemory),
            "sqlite" => Some(EngineKind::Sqlite),
            "sqlite-file" | "sqlite_file" | "file" => Some(EngineKind::SqliteFile),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::InMemory => "in-memory",
            EngineKind::Sqlite => "sqlite",
            EngineKind::SqliteFile => "sqlite-file",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Defaults for builders created with `SeedBuilder::from_config`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedConfig {
    pub engine: EngineKind,

    /// Directory holding file-backed test databases
    pub data_dir: String,

    /// Schema substituted by the rename rule for tables without one
    pub default_schema: Option<String>,

    /// Seed for the random record generator, random when absent
    pub random_seed: Option<u64>,

    /// Enforce foreign keys while seeding (default: true)
    pub foreign_keys: bool,
}

const EMPTY_CONFIG: &str = r#"### seedbed configuration file

### engine used by builders created from this configuration
### one of: in-memory, sqlite, sqlite-file
# engine = "in-memory"

### directory for file-backed test databases
# data_dir = "~/.seedbed"

### schema used for tables that do not declare one
# default_schema = "dbo"

### fixed seed for reproducible random records
# random_seed = 42

### enforce foreign keys while seeding
# foreign_keys = true
"#;

impl Default for SeedConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            engine: EngineKind::InMemory,
            data_dir: format!("{}/.seedbed", home_dir),
            default_schema: None,
            random_seed: None,
            foreign_keys: true,
        }
    }
}

impl SeedConfig {
    /// Load configuration from a TOML file and `SEEDBED_` environment variables
    ///
    /// With an explicit path that does not exist yet, a commented template is
    /// written there. Without a path, `$HOME/.seedbed/seedbed.toml` is read
    /// when present.
    pub fn new(path: Option<&Path>) -> Result<SeedConfig> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                if path.exists() {
                    builder = builder.add_source(config::File::from(path));
                } else {
                    std::fs::write(path, EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", path.display(), e)
                    })?;
                }
            }
            None => {
                let default_path = Self::config_file_path();
                if default_path.exists() {
                    builder = builder.add_source(config::File::from(default_path.as_path()));
                }
            }
        }

        // E.g., `SEEDBED_ENGINE=sqlite cargo test` switches the engine
        builder = builder.add_source(config::Environment::with_prefix("SEEDBED"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    fn from_map(config: &HashMap<String, String>) -> Result<SeedConfig> {
        let defaults = SeedConfig::default();

        let engine = match config.get("engine") {
            Some(s) => EngineKind::from_str(s).ok_or_else(|| {
                anyhow!(
                    "Unknown engine '{}', expected in-memory, sqlite or sqlite-file",
                    s
                )
            })?,
            None => defaults.engine,
        };

        let data_dir = match config.get("data_dir") {
            Some(dir) => expand_home(dir),
            None => defaults.data_dir,
        };

        let default_schema = config
            .get("default_schema")
            .filter(|s| !s.trim().is_empty())
            .cloned();

        let random_seed = match config.get("random_seed") {
            Some(s) => Some(
                s.parse::<u64>()
                    .map_err(|e| anyhow!("Invalid random_seed '{}': {}", s, e))?,
            ),
            None => None,
        };

        let foreign_keys = match config.get("foreign_keys") {
            Some(s) => s
                .parse::<bool>()
                .map_err(|e| anyhow!("Invalid foreign_keys '{}': {}", s, e))?,
            None => defaults.foreign_keys,
        };

        Ok(SeedConfig {
            engine,
            data_dir,
            default_schema,
            random_seed,
            foreign_keys,
        })
    }

    /// Path of the database file used by the `sqlite-file` engine
    pub fn sqlite_path(&self) -> PathBuf {
        Path::new(self.data_dir.trim_end_matches('/')).join("seedbed-test.sqlite3")
    }

    /// Get the default config file path
    pub fn config_file_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        home_dir.join(".seedbed").join("seedbed.toml")
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Engine:             {}", self.engine),
            format!("Data Directory:     {}", self.data_dir),
            format!("Foreign Keys:       {}", self.foreign_keys),
        ];
        if self.engine == EngineKind::SqliteFile {
            lines.push(format!("SQLite Path:        {}", self.sqlite_path().display()));
        }
        if let Some(schema) = &self.default_schema {
            lines.push(format!("Default Schema:     {}", schema));
        }
        if let Some(seed) = self.random_seed {
            lines.push(format!("Random Seed:        {}", seed));
        }
        lines.join("\n")
    }
}

fn expand_home(dir: &str) -> String {
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().to_string(),
        _ => dir.to_string(),
    }
}
