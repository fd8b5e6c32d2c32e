use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

// =============================================================================
// Network-related constants
// =============================================================================

/// Default upstream registry
pub const DEFAULT_UPSTREAM_REGISTRY: &str = "https://registry.npmjs.org";

/// Default base URL the local registry is served from
pub const DEFAULT_LOCAL_REGISTRY: &str = "http://localhost:8080";

/// Timeout for a single upstream request in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

pub const USER_AGENT: &str = "npm-mirror";

// =============================================================================
// Import limits
// =============================================================================

/// Default number of sibling dependencies imported concurrently
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default bound on dependency recursion depth
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Mirror configuration, read from a JSON file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MirrorConfig {
    pub upstream_registry: String,
    pub local_registry: String,
    /// Artifact root; defaults to `<data_dir>/packages`
    pub package_dir: Option<PathBuf>,
    /// SQLite database file; defaults to `<data_dir>/mirror.db`
    pub database: Option<PathBuf>,
    pub concurrency: usize,
    pub max_depth: usize,
    pub include_dev_dependencies: bool,
    /// Seed packages for the batch import, in order: name -> version spec
    pub seeds: IndexMap<String, String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            upstream_registry: DEFAULT_UPSTREAM_REGISTRY.to_string(),
            local_registry: DEFAULT_LOCAL_REGISTRY.to_string(),
            package_dir: None,
            database: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
            include_dev_dependencies: true,
            seeds: IndexMap::new(),
        }
    }
}

impl MirrorConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn package_dir(&self) -> PathBuf {
        self.package_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("packages"))
    }

    pub fn database(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(db_path)
    }
}

/// Returns the path to the data directory for npm-mirror.
/// Uses $XDG_DATA_HOME/npm-mirror if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/npm-mirror,
/// or ./npm-mirror if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file.
pub fn db_path() -> PathBuf {
    data_dir().join("mirror.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("npm-mirror.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("npm-mirror")
}
