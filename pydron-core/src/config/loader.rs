//! Configuration loader (spec §6): first-match-wins search over an explicit
//! path, an environment variable, the current directory, the user's home
//! directory, and finally a system-wide location. Unlike a merge policy,
//! only the first location that resolves to an existing file is read.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::config::schema::PydronConfig;
use crate::error::{PydronError, Result};

const ENV_VAR: &str = "PYDRON_CONFIG";
const CWD_FILE: &str = "pydron.toml";
const SYSTEM_FILE: &str = "/etc/pydron/pydron.toml";

/// Loads `PydronConfig` by searching, in order: an explicit path, the
/// `PYDRON_CONFIG` environment variable, `./pydron.toml`, `~/.pydron/pydron.toml`,
/// then `/etc/pydron/pydron.toml`. The first candidate that exists is parsed;
/// none existing is not an error — [`ConfigLoader::load`] falls back to
/// [`PydronConfig::default`].
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { explicit_path: None }
    }

    /// Supplies the explicit path argument, which always wins the search.
    pub fn with_explicit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".pydron").join("pydron.toml"))
    }

    /// The search order as a list of candidates, most specific first. Not
    /// every candidate need exist; `load` stops at the first one that does.
    pub fn search_order(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = &self.explicit_path {
            candidates.push(path.clone());
        }
        if let Ok(path) = std::env::var(ENV_VAR) {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from(CWD_FILE));
        if let Some(path) = Self::user_config_path() {
            candidates.push(path);
        }
        candidates.push(PathBuf::from(SYSTEM_FILE));
        candidates
    }

    /// Loads the first candidate in [`ConfigLoader::search_order`] that
    /// exists, or the default configuration if none do.
    pub async fn load(&self) -> Result<PydronConfig> {
        for candidate in self.search_order() {
            if !candidate.exists() {
                debug!(path = %candidate.display(), "config candidate not found");
                continue;
            }
            info!(path = %candidate.display(), "loading configuration");
            return self.load_from_path(&candidate).await;
        }
        debug!("no configuration file found in search order, using defaults");
        Ok(PydronConfig::default())
    }

    async fn load_from_path(&self, path: &Path) -> Result<PydronConfig> {
        let content = fs::read_to_string(path).await?;
        let config: PydronConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads a specific path unconditionally, failing if it is missing.
    pub async fn load_explicit(&self, path: &Path) -> Result<PydronConfig> {
        if !path.exists() {
            return Err(PydronError::Configuration(format!("config file not found: {}", path.display())));
        }
        self.load_from_path(path).await
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_order_places_explicit_path_first() {
        let loader = ConfigLoader::new().with_explicit_path("/tmp/custom.toml");
        let order = loader.search_order();
        assert_eq!(order[0], PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn search_order_ends_with_system_file() {
        let loader = ConfigLoader::new();
        let order = loader.search_order();
        assert_eq!(order.last(), Some(&PathBuf::from(SYSTEM_FILE)));
    }

    #[tokio::test]
    async fn load_falls_back_to_defaults_when_nothing_found() {
        let loader = ConfigLoader::new().with_explicit_path("/nonexistent/path/pydron.toml");
        let config = loader.load().await.unwrap();
        assert_eq!(config.scheduler, "trivial");
    }

    #[tokio::test]
    async fn load_explicit_fails_on_missing_file() {
        let loader = ConfigLoader::new();
        let err = loader.load_explicit(Path::new("/nonexistent/pydron.toml")).await.unwrap_err();
        assert!(matches!(err, PydronError::Configuration(_)));
    }

    #[tokio::test]
    async fn load_explicit_parses_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pydron.toml");
        tokio::fs::write(&path, "scheduler = \"trivial\"\n").await.unwrap();
        let loader = ConfigLoader::new();
        let config = loader.load_explicit(&path).await.unwrap();
        assert_eq!(config.scheduler, "trivial");
    }
}
