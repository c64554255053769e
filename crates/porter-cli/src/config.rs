use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "porter.toml";

/// Overrides [`PorterConfig::demo_owner_email`].
pub const DEMO_OWNER_ENV: &str = "PORTER_DEMO_OWNER";

/// Settings read from `porter.toml`. Command-line flags win over these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PorterConfig {
    /// Database snapshot file.
    pub database: PathBuf,
    /// JSON indentation for exports.
    pub indent: usize,
    /// Directory for exports written under their default name.
    pub output_dir: PathBuf,
    /// Owner of demo projects; registered on first use.
    pub demo_owner_email: String,
}

impl Default for PorterConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("porter.json"),
            indent: 2,
            output_dir: PathBuf::from("."),
            demo_owner_email: "demo@example.org".to_string(),
        }
    }
}

impl PorterConfig {
    /// Load `path`, or `./porter.toml` if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(std::env::var(DEMO_OWNER_ENV).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, demo_owner: Option<String>) {
        if let Some(email) = demo_owner.filter(|e| !e.trim().is_empty()) {
            self.demo_owner_email = email;
        }
    }
}
