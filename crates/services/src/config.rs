use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Tunables of the session engine.
///
/// Every field has a default so a partial TOML file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub autosave_interval_secs: u64,
    pub change_debounce_ms: u64,
    pub question_set_page_size: u32,
    pub exam_duration_secs: u32,
    pub exam_question_count: usize,
    pub quick_practice_default_limit: u32,
    /// Most candidates fetched before quick practice and the full exam shuffle
    /// and pick. Questions beyond this many in a bank are never drawn.
    pub shuffle_pool: usize,
    /// Run every mode under exam rules (countdown, no revisiting).
    pub force_exam_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: 30,
            change_debounce_ms: 500,
            question_set_page_size: 50,
            exam_duration_secs: 3600,
            exam_question_count: 40,
            quick_practice_default_limit: 10,
            shuffle_pool: 5_000,
            force_exam_mode: false,
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, then apply `EXAM_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or an
    /// override is not a valid value.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                debug!(path = %path.display(), "config file missing, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides looked up by `lookup` (normally the process environment).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` for a value that does not parse.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        override_value(&lookup, "EXAM_AUTOSAVE_INTERVAL_SECS", &mut self.autosave_interval_secs)?;
        override_value(&lookup, "EXAM_CHANGE_DEBOUNCE_MS", &mut self.change_debounce_ms)?;
        override_value(&lookup, "EXAM_SET_PAGE_SIZE", &mut self.question_set_page_size)?;
        override_value(&lookup, "EXAM_DURATION_SECS", &mut self.exam_duration_secs)?;
        override_value(&lookup, "EXAM_QUESTION_COUNT", &mut self.exam_question_count)?;
        override_value(&lookup, "EXAM_QUICK_LIMIT", &mut self.quick_practice_default_limit)?;
        override_value(&lookup, "EXAM_SHUFFLE_POOL", &mut self.shuffle_pool)?;
        override_value(&lookup, "EXAM_FORCE_EXAM_MODE", &mut self.force_exam_mode)?;
        Ok(())
    }

    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    #[must_use]
    pub fn change_debounce(&self) -> Duration {
        Duration::from_millis(self.change_debounce_ms)
    }
}

fn override_value<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, raw })?;
    Ok(())
}
