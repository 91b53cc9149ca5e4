//! User configuration, persisted as TOML.
//!
//! A missing file means defaults. A file that exists but can't be parsed is a
//! hard error: silently replacing it would lose the user's favorites.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use coinsync_core::{Favorites, SortKey, SourceChoice, UnknownSortKey, UnknownSource};

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_REFRESH_SECS: u64 = 60;
/// Longest accepted automatic refresh interval: one day.
pub const MAX_REFRESH_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    UnknownSource(#[from] UnknownSource),

    #[error(transparent)]
    UnknownSortKey(#[from] UnknownSortKey),

    #[error("invalid currency '{0}'")]
    InvalidCurrency(String),

    #[error("refresh_rate_secs {secs} exceeds the maximum of {max}")]
    RefreshRateOutOfRange { secs: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_choice: String,
    pub currency: String,
    /// Seconds between automatic refreshes; 0 disables them.
    pub refresh_rate_secs: u64,
    pub sort_by: String,
    pub sort_desc: bool,
    pub cache_dir: Option<PathBuf>,
    pub favorites: Favorites,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_choice: SourceChoice::CoinGecko.as_str().to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            refresh_rate_secs: DEFAULT_REFRESH_SECS,
            sort_by: SortKey::Rank.as_str().to_string(),
            sort_desc: false,
            cache_dir: None,
            favorites: Favorites::default(),
        }
    }
}

impl SyncConfig {
    /// Load from `path`. Missing file returns defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Write to `path` atomically, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("serializing config")?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    pub fn source_choice(&self) -> Result<SourceChoice, ConfigError> {
        Ok(self.api_choice.parse()?)
    }

    pub fn sort_key(&self) -> Result<SortKey, ConfigError> {
        Ok(self.sort_by.parse()?)
    }

    /// Upper-cased currency code.
    pub fn currency(&self) -> Result<String, ConfigError> {
        normalize_currency(&self.currency)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_rate_secs > 0).then(|| Duration::from_secs(self.refresh_rate_secs))
    }

    /// Configured cache directory, or `fallback`.
    pub fn cache_dir_or(&self, fallback: PathBuf) -> PathBuf {
        self.cache_dir.clone().unwrap_or(fallback)
    }

    /// Check every field that is parsed lazily.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source_choice()?;
        self.sort_key()?;
        self.currency()?;
        if self.refresh_rate_secs > MAX_REFRESH_SECS {
            return Err(ConfigError::RefreshRateOutOfRange {
                secs: self.refresh_rate_secs,
                max: MAX_REFRESH_SECS,
            });
        }
        Ok(())
    }
}

pub fn normalize_currency(raw: &str) -> Result<String, ConfigError> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = (2..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    if valid {
        Ok(code)
    } else {
        Err(ConfigError::InvalidCurrency(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coinsync").join("config.toml");

        let mut config = SyncConfig {
            currency: "EUR".into(),
            sort_by: "price".into(),
            sort_desc: true,
            refresh_rate_secs: 30,
            ..SyncConfig::default()
        };
        config.favorites.toggle("Bitcoin");

        config.save(&path).unwrap();
        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_returns_defaults() {
        let loaded = SyncConfig::load(Path::new("/nonexistent/coinsync/config.toml")).unwrap();
        assert_eq!(loaded, SyncConfig::default());
        assert_eq!(loaded.refresh_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "currency = [not toml").unwrap();

        let err = SyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config = SyncConfig::parse(
            r#"
            currency = "gbp"

            [favorites]
            symbols = ["BTC"]
            "#,
        )
        .unwrap();
        assert_eq!(config.currency().unwrap(), "GBP");
        assert_eq!(config.sort_key().unwrap(), SortKey::Rank);
        assert!(config.favorites.legacy_symbols.contains("BTC"));
        assert!(config.favorites.names.is_empty());
    }

    #[test]
    fn unknown_api_choice_fails_validation() {
        let config = SyncConfig {
            api_choice: "coinmarketcap".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnknownSource(_))));
    }

    #[test]
    fn unknown_sort_key_fails_validation() {
        let config = SyncConfig {
            sort_by: "holdings".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnknownSortKey(_))));
    }

    #[test]
    fn zero_refresh_disables_ticking() {
        let config = SyncConfig {
            refresh_rate_secs: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.refresh_interval(), None);
    }

    #[test]
    fn oversized_refresh_rate_fails_validation() {
        let config = SyncConfig::parse("refresh_rate_secs = 9223372036854775807").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RefreshRateOutOfRange { max: MAX_REFRESH_SECS, .. })
        ));

        let day = SyncConfig {
            refresh_rate_secs: MAX_REFRESH_SECS,
            ..SyncConfig::default()
        };
        assert!(day.validate().is_ok());
    }

    #[test]
    fn currency_codes() {
        assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
        assert!(normalize_currency("").is_err());
        assert!(normalize_currency("U$D").is_err());
    }
}
