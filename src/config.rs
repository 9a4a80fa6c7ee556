//! Run configuration model, defaults, and startup loading.
//!
//! Tunables live in a TOML file; secrets come from the environment. Both are
//! read once at startup and never change during a run.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::gaps::GapKind;
use crate::spot::Locale;

pub const GEMINI_API_KEY_ENV: &str = "SPOTFILL_GEMINI_API_KEY";
pub const UNSPLASH_ACCESS_KEY_ENV: &str = "SPOTFILL_UNSPLASH_ACCESS_KEY";
pub const STORE_API_KEY_ENV: &str = "SPOTFILL_STORE_API_KEY";

/// Root configuration persisted to `spotfill.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Record store selection and paging.
    pub store: StoreConfig,
    #[serde(default)]
    /// Which gaps to work on and how to batch them.
    pub run: RunConfig,
    #[serde(default)]
    /// Provider endpoints and pacing.
    pub providers: ProvidersConfig,
    #[serde(default)]
    /// Rate-limit cooldown behavior.
    pub retry: RetryConfig,
}

/// Backing store flavor.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Local SQLite database file.
    #[default]
    Sqlite,
    /// PostgREST-compatible table API.
    Rest,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// SQLite file; defaults to `<data dir>/spotfill/spots.db`.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
    /// Base URL of the table API, e.g. `https://project.supabase.co`.
    #[serde(default)]
    pub rest_url: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Rows per page; the hosted API caps single reads at this many rows.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RunConfig {
    #[serde(default = "default_locales")]
    pub locales: Vec<Locale>,
    /// Spots grouped into one batched inference call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dry_run: bool,
    /// Stop after this many gap-bearing spots; unlimited when absent.
    #[serde(default)]
    pub max_spots: Option<usize>,
    /// Restrict the run to these gap kinds; all kinds when empty.
    #[serde(default)]
    pub only: Vec<GapKind>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_delay_ms")]
    pub gemini_delay_ms: u64,
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
    #[serde(default = "default_nominatim_delay_ms")]
    pub nominatim_delay_ms: u64,
    #[serde(default = "default_wikipedia_delay_ms")]
    pub wikipedia_delay_ms: u64,
    #[serde(default = "default_unsplash_url")]
    pub unsplash_url: String,
    #[serde(default = "default_unsplash_delay_ms")]
    pub unsplash_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_max_cooldown_secs")]
    pub max_cooldown_secs: u64,
    /// Attempts per unit of work while the provider keeps rate limiting.
    #[serde(default = "default_max_rate_limit_attempts")]
    pub max_rate_limit_attempts: u32,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_true() -> bool {
    true
}

fn default_table() -> String {
    "spots".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_locales() -> Vec<Locale> {
    vec![Locale::En, Locale::Ja, Locale::Zh, Locale::Ko]
}

fn default_batch_size() -> usize {
    10
}

fn default_user_agent() -> String {
    "spotfill/0.1.0 (point-of-interest enrichment batch job)".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_delay_ms() -> u64 {
    4000
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_nominatim_delay_ms() -> u64 {
    1100
}

fn default_wikipedia_delay_ms() -> u64 {
    100
}

fn default_unsplash_url() -> String {
    "https://api.unsplash.com".to_string()
}

fn default_unsplash_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_max_cooldown_secs() -> u64 {
    300
}

fn default_max_rate_limit_attempts() -> u32 {
    8
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            sqlite_path: None,
            rest_url: String::new(),
            table: default_table(),
            page_size: default_page_size(),
        }
    }
}

impl RunConfig {
    pub fn includes(&self, kind: GapKind) -> bool {
        self.only.is_empty() || self.only.contains(&kind)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            locales: default_locales(),
            batch_size: default_batch_size(),
            dry_run: false,
            max_spots: None,
            only: Vec::new(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            gemini_base_url: default_gemini_base_url(),
            gemini_model: default_gemini_model(),
            gemini_delay_ms: default_gemini_delay_ms(),
            nominatim_url: default_nominatim_url(),
            nominatim_delay_ms: default_nominatim_delay_ms(),
            wikipedia_delay_ms: default_wikipedia_delay_ms(),
            unsplash_url: default_unsplash_url(),
            unsplash_delay_ms: default_unsplash_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            max_cooldown_secs: default_max_cooldown_secs(),
            max_rate_limit_attempts: default_max_rate_limit_attempts(),
            jitter: true,
        }
    }
}

impl Config {
    /// Default config file location under the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("spotfill").join("spotfill.toml"))
    }

    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            log::info!("No config at {}; using built-in defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.page_size == 0 {
            return Err(ConfigError::Invalid(
                "store.page_size must be at least 1".to_string(),
            ));
        }
        if self.run.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "run.batch_size must be at least 1".to_string(),
            ));
        }
        if self.run.locales.is_empty() {
            return Err(ConfigError::Invalid(
                "run.locales must name at least one locale".to_string(),
            ));
        }
        if self.store.kind == StoreKind::Rest && self.store.rest_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store.rest_url is required when store.kind = \"rest\"".to_string(),
            ));
        }
        if self.retry.max_rate_limit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_rate_limit_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `true` when the run touches gaps of `kind`.
    pub fn includes(&self, kind: GapKind) -> bool {
        self.run.includes(kind)
    }

    /// Returns `true` when any enabled gap kind needs the text-inference provider.
    pub fn needs_text_inference(&self) -> bool {
        [GapKind::Category, GapKind::Year, GapKind::Locale]
            .into_iter()
            .any(|kind| self.includes(kind))
    }

    pub fn sqlite_path(&self) -> Option<PathBuf> {
        self.store.sqlite_path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("spotfill").join("spots.db"))
        })
    }
}

/// Secrets read from the environment at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub unsplash_access_key: Option<String>,
    pub store_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            gemini_api_key: read(GEMINI_API_KEY_ENV),
            unsplash_access_key: read(UNSPLASH_ACCESS_KEY_ENV),
            store_api_key: read(STORE_API_KEY_ENV),
        }
    }

    /// Checks that every credential the configured run depends on is present.
    pub fn require_for(&self, config: &Config) -> Result<(), ConfigError> {
        if config.needs_text_inference() && self.gemini_api_key.is_none() {
            return Err(ConfigError::MissingCredential(GEMINI_API_KEY_ENV));
        }
        if config.store.kind == StoreKind::Rest && self.store_api_key.is_none() {
            return Err(ConfigError::MissingCredential(STORE_API_KEY_ENV));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Config, ConfigError, Credentials, StoreKind, GEMINI_API_KEY_ENV, STORE_API_KEY_ENV,
    };
    use crate::gaps::GapKind;
    use crate::spot::Locale;

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert_eq!(config.store.table, "spots");
        assert_eq!(config.store.page_size, 1000);
        assert_eq!(
            config.run.locales,
            vec![Locale::En, Locale::Ja, Locale::Zh, Locale::Ko]
        );
        assert_eq!(config.run.batch_size, 10);
        assert!(!config.run.dry_run);
        assert_eq!(config.run.max_spots, None);
        assert!(config.run.only.is_empty());
        assert_eq!(config.providers.gemini_delay_ms, 4000);
        assert_eq!(config.providers.nominatim_delay_ms, 1100);
        assert_eq!(config.retry.cooldown_secs, 30);
        assert_eq!(config.retry.max_rate_limit_attempts, 8);
        assert!(config.retry.jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_missing_fields_with_defaults() {
        let text = r#"
[store]
kind = "rest"
rest_url = "https://example.supabase.co"
page_size = 500

[run]
locales = ["en", "th"]
only = ["image", "country"]
"#;
        let config = Config::from_toml_str(text).expect("config should parse");
        assert_eq!(config.store.kind, StoreKind::Rest);
        assert_eq!(config.store.page_size, 500);
        assert_eq!(config.store.table, "spots");
        assert_eq!(config.run.locales, vec![Locale::En, Locale::Th]);
        assert_eq!(config.run.batch_size, 10);
        assert!(config.includes(GapKind::Image));
        assert!(!config.includes(GapKind::Year));
        assert!(!config.needs_text_inference());
        assert_eq!(config.retry.max_cooldown_secs, 300);
    }

    #[test]
    fn test_validate_rejects_zero_page_size_and_missing_rest_url() {
        let mut config = Config::default();
        config.store.page_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.store.kind = StoreKind::Rest;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_gemini_key_is_fatal_when_inference_is_enabled() {
        let credentials = Credentials::from_lookup(|_| None);
        let error = credentials
            .require_for(&Config::default())
            .expect_err("missing key should be rejected");
        assert!(matches!(error, ConfigError::MissingCredential(GEMINI_API_KEY_ENV)));
    }

    #[test]
    fn test_rest_store_requires_store_key() {
        let credentials = Credentials::from_lookup(|key| {
            (key == GEMINI_API_KEY_ENV).then(|| "gemini-key".to_string())
        });
        let mut config = Config::default();
        config.store.kind = StoreKind::Rest;
        config.store.rest_url = "https://example.supabase.co".to_string();
        assert!(matches!(
            credentials.require_for(&config),
            Err(ConfigError::MissingCredential(STORE_API_KEY_ENV))
        ));
    }

    #[test]
    fn test_blank_credentials_count_as_missing() {
        let credentials = Credentials::from_lookup(|_| Some("   ".to_string()));
        assert_eq!(credentials, Credentials::default());
    }
}
