//! Startup wiring: turns configuration and credentials into the store and
//! provider handles a run works with.

use std::rc::Rc;
use std::time::Duration;

use log::info;

use crate::config::{Config, Credentials, RunConfig, StoreKind, STORE_API_KEY_ENV};
use crate::error::ConfigError;
use crate::providers::gemini::GeminiClient;
use crate::providers::nominatim::NominatimClient;
use crate::providers::unsplash::UnsplashSource;
use crate::providers::wikipedia::WikipediaThumbnailSource;
use crate::providers::{ImageChain, ImageSource, ReverseGeocoder, TextInference};
use crate::spot::Locale;
use crate::store::rest::RestSpotStore;
use crate::store::sqlite::SqliteSpotStore;
use crate::store::SpotStore;
use crate::throttle::{Pause, RetryPolicy, ThreadPause};

/// Everything one enrichment run needs, built once at startup.
pub struct PipelineContext {
    pub store: Box<dyn SpotStore>,
    /// Absent when the run has no text-inference gaps enabled.
    pub text: Option<Box<dyn TextInference>>,
    pub geocoder: Box<dyn ReverseGeocoder>,
    pub images: ImageChain,
    pub pause: Box<dyn Pause>,
    pub policy: RetryPolicy,
    pub run: RunConfig,
    pub page_size: usize,
}

impl PipelineContext {
    pub fn from_config(config: &Config, credentials: &Credentials) -> Result<Self, ConfigError> {
        config.validate()?;
        credentials.require_for(config)?;

        let providers = &config.providers;
        let timeout = Duration::from_secs(providers.request_timeout_secs);
        let store = open_store(config, credentials, timeout)?;

        let text: Option<Box<dyn TextInference>> = match &credentials.gemini_api_key {
            Some(api_key) if config.needs_text_inference() => Some(Box::new(GeminiClient::new(
                &providers.gemini_base_url,
                &providers.gemini_model,
                api_key,
                Duration::from_millis(providers.gemini_delay_ms),
                timeout,
            ))),
            _ => None,
        };

        let geocoder = Box::new(NominatimClient::new(
            &providers.nominatim_url,
            &providers.user_agent,
            Duration::from_millis(providers.nominatim_delay_ms),
            timeout,
        ));

        let wikipedia_delay = Duration::from_millis(providers.wikipedia_delay_ms);
        let mut sources: Vec<Box<dyn ImageSource>> = vec![
            Box::new(WikipediaThumbnailSource::new(
                Locale::En,
                &providers.user_agent,
                wikipedia_delay,
                timeout,
            )),
            Box::new(WikipediaThumbnailSource::new(
                Locale::Ja,
                &providers.user_agent,
                wikipedia_delay,
                timeout,
            )),
        ];
        if let Some(access_key) = &credentials.unsplash_access_key {
            let pacer =
                UnsplashSource::shared_pacer(Duration::from_millis(providers.unsplash_delay_ms));
            for query_locale in [Locale::En, Locale::Ja] {
                sources.push(Box::new(UnsplashSource::new(
                    &providers.unsplash_url,
                    access_key,
                    query_locale,
                    Rc::clone(&pacer),
                    timeout,
                )));
            }
        } else {
            info!("No Unsplash access key; stock-photo fallback disabled");
        }
        let images = ImageChain::new(sources);
        info!("Image sources: {}", images.source_labels().join(" -> "));

        Ok(Self {
            store,
            text,
            geocoder,
            images,
            pause: Box::new(ThreadPause),
            policy: RetryPolicy::from_config(&config.retry),
            run: config.run.clone(),
            page_size: config.store.page_size,
        })
    }
}

fn open_store(
    config: &Config,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<Box<dyn SpotStore>, ConfigError> {
    match config.store.kind {
        StoreKind::Sqlite => {
            let path = config.sqlite_path().ok_or_else(|| {
                ConfigError::Invalid(
                    "no data directory available; set store.sqlite_path".to_string(),
                )
            })?;
            let store = SqliteSpotStore::open(&path)?;
            info!(
                "Using SQLite store at {} ({} spots)",
                path.display(),
                store.count()?
            );
            Ok(Box::new(store))
        }
        StoreKind::Rest => {
            let api_key = credentials
                .store_api_key
                .as_deref()
                .ok_or(ConfigError::MissingCredential(STORE_API_KEY_ENV))?;
            info!(
                "Using REST store {} table {}",
                config.store.rest_url, config.store.table
            );
            Ok(Box::new(RestSpotStore::new(
                &config.store.rest_url,
                &config.store.table,
                api_key,
                timeout,
            )))
        }
    }
}
