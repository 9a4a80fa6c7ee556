//! Unsplash stock-photo image source.

use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::providers::{ImageQuery, ImageSource};
use crate::spot::Locale;
use crate::throttle::{classify_ureq_failure, http_agent, Pacer};

const PROVIDER: &str = "Unsplash";

/// Searches stock photos using the spot name in one query language.
///
/// Sources built for different query languages share one pacer, since the
/// quota belongs to the access key.
pub struct UnsplashSource {
    http_client: ureq::Agent,
    pacer: Rc<Pacer>,
    base_url: String,
    access_key: String,
    query_locale: Locale,
}

impl UnsplashSource {
    /// Pacer for every source that uses the same access key.
    pub fn shared_pacer(call_delay: Duration) -> Rc<Pacer> {
        Rc::new(Pacer::new(PROVIDER, call_delay))
    }

    pub fn new(
        base_url: &str,
        access_key: &str,
        query_locale: Locale,
        pacer: Rc<Pacer>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client: http_agent(timeout),
            pacer,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
            query_locale,
        }
    }

    fn search_term(&self, query: &ImageQuery) -> Option<String> {
        let term = query.term_for(self.query_locale)?.trim();
        if term.is_empty() {
            return None;
        }
        Some(match query.hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() && self.query_locale == Locale::En => {
                format!("{term} {hint}")
            }
            _ => term.to_string(),
        })
    }

    fn search_url(&self, term: &str) -> String {
        format!(
            "{}/search/photos?query={}&per_page=1&orientation=landscape&content_filter=high",
            self.base_url,
            urlencoding::encode(term)
        )
    }

    fn photo_from_response(response: &Value) -> Option<String> {
        response["results"]
            .as_array()?
            .iter()
            .find_map(|photo| photo["urls"]["regular"].as_str())
            .map(str::to_string)
    }
}

impl ImageSource for UnsplashSource {
    fn label(&self) -> &'static str {
        PROVIDER
    }

    fn find_image(&self, query: &ImageQuery) -> Result<Option<String>, ProviderError> {
        let Some(term) = self.search_term(query) else {
            return Ok(None);
        };
        self.pacer.wait();
        let response = self
            .http_client
            .get(&self.search_url(&term))
            .set("Authorization", &format!("Client-ID {}", self.access_key))
            .set("Accept-Version", "v1")
            .call()
            .map_err(|error| match error {
                // Unsplash signals an exhausted hourly quota with 403.
                ureq::Error::Status(403, response) => {
                    let body = response.into_string().unwrap_or_default();
                    if body.to_ascii_lowercase().contains("rate limit") {
                        ProviderError::rate_limited(PROVIDER, "HTTP 403 rate limit exceeded")
                    } else {
                        ProviderError::transient(PROVIDER, format!("HTTP 403 {body}"))
                    }
                }
                other => classify_ureq_failure(PROVIDER, other),
            })?;
        let parsed: Value = response.into_json().map_err(|error| {
            ProviderError::transient(PROVIDER, format!("failed to read response: {error}"))
        })?;
        Ok(Self::photo_from_response(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::UnsplashSource;
    use crate::providers::ImageQuery;
    use crate::spot::Locale;

    fn source(locale: Locale) -> UnsplashSource {
        UnsplashSource::new(
            "https://api.unsplash.com",
            "key",
            locale,
            UnsplashSource::shared_pacer(Duration::ZERO),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_sources_sharing_a_key_are_paced_together() {
        let pacer = UnsplashSource::shared_pacer(Duration::from_millis(40));
        let sources: Vec<UnsplashSource> = [Locale::En, Locale::Ja]
            .into_iter()
            .map(|locale| {
                UnsplashSource::new(
                    "https://api.unsplash.com",
                    "key",
                    locale,
                    Rc::clone(&pacer),
                    Duration::from_secs(5),
                )
            })
            .collect();
        assert!(Rc::ptr_eq(&sources[0].pacer, &sources[1].pacer));
        let started = Instant::now();
        sources[0].pacer.wait();
        sources[1].pacer.wait();
        sources[0].pacer.wait();
        assert!(started.elapsed() >= Duration::from_millis(75));
    }

    #[test]
    fn test_photo_from_response_takes_first_regular_url() {
        let response = json!({
            "total": 2,
            "results": [
                { "urls": { "regular": "https://images.unsplash.com/a" } },
                { "urls": { "regular": "https://images.unsplash.com/b" } }
            ]
        });
        assert_eq!(
            UnsplashSource::photo_from_response(&response).as_deref(),
            Some("https://images.unsplash.com/a")
        );
        assert_eq!(
            UnsplashSource::photo_from_response(&json!({ "total": 0, "results": [] })),
            None
        );
    }

    #[test]
    fn test_search_term_uses_query_locale_and_hint() {
        let mut query = ImageQuery {
            base_name: "Kiyomizu-dera".to_string(),
            hint: Some("history".to_string()),
            ..ImageQuery::default()
        };
        assert_eq!(
            source(Locale::En).search_term(&query).as_deref(),
            Some("Kiyomizu-dera history")
        );
        assert_eq!(source(Locale::Ja).search_term(&query), None);
        query
            .localized_names
            .insert(Locale::Ja, "清水寺".to_string());
        assert_eq!(
            source(Locale::Ja).search_term(&query).as_deref(),
            Some("清水寺")
        );
    }

    #[test]
    fn test_search_url_encodes_term() {
        assert_eq!(
            source(Locale::En).search_url("清水寺 temple"),
            "https://api.unsplash.com/search/photos?query=%E6%B8%85%E6%B0%B4%E5%AF%BA%20temple&per_page=1&orientation=landscape&content_filter=high"
        );
    }
}
