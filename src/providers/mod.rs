//! Provider adapter abstractions and concrete implementations.

pub mod gemini;
pub mod nominatim;
pub mod response_schema;
pub mod unsplash;
pub mod wikipedia;

use std::collections::BTreeMap;

use log::debug;
use serde_json::Value;

use crate::error::ProviderError;
use crate::spot::Locale;

/// Country stored when reverse geocoding legitimately finds nothing (open sea).
pub const UNKNOWN_COUNTRY: &str = "Other";
/// Display-locale copy of [`UNKNOWN_COUNTRY`].
pub const UNKNOWN_COUNTRY_JA: &str = "その他";

/// Instruction plus optional structured context for a text-inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub instruction: String,
    pub context: Option<Value>,
}

/// Free-text inference (classification, translation, year lookup).
pub trait TextInference {
    fn label(&self) -> &'static str;

    /// Returns the provider's raw text answer. Extracting structure from it is
    /// the caller's job.
    fn complete(&self, request: &InferenceRequest) -> Result<String, ProviderError>;
}

/// Coordinates to country name.
pub trait ReverseGeocoder {
    fn label(&self) -> &'static str;

    /// `Ok(None)` means the provider found no country at these coordinates.
    fn country_at(&self, lat: f64, lon: f64, locale: Locale)
        -> Result<Option<String>, ProviderError>;
}

/// What an image source may search with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageQuery {
    pub base_name: String,
    pub localized_names: BTreeMap<Locale, String>,
    /// Content hint such as the spot category.
    pub hint: Option<String>,
}

impl ImageQuery {
    /// Search term for `locale`; English falls back to the base name.
    pub fn term_for(&self, locale: Locale) -> Option<&str> {
        match self.localized_names.get(&locale) {
            Some(name) => Some(name.as_str()),
            None if locale == Locale::En && !self.base_name.is_empty() => {
                Some(self.base_name.as_str())
            }
            None => None,
        }
    }
}

/// One independent source of representative images.
pub trait ImageSource {
    fn label(&self) -> &'static str;

    /// `Ok(None)` means this source has no image for the query.
    fn find_image(&self, query: &ImageQuery) -> Result<Option<String>, ProviderError>;
}

/// Ordered fallback chain of image sources.
pub struct ImageChain {
    sources: Vec<Box<dyn ImageSource>>,
}

impl ImageChain {
    pub fn new(sources: Vec<Box<dyn ImageSource>>) -> Self {
        Self { sources }
    }

    pub fn source_labels(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.label()).collect()
    }

    /// Returns the first hit in chain order; later sources are not called.
    ///
    /// A rate limit stops the chain so the whole lookup can be retried. Other
    /// source failures fall through to the next source; if nothing is found the
    /// last such failure is reported instead of a plain "no image".
    pub fn find_image(&self, query: &ImageQuery) -> Result<Option<String>, ProviderError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.find_image(query) {
                Ok(Some(url)) => {
                    debug!("Image[{}]: hit from {}", query.base_name, source.label());
                    return Ok(Some(url));
                }
                Ok(None) => {
                    debug!("Image[{}]: no result from {}", query.base_name, source.label());
                }
                Err(error) if error.is_rate_limited() => return Err(error),
                Err(error) => {
                    debug!("Image[{}]: {}", query.base_name, error);
                    last_error = Some(error);
                }
            }
        }
        match last_error {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::{ImageChain, ImageQuery, ImageSource};
    use crate::error::ProviderError;
    use crate::spot::Locale;

    struct StubSource {
        label: &'static str,
        result: Result<Option<String>, ProviderError>,
        calls: std::rc::Rc<Cell<usize>>,
    }

    impl ImageSource for StubSource {
        fn label(&self) -> &'static str {
            self.label
        }

        fn find_image(&self, _query: &ImageQuery) -> Result<Option<String>, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    fn stub(
        label: &'static str,
        result: Result<Option<String>, ProviderError>,
    ) -> (Box<dyn ImageSource>, std::rc::Rc<Cell<usize>>) {
        let calls = std::rc::Rc::new(Cell::new(0));
        (
            Box::new(StubSource {
                label,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn query() -> ImageQuery {
        ImageQuery {
            base_name: "Mont Saint-Michel".to_string(),
            ..ImageQuery::default()
        }
    }

    #[test]
    fn test_chain_returns_first_hit_and_skips_later_sources() {
        let (a, a_calls) = stub("a", Ok(None));
        let (b, b_calls) = stub("b", Ok(Some("https://images.example/b.jpg".to_string())));
        let (c, c_calls) = stub("c", Ok(Some("https://images.example/c.jpg".to_string())));
        let chain = ImageChain::new(vec![a, b, c]);

        let found = chain.find_image(&query()).expect("lookup");
        assert_eq!(found.as_deref(), Some("https://images.example/b.jpg"));
        assert_eq!(a_calls.get(), 1);
        assert_eq!(b_calls.get(), 1);
        assert_eq!(c_calls.get(), 0);
    }

    #[test]
    fn test_exhausted_chain_is_no_image_not_error() {
        let (a, _) = stub("a", Ok(None));
        let (b, _) = stub("b", Ok(None));
        let chain = ImageChain::new(vec![a, b]);
        assert_eq!(chain.find_image(&query()).expect("lookup"), None);
    }

    #[test]
    fn test_transient_failure_falls_through_to_next_source() {
        let (a, _) = stub("a", Err(ProviderError::transient("a", "HTTP 500")));
        let (b, _) = stub("b", Ok(Some("https://images.example/b.jpg".to_string())));
        let chain = ImageChain::new(vec![a, b]);
        assert!(chain.find_image(&query()).expect("lookup").is_some());
    }

    #[test]
    fn test_rate_limit_stops_the_chain() {
        let (a, _) = stub("a", Err(ProviderError::rate_limited("a", "HTTP 429")));
        let (b, b_calls) = stub("b", Ok(Some("https://images.example/b.jpg".to_string())));
        let chain = ImageChain::new(vec![a, b]);
        assert!(chain
            .find_image(&query())
            .expect_err("rate limit surfaces")
            .is_rate_limited());
        assert_eq!(b_calls.get(), 0);
    }

    #[test]
    fn test_term_for_falls_back_to_base_name_only_for_english() {
        let mut query = query();
        assert_eq!(query.term_for(Locale::En), Some("Mont Saint-Michel"));
        assert_eq!(query.term_for(Locale::Ja), None);
        query
            .localized_names
            .insert(Locale::Ja, "モン・サン・ミシェル".to_string());
        assert_eq!(query.term_for(Locale::Ja), Some("モン・サン・ミシェル"));
    }
}
