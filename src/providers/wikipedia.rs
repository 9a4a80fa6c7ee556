//! Wikipedia page-thumbnail image source.

use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::providers::{ImageQuery, ImageSource};
use crate::spot::Locale;
use crate::throttle::{call_json, http_agent, Pacer};

const PROVIDER: &str = "Wikipedia";
const THUMBNAIL_SIZE_PX: u32 = 640;

/// Looks up the lead image of the article titled after the spot.
pub struct WikipediaThumbnailSource {
    http_client: ureq::Agent,
    pacer: Pacer,
    wiki: Locale,
    user_agent: String,
}

impl WikipediaThumbnailSource {
    pub fn new(wiki: Locale, user_agent: &str, call_delay: Duration, timeout: Duration) -> Self {
        Self {
            http_client: http_agent(timeout),
            pacer: Pacer::new(PROVIDER, call_delay),
            wiki,
            user_agent: user_agent.to_string(),
        }
    }

    fn action_api_url(&self) -> String {
        format!("https://{}.wikipedia.org/w/api.php", self.wiki.code())
    }

    fn page_images_url(&self, title: &str) -> String {
        format!(
            "{}?action=query&prop=pageimages|pageprops&redirects=1&pithumbsize={}&titles={}&\
             format=json&utf8=1&maxlag=5",
            self.action_api_url(),
            THUMBNAIL_SIZE_PX,
            urlencoding::encode(title)
        )
    }

    /// First non-missing, non-disambiguation page thumbnail.
    fn thumbnail_from_response(response: &Value) -> Option<String> {
        let pages = response["query"]["pages"].as_object()?;
        for (page_id, page_value) in pages {
            if page_id == "-1" || page_value.get("missing").is_some() {
                continue;
            }
            let disambiguation = &page_value["pageprops"]["disambiguation"];
            if disambiguation.is_string() || disambiguation.is_object() {
                continue;
            }
            if let Some(source) = page_value["thumbnail"]["source"].as_str() {
                let trimmed = source.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }
}

impl ImageSource for WikipediaThumbnailSource {
    fn label(&self) -> &'static str {
        PROVIDER
    }

    fn find_image(&self, query: &ImageQuery) -> Result<Option<String>, ProviderError> {
        let Some(title) = query.term_for(self.wiki) else {
            return Ok(None);
        };
        self.pacer.wait();
        let url = self.page_images_url(title);
        let response = call_json(
            PROVIDER,
            self.http_client
                .get(&url)
                .set("User-Agent", &self.user_agent)
                .set("Accept", "application/json")
                .call(),
        )?;
        if response["error"]["code"].as_str() == Some("maxlag") {
            return Err(ProviderError::rate_limited(PROVIDER, "maxlag"));
        }
        Ok(Self::thumbnail_from_response(&response))
    }
}
