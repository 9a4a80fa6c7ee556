//! Nominatim reverse-geocoding adapter.

use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::providers::ReverseGeocoder;
use crate::spot::Locale;
use crate::throttle::{call_json, http_agent, Pacer};

const PROVIDER: &str = "Nominatim";

pub struct NominatimClient {
    http_client: ureq::Agent,
    pacer: Pacer,
    base_url: String,
    user_agent: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str, call_delay: Duration, timeout: Duration) -> Self {
        Self {
            http_client: http_agent(timeout),
            pacer: Pacer::new(PROVIDER, call_delay),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    fn reverse_url(&self, lat: f64, lon: f64, locale: Locale) -> String {
        // zoom=3 resolves to country level.
        format!(
            "{}/reverse?format=jsonv2&lat={lat}&lon={lon}&zoom=3&addressdetails=1&accept-language={}",
            self.base_url,
            locale.code()
        )
    }

    fn country_from_response(response: &Value) -> Option<String> {
        if response.get("error").is_some() {
            return None;
        }
        response["address"]["country"]
            .as_str()
            .map(str::trim)
            .filter(|country| !country.is_empty())
            .map(str::to_string)
    }
}

impl ReverseGeocoder for NominatimClient {
    fn label(&self) -> &'static str {
        PROVIDER
    }

    fn country_at(
        &self,
        lat: f64,
        lon: f64,
        locale: Locale,
    ) -> Result<Option<String>, ProviderError> {
        self.pacer.wait();
        let url = self.reverse_url(lat, lon, locale);
        let response = call_json(
            PROVIDER,
            self.http_client
                .get(&url)
                .set("User-Agent", &self.user_agent)
                .set("Accept", "application/json")
                .call(),
        )?;
        Ok(Self::country_from_response(&response))
    }
}
