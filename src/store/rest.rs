//! PostgREST-style table API backend (the hosted store).

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::spot::{Spot, SpotPatch};
use crate::store::SpotStore;
use crate::throttle::http_agent;

/// Spot store reached over a PostgREST-compatible HTTP API.
pub struct RestSpotStore {
    http_client: ureq::Agent,
    base_url: String,
    table: String,
    api_key: String,
}

impl RestSpotStore {
    pub fn new(base_url: &str, table: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            http_client: http_agent(timeout),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            table: table.trim().to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, urlencoding::encode(&self.table))
    }

    fn page_url(&self, offset: usize, limit: usize) -> String {
        format!(
            "{}?select=*&order=id.asc&offset={offset}&limit={limit}",
            self.table_url()
        )
    }

    fn update_url(&self, id: &str) -> String {
        format!(
            "{}?id=eq.{}&select=id",
            self.table_url(),
            urlencoding::encode(id)
        )
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
    }
}

impl SpotStore for RestSpotStore {
    fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<Spot>, StoreError> {
        let url = self.page_url(offset, limit);
        let response = self
            .authorized(self.http_client.get(&url))
            .call()
            .map_err(|error| {
                StoreError::Http(format!("page read at offset {offset} failed: {error}"))
            })?;
        let rows: Vec<Map<String, Value>> = response
            .into_json()
            .map_err(|error| StoreError::Decode(format!("page at offset {offset}: {error}")))?;
        rows.iter()
            .map(|row| Spot::from_json_row(row).map_err(StoreError::Decode))
            .collect()
    }

    fn update_fields(&self, id: &str, patch: &SpotPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let url = self.update_url(id);
        let response = self
            .authorized(self.http_client.request("PATCH", &url))
            .set("Prefer", "return=representation")
            .send_json(Value::Object(patch.to_json_map()))
            .map_err(|error| StoreError::Http(format!("update of spot {id} failed: {error}")))?;
        let updated: Vec<Value> = response
            .into_json()
            .map_err(|error| StoreError::Decode(format!("update of spot {id}: {error}")))?;
        if updated.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
