//! Gemini `generateContent` text-inference adapter backed by `ureq`.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::providers::{InferenceRequest, TextInference};
use crate::throttle::{call_json, http_agent, Pacer};

const PROVIDER: &str = "Gemini";

pub struct GeminiClient {
    http_client: ureq::Agent,
    pacer: Pacer,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        call_delay: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client: http_agent(timeout),
            pacer: Pacer::new(PROVIDER, call_delay),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        )
    }

    fn prompt_text(request: &InferenceRequest) -> String {
        match &request.context {
            Some(context) => format!(
                "{}\n\nInput:\n{}",
                request.instruction,
                serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string())
            ),
            None => request.instruction.clone(),
        }
    }

    fn request_body(request: &InferenceRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": Self::prompt_text(request) }]
            }],
            "generationConfig": {
                "temperature": 0.2,
                "responseMimeType": "application/json"
            }
        })
    }

    /// Concatenates the text parts of the first candidate.
    fn candidate_text(response: &Value) -> Result<String, ProviderError> {
        if let Some(reason) = response["promptFeedback"]["blockReason"].as_str() {
            return Err(ProviderError::parse(
                PROVIDER,
                format!("prompt blocked: {reason}"),
            ));
        }
        let parts = response["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| ProviderError::parse(PROVIDER, "response has no candidate parts"))?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(ProviderError::parse(PROVIDER, "candidate text is empty"));
        }
        Ok(text)
    }
}

impl TextInference for GeminiClient {
    fn label(&self) -> &'static str {
        PROVIDER
    }

    fn complete(&self, request: &InferenceRequest) -> Result<String, ProviderError> {
        self.pacer.wait();
        let response = call_json(
            PROVIDER,
            self.http_client
                .post(&self.endpoint())
                .set("Content-Type", "application/json")
                .send_json(Self::request_body(request)),
        )?;
        if response["error"]["status"].as_str() == Some("RESOURCE_EXHAUSTED") {
            return Err(ProviderError::rate_limited(PROVIDER, "RESOURCE_EXHAUSTED"));
        }
        Self::candidate_text(&response)
    }
}
