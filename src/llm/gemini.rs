//! Google Gemini client.

use super::{InferenceProvider, LlmHttpConfig, build_http_client};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Google Gemini inference client.
pub struct GeminiClient {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str =
        "https://generativelanguage.googleapis.com/v1beta";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    /// Creates a new Gemini client, reading the key from `GEMINI_API_KEY`.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").ok();
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Validates that an API key is configured and plausibly formed.
    ///
    /// Google API keys are at least 30 characters of URL-safe material;
    /// this rejects obviously malformed keys before any network request.
    fn validate(&self) -> Result<()> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::OperationFailed {
                operation: "gemini_request".to_string(),
                cause: "GEMINI_API_KEY not set".to_string(),
            })?;

        if !Self::is_valid_api_key_format(key) {
            return Err(Error::OperationFailed {
                operation: "gemini_request".to_string(),
                cause: "Invalid API key format".to_string(),
            });
        }

        Ok(())
    }

    fn is_valid_api_key_format(key: &str) -> bool {
        const MIN_KEY_LENGTH: usize = 30;

        key.len() >= MIN_KEY_LENGTH
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Makes a `generateContent` request.
    fn request(&self, prompt: &str) -> Result<String> {
        self.validate()?;

        tracing::info!(provider = "gemini", model = %self.model, "Making inference request");

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::OperationFailed {
                operation: "gemini_request".to_string(),
                cause: "API key not configured".to_string(),
            })?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else if e.is_request() {
                    "request"
                } else {
                    "unknown"
                };
                tracing::error!(
                    provider = "gemini",
                    model = %self.model,
                    error = %e,
                    error_kind = error_kind,
                    "Inference request failed"
                );
                Error::OperationFailed {
                    operation: "gemini_request".to_string(),
                    cause: format!("{error_kind} error: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            tracing::error!(
                provider = "gemini",
                model = %self.model,
                status = %status,
                body = %body,
                "Inference API returned error status"
            );
            return Err(Error::OperationFailed {
                operation: "gemini_request".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        let response: GenerateContentResponse = response.json().map_err(|e| {
            tracing::error!(
                provider = "gemini",
                model = %self.model,
                error = %e,
                "Failed to parse inference response"
            );
            Error::OperationFailed {
                operation: "gemini_response".to_string(),
                cause: e.to_string(),
            }
        })?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| Error::OperationFailed {
                operation: "gemini_response".to_string(),
                cause: "No text content in response".to_string(),
            })
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        self.request(prompt)
    }
}

/// Request to the `generateContent` API.
#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

/// Response from the `generateContent` API.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GeminiClient::new();
        assert_eq!(client.name(), "gemini");
        assert_eq!(client.model, GeminiClient::DEFAULT_MODEL);
    }

    #[test]
    fn test_client_configuration() {
        let client = GeminiClient::new()
            .with_api_key("test-key")
            .with_endpoint("https://custom.endpoint")
            .with_model("gemini-2.5-pro");

        assert_eq!(client.api_key, Some("test-key".to_string()));
        assert_eq!(client.endpoint, "https://custom.endpoint");
        assert_eq!(client.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_validate_no_key() {
        let client = GeminiClient {
            api_key: None,
            endpoint: GeminiClient::DEFAULT_ENDPOINT.to_string(),
            model: GeminiClient::DEFAULT_MODEL.to_string(),
            client: reqwest::blocking::Client::new(),
        };

        assert!(client.validate().is_err());
    }

    #[test]
    fn test_api_key_format() {
        assert!(GeminiClient::is_valid_api_key_format(
            "AIzaSyA1234567890abcdefghijklmnopqrs"
        ));
        assert!(!GeminiClient::is_valid_api_key_format("short"));
        assert!(!GeminiClient::is_valid_api_key_format(
            "AIzaSyA1234567890abcdefghij klmnopqrs"
        ));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "ответ"}], "role": "model"}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, "ответ");
    }
}
