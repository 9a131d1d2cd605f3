//! Default summarization stage against a chat-completions provider.
//!
//! When no API key is configured, or the provider call fails, the stage degrades to a
//! deterministic extractive summary instead of failing the job. The orchestrator only
//! ever sees a failure from a summarizer that has no fallback left.

use super::{SummarizationError, Summarizer};
use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_PARAGRAPHS: usize = 5;
const FALLBACK_NOTE: &str =
    "[Extractive summary generated locally; configure a summarization API key for richer results.]";

/// Summarizer issuing chat-completion requests, with a local extractive fallback.
pub struct ChatSummarizer {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_input_chars: usize,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatSummarizer {
    /// Construct a summarizer against `api_url` using `model`.
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        model: String,
        max_input_chars: usize,
    ) -> Self {
        let http = Client::builder()
            .user_agent("docpipe/summary")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to construct reqwest::Client for summarization");
        Self {
            http,
            api_url,
            api_key,
            model,
            max_input_chars,
        }
    }

    /// Construct a summarizer using configuration derived from the environment.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config.summary_api_url.clone(),
            config.summary_api_key.clone(),
            config.summary_model.clone(),
            config.summary_max_input_chars,
        )
    }

    /// Bound the text considered by the provider, respecting char boundaries.
    fn truncate_input<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        if text.len() <= self.max_input_chars {
            return std::borrow::Cow::Borrowed(text);
        }
        let mut cut = self.max_input_chars;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        std::borrow::Cow::Owned(format!("{}...", &text[..cut]))
    }

    async fn request_summary(&self, api_key: &str, text: &str) -> Result<String, SummarizationError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a helpful assistant that creates concise summaries of documents.",
                },
                {
                    "role": "user",
                    "content": format!(
                        "Please provide a comprehensive summary of the following text extracted \
                         from a document. Focus on the main points, key findings, and important \
                         details.\n\nTEXT:\n{text}"
                    ),
                },
            ],
            "stream": false,
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.api_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|error| {
            SummarizationError::GenerationFailed(format!("malformed provider response: {error}"))
        })?;
        let summary = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if summary.is_empty() {
            return Err(SummarizationError::GenerationFailed(
                "provider response carried no summary content".to_string(),
            ));
        }
        Ok(summary)
    }
}

/// Deterministic fallback: the leading sentence of each opening paragraph.
pub(crate) fn extractive_summary(text: &str) -> String {
    let mut parts = Vec::new();
    for paragraph in text
        .split("\n\n")
        .filter(|paragraph| !paragraph.trim().is_empty())
        .take(FALLBACK_PARAGRAPHS)
    {
        let sentence = paragraph
            .split(". ")
            .next()
            .unwrap_or(paragraph)
            .trim()
            .to_string();
        if !sentence.is_empty() {
            parts.push(sentence);
        }
    }

    let mut summary = parts.join(" ");
    if summary.is_empty() {
        summary = text.trim().chars().take(200).collect();
    }
    summary.push_str("\n\n");
    summary.push_str(FALLBACK_NOTE);
    summary
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError> {
        let bounded = self.truncate_input(text);

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("No summarization API key configured; using extractive fallback");
            return Ok(extractive_summary(&bounded));
        };

        match self.request_summary(api_key, &bounded).await {
            Ok(summary) => Ok(summary),
            Err(error) => {
                tracing::warn!(error = %error, "Provider summarization failed; falling back to extractive");
                Ok(extractive_summary(&bounded))
            }
        }
    }
}

/// Build the summarizer used by the default pipeline wiring.
pub fn get_summarizer() -> Box<dyn Summarizer> {
    Box::new(ChatSummarizer::from_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn summarizer_for(server: &MockServer, api_key: Option<&str>) -> ChatSummarizer {
        ChatSummarizer::new(
            format!("{}/v1/chat/completions", server.base_url()),
            api_key.map(str::to_string),
            "grok-2-latest".to_string(),
            100,
        )
    }

    #[tokio::test]
    async fn uses_provider_summary_when_available() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer key-123")
                    .body_contains("grok-2-latest");
                then.status(200).json_body(serde_json::json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "A tight summary." } }
                    ]
                }));
            })
            .await;

        let summary = summarizer_for(&server, Some("key-123"))
            .summarize("Long report body.")
            .await
            .expect("summarize succeeds");
        mock.assert();
        assert_eq!(summary, "A tight summary.");
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_extractive_summary() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("provider exploded");
            })
            .await;

        let summary = summarizer_for(&server, Some("key-123"))
            .summarize("First finding. Second finding.\n\nSecond paragraph here.")
            .await
            .expect("fallback reports success");
        assert!(summary.starts_with("First finding"));
        assert!(summary.contains("Extractive summary generated locally"));
    }

    #[tokio::test]
    async fn missing_api_key_skips_provider_entirely() {
        let server = MockServer::start_async().await;
        let summary = summarizer_for(&server, None)
            .summarize("Only paragraph. Trailing sentence.")
            .await
            .expect("fallback reports success");
        assert!(summary.starts_with("Only paragraph"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let summarizer = ChatSummarizer::new(
            "http://localhost/unused".to_string(),
            None,
            "model".to_string(),
            10,
        );
        let bounded = summarizer.truncate_input("héllo wörld, this runs long");
        assert!(bounded.len() <= 14); // budget plus ellipsis
        assert!(bounded.ends_with("..."));

        let short = summarizer.truncate_input("short");
        assert_eq!(short, "short");
    }

    #[test]
    fn extractive_summary_takes_leading_sentences() {
        let text = "Alpha one. Alpha two.\n\nBeta one. Beta two.\n\nGamma one.";
        let summary = extractive_summary(text);
        assert!(summary.starts_with("Alpha one Beta one Gamma one."));
    }
}
