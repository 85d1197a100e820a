#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{ChatModel, ChatTurn, Role};
use crate::HelperError;
use crate::config::{LlmConfig, api_base_url};

/// Client for the Gemini `generateContent` endpoint
#[derive(Clone)]
pub struct GeminiClient {
    endpoint: Url,
    model: String,
    temperature: f32,
    api_key: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for GeminiClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("temperature", &self.temperature)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = api_base_url(&config.api_base)
            .with_context(|| format!("Invalid Gemini API base: {}", config.api_base))?
            .join(&format!("v1beta/models/{}:generateContent", config.model))
            .context("Failed to build Gemini endpoint")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: api_key.into(),
            agent,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send the conversation and return the concatenated text of the first candidate
    #[inline]
    pub fn generate_blocking(&self, turns: &[ChatTurn]) -> Result<String> {
        if turns.is_empty() {
            return Err(HelperError::Llm("Cannot generate from an empty conversation".into()).into());
        }

        let request = GenerateRequest {
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    },
                    parts: [Part {
                        text: &turn.content,
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize Gemini request")?;

        debug!(
            "Requesting completion from {} ({} turns)",
            self.model,
            turns.len()
        );

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| HelperError::Llm(format!("Gemini request failed: {}", e)))?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse Gemini response")?;

        extract_text(response)
    }
}

fn extract_text(response: GenerateResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(HelperError::Llm(format!("Gemini returned no answer: {}", reason)).into());
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "UNKNOWN".to_string());
        warn!("Gemini candidate had no text (finish reason {})", reason);
        return Err(HelperError::Llm(format!("Gemini answer was empty: {}", reason)).into());
    }

    Ok(text)
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let client = self.clone();
        let turns = turns.to_vec();
        tokio::task::spawn_blocking(move || client.generate_blocking(&turns))
            .await
            .context("Completion task panicked")?
    }
}
