//! Completion provider abstraction — the engine's inference adapter.
//!
//! Wraps the opaque model runtime behind [`CompletionProvider`]: a prompt
//! plus retrieved context goes in, a candidate suggestion plus the
//! provider's raw certainty signal comes out. No gating or scoring logic
//! lives here.
//!
//! Backends:
//! - **[`DisabledProvider`]** — always errors; the engine records a
//!   rejected suggestion with reason `provider_error`.
//! - **[`OpenAiProvider`]** — OpenAI-compatible chat completions endpoint.
//!   When the API returns token logprobs, the raw signal is the mean token
//!   probability (`exp(mean logprob)`), clamped to `[0, 1]`.
//! - **[`OllamaProvider`]** — local Ollama `/api/generate`. Ollama exposes
//!   no token-level certainty, so the raw signal is `None` and the scorer
//!   redistributes its weight.
//!
//! Unlike the embedding backends, completions are single-attempt: a
//! deadline overrun or transport failure becomes a terminal rejected
//! suggestion visible to the user, not a silent retry. The engine enforces
//! the deadline with `tokio::time::timeout` on top of the HTTP client's
//! own timeout.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use suggestion_gate_core::models::RetrievedChunk;

use crate::config::ProviderConfig;

/// Approximate characters-per-token ratio for prompt budget math.
const CHARS_PER_TOKEN: usize = 4;

/// A model completion plus the provider's certainty signal.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Provider-agnostic certainty in `[0, 1]`, or `None` when the backend
    /// exposes none.
    pub raw_signal: Option<f64>,
}

/// An opaque text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    /// True when this backend can serve completions.
    fn is_enabled(&self) -> bool {
        true
    }
    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

/// Instantiate the provider named by the configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn CompletionProvider>> {
    match config.kind.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

/// Assemble the prompt from the query and retrieved context under a token
/// budget.
///
/// Context chunks arrive in descending relevance order; they are taken
/// greedily from the top until the budget is exhausted, which drops the
/// lowest-relevance chunks first. The query itself is always included.
pub fn build_prompt(query_text: &str, context: &[RetrievedChunk], max_prompt_tokens: usize) -> String {
    let budget_chars = max_prompt_tokens.saturating_mul(CHARS_PER_TOKEN);
    let mut prompt = String::new();

    let query_section = format!("Task:\n{}\n", query_text);
    let mut used = query_section.len();

    let mut context_section = String::new();
    for chunk in context {
        let piece = format!("\n--- {} ---\n{}\n", chunk.file_path, chunk.text);
        if used + piece.len() > budget_chars {
            break;
        }
        used += piece.len();
        context_section.push_str(&piece);
    }

    if !context_section.is_empty() {
        prompt.push_str("Relevant code:\n");
        prompt.push_str(&context_section);
        prompt.push('\n');
    }
    prompt.push_str(&query_section);
    prompt
}

// ============ Disabled ============

/// No-op provider used when `provider.kind = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn complete(&self, _prompt: &str) -> Result<Completion> {
        bail!("Completion provider is disabled")
    }
}

// ============ OpenAI-compatible ============

/// Chat-completions backend for OpenAI and API-compatible local runtimes.
///
/// Requires the `OPENAI_API_KEY` environment variable unless `provider.url`
/// points at a local endpoint that ignores authorization.
pub struct OpenAiProvider {
    model: String,
    url: String,
    max_completion_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        if config.url.is_none() && std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            url,
            max_completion_tokens: config.max_completion_tokens,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a code assistant. Reply with the code change only."},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.max_completion_tokens,
            "logprobs": true,
        });

        let mut request = client
            .post(format!("{}/chat/completions", self.url))
            .header("Content-Type", "application/json");
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Completion API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_completion(&json)
    }
}

/// Extract the completion text and mean-token-probability signal.
fn parse_openai_completion(json: &serde_json::Value) -> Result<Completion> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices"))?;

    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing content"))?
        .to_string();

    let raw_signal = choice
        .get("logprobs")
        .and_then(|lp| lp.get("content"))
        .and_then(|c| c.as_array())
        .and_then(|tokens| {
            let logprobs: Vec<f64> = tokens
                .iter()
                .filter_map(|t| t.get("logprob").and_then(|l| l.as_f64()))
                .collect();
            if logprobs.is_empty() {
                None
            } else {
                let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
                Some(mean.exp().clamp(0.0, 1.0))
            }
        });

    Ok(Completion { text, raw_signal })
}

// ============ Ollama ============

/// Generation backend for a local Ollama instance.
pub struct OllamaProvider {
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            url,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = client
            .post(format!("{}/api/generate", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))?
            .to_string();

        // No token-level certainty from Ollama.
        Ok(Completion {
            text,
            raw_signal: None,
        })
    }
}
