//! Inference endpoint implementations.
//!
//! Two backends: the Ollama chat API and any OpenAI-compatible HTTP
//! server. The OpenAI path also exposes logprobs and embeddings where the
//! server supports them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::Ollama;
use reqwest::Client;
use serde_json::json;

use crate::config::ModelConfig;

use super::{GenerateOptions, InferenceEndpoint};

/// Request timeout for a single inference call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the endpoint a model config asks for.
pub fn create_endpoint(config: &ModelConfig) -> Result<Arc<dyn InferenceEndpoint>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaEndpoint::new(config)?)),
        _ => Ok(Arc::new(OpenAICompatibleEndpoint::new(
            config.host.clone(),
            None,
            config.model.clone(),
        )?)),
    }
}

pub struct OllamaEndpoint {
    client: Ollama,
    model: String,
}

impl OllamaEndpoint {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let url = url_parts(&config.host)?;
        Ok(Self {
            client: Ollama::new(url.0, url.1),
            model: config.model.clone(),
        })
    }
}

fn url_parts(host: &str) -> Result<(String, u16)> {
    let trimmed = host.trim_end_matches('/');
    let (scheme_host, port) = match trimmed.rsplit_once(':') {
        Some((prefix, port)) if port.chars().all(|c| c.is_ascii_digit()) => (
            prefix.to_string(),
            port.parse::<u16>().context("bad port in host url")?,
        ),
        _ => (trimmed.to_string(), 11434),
    };
    Ok((scheme_host, port))
}

#[async_trait]
impl InferenceEndpoint for OllamaEndpoint {
    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};

        let messages = vec![ChatMessage::user(prompt.to_string())];
        let res = tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.client
                .send_chat_messages(ChatMessageRequest::new(self.model.clone(), messages)),
        )
        .await
        .context("inference request timed out")??;

        Ok(res.message.content)
    }
}

pub struct OpenAICompatibleEndpoint {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatibleEndpoint {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    async fn chat(&self, prompt: &str, opts: &GenerateOptions, logprobs: bool) -> Result<serde_json::Value> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": opts.temperature,
            "top_p": opts.top_p,
            "max_tokens": opts.max_tokens,
        });
        if let Some(seed) = opts.seed {
            body["seed"] = json!(seed);
        }
        if logprobs {
            body["logprobs"] = json!(true);
        }

        let mut request = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl InferenceEndpoint for OpenAICompatibleEndpoint {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String> {
        let json = self.chat(prompt, opts, false).await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("missing content in completion response")?;
        Ok(content.to_string())
    }

    async fn generate_with_logprobs(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<(String, Option<Vec<f64>>)> {
        let json = self.chat(prompt, opts, true).await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("missing content in completion response")?
            .to_string();
        let logprobs = json["choices"][0]["logprobs"]["content"]
            .as_array()
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|t| t["logprob"].as_f64())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty());
        Ok((content, logprobs))
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": text });
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let res = request.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;
        let vector = json["data"][0]["embedding"].as_array().map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Vec<_>>()
        });
        Ok(vector.filter(|v| !v.is_empty()))
    }
}
