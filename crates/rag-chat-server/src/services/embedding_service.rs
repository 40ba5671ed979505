use crate::config::EmbeddingConfig;
use anyhow::{Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::services::conversation::EmbeddingProvider;

/// In-flight requests while embedding a document's chunks
const BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Embedding client for OpenAI-compatible and llama.cpp servers
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
        };

        let url = format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;

        if let Some(expected) = self.config.dimension {
            if embedding.len() != expected {
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected,
                    embedding.len()
                );
            }
        }

        Ok(embedding)
    }
}

/// Accepts `{"data":[{"embedding":[..]}]}`, `{"embedding":[..]}`,
/// `[{"embedding":[..]}]` and bare `[..]` bodies.
fn parse_embedding(json_value: &Value) -> Result<Vec<f32>> {
    let floats = |values: &[Value]| -> Vec<f32> {
        values.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect()
    };

    let embedding = if let Some(data) = json_value.get("data").and_then(Value::as_array) {
        data.first()
            .and_then(|item| item.get("embedding"))
            .and_then(Value::as_array)
            .map(|arr| floats(arr))
    } else if let Some(arr) = json_value.get("embedding").and_then(Value::as_array) {
        Some(floats(arr))
    } else if let Some(arr) = json_value.as_array() {
        match arr.first() {
            Some(first) if first.is_object() => first
                .get("embedding")
                .and_then(Value::as_array)
                .map(|inner| floats(inner)),
            Some(_) => Some(floats(arr)),
            None => None,
        }
    } else {
        None
    };

    match embedding {
        Some(embedding) if !embedding.is_empty() => Ok(embedding),
        Some(_) => anyhow::bail!("Generated embedding is empty"),
        None => anyhow::bail!("Unrecognized embedding response format: {}", json_value),
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding batch of {} texts", texts.len());

        let requests: Vec<_> = texts.iter().map(|text| self.embed_internal(text)).collect();

        // `buffered` keeps results in input order
        stream::iter(requests)
            .buffered(BATCH_CONCURRENCY)
            .try_collect()
            .await
    }
}
