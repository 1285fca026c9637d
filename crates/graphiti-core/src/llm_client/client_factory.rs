/*
Copyright 2024, Zep Software, Inc.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Centralized, environment-aware construction of the client trio
//! (LLM, embedder, cross encoder) used to build a [`GraphitiClients`].
//!
//! [`GraphitiClients`]: crate::types::GraphitiClients

use std::sync::Arc;
use tracing::{info, warn};

use super::cerebras_client::CerebrasClient;
use super::client::LlmClient;
use super::config::LlmConfig;
use super::fallback_client::FallbackLlmClient;
use super::openai_client::OpenAiClient;
use crate::cross_encoder::{CrossEncoderClient, OpenAIRerankerClient};
use crate::embedder::{EmbedderClient, OpenAiEmbedder, OpenAiEmbedderConfig};
use crate::errors::{GraphitiError, GraphitiResult};

const DEFAULT_CEREBRAS_MODEL: &str = "qwen-3-coder-480b";
const DEFAULT_CEREBRAS_SMALL_MODEL: &str = "qwen-3-32b";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_OLLAMA_MODEL: &str = "mistral:latest";
const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "mxbai-embed-large:latest";

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => value.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

/// Centralized factory for creating Graphiti clients with environment-aware
/// configuration. Used by binaries that wire up a [`GraphitiClients`] without
/// hand-rolling provider selection (Cerebras with Ollama fallback, or a
/// default OpenAI client).
///
/// [`GraphitiClients`]: crate::types::GraphitiClients
pub struct GraphitiClientFactory;

impl GraphitiClientFactory {
    /// Build the primary LLM client from environment configuration.
    ///
    /// `USE_CEREBRAS=true` selects a Cerebras primary; `ENABLE_FALLBACK`
    /// (default true) wraps it in a [`FallbackLlmClient`] backed by an
    /// Ollama-compatible client when `USE_OLLAMA=true`. With neither set,
    /// a default [`OpenAiClient`] is returned.
    pub fn create_llm_client() -> GraphitiResult<Arc<dyn LlmClient>> {
        let use_fallback = env_flag("ENABLE_FALLBACK", true);
        let use_cerebras = env_flag("USE_CEREBRAS", false);

        let cerebras_client: Option<Arc<dyn LlmClient>> = if use_cerebras {
            let model =
                std::env::var("CEREBRAS_MODEL").unwrap_or_else(|_| DEFAULT_CEREBRAS_MODEL.to_string());
            let small_model = std::env::var("CEREBRAS_SMALL_MODEL")
                .unwrap_or_else(|_| DEFAULT_CEREBRAS_SMALL_MODEL.to_string());
            let api_key = std::env::var("CEREBRAS_API_KEY").ok();

            let mut config = LlmConfig::new()
                .with_model(model.clone())
                .with_small_model(small_model)
                .with_temperature(0.7)
                .with_max_tokens(4000);
            if let Some(key) = api_key {
                config = config.with_api_key(key);
            }

            info!("Creating Cerebras LLM client with model {}", model);
            match CerebrasClient::new(config, false) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Failed to create Cerebras LLM client: {:?}", e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(cerebras) = &cerebras_client {
            if !use_fallback {
                return Ok(cerebras.clone());
            }
        }

        let want_ollama = env_flag("USE_OLLAMA", false) || (cerebras_client.is_some() && use_fallback);
        if want_ollama {
            let ollama_base_url =
                std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
            let ollama_model =
                std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());

            info!(
                "Creating Ollama LLM client with model {} at {}",
                ollama_model, ollama_base_url
            );

            let config = LlmConfig::new()
                .with_model(ollama_model.clone())
                .with_small_model(ollama_model)
                .with_base_url(ollama_base_url)
                .with_api_key("ollama".to_string())
                .with_temperature(0.7)
                .with_max_tokens(2000);

            match OpenAiClient::new(config, false) {
                Ok(ollama) => {
                    let ollama: Arc<dyn LlmClient> = Arc::new(ollama);
                    if let Some(cerebras) = &cerebras_client {
                        info!("Creating fallback LLM client (Cerebras primary, Ollama backup)");
                        return Ok(Arc::new(FallbackLlmClient::new(
                            cerebras.clone(),
                            ollama,
                        )));
                    }
                    return Ok(ollama);
                }
                Err(e) => {
                    warn!("Failed to create Ollama LLM client: {:?}", e);
                    if let Some(cerebras) = &cerebras_client {
                        warn!("Running without fallback - Ollama unavailable");
                        return Ok(cerebras.clone());
                    }
                }
            }
        }

        if let Some(cerebras) = cerebras_client {
            return Ok(cerebras);
        }

        info!("Creating default OpenAI LLM client");
        let client = OpenAiClient::new(LlmConfig::new(), false)?;
        Ok(Arc::new(client))
    }

    fn embedding_endpoint() -> GraphitiResult<String> {
        let use_dedicated = env_flag("USE_DEDICATED_EMBEDDING_ENDPOINT", false);
        if use_dedicated {
            if let Ok(dedicated) = std::env::var("OLLAMA_EMBEDDING_BASE_URL") {
                return Ok(dedicated);
            }
            if env_flag("EMBEDDING_ENDPOINT_FALLBACK", true) {
                return Ok(std::env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string()));
            }
            return Err(GraphitiError::Config {
                message: "Dedicated embedding endpoint required but OLLAMA_EMBEDDING_BASE_URL is not set"
                    .to_string(),
            });
        }
        Ok(std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string()))
    }

    /// Build the embedder client from environment configuration.
    ///
    /// `USE_OLLAMA_EMBEDDINGS=true` (or `USE_OLLAMA=true`) selects an
    /// Ollama-compatible embedder; otherwise a default OpenAI embedder.
    pub fn create_embedder() -> GraphitiResult<Arc<dyn EmbedderClient>> {
        let want_ollama_embeddings = env_flag("USE_OLLAMA_EMBEDDINGS", false) || env_flag("USE_OLLAMA", false);

        if want_ollama_embeddings {
            let base_url = Self::embedding_endpoint()?;
            let embedding_model = std::env::var("OLLAMA_EMBEDDING_MODEL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string());
            let api_key =
                std::env::var("OLLAMA_EMBEDDING_API_KEY").unwrap_or_else(|_| "ollama".to_string());

            info!(
                "Creating Ollama embedder with model {} at {}",
                embedding_model, base_url
            );

            let config = OpenAiEmbedderConfig {
                embedding_model,
                api_key: Some(api_key),
                base_url: Some(base_url),
                ..Default::default()
            };

            match OpenAiEmbedder::new(config) {
                Ok(embedder) => return Ok(Arc::new(embedder)),
                Err(e) => warn!("Failed to create Ollama embedder: {:?}", e),
            }
        }

        info!("Creating default OpenAI embedder");
        let embedder = OpenAiEmbedder::new(OpenAiEmbedderConfig::default())?;
        Ok(Arc::new(embedder))
    }

    /// Build the cross-encoder reranker client. Only an OpenAI-backed
    /// reranker is currently supported.
    pub fn create_cross_encoder() -> GraphitiResult<Arc<dyn CrossEncoderClient>> {
        let client = OpenAIRerankerClient::new(None)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag_defaults() {
        std::env::remove_var("GRAPHITI_CLIENT_FACTORY_TEST_FLAG");
        assert!(env_flag("GRAPHITI_CLIENT_FACTORY_TEST_FLAG", true));
        assert!(!env_flag("GRAPHITI_CLIENT_FACTORY_TEST_FLAG", false));
    }

    #[test]
    fn test_env_flag_reads_value() {
        std::env::set_var("GRAPHITI_CLIENT_FACTORY_TEST_FLAG", "TrUe");
        assert!(env_flag("GRAPHITI_CLIENT_FACTORY_TEST_FLAG", false));
        std::env::remove_var("GRAPHITI_CLIENT_FACTORY_TEST_FLAG");
    }
}
