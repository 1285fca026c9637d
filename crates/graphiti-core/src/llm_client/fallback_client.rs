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

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::client::LlmClient;
use super::config::ModelSize;
use super::models::Message;
use crate::errors::{LlmError, LlmResult};

/// Wraps a primary and a fallback [`LlmClient`], switching to the fallback on
/// rate limits and switching back once the primary recovers.
pub struct FallbackLlmClient {
    primary: Arc<dyn LlmClient>,
    fallback: Arc<dyn LlmClient>,
    using_fallback: AtomicBool,
}

impl FallbackLlmClient {
    pub fn new(primary: Arc<dyn LlmClient>, fallback: Arc<dyn LlmClient>) -> Self {
        Self {
            primary,
            fallback,
            using_fallback: AtomicBool::new(false),
        }
    }

    /// Rate-limit errors (explicit `RateLimit`, or any error whose message
    /// mentions rate limiting or quota exhaustion) trigger the fallback;
    /// every other error propagates from the primary untouched.
    fn looks_like_rate_limit(error: &LlmError) -> bool {
        if matches!(error, LlmError::RateLimit) {
            return true;
        }
        let message = error.to_string().to_lowercase();
        message.contains("rate") || message.contains("quota")
    }
}

#[async_trait]
impl LlmClient for FallbackLlmClient {
    async fn generate_response(
        &self,
        messages: &[Message],
        response_model: Option<&str>,
        max_tokens: Option<u32>,
        model_size: ModelSize,
    ) -> LlmResult<HashMap<String, Value>> {
        if !self.using_fallback.load(Ordering::SeqCst) {
            match self
                .primary
                .generate_response(messages, response_model, max_tokens, model_size)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if Self::looks_like_rate_limit(&e) => {
                    warn!("Primary LLM client rate limited: {:?}", e);
                    info!("Switching to fallback LLM client");
                    self.using_fallback.store(true, Ordering::SeqCst);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Using fallback LLM client for request");
        match self
            .fallback
            .generate_response(messages, response_model, max_tokens, model_size)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                error!("Fallback LLM client also failed: {:?}", e);
                self.using_fallback.store(false, Ordering::SeqCst);
                self.primary
                    .generate_response(messages, response_model, max_tokens, model_size)
                    .await
            }
        }
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        json_params: Option<Value>,
    ) -> LlmResult<Value> {
        if !self.using_fallback.load(Ordering::SeqCst) {
            match self.primary.chat_completion(messages, json_params.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if Self::looks_like_rate_limit(&e) => {
                    warn!("Primary LLM client rate limited: {:?}", e);
                    self.using_fallback.store(true, Ordering::SeqCst);
                }
                Err(e) => return Err(e),
            }
        }

        match self.fallback.chat_completion(messages, json_params).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!("Fallback LLM client also failed: {:?}", e);
                self.using_fallback.store(false, Ordering::SeqCst);
                self.primary.chat_completion(messages, None).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysRateLimited;
    struct AlwaysOk;

    #[async_trait]
    impl LlmClient for AlwaysRateLimited {
        async fn generate_response(
            &self,
            _messages: &[Message],
            _response_model: Option<&str>,
            _max_tokens: Option<u32>,
            _model_size: ModelSize,
        ) -> LlmResult<HashMap<String, Value>> {
            Err(LlmError::RateLimit)
        }

        async fn chat_completion(
            &self,
            _messages: &[Message],
            _json_params: Option<Value>,
        ) -> LlmResult<Value> {
            Err(LlmError::RateLimit)
        }
    }

    #[async_trait]
    impl LlmClient for AlwaysOk {
        async fn generate_response(
            &self,
            _messages: &[Message],
            _response_model: Option<&str>,
            _max_tokens: Option<u32>,
            _model_size: ModelSize,
        ) -> LlmResult<HashMap<String, Value>> {
            let mut map = HashMap::new();
            map.insert("content".to_string(), Value::String("ok".to_string()));
            Ok(map)
        }

        async fn chat_completion(
            &self,
            _messages: &[Message],
            _json_params: Option<Value>,
        ) -> LlmResult<Value> {
            Ok(Value::String("ok".to_string()))
        }
    }

    #[tokio::test]
    async fn test_falls_back_on_rate_limit() {
        let client = FallbackLlmClient::new(Arc::new(AlwaysRateLimited), Arc::new(AlwaysOk));
        let messages = vec![Message::user("hi")];
        let result = client
            .generate_response(&messages, None, None, ModelSize::Medium)
            .await
            .unwrap();
        assert_eq!(result.get("content").unwrap(), "ok");
        assert!(client.using_fallback.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_uses_primary_when_healthy() {
        let client = FallbackLlmClient::new(Arc::new(AlwaysOk), Arc::new(AlwaysRateLimited));
        let messages = vec![Message::user("hi")];
        let result = client
            .generate_response(&messages, None, None, ModelSize::Medium)
            .await
            .unwrap();
        assert_eq!(result.get("content").unwrap(), "ok");
        assert!(!client.using_fallback.load(Ordering::SeqCst));
    }
}
