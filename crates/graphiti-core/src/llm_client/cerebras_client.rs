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
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{error, warn};

use super::client::{BaseLlmClient, LlmClient};
use super::config::{LlmConfig, ModelSize};
use super::models::Message;
use crate::errors::{LlmError, LlmResult};

const DEFAULT_CEREBRAS_MODEL: &str = "qwen-3-coder-480b";
const DEFAULT_CEREBRAS_SMALL_MODEL: &str = "qwen-3-coder-480b";
const DEFAULT_BASE_URL: &str = "https://api.cerebras.ai/v1";
// Cerebras recommends top_p=0.8 for qwen-3-coder-480b; not exposed on LlmConfig.
const CEREBRAS_TOP_P: f32 = 0.8;

#[derive(Debug, Serialize)]
struct CerebrasMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct CerebrasChatRequest {
    model: String,
    messages: Vec<CerebrasMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CerebrasChoice {
    message: CerebrasResponseMessage,
}

#[derive(Debug, Deserialize)]
struct CerebrasResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CerebrasChatResponse {
    choices: Vec<CerebrasChoice>,
    #[serde(default)]
    error: Option<CerebrasError>,
}

#[derive(Debug, Deserialize)]
struct CerebrasError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// LLM client for Cerebras' OpenAI-compatible chat completions endpoint.
///
/// Cerebras enforces a strict JSON schema on structured output: every nested
/// object must set `additionalProperties: false` and list every one of its
/// properties as required. Caching is not supported on this client.
pub struct CerebrasClient {
    base_client: BaseLlmClient,
    http_client: Client,
    base_url: String,
    api_key: String,
    max_retries: usize,
}

impl CerebrasClient {
    pub fn new(config: LlmConfig, cache_enabled: bool) -> LlmResult<Self> {
        if cache_enabled {
            return Err(LlmError::InvalidConfig {
                message: "Caching is not implemented for the Cerebras client".to_string(),
            });
        }

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("CEREBRAS_API_KEY").ok())
            .ok_or_else(|| LlmError::Authentication {
                message: "Cerebras API key is required (set api_key or CEREBRAS_API_KEY)"
                    .to_string(),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let base_client = BaseLlmClient::new(config, false)?;

        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            base_client,
            http_client,
            base_url,
            api_key,
            max_retries: 2,
        })
    }

    fn model_for_size(&self, model_size: ModelSize) -> &str {
        match model_size {
            ModelSize::Small => self
                .base_client
                .config
                .small_model
                .as_deref()
                .unwrap_or(DEFAULT_CEREBRAS_SMALL_MODEL),
            ModelSize::Medium => self
                .base_client
                .config
                .model
                .as_deref()
                .unwrap_or(DEFAULT_CEREBRAS_MODEL),
        }
    }

    /// Recursively force `additionalProperties: false` and an all-properties
    /// `required` list on every nested object in a JSON schema, as Cerebras'
    /// strict structured-output mode demands.
    fn strictify_schema(schema: &mut Value) {
        if let Value::Object(obj) = schema {
            if obj.contains_key("properties") {
                obj.insert("additionalProperties".to_string(), Value::Bool(false));
                let required: Vec<Value> = obj
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .map(|p| p.keys().map(|k| Value::String(k.clone())).collect())
                    .unwrap_or_default();
                obj.insert("required".to_string(), Value::Array(required));
            }

            let keys: Vec<String> = obj.keys().cloned().collect();
            for key in keys {
                if let Some(value) = obj.get_mut(&key) {
                    Self::strictify_schema(value);
                }
            }
        } else if let Value::Array(items) = schema {
            for item in items {
                Self::strictify_schema(item);
            }
        }
    }

    fn build_response_format(response_model: Option<&str>) -> Option<Value> {
        match response_model {
            Some(schema) => {
                let mut schema_value = serde_json::from_str::<Value>(schema).ok()?;
                Self::strictify_schema(&mut schema_value);
                Some(json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "extraction",
                        "strict": true,
                        "schema": schema_value,
                    }
                }))
            }
            None => {
                let mut open_schema = Map::new();
                open_schema.insert("type".to_string(), Value::String("object".to_string()));
                Some(json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "response",
                        "strict": false,
                        "schema": open_schema,
                    }
                }))
            }
        }
    }

    async fn generate_response_internal(
        &self,
        messages: &[Message],
        response_model: Option<&str>,
        max_tokens: Option<u32>,
        model_size: ModelSize,
    ) -> LlmResult<HashMap<String, Value>> {
        let model = self.model_for_size(model_size).to_string();

        // Cerebras only accepts user/system roles.
        let cerebras_messages: Vec<CerebrasMessage> = messages
            .iter()
            .filter(|m| m.role == "user" || m.role == "system")
            .map(|m| CerebrasMessage {
                role: m.role.clone(),
                content: self.base_client.clean_input(&m.content),
            })
            .collect();

        let request = CerebrasChatRequest {
            model,
            messages: cerebras_messages,
            temperature: self.base_client.config.temperature,
            top_p: CEREBRAS_TOP_P,
            max_tokens: max_tokens.unwrap_or(self.base_client.config.max_tokens),
            response_format: Self::build_response_format(response_model),
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LlmError::Http)?;

        if response.status() == 429 {
            return Err(LlmError::RateLimit);
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::NetworkError {
                message: format!("HTTP {} - {}", status, error_text),
            });
        }

        let chat_response: CerebrasChatResponse =
            response.json().await.map_err(|e| LlmError::NetworkError {
                message: format!("Failed to parse JSON response: {}", e),
            })?;

        if let Some(error) = chat_response.error {
            if error.error_type.as_deref() == Some("rate_limit") {
                return Err(LlmError::RateLimit);
            }
            return Err(LlmError::Authentication {
                message: error.message,
            });
        }

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse {
                message: "No choices in response".to_string(),
            })?;

        let content = choice.message.content.ok_or_else(|| LlmError::EmptyResponse {
            message: "No content in response".to_string(),
        })?;

        let mut result = HashMap::new();
        if let Ok(json_value) = serde_json::from_str::<Value>(&content) {
            if let Some(obj) = json_value.as_object() {
                result.extend(obj.iter().map(|(k, v)| (k.clone(), v.clone())));
            } else {
                result.insert("content".to_string(), json_value);
            }
        } else {
            result.insert("content".to_string(), Value::String(content));
        }

        Ok(result)
    }
}

#[async_trait]
impl LlmClient for CerebrasClient {
    async fn generate_response(
        &self,
        messages: &[Message],
        response_model: Option<&str>,
        max_tokens: Option<u32>,
        model_size: ModelSize,
    ) -> LlmResult<HashMap<String, Value>> {
        let prepared_messages = self
            .base_client
            .prepare_messages(messages.to_vec(), response_model);

        let mut retry_count = 0;
        let mut current_messages = prepared_messages;

        loop {
            match self
                .generate_response_internal(&current_messages, response_model, max_tokens, model_size)
                .await
            {
                Ok(response) => return Ok(response),
                Err(LlmError::RateLimit) => return Err(LlmError::RateLimit),
                Err(e) => {
                    if retry_count >= self.max_retries {
                        error!("Cerebras: max retries ({}) exceeded: {:?}", self.max_retries, e);
                        return Err(e);
                    }
                    retry_count += 1;
                    let error_context = format!(
                        "The previous response attempt was invalid ({:?}). Please try again with a \
                        valid response matching the expected format.",
                        e
                    );
                    current_messages.push(Message::user(error_context));
                    warn!(
                        "Cerebras: retrying after error (attempt {}/{})",
                        retry_count, self.max_retries
                    );
                }
            }
        }
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        _json_params: Option<Value>,
    ) -> LlmResult<Value> {
        let response = self
            .generate_response(messages, None, None, ModelSize::Medium)
            .await?;
        Ok(Value::Object(response.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_enabled_rejected() {
        let config = LlmConfig::new().with_api_key("key".to_string());
        let result = CerebrasClient::new(config, true);
        assert!(result.is_err());
    }

    #[test]
    fn test_strictify_schema_sets_additional_properties_false() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "nested": {
                    "type": "object",
                    "properties": {"value": {"type": "integer"}}
                }
            }
        });
        CerebrasClient::strictify_schema(&mut schema);
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
        assert_eq!(schema["nested"]["additionalProperties"], Value::Bool(false));
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&Value::String("name".to_string())));
    }

    #[test]
    fn test_model_for_size_defaults() {
        let config = LlmConfig::new().with_api_key("key".to_string());
        let client = CerebrasClient::new(config, false).unwrap();
        assert_eq!(client.model_for_size(ModelSize::Medium), DEFAULT_CEREBRAS_MODEL);
        assert_eq!(client.model_for_size(ModelSize::Small), DEFAULT_CEREBRAS_SMALL_MODEL);
    }
}
