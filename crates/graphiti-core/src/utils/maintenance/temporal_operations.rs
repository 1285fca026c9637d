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

//! Temporal operations for graph maintenance

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::{
    edges::EntityEdge,
    errors::GraphitiError,
    llm_client::{LlmClient, Message, ModelSize},
    nodes::EpisodicNode,
};

const EXTRACTED_DATES_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "valid_at": {"type": ["string", "null"]},
        "invalid_at": {"type": ["string", "null"]}
    }
}"#;

/// Extract `valid_at`/`invalid_at` dates for an edge from the episode that
/// produced it, using REFERENCE_TIME (the episode's own `valid_at`) to
/// resolve relative time expressions in the fact text.
pub async fn extract_edge_dates(
    llm_client: &dyn LlmClient,
    edge: &EntityEdge,
    episode: &EpisodicNode,
    previous_episodes: &[EpisodicNode],
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), GraphitiError> {
    let _ = previous_episodes;
    let library = crate::prompts::get_prompt_library();
    let mut context = std::collections::HashMap::new();
    context.insert(
        "edges".to_string(),
        json!([{"uuid": edge.base.uuid, "fact": edge.fact}]),
    );
    context.insert(
        "reference_time".to_string(),
        Value::String(episode.valid_at.to_rfc3339()),
    );

    let messages = to_llm_messages((library.extract_edge_dates.extract_dates)(&context));

    let response = llm_client
        .generate_response(&messages, Some(EXTRACTED_DATES_SCHEMA), None, ModelSize::Small)
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!("Edge date extraction failed for edge {}: {:?}", edge.base.uuid, e);
            return Ok((None, None));
        }
    };

    let parse = |key: &str| -> Option<DateTime<Utc>> {
        response
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };

    Ok((parse("valid_at"), parse("invalid_at")))
}

/// Determine if an edge is still valid based on temporal context. An edge
/// with an explicit `invalid_at` at or before `reference_time` is no longer
/// valid; everything else is assumed valid unless new content contradicts it.
pub async fn is_edge_valid(
    llm_client: &dyn LlmClient,
    edge: &EntityEdge,
    reference_time: DateTime<Utc>,
    context_text: Option<&str>,
) -> Result<bool, GraphitiError> {
    if let Some(invalid_at) = edge.invalid_at {
        if invalid_at <= reference_time {
            return Ok(false);
        }
    }

    let Some(context_text) = context_text else {
        return Ok(true);
    };

    let library = crate::prompts::get_prompt_library();
    let mut context = std::collections::HashMap::new();
    context.insert(
        "edges".to_string(),
        json!([{"uuid": edge.base.uuid, "fact": edge.fact}]),
    );
    context.insert("new_content".to_string(), Value::String(context_text.to_string()));

    let messages = to_llm_messages((library.invalidate_edges.invalidate)(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await;

    match response {
        Ok(value) => {
            let invalidated = value
                .get("invalidated_edge_uuids")
                .and_then(|v| v.as_array())
                .map(|entries| entries.iter().any(|e| e.as_str() == Some(edge.base.uuid.as_str())))
                .unwrap_or(false);
            Ok(!invalidated)
        }
        Err(e) => {
            warn!("Edge validity check failed, assuming still valid: {:?}", e);
            Ok(true)
        }
    }
}

/// Update edge temporal bounds
pub fn update_edge_temporal_bounds(
    edge: &mut EntityEdge,
    valid_at: Option<DateTime<Utc>>,
    invalid_at: Option<DateTime<Utc>>,
    current_time: DateTime<Utc>,
) {
    if let Some(valid_at) = valid_at {
        edge.valid_at = valid_at;
    }
    edge.invalid_at = invalid_at;

    // If the edge is invalid, mark it as expired
    if invalid_at.is_some() {
        edge.expired_at = Some(current_time);
    }
}

fn to_llm_messages(messages: Vec<crate::prompts::Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|m| Message::new(m.role, m.content))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::BaseEdge;
    use std::collections::HashMap;

    struct NoOpLlm;

    #[async_trait::async_trait]
    impl LlmClient for NoOpLlm {
        async fn generate_response(
            &self,
            _messages: &[Message],
            _response_model: Option<&str>,
            _max_tokens: Option<u32>,
            _model_size: ModelSize,
        ) -> crate::errors::LlmResult<HashMap<String, Value>> {
            Ok(HashMap::new())
        }

        async fn chat_completion(
            &self,
            _messages: &[Message],
            _json_params: Option<Value>,
        ) -> crate::errors::LlmResult<Value> {
            Ok(Value::Null)
        }
    }

    fn test_edge(now: DateTime<Utc>) -> EntityEdge {
        EntityEdge {
            base: BaseEdge::new("group".to_string(), "source".to_string(), "target".to_string()),
            name: "test".to_string(),
            fact: "test fact".to_string(),
            fact_embedding: None,
            episodes: Vec::new(),
            expired_at: None,
            valid_at: now,
            invalid_at: None,
        }
    }

    #[tokio::test]
    async fn test_is_edge_valid_false_once_invalid_at_passed() {
        let now = chrono::Utc::now();
        let mut edge = test_edge(now);
        edge.invalid_at = Some(now - chrono::Duration::days(1));

        let valid = is_edge_valid(&NoOpLlm, &edge, now, None).await.unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_is_edge_valid_true_without_invalid_at() {
        let now = chrono::Utc::now();
        let edge = test_edge(now);

        let valid = is_edge_valid(&NoOpLlm, &edge, now, None).await.unwrap();
        assert!(valid);
    }

    #[test]
    fn test_update_edge_temporal_bounds() {
        let now = chrono::Utc::now();
        let mut edge = test_edge(now);

        let valid_at = Some(now);
        let invalid_at = Some(now);

        update_edge_temporal_bounds(&mut edge, valid_at, invalid_at, now);

        assert_eq!(edge.valid_at, valid_at.unwrap());
        assert_eq!(edge.invalid_at, invalid_at);
        assert_eq!(edge.expired_at, Some(now));
    }
}
