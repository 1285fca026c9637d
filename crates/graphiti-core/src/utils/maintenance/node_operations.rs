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

//! Node maintenance operations

use serde_json::{json, Value};
use tracing::warn;

use crate::{
    errors::GraphitiError,
    llm_client::{LlmClient, Message, ModelSize},
    nodes::{EntityNode, EpisodeType, EpisodicNode},
    types::GraphitiClients,
};
use std::collections::HashMap;

const EXTRACTED_ENTITIES_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "extracted_entities": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "entity_type_id": {"type": "integer"}
                },
                "required": ["name", "entity_type_id"]
            }
        }
    },
    "required": ["extracted_entities"]
}"#;

fn episode_context(episode: &EpisodicNode, previous_episodes: &[EpisodicNode]) -> HashMap<String, Value> {
    let mut context = HashMap::new();
    context.insert(
        "episode_content".to_string(),
        match episode.source {
            EpisodeType::Json => {
                serde_json::from_str(&episode.content).unwrap_or(Value::String(episode.content.clone()))
            }
            _ => Value::String(episode.content.clone()),
        },
    );
    context.insert(
        "source_description".to_string(),
        Value::String(episode.source_description.clone()),
    );
    context.insert(
        "previous_episodes".to_string(),
        json!(previous_episodes
            .iter()
            .map(|e| e.content.clone())
            .collect::<Vec<_>>()),
    );
    context.insert("entity_types".to_string(), json!({}));
    context.insert("custom_prompt".to_string(), Value::String(String::new()));
    context
}

/// Extract nodes from an episode and its context.
///
/// Builds the appropriate prompt for the episode's source type (message,
/// JSON, or plain text), asks the LLM client for a list of entity names, and
/// turns each one into a bare [`EntityNode`] with an empty summary. Attribute
/// and summary population happen in later passes (see [`summarize_nodes`]).
pub async fn extract_nodes(
    clients: &GraphitiClients,
    episode: &EpisodicNode,
    previous_episodes: &[EpisodicNode],
) -> Result<Vec<EntityNode>, GraphitiError> {
    let library = crate::prompts::get_prompt_library();
    let context = episode_context(episode, previous_episodes);

    let prompt_fn = match episode.source {
        EpisodeType::Message => library.extract_nodes.extract_message,
        EpisodeType::Json => library.extract_nodes.extract_json,
        EpisodeType::Text => library.extract_nodes.extract_text,
    };
    let messages = to_llm_messages(prompt_fn(&context));

    let response = clients
        .llm_client
        .generate_response(
            &messages,
            Some(EXTRACTED_ENTITIES_SCHEMA),
            None,
            ModelSize::Medium,
        )
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!("Entity extraction failed for episode {}: {:?}", episode.base.uuid, e);
            return Ok(Vec::new());
        }
    };

    let names: Vec<String> = response
        .get("extracted_entities")
        .and_then(|v| v.as_array())
        .map(|entities| {
            entities
                .iter()
                .filter_map(|e| e.get("name").and_then(|n| n.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let nodes = names
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| EntityNode::new(name, episode.base.group_id.clone(), String::new()))
        .collect();

    Ok(nodes)
}

/// Deduplicate extracted nodes against existing nodes using LLM.
///
/// Returns the surviving nodes plus a uuid map redirecting each dropped
/// duplicate's uuid to the existing node it was merged into. The LLM call is
/// advisory (it is meant to catch near-duplicate names an exact match would
/// miss); any failure falls back to exact-name matching only.
pub async fn dedupe_extracted_nodes(
    llm_client: &dyn LlmClient,
    extracted_nodes: &[EntityNode],
    existing_nodes: &[EntityNode],
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    if extracted_nodes.is_empty() || existing_nodes.is_empty() {
        return Ok((extracted_nodes.to_vec(), HashMap::new()));
    }

    let library = crate::prompts::get_prompt_library();
    let mut context = HashMap::new();
    let all_nodes: Vec<Value> = extracted_nodes
        .iter()
        .map(|n| json!({"uuid": n.base.uuid, "name": n.base.name}))
        .chain(
            existing_nodes
                .iter()
                .map(|n| json!({"uuid": n.base.uuid, "name": n.base.name})),
        )
        .collect();
    context.insert("nodes".to_string(), json!(all_nodes));

    let messages = to_llm_messages((library.dedupe_nodes.dedupe)(&context));
    if let Err(e) = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await
    {
        warn!("Node dedupe LLM call failed, falling back to exact match: {:?}", e);
    }

    let mut by_name: HashMap<String, String> = HashMap::new();
    for node in existing_nodes {
        by_name.insert(node.base.name.clone(), node.base.uuid.clone());
    }

    let mut uuid_map = HashMap::new();
    let mut kept = Vec::new();
    for node in extracted_nodes {
        if let Some(existing_uuid) = by_name.get(&node.base.name) {
            uuid_map.insert(node.base.uuid.clone(), existing_uuid.clone());
        } else {
            kept.push(node.clone());
        }
    }

    Ok((kept, uuid_map))
}

/// Deduplicate a list of nodes using LLM.
pub async fn dedupe_node_list(
    llm_client: &dyn LlmClient,
    nodes: &[EntityNode],
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    dedupe_extracted_nodes(llm_client, nodes, &[]).await
}

/// Summarize nodes using LLM.
pub async fn summarize_nodes(
    llm_client: &dyn LlmClient,
    nodes: &[EntityNode],
    context_text: Option<&str>,
) -> Result<Vec<EntityNode>, GraphitiError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    let library = crate::prompts::get_prompt_library();
    let mut context = HashMap::new();
    context.insert(
        "nodes".to_string(),
        json!(nodes
            .iter()
            .map(|n| json!({"uuid": n.base.uuid, "name": n.base.name, "summary": n.summary}))
            .collect::<Vec<_>>()),
    );
    context.insert(
        "context_messages".to_string(),
        json!(context_text.unwrap_or("")),
    );

    let messages = to_llm_messages((library.summarize_nodes.summarize)(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await;

    let summaries: HashMap<String, String> = match response {
        Ok(value) => value
            .get("summaries")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| {
                        let uuid = e.get("uuid")?.as_str()?.to_string();
                        let summary = e.get("summary")?.as_str()?.to_string();
                        Some((uuid, summary))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            warn!("Node summarization failed, leaving summaries unchanged: {:?}", e);
            HashMap::new()
        }
    };

    Ok(nodes
        .iter()
        .cloned()
        .map(|mut node| {
            if let Some(summary) = summaries.get(&node.base.uuid) {
                node.summary = summary.clone();
            }
            node
        })
        .collect())
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
    use crate::nodes::BaseNode;

    #[test]
    fn test_episode_context_text_episode() {
        let episode = EpisodicNode::new(
            "ep1".to_string(),
            "group1".to_string(),
            EpisodeType::Text,
            "test source".to_string(),
            "Alice works at Acme".to_string(),
            chrono::Utc::now(),
        );
        let context = episode_context(&episode, &[]);
        assert_eq!(
            context.get("episode_content").unwrap().as_str().unwrap(),
            "Alice works at Acme"
        );
    }

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

    #[tokio::test]
    async fn test_dedupe_extracted_nodes_matches_by_exact_name() {
        let existing = EntityNode::new("Alice".to_string(), "g".to_string(), "".to_string());
        let mut extracted = existing.clone();
        extracted.base = BaseNode::new("Alice".to_string(), "g".to_string());

        let (kept, uuid_map) =
            dedupe_extracted_nodes(&NoOpLlm, &[extracted.clone()], &[existing.clone()])
                .await
                .unwrap();

        assert!(kept.is_empty());
        assert_eq!(uuid_map.get(&extracted.base.uuid), Some(&existing.base.uuid));
    }

    #[tokio::test]
    async fn test_dedupe_extracted_nodes_keeps_unmatched() {
        let existing = EntityNode::new("Alice".to_string(), "g".to_string(), "".to_string());
        let extracted = EntityNode::new("Bob".to_string(), "g".to_string(), "".to_string());

        let (kept, uuid_map) =
            dedupe_extracted_nodes(&NoOpLlm, &[extracted.clone()], &[existing])
                .await
                .unwrap();

        assert_eq!(kept.len(), 1);
        assert!(uuid_map.is_empty());
    }
}
