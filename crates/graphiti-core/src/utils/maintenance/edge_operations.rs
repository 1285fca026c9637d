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

//! Edge maintenance operations

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::{
    edges::{EntityEdge, EpisodicEdge},
    errors::GraphitiError,
    llm_client::{LlmClient, Message, ModelSize},
    nodes::{EntityNode, EpisodicNode},
    types::GraphitiClients,
};

const EXTRACTED_EDGES_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "edges": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "relation_type": {"type": "string"},
                    "source_entity_id": {"type": "integer"},
                    "target_entity_id": {"type": "integer"},
                    "fact": {"type": "string"},
                    "valid_at": {"type": ["string", "null"]},
                    "invalid_at": {"type": ["string", "null"]}
                },
                "required": ["relation_type", "source_entity_id", "target_entity_id", "fact"]
            }
        }
    },
    "required": ["edges"]
}"#;

/// Extract edges from an episode and its context.
///
/// Entities are indexed positionally (0-based) in the prompt so the LLM can
/// reference them by `source_entity_id`/`target_entity_id` without having to
/// repeat uuids; the response is joined back to `extracted_nodes` by that
/// index.
pub async fn extract_edges(
    clients: &GraphitiClients,
    episode: &EpisodicNode,
    extracted_nodes: &[EntityNode],
    previous_episodes: &[EpisodicNode],
    group_id: &str,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    if extracted_nodes.len() < 2 {
        return Ok(Vec::new());
    }

    let library = crate::prompts::get_prompt_library();
    let mut context = std::collections::HashMap::new();
    context.insert(
        "episode_content".to_string(),
        Value::String(episode.content.clone()),
    );
    context.insert(
        "previous_episodes".to_string(),
        json!(previous_episodes
            .iter()
            .map(|e| e.content.clone())
            .collect::<Vec<_>>()),
    );
    context.insert(
        "nodes".to_string(),
        json!(extracted_nodes
            .iter()
            .enumerate()
            .map(|(id, n)| json!({"id": id, "name": n.base.name}))
            .collect::<Vec<_>>()),
    );
    context.insert(
        "reference_time".to_string(),
        Value::String(episode.valid_at.to_rfc3339()),
    );
    context.insert("edge_types".to_string(), json!([]));

    let messages = to_llm_messages((library.extract_edges.edge)(&context));

    let response = clients
        .llm_client
        .generate_response(&messages, Some(EXTRACTED_EDGES_SCHEMA), None, ModelSize::Medium)
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!("Edge extraction failed for episode {}: {:?}", episode.base.uuid, e);
            return Ok(Vec::new());
        }
    };

    let raw_edges = response
        .get("edges")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut edges = Vec::new();
    for raw in raw_edges {
        let source_id = raw.get("source_entity_id").and_then(Value::as_u64);
        let target_id = raw.get("target_entity_id").and_then(Value::as_u64);
        let (Some(source_id), Some(target_id)) = (source_id, target_id) else {
            continue;
        };
        if source_id == target_id {
            continue;
        }
        let (Some(source), Some(target)) = (
            extracted_nodes.get(source_id as usize),
            extracted_nodes.get(target_id as usize),
        ) else {
            continue;
        };

        let relation_type = raw
            .get("relation_type")
            .and_then(Value::as_str)
            .unwrap_or("RELATES_TO")
            .to_string();
        let fact = raw.get("fact").and_then(Value::as_str).unwrap_or("").to_string();
        let valid_at = raw
            .get("valid_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(episode.valid_at);

        let mut edge = EntityEdge::new(
            group_id.to_string(),
            source.base.uuid.clone(),
            target.base.uuid.clone(),
            relation_type,
            fact,
            valid_at,
        );
        edge.episodes.push(episode.base.uuid.clone());

        if let Some(invalid_at) = raw
            .get("invalid_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
        {
            edge.invalid_at = Some(invalid_at);
            edge.expired_at = Some(Utc::now());
        }

        edges.push(edge);
    }

    Ok(edges)
}

/// Deduplicate extracted edges against existing edges using LLM.
///
/// The LLM pass is advisory; extracted edges already matching an existing
/// fact between the same node pair are always dropped regardless of its
/// outcome.
pub async fn dedupe_extracted_edges(
    llm_client: &dyn LlmClient,
    extracted_edges: &[EntityEdge],
    existing_edges: &[EntityEdge],
) -> Result<Vec<EntityEdge>, GraphitiError> {
    if extracted_edges.is_empty() || existing_edges.is_empty() {
        return Ok(extracted_edges.to_vec());
    }

    let library = crate::prompts::get_prompt_library();
    let mut context = std::collections::HashMap::new();
    context.insert(
        "edges".to_string(),
        json!(extracted_edges
            .iter()
            .chain(existing_edges.iter())
            .map(|e| json!({"uuid": e.base.uuid, "fact": e.fact}))
            .collect::<Vec<_>>()),
    );

    let messages = to_llm_messages((library.dedupe_edges.dedupe)(&context));
    if let Err(e) = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await
    {
        warn!("Edge dedupe LLM call failed, falling back to exact match: {:?}", e);
    }

    let mut seen: std::collections::HashSet<(String, String, String)> = existing_edges
        .iter()
        .map(|e| {
            (
                e.base.source_node_uuid.clone(),
                e.base.target_node_uuid.clone(),
                e.fact.clone(),
            )
        })
        .collect();

    Ok(extracted_edges
        .iter()
        .cloned()
        .filter(|edge| {
            let key = (
                edge.base.source_node_uuid.clone(),
                edge.base.target_node_uuid.clone(),
                edge.fact.clone(),
            );
            seen.insert(key)
        })
        .collect())
}

/// Deduplicate a list of edges using LLM.
pub async fn dedupe_edge_list(
    llm_client: &dyn LlmClient,
    edges: &[EntityEdge],
) -> Result<Vec<EntityEdge>, GraphitiError> {
    dedupe_extracted_edges(llm_client, edges, &[]).await
}

/// Build episodic edges from extracted nodes, linking each entity back to the
/// episode it was mentioned in.
pub fn build_episodic_edges(
    extracted_nodes: &[EntityNode],
    episode: &EpisodicNode,
    created_at: DateTime<Utc>,
) -> Vec<EpisodicEdge> {
    extracted_nodes
        .iter()
        .map(|node| {
            let mut edge = EpisodicEdge::new(
                episode.base.group_id.clone(),
                episode.base.uuid.clone(),
                node.base.uuid.clone(),
            );
            edge.base = edge.base.with_created_at(created_at);
            edge
        })
        .collect()
}

/// Invalidate edges contradicted by new episode content.
pub async fn invalidate_edges(
    llm_client: &dyn LlmClient,
    edges: &[EntityEdge],
    episode: &EpisodicNode,
    context_text: Option<&str>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let library = crate::prompts::get_prompt_library();
    let mut context = std::collections::HashMap::new();
    context.insert(
        "edges".to_string(),
        json!(edges
            .iter()
            .map(|e| json!({"uuid": e.base.uuid, "fact": e.fact}))
            .collect::<Vec<_>>()),
    );
    context.insert(
        "new_content".to_string(),
        Value::String(context_text.unwrap_or(&episode.content).to_string()),
    );

    let messages = to_llm_messages((library.invalidate_edges.invalidate)(&context));
    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await;

    let invalidated_uuids: std::collections::HashSet<String> = match response {
        Ok(value) => value
            .get("invalidated_edge_uuids")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            warn!("Edge invalidation LLM call failed, leaving edges unchanged: {:?}", e);
            std::collections::HashSet::new()
        }
    };

    let now = Utc::now();
    Ok(edges
        .iter()
        .cloned()
        .map(|mut edge| {
            if invalidated_uuids.contains(&edge.base.uuid) {
                edge.invalid_at = Some(now);
                edge.expired_at = Some(now);
            }
            edge
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
    use crate::nodes::EpisodeType;

    fn episode() -> EpisodicNode {
        EpisodicNode::new(
            "ep1".to_string(),
            "group1".to_string(),
            EpisodeType::Text,
            "test".to_string(),
            "Alice works at Acme".to_string(),
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_build_episodic_edges_links_each_node() {
        let ep = episode();
        let nodes = vec![
            EntityNode::new("Alice".to_string(), "group1".to_string(), "".to_string()),
            EntityNode::new("Acme".to_string(), "group1".to_string(), "".to_string()),
        ];
        let now = chrono::Utc::now();
        let edges = build_episodic_edges(&nodes, &ep, now);

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].base.source_node_uuid, ep.base.uuid);
        assert_eq!(edges[0].base.target_node_uuid, nodes[0].base.uuid);
        assert_eq!(edges[0].base.created_at, now);
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
        ) -> crate::errors::LlmResult<std::collections::HashMap<String, Value>> {
            Ok(std::collections::HashMap::new())
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
    async fn test_dedupe_extracted_edges_drops_exact_fact_match() {
        let ep = episode();
        let existing = EntityEdge::new(
            "g".to_string(),
            "n1".to_string(),
            "n2".to_string(),
            "WORKS_AT".to_string(),
            "Alice works at Acme".to_string(),
            ep.valid_at,
        );
        let extracted = existing.clone();

        let result = dedupe_extracted_edges(&NoOpLlm, &[extracted], &[existing])
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_dedupe_extracted_edges_keeps_distinct_fact() {
        let ep = episode();
        let existing = EntityEdge::new(
            "g".to_string(),
            "n1".to_string(),
            "n2".to_string(),
            "WORKS_AT".to_string(),
            "Alice works at Acme".to_string(),
            ep.valid_at,
        );
        let extracted = EntityEdge::new(
            "g".to_string(),
            "n1".to_string(),
            "n3".to_string(),
            "LIVES_IN".to_string(),
            "Alice lives in Paris".to_string(),
            ep.valid_at,
        );

        let result = dedupe_extracted_edges(&NoOpLlm, &[extracted], &[existing])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_edges_marks_matching_uuid() {
        let ep = episode();
        let mut edge = EntityEdge::new(
            "g".to_string(),
            "n1".to_string(),
            "n2".to_string(),
            "WORKS_AT".to_string(),
            "Alice works at Acme".to_string(),
            ep.valid_at,
        );
        edge.base = edge.base.clone().with_uuid("fixed-uuid".to_string());

        // NoOpLlm returns an empty map, so no invalidated uuids; edges pass through unchanged.
        let result = invalidate_edges(&NoOpLlm, &[edge.clone()], &ep, None)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].invalid_at.is_none());
    }
}
