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

//! Retriever building blocks shared by the hybrid search engine.
//!
//! Every retriever in this module goes through [`GraphDatabase`] rather than
//! a concrete backend's query language, so the same retriever works against
//! Neo4j or Kuzu. Backends that don't expose a native fulltext score rank
//! results in index order and fall back to position-based scoring.

use std::collections::{HashMap, HashSet};

use crate::{
    database::{EdgeData, GraphDatabase, NodeData, QueryParameter},
    edges::{BaseEdge, EntityEdge},
    errors::GraphitiError,
    nodes::{BaseNode, EntityNode, EpisodeType, EpisodicNode},
    search::{SearchFilters, SearchResult},
    types::GraphitiClients,
};

pub const RELEVANT_SCHEMA_LIMIT: usize = 10;
pub const DEFAULT_MIN_SCORE: f64 = crate::search::config::DEFAULT_MIN_SCORE;
pub const DEFAULT_MMR_LAMBDA: f64 = 0.5;
pub const MAX_SEARCH_DEPTH: i32 = 3;
pub const MAX_QUERY_LENGTH: usize = 32;

/// Sanitize a query string for Lucene full-text search
pub fn lucene_sanitize(query: &str) -> String {
    query
        .chars()
        .filter_map(|c| {
            match c {
                // Escape special Lucene characters
                '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"'
                | '~' | '*' | '?' | ':' | '\\' => Some(format!("\\{}", c)),
                // Keep alphanumeric and space
                c if c.is_alphanumeric() || c.is_whitespace() => Some(c.to_string()),
                // Remove other characters
                _ => None,
            }
        })
        .collect::<Vec<String>>()
        .join("")
}

/// Build a full-text search query with group filtering
pub fn fulltext_query(query: &str, group_ids: Option<&[String]>) -> String {
    let mut group_ids_filter = String::new();
    if let Some(groups) = group_ids {
        let group_filters: Vec<String> = groups
            .iter()
            .map(|g| format!("group_id:\"{}\"", lucene_sanitize(g)))
            .collect();

        if !group_filters.is_empty() {
            group_ids_filter = group_filters.join(" OR ");
            group_ids_filter.push_str(" AND ");
        }
    }

    let lucene_query = lucene_sanitize(query);

    // If the lucene query is too long, return empty query
    if lucene_query.split_whitespace().count() + group_ids.map_or(0, |g| g.len()) >= MAX_QUERY_LENGTH
    {
        return String::new();
    }

    format!("{}({})", group_ids_filter, lucene_query)
}

fn query_parameter_to_string(value: &QueryParameter) -> Option<String> {
    match value {
        QueryParameter::String(s) => Some(s.clone()),
        QueryParameter::Integer(i) => Some(i.to_string()),
        QueryParameter::Float(f) => Some(f.to_string()),
        QueryParameter::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn query_parameter_to_f64_vec(value: &QueryParameter) -> Option<Vec<f64>> {
    match value {
        QueryParameter::List(items) => Some(
            items
                .iter()
                .filter_map(|v| match v {
                    QueryParameter::Float(f) => Some(*f),
                    QueryParameter::Integer(i) => Some(*i as f64),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

fn query_parameter_to_string_vec(value: &QueryParameter) -> Vec<String> {
    match value {
        QueryParameter::List(items) => items.iter().filter_map(query_parameter_to_string).collect(),
        QueryParameter::String(s) => serde_json::from_str::<Vec<String>>(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn prop_str(data: &HashMap<String, QueryParameter>, key: &str, default: &str) -> String {
    data.get(key)
        .and_then(query_parameter_to_string)
        .unwrap_or_else(|| default.to_string())
}

fn prop_datetime(data: &HashMap<String, QueryParameter>, key: &str) -> chrono::DateTime<chrono::Utc> {
    data.get(key)
        .and_then(query_parameter_to_string)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now)
}

/// Convert a database-layer [`NodeData`] record into an [`EntityNode`]
pub fn node_data_to_entity_node(data: &NodeData) -> EntityNode {
    let base = BaseNode {
        uuid: prop_str(&data.properties, "uuid", &data.id),
        name: prop_str(&data.properties, "name", ""),
        group_id: prop_str(&data.properties, "group_id", "default"),
        labels: data.labels.clone(),
        created_at: prop_datetime(&data.properties, "created_at"),
    };

    let summary_embedding = data
        .properties
        .get("summary_embedding")
        .and_then(query_parameter_to_f64_vec)
        .or_else(|| {
            data.properties
                .get("summary_embedding")
                .and_then(query_parameter_to_string)
                .and_then(|s| serde_json::from_str::<Vec<f64>>(&s).ok())
        });

    EntityNode {
        base,
        summary: prop_str(&data.properties, "summary", ""),
        summary_embedding,
    }
}

/// Convert a database-layer [`NodeData`] record into an [`EpisodicNode`]
pub fn node_data_to_episodic_node(data: &NodeData) -> EpisodicNode {
    let base = BaseNode {
        uuid: prop_str(&data.properties, "uuid", &data.id),
        name: prop_str(&data.properties, "name", ""),
        group_id: prop_str(&data.properties, "group_id", "default"),
        labels: data.labels.clone(),
        created_at: prop_datetime(&data.properties, "created_at"),
    };

    let source = match prop_str(&data.properties, "source", "text").as_str() {
        "message" => EpisodeType::Message,
        "json" => EpisodeType::Json,
        _ => EpisodeType::Text,
    };

    let entity_edges = data
        .properties
        .get("entity_edges")
        .map(query_parameter_to_string_vec)
        .unwrap_or_default();

    EpisodicNode {
        base,
        source,
        source_description: prop_str(&data.properties, "source_description", ""),
        content: prop_str(&data.properties, "content", ""),
        valid_at: prop_datetime(&data.properties, "valid_at"),
        entity_edges,
    }
}

/// Convert a database-layer [`EdgeData`] record into an [`EntityEdge`]
pub fn edge_data_to_entity_edge(data: &EdgeData) -> EntityEdge {
    let base = BaseEdge {
        uuid: prop_str(&data.properties, "uuid", &data.id),
        group_id: prop_str(&data.properties, "group_id", "default"),
        source_node_uuid: data.source_id.clone(),
        target_node_uuid: data.target_id.clone(),
        created_at: prop_datetime(&data.properties, "created_at"),
    };

    let expired_at = data
        .properties
        .get("expired_at")
        .and_then(query_parameter_to_string)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc));
    let invalid_at = data
        .properties
        .get("invalid_at")
        .and_then(query_parameter_to_string)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let fact_embedding = data.properties.get("fact_embedding").and_then(query_parameter_to_f64_vec);

    EntityEdge {
        base,
        name: prop_str(&data.properties, "name", &data.relationship_type),
        fact: prop_str(&data.properties, "fact", ""),
        fact_embedding,
        episodes: data
            .properties
            .get("episodes")
            .map(query_parameter_to_string_vec)
            .unwrap_or_default(),
        expired_at,
        valid_at: prop_datetime(&data.properties, "valid_at"),
        invalid_at,
    }
}

/// Get episodes by node and edge mentions
pub async fn get_episodes_by_mentions(
    clients: &GraphitiClients,
    _nodes: &[EntityNode],
    edges: &[EntityEdge],
    limit: usize,
) -> Result<Vec<EpisodicNode>, GraphitiError> {
    let mut episode_uuids: Vec<String> = Vec::new();
    for edge in edges {
        episode_uuids.extend(edge.episodes.iter().cloned());
    }
    episode_uuids.truncate(limit);

    let mut episodes = Vec::new();
    for uuid in episode_uuids {
        if let Some(node) = clients
            .database
            .get_node(&uuid)
            .await
            .map_err(GraphitiError::DatabaseLayer)?
        {
            episodes.push(node_data_to_episodic_node(&node));
        }
    }
    Ok(episodes)
}

/// Get nodes mentioned in episodes
pub async fn get_mentioned_nodes(
    clients: &GraphitiClients,
    episodes: &[EpisodicNode],
) -> Result<Vec<EntityNode>, GraphitiError> {
    let mut entity_uuids = HashSet::new();
    for episode in episodes {
        for entity_uuid in &episode.entity_edges {
            entity_uuids.insert(entity_uuid.clone());
        }
    }

    let mut nodes = Vec::new();
    for uuid in entity_uuids {
        if let Some(node) = clients
            .database
            .get_node(&uuid)
            .await
            .map_err(GraphitiError::DatabaseLayer)?
        {
            nodes.push(node_data_to_entity_node(&node));
        }
    }
    Ok(nodes)
}

/// Get communities by their member nodes. Community membership is not a
/// core requirement of every backend; callers that never write `HAS_MEMBER`
/// edges simply get an empty result here.
pub async fn get_communities_by_nodes(
    clients: &GraphitiClients,
    nodes: &[EntityNode],
) -> Result<Vec<crate::nodes::CommunityNode>, GraphitiError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    let mut community_ids = HashSet::new();
    for node in nodes {
        let member_edges = clients
            .database
            .find_edges(Some(&node.base.uuid), None, Some("HAS_MEMBER"))
            .await
            .map_err(GraphitiError::DatabaseLayer)?;
        for edge in member_edges {
            community_ids.insert(edge.target_id);
        }
    }

    let mut communities = Vec::new();
    for id in community_ids {
        if let Some(node_data) = clients
            .database
            .get_node(&id)
            .await
            .map_err(GraphitiError::DatabaseLayer)?
        {
            let entity = node_data_to_entity_node(&node_data);
            communities.push(crate::nodes::CommunityNode {
                base: entity.base,
                summary: entity.summary,
                summary_embedding: entity.summary_embedding,
            });
        }
    }
    Ok(communities)
}

/// Keyword relevance for fulltext results without a native score: later
/// positions in an already-ranked result set score lower.
fn position_score(rank: usize, total: usize) -> f64 {
    if total <= 1 {
        1.0
    } else {
        1.0 - (rank as f64 / total as f64)
    }
}

/// Perform full-text search on edges (relation name + fact sentence)
pub async fn edge_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    _search_filter: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let edges = clients
        .database
        .find_edges(None, None, Some("RELATES_TO"))
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let query_lower = query.to_lowercase();
    let mut matched: Vec<EntityEdge> = edges
        .iter()
        .map(edge_data_to_entity_edge)
        .filter(|edge| {
            group_ids.map_or(true, |g| g.contains(&edge.base.group_id))
                && (edge.fact.to_lowercase().contains(&query_lower)
                    || edge.name.to_lowercase().contains(&query_lower))
        })
        .collect();
    matched.truncate(limit);

    let total = matched.len();
    Ok(matched
        .into_iter()
        .enumerate()
        .map(|(rank, item)| SearchResult {
            item,
            score: position_score(rank, total),
        })
        .collect())
}

/// Perform vector similarity search on edges using their fact embedding
pub async fn edge_similarity_search(
    clients: &GraphitiClients,
    search_vector: &[f64],
    source_node_uuid: Option<&str>,
    target_node_uuid: Option<&str>,
    _search_filter: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
    min_score: f64,
) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
    if search_vector.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let edges = clients
        .database
        .find_edges(source_node_uuid, target_node_uuid, Some("RELATES_TO"))
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let query_vec: Vec<f32> = search_vector.iter().map(|&v| v as f32).collect();

    let mut scored: Vec<SearchResult<EntityEdge>> = edges
        .iter()
        .map(edge_data_to_entity_edge)
        .filter(|edge| group_ids.map_or(true, |g| g.contains(&edge.base.group_id)))
        .filter_map(|edge| {
            let embedding = edge
                .fact_embedding_f32()
                .unwrap_or_default();
            if embedding.is_empty() {
                return None;
            }
            let score = cosine_similarity(&query_vec, &embedding);
            if score < min_score {
                None
            } else {
                Some(SearchResult { item: edge, score })
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

/// Perform breadth-first search on edges starting from a set of origin nodes
pub async fn edge_bfs_search(
    clients: &GraphitiClients,
    bfs_origin_node_uuids: Option<&[String]>,
    bfs_max_depth: i32,
    _search_filter: &SearchFilters,
    limit: usize,
) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
    let Some(origin_uuids) = bfs_origin_node_uuids else {
        return Ok(Vec::new());
    };
    if origin_uuids.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut frontier: Vec<String> = origin_uuids.to_vec();
    let mut visited: HashSet<String> = frontier.iter().cloned().collect();
    let mut results = Vec::new();
    let mut depth = 0;

    while depth < bfs_max_depth.max(0) && !frontier.is_empty() && results.len() < limit {
        let mut next_frontier = Vec::new();
        for node_uuid in &frontier {
            let outgoing = clients
                .database
                .find_edges(Some(node_uuid), None, None)
                .await
                .map_err(GraphitiError::DatabaseLayer)?;

            for edge_data in outgoing {
                let edge = edge_data_to_entity_edge(&edge_data);
                let distance = depth + 1;
                if visited.insert(edge.base.target_node_uuid.clone()) {
                    next_frontier.push(edge.base.target_node_uuid.clone());
                }
                results.push(SearchResult {
                    item: edge,
                    score: 1.0 / (1.0 + distance as f64),
                });
                if results.len() >= limit {
                    break;
                }
            }
            if results.len() >= limit {
                break;
            }
        }
        frontier = next_frontier;
        depth += 1;
    }

    results.truncate(limit);
    Ok(results)
}

/// Node vector similarity search using cosine similarity
pub async fn node_similarity_search(
    clients: &GraphitiClients,
    query_vector: &[f32],
    filters: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EntityNode>>, GraphitiError> {
    if limit == 0 || query_vector.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(groups) = group_ids {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
    }
    let _ = filters;

    let embedding: Vec<f64> = query_vector.iter().map(|&v| v as f64).collect();
    let hits = clients
        .database
        .vector_search(embedding, "Entity", limit.max(RELEVANT_SCHEMA_LIMIT))
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let mut results: Vec<SearchResult<EntityNode>> = hits
        .into_iter()
        .map(|(data, score)| SearchResult {
            item: node_data_to_entity_node(&data),
            score,
        })
        .filter(|r| group_ids.map_or(true, |g| g.contains(&r.item.base.group_id)))
        .filter(|r| r.score >= DEFAULT_MIN_SCORE)
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}

/// Node full-text search over name and summary
pub async fn node_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    _filters: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EntityNode>>, GraphitiError> {
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let hits = clients
        .database
        .fulltext_search(query, vec!["Entity".to_string()])
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let mut nodes: Vec<EntityNode> = hits
        .iter()
        .map(node_data_to_entity_node)
        .filter(|n| group_ids.map_or(true, |g| g.contains(&n.base.group_id)))
        .collect();
    nodes.truncate(limit);

    let total = nodes.len();
    Ok(nodes
        .into_iter()
        .enumerate()
        .map(|(rank, item)| SearchResult {
            item,
            score: position_score(rank, total),
        })
        .collect())
}

/// Episode full-text search over content
pub async fn episode_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    _filters: &SearchFilters,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<EpisodicNode>>, GraphitiError> {
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let hits = clients
        .database
        .fulltext_search(query, vec!["Episodic".to_string()])
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let mut episodes: Vec<EpisodicNode> = hits
        .iter()
        .map(node_data_to_episodic_node)
        .filter(|e| group_ids.map_or(true, |g| g.contains(&e.base.group_id)))
        .collect();
    episodes.truncate(limit);

    let total = episodes.len();
    Ok(episodes
        .into_iter()
        .enumerate()
        .map(|(rank, item)| SearchResult {
            item,
            score: position_score(rank, total),
        })
        .collect())
}

/// Community similarity search using vector embeddings
pub async fn community_similarity_search(
    clients: &GraphitiClients,
    query_vector: &[f64],
    limit: usize,
) -> Result<Vec<SearchResult<crate::nodes::CommunityNode>>, GraphitiError> {
    if query_vector.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let hits = clients
        .database
        .vector_search(query_vector.to_vec(), "Community", limit)
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    Ok(hits
        .into_iter()
        .map(|(data, score)| {
            let entity = node_data_to_entity_node(&data);
            SearchResult {
                item: crate::nodes::CommunityNode {
                    base: entity.base,
                    summary: entity.summary,
                    summary_embedding: entity.summary_embedding,
                },
                score,
            }
        })
        .collect())
}

/// Community full-text search using Lucene index
pub async fn community_fulltext_search(
    clients: &GraphitiClients,
    query: &str,
    group_ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<SearchResult<crate::nodes::CommunityNode>>, GraphitiError> {
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let hits = clients
        .database
        .fulltext_search(query, vec!["Community".to_string()])
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let mut communities: Vec<crate::nodes::CommunityNode> = hits
        .iter()
        .map(node_data_to_entity_node)
        .filter(|n| group_ids.map_or(true, |g| g.contains(&n.base.group_id)))
        .map(|entity| crate::nodes::CommunityNode {
            base: entity.base,
            summary: entity.summary,
            summary_embedding: entity.summary_embedding,
        })
        .collect();
    communities.truncate(limit);

    let total = communities.len();
    Ok(communities
        .into_iter()
        .enumerate()
        .map(|(rank, item)| SearchResult {
            item,
            score: position_score(rank, total),
        })
        .collect())
}

/// Candidate entity nodes that may already exist in the graph, used during
/// entity-resolution dedup (fulltext by name, unioned across candidates).
pub async fn get_relevant_nodes(
    clients: &GraphitiClients,
    candidates: &[EntityNode],
    filters: &SearchFilters,
) -> Result<Vec<EntityNode>, GraphitiError> {
    let mut seen = HashSet::new();
    let mut relevant = Vec::new();

    for candidate in candidates {
        let hits = node_fulltext_search(
            clients,
            &candidate.base.name,
            filters,
            Some(std::slice::from_ref(&candidate.base.group_id)),
            RELEVANT_SCHEMA_LIMIT,
        )
        .await?;

        for hit in hits {
            if seen.insert(hit.item.base.uuid.clone()) {
                relevant.push(hit.item);
            }
        }
    }

    Ok(relevant)
}

/// Candidate entity edges that may already exist between the same node
/// pairs, used during fact dedup.
pub async fn get_relevant_edges(
    clients: &GraphitiClients,
    candidates: &[EntityEdge],
    filters: &SearchFilters,
) -> Result<Vec<EntityEdge>, GraphitiError> {
    let mut seen = HashSet::new();
    let mut relevant = Vec::new();

    for candidate in candidates {
        let hits = edge_fulltext_search(
            clients,
            &candidate.fact,
            filters,
            Some(std::slice::from_ref(&candidate.base.group_id)),
            RELEVANT_SCHEMA_LIMIT,
        )
        .await?;

        for hit in hits {
            if seen.insert(hit.item.base.uuid.clone()) {
                relevant.push(hit.item);
            }
        }
    }

    Ok(relevant)
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)) as f64
    }
}

/// Calculate Manhattan distance between two vectors
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }

    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs() as f64).sum()
}

/// Calculate Euclidean distance between two vectors
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = (x - y) as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lucene_sanitize() {
        assert_eq!(lucene_sanitize("test+query"), "test\\+query");
        assert_eq!(lucene_sanitize("hello world"), "hello world");
        assert_eq!(lucene_sanitize("user@domain.com"), "userdomaincom");
        assert_eq!(lucene_sanitize("query*"), "query\\*");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((manhattan_distance(&a, &b) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_fulltext_query() {
        let query = fulltext_query("test query", None);
        assert_eq!(query, "(test query)");

        let groups = vec!["group1".to_string(), "group2".to_string()];
        let query = fulltext_query("test", Some(&groups));
        assert!(query.contains("group_id:\"group1\""));
        assert!(query.contains("group_id:\"group2\""));
        assert!(query.contains("test"));
    }

    #[test]
    fn test_position_score() {
        assert_eq!(position_score(0, 1), 1.0);
        assert!(position_score(0, 4) > position_score(3, 4));
    }
}
