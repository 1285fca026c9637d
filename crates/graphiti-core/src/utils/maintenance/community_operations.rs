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

//! Community detection and summarization over the entity graph.
//!
//! Communities are clusters of related [`EntityNode`]s found by label
//! propagation over `RELATES_TO` edges, persisted as [`CommunityNode`]s with
//! [`CommunityEdge`] (`HAS_MEMBER`) links back to their member entities.

use std::collections::{HashMap, HashSet};

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{
    database::{GraphDatabase, QueryParameter},
    edges::Edge,
    errors::GraphitiError,
    llm_client::{LlmClient, ModelSize},
    nodes::{CommunityNode, EntityNode, Node},
};

/// Community detection result: a set of entity UUIDs found to cluster together.
#[derive(Debug, Clone)]
pub struct Community {
    pub id: String,
    pub nodes: Vec<Uuid>,
    pub score: f64,
}

/// Community detection algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunityAlgorithm {
    LabelPropagation,
}

/// Community statistics
#[derive(Debug, Clone, Default)]
pub struct CommunityStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
}

struct EntityGraph {
    uuids: Vec<String>,
    index_of: HashMap<String, usize>,
    neighbors: Vec<Vec<usize>>,
    edge_count: usize,
}

async fn load_entity_graph(
    database: &dyn GraphDatabase,
    group_id: &str,
) -> Result<EntityGraph, GraphitiError> {
    let mut props = HashMap::new();
    props.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));
    let nodes = database
        .find_nodes(Some("Entity"), props)
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let uuids: Vec<String> = nodes
        .iter()
        .map(|n| {
            n.properties
                .get("uuid")
                .and_then(|v| match v {
                    QueryParameter::String(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| n.id.clone())
        })
        .collect();
    let index_of: HashMap<String, usize> = uuids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    let edges = database
        .find_edges(None, None, Some("RELATES_TO"))
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let mut neighbors = vec![Vec::new(); uuids.len()];
    let mut edge_count = 0;
    for edge in &edges {
        let (Some(&a), Some(&b)) = (index_of.get(&edge.source_id), index_of.get(&edge.target_id))
        else {
            continue;
        };
        if a == b {
            continue;
        }
        neighbors[a].push(b);
        neighbors[b].push(a);
        edge_count += 1;
    }

    Ok(EntityGraph {
        uuids,
        index_of,
        neighbors,
        edge_count,
    })
}

/// Detect communities in the group's entity graph using label propagation.
///
/// Each node starts in its own label and repeatedly adopts the most common
/// label among its neighbors, breaking ties by keeping its current label.
/// Stops once no node changes label or after a fixed iteration cap.
pub async fn detect_communities(
    database: &dyn GraphDatabase,
    group_id: &str,
    _algorithm: CommunityAlgorithm,
) -> Result<Vec<Community>, GraphitiError> {
    const MAX_ITERATIONS: usize = 20;

    let graph = load_entity_graph(database, group_id).await?;
    if graph.uuids.is_empty() {
        return Ok(Vec::new());
    }

    let mut labels: Vec<usize> = (0..graph.uuids.len()).collect();

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for node in 0..graph.uuids.len() {
            if graph.neighbors[node].is_empty() {
                continue;
            }

            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &neighbor in &graph.neighbors[node] {
                *counts.entry(labels[neighbor]).or_insert(0) += 1;
            }

            let best_label = counts
                .into_iter()
                .max_by_key(|&(label, count)| (count, std::cmp::Reverse(label)))
                .map(|(label, _)| label);

            if let Some(best_label) = best_label {
                if best_label != labels[node] {
                    labels[node] = best_label;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for (node, &label) in labels.iter().enumerate() {
        clusters.entry(label).or_default().push(node);
    }

    let communities = clusters
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| {
            let nodes: Vec<Uuid> = members
                .iter()
                .filter_map(|&i| Uuid::parse_str(&graph.uuids[i]).ok())
                .collect();
            let score = members.len() as f64;
            Community {
                id: Uuid::new_v4().to_string(),
                nodes,
                score,
            }
        })
        .collect();

    Ok(communities)
}

/// Detect communities and persist each as a [`CommunityNode`] with `HAS_MEMBER`
/// edges back to its member entities, naming and summarizing each via the LLM.
pub async fn build_communities(
    database: &dyn GraphDatabase,
    llm_client: &dyn LlmClient,
    group_id: &str,
) -> Result<Vec<CommunityNode>, GraphitiError> {
    let communities = detect_communities(database, group_id, CommunityAlgorithm::LabelPropagation).await?;
    let mut built = Vec::with_capacity(communities.len());

    for community in communities {
        let mut members = Vec::with_capacity(community.nodes.len());
        for uuid in &community.nodes {
            if let Some(data) = database
                .get_node(&uuid.to_string())
                .await
                .map_err(GraphitiError::DatabaseLayer)?
            {
                members.push(crate::search::utils::node_data_to_entity_node(&data));
            }
        }
        if members.is_empty() {
            continue;
        }

        let (name, summary) = summarize_community(llm_client, &members).await;

        let community_node = CommunityNode::new(name, group_id.to_string(), summary);
        community_node
            .save(database)
            .await?;

        for member in &members {
            let edge = crate::edges::CommunityEdge::new(
                group_id.to_string(),
                member.base.uuid.clone(),
                community_node.base.uuid.clone(),
            );
            edge.save(database).await?;
        }

        built.push(community_node);
    }

    Ok(built)
}

async fn summarize_community(llm_client: &dyn LlmClient, members: &[EntityNode]) -> (String, String) {
    let library = crate::prompts::get_prompt_library();
    let mut context = HashMap::new();
    context.insert(
        "members".to_string(),
        json!(members
            .iter()
            .map(|n| json!({"name": n.base.name, "summary": n.summary}))
            .collect::<Vec<_>>()),
    );

    let messages: Vec<crate::llm_client::Message> = (library.summarize_communities.summarize)(&context)
        .into_iter()
        .map(|m| crate::llm_client::Message::new(m.role, m.content))
        .collect();

    let response = llm_client
        .generate_response(&messages, None, None, ModelSize::Small)
        .await;

    match response {
        Ok(value) => {
            let name = value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("Unnamed community")
                .to_string();
            let summary = value
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            (name, summary)
        }
        Err(e) => {
            warn!("Community summarization failed, using a fallback name: {:?}", e);
            let fallback_name = members
                .first()
                .map(|n| format!("{} and related entities", n.base.name))
                .unwrap_or_else(|| "Unnamed community".to_string());
            (fallback_name, String::new())
        }
    }
}

/// Tag each member entity with the community it was assigned to, via a
/// `community_uuid` property, so reads can filter entities by community.
pub async fn update_community_assignments(
    database: &dyn GraphDatabase,
    communities: &[CommunityNode],
    members_by_community: &HashMap<String, Vec<String>>,
) -> Result<(), GraphitiError> {
    for community in communities {
        let Some(member_uuids) = members_by_community.get(&community.base.uuid) else {
            continue;
        };
        for entity_uuid in member_uuids {
            let mut properties = HashMap::new();
            properties.insert(
                "community_uuid".to_string(),
                QueryParameter::String(community.base.uuid.clone()),
            );
            database
                .update_node(entity_uuid, properties)
                .await
                .map_err(GraphitiError::DatabaseLayer)?;
        }
    }

    Ok(())
}

/// Compute basic statistics (member count, internal edge count, density) for
/// a single community's entity cluster.
pub async fn get_community_stats(
    database: &dyn GraphDatabase,
    group_id: &str,
    community_uuid: &str,
) -> Result<CommunityStats, GraphitiError> {
    let mut props = HashMap::new();
    props.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));
    props.insert(
        "community_uuid".to_string(),
        QueryParameter::String(community_uuid.to_string()),
    );

    let members = database
        .find_nodes(Some("Entity"), props)
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let member_ids: HashSet<String> = members
        .iter()
        .filter_map(|n| match n.properties.get("uuid") {
            Some(QueryParameter::String(s)) => Some(s.clone()),
            _ => None,
        })
        .collect();

    if member_ids.is_empty() {
        return Ok(CommunityStats::default());
    }

    let edges = database
        .find_edges(None, None, Some("RELATES_TO"))
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let edge_count = edges
        .iter()
        .filter(|e| member_ids.contains(&e.source_id) && member_ids.contains(&e.target_id))
        .count();

    let node_count = member_ids.len();
    let max_edges = node_count * (node_count.saturating_sub(1)) / 2;
    let density = if max_edges == 0 {
        0.0
    } else {
        edge_count as f64 / max_edges as f64
    };

    Ok(CommunityStats {
        node_count,
        edge_count,
        density,
    })
}

/// Find entities that connect two or more distinct communities.
pub async fn find_bridge_nodes(
    database: &dyn GraphDatabase,
    group_id: &str,
) -> Result<Vec<Uuid>, GraphitiError> {
    let mut props = HashMap::new();
    props.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));

    let entities = database
        .find_nodes(Some("Entity"), props)
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let edges = database
        .find_edges(None, None, Some("HAS_MEMBER"))
        .await
        .map_err(GraphitiError::DatabaseLayer)?;

    let entity_ids: HashSet<String> = entities
        .iter()
        .filter_map(|n| match n.properties.get("uuid") {
            Some(QueryParameter::String(s)) => Some(s.clone()),
            _ => None,
        })
        .collect();

    let mut communities_by_entity: HashMap<String, HashSet<String>> = HashMap::new();
    for edge in &edges {
        if entity_ids.contains(&edge.source_id) {
            communities_by_entity
                .entry(edge.source_id.clone())
                .or_default()
                .insert(edge.target_id.clone());
        }
    }

    let bridges = communities_by_entity
        .into_iter()
        .filter(|(_, communities)| communities.len() > 1)
        .filter_map(|(entity_uuid, _)| Uuid::parse_str(&entity_uuid).ok())
        .collect();

    Ok(bridges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_stats_default() {
        let stats = CommunityStats::default();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.edge_count, 0);
        assert_eq!(stats.density, 0.0);
    }

    #[test]
    fn test_community_algorithm_eq() {
        assert_eq!(CommunityAlgorithm::LabelPropagation, CommunityAlgorithm::LabelPropagation);
    }
}
