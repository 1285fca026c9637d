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

use std::collections::HashMap;

use crate::{
    edges::{Edge, EntityEdge},
    errors::GraphitiError,
    nodes::{CommunityNode, EntityNode, EpisodicNode, Node},
    relevance::{RelevanceScorer, ScoringConfig},
    search::{
        utils::*, CommunitySearchMethod, EdgeSearchMethod, EpisodeSearchMethod, NodeSearchMethod,
        SearchConfig, SearchFilters, SearchResult, SearchResults,
    },
    types::GraphitiClients,
};

/// Fuse per-method ranked result lists with Reciprocal Rank Fusion and
/// truncate to `limit`. Each method's results are ranked by its own score
/// before fusion; the returned score is the fused RRF score, not the
/// original retriever score.
fn fuse_with_rrf<T: Clone>(
    scorer: &RelevanceScorer,
    ranked_by_method: Vec<(&str, Vec<SearchResult<T>>)>,
    limit: usize,
    uuid_of: impl Fn(&T) -> String,
) -> Vec<SearchResult<T>> {
    let mut rankings: HashMap<String, Vec<String>> = HashMap::new();
    let mut items: HashMap<String, T> = HashMap::new();

    for (method_name, mut results) in ranked_by_method {
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let ranked_ids: Vec<String> = results.iter().map(|r| uuid_of(&r.item)).collect();
        for (id, result) in ranked_ids.iter().zip(results.into_iter()) {
            items.entry(id.clone()).or_insert(result.item);
        }
        rankings.insert(method_name.to_string(), ranked_ids);
    }

    scorer
        .apply_reciprocal_rank_fusion(&rankings, None)
        .into_iter()
        .filter_map(|(id, score)| {
            items
                .get(&id)
                .cloned()
                .map(|item| SearchResult { item, score })
        })
        .take(limit)
        .collect()
}

/// Main search interface for Graphiti
pub struct GraphitiSearch {
    clients: GraphitiClients,
}

impl GraphitiSearch {
    pub fn new(clients: GraphitiClients) -> Self {
        Self { clients }
    }

    /// Build a fusion-only `RelevanceScorer` sharing this search engine's
    /// database and LLM client. RRF itself needs neither, but reuses the
    /// one generic implementation rather than duplicating the formula here.
    fn rrf_scorer(&self) -> RelevanceScorer {
        RelevanceScorer::new(
            self.clients.database.clone(),
            Some(self.clients.llm_client.clone()),
            ScoringConfig::default(),
        )
    }

    /// Perform a comprehensive search across all entity types
    pub async fn search(
        &self,
        query: &str,
        config: &SearchConfig,
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
    ) -> Result<SearchResults, GraphitiError> {
        // Create a cache key for the entire search operation
        let cache_key = format!(
            "search:{}:{}:{:?}:{:?}",
            query,
            serde_json::to_string(config).unwrap_or_default(),
            serde_json::to_string(filters).unwrap_or_default(),
            group_ids
        );

        // Try to get cached results first
        if let Ok(Some(cached_bytes)) = self.clients.cache.get(&cache_key).await {
            if let Ok(cached_results) = serde_json::from_slice::<SearchResults>(&cached_bytes) {
                return Ok(cached_results);
            }
        }

        let mut results = SearchResults::new();

        // Search nodes
        let node_results = self
            .search_nodes(
                query,
                &config.node_search_config.search_methods,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.nodes = node_results;

        // Search edges
        let edge_results = self
            .search_edges(
                query,
                &config.edge_search_config.search_methods,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.edges = edge_results;

        // Search episodes
        let episode_results = self
            .search_episodes(
                query,
                &config.episode_search_config.search_methods,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.episodes = episode_results;

        // Search communities
        let community_results = self
            .search_communities(
                query,
                &config.community_search_config.search_methods,
                filters,
                group_ids,
                config.limit,
            )
            .await?;
        results.communities = community_results;

        // Cache the results for future use
        if let Ok(serialized) = serde_json::to_vec(&results) {
            let _ = self.clients.cache.set(&cache_key, serialized).await;
        }

        Ok(results)
    }

    /// Search for entity nodes
    pub async fn search_nodes(
        &self,
        query: &str,
        search_methods: &[NodeSearchMethod],
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<EntityNode>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_by_method: Vec<(&str, Vec<SearchResult<EntityNode>>)> = Vec::new();

        // Get query embedding if needed for similarity search, with cache support
        let query_vector = if search_methods.contains(&NodeSearchMethod::CosimeSimilarity) {
            let cache_key = format!("embedding:{}", query);

            // Try to get from cache first
            if let Ok(Some(cached_bytes)) = self.clients.cache.get(&cache_key).await {
                if let Ok(cached_vector) = serde_json::from_slice::<Vec<f32>>(&cached_bytes) {
                    Some(cached_vector)
                } else {
                    // Cache miss or invalid data, compute new embedding
                    let vector = self.clients.embedder.embed_query(query).await?;

                    // Cache the result
                    if let Ok(serialized) = serde_json::to_vec(&vector) {
                        let _ = self.clients.cache.set(&cache_key, serialized).await;
                    }

                    Some(vector)
                }
            } else {
                // Cache miss, compute new embedding
                let vector = self.clients.embedder.embed_query(query).await?;

                // Cache the result
                if let Ok(serialized) = serde_json::to_vec(&vector) {
                    let _ = self.clients.cache.set(&cache_key, serialized).await;
                }

                Some(vector)
            }
        } else {
            None
        };

        // Execute different search methods
        for method in search_methods {
            match method {
                NodeSearchMethod::CosimeSimilarity => {
                    if let Some(ref vector) = query_vector {
                        let results = node_similarity_search(
                            &self.clients,
                            vector,
                            filters,
                            group_ids,
                            limit * 2, // Get more results for reranking
                        )
                        .await?;
                        ranked_by_method.push(("cosine_similarity", results));
                    }
                }
                NodeSearchMethod::Bm25 => {
                    let results =
                        node_fulltext_search(&self.clients, query, filters, group_ids, limit * 2)
                            .await?;
                    ranked_by_method.push(("bm25", results));
                }
                NodeSearchMethod::Bfs => {
                    // BFS search requires additional parameters
                    // For now, we'll skip it but could be implemented later
                    continue;
                }
            }
        }

        let scorer = self.rrf_scorer();
        let fused = fuse_with_rrf(&scorer, ranked_by_method, limit, |n| n.uuid().to_string());

        Ok(fused)
    }

    /// Search for entity edges
    pub async fn search_edges(
        &self,
        query: &str,
        search_methods: &[EdgeSearchMethod],
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<EntityEdge>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_by_method: Vec<(&str, Vec<SearchResult<EntityEdge>>)> = Vec::new();

        // Get query embedding if needed for similarity search
        let query_vector = if search_methods.contains(&EdgeSearchMethod::CosimeSimilarity) {
            Some(self.clients.embedder.embed_query(query).await?)
        } else {
            None
        };

        for method in search_methods {
            match method {
                EdgeSearchMethod::CosimeSimilarity => {
                    if let Some(ref vector) = query_vector {
                        // Convert f32 to f64 for the search function
                        let vector_f64: Vec<f64> = vector.iter().map(|&x| x as f64).collect();
                        let results = edge_similarity_search(
                            &self.clients,
                            &vector_f64,
                            None, // source_node_uuid
                            None, // target_node_uuid
                            filters,
                            group_ids,
                            limit * 2,
                            0.0, // min_score
                        )
                        .await?;
                        ranked_by_method.push(("cosine_similarity", results));
                    }
                }
                EdgeSearchMethod::Bm25 => {
                    let results =
                        edge_fulltext_search(&self.clients, query, filters, group_ids, limit * 2)
                            .await?;
                    ranked_by_method.push(("bm25", results));
                }
                EdgeSearchMethod::Bfs => {
                    let results = edge_bfs_search(
                        &self.clients,
                        None, // No origin nodes for general search
                        3,    // max depth
                        filters,
                        limit * 2,
                    )
                    .await?;
                    ranked_by_method.push(("bfs", results));
                }
            }
        }

        let scorer = self.rrf_scorer();
        let fused = fuse_with_rrf(&scorer, ranked_by_method, limit, |e| e.uuid().to_string());

        Ok(fused)
    }

    /// Search for episodic nodes
    pub async fn search_episodes(
        &self,
        query: &str,
        search_methods: &[EpisodeSearchMethod],
        filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<EpisodicNode>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_by_method: Vec<(&str, Vec<SearchResult<EpisodicNode>>)> = Vec::new();

        for method in search_methods {
            match method {
                EpisodeSearchMethod::Bm25 => {
                    let results = episode_fulltext_search(
                        &self.clients,
                        query,
                        filters,
                        group_ids,
                        limit * 2,
                    )
                    .await?;
                    ranked_by_method.push(("bm25", results));
                }
            }
        }

        let scorer = self.rrf_scorer();
        let fused = fuse_with_rrf(&scorer, ranked_by_method, limit, |e| e.uuid().to_string());

        Ok(fused)
    }

    /// Search for community nodes
    pub async fn search_communities(
        &self,
        query: &str,
        search_methods: &[CommunitySearchMethod],
        _filters: &SearchFilters,
        group_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchResult<CommunityNode>>, GraphitiError> {
        if search_methods.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_by_method: Vec<(&str, Vec<SearchResult<CommunityNode>>)> = Vec::new();

        // Get query embedding if needed for similarity search
        let query_vector = if search_methods.contains(&CommunitySearchMethod::CosimeSimilarity) {
            Some(self.clients.embedder.embed_query(query).await?)
        } else {
            None
        };

        for method in search_methods {
            match method {
                CommunitySearchMethod::CosimeSimilarity => {
                    if let Some(ref vector) = query_vector {
                        // Convert f32 to f64 for the search function
                        let vector_f64: Vec<f64> = vector.iter().map(|&x| x as f64).collect();
                        let results =
                            community_similarity_search(&self.clients, &vector_f64, limit * 2)
                                .await?;
                        ranked_by_method.push(("cosine_similarity", results));
                    }
                }
                CommunitySearchMethod::Bm25 => {
                    let results =
                        community_fulltext_search(&self.clients, query, group_ids, limit * 2)
                            .await?;
                    ranked_by_method.push(("bm25", results));
                }
            }
        }

        let scorer = self.rrf_scorer();
        let fused = fuse_with_rrf(&scorer, ranked_by_method, limit, |c| c.uuid().to_string());

        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_creation() {
        let config = SearchConfig::default();
        assert_eq!(config.limit, 10);
    }

    #[test]
    fn test_search_filters_creation() {
        let filters = SearchFilters::new().with_node_labels(vec!["Entity".to_string()]);
        assert!(filters.node_labels.is_some());
    }
}
