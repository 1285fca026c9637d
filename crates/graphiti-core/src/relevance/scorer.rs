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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use super::models::{MemoryFeedback, RelevanceScore, ScoringConfig};
use crate::database::{GraphDatabase, QueryParameter};
use crate::errors::GraphitiError;
use crate::llm_client::{LlmClient, Message};

/// Context needed to score a single memory's relevance to a query.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub original_query: String,
    pub decomposed_query: Option<String>,
    pub memory_content: String,
    pub memory_id: String,
    pub agent_response: Option<String>,
    pub query_id: Option<String>,
}

impl ScoringContext {
    pub fn new(original_query: impl Into<String>, memory_content: impl Into<String>, memory_id: impl Into<String>) -> Self {
        Self {
            original_query: original_query.into(),
            decomposed_query: None,
            memory_content: memory_content.into(),
            memory_id: memory_id.into(),
            agent_response: None,
            query_id: None,
        }
    }
}

/// Which algorithm(s) to use when scoring a memory's relevance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMethod {
    Llm,
    Heuristic,
    Hybrid,
}

impl ScoringMethod {
    fn as_str(&self) -> &'static str {
        match self {
            ScoringMethod::Llm => "llm",
            ScoringMethod::Heuristic => "heuristic",
            ScoringMethod::Hybrid => "hybrid",
        }
    }
}

/// Handles relevance scoring, decay, and feedback persistence for memories.
pub struct RelevanceScorer {
    database: Arc<dyn GraphDatabase + Send + Sync>,
    llm_client: Option<Arc<dyn LlmClient + Send + Sync>>,
    config: ScoringConfig,
}

impl RelevanceScorer {
    pub fn new(
        database: Arc<dyn GraphDatabase + Send + Sync>,
        llm_client: Option<Arc<dyn LlmClient + Send + Sync>>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            database,
            llm_client,
            config,
        }
    }

    /// Score a memory's relevance using an LLM judge. Degrades silently to a
    /// neutral 0.5 on any failure rather than propagating the error.
    pub async fn score_memory_llm(&self, context: &ScoringContext) -> f64 {
        let Some(llm_client) = &self.llm_client else {
            return 0.5;
        };

        let prompt = Self::build_scoring_prompt(context);
        let messages = vec![
            Message::system(
                "You are a relevance scoring system. Score how relevant a memory is to a \
                 query on a scale of 0 to 1.",
            ),
            Message::user(prompt),
        ];

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "relevance_score": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Relevance score between 0 and 1"
                },
                "reasoning": {
                    "type": "string",
                    "description": "Brief explanation of the score"
                }
            },
            "required": ["relevance_score"]
        });

        let response = llm_client
            .generate_response(
                &messages,
                Some(&schema.to_string()),
                None,
                crate::llm_client::ModelSize::Small,
            )
            .await;

        match response {
            Ok(result) => {
                let score = result
                    .get("relevance_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.5);
                debug!(
                    "LLM scored memory {}: {} - {}",
                    context.memory_id,
                    score,
                    result
                        .get("reasoning")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                );
                score.clamp(0.0, 1.0)
            }
            Err(e) => {
                error!("Error in LLM scoring: {:?}", e);
                0.5
            }
        }
    }

    fn build_scoring_prompt(context: &ScoringContext) -> String {
        let mut parts = vec![
            format!("Original Query: {}", context.original_query),
            format!("\nMemory Content: {}", context.memory_content),
        ];

        if let Some(decomposed) = &context.decomposed_query {
            parts.push(format!("\nDecomposed Query: {}", decomposed));
        }
        if let Some(response) = &context.agent_response {
            parts.push(format!("\nAgent Response: {}", response));
        }

        parts.push(
            "\n\nBased on the above information, rate how relevant this memory is to \
             answering the original query.\nConsider:\n- Direct relevance to the query topic\n\
             - Usefulness of the information provided\n- Whether the memory was likely used in \
             the response\n\nReturn a relevance score between 0 (completely irrelevant) and 1 \
             (highly relevant)."
                .to_string(),
        );

        parts.join("\n")
    }

    /// Score a memory's relevance via Jaccard word overlap between the query
    /// and memory content, scaled into `[0.3, 0.7]`, with a bonus if the
    /// memory appears verbatim in the agent's response.
    pub fn score_memory_heuristic(&self, context: &ScoringContext) -> f64 {
        let query_words: HashSet<String> = context
            .original_query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let memory_words: HashSet<String> = context
            .memory_content
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut score = 0.5;
        let union_len = query_words.union(&memory_words).count();
        if union_len > 0 {
            let intersection_len = query_words.intersection(&memory_words).count();
            let jaccard = intersection_len as f64 / union_len as f64;
            score = 0.3 + 0.4 * jaccard;
        }

        if let Some(response) = &context.agent_response {
            let prefix: String = context.memory_content.chars().take(50).collect();
            if !prefix.is_empty() && response.contains(&prefix) {
                score = (score + 0.2).min(1.0);
            }
        }

        debug!("Heuristic scored memory {}: {}", context.memory_id, score);
        score
    }

    /// Score a memory using the requested method, returning a [`RelevanceScore`].
    pub async fn score_memory(&self, context: &ScoringContext, method: ScoringMethod) -> RelevanceScore {
        let score_value = match method {
            ScoringMethod::Llm if self.config.enable_llm_scoring => {
                self.score_memory_llm(context).await
            }
            ScoringMethod::Heuristic if self.config.enable_heuristic_scoring => {
                self.score_memory_heuristic(context)
            }
            ScoringMethod::Hybrid => {
                let mut scores = Vec::new();
                if self.config.enable_llm_scoring && self.llm_client.is_some() {
                    scores.push(self.score_memory_llm(context).await);
                }
                if self.config.enable_heuristic_scoring {
                    scores.push(self.score_memory_heuristic(context));
                }
                if scores.is_empty() {
                    0.5
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                }
            }
            _ => 0.5,
        };

        let mut metadata = HashMap::new();
        metadata.insert(
            "original_query".to_string(),
            Value::String(context.original_query.clone()),
        );
        metadata.insert(
            "has_response".to_string(),
            Value::Bool(context.agent_response.is_some()),
        );

        let mut score = RelevanceScore::new(context.memory_id.clone(), score_value, method.as_str())
            .with_metadata(metadata);
        if let Some(query_id) = &context.query_id {
            score = score.with_query_id(query_id.clone());
        }
        score
    }

    /// Combine Reciprocal Rank Fusion across multiple named rankings of
    /// memory ids, returning `(memory_id, fused_score)` sorted descending.
    pub fn apply_reciprocal_rank_fusion(
        &self,
        rankings: &HashMap<String, Vec<String>>,
        k: Option<i64>,
    ) -> Vec<(String, f64)> {
        let k = k.unwrap_or(self.config.rrf_k) as f64;
        let mut rrf_scores: HashMap<String, f64> = HashMap::new();

        for ranked_ids in rankings.values() {
            for (rank, memory_id) in ranked_ids.iter().enumerate() {
                let entry = rrf_scores.entry(memory_id.clone()).or_insert(0.0);
                *entry += 1.0 / (k + (rank as f64 + 1.0));
            }
        }

        let mut results: Vec<(String, f64)> = rrf_scores.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    /// Combine multiple score sources using the configured weights,
    /// renormalized over whichever sources are present. Returns a neutral
    /// 0.5 if none are present.
    pub fn combine_scores(
        &self,
        semantic_score: Option<f64>,
        keyword_score: Option<f64>,
        graph_score: Option<f64>,
        historical_score: Option<f64>,
    ) -> f64 {
        let mut scores = Vec::new();
        let mut weights = Vec::new();

        if let Some(s) = semantic_score {
            scores.push(s);
            weights.push(self.config.semantic_weight);
        }
        if let Some(s) = keyword_score {
            scores.push(s);
            weights.push(self.config.keyword_weight);
        }
        if let Some(s) = graph_score {
            scores.push(s);
            weights.push(self.config.graph_weight);
        }
        if let Some(s) = historical_score {
            scores.push(s);
            weights.push(self.config.historical_weight);
        }

        if scores.is_empty() {
            return 0.5;
        }

        let total_weight: f64 = weights.iter().sum();
        let normalized_weights: Vec<f64> = if total_weight > 0.0 {
            weights.iter().map(|w| w / total_weight).collect()
        } else {
            vec![1.0 / scores.len() as f64; scores.len()]
        };

        let combined: f64 = scores
            .iter()
            .zip(normalized_weights.iter())
            .map(|(s, w)| s * w)
            .sum();

        combined.clamp(0.0, 1.0)
    }

    /// Record a new score against a memory's feedback, applying decay and
    /// persisting the result as properties on that memory's graph node.
    pub async fn update_memory_feedback(
        &self,
        memory_id: &str,
        score: RelevanceScore,
    ) -> Result<MemoryFeedback, GraphitiError> {
        let mut feedback = self
            .load_feedback(memory_id)
            .await?
            .unwrap_or_else(|| MemoryFeedback::new(memory_id));

        feedback.add_score(score);
        feedback.record_access();

        if self.config.enable_decay {
            feedback.apply_decay(self.config.half_life_days);
        }

        self.save_feedback(&feedback).await?;
        Ok(feedback)
    }

    async fn load_feedback(&self, memory_id: &str) -> Result<Option<MemoryFeedback>, GraphitiError> {
        let node = self
            .database
            .get_node(memory_id)
            .await
            .map_err(GraphitiError::DatabaseLayer)?;

        let Some(node) = node else {
            return Ok(None);
        };

        let avg_relevance = match node.properties.get("avg_relevance") {
            Some(QueryParameter::Float(f)) => *f,
            Some(QueryParameter::Integer(i)) => *i as f64,
            _ => return Ok(None),
        };

        let relevance_scores = match node.properties.get("relevance_scores") {
            Some(QueryParameter::String(s)) => {
                serde_json::from_str::<Vec<RelevanceScore>>(s).unwrap_or_default()
            }
            _ => Vec::new(),
        };

        let usage_count = match node.properties.get("usage_count") {
            Some(QueryParameter::Integer(i)) => *i as u64,
            _ => 0,
        };
        let successful_uses = match node.properties.get("successful_uses") {
            Some(QueryParameter::Integer(i)) => *i as u64,
            _ => 0,
        };
        let decay_factor = match node.properties.get("decay_factor") {
            Some(QueryParameter::Float(f)) => *f,
            _ => 1.0,
        };
        let last_accessed = match node.properties.get("last_accessed") {
            Some(QueryParameter::String(s)) => {
                crate::utils::datetime_utils::parse_from_db(s).ok()
            }
            _ => None,
        };
        let last_scored = match node.properties.get("last_scored") {
            Some(QueryParameter::String(s)) => {
                crate::utils::datetime_utils::parse_from_db(s).ok()
            }
            _ => None,
        };
        let query_embeddings = match node.properties.get("query_embeddings") {
            Some(QueryParameter::String(s)) => {
                serde_json::from_str::<Vec<Vec<f64>>>(s).unwrap_or_default()
            }
            _ => Vec::new(),
        };

        Ok(Some(MemoryFeedback {
            memory_id: memory_id.to_string(),
            relevance_scores,
            avg_relevance,
            usage_count,
            successful_uses,
            last_accessed,
            last_scored,
            decay_factor,
            query_embeddings,
        }))
    }

    async fn save_feedback(&self, feedback: &MemoryFeedback) -> Result<(), GraphitiError> {
        let scores_json = serde_json::to_string(&feedback.relevance_scores)
            .map_err(GraphitiError::Serialization)?;
        let embeddings_json = serde_json::to_string(&feedback.query_embeddings)
            .map_err(GraphitiError::Serialization)?;

        let mut properties: HashMap<String, QueryParameter> = HashMap::new();
        properties.insert(
            "relevance_scores".to_string(),
            QueryParameter::String(scores_json),
        );
        properties.insert(
            "avg_relevance".to_string(),
            QueryParameter::Float(feedback.avg_relevance),
        );
        properties.insert(
            "usage_count".to_string(),
            QueryParameter::Integer(feedback.usage_count as i64),
        );
        properties.insert(
            "successful_uses".to_string(),
            QueryParameter::Integer(feedback.successful_uses as i64),
        );
        properties.insert(
            "last_accessed".to_string(),
            match feedback.last_accessed {
                Some(dt) => QueryParameter::String(crate::utils::datetime_utils::format_for_db(dt)),
                None => QueryParameter::Null,
            },
        );
        properties.insert(
            "last_scored".to_string(),
            match feedback.last_scored {
                Some(dt) => QueryParameter::String(crate::utils::datetime_utils::format_for_db(dt)),
                None => QueryParameter::Null,
            },
        );
        properties.insert(
            "decay_factor".to_string(),
            QueryParameter::Float(feedback.decay_factor),
        );
        properties.insert(
            "query_embeddings".to_string(),
            QueryParameter::String(embeddings_json),
        );

        self.database
            .update_node(&feedback.memory_id, properties)
            .await
            .map_err(GraphitiError::DatabaseLayer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::types::DatabaseResult;
    use crate::database::{EdgeData, QueryResult, Transaction};
    use async_trait::async_trait;

    /// No-op database used where test logic never touches persistence.
    #[derive(Debug)]
    struct NullDatabase;

    #[async_trait]
    impl GraphDatabase for NullDatabase {
        async fn execute(&self, _query: &str, _parameters: HashMap<String, QueryParameter>) -> DatabaseResult<QueryResult> {
            unimplemented!("not exercised by relevance scorer unit tests")
        }
        async fn begin_transaction(&self) -> DatabaseResult<Box<dyn Transaction>> {
            unimplemented!()
        }
        async fn close(&self) -> DatabaseResult<()> {
            Ok(())
        }
        async fn health_check(&self) -> DatabaseResult<bool> {
            Ok(true)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        async fn create_node(&self, _labels: Vec<String>, _properties: HashMap<String, QueryParameter>) -> DatabaseResult<String> {
            unimplemented!()
        }
        async fn get_node(&self, _id: &str) -> DatabaseResult<Option<crate::database::NodeData>> {
            Ok(None)
        }
        async fn update_node(&self, _id: &str, _properties: HashMap<String, QueryParameter>) -> DatabaseResult<()> {
            Ok(())
        }
        async fn delete_node(&self, _id: &str) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn find_nodes(&self, _label: Option<&str>, _properties: HashMap<String, QueryParameter>) -> DatabaseResult<Vec<crate::database::NodeData>> {
            unimplemented!()
        }
        async fn create_edge(&self, _source_id: &str, _target_id: &str, _edge_type: &str, _properties: HashMap<String, QueryParameter>) -> DatabaseResult<String> {
            unimplemented!()
        }
        async fn get_edge(&self, _id: &str) -> DatabaseResult<Option<EdgeData>> {
            unimplemented!()
        }
        async fn update_edge(&self, _id: &str, _properties: HashMap<String, QueryParameter>) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn delete_edge(&self, _id: &str) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn find_edges(&self, _source_id: Option<&str>, _target_id: Option<&str>, _edge_type: Option<&str>) -> DatabaseResult<Vec<EdgeData>> {
            unimplemented!()
        }
        async fn clear_database(&self) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn delete_by_group_id(&self, _group_id: &str) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn create_index(&self, _label: &str, _property: &str) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn create_constraint(&self, _label: &str, _property: &str, _constraint_type: &str) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn build_indices_and_constraints(&self) -> DatabaseResult<()> {
            unimplemented!()
        }
        async fn fulltext_search(&self, _query: &str, _labels: Vec<String>) -> DatabaseResult<Vec<crate::database::NodeData>> {
            unimplemented!()
        }
        async fn vector_search(&self, _embedding: Vec<f64>, _label: &str, _top_k: usize) -> DatabaseResult<Vec<(crate::database::NodeData, f64)>> {
            unimplemented!()
        }
    }

    fn test_scorer() -> RelevanceScorer {
        RelevanceScorer::new(Arc::new(NullDatabase), None, ScoringConfig::default())
    }

    #[test]
    fn test_heuristic_scoring_scales_jaccard_into_expected_range() {
        let scorer = test_scorer();
        let context = ScoringContext::new("rust memory graph", "rust memory graph database", "n1");
        let score = scorer.score_memory_heuristic(&context);
        assert!((0.3..=0.7).contains(&score));
    }

    #[test]
    fn test_heuristic_scoring_boosts_on_response_match() {
        let scorer = test_scorer();
        let mut context = ScoringContext::new("q", "the quick brown fox jumps over", "n1");
        context.agent_response = Some("the quick brown fox jumps over the lazy dog".to_string());
        let score = scorer.score_memory_heuristic(&context);
        assert!(score > 0.5);
    }

    #[test]
    fn test_apply_reciprocal_rank_fusion_favors_top_ranked_across_sources() {
        let scorer = test_scorer();
        let mut rankings = HashMap::new();
        rankings.insert(
            "semantic".to_string(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        );
        rankings.insert(
            "keyword".to_string(),
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
        );
        let fused = scorer.apply_reciprocal_rank_fusion(&rankings, Some(60));
        assert!(fused[0].0 == "a" || fused[0].0 == "b");
    }

    #[test]
    fn test_combine_scores_neutral_when_empty() {
        let scorer = test_scorer();
        assert_eq!(scorer.combine_scores(None, None, None, None), 0.5);
    }

    #[test]
    fn test_combine_scores_weighted_average() {
        let scorer = test_scorer();
        let combined = scorer.combine_scores(Some(1.0), Some(0.0), None, None);
        let expected = 0.4 / (0.4 + 0.3);
        assert!((combined - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_update_memory_feedback_persists_first_score() {
        let scorer = test_scorer();
        let score = RelevanceScore::new("n1", 0.8, "manual");
        let feedback = scorer.update_memory_feedback("n1", score).await.unwrap();
        assert_eq!(feedback.avg_relevance, 0.8);
        assert_eq!(feedback.usage_count, 1);
    }
}
