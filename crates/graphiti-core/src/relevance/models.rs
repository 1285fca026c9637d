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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::datetime_utils::utc_now;

/// Individual relevance score for a memory/node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub memory_id: String,
    pub score: f64,
    pub query_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub scoring_method: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RelevanceScore {
    pub fn new(memory_id: impl Into<String>, score: f64, scoring_method: impl Into<String>) -> Self {
        Self {
            memory_id: memory_id.into(),
            score: score.clamp(0.0, 1.0),
            query_id: None,
            timestamp: utc_now(),
            scoring_method: scoring_method.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Comprehensive feedback data for a memory/node, persisted as properties
/// on the same graph node the memory already lives on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFeedback {
    pub memory_id: String,
    #[serde(default)]
    pub relevance_scores: Vec<RelevanceScore>,
    #[serde(default)]
    pub avg_relevance: f64,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub successful_uses: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_scored: Option<DateTime<Utc>>,
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    #[serde(default)]
    pub query_embeddings: Vec<Vec<f64>>,
}

fn default_decay_factor() -> f64 {
    1.0
}

/// Weight applied to a freshly-observed score against the running average.
const EMA_ALPHA: f64 = 0.3;
/// Natural log of 2, used by the exponential half-life decay formula.
const LN_2: f64 = std::f64::consts::LN_2;
/// Relevance scores kept per node; oldest observations roll off.
const MAX_RETAINED_SCORES: usize = 100;
/// Query embeddings kept per node; oldest observations roll off.
const MAX_RETAINED_EMBEDDINGS: usize = 50;

impl MemoryFeedback {
    pub fn new(memory_id: impl Into<String>) -> Self {
        Self {
            memory_id: memory_id.into(),
            relevance_scores: Vec::new(),
            avg_relevance: 0.0,
            usage_count: 0,
            successful_uses: 0,
            last_accessed: None,
            last_scored: None,
            decay_factor: 1.0,
            query_embeddings: Vec::new(),
        }
    }

    /// Record a new score and fold it into the exponential moving average.
    pub fn add_score(&mut self, score: RelevanceScore) {
        self.last_scored = Some(score.timestamp);

        if self.relevance_scores.is_empty() && self.avg_relevance == 0.0 {
            self.avg_relevance = score.score;
        } else {
            self.avg_relevance = EMA_ALPHA * score.score + (1.0 - EMA_ALPHA) * self.avg_relevance;
        }

        self.relevance_scores.push(score);
        if self.relevance_scores.len() > MAX_RETAINED_SCORES {
            let excess = self.relevance_scores.len() - MAX_RETAINED_SCORES;
            self.relevance_scores.drain(0..excess);
        }
    }

    /// Apply time-based exponential decay since `last_accessed`.
    pub fn apply_decay(&mut self, half_life_days: f64) {
        let Some(last_accessed) = self.last_accessed else {
            return;
        };

        let delta_days = (utc_now() - last_accessed).num_seconds() as f64 / 86400.0;
        self.decay_factor = (-LN_2 * delta_days / half_life_days).exp();
    }

    /// The average relevance score after applying decay.
    pub fn effective_score(&self) -> f64 {
        self.avg_relevance * self.decay_factor
    }

    pub fn record_access(&mut self) {
        self.last_accessed = Some(utc_now());
        self.usage_count += 1;
    }

    pub fn retain_recent_embeddings(&mut self) {
        if self.query_embeddings.len() > MAX_RETAINED_EMBEDDINGS {
            let excess = self.query_embeddings.len() - MAX_RETAINED_EMBEDDINGS;
            self.query_embeddings.drain(0..excess);
        }
    }
}

/// Configuration for the relevance scoring system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub enable_llm_scoring: bool,
    pub enable_heuristic_scoring: bool,
    pub enable_decay: bool,
    pub half_life_days: f64,
    pub min_relevance_threshold: f64,
    pub high_relevance_threshold: f64,
    pub cache_high_relevance: bool,
    pub cache_size: usize,
    pub cache_ttl_seconds: u64,
    pub batch_size: usize,
    pub async_scoring: bool,
    pub rrf_k: i64,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub graph_weight: f64,
    pub historical_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enable_llm_scoring: true,
            enable_heuristic_scoring: true,
            enable_decay: true,
            half_life_days: 30.0,
            min_relevance_threshold: 0.3,
            high_relevance_threshold: 0.7,
            cache_high_relevance: true,
            cache_size: 1000,
            cache_ttl_seconds: 3600,
            batch_size: 10,
            async_scoring: true,
            rrf_k: 60,
            semantic_weight: 0.4,
            keyword_weight: 0.3,
            graph_weight: 0.2,
            historical_weight: 0.1,
        }
    }
}

/// Request to submit relevance feedback for a set of memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceFeedbackRequest {
    pub query_id: String,
    pub query_text: Option<String>,
    pub memory_scores: HashMap<String, f64>,
    pub response_text: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Method used for a bulk relevance recalculation pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecalculationMethod {
    Llm,
    Heuristic,
    Hybrid,
}

/// Request to bulk-recalculate relevance scores for a set of memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRecalculateRequest {
    pub memory_ids: Option<Vec<String>>,
    pub group_id: Option<String>,
    #[serde(default = "default_recalculation_method")]
    pub recalculation_method: RecalculationMethod,
    #[serde(default)]
    pub force: bool,
}

fn default_recalculation_method() -> RecalculationMethod {
    RecalculationMethod::Hybrid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_score_sets_average_directly_on_first_score() {
        let mut feedback = MemoryFeedback::new("node-1");
        feedback.add_score(RelevanceScore::new("node-1", 0.8, "manual"));
        assert_eq!(feedback.avg_relevance, 0.8);
    }

    #[test]
    fn test_add_score_applies_ema_on_subsequent_scores() {
        let mut feedback = MemoryFeedback::new("node-1");
        feedback.add_score(RelevanceScore::new("node-1", 0.8, "manual"));
        feedback.add_score(RelevanceScore::new("node-1", 0.2, "manual"));
        let expected = 0.3 * 0.2 + 0.7 * 0.8;
        assert!((feedback.avg_relevance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_effective_score_multiplies_by_decay() {
        let mut feedback = MemoryFeedback::new("node-1");
        feedback.avg_relevance = 0.8;
        feedback.decay_factor = 0.5;
        assert_eq!(feedback.effective_score(), 0.4);
    }

    #[test]
    fn test_apply_decay_noop_without_last_accessed() {
        let mut feedback = MemoryFeedback::new("node-1");
        feedback.apply_decay(30.0);
        assert_eq!(feedback.decay_factor, 1.0);
    }

    #[test]
    fn test_scoring_config_defaults() {
        let config = ScoringConfig::default();
        assert_eq!(config.rrf_k, 60);
        assert_eq!(config.semantic_weight, 0.4);
    }
}
