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

//! Atomic, checkpointed, resumable persistence of centrality scores.
//!
//! Scores are written in batches under a transaction record (itself a graph
//! node, label `CentralityTransaction`) that tracks state
//! (`pending -> in_progress -> committed`, or `-> failed -> rolled_back`) and
//! a periodic checkpoint so an interrupted run can resume from where it left
//! off instead of restarting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::algorithms::CentralityScores;
use crate::database::{GraphDatabase, QueryParameter};
use crate::errors::GraphitiError;

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 500;
const DEFAULT_BATCH_SIZE: usize = 100;
const MAX_BATCH_RETRIES: usize = 3;

/// Lifecycle state of a centrality storage transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageState {
    Pending,
    InProgress,
    Committed,
    RolledBack,
    Failed,
}

impl StorageState {
    fn as_str(&self) -> &'static str {
        match self {
            StorageState::Pending => "pending",
            StorageState::InProgress => "in_progress",
            StorageState::Committed => "committed",
            StorageState::RolledBack => "rolled_back",
            StorageState::Failed => "failed",
        }
    }
}

/// A checkpoint recorded partway through a batch run, sufficient to resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub processed: usize,
    pub timestamp: DateTime<Utc>,
    pub last_batch: usize,
}

/// Metadata for a single centrality storage run.
#[derive(Debug, Clone)]
pub struct StorageTransaction {
    pub id: String,
    pub group_id: Option<String>,
    pub state: StorageState,
    pub total_nodes: usize,
    pub created_at: DateTime<Utc>,
    pub checkpoint: Option<Checkpoint>,
}

/// Persists centrality scores under an atomic, checkpointed transaction.
pub struct AtomicCentralityStorage {
    database: Arc<dyn GraphDatabase + Send + Sync>,
    checkpoint_interval: usize,
}

impl AtomicCentralityStorage {
    pub fn new(database: Arc<dyn GraphDatabase + Send + Sync>) -> Self {
        Self {
            database,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    pub fn with_checkpoint_interval(mut self, checkpoint_interval: usize) -> Self {
        self.checkpoint_interval = checkpoint_interval;
        self
    }

    /// Store a full batch of centrality scores atomically: open a
    /// transaction record, write in batches with retry and periodic
    /// checkpointing, then commit. Any failure rolls the transaction back and
    /// marks it failed rather than leaving partially-written scores silently
    /// unaccounted for.
    pub async fn store_centrality_atomic(
        &self,
        scores: &HashMap<String, CentralityScores>,
        group_id: Option<&str>,
    ) -> Result<StorageTransaction, GraphitiError> {
        validate_scores(scores)?;

        let mut transaction = self.open_transaction(scores.len(), group_id).await?;
        self.transition(&mut transaction, StorageState::InProgress).await?;

        match self.process_batches(&mut transaction, scores).await {
            Ok(()) => {
                self.transition(&mut transaction, StorageState::Committed).await?;
                info!("centrality storage transaction {} committed", transaction.id);
                Ok(transaction)
            }
            Err(e) => {
                error!("centrality storage transaction {} failed: {:?}", transaction.id, e);
                self.transition(&mut transaction, StorageState::Failed).await.ok();
                self.rollback(&mut transaction).await?;
                Err(e)
            }
        }
    }

    /// Resume a previously interrupted transaction from its last checkpoint.
    pub async fn resume_transaction(
        &self,
        mut transaction: StorageTransaction,
        scores: &HashMap<String, CentralityScores>,
    ) -> Result<StorageTransaction, GraphitiError> {
        let processed = transaction.checkpoint.as_ref().map(|c| c.processed).unwrap_or(0);
        info!(
            "resuming centrality transaction {} from checkpoint at {} nodes",
            transaction.id, processed
        );

        let remaining: HashMap<String, CentralityScores> = scores
            .iter()
            .skip(processed)
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        match self.process_batches(&mut transaction, &remaining).await {
            Ok(()) => {
                self.transition(&mut transaction, StorageState::Committed).await?;
                Ok(transaction)
            }
            Err(e) => {
                self.transition(&mut transaction, StorageState::Failed).await.ok();
                self.rollback(&mut transaction).await?;
                Err(e)
            }
        }
    }

    async fn open_transaction(
        &self,
        total_nodes: usize,
        group_id: Option<&str>,
    ) -> Result<StorageTransaction, GraphitiError> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let mut properties = HashMap::new();
        properties.insert("tx_id".to_string(), QueryParameter::String(id.clone()));
        properties.insert(
            "state".to_string(),
            QueryParameter::String(StorageState::Pending.as_str().to_string()),
        );
        properties.insert(
            "total_nodes".to_string(),
            QueryParameter::Integer(total_nodes as i64),
        );
        properties.insert(
            "created_at".to_string(),
            QueryParameter::String(created_at.to_rfc3339()),
        );
        if let Some(group_id) = group_id {
            properties.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));
        }

        self.database
            .create_node(vec!["CentralityTransaction".to_string()], properties)
            .await?;

        Ok(StorageTransaction {
            id,
            group_id: group_id.map(str::to_string),
            state: StorageState::Pending,
            total_nodes,
            created_at,
            checkpoint: None,
        })
    }

    async fn transition(
        &self,
        transaction: &mut StorageTransaction,
        state: StorageState,
    ) -> Result<(), GraphitiError> {
        transaction.state = state;
        let mut properties = HashMap::new();
        properties.insert(
            "state".to_string(),
            QueryParameter::String(state.as_str().to_string()),
        );
        self.database.update_node(&transaction.id, properties).await?;
        Ok(())
    }

    async fn process_batches(
        &self,
        transaction: &mut StorageTransaction,
        scores: &HashMap<String, CentralityScores>,
    ) -> Result<(), GraphitiError> {
        let entries: Vec<(&String, &CentralityScores)> = scores.iter().collect();
        let mut processed = transaction.checkpoint.as_ref().map(|c| c.processed).unwrap_or(0);

        for (batch_index, batch) in entries.chunks(DEFAULT_BATCH_SIZE).enumerate() {
            self.store_batch_with_retry(batch).await?;
            processed += batch.len();

            if processed % self.checkpoint_interval == 0 || batch_index == entries.chunks(DEFAULT_BATCH_SIZE).count().saturating_sub(1) {
                self.create_checkpoint(transaction, processed, batch_index).await?;
            }
        }

        Ok(())
    }

    async fn store_batch_with_retry(
        &self,
        batch: &[(&String, &CentralityScores)],
    ) -> Result<(), GraphitiError> {
        let mut last_err = None;
        for attempt in 0..MAX_BATCH_RETRIES {
            match self.store_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("centrality batch store attempt {} failed: {:?}", attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("at least one attempt recorded an error"))
    }

    async fn store_batch(&self, batch: &[(&String, &CentralityScores)]) -> Result<(), GraphitiError> {
        for (node_id, scores) in batch {
            let mut properties = HashMap::new();
            properties.insert("centrality_pagerank".to_string(), QueryParameter::Float(scores.pagerank));
            properties.insert(
                "centrality_degree".to_string(),
                QueryParameter::Integer(scores.degree.total as i64),
            );
            properties.insert(
                "centrality_in_degree".to_string(),
                QueryParameter::Integer(scores.degree.in_degree as i64),
            );
            properties.insert(
                "centrality_out_degree".to_string(),
                QueryParameter::Integer(scores.degree.out_degree as i64),
            );
            properties.insert(
                "centrality_betweenness".to_string(),
                QueryParameter::Float(scores.betweenness),
            );
            properties.insert(
                "centrality_importance".to_string(),
                QueryParameter::Float(scores.importance),
            );
            self.database.update_node(node_id, properties).await?;
        }
        Ok(())
    }

    async fn create_checkpoint(
        &self,
        transaction: &mut StorageTransaction,
        processed: usize,
        last_batch: usize,
    ) -> Result<(), GraphitiError> {
        let checkpoint = Checkpoint {
            processed,
            timestamp: Utc::now(),
            last_batch,
        };

        let mut properties = HashMap::new();
        properties.insert(
            "checkpoint_processed".to_string(),
            QueryParameter::Integer(processed as i64),
        );
        properties.insert(
            "checkpoint_timestamp".to_string(),
            QueryParameter::String(checkpoint.timestamp.to_rfc3339()),
        );
        properties.insert(
            "checkpoint_last_batch".to_string(),
            QueryParameter::Integer(last_batch as i64),
        );
        self.database.update_node(&transaction.id, properties).await?;

        transaction.checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn rollback(&self, transaction: &mut StorageTransaction) -> Result<(), GraphitiError> {
        self.transition(transaction, StorageState::RolledBack).await
    }
}

fn validate_scores(scores: &HashMap<String, CentralityScores>) -> Result<(), GraphitiError> {
    for (node_id, score) in scores {
        if !score.pagerank.is_finite() || !score.betweenness.is_finite() || !score.importance.is_finite() {
            return Err(GraphitiError::Validation {
                message: format!("non-finite centrality score for node {node_id}"),
            });
        }
        if score.pagerank < 0.0 {
            return Err(GraphitiError::Validation {
                message: format!("negative pagerank for node {node_id}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(pagerank: f64) -> CentralityScores {
        CentralityScores {
            pagerank,
            degree: super::super::algorithms::DegreeScore::default(),
            betweenness: 0.0,
            importance: 0.0,
        }
    }

    #[test]
    fn test_validate_scores_rejects_negative_pagerank() {
        let mut scores = HashMap::new();
        scores.insert("n1".to_string(), score(-1.0));
        assert!(validate_scores(&scores).is_err());
    }

    #[test]
    fn test_validate_scores_rejects_non_finite() {
        let mut scores = HashMap::new();
        scores.insert("n1".to_string(), score(f64::NAN));
        assert!(validate_scores(&scores).is_err());
    }

    #[test]
    fn test_validate_scores_accepts_normal_values() {
        let mut scores = HashMap::new();
        scores.insert("n1".to_string(), score(0.1));
        assert!(validate_scores(&scores).is_ok());
    }

    #[test]
    fn test_storage_state_as_str() {
        assert_eq!(StorageState::InProgress.as_str(), "in_progress");
        assert_eq!(StorageState::RolledBack.as_str(), "rolled_back");
    }
}
