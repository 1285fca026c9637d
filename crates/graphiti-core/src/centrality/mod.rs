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

//! Graph centrality: PageRank, degree, and betweenness, combined into a
//! composite importance score, atomically persisted with checkpointing, and
//! versioned across schema migrations. Computation can delegate to an
//! external Rust-native compute service and falls back to the in-process
//! algorithms on delegation failure.

pub mod algorithms;
pub mod rust_client;
pub mod schema;
pub mod storage;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

pub use algorithms::{CentralityScores, DegreeScore, Direction};
pub use rust_client::{should_use_rust_centrality, RustCentralityClient};
pub use schema::{CentralitySchema, SchemaMigration, SchemaVersion};
pub use storage::{AtomicCentralityStorage, StorageState, StorageTransaction};

use crate::database::GraphDatabase;
use crate::errors::GraphitiError;

/// Entry point for centrality computation: tries delegation to an external
/// compute service first when enabled, falls back to the in-process
/// algorithms otherwise, and optionally persists results atomically.
pub struct CentralityEngine {
    database: Arc<dyn GraphDatabase + Send + Sync>,
}

impl CentralityEngine {
    pub fn new(database: Arc<dyn GraphDatabase + Send + Sync>) -> Self {
        Self { database }
    }

    pub async fn calculate_pagerank(
        &self,
        damping_factor: f64,
        iterations: usize,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, f64>, GraphitiError> {
        if should_use_rust_centrality() {
            match self.delegate_pagerank(damping_factor, iterations, group_id).await {
                Ok(scores) => return Ok(scores),
                Err(e) => warn!("rust centrality delegation failed for pagerank, falling back: {:?}", e),
            }
        }
        algorithms::calculate_pagerank(self.database.as_ref(), damping_factor, iterations, group_id).await
    }

    pub async fn calculate_degree_centrality(
        &self,
        direction: Direction,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, DegreeScore>, GraphitiError> {
        if should_use_rust_centrality() {
            let direction_str = match direction {
                Direction::In => "in",
                Direction::Out => "out",
                Direction::Both => "both",
            };
            match self.delegate_degree(direction_str, group_id).await {
                Ok(scores) => return Ok(scores),
                Err(e) => warn!("rust centrality delegation failed for degree, falling back: {:?}", e),
            }
        }
        algorithms::calculate_degree_centrality(self.database.as_ref(), direction, group_id).await
    }

    pub async fn calculate_betweenness_centrality(
        &self,
        sample_size: Option<usize>,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, f64>, GraphitiError> {
        if should_use_rust_centrality() {
            match self.delegate_betweenness(sample_size, group_id).await {
                Ok(scores) => return Ok(scores),
                Err(e) => warn!("rust centrality delegation failed for betweenness, falling back: {:?}", e),
            }
        }
        algorithms::calculate_betweenness_centrality(self.database.as_ref(), sample_size, group_id).await
    }

    /// Calculate pagerank, degree, and betweenness together, fold them into
    /// a composite importance score, and optionally persist them atomically.
    pub async fn calculate_all_centralities(
        &self,
        group_id: Option<&str>,
        store_results: bool,
    ) -> Result<HashMap<String, CentralityScores>, GraphitiError> {
        let scores = if should_use_rust_centrality() {
            match self.delegate_all(group_id, false).await {
                Ok(scores) => scores,
                Err(e) => {
                    warn!("rust centrality delegation failed for full run, falling back: {:?}", e);
                    algorithms::calculate_all_centralities(self.database.as_ref(), group_id).await?
                }
            }
        } else {
            algorithms::calculate_all_centralities(self.database.as_ref(), group_id).await?
        };

        if store_results {
            let storage = AtomicCentralityStorage::new(self.database.clone());
            storage.store_centrality_atomic(&scores, group_id).await?;
        }

        Ok(scores)
    }

    /// These delegate helpers construct a fresh [`RustCentralityClient`] per
    /// call since it is a thin HTTP wrapper with no state worth pooling.
    async fn delegate_pagerank(
        &self,
        damping_factor: f64,
        iterations: usize,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, f64>, GraphitiError> {
        RustCentralityClient::new(None)?
            .calculate_pagerank(damping_factor, iterations, group_id)
            .await
    }

    async fn delegate_degree(
        &self,
        direction: &str,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, DegreeScore>, GraphitiError> {
        RustCentralityClient::new(None)?
            .calculate_degree_centrality(direction, group_id)
            .await
    }

    async fn delegate_betweenness(
        &self,
        sample_size: Option<usize>,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, f64>, GraphitiError> {
        RustCentralityClient::new(None)?
            .calculate_betweenness_centrality(sample_size, group_id)
            .await
    }

    async fn delegate_all(
        &self,
        group_id: Option<&str>,
        store_results: bool,
    ) -> Result<HashMap<String, CentralityScores>, GraphitiError> {
        RustCentralityClient::new(None)?
            .calculate_all_centralities(group_id, store_results)
            .await
    }
}
