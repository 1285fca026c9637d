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

//! Queue-backed ingestion worker: consumes episodes from an
//! [`IngestionQueue`], dispatches each to [`Graphiti::add_episode`] under a
//! bounded-concurrency semaphore, and reports live metrics.

pub mod metrics;
pub mod queue;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tracing::{error, warn};

pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use queue::{IngestionQueue, IngestionRequest, InMemoryQueue, QueueMessage, QueueStats};

use crate::graphiti::Graphiti;
use crate::helpers::semaphore_gather;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BATCH_SIZE: usize = 10;
/// A message redelivered this many times is treated as a permanent failure
/// and nacked rather than left to time out again.
const MAX_RECEIVE_COUNT: u32 = 5;

/// Tunables for [`IngestionWorker::run_once`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Width of the semaphore bounding concurrent pipeline invocations.
    pub semaphore_limit: usize,
    /// When true, two episodes with the same group id never run concurrently.
    pub per_group_serialization: bool,
    pub visibility_timeout: Duration,
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            semaphore_limit: crate::helpers::semaphore_limit(),
            per_group_serialization: false,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

type GroupLock = Arc<tokio::sync::Mutex<()>>;

/// Drives one or more ingestion batches to completion against a [`Graphiti`]
/// instance, honoring the worker's concurrency and serialization policy.
pub struct IngestionWorker {
    graphiti: Arc<Graphiti>,
    queue: Arc<dyn IngestionQueue>,
    config: WorkerConfig,
    group_locks: StdMutex<HashMap<String, GroupLock>>,
    metrics: Arc<WorkerMetrics>,
}

impl IngestionWorker {
    pub fn new(graphiti: Arc<Graphiti>, queue: Arc<dyn IngestionQueue>, config: WorkerConfig) -> Self {
        Self {
            graphiti,
            queue,
            config,
            group_locks: StdMutex::new(HashMap::new()),
            metrics: Arc::new(WorkerMetrics::new()),
        }
    }

    /// Receive one batch and drive every message to completion (success,
    /// permanent failure, or left for visibility-timeout redelivery),
    /// bounded by the configured semaphore width. Returns the number of
    /// messages successfully processed.
    pub async fn run_once(&self) -> Result<usize, crate::errors::GraphitiError> {
        let messages = self
            .queue
            .receive_batch(self.config.batch_size, self.config.visibility_timeout)
            .await?;

        if messages.is_empty() {
            return Ok(0);
        }

        let futures: Vec<_> = messages.into_iter().map(|m| self.process_message(m)).collect();
        let results = semaphore_gather(futures, Some(self.config.semaphore_limit)).await;

        Ok(results.into_iter().filter(|succeeded| *succeeded).count())
    }

    /// Run [`run_once`] in a loop until the queue reports nothing visible or
    /// invisible, i.e. until the backlog is drained.
    pub async fn drain(&self) -> Result<usize, crate::errors::GraphitiError> {
        let mut total = 0;
        loop {
            let processed = self.run_once().await?;
            total += processed;

            let stats = self.queue.stats().await;
            if stats.visible == 0 && stats.invisible == 0 {
                break;
            }
            if processed == 0 {
                break;
            }
        }
        Ok(total)
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        let stats = self.queue.stats().await;
        self.metrics.snapshot(stats)
    }

    async fn process_message(&self, message: QueueMessage) -> bool {
        let _group_guard = if self.config.per_group_serialization {
            Some(self.group_lock(&message.request.group_id).lock_owned().await)
        } else {
            None
        };

        let request = message.request.clone();
        let result = self
            .graphiti
            .add_episode(
                request.episode_name,
                request.content,
                request.source,
                request.source_description,
                request.group_id,
                request.reference_time,
            )
            .await;

        match result {
            Ok(_) => {
                self.metrics.record_success();
                if let Err(e) = self.queue.ack(&message.id).await {
                    warn!("failed to ack message {}: {:?}", message.id, e);
                }
                true
            }
            Err(e) => {
                self.metrics.record_failure();
                if message.receive_count >= MAX_RECEIVE_COUNT {
                    error!(
                        "episode ingestion permanently failed for message {} after {} attempts: {:?}",
                        message.id, message.receive_count, e
                    );
                    if let Err(nack_err) = self.queue.nack(&message.id).await {
                        warn!("failed to nack message {}: {:?}", message.id, nack_err);
                    }
                } else {
                    warn!(
                        "episode ingestion failed for message {} (attempt {}), leaving for redelivery: {:?}",
                        message.id, message.receive_count, e
                    );
                }
                false
            }
        }
    }

    fn group_lock(&self, group_id: &str) -> GroupLock {
        let mut locks = self.group_locks.lock().expect("group lock map poisoned");
        locks
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default_matches_semaphore_limit() {
        std::env::remove_var("SEMAPHORE_LIMIT");
        let config = WorkerConfig::default();
        assert_eq!(config.semaphore_limit, 10);
        assert!(!config.per_group_serialization);
    }
}
