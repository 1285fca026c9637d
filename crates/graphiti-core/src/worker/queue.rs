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

//! Queue consumer contract and an in-memory implementation of it.
//!
//! Messages are opaque ingestion requests delivered at-least-once, with a
//! visibility timeout: a received message disappears from the visible set
//! until it is acked (processed) or its timeout elapses, at which point it
//! reappears for redelivery. A durable queue (SQS-style, Redis-backed, etc)
//! would satisfy the same [`IngestionQueue`] trait.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::GraphitiError;
use crate::nodes::EpisodeType;

/// The decoded payload of one queue message: everything `Graphiti::add_episode`
/// needs to run the ingestion pipeline (§4.1) for one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub group_id: String,
    pub episode_name: String,
    pub content: String,
    pub source: EpisodeType,
    pub source_description: String,
    pub reference_time: Option<DateTime<Utc>>,
}

/// A message handed to the worker by [`IngestionQueue::receive_batch`].
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub request: IngestionRequest,
    pub receive_count: u32,
}

/// Point-in-time counts for live metrics reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub visible: usize,
    pub invisible: usize,
}

/// Consumer-side contract a durable queue implementation must satisfy.
#[async_trait]
pub trait IngestionQueue: Send + Sync {
    /// Enqueue a new ingestion request.
    async fn send(&self, request: IngestionRequest) -> Result<String, GraphitiError>;

    /// Receive up to `max_messages`, each becoming invisible for
    /// `visibility_timeout` until acked, nacked, or the timeout elapses.
    async fn receive_batch(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, GraphitiError>;

    /// Acknowledge successful processing; the message is gone for good.
    async fn ack(&self, message_id: &str) -> Result<(), GraphitiError>;

    /// Negatively acknowledge a permanent failure; the message is dropped
    /// without redelivery, distinct from letting the visibility timeout
    /// expire (which redelivers for a transient failure).
    async fn nack(&self, message_id: &str) -> Result<(), GraphitiError>;

    /// Visible/invisible counts at this instant.
    async fn stats(&self) -> QueueStats;
}

struct Entry {
    id: String,
    request: IngestionRequest,
    receive_count: u32,
    visible_at: Option<DateTime<Utc>>,
}

struct InMemoryQueueState {
    visible: VecDeque<Entry>,
    invisible: HashMap<String, Entry>,
}

/// A process-local, in-memory [`IngestionQueue`] suitable for tests and for
/// the server binary's background ingestion. Visibility timeouts are
/// evaluated lazily on each `receive_batch` call rather than via a
/// background timer.
pub struct InMemoryQueue {
    state: Mutex<InMemoryQueueState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryQueueState {
                visible: VecDeque::new(),
                invisible: HashMap::new(),
            }),
        }
    }

    fn requeue_expired(state: &mut InMemoryQueueState, now: DateTime<Utc>) {
        let expired: Vec<String> = state
            .invisible
            .iter()
            .filter(|(_, entry)| entry.visible_at.map(|t| t <= now).unwrap_or(false))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(mut entry) = state.invisible.remove(&id) {
                entry.visible_at = None;
                state.visible.push_back(entry);
            }
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionQueue for InMemoryQueue {
    async fn send(&self, request: IngestionRequest) -> Result<String, GraphitiError> {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().expect("in-memory queue mutex poisoned");
        state.visible.push_back(Entry {
            id: id.clone(),
            request,
            receive_count: 0,
            visible_at: None,
        });
        Ok(id)
    }

    async fn receive_batch(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, GraphitiError> {
        let now = Utc::now();
        let mut state = self.state.lock().expect("in-memory queue mutex poisoned");
        Self::requeue_expired(&mut state, now);

        let mut received = Vec::new();
        while received.len() < max_messages {
            let Some(mut entry) = state.visible.pop_front() else {
                break;
            };
            entry.receive_count += 1;
            entry.visible_at = Some(now + chrono::Duration::from_std(visibility_timeout).unwrap_or_default());

            received.push(QueueMessage {
                id: entry.id.clone(),
                request: entry.request.clone(),
                receive_count: entry.receive_count,
            });
            state.invisible.insert(entry.id.clone(), entry);
        }

        Ok(received)
    }

    async fn ack(&self, message_id: &str) -> Result<(), GraphitiError> {
        let mut state = self.state.lock().expect("in-memory queue mutex poisoned");
        state.invisible.remove(message_id);
        Ok(())
    }

    async fn nack(&self, message_id: &str) -> Result<(), GraphitiError> {
        let mut state = self.state.lock().expect("in-memory queue mutex poisoned");
        state.invisible.remove(message_id);
        Ok(())
    }

    async fn stats(&self) -> QueueStats {
        let state = self.state.lock().expect("in-memory queue mutex poisoned");
        QueueStats {
            visible: state.visible.len(),
            invisible: state.invisible.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> IngestionRequest {
        IngestionRequest {
            group_id: "g".to_string(),
            episode_name: "ep".to_string(),
            content: "content".to_string(),
            source: EpisodeType::Text,
            source_description: "test".to_string(),
            reference_time: None,
        }
    }

    #[tokio::test]
    async fn test_send_then_receive() {
        let queue = InMemoryQueue::new();
        queue.send(request()).await.unwrap();

        let messages = queue.receive_batch(10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].receive_count, 1);

        let stats = queue.stats().await;
        assert_eq!(stats.visible, 0);
        assert_eq!(stats.invisible, 1);
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let queue = InMemoryQueue::new();
        queue.send(request()).await.unwrap();
        let messages = queue.receive_batch(10, Duration::from_secs(30)).await.unwrap();

        queue.ack(&messages[0].id).await.unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.visible, 0);
        assert_eq!(stats.invisible, 0);
    }

    #[tokio::test]
    async fn test_expired_visibility_timeout_redelivers() {
        let queue = InMemoryQueue::new();
        queue.send(request()).await.unwrap();

        let first = queue.receive_batch(10, Duration::from_millis(0)).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = queue.receive_batch(10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_nack_drops_without_redelivery() {
        let queue = InMemoryQueue::new();
        queue.send(request()).await.unwrap();
        let messages = queue.receive_batch(10, Duration::from_secs(30)).await.unwrap();

        queue.nack(&messages[0].id).await.unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.visible, 0);
        assert_eq!(stats.invisible, 0);
    }

    #[tokio::test]
    async fn test_receive_batch_caps_at_max_messages() {
        let queue = InMemoryQueue::new();
        for _ in 0..5 {
            queue.send(request()).await.unwrap();
        }

        let messages = queue.receive_batch(2, Duration::from_secs(30)).await.unwrap();
        assert_eq!(messages.len(), 2);
        let stats = queue.stats().await;
        assert_eq!(stats.visible, 3);
    }
}
