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

//! Graph data operations for maintenance

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::{
    database::{GraphDatabase, QueryParameter},
    errors::GraphitiError,
    nodes::EpisodicNode,
    search::utils::node_data_to_episodic_node,
};

/// Episode window length for retrieving context
pub const EPISODE_WINDOW_LEN: usize = 10;

/// Retrieve the last `last_n` episodes at or before `reference_time`, scoped
/// to `group_ids`, ordered most-recent-first.
pub async fn retrieve_episodes(
    database: &dyn GraphDatabase,
    reference_time: DateTime<Utc>,
    last_n: usize,
    group_ids: &[String],
) -> Result<Vec<EpisodicNode>, GraphitiError> {
    let mut episodes = Vec::new();

    for group_id in group_ids {
        let mut props = HashMap::new();
        props.insert("group_id".to_string(), QueryParameter::String(group_id.clone()));

        let candidates = database.find_nodes(Some("Episodic"), props).await?;
        episodes.extend(
            candidates
                .iter()
                .map(node_data_to_episodic_node)
                .filter(|e| e.valid_at <= reference_time),
        );
    }

    episodes.sort_by(|a, b| b.valid_at.cmp(&a.valid_at));
    episodes.truncate(last_n);
    episodes.reverse();

    Ok(episodes)
}

/// Get episode context for processing
pub async fn get_episode_context(
    database: &dyn GraphDatabase,
    episode: &EpisodicNode,
    window_size: usize,
) -> Result<Vec<EpisodicNode>, GraphitiError> {
    let mut context = retrieve_episodes(
        database,
        episode.valid_at,
        window_size,
        &[episode.base.group_id.clone()],
    )
    .await?;
    context.retain(|e| e.base.uuid != episode.base.uuid);
    Ok(context)
}

/// Clean up episodes expired (by `valid_at`) before `cutoff_time`, optionally
/// scoped to a single group.
pub async fn cleanup_expired_episodes(
    database: &dyn GraphDatabase,
    cutoff_time: DateTime<Utc>,
    group_id: Option<&str>,
) -> Result<usize, GraphitiError> {
    let mut props = HashMap::new();
    if let Some(group_id) = group_id {
        props.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));
    }

    let candidates = database.find_nodes(Some("Episodic"), props).await?;
    let expired: Vec<_> = candidates
        .iter()
        .map(node_data_to_episodic_node)
        .filter(|e| e.valid_at < cutoff_time)
        .collect();

    for episode in &expired {
        database.delete_node(&episode.base.uuid).await?;
    }

    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_window_len_constant() {
        assert_eq!(EPISODE_WINDOW_LEN, 10);
    }
}
