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

//! Bulk node/edge writes against the [`GraphDatabase`] abstraction.
//!
//! Each public method chunks its input into `batch_size`-sized groups and
//! issues one write per item within a batch. The batching boundary is what
//! matters for resumability and partial-failure semantics (a failed batch
//! doesn't roll back earlier batches); it does not assume the underlying
//! driver exposes a multi-row `UNWIND` primitive.

use crate::{
    database::QueryParameter,
    edges::{Edge, EntityEdge},
    errors::GraphitiError,
    nodes::{EntityNode, Node},
    types::GraphitiClients,
};
use std::collections::HashMap;

/// Batch size for bulk operations
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Bulk operations for efficient batch processing
pub struct BulkOperations {
    clients: GraphitiClients,
    batch_size: usize,
}

impl BulkOperations {
    pub fn new(clients: GraphitiClients) -> Self {
        Self {
            clients,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Bulk create nodes
    pub async fn create_nodes(&self, nodes: Vec<EntityNode>) -> Result<(), GraphitiError> {
        if nodes.is_empty() {
            return Ok(());
        }

        for batch in nodes.chunks(self.batch_size) {
            self.create_nodes_batch(batch).await?;
        }

        Ok(())
    }

    async fn create_nodes_batch(&self, nodes: &[EntityNode]) -> Result<(), GraphitiError> {
        for node in nodes {
            node.save(self.clients.database.as_ref()).await?;
        }
        Ok(())
    }

    /// Bulk create edges
    pub async fn create_edges(&self, edges: Vec<EntityEdge>) -> Result<(), GraphitiError> {
        if edges.is_empty() {
            return Ok(());
        }

        for batch in edges.chunks(self.batch_size) {
            self.create_edges_batch(batch).await?;
        }

        Ok(())
    }

    async fn create_edges_batch(&self, edges: &[EntityEdge]) -> Result<(), GraphitiError> {
        for edge in edges {
            edge.save(self.clients.database.as_ref()).await?;
        }
        Ok(())
    }

    /// Bulk update node properties
    pub async fn update_nodes(
        &self,
        updates: HashMap<String, HashMap<String, serde_json::Value>>,
    ) -> Result<(), GraphitiError> {
        if updates.is_empty() {
            return Ok(());
        }

        let update_vec: Vec<_> = updates.into_iter().collect();
        for batch in update_vec.chunks(self.batch_size) {
            self.update_nodes_batch(batch).await?;
        }

        Ok(())
    }

    async fn update_nodes_batch(
        &self,
        updates: &[(String, HashMap<String, serde_json::Value>)],
    ) -> Result<(), GraphitiError> {
        for (uuid, properties) in updates {
            let params: HashMap<String, QueryParameter> = properties
                .iter()
                .map(|(k, v)| (k.clone(), json_to_query_parameter(v)))
                .collect();
            self.clients
                .database
                .update_node(uuid, params)
                .await
                .map_err(GraphitiError::DatabaseLayer)?;
        }
        Ok(())
    }

    /// Bulk delete nodes by UUIDs
    pub async fn delete_nodes(&self, uuids: Vec<String>) -> Result<usize, GraphitiError> {
        if uuids.is_empty() {
            return Ok(0);
        }

        let mut total_deleted = 0;
        for batch in uuids.chunks(self.batch_size) {
            total_deleted += self.delete_nodes_batch(batch).await?;
        }

        Ok(total_deleted)
    }

    async fn delete_nodes_batch(&self, uuids: &[String]) -> Result<usize, GraphitiError> {
        for uuid in uuids {
            self.clients
                .database
                .delete_node(uuid)
                .await
                .map_err(GraphitiError::DatabaseLayer)?;
        }
        Ok(uuids.len())
    }

    /// Bulk delete edges by UUIDs
    pub async fn delete_edges(&self, uuids: Vec<String>) -> Result<usize, GraphitiError> {
        if uuids.is_empty() {
            return Ok(0);
        }

        let mut total_deleted = 0;
        for batch in uuids.chunks(self.batch_size) {
            total_deleted += self.delete_edges_batch(batch).await?;
        }

        Ok(total_deleted)
    }

    async fn delete_edges_batch(&self, uuids: &[String]) -> Result<usize, GraphitiError> {
        for uuid in uuids {
            self.clients
                .database
                .delete_edge(uuid)
                .await
                .map_err(GraphitiError::DatabaseLayer)?;
        }
        Ok(uuids.len())
    }
}

fn json_to_query_parameter(value: &serde_json::Value) -> QueryParameter {
    match value {
        serde_json::Value::Null => QueryParameter::Null,
        serde_json::Value::Bool(b) => QueryParameter::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                QueryParameter::Integer(i)
            } else {
                QueryParameter::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => QueryParameter::String(s.clone()),
        serde_json::Value::Array(items) => {
            QueryParameter::List(items.iter().map(json_to_query_parameter).collect())
        }
        serde_json::Value::Object(map) => QueryParameter::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_query_parameter(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_operations_constants() {
        assert_eq!(DEFAULT_BATCH_SIZE, 100);
    }

    #[test]
    fn test_json_to_query_parameter_scalars() {
        assert!(matches!(
            json_to_query_parameter(&serde_json::json!(null)),
            QueryParameter::Null
        ));
        assert!(matches!(
            json_to_query_parameter(&serde_json::json!(true)),
            QueryParameter::Boolean(true)
        ));
        assert!(matches!(
            json_to_query_parameter(&serde_json::json!(42)),
            QueryParameter::Integer(42)
        ));
        assert!(matches!(
            json_to_query_parameter(&serde_json::json!("hi")),
            QueryParameter::String(ref s) if s == "hi"
        ));
    }
}
