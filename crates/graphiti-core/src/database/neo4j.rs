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

//! Neo4j database implementation

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use neo4rs::{Graph, ConfigBuilder, BoltType, BoltMap, BoltList, Node, Relation, Txn};
use uuid::Uuid;

use super::traits::{GraphDatabase, Transaction, QueryResult, QueryParameter, NodeData, EdgeData};
use super::config::DatabaseConfig;
use super::types::{DatabaseResult, DatabaseError};

/// Neo4j database implementation
#[derive(Debug)]
pub struct Neo4jDatabase {
    graph: Arc<Graph>,
}

/// Neo4j transaction wrapper
pub struct Neo4jTransaction {
    txn: Txn,
}

impl Neo4jDatabase {
    /// Create a new Neo4j database connection
    pub async fn new(config: DatabaseConfig) -> DatabaseResult<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(&config.uri);

        if let Some(username) = &config.username {
            builder = builder.user(username);
        }

        if let Some(password) = &config.password {
            builder = builder.password(password);
        }

        if let Some(database) = &config.database {
            builder = builder.db(database);
        }

        let graph = Graph::connect(builder.build()?).await?;

        Ok(Self {
            graph: Arc::new(graph),
        })
    }

    /// Get the underlying Neo4j Graph for backward compatibility
    /// This should be temporary until all code is migrated to use the database abstraction
    pub fn get_graph(&self) -> &Graph {
        &self.graph
    }

    /// Convert QueryParameter to BoltType for Neo4j
    fn param_to_bolt(param: &QueryParameter) -> DatabaseResult<BoltType> {
        match param {
            QueryParameter::String(s) => Ok(BoltType::String(neo4rs::BoltString::new(s))),
            QueryParameter::Integer(i) => Ok(BoltType::Integer(neo4rs::BoltInteger::new(*i))),
            QueryParameter::Float(f) => Ok(BoltType::Float(neo4rs::BoltFloat::new(*f))),
            QueryParameter::Boolean(b) => Ok(BoltType::Boolean(neo4rs::BoltBoolean::new(*b))),
            QueryParameter::Null => Ok(BoltType::Null(neo4rs::BoltNull)),
            QueryParameter::List(list) => {
                let mut bolt_list = BoltList::new();
                for item in list {
                    bolt_list.push(Self::param_to_bolt(item)?);
                }
                Ok(BoltType::List(bolt_list))
            }
            QueryParameter::Map(map) => {
                let mut bolt_map = BoltMap::new();
                for (key, value) in map {
                    bolt_map.put(neo4rs::BoltString::new(key), Self::param_to_bolt(value)?);
                }
                Ok(BoltType::Map(bolt_map))
            }
        }
    }

    /// Convert BoltType to QueryParameter
    fn bolt_to_param(bolt: &BoltType) -> DatabaseResult<QueryParameter> {
        match bolt {
            BoltType::String(s) => Ok(QueryParameter::String(s.value().to_string())),
            BoltType::Integer(i) => Ok(QueryParameter::Integer(i.value())),
            BoltType::Float(f) => Ok(QueryParameter::Float(f.value())),
            BoltType::Boolean(b) => Ok(QueryParameter::Boolean(b.value())),
            BoltType::Null(_) => Ok(QueryParameter::Null),
            BoltType::List(list) => {
                let mut result = Vec::new();
                for item in list.value() {
                    result.push(Self::bolt_to_param(item)?);
                }
                Ok(QueryParameter::List(result))
            }
            BoltType::Map(map) => {
                let mut result = HashMap::new();
                for (key, value) in map.value() {
                    if let BoltType::String(key_str) = key {
                        result.insert(key_str.value().to_string(), Self::bolt_to_param(value)?);
                    }
                }
                Ok(QueryParameter::Map(result))
            }
            _ => Ok(QueryParameter::String(format!("{:?}", bolt))),
        }
    }

    /// Convert Neo4j Node to NodeData
    fn node_to_data(node: &Node) -> DatabaseResult<NodeData> {
        let mut properties = HashMap::new();
        for (key, value) in node.props() {
            properties.insert(key.clone(), Self::bolt_to_param(value)?);
        }

        Ok(NodeData {
            id: node.id().to_string(),
            labels: node.labels().to_vec(),
            properties,
        })
    }

    /// Convert Neo4j Relation to EdgeData
    fn relation_to_data(rel: &Relation) -> DatabaseResult<EdgeData> {
        let mut properties = HashMap::new();
        for (key, value) in rel.props() {
            properties.insert(key.clone(), Self::bolt_to_param(value)?);
        }

        Ok(EdgeData {
            id: rel.id().to_string(),
            relationship_type: rel.typ().to_string(),
            source_id: rel.start_node_id().to_string(),
            target_id: rel.end_node_id().to_string(),
            properties,
        })
    }

    /// Pull a node's `summary_embedding` property out as an f32 vector, if present.
    fn node_embedding(node: &NodeData) -> Option<Vec<f32>> {
        match node.properties.get("summary_embedding")? {
            QueryParameter::List(items) => Some(
                items
                    .iter()
                    .filter_map(|v| match v {
                        QueryParameter::Float(f) => Some(*f as f32),
                        QueryParameter::Integer(i) => Some(*i as f32),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Calculate cosine similarity between two vectors.
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            (dot_product / (norm_a * norm_b)) as f64
        }
    }

    /// Build a `neo4rs::Query` from a Cypher string and bound parameters.
    fn build_query(query: &str, parameters: HashMap<String, QueryParameter>) -> DatabaseResult<neo4rs::Query> {
        let mut q = neo4rs::query(query);
        for (key, value) in parameters {
            q = q.param(&key, Self::param_to_bolt(&value)?);
        }
        Ok(q)
    }

    /// Run an arbitrary query and report only whether any row came back.
    ///
    /// `GraphDatabase::execute` exists for ad hoc/diagnostic queries (e.g.
    /// `health_check`'s `RETURN 1`); every CRUD path below runs its own
    /// typed query against `self.graph` instead, since mapping an arbitrary
    /// `RETURN` clause back to [`QueryParameter`]s generically would need
    /// knowing each column's shape ahead of time.
    async fn execute_query(&self, query: &str, parameters: HashMap<String, QueryParameter>) -> DatabaseResult<QueryResult> {
        let q = Self::build_query(query, parameters)?;
        let mut stream = self.graph.execute(q).await?;

        let mut rows = Vec::new();
        while stream.next().await?.is_some() {
            rows.push(HashMap::new());
        }

        Ok(QueryResult { columns: Vec::new(), rows })
    }

    /// Run a query whose single bound column is a node, returning the first match.
    async fn fetch_one_node(&self, query: &str, params: HashMap<String, QueryParameter>, column: &str) -> DatabaseResult<Option<NodeData>> {
        let q = Self::build_query(query, params)?;
        let mut stream = self.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            if let Ok(node) = row.get::<Node>(column) {
                return Ok(Some(Self::node_to_data(&node)?));
            }
        }
        Ok(None)
    }

    /// Run a query whose single bound column is a node per row, returning all matches.
    async fn fetch_nodes(&self, query: &str, params: HashMap<String, QueryParameter>, column: &str) -> DatabaseResult<Vec<NodeData>> {
        let q = Self::build_query(query, params)?;
        let mut stream = self.graph.execute(q).await?;
        let mut nodes = Vec::new();
        while let Some(row) = stream.next().await? {
            if let Ok(node) = row.get::<Node>(column) {
                nodes.push(Self::node_to_data(&node)?);
            }
        }
        Ok(nodes)
    }

    /// Run a query whose single bound column is a relationship, returning the first match.
    async fn fetch_one_edge(&self, query: &str, params: HashMap<String, QueryParameter>, column: &str) -> DatabaseResult<Option<EdgeData>> {
        let q = Self::build_query(query, params)?;
        let mut stream = self.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            if let Ok(rel) = row.get::<Relation>(column) {
                return Ok(Some(Self::relation_to_data(&rel)?));
            }
        }
        Ok(None)
    }

    /// Run a query whose single bound column is a relationship per row, returning all matches.
    async fn fetch_edges(&self, query: &str, params: HashMap<String, QueryParameter>, column: &str) -> DatabaseResult<Vec<EdgeData>> {
        let q = Self::build_query(query, params)?;
        let mut stream = self.graph.execute(q).await?;
        let mut edges = Vec::new();
        while let Some(row) = stream.next().await? {
            if let Ok(rel) = row.get::<Relation>(column) {
                edges.push(Self::relation_to_data(&rel)?);
            }
        }
        Ok(edges)
    }
}

#[async_trait]
impl GraphDatabase for Neo4jDatabase {
    async fn execute(&self, query: &str, parameters: HashMap<String, QueryParameter>) -> DatabaseResult<QueryResult> {
        self.execute_query(query, parameters).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn begin_transaction(&self) -> DatabaseResult<Box<dyn Transaction>> {
        let txn = self.graph.start_txn().await?;
        Ok(Box::new(Neo4jTransaction { txn }))
    }

    async fn close(&self) -> DatabaseResult<()> {
        // Neo4j graph is automatically cleaned up when dropped
        Ok(())
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute("RETURN 1 as health", HashMap::new()).await?;
        Ok(!result.rows.is_empty())
    }

    async fn create_node(&self, labels: Vec<String>, properties: HashMap<String, QueryParameter>) -> DatabaseResult<String> {
        let uuid = Uuid::new_v4().to_string();
        let labels_str = labels.join(":");
        let query = format!("CREATE (n:{}) SET n.uuid = $uuid SET n += $props RETURN n.uuid as id", labels_str);

        let mut params = HashMap::new();
        params.insert("uuid".to_string(), QueryParameter::String(uuid.clone()));
        params.insert("props".to_string(), QueryParameter::Map(properties));

        self.execute(&query, params).await?;
        Ok(uuid)
    }

    async fn get_node(&self, id: &str) -> DatabaseResult<Option<NodeData>> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), QueryParameter::String(id.to_string()));

        self.fetch_one_node("MATCH (n {uuid: $id}) RETURN n", params, "n").await
    }

    async fn update_node(&self, id: &str, properties: HashMap<String, QueryParameter>) -> DatabaseResult<()> {
        let query = "MATCH (n {uuid: $id}) SET n += $props";
        let mut params = HashMap::new();
        params.insert("id".to_string(), QueryParameter::String(id.to_string()));
        params.insert("props".to_string(), QueryParameter::Map(properties));

        self.execute(query, params).await?;
        Ok(())
    }

    async fn delete_node(&self, id: &str) -> DatabaseResult<()> {
        let query = "MATCH (n {uuid: $id}) DETACH DELETE n";
        let mut params = HashMap::new();
        params.insert("id".to_string(), QueryParameter::String(id.to_string()));

        self.execute(query, params).await?;
        Ok(())
    }

    async fn find_nodes(&self, label: Option<&str>, properties: HashMap<String, QueryParameter>) -> DatabaseResult<Vec<NodeData>> {
        let label_part = if let Some(l) = label {
            format!(":{}", l)
        } else {
            String::new()
        };

        let query = format!("MATCH (n{}) WHERE all(key in keys($props) WHERE n[key] = $props[key]) RETURN n", label_part);
        let mut params = HashMap::new();
        params.insert("props".to_string(), QueryParameter::Map(properties));

        self.fetch_nodes(&query, params, "n").await
    }

    async fn create_edge(&self, source_id: &str, target_id: &str, edge_type: &str, properties: HashMap<String, QueryParameter>) -> DatabaseResult<String> {
        let uuid = Uuid::new_v4().to_string();
        let query = format!(
            "MATCH (a {{uuid: $source_id}}), (b {{uuid: $target_id}}) CREATE (a)-[r:{} {{uuid: $uuid}}]->(b) SET r += $props RETURN r.uuid as id",
            edge_type
        );

        let mut params = HashMap::new();
        params.insert("source_id".to_string(), QueryParameter::String(source_id.to_string()));
        params.insert("target_id".to_string(), QueryParameter::String(target_id.to_string()));
        params.insert("uuid".to_string(), QueryParameter::String(uuid.clone()));
        params.insert("props".to_string(), QueryParameter::Map(properties));

        self.execute(&query, params).await?;
        Ok(uuid)
    }

    async fn get_edge(&self, id: &str) -> DatabaseResult<Option<EdgeData>> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), QueryParameter::String(id.to_string()));

        self.fetch_one_edge("MATCH ()-[r {uuid: $id}]->() RETURN r", params, "r").await
    }

    async fn update_edge(&self, id: &str, properties: HashMap<String, QueryParameter>) -> DatabaseResult<()> {
        let query = "MATCH ()-[r {uuid: $id}]->() SET r += $props";
        let mut params = HashMap::new();
        params.insert("id".to_string(), QueryParameter::String(id.to_string()));
        params.insert("props".to_string(), QueryParameter::Map(properties));

        self.execute(query, params).await?;
        Ok(())
    }

    async fn delete_edge(&self, id: &str) -> DatabaseResult<()> {
        let query = "MATCH ()-[r {uuid: $id}]->() DELETE r";
        let mut params = HashMap::new();
        params.insert("id".to_string(), QueryParameter::String(id.to_string()));

        self.execute(query, params).await?;
        Ok(())
    }

    async fn find_edges(&self, source_id: Option<&str>, target_id: Option<&str>, edge_type: Option<&str>) -> DatabaseResult<Vec<EdgeData>> {
        let source_part = if source_id.is_some() { "{uuid: $source_id}" } else { "" };
        let target_part = if target_id.is_some() { "{uuid: $target_id}" } else { "" };
        let type_part = edge_type.map(|t| format!(":{}", t)).unwrap_or_default();

        let query = format!(
            "MATCH (a{})-[r{}]->(b{}) RETURN r",
            source_part, type_part, target_part
        );

        let mut params = HashMap::new();
        if let Some(id) = source_id {
            params.insert("source_id".to_string(), QueryParameter::String(id.to_string()));
        }
        if let Some(id) = target_id {
            params.insert("target_id".to_string(), QueryParameter::String(id.to_string()));
        }

        self.fetch_edges(&query, params, "r").await
    }

    async fn clear_database(&self) -> DatabaseResult<()> {
        let query = "MATCH (n) DETACH DELETE n";
        self.execute(query, HashMap::new()).await?;
        Ok(())
    }

    async fn delete_by_group_id(&self, group_id: &str) -> DatabaseResult<()> {
        let query = "MATCH (n {group_id: $group_id}) DETACH DELETE n";
        let mut params = HashMap::new();
        params.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));

        self.execute(query, params).await?;
        Ok(())
    }

    async fn create_index(&self, label: &str, property: &str) -> DatabaseResult<()> {
        let query = format!("CREATE INDEX IF NOT EXISTS FOR (n:{}) ON (n.{})", label, property);
        self.execute(&query, HashMap::new()).await?;
        Ok(())
    }

    async fn create_constraint(&self, label: &str, property: &str, constraint_type: &str) -> DatabaseResult<()> {
        let query = match constraint_type {
            "UNIQUE" => format!("CREATE CONSTRAINT IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE", label, property),
            _ => return Err(DatabaseError::UnsupportedOperation(format!("Constraint type: {}", constraint_type))),
        };
        self.execute(&query, HashMap::new()).await?;
        Ok(())
    }

    async fn build_indices_and_constraints(&self) -> DatabaseResult<()> {
        // Create standard Graphiti indices and constraints
        self.create_constraint("Entity", "uuid", "UNIQUE").await?;
        self.create_constraint("Episodic", "uuid", "UNIQUE").await?;
        self.create_constraint("Community", "uuid", "UNIQUE").await?;

        self.create_index("Entity", "name").await?;
        self.create_index("Entity", "group_id").await?;
        self.create_index("Episodic", "name").await?;
        self.create_index("Episodic", "group_id").await?;
        self.create_index("Community", "name").await?;
        self.create_index("Community", "group_id").await?;

        Ok(())
    }

    async fn fulltext_search(&self, query: &str, labels: Vec<String>) -> DatabaseResult<Vec<NodeData>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let label_part = if labels.is_empty() {
            String::new()
        } else {
            format!(":{}", labels.join("|"))
        };

        let cypher = format!(
            "MATCH (n{}) WHERE any(key in keys(n) WHERE toLower(toString(n[key])) CONTAINS toLower($query)) RETURN n",
            label_part
        );

        let mut params = HashMap::new();
        params.insert("query".to_string(), QueryParameter::String(query.to_string()));

        self.fetch_nodes(&cypher, params, "n").await
    }

    async fn vector_search(&self, embedding: Vec<f64>, label: &str, top_k: usize) -> DatabaseResult<Vec<(NodeData, f64)>> {
        if embedding.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.find_nodes(Some(label), HashMap::new()).await?;
        let query_vec: Vec<f32> = embedding.iter().map(|&v| v as f32).collect();

        let mut scored: Vec<(NodeData, f64)> = candidates
            .into_iter()
            .filter_map(|node| {
                let candidate_vec = Self::node_embedding(&node)?;
                let score = Self::cosine_similarity(&query_vec, &candidate_vec);
                Some((node, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[async_trait]
impl Transaction for Neo4jTransaction {
    async fn execute(&mut self, query: &str, parameters: HashMap<String, QueryParameter>) -> DatabaseResult<QueryResult> {
        let q = Neo4jDatabase::build_query(query, parameters)?;
        self.txn.run(q).await?;
        Ok(QueryResult { columns: Vec::new(), rows: Vec::new() })
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}
