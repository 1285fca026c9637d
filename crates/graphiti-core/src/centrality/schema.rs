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

//! Schema versioning for stored centrality metrics.
//!
//! Versions are compatible within the same major; crossing a major requires
//! an explicit [`SchemaMigration`]. New point releases only ever add metrics,
//! so `is_compatible` and `get_new_metrics` are enough to tell a reader
//! whether it needs to migrate before trusting a node's stored scores.

use std::collections::HashMap;
use std::fmt;

use crate::database::{GraphDatabase, NodeData, QueryParameter};
use crate::errors::GraphitiError;

/// A semantic schema version for stored centrality data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub const V1_0_0: SchemaVersion = SchemaVersion::new(1, 0, 0);
    pub const V1_1_0: SchemaVersion = SchemaVersion::new(1, 1, 0);
    pub const V2_0_0: SchemaVersion = SchemaVersion::new(2, 0, 0);
    pub const V2_1_0: SchemaVersion = SchemaVersion::new(2, 1, 0);
    pub const V2_2_0: SchemaVersion = SchemaVersion::new(2, 2, 0);

    pub const CURRENT: SchemaVersion = SchemaVersion::V2_2_0;

    pub fn from_str(version: &str) -> Result<Self, GraphitiError> {
        let parts: Vec<&str> = version.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(GraphitiError::ValueError(format!(
                "invalid schema version string: {version}"
            )));
        }
        let parse = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| GraphitiError::ValueError(format!("invalid schema version string: {version}")))
        };
        Ok(SchemaVersion::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }

    /// Same-major compatibility: a reader for `self` can understand data
    /// written at `other` without migrating as long as majors match.
    pub fn is_compatible(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The set of metric field names introduced at each schema version.
pub struct CentralitySchema;

impl CentralitySchema {
    pub fn get_schema(version: SchemaVersion) -> Vec<&'static str> {
        let mut fields = vec!["centrality_pagerank", "centrality_degree"];
        if version >= SchemaVersion::V1_1_0 {
            fields.push("centrality_in_degree");
            fields.push("centrality_out_degree");
        }
        if version >= SchemaVersion::V2_0_0 {
            fields.push("centrality_betweenness");
        }
        if version >= SchemaVersion::V2_1_0 {
            fields.push("centrality_importance");
        }
        if version >= SchemaVersion::V2_2_0 {
            fields.push("centrality_schema_version");
        }
        fields
    }

    /// Fields present at `CURRENT` but not yet present at `from_version`.
    pub fn get_new_metrics(from_version: SchemaVersion) -> Vec<&'static str> {
        let old: Vec<&str> = Self::get_schema(from_version);
        Self::get_schema(SchemaVersion::CURRENT)
            .into_iter()
            .filter(|f| !old.contains(f))
            .collect()
    }

    /// Fields present at `from_version` that `CURRENT` no longer defines.
    pub fn get_deprecated_metrics(from_version: SchemaVersion) -> Vec<&'static str> {
        let current: Vec<&str> = Self::get_schema(SchemaVersion::CURRENT);
        Self::get_schema(from_version)
            .into_iter()
            .filter(|f| !current.contains(f))
            .collect()
    }
}

/// A single major-version migration step for stored centrality node data.
pub trait SchemaMigration: Send + Sync {
    fn from_version(&self) -> SchemaVersion;
    fn to_version(&self) -> SchemaVersion;

    /// Rewrite one node's stored properties to satisfy `to_version`.
    fn migrate_node(
        &self,
        node_data: HashMap<String, QueryParameter>,
    ) -> HashMap<String, QueryParameter>;

    /// Best-effort check that a migrated node looks like `to_version` data.
    fn validate_migration(&self, node_data: &HashMap<String, QueryParameter>) -> bool {
        CentralitySchema::get_schema(self.to_version())
            .iter()
            .all(|field| node_data.contains_key(*field))
    }

    /// Hook run once before any node is migrated (e.g. create new indices).
    fn pre_migration(&self) {}

    /// Hook run once after every node has migrated.
    fn post_migration(&self) {}
}

/// Migrates 1.x centrality data (no betweenness/importance) to 2.0.0.
pub struct MigrateV1ToV2;

impl SchemaMigration for MigrateV1ToV2 {
    fn from_version(&self) -> SchemaVersion {
        SchemaVersion::V1_1_0
    }

    fn to_version(&self) -> SchemaVersion {
        SchemaVersion::V2_0_0
    }

    fn migrate_node(
        &self,
        mut node_data: HashMap<String, QueryParameter>,
    ) -> HashMap<String, QueryParameter> {
        node_data
            .entry("centrality_betweenness".to_string())
            .or_insert(QueryParameter::Float(0.0));
        node_data
    }
}

/// Runs `migration` over every node carrying centrality data, in batches,
/// calling the pre/post hooks once around the whole pass.
pub async fn migrate_all_nodes(
    database: &dyn GraphDatabase,
    migration: &dyn SchemaMigration,
    group_id: Option<&str>,
) -> Result<usize, GraphitiError> {
    migration.pre_migration();

    let mut props = HashMap::new();
    if let Some(group_id) = group_id {
        props.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));
    }
    let nodes: Vec<NodeData> = database.find_nodes(Some("Entity"), props).await?;

    let mut migrated = 0;
    for node in nodes {
        if !node
            .properties
            .contains_key(CentralitySchema::get_schema(migration.from_version())[0])
        {
            continue;
        }
        let updated = migration.migrate_node(node.properties);
        database.update_node(&node.id, updated).await?;
        migrated += 1;
    }

    migration.post_migration();
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_roundtrip() {
        let v = SchemaVersion::from_str("2.1.0").unwrap();
        assert_eq!(v, SchemaVersion::V2_1_0);
        assert_eq!(v.to_string(), "2.1.0");
    }

    #[test]
    fn test_from_str_rejects_malformed() {
        assert!(SchemaVersion::from_str("2.1").is_err());
        assert!(SchemaVersion::from_str("a.b.c").is_err());
    }

    #[test]
    fn test_is_compatible_same_major_only() {
        assert!(SchemaVersion::V2_0_0.is_compatible(&SchemaVersion::V2_2_0));
        assert!(!SchemaVersion::V1_0_0.is_compatible(&SchemaVersion::V2_0_0));
    }

    #[test]
    fn test_get_new_metrics_from_v1() {
        let new = CentralitySchema::get_new_metrics(SchemaVersion::V1_0_0);
        assert!(new.contains(&"centrality_betweenness"));
        assert!(new.contains(&"centrality_importance"));
    }

    #[test]
    fn test_migrate_v1_to_v2_adds_betweenness() {
        let migration = MigrateV1ToV2;
        let mut node = HashMap::new();
        node.insert("centrality_pagerank".to_string(), QueryParameter::Float(0.1));
        node.insert("centrality_in_degree".to_string(), QueryParameter::Integer(2));
        let migrated = migration.migrate_node(node);
        assert!(migrated.contains_key("centrality_betweenness"));
    }
}
