use anyhow::Result;
use graphiti_core::{
    embedder::openai::{OpenAiEmbedder, OpenAiEmbedderConfig},
    llm_client::{openai_client::OpenAiClient, config::LlmConfig},
    cross_encoder::openai_reranker_client::OpenAIRerankerClient,
    nodes::{BaseNode, EpisodeType, EpisodicNode, EntityNode, Node},
    edges::EntityEdge,
    search::{SearchConfig, SearchFilters, SearchResults},
    utils::maintenance::graph_data_operations,
    Graphiti, GraphitiConfig,
};
use std::sync::Arc;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::config::Settings;

/// Service layer that manages Graphiti instances and provides high-level operations
pub struct GraphitiService {
    graphiti: Graphiti,
}

impl GraphitiService {
    /// Create a new GraphitiService
    pub async fn new(settings: Settings) -> Result<Self> {
        let config = GraphitiConfig {
            database_config: graphiti_core::database::config::DatabaseConfig {
                database_type: graphiti_core::database::config::DatabaseType::Neo4j,
                uri: settings.neo4j_uri.clone(),
                username: Some(settings.neo4j_user.clone()),
                password: Some(settings.neo4j_password.clone()),
                database: None,
                pool_size: Some(10),
                timeout_seconds: Some(30),
                additional_config: std::collections::HashMap::new(),
            },
            store_raw_episode_content: true,
            cache_config: None,
        };

        // Create LLM client
        let llm_config = LlmConfig {
            api_key: Some(settings.openai_api_key.clone()),
            model: settings.model_name.clone(),
            base_url: settings.openai_base_url.clone(),
            temperature: 0.0,
            max_tokens: 8192,
            small_model: None,
        };
        let llm_client = Arc::new(OpenAiClient::new(llm_config, false)
            .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {:?}", e))?);

        // Create embedder
        let embedder_config = OpenAiEmbedderConfig {
            api_key: Some(settings.openai_api_key.clone()),
            embedding_model: settings.embedding_model_name.clone()
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            base_url: settings.openai_base_url.clone(),
            ..Default::default()
        };
        let embedder = Arc::new(OpenAiEmbedder::new(embedder_config)
            .map_err(|e| anyhow::anyhow!("Failed to create embedder: {:?}", e))?);

        // Create cross encoder (reranker)
        let cross_encoder = Arc::new(OpenAIRerankerClient::new(Default::default())
            .map_err(|e| anyhow::anyhow!("Failed to create cross encoder: {:?}", e))?);

        // Create Graphiti instance
        let graphiti = Graphiti::with_clients(config, llm_client, embedder, cross_encoder)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create Graphiti: {:?}", e))?;

        Ok(Self { graphiti })
    }

    /// Add an episode to the graph
    pub async fn add_episode(
        &self,
        name: String,
        content: String,
        source: EpisodeType,
        source_description: String,
        group_id: String,
        reference_time: Option<DateTime<Utc>>,
    ) -> Result<EpisodicNode> {
        let result = self.graphiti.add_episode(
            name,
            content,
            source,
            source_description,
            group_id,
            reference_time,
        ).await
        .map_err(|e| anyhow::anyhow!("Failed to add episode: {:?}", e))?;

        Ok(result.episode)
    }

    /// Search for relevant edges
    pub async fn search(
        &self,
        query: String,
        _group_ids: Option<Vec<String>>, // TODO: Implement group filtering when available in SearchFilters
        num_results: Option<usize>,
    ) -> Result<SearchResults> {
        let filters = SearchFilters::default();
        // TODO: Add group_ids filtering when the field is available
        // if let Some(groups) = group_ids {
        //     filters.group_ids = Some(groups);
        // }

        let mut config = SearchConfig::default();
        if let Some(limit) = num_results {
            config.limit = limit;
        }

        self.graphiti.search(&query, Some(config), Some(filters))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to search: {:?}", e))
    }

    /// Save an entity node directly, bypassing extraction (used by clients that
    /// have already resolved the entity and just want it persisted).
    pub async fn save_entity_node(
        &self,
        uuid: Uuid,
        group_id: String,
        name: String,
        summary: String,
    ) -> Result<EntityNode> {
        let mut node = EntityNode::new(name, group_id, summary);
        node.base = BaseNode {
            uuid: uuid.to_string(),
            ..node.base
        };

        node.save(self.graphiti.database().as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save entity node: {:?}", e))?;

        Ok(node)
    }

    /// Get an entity edge by UUID
    pub async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>> {
        let data = self
            .graphiti
            .database()
            .get_edge(&uuid.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get entity edge: {:?}", e))?;

        Ok(data.as_ref().map(graphiti_core::search::utils::edge_data_to_entity_edge))
    }

    /// Delete an entity edge
    pub async fn delete_entity_edge(&self, uuid: Uuid) -> Result<()> {
        self.graphiti
            .database()
            .delete_edge(&uuid.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete entity edge: {:?}", e))
    }

    /// Delete an entire group's nodes and edges
    pub async fn delete_group(&self, group_id: String) -> Result<()> {
        self.graphiti
            .database()
            .delete_by_group_id(&group_id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete group: {:?}", e))
    }

    /// Delete an episode
    pub async fn delete_episode(&self, uuid: Uuid) -> Result<()> {
        self.graphiti
            .database()
            .delete_node(&uuid.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete episode: {:?}", e))
    }

    /// Retrieve the most recent episodes for a set of groups
    pub async fn retrieve_episodes(
        &self,
        group_ids: Vec<String>,
        last_n: usize,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<EpisodicNode>> {
        graph_data_operations::retrieve_episodes(
            self.graphiti.database().as_ref(),
            reference_time,
            last_n,
            &group_ids,
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to retrieve episodes: {:?}", e))
    }

    /// Clear all data in the graph
    pub async fn clear_data(&self) -> Result<()> {
        self.graphiti
            .database()
            .clear_database()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to clear data: {:?}", e))
    }
}
