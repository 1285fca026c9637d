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

//! HTTP client for delegating centrality computation to an external
//! Rust-native compute service, with the same contract as the in-process
//! path in [`super::algorithms`]. Controlled by the `USE_RUST_CENTRALITY`
//! and `RUST_CENTRALITY_URL` environment variables.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::algorithms::{CentralityScores, DegreeScore};
use crate::errors::GraphitiError;

const DEFAULT_BASE_URL: &str = "http://localhost:3001";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Returns true when delegation to the external service is enabled via
/// `USE_RUST_CENTRALITY` (any of "1", "true", "yes", case-insensitive).
pub fn should_use_rust_centrality() -> bool {
    std::env::var("USE_RUST_CENTRALITY")
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
struct PagerankRequest<'a> {
    group_id: Option<&'a str>,
    damping_factor: f64,
    iterations: usize,
}

#[derive(Debug, Serialize)]
struct DegreeRequest<'a> {
    group_id: Option<&'a str>,
    direction: &'a str,
}

#[derive(Debug, Serialize)]
struct BetweennessRequest<'a> {
    group_id: Option<&'a str>,
    sample_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AllCentralitiesRequest<'a> {
    group_id: Option<&'a str>,
    store_results: bool,
}

#[derive(Debug, Deserialize)]
struct ScoresResponse {
    scores: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct DegreeResponse {
    scores: HashMap<String, RemoteDegreeScore>,
}

#[derive(Debug, Deserialize)]
struct RemoteDegreeScore {
    total: usize,
    #[serde(rename = "in")]
    in_degree: usize,
    #[serde(rename = "out")]
    out_degree: usize,
}

#[derive(Debug, Deserialize)]
struct AllCentralitiesResponse {
    scores: HashMap<String, RemoteCentralityScores>,
}

#[derive(Debug, Deserialize)]
struct RemoteCentralityScores {
    pagerank: f64,
    degree: RemoteDegreeScore,
    betweenness: f64,
    importance: f64,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: HashMap<String, serde_json::Value>,
}

/// Thin client for the external Rust centrality compute service.
pub struct RustCentralityClient {
    http_client: Client,
    base_url: String,
}

impl RustCentralityClient {
    pub fn new(base_url: Option<String>) -> Result<Self, GraphitiError> {
        let base_url = base_url
            .or_else(|| std::env::var("RUST_CENTRALITY_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GraphitiError::ExternalService(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http_client, base_url })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, GraphitiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http_client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GraphitiError::ExternalService(format!(
                "rust centrality service returned {status}: {text}"
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| GraphitiError::ExternalService(format!("invalid response body: {e}")))
    }

    pub async fn calculate_pagerank(
        &self,
        damping_factor: f64,
        iterations: usize,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, f64>, GraphitiError> {
        let body = PagerankRequest {
            group_id,
            damping_factor,
            iterations,
        };
        let response: ScoresResponse = self.post_json("/centrality/pagerank", &body).await?;
        Ok(response.scores)
    }

    pub async fn calculate_degree_centrality(
        &self,
        direction: &str,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, DegreeScore>, GraphitiError> {
        let body = DegreeRequest { group_id, direction };
        let response: DegreeResponse = self.post_json("/centrality/degree", &body).await?;
        Ok(response
            .scores
            .into_iter()
            .map(|(id, s)| {
                (
                    id,
                    DegreeScore {
                        total: s.total,
                        in_degree: s.in_degree,
                        out_degree: s.out_degree,
                    },
                )
            })
            .collect())
    }

    pub async fn calculate_betweenness_centrality(
        &self,
        sample_size: Option<usize>,
        group_id: Option<&str>,
    ) -> Result<HashMap<String, f64>, GraphitiError> {
        let body = BetweennessRequest { group_id, sample_size };
        let response: ScoresResponse = self.post_json("/centrality/betweenness", &body).await?;
        Ok(response.scores)
    }

    pub async fn calculate_all_centralities(
        &self,
        group_id: Option<&str>,
        store_results: bool,
    ) -> Result<HashMap<String, CentralityScores>, GraphitiError> {
        let body = AllCentralitiesRequest { group_id, store_results };
        let response: AllCentralitiesResponse = self.post_json("/centrality/all", &body).await?;
        Ok(response
            .scores
            .into_iter()
            .map(|(id, s)| {
                (
                    id,
                    CentralityScores {
                        pagerank: s.pagerank,
                        degree: DegreeScore {
                            total: s.degree.total,
                            in_degree: s.degree.in_degree,
                            out_degree: s.degree.out_degree,
                        },
                        betweenness: s.betweenness,
                        importance: s.importance,
                    },
                )
            })
            .collect())
    }

    pub async fn get_stats(&self) -> Result<HashMap<String, serde_json::Value>, GraphitiError> {
        let url = format!("{}/stats", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        let stats: StatsResponse = response
            .json()
            .await
            .map_err(|e| GraphitiError::ExternalService(format!("invalid stats response: {e}")))?;
        Ok(stats.stats)
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("rust centrality service health check failed: {:?}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_use_rust_centrality_defaults_false() {
        std::env::remove_var("USE_RUST_CENTRALITY");
        assert!(!should_use_rust_centrality());
    }

    #[test]
    fn test_new_defaults_base_url() {
        std::env::remove_var("RUST_CENTRALITY_URL");
        let client = RustCentralityClient::new(None).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_new_explicit_base_url_wins() {
        let client = RustCentralityClient::new(Some("http://example.com".to_string())).unwrap();
        assert_eq!(client.base_url, "http://example.com");
    }
}
