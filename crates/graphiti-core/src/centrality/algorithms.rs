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

//! PageRank, degree, and betweenness centrality over the entity graph.
//!
//! The graph is pulled once via [`GraphDatabase::find_nodes`]/[`find_edges`]
//! into an in-memory adjacency list rather than re-queried per iteration, so
//! these algorithms stay efficient regardless of iteration count or graph
//! size.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::{GraphDatabase, QueryParameter};
use crate::errors::GraphitiError;

pub const DEFAULT_DAMPING_FACTOR: f64 = 0.85;
pub const DEFAULT_PAGERANK_ITERATIONS: usize = 20;
const LARGE_GRAPH_THRESHOLD: usize = 100;
const BETWEENNESS_SAMPLE_SIZE: usize = 50;

/// Direction of edges to count for degree centrality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

/// Per-node degree breakdown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DegreeScore {
    pub total: usize,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// Combined centrality scores for a single node, plus the composite
/// importance score derived from them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CentralityScores {
    pub pagerank: f64,
    pub degree: DegreeScore,
    pub betweenness: f64,
    pub importance: f64,
}

/// An in-memory view of the entity graph, built once per calculation and
/// shared across the pagerank/degree/betweenness passes.
struct GraphView {
    node_ids: Vec<String>,
    index_of: HashMap<String, usize>,
    out_edges: Vec<Vec<usize>>,
    in_edges: Vec<Vec<usize>>,
}

impl GraphView {
    fn node_count(&self) -> usize {
        self.node_ids.len()
    }
}

async fn load_graph(
    database: &dyn GraphDatabase,
    group_id: Option<&str>,
) -> Result<GraphView, GraphitiError> {
    let mut node_props = HashMap::new();
    if let Some(group_id) = group_id {
        node_props.insert("group_id".to_string(), QueryParameter::String(group_id.to_string()));
    }
    let nodes = database.find_nodes(Some("Entity"), node_props).await?;

    let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let index_of: HashMap<String, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    let edges = database.find_edges(None, None, None).await?;

    let mut out_edges = vec![Vec::new(); node_ids.len()];
    let mut in_edges = vec![Vec::new(); node_ids.len()];
    for edge in &edges {
        let (Some(&src), Some(&dst)) =
            (index_of.get(&edge.source_id), index_of.get(&edge.target_id))
        else {
            continue;
        };
        if src == dst {
            continue;
        }
        out_edges[src].push(dst);
        in_edges[dst].push(src);
    }

    Ok(GraphView {
        node_ids,
        index_of,
        out_edges,
        in_edges,
    })
}

/// Power-iteration PageRank over the whole graph, scoped to `group_id` when
/// given.
pub async fn calculate_pagerank(
    database: &dyn GraphDatabase,
    damping_factor: f64,
    iterations: usize,
    group_id: Option<&str>,
) -> Result<HashMap<String, f64>, GraphitiError> {
    let graph = load_graph(database, group_id).await?;
    Ok(pagerank_scores(&graph, damping_factor, iterations))
}

fn pagerank_scores(graph: &GraphView, damping_factor: f64, iterations: usize) -> HashMap<String, f64> {
    let n = graph.node_count();
    if n == 0 {
        return HashMap::new();
    }

    let mut scores = vec![1.0 / n as f64; n];
    let base = (1.0 - damping_factor) / n as f64;

    for _ in 0..iterations {
        let mut next = vec![base; n];

        let dangling_mass: f64 = (0..n)
            .filter(|&i| graph.out_edges[i].is_empty())
            .map(|i| scores[i])
            .sum();
        let dangling_share = damping_factor * dangling_mass / n as f64;

        for i in 0..n {
            next[i] += dangling_share;
        }

        for (src, targets) in graph.out_edges.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = damping_factor * scores[src] / targets.len() as f64;
            for &dst in targets {
                next[dst] += share;
            }
        }

        scores = next;
    }

    graph
        .node_ids
        .iter()
        .cloned()
        .zip(scores)
        .collect()
}

/// Degree centrality for every node, in the requested direction.
pub async fn calculate_degree_centrality(
    database: &dyn GraphDatabase,
    direction: Direction,
    group_id: Option<&str>,
) -> Result<HashMap<String, DegreeScore>, GraphitiError> {
    let graph = load_graph(database, group_id).await?;

    let mut result = HashMap::new();
    for (i, id) in graph.node_ids.iter().enumerate() {
        let in_degree = graph.in_edges[i].len();
        let out_degree = graph.out_edges[i].len();
        let total = match direction {
            Direction::In => in_degree,
            Direction::Out => out_degree,
            Direction::Both => in_degree + out_degree,
        };
        result.insert(
            id.clone(),
            DegreeScore {
                total,
                in_degree,
                out_degree,
            },
        );
    }

    Ok(result)
}

/// Betweenness centrality, approximated via Brandes' algorithm from a sample
/// of source nodes when the graph is large. Mirrors the upstream heuristic of
/// sampling once node count exceeds [`LARGE_GRAPH_THRESHOLD`].
pub async fn calculate_betweenness_centrality(
    database: &dyn GraphDatabase,
    sample_size: Option<usize>,
    group_id: Option<&str>,
) -> Result<HashMap<String, f64>, GraphitiError> {
    let graph = load_graph(database, group_id).await?;
    let n = graph.node_count();
    if n == 0 {
        return Ok(HashMap::new());
    }

    let sample_size = sample_size.or(if n > LARGE_GRAPH_THRESHOLD {
        Some(BETWEENNESS_SAMPLE_SIZE.min(n))
    } else {
        None
    });

    let sources: Vec<usize> = match sample_size {
        Some(k) if k < n => {
            debug!("sampling {} of {} nodes for betweenness centrality", k, n);
            (0..n).step_by((n as f64 / k as f64).ceil() as usize).collect()
        }
        _ => (0..n).collect(),
    };
    let scale = if let Some(k) = sample_size {
        if k < n {
            n as f64 / sources.len().max(1) as f64
        } else {
            1.0
        }
    } else {
        1.0
    };

    let mut betweenness = vec![0.0f64; n];
    for &s in &sources {
        brandes_single_source(&graph, s, &mut betweenness);
    }

    for score in &mut betweenness {
        *score *= scale;
    }

    Ok(graph.node_ids.iter().cloned().zip(betweenness).collect())
}

/// Single-source shortest-path accumulation step of Brandes' algorithm over
/// an unweighted directed graph.
fn brandes_single_source(graph: &GraphView, s: usize, betweenness: &mut [f64]) {
    let n = graph.node_count();
    let mut stack = Vec::new();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];

    sigma[s] = 1.0;
    dist[s] = 0;
    let mut queue = VecDeque::new();
    queue.push_back(s);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in &graph.out_edges[v] {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                predecessors[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &predecessors[w] {
            delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
        }
        if w != s {
            betweenness[w] += delta[w];
        }
    }
}

/// Composite importance score: a weighted blend of pagerank, degree, and
/// betweenness, each rescaled onto a comparable order of magnitude.
pub fn composite_importance(pagerank: f64, degree: usize, betweenness: f64) -> f64 {
    let normalized_pagerank = pagerank * 1000.0;
    let normalized_degree = ((degree + 1) as f64).ln();
    let normalized_betweenness = betweenness * 100.0;

    0.5 * normalized_pagerank + 0.3 * normalized_degree + 0.2 * normalized_betweenness
}

/// Run pagerank, degree, and betweenness together and fold them into
/// [`CentralityScores`] per node, including the composite importance score.
pub async fn calculate_all_centralities(
    database: &dyn GraphDatabase,
    group_id: Option<&str>,
) -> Result<HashMap<String, CentralityScores>, GraphitiError> {
    let graph = load_graph(database, group_id).await?;
    let n = graph.node_count();

    let pagerank = pagerank_scores(&graph, DEFAULT_DAMPING_FACTOR, DEFAULT_PAGERANK_ITERATIONS);

    let sample_size = if n > LARGE_GRAPH_THRESHOLD {
        Some(BETWEENNESS_SAMPLE_SIZE.min(n))
    } else {
        None
    };
    let sources: Vec<usize> = match sample_size {
        Some(k) if k < n => (0..n).step_by((n as f64 / k as f64).ceil() as usize).collect(),
        _ => (0..n).collect(),
    };
    let scale = if sources.is_empty() {
        1.0
    } else {
        n as f64 / sources.len() as f64
    };

    let mut betweenness = vec![0.0f64; n];
    for &s in &sources {
        brandes_single_source(&graph, s, &mut betweenness);
    }
    for score in &mut betweenness {
        *score *= scale;
    }

    let mut result = HashMap::new();
    for (i, id) in graph.node_ids.iter().enumerate() {
        let in_degree = graph.in_edges[i].len();
        let out_degree = graph.out_edges[i].len();
        let degree = DegreeScore {
            total: in_degree + out_degree,
            in_degree,
            out_degree,
        };
        let pr = *pagerank.get(id).unwrap_or(&0.0);
        let bt = betweenness[i];
        let importance = composite_importance(pr, degree.total, bt);

        result.insert(
            id.clone(),
            CentralityScores {
                pagerank: pr,
                degree,
                betweenness: bt,
                importance,
            },
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph(n: usize) -> GraphView {
        let node_ids: Vec<String> = (0..n).map(|i| i.to_string()).collect();
        let index_of = node_ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        let mut out_edges = vec![Vec::new(); n];
        let mut in_edges = vec![Vec::new(); n];
        for i in 0..n.saturating_sub(1) {
            out_edges[i].push(i + 1);
            in_edges[i + 1].push(i);
        }
        GraphView {
            node_ids,
            index_of,
            out_edges,
            in_edges,
        }
    }

    #[test]
    fn test_pagerank_sums_to_roughly_one() {
        let graph = line_graph(5);
        let scores = pagerank_scores(&graph, DEFAULT_DAMPING_FACTOR, DEFAULT_PAGERANK_ITERATIONS);
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 0.05, "total was {total}");
    }

    #[test]
    fn test_pagerank_empty_graph() {
        let graph = line_graph(0);
        let scores = pagerank_scores(&graph, DEFAULT_DAMPING_FACTOR, DEFAULT_PAGERANK_ITERATIONS);
        assert!(scores.is_empty());
    }

    #[test]
    fn test_betweenness_middle_node_highest_on_path() {
        let graph = line_graph(5);
        let mut betweenness = vec![0.0; 5];
        for s in 0..5 {
            brandes_single_source(&graph, s, &mut betweenness);
        }
        let middle = betweenness[2];
        let endpoint = betweenness[0];
        assert!(middle > endpoint);
    }

    #[test]
    fn test_composite_importance_monotonic_in_pagerank() {
        let low = composite_importance(0.001, 2, 0.0);
        let high = composite_importance(0.01, 2, 0.0);
        assert!(high > low);
    }
}
