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

//! General utilities: datetime helpers, bulk episode processing, graph maintenance.

pub mod bulk_utils;
pub mod datetime_utils;
pub mod maintenance;

pub use bulk_utils::{
    add_nodes_and_edges_bulk, dedupe_edges_bulk, dedupe_nodes_bulk, extract_edge_dates_bulk,
    extract_nodes_and_edges_bulk, resolve_edge_pointers, retrieve_previous_episodes_bulk,
    RawEpisode,
};
pub use datetime_utils::utc_now;
