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

//! LLM client stack: provider-agnostic chat/structured-output interface,
//! concrete providers, caching, and fallback composition.

pub mod cached;
pub mod cerebras_client;
pub mod client;
pub mod client_factory;
pub mod config;
pub mod fallback_client;
pub mod models;
pub mod openai_client;

pub use cached::CachedLlmClient;
pub use cerebras_client::CerebrasClient;
pub use client::{BaseLlmClient, LlmClient};
pub use client_factory::GraphitiClientFactory;
pub use config::{LlmConfig, ModelSize};
pub use fallback_client::FallbackLlmClient;
pub use models::{Message, TokenUsage};
pub use openai_client::OpenAiClient;
