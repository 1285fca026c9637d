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

//! Community naming and summarization prompts

use crate::prompts::models::{Message, PromptFunction};
use std::collections::HashMap;

/// Name and summarize a cluster of related entities as a community
pub fn summarize(context: &HashMap<String, serde_json::Value>) -> Vec<Message> {
    let sys_prompt =
        "You are an AI assistant that names and summarizes clusters of related entities.";

    let members = context
        .get("members")
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .unwrap_or_else(|| "[]".to_string());

    let user_prompt = format!(
        r#"
<MEMBERS>
{members}
</MEMBERS>

Given the above entities that form a single cluster, provide:
- name: a short (2-5 word) label for what this cluster of entities represents
- summary: a concise (no longer than 150 words) summary of the cluster as a whole,
  covering what its members have in common.
"#
    );

    vec![Message::system(sys_prompt), Message::user(user_prompt)]
}

/// Available prompt versions for community naming/summarization
pub struct SummarizeCommunitiesPrompt {
    pub summarize: PromptFunction,
}

impl Default for SummarizeCommunitiesPrompt {
    fn default() -> Self {
        Self { summarize }
    }
}
