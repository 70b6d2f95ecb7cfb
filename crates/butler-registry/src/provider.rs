//! `LanguageModelProvider` — the collaborator contract spec §6 names,
//! grounded on `skynet_agent::provider::LlmProvider`'s shape but reduced to
//! what the responder and registry actually need: completion, embedding,
//! and a connection test.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub latency_ms: u64,
}

/// Completion/embedding backend (spec §6). `D` (embedding dimension) is
/// provider-declared — typically 1536 — and is the caller's responsibility
/// to track; this trait does not constrain it structurally.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    fn app_id(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse>;

    async fn test_connection(&self) -> Result<ConnectionTestResult>;
}
