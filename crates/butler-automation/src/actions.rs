//! Per-type action dispatch. The chain executor depends only on the
//! [`ActionDispatcher`] trait — a narrow capability seam, not the concrete
//! registry/persistence types — so the executor itself stays pure and
//! testable against a fake (spec §9's constructor-injection guidance,
//! mirrored from `skynet_agent::pipeline::context::MessageContext`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use butler_persistence::models::{TaskPriority, TaskSource};
use butler_persistence::Repositories;
use butler_registry::AdapterRegistry;

use crate::error::{AutomationError, Result};

#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn send_message(&self, config: &serde_json::Value) -> Result<serde_json::Value>;
    async fn create_task(&self, config: &serde_json::Value) -> Result<serde_json::Value>;
    async fn notify_staff(&self, config: &serde_json::Value) -> Result<serde_json::Value>;
    async fn webhook(&self, config: &serde_json::Value) -> Result<serde_json::Value>;
}

/// The production dispatcher: sends through the active channel adapter,
/// creates tasks via the persistence layer, and posts arbitrary webhooks.
pub struct LiveActionDispatcher {
    repos: Arc<Repositories>,
    registry: Arc<AdapterRegistry>,
    http: reqwest::Client,
}

impl LiveActionDispatcher {
    pub fn new(repos: Arc<Repositories>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            repos,
            registry,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SendMessageConfig {
    channel_medium: String,
    to: String,
    body: String,
}

#[derive(Deserialize)]
struct CreateTaskConfig {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<TaskPriority>,
}

#[derive(Deserialize)]
struct NotifyStaffConfig {
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    body: serde_json::Value,
}

#[async_trait]
impl ActionDispatcher for LiveActionDispatcher {
    async fn send_message(&self, config: &serde_json::Value) -> Result<serde_json::Value> {
        let cfg: SendMessageConfig =
            serde_json::from_value(config.clone()).map_err(|e| AutomationError::InvalidRule(e.to_string()))?;
        let adapter = self
            .registry
            .active_channel(&cfg.channel_medium)
            .ok_or_else(|| AutomationError::ActionFailed(format!("no active channel for {}", cfg.channel_medium)))?;
        let result = adapter
            .send(
                &cfg.to,
                butler_registry::OutboundPayload {
                    content: cfg.body,
                    content_type: "text/plain".to_string(),
                    metadata: None,
                },
            )
            .await
            .map_err(|e| AutomationError::ActionFailed(e.to_string()))?;
        Ok(serde_json::json!({
            "status": format!("{:?}", result.status),
            "channelMessageId": result.channel_message_id,
        }))
    }

    async fn create_task(&self, config: &serde_json::Value) -> Result<serde_json::Value> {
        let cfg: CreateTaskConfig =
            serde_json::from_value(config.clone()).map_err(|e| AutomationError::InvalidRule(e.to_string()))?;
        let task = self
            .repos
            .tasks
            .create(
                &cfg.title,
                cfg.description.as_deref(),
                TaskSource::Automation,
                cfg.priority.unwrap_or(TaskPriority::Standard),
                None,
                None,
            )
            .map_err(AutomationError::from)?;
        Ok(serde_json::json!({"taskId": task.id.as_str()}))
    }

    async fn notify_staff(&self, config: &serde_json::Value) -> Result<serde_json::Value> {
        let cfg: NotifyStaffConfig =
            serde_json::from_value(config.clone()).map_err(|e| AutomationError::InvalidRule(e.to_string()))?;
        let task = self
            .repos
            .tasks
            .create(&cfg.title, cfg.description.as_deref(), TaskSource::Automation, TaskPriority::High, None, None)
            .map_err(AutomationError::from)?;
        Ok(serde_json::json!({"taskId": task.id.as_str(), "notified": true}))
    }

    async fn webhook(&self, config: &serde_json::Value) -> Result<serde_json::Value> {
        let cfg: WebhookConfig =
            serde_json::from_value(config.clone()).map_err(|e| AutomationError::InvalidRule(e.to_string()))?;
        let resp = self
            .http
            .post(&cfg.url)
            .json(&cfg.body)
            .send()
            .await
            .map_err(|e| AutomationError::ActionFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AutomationError::ActionFailed(format!("webhook returned {}", resp.status())));
        }
        Ok(serde_json::json!({"status": resp.status().as_u16()}))
    }
}
