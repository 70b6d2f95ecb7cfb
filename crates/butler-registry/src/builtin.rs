//! Built-in adapters the binary ships with out of the box. Each is a real
//! `reqwest`-backed implementation, not a stub — grounded on
//! `skynet_agent::anthropic::AnthropicProvider`'s auth/header handling for
//! the AI adapter, and on `skynet_gateway::http::webhooks` for the shape of
//! the outbound calls the channel adapter makes.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;

use crate::channel::{ChannelAdapter, OutboundPayload, SendResult, SendStatus};
use crate::error::{RegistryError, Result};
use crate::manifest::{AdapterManifest, AiCapability, AppCategory, Capabilities, ChannelCapability, ConfigField, FieldType};
use crate::pms::{NormalizedReservation, PmsAdapter};
use crate::provider::{
    ChatRole, CompletionRequest, CompletionResponse, ConnectionTestResult, EmbedRequest, EmbedResponse,
    LanguageModelProvider, TokenUsage,
};
use crate::registry::LiveInstance;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `anthropic-messages`: completion over the Anthropic Messages API.
/// Embedding is not offered by Anthropic, so `embed` returns `Upstream`.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn manifest() -> AdapterManifest {
        AdapterManifest {
            id: "anthropic-messages",
            name: "Anthropic Claude",
            category: AppCategory::Ai,
            version: "1.0",
            description: "Completion via the Anthropic Messages API",
            config_schema: vec![
                ConfigField {
                    key: "api_key",
                    label: "API key",
                    field_type: FieldType::Password,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: Some("sk-ant-..."),
                },
                ConfigField {
                    key: "model",
                    label: "Model",
                    field_type: FieldType::Text,
                    required: true,
                    options: vec![],
                    default: Some("claude-3-5-sonnet-20241022"),
                    placeholder: None,
                },
            ],
            capabilities: Capabilities::Ai(vec![AiCapability::Completion]),
            channel_medium: None,
        }
    }

    pub fn factory(config: &serde_json::Value) -> Result<LiveInstance> {
        #[derive(Deserialize)]
        struct Cfg {
            api_key: String,
            #[serde(default = "default_model")]
            model: String,
        }
        fn default_model() -> String {
            "claude-3-5-sonnet-20241022".to_string()
        }
        let cfg: Cfg = serde_json::from_value(config.clone())
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        Ok(LiveInstance::Ai(std::sync::Arc::new(Self {
            client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build().unwrap_or_default(),
            api_key: cfg.api_key,
            model: cfg.model,
            base_url: "https://api.anthropic.com".to_string(),
        })))
    }
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
    stop_reason: Option<String>,
}

#[async_trait]
impl LanguageModelProvider for AnthropicProvider {
    fn app_id(&self) -> &str {
        "anthropic-messages"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let (system, messages): (Vec<_>, Vec<_>) =
            request.messages.into_iter().partition(|m| m.role == ChatRole::System);
        let system_prompt = system.into_iter().map(|m| m.content).collect::<Vec<_>>().join("\n");

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(1024),
            "system": system_prompt,
            "messages": messages.into_iter().map(|m| serde_json::json!({
                "role": match m.role { ChatRole::User => "user", _ => "assistant" },
                "content": m.content,
            })).collect::<Vec<_>>(),
            "stop_sequences": request.stop_sequences,
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Upstream(format!("anthropic returned {status}: {text}")));
        }

        let parsed: AnthropicResponse = resp.json().await?;
        Ok(CompletionResponse {
            content: parsed.content.into_iter().map(|c| c.text).collect::<Vec<_>>().join(""),
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
            stop_reason: parsed.stop_reason,
        })
    }

    async fn embed(&self, _request: EmbedRequest) -> Result<EmbedResponse> {
        Err(RegistryError::Upstream(
            "anthropic-messages does not offer an embeddings endpoint".to_string(),
        ))
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let result = self
            .complete(CompletionRequest {
                messages: vec![crate::provider::ChatMessage {
                    role: ChatRole::User,
                    content: "ping".to_string(),
                }],
                max_tokens: Some(1),
                temperature: None,
                stop_sequences: vec![],
            })
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;
        Ok(match result {
            Ok(_) => ConnectionTestResult {
                success: true,
                message: "connected".to_string(),
                details: None,
                latency_ms,
            },
            Err(e) => ConnectionTestResult {
                success: false,
                message: e.to_string(),
                details: None,
                latency_ms,
            },
        })
    }
}

/// `twilio-sms`: outbound short-message delivery via the Twilio REST API.
pub struct TwilioSmsAdapter {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSmsAdapter {
    pub fn manifest() -> AdapterManifest {
        AdapterManifest {
            id: "twilio-sms",
            name: "Twilio SMS",
            category: AppCategory::Channel,
            version: "1.0",
            description: "Short-message delivery via Twilio",
            config_schema: vec![
                ConfigField {
                    key: "account_sid",
                    label: "Account SID",
                    field_type: FieldType::Text,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: None,
                },
                ConfigField {
                    key: "auth_token",
                    label: "Auth token",
                    field_type: FieldType::Password,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: None,
                },
                ConfigField {
                    key: "from_number",
                    label: "From number",
                    field_type: FieldType::Text,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: Some("+15551234567"),
                },
            ],
            capabilities: Capabilities::Channel(vec![ChannelCapability::Inbound, ChannelCapability::Outbound]),
            channel_medium: Some("short_message"),
        }
    }

    pub fn factory(config: &serde_json::Value) -> Result<LiveInstance> {
        #[derive(Deserialize)]
        struct Cfg {
            account_sid: String,
            auth_token: String,
            from_number: String,
        }
        let cfg: Cfg = serde_json::from_value(config.clone())
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        Ok(LiveInstance::Channel(std::sync::Arc::new(Self {
            client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(15)).build().unwrap_or_default(),
            account_sid: cfg.account_sid,
            auth_token: cfg.auth_token,
            from_number: cfg.from_number,
        })))
    }
}

#[async_trait]
impl ChannelAdapter for TwilioSmsAdapter {
    fn app_id(&self) -> &str {
        "twilio-sms"
    }

    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<SendResult> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", payload.content.as_str())])
            .send()
            .await?;

        if resp.status().is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            Ok(SendResult {
                status: SendStatus::Sent,
                channel_message_id: body.get("sid").and_then(|v| v.as_str()).map(String::from),
                error: None,
            })
        } else {
            let text = resp.text().await.unwrap_or_default();
            Ok(SendResult {
                status: SendStatus::Failed,
                channel_message_id: None,
                error: Some(text),
            })
        }
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let url = format!("https://api.twilio.com/2010-04-01/Accounts/{}.json", self.account_sid);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        let latency_ms = start.elapsed().as_millis() as u64;
        Ok(ConnectionTestResult {
            success: resp.status().is_success(),
            message: if resp.status().is_success() {
                "connected".to_string()
            } else {
                format!("twilio returned {}", resp.status())
            },
            details: None,
            latency_ms,
        })
    }
}

/// `whatsapp-meta`: outbound delivery over the WhatsApp Cloud API. Inbound
/// parsing lives in the gateway's webhook handler; this adapter only sends.
pub struct WhatsAppCloudAdapter {
    client: reqwest::Client,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppCloudAdapter {
    pub fn manifest() -> AdapterManifest {
        AdapterManifest {
            id: "whatsapp-meta",
            name: "WhatsApp (Meta Cloud API)",
            category: AppCategory::Channel,
            version: "1.0",
            description: "Sends and receives WhatsApp messages via Meta's Cloud API",
            config_schema: vec![
                ConfigField {
                    key: "phone_number_id",
                    label: "Phone number ID",
                    field_type: FieldType::Text,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: Some("109876543210"),
                },
                ConfigField {
                    key: "access_token",
                    label: "Access token",
                    field_type: FieldType::Password,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: None,
                },
            ],
            capabilities: Capabilities::Channel(vec![ChannelCapability::Inbound, ChannelCapability::Outbound]),
            channel_medium: Some("instant_message"),
        }
    }

    pub fn factory(config: &serde_json::Value) -> Result<LiveInstance> {
        #[derive(Deserialize)]
        struct Cfg {
            phone_number_id: String,
            access_token: String,
        }
        let cfg: Cfg = serde_json::from_value(config.clone())
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        Ok(LiveInstance::Channel(std::sync::Arc::new(Self {
            client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(15)).build().unwrap_or_default(),
            phone_number_id: cfg.phone_number_id,
            access_token: cfg.access_token,
        })))
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppCloudAdapter {
    fn app_id(&self) -> &str {
        "whatsapp-meta"
    }

    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<SendResult> {
        let url = format!("https://graph.facebook.com/v19.0/{}/messages", self.phone_number_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": {"body": payload.content},
            }))
            .send()
            .await?;

        if resp.status().is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let message_id = body
                .get("messages")
                .and_then(|m| m.as_array())
                .and_then(|arr| arr.first())
                .and_then(|m| m.get("id"))
                .and_then(|v| v.as_str())
                .map(String::from);
            Ok(SendResult { status: SendStatus::Sent, channel_message_id: message_id, error: None })
        } else {
            let text = resp.text().await.unwrap_or_default();
            Ok(SendResult { status: SendStatus::Failed, channel_message_id: None, error: Some(text) })
        }
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let url = format!("https://graph.facebook.com/v19.0/{}", self.phone_number_id);
        let resp = self.client.get(&url).bearer_auth(&self.access_token).send().await?;
        let latency_ms = start.elapsed().as_millis() as u64;
        Ok(ConnectionTestResult {
            success: resp.status().is_success(),
            message: if resp.status().is_success() {
                "connected".to_string()
            } else {
                format!("whatsapp cloud api returned {}", resp.status())
            },
            details: None,
            latency_ms,
        })
    }
}

/// `generic-pms`: a REST PMS adapter for systems that expose a simple
/// "reservations modified since" polling endpoint. Real hotel PMS
/// integrations vary widely; this is the shape the pipeline needs and
/// serves as the reference implementation other PMS adapters follow.
pub struct GenericPmsAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GenericPmsAdapter {
    pub fn manifest() -> AdapterManifest {
        AdapterManifest {
            id: "generic-pms",
            name: "Generic PMS",
            category: AppCategory::Pms,
            version: "1.0",
            description: "Polls a REST endpoint for modified reservations",
            config_schema: vec![
                ConfigField {
                    key: "base_url",
                    label: "Base URL",
                    field_type: FieldType::Text,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: Some("https://pms.example.com/api"),
                },
                ConfigField {
                    key: "api_key",
                    label: "API key",
                    field_type: FieldType::Password,
                    required: true,
                    options: vec![],
                    default: None,
                    placeholder: None,
                },
            ],
            capabilities: Capabilities::Pms,
            channel_medium: None,
        }
    }

    pub fn factory(config: &serde_json::Value) -> Result<LiveInstance> {
        #[derive(Deserialize)]
        struct Cfg {
            base_url: String,
            api_key: String,
        }
        let cfg: Cfg = serde_json::from_value(config.clone())
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        Ok(LiveInstance::Pms(std::sync::Arc::new(Self {
            client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build().unwrap_or_default(),
            base_url: cfg.base_url,
            api_key: cfg.api_key,
        })))
    }
}

#[async_trait]
impl PmsAdapter for GenericPmsAdapter {
    fn app_id(&self) -> &str {
        "generic-pms"
    }

    async fn get_modified_reservations(&self, since: &str) -> Result<Vec<NormalizedReservation>> {
        let resp = self
            .client
            .get(format!("{}/reservations", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("since", since)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Upstream(format!("pms returned {}", resp.status())));
        }
        let reservations: Vec<NormalizedReservation> = resp.json().await?;
        Ok(reservations)
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let resp = self
            .client
            .get(format!("{}/reservations", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("since", "1970-01-01T00:00:00Z")])
            .send()
            .await?;
        let latency_ms = start.elapsed().as_millis() as u64;
        Ok(ConnectionTestResult {
            success: resp.status().is_success(),
            message: if resp.status().is_success() {
                "connected".to_string()
            } else {
                format!("pms returned {}", resp.status())
            },
            details: None,
            latency_ms,
        })
    }
}

/// Register every built-in adapter against a registry.
pub fn register_builtins(registry: &crate::registry::AdapterRegistry) {
    registry.register(AnthropicProvider::manifest(), AnthropicProvider::factory);
    registry.register(TwilioSmsAdapter::manifest(), TwilioSmsAdapter::factory);
    registry.register(WhatsAppCloudAdapter::manifest(), WhatsAppCloudAdapter::factory);
    registry.register(GenericPmsAdapter::manifest(), GenericPmsAdapter::factory);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifests_declare_expected_categories() {
        assert_eq!(AnthropicProvider::manifest().category, AppCategory::Ai);
        assert_eq!(TwilioSmsAdapter::manifest().category, AppCategory::Channel);
        assert_eq!(TwilioSmsAdapter::manifest().channel_medium, Some("short_message"));
        assert_eq!(WhatsAppCloudAdapter::manifest().category, AppCategory::Channel);
        assert_eq!(WhatsAppCloudAdapter::manifest().channel_medium, Some("instant_message"));
        assert_eq!(GenericPmsAdapter::manifest().category, AppCategory::Pms);
    }

    #[test]
    fn register_builtins_populates_every_adapter() {
        let repos = std::sync::Arc::new(butler_persistence::Repositories::open_in_memory().unwrap());
        let registry = crate::registry::AdapterRegistry::new(repos);
        register_builtins(&registry);
        let ids: Vec<&'static str> = registry.manifests().iter().map(|m| m.id).collect();
        assert!(ids.contains(&"anthropic-messages"));
        assert!(ids.contains(&"twilio-sms"));
        assert!(ids.contains(&"whatsapp-meta"));
        assert!(ids.contains(&"generic-pms"));
    }
}
