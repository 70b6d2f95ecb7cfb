//! Adapter manifests: the static, declarative description of what a
//! pluggable app is and how its configuration form should be rendered
//! (spec §4.4). The runtime then uses a typed config struct, not this
//! schema — the schema is pure UI data (spec §9's "the config schema
//! becomes data used by the UI layer; the runtime uses the typed struct").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppCategory {
    Ai,
    Channel,
    Pms,
}

impl std::fmt::Display for AppCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            Self::Ai => "ai",
            Self::Channel => "channel",
            Self::Pms => "pms",
        })
    }
}

impl From<AppCategory> for butler_persistence::models::ExtensionCategory {
    fn from(c: AppCategory) -> Self {
        match c {
            AppCategory::Ai => Self::Ai,
            AppCategory::Channel => Self::Channel,
            AppCategory::Pms => Self::Pms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Password,
    Number,
    Boolean,
    Select,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default)]
    pub options: Vec<&'static str>,
    #[serde(default)]
    pub default: Option<&'static str>,
    #[serde(default)]
    pub placeholder: Option<&'static str>,
}

/// Capabilities an AI provider may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiCapability {
    Completion,
    Embedding,
    Streaming,
}

/// Capabilities a channel adapter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCapability {
    Inbound,
    Outbound,
    Media,
    Templates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Capabilities {
    Ai(Vec<AiCapability>),
    Channel(Vec<ChannelCapability>),
    Pms,
}

/// The static description of one pluggable app (spec §4.4). Manifests are
/// `'static` data compiled into the binary; only the per-tenant
/// configuration they describe is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterManifest {
    pub id: &'static str,
    pub name: &'static str,
    pub category: AppCategory,
    pub version: &'static str,
    pub description: &'static str,
    pub config_schema: Vec<ConfigField>,
    pub capabilities: Capabilities,
    /// For `category = Channel` only: which of the three channel mediums
    /// this adapter serves (spec §4.4 selection policy: "each channel
    /// category ... has at most one active adapter"). `None` for AI/PMS.
    #[serde(default)]
    pub channel_medium: Option<&'static str>,
}
