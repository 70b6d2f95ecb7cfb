//! App registry: typed adapter traits plus the process-wide registry that
//! tracks which configured instance of each is currently active (spec §4.4).

pub mod builtin;
pub mod channel;
pub mod error;
pub mod manifest;
pub mod pms;
pub mod provider;
pub mod registry;

pub use builtin::{register_builtins, AnthropicProvider, GenericPmsAdapter, TwilioSmsAdapter};

pub use channel::{ChannelAdapter, OutboundPayload, SendResult, SendStatus};
pub use error::{RegistryError, Result};
pub use manifest::{
    AdapterManifest, AiCapability, AppCategory, Capabilities, ChannelCapability, ConfigField, FieldType,
};
pub use pms::{NormalizedGuest, NormalizedReservation, PmsAdapter};
pub use provider::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ConnectionTestResult, EmbedRequest,
    EmbedResponse, LanguageModelProvider, TokenUsage,
};
pub use registry::{AdapterRegistry, AdapterStatus, LiveInstance};
