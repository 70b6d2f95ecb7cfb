//! Inputs and outputs of the decision engine (spec §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Standard,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Standard => "standard",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// One prior message in the conversation, reduced to what the engine needs.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub content: String,
    pub is_inbound: bool,
}

/// Everything the decision is a pure function of — no repository handle, no
/// I/O (spec §9: "the escalation engine receives a narrow `MessageHistory`
/// capability, not the whole repository").
#[derive(Debug, Clone)]
pub struct EscalationInput {
    pub recent_messages: Vec<HistoryMessage>,
    pub inbound_content: String,
    pub responder_confidence: f64,
    pub guest_is_vip: bool,
    pub reservation_in_house: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    LowConfidence,
    ExplicitRequest,
    NegativeSentiment,
    Repetition,
    Vip,
    InHouse,
}

impl Signal {
    /// Human-readable reason string surfaced in escalation metadata and the
    /// acknowledgement template (spec scenario 2: "Guest requested human
    /// assistance").
    pub fn reason(&self) -> &'static str {
        match self {
            Self::LowConfidence => "Assistant confidence was too low to answer reliably",
            Self::ExplicitRequest => "Guest requested human assistance",
            Self::NegativeSentiment => "Guest message carries negative sentiment",
            Self::Repetition => "Guest repeating similar request",
            Self::Vip => "Guest is a VIP or elevated-loyalty member",
            Self::InHouse => "Guest is currently in-house",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EscalationDecision {
    pub escalate: bool,
    pub signals: Vec<Signal>,
    pub reasons: Vec<&'static str>,
    pub priority: Priority,
    /// Internal confidence of the decision itself (spec §4.2: `min(reasonCount * 0.3, 0.95)`).
    pub confidence: f64,
}
