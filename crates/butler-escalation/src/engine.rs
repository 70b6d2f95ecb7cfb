//! The decision engine itself (spec §4.2): a pure function of conversation
//! state, recent history, the current inbound, and a few guest/reservation
//! flags. No I/O, no async — callers assemble the narrow [`EscalationInput`]
//! from whatever repository they hold.

use std::collections::HashSet;

use crate::config::EscalationConfig;
use crate::sentiment;
use crate::types::{EscalationDecision, EscalationInput, HistoryMessage, Priority, Signal};

/// Evaluate every signal and assign a priority. Pure: identical inputs
/// always yield an identical decision (spec §8).
pub fn decide(input: &EscalationInput, config: &EscalationConfig) -> EscalationDecision {
    let mut signals = Vec::new();

    if input.responder_confidence < config.confidence_threshold {
        signals.push(Signal::LowConfidence);
    }
    if matches_explicit_request(&input.inbound_content, &config.explicit_request_phrases) {
        signals.push(Signal::ExplicitRequest);
    }
    if sentiment::score(&input.inbound_content) < config.sentiment_threshold {
        signals.push(Signal::NegativeSentiment);
    }
    if is_repetition(&input.inbound_content, &input.recent_messages, config.repetition_threshold) {
        signals.push(Signal::Repetition);
    }
    if input.guest_is_vip {
        signals.push(Signal::Vip);
    }
    if input.reservation_in_house {
        signals.push(Signal::InHouse);
    }

    let escalate = !signals.is_empty();
    let reason_count = signals.len();
    let priority = assign_priority(&signals);
    let confidence = (reason_count as f64 * 0.3).min(0.95);
    let reasons = signals.iter().map(Signal::reason).collect();

    EscalationDecision {
        escalate,
        signals,
        reasons,
        priority,
        confidence,
    }
}

/// Priority table from spec §4.2, evaluated top-down.
fn assign_priority(signals: &[Signal]) -> Priority {
    let vip = signals.contains(&Signal::Vip);
    let explicit = signals.contains(&Signal::ExplicitRequest);
    let repetition = signals.contains(&Signal::Repetition);
    let count = signals.len();

    if vip && count >= 2 {
        Priority::Urgent
    } else if vip {
        Priority::High
    } else if count >= 3 {
        Priority::Urgent
    } else if count >= 2 {
        Priority::High
    } else if explicit || repetition {
        Priority::High
    } else {
        Priority::Standard
    }
}

fn matches_explicit_request(content: &str, phrases: &[String]) -> bool {
    let lower = content.to_lowercase();
    phrases.iter().any(|p| lower.contains(p.as_str()))
}

/// Word-based Jaccard similarity against recent history, excluding the
/// immediately previous message (Open Question, resolved in DESIGN.md: the
/// spec's own wording — "excluding the immediately previous exchange" —
/// names this exclusion directly, so it applies regardless of content).
fn is_repetition(content: &str, recent: &[HistoryMessage], threshold: f64) -> bool {
    if recent.is_empty() {
        return false;
    }
    let current_words = normalize_words(content);
    if current_words.is_empty() {
        return false;
    }
    let candidates = &recent[..recent.len() - 1];
    candidates
        .iter()
        .any(|m| jaccard(&current_words, &normalize_words(&m.content)) > threshold)
}

/// Function words dropped before comparison: the repetition signal should
/// key on the guest's complaint/request words, not the filler wrapped
/// around it across rephrasings of the same issue.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "am", "are", "was", "were", "be", "been", "being", "i", "i'm", "im", "you", "he", "she",
    "it", "we", "they", "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their", "to", "of",
    "in", "on", "at", "for", "and", "or", "but", "so", "please", "help", "can", "could", "would", "should", "will",
    "just", "now", "again",
];

fn normalize_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> EscalationInput {
        EscalationInput {
            recent_messages: Vec::new(),
            inbound_content: "What time is checkout?".to_string(),
            responder_confidence: 0.9,
            guest_is_vip: false,
            reservation_in_house: false,
        }
    }

    #[test]
    fn no_signals_means_no_escalation() {
        let decision = decide(&base_input(), &EscalationConfig::default());
        assert!(!decision.escalate);
        assert_eq!(decision.priority, Priority::Standard);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn decision_is_pure() {
        let input = base_input();
        let config = EscalationConfig::default();
        let a = decide(&input, &config);
        let b = decide(&input, &config);
        assert_eq!(a.escalate, b.escalate);
        assert_eq!(a.priority, b.priority);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn explicit_request_escalates_at_high_priority() {
        let mut input = base_input();
        input.inbound_content = "Please let me talk to a manager!!".to_string();
        let decision = decide(&input, &EscalationConfig::default());
        assert!(decision.escalate);
        assert_eq!(decision.priority, Priority::High);
        assert!(decision.reasons.contains(&"Guest requested human assistance"));
    }

    #[test]
    fn repetition_detected_on_third_similar_message() {
        let config = EscalationConfig::default();
        let recent = vec![
            HistoryMessage { content: "my AC is broken".to_string(), is_inbound: true },
            HistoryMessage { content: "the AC is still broken".to_string(), is_inbound: true },
        ];
        let mut input = base_input();
        input.recent_messages = recent;
        input.inbound_content = "AC broken please help".to_string();
        let decision = decide(&input, &config);
        assert!(decision.signals.contains(&Signal::Repetition));
    }

    #[test]
    fn immediately_previous_message_is_excluded_from_repetition_check() {
        let config = EscalationConfig::default();
        let recent = vec![HistoryMessage {
            content: "AC broken please help".to_string(),
            is_inbound: true,
        }];
        let mut input = base_input();
        input.recent_messages = recent;
        input.inbound_content = "AC broken please help".to_string();
        let decision = decide(&input, &config);
        assert!(!decision.signals.contains(&Signal::Repetition));
    }

    #[test]
    fn vip_with_two_reasons_is_urgent() {
        let mut input = base_input();
        input.guest_is_vip = true;
        input.responder_confidence = 0.1;
        let decision = decide(&input, &EscalationConfig::default());
        assert_eq!(decision.priority, Priority::Urgent);
    }

    #[test]
    fn vip_alone_is_high() {
        let mut input = base_input();
        input.guest_is_vip = true;
        let decision = decide(&input, &EscalationConfig::default());
        assert_eq!(decision.priority, Priority::High);
    }

    #[test]
    fn internal_confidence_caps_at_point_ninety_five() {
        let mut input = base_input();
        input.guest_is_vip = true;
        input.reservation_in_house = true;
        input.responder_confidence = 0.1;
        input.inbound_content = "talk to a manager now".to_string();
        let decision = decide(&input, &EscalationConfig::default());
        assert!(decision.confidence <= 0.95);
    }
}
