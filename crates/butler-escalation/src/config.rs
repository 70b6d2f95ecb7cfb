//! Tunable thresholds for the escalation signals (spec §4.2: "N
//! configurable, default 5" and the per-signal default thresholds).

#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Responder confidence below which the `low_confidence` signal fires.
    pub confidence_threshold: f64,
    /// Normalized sentiment score below which the `negative_sentiment`
    /// signal fires.
    pub sentiment_threshold: f64,
    /// Jaccard similarity above which the `repetition` signal fires.
    pub repetition_threshold: f64,
    /// How many recent messages feed the repetition and sentiment checks.
    pub history_window: usize,
    /// Case-insensitive substrings expressing a wish to speak with a human.
    pub explicit_request_phrases: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            sentiment_threshold: -0.5,
            repetition_threshold: 0.7,
            history_window: 5,
            explicit_request_phrases: default_explicit_phrases(),
        }
    }
}

fn default_explicit_phrases() -> Vec<String> {
    [
        "talk to a person",
        "talk to a human",
        "speak to a person",
        "speak to a human",
        "speak with a manager",
        "manager please",
        "real person",
        "human agent",
        "customer service representative",
        "let me speak to someone",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
