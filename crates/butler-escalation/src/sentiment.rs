//! Lexicon-based sentiment score (spec §4.2: "negative/positive phrase hits
//! plus an all-caps shouting heuristic").
//!
//! Deliberately small and explicit rather than a statistical model — the
//! engine is specified to be a pure, auditable function.

const NEGATIVE_PHRASES: &[&str] = &[
    "terrible", "awful", "horrible", "disgusting", "worst", "unacceptable",
    "furious", "angry", "ridiculous", "disappointed", "disappointing",
    "never again", "refund", "complaint", "complain", "broken", "dirty",
    "rude", "useless", "waste of money", "appalling", "filthy",
];

const POSITIVE_PHRASES: &[&str] = &[
    "thank you", "thanks", "great", "excellent", "wonderful", "amazing",
    "perfect", "love", "fantastic", "happy", "pleased", "appreciate",
];

/// Normalized score in roughly `[-1.0, 1.0]`: negative hits push down,
/// positive hits push up, and an ALL-CAPS message is treated as shouting
/// and pushed further negative.
pub fn score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let neg_hits = NEGATIVE_PHRASES.iter().filter(|p| lower.contains(*p)).count() as f64;
    let pos_hits = POSITIVE_PHRASES.iter().filter(|p| lower.contains(*p)).count() as f64;

    let total_hits = neg_hits + pos_hits;
    let mut raw = if total_hits > 0.0 {
        (pos_hits - neg_hits) / total_hits
    } else {
        0.0
    };

    if is_shouting(text) {
        raw -= 0.5;
    }

    raw.clamp(-1.0, 1.0)
}

/// A message is "shouting" if it has enough alphabetic characters to judge
/// case and nearly all of them are uppercase.
fn is_shouting(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 4 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64 > 0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_phrases_score_below_zero() {
        assert!(score("This is absolutely terrible and unacceptable.") < 0.0);
    }

    #[test]
    fn positive_phrases_score_above_zero() {
        assert!(score("Thank you, this is wonderful!") > 0.0);
    }

    #[test]
    fn shouting_pushes_score_negative() {
        let shouted = score("WHY IS THIS STILL BROKEN");
        let calm = score("why is this still broken");
        assert!(shouted < calm);
    }

    #[test]
    fn neutral_text_scores_zero() {
        assert_eq!(score("What time is checkout?"), 0.0);
    }
}
