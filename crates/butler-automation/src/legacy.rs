//! Legacy single-action rule adapter (spec §4.3: "accepting a legacy single
//! `{actionType, actionConfig}` form by converting it to a one-element
//! chain"). The minted id must stay stable across an execution's retries
//! (Open Question decision), so conversion happens once when the execution
//! is first created and the resulting chain is persisted into
//! `trigger_data`, not re-derived from `rule.actions` on every retry tick.

use chrono::Utc;
use serde::Deserialize;

use crate::types::{Action, ActionType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySingleAction {
    action_type: ActionType,
    action_config: serde_json::Value,
}

/// Parse a rule's stored `actions` value, accepting either the current
/// ordered-array form or the legacy single-action object form.
pub fn rehydrate_actions(raw: &serde_json::Value) -> Vec<Action> {
    if let Ok(actions) = serde_json::from_value::<Vec<Action>>(raw.clone()) {
        return actions;
    }
    if let Ok(legacy) = serde_json::from_value::<LegacySingleAction>(raw.clone()) {
        return vec![Action {
            id: format!("action_{}", Utc::now().timestamp_millis()),
            action_type: legacy.action_type,
            config: legacy.action_config,
            order: 0,
            continue_on_error: false,
            condition: None,
        }];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_legacy_single_action_to_one_element_chain() {
        let raw = serde_json::json!({"actionType": "webhook", "actionConfig": {"url": "https://example.com"}});
        let actions = rehydrate_actions(&raw);
        assert_eq!(actions.len(), 1);
        assert!(actions[0].id.starts_with("action_"));
        assert_eq!(actions[0].action_type, ActionType::Webhook);
    }

    #[test]
    fn passes_through_an_already_ordered_chain() {
        let raw = serde_json::json!([
            {"id": "a1", "type": "create_task", "config": {}, "order": 0, "continueOnError": false}
        ]);
        let actions = rehydrate_actions(&raw);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "a1");
    }
}
