//! Action chain executor (spec §4.3): given an ordered list of actions and
//! an [`ExecutionContext`], runs each action in order, honoring conditions
//! and `continueOnError`, and rolls the per-action outcomes up into one
//! [`ChainExecutionResult`].

use std::collections::HashMap;

use tracing::warn;

use crate::actions::ActionDispatcher;
use crate::template::{eval_expression, substitute};
use crate::types::{
    Action, ActionOutcome, ActionResult, ActionType, ChainExecutionResult, ChainStatus, Condition, ExecutionContext,
};

pub struct ChainExecutor<'a> {
    dispatcher: &'a dyn ActionDispatcher,
}

impl<'a> ChainExecutor<'a> {
    pub fn new(dispatcher: &'a dyn ActionDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run `actions` (unsorted) against `ctx`, returning the rolled-up
    /// result. Actions are sorted by `order` ascending before execution.
    pub async fn run(&self, actions: &[Action], ctx: &ExecutionContext) -> ChainExecutionResult {
        let mut sorted: Vec<&Action> = actions.iter().collect();
        sorted.sort_by_key(|a| a.order);

        let mut results: HashMap<String, ActionResult> = HashMap::new();
        let mut ordered_results: Vec<ActionResult> = Vec::with_capacity(sorted.len());
        let mut last_completed: Option<ActionOutcome> = None;
        let mut any_failed = false;
        let mut any_succeeded = false;
        let mut stopped_early = false;

        for action in sorted {
            if stopped_early {
                let skipped = ActionResult {
                    action_id: action.id.clone(),
                    outcome: ActionOutcome::Skipped,
                    output: serde_json::Value::Null,
                    error: None,
                };
                results.insert(action.id.clone(), skipped.clone());
                ordered_results.push(skipped);
                continue;
            }

            if !self.condition_holds(action.condition.as_ref(), last_completed, &results) {
                let skipped = ActionResult {
                    action_id: action.id.clone(),
                    outcome: ActionOutcome::Skipped,
                    output: serde_json::Value::Null,
                    error: None,
                };
                results.insert(action.id.clone(), skipped.clone());
                ordered_results.push(skipped);
                continue;
            }

            let config = substitute(&action.config, ctx, &results);
            let outcome = match action.action_type {
                ActionType::SendMessage => self.dispatcher.send_message(&config).await,
                ActionType::CreateTask => self.dispatcher.create_task(&config).await,
                ActionType::NotifyStaff => self.dispatcher.notify_staff(&config).await,
                ActionType::Webhook => self.dispatcher.webhook(&config).await,
            };

            let result = match outcome {
                Ok(output) => {
                    any_succeeded = true;
                    last_completed = Some(ActionOutcome::Success);
                    ActionResult {
                        action_id: action.id.clone(),
                        outcome: ActionOutcome::Success,
                        output,
                        error: None,
                    }
                }
                Err(e) => {
                    any_failed = true;
                    last_completed = Some(ActionOutcome::Failed);
                    if !action.continue_on_error {
                        stopped_early = true;
                    }
                    ActionResult {
                        action_id: action.id.clone(),
                        outcome: ActionOutcome::Failed,
                        output: serde_json::Value::Null,
                        error: Some(e.to_string()),
                    }
                }
            };

            results.insert(action.id.clone(), result.clone());
            ordered_results.push(result);
        }

        let status = if any_failed && any_succeeded {
            ChainStatus::Partial
        } else if any_failed {
            ChainStatus::Failed
        } else {
            ChainStatus::Completed
        };

        ChainExecutionResult {
            status,
            action_results: ordered_results,
        }
    }

    fn condition_holds(
        &self,
        condition: Option<&Condition>,
        last_completed: Option<ActionOutcome>,
        results: &HashMap<String, ActionResult>,
    ) -> bool {
        match condition {
            None | Some(Condition::Always) => true,
            Some(Condition::PreviousSuccess) => last_completed == Some(ActionOutcome::Success),
            Some(Condition::PreviousFailed) => last_completed == Some(ActionOutcome::Failed),
            Some(Condition::Expression { expression }) => match eval_expression(expression, results) {
                Some(v) => v,
                None => {
                    warn!(%expression, "unevaluable condition expression, defaulting to true");
                    true
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedDispatcher {
        fail_create_task: bool,
    }

    #[async_trait]
    impl ActionDispatcher for ScriptedDispatcher {
        async fn send_message(&self, _config: &serde_json::Value) -> crate::error::Result<serde_json::Value> {
            Ok(serde_json::json!({"sent": true}))
        }
        async fn create_task(&self, _config: &serde_json::Value) -> crate::error::Result<serde_json::Value> {
            if self.fail_create_task {
                Err(crate::error::AutomationError::ActionFailed("boom".to_string()))
            } else {
                Ok(serde_json::json!({"taskId": "tsk_1"}))
            }
        }
        async fn notify_staff(&self, _config: &serde_json::Value) -> crate::error::Result<serde_json::Value> {
            Ok(serde_json::json!({"notified": true}))
        }
        async fn webhook(&self, _config: &serde_json::Value) -> crate::error::Result<serde_json::Value> {
            Ok(serde_json::json!({"status": 200}))
        }
    }

    fn chain_actions() -> Vec<Action> {
        vec![
            Action {
                id: "a1".to_string(),
                action_type: ActionType::CreateTask,
                config: serde_json::json!({"title": "Welcome"}),
                order: 0,
                continue_on_error: true,
                condition: Some(Condition::Always),
            },
            Action {
                id: "a2".to_string(),
                action_type: ActionType::SendMessage,
                config: serde_json::json!({"channel_medium": "short_message", "to": "x", "body": "hi"}),
                order: 1,
                continue_on_error: true,
                condition: Some(Condition::PreviousSuccess),
            },
            Action {
                id: "a3".to_string(),
                action_type: ActionType::NotifyStaff,
                config: serde_json::json!({"title": "check on a1"}),
                order: 2,
                continue_on_error: true,
                condition: Some(Condition::PreviousFailed),
            },
        ]
    }

    #[tokio::test]
    async fn a1_succeeds_then_a2_runs_and_a3_is_skipped() {
        let dispatcher = ScriptedDispatcher { fail_create_task: false };
        let executor = ChainExecutor::new(&dispatcher);
        let result = executor.run(&chain_actions(), &ExecutionContext::default()).await;
        assert_eq!(result.action_results[0].outcome, ActionOutcome::Success);
        assert_eq!(result.action_results[1].outcome, ActionOutcome::Success);
        assert_eq!(result.action_results[2].outcome, ActionOutcome::Skipped);
        assert_eq!(result.status, ChainStatus::Completed);
    }

    #[tokio::test]
    async fn a1_fails_with_continue_then_a2_skipped_a3_runs_overall_partial() {
        let dispatcher = ScriptedDispatcher { fail_create_task: true };
        let executor = ChainExecutor::new(&dispatcher);
        let result = executor.run(&chain_actions(), &ExecutionContext::default()).await;
        assert_eq!(result.action_results[0].outcome, ActionOutcome::Failed);
        assert_eq!(result.action_results[1].outcome, ActionOutcome::Skipped);
        assert_eq!(result.action_results[2].outcome, ActionOutcome::Success);
        assert_eq!(result.status, ChainStatus::Partial);
    }

    #[tokio::test]
    async fn stop_without_continue_on_error_skips_the_rest() {
        let mut actions = chain_actions();
        actions[0].continue_on_error = false;
        let dispatcher = ScriptedDispatcher { fail_create_task: true };
        let executor = ChainExecutor::new(&dispatcher);
        let result = executor.run(&actions, &ExecutionContext::default()).await;
        assert_eq!(result.action_results[0].outcome, ActionOutcome::Failed);
        assert_eq!(result.action_results[1].outcome, ActionOutcome::Skipped);
        assert_eq!(result.action_results[2].outcome, ActionOutcome::Skipped);
        assert_eq!(result.status, ChainStatus::Failed);
    }
}
