//! Two-cadence automation scheduler (spec §4.3, §5): one logical worker
//! ticks time-based triggers against reservation dates (default 60 s), the
//! other polls the retry queue (default 10 s). Grounded directly on
//! `skynet_scheduler::engine::SchedulerEngine::run`'s `tokio::select!` loop
//! shape and `mark_missed_on_startup`-style idempotent polling.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{error, info, warn};

use butler_core::time::now_iso8601;
use butler_persistence::models::{AutomationRule, ExecutionStatus, ReservationStatus};
use butler_persistence::Repositories;
use butler_registry::AdapterRegistry;

use crate::actions::ActionDispatcher;
use crate::chain::ChainExecutor;
use crate::types::{Action, ExecutionContext, RetryConfig, TimeTriggerType, Trigger};

/// What gets snapshotted into `trigger_data` at execution-creation time: the
/// context plus the already-resolved action chain, so a legacy single-action
/// rule's minted id stays stable across retries instead of being re-derived
/// from `rule.actions` (and its timestamp suffix recomputed) on every tick.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct ExecutionPayload {
    ctx: ExecutionContext,
    actions: Vec<Action>,
}

pub struct SchedulerConfig {
    pub time_trigger_cadence: Duration,
    pub retry_cadence: Duration,
    pub pms_sync_cadence: Duration,
    pub retry_ceiling: u32,
    pub retry_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_trigger_cadence: Duration::from_secs(60),
            retry_cadence: Duration::from_secs(10),
            pms_sync_cadence: Duration::from_secs(300),
            retry_ceiling: 5,
            retry_batch_size: 10,
        }
    }
}

pub struct SchedulerEngine {
    repos: Arc<Repositories>,
    dispatcher: Arc<dyn ActionDispatcher>,
    registry: Arc<AdapterRegistry>,
    config: SchedulerConfig,
    last_pms_sync: AsyncMutex<String>,
}

impl SchedulerEngine {
    pub fn new(repos: Arc<Repositories>, dispatcher: Arc<dyn ActionDispatcher>, registry: Arc<AdapterRegistry>, config: SchedulerConfig) -> Self {
        // Lacking a persisted watermark, a fresh process looks back 24h on
        // its first sync rather than re-ingesting the PMS's full history.
        let initial_watermark = (Utc::now() - ChronoDuration::hours(24)).to_rfc3339();
        Self { repos, dispatcher, registry, config, last_pms_sync: AsyncMutex::new(initial_watermark) }
    }

    /// Main loop: three independent ticks, all stopped by one `shutdown`
    /// signal, mirroring `SchedulerEngine::run(self, shutdown)`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("automation scheduler started");
        let mut time_interval = tokio::time::interval(self.config.time_trigger_cadence);
        let mut retry_interval = tokio::time::interval(self.config.retry_cadence);
        let mut pms_interval = tokio::time::interval(self.config.pms_sync_cadence);

        loop {
            tokio::select! {
                _ = time_interval.tick() => {
                    if let Err(e) = self.tick_time_triggers().await {
                        error!(error = %e, "time-trigger tick failed");
                    }
                }
                _ = retry_interval.tick() => {
                    if let Err(e) = self.tick_retries().await {
                        error!(error = %e, "retry tick failed");
                    }
                }
                _ = pms_interval.tick() => {
                    if let Err(e) = self.tick_pms_sync().await {
                        error!(error = %e, "pms sync tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("automation scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Pulls reservations touched since the last successful sync from the
    /// active PMS adapter and upserts the embedded guest plus the
    /// reservation itself (spec §6: "PMSAdapter... the externalId/source
    /// pair used for upsert"). A missing or failing PMS adapter is logged
    /// and skipped, not fatal to the tick.
    async fn tick_pms_sync(&self) -> butler_persistence::Result<()> {
        let Some(pms) = self.registry.active_pms() else {
            return Ok(());
        };
        let mut since = self.last_pms_sync.lock().await;
        let sync_started_at = Utc::now().to_rfc3339();
        let reservations = match pms.get_modified_reservations(&since).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "pms sync request failed");
                return Ok(());
            }
        };
        for res in &reservations {
            let Ok(status) = ReservationStatus::from_str(&res.status) else {
                warn!(confirmation_number = %res.confirmation_number, status = %res.status, "pms returned an unrecognized reservation status, skipping");
                continue;
            };
            let guest = self.repos.guests.upsert_from_pms(
                &res.guest.source,
                &res.guest.external_id,
                res.guest.phone.as_deref(),
                res.guest.email.as_deref(),
                res.guest.first_name.as_deref(),
                res.guest.last_name.as_deref(),
                res.guest.vip_tier.as_deref(),
                res.guest.loyalty_tier.as_deref(),
            )?;
            self.repos.reservations.upsert(
                &res.confirmation_number,
                &guest.id,
                status,
                &res.arrival_date,
                &res.departure_date,
                res.room_number.as_deref(),
            )?;
        }
        info!(count = reservations.len(), "pms sync tick complete");
        *since = sync_started_at;
        Ok(())
    }

    async fn tick_time_triggers(&self) -> butler_persistence::Result<()> {
        let today = Utc::now().date_naive();
        let rules = self.repos.rules.list_enabled()?;
        for rule in rules {
            let Ok(trigger) = serde_json::from_value::<Trigger>(rule.trigger.clone()) else {
                warn!(rule_id = %rule.id, "rule has unparseable trigger, skipping");
                continue;
            };
            let Trigger::Time { kind, offset_days, .. } = trigger else {
                continue;
            };
            if matches!(kind, TimeTriggerType::Scheduled) {
                // `scheduled` triggers fire on the tick cadence itself, not
                // against a reservation date.
                self.fire_rule(&rule, ExecutionContext { rule_id: rule.id.to_string(), rule_name: rule.name.clone(), ..Default::default() }).await;
                continue;
            }
            let offset = ChronoDuration::days(offset_days.unwrap_or(0));
            let target_date = match kind {
                TimeTriggerType::BeforeArrival => today + offset,
                TimeTriggerType::AfterArrival => today - offset,
                TimeTriggerType::BeforeDeparture => today + offset,
                TimeTriggerType::AfterDeparture => today - offset,
                TimeTriggerType::Scheduled => unreachable!(),
            };
            let date_str = target_date.format("%Y-%m-%d").to_string();
            let reservations = match kind {
                TimeTriggerType::BeforeArrival | TimeTriggerType::AfterArrival => {
                    self.repos.reservations.list_by_arrival_date(&date_str)?
                }
                TimeTriggerType::BeforeDeparture | TimeTriggerType::AfterDeparture => {
                    self.repos.reservations.list_by_departure_date(&date_str)?
                }
                TimeTriggerType::Scheduled => unreachable!(),
            };
            for reservation in reservations {
                let guest = self.repos.guests.get(&reservation.guest_id)?;
                let ctx = ExecutionContext {
                    rule_id: rule.id.to_string(),
                    rule_name: rule.name.clone(),
                    guest_first_name: guest.as_ref().and_then(|g| g.first_name.clone()),
                    guest_last_name: guest.as_ref().and_then(|g| g.last_name.clone()),
                    room_number: reservation.room_number.clone(),
                    arrival_date: Some(reservation.arrival_date.clone()),
                    departure_date: Some(reservation.departure_date.clone()),
                    guest_id: Some(reservation.guest_id.to_string()),
                    reservation_id: Some(reservation.id.to_string()),
                    event_type: None,
                };
                self.fire_rule(&rule, ctx).await;
            }
        }
        Ok(())
    }

    /// Dispatch one event-based trigger to every enabled rule listening for
    /// it. The event bus calls this from its event-consumer task.
    pub async fn handle_event(&self, event_type: &str, ctx: ExecutionContext) -> butler_persistence::Result<()> {
        let rules = self.repos.rules.list_enabled()?;
        for rule in rules {
            let Ok(Trigger::Event { event_type: rule_event }) = serde_json::from_value::<Trigger>(rule.trigger.clone()) else {
                continue;
            };
            if rule_event == event_type {
                self.fire_rule(&rule, ctx.clone()).await;
            }
        }
        Ok(())
    }

    async fn fire_rule(&self, rule: &AutomationRule, ctx: ExecutionContext) {
        let actions = crate::legacy::rehydrate_actions(&rule.actions);
        if actions.is_empty() {
            warn!(rule_id = %rule.id, "rule has an empty or unparseable action chain, skipping");
            return;
        }
        let started = Utc::now();
        let payload = ExecutionPayload { ctx: ctx.clone(), actions: actions.clone() };
        let execution = match self
            .repos
            .executions
            .create_pending(&rule.id, serde_json::to_value(&payload).unwrap_or_default(), 1)
        {
            Ok(e) => e,
            Err(e) => {
                error!(rule_id = %rule.id, error = %e, "failed to create execution row");
                return;
            }
        };

        let executor = ChainExecutor::new(self.dispatcher.as_ref());
        let chain_result = executor.run(&actions, &ctx).await;
        let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
        let success = !matches!(chain_result.status, crate::types::ChainStatus::Failed);
        let retry_config: Option<RetryConfig> = serde_json::from_value(rule.retry_config.clone()).ok();

        let status = match chain_result.status {
            crate::types::ChainStatus::Completed => ExecutionStatus::Completed,
            crate::types::ChainStatus::Partial => ExecutionStatus::Partial,
            crate::types::ChainStatus::Failed => {
                if let Some(cfg) = &retry_config {
                    if !crate::retry::RetryHandler::exhausted(cfg, 1) {
                        ExecutionStatus::Pending
                    } else {
                        ExecutionStatus::Failed
                    }
                } else {
                    ExecutionStatus::Failed
                }
            }
        };

        let next_retry_at = if status == ExecutionStatus::Pending {
            retry_config.as_ref().map(|cfg| crate::retry::RetryHandler::next_retry_at(cfg, 1, Utc::now()))
        } else {
            None
        };

        let error_summary = chain_result
            .action_results
            .iter()
            .find_map(|r| r.error.clone());

        if let Err(e) = self.repos.executions.record_outcome(
            &execution.id,
            status,
            serde_json::to_value(&chain_result.action_results).unwrap_or_default(),
            duration_ms,
            error_summary.as_deref(),
            next_retry_at.as_deref(),
        ) {
            error!(execution_id = %execution.id, error = %e, "failed to record execution outcome");
        }

        if status != ExecutionStatus::Pending {
            if let Err(e) = self.repos.rules.record_run(&rule.id, success, error_summary.as_deref(), self.config.retry_ceiling) {
                error!(rule_id = %rule.id, error = %e, "failed to record rule run");
            }
        }
    }

    /// Retry scheduler: claims due `pending` executions, rebuilds the
    /// execution context and action chain from the snapshot taken when the
    /// execution was first created (so a legacy single-action rule's minted
    /// id survives unchanged across attempts), re-runs the chain, and writes
    /// the outcome.
    async fn tick_retries(&self) -> butler_persistence::Result<()> {
        let now = now_iso8601();
        let due = self.repos.executions.claim_due_retries(&now, self.config.retry_batch_size)?;
        for execution in due {
            let Some(rule) = self.repos.rules.get(&execution.rule_id)? else {
                warn!(execution_id = %execution.id, "retry execution references a missing rule");
                continue;
            };
            let payload: ExecutionPayload = serde_json::from_value(execution.trigger_data.clone()).unwrap_or_default();
            let ctx = payload.ctx;
            let actions = payload.actions;
            let retry_config: Option<RetryConfig> = serde_json::from_value(rule.retry_config.clone()).ok();
            let attempt = execution.attempt_number + 1;

            let started = Utc::now();
            let executor = ChainExecutor::new(self.dispatcher.as_ref());
            let chain_result = executor.run(&actions, &ctx).await;
            let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
            let success = !matches!(chain_result.status, crate::types::ChainStatus::Failed);
            let error_summary = chain_result.action_results.iter().find_map(|r| r.error.clone());

            let (status, next_retry_at) = if success {
                (ExecutionStatus::Completed, None)
            } else if let Some(cfg) = &retry_config {
                if crate::retry::RetryHandler::exhausted(cfg, attempt) {
                    (ExecutionStatus::Failed, None)
                } else {
                    (ExecutionStatus::Pending, Some(crate::retry::RetryHandler::next_retry_at(cfg, attempt, Utc::now())))
                }
            } else {
                (ExecutionStatus::Failed, None)
            };

            if let Err(e) = self.repos.executions.record_outcome(
                &execution.id,
                status,
                serde_json::to_value(&chain_result.action_results).unwrap_or_default(),
                duration_ms,
                error_summary.as_deref(),
                next_retry_at.as_deref(),
            ) {
                error!(execution_id = %execution.id, error = %e, "failed to record retry outcome");
            }

            if status != ExecutionStatus::Pending {
                if let Err(e) = self.repos.rules.record_run(&rule.id, success, error_summary.as_deref(), self.config.retry_ceiling) {
                    error!(rule_id = %rule.id, error = %e, "failed to record rule run after retry");
                }
            }
        }
        Ok(())
    }
}
