//! Safety coordinator: risk evaluation and automated mitigation.

use super::metrics::{Breach, DetectionTracker, RiskMetrics, classify};
use crate::config::SafetyThresholds;
use crate::coordinator::ExecutionCoordinator;
use crate::emergency::{CircuitBreakerStats, RecoveryAction, RecoveryExecutor, RecoveryPlan};
use crate::error::{RecoveryError, SafetyViolation};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_data::StoreError;
use sniper_domain::entities::{AlertSeverity, SafetyAction, SafetyActionKind, SafetyAlert};
use sniper_domain::enums::SafetyStatus;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_KEPT: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SafetyEvent {
    Alert(SafetyAlert),
    Action(SafetyAction),
    StatusChanged { from: SafetyStatus, to: SafetyStatus },
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAssessment {
    pub status: SafetyStatus,
    pub breaches: Vec<Breach>,
    pub alerts: Vec<SafetyAlert>,
    pub actions: Vec<SafetyAction>,
    pub recovery_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySnapshot {
    pub status: SafetyStatus,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub metrics: Option<RiskMetrics>,
    pub breaker: CircuitBreakerStats,
    pub active_recovery: Option<Uuid>,
    pub recent_alerts: Vec<SafetyAlert>,
    pub recent_actions: Vec<SafetyAction>,
}

struct SafetyState {
    status: SafetyStatus,
    last_metrics: Option<RiskMetrics>,
    critical_crossings: VecDeque<Instant>,
    alerts: VecDeque<SafetyAlert>,
    actions: VecDeque<SafetyAction>,
}

/// Watches risk metrics and reacts by level.
///
/// `warning` raises alerts. `critical` opens the breaker and closes the
/// largest positions in the background until exposure is back under the
/// warning threshold. Two critical readings inside the escalation window
/// mean `emergency`: the halt switch is engaged before the recovery plan is
/// started, and entries stay halted until that recovery completes or an
/// operator resets.
pub struct SafetyCoordinator {
    session_id: String,
    thresholds: RwLock<SafetyThresholds>,
    coordinator: Arc<ExecutionCoordinator>,
    recovery: Arc<RecoveryExecutor>,
    detection: DetectionTracker,
    events: broadcast::Sender<SafetyEvent>,
    state: RwLock<SafetyState>,
    reduction: Mutex<Option<JoinHandle<()>>>,
}

impl SafetyCoordinator {
    pub fn new(
        session_id: impl Into<String>,
        thresholds: SafetyThresholds,
        coordinator: Arc<ExecutionCoordinator>,
        recovery: Arc<RecoveryExecutor>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            session_id: session_id.into(),
            thresholds: RwLock::new(thresholds),
            coordinator,
            recovery,
            detection: DetectionTracker::default(),
            events,
            state: RwLock::new(SafetyState {
                status: SafetyStatus::Safe,
                last_metrics: None,
                critical_crossings: VecDeque::new(),
                alerts: VecDeque::new(),
                actions: VecDeque::new(),
            }),
            reduction: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SafetyEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn recovery(&self) -> &Arc<RecoveryExecutor> {
        &self.recovery
    }

    pub async fn update_thresholds(&self, thresholds: SafetyThresholds) {
        *self.thresholds.write().await = thresholds;
    }

    /// Records the outcome of one upstream listing detection.
    pub fn record_detection(&self, success: bool) {
        self.detection.record(success);
    }

    /// Gathers current metrics from the coordinator and the stores.
    ///
    /// # Errors
    /// Returns an error if open positions cannot be listed.
    pub async fn compute_metrics(&self) -> Result<RiskMetrics, StoreError> {
        let open = self.coordinator.positions().list_open().await?;
        let exposure: Decimal = open.iter().map(|p| p.cost()).sum();
        let ledger = self.coordinator.ledger().snapshot().await;
        let api = self.coordinator.gate().stats().snapshot().await;
        let capital_base = self.thresholds.read().await.capital_base;

        Ok(RiskMetrics {
            drawdown_pct: ledger.drawdown_pct(capital_base),
            exposure,
            open_positions: open.len(),
            consecutive_losses: ledger.consecutive_losses,
            api_latency_ms: api.avg_latency_ms,
            api_success_rate: api.success_rate,
            detection_failure_rate: self.detection.failure_rate(),
            computed_at: Utc::now(),
        })
    }

    /// Computes metrics and evaluates them.
    ///
    /// # Errors
    /// Returns an error if metrics cannot be computed.
    pub async fn recompute(&self) -> Result<SafetyAssessment, StoreError> {
        let metrics = self.compute_metrics().await?;
        Ok(self.evaluate(metrics).await)
    }

    /// Classifies `metrics` and applies the mitigation for the level reached.
    pub async fn evaluate(&self, metrics: RiskMetrics) -> SafetyAssessment {
        let thresholds = self.thresholds.read().await.clone();
        let (level, breaches) = classify(&metrics, &thresholds);
        let window = Duration::from_millis(thresholds.escalation_window_ms);
        let halt = self.coordinator.halt_switch();

        let alerts: Vec<SafetyAlert> = breaches
            .iter()
            .map(|b| SafetyAlert::new(AlertSeverity::from(b.level), b.metric, b.message()))
            .collect();
        let trigger_alert = alerts
            .iter()
            .find(|a| a.severity == AlertSeverity::Critical)
            .map(|a| a.id);

        let mut actions = Vec::new();
        let mut status = level;
        if level >= SafetyStatus::Critical {
            let now = Instant::now();
            let crossings = {
                let mut state = self.state.write().await;
                state.critical_crossings.push_back(now);
                while state
                    .critical_crossings
                    .front()
                    .is_some_and(|at| now.duration_since(*at) > window)
                {
                    state.critical_crossings.pop_front();
                }
                state.critical_crossings.len()
            };
            if crossings >= 2 {
                status = SafetyStatus::Emergency;
            }
        }

        let mut recovery_id = None;
        match status {
            SafetyStatus::Emergency => {
                let reason = format!(
                    "critical thresholds breached twice within {}ms",
                    thresholds.escalation_window_ms
                );
                // Visible to every reader before the recovery task exists.
                halt.engage(reason.clone());
                actions.push(SafetyAction::new(SafetyActionKind::HaltTrading, reason.clone(), trigger_alert));
                self.coordinator.breaker().force_open(&reason).await;

                let plan = RecoveryPlan::emergency_halt(Duration::from_millis(thresholds.recovery_phase_timeout_ms));
                match self.recovery.start(plan, &self.session_id).await {
                    Ok(id) => {
                        recovery_id = Some(id);
                        actions.push(SafetyAction::new(
                            SafetyActionKind::StartRecovery,
                            format!("recovery {id} started"),
                            trigger_alert,
                        ));
                    }
                    Err(RecoveryError::AlreadyActive { execution, .. }) => {
                        info!(execution_id = %execution, "Recovery already active for session");
                        recovery_id = Some(execution);
                    }
                    Err(e) => error!(error = %e, "Failed to start recovery"),
                }
            }
            SafetyStatus::Critical => {
                let reason = breaches
                    .iter()
                    .filter(|b| b.level == SafetyStatus::Critical)
                    .map(Breach::message)
                    .collect::<Vec<_>>()
                    .join("; ");
                self.coordinator.breaker().force_open(&reason).await;
                self.start_reduction(thresholds.warning.exposure).await;
                actions.push(SafetyAction::new(SafetyActionKind::ReduceExposure, reason, trigger_alert));
            }
            SafetyStatus::Warning | SafetyStatus::Safe => {}
        }

        // An engaged halt pins the status until it is lifted.
        if halt.is_engaged() {
            status = SafetyStatus::Emergency;
        }

        for alert in &alerts {
            warn!(severity = ?alert.severity, metric = %alert.metric, message = %alert.message, "Safety alert");
        }
        let previous = {
            let mut state = self.state.write().await;
            let previous = state.status;
            state.status = status;
            state.last_metrics = Some(metrics);
            for alert in &alerts {
                push_bounded(&mut state.alerts, alert.clone());
            }
            for action in &actions {
                push_bounded(&mut state.actions, action.clone());
            }
            previous
        };

        for alert in &alerts {
            self.emit(SafetyEvent::Alert(alert.clone()));
        }
        for action in &actions {
            self.emit(SafetyEvent::Action(action.clone()));
        }
        if previous != status {
            info!(from = %previous, to = %status, "Safety status changed");
            self.emit(SafetyEvent::StatusChanged {
                from: previous,
                to: status,
            });
        }

        SafetyAssessment {
            status,
            breaches,
            alerts,
            actions,
            recovery_id,
        }
    }

    /// Starts closing positions unless an earlier reduction is still running.
    async fn start_reduction(&self, target: Decimal) {
        let mut slot = self.reduction.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Exposure reduction already running");
            return;
        }
        let recovery = Arc::clone(&self.recovery);
        *slot = Some(tokio::spawn(async move {
            match recovery.perform(&RecoveryAction::ReduceExposure { target }).await {
                Ok(_) => info!(%target, "Exposure reduced"),
                Err(e) => error!(error = %e, "Exposure reduction failed"),
            }
        }));
    }

    pub async fn status(&self) -> SafetyStatus {
        let status = self.state.read().await.status;
        if self.coordinator.halt_switch().is_engaged() {
            SafetyStatus::Emergency
        } else if status == SafetyStatus::Emergency {
            // Halt lifted by a completed recovery.
            SafetyStatus::Safe
        } else {
            status
        }
    }

    /// # Errors
    /// Returns a [`SafetyViolation`] while trading is halted.
    pub fn check_trading_allowed(&self) -> Result<(), SafetyViolation> {
        self.coordinator.halt_switch().check()
    }

    /// Operator reset: lifts the halt, closes the breaker and forgets
    /// earlier critical readings.
    pub async fn reset(&self, operator: &str) -> SafetyStatus {
        let released = self.coordinator.halt_switch().release();
        self.coordinator.breaker().reset().await;
        let previous = {
            let mut state = self.state.write().await;
            state.critical_crossings.clear();
            let previous = state.status;
            state.status = SafetyStatus::Safe;
            previous
        };
        warn!(operator = operator, released, "Safety state reset by operator");
        if previous != SafetyStatus::Safe {
            self.emit(SafetyEvent::StatusChanged {
                from: previous,
                to: SafetyStatus::Safe,
            });
        }
        SafetyStatus::Safe
    }

    pub async fn snapshot(&self) -> SafetySnapshot {
        let status = self.status().await;
        let state = self.state.read().await;
        let halt = self.coordinator.halt_switch().info();
        SafetySnapshot {
            status,
            halted: halt.is_some(),
            halt_reason: halt.map(|h| h.reason),
            metrics: state.last_metrics.clone(),
            breaker: self.coordinator.breaker().stats().await,
            active_recovery: self.recovery.active_for(&self.session_id).await,
            recent_alerts: state.alerts.iter().rev().take(20).cloned().collect(),
            recent_actions: state.actions.iter().rev().take(20).cloned().collect(),
        }
    }

    fn emit(&self, event: SafetyEvent) {
        let _ = self.events.send(event);
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T) {
    if queue.len() == MAX_KEPT {
        queue.pop_front();
    }
    queue.push_back(item);
}
