//! Recovery plans.
//!
//! A plan is an ordered list of phases. Phases run one after another, each
//! under its own timeout and only once its prerequisites completed. Every
//! action may hand back an inverse action; when a required phase fails, the
//! collected inverses run in reverse order. A session runs at most one
//! recovery at a time.

use crate::error::RecoveryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Plan id of the built-in emergency halt recovery.
pub const EMERGENCY_HALT_PLAN: &str = "emergency-halt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Snapshot open exposure into the log.
    AssessExposure,
    /// Market-sell every open position.
    CloseAllPositions,
    /// Market-sell the largest positions until exposure is at or below
    /// `target`, closing at least one.
    ReduceExposure { target: Decimal },
    /// Fails unless no position is open.
    VerifyFlat,
    ResetBreaker,
    EngageHalt { reason: String },
    ReleaseHalt,
    Notify { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPhase {
    pub id: String,
    pub name: String,
    pub actions: Vec<RecoveryAction>,
    /// Ids of earlier phases that must have completed.
    pub prerequisites: Vec<String>,
    #[serde(rename = "timeoutMs", serialize_with = "serialize_millis")]
    pub timeout: Duration,
    /// A failed optional phase does not stop the plan.
    pub optional: bool,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl RecoveryPhase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            actions: Vec::new(),
            prerequisites: Vec::new(),
            timeout,
            optional: false,
        }
    }

    #[must_use]
    pub fn action(mut self, action: RecoveryAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn requires(mut self, phase_id: impl Into<String>) -> Self {
        self.prerequisites.push(phase_id.into());
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    pub id: String,
    pub name: String,
    pub phases: Vec<RecoveryPhase>,
    pub rollback_on_failure: bool,
}

impl RecoveryPlan {
    /// Assess, close all exposure, then verify flat and lift the halt.
    pub fn emergency_halt(phase_timeout: Duration) -> Self {
        Self {
            id: EMERGENCY_HALT_PLAN.to_string(),
            name: "Emergency halt recovery".to_string(),
            phases: vec![
                RecoveryPhase::new("assess", "Assess exposure", phase_timeout)
                    .action(RecoveryAction::AssessExposure),
                RecoveryPhase::new("close-exposure", "Close open positions", phase_timeout)
                    .requires("assess")
                    .action(RecoveryAction::CloseAllPositions),
                RecoveryPhase::new("verify", "Verify and resume", phase_timeout)
                    .requires("close-exposure")
                    .action(RecoveryAction::VerifyFlat)
                    .action(RecoveryAction::ResetBreaker)
                    .action(RecoveryAction::ReleaseHalt),
            ],
            rollback_on_failure: true,
        }
    }

    fn validate(&self) -> Result<(), RecoveryError> {
        if self.phases.is_empty() {
            return Err(RecoveryError::InvalidPlan(format!("{} has no phases", self.id)));
        }
        let mut seen = HashSet::new();
        for phase in &self.phases {
            if let Some(missing) = phase.prerequisites.iter().find(|p| !seen.contains(p.as_str())) {
                return Err(RecoveryError::InvalidPlan(format!(
                    "phase {} requires {missing}, which does not run before it",
                    phase.id
                )));
            }
            if !seen.insert(phase.id.as_str()) {
                return Err(RecoveryError::InvalidPlan(format!("duplicate phase {}", phase.id)));
            }
        }
        Ok(())
    }
}

/// Performs recovery actions against the running kernel.
#[async_trait]
pub trait RecoveryActionExecutor: Send + Sync {
    /// Runs `action` and returns the action that undoes it, if any.
    async fn execute(&self, action: &RecoveryAction) -> Result<Option<RecoveryAction>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// Registered, first phase not started yet.
    Pending,
    Executing,
    Paused,
    Completed,
    Failed,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryExecution {
    pub id: Uuid,
    pub plan_id: String,
    pub session_id: String,
    pub status: RecoveryStatus,
    pub current_phase: Option<String>,
    pub completed_phases: Vec<String>,
    pub failed_phases: Vec<String>,
    pub error: Option<String>,
    /// Inverse actions that ran, in the order they ran.
    pub rolled_back: Vec<RecoveryAction>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecoveryEventKind {
    Started,
    PhaseStarted { phase: String },
    PhaseCompleted { phase: String },
    PhaseFailed { phase: String, reason: String },
    RolledBack { action: RecoveryAction },
    Paused,
    Resumed,
    Finished { status: RecoveryStatus },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEvent {
    pub execution_id: Uuid,
    pub plan_id: String,
    #[serde(flatten)]
    pub kind: RecoveryEventKind,
}

/// Runs recovery plans and keeps their history.
pub struct RecoveryExecutor {
    actions: Arc<dyn RecoveryActionExecutor>,
    executions: RwLock<HashMap<Uuid, RecoveryExecution>>,
    /// Session id to its active execution.
    active: Mutex<HashMap<String, Uuid>>,
    pauses: RwLock<HashMap<Uuid, watch::Sender<bool>>>,
    events: broadcast::Sender<RecoveryEvent>,
}

impl RecoveryExecutor {
    pub fn new(actions: Arc<dyn RecoveryActionExecutor>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            actions,
            executions: RwLock::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            pauses: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    /// Registers the execution as `pending` and runs it in the background.
    /// It turns `executing` once the background task picks it up.
    ///
    /// The execution is visible through [`get`](Self::get) before this
    /// returns.
    ///
    /// # Errors
    /// Fails if the plan is invalid or the session already has an active
    /// recovery.
    pub async fn start(self: &Arc<Self>, plan: RecoveryPlan, session_id: &str) -> Result<Uuid, RecoveryError> {
        let id = self.register(&plan, session_id).await?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(id, plan).await;
        });
        Ok(id)
    }

    /// Runs the plan to completion on the current task.
    ///
    /// # Errors
    /// Same as [`start`](Self::start).
    pub async fn execute(&self, plan: RecoveryPlan, session_id: &str) -> Result<RecoveryExecution, RecoveryError> {
        let id = self.register(&plan, session_id).await?;
        self.run(id, plan).await;
        self.get(id).await.ok_or(RecoveryError::NotFound(id))
    }

    async fn register(&self, plan: &RecoveryPlan, session_id: &str) -> Result<Uuid, RecoveryError> {
        plan.validate()?;
        let mut active = self.active.lock().await;
        if let Some(existing) = active.get(session_id) {
            return Err(RecoveryError::AlreadyActive {
                session: session_id.to_string(),
                execution: *existing,
            });
        }

        let id = Uuid::new_v4();
        let execution = RecoveryExecution {
            id,
            plan_id: plan.id.clone(),
            session_id: session_id.to_string(),
            status: RecoveryStatus::Pending,
            current_phase: None,
            completed_phases: Vec::new(),
            failed_phases: Vec::new(),
            error: None,
            rolled_back: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        };
        self.executions.write().await.insert(id, execution);
        self.pauses.write().await.insert(id, watch::channel(false).0);
        active.insert(session_id.to_string(), id);

        info!(execution_id = %id, plan = %plan.id, session = session_id, "Recovery started");
        self.emit(id, &plan.id, RecoveryEventKind::Started);
        Ok(id)
    }

    async fn run(&self, id: Uuid, plan: RecoveryPlan) {
        self.update(id, |e| {
            if e.status == RecoveryStatus::Pending {
                e.status = RecoveryStatus::Executing;
            }
        })
        .await;
        let mut pause_rx = self.pauses.read().await.get(&id).map(watch::Sender::subscribe);
        let mut rollback: Vec<RecoveryAction> = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut failure: Option<String> = None;

        for phase in &plan.phases {
            if let Some(rx) = pause_rx.as_mut() {
                while *rx.borrow_and_update() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }

            self.update(id, |e| e.current_phase = Some(phase.id.clone())).await;
            self.emit(id, &plan.id, RecoveryEventKind::PhaseStarted { phase: phase.id.clone() });

            let missing: Vec<&str> = phase
                .prerequisites
                .iter()
                .filter(|p| !completed.contains(*p))
                .map(String::as_str)
                .collect();
            let outcome = if missing.is_empty() {
                match tokio::time::timeout(phase.timeout, self.run_actions(phase, &mut rollback)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(format!("timed out after {}ms", phase.timeout.as_millis())),
                }
            } else {
                Err(format!("prerequisite not met: {}", missing.join(", ")))
            };

            match outcome {
                Ok(()) => {
                    completed.insert(phase.id.clone());
                    self.update(id, |e| e.completed_phases.push(phase.id.clone())).await;
                    self.emit(id, &plan.id, RecoveryEventKind::PhaseCompleted { phase: phase.id.clone() });
                }
                Err(reason) => {
                    warn!(execution_id = %id, phase = %phase.id, reason = %reason, "Recovery phase failed");
                    self.update(id, |e| e.failed_phases.push(phase.id.clone())).await;
                    self.emit(
                        id,
                        &plan.id,
                        RecoveryEventKind::PhaseFailed {
                            phase: phase.id.clone(),
                            reason: reason.clone(),
                        },
                    );
                    if !phase.optional {
                        failure = Some(format!("phase {} failed: {reason}", phase.id));
                        break;
                    }
                }
            }
        }

        let status = match failure {
            None => RecoveryStatus::Completed,
            Some(reason) => {
                if plan.rollback_on_failure {
                    self.roll_back(id, &plan.id, rollback).await;
                }
                self.update(id, |e| e.error = Some(reason)).await;
                RecoveryStatus::Failed
            }
        };
        self.finish(id, &plan.id, status).await;
    }

    async fn run_actions(&self, phase: &RecoveryPhase, rollback: &mut Vec<RecoveryAction>) -> Result<(), String> {
        for action in &phase.actions {
            if let Some(inverse) = self.actions.execute(action).await? {
                rollback.push(inverse);
            }
        }
        Ok(())
    }

    async fn roll_back(&self, id: Uuid, plan_id: &str, mut rollback: Vec<RecoveryAction>) {
        while let Some(action) = rollback.pop() {
            match self.actions.execute(&action).await {
                Ok(_) => {
                    info!(execution_id = %id, ?action, "Rollback action executed");
                    self.update(id, |e| e.rolled_back.push(action.clone())).await;
                    self.emit(id, plan_id, RecoveryEventKind::RolledBack { action });
                }
                Err(e) => error!(execution_id = %id, ?action, error = %e, "Rollback action failed"),
            }
        }
    }

    async fn finish(&self, id: Uuid, plan_id: &str, status: RecoveryStatus) {
        let session = {
            let mut executions = self.executions.write().await;
            executions.get_mut(&id).map(|e| {
                e.status = status;
                e.current_phase = None;
                e.finished_at = Some(Utc::now());
                e.session_id.clone()
            })
        };
        if let Some(session) = session {
            let mut active = self.active.lock().await;
            if active.get(&session) == Some(&id) {
                active.remove(&session);
            }
        }
        self.pauses.write().await.remove(&id);

        match status {
            RecoveryStatus::Completed => info!(execution_id = %id, "Recovery completed"),
            _ => error!(execution_id = %id, "Recovery failed"),
        }
        self.emit(id, plan_id, RecoveryEventKind::Finished { status });
    }

    /// Holds the execution before its next phase.
    ///
    /// # Errors
    /// Fails unless the execution is pending or executing.
    pub async fn pause(&self, id: Uuid) -> Result<(), RecoveryError> {
        let plan_id = self
            .transition(
                id,
                "paused",
                &[RecoveryStatus::Pending, RecoveryStatus::Executing],
                RecoveryStatus::Paused,
            )
            .await?;
        if let Some(tx) = self.pauses.read().await.get(&id) {
            tx.send_replace(true);
        }
        self.emit(id, &plan_id, RecoveryEventKind::Paused);
        Ok(())
    }

    /// # Errors
    /// Fails unless the execution is paused.
    pub async fn resume(&self, id: Uuid) -> Result<(), RecoveryError> {
        let plan_id = self
            .transition(id, "resumed", &[RecoveryStatus::Paused], RecoveryStatus::Executing)
            .await?;
        if let Some(tx) = self.pauses.read().await.get(&id) {
            tx.send_replace(false);
        }
        self.emit(id, &plan_id, RecoveryEventKind::Resumed);
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        action: &'static str,
        from: &[RecoveryStatus],
        to: RecoveryStatus,
    ) -> Result<String, RecoveryError> {
        let mut executions = self.executions.write().await;
        let execution = executions.get_mut(&id).ok_or(RecoveryError::NotFound(id))?;
        if !from.contains(&execution.status) {
            return Err(RecoveryError::InvalidState {
                id,
                action,
                status: execution.status.as_str(),
            });
        }
        execution.status = to;
        Ok(execution.plan_id.clone())
    }

    /// Runs a single action outside any plan. No rollback is recorded.
    ///
    /// # Errors
    /// Returns the action's own failure.
    pub async fn perform(&self, action: &RecoveryAction) -> Result<Option<RecoveryAction>, String> {
        self.actions.execute(action).await
    }

    pub async fn get(&self, id: Uuid) -> Option<RecoveryExecution> {
        self.executions.read().await.get(&id).cloned()
    }

    pub async fn active_for(&self, session_id: &str) -> Option<Uuid> {
        self.active.lock().await.get(session_id).copied()
    }

    /// All executions, oldest first.
    pub async fn history(&self) -> Vec<RecoveryExecution> {
        let mut all: Vec<_> = self.executions.read().await.values().cloned().collect();
        all.sort_by_key(|e| e.started_at);
        all
    }

    async fn update<F: FnOnce(&mut RecoveryExecution)>(&self, id: Uuid, f: F) {
        if let Some(execution) = self.executions.write().await.get_mut(&id) {
            f(execution);
        }
    }

    fn emit(&self, execution_id: Uuid, plan_id: &str, kind: RecoveryEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(RecoveryEvent {
            execution_id,
            plan_id: plan_id.to_string(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Semaphore;

    /// `Notify` messages starting with "do" succeed and return an undo,
    /// "fail" fails, "block" waits for a permit, "slow" sleeps 10s.
    struct ScriptedActions {
        log: std::sync::Mutex<Vec<RecoveryAction>>,
        gate: Semaphore,
    }

    impl ScriptedActions {
        fn new() -> Self {
            Self {
                log: std::sync::Mutex::new(Vec::new()),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl RecoveryActionExecutor for ScriptedActions {
        async fn execute(&self, action: &RecoveryAction) -> Result<Option<RecoveryAction>, String> {
            self.log.lock().unwrap().push(action.clone());
            let RecoveryAction::Notify { message } = action else {
                return Ok(None);
            };
            match message.as_str() {
                "fail" => Err("scripted failure".to_string()),
                "block" => {
                    let permit = self.gate.acquire().await.map_err(|e| e.to_string())?;
                    permit.forget();
                    Ok(None)
                }
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(None)
                }
                m if m.starts_with("do") => Ok(Some(RecoveryAction::Notify {
                    message: format!("undo {m}"),
                })),
                _ => Ok(None),
            }
        }
    }

    fn notify(message: &str) -> RecoveryAction {
        RecoveryAction::Notify {
            message: message.to_string(),
        }
    }

    fn phase(id: &str, message: &str) -> RecoveryPhase {
        RecoveryPhase::new(id, id, Duration::from_secs(1)).action(notify(message))
    }

    fn plan(phases: Vec<RecoveryPhase>) -> RecoveryPlan {
        RecoveryPlan {
            id: "test".to_string(),
            name: "test".to_string(),
            phases,
            rollback_on_failure: true,
        }
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<RecoveryEvent>,
        id: Uuid,
        matches: impl Fn(&RecoveryEventKind) -> bool,
    ) -> RecoveryEventKind {
        loop {
            if let Ok(event) = rx.recv().await
                && event.execution_id == id
                && matches(&event.kind)
            {
                return event.kind;
            }
        }
    }

    async fn wait_finished(rx: &mut broadcast::Receiver<RecoveryEvent>, id: Uuid) -> RecoveryStatus {
        match wait_for(rx, id, |k| matches!(k, RecoveryEventKind::Finished { .. })).await {
            RecoveryEventKind::Finished { status } => status,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let actions = Arc::new(ScriptedActions::new());
        let executor = RecoveryExecutor::new(actions.clone());
        let execution = executor
            .execute(plan(vec![phase("a", "one"), phase("b", "two").requires("a")]), "s1")
            .await
            .unwrap();

        assert_eq!(execution.status, RecoveryStatus::Completed);
        assert_eq!(execution.completed_phases, vec!["a", "b"]);
        assert_eq!(*actions.log.lock().unwrap(), vec![notify("one"), notify("two")]);
        assert!(executor.active_for("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_in_reverse_order() {
        let actions = Arc::new(ScriptedActions::new());
        let executor = RecoveryExecutor::new(actions);
        let execution = executor
            .execute(
                plan(vec![phase("a", "do-1"), phase("b", "do-2"), phase("c", "fail")]),
                "s1",
            )
            .await
            .unwrap();

        assert_eq!(execution.status, RecoveryStatus::Failed);
        assert_eq!(execution.failed_phases, vec!["c"]);
        assert_eq!(execution.rolled_back, vec![notify("undo do-2"), notify("undo do-1")]);
        assert!(execution.error.unwrap().contains("phase c failed"));
    }

    #[tokio::test]
    async fn test_unmet_prerequisite_fails_phase() {
        let executor = RecoveryExecutor::new(Arc::new(ScriptedActions::new()));
        let execution = executor
            .execute(
                plan(vec![phase("a", "fail").optional(), phase("b", "two").requires("a")]),
                "s1",
            )
            .await
            .unwrap();

        assert_eq!(execution.status, RecoveryStatus::Failed);
        assert_eq!(execution.failed_phases, vec!["a", "b"]);
        assert!(execution.error.unwrap().contains("prerequisite not met: a"));
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected() {
        let executor = RecoveryExecutor::new(Arc::new(ScriptedActions::new()));
        let err = executor
            .execute(plan(vec![phase("a", "x").requires("b"), phase("b", "y")]), "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidPlan(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_timeout() {
        let executor = RecoveryExecutor::new(Arc::new(ScriptedActions::new()));
        let execution = executor.execute(plan(vec![phase("a", "slow")]), "s1").await.unwrap();
        assert_eq!(execution.status, RecoveryStatus::Failed);
        assert!(execution.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_one_active_recovery_per_session() {
        let actions = Arc::new(ScriptedActions::new());
        let executor = Arc::new(RecoveryExecutor::new(actions.clone()));
        let mut events = executor.subscribe();

        let first = executor.start(plan(vec![phase("a", "block")]), "s1").await.unwrap();
        assert_eq!(executor.get(first).await.unwrap().status, RecoveryStatus::Pending);
        wait_for(&mut events, first, |k| matches!(k, RecoveryEventKind::PhaseStarted { .. })).await;
        assert_eq!(executor.get(first).await.unwrap().status, RecoveryStatus::Executing);

        let err = executor.start(plan(vec![phase("a", "one")]), "s1").await.unwrap_err();
        assert_eq!(
            err,
            RecoveryError::AlreadyActive {
                session: "s1".to_string(),
                execution: first,
            }
        );
        assert!(executor.execute(plan(vec![phase("a", "one")]), "s2").await.is_ok());

        actions.gate.add_permits(1);
        assert_eq!(wait_finished(&mut events, first).await, RecoveryStatus::Completed);
        assert!(executor.start(plan(vec![phase("a", "one")]), "s1").await.is_ok());
        assert_eq!(executor.history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_pause_holds_next_phase() {
        let actions = Arc::new(ScriptedActions::new());
        let executor = Arc::new(RecoveryExecutor::new(actions.clone()));
        let mut events = executor.subscribe();

        let id = executor
            .start(plan(vec![phase("a", "block"), phase("b", "two")]), "s1")
            .await
            .unwrap();
        wait_for(&mut events, id, |k| matches!(k, RecoveryEventKind::PhaseStarted { .. })).await;
        executor.pause(id).await.unwrap();
        assert!(executor.pause(id).await.is_err());
        actions.gate.add_permits(1);

        // Phase a finishes, phase b waits for resume.
        let completed = wait_for(&mut events, id, |k| matches!(k, RecoveryEventKind::PhaseCompleted { .. })).await;
        assert_eq!(
            completed,
            RecoveryEventKind::PhaseCompleted {
                phase: "a".to_string()
            }
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        let paused = executor.get(id).await.unwrap();
        assert_eq!(paused.status, RecoveryStatus::Paused);
        assert_eq!(paused.completed_phases, vec!["a"]);

        executor.resume(id).await.unwrap();
        assert_eq!(wait_finished(&mut events, id).await, RecoveryStatus::Completed);
        assert_eq!(executor.get(id).await.unwrap().completed_phases, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_pause_before_first_phase() {
        let actions = Arc::new(ScriptedActions::new());
        let executor = Arc::new(RecoveryExecutor::new(actions.clone()));
        let mut events = executor.subscribe();

        let id = executor.start(plan(vec![phase("a", "one")]), "s1").await.unwrap();
        executor.pause(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let held = executor.get(id).await.unwrap();
        assert_eq!(held.status, RecoveryStatus::Paused);
        assert!(held.completed_phases.is_empty());
        assert!(actions.log.lock().unwrap().is_empty());

        executor.resume(id).await.unwrap();
        assert_eq!(wait_finished(&mut events, id).await, RecoveryStatus::Completed);
    }

    #[test]
    fn test_emergency_halt_plan_shape() {
        let plan = RecoveryPlan::emergency_halt(Duration::from_secs(5));
        assert!(plan.validate().is_ok());
        let ids: Vec<_> = plan.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["assess", "close-exposure", "verify"]);
        assert_eq!(plan.phases[2].actions.last(), Some(&RecoveryAction::ReleaseHalt));
    }
}
