//! Scheduler for the kernel's periodic work.
//!
//! Tasks fire [`TaskEvent`]s on a bounded channel; the receiver decides
//! what each task name means (snipe pass, job enqueue, monitor tick, ...).

use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Schedule type for task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Run every `every`, each run delayed by up to `jitter`.
    Interval { every: Duration, jitter: Duration },
    /// Run once after delay.
    Once(Duration),
}

/// A scheduled task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    /// Task name.
    pub name: String,
    /// Schedule.
    pub schedule: Schedule,
    /// Whether task is enabled.
    pub enabled: bool,
    /// Stop after this many runs.
    pub max_runs: Option<u32>,
    pub runs: u32,
    /// Last run time.
    pub last_run: Option<Instant>,
    /// Next scheduled run.
    pub next_run: Option<Instant>,
}

impl ScheduledTask {
    /// Creates a new scheduled task.
    pub fn new(name: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            name: name.into(),
            schedule,
            enabled: true,
            max_runs: None,
            runs: 0,
            last_run: None,
            next_run: None,
        }
    }

    #[must_use]
    pub fn max_runs(mut self, runs: u32) -> Self {
        self.max_runs = Some(runs);
        self
    }

    /// Disables the task.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn exhausted(&self) -> bool {
        match (&self.schedule, self.max_runs) {
            (Schedule::Once(_), _) => self.runs >= 1,
            (_, Some(max)) => self.runs >= max,
            _ => false,
        }
    }
}

/// Event sent when a task should run.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    /// Task name.
    pub task_name: String,
    /// 1-based run number.
    pub run: u32,
    /// Scheduled time.
    pub scheduled_at: Instant,
    /// Actual trigger time.
    pub triggered_at: Instant,
}

/// Stops a running scheduler from another task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Scheduler for managing task execution timing.
pub struct Scheduler {
    /// Scheduled tasks.
    tasks: Vec<ScheduledTask>,
    /// Event sender.
    event_tx: mpsc::Sender<TaskEvent>,
    /// Event receiver.
    event_rx: Option<mpsc::Receiver<TaskEvent>>,
    /// Running flag.
    running: Arc<AtomicBool>,
    /// Longest sleep between checks of the running flag.
    tick: Duration,
}

impl Scheduler {
    /// Creates a new scheduler.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tasks: Vec::new(),
            event_tx: tx,
            event_rx: Some(rx),
            running: Arc::new(AtomicBool::new(false)),
            tick: Duration::from_millis(250),
        }
    }

    /// Adds a task to the scheduler.
    pub fn add_task(&mut self, task: ScheduledTask) {
        info!(task = %task.name, schedule = ?task.schedule, "Adding task to scheduler");
        self.tasks.push(task);
    }

    /// Removes a task by name.
    pub fn remove_task(&mut self, name: &str) {
        self.tasks.retain(|t| t.name != name);
    }

    /// Enables a task by name.
    pub fn enable_task(&mut self, name: &str) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.name == name) {
            task.enabled = true;
        }
    }

    /// Disables a task by name.
    pub fn disable_task(&mut self, name: &str) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.name == name) {
            task.enabled = false;
        }
    }

    /// Takes the event receiver for processing events.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<TaskEvent>> {
        self.event_rx.take()
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Runs until stopped or until no task has a run left.
    ///
    /// Sleeps until the earliest due task instead of polling, so nothing
    /// spins faster than the shortest interval.
    pub async fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);

        info!(tasks = self.tasks.len(), "Starting scheduler");

        let now = Instant::now();
        for task in &mut self.tasks {
            task.next_run = Some(Self::calculate_next_run(&task.schedule, now));
        }

        while self.running.load(Ordering::SeqCst) {
            let Some(next_due) = self
                .tasks
                .iter()
                .filter(|t| t.enabled && !t.exhausted())
                .filter_map(|t| t.next_run)
                .min()
            else {
                info!("No runnable tasks left");
                break;
            };
            sleep_until(next_due.min(Instant::now() + self.tick)).await;

            let now = Instant::now();
            let mut events_to_send = Vec::new();

            for task in &mut self.tasks {
                if !task.enabled || task.exhausted() {
                    continue;
                }

                if let Some(next_run) = task.next_run
                    && now >= next_run
                {
                    task.runs += 1;
                    events_to_send.push(TaskEvent {
                        task_name: task.name.clone(),
                        run: task.runs,
                        scheduled_at: next_run,
                        triggered_at: now,
                    });

                    task.last_run = Some(now);
                    task.next_run = Some(Self::calculate_next_run(&task.schedule, now));

                    debug!(task = %task.name, run = task.runs, "Task triggered");
                }
            }

            for event in events_to_send {
                let task_name = event.task_name.clone();
                if let Err(e) = self.event_tx.send(event).await {
                    warn!(task = %task_name, error = %e, "Failed to send task event");
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
    }

    /// Stops the scheduler.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn calculate_next_run(schedule: &Schedule, from: Instant) -> Instant {
        match schedule {
            Schedule::Interval { every, jitter } => {
                let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=jitter_ms)
                };
                from + *every + Duration::from_millis(extra)
            }
            Schedule::Once(delay) => from + *delay,
        }
    }

    /// Gets all tasks.
    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// Checks if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating common schedules.
pub struct ScheduleBuilder;

impl ScheduleBuilder {
    /// Creates an interval schedule.
    pub fn every(duration: Duration) -> Schedule {
        Schedule::Interval {
            every: duration,
            jitter: Duration::ZERO,
        }
    }

    pub fn every_with_jitter(duration: Duration, jitter: Duration) -> Schedule {
        Schedule::Interval {
            every: duration,
            jitter,
        }
    }

    /// Creates a schedule that runs every N seconds.
    pub fn every_secs(secs: u64) -> Schedule {
        Self::every(Duration::from_secs(secs))
    }

    /// Creates a schedule that runs every N minutes.
    pub fn every_mins(mins: u64) -> Schedule {
        Self::every(Duration::from_secs(mins * 60))
    }

    /// Creates a one-time schedule.
    pub fn once_after(delay: Duration) -> Schedule {
        Schedule::Once(delay)
    }
}
