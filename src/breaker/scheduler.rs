//! Periodic maintenance tasks.
//!
//! # Tasks
//! - open → half-open sweep (`openToHalfOpenTask`)
//! - unlock one pending queue (`unlockQueuesTask`)
//! - unlock one probe queue per half-open circuit (`unlockSampleQueuesTask`)
//!
//! Each tick runs under a cluster-wide lock so at most one instance does the
//! work per interval. Timers are torn down and re-registered whenever the
//! configuration resource announces a refresh.
//!
//! Cancelling a timer only stops future ticks. A tick that has started runs
//! to completion, so a popped unlock record is always followed by its unlock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::breaker::coordinator::QueueCircuitBreaker;
use crate::circuit::error::BreakerResult;
use crate::config::resource::ConfigurationResource;
use crate::config::schema::{CircuitBreakerConfig, TaskConfig};
use crate::lifecycle::shutdown::wait_for;
use crate::lock::{GateOutcome, LockGate};
use crate::observability::metrics;

pub const OPEN_TO_HALF_OPEN_TASK_LOCK: &str = "openToHalfOpenTask";
pub const UNLOCK_QUEUES_TASK_LOCK: &str = "unlockQueuesTask";
pub const UNLOCK_SAMPLE_QUEUES_TASK_LOCK: &str = "unlockSampleQueuesTask";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceTask {
    OpenToHalfOpen,
    UnlockQueues,
    UnlockSampleQueues,
}

impl MaintenanceTask {
    pub const ALL: [MaintenanceTask; 3] = [
        MaintenanceTask::OpenToHalfOpen,
        MaintenanceTask::UnlockQueues,
        MaintenanceTask::UnlockSampleQueues,
    ];

    pub fn lock_name(&self) -> &'static str {
        match self {
            MaintenanceTask::OpenToHalfOpen => OPEN_TO_HALF_OPEN_TASK_LOCK,
            MaintenanceTask::UnlockQueues => UNLOCK_QUEUES_TASK_LOCK,
            MaintenanceTask::UnlockSampleQueues => UNLOCK_SAMPLE_QUEUES_TASK_LOCK,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MaintenanceTask::OpenToHalfOpen => "open_to_half_open",
            MaintenanceTask::UnlockQueues => "unlock_queues",
            MaintenanceTask::UnlockSampleQueues => "unlock_sample_queues",
        }
    }

    pub fn settings(&self, config: &CircuitBreakerConfig) -> TaskConfig {
        match self {
            MaintenanceTask::OpenToHalfOpen => config.open_to_half_open,
            MaintenanceTask::UnlockQueues => config.unlock_queues,
            MaintenanceTask::UnlockSampleQueues => config.unlock_sample_queues,
        }
    }
}

/// A live timer. Dropping `cancel` ends the loop before its next tick.
struct Registration {
    task: MaintenanceTask,
    cancel: watch::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the timers of the maintenance tasks.
pub struct MaintenanceScheduler {
    breaker: Arc<QueueCircuitBreaker>,
    gate: LockGate,
    config: Arc<ConfigurationResource>,
    timers: Mutex<Vec<Registration>>,
}

impl MaintenanceScheduler {
    pub fn new(breaker: Arc<QueueCircuitBreaker>, gate: LockGate) -> Self {
        let config = breaker.config().clone();
        Self {
            breaker,
            gate,
            config,
            timers: Mutex::new(Vec::new()),
        }
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cancel all timers and start one per enabled task.
    pub fn register_tasks(&self) {
        let config = self.config.current();
        let mut timers = self.timers();
        // Dropping the registrations cancels the timers; running ticks finish.
        timers.clear();

        for task in MaintenanceTask::ALL {
            let settings = task.settings(&config);
            if !settings.enabled {
                tracing::info!(task = task.label(), "Not going to register periodic task");
                continue;
            }
            tracing::info!(
                task = task.label(),
                interval_ms = settings.interval_ms,
                "About to register periodic task"
            );
            timers.push(self.spawn_task(task, settings.interval_ms));
        }
    }

    /// Tasks with a live timer.
    pub fn active_tasks(&self) -> Vec<MaintenanceTask> {
        self.timers()
            .iter()
            .filter(|r| !r.handle.is_finished())
            .map(|r| r.task)
            .collect()
    }

    /// Cancel every timer. Ticks already running are left to finish.
    pub fn stop(&self) {
        self.timers().clear();
    }

    /// Cancel every timer and wait for running ticks to finish.
    pub async fn drain(&self) {
        let timers: Vec<Registration> = self.timers().drain(..).collect();
        for Registration { task, cancel, handle } in timers {
            drop(cancel);
            if let Err(e) = handle.await {
                tracing::error!(task = task.label(), error = %e, "Periodic task ended abnormally");
            }
        }
    }

    /// Register the tasks, then follow configuration refreshes until shutdown.
    pub async fn run(self: Arc<Self>, shutdown_rx: broadcast::Receiver<()>) {
        let mut refresh = self.config.subscribe();
        self.register_tasks();

        let shutdown = wait_for(shutdown_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                changed = refresh.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    tracing::info!("Circuit breaker configuration changed, re-registering periodic tasks");
                    self.register_tasks();
                }
                _ = &mut shutdown => break,
            }
        }

        self.drain().await;
        tracing::info!("Maintenance scheduler stopped");
    }

    /// Run one tick of `task` right now, under its lock.
    pub async fn run_task(&self, task: MaintenanceTask) -> GateOutcome<()> {
        let interval_ms = task.settings(&self.config.current()).interval_ms;
        execute(task, &self.breaker, &self.gate, interval_ms).await
    }

    fn spawn_task(&self, task: MaintenanceTask, interval_ms: u64) -> Registration {
        let breaker = self.breaker.clone();
        let gate = self.gate.clone();
        let period = Duration::from_millis(interval_ms);
        let (cancel, mut cancelled) = watch::channel(());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {}
                }
                execute(task, &breaker, &gate, interval_ms).await;
            }
            tracing::debug!(task = task.label(), "Periodic task cancelled");
        });

        Registration { task, cancel, handle }
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn execute(
    task: MaintenanceTask,
    breaker: &QueueCircuitBreaker,
    gate: &LockGate,
    interval_ms: u64,
) -> GateOutcome<()> {
    let outcome = gate
        .with_lock(task.lock_name(), interval_ms, || run_body(task, breaker))
        .await;

    if let GateOutcome::Failed(e) = &outcome {
        tracing::error!(task = task.label(), error = %e, "Periodic task failed");
    }
    metrics::record_task_run(task.label(), outcome.label());
    outcome
}

async fn run_body(task: MaintenanceTask, breaker: &QueueCircuitBreaker) -> BreakerResult<()> {
    match task {
        MaintenanceTask::OpenToHalfOpen => {
            let changed = breaker.set_open_circuits_to_half_open().await?;
            if changed > 0 {
                tracing::info!(changed, "Changed circuits from state open to state half-open");
            } else {
                tracing::debug!("No open circuits to change state to half-open");
            }
        }
        MaintenanceTask::UnlockQueues => match breaker.unlock_next_queue().await? {
            Some(queue) => tracing::debug!(queue = %queue, "Unlocked queue"),
            None => tracing::debug!("No locked queues to unlock"),
        },
        MaintenanceTask::UnlockSampleQueues => {
            let unlocked = breaker.unlock_sample_queues().await?;
            if unlocked > 0 {
                tracing::info!(unlocked, "Unlocked sample queues");
            } else {
                tracing::debug!("No sample queues to unlock");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::breaker::coordinator::QueuedRequest;
    use crate::circuit::memory::InMemoryCircuitStore;
    use crate::circuit::state::CircuitState;
    use crate::lock::InMemoryLock;
    use crate::queue::{QueueService, QueueServiceError, ReplyStatus};
    use crate::routing::{Rule, RulePatternToCircuitMapping};

    #[derive(Default)]
    struct CountingQueues {
        unlocks: AtomicUsize,
    }

    #[async_trait]
    impl QueueService for CountingQueues {
        async fn put_lock(&self, _queue: &str, _owner: &str) -> Result<ReplyStatus, QueueServiceError> {
            Ok(ReplyStatus::Ok)
        }

        async fn delete_lock(&self, _queue: &str) -> Result<ReplyStatus, QueueServiceError> {
            self.unlocks.fetch_add(1, Ordering::SeqCst);
            Ok(ReplyStatus::Ok)
        }
    }

    fn scheduler(config: CircuitBreakerConfig) -> (Arc<MaintenanceScheduler>, Arc<ConfigurationResource>) {
        let resource = Arc::new(ConfigurationResource::new(config));
        let breaker = Arc::new(QueueCircuitBreaker::new(
            Arc::new(InMemoryCircuitStore::new()),
            Arc::new(CountingQueues::default()),
            Arc::new(RulePatternToCircuitMapping::new()),
            resource.clone(),
        ));
        let gate = LockGate::new(Arc::new(InMemoryLock::new()), "test", Duration::from_secs(1));
        (Arc::new(MaintenanceScheduler::new(breaker, gate)), resource)
    }

    /// Queue service whose unlock takes a while.
    #[derive(Default)]
    struct SlowQueues {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl QueueService for SlowQueues {
        async fn put_lock(&self, _queue: &str, _owner: &str) -> Result<ReplyStatus, QueueServiceError> {
            Ok(ReplyStatus::Ok)
        }

        async fn delete_lock(&self, _queue: &str) -> Result<ReplyStatus, QueueServiceError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(ReplyStatus::Ok)
        }
    }

    struct SlowFixture {
        scheduler: Arc<MaintenanceScheduler>,
        resource: Arc<ConfigurationResource>,
        store: Arc<InMemoryCircuitStore>,
        queues: Arc<SlowQueues>,
    }

    /// One queue waiting in the pending-unlock list, unlock task every 100ms.
    async fn slow_unlock_fixture() -> SlowFixture {
        let config = CircuitBreakerConfig {
            unlock_queues: TaskConfig::every(100),
            ..CircuitBreakerConfig::default()
        };
        let resource = Arc::new(ConfigurationResource::new(config));
        let store = Arc::new(InMemoryCircuitStore::new());
        let queues = Arc::new(SlowQueues::default());
        let mapping = Arc::new(RulePatternToCircuitMapping::new());
        mapping.update(&[Rule::new("/x/.*").unwrap()]);
        let breaker = Arc::new(QueueCircuitBreaker::new(
            store.clone(),
            queues.clone(),
            mapping,
            resource.clone(),
        ));

        let req = QueuedRequest::new("/x/1");
        breaker.lock_queue("q", &req).await.unwrap();
        breaker.close_circuit(&req).await.unwrap();
        assert_eq!(store.pending_unlock_count(), 1);

        let gate = LockGate::new(Arc::new(InMemoryLock::new()), "test", Duration::from_secs(1));
        SlowFixture {
            scheduler: Arc::new(MaintenanceScheduler::new(breaker, gate)),
            resource,
            store,
            queues,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_lets_running_tick_finish() {
        let f = slow_unlock_fixture().await;
        f.scheduler.register_tasks();

        // First tick at 100ms pops the record and is still unlocking at 150ms.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(f.queues.started.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.pending_unlock_count(), 0);

        let mut next = CircuitBreakerConfig::default();
        next.unlock_queues = TaskConfig::every(10_000);
        f.resource.update(next);
        f.scheduler.register_tasks();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(f.queues.finished.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.pending_unlock_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_tick() {
        let f = slow_unlock_fixture().await;
        let shutdown = crate::lifecycle::Shutdown::new();
        let handle = tokio::spawn(f.scheduler.clone().run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(f.queues.started.load(Ordering::SeqCst), 1);

        shutdown.trigger();
        handle.await.unwrap();
        assert_eq!(f.queues.finished.load(Ordering::SeqCst), 1);
        assert!(f.scheduler.active_tasks().is_empty());
    }

    #[test]
    fn test_lock_names() {
        assert_eq!(MaintenanceTask::OpenToHalfOpen.lock_name(), "openToHalfOpenTask");
        assert_eq!(MaintenanceTask::UnlockQueues.lock_name(), "unlockQueuesTask");
        assert_eq!(MaintenanceTask::UnlockSampleQueues.lock_name(), "unlockSampleQueuesTask");
    }

    #[tokio::test]
    async fn test_only_enabled_tasks_are_registered() {
        let config = CircuitBreakerConfig {
            unlock_queues: TaskConfig::every(60_000),
            ..CircuitBreakerConfig::default()
        };
        let (scheduler, _) = scheduler(config);
        scheduler.register_tasks();
        assert_eq!(scheduler.active_tasks(), vec![MaintenanceTask::UnlockQueues]);

        scheduler.stop();
        assert!(scheduler.active_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_reregisters_tasks() {
        let (scheduler, resource) = scheduler(CircuitBreakerConfig::default());
        let shutdown = crate::lifecycle::Shutdown::new();
        let handle = tokio::spawn(scheduler.clone().run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.active_tasks().is_empty());

        let mut next = CircuitBreakerConfig::default();
        next.open_to_half_open = TaskConfig::every(60_000);
        next.unlock_sample_queues = TaskConfig::every(60_000);
        resource.update(next);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            scheduler.active_tasks(),
            vec![MaintenanceTask::OpenToHalfOpen, MaintenanceTask::UnlockSampleQueues]
        );

        // Disabling cancels without side effects.
        resource.update(CircuitBreakerConfig::default());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.active_tasks().is_empty());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let config = CircuitBreakerConfig {
            open_to_half_open: TaskConfig::every(1_000),
            ..CircuitBreakerConfig::default()
        };
        let (scheduler, _) = scheduler(config);
        scheduler.breaker.mapping().update(&[Rule::new("/x/.*").unwrap()]);
        scheduler
            .breaker
            .reopen_circuit(&QueuedRequest::new("/x/1"))
            .await
            .unwrap();

        scheduler.register_tasks();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(scheduler.breaker.all_circuits().await.unwrap()[0].state, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            scheduler.breaker.all_circuits().await.unwrap()[0].state,
            CircuitState::HalfOpen
        );
    }
}
