// ─── Mod download scheduler ───
// Bounded-concurrency job queue with retry and per-cycle failure aggregation.
//
// All bookkeeping happens inside one short, non-suspending critical section.
// Dispatch decisions are made while that lock is held, so a completion
// arriving mid-drain can never cause a job to be dispatched twice.

pub mod job;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::notify::{FailureSummary, NotificationBus, SchedulerEvent};

pub use job::{DownloadJob, FailureRecord, JobRunner, SchedulerConfig, Submission};
use job::JobKey;

#[derive(Default)]
struct SchedulerState {
    active: usize,
    pending: VecDeque<DownloadJob>,
    retry: VecDeque<DownloadJob>,
    failed: Vec<FailureRecord>,
    total_submitted: usize,
    succeeded: usize,
    /// Keys of every job that is pending, retrying or running.
    in_flight: HashSet<JobKey>,
}

impl SchedulerState {
    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            active: self.active,
            pending: self.pending.len(),
            retrying: self.retry.len(),
            failed: self.failed.len(),
            succeeded: self.succeeded,
            total_submitted: self.total_submitted,
        }
    }

    fn next_job(&mut self) -> Option<DownloadJob> {
        self.pending.pop_front().or_else(|| self.retry.pop_front())
    }

    fn queues_empty(&self) -> bool {
        self.active == 0 && self.pending.is_empty() && self.retry.is_empty()
    }
}

/// Point-in-time view of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub active: usize,
    pub pending: usize,
    pub retrying: usize,
    pub failed: usize,
    pub succeeded: usize,
    pub total_submitted: usize,
}

impl SchedulerSnapshot {
    pub fn is_idle(&self) -> bool {
        self.active == 0 && self.pending == 0 && self.retrying == 0
    }
}

pub struct ModDownloadScheduler {
    config: SchedulerConfig,
    runner: Arc<dyn JobRunner>,
    bus: NotificationBus,
    state: Mutex<SchedulerState>,
    snapshots: watch::Sender<SchedulerSnapshot>,
}

impl ModDownloadScheduler {
    pub fn new(config: SchedulerConfig, runner: Arc<dyn JobRunner>, bus: NotificationBus) -> Self {
        let config = SchedulerConfig {
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };
        let (snapshots, _) = watch::channel(SchedulerSnapshot::default());
        Self {
            config,
            runner,
            bus,
            state: Mutex::new(SchedulerState::default()),
            snapshots,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.lock().snapshot()
    }

    /// Receiver that observes every counter change.
    pub fn watch(&self) -> watch::Receiver<SchedulerSnapshot> {
        self.snapshots.subscribe()
    }

    /// Resolves once no job is pending, retrying or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.snapshots.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(SchedulerSnapshot::is_idle).await;
    }

    /// Queues one job. Must be called from within a Tokio runtime.
    pub fn submit(self: &Arc<Self>, job: DownloadJob) -> Submission {
        {
            let mut state = self.lock();
            if !state.in_flight.insert(job.key()) {
                debug!(
                    "Ignoring duplicate download of {} into '{}'",
                    job.mod_id, job.instance_name
                );
                return Submission::Duplicate;
            }
            info!(
                "Queued mod {} ({}) for '{}'",
                job.mod_name, job.mod_id, job.instance_name
            );
            state.pending.push_back(DownloadJob { attempts: 0, ..job });
            state.total_submitted += 1;
            self.publish_progress(&state);
            self.drain_locked(&mut state);
        }
        Submission::Accepted
    }

    pub fn submit_all(
        self: &Arc<Self>,
        jobs: impl IntoIterator<Item = DownloadJob>,
    ) -> Vec<Submission> {
        jobs.into_iter().map(|job| self.submit(job)).collect()
    }

    /// Fills free slots from the pending queue, then the retry queue.
    ///
    /// Idempotent; safe to call at any time. Also closes the drain cycle once
    /// every queue is empty and nothing is running.
    pub fn drain(self: &Arc<Self>) {
        let mut state = self.lock();
        self.drain_locked(&mut state);
    }

    fn drain_locked(self: &Arc<Self>, state: &mut SchedulerState) {
        while state.active < self.config.max_concurrency {
            let Some(job) = state.next_job() else {
                break;
            };
            state.active += 1;
            self.bus.publish(SchedulerEvent::JobStarted {
                instance_name: job.instance_name.clone(),
                mod_id: job.mod_id.clone(),
                mod_name: job.mod_name.clone(),
                attempt: job.attempts + 1,
            });
            self.publish_progress(state);
            self.dispatch(job);
        }

        if state.queues_empty() && state.total_submitted > 0 {
            self.finish_cycle(state);
        }
    }

    fn dispatch(self: &Arc<Self>, job: DownloadJob) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let runner = Arc::clone(&this.runner);
            let attempt = job.clone();
            // Run in a child task so a panicking runner still frees its slot.
            let result = match tokio::spawn(async move { runner.run(&attempt).await }).await {
                Ok(result) => result,
                Err(e) => Err(LauncherError::Other(format!("download task aborted: {e}"))),
            };
            this.complete(job, result);
        });
    }

    fn complete(self: &Arc<Self>, mut job: DownloadJob, result: LauncherResult<()>) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);

        match result {
            Ok(()) => {
                info!("Installed {} into '{}'", job.mod_name, job.instance_name);
                state.in_flight.remove(&job.key());
                state.succeeded += 1;
                self.bus.publish(SchedulerEvent::ModInstalled {
                    instance_name: job.instance_name.clone(),
                    mod_id: job.mod_id.clone(),
                    mod_name: job.mod_name.clone(),
                });
            }
            Err(err) if err.is_retryable() && job.attempts < self.config.max_retries => {
                job.attempts += 1;
                warn!(
                    "Download of {} failed (attempt {}/{}): {}",
                    job.mod_name,
                    job.attempts,
                    self.config.max_retries + 1,
                    err
                );
                state.retry.push_back(job);
            }
            Err(err) => {
                warn!(
                    "Giving up on {} for '{}': {}",
                    job.mod_name, job.instance_name, err
                );
                state.in_flight.remove(&job.key());
                state.failed.push(FailureRecord::new(&job, &err));
            }
        }

        // An emptied scheduler reports through finish_cycle, after the
        // failure aggregate, so idle observers never race the report.
        if !state.queues_empty() {
            self.publish_progress(&state);
        }
        self.drain_locked(&mut state);
    }

    fn finish_cycle(&self, state: &mut SchedulerState) {
        if !state.failed.is_empty() {
            let failures: Vec<FailureSummary> = state
                .failed
                .drain(..)
                .map(|record| FailureSummary {
                    mod_name: record.mod_name,
                    error: record.error,
                })
                .collect();
            warn!("{} mod download(s) failed this cycle", failures.len());
            self.bus
                .publish(SchedulerEvent::DownloadsFailed { failures });
        }

        info!(
            "Download cycle finished: {} of {} succeeded",
            state.succeeded, state.total_submitted
        );
        state.total_submitted = 0;
        state.succeeded = 0;
        self.publish_progress(state);
    }

    fn publish_progress(&self, state: &SchedulerState) {
        let snapshot = state.snapshot();
        self.snapshots.send_replace(snapshot);
        self.bus.publish(SchedulerEvent::Progress {
            active: snapshot.active,
            total: snapshot.total_submitted,
        });
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
