// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-`ThreadKey` FIFO job dispatch with a "busy" gate (§4.F). Exactly one
//! worker task runs per key at any instant; parallelism across keys is
//! unbounded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::BoxFuture;
use tokio::sync::Notify;

use takopi_model::{ResumeToken, ThreadJob};

/// A one-shot flag that, once set, stays set — `wait()` returns
/// immediately for any caller arriving after `set()`, and blocks callers
/// that arrived before it.
pub struct DoneEvent {
    notify: Notify,
    fired: AtomicBool,
}

impl Default for DoneEvent {
    fn default() -> Self {
        Self {
            notify: Notify::new(),
            fired: AtomicBool::new(false),
        }
    }
}

impl DoneEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            if self.fired.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            if self.fired.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

pub type RunJob = Arc<dyn Fn(ThreadJob) -> BoxFuture<'static, ()> + Send + Sync>;

struct SchedulerState {
    pending_by_thread: HashMap<String, VecDeque<ThreadJob>>,
    active_threads: HashSet<String>,
    busy_until: HashMap<String, Arc<DoneEvent>>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            pending_by_thread: HashMap::new(),
            active_threads: HashSet::new(),
            busy_until: HashMap::new(),
        }
    }
}

/// Dispatches [`ThreadJob`]s in strict FIFO order per key, running at most
/// one job at a time for a given key while letting distinct keys run
/// concurrently.
pub struct ThreadScheduler {
    run_job: RunJob,
    state: Arc<StdMutex<SchedulerState>>,
}

impl ThreadScheduler {
    pub fn new(run_job: RunJob) -> Self {
        Self {
            run_job,
            state: Arc::new(StdMutex::new(SchedulerState::new())),
        }
    }

    /// The scheduler's unit of serialization: `engine:value`.
    pub fn thread_key(token: &ResumeToken) -> String {
        token.thread_key().as_str().to_string()
    }

    fn key_for(job: &ThreadJob) -> String {
        match &job.resume_token {
            Some(token) => Self::thread_key(token),
            None => format!("chat:{}", job.chat_id),
        }
    }

    /// Append `job` to its key's FIFO. Spawns a worker if none is running
    /// for that key; otherwise the running worker picks it up once it
    /// drains what's ahead of it.
    pub async fn enqueue(&self, job: ThreadJob) {
        let key = Self::key_for(&job);
        let should_spawn = {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            state
                .pending_by_thread
                .entry(key.clone())
                .or_default()
                .push_back(job);
            if state.active_threads.contains(&key) {
                false
            } else {
                state.active_threads.insert(key.clone());
                true
            }
        };
        if should_spawn {
            self.spawn_worker(key);
        }
    }

    /// Convenience wrapper building a [`ThreadJob`] from its parts and
    /// enqueueing it against `resume_token`'s key.
    pub async fn enqueue_resume(
        &self,
        chat_id: i64,
        user_msg_id: i64,
        text: impl Into<String>,
        resume_token: ResumeToken,
    ) {
        let job = ThreadJob::new(chat_id, user_msg_id, text).with_resume(Some(resume_token));
        self.enqueue(job).await;
    }

    /// Record that a first-time session for `token` has been observed.
    /// Future enqueues on the same key wait on `done` before starting,
    /// collapsing the window between `session.started` and the first idle.
    pub async fn note_thread_known(&self, token: &ResumeToken, done: Arc<DoneEvent>) {
        let key = Self::thread_key(token);
        self.state
            .lock()
            .expect("scheduler state poisoned")
            .busy_until
            .insert(key, done);
    }

    /// Clear the busy gate for `token`, releasing any worker waiting on it.
    /// Call this when `completed` arrives for the run that set the gate,
    /// not at enqueue time.
    pub fn clear_busy(&self, token: &ResumeToken) {
        let key = Self::thread_key(token);
        let done = self
            .state
            .lock()
            .expect("scheduler state poisoned")
            .busy_until
            .remove(&key);
        if let Some(done) = done {
            done.set();
        }
    }

    fn spawn_worker(&self, key: String) {
        let state = Arc::clone(&self.state);
        let run_job = Arc::clone(&self.run_job);
        tokio::spawn(async move {
            loop {
                let gate = {
                    let state = state.lock().expect("scheduler state poisoned");
                    state.busy_until.get(&key).cloned()
                };
                if let Some(gate) = gate {
                    gate.wait().await;
                }

                let next = {
                    let mut state = state.lock().expect("scheduler state poisoned");
                    state.pending_by_thread.get_mut(&key).and_then(VecDeque::pop_front)
                };

                let Some(job) = next else {
                    let mut state = state.lock().expect("scheduler state poisoned");
                    let still_pending = state
                        .pending_by_thread
                        .get(&key)
                        .is_some_and(|q| !q.is_empty());
                    if still_pending {
                        continue;
                    }
                    state.active_threads.remove(&key);
                    state.pending_by_thread.remove(&key);
                    break;
                };

                run_job(job).await;
            }
        });
    }
}
