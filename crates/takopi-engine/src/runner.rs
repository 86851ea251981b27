// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use takopi_events::TakopiEvent;
use takopi_model::ResumeToken;

/// Callback a runner invokes for every [`TakopiEvent`] it produces, in
/// order. Implementations (the progress renderer, the audit log) may error
/// out to abort the run — see [`RunnerError::EventHandler`].
pub type OnEvent<'a> =
    Box<dyn FnMut(TakopiEvent) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send + 'a>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine process exited without producing any output")]
    NoOutput,
    #[error("event handler aborted the run: {0}")]
    EventHandler(#[source] anyhow::Error),
    #[error("engine process error: {0}")]
    Process(String),
}

/// What a run produced once the engine process exits.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub resume: ResumeToken,
    pub ok: bool,
    pub answer: String,
    pub error: Option<String>,
}

/// The contract every engine backend implements (§4.A "Engine runner").
///
/// A runner owns exactly one subprocess invocation: given a prompt and an
/// optional resume token, it streams [`TakopiEvent`]s to `on_event` in
/// order (`session.started` first, `completed` last) and returns the final
/// [`RunResult`]. Implementations must honor [`crate::run_options::current`]
/// when building their command line.
#[async_trait]
pub trait EngineRunner: Send + Sync {
    fn engine(&self) -> &str;

    async fn run(
        &self,
        prompt: &str,
        resume: Option<ResumeToken>,
        on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError>;

    /// Render `token` into the line of text a reply carries it back in
    /// (§4.D: the last line of `render_final`'s output).
    ///
    /// The default marker is engine-neutral; a runner only needs to
    /// override this (together with [`EngineRunner::extract_resume`]) if
    /// its CLI already prints something reply-friendly of its own.
    fn format_resume(&self, token: &ResumeToken) -> String {
        format!("resume: {}:{}", token.engine, token.value)
    }

    /// Recover a [`ResumeToken`] this runner minted from a message's text,
    /// if present — the inverse of [`EngineRunner::format_resume`].
    ///
    /// Scans line by line so the marker can be found regardless of where in
    /// a reply it landed.
    fn extract_resume(&self, text: &str) -> Option<ResumeToken> {
        let prefix = format!("resume: {}:", self.engine());
        text.lines().find_map(|line| {
            line.trim()
                .strip_prefix(prefix.as_str())
                .map(|value| ResumeToken::new(self.engine(), value.trim()))
        })
    }
}

/// Wraps any [`EngineRunner`] so concurrent `run()` calls resuming the same
/// [`ResumeToken`] serialize instead of racing the same on-disk session
/// (I5). Runs with no resume token, or with distinct tokens, stay fully
/// concurrent — only same-session contention is serialized.
pub struct SerializedRunner<R> {
    inner: R,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<R: EngineRunner> SerializedRunner<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl<R: EngineRunner> EngineRunner for SerializedRunner<R> {
    fn engine(&self) -> &str {
        self.inner.engine()
    }

    async fn run(
        &self,
        prompt: &str,
        resume: Option<ResumeToken>,
        on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError> {
        let Some(token) = resume.clone() else {
            return self.inner.run(prompt, resume, on_event).await;
        };
        let lock = self.lock_for(token.thread_key().as_str());
        let _guard = lock.lock().await;
        self.inner.run(prompt, resume, on_event).await
    }

    fn format_resume(&self, token: &ResumeToken) -> String {
        self.inner.format_resume(token)
    }

    fn extract_resume(&self, text: &str) -> Option<ResumeToken> {
        self.inner.extract_resume(text)
    }
}
