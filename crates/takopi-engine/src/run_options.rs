// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;

tokio::task_local! {
    static RUN_OPTIONS: EngineRunOptions;
}

// Two flavors of scope: `apply_run_options` wraps a plain closure (what
// `build_args` call sites and tests use — no `.await` needed), while
// `apply_run_options_async` wraps a whole `runner.run(...)` future so
// ambient overrides stay in scope across every `.await` point a runner
// hits while streaming a subprocess.

/// Per-run overrides a caller (a chat command, a CLI flag) layers on top of
/// a runner's configured defaults.
///
/// Scoped ambiently via [`apply_run_options`] rather than threaded through
/// every `build_args` call — runners read it with [`current`] only when a
/// field is actually set, so a runner that ignores run options entirely
/// never has to know this type exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineRunOptions {
    pub model: Option<String>,
    pub reasoning: Option<String>,
    pub mode: Option<String>,
}

impl EngineRunOptions {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.reasoning.is_none() && self.mode.is_none()
    }
}

/// Run `f` with `options` available to [`current`] for its whole extent.
pub fn apply_run_options<R>(options: EngineRunOptions, f: impl FnOnce() -> R) -> R {
    RUN_OPTIONS.sync_scope(options, f)
}

/// Run `body` with `options` available to [`current`] across every
/// `.await` point, including any runner spawned from within it.
pub async fn apply_run_options_async<F: Future>(options: EngineRunOptions, body: F) -> F::Output {
    RUN_OPTIONS.scope(options, body).await
}

/// The [`EngineRunOptions`] in effect for the calling task, or the default
/// (all-`None`) value outside of [`apply_run_options`].
pub fn current() -> EngineRunOptions {
    RUN_OPTIONS
        .try_with(|opts| opts.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_outside_scope_is_default() {
        assert_eq!(current(), EngineRunOptions::default());
    }

    #[test]
    fn current_inside_scope_sees_options() {
        let opts = EngineRunOptions {
            model: Some("gpt-4.1-mini".into()),
            reasoning: Some("low".into()),
            mode: None,
        };
        let seen = apply_run_options(opts.clone(), current);
        assert_eq!(seen, opts);
    }

    #[tokio::test]
    async fn current_inside_async_scope_sees_options() {
        let opts = EngineRunOptions::model("gpt-4o-mini");
        let seen = apply_run_options_async(opts.clone(), async {
            tokio::task::yield_now().await;
            current()
        })
        .await;
        assert_eq!(seen, opts);
    }
}
