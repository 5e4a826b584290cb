//! Engine-wide defaults (§9 ambient configuration).
//!
//! Per-field byte order/charset are always explicit on a `Binding` and
//! this crate has no notion of an engine-wide fallback for them; this
//! config is limited to what an `Engine` actually reads: which
//! [`crate::event::EventListener`] and [`crate::expr::Evaluator`] back it.

use std::sync::Arc;

use crate::event::{EventListener, NoopListener, TracingListener};
use crate::expr::{DefaultEvaluator, Evaluator};

/// Engine-wide defaults threaded into [`crate::engine::Engine::new`] (§9).
#[derive(Clone)]
pub struct EngineConfig {
    pub listener: Arc<dyn EventListener>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl EngineConfig {
    /// Swaps in `tracing`-backed logging in place of the silent default.
    pub fn with_tracing(mut self) -> Self {
        self.listener = Arc::new(TracingListener);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            listener: Arc::new(NoopListener),
            evaluator: Arc::new(DefaultEvaluator),
        }
    }
}
