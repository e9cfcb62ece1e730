//! Testing utilities for the collective.
//!
//! This module provides handler doubles for integration testing:
//! - `ScriptedHandler` returns a fixed result
//! - `SlowHandler` answers after a delay, for exercising timeouts
//! - `FailingHandler` and `PanickingHandler` for the failure paths
//! - `RecordingHandler` notes when each invocation started and finished
//!
//! plus `TestHarness`, a collective wired to scripted handlers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::collective::{DmCollective, TurnOutcome};
use crate::config::CollectiveConfig;
use crate::dispatch::HandlerRegistry;
use crate::error::{HandlerError, PipelineResult};
use crate::handler::{Handler, HandlerResult, PromptContext};
use crate::intent::HandlerName;
use crate::oracle::RuleOracle;
use crate::session::{Attributes, EventKind, SessionEffect};

/// A handler that always returns the same result.
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    result: HandlerResult,
}

impl ScriptedHandler {
    pub fn new(name: HandlerName, text: impl Into<String>) -> Self {
        Self {
            result: HandlerResult::new(name, text),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.result = self.result.with_tag(tag);
        self
    }

    pub fn with_effect(mut self, effect: SessionEffect) -> Self {
        self.result = self.result.with_effect(effect);
        self
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    fn name(&self) -> HandlerName {
        self.result.handler
    }

    async fn invoke(&self, _context: &PromptContext, _text: &str) -> Result<HandlerResult, HandlerError> {
        Ok(self.result.clone())
    }
}

/// A handler that answers only after `delay`.
#[derive(Debug, Clone)]
pub struct SlowHandler {
    name: HandlerName,
    text: String,
    delay: Duration,
}

impl SlowHandler {
    pub fn new(name: HandlerName, text: impl Into<String>, delay: Duration) -> Self {
        Self {
            name,
            text: text.into(),
            delay,
        }
    }
}

#[async_trait]
impl Handler for SlowHandler {
    fn name(&self) -> HandlerName {
        self.name
    }

    async fn invoke(&self, _context: &PromptContext, _text: &str) -> Result<HandlerResult, HandlerError> {
        tokio::time::sleep(self.delay).await;
        Ok(HandlerResult::new(self.name, self.text.clone()))
    }
}

/// A handler that always returns an error.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    name: HandlerName,
    error: HandlerError,
}

impl FailingHandler {
    pub fn new(name: HandlerName) -> Self {
        Self {
            name,
            error: HandlerError::failed("scripted failure"),
        }
    }

    pub fn with_error(mut self, error: HandlerError) -> Self {
        self.error = error;
        self
    }
}

#[async_trait]
impl Handler for FailingHandler {
    fn name(&self) -> HandlerName {
        self.name
    }

    async fn invoke(&self, _context: &PromptContext, _text: &str) -> Result<HandlerResult, HandlerError> {
        Err(self.error.clone())
    }
}

/// A handler whose task panics.
#[derive(Debug, Clone, Copy)]
pub struct PanickingHandler {
    name: HandlerName,
}

impl PanickingHandler {
    pub fn new(name: HandlerName) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Handler for PanickingHandler {
    fn name(&self) -> HandlerName {
        self.name
    }

    async fn invoke(&self, _context: &PromptContext, _text: &str) -> Result<HandlerResult, HandlerError> {
        panic!("{} panicked on purpose", self.name);
    }
}

#[derive(Debug, Default)]
struct Timings {
    calls: usize,
    started: Option<Instant>,
    finished: Option<Instant>,
}

/// A handler that records when its last invocation started and finished.
///
/// Clones share their record, so keep a clone to inspect after registering.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    name: HandlerName,
    delay: Duration,
    timings: Arc<Mutex<Timings>>,
}

impl RecordingHandler {
    pub fn new(name: HandlerName, delay: Duration) -> Self {
        Self {
            name,
            delay,
            timings: Arc::default(),
        }
    }

    fn with_timings<T>(&self, f: impl FnOnce(&mut Timings) -> T) -> T {
        let mut timings = self.timings.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut timings)
    }

    pub fn calls(&self) -> usize {
        self.with_timings(|t| t.calls)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.with_timings(|t| t.started)
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.with_timings(|t| t.finished)
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> HandlerName {
        self.name
    }

    async fn invoke(&self, _context: &PromptContext, _text: &str) -> Result<HandlerResult, HandlerError> {
        self.with_timings(|t| {
            t.calls += 1;
            t.started = Some(Instant::now());
        });
        tokio::time::sleep(self.delay).await;
        self.with_timings(|t| t.finished = Some(Instant::now()));
        Ok(HandlerResult::new(self.name, format!("{} was here.", self.name)))
    }
}

/// A collective with the real rules oracle and scripted collaborators.
pub struct TestHarness {
    collective: DmCollective,
    last: Option<TurnOutcome>,
}

impl TestHarness {
    /// Harness with only the rules oracle registered.
    pub fn new(config: &CollectiveConfig) -> Self {
        let registry = HandlerRegistry::new().with_handler(RuleOracle::default());
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: &CollectiveConfig, registry: HandlerRegistry) -> Self {
        Self {
            collective: DmCollective::with_registry(config, registry),
            last: None,
        }
    }

    /// Register or replace a handler.
    pub fn handler(&mut self, handler: impl Handler + 'static) -> &mut Self {
        self.collective.registry_mut().register(Arc::new(handler));
        self
    }

    /// Add a non-player character.
    pub fn character(&mut self, name: &str, attributes: Attributes) -> &mut Self {
        self.collective.seed_character(name, attributes);
        self
    }

    /// Process input, returning the outcome.
    pub async fn input(&mut self, text: &str) -> PipelineResult<TurnOutcome> {
        let outcome = self.collective.process(text).await;
        self.last = outcome.as_ref().ok().cloned();
        outcome
    }

    pub fn collective(&self) -> &DmCollective {
        &self.collective
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last.as_ref().map(|o| o.response.as_str())
    }

    pub fn event_count(&self, kind: EventKind) -> usize {
        self.collective.state().event_log().count(kind)
    }

    pub fn in_combat(&self) -> bool {
        self.collective.state().combat_active()
    }
}

/// Assert the session has logged exactly `count` events of `kind`.
pub fn assert_event_count(harness: &TestHarness, kind: EventKind, count: usize) {
    assert_eq!(
        harness.event_count(kind),
        count,
        "expected {} {} events",
        count,
        kind
    );
}
