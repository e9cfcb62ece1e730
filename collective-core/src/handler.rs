//! Handler trait and handler output types.
//!
//! A handler is one specialist of the collective: the rules oracle, or one of
//! the text-generating collaborators (lore, scene, persona, pacing). The
//! dispatcher only sees the [`Handler`] trait; how a handler produces its text
//! is its own business.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::HandlerError;
use crate::intent::{HandlerName, Intent};
use crate::session::{SessionEffect, SessionSnapshot};

/// Well-known result tags.
pub mod tags {
    /// The rules oracle ruled the action illegal
    pub const ILLEGAL: &str = "illegal";
    /// The text carries rolls, DCs or costs
    pub const MECHANICS: &str = "mechanics";
    /// A pacing recommendation worth showing
    pub const PACING: &str = "pacing";
}

/// Everything a handler may read while serving one turn.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub snapshot: SessionSnapshot,
    pub intents: BTreeSet<Intent>,
}

impl PromptContext {
    pub fn new(snapshot: SessionSnapshot, intents: BTreeSet<Intent>) -> Self {
        Self { snapshot, intents }
    }

    pub fn has_intent(&self, intent: Intent) -> bool {
        self.intents.contains(&intent)
    }
}

/// One handler's contribution to a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResult {
    pub handler: HandlerName,
    pub text: String,
    pub tags: BTreeSet<String>,
    /// Session changes this handler asks the driver to make
    pub effects: Vec<SessionEffect>,
}

impl HandlerResult {
    pub fn new(handler: HandlerName, text: impl Into<String>) -> Self {
        Self {
            handler,
            text: text.into(),
            tags: BTreeSet::new(),
            effects: Vec::new(),
        }
    }

    /// A result with nothing to say.
    pub fn empty(handler: HandlerName) -> Self {
        Self::new(handler, String::new())
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_effect(mut self, effect: SessionEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A specialist the dispatcher can invoke.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Which slot of the collective this handler fills
    fn name(&self) -> HandlerName;

    /// Produce this handler's contribution for the player's text.
    ///
    /// Handlers must not assume they run alone: the dispatcher may invoke
    /// several concurrently and drops any invocation that exceeds its time
    /// budget.
    async fn invoke(&self, context: &PromptContext, text: &str) -> Result<HandlerResult, HandlerError>;
}
