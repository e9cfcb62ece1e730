//! Handler registry and the dispatcher.
//!
//! The dispatcher runs one turn's handlers under a fixed schedule:
//!
//! 1. The rules oracle, if required, runs first and alone. Nothing else
//!    starts until it has finished.
//! 2. The remaining handlers run as two batches, `{Lore, Pacing}` and
//!    `{Scene, Persona}`. Every member of both batches is its own task, and the
//!    dispatcher waits for all of them before returning.
//!
//! Every invocation has the same time budget. A handler that fails, times out
//! or panics becomes a [`HandlerFailure`] entry; its siblings are unaffected.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::error::{HandlerFailure, PipelineError, PipelineResult};
use crate::handler::{Handler, HandlerResult, PromptContext};
use crate::intent::HandlerName;

/// Handlers that run alongside each other after the rules gate.
pub const LORE_PACING_BATCH: [HandlerName; 2] = [HandlerName::LoreHandler, HandlerName::PacingHandler];

/// The second batch, run concurrently with [`LORE_PACING_BATCH`].
pub const SCENE_PERSONA_BATCH: [HandlerName; 2] =
    [HandlerName::SceneHandler, HandlerName::PersonaHandler];

/// Default per-handler time budget.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// One handler's outcome for a turn.
pub type HandlerOutcome = Result<HandlerResult, HandlerFailure>;

/// Every dispatched handler's outcome, in document order.
pub type DispatchResults = BTreeMap<HandlerName, HandlerOutcome>;

/// The handlers available to the dispatcher, one per name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerName, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name, returning any handler it replaces.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(handler.name(), handler)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn get(&self, name: HandlerName) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&name).cloned()
    }

    pub fn contains(&self, name: HandlerName) -> bool {
        self.handlers.contains_key(&name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> BTreeSet<HandlerName> {
        self.handlers.keys().copied().collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Runs the handlers a turn needs under the gate-then-batches schedule.
#[derive(Debug, Clone)]
pub struct AgentDispatcher {
    registry: HandlerRegistry,
    timeout: Duration,
}

impl AgentDispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke `handlers` for one turn.
    ///
    /// Returns an entry for every requested handler. The only error is a rules
    /// gate that produced no verdict: without one, no other handler may run.
    pub async fn dispatch(
        &self,
        handlers: &BTreeSet<HandlerName>,
        context: PromptContext,
        text: &str,
    ) -> PipelineResult<DispatchResults> {
        let context = Arc::new(context);
        let text: Arc<str> = Arc::from(text);
        let mut results = DispatchResults::new();

        if handlers.contains(&HandlerName::RuleOracle) {
            let verdict = self
                .invoke(HandlerName::RuleOracle, Arc::clone(&context), Arc::clone(&text))
                .await;
            match verdict {
                Ok(result) => {
                    results.insert(HandlerName::RuleOracle, Ok(result));
                }
                Err(failure) => {
                    tracing::error!(error = %failure, "rules gate produced no verdict");
                    return Err(PipelineError::RulesGate(failure));
                }
            }
        }

        let batch = |names: [HandlerName; 2]| {
            names
                .into_iter()
                .filter(|name| handlers.contains(name))
                .map(|name| {
                    let context = Arc::clone(&context);
                    let text = Arc::clone(&text);
                    async move { (name, self.invoke(name, context, text).await) }
                })
                .collect::<Vec<_>>()
        };

        let (lore_pacing, scene_persona) = tokio::join!(
            join_all(batch(LORE_PACING_BATCH)),
            join_all(batch(SCENE_PERSONA_BATCH)),
        );

        for (name, outcome) in lore_pacing.into_iter().chain(scene_persona) {
            if let Err(failure) = &outcome {
                tracing::warn!(handler = %name, error = %failure, "handler produced no result");
            }
            results.insert(name, outcome);
        }

        Ok(results)
    }

    /// Run one handler as its own task under the time budget.
    async fn invoke(&self, name: HandlerName, context: Arc<PromptContext>, text: Arc<str>) -> HandlerOutcome {
        let Some(handler) = self.registry.get(name) else {
            return Err(HandlerFailure::Unavailable { handler: name });
        };

        let mut task = tokio::spawn(async move { handler.invoke(&context, &text).await });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(source))) => Err(HandlerFailure::Failed {
                handler: name,
                source,
            }),
            Ok(Err(join_error)) => Err(HandlerFailure::Panicked {
                handler: name,
                reason: join_error.to_string(),
            }),
            Err(_) => {
                task.abort();
                Err(HandlerFailure::TimedOut {
                    handler: name,
                    after: self.timeout,
                })
            }
        }
    }
}
