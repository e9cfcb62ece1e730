//! The pipeline driver.
//!
//! [`DmCollective`] owns the session and runs each command through
//! classification, dispatch and synthesis, then writes the turn back to the
//! session. It is the only writer: handlers see snapshots and report
//! [`SessionEffect`]s, which the driver applies once the response is settled.

use tracing::Instrument;

use crate::config::CollectiveConfig;
use crate::dispatch::{AgentDispatcher, DispatchResults, HandlerRegistry};
use crate::error::{HandlerFailure, PipelineResult};
use crate::handler::PromptContext;
use crate::handlers::template_registry;
use crate::intent::{Classification, IntentClassifier};
use crate::rules::RuleEngine;
use crate::session::{Attributes, EventKind, EventSource, SessionEffect, SessionState};
use crate::synthesis::ResponseSynthesizer;

/// What the player sees when the pipeline itself fails.
pub const FALLBACK_RESPONSE: &str =
    "I understand your intent, but I need a moment to process that. Could you rephrase or provide more details?";

/// Everything one processed command produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Turn number this command was processed as
    pub turn: u32,
    /// The synthesized response
    pub response: String,
    pub classification: Classification,
    /// Whether the rules oracle rejected the action
    pub ruled_illegal: bool,
    /// Handlers that produced nothing, in document order
    pub failures: Vec<HandlerFailure>,
    /// Effects written to the session, in the order applied
    pub applied_effects: Vec<SessionEffect>,
}

/// Routes player commands through the handler collective.
#[derive(Debug)]
pub struct DmCollective {
    state: SessionState,
    classifier: IntentClassifier,
    dispatcher: AgentDispatcher,
    synthesizer: ResponseSynthesizer,
}

impl DmCollective {
    /// A collective backed by the built-in template handlers.
    pub fn new(config: &CollectiveConfig) -> Self {
        Self::with_registry(config, template_registry(RuleEngine::new()))
    }

    /// A fresh session served by the given handlers.
    pub fn with_registry(config: &CollectiveConfig, registry: HandlerRegistry) -> Self {
        let mut state = SessionState::new(config.campaign_name.clone());
        state.set_location(config.starting_location.clone(), EventSource::System);
        state.set_player(config.player_name.clone(), config.player_attributes());
        Self::resume(state, config, registry)
    }

    /// Continue an existing session.
    pub fn resume(state: SessionState, config: &CollectiveConfig, registry: HandlerRegistry) -> Self {
        Self {
            state,
            classifier: IntentClassifier::new(),
            dispatcher: AgentDispatcher::new(registry).with_timeout(config.handler_timeout),
            synthesizer: ResponseSynthesizer::new().with_noop_phrases(config.lore_noop_phrases.clone()),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Add a character to the cast, or merge attributes into an existing one.
    ///
    /// Meant for seeding a session between turns. Changes during play arrive
    /// as handler effects.
    pub fn seed_character(&mut self, name: impl Into<String>, attributes: Attributes) {
        self.state.update_character(name, attributes);
    }

    pub fn dispatcher(&self) -> &AgentDispatcher {
        &self.dispatcher
    }

    /// Swap handlers between turns.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        self.dispatcher.registry_mut()
    }

    pub fn synthesizer(&self) -> &ResponseSynthesizer {
        &self.synthesizer
    }

    /// Process one command and return the response text, falling back to
    /// [`FALLBACK_RESPONSE`] on a pipeline fault.
    pub async fn respond(&mut self, text: &str) -> String {
        match self.process(text).await {
            Ok(outcome) => outcome.response,
            Err(err) => {
                tracing::error!(error = %err, "turn failed");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    /// Process one command.
    ///
    /// On a pipeline fault the error is logged to the session as an `error`
    /// event and returned; no `player_action` event is written for the turn.
    pub async fn process(&mut self, text: &str) -> PipelineResult<TurnOutcome> {
        self.state.advance_turn();
        let turn = self.state.turn_number();
        let span = tracing::info_span!("turn", turn);
        self.run_turn(turn, text).instrument(span).await
    }

    async fn run_turn(&mut self, turn: u32, text: &str) -> PipelineResult<TurnOutcome> {
        let classification = self.classifier.classify(text);
        let context = PromptContext::new(self.state.snapshot(), classification.intents.clone());

        let results = match self
            .dispatcher
            .dispatch(&classification.handlers, context, text)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                tracing::error!(error = %err, "pipeline fault");
                self.state
                    .log_event(EventKind::Error, err.to_string(), EventSource::System);
                return Err(err);
            }
        };

        let response = self.synthesizer.synthesize(&results, &classification.intents);
        let ruled_illegal = self.synthesizer.violation(&results).is_some();

        self.state
            .log_event(EventKind::PlayerAction, text, EventSource::Player);
        let applied_effects = if ruled_illegal {
            Vec::new()
        } else {
            self.apply_effects(&results)
        };

        let failures: Vec<HandlerFailure> = results
            .into_values()
            .filter_map(Result::err)
            .collect();

        tracing::info!(
            intents = ?classification.intents,
            ruled_illegal,
            failures = failures.len(),
            effects = applied_effects.len(),
            "turn processed"
        );

        Ok(TurnOutcome {
            turn,
            response,
            classification,
            ruled_illegal,
            failures,
            applied_effects,
        })
    }

    /// Apply every reported effect in document order. A rejected effect is
    /// logged and skipped.
    fn apply_effects(&mut self, results: &DispatchResults) -> Vec<SessionEffect> {
        let mut applied = Vec::new();
        for (name, outcome) in results {
            let Ok(result) = outcome else { continue };
            for effect in &result.effects {
                match self.state.apply_effect(effect, EventSource::Handler(*name)) {
                    Ok(()) => applied.push(effect.clone()),
                    Err(err) => tracing::warn!(handler = %name, error = %err, "effect rejected"),
                }
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::HandlerName;
    use crate::testing::{FailingHandler, ScriptedHandler};

    fn config() -> CollectiveConfig {
        CollectiveConfig::new("Test").with_player_name("Thorin")
    }

    #[test]
    fn test_new_session_setup() {
        let collective = DmCollective::new(&config().with_player_class("fighter"));
        let state = collective.state();

        assert_eq!(state.location(), "Millbrook Town Square");
        assert_eq!(state.player(), Some("Thorin"));
        assert_eq!(state.turn_number(), 0);
        assert_eq!(state.event_log().count(EventKind::SessionStart), 1);
        assert_eq!(state.event_log().count(EventKind::LocationChange), 1);
        assert_eq!(state.snapshot().player_class(), Some("fighter"));
    }

    #[tokio::test]
    async fn test_turn_logs_player_action() {
        let mut collective = DmCollective::new(&config());
        let outcome = collective.process("I look around").await.unwrap();

        assert_eq!(outcome.turn, 1);
        assert!(outcome.failures.is_empty());
        let last = collective.state().event_log().last().unwrap();
        assert_eq!(last.kind, EventKind::PlayerAction);
        assert_eq!(last.description, "I look around");
        assert_eq!(last.source, EventSource::Player);
    }

    #[tokio::test]
    async fn test_location_effect_applied_after_action() {
        let mut collective = DmCollective::new(&config());
        let outcome = collective.process("I walk to the Old Mill").await.unwrap();

        assert_eq!(collective.state().location(), "the Old Mill");
        assert_eq!(
            outcome.applied_effects,
            vec![SessionEffect::LocationChanged {
                location: "the Old Mill".to_string()
            }]
        );

        let kinds: Vec<_> = collective
            .state()
            .event_log()
            .recent(2)
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::PlayerAction, EventKind::LocationChange]);
    }

    #[tokio::test]
    async fn test_seeded_character_is_visible_to_handlers() {
        let mut collective = DmCollective::new(&config());
        let mut goblin = Attributes::new();
        goblin.insert("armor_class".to_string(), serde_json::json!(12));
        collective.seed_character("Goblin", goblin);

        assert_eq!(collective.state().snapshot().armor_class_of("Goblin"), Some(12));
        let response = collective.respond("I attack the goblin").await;
        assert!(response.starts_with("**Mechanics:** Attack roll against AC 12."));
    }

    #[tokio::test]
    async fn test_legal_cast_spends_slot_and_next_cast_is_refused() {
        let mut collective = DmCollective::new(&config().with_player_class("wizard").with_player_level(5));
        let mut slots = Attributes::new();
        slots.insert("spell_slots".to_string(), serde_json::json!({"1": 3, "3": 1}));
        collective.seed_character("Thorin", slots);

        let outcome = collective.process("I cast fireball").await.unwrap();
        assert!(!outcome.ruled_illegal);
        assert_eq!(
            collective.state().character("Thorin").unwrap()["spell_slots"],
            serde_json::json!({"1": 3, "3": 0})
        );
        assert_eq!(collective.state().event_log().count(EventKind::CharacterUpdate), 1);

        let outcome = collective.process("I cast fireball").await.unwrap();
        assert!(outcome.ruled_illegal);
        assert!(outcome
            .response
            .ends_with("- No 3-level spell slots remaining"));

        // Other levels draw on their own slots.
        let outcome = collective.process("I cast magic missile").await.unwrap();
        assert!(!outcome.ruled_illegal);
        assert_eq!(
            collective.state().character("Thorin").unwrap()["spell_slots"],
            serde_json::json!({"1": 2, "3": 0})
        );
    }

    #[tokio::test]
    async fn test_invalid_effect_is_skipped() {
        let registry = HandlerRegistry::new().with_handler(
            ScriptedHandler::new(HandlerName::LoreHandler, "The wind shifts.").with_effect(
                SessionEffect::LocationChanged {
                    location: "  ".to_string(),
                },
            ),
        );
        let mut collective = DmCollective::with_registry(&config(), registry);
        let outcome = collective.process("I hum").await.unwrap();

        assert!(outcome.applied_effects.is_empty());
        assert_eq!(collective.state().location(), "Millbrook Town Square");
    }

    #[tokio::test]
    async fn test_gate_fault_falls_back() {
        let registry = HandlerRegistry::new()
            .with_handler(FailingHandler::new(HandlerName::RuleOracle))
            .with_handler(ScriptedHandler::new(HandlerName::LoreHandler, "Lore."));
        let mut collective = DmCollective::with_registry(&config(), registry);

        let response = collective.respond("I attack the goblin").await;
        assert_eq!(response, FALLBACK_RESPONSE);

        let log = collective.state().event_log();
        assert_eq!(log.count(EventKind::PlayerAction), 0);
        assert_eq!(log.last().unwrap().kind, EventKind::Error);
        assert_eq!(collective.state().turn_number(), 1);
    }
}
