//! Built-in template handlers.
//!
//! Small deterministic stand-ins for the text-generating collaborators, so a
//! session runs end to end without a generation backend. Each one fills a
//! fixed sentence from the prompt context.

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::HandlerRegistry;
use crate::error::HandlerError;
use crate::handler::{tags, Handler, HandlerResult, PromptContext};
use crate::intent::{HandlerName, Intent};
use crate::oracle::RuleOracle;
use crate::rules::RuleEngine;
use crate::session::{SessionEffect, SessionPhase};

/// Phrases that introduce a destination.
const DESTINATION_MARKERS: &[&str] = &["go to ", "walk to ", "travel to ", "run to ", "enter "];

/// Verbs with consequences beyond the current scene.
const MAJOR_VERBS: &[&str] = &[
    "kill", "slay", "destroy", "burn", "steal", "betray", "rescue", "free",
];

/// Verbs that take the player out of a fight.
const DISENGAGE_VERBS: &[&str] = &["flee", "retreat", "surrender", "yield", "sheathe"];

/// Lore reply for actions with no lasting consequence.
pub const NO_CONSEQUENCE: &str = "No immediate consequences.";

/// Registry with the rules oracle and all four template handlers.
pub fn template_registry(engine: RuleEngine) -> HandlerRegistry {
    HandlerRegistry::new()
        .with_handler(RuleOracle::new(engine))
        .with_handler(SceneDescriber)
        .with_handler(PersonaVoice)
        .with_handler(LoreKeeper)
        .with_handler(PacingAdvisor)
}

/// Describes the surroundings and reports arrivals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneDescriber;

impl SceneDescriber {
    /// The place named after a destination marker, without trailing punctuation.
    pub fn destination(text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        DESTINATION_MARKERS.iter().find_map(|marker| {
            let (index, _) = lower
                .match_indices(marker)
                .find(|(i, _)| *i == 0 || lower[..*i].ends_with(' '))?;
            let start = index + marker.len();
            // Lowercasing can change byte lengths, so map back only on a boundary.
            let rest = text.get(start..).unwrap_or(&lower[start..]);
            let place = rest
                .trim()
                .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
            (!place.is_empty()).then(|| place.to_string())
        })
    }
}

#[async_trait]
impl Handler for SceneDescriber {
    fn name(&self) -> HandlerName {
        HandlerName::SceneHandler
    }

    async fn invoke(&self, context: &PromptContext, text: &str) -> Result<HandlerResult, HandlerError> {
        if let Some(place) = Self::destination(text) {
            return Ok(HandlerResult::new(self.name(), format!("You make your way to {}.", place))
                .with_effect(SessionEffect::LocationChanged { location: place }));
        }

        let snapshot = &context.snapshot;
        let mut description = format!("You take in your surroundings at {}.", snapshot.location);
        let npcs: Vec<&str> = snapshot.npcs().map(|(name, _)| name.as_str()).collect();
        if !npcs.is_empty() {
            description.push_str(&format!(" Nearby: {}.", npcs.join(", ")));
        }
        if snapshot.combat_active {
            description.push_str(" Steel rings out around you.");
        }
        Ok(HandlerResult::new(self.name(), description))
    }
}

/// Voices whichever character the player addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonaVoice;

#[async_trait]
impl Handler for PersonaVoice {
    fn name(&self) -> HandlerName {
        HandlerName::PersonaHandler
    }

    async fn invoke(&self, context: &PromptContext, text: &str) -> Result<HandlerResult, HandlerError> {
        let lower = text.to_lowercase();
        let addressed = context
            .snapshot
            .npcs()
            .find(|(name, _)| lower.contains(&name.to_lowercase()));

        let Some((name, attributes)) = addressed else {
            return Ok(HandlerResult::new(
                self.name(),
                format!("Your words carry across {}, but no one answers.", context.snapshot.location),
            ));
        };

        let reply = match attributes.get("disposition").and_then(Value::as_str) {
            Some("friendly") => format!("{} smiles warmly. \"Well met, friend!\"", name),
            Some("hostile") => format!("{} scowls. \"Say your piece and be gone.\"", name),
            _ => format!("{} considers your words. \"Go on.\"", name),
        };
        Ok(HandlerResult::new(self.name(), reply))
    }
}

/// Tracks consequences for the wider world.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoreKeeper;

#[async_trait]
impl Handler for LoreKeeper {
    fn name(&self) -> HandlerName {
        HandlerName::LoreHandler
    }

    async fn invoke(&self, context: &PromptContext, text: &str) -> Result<HandlerResult, HandlerError> {
        let lower = text.to_lowercase();
        let verb = lower
            .split(|c: char| !c.is_alphabetic())
            .find(|word| MAJOR_VERBS.contains(word));

        let text = match verb {
            Some(verb) => format!(
                "Word of this will spread beyond {}. Those who hear that you chose to {} will remember it.",
                context.snapshot.location, verb
            ),
            None => NO_CONSEQUENCE.to_string(),
        };
        Ok(HandlerResult::new(self.name(), text))
    }
}

/// Suggests how quickly the story should move.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacingAdvisor;

#[async_trait]
impl Handler for PacingAdvisor {
    fn name(&self) -> HandlerName {
        HandlerName::PacingHandler
    }

    async fn invoke(&self, context: &PromptContext, text: &str) -> Result<HandlerResult, HandlerError> {
        let snapshot = &context.snapshot;
        let mut result = HandlerResult::empty(self.name());

        let lower = text.to_lowercase();
        let disengaging = lower
            .split(|c: char| !c.is_alphabetic())
            .any(|word| DISENGAGE_VERBS.contains(&word));

        let advice = if snapshot.combat_active && disengaging {
            result = result.with_effect(SessionEffect::CombatEnded);
            Some("The fight breaks off. Give everyone a moment to catch their breath.")
        } else if context.has_intent(Intent::CombatAction) {
            Some("Keep each exchange short and let the dice set the rhythm.")
        } else if context.intents.len() > 1 {
            Some("Several things are happening at once. Resolve them one at a time.")
        } else if context.has_intent(Intent::Movement) && snapshot.phase == SessionPhase::Exploration {
            Some("The journey has run long. A quick cut to the next point of interest keeps momentum.")
        } else {
            None
        };

        if let Some(advice) = advice {
            result.text = advice.to_string();
            result = result.with_tag(tags::PACING);
        }
        Ok(result)
    }
}
