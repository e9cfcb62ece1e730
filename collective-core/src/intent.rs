//! Intent classification and handler routing.
//!
//! Player text is matched case-insensitively against a static phrase table to
//! find what the player is trying to do. The handler set follows from the
//! intents through a fixed table, so the same text always routes the same way.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker that turns unmatched text into a question.
const QUERY_MARKER: char = '?';

/// Phrases that signal each intent.
static INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::CombatAction,
        &[
            "attack", "cast spell", "move", "dash", "dodge", "help", "hide", "ready", "flee",
            "retreat", "surrender", "yield", "sheathe",
        ],
    ),
    (
        Intent::SkillCheck,
        &[
            "check for",
            "search",
            "investigate",
            "persuade",
            "deceive",
            "insight",
            "perception",
            "stealth",
            "athletics",
            "acrobatics",
            "pick lock",
            "disarm trap",
        ],
    ),
    (
        Intent::Roleplay,
        &["say", "tell", "ask", "talk to", "speak with", "conversation"],
    ),
    (
        Intent::Movement,
        &["go to", "walk to", "run to", "travel to", "enter", "exit", "approach"],
    ),
    (
        Intent::Inventory,
        &["use item", "drink potion", "equip", "unequip", "drop", "pick up"],
    ),
    (Intent::SpellCasting, &["cast", "spell", "cantrip", "ritual"]),
    (
        Intent::Information,
        &["what do i see", "describe", "look around", "examine", "inspect"],
    ),
];

/// What the player's text is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CombatAction,
    SkillCheck,
    Roleplay,
    Movement,
    Inventory,
    SpellCasting,
    Information,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::CombatAction => "combat_action",
            Intent::SkillCheck => "skill_check",
            Intent::Roleplay => "roleplay",
            Intent::Movement => "movement",
            Intent::Inventory => "inventory",
            Intent::SpellCasting => "spell_casting",
            Intent::Information => "information",
        }
    }

    /// Handlers this intent needs, besides the ones every turn gets.
    pub fn handlers(&self) -> &'static [HandlerName] {
        match self {
            Intent::CombatAction | Intent::SkillCheck | Intent::SpellCasting => {
                &[HandlerName::RuleOracle]
            }
            Intent::Information | Intent::Movement => &[HandlerName::SceneHandler],
            Intent::Roleplay => &[HandlerName::PersonaHandler],
            Intent::Inventory => &[],
        }
    }

    /// Whether this intent alone warrants a pacing pass.
    fn needs_pacing(&self) -> bool {
        matches!(self, Intent::CombatAction | Intent::Movement)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The specialist handlers a turn can be routed to.
///
/// Declaration order is document order: the order results appear in a
/// synthesized response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandlerName {
    RuleOracle,
    SceneHandler,
    PersonaHandler,
    LoreHandler,
    PacingHandler,
}

impl HandlerName {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerName::RuleOracle => "RuleOracle",
            HandlerName::SceneHandler => "SceneHandler",
            HandlerName::PersonaHandler => "PersonaHandler",
            HandlerName::LoreHandler => "LoreHandler",
            HandlerName::PacingHandler => "PacingHandler",
        }
    }

    pub fn all() -> [HandlerName; 5] {
        [
            HandlerName::RuleOracle,
            HandlerName::SceneHandler,
            HandlerName::PersonaHandler,
            HandlerName::LoreHandler,
            HandlerName::PacingHandler,
        ]
    }
}

impl fmt::Display for HandlerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of classifying one line of player text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Never empty
    pub intents: BTreeSet<Intent>,
    /// Always contains [`HandlerName::LoreHandler`]
    pub handlers: BTreeSet<HandlerName>,
}

impl Classification {
    pub fn has_intent(&self, intent: Intent) -> bool {
        self.intents.contains(&intent)
    }

    pub fn has_handler(&self, handler: HandlerName) -> bool {
        self.handlers.contains(&handler)
    }
}

/// Maps player text to intents and the handlers that serve them.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();

        let mut intents: BTreeSet<Intent> = INTENT_PATTERNS
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
            .map(|(intent, _)| *intent)
            .collect();

        if intents.is_empty() {
            intents.insert(if text.contains(QUERY_MARKER) {
                Intent::Information
            } else {
                Intent::Roleplay
            });
        }

        let handlers = Self::handlers_for(&intents);
        tracing::debug!(?intents, ?handlers, "classified player input");

        Classification { intents, handlers }
    }

    /// The fixed intent-to-handler routing.
    pub fn handlers_for(intents: &BTreeSet<Intent>) -> BTreeSet<HandlerName> {
        let mut handlers: BTreeSet<HandlerName> = intents
            .iter()
            .flat_map(|intent| intent.handlers().iter().copied())
            .collect();

        handlers.insert(HandlerName::LoreHandler);

        if intents.len() > 1 || intents.iter().any(Intent::needs_pacing) {
            handlers.insert(HandlerName::PacingHandler);
        }

        handlers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Classification {
        IntentClassifier::new().classify(text)
    }

    #[test]
    fn test_spell_cast_routes_to_oracle() {
        let c = classify("I cast fireball");
        assert_eq!(c.intents, BTreeSet::from([Intent::SpellCasting]));
        assert_eq!(
            c.handlers,
            BTreeSet::from([HandlerName::RuleOracle, HandlerName::LoreHandler])
        );
    }

    #[test]
    fn test_fallback_to_information_on_question() {
        let c = classify("Is it raining?");
        assert_eq!(c.intents, BTreeSet::from([Intent::Information]));
        assert!(c.has_handler(HandlerName::SceneHandler));
        assert!(!c.has_handler(HandlerName::PacingHandler));
    }

    #[test]
    fn test_fallback_to_roleplay() {
        let c = classify("I hum a quiet tune");
        assert_eq!(c.intents, BTreeSet::from([Intent::Roleplay]));
        assert_eq!(
            c.handlers,
            BTreeSet::from([HandlerName::PersonaHandler, HandlerName::LoreHandler])
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("I ATTACK the orc"), classify("i attack the orc"));
        assert!(classify("LOOK AROUND").has_intent(Intent::Information));
    }

    #[test]
    fn test_movement_adds_pacing() {
        let c = classify("I walk to the old mill");
        assert!(c.has_intent(Intent::Movement));
        assert!(c.has_handler(HandlerName::SceneHandler));
        assert!(c.has_handler(HandlerName::PacingHandler));
    }

    #[test]
    fn test_disengaging_routes_to_pacing() {
        for input in ["I flee", "We surrender!", "I sheathe my blade"] {
            let c = classify(input);
            assert!(c.has_intent(Intent::CombatAction), "{input}");
            assert!(c.has_handler(HandlerName::PacingHandler), "{input}");
        }
    }

    #[test]
    fn test_multiple_intents_add_pacing() {
        let c = classify("I search the chest and drink potion");
        assert!(c.has_intent(Intent::SkillCheck));
        assert!(c.has_intent(Intent::Inventory));
        assert!(c.has_handler(HandlerName::PacingHandler));
        assert!(c.has_handler(HandlerName::RuleOracle));
    }

    #[test]
    fn test_inventory_alone_needs_only_lore() {
        let c = classify("I equip the shield");
        assert_eq!(c.intents, BTreeSet::from([Intent::Inventory]));
        assert_eq!(c.handlers, BTreeSet::from([HandlerName::LoreHandler]));
    }

    #[test]
    fn test_lore_always_present() {
        let inputs = [
            "",
            "?",
            "I attack",
            "describe the room",
            "I tell the guard a joke",
            "I pick up the coin",
        ];
        for input in inputs {
            let c = classify(input);
            assert!(!c.intents.is_empty());
            assert!(c.has_handler(HandlerName::LoreHandler), "{input}");
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = IntentClassifier::new();
        let inputs = [
            "I cast fireball at the goblins",
            "I approach the merchant and ask about rumors",
            "What do I see?",
            "I sneak past",
        ];
        for input in inputs {
            assert_eq!(classifier.classify(input), classifier.classify(input));
        }
    }

    #[test]
    fn test_handlers_follow_intents() {
        let intents = BTreeSet::from([Intent::Roleplay, Intent::Information]);
        assert_eq!(
            IntentClassifier::handlers_for(&intents),
            BTreeSet::from([
                HandlerName::SceneHandler,
                HandlerName::PersonaHandler,
                HandlerName::LoreHandler,
                HandlerName::PacingHandler,
            ])
        );
    }
}
