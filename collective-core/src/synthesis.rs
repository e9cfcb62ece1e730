//! Merging handler outputs into one response.
//!
//! An illegal ruling from the rules oracle wins outright. Otherwise sections
//! are taken in document order (mechanics, scene, persona, narrative, pacing),
//! skipping anything empty or failed.

use std::collections::BTreeSet;

use crate::dispatch::DispatchResults;
use crate::handler::{tags, HandlerResult};
use crate::intent::{HandlerName, Intent};

/// Prefix of a rules-violation response.
pub const RULES_CHECK_MARKER: &str = "**Rules Check:**";

const MECHANICS_LABEL: &str = "**Mechanics:**";
const NARRATIVE_LABEL: &str = "**Narrative:**";
const SECTION_SEPARATOR: &str = "\n\n";

/// Appended to an unfinished response when the player asked something.
pub const CONTINUE_PROMPT: &str = "What would you like to do next?";

/// Appended to an unfinished response during combat.
pub const ROLL_PROMPT: &str = "Make your roll when ready.";

/// Returned when no handler had anything to say.
pub const CLARIFY_RESPONSE: &str = "I understand your intent, but I need more information to proceed.";

/// Lore replies that mean "nothing happened".
pub const DEFAULT_NOOP_PHRASES: [&str; 3] = ["no immediate", "no significant", "standard"];

/// Words that make an untagged oracle reply worth showing.
const MECHANICS_KEYWORDS: &[&str] = &["roll", "dc", "save", "check"];

const TERMINAL_PUNCTUATION: &[char] = &['.', '!', '?'];

/// Merges one turn's handler outcomes into the player-facing response.
#[derive(Debug, Clone)]
pub struct ResponseSynthesizer {
    noop_phrases: Vec<String>,
}

impl Default for ResponseSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self {
            noop_phrases: DEFAULT_NOOP_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Replace the lore phrases treated as "no consequence".
    pub fn with_noop_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.noop_phrases = phrases
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }

    pub fn noop_phrases(&self) -> &[String] {
        &self.noop_phrases
    }

    /// Whether a lore reply says nothing worth narrating.
    pub fn is_noop(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.noop_phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    /// The rules oracle's result, if it ruled the action illegal.
    pub fn violation<'a>(&self, results: &'a DispatchResults) -> Option<&'a HandlerResult> {
        match results.get(&HandlerName::RuleOracle) {
            Some(Ok(result)) if result.has_tag(tags::ILLEGAL) => Some(result),
            _ => None,
        }
    }

    pub fn synthesize(&self, results: &DispatchResults, intents: &BTreeSet<Intent>) -> String {
        if let Some(verdict) = self.violation(results) {
            return format!("{} {}", RULES_CHECK_MARKER, verdict.text.trim());
        }

        let sections: Vec<String> = results
            .values()
            .filter_map(|outcome| outcome.as_ref().ok())
            .filter(|result| !result.is_empty())
            .filter_map(|result| self.section(result))
            .collect();

        if sections.is_empty() {
            return CLARIFY_RESPONSE.to_string();
        }

        let mut response = sections.join(SECTION_SEPARATOR);
        if !ends_with_terminal(&response) {
            if intents.contains(&Intent::Information) {
                response.push(' ');
                response.push_str(CONTINUE_PROMPT);
            } else if intents.contains(&Intent::CombatAction) {
                response.push(' ');
                response.push_str(ROLL_PROMPT);
            }
        }
        response
    }

    fn section(&self, result: &HandlerResult) -> Option<String> {
        let text = result.text.trim();
        match result.handler {
            HandlerName::RuleOracle => {
                let lower = text.to_lowercase();
                let relevant = result.has_tag(tags::MECHANICS)
                    || MECHANICS_KEYWORDS.iter().any(|k| lower.contains(k));
                relevant.then(|| format!("{} {}", MECHANICS_LABEL, text))
            }
            HandlerName::SceneHandler | HandlerName::PersonaHandler => Some(text.to_string()),
            HandlerName::LoreHandler => {
                (!self.is_noop(text)).then(|| format!("{} {}", NARRATIVE_LABEL, text))
            }
            HandlerName::PacingHandler => result.has_tag(tags::PACING).then(|| format!("*{}*", text)),
        }
    }
}

/// Ignores trailing emphasis and closing quotes.
fn ends_with_terminal(text: &str) -> bool {
    text.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '"' | '\'' | ')'))
        .ends_with(TERMINAL_PUNCTUATION)
}
