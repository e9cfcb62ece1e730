//! The rules oracle handler.
//!
//! Turns player text into a [`RuleQuery`], asks the [`RuleEngine`] and renders
//! the ruling. The actor's class and level come from the player character in
//! the session snapshot.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::handler::{tags, Handler, HandlerResult, PromptContext};
use crate::intent::HandlerName;
use crate::rules::{Ability, ActionKind, RuleEngine, RuleQuery, RuleResult, Skill};
use crate::session::{Attributes, SessionEffect, SessionSnapshot};

/// One step of an action-economy pattern.
#[derive(Debug, Clone, Copy)]
enum Cue {
    Phrase(&'static str),
    /// "spell" or the name of a known spell
    Spell,
}

use Cue::{Phrase, Spell};

/// Actions that cannot share a turn, as cues that must appear in order.
static ACTION_ECONOMY: &[(&[Cue], &str)] = &[
    (
        &[Phrase("attack"), Phrase("and"), Phrase("cast"), Spell],
        "Cannot attack and cast a spell in the same turn (unless using a bonus action spell).",
    ),
    (
        &[Phrase("dash"), Phrase("and"), Phrase("attack")],
        "Cannot Dash and Attack in the same turn without special abilities.",
    ),
    (
        &[Phrase("cast"), Phrase("and"), Phrase("cast")],
        "Cannot cast two spells in the same turn (except a cantrip alongside a bonus action spell).",
    ),
];

static SPELL_WORDS: &[&str] = &["spell", "spells", "cantrip"];

/// Phrases that name or imply a skill. Skill names are tried first.
static SKILL_VERBS: &[(&str, Skill)] = &[
    ("pick lock", Skill::SleightOfHand),
    ("disarm trap", Skill::SleightOfHand),
    ("pickpocket", Skill::SleightOfHand),
    ("sneak", Skill::Stealth),
    ("hide", Skill::Stealth),
    ("climb", Skill::Athletics),
    ("jump", Skill::Athletics),
    ("swim", Skill::Athletics),
    ("persuade", Skill::Persuasion),
    ("deceive", Skill::Deception),
    ("lie to", Skill::Deception),
    ("intimidate", Skill::Intimidation),
    ("investigate", Skill::Investigation),
    ("search", Skill::Perception),
    ("check for", Skill::Perception),
    ("recall", Skill::History),
    ("track", Skill::Survival),
];

/// Text fragments mapped to environment factors the engine understands.
static ENVIRONMENT_CUES: &[(&[&str], &str)] = &[
    (&["difficult terrain"], "difficult terrain"),
    (&["darkness", "dim light"], "adverse visibility"),
    (&["rain", "storm"], "adverse weather"),
    (&["extreme", "nearly impossible"], "extreme conditions"),
    (&["easy", "simple"], "easy conditions"),
    (&["prone"], "prone"),
    (&["grappled"], "grappled"),
    (&["restrained"], "restrained"),
];

static MOVEMENT_VERBS: &[&str] = &[
    "move", "moving", "walk", "run", "dash", "crawl", "go to", "travel",
];

static ABILITY_ABBREVIATIONS: &[(&str, Ability)] = &[
    ("str", Ability::Strength),
    ("dex", Ability::Dexterity),
    ("con", Ability::Constitution),
    ("int", Ability::Intelligence),
    ("wis", Ability::Wisdom),
    ("cha", Ability::Charisma),
];

/// Handler that rules on the legality and mechanics of an action.
#[derive(Debug, Clone, Default)]
pub struct RuleOracle {
    engine: RuleEngine,
}

impl RuleOracle {
    pub fn new(engine: RuleEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Build a query from player text, or `None` when nothing in the text
    /// calls for a ruling.
    pub fn parse_query(&self, text: &str, snapshot: &SessionSnapshot) -> Option<RuleQuery> {
        let lower = text.to_lowercase();
        let words = split_words(&lower);
        let phrases = Phrases::new(&words);

        let spell = self
            .engine
            .table()
            .spell_names()
            .find(|name| phrases.contains(name))
            .map(str::to_string);
        let skill = find_skill(&phrases);
        let ability = find_ability(&words);

        let mut query = if spell.is_some() || (phrases.contains("cast") && phrases.contains("spell")) {
            let mut query = RuleQuery::new(ActionKind::SpellCast);
            query.spell_name = spell;
            query.spell_slots = snapshot.player_spell_slots();
            query
        } else if let Some(skill) = skill {
            RuleQuery::new(ActionKind::SkillCheck).with_skill(skill.name())
        } else if phrases.contains("saving throw") || phrases.contains("save") {
            let mut query = RuleQuery::new(ActionKind::SavingThrow);
            query.ability = ability.map(|a| a.name().to_string());
            query
        } else if phrases.contains("attack") || phrases.contains("attacks") {
            let mut query = RuleQuery::new(ActionKind::AttackRoll);
            query.target_value = find_target_value(&words, &lower, snapshot);
            query
        } else if MOVEMENT_VERBS.iter().any(|verb| phrases.contains(verb)) {
            RuleQuery::new(ActionKind::Movement)
        } else if let Some(ability) = ability {
            RuleQuery::new(ActionKind::AbilityCheck).with_ability(ability.name())
        } else {
            return None;
        };

        query.actor_class = snapshot.player_class().map(str::to_string);
        query.actor_level = snapshot.player_level();

        if lower.contains("disadvantage") {
            query.modifiers.insert("disadvantage".to_string());
        }
        if lower.replace("disadvantage", "").contains("advantage") {
            query.modifiers.insert("advantage".to_string());
        }
        for (cues, factor) in ENVIRONMENT_CUES {
            if cues.iter().any(|cue| phrases.contains(cue)) {
                query.environment_factors.insert(factor.to_string());
            }
        }

        Some(query)
    }

    fn action_economy_violation(&self, phrases: &Phrases) -> Option<&'static str> {
        let find_cue = |from: usize, cue: &Cue| match cue {
            Phrase(phrase) => phrases.find_from(from, phrase),
            Spell => SPELL_WORDS
                .iter()
                .filter_map(|word| phrases.find_from(from, word))
                .chain(
                    self.engine
                        .table()
                        .spell_names()
                        .filter_map(|name| phrases.find_from(from, name)),
                )
                .min(),
        };

        ACTION_ECONOMY
            .iter()
            .find(|(cues, _)| cues.iter().try_fold(0, |from, cue| find_cue(from, cue)).is_some())
            .map(|(_, reason)| *reason)
    }

    /// Session changes that follow from a legal ruling: a landed attack roll
    /// opens combat, and a levelled spell spends one tracked slot.
    fn consequences(
        query: &RuleQuery,
        result: &RuleResult,
        snapshot: &SessionSnapshot,
    ) -> Vec<SessionEffect> {
        let mut effects = Vec::new();

        if query.action_kind == ActionKind::AttackRoll && !snapshot.combat_active {
            effects.push(SessionEffect::CombatStarted);
        }

        let levelled = result.resource_cost().filter(|&level| level > 0);
        if let (Some(level), Some(slots), Some(player)) =
            (levelled, &query.spell_slots, &snapshot.player)
        {
            let remaining: Map<String, Value> = slots
                .iter()
                .map(|(&slot_level, &count)| {
                    let count = if slot_level == level { count.saturating_sub(1) } else { count };
                    (slot_level.to_string(), Value::from(count))
                })
                .collect();
            let mut attributes = Attributes::new();
            attributes.insert("spell_slots".to_string(), Value::Object(remaining));
            effects.push(SessionEffect::CharacterUpdated {
                name: player.clone(),
                attributes,
            });
        }

        effects
    }

    fn render(result: &RuleResult) -> String {
        let mut parts = vec![format!("{}.", result.explanation())];
        if let Some(roll) = result.required_roll() {
            parts.push(format!("Roll {}.", roll));
        }
        if let Some(formula) = result.formula() {
            parts.push(format!("Dice: {}.", formula));
        }
        if !result.effects().is_empty() {
            parts.push(format!("{}.", result.effects().join("; ")));
        }
        match result.resource_cost() {
            Some(0) => parts.push("Cantrip, no spell slot used.".to_string()),
            Some(level) => parts.push(format!("Uses a level {} spell slot.", level)),
            None => {}
        }
        parts.join(" ")
    }
}

#[async_trait]
impl Handler for RuleOracle {
    fn name(&self) -> HandlerName {
        HandlerName::RuleOracle
    }

    async fn invoke(&self, context: &PromptContext, text: &str) -> Result<HandlerResult, HandlerError> {
        let lower = text.to_lowercase();
        if let Some(reason) = self.action_economy_violation(&Phrases::new(&split_words(&lower))) {
            tracing::debug!(reason, "action economy violation");
            return Ok(HandlerResult::new(
                self.name(),
                format!("{} Consider splitting actions across multiple turns.", reason),
            )
            .with_tag(tags::ILLEGAL));
        }

        let Some(query) = self.parse_query(text, &context.snapshot) else {
            tracing::debug!("no ruling needed");
            return Ok(HandlerResult::empty(self.name()));
        };

        let result = self.engine.resolve(&query);
        tracing::debug!(
            kind = %query.action_kind,
            legal = result.is_legal(),
            dc = ?result.difficulty_value(),
            "rules resolved"
        );

        if !result.is_legal() {
            return Ok(HandlerResult::new(self.name(), result.explanation()).with_tag(tags::ILLEGAL));
        }

        let mut output = HandlerResult::new(self.name(), Self::render(&result));
        if result.has_mechanics() {
            output = output.with_tag(tags::MECHANICS);
        }
        for effect in Self::consequences(&query, &result, &context.snapshot) {
            output = output.with_effect(effect);
        }
        Ok(output)
    }
}

/// Lowercased text split into alphanumeric words.
fn split_words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word phrase lookup over normalized text.
struct Phrases(String);

impl Phrases {
    fn new(words: &[&str]) -> Self {
        Self(format!(" {} ", words.join(" ")))
    }

    fn contains(&self, phrase: &str) -> bool {
        self.find_from(0, phrase).is_some()
    }

    /// Offset just past the first whole-word `phrase` at or after `from`.
    ///
    /// The offset lands on the separating space, so it can start the next search.
    fn find_from(&self, from: usize, phrase: &str) -> Option<usize> {
        let needle = format!(" {} ", phrase);
        let index = self.0.get(from..)?.find(&needle)?;
        Some(from + index + needle.len() - 1)
    }
}

fn find_skill(phrases: &Phrases) -> Option<Skill> {
    Skill::all()
        .into_iter()
        .find(|skill| phrases.contains(&skill.name().to_lowercase()))
        .or_else(|| {
            SKILL_VERBS
                .iter()
                .find(|(verb, _)| phrases.contains(verb))
                .map(|(_, skill)| *skill)
        })
}

fn find_ability(words: &[&str]) -> Option<Ability> {
    words.iter().find_map(|word| {
        Ability::from_name(word).or_else(|| {
            ABILITY_ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| abbr == word)
                .map(|(_, ability)| *ability)
        })
    })
}

/// An explicit "AC 13" in the text wins over a named character's armor class.
fn find_target_value(words: &[&str], lower: &str, snapshot: &SessionSnapshot) -> Option<i32> {
    let explicit = words
        .windows(2)
        .find(|pair| pair[0] == "ac")
        .and_then(|pair| pair[1].parse().ok());

    explicit.or_else(|| {
        snapshot
            .npcs()
            .filter(|(name, _)| lower.contains(&name.to_lowercase()))
            .find_map(|(name, _)| snapshot.armor_class_of(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn snapshot_with_player(class: &str, level: u32) -> SessionSnapshot {
        let mut state = SessionState::new("Test");
        let mut attrs = Attributes::new();
        attrs.insert("class".into(), json!(class));
        attrs.insert("level".into(), json!(level));
        state.set_player("Thorin", attrs);

        let mut goblin = Attributes::new();
        goblin.insert("armor_class".into(), json!(15));
        state.update_character("Goblin", goblin);
        state.snapshot()
    }

    fn context(snapshot: SessionSnapshot) -> PromptContext {
        PromptContext::new(snapshot, BTreeSet::new())
    }

    #[test]
    fn test_parse_spell() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("fighter", 3);
        let query = oracle.parse_query("I cast Fireball!", &snapshot).unwrap();

        assert_eq!(query.action_kind, ActionKind::SpellCast);
        assert_eq!(query.spell_name.as_deref(), Some("fireball"));
        assert_eq!(query.actor_class.as_deref(), Some("fighter"));
        assert_eq!(query.actor_level, Some(3));
    }

    #[test]
    fn test_parse_skill_with_modifiers() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("rogue", 2);
        let query = oracle
            .parse_query("I use stealth with advantage across the difficult terrain", &snapshot)
            .unwrap();

        assert_eq!(query.action_kind, ActionKind::SkillCheck);
        assert_eq!(query.skill.as_deref(), Some("Stealth"));
        assert_eq!(query.modifiers, BTreeSet::from(["advantage".to_string()]));
        assert_eq!(
            query.environment_factors,
            BTreeSet::from(["difficult terrain".to_string()])
        );
    }

    #[test]
    fn test_parse_disadvantage_only() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("rogue", 2);
        let query = oracle
            .parse_query("I climb the wall at disadvantage", &snapshot)
            .unwrap();
        assert_eq!(query.skill.as_deref(), Some("Athletics"));
        assert_eq!(query.modifiers, BTreeSet::from(["disadvantage".to_string()]));
    }

    #[test]
    fn test_parse_saving_throw_abbreviation() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("rogue", 2);
        let query = oracle.parse_query("I make a dex save", &snapshot).unwrap();
        assert_eq!(query.action_kind, ActionKind::SavingThrow);
        assert_eq!(query.ability.as_deref(), Some("Dexterity"));
    }

    #[test]
    fn test_attack_target_from_text_or_snapshot() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("fighter", 3);

        let query = oracle.parse_query("I attack the orc (AC 13)", &snapshot).unwrap();
        assert_eq!(query.target_value, Some(13));

        let query = oracle.parse_query("I attack the goblin", &snapshot).unwrap();
        assert_eq!(query.target_value, Some(15));

        let query = oracle.parse_query("I attack the shadow", &snapshot).unwrap();
        assert_eq!(query.target_value, None);
    }

    #[test]
    fn test_nothing_to_rule_on() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("fighter", 3);
        assert!(oracle.parse_query("I hum a tune", &snapshot).is_none());
    }

    #[test]
    fn test_phrases_match_whole_words() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("fighter", 3);

        let query = oracle
            .parse_query("I sneak through the difficult terrain", &snapshot)
            .unwrap();
        assert!(!query.environment_factors.contains("adverse weather"));

        assert!(oracle.parse_query("I wish them well", &snapshot).is_none());
    }

    fn wizard_with_slots(slots: serde_json::Value) -> SessionSnapshot {
        let mut state = SessionState::new("Test");
        let mut attrs = Attributes::new();
        attrs.insert("class".into(), json!("wizard"));
        attrs.insert("level".into(), json!(5));
        attrs.insert("spell_slots".into(), slots);
        state.set_player("Elara", attrs);
        state.snapshot()
    }

    #[test]
    fn test_action_economy_needs_whole_words() {
        let oracle = RuleOracle::default();
        let violation = |text: &str| {
            let lower = text.to_lowercase();
            oracle.action_economy_violation(&Phrases::new(&split_words(&lower)))
        };

        assert!(violation("I attack and then cast a spell").is_some());
        assert!(violation("I attack the orc and cast Magic Missile").is_some());
        assert!(violation("I cast a spell and then attack").is_none());
        assert!(violation("I attack the goblin and run to the castle").is_none());
        assert!(violation("I attack and check the forecast").is_none());
        assert!(violation("I attack and cast off the boat").is_none());
        assert!(violation("I dash forward and attack").is_some());
    }

    #[test]
    fn test_skill_verbs_match_whole_words() {
        let oracle = RuleOracle::default();
        let snapshot = snapshot_with_player("rogue", 2);

        let query = oracle.parse_query("I walk to the hideout", &snapshot).unwrap();
        assert_eq!(query.action_kind, ActionKind::Movement);
        assert_eq!(query.skill, None);

        let query = oracle.parse_query("I hide behind the barrels", &snapshot).unwrap();
        assert_eq!(query.skill.as_deref(), Some("Stealth"));
    }

    #[tokio::test]
    async fn test_castle_is_not_a_spell() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(
                &context(snapshot_with_player("fighter", 3)),
                "I attack the goblin and run to the castle",
            )
            .await
            .unwrap();

        assert!(!result.has_tag(tags::ILLEGAL));
        assert!(result.text.starts_with("Attack roll against AC 15."));
    }

    #[tokio::test]
    async fn test_attack_ruling_starts_combat() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(&context(snapshot_with_player("fighter", 3)), "I attack the goblin")
            .await
            .unwrap();
        assert_eq!(result.effects, vec![SessionEffect::CombatStarted]);

        let result = oracle
            .invoke(&context(snapshot_with_player("fighter", 3)), "I search the room")
            .await
            .unwrap();
        assert!(result.effects.is_empty());

        let result = oracle
            .invoke(&context(snapshot_with_player("fighter", 3)), "I attack the shadow")
            .await
            .unwrap();
        assert!(result.has_tag(tags::ILLEGAL));
        assert!(result.effects.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_slot_is_illegal() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(&context(wizard_with_slots(json!({"1": 2, "3": 0}))), "I cast fireball")
            .await
            .unwrap();

        assert!(result.has_tag(tags::ILLEGAL));
        assert_eq!(
            result.text,
            "Cast fireball (level 3 evocation) - No 3-level spell slots remaining"
        );
        assert!(result.effects.is_empty());
    }

    #[tokio::test]
    async fn test_legal_cast_spends_a_slot() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(&context(wizard_with_slots(json!({"1": 2, "3": 1}))), "I cast fireball")
            .await
            .unwrap();

        assert!(!result.has_tag(tags::ILLEGAL));
        let mut spent = Attributes::new();
        spent.insert("spell_slots".into(), json!({"1": 2, "3": 0}));
        assert_eq!(
            result.effects,
            vec![SessionEffect::CharacterUpdated {
                name: "Elara".to_string(),
                attributes: spent,
            }]
        );
    }

    #[tokio::test]
    async fn test_cantrip_spends_nothing() {
        let oracle = RuleOracle::default();
        let mut state = SessionState::new("Test");
        let mut attrs = Attributes::new();
        attrs.insert("class".into(), json!("warlock"));
        attrs.insert("spell_slots".into(), json!({}));
        state.set_player("Morrow", attrs);

        let result = oracle
            .invoke(&context(state.snapshot()), "I cast eldritch blast")
            .await
            .unwrap();

        assert!(!result.has_tag(tags::ILLEGAL));
        assert!(result.text.ends_with("Cantrip, no spell slot used."));
        assert!(result.effects.is_empty());
    }

    #[tokio::test]
    async fn test_fighter_cannot_cast_fireball() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(&context(snapshot_with_player("fighter", 5)), "I cast fireball")
            .await
            .unwrap();

        assert!(result.has_tag(tags::ILLEGAL));
        assert!(result.text.starts_with("fighter cannot cast fireball"));
    }

    #[tokio::test]
    async fn test_action_economy() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(
                &context(snapshot_with_player("wizard", 5)),
                "I attack the goblin and cast magic missile",
            )
            .await
            .unwrap();

        assert!(result.has_tag(tags::ILLEGAL));
        assert!(result.text.starts_with("Cannot attack and cast"));
    }

    #[tokio::test]
    async fn test_legal_check_is_tagged_mechanics() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(
                &context(snapshot_with_player("rogue", 3)),
                "I try to pick lock on the door",
            )
            .await
            .unwrap();

        assert!(result.has_tag(tags::MECHANICS));
        assert!(!result.has_tag(tags::ILLEGAL));
        assert!(result.text.contains("DC 15"));
        assert!(result.text.contains("Roll 1d20 + Dexterity modifier"));
    }

    #[tokio::test]
    async fn test_spell_render() {
        let oracle = RuleOracle::default();
        let result = oracle
            .invoke(&context(snapshot_with_player("warlock", 1)), "I cast eldritch blast")
            .await
            .unwrap();

        assert_eq!(
            result.text,
            "Cast eldritch blast (level 0 evocation). Dice: 1d10. Deals force damage. Cantrip, no spell slot used."
        );
    }
}
