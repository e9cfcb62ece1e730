//! D&D 5e rules oracle.
//!
//! The engine answers structured [`RuleQuery`]s with a [`RuleResult`]: whether
//! the action is legal, which roll it needs, its difficulty value and what it
//! costs. Resolution is a pure function of the query and a static, versioned
//! [`RuleTable`]. Nothing here rolls dice or touches session state.
//!
//! Invalid queries are not errors. An unknown skill, a spell the actor's class
//! cannot cast, or an attack with no target value all come back as ordinary
//! results with `is_legal() == false` and an explanation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Version tag of the built-in rule table.
pub const RULES_VERSION: &str = "5e-srd-core/1";

/// Difficulty value every check starts from.
pub const BASE_DIFFICULTY: i32 = 15;
/// Lowest difficulty value the engine will report.
pub const MIN_DIFFICULTY: i32 = 5;
/// Highest difficulty value the engine will report.
pub const MAX_DIFFICULTY: i32 = 30;

const EASY_FACTORS: &[&str] = &["easy", "simple", "favorable"];
const HARD_FACTORS: &[&str] = &["difficult", "challenging", "adverse", "unfavorable"];
const EXTREME_FACTORS: &[&str] = &["very hard", "nearly impossible", "extreme"];

const EASY_DELTA: i32 = -3;
const HARD_DELTA: i32 = 3;
const EXTREME_DELTA: i32 = 8;
const ADVANTAGE_DELTA: i32 = -2;
const DISADVANTAGE_DELTA: i32 = 2;

/// Movement restrictions that leave a creature with a speed of zero.
const SPEED_ZERO_FACTORS: &[&str] = &["grappled", "restrained", "paralyzed", "petrified", "unconscious"];

const ATTACK_ROLL: &str = "1d20 + ability modifier + proficiency bonus";

/// The kind of action a query asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SkillCheck,
    AbilityCheck,
    SavingThrow,
    SpellCast,
    AttackRoll,
    Movement,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::SkillCheck => "skill_check",
            ActionKind::AbilityCheck => "ability_check",
            ActionKind::SavingThrow => "saving_throw",
            ActionKind::SpellCast => "spell_cast",
            ActionKind::AttackRoll => "attack_roll",
            ActionKind::Movement => "movement",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }

    /// Look up an ability by name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Ability> {
        let wanted = normalize(name);
        Ability::all()
            .into_iter()
            .find(|ability| ability.name().eq_ignore_ascii_case(&wanted))
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The eighteen skills, each keyed to an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Skill {
    Athletics,
    Acrobatics,
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Skill::Athletics => "Athletics",
            Skill::Acrobatics => "Acrobatics",
            Skill::SleightOfHand => "Sleight of Hand",
            Skill::Stealth => "Stealth",
            Skill::Arcana => "Arcana",
            Skill::History => "History",
            Skill::Investigation => "Investigation",
            Skill::Nature => "Nature",
            Skill::Religion => "Religion",
            Skill::AnimalHandling => "Animal Handling",
            Skill::Insight => "Insight",
            Skill::Medicine => "Medicine",
            Skill::Perception => "Perception",
            Skill::Survival => "Survival",
            Skill::Deception => "Deception",
            Skill::Intimidation => "Intimidation",
            Skill::Performance => "Performance",
            Skill::Persuasion => "Persuasion",
        }
    }

    pub fn all() -> [Skill; 18] {
        use Skill::*;
        [
            Athletics,
            Acrobatics,
            SleightOfHand,
            Stealth,
            Arcana,
            History,
            Investigation,
            Nature,
            Religion,
            AnimalHandling,
            Insight,
            Medicine,
            Perception,
            Survival,
            Deception,
            Intimidation,
            Performance,
            Persuasion,
        ]
    }

    /// Look up a skill by name. Accepts "Sleight of Hand", "sleight_of_hand"
    /// and similar spellings.
    pub fn from_name(name: &str) -> Option<Skill> {
        let wanted = normalize(name);
        Skill::all()
            .into_iter()
            .find(|skill| skill.name().eq_ignore_ascii_case(&wanted))
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Named difficulty bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DifficultyTier {
    Trivial,
    Easy,
    Medium,
    Hard,
    VeryHard,
    NearlyImpossible,
}

impl DifficultyTier {
    pub fn from_value(value: i32) -> Self {
        match value {
            i32::MIN..=5 => DifficultyTier::Trivial,
            6..=10 => DifficultyTier::Easy,
            11..=15 => DifficultyTier::Medium,
            16..=20 => DifficultyTier::Hard,
            21..=25 => DifficultyTier::VeryHard,
            _ => DifficultyTier::NearlyImpossible,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DifficultyTier::Trivial => "Trivial",
            DifficultyTier::Easy => "Easy",
            DifficultyTier::Medium => "Medium",
            DifficultyTier::Hard => "Hard",
            DifficultyTier::VeryHard => "Very Hard",
            DifficultyTier::NearlyImpossible => "Nearly Impossible",
        }
    }
}

/// Static metadata for one spell.
#[derive(Debug, Clone, Serialize)]
pub struct SpellInfo {
    pub level: u8,
    pub school: &'static str,
    /// Damage or healing dice
    pub formula: Option<&'static str>,
    pub damage_type: Option<&'static str>,
    pub heals: bool,
    pub save: Option<Ability>,
    pub auto_hit: bool,
}

impl SpellInfo {
    fn new(level: u8, school: &'static str) -> Self {
        Self {
            level,
            school,
            formula: None,
            damage_type: None,
            heals: false,
            save: None,
            auto_hit: false,
        }
    }

    fn damage(mut self, formula: &'static str, damage_type: &'static str) -> Self {
        self.formula = Some(formula);
        self.damage_type = Some(damage_type);
        self
    }

    fn healing(mut self, formula: &'static str) -> Self {
        self.formula = Some(formula);
        self.heals = true;
        self
    }

    fn save(mut self, ability: Ability) -> Self {
        self.save = Some(ability);
        self
    }

    fn auto_hit(mut self) -> Self {
        self.auto_hit = true;
        self
    }

    /// Lowest character level able to cast this spell.
    pub fn min_character_level(&self) -> u32 {
        if self.level > 0 {
            2 * u32::from(self.level) - 1
        } else {
            1
        }
    }
}

/// The static data the engine resolves against.
///
/// Spell and class keys are stored normalized: lowercase, words separated by
/// single spaces.
#[derive(Debug, Clone, Serialize)]
pub struct RuleTable {
    version: &'static str,
    spells: BTreeMap<String, SpellInfo>,
    class_spells: BTreeMap<String, BTreeSet<String>>,
}

impl RuleTable {
    /// The built-in D&D 5e subset.
    pub fn standard() -> Self {
        use Ability::*;

        let spells = [
            ("fireball", SpellInfo::new(3, "evocation").damage("8d6", "fire").save(Dexterity)),
            ("cure wounds", SpellInfo::new(1, "evocation").healing("1d8 + spellcasting modifier")),
            ("healing word", SpellInfo::new(1, "evocation").healing("1d4 + spellcasting modifier")),
            ("magic missile", SpellInfo::new(1, "evocation").damage("3 x (1d4 + 1)", "force").auto_hit()),
            ("counterspell", SpellInfo::new(3, "abjuration")),
            ("eldritch blast", SpellInfo::new(0, "evocation").damage("1d10", "force")),
            ("wish", SpellInfo::new(9, "conjuration")),
        ];

        let class_spells: [(&str, &[&str]); 10] = [
            ("wizard", &["fireball", "magic missile", "counterspell", "wish"]),
            ("sorcerer", &["fireball", "magic missile", "counterspell", "wish"]),
            ("cleric", &["cure wounds", "healing word"]),
            ("paladin", &["cure wounds"]),
            ("bard", &["cure wounds", "healing word", "counterspell"]),
            ("druid", &["cure wounds", "healing word"]),
            ("warlock", &["fireball", "counterspell", "eldritch blast"]),
            ("ranger", &["cure wounds"]),
            ("eldritch knight", &["magic missile", "fireball"]),
            ("arcane trickster", &["magic missile"]),
        ];

        Self {
            version: RULES_VERSION,
            spells: spells
                .into_iter()
                .map(|(name, info)| (name.to_string(), info))
                .collect(),
            class_spells: class_spells
                .into_iter()
                .map(|(class, list)| {
                    (
                        class.to_string(),
                        list.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn version(&self) -> &str {
        self.version
    }

    pub fn spell(&self, name: &str) -> Option<&SpellInfo> {
        self.spells.get(&normalize(name))
    }

    pub fn spell_names(&self) -> impl Iterator<Item = &str> {
        self.spells.keys().map(String::as_str)
    }

    /// Whether `class` has `spell` on its list. Unknown classes cast nothing.
    pub fn can_cast(&self, class: &str, spell: &str) -> bool {
        self.class_spells
            .get(&normalize(class))
            .is_some_and(|list| list.contains(&normalize(spell)))
    }

    /// Classes able to cast `spell`, in alphabetical order.
    pub fn classes_for(&self, spell: &str) -> Vec<&str> {
        let spell = normalize(spell);
        self.class_spells
            .iter()
            .filter(|(_, list)| list.contains(&spell))
            .map(|(class, _)| class.as_str())
            .collect()
    }
}

static STANDARD_TABLE: Lazy<Arc<RuleTable>> = Lazy::new(|| Arc::new(RuleTable::standard()));

/// A structured question for the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleQuery {
    pub action_kind: ActionKind,
    pub ability: Option<String>,
    pub skill: Option<String>,
    pub spell_name: Option<String>,
    /// Defensive value of the target, e.g. armor class
    pub target_value: Option<i32>,
    pub actor_level: Option<u32>,
    pub actor_class: Option<String>,
    pub modifiers: BTreeSet<String>,
    pub environment_factors: BTreeSet<String>,
    /// Remaining spell slots by spell level. `None` means slots are not tracked.
    #[serde(default)]
    pub spell_slots: Option<BTreeMap<u32, u32>>,
}

impl RuleQuery {
    pub fn new(action_kind: ActionKind) -> Self {
        Self {
            action_kind,
            ability: None,
            skill: None,
            spell_name: None,
            target_value: None,
            actor_level: None,
            actor_class: None,
            modifiers: BTreeSet::new(),
            environment_factors: BTreeSet::new(),
            spell_slots: None,
        }
    }

    pub fn with_ability(mut self, ability: impl Into<String>) -> Self {
        self.ability = Some(ability.into());
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    pub fn with_spell(mut self, spell: impl Into<String>) -> Self {
        self.spell_name = Some(spell.into());
        self
    }

    pub fn with_target_value(mut self, value: i32) -> Self {
        self.target_value = Some(value);
        self
    }

    pub fn with_actor_level(mut self, level: u32) -> Self {
        self.actor_level = Some(level);
        self
    }

    pub fn with_actor_class(mut self, class: impl Into<String>) -> Self {
        self.actor_class = Some(class.into());
        self
    }

    pub fn with_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.insert(modifier.into());
        self
    }

    pub fn with_environment_factor(mut self, factor: impl Into<String>) -> Self {
        self.environment_factors.insert(factor.into());
        self
    }

    pub fn with_spell_slots(mut self, slots: BTreeMap<u32, u32>) -> Self {
        self.spell_slots = Some(slots);
        self
    }
}

/// The engine's answer to a [`RuleQuery`].
///
/// Results are built only by the engine. An illegal result never carries a
/// required roll or a difficulty value, and any difficulty value lies within
/// [`MIN_DIFFICULTY`]..=[`MAX_DIFFICULTY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    is_legal: bool,
    explanation: String,
    required_roll: Option<String>,
    difficulty_value: Option<i32>,
    resource_cost: Option<u32>,
    formula: Option<String>,
    effects: Vec<String>,
}

impl RuleResult {
    fn illegal(explanation: impl Into<String>) -> Self {
        Self {
            is_legal: false,
            explanation: explanation.into(),
            required_roll: None,
            difficulty_value: None,
            resource_cost: None,
            formula: None,
            effects: Vec::new(),
        }
    }

    fn legal(explanation: impl Into<String>) -> Self {
        Self {
            is_legal: true,
            ..Self::illegal(explanation)
        }
    }

    fn check(explanation: impl Into<String>, roll: impl Into<String>, difficulty: i32) -> Self {
        Self {
            required_roll: Some(roll.into()),
            difficulty_value: Some(clamp_difficulty(difficulty)),
            ..Self::legal(explanation)
        }
    }

    fn with_effects(mut self, effects: Vec<String>) -> Self {
        self.effects = effects;
        self
    }

    pub fn is_legal(&self) -> bool {
        self.is_legal
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn required_roll(&self) -> Option<&str> {
        self.required_roll.as_deref()
    }

    pub fn difficulty_value(&self) -> Option<i32> {
        self.difficulty_value
    }

    /// Spell slot level consumed, for spell casts.
    pub fn resource_cost(&self) -> Option<u32> {
        self.resource_cost
    }

    /// Damage or healing dice, for spells that have them.
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    pub fn effects(&self) -> &[String] {
        &self.effects
    }

    /// Whether the result carries anything the player needs to roll or spend.
    pub fn has_mechanics(&self) -> bool {
        self.is_legal
            && (self.required_roll.is_some()
                || self.difficulty_value.is_some()
                || self.resource_cost.is_some()
                || !self.effects.is_empty())
    }
}

/// Difficulty change contributed by one environment factor.
///
/// The most severe keyword class wins within a single factor.
pub fn factor_delta(factor: &str) -> i32 {
    let factor = factor.to_lowercase();
    if EXTREME_FACTORS.iter().any(|k| factor.contains(k)) {
        EXTREME_DELTA
    } else if HARD_FACTORS.iter().any(|k| factor.contains(k)) {
        HARD_DELTA
    } else if EASY_FACTORS.iter().any(|k| factor.contains(k)) {
        EASY_DELTA
    } else {
        0
    }
}

/// Difficulty change contributed by one roll modifier.
pub fn modifier_delta(modifier: &str) -> i32 {
    let modifier = modifier.to_lowercase();
    // "disadvantage" contains "advantage", so test it first
    if modifier.contains("disadvantage") {
        DISADVANTAGE_DELTA
    } else if modifier.contains("advantage") {
        ADVANTAGE_DELTA
    } else {
        0
    }
}

/// Difficulty value for a check under the given factors and modifiers.
///
/// Each factor and modifier is scored on its own and the deltas are summed, so
/// the result does not depend on the order of either list.
pub fn compute_difficulty<F, M>(environment_factors: F, modifiers: M) -> i32
where
    F: IntoIterator,
    F::Item: AsRef<str>,
    M: IntoIterator,
    M::Item: AsRef<str>,
{
    let factors: i32 = environment_factors
        .into_iter()
        .map(|f| factor_delta(f.as_ref()))
        .sum();
    let modifiers: i32 = modifiers.into_iter().map(|m| modifier_delta(m.as_ref())).sum();
    clamp_difficulty(BASE_DIFFICULTY + factors + modifiers)
}

fn clamp_difficulty(value: i32) -> i32 {
    value.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Lowercase, underscores to spaces, single-spaced.
fn normalize(name: &str) -> String {
    name.to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The rules engine resolves queries against a [`RuleTable`].
#[derive(Debug, Clone)]
pub struct RuleEngine {
    table: Arc<RuleTable>,
}

impl RuleEngine {
    /// Engine backed by the built-in table.
    pub fn new() -> Self {
        Self {
            table: Arc::clone(&STANDARD_TABLE),
        }
    }

    pub fn with_table(table: Arc<RuleTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Difficulty value for a check described by `query`.
    pub fn compute_difficulty(&self, query: &RuleQuery) -> i32 {
        compute_difficulty(&query.environment_factors, &query.modifiers)
    }

    /// Resolve a query.
    pub fn resolve(&self, query: &RuleQuery) -> RuleResult {
        match query.action_kind {
            ActionKind::SkillCheck => self.resolve_skill_check(query),
            ActionKind::AbilityCheck => self.resolve_ability_check(query),
            ActionKind::SavingThrow => self.resolve_saving_throw(query),
            ActionKind::SpellCast => self.resolve_spell_cast(query),
            ActionKind::AttackRoll => self.resolve_attack_roll(query),
            ActionKind::Movement => self.resolve_movement(query),
        }
    }

    fn resolve_skill_check(&self, query: &RuleQuery) -> RuleResult {
        let Some(skill) = query.skill.as_deref().and_then(Skill::from_name) else {
            return RuleResult::illegal(format!(
                "Invalid skill: {}",
                query.skill.as_deref().unwrap_or("none given")
            ));
        };
        let ability = skill.ability();
        let dc = self.compute_difficulty(query);

        RuleResult::check(
            format!("{} check ({}), {}", skill, ability, describe_dc(dc)),
            format!("1d20 + {} modifier + proficiency bonus", ability),
            dc,
        )
    }

    fn resolve_ability_check(&self, query: &RuleQuery) -> RuleResult {
        let Some(ability) = query.ability.as_deref().and_then(Ability::from_name) else {
            return RuleResult::illegal(format!(
                "Invalid ability score: {}",
                query.ability.as_deref().unwrap_or("none given")
            ));
        };
        let dc = self.compute_difficulty(query);

        RuleResult::check(
            format!("{} ability check, {}", ability, describe_dc(dc)),
            format!("1d20 + {} modifier", ability),
            dc,
        )
    }

    fn resolve_saving_throw(&self, query: &RuleQuery) -> RuleResult {
        let Some(ability) = query.ability.as_deref().and_then(Ability::from_name) else {
            return RuleResult::illegal(format!(
                "Invalid saving throw: {}",
                query.ability.as_deref().unwrap_or("none given")
            ));
        };
        let dc = self.compute_difficulty(query);

        RuleResult::check(
            format!("{} saving throw, {}", ability, describe_dc(dc)),
            format!("1d20 + {} modifier + proficiency bonus (if proficient)", ability),
            dc,
        )
    }

    fn resolve_spell_cast(&self, query: &RuleQuery) -> RuleResult {
        let Some(spell_name) = query.spell_name.as_deref().map(str::trim) else {
            return RuleResult::illegal("No spell name provided");
        };
        let Some(spell) = self.table.spell(spell_name) else {
            return RuleResult::illegal(format!("Unknown spell: {}", spell_name));
        };

        if let Some(class) = query.actor_class.as_deref().map(str::trim) {
            if !self.table.can_cast(class, spell_name) {
                return RuleResult::illegal(format!(
                    "{} cannot cast {}. Available to: {}",
                    class,
                    spell_name,
                    self.table.classes_for(spell_name).join(", ")
                ));
            }
        }

        if let Some(level) = query.actor_level {
            let required = spell.min_character_level();
            if level < required {
                return RuleResult::illegal(format!(
                    "{} requires character level {}+ (current: {})",
                    spell_name, required, level
                ));
            }
        }

        let mut effects = Vec::new();
        if let Some(damage_type) = spell.damage_type {
            effects.push(format!("Deals {} damage", damage_type));
        }
        if spell.heals {
            effects.push("Restores hit points".to_string());
        }
        if let Some(save) = spell.save {
            effects.push(format!("Target makes {} saving throw", save));
        }
        if spell.auto_hit {
            effects.push("Automatically hits".to_string());
        }

        let cast = format!("Cast {} (level {} {})", spell_name, spell.level, spell.school);
        let level = u32::from(spell.level);
        if let Some(slots) = &query.spell_slots {
            if level > 0 && slots.get(&level).copied().unwrap_or(0) == 0 {
                return RuleResult::illegal(format!(
                    "{} - No {}-level spell slots remaining",
                    cast, level
                ));
            }
        }

        let mut result = RuleResult::legal(cast).with_effects(effects);
        result.resource_cost = Some(level);
        result.formula = spell.formula.map(str::to_string);
        result
    }

    fn resolve_attack_roll(&self, query: &RuleQuery) -> RuleResult {
        match query.target_value {
            Some(target) => RuleResult::check(
                format!("Attack roll against AC {}", target),
                ATTACK_ROLL,
                target,
            ),
            None => RuleResult::illegal("Target AC required for attack roll"),
        }
    }

    fn resolve_movement(&self, query: &RuleQuery) -> RuleResult {
        let mut restrictions = Vec::new();
        let mut immobile = false;

        for factor in &query.environment_factors {
            let factor = factor.to_lowercase();
            if factor.contains("difficult terrain") {
                restrictions.push("Difficult terrain: movement costs double".to_string());
            }
            if factor.contains("prone") {
                restrictions.push("Standing from prone costs half movement".to_string());
            }
            if let Some(condition) = SPEED_ZERO_FACTORS.iter().find(|c| factor.contains(*c)) {
                immobile = true;
                restrictions.push(format!("{}: speed is 0", capitalize(condition)));
            }
        }

        if immobile {
            let blocking: Vec<_> = restrictions
                .iter()
                .filter(|r| r.ends_with("speed is 0"))
                .cloned()
                .collect();
            RuleResult::illegal(format!("Cannot move: {}", blocking.join("; ")))
                .with_effects(restrictions)
        } else if restrictions.is_empty() {
            RuleResult::legal("Normal movement within speed limit")
        } else {
            RuleResult::legal("Movement with restrictions").with_effects(restrictions)
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_dc(dc: i32) -> String {
    format!("DC {} ({})", dc, DifficultyTier::from_value(dc).name())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
