//! Session state owned by the pipeline driver.
//!
//! Handlers never see a [`SessionState`]. They get a [`SessionSnapshot`]
//! cloned from it before dispatch and report what they want changed as
//! [`SessionEffect`]s, which the driver applies after synthesis.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::id::{EventId, SessionId};
use crate::intent::HandlerName;

/// Free-form attributes of a character ("class", "level", "armor_class", ...).
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Number of trailing events copied into a snapshot.
const SNAPSHOT_EVENTS: usize = 5;
/// Window of events inspected when judging the session phase.
const PHASE_WINDOW: usize = 10;

/// What kind of thing an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    PlayerAction,
    LocationChange,
    CombatStart,
    CombatEnd,
    CharacterUpdate,
    Error,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SessionStart => "session_start",
            EventKind::PlayerAction => "player_action",
            EventKind::LocationChange => "location_change",
            EventKind::CombatStart => "combat_start",
            EventKind::CombatEnd => "combat_end",
            EventKind::CharacterUpdate => "character_update",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Player,
    System,
    Handler(HandlerName),
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Player => write!(f, "player"),
            EventSource::System => write!(f, "system"),
            EventSource::Handler(handler) => write!(f, "{}", handler),
        }
    }
}

/// One entry of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub description: String,
    pub source: EventSource,
}

/// Append-only record of what happened, in the order it happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<SessionEvent>,
}

impl EventLog {
    fn append(&mut self, kind: EventKind, description: impl Into<String>, source: EventSource) {
        self.events.push(SessionEvent {
            id: EventId::new(),
            timestamp: Utc::now(),
            kind,
            description: description.into(),
            source,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&SessionEvent> {
        self.events.last()
    }

    /// The most recent `count` events, oldest first.
    pub fn recent(&self, count: usize) -> &[SessionEvent] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    /// Number of events of a given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// A change to the session requested by a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEffect {
    LocationChanged { location: String },
    CombatStarted,
    CombatEnded,
    CharacterUpdated { name: String, attributes: Attributes },
}

/// Rough position in the session's arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Setup,
    Exploration,
    RisingAction,
    Climax,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Setup => "setup",
            SessionPhase::Exploration => "exploration",
            SessionPhase::RisingAction => "rising_action",
            SessionPhase::Climax => "climax",
        }
    }
}

/// The mutable world record for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    id: SessionId,
    campaign_name: String,
    location: String,
    characters: BTreeMap<String, Attributes>,
    /// Name of the player's character in `characters`
    player: Option<String>,
    combat_active: bool,
    turn_number: u32,
    event_log: EventLog,
}

impl SessionState {
    /// Start a session. Logs a `session_start` event.
    pub fn new(campaign_name: impl Into<String>) -> Self {
        let campaign_name = campaign_name.into();
        let mut state = Self {
            id: SessionId::new(),
            campaign_name: campaign_name.clone(),
            location: String::new(),
            characters: BTreeMap::new(),
            player: None,
            combat_active: false,
            turn_number: 0,
            event_log: EventLog::default(),
        };
        state.log_event(
            EventKind::SessionStart,
            format!("Started {}", campaign_name),
            EventSource::System,
        );
        state
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn campaign_name(&self) -> &str {
        &self.campaign_name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn characters(&self) -> &BTreeMap<String, Attributes> {
        &self.characters
    }

    pub fn character(&self, name: &str) -> Option<&Attributes> {
        self.characters.get(name)
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    pub fn combat_active(&self) -> bool {
        self.combat_active
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn log_event(&mut self, kind: EventKind, description: impl Into<String>, source: EventSource) {
        self.event_log.append(kind, description, source);
    }

    /// Move the party. Logs a `location_change` event.
    pub fn set_location(&mut self, location: impl Into<String>, source: EventSource) {
        self.location = location.into();
        let description = format!("Arrived at {}", self.location);
        self.log_event(EventKind::LocationChange, description, source);
    }

    /// Merge attributes into a character, creating it if needed.
    pub fn update_character(&mut self, name: impl Into<String>, attributes: Attributes) {
        self.characters.entry(name.into()).or_default().extend(attributes);
    }

    /// Register the player's character and remember it as the acting character.
    pub fn set_player(&mut self, name: impl Into<String>, attributes: Attributes) {
        let name = name.into();
        self.update_character(name.clone(), attributes);
        self.player = Some(name);
    }

    pub(crate) fn advance_turn(&mut self) {
        self.turn_number += 1;
    }

    /// Apply one handler effect and log it.
    pub fn apply_effect(
        &mut self,
        effect: &SessionEffect,
        source: EventSource,
    ) -> Result<(), PipelineError> {
        match effect {
            SessionEffect::LocationChanged { location } => {
                let location = location.trim();
                if location.is_empty() {
                    return Err(PipelineError::InvalidEffect {
                        reason: "location change with an empty destination".to_string(),
                    });
                }
                self.set_location(location, source);
            }
            SessionEffect::CombatStarted => {
                self.combat_active = true;
                self.log_event(EventKind::CombatStart, "Combat started", source);
            }
            SessionEffect::CombatEnded => {
                self.combat_active = false;
                self.log_event(EventKind::CombatEnd, "Combat ended", source);
            }
            SessionEffect::CharacterUpdated { name, attributes } => {
                let keys: Vec<_> = attributes.keys().map(String::as_str).collect();
                let description = format!("Updated {}: {}", name, keys.join(", "));
                self.update_character(name.clone(), attributes.clone());
                self.log_event(EventKind::CharacterUpdate, description, source);
            }
        }
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        if self.event_log.count(EventKind::PlayerAction) == 0 {
            return SessionPhase::Setup;
        }
        if self.combat_active {
            return SessionPhase::Climax;
        }
        let moves = self
            .event_log
            .recent(PHASE_WINDOW)
            .iter()
            .filter(|e| e.kind == EventKind::LocationChange)
            .count();
        if moves >= 2 {
            SessionPhase::Exploration
        } else {
            SessionPhase::RisingAction
        }
    }

    /// Read-only copy for handlers.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            campaign_name: self.campaign_name.clone(),
            location: self.location.clone(),
            characters: self.characters.clone(),
            player: self.player.clone(),
            combat_active: self.combat_active,
            turn_number: self.turn_number,
            phase: self.phase(),
            recent_events: self.event_log.recent(SNAPSHOT_EVENTS).to_vec(),
        }
    }

    /// One-line status: location, characters, combat flag and turn.
    pub fn summary(&self) -> String {
        let characters = if self.characters.is_empty() {
            "None".to_string()
        } else {
            self.characters.keys().cloned().collect::<Vec<_>>().join(", ")
        };
        let location = if self.location.is_empty() {
            "Unknown"
        } else {
            self.location.as_str()
        };

        format!(
            "Location: {} | Characters: {} | Combat Active: {} | Turn: {}",
            location, characters, self.combat_active, self.turn_number
        )
    }
}

/// Immutable view of the session handed to handlers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub campaign_name: String,
    pub location: String,
    pub characters: BTreeMap<String, Attributes>,
    pub player: Option<String>,
    pub combat_active: bool,
    pub turn_number: u32,
    pub phase: SessionPhase,
    pub recent_events: Vec<SessionEvent>,
}

impl SessionSnapshot {
    pub fn player_attributes(&self) -> Option<&Attributes> {
        self.player.as_ref().and_then(|name| self.characters.get(name))
    }

    pub fn player_class(&self) -> Option<&str> {
        self.player_attributes()?.get("class")?.as_str()
    }

    pub fn player_level(&self) -> Option<u32> {
        let level = self.player_attributes()?.get("level")?.as_u64()?;
        u32::try_from(level).ok()
    }

    /// Remaining spell slots of the player, from a `spell_slots` attribute
    /// shaped like `{"1": 4, "3": 2}`. Entries that don't parse are ignored.
    pub fn player_spell_slots(&self) -> Option<BTreeMap<u32, u32>> {
        let slots = self.player_attributes()?.get("spell_slots")?.as_object()?;
        let slots = slots
            .iter()
            .filter_map(|(level, count)| {
                let level = level.trim().parse().ok()?;
                let count = u32::try_from(count.as_u64()?).ok()?;
                Some((level, count))
            })
            .collect();
        Some(slots)
    }

    /// Armor class of a non-player character.
    pub fn armor_class_of(&self, name: &str) -> Option<i32> {
        let value = self.characters.get(name)?.get("armor_class")?.as_i64()?;
        i32::try_from(value).ok()
    }

    /// Characters other than the player.
    pub fn npcs(&self) -> impl Iterator<Item = (&String, &Attributes)> {
        self.characters
            .iter()
            .filter(move |(name, _)| Some(name.as_str()) != self.player.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_new_session_logs_start() {
        let state = SessionState::new("Test Campaign");
        assert_eq!(state.event_log().len(), 1);
        let event = state.event_log().last().unwrap();
        assert_eq!(event.kind, EventKind::SessionStart);
        assert_eq!(event.description, "Started Test Campaign");
        assert_eq!(event.source, EventSource::System);
    }

    #[test]
    fn test_log_preserves_order() {
        let mut state = SessionState::new("Test");
        state.set_location("Millbrook", EventSource::System);
        state.log_event(EventKind::PlayerAction, "I look around", EventSource::Player);

        let kinds: Vec<_> = state.event_log().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [EventKind::SessionStart, EventKind::LocationChange, EventKind::PlayerAction]
        );
        let times: Vec<_> = state.event_log().iter().map(|e| e.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_apply_effects() {
        let mut state = SessionState::new("Test");
        let source = EventSource::Handler(HandlerName::SceneHandler);

        state
            .apply_effect(&SessionEffect::LocationChanged { location: "The Old Mill".into() }, source)
            .unwrap();
        state.apply_effect(&SessionEffect::CombatStarted, source).unwrap();

        assert_eq!(state.location(), "The Old Mill");
        assert!(state.combat_active());
        assert_eq!(state.event_log().count(EventKind::LocationChange), 1);
        assert_eq!(state.event_log().count(EventKind::CombatStart), 1);
    }

    #[test]
    fn test_empty_location_rejected() {
        let mut state = SessionState::new("Test");
        let result = state.apply_effect(
            &SessionEffect::LocationChanged { location: "  ".into() },
            EventSource::System,
        );
        assert!(result.is_err());
        assert_eq!(state.event_log().len(), 1);
    }

    #[test]
    fn test_character_updates_merge() {
        let mut state = SessionState::new("Test");
        state.update_character("Pip", attrs(&[("role", json!("merchant"))]));
        state
            .apply_effect(
                &SessionEffect::CharacterUpdated {
                    name: "Pip".into(),
                    attributes: attrs(&[("disposition", json!("friendly"))]),
                },
                EventSource::System,
            )
            .unwrap();

        let pip = state.character("Pip").unwrap();
        assert_eq!(pip["role"], json!("merchant"));
        assert_eq!(pip["disposition"], json!("friendly"));
        assert_eq!(state.event_log().last().unwrap().description, "Updated Pip: disposition");
    }

    #[test]
    fn test_snapshot_reads_player() {
        let mut state = SessionState::new("Test");
        state.set_player("Thorin", attrs(&[("class", json!("fighter")), ("level", json!(3))]));
        state.update_character("Goblin", attrs(&[("armor_class", json!(13))]));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.player_class(), Some("fighter"));
        assert_eq!(snapshot.player_level(), Some(3));
        assert_eq!(snapshot.armor_class_of("Goblin"), Some(13));
        assert_eq!(snapshot.npcs().count(), 1);
        assert_eq!(snapshot.player_spell_slots(), None);
    }

    #[test]
    fn test_snapshot_reads_spell_slots() {
        let mut state = SessionState::new("Test");
        state.set_player(
            "Elara",
            attrs(&[("spell_slots", json!({"1": 4, "3": 0, "x": 2}))]),
        );

        let slots = state.snapshot().player_spell_slots().unwrap();
        assert_eq!(slots, BTreeMap::from([(1, 4), (3, 0)]));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut state = SessionState::new("Test");
        let snapshot = state.snapshot();
        state.set_location("Elsewhere", EventSource::System);
        assert_eq!(snapshot.location, "");
    }

    #[test]
    fn test_phase() {
        let mut state = SessionState::new("Test");
        assert_eq!(state.phase(), SessionPhase::Setup);

        state.log_event(EventKind::PlayerAction, "hello", EventSource::Player);
        assert_eq!(state.phase(), SessionPhase::RisingAction);

        state.set_location("A", EventSource::System);
        state.set_location("B", EventSource::System);
        assert_eq!(state.phase(), SessionPhase::Exploration);

        state.apply_effect(&SessionEffect::CombatStarted, EventSource::System).unwrap();
        assert_eq!(state.phase(), SessionPhase::Climax);
    }

    #[test]
    fn test_summary() {
        let mut state = SessionState::new("Test");
        assert_eq!(
            state.summary(),
            "Location: Unknown | Characters: None | Combat Active: false | Turn: 0"
        );
        state.set_location("Millbrook", EventSource::System);
        state.set_player("Thorin", Attributes::new());
        state.advance_turn();
        assert_eq!(
            state.summary(),
            "Location: Millbrook | Characters: Thorin | Combat Active: false | Turn: 1"
        );
    }

    #[test]
    fn test_effect_serialization() {
        let effect = SessionEffect::LocationChanged { location: "Mill".into() };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json, json!({"type": "location_changed", "location": "Mill"}));
    }
}
