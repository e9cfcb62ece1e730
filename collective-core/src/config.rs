//! Session configuration.

use std::time::Duration;

use serde_json::json;

use crate::dispatch::DEFAULT_HANDLER_TIMEOUT;
use crate::error::ConfigError;
use crate::session::Attributes;
use crate::synthesis::DEFAULT_NOOP_PHRASES;

pub const ENV_CAMPAIGN: &str = "COLLECTIVE_CAMPAIGN";
pub const ENV_START_LOCATION: &str = "COLLECTIVE_START_LOCATION";
pub const ENV_HANDLER_TIMEOUT_MS: &str = "COLLECTIVE_HANDLER_TIMEOUT_MS";
pub const ENV_LORE_NOOP_PHRASES: &str = "COLLECTIVE_LORE_NOOP_PHRASES";
pub const ENV_PLAYER_NAME: &str = "COLLECTIVE_PLAYER_NAME";
pub const ENV_PLAYER_CLASS: &str = "COLLECTIVE_PLAYER_CLASS";
pub const ENV_PLAYER_LEVEL: &str = "COLLECTIVE_PLAYER_LEVEL";

/// Configuration for a collective session.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveConfig {
    /// Campaign name.
    pub campaign_name: String,

    /// Starting location name.
    pub starting_location: String,

    /// Time budget for each handler invocation.
    pub handler_timeout: Duration,

    /// Lore replies containing any of these are not narrated.
    pub lore_noop_phrases: Vec<String>,

    /// Player character name.
    pub player_name: String,

    /// Player character class, used by the rules oracle.
    pub player_class: Option<String>,

    /// Player character level, used by the rules oracle.
    pub player_level: Option<u32>,
}

impl Default for CollectiveConfig {
    fn default() -> Self {
        Self::new("Demo Campaign")
    }
}

impl CollectiveConfig {
    /// Create a new config with campaign name.
    pub fn new(campaign_name: impl Into<String>) -> Self {
        Self {
            campaign_name: campaign_name.into(),
            starting_location: "Millbrook Town Square".to_string(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            lore_noop_phrases: DEFAULT_NOOP_PHRASES.iter().map(|p| p.to_string()).collect(),
            player_name: "Adventurer".to_string(),
            player_class: None,
            player_level: None,
        }
    }

    /// Set the starting location.
    pub fn with_starting_location(mut self, location: impl Into<String>) -> Self {
        self.starting_location = location.into();
        self
    }

    /// Set the per-handler time budget.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Replace the lore no-op phrases.
    pub fn with_lore_noop_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lore_noop_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    /// Set the player character name.
    pub fn with_player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = name.into();
        self
    }

    /// Set the player character class.
    pub fn with_player_class(mut self, class: impl Into<String>) -> Self {
        self.player_class = Some(class.into());
        self
    }

    /// Set the player character level.
    pub fn with_player_level(mut self, level: u32) -> Self {
        self.player_level = Some(level);
        self
    }

    /// Read configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = match get(ENV_CAMPAIGN) {
            Some(campaign) => Self::new(campaign),
            None => Self::default(),
        };

        if let Some(location) = get(ENV_START_LOCATION) {
            config.starting_location = location;
        }

        if let Some(raw) = get(ENV_HANDLER_TIMEOUT_MS) {
            let millis: u64 = parse(ENV_HANDLER_TIMEOUT_MS, &raw)?;
            if millis == 0 {
                return Err(ConfigError::InvalidValue {
                    key: ENV_HANDLER_TIMEOUT_MS,
                    value: raw,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.handler_timeout = Duration::from_millis(millis);
        }

        if let Some(raw) = get(ENV_LORE_NOOP_PHRASES) {
            config.lore_noop_phrases = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(name) = get(ENV_PLAYER_NAME) {
            config.player_name = name;
        }
        config.player_class = get(ENV_PLAYER_CLASS);
        if let Some(raw) = get(ENV_PLAYER_LEVEL) {
            let level: u32 = parse(ENV_PLAYER_LEVEL, &raw)?;
            if !(1..=20).contains(&level) {
                return Err(ConfigError::InvalidValue {
                    key: ENV_PLAYER_LEVEL,
                    value: raw,
                    reason: "must be between 1 and 20".to_string(),
                });
            }
            config.player_level = Some(level);
        }

        Ok(config)
    }

    /// Attributes for the player character entry in the session.
    pub fn player_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(class) = &self.player_class {
            attributes.insert("class".to_string(), json!(class.to_lowercase()));
        }
        if let Some(level) = self.player_level {
            attributes.insert("level".to_string(), json!(level));
        }
        attributes
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
