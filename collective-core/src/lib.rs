//! A D&D Dungeon Master run as a collective of specialist handlers.
//!
//! This crate provides:
//! - Intent classification of free-text player commands
//! - A deterministic 5e rules oracle that gates every turn
//! - Concurrent dispatch of the remaining handlers under a time budget
//! - Priority synthesis of handler outputs into one response
//! - Session state with an append-only event log and save/load
//!
//! # Quick Start
//!
//! ```ignore
//! use collective_core::{CollectiveConfig, DmCollective};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CollectiveConfig::new("My Campaign")
//!         .with_player_name("Thorin")
//!         .with_player_class("fighter");
//!
//!     let mut collective = DmCollective::new(&config);
//!
//!     let response = collective.respond("I cast fireball").await;
//!     println!("{}", response);
//! }
//! ```

pub mod collective;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod id;
pub mod intent;
pub mod oracle;
pub mod persist;
pub mod rules;
pub mod session;
pub mod synthesis;
pub mod testing;

// Primary public API
pub use collective::{DmCollective, TurnOutcome, FALLBACK_RESPONSE};
pub use config::CollectiveConfig;
pub use dispatch::{AgentDispatcher, DispatchResults, HandlerRegistry};
pub use error::{ConfigError, HandlerError, HandlerFailure, PersistError, PipelineError};
pub use handler::{Handler, HandlerResult, PromptContext};
pub use intent::{Classification, HandlerName, Intent, IntentClassifier};
pub use oracle::RuleOracle;
pub use persist::SavedSession;
pub use rules::{RuleEngine, RuleQuery, RuleResult};
pub use session::{EventKind, SessionEffect, SessionState};
pub use synthesis::{ResponseSynthesizer, RULES_CHECK_MARKER};
