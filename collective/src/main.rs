//! Line-oriented Dungeon Master console.
//!
//! Reads one command per line from stdin and prints the collective's response.
//! Configuration comes from the environment (a `.env` file is loaded first);
//! logs go to stderr so they never interleave with the story.
//!
//! ```bash
//! COLLECTIVE_PLAYER_CLASS=wizard RUST_LOG=collective_core=debug cargo run -p collective
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use collective_core::handlers::template_registry;
use collective_core::session::Attributes;
use collective_core::{CollectiveConfig, DmCollective, RuleEngine, SavedSession};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SAVE_PATH: &str = "collective_save.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collective=info,collective_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CollectiveConfig::from_env().context("invalid configuration")?;
    tracing::info!(campaign = %config.campaign_name, "starting session");

    let mut collective = DmCollective::new(&config);
    seed_demo_characters(&mut collective);

    print_banner(&collective);
    run(&mut collective, &config).await
}

async fn run(collective: &mut DmCollective, config: &CollectiveConfig) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match Command::parse(input) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Status => println!("{}", collective.state().summary()),
            Command::Save(path) => {
                let saved = SavedSession::new(collective.state().clone());
                match saved.save_json(&path).await {
                    Ok(()) => println!("[SAVED] Session saved to {}", path.display()),
                    Err(e) => println!("[ERROR] Save failed: {e}"),
                }
            }
            Command::Load(path) => match SavedSession::load_json(&path).await {
                Ok(saved) => {
                    *collective =
                        DmCollective::resume(saved.state, config, template_registry(RuleEngine::new()));
                    println!("[LOADED] {}", collective.state().summary());
                }
                Err(e) => println!("[ERROR] Load failed: {e}"),
            },
            Command::Action(text) => {
                let response = collective.respond(text).await;
                println!("\n{}\n", response);
            }
        }
    }

    println!("Farewell, adventurer.");
    Ok(())
}

/// A line of input: a reserved console command or a player action.
#[derive(Debug, PartialEq)]
enum Command<'a> {
    Help,
    Status,
    Save(PathBuf),
    Load(PathBuf),
    Quit,
    Action(&'a str),
}

impl<'a> Command<'a> {
    /// Reserved words only count as commands when they stand alone or take a
    /// single path, so "save the miller's daughter" stays an action.
    fn parse(input: &'a str) -> Self {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let keyword = parts.first().map(|p| p.to_lowercase()).unwrap_or_default();

        match (keyword.as_str(), parts.len()) {
            ("quit" | "exit", 1) => Command::Quit,
            ("help", 1) => Command::Help,
            ("status", 1) => Command::Status,
            ("save", 1) => Command::Save(PathBuf::from(DEFAULT_SAVE_PATH)),
            ("save", 2) => Command::Save(PathBuf::from(parts[1])),
            ("load", 2) => Command::Load(PathBuf::from(parts[1])),
            _ => Command::Action(input),
        }
    }
}

/// Townsfolk for the default starting square.
fn seed_demo_characters(collective: &mut DmCollective) {
    let mut pip = Attributes::new();
    pip.insert("race".to_string(), json!("halfling"));
    pip.insert("role".to_string(), json!("merchant"));
    pip.insert("disposition".to_string(), json!("friendly"));
    collective.seed_character("Pip Goldleaf", pip);

    let mut goblin = Attributes::new();
    goblin.insert("role".to_string(), json!("scout"));
    goblin.insert("disposition".to_string(), json!("hostile"));
    goblin.insert("armor_class".to_string(), json!(15));
    collective.seed_character("Goblin", goblin);
}

fn print_banner(collective: &DmCollective) {
    let state = collective.state();
    println!("=== DM Collective ===");
    println!("Campaign: {}", state.campaign_name());
    println!("{}", state.summary());
    println!();
    println!("Describe what your character does. Type 'help' for commands, 'quit' to exit.");
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  help         - Show this help");
    println!("  status       - Show location, characters, combat and turn");
    println!("  save [path]  - Save the session (default: {})", DEFAULT_SAVE_PATH);
    println!("  load <path>  - Resume a saved session");
    println!("  quit | exit  - End the session");
    println!();
    println!("Examples:");
    println!("  I examine the fountain in the square");
    println!("  I approach Pip Goldleaf and ask about rumors");
    println!("  I sneak past the goblin with advantage");
    println!("  I walk to the Old Mill");
}
