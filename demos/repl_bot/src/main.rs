//! REPL Bot Example
//!
//! A OneBot implementation whose "platform" is the terminal:
//!
//! - every line typed on stdin becomes a private message event from the
//!   configured user,
//! - a line starting with `{` is treated as a raw action request and its
//!   response is printed,
//! - `exit` (or Ctrl+C) shuts the instance down.
//!
//! Events are printed as JSON lines, standing in for a transport.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package repl-bot -- --config config.toml
//! ```
//!
//! Try `{"action": "send_message", "params": {"user_id": "user", "message": [{"type": "text", "data": {"text": "hi"}}]}, "echo": "1"}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use onebot::prelude::*;
use onebot::runtime::IdGenerator;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const IMPL: &str = "onebot-rs-repl";
const PLATFORM: &str = "repl";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_CONFIG: &str = r#"[heartbeat]
enabled = true
interval_ms = 10000

[logging]
level = "debug"
output = "file"
file_path = "log.txt"

[repl]
self_id = "bot"
user_id = "user"
"#;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file; written with defaults if it does not exist.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

/// The whole configuration file: runtime sections plus `[repl]`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Config {
    #[serde(flatten)]
    onebot: RuntimeConfig,
    #[serde(default)]
    repl: ReplConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReplConfig {
    /// The bot's own user id.
    self_id: String,
    /// The only user the bot can talk to.
    user_id: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            self_id: "bot".to_string(),
            user_id: "user".to_string(),
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        println!(
            "Config file not found, writing defaults to {}",
            path.display()
        );
        std::fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let config: Config = ConfigLoader::new().file(path).load()?;
    config.onebot.validate()?;
    Ok(config)
}

// ============================================================================
// The bot
// ============================================================================

/// The hosting program: a runtime instance plus REPL settings.
struct ReplBot {
    runtime: Arc<OneBotRuntime>,
    config: ReplConfig,
}

impl ReplBot {
    fn new(runtime_config: RuntimeConfig, config: ReplConfig) -> Result<Self> {
        let bot_self = BotSelf::new(PLATFORM, config.self_id.clone());
        let mut runtime = OneBotRuntime::new(IMPL, bot_self, runtime_config);
        let ids = runtime.id_generator();

        runtime.register_fn(actions::GET_VERSION, |w, _| {
            w.write_data(json!({
                "impl": IMPL,
                "version": VERSION,
                "onebot_version": onebot::core::ONEBOT_VERSION,
            }))
        })?;

        let self_id = config.self_id.clone();
        runtime.register_fn(actions::GET_SELF_INFO, move |w, _| {
            w.write_data(json!({
                "user_id": self_id,
                "user_name": self_id,
                "user_displayname": "",
            }))
        })?;

        runtime.register(
            actions::SEND_MESSAGE,
            SendMessage {
                user_id: config.user_id.clone(),
                ids,
            },
        )?;

        runtime.register_extended(
            "some_test_action",
            handler_fn(|w, _| w.write_data("It works!")),
        )?;

        runtime.set_sink(sink_fn(|event| match serde_json::to_string(&event) {
            Ok(line) => println!("<- {line}"),
            Err(e) => warn!(error = %e, "Failed to encode event"),
        }))?;

        Ok(Self {
            runtime: Arc::new(runtime),
            config,
        })
    }

    /// Pushes what the user typed as a private message.
    fn push_input(&self, text: &str) {
        let payload = EventPayload::private_message(
            self.runtime.next_message_id(),
            Message::new().text(text),
            self.config.user_id.clone(),
        );
        if let Err(e) = self.runtime.push(payload) {
            warn!(error = %e, "Failed to push message event");
        }
    }

    /// Dispatches a raw JSON request typed on stdin.
    async fn call_action(&self, raw: &str) {
        let response = self.runtime.dispatch_raw(raw.as_bytes()).await;
        match serde_json::to_string(&response) {
            Ok(line) => println!("=> {line}"),
            Err(e) => warn!(error = %e, "Failed to encode response"),
        }
    }

    /// Pushes heartbeats until the runtime stops accepting events.
    fn spawn_heartbeat(&self) -> Option<tokio::task::JoinHandle<()>> {
        let heartbeat = &self.runtime.config().heartbeat;
        if !heartbeat.enabled {
            return None;
        }

        let interval_ms = heartbeat.interval_ms;
        let period = heartbeat.interval();
        let runtime = Arc::clone(&self.runtime);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match runtime.push(EventPayload::heartbeat(interval_ms)) {
                    Ok(_) => {}
                    Err(PushError::Stopped { .. }) => break,
                    Err(e) => warn!(error = %e, "Failed to push heartbeat"),
                }
            }
        }))
    }

    async fn run(&self) -> Result<()> {
        self.runtime.start().await?;
        self.runtime
            .push(EventPayload::connect(IMPL, VERSION))
            .context("failed to announce the implementation")?;
        let heartbeat = self.spawn_heartbeat();

        println!("Start chatting (type `exit` to quit):");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };

            let text = line.trim();
            if text == "exit" {
                break;
            }
            if text.starts_with('{') {
                self.call_action(text).await;
            } else if !text.is_empty() {
                self.push_input(text);
            }
        }

        self.runtime.stop().await?;
        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        info!("Bye");
        Ok(())
    }
}

/// `send_message`: the only reachable user is the configured one.
struct SendMessage {
    user_id: String,
    ids: Arc<IdGenerator>,
}

#[async_trait]
impl ActionHandler for SendMessage {
    async fn handle(&self, w: &ResponseWriter, r: &Request) {
        let p = ParamGetter::new(w, r);
        let Some(user_id) = p.get_str("user_id") else {
            return;
        };
        if user_id != self.user_id {
            w.write_failed(
                RetCode::LOGIC_ERROR,
                format!("cannot send to user `{user_id}`"),
            );
            return;
        }
        let Some(message) = p.get_message("message") else {
            return;
        };

        println!("bot: {}", message.extract_text());
        w.write_data(json!({
            "message_id": self.ids.next_id(),
            "time": time::OffsetDateTime::now_utc().unix_timestamp(),
        }));
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    logging::init_from_config(&config.onebot.logging);
    info!(repl = ?config.repl, "Configuration loaded");

    let bot = ReplBot::new(config.onebot, config.repl)?;
    bot.run().await
}
