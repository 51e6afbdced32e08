//! # OneBot
//!
//! Building blocks for OneBot 12 implementations: the side of the protocol
//! that owns a bot account, answers action requests and emits events.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────── OneBotRuntime ───────────────────────┐
//! transport ──────▶│ dispatch ──▶ ActionRouter ──▶ handler ──▶ ResponseWriter     │──▶ Response
//!                  │                                                              │
//! business code ──▶│ push ──▶ id + enqueue ──▶ delivery worker ──▶ EventSink      │──▶ transport
//!                  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Core** ([`core`]): messages, parameters, requests, responses, events,
//!   retcodes and the action router. No runtime dependencies.
//! - **Runtime** ([`runtime`]): the instance lifecycle, ordered event delivery,
//!   id generation, configuration and logging setup.
//!
//! Transports (HTTP, WebSocket, ...) are not included; they plug in through
//! `OneBotRuntime::dispatch_raw` and an [`EventSink`](runtime::EventSink).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use onebot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runtime = OneBotRuntime::new("mybot", BotSelf::new("mybot", "1"), RuntimeConfig::default());
//!     runtime.register_fn(actions::GET_VERSION, |w, _| {
//!         w.write_data(serde_json::json!({"impl": "mybot", "version": "0.1.0", "onebot_version": "12"}))
//!     })?;
//!     runtime.set_sink(sink_fn(|event| println!("{}", event.name())))?;
//!
//!     runtime.start().await?;
//!     runtime.push(EventPayload::heartbeat(10_000))?;
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `json-log`: JSON log output

pub use onebot_core as core;
pub use onebot_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use onebot::prelude::*;
/// ```
pub mod prelude {
    pub use onebot_core::prelude::*;
    pub use onebot_runtime::prelude::*;

    pub use onebot_runtime::config::ConfigLoader;
    pub use onebot_runtime::logging;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_builds_runtime() {
        let bot_self = BotSelf::new("facade", "1");
        let runtime = OneBotRuntime::new("facade", bot_self, Default::default());
        assert_eq!(runtime.state(), RuntimeState::Created);
        assert_eq!(runtime.bot_self().platform, "facade");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_default_features_read_toml() {
        let name = format!("onebot-facade-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, "[shutdown]\ndrain_timeout_ms = 1234\n").unwrap();

        let loaded = ConfigLoader::new().file(&path).without_env().load::<RuntimeConfig>();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap().shutdown.drain_timeout_ms, 1234);
    }
}
