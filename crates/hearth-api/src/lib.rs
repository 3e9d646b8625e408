//! Production collaborators for the Hearth voice orchestrator.
//!
//! Provides the HTTP memory-service client, the realtime WebSocket
//! control channel, and configuration loading. Together with
//! `hearth-voice` this is everything an embedding application needs to
//! run sessions:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = hearth_api::load_config(Some("hearth.toml"))?;
//! hearth_api::init_tracing(&config.logging);
//!
//! let backend = hearth_api::MemoryApiClient::new(&config.api);
//! let connector = hearth_api::RealtimeConnector::new(&config.realtime);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod realtime;

pub use client::MemoryApiClient;
pub use config::{
    init_tracing, load_config, ApiConfig, Config, ConfigError, LoggingConfig, RealtimeConfig,
};
pub use realtime::{RealtimeConnector, RealtimeSocket};
