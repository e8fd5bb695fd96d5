use std::time::Duration;

use salvo_game::GameConfig;
use salvo_store::StoreConfig;

/// Everything a server needs to start, with working defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// How long a new connection may take to send its first message.
    pub registration_timeout: Duration,
    /// Connections silent for this long are closed and cleaned up.
    pub idle_timeout: Duration,
    pub game: GameConfig,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            registration_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            game: GameConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
