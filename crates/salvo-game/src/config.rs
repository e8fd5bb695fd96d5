use std::time::Duration;

/// Configuration shared by the matchmaker and the game engine.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Store queue that waiting players are pushed onto.
    pub queue_name: String,
    /// Window advertised to an opponent when a player drops mid-game.
    /// Advisory only: nothing ends the game when it runs out.
    pub reconnect_window: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            queue_name: "matchmaking:queue".into(),
            reconnect_window: Duration::from_secs(300),
        }
    }
}
