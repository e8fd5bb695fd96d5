//! `SalvoServer` builder and server loop.
//!
//! This is the entry point for running a Salvo game server. It ties
//! together all the layers: transport → protocol → store → registry →
//! matchmaker/engine → dispatcher. Every component is constructed once
//! here and handed to the connection handlers by reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use salvo_game::{GameConfig, GameEngine, GameLocks, Matchmaker};
use salvo_protocol::{Codec, JsonCodec};
use salvo_session::{Authenticator, ConnectionRegistry, UuidAuthenticator};
use salvo_store::{MemoryStore, SessionStore, StoreConfig};
use salvo_transport::{ConnectionId, Transport, WebSocketTransport};
use tokio::sync::{oneshot, Mutex};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::handler::handle_connection;
use crate::SalvoError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry and store synchronise internally.
pub(crate) struct ServerState<S: SessionStore, A: Authenticator, C: Codec> {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) dispatcher: Dispatcher<S>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    /// Stop signals for live handlers, fired when a newer connection
    /// takes over the same player.
    pub(crate) shutdowns: Mutex<HashMap<ConnectionId, oneshot::Sender<()>>>,
}

/// Builder for configuring and starting a Salvo server.
///
/// # Example
///
/// ```rust,no_run
/// use salvo::prelude::*;
///
/// # async fn run() -> Result<(), SalvoError> {
/// let server = SalvoServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct SalvoServerBuilder {
    config: ServerConfig,
}

impl SalvoServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the matchmaking and reconnect settings.
    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.config.game = config;
        self
    }

    /// Sets the record expiry used by the built-in store.
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.config.store = config;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn registration_timeout(mut self, timeout: Duration) -> Self {
        self.config.registration_timeout = timeout;
        self
    }

    /// Builds the server with the in-memory store and UUID identities.
    pub async fn build(
        self,
    ) -> Result<SalvoServer<MemoryStore, UuidAuthenticator, JsonCodec>, SalvoError> {
        let store = Arc::new(MemoryStore::new(self.config.store.clone()));
        self.build_with(store, UuidAuthenticator).await
    }

    /// Builds the server on a caller-supplied store and authenticator.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build_with<S, A>(
        self,
        store: Arc<S>,
        auth: A,
    ) -> Result<SalvoServer<S, A, JsonCodec>, SalvoError>
    where
        S: SessionStore,
        A: Authenticator,
    {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let registry = Arc::new(ConnectionRegistry::new());
        let locks = Arc::new(GameLocks::new());
        let matchmaker = Arc::new(Matchmaker::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&locks),
            self.config.game.clone(),
        ));
        let engine = Arc::new(GameEngine::new(
            Arc::clone(&store),
            locks,
            self.config.game.clone(),
        ));

        let state = Arc::new(ServerState {
            registry,
            dispatcher: Dispatcher::new(matchmaker, engine),
            auth,
            codec: JsonCodec,
            config: self.config,
            shutdowns: Mutex::new(HashMap::new()),
        });

        Ok(SalvoServer {
            transport,
            store,
            state,
        })
    }
}

impl Default for SalvoServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Salvo game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SalvoServer<S: SessionStore, A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    store: Arc<S>,
    state: Arc<ServerState<S, A, C>>,
}

impl SalvoServer<MemoryStore, UuidAuthenticator, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> SalvoServerBuilder {
        SalvoServerBuilder::new()
    }
}

impl<S, A, C> SalvoServer<S, A, C>
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The session store the server was built on.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// The live connection registry.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), SalvoError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Salvo server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
