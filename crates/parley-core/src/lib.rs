pub mod calls;
pub mod error;
pub mod events;
pub mod presence;
pub mod registry;
pub mod relay;

use parley_db::DbPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_name: String,
    pub database_url: String,
    /// How long an unanswered call rings before automatic teardown.
    pub ring_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_name: "Parley Server".to_string(),
            database_url: "sqlite://parley.db".to_string(),
            ring_timeout: calls::RING_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    pub config: AppConfig,
    /// User -> live transport bindings, epoch-guarded.
    pub registry: Arc<registry::ConnectionRegistry>,
    pub presence: Arc<presence::PresencePublisher>,
    pub calls: Arc<calls::CallManager>,
    pub relay: Arc<relay::ChatRelay>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let event_bus = events::EventBus::default();
        let registry = Arc::new(registry::ConnectionRegistry::new());
        let presence = Arc::new(presence::PresencePublisher::new(
            db.clone(),
            event_bus.clone(),
        ));
        let calls = Arc::new(calls::CallManager::new(
            registry.clone(),
            event_bus.clone(),
            config.ring_timeout,
        ));
        let relay = Arc::new(relay::ChatRelay::new(event_bus.clone()));
        Self {
            db,
            event_bus,
            config,
            registry,
            presence,
            calls,
            relay,
            shutdown: Arc::new(Notify::new()),
        }
    }
}
