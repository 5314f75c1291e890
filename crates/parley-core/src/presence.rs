use crate::events::EventBus;
use parley_db::DbPool;
use parley_models::events::EVENT_PRESENCE_CHANGED;
use serde_json::json;

/// Converts confirmed session transitions into external-store mirror writes
/// and unscoped `presence-changed` broadcasts. Callers are gated by the
/// registry's epoch guard, so duplicate or stale events never reach this.
pub struct PresencePublisher {
    db: DbPool,
    bus: EventBus,
}

impl PresencePublisher {
    pub fn new(db: DbPool, bus: EventBus) -> Self {
        Self { db, bus }
    }

    pub fn session_established(&self, user_id: i64, login_epoch: i64, transport_id: &str) {
        // Store write is fire-and-forget: the in-memory registry already
        // holds the authoritative state, so a failed mirror write is only
        // logged, never retried or surfaced.
        let pool = self.db.clone();
        let transport_id = transport_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = parley_db::presence::mark_online(&pool, user_id, &transport_id).await
            {
                tracing::warn!(user_id, "presence mirror write (online) failed: {err}");
            }
        });

        self.bus.broadcast(
            EVENT_PRESENCE_CHANGED,
            json!({
                "userId": user_id,
                "status": "online",
                "loginEpoch": login_epoch,
            }),
        );
    }

    pub fn session_ended(&self, user_id: i64) {
        let pool = self.db.clone();
        tokio::spawn(async move {
            if let Err(err) = parley_db::presence::mark_offline(&pool, user_id).await {
                tracing::warn!(user_id, "presence mirror write (offline) failed: {err}");
            }
        });

        self.bus.broadcast(
            EVENT_PRESENCE_CHANGED,
            json!({
                "userId": user_id,
                "status": "offline",
            }),
        );
    }
}
