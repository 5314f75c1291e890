use dashmap::DashMap;

/// The transport binding for one live login session.
#[derive(Debug, Clone)]
pub struct Connection {
    pub transport_id: String,
    pub login_epoch: i64,
}

/// Maps a user to its current reachable transport. One entry per user:
/// a fresh announcement always wins, and only the session that owns the
/// stored epoch may remove it.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<i64, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally replaces any existing entry for the user.
    pub fn register(&self, user_id: i64, transport_id: String, login_epoch: i64) {
        self.entries.insert(
            user_id,
            Connection {
                transport_id,
                login_epoch,
            },
        );
    }

    /// Reachability check. Never blocks.
    pub fn lookup(&self, user_id: i64) -> Option<String> {
        self.entries.get(&user_id).map(|c| c.transport_id.clone())
    }

    /// Removes the entry only when the presented epoch owns it. A stale
    /// disconnect from an older session must not clobber a fresher
    /// registration; every offline path goes through this guard.
    pub fn unregister(&self, user_id: i64, login_epoch: i64) -> bool {
        self.entries
            .remove_if(&user_id, |_, stored| {
                Self::epoch_matches(stored.login_epoch, login_epoch)
            })
            .is_some()
    }

    /// The single "last writer wins" comparison shared by all offline paths.
    fn epoch_matches(stored: i64, presented: i64) -> bool {
        stored == presented
    }

    pub fn online_count(&self) -> usize {
        self.entries.len()
    }
}
