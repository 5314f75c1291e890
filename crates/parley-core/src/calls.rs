use crate::error::CallError;
use crate::events::EventBus;
use crate::registry::ConnectionRegistry;
use chrono::{DateTime, Utc};
use parley_models::call::{CallStatus, EndReason};
use parley_models::events::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

/// How long the receiver's side may stay in `Ringing` before the call is
/// torn down as unanswered.
pub const RING_TIMEOUT: Duration = Duration::from_secs(30);

/// One side of an active call. Two linked entries share a `session_id`:
/// the caller's (`Calling`) and the receiver's (`Ringing`), both moving to
/// `Connected` on accept.
#[derive(Debug)]
struct CallEntry {
    session_id: String,
    caller_id: i64,
    receiver_id: i64,
    status: CallStatus,
    started_at: DateTime<Utc>,
    ring_timer: Option<AbortHandle>,
}

/// Everything the caller supplies on `call:initiate`. The metadata travels
/// opaquely into `call:incoming`.
#[derive(Debug, Clone)]
pub struct InitiateCall {
    pub caller_id: i64,
    pub receiver_id: i64,
    pub offer: Value,
    pub caller_name: String,
    pub caller_profile: Option<String>,
    pub chat_id: i64,
}

/// Owns the call lifecycle state machine. All mutation happens under the
/// table lock before any emission or asynchronous step, so the in-memory
/// table is the synchronous source of truth.
pub struct CallManager {
    registry: Arc<ConnectionRegistry>,
    bus: EventBus,
    entries: RwLock<HashMap<i64, CallEntry>>,
    ring_timeout: Duration,
}

/// Shared teardown for the ring timer. Every terminal transition funnels
/// through here; aborting an already-fired timer is a no-op.
fn clear_ring_timer(entry: &mut CallEntry) {
    if let Some(handle) = entry.ring_timer.take() {
        handle.abort();
    }
}

fn ended_payload(caller_id: i64, receiver_id: i64, reason: &EndReason) -> Value {
    json!({
        "callerId": caller_id,
        "receiverId": receiver_id,
        "reason": reason,
    })
}

impl CallManager {
    pub fn new(registry: Arc<ConnectionRegistry>, bus: EventBus, ring_timeout: Duration) -> Self {
        Self {
            registry,
            bus,
            entries: RwLock::new(HashMap::new()),
            ring_timeout,
        }
    }

    /// Start a call. Fails `UserOffline` when the receiver has no registry
    /// entry and `Busy` when either party is already `Connected`; in both
    /// cases no entry is created or touched. Non-connected entries for
    /// either party are evicted first: an abandoned ringing/calling state
    /// must never permanently block future calls.
    pub async fn initiate(self: &Arc<Self>, req: InitiateCall) -> Result<(), CallError> {
        if self.registry.lookup(req.receiver_id).is_none() {
            return Err(CallError::UserOffline);
        }

        let session_id;
        {
            let mut entries = self.entries.write().await;
            if entries
                .get(&req.receiver_id)
                .is_some_and(|e| e.status == CallStatus::Connected)
            {
                return Err(CallError::Busy("receiver is busy on another call".into()));
            }
            if entries
                .get(&req.caller_id)
                .is_some_and(|e| e.status == CallStatus::Connected)
            {
                return Err(CallError::Busy("you are already in a call".into()));
            }

            for id in [req.caller_id, req.receiver_id] {
                if let Some(mut stale) = entries.remove(&id) {
                    clear_ring_timer(&mut stale);
                    tracing::debug!(
                        user_id = id,
                        session_id = %stale.session_id,
                        "evicted stale non-connected call entry"
                    );
                }
            }

            let now = Utc::now();
            // Opaque client correlation token; the server never parses it back.
            session_id = format!(
                "{}-{}-{}",
                req.caller_id,
                req.receiver_id,
                now.timestamp_millis()
            );

            let timer = {
                let manager = Arc::clone(self);
                let (caller_id, receiver_id) = (req.caller_id, req.receiver_id);
                let timer_session = session_id.clone();
                let timeout = self.ring_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    manager
                        .ring_timer_fired(caller_id, receiver_id, &timer_session)
                        .await;
                })
                .abort_handle()
            };

            entries.insert(
                req.caller_id,
                CallEntry {
                    session_id: session_id.clone(),
                    caller_id: req.caller_id,
                    receiver_id: req.receiver_id,
                    status: CallStatus::Calling,
                    started_at: now,
                    ring_timer: Some(timer.clone()),
                },
            );
            entries.insert(
                req.receiver_id,
                CallEntry {
                    session_id: session_id.clone(),
                    caller_id: req.caller_id,
                    receiver_id: req.receiver_id,
                    status: CallStatus::Ringing,
                    started_at: now,
                    ring_timer: Some(timer),
                },
            );
        }

        self.bus.dispatch_to_users(
            EVENT_CALL_INCOMING,
            json!({
                "callerId": req.caller_id,
                "receiverId": req.receiver_id,
                "offer": req.offer,
                "callerName": req.caller_name,
                "callerProfile": req.caller_profile,
                "chatId": req.chat_id,
                "sessionId": session_id,
            }),
            vec![req.receiver_id],
        );
        Ok(())
    }

    /// Ring timer expiry. Cancellation is best-effort, so this re-validates
    /// under the lock: if the receiver answered, rejected, or a newer call
    /// reused the pair, this fire is a no-op.
    async fn ring_timer_fired(&self, caller_id: i64, receiver_id: i64, session_id: &str) {
        {
            let mut entries = self.entries.write().await;
            let still_ringing = entries.get(&receiver_id).is_some_and(|e| {
                e.session_id == session_id && e.status == CallStatus::Ringing
            });
            if !still_ringing {
                return;
            }
            if let Some(mut entry) = entries.remove(&receiver_id) {
                clear_ring_timer(&mut entry);
            }
            if entries
                .get(&caller_id)
                .is_some_and(|e| e.session_id == session_id)
            {
                if let Some(mut entry) = entries.remove(&caller_id) {
                    clear_ring_timer(&mut entry);
                }
            }
        }

        tracing::info!(caller_id, receiver_id, session_id, "call rang out");
        // Asymmetric reasons: each client renders its own message.
        self.bus.dispatch_to_users(
            EVENT_CALL_ENDED,
            ended_payload(caller_id, receiver_id, &EndReason::NoAnswer),
            vec![caller_id],
        );
        self.bus.dispatch_to_users(
            EVENT_CALL_ENDED,
            ended_payload(caller_id, receiver_id, &EndReason::NoAnswerTimeout),
            vec![receiver_id],
        );
    }

    /// Answer a ringing call. `SessionNotFound` goes back to the accepting
    /// party and destroys nothing; on success both entries turn `Connected`
    /// and both parties get the symmetric accepted notification so their
    /// call UIs and media timers start together.
    pub async fn accept(
        &self,
        caller_id: i64,
        receiver_id: i64,
        answer: Value,
        receiver_name: Option<String>,
    ) -> Result<(), CallError> {
        {
            let mut entries = self.entries.write().await;
            if !entries.contains_key(&caller_id) || !entries.contains_key(&receiver_id) {
                return Err(CallError::SessionNotFound);
            }
            for id in [caller_id, receiver_id] {
                if let Some(entry) = entries.get_mut(&id) {
                    clear_ring_timer(entry);
                    entry.status = CallStatus::Connected;
                }
            }
        }

        self.bus.dispatch_to_users(
            EVENT_CALL_ANSWER_RECEIVED,
            json!({
                "callerId": caller_id,
                "receiverId": receiver_id,
                "answer": answer,
                "receiverName": receiver_name,
            }),
            vec![caller_id],
        );
        self.bus.dispatch_to_users(
            EVENT_CALL_ACCEPTED,
            json!({
                "callerId": caller_id,
                "receiverId": receiver_id,
            }),
            vec![caller_id, receiver_id],
        );
        Ok(())
    }

    /// Decline a call. Permissive by design: no precondition on entry
    /// existence, so a reject racing a timeout or disconnect still clears
    /// state and still tells every device to drop its call UI.
    pub async fn reject(
        &self,
        caller_id: i64,
        receiver_id: i64,
        reason: Option<String>,
        receiver_name: Option<String>,
    ) {
        {
            let mut entries = self.entries.write().await;
            for id in [caller_id, receiver_id] {
                if let Some(mut entry) = entries.remove(&id) {
                    clear_ring_timer(&mut entry);
                }
            }
        }

        self.bus.dispatch_to_users(
            EVENT_CALL_REJECTED,
            json!({
                "callerId": caller_id,
                "receiverId": receiver_id,
                "reason": reason.unwrap_or_else(|| "rejected".to_string()),
                "receiverName": receiver_name,
            }),
            vec![caller_id],
        );
        // The receiver's other connected devices also clear their call UI.
        self.bus.dispatch_to_users(
            EVENT_CALL_ENDED,
            ended_payload(caller_id, receiver_id, &EndReason::RejectedByUser),
            vec![receiver_id],
        );
    }

    /// Hang up. Each entry is deleted only when its stored pair matches the
    /// pair being ended, so a stale duplicate cannot delete an unrelated
    /// newer session that reused the same two ids. Both parties are always
    /// notified, which makes duplicate invocation safe for clients.
    pub async fn end(&self, caller_id: i64, receiver_id: i64, reason: EndReason) {
        {
            let mut entries = self.entries.write().await;
            for id in [caller_id, receiver_id] {
                if let Some(entry) = entries.get_mut(&id) {
                    clear_ring_timer(entry);
                    if entry.caller_id == caller_id && entry.receiver_id == receiver_id {
                        entries.remove(&id);
                    }
                }
            }
        }

        self.bus.dispatch_to_users(
            EVENT_CALL_ENDED,
            ended_payload(caller_id, receiver_id, &reason),
            vec![caller_id, receiver_id],
        );
    }

    /// Transport teardown for a user holding a call entry. Invoked only
    /// after the registry confirmed this was the authoritative session.
    pub async fn on_disconnect(&self, user_id: i64) {
        let (caller_id, receiver_id, peer_id) = {
            let mut entries = self.entries.write().await;
            let Some(mut entry) = entries.remove(&user_id) else {
                return;
            };
            clear_ring_timer(&mut entry);
            let peer_id = if entry.caller_id == user_id {
                entry.receiver_id
            } else {
                entry.caller_id
            };
            if entries.get(&peer_id).is_some_and(|peer| {
                peer.caller_id == entry.caller_id && peer.receiver_id == entry.receiver_id
            }) {
                if let Some(mut peer) = entries.remove(&peer_id) {
                    clear_ring_timer(&mut peer);
                }
            }
            (entry.caller_id, entry.receiver_id, peer_id)
        };

        tracing::info!(user_id, peer_id, "call torn down by disconnect");
        self.bus.dispatch_to_users(
            EVENT_CALL_ENDED,
            ended_payload(caller_id, receiver_id, &EndReason::Disconnected),
            vec![peer_id],
        );
    }

    /// Stateless ICE forward. Deliberately no session-state validation:
    /// candidate exchange timing is independent of signaling state, and
    /// gating here would drop legitimate late candidates.
    pub fn relay_ice_candidate(&self, from_user_id: i64, to_user_id: i64, candidate: Value) {
        self.bus.dispatch_to_users(
            EVENT_ICE_CANDIDATE,
            json!({
                "fromUserId": from_user_id,
                "toUserId": to_user_id,
                "candidate": candidate,
            }),
            vec![to_user_id],
        );
    }

    /// Stateless media-toggle forward, annotated with the sender id.
    pub fn relay_media_toggle(&self, to_user_id: i64, kind: &str, enabled: bool, from_user_id: i64) {
        self.bus.dispatch_to_users(
            EVENT_CALL_TOGGLE_MEDIA,
            json!({
                "type": kind,
                "enabled": enabled,
                "fromUserId": from_user_id,
            }),
            vec![to_user_id],
        );
    }

    /// Current status of a user's call entry, if any.
    pub async fn status_of(&self, user_id: i64) -> Option<CallStatus> {
        self.entries.read().await.get(&user_id).map(|e| e.status)
    }

    /// Correlation token of a user's call entry, if any.
    pub async fn session_of(&self, user_id: i64) -> Option<String> {
        self.entries
            .read()
            .await
            .get(&user_id)
            .map(|e| e.session_id.clone())
    }

    pub async fn active_entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Seconds since the entry was created. Surfaced for diagnostics.
    pub async fn call_age_seconds(&self, user_id: i64) -> Option<i64> {
        self.entries
            .read()
            .await
            .get(&user_id)
            .map(|e| (Utc::now() - e.started_at).num_seconds())
    }
}
