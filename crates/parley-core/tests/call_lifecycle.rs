//! End-to-end coordinator flows observed through the event bus, with the
//! presence mirror backed by an in-memory database.

use parley_core::calls::InitiateCall;
use parley_core::events::ServerEvent;
use parley_core::{AppConfig, AppState};
use parley_models::call::EndReason;
use parley_models::events::*;
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

async fn test_state() -> anyhow::Result<AppState> {
    let db = parley_db::create_pool("sqlite::memory:", 1).await?;
    parley_db::run_migrations(&db).await?;
    Ok(AppState::new(
        db,
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..AppConfig::default()
        },
    ))
}

async fn next_event(rx: &mut Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within deadline")
        .expect("bus open")
}

fn offer() -> serde_json::Value {
    json!({ "sdp": "v=0", "type": "offer" })
}

#[tokio::test]
async fn login_presence_call_and_hangup_flow() -> anyhow::Result<()> {
    let state = test_state().await?;
    let mut rx = state.event_bus.subscribe();

    // Two users come online.
    state.registry.register(1, "t-ana".into(), 100);
    state.presence.session_established(1, 100, "t-ana");
    state.registry.register(2, "t-bo".into(), 200);
    state.presence.session_established(2, 200, "t-bo");

    let online = next_event(&mut rx).await;
    assert_eq!(online.event_type, EVENT_PRESENCE_CHANGED);
    assert_eq!(online.target_user_ids, None);
    assert_eq!(online.payload["status"], json!("online"));
    assert_eq!(online.payload["loginEpoch"], json!(100));
    let _ = next_event(&mut rx).await;

    // Ana calls Bo; only Bo's sessions are rung.
    state
        .calls
        .initiate(InitiateCall {
            caller_id: 1,
            receiver_id: 2,
            offer: offer(),
            caller_name: "ana".into(),
            caller_profile: Some("ana.png".into()),
            chat_id: 12,
        })
        .await?;
    let incoming = next_event(&mut rx).await;
    assert_eq!(incoming.event_type, EVENT_CALL_INCOMING);
    assert_eq!(incoming.target_user_ids, Some(vec![2]));
    assert_eq!(incoming.payload["chatId"], json!(12));

    state
        .calls
        .accept(1, 2, json!({ "sdp": "v=0", "type": "answer" }), Some("bo".into()))
        .await?;
    assert_eq!(next_event(&mut rx).await.event_type, EVENT_CALL_ANSWER_RECEIVED);
    assert_eq!(next_event(&mut rx).await.event_type, EVENT_CALL_ACCEPTED);

    // Mid-call signaling passes through.
    state.calls.relay_ice_candidate(2, 1, json!({ "candidate": "c1" }));
    let ice = next_event(&mut rx).await;
    assert_eq!(ice.event_type, EVENT_ICE_CANDIDATE);
    assert_eq!(ice.target_user_ids, Some(vec![1]));

    state.calls.end(1, 2, EndReason::Other("hangup".into())).await;
    let ended = next_event(&mut rx).await;
    assert_eq!(ended.event_type, EVENT_CALL_ENDED);
    assert_eq!(ended.target_user_ids, Some(vec![1, 2]));
    assert_eq!(state.calls.active_entry_count().await, 0);

    // The mirror row eventually reflects the last confirmed transition.
    for _ in 0..50 {
        if let Some(row) = parley_db::presence::get_presence(&state.db, 1).await? {
            assert_eq!(row.status, "online");
            assert_eq!(row.transport_id.as_deref(), Some("t-ana"));
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("presence mirror row never appeared");
}

#[tokio::test]
async fn reconnect_does_not_interrupt_calls_or_flap_presence() -> anyhow::Result<()> {
    let state = test_state().await?;

    state.registry.register(1, "t-old".into(), 100);
    state.registry.register(2, "t-bo".into(), 200);
    state
        .calls
        .initiate(InitiateCall {
            caller_id: 1,
            receiver_id: 2,
            offer: offer(),
            caller_name: "ana".into(),
            caller_profile: None,
            chat_id: 12,
        })
        .await?;
    state.calls.accept(1, 2, json!({ "sdp": "v=0" }), None).await?;

    // Ana reconnects on a new device before the old socket drops.
    state.registry.register(1, "t-new".into(), 300);

    let mut rx = state.event_bus.subscribe();
    // The old socket's teardown presents its stale epoch and is refused, so
    // neither presence nor call state is disturbed.
    if state.registry.unregister(1, 100) {
        state.presence.session_ended(1);
        state.calls.on_disconnect(1).await;
    }

    assert_eq!(state.registry.lookup(1).as_deref(), Some("t-new"));
    assert_eq!(state.calls.active_entry_count().await, 2);
    assert!(rx.try_recv().is_err());

    // The authoritative session's teardown does flip the user offline and
    // tears down the call.
    if state.registry.unregister(1, 300) {
        state.presence.session_ended(1);
        state.calls.on_disconnect(1).await;
    }
    let offline = next_event(&mut rx).await;
    assert_eq!(offline.event_type, EVENT_PRESENCE_CHANGED);
    assert_eq!(offline.payload["status"], json!("offline"));
    let ended = next_event(&mut rx).await;
    assert_eq!(ended.event_type, EVENT_CALL_ENDED);
    assert_eq!(ended.target_user_ids, Some(vec![2]));
    assert_eq!(ended.payload["reason"], json!("disconnected"));
    assert_eq!(state.calls.active_entry_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn offline_receiver_produces_no_session_state() -> anyhow::Result<()> {
    let state = test_state().await?;
    state.registry.register(1, "t-ana".into(), 100);

    let err = state
        .calls
        .initiate(InitiateCall {
            caller_id: 1,
            receiver_id: 7,
            offer: offer(),
            caller_name: "ana".into(),
            caller_profile: None,
            chat_id: 12,
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "user is offline");
    assert_eq!(state.calls.active_entry_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn chat_relay_scopes_by_chat_and_nudges_unread() -> anyhow::Result<()> {
    let state = test_state().await?;
    let mut rx = state.event_bus.subscribe();

    let body: ChatEventBody = serde_json::from_value(json!({
        "chatId": 9,
        "message": { "text": "hello", "senderId": 1 }
    }))?;
    state.relay.forward(EVENT_SEND_MESSAGE, &body);

    let forwarded = next_event(&mut rx).await;
    assert_eq!(forwarded.event_type, EVENT_SEND_MESSAGE);
    assert_eq!(forwarded.chat_id, Some(9));
    assert_eq!(forwarded.payload["message"]["text"], json!("hello"));

    let nudge = next_event(&mut rx).await;
    assert_eq!(nudge.event_type, EVENT_UNREAD_COUNT_CHANGED);
    assert_eq!(nudge.payload, json!({ "chatId": 9 }));
    Ok(())
}
