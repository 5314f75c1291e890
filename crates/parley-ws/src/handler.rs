use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::error::CallError;
use parley_core::AppState;
use parley_models::call::EndReason;
use parley_models::events::*;
use serde_json::json;
use tokio::time::Duration;

/// A socket that never announces itself is dropped after this long.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(30);
const WS_PING_INTERVAL: Duration = Duration::from_secs(20);

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

async fn send_frame(sender: &mut WsSender, event: &str, data: serde_json::Value) -> bool {
    let frame = Frame::new(event, data);
    match serde_json::to_string(&frame) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(err) => {
            tracing::error!(event, "failed to serialize outbound frame: {err}");
            true
        }
    }
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut session = match wait_for_announcement(&mut receiver).await {
        Some(session) => session,
        None => {
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: 4000,
                    reason: "expected user-online announcement".into(),
                })))
                .await;
            return;
        }
    };

    tracing::info!(
        user_id = session.user_id,
        login_epoch = session.login_epoch,
        transport_id = %session.transport_id,
        "gateway session established"
    );
    state.registry.register(
        session.user_id,
        session.transport_id.clone(),
        session.login_epoch,
    );
    state
        .presence
        .session_established(session.user_id, session.login_epoch, &session.transport_id);

    let disconnect_reason = run_session(&mut sender, &mut receiver, &mut session, &state).await;
    tracing::info!(
        user_id = session.user_id,
        transport_id = %session.transport_id,
        "gateway session closed: {disconnect_reason}"
    );

    // Only the session that still owns the registry entry may flip the user
    // offline. After a reconnect elsewhere this is a silent no-op.
    if state
        .registry
        .unregister(session.user_id, session.login_epoch)
    {
        state.presence.session_ended(session.user_id);
        state.calls.on_disconnect(session.user_id).await;
    }
}

/// The first frame must be `user-online`; everything else before it is
/// dropped because the socket has no identity to act on yet.
async fn wait_for_announcement(receiver: &mut WsReceiver) -> Option<crate::session::Session> {
    let deadline = tokio::time::sleep(ANNOUNCE_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(ClientEvent::UserOnline { user_id, login_epoch }) => {
                                return Some(crate::session::Session::new(user_id, login_epoch));
                            }
                            Ok(_) | Err(_) => {
                                tracing::debug!("frame before announcement, dropping");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                    Some(Ok(_)) => {}
                }
            }
            () = &mut deadline => {
                tracing::debug!("socket never announced, closing");
                return None;
            }
        }
    }
}

async fn run_session(
    sender: &mut WsSender,
    receiver: &mut WsReceiver,
    session: &mut crate::session::Session,
    state: &AppState,
) -> String {
    let mut event_rx = state.event_bus.subscribe();
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                handle_client_event(event, sender, session, state).await;
                            }
                            Err(err) => {
                                tracing::debug!(
                                    user_id = session.user_id,
                                    "dropping malformed frame: {err}"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) => format!(
                                "client close frame (code={}, reason={})",
                                frame.code, frame.reason
                            ),
                            None => "client close frame (no code/reason)".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return format!("websocket receive error: {err}"),
                    None => return "websocket stream ended".to_string(),
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !session.should_receive_event(
                            event.chat_id,
                            event.target_user_ids.as_deref(),
                        ) {
                            continue;
                        }
                        if !send_frame(sender, &event.event_type, event.payload).await {
                            return "websocket send error".to_string();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            user_id = session.user_id,
                            skipped,
                            "event stream lagged; forcing reconnect"
                        );
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: 1013,
                                reason: "event stream fell behind; reconnect".into(),
                            })))
                            .await;
                        return format!("event stream lagged by {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return "event stream closed".to_string();
                    }
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return "websocket ping send error".to_string();
                }
            }
        }
    }
}

async fn handle_client_event(
    event: ClientEvent,
    sender: &mut WsSender,
    session: &mut crate::session::Session,
    state: &AppState,
) {
    match event {
        ClientEvent::UserOnline {
            user_id,
            login_epoch,
        } => {
            // Re-announcement on an already-identified socket rebinds it.
            session.user_id = user_id;
            session.login_epoch = login_epoch;
            state
                .registry
                .register(user_id, session.transport_id.clone(), login_epoch);
            state
                .presence
                .session_established(user_id, login_epoch, &session.transport_id);
        }

        ClientEvent::UserOffline { user_id } => {
            if user_id != session.user_id {
                tracing::debug!(
                    claimed = user_id,
                    actual = session.user_id,
                    "user-offline for a different user, ignoring"
                );
                return;
            }
            // Explicit sign-out. The socket stays open but loses its
            // presence; the epoch guard protects any newer session.
            if state.registry.unregister(user_id, session.login_epoch) {
                state.presence.session_ended(user_id);
                state.calls.on_disconnect(user_id).await;
            }
        }

        ClientEvent::CallInitiate {
            caller_id,
            receiver_id,
            offer,
            caller_name,
            caller_profile,
            chat_id,
        } => {
            let result = state
                .calls
                .initiate(parley_core::calls::InitiateCall {
                    caller_id,
                    receiver_id,
                    offer,
                    caller_name,
                    caller_profile,
                    chat_id,
                })
                .await;
            if let Err(err) = result {
                let event_name = match err {
                    CallError::UserOffline => EVENT_CALL_USER_OFFLINE,
                    CallError::Busy(_) => EVENT_CALL_BUSY,
                    CallError::SessionNotFound => EVENT_CALL_SESSION_NOT_FOUND,
                };
                send_frame(
                    sender,
                    event_name,
                    json!({ "receiverId": receiver_id, "message": err.to_string() }),
                )
                .await;
            }
        }

        ClientEvent::CallAccept {
            caller_id,
            receiver_id,
            answer,
            receiver_name,
        } => {
            if let Err(err) = state
                .calls
                .accept(caller_id, receiver_id, answer, receiver_name)
                .await
            {
                send_frame(
                    sender,
                    EVENT_CALL_SESSION_NOT_FOUND,
                    json!({
                        "callerId": caller_id,
                        "receiverId": receiver_id,
                        "message": err.to_string(),
                    }),
                )
                .await;
            }
        }

        ClientEvent::CallReject {
            caller_id,
            receiver_id,
            reason,
            receiver_name,
        } => {
            state
                .calls
                .reject(caller_id, receiver_id, reason, receiver_name)
                .await;
        }

        ClientEvent::CallEnd {
            caller_id,
            receiver_id,
            reason,
        } => {
            state
                .calls
                .end(caller_id, receiver_id, EndReason::from_client(reason))
                .await;
        }

        ClientEvent::IceCandidate {
            from_user_id,
            to_user_id,
            candidate,
        } => {
            state
                .calls
                .relay_ice_candidate(from_user_id, to_user_id, candidate);
        }

        ClientEvent::CallToggleMedia {
            to_user_id,
            kind,
            enabled,
        } => {
            // Sender identity comes from the socket, not the frame.
            state
                .calls
                .relay_media_toggle(to_user_id, &kind, enabled, session.user_id);
        }

        ClientEvent::JoinGroup { chat_id } => {
            session.join_chat(chat_id);
        }

        ClientEvent::SendMessage(body) => state.relay.forward(EVENT_SEND_MESSAGE, &body),
        ClientEvent::MessageDelivered(body) => state.relay.forward(EVENT_MESSAGE_DELIVERED, &body),
        ClientEvent::MessageSeen(body) => state.relay.forward(EVENT_MESSAGE_SEEN, &body),
        ClientEvent::Typing(body) => state.relay.forward(EVENT_TYPING, &body),
        ClientEvent::StopTyping(body) => state.relay.forward(EVENT_STOP_TYPING, &body),
        ClientEvent::MessageReacted(body) => state.relay.forward(EVENT_MESSAGE_REACTED, &body),

        ClientEvent::UnreadCountChanged { rest } => {
            state
                .relay
                .broadcast_passthrough(EVENT_UNREAD_COUNT_CHANGED, rest);
        }
        ClientEvent::ProfileUpdated { rest } => {
            state
                .relay
                .broadcast_passthrough(EVENT_PROFILE_UPDATED, rest);
        }
    }
}
