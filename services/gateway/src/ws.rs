//! WebSocket connection handling: handshake, two-stage lifecycle, echo.
//!
//! The socket is split into a reader half driven here and a writer task that
//! drains the session's outbound queue. Everything that wants to talk to the
//! session (welcome, echo, broadcasts, publications, reaper pings, closes)
//! enqueues through the [`SessionHandle`]; only the writer touches the sink.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use whagons_authz::extract_bearer;
use whagons_wire::{CLOSE_POLICY, SystemFrame};

use crate::engine::{Engine, OUTBOUND_QUEUE_DEPTH, Outbound, SessionHandle};
use crate::sessions;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(engine): State<Arc<Engine>>,
) -> Response {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let bearer = extract_bearer(auth_header.as_deref(), params.get("token").map(String::as_str));
    let domain = params
        .get("domain")
        .filter(|value| !value.is_empty())
        .cloned();
    ws.on_upgrade(move |socket| handle_socket(engine, socket, bearer, domain))
}

async fn handle_socket(
    engine: Arc<Engine>,
    socket: WebSocket,
    bearer: Option<String>,
    domain: Option<String>,
) {
    let session_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE_DEPTH);
    let handle = SessionHandle::new(session_id.clone(), tx);

    // Writer task: sole owner of the sink. It dies on the first transport
    // error, which makes every later enqueue fail and marks the session dead.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    tracing::info!(session = %session_id, "session connected");

    let Some(bearer) = bearer else {
        tracing::info!(session = %session_id, "no bearer token provided");
        let frame = SystemFrame::auth_error("Bearer token required").with_session(&session_id);
        let _ = handle.enqueue_text(frame.to_json());
        handle.enqueue_close(CLOSE_POLICY, "Authentication required");
        let _ = writer.await;
        return;
    };
    let Some(domain) = domain else {
        tracing::info!(session = %session_id, "no domain provided");
        let frame = SystemFrame::auth_error("Domain parameter required").with_session(&session_id);
        let _ = handle.enqueue_text(frame.to_json());
        handle.enqueue_close(CLOSE_POLICY, "Domain required");
        let _ = writer.await;
        return;
    };

    let mut auth = match engine.authenticate(&bearer, &domain).await {
        Ok(auth) => auth,
        Err(err) => {
            tracing::info!(session = %session_id, domain = %domain, error = %err, "authentication failed");
            let frame = SystemFrame::auth_error(format!(
                "Authentication failed for domain {domain}: {err}"
            ))
            .with_session(&session_id);
            let _ = handle.enqueue_text(frame.to_json());
            handle.enqueue_close(CLOSE_POLICY, "Authentication failed");
            let _ = writer.await;
            return;
        }
    };
    auth.session_id = session_id.clone();
    let tenant_name = auth.tenant_name.clone();

    // Welcome first; only a successfully queued welcome earns registration.
    let welcome = SystemFrame::authenticated(
        &domain,
        &tenant_name,
        serde_json::json!({
            "domain": &domain,
            "tenant_name": &tenant_name,
            "user_id": auth.subject_id,
            "abilities": &auth.abilities,
        }),
    )
    .with_session(&session_id);
    if handle.enqueue_text(welcome.to_json()).is_err() {
        tracing::warn!(session = %session_id, "transport died before welcome; abandoning session");
        writer.abort();
        return;
    }

    let timer = sessions::spawn_negotiation_timer(engine.clone(), session_id.clone());
    engine
        .register_negotiating(handle.clone(), auth, timer)
        .await;
    tracing::info!(session = %session_id, tenant = %tenant_name, "session negotiating");

    let mut promoted = false;
    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                tracing::info!(session = %session_id, error = %err, "receive error");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            // An empty or binary first frame still counts as client traffic.
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(_) => break,
            // Transport-level keepalives are not application frames.
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if !promoted && engine.promote(&session_id).await {
            promoted = true;
            tracing::info!(session = %session_id, tenant = %tenant_name, "session promoted to active");
        }

        let echo = SystemFrame::echo(&tenant_name, &text).with_session(&session_id);
        if handle.enqueue_text(echo.to_json()).is_err() {
            break;
        }
    }

    engine.remove_session(&session_id).await;
    drop(handle);
    let _ = writer.await;
    tracing::info!(session = %session_id, tenant = %tenant_name, "session disconnected");
}
