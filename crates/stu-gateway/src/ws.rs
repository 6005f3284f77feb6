//! The control channel
//!
//! One WebSocket per client. On accept: `engine:ready`, any startup
//! warnings, then the full snapshot. After that, broadcast events flow out
//! and correlated requests flow in.
//!
//! Backpressure rules: the outbound queue is bounded; meter and transport
//! events are dropped when it is saturated, snapshots and acks always go
//! through. At most one request may be in flight per correlation id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use stu_proto::{Ack, ClientFrame, ServerEvent, WireError};
use stu_session::SessionHandle;

use crate::GatewayState;

/// Outbound queue high-water mark per connection
pub const OUTBOUND_QUEUE: usize = 64;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

enum Outbound {
    /// Never dropped: snapshots, acks, ready, warnings
    Reliable(String),
    /// Dropped beyond the high-water mark: meters, transport ticks
    Lossy(String),
}

async fn client_loop(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);

    // Writer: single owner of the socket sink
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match message {
                Outbound::Reliable(text) | Outbound::Lossy(text) => text,
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Greeting: ready, warnings, initial snapshot
    let ready = ServerEvent::Ready {
        engine_port: state.engine_port,
    };
    let _ = outbound_tx
        .send(Outbound::Reliable(encode(&ready)))
        .await;
    for warning in state.session.startup_warnings() {
        let event = ServerEvent::Warning {
            message: warning.clone(),
        };
        let _ = outbound_tx.send(Outbound::Reliable(encode(&event))).await;
    }
    match state.session.snapshot().await {
        Ok(project) => {
            let event = ServerEvent::State { project };
            let _ = outbound_tx.send(Outbound::Reliable(encode(&event))).await;
        }
        Err(error) => {
            tracing::warn!(error = %error, "initial snapshot unavailable");
        }
    }

    // Event fanout: broadcast -> this socket, with lag recovery
    let fanout_session = state.session.clone();
    let fanout_tx = outbound_tx.clone();
    let fanout = tokio::spawn(async move {
        let mut events = fanout_session.subscribe();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let text = encode(&event);
                    match &event {
                        ServerEvent::State { .. } => {
                            // Snapshots are never dropped
                            if fanout_tx.send(Outbound::Reliable(text)).await.is_err() {
                                break;
                            }
                        }
                        _ => {
                            // Meters/transport: drop under saturation
                            let _ = fanout_tx.try_send(Outbound::Lossy(text));
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event fanout lagged, resyncing snapshot");
                    events = fanout_session.subscribe();
                    if let Ok(project) = fanout_session.snapshot().await {
                        let event = ServerEvent::State { project };
                        if fanout_tx
                            .send(Outbound::Reliable(encode(&event)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Request intake
    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let session = state.session.clone();
        let reply_tx = outbound_tx.clone();
        let in_flight = in_flight.clone();
        tokio::spawn(async move {
            let ack = handle_frame(&session, &in_flight, text.as_str()).await;
            let _ = reply_tx
                .send(Outbound::Reliable(
                    serde_json::to_string(&ack).unwrap_or_default(),
                ))
                .await;
        });
    }

    // Client gone: pending replies die with the writer, enqueued
    // mutations still run to completion in the session worker.
    fanout.abort();
    writer.abort();
    tracing::debug!("control channel closed");
}

/// Decode, guard the correlation id, dispatch, ack.
pub async fn handle_frame(
    session: &SessionHandle,
    in_flight: &Mutex<HashSet<String>>,
    text: &str,
) -> Ack {
    let frame = match ClientFrame::decode(text) {
        Ok(frame) => frame,
        Err(error) => return Ack::err(None, &error),
    };
    let correlation_id = frame.correlation_id.clone();

    if let Some(id) = &correlation_id {
        let mut guard = in_flight.lock().unwrap();
        if !guard.insert(id.clone()) {
            drop(guard);
            return Ack::err(
                correlation_id.clone(),
                &WireError::invalid_request(format!(
                    "correlation id {:?} already has a request in flight",
                    id
                )),
            );
        }
    }

    let result = match frame.request() {
        Ok(request) => session.request(request).await,
        Err(error) => Err(error),
    };

    if let Some(id) = &correlation_id {
        in_flight.lock().unwrap().remove(id);
    }

    match result {
        Ok(data) => Ack::ok_with(correlation_id, data),
        Err(error) => Ack::err(correlation_id, &error),
    }
}

fn encode(event: &ServerEvent) -> String {
    serde_json::to_string(event).unwrap_or_default()
}
