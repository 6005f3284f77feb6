//! Wire gateway for TheStuu
//!
//! Exposes the session orchestrator over two surfaces: a full-duplex
//! WebSocket control channel (`GET /ws`) and a request/reply media upload
//! endpoint (`POST /media/upload`). JSON lives at this edge only; the
//! session side works with typed requests and events.

pub mod upload;
pub mod ws;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use stu_session::SessionHandle;

pub use ws::{handle_frame, OUTBOUND_QUEUE};

/// Shared state across routes
#[derive(Clone)]
pub struct GatewayState {
    pub session: SessionHandle,
    /// Advertised in `engine:ready`
    pub engine_port: u16,
}

/// Build the gateway router
pub fn router(session: SessionHandle, engine_port: u16) -> Router {
    let state = GatewayState {
        session,
        engine_port,
    };

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/media/upload", post(upload::upload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process stops
pub async fn serve(session: SessionHandle, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(session, addr.port());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "gateway listening");
    axum::serve(listener, app).await
}
