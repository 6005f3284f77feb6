//! Media upload endpoint
//!
//! `POST /media/upload?filename=<name>` with the raw bytes as body.
//! Success and rejection both answer 200 with `{ok, ...}` so clients
//! handle one response shape; the error code rides in the body.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::GatewayState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

pub async fn upload(
    State(state): State<GatewayState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Json<Value> {
    match state
        .session
        .upload_media(query.filename, body.to_vec())
        .await
    {
        Ok(response) => Json(serde_json::to_value(&response).unwrap_or_else(|_| {
            json!({ "ok": false, "error": "io_error", "message": "serialization failed" })
        })),
        Err(error) => Json(json!({
            "ok": false,
            "error": error.code.as_str(),
            "message": error.message,
        })),
    }
}
