//! HTTP route handlers: health, logs, scan and direct status set.
//!
//! Workflow outcomes, including validation and database failures, are
//! reported in the JSON payload with HTTP 200. Only unmatched routes get a
//! non-200 status.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rfidgate_core::{ScanResult, TagStatus, WorkflowError, NO_TAG_MESSAGE};
use serde_json::{json, Value};
use tracing::error;

use super::state::AppState;
use super::{json_error, MAX_LOG_ENTRIES};

/// Message for a `/status` request whose `new_status` is missing or not 0/1.
const INVALID_STATUS_MESSAGE: &str = "Invalid status value";

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /logs
pub(crate) async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let limit = log_limit(query.get("limit").map(String::as_str));

    let response = match state.workflow.recent_logs(limit).await {
        Ok(entries) => json!({ "success": true, "data": entries }),
        Err(e) => {
            error!("Failed to read logs: {}", e);
            json!({ "success": false, "error": store_detail(&e) })
        }
    };
    (StatusCode::OK, Json(response))
}

/// GET /scan?rfid_data=...
pub(crate) async fn handle_scan_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let tag_id = query.get("rfid_data").map(String::as_str).unwrap_or("");
    scan(&state, tag_id).await
}

/// POST /scan with `{"rfid_data": "..."}`
pub(crate) async fn handle_scan_post(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    let tag_id = parse_body(&body)
        .as_ref()
        .and_then(|v| v.get("rfid_data"))
        .and_then(text_field)
        .unwrap_or_default();
    scan(&state, &tag_id).await
}

async fn scan(state: &AppState, tag_id: &str) -> (StatusCode, Json<Value>) {
    let response = match state.workflow.process_scan(tag_id).await {
        Ok(result) => scan_body(&result),
        Err(WorkflowError::Validation(msg)) => json!({ "error": msg }),
        Err(e) => {
            error!("Scan failed: {}", e);
            json!({ "error": format!("Database error: {}", store_detail(&e)) })
        }
    };
    (StatusCode::OK, Json(response))
}

/// POST /status with `{"rfid_data": "...", "new_status": 0|1}`
pub(crate) async fn handle_status(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    let response = match parse_status_request(&body) {
        Ok((tag_id, new_status)) => match state.workflow.set_status(&tag_id, new_status).await {
            Ok(_) => json!({ "success": true, "message": "Status updated successfully" }),
            Err(WorkflowError::Validation(msg)) => json!({ "success": false, "error": msg }),
            Err(e) => {
                error!("Status update failed: {}", e);
                json!({ "success": false, "error": store_detail(&e) })
            }
        },
        Err(msg) => json!({ "success": false, "error": msg }),
    };
    (StatusCode::OK, Json(response))
}

/// Response body for a processed scan. `current_status` appears only for
/// registered tags.
fn scan_body(result: &ScanResult) -> Value {
    let message = if result.found {
        "RFID found and status updated"
    } else {
        "RFID NOT FOUND"
    };
    let mut body = json!({
        "found": result.found,
        "rfid_data": result.tag_id,
        "status": result.new_status,
        "message": message,
        "time_logged": result.timestamp,
    });
    if let Some(previous) = result.previous_status {
        body["current_status"] = json!(previous);
    }
    body
}

/// Clamp the requested log limit to `MAX_LOG_ENTRIES`. Missing, zero or
/// unparsable values mean the full cap.
fn log_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|s| s.trim().parse::<usize>().ok()) {
        Some(n) if n > 0 => n.min(MAX_LOG_ENTRIES),
        _ => MAX_LOG_ENTRIES,
    }
}

/// Malformed JSON is treated the same as an empty body.
fn parse_body(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

/// Accept strings and bare numbers as tag ids.
fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_status_request(body: &[u8]) -> Result<(String, TagStatus), &'static str> {
    let parsed = parse_body(body).ok_or(NO_TAG_MESSAGE)?;

    let tag_id = parsed
        .get("rfid_data")
        .and_then(text_field)
        .filter(|s| !s.trim().is_empty())
        .ok_or(NO_TAG_MESSAGE)?;

    let new_status = parsed
        .get("new_status")
        .cloned()
        .and_then(|v| serde_json::from_value::<TagStatus>(v).ok())
        .ok_or(INVALID_STATUS_MESSAGE)?;

    Ok((tag_id, new_status))
}

/// Storage detail without the workflow's own prefix.
fn store_detail(e: &WorkflowError) -> String {
    match e {
        WorkflowError::Store(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
