//! Mapping mutation outcomes to HTTP responses, and the `ETag` header.

use awl_engine::{DeleteOutcome, WriteOutcome};
use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Body of a `201 Created` write response.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    /// Stored file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Uncompressed payload size.
    pub size: u64,
    /// Content fingerprint.
    #[serde(rename = "eTag")]
    pub etag: String,
    /// Stored mime type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// Body of a delete response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Logical size removed; zero when nothing was found.
    pub size: u64,
}

/// `204 No Content` for an unchanged re-upload, `201 Created` otherwise.
/// Both carry the `ETag` header.
pub fn write_response(outcome: WriteOutcome) -> Response {
    let mut headers = HeaderMap::new();
    set_etag(&mut headers, &outcome.etag);

    if outcome.is_duplicate {
        return (StatusCode::NO_CONTENT, headers).into_response();
    }

    let body = WriteResponse {
        name: outcome.name,
        size: outcome.size,
        etag: outcome.etag,
        mime: outcome.mime,
    };
    (StatusCode::CREATED, headers, Json(body)).into_response()
}

/// `202 Accepted` with the removed size, or `404` with size zero.
pub fn delete_response(outcome: DeleteOutcome) -> Response {
    let status = match outcome {
        DeleteOutcome::Deleted { .. } => StatusCode::ACCEPTED,
        DeleteOutcome::NotFound => StatusCode::NOT_FOUND,
    };
    (
        status,
        Json(DeleteResponse {
            size: outcome.size(),
        }),
    )
        .into_response()
}

/// Set the `ETag` header, quoting the value unless it is already quoted.
///
/// An empty fingerprint sets nothing.
pub fn set_etag(headers: &mut HeaderMap, etag: &str) {
    if etag.is_empty() {
        return;
    }
    let quoted = if is_quoted(etag) {
        etag.to_string()
    } else {
        format!("\"{etag}\"")
    };
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }
}

/// Read the `ETag` header with one pair of surrounding quotes removed.
pub fn get_etag(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::ETAG)?.to_str().ok()?;
    let unquoted = if is_quoted(raw) {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    Some(unquoted.to_string())
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('"') && s.ends_with('"')
}
