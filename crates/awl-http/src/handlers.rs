//! Volume server request handlers.
//!
//! Both handlers extract the locator from the request path, build a
//! [`RequestContext`] from the headers, hand the request to the
//! [`VolumeNode`](awl_engine::VolumeNode), and map the outcome with
//! [`crate::response`].

use std::collections::HashMap;

use awl_engine::{EngineError, ReplicationMode, RequestContext, UploadRequest};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Uri, header};
use axum::response::Response;
use http_body_util::LengthLimitError;

use crate::AppState;
use crate::error::ApiError;
use crate::response::{delete_response, write_response};

/// Query parameters shared by writes and deletes.
struct MutationParams {
    name: Option<String>,
    chunk_manifest: bool,
    ts: Option<u64>,
    mode: ReplicationMode,
    jwt: Option<String>,
}

impl MutationParams {
    fn parse(query: &HashMap<String, String>) -> Result<Self, ApiError> {
        let ts = query
            .get("ts")
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid ts: {v:?}")))
            })
            .transpose()?;
        let mode = match query.get("type").map(String::as_str) {
            Some("replicate") => ReplicationMode::Replica,
            _ => ReplicationMode::Originate,
        };

        Ok(Self {
            name: query.get("name").filter(|v| !v.is_empty()).cloned(),
            chunk_manifest: query.get("cm").is_some_and(|v| v == "true"),
            ts,
            mode,
            jwt: query.get("jwt").filter(|v| !v.is_empty()).cloned(),
        })
    }
}

/// Build the caller context from the `Authorization` header (or the `jwt`
/// parameter) and the forwarding headers.
fn request_context(headers: &HeaderMap, jwt: Option<String>) -> RequestContext {
    let mut ctx = RequestContext::anonymous();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());
    if let Some(token) = bearer.or(jwt) {
        ctx = ctx.with_token(token);
    }

    let remote = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = remote {
        ctx = ctx.with_remote_addr(addr);
    }
    ctx
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// -----------------------------------------------------------------------
// POST|PUT /{locator}: write a needle
// -----------------------------------------------------------------------

/// Store the request body under the locator in the path.
pub(crate) async fn write_handler(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let params = MutationParams::parse(&query)?;
    let ctx = request_context(&headers, params.jwt);
    state.node.authorize(uri.path(), &ctx)?;
    let limit = state.node.config().max_upload_bytes;

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(declared) = content_length
        && declared > limit
    {
        return Err(EngineError::SizeLimitExceeded {
            size: declared,
            limit,
        }
        .into());
    }

    // Read one byte past the limit so that an oversized body is detected.
    let read_limit = usize::try_from(limit.saturating_add(1)).unwrap_or(usize::MAX);
    let body = axum::body::to_bytes(body, read_limit)
        .await
        .map_err(|e| body_error(&e, limit))?;

    let req = UploadRequest {
        path: uri.path().to_string(),
        body,
        content_type: header_string(&headers, header::CONTENT_TYPE),
        content_encoding: header_string(&headers, header::CONTENT_ENCODING),
        content_length,
        name: params.name,
        is_chunk_manifest: params.chunk_manifest,
        ts: params.ts,
    };

    let outcome = state.node.handle_write(req, params.mode, &ctx).await?;
    Ok(write_response(outcome))
}

fn body_error(err: &axum::Error, limit: u64) -> ApiError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return EngineError::SizeLimitExceeded {
                size: limit.saturating_add(1),
                limit,
            }
            .into();
        }
        source = e.source();
    }
    EngineError::MalformedObject(format!("failed to read body: {err}")).into()
}

// -----------------------------------------------------------------------
// DELETE /{locator}: delete a needle
// -----------------------------------------------------------------------

/// Delete the needle named by the path, cascading through chunk manifests.
pub(crate) async fn delete_handler(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = MutationParams::parse(&query)?;
    let ctx = request_context(&headers, params.jwt);

    let outcome = state
        .node
        .handle_delete(uri.path(), params.ts, params.mode, &ctx)
        .await?;
    Ok(delete_response(outcome))
}
