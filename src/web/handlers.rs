//! HTTP API handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::AppState;
use crate::canon::canonicalize_url;
use crate::db::{decode_page_token, CheckResultPage};

const DEFAULT_TARGET_LIMIT: usize = 10;
const MAX_TARGET_LIMIT: i64 = 100;
const DEFAULT_RESULT_LIMIT: usize = 50;
const MAX_RESULT_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTargetResponse {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub async fn handle_create_target(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateTargetRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid JSON"),
    };

    if req.url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "url is required");
    }

    let canonical = match canonicalize_url(&req.url) {
        Ok(canonical) => canonical,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid URL: {err}"))
        }
    };

    let parsed = match Url::parse(&canonical) {
        Ok(parsed) => parsed,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid URL"),
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return error_response(StatusCode::BAD_REQUEST, "URL must use HTTP or HTTPS scheme");
    }
    let host = parsed.host_str().unwrap_or_default().to_string();

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.is_empty());

    match state
        .store
        .create_target(&req.url, &canonical, &host, idempotency_key)
    {
        Ok((target, is_new)) => {
            let status = if is_new {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(CreateTargetResponse {
                    id: target.id,
                    url: target.url,
                    created_at: target.created_at,
                }),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, url = %req.url, "failed to create target");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTargetsQuery {
    pub host: Option<String>,
    pub limit: Option<i64>,
    pub page_token: Option<String>,
}

pub async fn handle_list_targets(
    State(state): State<AppState>,
    query: Result<Query<ListTargetsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid query parameters"),
    };

    let limit = match query.limit {
        None => DEFAULT_TARGET_LIMIT,
        Some(limit) if (1..=MAX_TARGET_LIMIT).contains(&limit) => limit as usize,
        Some(_) => {
            return error_response(StatusCode::BAD_REQUEST, "limit must be between 1 and 100")
        }
    };

    let cursor = match query.page_token.as_deref() {
        None | Some("") => None,
        Some(token) => match decode_page_token(token) {
            Some(cursor) => Some(cursor),
            None => return error_response(StatusCode::BAD_REQUEST, "invalid page_token"),
        },
    };

    let host = query.host.as_deref().filter(|host| !host.is_empty());
    match state.store.list_targets(host, limit, cursor.as_ref()) {
        Ok(page) => Json(page).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to list targets");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub since: Option<String>,
    pub limit: Option<i64>,
}

pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    query: Result<Query<ResultsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid query parameters"),
    };

    let since = match query.since.as_deref() {
        None | Some("") => None,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(since) => Some(since.with_timezone(&Utc)),
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid since parameter, expected RFC3339 format",
                )
            }
        },
    };

    let limit = match query.limit {
        None => DEFAULT_RESULT_LIMIT,
        Some(limit) if (1..=MAX_RESULT_LIMIT).contains(&limit) => limit as usize,
        Some(_) => {
            return error_response(StatusCode::BAD_REQUEST, "limit must be between 1 and 1000")
        }
    };

    match state.store.get_check_results(&target_id, since, limit) {
        Ok(items) => Json(CheckResultPage { items }).into_response(),
        Err(err) => {
            tracing::error!(error = %err, target_id = %target_id, "failed to get check results");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub async fn handle_healthz() -> &'static str {
    "OK"
}
