use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::services::conversation;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "tallerbot_session";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub message: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Response {
    // Explicit id wins over the cookie; a new session gets a fresh id.
    let known = payload
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| session_from_cookie(&headers));
    let is_new = known.is_none();
    let session_id = known.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let reply = match conversation::process_message(&state, &session_id, &payload.message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "chat turn failed");
            conversation::FALLBACK.to_string()
        }
    };

    let mut response = Json(ChatResponse { message: reply }).into_response();
    if is_new {
        let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "could not build session cookie"),
        }
    }
    response
}

fn session_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; tallerbot_session=abc-123; lang=es"),
        );
        assert_eq!(session_from_cookie(&headers).as_deref(), Some("abc-123"));

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("tallerbot_session="));
        assert!(session_from_cookie(&empty).is_none());
        assert!(session_from_cookie(&HeaderMap::new()).is_none());
    }
}
