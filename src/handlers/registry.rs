use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::{NewBooking, NewUser, NewVehicle};
use crate::services::backend::IDEMPOTENCY_HEADER;
use crate::services::registry;
use crate::state::AppState;

fn request_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(user): Json<NewUser>,
) -> Result<Json<Value>, AppError> {
    let token = request_token(&headers);
    let db = state.db();
    let id = registry::register_user(&db, &state.config.secret_key, &user, token.as_deref())?;
    Ok(Json(json!({ "usuario": id })))
}

pub async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(vehicle): Json<NewVehicle>,
) -> Result<Json<Value>, AppError> {
    let token = request_token(&headers);
    let db = state.db();
    let id = registry::register_vehicle(&db, &vehicle, token.as_deref())?;
    Ok(Json(json!({ "vehiculo": id })))
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(booking): Json<NewBooking>,
) -> Result<Json<Value>, AppError> {
    let token = request_token(&headers);
    let db = state.db();
    let id = registry::register_booking(&db, &booking, token.as_deref())?;
    Ok(Json(json!({ "reserva": id })))
}
