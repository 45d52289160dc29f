//! Record creation behind `/usuarios`, `/vehiculos` and `/reservas`.

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha1::Sha1;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Gender, NewBooking, NewUser, NewVehicle};

const USER: &str = "user";
const VEHICLE: &str = "vehicle";
const BOOKING: &str = "booking";

/// Keyed, salted digest of a password, stored as `salt$digest`.
pub fn password_digest(secret: &str, password: &str, salt: &str) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid digest key: {e}"))?;
    mac.update(salt.as_bytes());
    mac.update(password.as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(format!("{salt}${digest}"))
}

pub fn verify_password(secret: &str, password: &str, stored: &str) -> bool {
    let Some((salt, _)) = stored.split_once('$') else {
        return false;
    };
    password_digest(secret, password, salt)
        .map(|computed| computed == stored)
        .unwrap_or(false)
}

pub fn register_user(
    conn: &Connection,
    secret: &str,
    user: &NewUser,
    token: Option<&str>,
) -> Result<i64, AppError> {
    if let Some(id) = replayed(conn, token, USER)? {
        return Ok(id);
    }

    if user.email.trim().is_empty() || user.first_name.trim().is_empty() {
        return Err(AppError::BadRequest("name and email are required".to_string()));
    }
    let birth_date = NaiveDate::parse_from_str(&user.birth_date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid birth date: {}", user.birth_date)))?;
    let gender = Gender::parse(&user.gender)
        .ok_or_else(|| AppError::BadRequest(format!("invalid gender: {}", user.gender)))?;

    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = password_digest(secret, &user.password, &salt)?;

    let id = queries::insert_user(
        conn,
        &user.first_name,
        &user.last_name,
        &user.email,
        &user.phone,
        &user.address,
        &user.country,
        &birth_date,
        gender.as_str(),
        &digest,
    )?;
    remember(conn, token, USER, id)?;

    tracing::info!(user_id = id, "registered user");
    Ok(id)
}

pub fn register_vehicle(
    conn: &Connection,
    vehicle: &NewVehicle,
    token: Option<&str>,
) -> Result<i64, AppError> {
    if let Some(id) = replayed(conn, token, VEHICLE)? {
        return Ok(id);
    }

    if !queries::user_exists(conn, vehicle.user_id)? {
        return Err(AppError::NotFound(format!("user {}", vehicle.user_id)));
    }

    let id = queries::insert_vehicle(
        conn,
        vehicle.user_id,
        &vehicle.brand,
        &vehicle.model,
        vehicle.year,
    )?;
    remember(conn, token, VEHICLE, id)?;

    tracing::info!(vehicle_id = id, user_id = vehicle.user_id, "registered vehicle");
    Ok(id)
}

pub fn register_booking(
    conn: &Connection,
    booking: &NewBooking,
    token: Option<&str>,
) -> Result<i64, AppError> {
    if let Some(id) = replayed(conn, token, BOOKING)? {
        return Ok(id);
    }

    let date_time = NaiveDateTime::parse_from_str(&booking.date_time, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| AppError::BadRequest(format!("invalid date time: {}", booking.date_time)))?;

    if !queries::service_exists(conn, booking.service_id)? {
        return Err(AppError::NotFound(format!("service {}", booking.service_id)));
    }
    if queries::get_slot(conn, booking.slot_id)?.is_none() {
        return Err(AppError::NotFound(format!("slot {}", booking.slot_id)));
    }

    let id = queries::insert_booking(conn, booking, &date_time)?;
    remember(conn, token, BOOKING, id)?;

    tracing::info!(booking_id = id, slot_id = booking.slot_id, "registered booking");
    Ok(id)
}

fn replayed(conn: &Connection, token: Option<&str>, kind: &str) -> anyhow::Result<Option<i64>> {
    let Some(token) = token else {
        return Ok(None);
    };
    let existing = queries::find_request_token(conn, token, kind)?;
    if let Some(id) = existing {
        tracing::info!(kind, resource_id = id, "replayed request token");
    }
    Ok(existing)
}

fn remember(conn: &Connection, token: Option<&str>, kind: &str, id: i64) -> anyhow::Result<()> {
    if let Some(token) = token {
        queries::save_request_token(conn, token, kind, id)?;
    }
    Ok(())
}
