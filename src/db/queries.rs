use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, Interaction, NewBooking, Service, Session, SessionData, Slot, User, Vehicle,
};
use crate::services::text::normalize;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Sessions ──

pub fn get_session(conn: &Connection, id: &str) -> anyhow::Result<Option<Session>> {
    let now = Utc::now().naive_utc().format(DATETIME_FMT).to_string();

    let row = conn
        .query_row(
            "SELECT data, last_activity, expires_at FROM sessions WHERE id = ?1 AND expires_at > ?2",
            params![id, now],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((data_json, last_activity_str, expires_at_str)) = row else {
        return Ok(None);
    };

    let data: SessionData = match serde_json::from_str(&data_json) {
        Ok(data) => data,
        Err(e) => {
            // Unreadable state restarts the conversation instead of wedging it.
            tracing::warn!(session = id, error = %e, "discarding unreadable session");
            return Ok(None);
        }
    };

    let last_activity = NaiveDateTime::parse_from_str(&last_activity_str, DATETIME_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let expires_at = NaiveDateTime::parse_from_str(&expires_at_str, DATETIME_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Some(Session {
        id: id.to_string(),
        state: data.state,
        counters: data.counters,
        registration_started_at: data.registration_started_at,
        service_started_at: data.service_started_at,
        last_activity,
        expires_at,
    }))
}

pub fn save_session(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    let data_json = serde_json::to_string(&session.data())?;
    let last_activity = session.last_activity.format(DATETIME_FMT).to_string();
    let expires_at = session.expires_at.format(DATETIME_FMT).to_string();

    conn.execute(
        "INSERT INTO sessions (id, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           data = excluded.data,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![session.id, data_json, last_activity, expires_at],
    )?;
    Ok(())
}

pub fn expire_old_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let now = Utc::now().naive_utc().format(DATETIME_FMT).to_string();
    let count = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
    Ok(count)
}

// ── Users & Vehicles ──

pub fn find_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, first_name, last_name, email FROM users WHERE email = ?1 ORDER BY id ASC LIMIT 1",
            params![email],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn user_exists(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[allow(clippy::too_many_arguments)]
pub fn insert_user(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
    address: &str,
    country: &str,
    birth_date: &NaiveDate,
    gender: &str,
    password_digest: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO users (first_name, last_name, email, phone, address, country, birth_date, gender, password_digest)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            first_name,
            last_name,
            email,
            phone,
            address,
            country,
            birth_date.format(DATE_FMT).to_string(),
            gender,
            password_digest,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_vehicle_for_user(conn: &Connection, user_id: i64) -> anyhow::Result<Option<Vehicle>> {
    let vehicle = conn
        .query_row(
            "SELECT id, user_id, brand, model, year FROM vehicles WHERE user_id = ?1 ORDER BY id ASC LIMIT 1",
            params![user_id],
            |row| {
                Ok(Vehicle {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    brand: row.get(2)?,
                    model: row.get(3)?,
                    year: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(vehicle)
}

pub fn insert_vehicle(
    conn: &Connection,
    user_id: i64,
    brand: &str,
    model: &str,
    year: i32,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO vehicles (user_id, brand, model, year) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, brand, model, year],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Services ──

pub fn list_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt =
        conn.prepare("SELECT id, name, description, price FROM services ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Service {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            price: row.get(3)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

/// Resolves a normalized catalog name to its service record.
pub fn find_service_by_catalog_name(
    conn: &Connection,
    catalog_name: &str,
) -> anyhow::Result<Option<Service>> {
    let wanted = normalize(catalog_name);
    Ok(list_services(conn)?
        .into_iter()
        .find(|s| normalize(&s.name) == wanted))
}

pub fn service_exists(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM services WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Slots ──

fn parse_slot_row(row: &rusqlite::Row) -> rusqlite::Result<(i64, i64, String, String, String, bool)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get::<_, i32>(5)? != 0,
    ))
}

fn build_slot(raw: (i64, i64, String, String, String, bool)) -> anyhow::Result<Slot> {
    let (id, service_id, date, start, end, reserved) = raw;
    Ok(Slot {
        id,
        service_id,
        date: NaiveDate::parse_from_str(&date, DATE_FMT)?,
        start_time: NaiveTime::parse_from_str(&start, TIME_FMT)?,
        end_time: NaiveTime::parse_from_str(&end, TIME_FMT)?,
        reserved,
    })
}

pub fn count_slots_on(conn: &Connection, service_id: i64, date: &NaiveDate) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM slots WHERE service_id = ?1 AND date = ?2",
        params![service_id, date.format(DATE_FMT).to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Returns false when the slot already existed.
pub fn insert_slot(
    conn: &Connection,
    service_id: i64,
    date: &NaiveDate,
    start: &NaiveTime,
    end: &NaiveTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO slots (service_id, date, start_time, end_time, reserved)
         VALUES (?1, ?2, ?3, ?4, 0)",
        params![
            service_id,
            date.format(DATE_FMT).to_string(),
            start.format(TIME_FMT).to_string(),
            end.format(TIME_FMT).to_string(),
        ],
    )?;
    Ok(count > 0)
}

pub fn get_available_slots(
    conn: &Connection,
    service_id: i64,
    date: &NaiveDate,
) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, date, start_time, end_time, reserved
         FROM slots WHERE service_id = ?1 AND date = ?2 AND reserved = 0
         ORDER BY start_time ASC",
    )?;
    let rows = stmt.query_map(
        params![service_id, date.format(DATE_FMT).to_string()],
        parse_slot_row,
    )?;

    let mut slots = vec![];
    for row in rows {
        slots.push(build_slot(row?)?);
    }
    Ok(slots)
}

pub fn find_available_slot(
    conn: &Connection,
    service_id: i64,
    date: &NaiveDate,
    start: &NaiveTime,
) -> anyhow::Result<Option<Slot>> {
    let raw = conn
        .query_row(
            "SELECT id, service_id, date, start_time, end_time, reserved
             FROM slots WHERE service_id = ?1 AND date = ?2 AND start_time = ?3 AND reserved = 0",
            params![
                service_id,
                date.format(DATE_FMT).to_string(),
                start.format(TIME_FMT).to_string(),
            ],
            parse_slot_row,
        )
        .optional()?;

    raw.map(build_slot).transpose()
}

pub fn get_slot(conn: &Connection, id: i64) -> anyhow::Result<Option<Slot>> {
    let raw = conn
        .query_row(
            "SELECT id, service_id, date, start_time, end_time, reserved FROM slots WHERE id = ?1",
            params![id],
            parse_slot_row,
        )
        .optional()?;

    raw.map(build_slot).transpose()
}

/// Compare-and-set on the reserved flag. Only one caller can win a slot.
pub fn reserve_slot(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET reserved = 1 WHERE id = ?1 AND reserved = 0",
        params![id],
    )?;
    Ok(count == 1)
}

pub fn release_slot(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET reserved = 0 WHERE id = ?1 AND reserved = 1",
        params![id],
    )?;
    Ok(count == 1)
}

// ── Bookings ──

pub fn insert_booking(
    conn: &Connection,
    booking: &NewBooking,
    date_time: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO bookings (user_id, vehicle_id, service_id, slot_id, problem, date_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            booking.user_id,
            booking.vehicle_id,
            booking.service_id,
            booking.slot_id,
            booking.problem,
            date_time.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    let raw = conn
        .query_row(
            "SELECT id, user_id, vehicle_id, service_id, slot_id, problem, date_time
             FROM bookings WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, user_id, vehicle_id, service_id, slot_id, problem, date_time)) = raw else {
        return Ok(None);
    };

    Ok(Some(Booking {
        id,
        user_id,
        vehicle_id,
        service_id,
        slot_id,
        problem,
        date_time: NaiveDateTime::parse_from_str(&date_time, DATETIME_FMT)?,
    }))
}

pub fn count_bookings_for_slot(conn: &Connection, slot_id: i64) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE slot_id = ?1",
        params![slot_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Request Tokens ──

pub fn find_request_token(conn: &Connection, token: &str, kind: &str) -> anyhow::Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT resource_id FROM request_tokens WHERE token = ?1 AND kind = ?2",
            params![token, kind],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn save_request_token(
    conn: &Connection,
    token: &str,
    kind: &str,
    resource_id: i64,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO request_tokens (token, kind, resource_id) VALUES (?1, ?2, ?3)",
        params![token, kind, resource_id],
    )?;
    Ok(())
}

// ── Interactions ──

pub fn insert_interaction(
    conn: &Connection,
    user_id: Option<i64>,
    user_message: &str,
    bot_reply: &str,
    success: bool,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO interactions (user_id, user_message, bot_reply, success) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, user_message, bot_reply, success as i32],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_recent_interactions(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Interaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, user_message, bot_reply, success, created_at
         FROM interactions ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        Ok(Interaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            user_message: row.get(2)?,
            bot_reply: row.get(3)?,
            success: row.get::<_, i32>(4)? != 0,
            created_at: row.get(5)?,
        })
    })?;

    let mut interactions = vec![];
    for row in rows {
        interactions.push(row?);
    }
    Ok(interactions)
}

// ── Timings ──

pub fn insert_registration_timing(
    conn: &Connection,
    user_id: i64,
    started_at: &NaiveDateTime,
    finished_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO registration_timings (user_id, started_at, finished_at) VALUES (?1, ?2, ?3)",
        params![
            user_id,
            started_at.format(DATETIME_FMT).to_string(),
            finished_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn insert_service_timing(
    conn: &Connection,
    booking_id: i64,
    started_at: &NaiveDateTime,
    finished_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO service_timings (booking_id, started_at, finished_at) VALUES (?1, ?2, ?3)",
        params![
            booking_id,
            started_at.format(DATETIME_FMT).to_string(),
            finished_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}
