use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;

pub const SLOT_MINUTES: i64 = 60;

/// Opening hours as `(start hour, end hour)`; every slot starts and ends inside one.
pub const WINDOWS: [(u32, u32); 2] = [(9, 12), (13, 18)];

/// Start times of the slots offered on any working day.
pub fn slot_starts() -> Vec<NaiveTime> {
    let mut starts = vec![];
    for (open, close) in WINDOWS {
        let (Some(mut current), Some(end)) = (
            NaiveTime::from_hms_opt(open, 0, 0),
            NaiveTime::from_hms_opt(close, 0, 0),
        ) else {
            continue;
        };
        while current < end {
            starts.push(current);
            current += Duration::minutes(SLOT_MINUTES);
        }
    }
    starts
}

/// Creates the day's slots for every date in `[from, to]` that has none yet
/// for this service. Returns how many slots were created.
pub fn generate_slots(
    conn: &Connection,
    service_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<usize> {
    let mut created = 0;

    for date in from.iter_days().take_while(|d| *d <= to) {
        if queries::count_slots_on(conn, service_id, &date)? > 0 {
            tracing::debug!(service_id, %date, "slots already exist, skipping day");
            continue;
        }

        for start in slot_starts() {
            let end = start + Duration::minutes(SLOT_MINUTES);
            if queries::insert_slot(conn, service_id, &date, &start, &end)? {
                created += 1;
            }
        }
    }

    tracing::info!(service_id, %from, %to, created, "generated slots");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn starts(conn: &Connection, service_id: i64, date: &str) -> Vec<String> {
        queries::get_available_slots(conn, service_id, &d(date))
            .unwrap()
            .iter()
            .map(|s| s.start_time.format("%H:%M").to_string())
            .collect()
    }

    #[test]
    fn test_single_day_produces_eight_slots() {
        let conn = setup_db();
        let created = generate_slots(&conn, 1, d("2024-01-01"), d("2024-01-01")).unwrap();
        assert_eq!(created, 8);
        assert_eq!(
            starts(&conn, 1, "2024-01-01"),
            vec!["09:00", "10:00", "11:00", "13:00", "14:00", "15:00", "16:00", "17:00"]
        );

        let slots = queries::get_available_slots(&conn, 1, &d("2024-01-01")).unwrap();
        assert!(slots.iter().all(|s| !s.reserved));
        assert!(slots
            .iter()
            .all(|s| s.end_time == s.start_time + Duration::minutes(60)));
    }

    #[test]
    fn test_regeneration_does_not_duplicate() {
        let conn = setup_db();
        generate_slots(&conn, 1, d("2024-01-01"), d("2024-01-01")).unwrap();
        let again = generate_slots(&conn, 1, d("2024-01-01"), d("2024-01-01")).unwrap();
        assert_eq!(again, 0);
        assert_eq!(queries::count_slots_on(&conn, 1, &d("2024-01-01")).unwrap(), 8);
    }

    #[test]
    fn test_day_with_reserved_slot_is_skipped() {
        let conn = setup_db();
        generate_slots(&conn, 1, d("2024-01-01"), d("2024-01-01")).unwrap();
        for slot in queries::get_available_slots(&conn, 1, &d("2024-01-01")).unwrap() {
            queries::reserve_slot(&conn, slot.id).unwrap();
        }

        let created = generate_slots(&conn, 1, d("2024-01-01"), d("2024-01-01")).unwrap();
        assert_eq!(created, 0);
        assert!(starts(&conn, 1, "2024-01-01").is_empty());
    }

    #[test]
    fn test_range_is_inclusive_and_per_service() {
        let conn = setup_db();
        let created = generate_slots(&conn, 2, d("2024-02-28"), d("2024-03-01")).unwrap();
        assert_eq!(created, 24);
        assert_eq!(starts(&conn, 2, "2024-02-29").len(), 8);
        assert!(starts(&conn, 1, "2024-02-29").is_empty());
    }

    #[test]
    fn test_inverted_range_creates_nothing() {
        let conn = setup_db();
        let created = generate_slots(&conn, 1, d("2024-01-02"), d("2024-01-01")).unwrap();
        assert_eq!(created, 0);
    }
}
