use std::sync::Mutex;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::{GuestId, ReservationId};
use butler_core::time::now_iso8601;

use crate::error::{PersistenceError, Result};
use crate::models::{Reservation, ReservationStatus};

pub struct ReservationRepository {
    conn: Mutex<Connection>,
}

impl ReservationRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Upsert by `confirmation_number` (the PMS's stable key).
    pub fn upsert(
        &self,
        confirmation_number: &str,
        guest_id: &GuestId,
        status: ReservationStatus,
        arrival_date: &str,
        departure_date: &str,
        room_number: Option<&str>,
    ) -> Result<Reservation> {
        if departure_date < arrival_date {
            return Err(PersistenceError::Conflict(
                "departureDate must be >= arrivalDate".to_string(),
            ));
        }
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let existing: Option<String> = db
            .query_row(
                "SELECT id FROM reservations WHERE confirmation_number = ?1",
                params![confirmation_number],
                |r| r.get(0),
            )
            .optional()?;
        let id = existing.unwrap_or_else(|| ReservationId::new().to_string());
        db.execute(
            "INSERT INTO reservations
                (id, confirmation_number, guest_id, status, arrival_date, departure_date,
                 room_number, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(confirmation_number) DO UPDATE SET
                status = excluded.status,
                arrival_date = excluded.arrival_date,
                departure_date = excluded.departure_date,
                room_number = excluded.room_number,
                updated_at = excluded.updated_at",
            params![
                id,
                confirmation_number,
                guest_id.as_str(),
                status.to_string(),
                arrival_date,
                departure_date,
                room_number,
                now
            ],
        )?;
        self.get(&ReservationId::from(id.as_str()))?
            .ok_or_else(|| PersistenceError::NotFound(format!("reservation {confirmation_number}")))
    }

    pub fn get(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, confirmation_number, guest_id, status, arrival_date, departure_date,
                    room_number, created_at, updated_at
             FROM reservations WHERE id = ?1",
            params![id.as_str()],
            row_to_reservation,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Active (`in_house`) or nearest upcoming (`confirmed`, soonest
    /// arrival) reservation for a guest — feeds `GuestContext` hydration.
    pub fn active_or_upcoming_for_guest(&self, guest_id: &GuestId) -> Result<Option<Reservation>> {
        let db = self.conn.lock().unwrap();
        if let Some(r) = db
            .query_row(
                "SELECT id, confirmation_number, guest_id, status, arrival_date, departure_date,
                        room_number, created_at, updated_at
                 FROM reservations WHERE guest_id = ?1 AND status = 'in_house'
                 ORDER BY arrival_date DESC LIMIT 1",
                params![guest_id.as_str()],
                row_to_reservation,
            )
            .optional()?
        {
            return Ok(Some(r));
        }
        db.query_row(
            "SELECT id, confirmation_number, guest_id, status, arrival_date, departure_date,
                    room_number, created_at, updated_at
             FROM reservations WHERE guest_id = ?1 AND status = 'confirmed'
             ORDER BY arrival_date ASC LIMIT 1",
            params![guest_id.as_str()],
            row_to_reservation,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Reservations arriving on `date` (`YYYY-MM-DD`) — feeds the
    /// automation scheduler's `before_arrival`/`after_arrival` time triggers.
    pub fn list_by_arrival_date(&self, date: &str) -> Result<Vec<Reservation>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, confirmation_number, guest_id, status, arrival_date, departure_date,
                    room_number, created_at, updated_at
             FROM reservations WHERE arrival_date = ?1",
        )?;
        let rows = stmt
            .query_map(params![date], row_to_reservation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Reservations departing on `date` (`YYYY-MM-DD`) — feeds the
    /// `before_departure`/`after_departure` time triggers.
    pub fn list_by_departure_date(&self, date: &str) -> Result<Vec<Reservation>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, confirmation_number, guest_id, status, arrival_date, departure_date,
                    room_number, created_at, updated_at
             FROM reservations WHERE departure_date = ?1",
        )?;
        let rows = stmt
            .query_map(params![date], row_to_reservation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_for_guest(&self, guest_id: &GuestId) -> Result<Vec<Reservation>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, confirmation_number, guest_id, status, arrival_date, departure_date,
                    room_number, created_at, updated_at
             FROM reservations WHERE guest_id = ?1 ORDER BY arrival_date DESC",
        )?;
        let rows = stmt
            .query_map(params![guest_id.as_str()], row_to_reservation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_reservation(row: &Row) -> rusqlite::Result<Reservation> {
    let status_raw: String = row.get(3)?;
    Ok(Reservation {
        id: ReservationId::from(row.get::<_, String>(0)?),
        confirmation_number: row.get(1)?,
        guest_id: GuestId::from(row.get::<_, String>(2)?),
        status: ReservationStatus::from_str(&status_raw).unwrap_or(ReservationStatus::Confirmed),
        arrival_date: row.get(4)?,
        departure_date: row.get(5)?,
        room_number: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> ReservationRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ReservationRepository::new(conn)
    }

    #[test]
    fn rejects_departure_before_arrival() {
        let repo = repo();
        let guest_id = GuestId::new();
        let err = repo
            .upsert(
                "CONF1",
                &guest_id,
                ReservationStatus::Confirmed,
                "2026-08-10",
                "2026-08-05",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Conflict(_)));
    }

    #[test]
    fn upsert_by_confirmation_number_updates_in_place() {
        let repo = repo();
        let guest_id = GuestId::new();
        let first = repo
            .upsert(
                "CONF2",
                &guest_id,
                ReservationStatus::Confirmed,
                "2026-08-01",
                "2026-08-05",
                None,
            )
            .unwrap();
        let second = repo
            .upsert(
                "CONF2",
                &guest_id,
                ReservationStatus::InHouse,
                "2026-08-01",
                "2026-08-05",
                Some("204"),
            )
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, ReservationStatus::InHouse);
        assert_eq!(second.room_number.as_deref(), Some("204"));
    }

    #[test]
    fn lists_reservations_by_arrival_and_departure_date() {
        let repo = repo();
        let guest_id = GuestId::new();
        repo.upsert("CONF3", &guest_id, ReservationStatus::Confirmed, "2026-08-10", "2026-08-14", None)
            .unwrap();
        assert_eq!(repo.list_by_arrival_date("2026-08-10").unwrap().len(), 1);
        assert_eq!(repo.list_by_departure_date("2026-08-14").unwrap().len(), 1);
        assert!(repo.list_by_arrival_date("2026-08-11").unwrap().is_empty());
    }
}
