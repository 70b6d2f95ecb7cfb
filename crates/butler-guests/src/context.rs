//! Guest-context service: joins identity across phone/email to a guest and
//! hydrates the active-or-upcoming reservation (spec §4.1 steps 1 and 3).

use std::sync::Arc;

use butler_persistence::models::{Guest, Reservation};
use butler_persistence::Repositories;

use crate::phone;

/// `(guest?, reservation?)` resolved for one inbound message (spec glossary:
/// `GuestContext`).
#[derive(Debug, Clone, Default)]
pub struct GuestContext {
    pub guest: Option<Guest>,
    pub reservation: Option<Reservation>,
}

/// Resolves identity and hydrates reservation context ahead of response
/// generation. Holds only a `Repositories` handle — no knowledge of
/// channels, the responder, or the escalation engine (spec §9's "break
/// cyclic references with constructor injection").
pub struct GuestContextService {
    repos: Arc<Repositories>,
}

impl GuestContextService {
    pub fn new(repos: Arc<Repositories>) -> Self {
        Self { repos }
    }

    /// Step 1 (phone-bearing channels): upsert the guest by canonical
    /// phone, naming a first-time guest from the last four digits.
    pub fn resolve_by_phone(&self, raw_phone: &str) -> Option<Guest> {
        let canonical = phone::normalize(raw_phone)?;
        let placeholder = phone::last_four(&canonical);
        match self.repos.guests.upsert_by_phone(&canonical, &placeholder) {
            Ok(guest) => Some(guest),
            Err(e) => {
                tracing::warn!(error = %e, phone = %canonical, "guest resolution by phone failed");
                None
            }
        }
    }

    /// Step 1 (email channel): upsert the guest by lowercased address.
    pub fn resolve_by_email(&self, raw_email: &str) -> Option<Guest> {
        let lowered = raw_email.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        match self.repos.guests.upsert_by_email(&lowered) {
            Ok(guest) => Some(guest),
            Err(e) => {
                tracing::warn!(error = %e, email = %lowered, "guest resolution by email failed");
                None
            }
        }
    }

    /// Step 3: locate any active (`in_house`) or nearest upcoming
    /// (`confirmed`) reservation for the guest and assemble the full
    /// `GuestContext`. Failures degrade to a context with no reservation
    /// rather than failing the pipeline (spec §4.1: "degraded context, not
    /// pipeline failure").
    pub fn hydrate(&self, guest: Option<Guest>) -> GuestContext {
        let Some(guest) = guest else {
            return GuestContext::default();
        };
        let reservation = self
            .repos
            .reservations
            .active_or_upcoming_for_guest(&guest.id)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, guest_id = %guest.id, "reservation hydration failed");
                None
            });
        GuestContext {
            guest: Some(guest),
            reservation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_persistence::models::ReservationStatus;

    fn service() -> GuestContextService {
        let repos = Arc::new(Repositories::open_in_memory().unwrap());
        GuestContextService::new(repos)
    }

    #[test]
    fn first_contact_names_guest_from_last_four_digits() {
        let svc = service();
        let guest = svc.resolve_by_phone("+15551112222").unwrap();
        assert_eq!(guest.last_name.as_deref(), Some("2222"));
        assert_eq!(guest.phone.as_deref(), Some("+15551112222"));
    }

    #[test]
    fn repeat_contact_resolves_to_the_same_guest() {
        let svc = service();
        let a = svc.resolve_by_phone("555-111-2222").unwrap();
        let b = svc.resolve_by_phone("+15551112222").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn web_chat_has_no_guest_and_hydrates_to_empty_context() {
        let svc = service();
        let ctx = svc.hydrate(None);
        assert!(ctx.guest.is_none());
        assert!(ctx.reservation.is_none());
    }

    #[test]
    fn hydrates_in_house_reservation_over_upcoming() {
        let svc = service();
        let guest = svc.resolve_by_phone("+15559998888").unwrap();
        svc.repos
            .reservations
            .upsert(
                "CONFX",
                &guest.id,
                ReservationStatus::InHouse,
                "2026-07-20",
                "2026-07-30",
                Some("301"),
            )
            .unwrap();
        let ctx = svc.hydrate(Some(guest));
        assert_eq!(
            ctx.reservation.unwrap().status,
            ReservationStatus::InHouse
        );
    }
}
