//! `PMSAdapter` — the hotel's property-management system as source of
//! truth for reservations (spec §6, glossary "PMS").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::ConnectionTestResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedGuest {
    pub external_id: String,
    pub source: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub vip_tier: Option<String>,
    pub loyalty_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedReservation {
    pub confirmation_number: String,
    pub guest: NormalizedGuest,
    pub status: String,
    pub arrival_date: String,
    pub departure_date: String,
    pub room_number: Option<String>,
}

#[async_trait]
pub trait PmsAdapter: Send + Sync {
    fn app_id(&self) -> &str;

    /// Reservations touched since `since` (ISO-8601), for the periodic sync
    /// that upserts into `reservations`/`guests`.
    async fn get_modified_reservations(&self, since: &str) -> Result<Vec<NormalizedReservation>>;

    async fn test_connection(&self) -> Result<ConnectionTestResult>;
}
