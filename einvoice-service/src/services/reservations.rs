use crate::error::InvoiceError;
use crate::models::{ReservationSnapshot, ReservationSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Read-only access to reservations owned by the booking site.
#[async_trait]
pub trait ReservationReader: Send + Sync {
    async fn snapshot(
        &self,
        reservation_id: &str,
    ) -> Result<Option<ReservationSnapshot>, InvoiceError>;

    /// Summaries keyed by reservation id. Unknown ids are omitted.
    async fn summaries(
        &self,
        reservation_ids: &[String],
    ) -> Result<HashMap<String, ReservationSummary>, InvoiceError>;
}

#[derive(Default)]
pub struct InMemoryReservationReader {
    reservations: RwLock<HashMap<String, ReservationSnapshot>>,
}

impl InMemoryReservationReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, snapshot: ReservationSnapshot) {
        self.reservations
            .write()
            .await
            .insert(snapshot.reservation_id.clone(), snapshot);
    }
}

#[async_trait]
impl ReservationReader for InMemoryReservationReader {
    async fn snapshot(
        &self,
        reservation_id: &str,
    ) -> Result<Option<ReservationSnapshot>, InvoiceError> {
        Ok(self.reservations.read().await.get(reservation_id).cloned())
    }

    async fn summaries(
        &self,
        reservation_ids: &[String],
    ) -> Result<HashMap<String, ReservationSummary>, InvoiceError> {
        let reservations = self.reservations.read().await;
        Ok(reservation_ids
            .iter()
            .filter_map(|id| reservations.get(id).map(|r| (id.clone(), r.summary())))
            .collect())
    }
}
