//! Invoice record store.
//!
//! The store owns persistence and conditional status writes. Pricing,
//! numbering and provider failover live in the builder and orchestrator.

use crate::error::InvoiceError;
use crate::models::{compare_numbers, DeliveryStatus, DeliveryUpdate, Invoice, InvoiceFilter};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Persist a new invoice. Fails with `DuplicateNumber` if its number is
    /// already in use.
    async fn insert(&self, invoice: &Invoice) -> Result<(), InvoiceError>;

    async fn find_by_id(&self, invoice_id: &str) -> Result<Option<Invoice>, InvoiceError>;

    /// Highest invoice number issued so far, by numeric value.
    async fn last_number(&self) -> Result<Option<String>, InvoiceError>;

    /// Write a delivery outcome. With `expected` set, the write only happens
    /// if the stored status still matches; `None` is returned when nothing
    /// was written.
    async fn save_delivery(
        &self,
        invoice_id: &str,
        expected: Option<DeliveryStatus>,
        update: &DeliveryUpdate,
    ) -> Result<Option<Invoice>, InvoiceError>;

    /// Matching invoices, newest first.
    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, InvoiceError>;

    async fn list_for_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Vec<Invoice>, InvoiceError>;

    async fn health_check(&self) -> Result<(), InvoiceError>;
}

/// Process-local store used in tests and database-less development runs.
#[derive(Default)]
pub struct InMemoryInvoiceStore {
    invoices: RwLock<Vec<Invoice>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.invoices.read().await.is_empty()
    }
}

fn newest_first(mut invoices: Vec<Invoice>) -> Vec<Invoice> {
    invoices.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| compare_numbers(&b.number, &a.number))
    });
    invoices
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, invoice: &Invoice) -> Result<(), InvoiceError> {
        let mut invoices = self.invoices.write().await;
        if invoices.iter().any(|i| i.number == invoice.number) {
            return Err(InvoiceError::DuplicateNumber(invoice.number.clone()));
        }
        invoices.push(invoice.clone());
        Ok(())
    }

    async fn find_by_id(&self, invoice_id: &str) -> Result<Option<Invoice>, InvoiceError> {
        let invoices = self.invoices.read().await;
        Ok(invoices.iter().find(|i| i.invoice_id == invoice_id).cloned())
    }

    async fn last_number(&self) -> Result<Option<String>, InvoiceError> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .iter()
            .map(|i| i.number.as_str())
            .max_by(|a, b| compare_numbers(a, b))
            .map(str::to_string))
    }

    async fn save_delivery(
        &self,
        invoice_id: &str,
        expected: Option<DeliveryStatus>,
        update: &DeliveryUpdate,
    ) -> Result<Option<Invoice>, InvoiceError> {
        let mut invoices = self.invoices.write().await;
        let Some(invoice) = invoices.iter_mut().find(|i| i.invoice_id == invoice_id) else {
            return Ok(None);
        };
        if expected.is_some_and(|status| invoice.status != status) {
            return Ok(None);
        }
        update.apply(invoice, Utc::now());
        Ok(Some(invoice.clone()))
    }

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, InvoiceError> {
        let invoices = self.invoices.read().await;
        Ok(newest_first(
            invoices.iter().filter(|i| filter.matches(i)).cloned().collect(),
        ))
    }

    async fn list_for_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Vec<Invoice>, InvoiceError> {
        let invoices = self.invoices.read().await;
        Ok(newest_first(
            invoices
                .iter()
                .filter(|i| i.reservation_id == reservation_id)
                .cloned()
                .collect(),
        ))
    }

    async fn health_check(&self) -> Result<(), InvoiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artifacts, LineItem};
    use crate::services::builder::next_number;
    use mongodb::bson::oid::ObjectId;
    use rust_decimal::Decimal;

    fn invoice(number: &str) -> Invoice {
        let now = Utc::now();
        Invoice {
            invoice_id: ObjectId::new().to_hex(),
            number: number.to_string(),
            issue_date: now,
            client_name: "Ana".to_string(),
            client_nif: "12345678Z".to_string(),
            client_address: None,
            reservation_id: ObjectId::new().to_hex(),
            items: vec![LineItem {
                description: "Estancia".to_string(),
                quantity: 1,
                unit_price: Decimal::from(80),
                vat: Decimal::from(10),
            }],
            subtotal: Decimal::from(80),
            vat_total: Decimal::from(8),
            grand_total: Decimal::from(88),
            pdf_url: None,
            xml_url: None,
            qr_url: None,
            status: DeliveryStatus::Pending,
            narrative: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn last_number_is_numeric_past_six_digits() {
        let store = InMemoryInvoiceStore::new();
        store.insert(&invoice("999999")).await.unwrap();

        let next = next_number(store.last_number().await.unwrap().as_deref()).unwrap();
        assert_eq!(next, "1000000");
        store.insert(&invoice(&next)).await.unwrap();

        assert_eq!(store.last_number().await.unwrap().as_deref(), Some("1000000"));
        let after = next_number(store.last_number().await.unwrap().as_deref()).unwrap();
        assert_eq!(after, "1000001");
        store.insert(&invoice(&after)).await.unwrap();
    }

    #[tokio::test]
    async fn guarded_write_skips_invoice_in_other_status() {
        let store = InMemoryInvoiceStore::new();
        let mut sent = invoice("000001");
        sent.status = DeliveryStatus::Sent;
        store.insert(&sent).await.unwrap();

        let update = DeliveryUpdate {
            status: DeliveryStatus::Error,
            narrative: "late".to_string(),
            artifacts: Artifacts::default(),
        };
        let written = store
            .save_delivery(&sent.invoice_id, Some(DeliveryStatus::Pending), &update)
            .await
            .unwrap();

        assert!(written.is_none());
        let stored = store.find_by_id(&sent.invoice_id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Sent);
    }
}
