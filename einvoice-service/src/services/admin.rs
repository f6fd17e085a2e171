//! Read-side operations behind the back-office invoice pages.

use crate::error::InvoiceError;
use crate::models::{DeliveryStatus, Invoice, InvoiceFilter, ReservationSummary};
use crate::services::reservations::ReservationReader;
use crate::services::store::InvoiceStore;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceStats {
    pub total: u64,
    pub pending: u64,
    pub sent: u64,
    pub error: u64,
    /// Sum of grand totals over every invoice.
    pub total_amount: Decimal,
    /// Sum of grand totals issued in the current calendar month.
    pub monthly_amount: Decimal,
}

impl InvoiceStats {
    pub fn collect<'a>(invoices: impl IntoIterator<Item = &'a Invoice>, now: DateTime<Utc>) -> Self {
        let mut stats = Self::default();
        for invoice in invoices {
            stats.total += 1;
            match invoice.status {
                DeliveryStatus::Pending => stats.pending += 1,
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Error => stats.error += 1,
            }
            stats.total_amount += invoice.grand_total;
            if invoice.issue_date.year() == now.year() && invoice.issue_date.month() == now.month() {
                stats.monthly_amount += invoice.grand_total;
            }
        }
        stats
    }
}

/// An invoice together with the stay it bills, when the reservation still
/// exists.
#[derive(Debug, Clone)]
pub struct InvoiceListing {
    pub invoice: Invoice,
    pub reservation: Option<ReservationSummary>,
}

pub struct InvoiceQueries {
    store: Arc<dyn InvoiceStore>,
    reservations: Arc<dyn ReservationReader>,
}

impl InvoiceQueries {
    pub fn new(store: Arc<dyn InvoiceStore>, reservations: Arc<dyn ReservationReader>) -> Self {
        Self {
            store,
            reservations,
        }
    }

    /// Matching invoices, newest first, each with its reservation summary.
    pub async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceListing>, InvoiceError> {
        let invoices = self.store.list(filter).await?;
        self.with_reservations(invoices).await
    }

    pub async fn get(&self, invoice_id: &str) -> Result<InvoiceListing, InvoiceError> {
        let invoice = self
            .store
            .find_by_id(invoice_id)
            .await?
            .ok_or_else(|| InvoiceError::InvoiceNotFound(invoice_id.to_string()))?;
        let mut listing = self.with_reservations(vec![invoice]).await?;
        listing
            .pop()
            .ok_or_else(|| InvoiceError::InvoiceNotFound(invoice_id.to_string()))
    }

    pub async fn for_reservation(&self, reservation_id: &str) -> Result<Vec<Invoice>, InvoiceError> {
        self.store.list_for_reservation(reservation_id).await
    }

    pub async fn stats(&self) -> Result<InvoiceStats, InvoiceError> {
        let invoices = self.store.list(&InvoiceFilter::default()).await?;
        Ok(InvoiceStats::collect(&invoices, Utc::now()))
    }

    async fn with_reservations(
        &self,
        invoices: Vec<Invoice>,
    ) -> Result<Vec<InvoiceListing>, InvoiceError> {
        let mut ids: Vec<String> = invoices.iter().map(|i| i.reservation_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let summaries: HashMap<String, ReservationSummary> =
            self.reservations.summaries(&ids).await?;

        Ok(invoices
            .into_iter()
            .map(|invoice| {
                let reservation = summaries.get(&invoice.reservation_id).cloned();
                InvoiceListing {
                    invoice,
                    reservation,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineItem;
    use chrono::TimeZone;

    fn invoice(number: &str, status: DeliveryStatus, total: i64, issued: DateTime<Utc>) -> Invoice {
        Invoice {
            invoice_id: format!("id-{}", number),
            number: number.to_string(),
            issue_date: issued,
            client_name: "Ana Ruiz".to_string(),
            client_nif: "12345678Z".to_string(),
            client_address: None,
            reservation_id: "r-1".to_string(),
            items: vec![LineItem {
                description: "Estancia".to_string(),
                quantity: 1,
                unit_price: Decimal::from(total),
                vat: Decimal::from(10),
            }],
            subtotal: Decimal::from(total),
            vat_total: Decimal::ZERO,
            grand_total: Decimal::from(total),
            pdf_url: None,
            xml_url: None,
            qr_url: None,
            status,
            narrative: None,
            created_at: issued,
            updated_at: issued,
        }
    }

    #[test]
    fn stats_count_statuses_and_month_to_date() {
        let now = Utc.with_ymd_and_hms(2025, 8, 20, 12, 0, 0).unwrap();
        let this_month = Utc.with_ymd_and_hms(2025, 8, 2, 9, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2025, 7, 31, 23, 0, 0).unwrap();
        let last_year = Utc.with_ymd_and_hms(2024, 8, 10, 9, 0, 0).unwrap();

        let invoices = vec![
            invoice("000001", DeliveryStatus::Sent, 100, last_year),
            invoice("000002", DeliveryStatus::Error, 50, last_month),
            invoice("000003", DeliveryStatus::Pending, 30, this_month),
            invoice("000004", DeliveryStatus::Sent, 20, now),
        ];

        let stats = InvoiceStats::collect(&invoices, now);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.total_amount, Decimal::from(200));
        assert_eq!(stats.monthly_amount, Decimal::from(50));
    }
}
