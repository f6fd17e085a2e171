//! Request and response bodies of the invoice HTTP API.
//!
//! Field names are camelCase to match the booking site's admin pages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::models::{DeliveryStatus, Invoice, InvoiceFilter, IssuedWithin, LineItem, ReservationSummary};
use crate::services::{ClientIdentity, InvoiceListing, InvoiceStats, SubmissionResult};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, message = "reservationId is required"))]
    pub reservation_id: String,
    #[validate(length(min = 1, max = 200, message = "clientName must be between 1 and 200 characters"))]
    pub client_name: String,
    #[serde(rename = "clientNIF")]
    #[validate(length(min = 1, max = 20, message = "clientNIF must be between 1 and 20 characters"))]
    pub client_nif: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub client_address: Option<String>,
}

impl CreateInvoiceRequest {
    pub fn client(&self) -> ClientIdentity {
        ClientIdentity {
            name: self.client_name.clone(),
            nif: self.client_nif.clone(),
            address: self.client_address.clone(),
        }
    }
}

/// Query string of `GET /invoices`. `all` or an empty value disables a
/// filter, as the admin page sends.
#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub since: Option<String>,
}

fn selected(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl ListInvoicesParams {
    pub fn to_filter(&self, now: DateTime<Utc>) -> Result<InvoiceFilter, AppError> {
        let status = selected(self.status.as_deref())
            .map(|s| s.parse::<DeliveryStatus>())
            .transpose()
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        let window = match selected(self.since.as_deref()) {
            None => None,
            Some("today") => Some(IssuedWithin::Today),
            Some("week") => Some(IssuedWithin::Week),
            Some("month") => Some(IssuedWithin::Month),
            Some(other) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "unknown date window '{}', expected today, week or month",
                    other
                )))
            }
        };

        Ok(InvoiceFilter {
            search: selected(self.search.as_deref()).map(str::to_string),
            status,
            issued_since: window.map(|w| w.since(now)),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemResponse {
    pub description: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub vat: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            vat: item.vat,
            total: item.total(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: String,
    pub number: String,
    pub date: DateTime<Utc>,
    pub client_name: String,
    #[serde(rename = "clientNIF")]
    pub client_nif: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    pub reservation_id: String,
    pub items: Vec<LineItemResponse>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub vat_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            items: invoice.items.iter().map(LineItemResponse::from).collect(),
            id: invoice.invoice_id,
            number: invoice.number,
            date: invoice.issue_date,
            client_name: invoice.client_name,
            client_nif: invoice.client_nif,
            client_address: invoice.client_address,
            reservation_id: invoice.reservation_id,
            subtotal: invoice.subtotal,
            vat_total: invoice.vat_total,
            grand_total: invoice.grand_total,
            status: invoice.status,
            narrative: invoice.narrative,
            pdf_url: invoice.pdf_url,
            xml_url: invoice.xml_url,
            qr_url: invoice.qr_url,
            reservation: None,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

impl From<InvoiceListing> for InvoiceResponse {
    fn from(listing: InvoiceListing) -> Self {
        let mut response = InvoiceResponse::from(listing.invoice);
        response.reservation = listing.reservation;
        response
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub total: usize,
}

impl InvoiceListResponse {
    pub fn new(invoices: Vec<InvoiceResponse>) -> Self {
        Self {
            total: invoices.len(),
            invoices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitInvoiceResponse {
    pub status: DeliveryStatus,
    pub narrative: String,
}

impl From<SubmissionResult> for SubmitInvoiceResponse {
    fn from(result: SubmissionResult) -> Self {
        Self {
            status: result.status,
            narrative: result.narrative,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegenerateInvoiceResponse {
    pub status: DeliveryStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatsResponse {
    pub total: u64,
    pub pending: u64,
    pub sent: u64,
    pub error: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_amount: Decimal,
}

impl From<InvoiceStats> for InvoiceStatsResponse {
    fn from(stats: InvoiceStats) -> Self {
        Self {
            total: stats.total,
            pending: stats.pending,
            sent: stats.sent,
            error: stats.error,
            total_amount: stats.total_amount,
            monthly_amount: stats.monthly_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(status: Option<&str>, since: Option<&str>) -> ListInvoicesParams {
        ListInvoicesParams {
            search: Some("  ".to_string()),
            status: status.map(str::to_string),
            since: since.map(str::to_string),
        }
    }

    #[test]
    fn all_and_blank_disable_filters() {
        let now = Utc::now();
        let filter = params(Some("all"), Some("")).to_filter(now).unwrap();
        assert!(filter.status.is_none());
        assert!(filter.issued_since.is_none());
        assert!(filter.search.is_none());
    }

    #[test]
    fn status_and_window_are_parsed() {
        let now = Utc.with_ymd_and_hms(2025, 8, 20, 15, 30, 0).unwrap();
        let filter = params(Some("error"), Some("week")).to_filter(now).unwrap();
        assert_eq!(filter.status, Some(DeliveryStatus::Error));
        assert_eq!(
            filter.issued_since,
            Some(Utc.with_ymd_and_hms(2025, 8, 13, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert!(params(Some("archived"), None).to_filter(Utc::now()).is_err());
        assert!(params(None, Some("year")).to_filter(Utc::now()).is_err());
    }

    #[test]
    fn create_request_uses_booking_site_field_names() {
        let request: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "reservationId": "66a1f0c2e4b0a1b2c3d4e5f6",
            "clientName": "Ana Ruiz",
            "clientNIF": "12345678Z"
        }))
        .unwrap();
        assert_eq!(request.client_nif, "12345678Z");
        assert!(request.client_address.is_none());
        assert!(request.validate().is_ok());
    }
}
