//! Invoice model for einvoice-service.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Delivery status of an invoice towards the tax authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Sent,
    Error,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "error" => Ok(DeliveryStatus::Error),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// One billed concept. For a stay, quantity is the number of nights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    /// VAT percentage applied to this line.
    #[serde(with = "rust_decimal::serde::float")]
    pub vat: Decimal,
}

impl LineItem {
    pub fn total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// PDF, XML and QR links returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_url: Option<String>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.pdf_url.is_none() && self.xml_url.is_none() && self.qr_url.is_none()
    }
}

/// Invoice document as persisted in the `invoices` collection.
///
/// Field names follow the booking site's schema so documents it wrote are
/// read back unchanged: the id is the document `_id`, the reservation is an
/// ObjectId reference and the delivery state lives in `aeatStatus` and
/// `aeatResponse`. Money is stored as plain numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Hex form of the document `_id`.
    #[serde(
        rename = "_id",
        with = "mongodb::bson::serde_helpers::hex_string_as_object_id"
    )]
    pub invoice_id: String,
    /// Zero-padded sequence number, at least six digits. Never changes once
    /// assigned.
    pub number: String,
    #[serde(
        rename = "date",
        with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub issue_date: DateTime<Utc>,
    pub client_name: String,
    #[serde(rename = "clientNIF")]
    pub client_nif: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(
        rename = "reservation",
        with = "mongodb::bson::serde_helpers::hex_string_as_object_id"
    )]
    pub reservation_id: String,
    pub items: Vec<LineItem>,
    /// Taxable base. Stored as `total`.
    #[serde(rename = "total", with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub vat_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_url: Option<String>,
    #[serde(rename = "aeatStatus", default)]
    pub status: DeliveryStatus,
    #[serde(rename = "aeatResponse", default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Orders invoice numbers by numeric value. Zero-padded numbers of equal
/// width compare as strings; a wider number is always larger.
pub fn compare_numbers(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Outcome written back to an invoice by a submission or a regenerate.
///
/// Artifact fields that are `None` are cleared in storage, so a new outcome
/// never inherits links from an earlier attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    pub narrative: String,
    pub artifacts: Artifacts,
}

impl DeliveryUpdate {
    pub fn apply(&self, invoice: &mut Invoice, now: DateTime<Utc>) {
        invoice.status = self.status;
        invoice.narrative = Some(self.narrative.clone());
        invoice.set_artifacts(self.artifacts.clone());
        invoice.updated_at = now;
    }
}

impl Invoice {
    pub fn artifacts(&self) -> Artifacts {
        Artifacts {
            pdf_url: self.pdf_url.clone(),
            xml_url: self.xml_url.clone(),
            qr_url: self.qr_url.clone(),
        }
    }

    pub fn set_artifacts(&mut self, artifacts: Artifacts) {
        self.pdf_url = artifacts.pdf_url;
        self.xml_url = artifacts.xml_url;
        self.qr_url = artifacts.qr_url;
    }
}

/// Relative window used by the admin listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuedWithin {
    Today,
    Week,
    Month,
}

impl IssuedWithin {
    /// Lower bound of the window, counted back from midnight UTC of `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            IssuedWithin::Today => today,
            IssuedWithin::Week => today - Duration::days(7),
            IssuedWithin::Month => today - Duration::days(30),
        }
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    /// Case-insensitive match on number, client name or NIF.
    pub search: Option<String>,
    pub status: Option<DeliveryStatus>,
    pub issued_since: Option<DateTime<Utc>>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(status) = self.status {
            if invoice.status != status {
                return false;
            }
        }
        if let Some(since) = self.issued_since {
            if invoice.issue_date < since {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                invoice.number.to_lowercase().contains(&term)
                    || invoice.client_name.to_lowercase().contains(&term)
                    || invoice.client_nif.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}
