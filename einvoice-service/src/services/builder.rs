//! Turns a reservation into a priced, pending invoice.

use crate::error::InvoiceError;
use crate::models::{DeliveryStatus, Invoice, LineItem, ReservationSnapshot};
use crate::services::metrics::record_invoice_created;
use crate::services::reservations::ReservationReader;
use crate::services::store::InvoiceStore;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Reduced Spanish VAT rate for accommodation, in percent.
pub const HOTEL_VAT_RATE: u32 = 10;

const NUMBER_WIDTH: usize = 6;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Tax identity of the party being billed.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub name: String,
    pub nif: String,
    pub address: Option<String>,
}

impl ClientIdentity {
    fn validated(self) -> Result<Self, InvoiceError> {
        let name = self.name.trim().to_string();
        let nif = self.nif.trim().to_string();
        if name.is_empty() || nif.is_empty() {
            return Err(InvoiceError::MissingClientIdentity);
        }
        let address = self
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Ok(Self { name, nif, address })
    }
}

pub struct InvoiceBuilder {
    store: Arc<dyn InvoiceStore>,
    reservations: Arc<dyn ReservationReader>,
}

impl InvoiceBuilder {
    pub fn new(store: Arc<dyn InvoiceStore>, reservations: Arc<dyn ReservationReader>) -> Self {
        Self {
            store,
            reservations,
        }
    }

    /// Build and persist a pending invoice for `reservation_id`.
    ///
    /// The number is the stored maximum plus one, read without a lock; two
    /// concurrent calls can pick the same number and the second insert then
    /// fails with `DuplicateNumber`.
    #[tracing::instrument(skip(self, client), fields(reservation_id = %reservation_id))]
    pub async fn create(
        &self,
        reservation_id: &str,
        client: ClientIdentity,
    ) -> Result<Invoice, InvoiceError> {
        let client = client.validated()?;

        let reservation = self
            .reservations
            .snapshot(reservation_id)
            .await?
            .ok_or_else(|| InvoiceError::ReservationNotFound(reservation_id.to_string()))?;

        let last = self.store.last_number().await?;
        let number = next_number(last.as_deref())?;

        let invoice = price_stay(&reservation, client, number, Utc::now())?;
        self.store.insert(&invoice).await?;

        record_invoice_created();
        tracing::info!(
            invoice_id = %invoice.invoice_id,
            number = %invoice.number,
            grand_total = %invoice.grand_total,
            "Invoice created"
        );

        Ok(invoice)
    }
}

/// Successor of the highest issued number, zero-padded to six digits. Past
/// 999999 the number simply grows wider.
pub fn next_number(last: Option<&str>) -> Result<String, InvoiceError> {
    let next = match last {
        None => 1,
        Some(number) => {
            let current: u64 = number.trim().parse().map_err(|_| {
                InvoiceError::Storage(anyhow::anyhow!(
                    "stored invoice number '{}' is not numeric",
                    number
                ))
            })?;
            current + 1
        }
    };
    Ok(format!("{:0width$}", next, width = NUMBER_WIDTH))
}

/// Whole nights billed for a stay; a partial day counts as a night.
pub fn nights(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> Result<u32, InvoiceError> {
    let millis = (check_out - check_in).num_milliseconds();
    if millis <= 0 {
        return Err(InvoiceError::InvalidStay(format!(
            "check-out {} must be after check-in {}",
            check_out.to_rfc3339(),
            check_in.to_rfc3339()
        )));
    }
    let nights = (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    u32::try_from(nights)
        .map_err(|_| InvoiceError::InvalidStay(format!("stay of {} nights is too long", nights)))
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Price a stay as a single line item with flat reduced VAT.
pub fn price_stay(
    reservation: &ReservationSnapshot,
    client: ClientIdentity,
    number: String,
    issued_at: DateTime<Utc>,
) -> Result<Invoice, InvoiceError> {
    let nights = nights(reservation.check_in, reservation.check_out)?;
    let vat_rate = Decimal::from(HOTEL_VAT_RATE);

    let items = vec![LineItem {
        description: format!("Estancia en habitación - {}", reservation.guest_name()),
        quantity: nights,
        unit_price: reservation.total_price / Decimal::from(nights),
        vat: vat_rate,
    }];

    let subtotal = round_money(items.iter().map(LineItem::total).sum());
    let vat_total = round_money(subtotal * vat_rate / Decimal::ONE_HUNDRED);
    let grand_total = subtotal + vat_total;

    Ok(Invoice {
        invoice_id: ObjectId::new().to_hex(),
        number,
        issue_date: issued_at,
        client_name: client.name,
        client_nif: client.nif,
        client_address: client.address,
        reservation_id: reservation.reservation_id.clone(),
        items,
        subtotal,
        vat_total,
        grand_total,
        pdf_url: None,
        xml_url: None,
        qr_url: None,
        status: DeliveryStatus::Pending,
        narrative: None,
        created_at: issued_at,
        updated_at: issued_at,
    })
}
