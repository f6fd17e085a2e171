//! Read-only views of booking-site reservations.

use crate::error::InvoiceError;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Billing facts taken from a reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationSnapshot {
    pub reservation_id: String,
    pub guest_first_name: String,
    pub guest_last_name: String,
    pub guest_email: Option<String>,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub total_price: Decimal,
}

impl ReservationSnapshot {
    pub fn guest_name(&self) -> String {
        format!("{} {}", self.guest_first_name, self.guest_last_name)
            .trim()
            .to_string()
    }

    pub fn summary(&self) -> ReservationSummary {
        ReservationSummary {
            check_in: self.check_in,
            check_out: self.check_out,
            total_price: self.total_price,
        }
    }
}

/// Reservation fields embedded in invoice listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSummary {
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
}

/// Shape of a document in the booking site's `reservations` collection.
/// Only the fields billing needs are mapped.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub check_in: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub check_out: DateTime<Utc>,
    pub total_price: f64,
    pub guest_info: GuestInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfo {
    pub first_name: String,
    pub last_name: String,
}

impl ReservationDocument {
    /// Fails when `totalPrice` is not a finite amount, rather than billing
    /// the stay at zero.
    pub fn into_snapshot(self) -> Result<ReservationSnapshot, InvoiceError> {
        let reservation_id = self.id.to_hex();
        let total_price = Decimal::from_f64(self.total_price).ok_or_else(|| {
            InvoiceError::InvalidStay(format!(
                "reservation {} has an unusable total price {}",
                reservation_id, self.total_price
            ))
        })?;

        Ok(ReservationSnapshot {
            reservation_id,
            guest_first_name: self.guest_info.first_name,
            guest_last_name: self.guest_info.last_name,
            guest_email: self.user_email,
            check_in: self.check_in,
            check_out: self.check_out,
            total_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime as BsonDateTime};

    #[test]
    fn booking_site_document_maps_to_snapshot() {
        let id = ObjectId::new();
        let document = doc! {
            "_id": id,
            "userId": "firebase-uid",
            "userEmail": "guest@example.com",
            "checkIn": BsonDateTime::from_millis(1_741_600_800_000),
            "checkOut": BsonDateTime::from_millis(1_741_860_000_000),
            "guests": 2,
            "totalPrice": 240.0,
            "status": "confirmed",
            "guestInfo": { "firstName": "Lucía", "lastName": "Fernández", "dni": "1234" },
        };

        let parsed: ReservationDocument = mongodb::bson::from_document(document).unwrap();
        let snapshot = parsed.into_snapshot().unwrap();

        assert_eq!(snapshot.reservation_id, id.to_hex());
        assert_eq!(snapshot.guest_name(), "Lucía Fernández");
        assert_eq!(snapshot.total_price, Decimal::from(240));
        assert_eq!(snapshot.guest_email.as_deref(), Some("guest@example.com"));
    }

    #[test]
    fn non_finite_total_price_is_rejected() {
        for total in [f64::NAN, f64::INFINITY, 1e300] {
            let document = doc! {
                "_id": ObjectId::new(),
                "checkIn": BsonDateTime::from_millis(1_741_600_800_000),
                "checkOut": BsonDateTime::from_millis(1_741_860_000_000),
                "totalPrice": total,
                "guestInfo": { "firstName": "Lucía", "lastName": "Fernández" },
            };

            let parsed: ReservationDocument = mongodb::bson::from_document(document).unwrap();
            assert!(
                matches!(parsed.into_snapshot(), Err(InvoiceError::InvalidStay(_))),
                "accepted {}",
                total
            );
        }
    }
}
