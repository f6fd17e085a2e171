//! Domain errors of the invoice pipeline.

use crate::models::DeliveryStatus;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("Invalid stay: {0}")]
    InvalidStay(String),

    #[error("Client name and NIF are required")]
    MissingClientIdentity,

    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Invoice {invoice_id} has already been processed (status {status})")]
    AlreadyProcessed {
        invoice_id: String,
        status: DeliveryStatus,
    },

    #[error("Invoice number {0} is already taken")]
    DuplicateNumber(String),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<mongodb::error::Error> for InvoiceError {
    fn from(err: mongodb::error::Error) -> Self {
        InvoiceError::Storage(anyhow::Error::new(err))
    }
}

impl From<InvoiceError> for AppError {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::InvalidStay(_) | InvoiceError::MissingClientIdentity => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            InvoiceError::ReservationNotFound(_) | InvoiceError::InvoiceNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            // Caller has to regenerate before submitting again.
            InvoiceError::AlreadyProcessed { .. } => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            InvoiceError::DuplicateNumber(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            InvoiceError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}
