//! Domain models for einvoice-service.

mod invoice;
mod reservation;

pub use invoice::{
    compare_numbers, Artifacts, DeliveryStatus, DeliveryUpdate, Invoice, InvoiceFilter,
    IssuedWithin, LineItem,
};
pub use reservation::{GuestInfo, ReservationDocument, ReservationSnapshot, ReservationSummary};
