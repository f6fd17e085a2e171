pub mod admin;
pub mod builder;
pub mod database;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod providers;
pub mod reservations;
pub mod store;

pub use admin::{InvoiceListing, InvoiceQueries, InvoiceStats};
pub use builder::{ClientIdentity, InvoiceBuilder, HOTEL_VAT_RATE};
pub use database::{InvoiceDb, MongoInvoiceStore, MongoReservationReader};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{ConfirmationNotifier, HttpNotifier, InvoiceNotice, LogNotifier};
pub use orchestrator::{SubmissionOrchestrator, SubmissionResult};
pub use providers::{
    build_providers, http_client, AeatProvider, EInvoiceProvider, FacturaeProvider,
    InvoicePayload, MockProvider, ProviderError, VerifactiProvider,
};
pub use reservations::{InMemoryReservationReader, ReservationReader};
pub use store::{InMemoryInvoiceStore, InvoiceStore};
