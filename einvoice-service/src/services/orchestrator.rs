//! Submission state machine: `pending` → `sent` | `error`, and back to
//! `pending` through an explicit regenerate.

use crate::error::InvoiceError;
use crate::models::{Artifacts, DeliveryStatus, DeliveryUpdate, Invoice};
use crate::services::metrics::{record_provider_call, record_submission};
use crate::services::notifier::{ConfirmationNotifier, InvoiceNotice};
use crate::services::providers::{EInvoiceProvider, InvoicePayload, ProviderError};
use crate::services::store::InvoiceStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const REGENERATED_NARRATIVE: &str = "Regenerated for retry";
pub const NO_PROVIDER_NARRATIVE: &str = "No e-invoice provider configured";

/// Final status and narrative of one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub status: DeliveryStatus,
    pub narrative: String,
}

struct Attempted {
    provider: &'static str,
    error: ProviderError,
}

pub struct SubmissionOrchestrator {
    store: Arc<dyn InvoiceStore>,
    providers: Vec<Arc<dyn EInvoiceProvider>>,
    attempt_timeout: Duration,
    notifier: Arc<dyn ConfirmationNotifier>,
}

impl SubmissionOrchestrator {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        providers: Vec<Arc<dyn EInvoiceProvider>>,
        attempt_timeout: Duration,
        notifier: Arc<dyn ConfirmationNotifier>,
    ) -> Self {
        Self {
            store,
            providers,
            attempt_timeout,
            notifier,
        }
    }

    /// Try each provider in order until one accepts the invoice.
    ///
    /// Only `pending` invoices are submitted. The outcome is written with a
    /// status guard, so a concurrent submit that finished first wins and
    /// this call reports `AlreadyProcessed`.
    #[tracing::instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn submit(&self, invoice_id: &str) -> Result<SubmissionResult, InvoiceError> {
        let invoice = self.pending_invoice(invoice_id).await?;
        let payload = InvoicePayload::from(&invoice);

        let (update, provider) = match self.deliver(&payload).await {
            Ok((provider, artifacts)) => (
                DeliveryUpdate {
                    status: DeliveryStatus::Sent,
                    narrative: format!("Sent via {}", provider),
                    artifacts,
                },
                Some(provider),
            ),
            Err(last) => {
                let narrative = match last {
                    Some(Attempted { provider, error }) => format!(
                        "All providers failed; last error from {}: {}",
                        provider, error
                    ),
                    None => NO_PROVIDER_NARRATIVE.to_string(),
                };
                (
                    DeliveryUpdate {
                        status: DeliveryStatus::Error,
                        narrative,
                        artifacts: Artifacts::default(),
                    },
                    None,
                )
            }
        };

        let Some(saved) = self
            .store
            .save_delivery(invoice_id, Some(DeliveryStatus::Pending), &update)
            .await?
        else {
            // Another submit or a regenerate moved the invoice meanwhile.
            let current = self.store.find_by_id(invoice_id).await?;
            return Err(match current {
                Some(invoice) => InvoiceError::AlreadyProcessed {
                    invoice_id: invoice_id.to_string(),
                    status: invoice.status,
                },
                None => InvoiceError::InvoiceNotFound(invoice_id.to_string()),
            });
        };

        record_submission(update.status.as_str());
        match update.status {
            DeliveryStatus::Sent => tracing::info!(
                number = %saved.number,
                narrative = %update.narrative,
                "Invoice submitted"
            ),
            _ => tracing::error!(
                number = %saved.number,
                narrative = %update.narrative,
                "Invoice submission failed"
            ),
        }

        if let Some(provider) = provider {
            self.notify(&saved, provider);
        }

        Ok(SubmissionResult {
            status: saved.status,
            narrative: update.narrative,
        })
    }

    /// Reset an invoice to `pending` and drop its artifacts. Any prior
    /// status is accepted; the overwritten outcome is logged.
    #[tracing::instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn regenerate(&self, invoice_id: &str) -> Result<DeliveryStatus, InvoiceError> {
        let previous = self
            .store
            .find_by_id(invoice_id)
            .await?
            .ok_or_else(|| InvoiceError::InvoiceNotFound(invoice_id.to_string()))?;

        tracing::warn!(
            number = %previous.number,
            previous_status = %previous.status,
            previous_narrative = previous.narrative.as_deref().unwrap_or(""),
            pdf_url = previous.pdf_url.as_deref().unwrap_or(""),
            xml_url = previous.xml_url.as_deref().unwrap_or(""),
            qr_url = previous.qr_url.as_deref().unwrap_or(""),
            "Regenerating invoice; previous delivery outcome discarded"
        );

        let update = DeliveryUpdate {
            status: DeliveryStatus::Pending,
            narrative: REGENERATED_NARRATIVE.to_string(),
            artifacts: Artifacts::default(),
        };

        let saved = self
            .store
            .save_delivery(invoice_id, None, &update)
            .await?
            .ok_or_else(|| InvoiceError::InvoiceNotFound(invoice_id.to_string()))?;

        Ok(saved.status)
    }

    async fn pending_invoice(&self, invoice_id: &str) -> Result<Invoice, InvoiceError> {
        let invoice = self
            .store
            .find_by_id(invoice_id)
            .await?
            .ok_or_else(|| InvoiceError::InvoiceNotFound(invoice_id.to_string()))?;

        if invoice.status != DeliveryStatus::Pending {
            return Err(InvoiceError::AlreadyProcessed {
                invoice_id: invoice_id.to_string(),
                status: invoice.status,
            });
        }
        Ok(invoice)
    }

    /// First success wins. On exhaustion returns the last failure, or `None`
    /// when no provider is configured.
    async fn deliver(
        &self,
        payload: &InvoicePayload,
    ) -> Result<(&'static str, Artifacts), Option<Attempted>> {
        let mut last = None;

        for provider in &self.providers {
            let name = provider.name();
            let outcome = tokio::time::timeout(self.attempt_timeout, provider.submit(payload))
                .await
                .unwrap_or_else(|_| Err(ProviderError::Timeout(self.attempt_timeout)));

            match outcome {
                Ok(artifacts) => {
                    record_provider_call(name, "success");
                    tracing::info!(
                        provider = %name,
                        number = %payload.number,
                        missing_artifacts = artifacts.is_empty(),
                        "Provider accepted invoice"
                    );
                    return Ok((name, artifacts));
                }
                Err(error) => {
                    record_provider_call(name, error.kind());
                    tracing::warn!(
                        provider = %name,
                        number = %payload.number,
                        error = %error,
                        "Provider attempt failed, trying next"
                    );
                    last = Some(Attempted {
                        provider: name,
                        error,
                    });
                }
            }
        }

        Err(last)
    }

    fn notify(&self, invoice: &Invoice, provider: &str) {
        let notifier = Arc::clone(&self.notifier);
        let notice = InvoiceNotice::new(invoice, provider);
        tokio::spawn(async move {
            if let Err(e) = notifier.invoice_sent(&notice).await {
                tracing::warn!(
                    number = %notice.number,
                    error = %e,
                    "Failed to send invoice confirmation"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationSnapshot;
    use crate::services::builder::{price_stay, ClientIdentity};
    use crate::services::notifier::LogNotifier;
    use crate::services::providers::MockProvider;
    use crate::services::store::InMemoryInvoiceStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;

    async fn seeded_store() -> (Arc<InMemoryInvoiceStore>, String) {
        let store = Arc::new(InMemoryInvoiceStore::new());
        let check_in = Utc::now();
        let reservation = ReservationSnapshot {
            reservation_id: "r-1".to_string(),
            guest_first_name: "Ana".to_string(),
            guest_last_name: "Ruiz".to_string(),
            guest_email: None,
            check_in,
            check_out: check_in + ChronoDuration::days(3),
            total_price: Decimal::from(240),
        };
        let client = ClientIdentity {
            name: "Ana Ruiz".to_string(),
            nif: "12345678Z".to_string(),
            address: None,
        };
        let invoice = price_stay(&reservation, client, "000001".to_string(), Utc::now()).unwrap();
        let id = invoice.invoice_id.clone();
        store.insert(&invoice).await.unwrap();
        (store, id)
    }

    fn orchestrator(
        store: Arc<InMemoryInvoiceStore>,
        providers: Vec<Arc<MockProvider>>,
    ) -> SubmissionOrchestrator {
        SubmissionOrchestrator::new(
            store,
            providers
                .into_iter()
                .map(|p| p as Arc<dyn EInvoiceProvider>)
                .collect(),
            Duration::from_millis(100),
            Arc::new(LogNotifier),
        )
    }

    #[tokio::test]
    async fn first_success_stops_the_chain() {
        let (store, id) = seeded_store().await;
        let primary = Arc::new(MockProvider::failing("Verifacti", "down"));
        let secondary = Arc::new(MockProvider::succeeding("Facturae"));
        let direct = Arc::new(MockProvider::succeeding("AEAT"));
        let orchestrator = orchestrator(
            store.clone(),
            vec![primary.clone(), secondary.clone(), direct.clone()],
        );

        let result = orchestrator.submit(&id).await.unwrap();

        assert_eq!(result.status, DeliveryStatus::Sent);
        assert_eq!(result.narrative, "Sent via Facturae");
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
        assert_eq!(direct.call_count(), 0);

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.pdf_url.as_deref(),
            Some("https://facturae.mock/invoice.pdf")
        );
    }

    #[tokio::test]
    async fn exhaustion_names_the_last_provider() {
        let (store, id) = seeded_store().await;
        let orchestrator = orchestrator(
            store.clone(),
            vec![
                Arc::new(MockProvider::failing("Verifacti", "quota exceeded")),
                Arc::new(MockProvider::failing("AEAT", "schema rejected")),
            ],
        );

        let result = orchestrator.submit(&id).await.unwrap();

        assert_eq!(result.status, DeliveryStatus::Error);
        assert!(result.narrative.starts_with("All providers failed; last error from AEAT"));
        assert!(result.narrative.contains("schema rejected"));

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(stored.artifacts().is_empty());
    }

    #[tokio::test]
    async fn hanging_provider_is_cut_off_by_the_attempt_deadline() {
        let (store, id) = seeded_store().await;
        let orchestrator = orchestrator(
            store,
            vec![
                Arc::new(MockProvider::hanging("Verifacti")),
                Arc::new(MockProvider::succeeding("AEAT")),
            ],
        );

        let result = orchestrator.submit(&id).await.unwrap();
        assert_eq!(result.narrative, "Sent via AEAT");
    }

    #[tokio::test]
    async fn empty_chain_marks_the_invoice_as_error() {
        let (store, id) = seeded_store().await;
        let orchestrator = orchestrator(store, Vec::new());

        let result = orchestrator.submit(&id).await.unwrap();
        assert_eq!(result.status, DeliveryStatus::Error);
        assert_eq!(result.narrative, NO_PROVIDER_NARRATIVE);
    }

    #[tokio::test]
    async fn non_pending_invoice_is_not_resubmitted() {
        let (store, id) = seeded_store().await;
        let provider = Arc::new(MockProvider::succeeding("AEAT"));
        let orchestrator = orchestrator(store.clone(), vec![provider.clone()]);

        orchestrator.submit(&id).await.unwrap();
        let before = store.find_by_id(&id).await.unwrap().unwrap();

        let err = orchestrator.submit(&id).await.unwrap_err();
        assert!(matches!(
            err,
            InvoiceError::AlreadyProcessed {
                status: DeliveryStatus::Sent,
                ..
            }
        ));
        assert_eq!(provider.call_count(), 1);

        let after = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.artifacts(), before.artifacts());
    }

    #[tokio::test]
    async fn regenerate_then_resubmit_keeps_only_the_latest_outcome() {
        let (store, id) = seeded_store().await;
        let first = orchestrator(store.clone(), vec![Arc::new(MockProvider::succeeding("Verifacti"))]);
        first.submit(&id).await.unwrap();

        assert_eq!(first.regenerate(&id).await.unwrap(), DeliveryStatus::Pending);
        let reset = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(reset.artifacts().is_empty());
        assert_eq!(reset.narrative.as_deref(), Some(REGENERATED_NARRATIVE));

        let partial = Artifacts {
            pdf_url: None,
            xml_url: Some("https://aeat.mock/second.xml".to_string()),
            qr_url: None,
        };
        let second = orchestrator(
            store.clone(),
            vec![Arc::new(MockProvider::with_artifacts("AEAT", partial.clone()))],
        );
        second.submit(&id).await.unwrap();

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.artifacts(), partial);
        assert_eq!(stored.narrative.as_deref(), Some("Sent via AEAT"));
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let store = Arc::new(InMemoryInvoiceStore::new());
        let orchestrator = orchestrator(store, Vec::new());
        assert!(matches!(
            orchestrator.submit("missing").await,
            Err(InvoiceError::InvoiceNotFound(_))
        ));
        assert!(matches!(
            orchestrator.regenerate("missing").await,
            Err(InvoiceError::InvoiceNotFound(_))
        ));
    }
}
