use super::{EInvoiceProvider, InvoicePayload, ProviderError};
use crate::models::Artifacts;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed(Artifacts),
    Fail(String),
    Hang,
}

/// Mock e-invoice provider for testing
pub struct MockProvider {
    name: &'static str,
    behavior: Behavior,
    call_count: AtomicU64,
}

impl MockProvider {
    /// Accepts every invoice and returns links under `https://{name}.mock/`.
    pub fn succeeding(name: &'static str) -> Self {
        let base = format!("https://{}.mock/invoice", name.to_lowercase());
        Self::with_artifacts(
            name,
            Artifacts {
                pdf_url: Some(format!("{}.pdf", base)),
                xml_url: Some(format!("{}.xml", base)),
                qr_url: Some(format!("{}.png", base)),
            },
        )
    }

    pub fn with_artifacts(name: &'static str, artifacts: Artifacts) -> Self {
        Self::new(name, Behavior::Succeed(artifacts))
    }

    pub fn failing(name: &'static str, reason: &str) -> Self {
        Self::new(name, Behavior::Fail(reason.to_string()))
    }

    /// Never answers; only an attempt deadline ends the call.
    pub fn hanging(name: &'static str) -> Self {
        Self::new(name, Behavior::Hang)
    }

    fn new(name: &'static str, behavior: Behavior) -> Self {
        Self {
            name,
            behavior,
            call_count: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EInvoiceProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn submit(&self, invoice: &InvoicePayload) -> Result<Artifacts, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            provider = %self.name,
            number = %invoice.number,
            "[MOCK] Invoice would be submitted"
        );

        match &self.behavior {
            Behavior::Succeed(artifacts) => Ok(artifacts.clone()),
            Behavior::Fail(reason) => Err(ProviderError::Rejected {
                status: 503,
                body: reason.clone(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Connection(format!(
                    "{} did not answer",
                    self.name
                )))
            }
        }
    }
}
