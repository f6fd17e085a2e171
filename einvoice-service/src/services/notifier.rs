//! Fire-and-forget confirmation sent once an invoice reaches the tax
//! authority.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::observability::TraceContextExt;

use crate::models::Invoice;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceNotice {
    pub invoice_id: String,
    pub number: String,
    pub reservation_id: String,
    pub client_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl InvoiceNotice {
    pub fn new(invoice: &Invoice, provider: &str) -> Self {
        Self {
            invoice_id: invoice.invoice_id.clone(),
            number: invoice.number.clone(),
            reservation_id: invoice.reservation_id.clone(),
            client_name: invoice.client_name.clone(),
            grand_total: invoice.grand_total,
            provider: provider.to_string(),
            pdf_url: invoice.pdf_url.clone(),
        }
    }
}

#[async_trait]
pub trait ConfirmationNotifier: Send + Sync {
    async fn invoice_sent(&self, notice: &InvoiceNotice) -> anyhow::Result<()>;
}

/// Posts the notice as JSON to the notification service.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ConfirmationNotifier for HttpNotifier {
    async fn invoice_sent(&self, notice: &InvoiceNotice) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(notice)
            .with_trace_context()
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("notification endpoint returned {}", response.status());
        }

        tracing::debug!(number = %notice.number, "Invoice confirmation delivered");
        Ok(())
    }
}

/// Used when no notification endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl ConfirmationNotifier for LogNotifier {
    async fn invoice_sent(&self, notice: &InvoiceNotice) -> anyhow::Result<()> {
        tracing::info!(
            invoice_id = %notice.invoice_id,
            number = %notice.number,
            provider = %notice.provider,
            "Invoice confirmation (no notification endpoint configured)"
        );
        Ok(())
    }
}
