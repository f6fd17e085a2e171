//! E-invoicing provider abstractions and implementations.
//!
//! Each provider turns an invoice into compliant artifacts and forwards it to
//! the tax authority. They differ in endpoint, payload encoding and
//! authentication scheme; the orchestrator only sees [`EInvoiceProvider`].

pub mod aeat;
pub mod facturae;
pub mod mock;
pub mod verifacti;
pub mod xml;

use crate::config::{ProvidersConfig, SellerConfig};
use crate::models::{Artifacts, Invoice};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use aeat::AeatProvider;
pub use facturae::FacturaeProvider;
pub use mock::MockProvider;
pub use verifacti::VerifactiProvider;

/// Longest slice of a remote error body kept in logs and narratives.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Configuration(_) => "configuration",
            ProviderError::Connection(_) => "connection",
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::Timeout(_) => "timeout",
        }
    }
}

#[async_trait]
pub trait EInvoiceProvider: Send + Sync {
    /// Display name used in narratives and logs.
    fn name(&self) -> &'static str;

    /// Submit one invoice. Any error means "try the next provider".
    async fn submit(&self, invoice: &InvoicePayload) -> Result<Artifacts, ProviderError>;
}

/// Provider-neutral invoice document sent by the JSON providers and used
/// to render the Facturae XML.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub number: String,
    /// Issue date as `YYYY-MM-DD`.
    pub date: String,
    pub client: PayloadClient,
    pub items: Vec<PayloadItem>,
    pub totals: PayloadTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadClient {
    pub name: String,
    pub nif: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadItem {
    pub description: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub vat: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadTotals {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub vat: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl From<&Invoice> for InvoicePayload {
    fn from(invoice: &Invoice) -> Self {
        Self {
            number: invoice.number.clone(),
            date: invoice.issue_date.format("%Y-%m-%d").to_string(),
            client: PayloadClient {
                name: invoice.client_name.clone(),
                nif: invoice.client_nif.clone(),
                address: invoice.client_address.clone(),
            },
            items: invoice
                .items
                .iter()
                .map(|item| PayloadItem {
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    vat: item.vat,
                    total: item.total(),
                })
                .collect(),
            totals: PayloadTotals {
                subtotal: invoice.subtotal,
                vat: invoice.vat_total,
                total: invoice.grand_total,
            },
        }
    }
}

/// Artifact links as every provider returns them on success.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactResponse {
    #[serde(default)]
    pdf_url: Option<String>,
    #[serde(default)]
    xml_url: Option<String>,
    #[serde(default)]
    qr_url: Option<String>,
}

fn non_empty(url: Option<String>) -> Option<String> {
    url.filter(|u| !u.trim().is_empty())
}

/// Interpret a provider's HTTP response: non-2xx is a rejection, a 2xx body
/// yields whatever artifact links it carries.
pub(crate) async fn read_artifacts(
    provider: &str,
    response: reqwest::Response,
) -> Result<Artifacts, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: ArtifactResponse = response.json().await.map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse {} response: {}", provider, e))
    })?;

    Ok(Artifacts {
        pdf_url: non_empty(parsed.pdf_url),
        xml_url: non_empty(parsed.xml_url),
        qr_url: non_empty(parsed.qr_url),
    })
}

pub(crate) fn connection_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Connection(format!("{} request timed out: {}", provider, err))
    } else {
        ProviderError::Connection(format!("Failed to connect to {}: {}", provider, err))
    }
}

pub(crate) fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// HTTP client shared by the providers. Its timeout matches the per-attempt
/// deadline so an unresponsive provider cannot hold a connection open.
pub fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Providers in priority order (Verifacti, Facturae, AEAT). Any provider
/// without a credential is left out.
pub fn build_providers(
    config: &ProvidersConfig,
    seller: &SellerConfig,
    client: Client,
) -> Vec<Arc<dyn EInvoiceProvider>> {
    let mut providers: Vec<Arc<dyn EInvoiceProvider>> = Vec::new();

    if let Some(key) = config.verifacti.credential() {
        providers.push(Arc::new(VerifactiProvider::new(
            client.clone(),
            &config.verifacti.api_url,
            key.clone(),
        )));
    }

    if let Some(key) = config.facturae.credential() {
        providers.push(Arc::new(FacturaeProvider::new(
            client.clone(),
            &config.facturae.api_url,
            key.clone(),
        )));
    }

    if let Some(key) = config.aeat.credential() {
        providers.push(Arc::new(AeatProvider::new(
            client,
            &config.aeat.api_url,
            key.clone(),
            seller.clone(),
        )));
    }

    let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    if names.is_empty() {
        tracing::warn!("No e-invoice provider configured; submissions will fail");
    } else {
        tracing::info!(providers = ?names, "E-invoice provider chain initialized");
    }

    providers
}
