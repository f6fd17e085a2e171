use super::{
    connection_error, endpoint_url, read_artifacts, EInvoiceProvider, InvoicePayload,
    ProviderError,
};
use crate::models::Artifacts;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use service_core::observability::TraceContextExt;

const PROVIDER_NAME: &str = "Facturae";
const API_KEY_HEADER: &str = "X-API-Key";

/// Facturae generation service. Also forwards the signed file to the AEAT.
pub struct FacturaeProvider {
    client: Client,
    url: String,
    api_key: Secret<String>,
}

#[derive(Debug, Serialize)]
struct FacturaeRequest<'a> {
    invoice: &'a InvoicePayload,
    options: FacturaeOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FacturaeOptions {
    include_pdf: bool,
    include_qr: bool,
    send_to_aeat: bool,
}

impl FacturaeProvider {
    pub fn new(client: Client, api_url: &str, api_key: Secret<String>) -> Self {
        Self {
            client,
            url: endpoint_url(api_url, "generate"),
            api_key,
        }
    }
}

#[async_trait]
impl EInvoiceProvider for FacturaeProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn submit(&self, invoice: &InvoicePayload) -> Result<Artifacts, ProviderError> {
        let request = FacturaeRequest {
            invoice,
            options: FacturaeOptions {
                include_pdf: true,
                include_qr: true,
                send_to_aeat: true,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request)
            .with_trace_context()
            .send()
            .await
            .map_err(|e| connection_error(PROVIDER_NAME, e))?;

        let artifacts = read_artifacts(PROVIDER_NAME, response).await?;

        tracing::info!(number = %invoice.number, "Invoice accepted by Facturae");
        Ok(artifacts)
    }
}
