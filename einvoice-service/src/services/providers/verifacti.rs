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

const PROVIDER_NAME: &str = "Verifacti";

/// Verifacti REST API: JSON invoice in, Facturae artifacts out.
pub struct VerifactiProvider {
    client: Client,
    url: String,
    api_key: Secret<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifactiRequest<'a> {
    invoice: &'a InvoicePayload,
    format: &'static str,
    generate_pdf: bool,
    generate_qr: bool,
}

impl VerifactiProvider {
    pub fn new(client: Client, api_url: &str, api_key: Secret<String>) -> Self {
        Self {
            client,
            url: endpoint_url(api_url, "invoices"),
            api_key,
        }
    }
}

#[async_trait]
impl EInvoiceProvider for VerifactiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn submit(&self, invoice: &InvoicePayload) -> Result<Artifacts, ProviderError> {
        let request = VerifactiRequest {
            invoice,
            format: "facturae",
            generate_pdf: true,
            generate_qr: true,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .with_trace_context()
            .send()
            .await
            .map_err(|e| connection_error(PROVIDER_NAME, e))?;

        let artifacts = read_artifacts(PROVIDER_NAME, response).await?;

        tracing::info!(number = %invoice.number, "Invoice accepted by Verifacti");
        Ok(artifacts)
    }
}
