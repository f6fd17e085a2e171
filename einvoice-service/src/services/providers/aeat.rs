use super::xml::render_facturae;
use super::{
    connection_error, endpoint_url, read_artifacts, EInvoiceProvider, InvoicePayload,
    ProviderError,
};
use crate::config::SellerConfig;
use crate::models::Artifacts;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use service_core::observability::TraceContextExt;

const PROVIDER_NAME: &str = "AEAT";

/// Direct submission to the tax authority's web service as Facturae 3.2.2
/// XML.
pub struct AeatProvider {
    client: Client,
    url: String,
    api_key: Secret<String>,
    seller: SellerConfig,
}

impl AeatProvider {
    pub fn new(client: Client, api_url: &str, api_key: Secret<String>, seller: SellerConfig) -> Self {
        Self {
            client,
            url: endpoint_url(api_url, "submit"),
            api_key,
            seller,
        }
    }
}

#[async_trait]
impl EInvoiceProvider for AeatProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn submit(&self, invoice: &InvoicePayload) -> Result<Artifacts, ProviderError> {
        let document = render_facturae(invoice, &self.seller);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .header(CONTENT_TYPE, "application/xml")
            .body(document)
            .with_trace_context()
            .send()
            .await
            .map_err(|e| connection_error(PROVIDER_NAME, e))?;

        let artifacts = read_artifacts(PROVIDER_NAME, response).await?;

        tracing::info!(number = %invoice.number, "Invoice accepted by AEAT");
        Ok(artifacts)
    }
}
