use einvoice_service::config::EInvoiceConfig;
use einvoice_service::services::init_metrics;
use einvoice_service::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EInvoiceConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "einvoice-service",
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics()?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
