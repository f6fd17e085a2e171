//! Application startup and lifecycle management.

use crate::config::EInvoiceConfig;
use crate::handlers::{health, invoices};
use crate::services::{
    build_providers, http_client, ConfirmationNotifier, HttpNotifier, InMemoryInvoiceStore,
    InMemoryReservationReader, InvoiceBuilder, InvoiceDb, InvoiceQueries, InvoiceStore,
    LogNotifier, ReservationReader, SubmissionOrchestrator,
};
use axum::{
    extract::Request,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, RequestId},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InvoiceStore>,
    pub builder: Arc<InvoiceBuilder>,
    pub orchestrator: Arc<SubmissionOrchestrator>,
    pub queries: Arc<InvoiceQueries>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        reservations: Arc<dyn ReservationReader>,
        orchestrator: SubmissionOrchestrator,
    ) -> Self {
        Self {
            builder: Arc::new(InvoiceBuilder::new(store.clone(), reservations.clone())),
            queries: Arc::new(InvoiceQueries::new(store.clone(), reservations)),
            orchestrator: Arc::new(orchestrator),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route("/invoices/stats", get(invoices::invoice_stats))
        .route("/invoices/:id", get(invoices::get_invoice))
        .route("/invoices/:id/submit", post(invoices::submit_invoice))
        .route("/invoices/:id/regenerate", post(invoices::regenerate_invoice))
        .route(
            "/reservations/:id/invoices",
            get(invoices::reservation_invoices),
        )
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_endpoint))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            let request_id = req
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.as_str())
                .unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %request_id,
            )
        }))
        // Outermost, so the trace span already sees the request id.
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: EInvoiceConfig) -> Result<Self, AppError> {
        let (store, reservations): (Arc<dyn InvoiceStore>, Arc<dyn ReservationReader>) =
            match &config.mongodb {
                Some(mongo) => {
                    let db = InvoiceDb::connect(&mongo.uri, &mongo.database).await?;
                    db.initialize_indexes().await.map_err(|e| {
                        tracing::error!("Failed to initialize database indexes: {}", e);
                        e
                    })?;
                    let store: Arc<dyn InvoiceStore> = Arc::new(db.invoice_store());
                    let reservations: Arc<dyn ReservationReader> =
                        Arc::new(db.reservation_reader());
                    (store, reservations)
                }
                None => {
                    tracing::warn!("MONGODB_URI not set, using in-memory stores");
                    let store: Arc<dyn InvoiceStore> = Arc::new(InMemoryInvoiceStore::new());
                    let reservations: Arc<dyn ReservationReader> =
                        Arc::new(InMemoryReservationReader::new());
                    (store, reservations)
                }
            };

        let timeout = config.providers.attempt_timeout();
        let client = http_client(timeout).map_err(|e| AppError::ConfigError(e.into()))?;
        let providers = build_providers(&config.providers, &config.seller, client.clone());

        let notifier: Arc<dyn ConfirmationNotifier> = match &config.notification.endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint, "Invoice confirmations enabled");
                Arc::new(HttpNotifier::new(client, endpoint.clone()))
            }
            None => {
                tracing::info!("No notification endpoint, confirmations are only logged");
                Arc::new(LogNotifier)
            }
        };

        let orchestrator = SubmissionOrchestrator::new(store.clone(), providers, timeout, notifier);
        let state = AppState::new(store, reservations, orchestrator);

        // Bind HTTP listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("E-invoice service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}
