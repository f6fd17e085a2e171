#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use einvoice_service::config::{
    EInvoiceConfig, NotificationConfig, ProviderEndpoint, ProvidersConfig, SellerConfig,
};
use einvoice_service::models::ReservationSnapshot;
use einvoice_service::services::{
    build_providers, http_client, ConfirmationNotifier, HttpNotifier, InMemoryInvoiceStore,
    InMemoryReservationReader, LogNotifier, SubmissionOrchestrator,
};
use einvoice_service::{router, AppState};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use wiremock::MockServer;

pub const VERIFACTI_KEY: &str = "verifacti-test-key";
pub const FACTURAE_KEY: &str = "facturae-test-key";
pub const AEAT_KEY: &str = "aeat-test-key";
pub const NOTIFICATION_PATH: &str = "/notifications/invoices";

/// Which providers get a credential. Each one points at its own mock server.
#[derive(Debug, Clone, Copy)]
pub struct Enabled {
    pub verifacti: bool,
    pub facturae: bool,
    pub aeat: bool,
}

impl Enabled {
    pub const ALL: Enabled = Enabled {
        verifacti: true,
        facturae: true,
        aeat: true,
    };
    pub const NONE: Enabled = Enabled {
        verifacti: false,
        facturae: false,
        aeat: false,
    };
    pub const AEAT_ONLY: Enabled = Enabled {
        verifacti: false,
        facturae: false,
        aeat: true,
    };
}

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub store: Arc<InMemoryInvoiceStore>,
    pub reservations: Arc<InMemoryReservationReader>,
    pub verifacti: MockServer,
    pub facturae: MockServer,
    pub aeat: MockServer,
    pub notifications: MockServer,
}

impl TestApp {
    /// Confirmations are only logged.
    pub async fn spawn(enabled: Enabled) -> Self {
        Self::build(enabled, false).await
    }

    /// Confirmations are posted to `notifications` at `NOTIFICATION_PATH`.
    pub async fn spawn_notifying(enabled: Enabled) -> Self {
        Self::build(enabled, true).await
    }

    async fn build(enabled: Enabled, notify: bool) -> Self {
        let notifications = MockServer::start().await;
        let verifacti = MockServer::start().await;
        let facturae = MockServer::start().await;
        let aeat = MockServer::start().await;

        let key = |on: bool, key: &'static str| if on { Some(key) } else { None };
        let providers_config = ProvidersConfig {
            verifacti: ProviderEndpoint::new(
                format!("{}/v1", verifacti.uri()),
                key(enabled.verifacti, VERIFACTI_KEY),
            ),
            facturae: ProviderEndpoint::new(
                format!("{}/v1", facturae.uri()),
                key(enabled.facturae, FACTURAE_KEY),
            ),
            aeat: ProviderEndpoint::new(
                format!("{}/ws/facturae", aeat.uri()),
                key(enabled.aeat, AEAT_KEY),
            ),
            attempt_timeout_secs: 2,
        };

        let timeout = providers_config.attempt_timeout();
        let http = http_client(timeout).expect("Failed to build provider client");
        let providers =
            build_providers(&providers_config, &SellerConfig::default(), http.clone());

        let notifier: Arc<dyn ConfirmationNotifier> = if notify {
            Arc::new(HttpNotifier::new(
                http,
                format!("{}{}", notifications.uri(), NOTIFICATION_PATH),
            ))
        } else {
            Arc::new(LogNotifier)
        };

        let store = Arc::new(InMemoryInvoiceStore::new());
        let reservations = Arc::new(InMemoryReservationReader::new());
        let orchestrator = SubmissionOrchestrator::new(store.clone(), providers, timeout, notifier);
        let state = AppState::new(store.clone(), reservations.clone(), orchestrator);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().expect("No local address").port();

        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.ok();
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            client: Client::new(),
            store,
            reservations,
            verifacti,
            facturae,
            aeat,
            notifications,
        }
    }

    /// Wait for the fire-and-forget confirmation to reach the mock endpoint.
    pub async fn notification_requests(&self) -> Vec<wiremock::Request> {
        for _ in 0..50 {
            let received = self
                .notifications
                .received_requests()
                .await
                .unwrap_or_default();
            if !received.is_empty() {
                return received;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        Vec::new()
    }

    /// Register a reservation of `nights` nights starting 1 July 2025.
    pub async fn seed_reservation(&self, reservation_id: &str, nights: i64, total: &str) {
        let check_in = Utc
            .with_ymd_and_hms(2025, 7, 1, 14, 0, 0)
            .single()
            .expect("valid date");
        self.reservations
            .put(ReservationSnapshot {
                reservation_id: reservation_id.to_string(),
                guest_first_name: "Lucía".to_string(),
                guest_last_name: "Fernández".to_string(),
                guest_email: Some("lucia@example.com".to_string()),
                check_in,
                check_out: check_in + ChronoDuration::days(nights),
                total_price: total.parse::<Decimal>().expect("valid amount"),
            })
            .await;
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request");
        Self::read(response).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut request = self.client.post(format!("{}{}", self.address, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("Failed to execute request");
        Self::read(response).await
    }

    /// Create an invoice for `reservation_id` and return its id.
    pub async fn create_invoice(&self, reservation_id: &str) -> String {
        let (status, body) = self
            .post(
                "/invoices",
                Some(serde_json::json!({
                    "reservationId": reservation_id,
                    "clientName": "Lucía Fernández",
                    "clientNIF": "12345678Z",
                    "clientAddress": "Calle Real 1, Granada"
                })),
            )
            .await;
        assert_eq!(status, 201, "create failed: {}", body);
        body["id"].as_str().expect("invoice id").to_string()
    }

    async fn read(response: reqwest::Response) -> (u16, Value) {
        let status = response.status().as_u16();
        let text = response.text().await.expect("Failed to read body");
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, body)
    }
}

/// Router over empty in-memory stores and no providers, for driving
/// requests in-process.
pub fn in_process_router() -> axum::Router {
    let store = Arc::new(InMemoryInvoiceStore::new());
    let reservations = Arc::new(InMemoryReservationReader::new());
    let orchestrator = SubmissionOrchestrator::new(
        store.clone(),
        Vec::new(),
        std::time::Duration::from_secs(1),
        Arc::new(LogNotifier),
    );
    router(AppState::new(store, reservations, orchestrator))
}

/// Configuration for `Application::build` without a database or providers.
pub fn offline_config() -> EInvoiceConfig {
    EInvoiceConfig {
        common: CoreConfig {
            port: 0,
            log_level: "info".to_string(),
        },
        mongodb: None,
        providers: ProvidersConfig {
            verifacti: ProviderEndpoint::new("http://127.0.0.1:9/v1", None),
            facturae: ProviderEndpoint::new("http://127.0.0.1:9/v1", None),
            aeat: ProviderEndpoint::new("http://127.0.0.1:9/ws", None),
            attempt_timeout_secs: 1,
        },
        seller: SellerConfig::default(),
        notification: NotificationConfig { endpoint: None },
        otlp_endpoint: None,
    }
}

pub fn artifacts(provider: &str) -> Value {
    serde_json::json!({
        "pdfUrl": format!("https://{}.example/invoice.pdf", provider),
        "xmlUrl": format!("https://{}.example/invoice.xml", provider),
        "qrUrl": format!("https://{}.example/invoice.png", provider)
    })
}
