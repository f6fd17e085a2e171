//! Invoice handlers.
//!
//! Callers are the hotel back-office, which authenticates operators before
//! proxying here; no per-request identity is checked in this service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    CreateInvoiceRequest, InvoiceListResponse, InvoiceResponse, InvoiceStatsResponse,
    ListInvoicesParams, RegenerateInvoiceResponse, SubmitInvoiceResponse,
};
use crate::startup::AppState;

/// List invoices, newest first, with their reservation summaries.
#[tracing::instrument(skip(state))]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<ListInvoicesParams>,
) -> Result<Json<InvoiceListResponse>, AppError> {
    let filter = params.to_filter(Utc::now())?;
    let listings = state.queries.list(&filter).await?;

    Ok(Json(InvoiceListResponse::new(
        listings.into_iter().map(InvoiceResponse::from).collect(),
    )))
}

/// Bill a reservation.
#[tracing::instrument(skip(state, request), fields(reservation_id = %request.reservation_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    request.validate()?;

    let invoice = state
        .builder
        .create(&request.reservation_id, request.client())
        .await?;

    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(invoice))))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let listing = state.queries.get(&invoice_id).await?;
    Ok(Json(InvoiceResponse::from(listing)))
}

pub async fn invoice_stats(
    State(state): State<AppState>,
) -> Result<Json<InvoiceStatsResponse>, AppError> {
    let stats = state.queries.stats().await?;
    Ok(Json(InvoiceStatsResponse::from(stats)))
}

/// Send a pending invoice through the provider chain.
#[tracing::instrument(skip(state))]
pub async fn submit_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<SubmitInvoiceResponse>, AppError> {
    let result = state.orchestrator.submit(&invoice_id).await?;
    Ok(Json(SubmitInvoiceResponse::from(result)))
}

/// Reset an invoice to `pending` so it can be submitted again.
#[tracing::instrument(skip(state))]
pub async fn regenerate_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<RegenerateInvoiceResponse>, AppError> {
    let status = state.orchestrator.regenerate(&invoice_id).await?;
    Ok(Json(RegenerateInvoiceResponse { status }))
}

pub async fn reservation_invoices(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
) -> Result<Json<InvoiceListResponse>, AppError> {
    let invoices = state.queries.for_reservation(&reservation_id).await?;
    Ok(Json(InvoiceListResponse::new(
        invoices.into_iter().map(InvoiceResponse::from).collect(),
    )))
}
