//! Staff price management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::error::{ApiError, JsonBody};
use super::validation::parse_amount;
use crate::db::{Account, Price};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryResponse {
    pub product: String,
    pub current_price: Option<Decimal>,
    pub history: Vec<Price>,
}

#[derive(Debug, Deserialize)]
pub struct SetPriceRequest {
    #[serde(default)]
    pub amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePriceRequest {
    pub is_active: bool,
}

/// GET /panel/products/:slug/prices
pub async fn list_prices(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<PriceHistoryResponse>, ApiError> {
    let product = state.catalog.product(&slug).await?;
    let prices = state.catalog.prices();
    Ok(Json(PriceHistoryResponse {
        current_price: prices.current_price(&product.id).await?,
        history: prices.history(&product.id).await?,
        product: product.slug,
    }))
}

/// POST /panel/products/:slug/prices
pub async fn set_price(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Path(slug): Path<String>,
    JsonBody(request): JsonBody<SetPriceRequest>,
) -> Result<Response, ApiError> {
    let amount = parse_amount(&request.amount)
        .map_err(|e| ApiError::validation_field("amount", e))?;
    let product = state.catalog.product(&slug).await?;

    match state
        .catalog
        .prices()
        .set_price_if_changed(&product.id, amount)
        .await?
    {
        Some(price) => {
            tracing::info!(
                product = %product.slug,
                amount = %price.amount,
                by = %account.username,
                "Price updated"
            );
            Ok((StatusCode::CREATED, Json(price)).into_response())
        }
        None => Ok(Json(json!({ "changed": false })).into_response()),
    }
}

/// PATCH /panel/prices/:id
pub async fn update_price(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdatePriceRequest>,
) -> Result<Json<Price>, ApiError> {
    let price = state
        .catalog
        .prices()
        .set_active(&id, request.is_active)
        .await?;
    tracing::info!(
        price_id = %price.id,
        is_active = price.is_active,
        by = %account.username,
        "Price visibility changed"
    );
    Ok(Json(price))
}
