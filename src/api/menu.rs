//! Public menu endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::catalog::MenuCategory;
use crate::AppState;

/// GET /menu
pub async fn list_menu(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MenuCategory>>, ApiError> {
    Ok(Json(state.catalog.menu().await?))
}

/// GET /menu/:slug
pub async fn get_menu_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<MenuCategory>, ApiError> {
    Ok(Json(state.catalog.menu_category(&slug).await?))
}
