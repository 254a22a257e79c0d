pub mod auth;
pub mod error;
mod menu;
mod prices;
pub mod rate_limit;
pub mod validation;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;
use rate_limit::{rate_limit_api, rate_limit_login, rate_limit_refresh, rate_limit_verify_login};

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, each with its own budget)
    let auth_routes = Router::new()
        .route(
            "/login",
            post(auth::login).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_login,
            )),
        )
        .route(
            "/verify-login",
            post(auth::verify_login).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_verify_login,
            )),
        )
        .route(
            "/refresh",
            post(auth::refresh).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_refresh,
            )),
        );

    // Public menu
    let menu_routes = Router::new()
        .route("/", get(menu::list_menu))
        .route("/:slug", get(menu::get_menu_category))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_api));

    // Staff panel
    let panel_routes = Router::new()
        .route(
            "/products/:slug/prices",
            get(prices::list_prices).post(prices::set_price),
        )
        .route("/prices/:id", patch(prices::update_price))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_staff,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_api));

    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth_routes)
        .nest("/menu", menu_routes)
        .nest("/panel", panel_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
