//! Router configuration.
//!
//! Every API route is served both under `/api` and at the root.

use crate::handlers::{bookings, health, matching, messages, notifications, ratings, wallet};
use crate::middleware::correlation_id_layer;
use crate::rate_limit::rate_limit;
use crate::realtime::ws_handler;
use crate::state::AppState;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// `frontend_url` is the only origin allowed by CORS.
pub fn build_router(state: AppState, frontend_url: &str) -> Router {
    let api_routes = Router::new()
        // Bookings
        .route("/booking", post(bookings::create).get(bookings::list))
        .route("/booking/:id", get(bookings::get))
        .route("/booking/:id/accept", patch(bookings::accept))
        .route("/booking/:id/decline", patch(bookings::decline))
        .route("/booking/:id/cancel", patch(bookings::cancel))
        .route("/booking/:id/complete-confirm", post(bookings::complete_confirm))
        // Wallet and transfers
        .route("/wallet/balance", get(wallet::balance))
        .route("/wallet/history", get(wallet::history))
        .route("/transactions", get(wallet::transactions))
        .route("/transactions/transfer", post(wallet::transfer))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        // Messages
        .route("/messages", post(messages::send))
        .route("/messages/booking/:id", get(messages::booking_thread))
        .route("/messages/direct/:user_id", get(messages::direct_thread))
        // Ratings
        .route("/ratings", post(ratings::rate))
        .route("/ratings/user/:id", get(ratings::received))
        // Matching
        .route("/matching", get(matching::auto_match))
        .route("/recommendations", get(matching::recommendations))
        // Health (no authentication)
        .route("/health", get(health::health_check));

    Router::new()
        .nest("/api", api_routes.clone())
        .merge(api_routes)
        .route("/ws", get(ws_handler))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit))
        .layer(cors(frontend_url))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}

fn cors(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(frontend_url, error = %e, "Invalid FRONTEND_URL; cross-origin requests disabled");
            layer
        }
    }
}
