//! Router configuration.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;

use super::handlers::{
    ApiDoc, fetch_latest_handler, fetch_missing_handler, fix_missing_handler,
    health_check_handler, send_notifications_handler,
};

/// Build the admin router with Swagger UI at `/swagger-ui`
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let jobs = Router::new()
        .route("/fetch-latest", post(fetch_latest_handler))
        .route("/fetch-missing", post(fetch_missing_handler))
        .route("/fix-missing", post(fix_missing_handler))
        .route("/send-notifications", post(send_notifications_handler));

    Router::new()
        .route("/health", get(health_check_handler))
        .nest("/jobs", jobs)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
