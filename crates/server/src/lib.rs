pub mod auth;
pub mod handler;
pub mod middleware;
pub mod session;

use arc_swap::ArcSwap;
use auth::JwtSecurityService;
use axum::{Router, middleware as axum_mw};
use forum_core::config::Config;
use forum_core::mdc::Mdc;
use forum_core::review::{CodeReviewCommentService, CodeReviewService, InMemoryReviewStore};
use middleware::logging_configuration::LoggingConfigurationFilter;
use session::CookieSession;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<Config>>,
    pub reviews: Arc<dyn CodeReviewService>,
    pub comments: Arc<dyn CodeReviewCommentService>,
    pub logging_filter: Arc<LoggingConfigurationFilter>,
    pub start_time: Instant,
}

impl AppState {
    /// State backed by an in-memory review store and the production
    /// identity filter (JWT user, cookie session, task-local MDC).
    pub fn new(config: Arc<ArcSwap<Config>>) -> Self {
        let store = Arc::new(InMemoryReviewStore::new());
        let logging_filter = LoggingConfigurationFilter::new(
            Arc::new(JwtSecurityService),
            Arc::new(CookieSession),
            Arc::new(Mdc),
        );
        Self {
            config,
            reviews: store.clone(),
            comments: store,
            logging_filter: Arc::new(logging_filter),
            start_time: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit_bytes = state.config.load().body_limit_kb * 1024;

    // Public routes
    let public_routes = Router::new()
        .route("/health", axum::routing::get(handler::health::health))
        .route("/api/auth/login", axum::routing::post(handler::auth::login));

    // Forum routes; permission checks happen in the review services
    let forum_routes = Router::new()
        .route("/reviews", axum::routing::post(handler::reviews::create_review))
        .route("/reviews/{id}", axum::routing::get(handler::reviews::get_review))
        .route(
            "/reviewcomments/new",
            axum::routing::post(handler::review_comments::add_comment),
        )
        .route(
            "/reviewcomments/edit",
            axum::routing::post(handler::review_comments::edit_comment),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes));

    // Global middleware, listed inner → outer. The identity filter opens the
    // MDC scope, so request logging and tracing (inside it) carry the user prefix.
    Router::new()
        .merge(public_routes)
        .merge(forum_routes)
        .layer(axum_mw::from_fn(
            middleware::request_logging::request_logging_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::logging_configuration::logging_configuration_middleware,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            auth::authentication_middleware,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ))
        .layer(axum_mw::from_fn(
            middleware::request_context::request_context_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
