//! # taskline_api
//!
//! HTTP and websocket API library for Taskline.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::routing::{get, post};
use taskline_core::auth::refresh_store::RefreshTokenStore;
use taskline_core::auth::service::TokenService;
use taskline_core::models::auth::Role;
use taskline_core::realtime::presence::PresenceRegistry;
use taskline_core::realtime::router::EventRouter;
use taskline_core::store::Persistence;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, notifications, presence};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator.
    pub store: Arc<dyn Persistence>,
    pub tokens: Arc<TokenService>,
    /// Real-time event router; owns the presence registry.
    pub events: Arc<EventRouter>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the token service, refresh registry and real-time layer.
    pub fn new(config: ApiConfig, store: Arc<dyn Persistence>) -> Self {
        let tokens = TokenService::new(
            &config.token_settings(),
            Arc::new(RefreshTokenStore::new()),
        );
        let events = EventRouter::new(
            Arc::clone(&store),
            Arc::new(PresenceRegistry::new()),
            config.persistence_timeout,
        );
        Self {
            store,
            tokens: Arc::new(tokens),
            events: Arc::new(events),
            config,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        self.events.presence()
    }

    /// The refresh-token registry, for the sweep task.
    pub fn refresh_registry(&self) -> &Arc<RefreshTokenStore> {
        self.tokens.registry()
    }
}

const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required). The websocket authenticates in its
    // own handshake.
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/ws", get(ws::ws_handler));

    let admin = Router::new()
        .route(
            "/notifications/broadcast",
            post(notifications::broadcast_handler),
        )
        .layer(from_fn(|request: Request, next: Next| {
            middleware::auth::require_role(ADMIN_ONLY, request, next)
        }));

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/notifications", get(notifications::list_handler))
        .route("/presence/{principal_id}", get(presence::presence_handler))
        .merge(admin)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
