//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend selection and ledger service construction
//! - `routes/`: HTTP routes + handlers (one file per resource area)
//! - `dto.rs`: request DTOs and query parameters
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use backoffice_infra::{AppConfig, LedgerService, LedgerStore};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let router = match services::build_services(config).await? {
        services::AppServices::InMemory(ledger) => with_services(&config.jwt_secret, ledger),
        services::AppServices::Postgres(ledger) => with_services(&config.jwt_secret, ledger),
    };
    Ok(router)
}

fn with_services<S: LedgerStore>(jwt_secret: &str, ledger: Arc<LedgerService<S>>) -> Router {
    let jwt = Arc::new(backoffice_auth::Hs256JwtValidator::new(jwt_secret));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router::<S>()
        .layer(Extension(ledger))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
