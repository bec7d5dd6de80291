//! Router assembly

pub mod admin;
pub mod billing;

use axum::http::HeaderMap;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::state::AppState;
use crate::tenant;

/// Acting user id carried in the X-Actor-Id header. The request-handling
/// layer owns authentication; this core only records who acted.
pub fn actor_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub fn create_router(state: AppState) -> Router {
    // Privileged tenant routes sit behind the access gate
    let gated = Router::new()
        .route("/billing", get(billing::overview))
        .route_layer(middleware::from_fn(tenant::coverage_gate));

    // The renewal surface stays reachable with lapsed coverage; the
    // expiry sweep in resolve_tenant still runs for every route here
    let tenant_routes = gated
        .route("/billing/renew", get(billing::renew_info))
        .route(
            "/billing/requests",
            get(billing::list_requests).post(billing::submit_request),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            tenant::resolve_tenant,
        ));

    let admin_routes = Router::new()
        .route(
            "/organizations",
            post(admin::create_organization).get(admin::list_organizations),
        )
        .route(
            "/organizations/{org_id}/suspend",
            post(admin::suspend_organization),
        )
        .route("/payment-requests", get(admin::list_payment_requests))
        .route("/payment-requests/approve", post(admin::approve_requests))
        .route(
            "/payment-requests/{request_id}/approve",
            post(admin::approve_request),
        )
        .route("/payment-requests/decline", post(admin::decline_requests))
        .route(
            "/payment-requests/reconcile",
            post(admin::reconcile_requests),
        )
        .route("/dashboard", get(admin::dashboard))
        .route("/invariants", get(admin::run_invariants))
        .route("/invariants/{name}", get(admin::run_invariant));

    Router::new()
        .route("/health", get(health))
        .nest("/orgs/{slug}", tenant_routes)
        .nest("/admin", admin_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
