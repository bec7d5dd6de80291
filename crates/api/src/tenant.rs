//! Tenant resolution and the access gate
//!
//! Every tenant-scoped request resolves its organization from the URL
//! slug and runs the periodic expiry check, so the coverage state a
//! handler sees is never stale. The gate layered on privileged routes
//! then rejects with a renewal payload when neither trial nor
//! subscription is active; the renewal surface itself stays reachable.

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use pledgetrack_billing::{CoverageSnapshot, Organization};
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// The resolved tenant organization, inserted as a request extension.
#[derive(Clone)]
pub struct Tenant(pub Organization);

/// Fresh coverage snapshot produced by the resolve-time expiry sweep.
#[derive(Clone, Copy)]
pub struct CurrentCoverage(pub CoverageSnapshot);

/// Resolve the organization from the URL slug and run the expiry sweep.
///
/// Missing or inactive organizations 404 here, before any handler runs.
/// The sweep always runs before the access gate is evaluated, so a
/// SUBSCRIBED tenant whose expiry just passed is downgraded within the
/// same request that observes it.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let org = state
        .billing
        .organizations
        .get_active_by_slug(&slug)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Organization '{}' not found or is inactive.", slug))
        })?;

    let snapshot = state.billing.sweeper.sweep(&org).await?;

    request.extensions_mut().insert(Tenant(org));
    request.extensions_mut().insert(CurrentCoverage(snapshot));
    Ok(next.run(request).await)
}

/// Access gate: require active coverage, evaluated on the snapshot the
/// sweep just produced.
pub async fn coverage_gate(request: Request, next: Next) -> ApiResult<Response> {
    let tenant = request
        .extensions()
        .get::<Tenant>()
        .ok_or_else(|| ApiError::BadRequest("tenant not resolved".to_string()))?;
    let CurrentCoverage(snapshot) = request
        .extensions()
        .get::<CurrentCoverage>()
        .copied()
        .ok_or_else(|| ApiError::BadRequest("coverage not resolved".to_string()))?;

    let now = OffsetDateTime::now_utc();
    if !snapshot.has_coverage(now) {
        return Err(ApiError::RenewalRequired {
            renew_path: format!("/orgs/{}/billing/renew", tenant.0.slug),
        });
    }

    Ok(next.run(request).await)
}
