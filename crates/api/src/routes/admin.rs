//! Platform-admin routes
//!
//! The superuser portal: organization management, the payment-request
//! queue with bulk approve/decline, dashboard stats, and the invariant
//! checks. Per-item approval failures surface in the summary, never as a
//! failed batch.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use pledgetrack_billing::{
    ApprovalSummary, DeclineOutcome, InvariantCheckSummary, InvariantViolation, NewOrganization,
    OrgStatusCounts, Organization, PaymentRequest, RequestStatusCounts,
};
use pledgetrack_shared::{RequestStatus, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::routes::actor_id;
use crate::state::AppState;

fn parse_status_filter(raw: Option<&str>) -> ApiResult<Option<SubscriptionStatus>> {
    match raw {
        None | Some("") => Ok(None),
        Some("FREE_TRIAL") => Ok(Some(SubscriptionStatus::FreeTrial)),
        Some("SUBSCRIBED") => Ok(Some(SubscriptionStatus::Subscribed)),
        Some("NOT_SUBSCRIBED") => Ok(Some(SubscriptionStatus::NotSubscribed)),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown subscription status '{}'",
            other
        ))),
    }
}

fn parse_request_status_filter(raw: Option<&str>) -> ApiResult<Option<RequestStatus>> {
    match raw {
        None | Some("") => Ok(None),
        Some("pending") => Ok(Some(RequestStatus::Pending)),
        Some("approved") => Ok(Some(RequestStatus::Approved)),
        Some("declined") => Ok(Some(RequestStatus::Declined)),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown request status '{}'",
            other
        ))),
    }
}

// =============================================================================
// Organizations
// =============================================================================

/// Signup/onboarding: create an organization with its free trial started.
pub async fn create_organization(
    State(state): State<AppState>,
    Json(body): Json<NewOrganization>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    let org = state.billing.organizations.create(body).await?;
    Ok((StatusCode::CREATED, Json(org)))
}

#[derive(Debug, Deserialize)]
pub struct OrgListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrgListResponse {
    pub organizations: Vec<Organization>,
    pub page: i64,
    pub limit: i64,
}

pub async fn list_organizations(
    State(state): State<AppState>,
    Query(query): Query<OrgListQuery>,
) -> ApiResult<Json<OrgListResponse>> {
    let status = parse_status_filter(query.status.as_deref())?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(25).clamp(1, 100);

    let organizations = state
        .billing
        .organizations
        .list(status, query.search.as_deref(), limit, (page - 1) * limit)
        .await?;

    Ok(Json(OrgListResponse {
        organizations,
        page,
        limit,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuspendBody {
    pub action: String,
}

/// Suspend or reactivate an organization.
pub async fn suspend_organization(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(body): Json<SuspendBody>,
) -> ApiResult<Json<Organization>> {
    let is_active = match body.action.as_str() {
        "suspend" => false,
        "reactivate" => true,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown action '{}', expected 'suspend' or 'reactivate'",
                other
            )))
        }
    };

    let org = state.billing.organizations.set_active(org_id, is_active).await?;
    Ok(Json(org))
}

// =============================================================================
// Payment requests
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<PaymentRequest>,
    pub counts: RequestStatusCounts,
    pub page: i64,
    pub limit: i64,
}

pub async fn list_payment_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Json<RequestListResponse>> {
    let status = parse_request_status_filter(query.status.as_deref())?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(25).clamp(1, 100);

    let requests = state
        .billing
        .ledger
        .list(status, limit, (page - 1) * limit)
        .await?;
    let counts = state.billing.ledger.counts_by_status().await?;

    Ok(Json(RequestListResponse {
        requests,
        counts,
        page,
        limit,
    }))
}

#[derive(Debug, Deserialize)]
pub struct IdsBody {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub message: String,
    pub summary: ApprovalSummary,
}

/// Bulk approve. Partial failures are collected in the summary.
pub async fn approve_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IdsBody>,
) -> ApiResult<Json<ApproveResponse>> {
    if body.ids.is_empty() {
        return Err(ApiError::BadRequest("no request ids given".to_string()));
    }

    let summary = state
        .billing
        .approvals
        .approve_many(&body.ids, actor_id(&headers))
        .await;

    Ok(Json(ApproveResponse {
        message: summary.message(),
        summary,
    }))
}

/// Approve a single request. An already-processed request is a 409.
pub async fn approve_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<ApproveResponse>> {
    let outcome = state
        .billing
        .approvals
        .approve(request_id, actor_id(&headers))
        .await?;

    match outcome {
        pledgetrack_billing::ApprovalOutcome::AlreadyProcessed { .. } => Err(
            pledgetrack_billing::BillingError::AlreadyProcessed { id: request_id }.into(),
        ),
        approved => {
            let mut summary = ApprovalSummary::default();
            summary.absorb(request_id, Ok(approved));
            Ok(Json(ApproveResponse {
                message: summary.message(),
                summary,
            }))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeclineResponse {
    pub message: String,
    pub declined: u64,
}

pub async fn decline_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IdsBody>,
) -> ApiResult<Json<DeclineResponse>> {
    if body.ids.is_empty() {
        return Err(ApiError::BadRequest("no request ids given".to_string()));
    }

    let DeclineOutcome { declined } = state
        .billing
        .approvals
        .decline_many(&body.ids, actor_id(&headers))
        .await?;

    Ok(Json(DeclineResponse {
        message: format!("Declined {} payment request(s).", declined),
        declined,
    }))
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub repaired: u64,
}

/// Apply any approved-but-unapplied requests (the safety-net sweep).
pub async fn reconcile_requests(
    State(state): State<AppState>,
) -> ApiResult<Json<ReconcileResponse>> {
    let repaired = state.billing.reconcile.reconcile_unapplied().await?;
    Ok(Json(ReconcileResponse { repaired }))
}

// =============================================================================
// Dashboard & invariants
// =============================================================================

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub organizations: OrgStatusCounts,
    pub requests: RequestStatusCounts,
    pub approved_today: i64,
    pub total_revenue_tzs_cents: i64,
    pub monthly_revenue_tzs_cents: i64,
    pub recent_requests: Vec<PaymentRequest>,
}

pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardResponse>> {
    let now = OffsetDateTime::now_utc();

    let organizations = state.billing.organizations.counts_by_status().await?;
    let requests = state.billing.ledger.counts_by_status().await?;
    let approved_today = state.billing.ledger.approved_on_day(now).await?;
    let (total_revenue_tzs_cents, monthly_revenue_tzs_cents) =
        state.billing.ledger.approved_revenue_tzs_cents(now).await?;
    let recent_requests = state.billing.ledger.list(None, 10, 0).await?;

    Ok(Json(DashboardResponse {
        organizations,
        requests,
        approved_today,
        total_revenue_tzs_cents,
        monthly_revenue_tzs_cents,
        recent_requests,
    }))
}

pub async fn run_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    let summary = state.billing.invariants.run_all_checks().await?;
    Ok(Json(summary))
}

pub async fn run_invariant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<InvariantViolation>>> {
    let violations = state.billing.invariants.run_check(&name).await?;
    Ok(Json(violations))
}
