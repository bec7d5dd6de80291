//! Tenant-facing billing routes

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use pledgetrack_billing::{PaidSubmission, PaymentRequest, Quote};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::routes::actor_id;
use crate::state::AppState;
use crate::tenant::{CurrentCoverage, Tenant};

/// Month counts offered on the renewal page.
const OFFERED_MONTHS: [i32; 4] = [1, 3, 6, 12];

#[derive(Debug, Serialize)]
pub struct PaymentInstructions {
    pub mpesa_number: String,
    pub mpesa_account_name: String,
    pub support_email: String,
}

#[derive(Debug, Serialize)]
pub struct BillingOverview {
    pub organization: String,
    pub subscription_status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
    pub trial_active: bool,
    pub subscription_active: bool,
    pub quotes: Vec<Quote>,
    pub payment_instructions: PaymentInstructions,
}

fn payment_instructions(state: &AppState) -> PaymentInstructions {
    let settings = state.billing.settings();
    PaymentInstructions {
        mpesa_number: settings.mpesa_number.clone(),
        mpesa_account_name: settings.mpesa_account_name.clone(),
        support_email: settings.support_email.clone(),
    }
}

fn quotes_for(state: &AppState, org: &pledgetrack_billing::Organization) -> Vec<Quote> {
    let settings = state.billing.settings();
    OFFERED_MONTHS
        .iter()
        .map(|&months| settings.quote(org.category(), months))
        .collect()
}

/// Coverage snapshot and renewal quotes for the tenant's billing page.
pub async fn overview(
    State(state): State<AppState>,
    Extension(Tenant(org)): Extension<Tenant>,
    Extension(CurrentCoverage(coverage)): Extension<CurrentCoverage>,
) -> ApiResult<Json<BillingOverview>> {
    let now = OffsetDateTime::now_utc();

    Ok(Json(BillingOverview {
        organization: org.name.clone(),
        subscription_status: coverage.status.as_str().to_string(),
        trial_started_at: coverage.trial_started_at,
        trial_ends_at: coverage.trial_ends_at(),
        subscription_expires_at: coverage.subscription_expires_at,
        trial_active: coverage.trial_active(now),
        subscription_active: coverage.subscription_active(now),
        quotes: quotes_for(&state, &org),
        payment_instructions: payment_instructions(&state),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    #[serde(default)]
    pub is_trial: bool,
    pub months: Option<i32>,
    pub payment_method: Option<String>,
    pub reference_note: Option<String>,
    pub amount_sent_tzs_cents: Option<i64>,
}

/// Submit a trial or paid payment request for review.
pub async fn submit_request(
    State(state): State<AppState>,
    Extension(Tenant(org)): Extension<Tenant>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequestBody>,
) -> ApiResult<(StatusCode, Json<PaymentRequest>)> {
    let submitted_by = actor_id(&headers).ok_or_else(|| {
        ApiError::BadRequest("missing or invalid X-Actor-Id header".to_string())
    })?;

    let request = if body.is_trial {
        state.billing.ledger.submit_trial(&org, submitted_by).await?
    } else {
        let months = body.months.ok_or_else(|| {
            ApiError::BadRequest("months is required for a paid request".to_string())
        })?;
        state
            .billing
            .ledger
            .submit_paid(
                &org,
                submitted_by,
                PaidSubmission {
                    months,
                    payment_method: body.payment_method,
                    reference_note: body.reference_note,
                    amount_sent_tzs_cents: body.amount_sent_tzs_cents,
                },
            )
            .await?
    };

    Ok((StatusCode::CREATED, Json(request)))
}

/// The organization's payment request ledger, newest first.
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(Tenant(org)): Extension<Tenant>,
) -> ApiResult<Json<Vec<PaymentRequest>>> {
    let requests = state.billing.ledger.list_for_org(org.id, 100).await?;
    Ok(Json(requests))
}

#[derive(Debug, Serialize)]
pub struct RenewInfo {
    pub organization: String,
    pub subscription_status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
    pub quotes: Vec<Quote>,
    pub payment_instructions: PaymentInstructions,
}

/// Renewal page data. Reachable without coverage; the resolve-time sweep
/// has already run, so the status shown is never stale.
pub async fn renew_info(
    State(state): State<AppState>,
    Extension(Tenant(org)): Extension<Tenant>,
    Extension(CurrentCoverage(coverage)): Extension<CurrentCoverage>,
) -> ApiResult<Json<RenewInfo>> {
    Ok(Json(RenewInfo {
        organization: org.name.clone(),
        subscription_status: coverage.status.as_str().to_string(),
        subscription_expires_at: coverage.subscription_expires_at,
        quotes: quotes_for(&state, &org),
        payment_instructions: payment_instructions(&state),
    }))
}
