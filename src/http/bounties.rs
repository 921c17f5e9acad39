//! Bounty staking and wallet endpoints

use axum::{
    extract::{Extension, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::http::error::AppError;
use crate::http::extract::{ApiJson, ApiPath};
use crate::http::middleware::CurrentUser;
use crate::services::escrow::EscrowStats;
use crate::store::escrow::{total_amount, EscrowStatus, EscrowTransaction};
use crate::store::profiles::UserRole;
use crate::store::questions::QuestionStatus;
use crate::util::time::hours_between;

/// Largest mock purchase allowed at once
pub const MAX_PURCHASE: i64 = 1000;

/// Payload to stake points on a question
#[derive(Debug, Deserialize, ToSchema)]
pub struct StakeCreate {
    pub amount: i64,
}

/// Mock purchase of civic points
#[derive(Debug, Deserialize, ToSchema)]
pub struct PointsPurchase {
    pub amount: i64,
}

/// A contributor to a question's bounty
#[derive(Debug, Serialize, ToSchema)]
pub struct BountyContributor {
    pub citizen_id: Uuid,
    pub citizen_name: String,
    pub amount: i64,
    pub staked_at: DateTime<Utc>,
}

/// Bounty summary for a question
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionBounty {
    pub question_id: Uuid,
    pub total_bounty: i64,
    pub contributors: Vec<BountyContributor>,
    pub time_remaining_hours: f64,
}

/// Caller's wallet
#[derive(Debug, Serialize, ToSchema)]
pub struct WalletInfo {
    pub user_id: Uuid,
    pub civic_points: i64,
    pub total_staked: i64,
    /// For politicians: points released to charity from their questions
    pub total_earned: i64,
}

/// Stake civic points on a question's bounty
#[utoipa::path(
    post,
    path = "/bounties/questions/{question_id}/stake",
    tag = "Bounties",
    params(("question_id" = Uuid, Path, description = "Question ID")),
    request_body = StakeCreate,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Escrow record", body = EscrowTransaction),
        (status = 400, description = "Invalid amount, closed question or insufficient points"),
        (status = 403, description = "Citizen role required"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn stake_points(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(question_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StakeCreate>,
) -> Result<Json<EscrowTransaction>, AppError> {
    user.require_role(UserRole::Citizen)?;
    if req.amount <= 0 {
        return Err(AppError::BadRequest("Stake amount must be positive".to_string()));
    }

    let question = state
        .question_store
        .get(question_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    if question.status != QuestionStatus::Open {
        return Err(AppError::BadRequest("Question is not open for staking".to_string()));
    }

    let current_points = state
        .profile_store
        .civic_points(user.id())
        .await?
        .unwrap_or(0);
    if current_points < req.amount {
        return Err(AppError::BadRequest(format!(
            "Insufficient points. Available: {}",
            current_points
        )));
    }

    // Deduct points from wallet
    state
        .profile_store
        .set_civic_points(user.id(), current_points - req.amount)
        .await?;

    let escrow = match state
        .escrow_store
        .hold(user.id(), question_id, req.amount)
        .await
    {
        Ok(escrow) => escrow,
        Err(e) => {
            error!(error = %e, question_id = %question_id, "Escrow insert failed, restoring points");
            state
                .profile_store
                .set_civic_points(user.id(), current_points)
                .await?;
            return Err(AppError::Internal("Failed to create escrow".to_string()));
        }
    };

    let total = state.question_store.add_bounty(question_id, req.amount).await?;

    info!(
        question_id = %question_id,
        citizen_id = %user.id(),
        amount = req.amount,
        total_bounty = total,
        "Points staked"
    );

    Ok(Json(escrow))
}

/// Bounty details and contributors for a question
#[utoipa::path(
    get,
    path = "/bounties/questions/{question_id}",
    tag = "Bounties",
    params(("question_id" = Uuid, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Bounty summary", body = QuestionBounty),
        (status = 404, description = "Question not found")
    )
)]
pub async fn get_bounty_details(
    State(state): State<AppState>,
    ApiPath(question_id): ApiPath<Uuid>,
) -> Result<Json<QuestionBounty>, AppError> {
    let question = state
        .question_store
        .get(question_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let contributors = state
        .escrow_store
        .contributors(question_id)
        .await?
        .into_iter()
        .map(|row| BountyContributor {
            citizen_id: row.escrow.citizen_id,
            citizen_name: row
                .citizen
                .map(|c| c.display_name)
                .unwrap_or_else(|| "Anonymous".to_string()),
            amount: row.escrow.amount,
            staked_at: row.escrow.created_at,
        })
        .collect();

    Ok(Json(QuestionBounty {
        question_id,
        total_bounty: question.total_bounty,
        contributors,
        time_remaining_hours: hours_between(Utc::now(), question.deadline).max(0.0),
    }))
}

/// Current user's wallet
#[utoipa::path(
    get,
    path = "/bounties/wallet",
    tag = "Bounties",
    security(("bearer" = [])),
    responses((status = 200, description = "Wallet", body = WalletInfo))
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<WalletInfo>, AppError> {
    let civic_points = state
        .profile_store
        .civic_points(user.id())
        .await?
        .unwrap_or(user.profile.civic_points);

    let held = state
        .escrow_store
        .for_citizen(user.id(), Some(EscrowStatus::Held))
        .await?;
    let total_staked = total_amount(&held, None);

    let total_earned = if user.role() == UserRole::Politician {
        let question_ids: Vec<Uuid> = state
            .question_store
            .for_politician(user.id())
            .await?
            .into_iter()
            .map(|q| q.id)
            .collect();
        let released = state
            .escrow_store
            .for_questions(&question_ids, Some(EscrowStatus::Released))
            .await?;
        total_amount(&released, None)
    } else {
        0
    };

    Ok(Json(WalletInfo {
        user_id: user.id(),
        civic_points,
        total_staked,
        total_earned,
    }))
}

/// Mock purchase of civic points
#[utoipa::path(
    post,
    path = "/bounties/purchase",
    tag = "Bounties",
    request_body = PointsPurchase,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated wallet", body = WalletInfo),
        (status = 400, description = "Amount out of range")
    )
)]
pub async fn purchase_points(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(req): ApiJson<PointsPurchase>,
) -> Result<Json<WalletInfo>, AppError> {
    validate_purchase(req.amount)?;

    let balance = state
        .profile_store
        .adjust_civic_points(user.id(), req.amount)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    info!(user_id = %user.id(), amount = req.amount, balance, "Points purchased");

    Ok(Json(WalletInfo {
        user_id: user.id(),
        civic_points: balance,
        total_staked: 0,
        total_earned: 0,
    }))
}

/// Caller's escrow history totals
#[utoipa::path(
    get,
    path = "/bounties/stats",
    tag = "Bounties",
    security(("bearer" = [])),
    responses((status = 200, description = "Escrow totals", body = EscrowStats))
)]
pub async fn escrow_stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<EscrowStats>, AppError> {
    Ok(Json(state.escrow.get_escrow_stats(user.id()).await?))
}

fn validate_purchase(amount: i64) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::BadRequest("Amount must be positive".to_string()));
    }
    if amount > MAX_PURCHASE {
        return Err(AppError::BadRequest(format!(
            "Maximum {} points per purchase",
            MAX_PURCHASE
        )));
    }
    Ok(())
}
