//! Question endpoints

use axum::{
    extract::{Extension, State},
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::http::error::AppError;
use crate::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::http::middleware::{CurrentUser, MaybeUser};
use crate::services::arbiter::DuplicateCheck;
use crate::store::answers::VoteTally;
use crate::store::profiles::UserRole;
use crate::store::questions::{
    NewQuestion, Question, QuestionFilter, QuestionSort, QuestionStatus, QuestionWithNames,
};

/// Payload to create a question
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QuestionCreate {
    #[validate(length(min = 1, max = 300, message = "Title must be 1-300 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "Body must not be empty"))]
    pub body: String,
    pub target_politician_id: Uuid,
    /// Points to stake with the question
    #[serde(default)]
    #[validate(range(min = 0, message = "Initial stake cannot be negative"))]
    pub initial_stake: i64,
}

/// Payload for a duplicate check
#[derive(Debug, Deserialize, ToSchema)]
pub struct DuplicateCheckRequest {
    pub title: String,
    pub body: String,
    pub target_politician_id: Uuid,
}

/// Listing filters
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuestionsParams {
    pub status: Option<QuestionStatus>,
    pub politician_id: Option<Uuid>,
    /// bounty | recent | deadline
    #[serde(default)]
    pub sort_by: QuestionSort,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub(crate) fn default_limit() -> u32 {
    20
}

/// Question with related data for display
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionWithDetails {
    #[serde(flatten)]
    pub question: Question,
    pub citizen_name: Option<String>,
    pub politician_name: Option<String>,
    pub staker_count: u64,
    pub has_answer: bool,
    pub vote_count: u64,
    pub helpful_percentage: Option<f64>,
}

impl QuestionWithDetails {
    fn from_row(row: QuestionWithNames, staker_count: u64, has_answer: bool) -> Self {
        Self {
            question: row.question,
            citizen_name: row.citizen.map(|c| c.display_name),
            politician_name: row.politician.map(|p| p.display_name),
            staker_count,
            has_answer,
            vote_count: 0,
            helpful_percentage: None,
        }
    }
}

/// Deadline for a question created at `created_at`
pub fn question_deadline(created_at: DateTime<Utc>, timeout_days: i64) -> DateTime<Utc> {
    created_at + Duration::days(timeout_days)
}

/// Create a new question targeting a politician
#[utoipa::path(
    post,
    path = "/questions",
    tag = "Questions",
    request_body = QuestionCreate,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Created question", body = Question),
        (status = 400, description = "Insufficient civic points"),
        (status = 403, description = "Citizen role required"),
        (status = 404, description = "Politician not found")
    )
)]
pub async fn create_question(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(req): ApiJson<QuestionCreate>,
) -> Result<Json<Question>, AppError> {
    user.require_role(UserRole::Citizen)?;
    req.validate()?;

    state
        .profile_store
        .get_politician(req.target_politician_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Politician not found".to_string()))?;

    if req.initial_stake > 0 && user.profile.civic_points < req.initial_stake {
        return Err(AppError::BadRequest("Insufficient civic points".to_string()));
    }

    let now = Utc::now();
    let new_question = NewQuestion {
        title: req.title,
        body: req.body,
        citizen_id: user.id(),
        target_politician_id: req.target_politician_id,
        total_bounty: req.initial_stake,
        status: QuestionStatus::Open,
        created_at: now,
        deadline: question_deadline(now, state.config.escrow_timeout_days),
    };

    let question = state
        .question_store
        .create(&new_question)
        .await
        .map_err(|e| {
            error!(error = %e, "Question insert failed");
            AppError::Internal("Failed to create question".to_string())
        })?;

    if req.initial_stake > 0 {
        state
            .profile_store
            .set_civic_points(user.id(), user.profile.civic_points - req.initial_stake)
            .await?;
        if let Err(e) = state
            .escrow_store
            .hold(user.id(), question.id, req.initial_stake)
            .await
        {
            error!(error = %e, question_id = %question.id, "Initial stake escrow failed, restoring points");
            state
                .profile_store
                .set_civic_points(user.id(), user.profile.civic_points)
                .await?;
            return Err(AppError::Internal("Failed to create escrow".to_string()));
        }
    }

    info!(
        question_id = %question.id,
        citizen_id = %user.id(),
        politician_id = %question.target_politician_id,
        initial_stake = req.initial_stake,
        "Question created"
    );

    Ok(Json(question))
}

/// List questions with optional filters
#[utoipa::path(
    get,
    path = "/questions",
    tag = "Questions",
    params(ListQuestionsParams),
    responses((status = 200, description = "Questions", body = [QuestionWithDetails]))
)]
pub async fn list_questions(
    State(state): State<AppState>,
    Extension(MaybeUser(_user)): Extension<MaybeUser>,
    ApiQuery(params): ApiQuery<ListQuestionsParams>,
) -> Result<Json<Vec<QuestionWithDetails>>, AppError> {
    params.validate()?;

    let filter = QuestionFilter {
        status: params.status,
        politician_id: params.politician_id,
        sort: params.sort_by,
        limit: params.limit,
        offset: params.offset,
    };
    let rows = state.question_store.list(&filter).await?;

    let details = try_join_all(rows.into_iter().map(|row| {
        let state = state.clone();
        async move {
            let question_id = row.question.id;
            let stakers = state.escrow_store.count_for_question(question_id).await?;
            let answer = state.answer_store.for_question(question_id).await?;
            Ok::<_, AppError>(QuestionWithDetails::from_row(row, stakers, answer.is_some()))
        }
    }))
    .await?;

    Ok(Json(details))
}

/// Question details by ID
#[utoipa::path(
    get,
    path = "/questions/{question_id}",
    tag = "Questions",
    params(("question_id" = Uuid, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Question", body = QuestionWithDetails),
        (status = 404, description = "Question not found")
    )
)]
pub async fn get_question(
    State(state): State<AppState>,
    ApiPath(question_id): ApiPath<Uuid>,
) -> Result<Json<QuestionWithDetails>, AppError> {
    let row = state
        .question_store
        .get_with_names(question_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let stakers = state.escrow_store.count_for_question(question_id).await?;
    let answer = state.answer_store.for_question(question_id).await?;

    let mut details = QuestionWithDetails::from_row(row, stakers, answer.is_some());
    if let Some(answer) = answer {
        let votes = state.answer_store.votes_for(answer.id).await?;
        let tally = VoteTally::from_votes(&votes);
        details.vote_count = tally.total;
        details.helpful_percentage = tally.helpful_percentage();
    }

    Ok(Json(details))
}

/// Ask the arbiter whether a similar open question already exists
#[utoipa::path(
    post,
    path = "/questions/duplicate-check",
    tag = "Questions",
    request_body = DuplicateCheckRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Duplicate verdict", body = DuplicateCheck),
        (status = 403, description = "Citizen role required")
    )
)]
pub async fn duplicate_check(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(req): ApiJson<DuplicateCheckRequest>,
) -> Result<Json<DuplicateCheck>, AppError> {
    user.require_role(UserRole::Citizen)?;

    let check = state
        .arbiter
        .check_duplicate_question(&req.title, &req.body, req.target_politician_id)
        .await;
    Ok(Json(check))
}
