//! Answer submission and voting endpoints

use axum::{
    extract::{Extension, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::http::error::AppError;
use crate::http::extract::{ApiJson, ApiPath};
use crate::http::middleware::{CurrentUser, MaybeUser};
use crate::services::arbiter::AiAnalysis;
use crate::store::answers::{Answer, NewAnswer, Vote, VoteTally};
use crate::store::profiles::UserRole;
use crate::store::questions::QuestionStatus;
use crate::util::time::hours_between;

/// Payload to submit an answer
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AnswerCreate {
    #[validate(length(min = 1, message = "Answer must not be empty"))]
    pub content: String,
    #[serde(default)]
    #[validate(url(message = "Invalid video URL"))]
    pub video_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteCreate {
    pub is_helpful: bool,
}

/// Answer with its vote counts
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerWithVotes {
    pub id: Uuid,
    pub question_id: Uuid,
    pub politician_id: Uuid,
    pub content: String,
    pub video_url: Option<String>,
    pub ai_analysis: Option<AiAnalysis>,
    pub created_at: DateTime<Utc>,
    pub total_votes: u64,
    pub helpful_votes: u64,
    pub evasive_votes: u64,
    pub helpful_percentage: Option<f64>,
}

impl AnswerWithVotes {
    fn new(answer: Answer, tally: VoteTally) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            politician_id: answer.politician_id,
            content: answer.content,
            video_url: answer.video_url,
            ai_analysis: answer.ai_analysis,
            created_at: answer.created_at,
            total_votes: tally.total,
            helpful_votes: tally.helpful,
            evasive_votes: tally.evasive(),
            helpful_percentage: tally.helpful_percentage(),
        }
    }
}

/// Vote breakdown for an answer
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteSummary {
    pub answer_id: Uuid,
    pub total_votes: u64,
    pub helpful_votes: u64,
    pub evasive_votes: u64,
    pub helpful_percentage: Option<f64>,
    /// The caller's own vote, when authenticated and voted
    pub user_vote: Option<bool>,
}

impl VoteSummary {
    fn from_votes(answer_id: Uuid, votes: &[Vote], caller: Option<Uuid>) -> Self {
        let tally = VoteTally::from_votes(votes);
        let user_vote = caller.and_then(|id| {
            votes
                .iter()
                .find(|v| v.citizen_id == id)
                .map(|v| v.is_helpful)
        });
        Self {
            answer_id,
            total_votes: tally.total,
            helpful_votes: tally.helpful,
            evasive_votes: tally.evasive(),
            helpful_percentage: tally.helpful_percentage(),
            user_vote,
        }
    }
}

/// Answer a question addressed to the caller
#[utoipa::path(
    post,
    path = "/answers/questions/{question_id}",
    tag = "Answers",
    params(("question_id" = Uuid, Path, description = "Question ID")),
    request_body = AnswerCreate,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Submitted answer", body = AnswerWithVotes),
        (status = 400, description = "Question closed or already answered"),
        (status = 403, description = "Not the addressed politician"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(question_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AnswerCreate>,
) -> Result<Json<AnswerWithVotes>, AppError> {
    user.require_role(UserRole::Politician)?;
    req.validate()?;

    let question = state
        .question_store
        .get(question_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    if question.target_politician_id != user.id() {
        return Err(AppError::Forbidden(
            "This question is not addressed to you".to_string(),
        ));
    }
    if question.status != QuestionStatus::Open {
        return Err(AppError::BadRequest(
            "Question is not open for answers".to_string(),
        ));
    }
    if state.answer_store.for_question(question_id).await?.is_some() {
        return Err(AppError::BadRequest("Question already answered".to_string()));
    }

    let analysis = state
        .arbiter
        .analyze_answer_directness(&question.title, &question.body, &req.content)
        .await;
    let score = analysis.directness_score;

    let now = Utc::now();
    let new_answer = NewAnswer {
        question_id,
        politician_id: user.id(),
        content: req.content,
        video_url: req.video_url,
        ai_analysis: Some(analysis),
        created_at: now,
    };
    let answer = state
        .answer_store
        .create(&new_answer)
        .await
        .map_err(|e| {
            error!(error = %e, question_id = %question_id, "Answer insert failed");
            AppError::Internal("Failed to submit answer".to_string())
        })?;

    state
        .question_store
        .mark_answered(question_id, Some(score))
        .await?;

    let response_hours = hours_between(question.created_at, now);
    if let Err(e) = state
        .ranking
        .update_rating_on_answer(user.id(), question.total_bounty, response_hours, None)
        .await
    {
        warn!(error = %e, politician_id = %user.id(), "Rating update failed");
    }

    info!(
        question_id = %question_id,
        answer_id = %answer.id,
        directness_score = score,
        response_hours,
        "Answer submitted"
    );

    Ok(Json(AnswerWithVotes::new(answer, VoteTally::default())))
}

/// The answer to a question, with vote counts
#[utoipa::path(
    get,
    path = "/answers/questions/{question_id}",
    tag = "Answers",
    params(("question_id" = Uuid, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Answer", body = AnswerWithVotes),
        (status = 404, description = "No answer found")
    )
)]
pub async fn get_question_answer(
    State(state): State<AppState>,
    ApiPath(question_id): ApiPath<Uuid>,
) -> Result<Json<AnswerWithVotes>, AppError> {
    let answer = state
        .answer_store
        .for_question(question_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No answer found".to_string()))?;

    let votes = state.answer_store.votes_for(answer.id).await?;
    Ok(Json(AnswerWithVotes::new(answer, VoteTally::from_votes(&votes))))
}

/// Vote on an answer; only stakers of the question may vote
#[utoipa::path(
    post,
    path = "/answers/{answer_id}/vote",
    tag = "Answers",
    params(("answer_id" = Uuid, Path, description = "Answer ID")),
    request_body = VoteCreate,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Recorded vote", body = Vote),
        (status = 403, description = "Caller has not staked on the question"),
        (status = 404, description = "Answer not found")
    )
)]
pub async fn vote_on_answer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(answer_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<VoteCreate>,
) -> Result<Json<Vote>, AppError> {
    user.require_role(UserRole::Citizen)?;

    let answer = state
        .answer_store
        .get(answer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))?;

    if !state
        .escrow_store
        .has_staked(user.id(), answer.question_id)
        .await?
    {
        return Err(AppError::Forbidden(
            "Only stakers can vote on answers".to_string(),
        ));
    }

    let vote = state
        .answer_store
        .cast_vote(answer_id, user.id(), req.is_helpful)
        .await?;

    match state.escrow.check_and_release_escrow(answer.question_id).await {
        Ok(true) => info!(question_id = %answer.question_id, "Escrow released after vote"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, question_id = %answer.question_id, "Escrow release check failed"),
    }

    Ok(Json(vote))
}

/// Vote breakdown for an answer
#[utoipa::path(
    get,
    path = "/answers/{answer_id}/votes",
    tag = "Answers",
    params(("answer_id" = Uuid, Path, description = "Answer ID")),
    responses((status = 200, description = "Vote summary", body = VoteSummary))
)]
pub async fn get_vote_summary(
    State(state): State<AppState>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    ApiPath(answer_id): ApiPath<Uuid>,
) -> Result<Json<VoteSummary>, AppError> {
    let votes = state.answer_store.votes_for(answer_id).await?;
    let caller = user.as_ref().map(CurrentUser::id);
    Ok(Json(VoteSummary::from_votes(answer_id, &votes, caller)))
}
