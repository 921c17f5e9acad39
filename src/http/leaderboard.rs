//! Politician rankings and platform statistics

use axum::{
    extract::State,
    response::Json,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::http::auth::UserPublic;
use crate::http::error::AppError;
use crate::http::extract::{ApiPath, ApiQuery};
use crate::http::questions::default_limit;
use crate::store::answers::{AnswerWithQuestion, VoteTally};
use crate::store::escrow::{total_amount, EscrowStatus};
use crate::store::profiles::{rank_of, Profile, UserRole};
use crate::store::questions::{Question, QuestionStatus};
use crate::util::time::hours_between;

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Public profile plus performance figures
#[derive(Debug, Serialize, ToSchema)]
pub struct PoliticianStats {
    #[serde(flatten)]
    pub profile: UserPublic,
    pub questions_answered: u64,
    pub total_bounty_earned: i64,
    pub avg_response_time_hours: Option<f64>,
    pub satisfaction_rate: Option<f64>,
    pub rank: u64,
    /// Bounty still held on open questions
    pub open_bounty_total: i64,
    pub total_charity_released: i64,
    pub questions_received: u64,
}

/// Platform-wide totals
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_questions: u64,
    pub open_questions: u64,
    pub total_politicians: u64,
    pub total_citizens: u64,
    pub total_bounty_in_escrow: i64,
    pub total_released_to_charity: i64,
}

/// Mean hours between question and answer
fn average_response_hours(answers: &[AnswerWithQuestion]) -> Option<f64> {
    let hours: Vec<f64> = answers
        .iter()
        .filter_map(|row| {
            row.question
                .as_ref()
                .map(|q| hours_between(q.created_at, row.answer.created_at))
        })
        .collect();
    if hours.is_empty() {
        None
    } else {
        Some(hours.iter().sum::<f64>() / hours.len() as f64)
    }
}

async fn politician_stats(
    state: &AppState,
    profile: Profile,
    rank: u64,
) -> Result<PoliticianStats, AppError> {
    let answers = state.answer_store.by_politician(profile.id).await?;

    let answered_ids: Vec<Uuid> = answers
        .iter()
        .filter_map(|row| row.question.as_ref().map(|q| q.id))
        .collect();
    let released = state
        .escrow_store
        .for_questions(&answered_ids, Some(EscrowStatus::Released))
        .await?;
    let total_released = total_amount(&released, None);

    let answer_ids: Vec<Uuid> = answers.iter().map(|row| row.answer.id).collect();
    let votes = state.answer_store.votes_for_many(&answer_ids).await?;

    let received: Vec<Question> = state.question_store.for_politician(profile.id).await?;
    let open_ids: Vec<Uuid> = received
        .iter()
        .filter(|q| q.status == QuestionStatus::Open)
        .map(|q| q.id)
        .collect();
    let held = state
        .escrow_store
        .for_questions(&open_ids, Some(EscrowStatus::Held))
        .await?;

    Ok(PoliticianStats {
        profile: UserPublic::from(&profile),
        questions_answered: answers.len() as u64,
        total_bounty_earned: total_released,
        avg_response_time_hours: average_response_hours(&answers),
        satisfaction_rate: VoteTally::from_votes(&votes).helpful_percentage(),
        rank,
        open_bounty_total: total_amount(&held, None),
        total_charity_released: total_released,
        questions_received: received.len() as u64,
    })
}

/// Politicians ordered by rating
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "Leaderboard",
    params(LeaderboardParams),
    responses((status = 200, description = "Ranked politicians", body = [PoliticianStats]))
)]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LeaderboardParams>,
) -> Result<Json<Vec<PoliticianStats>>, AppError> {
    params.validate()?;

    let politicians = state
        .profile_store
        .list_politicians(params.limit, params.offset)
        .await?;

    let first_rank = u64::from(params.offset) + 1;
    let stats = try_join_all(
        politicians
            .into_iter()
            .enumerate()
            .map(|(i, profile)| politician_stats(&state, profile, first_rank + i as u64)),
    )
    .await?;

    Ok(Json(stats))
}

/// Detailed stats for one politician
#[utoipa::path(
    get,
    path = "/leaderboard/{politician_id}",
    tag = "Leaderboard",
    params(("politician_id" = Uuid, Path, description = "Politician ID")),
    responses(
        (status = 200, description = "Politician stats", body = PoliticianStats),
        (status = 404, description = "Politician not found")
    )
)]
pub async fn get_politician_stats(
    State(state): State<AppState>,
    ApiPath(politician_id): ApiPath<Uuid>,
) -> Result<Json<PoliticianStats>, AppError> {
    let profile = state
        .profile_store
        .get_politician(politician_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Politician not found".to_string()))?;

    let ranking = state.profile_store.politician_ranking().await?;
    let rank = rank_of(&ranking, politician_id);

    Ok(Json(politician_stats(&state, profile, rank).await?))
}

/// Platform-wide statistics
#[utoipa::path(
    get,
    path = "/leaderboard/stats/dashboard",
    tag = "Leaderboard",
    responses((status = 200, description = "Platform totals", body = DashboardStats))
)]
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    let (total_questions, open_questions, total_politicians, total_citizens, held, released) =
        futures::try_join!(
            state.question_store.count(None),
            state.question_store.count(Some(QuestionStatus::Open)),
            state.profile_store.count_by_role(UserRole::Politician),
            state.profile_store.count_by_role(UserRole::Citizen),
            state.escrow_store.with_status(EscrowStatus::Held),
            state.escrow_store.with_status(EscrowStatus::Released),
        )?;

    Ok(Json(DashboardStats {
        total_questions,
        open_questions,
        total_politicians,
        total_citizens,
        total_bounty_in_escrow: total_amount(&held, None),
        total_released_to_charity: total_amount(&released, None),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::answers::Answer;
    use crate::store::mock::{self, call, MockSupabase};
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_ranks_continue_from_offset() {
        let db = MockSupabase::start().await;
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        db.on(
            Method::GET,
            "/rest/v1/profiles",
            &["role=eq.politician", "order=mu.desc"],
            200,
            json!([
                mock::profile(first, "politician", 0),
                mock::profile(second, "politician", 0)
            ]),
        );

        let (status, body) = call(db.state(), Method::GET, "/leaderboard?offset=40", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], json!(first));
        assert_eq!(body[0]["rank"], 41);
        assert_eq!(body[1]["rank"], 42);

        let uri = format!("/leaderboard?offset={}", u32::MAX);
        let (status, body) = call(db.state(), Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["rank"], u64::from(u32::MAX) + 1);
        assert_eq!(body[1]["rank"], u64::from(u32::MAX) + 2);
    }

    fn answered_after(hours: i64) -> AnswerWithQuestion {
        let asked = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        AnswerWithQuestion {
            answer: Answer {
                id: Uuid::new_v4(),
                question_id: Uuid::nil(),
                politician_id: Uuid::nil(),
                content: "Answer".into(),
                video_url: None,
                ai_analysis: None,
                created_at: asked + Duration::hours(hours),
            },
            question: Some(Question {
                id: Uuid::new_v4(),
                title: "Q".into(),
                body: "B".into(),
                citizen_id: Uuid::nil(),
                target_politician_id: Uuid::nil(),
                total_bounty: 0,
                status: QuestionStatus::Answered,
                ai_directness_score: None,
                created_at: asked,
                deadline: asked + Duration::days(14),
            }),
        }
    }

    #[test]
    fn test_average_response_hours() {
        assert_eq!(average_response_hours(&[]), None);
        let rows = vec![answered_after(2), answered_after(10)];
        assert_eq!(average_response_hours(&rows), Some(6.0));
    }

    #[test]
    fn test_leaderboard_params() {
        let params: LeaderboardParams = serde_json::from_str(r#"{"offset": 40}"#).unwrap();
        assert_eq!(params.limit, 20);
        assert_eq!(params.offset, 40);
        assert!(params.validate().is_ok());
        let params: LeaderboardParams = serde_json::from_str(r#"{"limit": 500}"#).unwrap();
        assert!(params.validate().is_err());
    }
}
