//! OpenAPI document served by Swagger UI and Redoc

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::http::{answers, auth, bounties, leaderboard, questions, routes};
use crate::services::arbiter::{AiAnalysis, DuplicateCheck};
use crate::services::escrow::EscrowStats;
use crate::store::answers::{Answer, Vote};
use crate::store::escrow::{EscrowStatus, EscrowTransaction};
use crate::store::profiles::UserRole;
use crate::store::questions::{Question, QuestionSort, QuestionStatus};

pub const OPENAPI_PATH: &str = "/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CivicStake API",
        version = "1.0.0",
        description = "Citizens stake civic points on questions to politicians; bounties go to charity once an answer is judged direct."
    ),
    paths(
        routes::root,
        routes::health,
        auth::register,
        auth::login,
        auth::me,
        auth::logout,
        questions::create_question,
        questions::list_questions,
        questions::get_question,
        questions::duplicate_check,
        bounties::stake_points,
        bounties::get_bounty_details,
        bounties::get_wallet,
        bounties::purchase_points,
        bounties::escrow_stats,
        answers::submit_answer,
        answers::get_question_answer,
        answers::vote_on_answer,
        answers::get_vote_summary,
        leaderboard::get_leaderboard,
        leaderboard::get_politician_stats,
        leaderboard::get_dashboard_stats,
    ),
    components(schemas(
        routes::RootResponse,
        routes::HealthResponse,
        UserRole,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::UserPublic,
        auth::UserProfile,
        auth::LoginUser,
        auth::LoginResponse,
        auth::MessageResponse,
        Question,
        QuestionStatus,
        QuestionSort,
        questions::QuestionCreate,
        questions::DuplicateCheckRequest,
        questions::QuestionWithDetails,
        DuplicateCheck,
        EscrowTransaction,
        EscrowStatus,
        EscrowStats,
        bounties::StakeCreate,
        bounties::PointsPurchase,
        bounties::BountyContributor,
        bounties::QuestionBounty,
        bounties::WalletInfo,
        Answer,
        AiAnalysis,
        Vote,
        answers::AnswerCreate,
        answers::VoteCreate,
        answers::AnswerWithVotes,
        answers::VoteSummary,
        leaderboard::PoliticianStats,
        leaderboard::DashboardStats,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "System", description = "Service status"),
        (name = "Authentication", description = "Registration and sessions"),
        (name = "Questions", description = "Questions addressed to politicians"),
        (name = "Bounties", description = "Staking, escrow and wallets"),
        (name = "Answers", description = "Answers and staker votes"),
        (name = "Leaderboard", description = "Politician rankings"),
    )
)]
pub struct ApiDoc;

/// Registers the Supabase access token as a bearer scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/",
            "/health",
            "/auth/register",
            "/auth/login",
            "/questions",
            "/questions/{question_id}",
            "/bounties/questions/{question_id}/stake",
            "/bounties/wallet",
            "/answers/{answer_id}/vote",
            "/leaderboard/{politician_id}",
            "/leaderboard/stats/dashboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
