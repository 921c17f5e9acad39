//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{OpenApi, ToSchema};
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;
use crate::http::docs::{ApiDoc, OPENAPI_PATH};
use crate::http::middleware::{optional_auth, require_auth};
use crate::http::{answers, auth, bounties, leaderboard, questions};
use crate::util::time::uptime_secs;

/// Upper bound on a single request, including arbiter calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<String> = state
        .config
        .client_origin
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin
                .to_str()
                .map(|origin| origin_allowed(origin, &allowed_origins))
                .unwrap_or(false)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/questions/:question_id", get(questions::get_question))
        .route(
            "/bounties/questions/:question_id",
            get(bounties::get_bounty_details),
        )
        .route(
            "/answers/questions/:question_id",
            get(answers::get_question_answer),
        )
        .route("/leaderboard", get(leaderboard::get_leaderboard))
        .route(
            "/leaderboard/:politician_id",
            get(leaderboard::get_politician_stats),
        )
        .route(
            "/leaderboard/stats/dashboard",
            get(leaderboard::get_dashboard_stats),
        )
        .merge(SwaggerUi::new("/docs").url(OPENAPI_PATH, ApiDoc::openapi()))
        .merge(Redoc::with_url("/redoc", ApiDoc::openapi()));

    // Routes that personalise their reply when a token is present
    let optional_routes = Router::new()
        .route("/questions", get(questions::list_questions))
        .route("/answers/:answer_id/votes", get(answers::get_vote_summary))
        .layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/questions", post(questions::create_question))
        .route("/questions/duplicate-check", post(questions::duplicate_check))
        .route(
            "/bounties/questions/:question_id/stake",
            post(bounties::stake_points),
        )
        .route("/bounties/wallet", get(bounties::get_wallet))
        .route("/bounties/purchase", post(bounties::purchase_points))
        .route("/bounties/stats", get(bounties::escrow_stats))
        .route("/answers/questions/:question_id", post(answers::submit_answer))
        .route("/answers/:answer_id/vote", post(answers::vote_on_answer))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Configured origins plus Vercel preview deployments
fn origin_allowed(origin: &str, configured: &[String]) -> bool {
    if configured.iter().any(|allowed| allowed == origin) {
        return true;
    }
    origin
        .strip_prefix("https://")
        .and_then(|host| host.strip_suffix(".vercel.app"))
        .map(|name| !name.is_empty() && !name.contains('/'))
        .unwrap_or(false)
}

// ============================================================================
// System endpoints
// ============================================================================

#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    supabase_configured: bool,
    ai_configured: bool,
    escrow_timeout_days: i64,
    uptime_secs: u64,
}

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    tag = "System",
    responses((status = 200, description = "Service is up", body = RootResponse))
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "healthy",
        service: "CivicStake API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Configuration health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    responses((status = 200, description = "Health report", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        supabase_configured: state.config.supabase_configured(),
        ai_configured: state.config.ai_configured(),
        escrow_timeout_days: state.config.escrow_timeout_days,
        uptime_secs: uptime_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::Config;

    fn app_with(vars: &'static [(&'static str, &'static str)]) -> Router {
        let config = Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        build_router(AppState::new(config))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_root_banner() {
        let (status, body) = get_json(app_with(&[]), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "CivicStake API");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_reports_configuration() {
        let (status, body) = get_json(app_with(&[]), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["supabase_configured"], false);
        assert_eq!(body["ai_configured"], false);
        assert_eq!(body["escrow_timeout_days"], 14);

        let app = app_with(&[
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("GEMINI_API_KEY", "key"),
            ("ESCROW_TIMEOUT_DAYS", "7"),
        ]);
        let (_, body) = get_json(app, "/health").await;
        assert_eq!(body["supabase_configured"], true);
        assert_eq!(body["ai_configured"], true);
        assert_eq!(body["escrow_timeout_days"], 7);
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let (status, body) = get_json(app_with(&[]), "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["title"], "CivicStake API");
        assert!(body["paths"]["/bounties/wallet"].is_object());
    }

    #[tokio::test]
    async fn test_doc_pages_render() {
        for uri in ["/docs/", "/redoc"] {
            let response = app_with(&[])
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[test]
    fn test_origin_allowed() {
        let configured = vec!["http://localhost:3000".to_string()];
        assert!(origin_allowed("http://localhost:3000", &configured));
        assert!(origin_allowed("https://civicstake-git-main.vercel.app", &configured));
        assert!(!origin_allowed("http://civicstake.vercel.app", &configured));
        assert!(!origin_allowed("https://.vercel.app", &configured));
        assert!(!origin_allowed("https://evil.com/x.vercel.app", &configured));
        assert!(!origin_allowed("https://example.com", &configured));
    }

    #[tokio::test]
    async fn test_cors_allows_vercel_preview() {
        let response = app_with(&[("CLIENT_ORIGIN", "http://localhost:3000")])
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "https://civicstake-pr-12.vercel.app")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://civicstake-pr-12.vercel.app"
        );

        let response = app_with(&[("CLIENT_ORIGIN", "http://localhost:3000")])
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable() {
        for body in ["{}", "not json"] {
            let response = app_with(&[])
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/auth/login")
                        .header("Content-Type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(body["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn test_malformed_path_is_unprocessable() {
        let (status, body) = get_json(app_with(&[]), "/questions/not-a-uuid").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_query_is_unprocessable() {
        let (status, body) = get_json(app_with(&[]), "/leaderboard?offset=-1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (status, body) = get_json(app_with(&[]), "/auth/me").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Authentication required");

        let response = app_with(&[])
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bounties/purchase")
                    .header("Authorization", "Token abc")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"amount": 10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_locally() {
        let app = app_with(&[("SUPABASE_JWT_SECRET", "local-secret")]);
        let token = crate::http::middleware::tests::sign(
            &serde_json::json!({
                "sub": "6a3c1f6e-0000-4000-8000-000000000001",
                "exp": 4_000_000_000u64
            }),
            "other-secret",
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/bounties/wallet")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["detail"], "Invalid token");
    }
}
