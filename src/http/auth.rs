//! Registration, login and session endpoints

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::http::error::AppError;
use crate::http::extract::ApiJson;
use crate::http::middleware::{bearer_from_headers, CurrentUser};
use crate::store::auth::SignUpMetadata;
use crate::store::profiles::{NewProfile, Profile, UserRole};
use crate::util::rate_limit::check_key;

/// Registration payload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    pub display_name: String,
    pub role: UserRole,
}

/// Login payload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
}

/// Public user info (no sensitive data)
#[derive(Debug, Serialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub mu: f64,
    pub sigma: f64,
    /// mu - 3 sigma
    pub conservative_rating: f64,
}

impl From<&Profile> for UserPublic {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            display_name: profile.display_name.clone(),
            role: profile.role,
            avatar_url: profile.avatar_url.clone(),
            verified: profile.verified,
            mu: profile.mu,
            sigma: profile.sigma,
            conservative_rating: profile.rating().conservative(),
        }
    }
}

/// Full profile of the authenticated caller
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub mu: f64,
    pub sigma: f64,
    pub civic_points: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&CurrentUser> for UserProfile {
    fn from(user: &CurrentUser) -> Self {
        let p = &user.profile;
        Self {
            id: p.id,
            email: user.email.clone(),
            display_name: p.display_name.clone(),
            role: p.role,
            avatar_url: p.avatar_url.clone(),
            verified: p.verified,
            mu: p.mu,
            sigma: p.sigma,
            civic_points: p.civic_points,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new user (citizen or politician)
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered user", body = UserPublic),
        (status = 400, description = "Registration failed"),
        (status = 422, description = "Invalid payload"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<UserPublic>, AppError> {
    if !check_key(&state.auth_limiter, &req.email) {
        return Err(AppError::TooManyRequests);
    }
    req.validate()?;

    let metadata = SignUpMetadata {
        role: req.role.as_str().to_string(),
        display_name: req.display_name.clone(),
    };

    let user = state
        .auth
        .sign_up(&req.email, &req.password, &metadata)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // The signup trigger may already have created a bare profile
    let profile = NewProfile {
        id: user.id,
        display_name: req.display_name.clone(),
        role: req.role,
        verified: false,
        mu: state.config.default_mu,
        sigma: state.config.default_sigma,
        civic_points: state.config.initial_civic_points,
    };
    state
        .profile_store
        .upsert_profile(&profile)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    info!(user_id = %user.id, role = req.role.as_str(), "User registered");

    Ok(Json(UserPublic {
        id: user.id,
        display_name: req.display_name,
        role: req.role,
        avatar_url: None,
        verified: false,
        mu: state.config.default_mu,
        sigma: state.config.default_sigma,
        conservative_rating: state.config.default_mu - 3.0 * state.config.default_sigma,
    }))
}

/// Log in and get an access token
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if !check_key(&state.auth_limiter, &req.email) {
        return Err(AppError::TooManyRequests);
    }
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
    req.validate().map_err(|_| invalid())?;

    let session = state
        .auth
        .sign_in_with_password(&req.email, &req.password)
        .await
        .map_err(|e| {
            debug!(error = %e, "Password sign-in failed");
            invalid()
        })?;

    let profile = state
        .profile_store
        .get_profile(session.user.id)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %session.user.id, "Profile lookup failed on login");
            invalid()
        })?
        .ok_or_else(invalid)?;

    Ok(Json(LoginResponse {
        access_token: session.access_token,
        token_type: "bearer".to_string(),
        user: LoginUser {
            id: profile.id,
            email: session.user.email,
            display_name: profile.display_name,
            role: profile.role,
        },
    }))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller profile", body = UserProfile),
        (status = 401, description = "Authentication required")
    )
)]
pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// Log out; revokes the session when a token is supplied
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Authentication",
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Json<MessageResponse> {
    if let Some(token) = bearer_from_headers(&headers) {
        if let Err(e) = state.auth.sign_out(token).await {
            debug!(error = %e, "Sign-out failed");
        }
    }
    Json(MessageResponse {
        message: "Logged out".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest {
            email: "mayor@city.gov".into(),
            password: "hunter22".into(),
            display_name: "Mayor".into(),
            role: UserRole::Politician,
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            email: "not-an-email".into(),
            password: "123".into(),
            display_name: String::new(),
            role: UserRole::Citizen,
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("display_name"));
    }

    #[test]
    fn test_register_request_role_parsing() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@b.org","password":"secret1","display_name":"A","role":"citizen"}"#,
        )
        .unwrap();
        assert_eq!(req.role, UserRole::Citizen);
        assert!(serde_json::from_str::<RegisterRequest>(
            r#"{"email":"a@b.org","password":"secret1","display_name":"A","role":"admin"}"#
        )
        .is_err());
    }
}
