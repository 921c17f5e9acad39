//! Authentication middleware and JWT verification

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::error::AppError;
use crate::store::profiles::{Profile, UserRole};

type HmacSha256 = Hmac<Sha256>;

/// JWT claims from Supabase auth token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Email (if available)
    #[serde(default)]
    pub email: Option<String>,
}

/// Verify a JWT token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    verify_jwt_at(token, secret, chrono::Utc::now().timestamp().max(0) as u64)
}

fn verify_jwt_at(token: &str, secret: &str, now: u64) -> Result<JwtClaims, AuthError> {
    // Split token into parts
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    // Verify signature (HMAC-SHA256)
    let message = format!("{}.{}", header_b64, payload_b64);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    // Decode payload
    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: JwtClaims = serde_json::from_slice(&payload_json)
        .map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Extract JWT from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Bearer token from request headers, if any
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Authentication backend unavailable")]
    Upstream,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingHeader => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::ProfileNotFound => StatusCode::UNAUTHORIZED,
            AuthError::Upstream => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Authenticated caller with their profile
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile: Profile,
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.profile.id
    }

    pub fn role(&self) -> UserRole {
        self.profile.role
    }

    /// Fail with 403 unless the caller has the given role
    pub fn require_role(&self, role: UserRole) -> Result<(), AppError> {
        if self.profile.role == role {
            return Ok(());
        }
        let label = match role {
            UserRole::Citizen => "Citizen",
            UserRole::Politician => "Politician",
        };
        Err(AppError::Forbidden(format!("{} role required", label)))
    }
}

/// Caller on routes where authentication is optional
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

/// Resolve a bearer token to the caller's profile
pub async fn resolve_user(state: &AppState, token: &str) -> Result<CurrentUser, AuthError> {
    let (user_id, email) = match &state.config.supabase_jwt_secret {
        Some(secret) => {
            let claims = verify_jwt(token, secret)?;
            (claims.sub, claims.email)
        }
        None => {
            let user = state.auth.get_user(token).await.map_err(|e| {
                debug!(error = %e, "Token introspection failed");
                AuthError::InvalidToken
            })?;
            (user.id, user.email)
        }
    };

    let profile = state
        .profile_store
        .get_profile(user_id)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Profile lookup failed");
            AuthError::Upstream
        })?
        .ok_or(AuthError::ProfileNotFound)?;

    Ok(CurrentUser { profile, email })
}

/// Middleware to require authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    let token = extract_bearer_token(auth_header).ok_or(AuthError::InvalidFormat)?;

    let user = resolve_user(&state, token).await?;

    // Insert into request extensions for handlers to access
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Middleware that attaches the caller when a valid token is present
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match bearer_from_headers(request.headers()) {
        Some(token) => resolve_user(&state, token).await.ok(),
        None => None,
    };

    request.extensions_mut().insert(MaybeUser(user));
    next.run(request).await
}
