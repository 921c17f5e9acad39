//! Supabase Auth (GoTrue) client

use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{check_status, SupabaseError};
use crate::config::Config;

/// User record returned by GoTrue
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session returned by a password grant
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Sign-up replies are a session when autoconfirm is on, a bare user otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpReply {
    Session(AuthSession),
    User(AuthUser),
}

/// Metadata stored with the auth user and read by the profile trigger
#[derive(Debug, Clone, Serialize)]
pub struct SignUpMetadata {
    pub role: String,
    pub display_name: String,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a SignUpMetadata,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

/// GoTrue operations, authenticated with the anon key
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Create an auth user
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthUser, SupabaseError> {
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&SignUpBody {
                email,
                password,
                data: metadata,
            })
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        let reply: SignUpReply = response.json().await.map_err(SupabaseError::Parse)?;
        Ok(match reply {
            SignUpReply::Session(session) => session.user,
            SignUpReply::User(user) => user,
        })
    }

    /// Exchange email and password for a session
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, SupabaseError> {
        let response = self
            .client
            .post(self.auth_url("token?grant_type=password"))
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Resolve the user behind an access token
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, SupabaseError> {
        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Revoke the session behind an access token
    pub async fn sign_out(&self, access_token: &str) -> Result<(), SupabaseError> {
        let response = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check_status(response).await?;
        Ok(())
    }
}
