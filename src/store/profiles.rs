//! User profile management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};
use crate::services::ranking::Rating;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Citizen,
    Politician,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Citizen => "citizen",
            UserRole::Politician => "politician",
        }
    }
}

fn default_mu() -> f64 {
    25.0
}

fn default_sigma() -> f64 {
    8.333
}

fn default_points() -> i64 {
    100
}

/// Row in the `profiles` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default = "default_mu")]
    pub mu: f64,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    #[serde(default = "default_points")]
    pub civic_points: i64,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma)
    }
}

/// Profile written on registration
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    pub verified: bool,
    pub mu: f64,
    pub sigma: f64,
    pub civic_points: i64,
}

/// Politician id in mu order
#[derive(Debug, Clone, Deserialize)]
pub struct RankEntry {
    pub id: Uuid,
}

#[derive(Deserialize)]
struct PointsRow {
    civic_points: i64,
}

#[derive(Serialize)]
struct PointsUpdate {
    civic_points: i64,
}

#[derive(Serialize)]
struct RatingUpdate {
    mu: f64,
    sigma: f64,
}

/// Profile store operations
#[derive(Clone)]
pub struct ProfileStore {
    client: SupabaseClient,
}

impl ProfileStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Get a user profile by ID
    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, SupabaseError> {
        let query = format!("id=eq.{}", user_id);
        self.client.get_one("profiles", &query).await
    }

    /// Get a profile only if it belongs to a politician
    pub async fn get_politician(&self, user_id: Uuid) -> Result<Option<Profile>, SupabaseError> {
        let query = format!("id=eq.{}&role=eq.politician", user_id);
        self.client.get_one("profiles", &query).await
    }

    /// Create or overwrite a profile (the signup trigger may have created one already)
    pub async fn upsert_profile(&self, profile: &NewProfile) -> Result<(), SupabaseError> {
        self.client.upsert("profiles", profile, "id").await
    }

    /// Current civic point balance
    pub async fn civic_points(&self, user_id: Uuid) -> Result<Option<i64>, SupabaseError> {
        let query = format!("id=eq.{}&select=civic_points", user_id);
        let row: Option<PointsRow> = self.client.get_one("profiles", &query).await?;
        Ok(row.map(|r| r.civic_points))
    }

    /// Overwrite the civic point balance
    pub async fn set_civic_points(&self, user_id: Uuid, points: i64) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", user_id);
        self.client
            .update("profiles", &query, &PointsUpdate { civic_points: points })
            .await
    }

    /// Add (or with a negative delta, remove) civic points; returns the new balance
    pub async fn adjust_civic_points(
        &self,
        user_id: Uuid,
        delta: i64,
    ) -> Result<Option<i64>, SupabaseError> {
        let Some(current) = self.civic_points(user_id).await? else {
            return Ok(None);
        };
        let balance = current + delta;
        self.set_civic_points(user_id, balance).await?;
        Ok(Some(balance))
    }

    /// Persist a new rating
    pub async fn set_rating(&self, user_id: Uuid, rating: Rating) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", user_id);
        self.client
            .update(
                "profiles",
                &query,
                &RatingUpdate {
                    mu: rating.mu,
                    sigma: rating.sigma,
                },
            )
            .await
    }

    /// Page of politicians ordered by rating mean
    pub async fn list_politicians(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Profile>, SupabaseError> {
        let query = format!(
            "role=eq.politician&order=mu.desc&limit={}&offset={}",
            limit, offset
        );
        self.client.get("profiles", &query).await
    }

    /// All politician ids ordered by rating mean
    pub async fn politician_ranking(&self) -> Result<Vec<RankEntry>, SupabaseError> {
        self.client
            .get("profiles", "role=eq.politician&select=id&order=mu.desc")
            .await
    }

    /// Number of profiles with a role
    pub async fn count_by_role(&self, role: UserRole) -> Result<u64, SupabaseError> {
        let query = format!("role=eq.{}", role.as_str());
        self.client.count("profiles", &query).await
    }
}

/// 1-based position of a politician in a mu-ordered ranking
pub fn rank_of(ranking: &[RankEntry], politician_id: Uuid) -> u64 {
    ranking
        .iter()
        .position(|entry| entry.id == politician_id)
        .unwrap_or(ranking.len()) as u64
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_row_defaults() {
        let raw = r#"{
            "id": "6a3c1f6e-0000-4000-8000-000000000001",
            "display_name": "Ada",
            "role": "politician",
            "created_at": "2024-03-01T10:00:00.123456+00:00"
        }"#;
        let profile: Profile = serde_json::from_str(raw).unwrap();
        assert_eq!(profile.role, UserRole::Politician);
        assert!(!profile.verified);
        assert_eq!(profile.civic_points, 100);
        assert_eq!(profile.rating(), Rating::new(25.0, 8.333));
    }

    #[test]
    fn test_rank_of() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ranking = vec![RankEntry { id: a }, RankEntry { id: b }];
        assert_eq!(rank_of(&ranking, a), 1);
        assert_eq!(rank_of(&ranking, b), 2);
        assert_eq!(rank_of(&ranking, Uuid::new_v4()), 3);
    }
}
