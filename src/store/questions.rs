//! Questions table access

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};

/// Question lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Open,
    Answered,
    Expired,
    Flagged,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Open => "open",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Expired => "expired",
            QuestionStatus::Flagged => "flagged",
        }
    }
}

/// Listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSort {
    #[default]
    Bounty,
    Recent,
    Deadline,
}

impl QuestionSort {
    fn order_clause(&self) -> &'static str {
        match self {
            QuestionSort::Bounty => "order=total_bounty.desc",
            QuestionSort::Recent => "order=created_at.desc",
            QuestionSort::Deadline => "order=deadline.asc",
        }
    }
}

/// Row in the `questions` table
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub citizen_id: Uuid,
    pub target_politician_id: Uuid,
    #[serde(default)]
    pub total_bounty: i64,
    pub status: QuestionStatus,
    #[serde(default)]
    pub ai_directness_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Embedded `display_name` from a joined profile
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedName {
    pub display_name: String,
}

/// Question joined with citizen and politician names
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionWithNames {
    #[serde(flatten)]
    pub question: Question,
    #[serde(default)]
    pub citizen: Option<EmbeddedName>,
    #[serde(default)]
    pub politician: Option<EmbeddedName>,
}

/// Question as inserted
#[derive(Debug, Clone, Serialize)]
pub struct NewQuestion {
    pub title: String,
    pub body: String,
    pub citizen_id: Uuid,
    pub target_politician_id: Uuid,
    pub total_bounty: i64,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Filters for listing questions
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub status: Option<QuestionStatus>,
    pub politician_id: Option<Uuid>,
    pub sort: QuestionSort,
    pub limit: u32,
    pub offset: u32,
}

const WITH_NAMES: &str = "select=*,citizen:profiles!questions_citizen_id_fkey(display_name),politician:profiles!questions_target_politician_id_fkey(display_name)";

/// PostgREST query string for a filtered question listing
pub fn list_query(filter: &QuestionFilter) -> String {
    let mut parts = vec![WITH_NAMES.to_string()];
    if let Some(status) = filter.status {
        parts.push(format!("status=eq.{}", status.as_str()));
    }
    if let Some(politician_id) = filter.politician_id {
        parts.push(format!("target_politician_id=eq.{}", politician_id));
    }
    parts.push(filter.sort.order_clause().to_string());
    parts.push(format!("limit={}", filter.limit));
    parts.push(format!("offset={}", filter.offset));
    parts.join("&")
}

/// Timestamp in a form safe to embed in a query string (no `+` offset)
pub fn pg_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[derive(Deserialize)]
struct BountyRow {
    total_bounty: i64,
}

#[derive(Serialize)]
struct BountyUpdate {
    total_bounty: i64,
}

#[derive(Serialize)]
struct StatusUpdate {
    status: QuestionStatus,
}

#[derive(Serialize)]
struct AnsweredUpdate {
    status: QuestionStatus,
    ai_directness_score: Option<f64>,
}

/// Question store operations
#[derive(Clone)]
pub struct QuestionStore {
    client: SupabaseClient,
}

impl QuestionStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, question: &NewQuestion) -> Result<Question, SupabaseError> {
        self.client.insert("questions", question).await
    }

    pub async fn get(&self, question_id: Uuid) -> Result<Option<Question>, SupabaseError> {
        let query = format!("id=eq.{}", question_id);
        self.client.get_one("questions", &query).await
    }

    pub async fn get_with_names(
        &self,
        question_id: Uuid,
    ) -> Result<Option<QuestionWithNames>, SupabaseError> {
        let query = format!("{}&id=eq.{}", WITH_NAMES, question_id);
        self.client.get_one("questions", &query).await
    }

    pub async fn list(
        &self,
        filter: &QuestionFilter,
    ) -> Result<Vec<QuestionWithNames>, SupabaseError> {
        self.client.get("questions", &list_query(filter)).await
    }

    /// Open questions addressed to a politician, newest first
    pub async fn open_for_politician(
        &self,
        politician_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Question>, SupabaseError> {
        let query = format!(
            "target_politician_id=eq.{}&status=eq.open&order=created_at.desc&limit={}",
            politician_id, limit
        );
        self.client.get("questions", &query).await
    }

    /// Every question addressed to a politician
    pub async fn for_politician(&self, politician_id: Uuid) -> Result<Vec<Question>, SupabaseError> {
        let query = format!("target_politician_id=eq.{}", politician_id);
        self.client.get("questions", &query).await
    }

    /// Open questions whose deadline has passed
    pub async fn expired_open(&self, now: DateTime<Utc>) -> Result<Vec<Question>, SupabaseError> {
        let query = format!("status=eq.open&deadline=lt.{}", pg_timestamp(now));
        self.client.get("questions", &query).await
    }

    pub async fn set_status(
        &self,
        question_id: Uuid,
        status: QuestionStatus,
    ) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", question_id);
        self.client
            .update("questions", &query, &StatusUpdate { status })
            .await
    }

    /// Mark answered and record the arbiter's score
    pub async fn mark_answered(
        &self,
        question_id: Uuid,
        ai_directness_score: Option<f64>,
    ) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", question_id);
        self.client
            .update(
                "questions",
                &query,
                &AnsweredUpdate {
                    status: QuestionStatus::Answered,
                    ai_directness_score,
                },
            )
            .await
    }

    /// Increase the total bounty; returns the new total
    pub async fn add_bounty(&self, question_id: Uuid, amount: i64) -> Result<i64, SupabaseError> {
        let query = format!("id=eq.{}", question_id);
        let current: Option<BountyRow> = self
            .client
            .get_one("questions", &format!("{}&select=total_bounty", query))
            .await?;
        let total = current.map(|row| row.total_bounty).unwrap_or(0) + amount;
        self.client
            .update("questions", &query, &BountyUpdate { total_bounty: total })
            .await?;
        Ok(total)
    }

    pub async fn count(&self, status: Option<QuestionStatus>) -> Result<u64, SupabaseError> {
        let query = status
            .map(|s| format!("status=eq.{}", s.as_str()))
            .unwrap_or_default();
        self.client.count("questions", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_list_query_defaults() {
        let filter = QuestionFilter {
            limit: 20,
            ..Default::default()
        };
        let query = list_query(&filter);
        assert!(query.starts_with(WITH_NAMES));
        assert!(query.ends_with("order=total_bounty.desc&limit=20&offset=0"));
        assert!(!query.contains("status=eq."));
    }

    #[test]
    fn test_list_query_filters() {
        let politician = Uuid::nil();
        let filter = QuestionFilter {
            status: Some(QuestionStatus::Open),
            politician_id: Some(politician),
            sort: QuestionSort::Deadline,
            limit: 5,
            offset: 10,
        };
        let query = list_query(&filter);
        assert!(query.contains("status=eq.open"));
        assert!(query.contains(&format!("target_politician_id=eq.{}", politician)));
        assert!(query.contains("order=deadline.asc"));
        assert!(query.contains("limit=5&offset=10"));
    }

    #[test]
    fn test_pg_timestamp_has_no_plus() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(pg_timestamp(at), "2024-05-01T12:30:00.000000Z");
    }

    #[test]
    fn test_question_with_names_parses_embeds() {
        let raw = r#"{
            "id": "6a3c1f6e-0000-4000-8000-000000000001",
            "title": "Potholes",
            "body": "When will Main St be fixed?",
            "citizen_id": "6a3c1f6e-0000-4000-8000-000000000002",
            "target_politician_id": "6a3c1f6e-0000-4000-8000-000000000003",
            "total_bounty": 40,
            "status": "open",
            "ai_directness_score": null,
            "created_at": "2024-03-01T10:00:00+00:00",
            "deadline": "2024-03-15T10:00:00+00:00",
            "citizen": {"display_name": "Cit"},
            "politician": null
        }"#;
        let row: QuestionWithNames = serde_json::from_str(raw).unwrap();
        assert_eq!(row.question.total_bounty, 40);
        assert_eq!(row.citizen.unwrap().display_name, "Cit");
        assert!(row.politician.is_none());
    }
}
