//! Answers and votes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::questions::Question;
use super::supabase::{in_list, SupabaseClient, SupabaseError};
use crate::services::arbiter::AiAnalysis;

/// Row in the `answers` table
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub politician_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
    pub created_at: DateTime<Utc>,
}

/// Answer joined with its question
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerWithQuestion {
    #[serde(flatten)]
    pub answer: Answer,
    #[serde(default)]
    pub question: Option<Question>,
}

/// Answer as inserted
#[derive(Debug, Clone, Serialize)]
pub struct NewAnswer {
    pub question_id: Uuid,
    pub politician_id: Uuid,
    pub content: String,
    pub video_url: Option<String>,
    pub ai_analysis: Option<AiAnalysis>,
    pub created_at: DateTime<Utc>,
}

/// Row in the `votes` table
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Vote {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub citizen_id: Uuid,
    pub is_helpful: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewVote {
    pub answer_id: Uuid,
    pub citizen_id: Uuid,
    pub is_helpful: bool,
    pub created_at: DateTime<Utc>,
}

/// Helpful/evasive breakdown of a set of votes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub total: u64,
    pub helpful: u64,
}

impl VoteTally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        votes.into_iter().fold(Self::default(), |mut tally, vote| {
            tally.total += 1;
            if vote.is_helpful {
                tally.helpful += 1;
            }
            tally
        })
    }

    pub fn evasive(&self) -> u64 {
        self.total - self.helpful
    }

    /// Share of helpful votes in percent; `None` without votes
    pub fn helpful_percentage(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.helpful as f64 / self.total as f64 * 100.0)
        }
    }
}

#[derive(Serialize)]
struct VoteUpdate {
    is_helpful: bool,
}

/// Answer and vote store operations
#[derive(Clone)]
pub struct AnswerStore {
    client: SupabaseClient,
}

impl AnswerStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, answer: &NewAnswer) -> Result<Answer, SupabaseError> {
        self.client.insert("answers", answer).await
    }

    pub async fn get(&self, answer_id: Uuid) -> Result<Option<Answer>, SupabaseError> {
        let query = format!("id=eq.{}", answer_id);
        self.client.get_one("answers", &query).await
    }

    /// The answer to a question, if any
    pub async fn for_question(&self, question_id: Uuid) -> Result<Option<Answer>, SupabaseError> {
        let query = format!("question_id=eq.{}&order=created_at.asc&limit=1", question_id);
        let answers: Vec<Answer> = self.client.get("answers", &query).await?;
        Ok(answers.into_iter().next())
    }

    /// Answers written by a politician, with their questions
    pub async fn by_politician(
        &self,
        politician_id: Uuid,
    ) -> Result<Vec<AnswerWithQuestion>, SupabaseError> {
        let query = format!("politician_id=eq.{}&select=*,question:questions(*)", politician_id);
        self.client.get("answers", &query).await
    }

    pub async fn votes_for(&self, answer_id: Uuid) -> Result<Vec<Vote>, SupabaseError> {
        let query = format!("answer_id=eq.{}", answer_id);
        self.client.get("votes", &query).await
    }

    pub async fn votes_for_many(&self, answer_ids: &[Uuid]) -> Result<Vec<Vote>, SupabaseError> {
        if answer_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("answer_id={}", in_list(answer_ids));
        self.client.get("votes", &query).await
    }

    pub async fn find_vote(
        &self,
        answer_id: Uuid,
        citizen_id: Uuid,
    ) -> Result<Option<Vote>, SupabaseError> {
        let query = format!("answer_id=eq.{}&citizen_id=eq.{}", answer_id, citizen_id);
        let votes: Vec<Vote> = self.client.get("votes", &query).await?;
        Ok(votes.into_iter().next())
    }

    /// Record a vote, replacing the citizen's earlier vote on the same answer
    pub async fn cast_vote(
        &self,
        answer_id: Uuid,
        citizen_id: Uuid,
        is_helpful: bool,
    ) -> Result<Vote, SupabaseError> {
        if let Some(existing) = self.find_vote(answer_id, citizen_id).await? {
            let query = format!("id=eq.{}", existing.id);
            self.client
                .update("votes", &query, &VoteUpdate { is_helpful })
                .await?;
            return Ok(Vote {
                is_helpful,
                ..existing
            });
        }

        let vote = NewVote {
            answer_id,
            citizen_id,
            is_helpful,
            created_at: Utc::now(),
        };
        self.client.insert("votes", &vote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(is_helpful: bool) -> Vote {
        Vote {
            id: Uuid::new_v4(),
            answer_id: Uuid::nil(),
            citizen_id: Uuid::new_v4(),
            is_helpful,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tally() {
        let votes = vec![vote(true), vote(false), vote(true), vote(true)];
        let tally = VoteTally::from_votes(&votes);
        assert_eq!(tally.total, 4);
        assert_eq!(tally.helpful, 3);
        assert_eq!(tally.evasive(), 1);
        assert_eq!(tally.helpful_percentage(), Some(75.0));
    }

    #[test]
    fn test_empty_tally_has_no_percentage() {
        let tally = VoteTally::from_votes(&Vec::<Vote>::new());
        assert_eq!(tally.total, 0);
        assert_eq!(tally.helpful_percentage(), None);
    }

    #[test]
    fn test_answer_with_question_parses() {
        let raw = r#"{
            "id": "6a3c1f6e-0000-4000-8000-000000000010",
            "question_id": "6a3c1f6e-0000-4000-8000-000000000001",
            "politician_id": "6a3c1f6e-0000-4000-8000-000000000003",
            "content": "Next month.",
            "video_url": null,
            "ai_analysis": {"directness_score": 82.5, "summary": "Direct", "flags": []},
            "created_at": "2024-03-02T10:00:00+00:00",
            "question": {
                "id": "6a3c1f6e-0000-4000-8000-000000000001",
                "title": "Potholes",
                "body": "When?",
                "citizen_id": "6a3c1f6e-0000-4000-8000-000000000002",
                "target_politician_id": "6a3c1f6e-0000-4000-8000-000000000003",
                "total_bounty": 10,
                "status": "answered",
                "created_at": "2024-03-01T10:00:00+00:00",
                "deadline": "2024-03-15T10:00:00+00:00"
            }
        }"#;
        let row: AnswerWithQuestion = serde_json::from_str(raw).unwrap();
        assert_eq!(row.answer.ai_analysis.unwrap().directness_score, 82.5);
        assert_eq!(row.question.unwrap().total_bounty, 10);
    }
}
