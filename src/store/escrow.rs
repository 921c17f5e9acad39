//! Escrow records for staked civic points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::questions::EmbeddedName;
use super::supabase::{in_list, SupabaseClient, SupabaseError};

/// Escrow transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        }
    }
}

/// Row in the `escrow` table
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscrowTransaction {
    pub id: Uuid,
    pub citizen_id: Uuid,
    pub question_id: Uuid,
    pub amount: i64,
    pub status: EscrowStatus,
    #[serde(default)]
    pub charity_id: Option<String>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Escrow row joined with the staking citizen's name
#[derive(Debug, Clone, Deserialize)]
pub struct EscrowWithCitizen {
    #[serde(flatten)]
    pub escrow: EscrowTransaction,
    #[serde(default)]
    pub citizen: Option<EmbeddedName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEscrow {
    pub citizen_id: Uuid,
    pub question_id: Uuid,
    pub amount: i64,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SettleUpdate<'a> {
    status: EscrowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    charity_id: Option<&'a str>,
    released_at: Option<DateTime<Utc>>,
}

/// Sum of amounts, optionally restricted to one status
pub fn total_amount(rows: &[EscrowTransaction], status: Option<EscrowStatus>) -> i64 {
    rows.iter()
        .filter(|row| status.map_or(true, |s| row.status == s))
        .map(|row| row.amount)
        .sum()
}

/// Escrow store operations
#[derive(Clone)]
pub struct EscrowStore {
    client: SupabaseClient,
}

impl EscrowStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Hold a stake
    pub async fn hold(
        &self,
        citizen_id: Uuid,
        question_id: Uuid,
        amount: i64,
    ) -> Result<EscrowTransaction, SupabaseError> {
        let row = NewEscrow {
            citizen_id,
            question_id,
            amount,
            status: EscrowStatus::Held,
            created_at: Utc::now(),
        };
        self.client.insert("escrow", &row).await
    }

    pub async fn for_question(
        &self,
        question_id: Uuid,
        status: Option<EscrowStatus>,
    ) -> Result<Vec<EscrowTransaction>, SupabaseError> {
        let mut query = format!("question_id=eq.{}", question_id);
        if let Some(status) = status {
            query.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        self.client.get("escrow", &query).await
    }

    /// Escrow rows for several questions at once
    pub async fn for_questions(
        &self,
        question_ids: &[Uuid],
        status: Option<EscrowStatus>,
    ) -> Result<Vec<EscrowTransaction>, SupabaseError> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = format!("question_id={}", in_list(question_ids));
        if let Some(status) = status {
            query.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        self.client.get("escrow", &query).await
    }

    /// Stakes on a question with contributor names
    pub async fn contributors(
        &self,
        question_id: Uuid,
    ) -> Result<Vec<EscrowWithCitizen>, SupabaseError> {
        let query = format!(
            "question_id=eq.{}&select=*,citizen:profiles!escrow_citizen_id_fkey(display_name)&order=created_at.asc",
            question_id
        );
        self.client.get("escrow", &query).await
    }

    pub async fn count_for_question(&self, question_id: Uuid) -> Result<u64, SupabaseError> {
        let query = format!("question_id=eq.{}", question_id);
        self.client.count("escrow", &query).await
    }

    pub async fn has_staked(&self, citizen_id: Uuid, question_id: Uuid) -> Result<bool, SupabaseError> {
        let query = format!("citizen_id=eq.{}&question_id=eq.{}", citizen_id, question_id);
        Ok(self.client.count("escrow", &query).await? > 0)
    }

    pub async fn for_citizen(
        &self,
        citizen_id: Uuid,
        status: Option<EscrowStatus>,
    ) -> Result<Vec<EscrowTransaction>, SupabaseError> {
        let mut query = format!("citizen_id=eq.{}", citizen_id);
        if let Some(status) = status {
            query.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        self.client.get("escrow", &query).await
    }

    pub async fn with_status(
        &self,
        status: EscrowStatus,
    ) -> Result<Vec<EscrowTransaction>, SupabaseError> {
        let query = format!("status=eq.{}&select=*", status.as_str());
        self.client.get("escrow", &query).await
    }

    /// Move a held row to released (with a charity) or refunded.
    /// Returns false when the row was no longer held, so a stake is settled at most once.
    pub async fn settle_held(
        &self,
        escrow_id: Uuid,
        status: EscrowStatus,
        charity_id: Option<&str>,
    ) -> Result<bool, SupabaseError> {
        let query = format!("id=eq.{}&status=eq.held", escrow_id);
        let settled: Vec<EscrowTransaction> = self
            .client
            .update_returning(
                "escrow",
                &query,
                &SettleUpdate {
                    status,
                    charity_id,
                    released_at: Some(Utc::now()),
                },
            )
            .await?;
        Ok(!settled.is_empty())
    }

    /// Put a settled row back on hold
    pub async fn restore_held(&self, escrow_id: Uuid) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", escrow_id);
        self.client
            .update(
                "escrow",
                &query,
                &SettleUpdate {
                    status: EscrowStatus::Held,
                    charity_id: None,
                    released_at: None,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(amount: i64, status: EscrowStatus) -> EscrowTransaction {
        EscrowTransaction {
            id: Uuid::new_v4(),
            citizen_id: Uuid::nil(),
            question_id: Uuid::nil(),
            amount,
            status,
            charity_id: None,
            released_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_amount_by_status() {
        let rows = vec![
            row(10, EscrowStatus::Held),
            row(25, EscrowStatus::Released),
            row(5, EscrowStatus::Held),
            row(7, EscrowStatus::Refunded),
        ];
        assert_eq!(total_amount(&rows, Some(EscrowStatus::Held)), 15);
        assert_eq!(total_amount(&rows, Some(EscrowStatus::Released)), 25);
        assert_eq!(total_amount(&rows, None), 47);
    }

    #[test]
    fn test_settle_update_omits_missing_charity() {
        let refund = serde_json::to_value(SettleUpdate {
            status: EscrowStatus::Refunded,
            charity_id: None,
            released_at: Some(Utc::now()),
        })
        .unwrap();
        assert_eq!(refund["status"], "refunded");
        assert!(refund.get("charity_id").is_none());

        let restore = serde_json::to_value(SettleUpdate {
            status: EscrowStatus::Held,
            charity_id: None,
            released_at: None,
        })
        .unwrap();
        assert_eq!(restore["status"], "held");
        assert!(restore["released_at"].is_null());
    }
}
