//! Escrow lifecycle: release to charity, refund on expiry, per-user stats

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ranking::RankingService;
use crate::store::answers::{Vote, VoteTally};
use crate::store::escrow::{total_amount, EscrowStatus, EscrowTransaction};
use crate::store::questions::QuestionStatus;
use crate::store::supabase::SupabaseError;
use crate::store::{AnswerStore, EscrowStore, ProfileStore, QuestionStore};

/// Charity credited when none is chosen
pub const DEFAULT_CHARITY_ID: &str = "default_charity";

/// Directness score at which the arbiter alone releases the bounty
pub const AI_RELEASE_THRESHOLD: f64 = 70.0;

/// Release when the arbiter finds the answer direct, or a majority of stakers found it helpful
pub fn should_release(ai_score: Option<f64>, votes: &[Vote]) -> bool {
    let ai_passes = ai_score.is_some_and(|score| score >= AI_RELEASE_THRESHOLD);
    let tally = VoteTally::from_votes(votes);
    let votes_pass = tally.total >= 1 && tally.helpful * 2 > tally.total;
    ai_passes || votes_pass
}

/// Escrow totals for a citizen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct EscrowStats {
    pub total_staked: i64,
    pub currently_held: i64,
    pub released_to_charity: i64,
    pub refunded: i64,
    pub escrow_count: usize,
}

/// Outcome of one refund sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundReport {
    pub questions_expired: usize,
    /// Expired questions left open because a stake could not be refunded
    pub questions_retained: usize,
    pub escrows_refunded: usize,
    pub points_refunded: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefundOutcome {
    Credited,
    /// Settled by another sweep or a release since it was listed
    AlreadySettled,
    Failed,
}

/// Escrow operations spanning several tables
#[derive(Clone)]
pub struct EscrowService {
    escrow: EscrowStore,
    questions: QuestionStore,
    answers: AnswerStore,
    profiles: ProfileStore,
    ranking: RankingService,
    timeout_days: i64,
}

impl EscrowService {
    pub fn new(
        escrow: EscrowStore,
        questions: QuestionStore,
        answers: AnswerStore,
        profiles: ProfileStore,
        ranking: RankingService,
        timeout_days: i64,
    ) -> Self {
        Self {
            escrow,
            questions,
            answers,
            profiles,
            ranking,
            timeout_days,
        }
    }

    /// Release the question's bounty if its answer qualifies; returns whether anything was released
    pub async fn check_and_release_escrow(&self, question_id: Uuid) -> Result<bool, SupabaseError> {
        let Some(answer) = self.answers.for_question(question_id).await? else {
            return Ok(false);
        };

        let ai_score = answer.ai_analysis.as_ref().map(|a| a.directness_score);
        let votes = self.answers.votes_for(answer.id).await?;
        if !should_release(ai_score, &votes) {
            return Ok(false);
        }

        let released = self.release_escrow(question_id, None).await?;
        if released && !votes.is_empty() {
            // Satisfaction-weighted re-rate once the stakers have spoken
            if let Err(e) = self
                .ranking
                .update_rating_after_votes(answer.politician_id, question_id)
                .await
            {
                warn!(error = %e, question_id = %question_id, "Rating update after release failed");
            }
        }
        Ok(released)
    }

    /// Release every held stake on a question to charity
    pub async fn release_escrow(
        &self,
        question_id: Uuid,
        charity_id: Option<&str>,
    ) -> Result<bool, SupabaseError> {
        let held = self
            .escrow
            .for_question(question_id, Some(EscrowStatus::Held))
            .await?;
        if held.is_empty() {
            return Ok(false);
        }

        let charity = charity_id.unwrap_or(DEFAULT_CHARITY_ID);
        let mut released = 0;
        let mut amount = 0;
        for row in &held {
            if self
                .escrow
                .settle_held(row.id, EscrowStatus::Released, Some(charity))
                .await?
            {
                released += 1;
                amount += row.amount;
            }
        }
        if released == 0 {
            return Ok(false);
        }

        info!(
            question_id = %question_id,
            charity_id = charity,
            escrows = released,
            amount,
            "Escrow released to charity"
        );
        Ok(true)
    }

    /// Refund stakes on expired, unanswered questions and mark them expired.
    /// A question stays open while any of its stakes could not be refunded, so the next sweep retries it.
    pub async fn refund_expired_escrows(&self) -> Result<RefundReport, SupabaseError> {
        let expired = self.questions.expired_open(Utc::now()).await?;
        let mut report = RefundReport::default();

        for question in expired {
            if self.answers.for_question(question.id).await?.is_some() {
                continue;
            }

            let held = self
                .escrow
                .for_question(question.id, Some(EscrowStatus::Held))
                .await?;
            let mut all_refunded = true;
            for row in &held {
                match self.refund_one(row).await? {
                    RefundOutcome::Credited => {
                        report.escrows_refunded += 1;
                        report.points_refunded += row.amount;
                    }
                    RefundOutcome::AlreadySettled => {}
                    RefundOutcome::Failed => all_refunded = false,
                }
            }

            if !all_refunded {
                report.questions_retained += 1;
                continue;
            }

            self.questions
                .set_status(question.id, QuestionStatus::Expired)
                .await?;
            report.questions_expired += 1;

            if question.total_bounty > 0 {
                if let Err(e) = self
                    .ranking
                    .penalize_ignored_question(
                        question.target_politician_id,
                        question.total_bounty,
                        self.timeout_days,
                    )
                    .await
                {
                    warn!(error = %e, question_id = %question.id, "Ignore penalty failed");
                }
            }
        }

        Ok(report)
    }

    /// Settle one held stake as refunded, then credit the citizen.
    /// A row whose citizen cannot be credited goes back on hold.
    async fn refund_one(&self, row: &EscrowTransaction) -> Result<RefundOutcome, SupabaseError> {
        if !self
            .escrow
            .settle_held(row.id, EscrowStatus::Refunded, None)
            .await?
        {
            return Ok(RefundOutcome::AlreadySettled);
        }

        let credited = match self
            .profiles
            .adjust_civic_points(row.citizen_id, row.amount)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                error!(citizen_id = %row.citizen_id, escrow_id = %row.id, "Refund target profile missing");
                false
            }
            Err(e) => {
                error!(error = %e, escrow_id = %row.id, "Refund credit failed");
                false
            }
        };

        if !credited {
            self.escrow.restore_held(row.id).await?;
            return Ok(RefundOutcome::Failed);
        }
        Ok(RefundOutcome::Credited)
    }

    /// Escrow totals for a citizen
    pub async fn get_escrow_stats(&self, user_id: Uuid) -> Result<EscrowStats, SupabaseError> {
        let rows = self.escrow.for_citizen(user_id, None).await?;
        let currently_held = total_amount(&rows, Some(EscrowStatus::Held));
        let released_to_charity = total_amount(&rows, Some(EscrowStatus::Released));
        let refunded = total_amount(&rows, Some(EscrowStatus::Refunded));

        Ok(EscrowStats {
            total_staked: currently_held + released_to_charity + refunded,
            currently_held,
            released_to_charity,
            refunded,
            escrow_count: rows.len(),
        })
    }
}

/// Run the refund sweep forever at a fixed interval
pub async fn run_refund_sweeper(service: EscrowService, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match service.refund_expired_escrows().await {
            Ok(report) if report.questions_expired > 0 || report.questions_retained > 0 => {
                info!(
                    questions_expired = report.questions_expired,
                    questions_retained = report.questions_retained,
                    escrows_refunded = report.escrows_refunded,
                    points_refunded = report.points_refunded,
                    "Refund sweep complete"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Refund sweep failed"),
        }
    }
}
