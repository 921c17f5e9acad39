//! Politician skill rating
//!
//! Ratings follow the Plackett-Luce model as used by openskill: each answered
//! question is treated as a match between the politician and a virtual opponent
//! at the default rating, and the resulting gain is scaled by how well the
//! answer performed (bounty size, response speed, citizen satisfaction).

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::answers::VoteTally;
use crate::store::supabase::SupabaseError;
use crate::store::{AnswerStore, ProfileStore, QuestionStore};

/// Model defaults (openskill Plackett-Luce)
pub const MODEL_MU: f64 = 25.0;
pub const MODEL_SIGMA: f64 = 25.0 / 3.0;
pub const BETA: f64 = MODEL_SIGMA / 2.0;
pub const KAPPA: f64 = 0.0001;
pub const TAU: f64 = MODEL_MU / 300.0;

pub const MU_BOUNDS: (f64, f64) = (0.0, 50.0);
pub const SIGMA_BOUNDS: (f64, f64) = (1.0, 10.0);

/// Response time treated as neutral when re-rating after votes
pub const NEUTRAL_RESPONSE_HOURS: f64 = 24.0;

/// Skill estimate: mean and uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mu: f64,
    pub sigma: f64,
}

impl Rating {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    /// Conservative skill estimate (mu - 3 sigma)
    pub fn conservative(&self) -> f64 {
        self.mu - 3.0 * self.sigma
    }

    fn clamped(self) -> Self {
        Self {
            mu: self.mu.clamp(MU_BOUNDS.0, MU_BOUNDS.1),
            sigma: self.sigma.clamp(SIGMA_BOUNDS.0, SIGMA_BOUNDS.1),
        }
    }
}

/// Plackett-Luce update for teams of players, each paired with its rank.
/// Lower rank is better; equal ranks tie.
pub fn plackett_luce_rate(standings: &[(Vec<Rating>, u32)]) -> Vec<Vec<Rating>> {
    let ranks: Vec<u32> = standings.iter().map(|(_, rank)| *rank).collect();

    // Additive dynamics factor keeps sigma from collapsing
    let teams: Vec<Vec<Rating>> = standings
        .iter()
        .map(|(team, _)| {
            team.iter()
                .map(|r| Rating::new(r.mu, (r.sigma * r.sigma + TAU * TAU).sqrt()))
                .collect()
        })
        .collect();

    let team_mu: Vec<f64> = teams.iter().map(|t| t.iter().map(|r| r.mu).sum()).collect();
    let team_sigma_sq: Vec<f64> = teams
        .iter()
        .map(|t| t.iter().map(|r| r.sigma * r.sigma).sum())
        .collect();

    let c = team_sigma_sq
        .iter()
        .map(|s| s + BETA * BETA)
        .sum::<f64>()
        .sqrt();

    let exp_mu: Vec<f64> = team_mu.iter().map(|mu| (mu / c).exp()).collect();

    // sum_q[q]: strength of every team ranked at or below q
    let sum_q: Vec<f64> = ranks
        .iter()
        .map(|rank_q| {
            ranks
                .iter()
                .zip(&exp_mu)
                .filter(|(rank_i, _)| *rank_i >= rank_q)
                .map(|(_, e)| e)
                .sum()
        })
        .collect();

    // a[q]: size of the tie group of q
    let ties: Vec<f64> = ranks
        .iter()
        .map(|rank_q| ranks.iter().filter(|r| *r == rank_q).count() as f64)
        .collect();

    teams
        .iter()
        .enumerate()
        .map(|(i, team)| {
            let mut omega = 0.0;
            let mut delta = 0.0;
            for q in 0..teams.len() {
                if ranks[q] > ranks[i] {
                    continue;
                }
                let quotient = exp_mu[i] / sum_q[q];
                if q == i {
                    omega += (1.0 - quotient) / ties[q];
                } else {
                    omega -= quotient / ties[q];
                }
                delta += quotient * (1.0 - quotient) / ties[q];
            }

            let gamma = team_sigma_sq[i].sqrt() / c;
            omega *= team_sigma_sq[i] / c;
            delta *= gamma * team_sigma_sq[i] / (c * c);

            team.iter()
                .map(|player| {
                    let share = player.sigma * player.sigma / team_sigma_sq[i];
                    Rating::new(
                        player.mu + share * omega,
                        player.sigma * (1.0 - share * delta).max(KAPPA).sqrt(),
                    )
                })
                .collect()
        })
        .collect()
}

/// Weight from bounty size (log scale, so 1000 points is not 100x 10 points)
pub fn bounty_weight(bounty: i64) -> f64 {
    1.0 + ((bounty.max(1) + 1) as f64).log10() / 3.0
}

/// Weight from response speed: bonus up to 1h, neutral at 24h, penalty capped after 72h
pub fn speed_weight(response_hours: f64) -> f64 {
    if response_hours <= 1.0 {
        1.3
    } else if response_hours <= 24.0 {
        1.0 + 0.3 * (1.0 - response_hours / 24.0)
    } else if response_hours <= 72.0 {
        1.0 - 0.2 * ((response_hours - 24.0) / 48.0)
    } else {
        0.8
    }
}

/// Weight from the share of helpful votes (percent)
pub fn satisfaction_weight(satisfaction: Option<f64>) -> f64 {
    match satisfaction {
        None => 1.0,
        Some(s) if s >= 80.0 => 1.2,
        Some(s) if s >= 60.0 => 1.0,
        Some(s) if s >= 40.0 => 0.9,
        Some(_) => 0.7,
    }
}

/// Combined performance multiplier for an answer
pub fn answer_performance(bounty: i64, response_hours: f64, satisfaction: Option<f64>) -> f64 {
    bounty_weight(bounty) * speed_weight(response_hours) * satisfaction_weight(satisfaction)
}

/// New rating after an answer with the given performance
pub fn rate_answer(current: Rating, opponent: Rating, performance: f64) -> Rating {
    let updated = if performance >= 1.0 {
        let result = plackett_luce_rate(&[(vec![current], 1), (vec![opponent], 2)]);
        let won = result[0][0];
        let gain = (won.mu - current.mu) * performance.min(2.0);
        Rating::new(current.mu + gain, won.sigma)
    } else {
        Rating::new(current.mu + 0.1, (current.sigma - 0.1).max(1.0))
    };
    updated.clamped()
}

/// New rating after ignoring a question with a bounty for some days
pub fn penalize_ignored(current: Rating, bounty: i64, days_ignored: i64) -> Rating {
    let bounty_factor = (bounty.max(10) as f64).log10() / 2.0;
    let time_factor = (days_ignored as f64 / 7.0).min(2.0);

    let mu_penalty = 0.5 * bounty_factor * time_factor;
    let sigma_increase = 0.2 * time_factor;

    Rating::new(
        (current.mu - mu_penalty).max(MU_BOUNDS.0),
        (current.sigma + sigma_increase).min(SIGMA_BOUNDS.1),
    )
}

/// Applies rating changes to stored profiles
#[derive(Clone)]
pub struct RankingService {
    profiles: ProfileStore,
    questions: QuestionStore,
    answers: AnswerStore,
    defaults: Rating,
}

impl RankingService {
    pub fn new(
        profiles: ProfileStore,
        questions: QuestionStore,
        answers: AnswerStore,
        defaults: Rating,
    ) -> Self {
        Self {
            profiles,
            questions,
            answers,
            defaults,
        }
    }

    async fn current_rating(&self, politician_id: Uuid) -> Result<Rating, SupabaseError> {
        Ok(self
            .profiles
            .get_profile(politician_id)
            .await?
            .map(|p| p.rating())
            .unwrap_or(self.defaults))
    }

    /// Update a politician's rating after they answer a question
    pub async fn update_rating_on_answer(
        &self,
        politician_id: Uuid,
        bounty: i64,
        response_hours: f64,
        satisfaction: Option<f64>,
    ) -> Result<Rating, SupabaseError> {
        let current = self.current_rating(politician_id).await?;
        let performance = answer_performance(bounty, response_hours, satisfaction);
        let opponent = Rating::new(self.defaults.mu, MODEL_SIGMA);
        let updated = rate_answer(current, opponent, performance);

        self.profiles.set_rating(politician_id, updated).await?;
        info!(
            politician_id = %politician_id,
            performance,
            old_mu = current.mu,
            new_mu = updated.mu,
            new_sigma = updated.sigma,
            "Rating updated after answer"
        );
        Ok(updated)
    }

    /// Re-rate using the final vote breakdown; `None` when there is no answer or no votes
    pub async fn update_rating_after_votes(
        &self,
        politician_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<Rating>, SupabaseError> {
        let Some(answer) = self.answers.for_question(question_id).await? else {
            return Ok(None);
        };
        let votes = self.answers.votes_for(answer.id).await?;
        let Some(satisfaction) = VoteTally::from_votes(&votes).helpful_percentage() else {
            debug!(question_id = %question_id, "No votes to re-rate from");
            return Ok(None);
        };
        let bounty = self
            .questions
            .get(question_id)
            .await?
            .map(|q| q.total_bounty)
            .unwrap_or(0);

        self.update_rating_on_answer(
            politician_id,
            bounty,
            NEUTRAL_RESPONSE_HOURS,
            Some(satisfaction),
        )
        .await
        .map(Some)
    }

    /// Penalize a politician for letting a bountied question expire
    pub async fn penalize_ignored_question(
        &self,
        politician_id: Uuid,
        bounty: i64,
        days_ignored: i64,
    ) -> Result<Rating, SupabaseError> {
        let current = self.current_rating(politician_id).await?;
        let updated = penalize_ignored(current, bounty, days_ignored);
        self.profiles.set_rating(politician_id, updated).await?;
        info!(
            politician_id = %politician_id,
            bounty,
            days_ignored,
            new_mu = updated.mu,
            "Rating penalized for ignored question"
        );
        Ok(updated)
    }
}
