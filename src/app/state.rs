//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::services::ranking::Rating;
use crate::services::{Arbiter, EscrowService, RankingService};
use crate::store::{
    AnswerStore, AuthClient, EscrowStore, ProfileStore, QuestionStore, SupabaseClient,
};
use crate::util::rate_limit::{create_keyed_limiter, KeyedLimiter, AUTH_ATTEMPTS_PER_MINUTE};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthClient,
    pub profile_store: ProfileStore,
    pub question_store: QuestionStore,
    pub answer_store: AnswerStore,
    pub escrow_store: EscrowStore,
    pub arbiter: Arbiter,
    pub ranking: RankingService,
    pub escrow: EscrowService,
    pub auth_limiter: Arc<KeyedLimiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Initialize Supabase clients
        let supabase = SupabaseClient::new(&config);
        let auth = AuthClient::new(&config);

        // Initialize stores
        let profile_store = ProfileStore::new(supabase.clone());
        let question_store = QuestionStore::new(supabase.clone());
        let answer_store = AnswerStore::new(supabase.clone());
        let escrow_store = EscrowStore::new(supabase);

        // Initialize services
        let arbiter = Arbiter::new(&config, question_store.clone());
        let ranking = RankingService::new(
            profile_store.clone(),
            question_store.clone(),
            answer_store.clone(),
            Rating::new(config.default_mu, config.default_sigma),
        );
        let escrow = EscrowService::new(
            escrow_store.clone(),
            question_store.clone(),
            answer_store.clone(),
            profile_store.clone(),
            ranking.clone(),
            config.escrow_timeout_days,
        );

        Self {
            config,
            auth,
            profile_store,
            question_store,
            answer_store,
            escrow_store,
            arbiter,
            ranking,
            escrow,
            auth_limiter: create_keyed_limiter(AUTH_ATTEMPTS_PER_MINUTE),
        }
    }
}
