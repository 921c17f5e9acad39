//! Data store modules for Supabase integration

pub mod answers;
pub mod auth;
pub mod escrow;
#[cfg(test)]
pub(crate) mod mock;
pub mod profiles;
pub mod questions;
pub mod supabase;

pub use answers::AnswerStore;
pub use auth::AuthClient;
pub use escrow::EscrowStore;
pub use profiles::ProfileStore;
pub use questions::QuestionStore;
pub use supabase::SupabaseClient;
