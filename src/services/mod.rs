//! Domain services layered over the stores

pub mod arbiter;
pub mod escrow;
pub mod ranking;

pub use arbiter::Arbiter;
pub use escrow::EscrowService;
pub use ranking::RankingService;
