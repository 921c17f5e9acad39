pub mod answers;
pub mod auth;
pub mod bounties;
pub mod docs;
pub mod error;
pub mod extract;
pub mod leaderboard;
pub mod middleware;
pub mod questions;
pub mod routes;

pub use routes::build_router;
