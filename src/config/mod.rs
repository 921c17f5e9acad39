//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Origins allowed when CLIENT_ORIGIN is unset
const DEFAULT_CLIENT_ORIGINS: &str =
    "http://localhost:3000,http://127.0.0.1:3000,https://netaoffice.vercel.app";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines (LOG_FORMAT=json)
    pub log_json: bool,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase anonymous key, used for GoTrue auth calls
    pub supabase_anon_key: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: String,
    /// Supabase JWT secret; when set, access tokens are verified locally
    pub supabase_jwt_secret: Option<String>,

    /// Gemini API key; the arbiter falls back to fixed scores without it
    pub gemini_api_key: Option<String>,
    /// Gemini model used for answer analysis
    pub gemini_model: String,

    /// Days a question stays open before its stakes are refunded
    pub escrow_timeout_days: i64,
    /// Civic points granted on registration
    pub initial_civic_points: i64,
    /// Rating mean for new profiles
    pub default_mu: f64,
    /// Rating uncertainty for new profiles
    pub default_sigma: f64,
    /// Seconds between refund sweeps (0 disables the sweeper)
    pub escrow_sweep_interval_secs: u64,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Hosting platforms provide PORT; fall back to SERVER_ADDR or the local default
        let server_addr = match var("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8000".to_string()),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),

            supabase_url: var("SUPABASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            supabase_anon_key: var("SUPABASE_ANON_KEY")
                .or_else(|| var("SUPABASE_KEY"))
                .unwrap_or_default(),
            supabase_service_role_key: var("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| var("SUPABASE_SERVICE_KEY"))
                .unwrap_or_default(),
            supabase_jwt_secret: var("SUPABASE_JWT_SECRET"),

            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),

            escrow_timeout_days: parse_or(var("ESCROW_TIMEOUT_DAYS"), "ESCROW_TIMEOUT_DAYS", 14)?,
            initial_civic_points: parse_or(
                var("INITIAL_CIVIC_POINTS"),
                "INITIAL_CIVIC_POINTS",
                100,
            )?,
            default_mu: parse_or(var("DEFAULT_MU"), "DEFAULT_MU", 25.0)?,
            default_sigma: parse_or(var("DEFAULT_SIGMA"), "DEFAULT_SIGMA", 8.333)?,
            escrow_sweep_interval_secs: parse_or(
                var("ESCROW_SWEEP_INTERVAL_SECS"),
                "ESCROW_SWEEP_INTERVAL_SECS",
                3600,
            )?,

            client_origin: var("CLIENT_ORIGIN")
                .unwrap_or_else(|| DEFAULT_CLIENT_ORIGINS.to_string()),
        })
    }

    /// Whether Supabase credentials are present
    pub fn supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    /// Whether the Gemini arbiter can be called
    pub fn ai_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    /// Key used for PostgREST calls; falls back to the anon key when no service key is set
    pub fn rest_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid numeric value for environment variable: {0}")]
    InvalidNumber(&'static str),
}
