//! Configuration for the UltimaLearning backend
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::types::UltimaError;

/// UltimaLearning backend - gamified skill tracking REST API
#[derive(Parser, Debug, Clone)]
#[command(name = "ultimad")]
#[command(about = "REST API backend for UltimaLearning")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "ultimalearning")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Enable development mode (insecure JWT default allowed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Base URL of the OpenAI-compatible AI service
    #[arg(long, env = "AI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub ai_base_url: String,

    /// API key for the AI service
    #[arg(long, env = "AI_API_KEY")]
    pub ai_api_key: Option<String>,

    /// Model used for test generation and low-level reviews
    #[arg(long, env = "AI_MODEL", default_value = "gpt-4o-mini")]
    pub ai_model: String,

    /// Higher-capability model used for reviews at level >= 60
    #[arg(long, env = "AI_MODEL_STRONG", default_value = "gpt-4o")]
    pub ai_model_strong: String,

    /// AI request timeout in seconds
    #[arg(long, env = "AI_TIMEOUT_SECONDS", default_value = "60")]
    pub ai_timeout_seconds: u64,

    /// Daily project submission limit per user
    #[arg(long, env = "DAILY_SUBMISSION_LIMIT", default_value = "10")]
    pub daily_submission_limit: u32,

    /// Hourly limit on test route requests per user
    #[arg(long, env = "TEST_RATE_LIMIT", default_value = "50")]
    pub test_rate_limit: u32,

    /// Generated test cache TTL in days
    #[arg(long, env = "TEST_CACHE_TTL_DAYS", default_value = "7")]
    pub test_cache_ttl_days: i64,

    /// Review cache TTL in days
    #[arg(long, env = "REVIEW_CACHE_TTL_DAYS", default_value = "30")]
    pub review_cache_ttl_days: i64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Result<String, UltimaError> {
        match &self.jwt_secret {
            Some(secret) => Ok(secret.clone()),
            None if self.dev_mode => {
                Ok("dev-mode-secret-not-for-production-use-123456".to_string())
            }
            None => Err(UltimaError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.ai_api_key.is_none() {
                return Err("AI_API_KEY is required in production mode".to_string());
            }
        }

        if self.daily_submission_limit == 0 {
            return Err("DAILY_SUBMISSION_LIMIT must be at least 1".to_string());
        }

        if self.test_rate_limit == 0 {
            return Err("TEST_RATE_LIMIT must be at least 1".to_string());
        }

        if self.test_cache_ttl_days <= 0 || self.review_cache_ttl_days <= 0 {
            return Err("Cache TTLs must be positive".to_string());
        }

        Ok(())
    }
}
