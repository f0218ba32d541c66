//! Flow configuration loaded from environment variables.

use std::time::Duration;

use crate::errors::{AdoptionError, Result};

#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Base URL of the purchase endpoint (e.g. https://api.treebyte.eco)
    pub api_url: String,
    /// Ceiling for a single purchase request before it is treated as timed out
    pub request_timeout: Duration,
    /// How long the surface stays visible after a successful purchase
    pub success_dismiss: Duration,
}

impl FlowConfig {
    pub fn from_env() -> Result<Self> {
        Ok(FlowConfig {
            api_url: env_var("ADOPTION_API_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            request_timeout: Duration::from_millis(
                env_var("ADOPTION_TIMEOUT_MS")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .map_err(|_| AdoptionError::Config("Invalid ADOPTION_TIMEOUT_MS".to_string()))?,
            ),
            success_dismiss: Duration::from_millis(
                env_var("ADOPTION_DISMISS_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .map_err(|_| AdoptionError::Config("Invalid ADOPTION_DISMISS_MS".to_string()))?,
            ),
        })
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            api_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_millis(8000),
            success_dismiss: Duration::from_millis(2000),
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AdoptionError::Config(format!("Missing env var: {key}")))
}
