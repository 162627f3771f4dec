use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::ai::client::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiConfig, RetryPolicy};
use crate::error::ConfigError;

/// Model service settings, from flags or the environment.
#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// API key for the Gemini API.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Upper bound on one model call, retries included.
    #[arg(long, env = "RECIPE_AI_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Attempts per model call; only transient failures are retried.
    #[arg(long, env = "RECIPE_AI_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Write every model response into this directory.
    #[arg(long, env = "RECIPE_AI_DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,
}

impl ModelArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn gemini_config(&self) -> Result<GeminiConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(GeminiConfig {
            api_key: api_key.to_string(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                ..RetryPolicy::default()
            },
            dump_dir: self.dump_dir.clone(),
        })
    }
}
