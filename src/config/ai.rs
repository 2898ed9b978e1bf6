use serde::{Deserialize, Serialize};

use super::helpers::env_or;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl AiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("AI_API_KEY").ok(),
            model: env_or("AI_MODEL", "gpt-4o-mini"),
            base_url: env_or("AI_BASE_URL", "https://api.openai.com/v1"),
        }
    }

    /// The AI coordinator falls back to the "ai_not_configured" path
    /// instead of invoking upstream when no key is present.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
