//! Provider: an opaque LLM endpoint selected per dispatch. Health is an
//! external concern — this module only models the selection-time shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Provider {
    pub id: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub context_window: usize,
}

impl Provider {
    pub fn from_env(id: &str, url_var: &str, model_var: &str, key_var: &str, default_model: &str) -> Option<Self> {
        let base_url = std::env::var(url_var).ok()?;
        let model = std::env::var(model_var).unwrap_or_else(|_| default_model.to_string());
        let api_key = std::env::var(key_var).unwrap_or_else(|_| "not-needed".to_string());
        Some(Self {
            id: id.to_string(),
            base_url,
            model,
            api_key,
            context_window: 128_000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_returns_none_without_url() {
        std::env::remove_var("LOOM_TEST_PROVIDER_URL");
        assert!(Provider::from_env(
            "test",
            "LOOM_TEST_PROVIDER_URL",
            "LOOM_TEST_PROVIDER_MODEL",
            "LOOM_TEST_PROVIDER_KEY",
            "default-model"
        )
        .is_none());
    }

    #[test]
    fn from_env_falls_back_to_default_model() {
        std::env::set_var("LOOM_TEST_PROVIDER_URL2", "http://localhost:1234/v1");
        std::env::remove_var("LOOM_TEST_PROVIDER_MODEL2");
        let provider = Provider::from_env(
            "test",
            "LOOM_TEST_PROVIDER_URL2",
            "LOOM_TEST_PROVIDER_MODEL2",
            "LOOM_TEST_PROVIDER_KEY2",
            "default-model",
        )
        .unwrap();
        assert_eq!(provider.model, "default-model");
        std::env::remove_var("LOOM_TEST_PROVIDER_URL2");
    }
}
