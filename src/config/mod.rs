use crate::models::Policy;
use std::env;

/// Client configuration for talking to the vision backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (default: "http://127.0.0.1:8000")
    pub api_base: String,

    /// Model preset sent with every analyze call (default: "cheap")
    pub model_preset: String,

    /// Routing policy a fresh session starts with (default: cost)
    pub default_policy: Policy,

    /// Content type declared when the file type cannot be detected (default: "image/jpeg")
    pub fallback_content_type: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            model_preset: "cheap".to_string(),
            default_policy: Policy::Cost,
            fallback_content_type: mime::IMAGE_JPEG.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            api_base: env::var("MC_VISION_API_BASE")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.api_base),

            model_preset: env::var("MC_VISION_MODEL_PRESET")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default.model_preset),

            default_policy: env::var("MC_VISION_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.default_policy),

            fallback_content_type: env::var("MC_VISION_CONTENT_TYPE")
                .ok()
                .filter(|v| v.parse::<mime::Mime>().is_ok())
                .unwrap_or(default.fallback_content_type),
        }
    }
}
