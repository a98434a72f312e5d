//! Request and response bodies.

use serde::{Deserialize, Serialize};

/// Transcript assumed when the caller does not send one.
pub const DEFAULT_REFERENCE_TEXT: &str = "This is a reference audio for voice cloning.";

/// Language assumed when the caller does not send one.
pub const DEFAULT_LANGUAGE: &str = "zh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub reference_audio_path: String,
    #[serde(default = "default_reference_text")]
    pub reference_text: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_reference_text() -> String {
    DEFAULT_REFERENCE_TEXT.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub device: String,
    pub model_loaded: bool,
    pub cuda_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
