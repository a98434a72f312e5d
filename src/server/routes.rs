use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::error::{error_chain, ApiError};
use super::types::{HealthResponse, TtsRequest};
use super::AppState;
use crate::handle::SynthesisJob;
use crate::language::Language;

/// Synthesize `text` in the voice of the reference recording.
pub async fn tts(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    if !state.model_loaded() {
        return Err(ApiError::service_unavailable("TTS Model not initialized"));
    }

    let reference_audio_path = PathBuf::from(&request.reference_audio_path);
    if !reference_audio_path.exists() {
        return Err(ApiError::bad_request(format!(
            "Reference audio file not found: {}",
            request.reference_audio_path
        )));
    }

    if state.strict_language && !Language::is_recognized_tag(&request.language) {
        return Err(ApiError::bad_request(format!(
            "Unsupported language: {} (expected \"zh\" or \"en\")",
            request.language
        )));
    }
    let language = Language::from_tag(&request.language);

    let permit = state
        .admission
        .clone()
        .try_acquire_owned()
        .map_err(|_| ApiError::busy())?;

    let wav = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let model = state
            .model
            .get()
            .ok_or_else(|| ApiError::service_unavailable("TTS Model not initialized"))?;
        let mut model = model.lock().unwrap_or_else(|poisoned| {
            log::warn!("Model lock poisoned by an earlier panic, continuing");
            PoisonError::into_inner(poisoned)
        });

        let result = model
            .synthesize(SynthesisJob {
                text: &request.text,
                reference_audio_path: &reference_audio_path,
                reference_text: &request.reference_text,
                language,
            })
            .map_err(|e| {
                log::error!("TTS generation failed: {}", error_chain(e.cause()));
                ApiError::internal(e.to_string())
            })?;
        drop(model);

        result.to_wav_bytes().map_err(|e| {
            log::error!("WAV encoding failed: {e}");
            ApiError::internal(e.to_string())
        })
    })
    .await
    .map_err(|e| ApiError::internal(format!("task join error: {e}")))??;

    let headers = [
        (header::CONTENT_TYPE, "audio/wav"),
        (header::CONTENT_DISPOSITION, "attachment; filename=\"output.wav\""),
    ];
    Ok((StatusCode::OK, headers, wav).into_response())
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        device: state.device().name().to_string(),
        model_loaded: state.model_loaded(),
        cuda_available: state.cuda_available,
    })
}
