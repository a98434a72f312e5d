//! The process-wide model handle.
//!
//! A [`ModelHandle`] owns the loaded model together with the language its
//! phonemizer is configured for. [`ModelHandle::synthesize`] takes `&mut self`,
//! so callers hold the handle's lock across language switch, reference
//! encoding and inference, and no request ever sees another request's
//! half-applied phonemizer.

use std::path::Path;
use std::sync::Arc;

use crate::language::Language;
use crate::phonemizer::PhonemizerProvider;
use crate::{BoxError, SynthesisResult, VoiceCloneModel};

#[derive(thiserror::Error, Debug)]
pub enum HandleError {
    #[error("{0}")]
    Encode(BoxError),
    #[error("{0}")]
    Inference(BoxError),
}

impl HandleError {
    /// The model error behind this failure.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match self {
            HandleError::Encode(e) | HandleError::Inference(e) => e.as_ref(),
        }
    }
}

/// One synthesis request, as seen by the model handle.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisJob<'a> {
    pub text: &'a str,
    pub reference_audio_path: &'a Path,
    pub reference_text: &'a str,
    pub language: Language,
}

pub struct ModelHandle {
    model: Box<dyn VoiceCloneModel>,
    current_language: String,
    phonemizers: Arc<dyn PhonemizerProvider>,
}

impl ModelHandle {
    /// Wrap a loaded model whose phonemizer is configured for `language`.
    pub fn new(
        model: Box<dyn VoiceCloneModel>,
        language: Language,
        phonemizers: Arc<dyn PhonemizerProvider>,
    ) -> Self {
        Self {
            model,
            current_language: language.espeak_code().to_string(),
            phonemizers,
        }
    }

    /// espeak-ng code the model's phonemizer is currently configured for.
    pub fn current_language(&self) -> &str {
        &self.current_language
    }

    /// Reconfigure the phonemizer for `language` if it is not already.
    ///
    /// A failed rebuild is logged and tolerated: the previous phonemizer and
    /// language stay in place. Returns `true` when a swap happened.
    pub fn ensure_language(&mut self, language: Language) -> bool {
        let target = language.espeak_code();
        if self.current_language == target {
            return false;
        }

        log::info!("Switching phonemizer language to: {target}");
        match self.phonemizers.build(language) {
            Ok(phonemizer) => {
                self.model.set_phonemizer(phonemizer);
                self.current_language = target.to_string();
                true
            }
            Err(e) => {
                log::warn!(
                    "Failed to switch phonemizer to {target}, keeping {}: {e}",
                    self.current_language
                );
                false
            }
        }
    }

    /// Language switch, reference encoding and inference, in that order.
    pub fn synthesize(&mut self, job: SynthesisJob<'_>) -> Result<SynthesisResult, HandleError> {
        self.ensure_language(job.language);

        log::debug!(
            "Generating TTS for text: {}... (lang: {})",
            job.text.chars().take(20).collect::<String>(),
            self.current_language
        );

        let reference = self
            .model
            .encode_reference(job.reference_audio_path)
            .map_err(HandleError::Encode)?;

        self.model
            .infer(job.text, &reference, job.reference_text)
            .map_err(HandleError::Inference)
    }
}
