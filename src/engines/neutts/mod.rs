//! NeuTTS-Air voice-cloning engine.
//!
//! NeuTTS-Air pairs a small autoregressive language model (the backbone)
//! with the NeuCodec neural audio codec. The backbone reads phonemized text
//! plus the reference speaker's codec tokens and continues the sequence with
//! new speech tokens, which the codec decodes back to a 24 kHz waveform.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed (see [`crate::phonemizer`]).
//!
//! # Model Directory Layout
//!
//! ```text
//! models/neutts-air/          # exported from neuphonic/neutts-air
//! ├── model.onnx              # backbone, logits output
//! └── tokenizer.json          # includes <|speech_N|> and prompt tokens
//! models/neucodec/            # exported from neuphonic/neucodec
//! ├── encoder.onnx            # 16 kHz mono audio -> codes
//! └── decoder.onnx            # codes -> 24 kHz audio
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::path::Path;
//! use neutts_rs::engines::neutts::{NeuTtsModel, NeuTtsModelParams};
//! use neutts_rs::phonemizer::{EspeakProvider, PhonemizerProvider};
//! use neutts_rs::{language::Language, VoiceCloneModel};
//!
//! let phonemizer = EspeakProvider::default().build(Language::English)?;
//! let mut model = NeuTtsModel::load(&NeuTtsModelParams::default(), phonemizer)?;
//!
//! let codes = model.encode_reference(Path::new("samples/dave.wav"))?;
//! let result = model.infer("Hello, world!", &codes, "My name is Dave.")?;
//! println!("Generated {} samples at {}Hz", result.samples.len(), result.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
#[cfg(feature = "neutts")]
pub mod model;
pub mod prompt;
pub mod sampling;

#[cfg(feature = "neutts")]
pub use model::{NeuTtsError, NeuTtsModel, NeuTtsModelParams};
pub use sampling::{GenerationParams, GenerationParamsBuilder};

/// Upstream source of the backbone weights.
pub const BACKBONE_REPO: &str = "neuphonic/neutts-air";

/// Upstream source of the codec weights.
pub const CODEC_REPO: &str = "neuphonic/neucodec";

/// Sample rate the codec encoder expects.
pub const CODEC_INPUT_SAMPLE_RATE: u32 = 16000;
