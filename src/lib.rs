//! # neutts-rs
//!
//! A voice-cloning text-to-speech service: give it text, a short reference
//! recording and that recording's transcript, and it speaks the text in the
//! reference speaker's voice.
//!
//! ## Features
//!
//! - **HTTP service**: `POST /tts` returns WAV audio, `GET /health` reports status
//! - **NeuTTS-Air engine**: ONNX backbone + codec (enable the `neutts` feature)
//! - **espeak-ng phonemization**: Mandarin (`cmn`) and English (`en-us`)
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::path::Path;
//! use neutts_rs::engines::neutts::{NeuTtsModel, NeuTtsModelParams};
//! use neutts_rs::phonemizer::{EspeakProvider, PhonemizerProvider};
//! use neutts_rs::{language::Language, VoiceCloneModel};
//!
//! let phonemizer = EspeakProvider::default().build(Language::English)?;
//! let mut model = NeuTtsModel::load(&NeuTtsModelParams::default(), phonemizer)?;
//! let codes = model.encode_reference(Path::new("samples/dave.wav"))?;
//! let result = model.infer("Hello, world!", &codes, "My name is Dave.")?;
//! result.write_wav(Path::new("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod device;
pub mod engines;
pub mod handle;
pub mod language;
pub mod phonemizer;
pub mod server;

use std::io::Cursor;
use std::path::Path;

use phonemizer::Phonemizer;

/// Sample rate of every waveform the service produces.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Error type crossing the [`VoiceCloneModel`] seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Sample rate of the audio (24000 for NeuTTS-Air)
    pub sample_rate: u32,
}

impl SynthesisResult {
    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    /// Encode the audio as a 16-bit PCM WAV file held in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.wav_spec())?;
            for &sample in &self.samples {
                writer.write_sample(to_pcm16(sample))?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the audio to a 16-bit PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let mut writer = hound::WavWriter::create(path, self.wav_spec())?;
        for &sample in &self.samples {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Codec tokens describing a reference speaker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceCodes(pub Vec<i64>);

impl ReferenceCodes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Common interface for voice-cloning synthesis models.
///
/// Synthesis is a two-stage pipeline: the reference recording is encoded
/// once into codec tokens, then inference conditions on those tokens and the
/// reference transcript to speak new text. The model owns the phonemizer it
/// uses for both transcripts; callers swap it when the language changes.
pub trait VoiceCloneModel: Send {
    /// Replace the phonemizer used by subsequent [`VoiceCloneModel::infer`] calls.
    fn set_phonemizer(&mut self, phonemizer: Box<dyn Phonemizer>);

    /// Encode a reference recording into the model's reference representation.
    fn encode_reference(&mut self, audio_path: &Path) -> Result<ReferenceCodes, BoxError>;

    /// Synthesize `text` in the voice described by `reference`.
    fn infer(
        &mut self,
        text: &str,
        reference: &ReferenceCodes,
        reference_text: &str,
    ) -> Result<SynthesisResult, BoxError>;
}
