use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokenizers::Tokenizer;

use super::audio::{self, AudioError};
use super::prompt::{self, SPEECH_GENERATION_END};
use super::sampling::{sample_top_k, GenerationParams};
use super::{BACKBONE_REPO, CODEC_INPUT_SAMPLE_RATE, CODEC_REPO};
use crate::device::Device;
use crate::phonemizer::{Phonemizer, PhonemizerError};
use crate::{BoxError, ReferenceCodes, SynthesisResult, VoiceCloneModel, OUTPUT_SAMPLE_RATE};

#[derive(thiserror::Error, Debug)]
pub enum NeuTtsError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Token '{0}' is missing from the backbone vocabulary")]
    MissingToken(String),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Phonemizer(#[from] PhonemizerError),
    #[error("Prompt is {len} tokens, the backbone context holds {max}")]
    PromptTooLong { len: usize, max: usize },
    #[error("Backbone produced no speech tokens")]
    NoSpeechTokens,
    #[error("Model returned no output")]
    NoOutput,
}

/// Parameters for loading a NeuTTS-Air model.
#[derive(Debug, Clone)]
pub struct NeuTtsModelParams {
    /// Directory holding the exported backbone (`model.onnx`, `tokenizer.json`).
    pub backbone_dir: PathBuf,
    /// Directory holding the exported codec (`encoder.onnx`, `decoder.onnx`).
    pub codec_dir: PathBuf,
    pub device: Device,
    /// Number of CPU threads per session. `None` uses the ORT default.
    pub num_threads: Option<usize>,
    pub generation: GenerationParams,
}

impl Default for NeuTtsModelParams {
    fn default() -> Self {
        Self {
            backbone_dir: PathBuf::from("models/neutts-air"),
            codec_dir: PathBuf::from("models/neucodec"),
            device: Device::Cpu,
            num_threads: None,
            generation: GenerationParams::default(),
        }
    }
}

/// Input names the exported backbone graph declares.
struct BackboneInputs {
    ids: String,
    attention_mask: bool,
    position_ids: bool,
}

/// NeuTTS-Air backbone, codec and the phonemizer feeding them.
pub struct NeuTtsModel {
    backbone: Session,
    backbone_inputs: BackboneInputs,
    codec_encoder: Session,
    codec_decoder: Session,
    decoder_codes_int32: bool,
    tokenizer: Tokenizer,
    speech_end_id: u32,
    phonemizer: Box<dyn Phonemizer>,
    generation: GenerationParams,
    rng: StdRng,
}

impl NeuTtsModel {
    /// Load the backbone and codec sessions onto `params.device`.
    pub fn load(
        params: &NeuTtsModelParams,
        phonemizer: Box<dyn Phonemizer>,
    ) -> Result<Self, NeuTtsError> {
        log::info!(
            "Loading NeuTTS-Air ({BACKBONE_REPO} from {}, {CODEC_REPO} from {}) on {}",
            params.backbone_dir.display(),
            params.codec_dir.display(),
            params.device
        );

        let backbone = init_session(
            &require_file(&params.backbone_dir, "model.onnx")?,
            params.device,
            params.num_threads,
        )?;
        let codec_encoder = init_session(
            &require_file(&params.codec_dir, "encoder.onnx")?,
            params.device,
            params.num_threads,
        )?;
        let codec_decoder = init_session(
            &require_file(&params.codec_dir, "decoder.onnx")?,
            params.device,
            params.num_threads,
        )?;

        let tokenizer = Tokenizer::from_file(require_file(&params.backbone_dir, "tokenizer.json")?)
            .map_err(|e| NeuTtsError::Tokenizer(e.to_string()))?;
        let speech_end_id = tokenizer
            .token_to_id(SPEECH_GENERATION_END)
            .ok_or_else(|| NeuTtsError::MissingToken(SPEECH_GENERATION_END.to_string()))?;

        let backbone_inputs = detect_backbone_inputs(&backbone);
        let decoder_codes_int32 = detect_int32_input(&codec_decoder);

        log::info!(
            "Detected: ids_input='{}', attention_mask={}, position_ids={}, decoder_codes_int32={}",
            backbone_inputs.ids,
            backbone_inputs.attention_mask,
            backbone_inputs.position_ids,
            decoder_codes_int32
        );

        let rng = match params.generation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            backbone,
            backbone_inputs,
            codec_encoder,
            codec_decoder,
            decoder_codes_int32,
            tokenizer,
            speech_end_id,
            phonemizer,
            generation: params.generation.clone(),
            rng,
        })
    }

    /// Run the codec encoder over a 16 kHz mono waveform.
    fn encode_waveform(&mut self, samples: Vec<f32>) -> Result<Vec<i64>, NeuTtsError> {
        let len = samples.len();
        let audio = Array3::from_shape_vec((1, 1, len), samples)?;
        let outputs = self.codec_encoder.run(ort::inputs![Tensor::from_array(audio)?])?;
        let (_, codes) = outputs.iter().next().ok_or(NeuTtsError::NoOutput)?;

        // Exports differ in whether codes come out as int64 or int32.
        if let Ok(codes) = codes.try_extract_array::<i64>() {
            return Ok(codes.iter().copied().collect());
        }
        let codes = codes.try_extract_array::<i32>()?;
        Ok(codes.iter().map(|&c| c as i64).collect())
    }

    /// Run the codec decoder, returning 24 kHz samples.
    fn decode_codes(&mut self, codes: &[i64]) -> Result<Vec<f32>, NeuTtsError> {
        let shape = (1, 1, codes.len());
        let outputs = if self.decoder_codes_int32 {
            let codes = Array3::from_shape_vec(shape, codes.iter().map(|&c| c as i32).collect())?;
            self.codec_decoder.run(ort::inputs![Tensor::from_array(codes)?])?
        } else {
            let codes = Array3::from_shape_vec(shape, codes.to_vec())?;
            self.codec_decoder.run(ort::inputs![Tensor::from_array(codes)?])?
        };
        let (_, audio) = outputs.iter().next().ok_or(NeuTtsError::NoOutput)?;
        let audio = audio.try_extract_array::<f32>()?;
        Ok(audio.iter().copied().collect())
    }

    /// Logits for the token following `ids`.
    ///
    /// The backbone is exported without a KV cache, so every step feeds the
    /// whole sequence.
    fn next_token_logits(&mut self, ids: &[i64]) -> Result<Vec<f32>, NeuTtsError> {
        let seq_len = ids.len();
        let mut inputs: Vec<(String, SessionInputValue<'static>)> = vec![(
            self.backbone_inputs.ids.clone(),
            Tensor::from_array(Array2::from_shape_vec((1, seq_len), ids.to_vec())?)?.into(),
        )];
        if self.backbone_inputs.attention_mask {
            let mask = Array2::<i64>::ones((1, seq_len));
            inputs.push(("attention_mask".to_string(), Tensor::from_array(mask)?.into()));
        }
        if self.backbone_inputs.position_ids {
            let positions = Array2::from_shape_vec((1, seq_len), (0..seq_len as i64).collect())?;
            inputs.push(("position_ids".to_string(), Tensor::from_array(positions)?.into()));
        }

        let outputs = self.backbone.run(inputs)?;
        let (_, logits) = outputs.iter().next().ok_or(NeuTtsError::NoOutput)?;
        let logits = logits.try_extract_array::<f32>()?;

        // [batch, positions, vocab]; some exports only emit the last position.
        let vocab = logits.shape().last().copied().ok_or(NeuTtsError::NoOutput)?;
        let flat: Vec<f32> = logits.iter().copied().collect();
        if vocab == 0 || flat.len() < vocab {
            return Err(NeuTtsError::NoOutput);
        }
        Ok(flat[flat.len() - vocab..].to_vec())
    }

    fn prompt_ids(
        &self,
        prompt: &str,
        reference: &ReferenceCodes,
    ) -> Result<Vec<i64>, NeuTtsError> {
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| NeuTtsError::Tokenizer(e.to_string()))?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();

        for &code in &reference.0 {
            let token = prompt::speech_token(code);
            let id = self
                .tokenizer
                .token_to_id(&token)
                .ok_or(NeuTtsError::MissingToken(token))?;
            ids.push(id as i64);
        }
        Ok(ids)
    }

    /// Sample speech tokens until end-of-speech or the context is full.
    fn generate(&mut self, mut ids: Vec<i64>) -> Result<Vec<u32>, NeuTtsError> {
        let max_context = self.generation.max_context;
        if ids.len() >= max_context {
            return Err(NeuTtsError::PromptTooLong {
                len: ids.len(),
                max: max_context,
            });
        }

        let end = self.speech_end_id as usize;
        let mut generated = Vec::new();
        while ids.len() < max_context {
            let mut logits = self.next_token_logits(&ids)?;
            if generated.len() < self.generation.min_new_tokens && end < logits.len() {
                logits[end] = f32::NEG_INFINITY;
            }
            let next = sample_top_k(&logits, &self.generation, &mut self.rng) as u32;
            if next == self.speech_end_id {
                break;
            }
            generated.push(next);
            ids.push(next as i64);
        }

        log::debug!("Backbone generated {} tokens", generated.len());
        Ok(generated)
    }

    fn synthesize(
        &mut self,
        text: &str,
        reference: &ReferenceCodes,
        reference_text: &str,
    ) -> Result<Vec<f32>, NeuTtsError> {
        let reference_phones = self.phonemizer.phonemize(reference_text)?;
        let input_phones = self.phonemizer.phonemize(text)?;
        let prompt = prompt::chat_prompt(&reference_phones, &input_phones);

        let ids = self.prompt_ids(&prompt, reference)?;
        let generated = self.generate(ids)?;

        let decoded = self
            .tokenizer
            .decode(&generated, false)
            .map_err(|e| NeuTtsError::Tokenizer(e.to_string()))?;
        let codes = prompt::parse_speech_codes(&decoded);
        if codes.is_empty() {
            return Err(NeuTtsError::NoSpeechTokens);
        }

        self.decode_codes(&codes)
    }
}

impl VoiceCloneModel for NeuTtsModel {
    fn set_phonemizer(&mut self, phonemizer: Box<dyn Phonemizer>) {
        self.phonemizer = phonemizer;
    }

    fn encode_reference(&mut self, audio_path: &Path) -> Result<ReferenceCodes, BoxError> {
        let samples = audio::load_mono(audio_path, CODEC_INPUT_SAMPLE_RATE)?;
        let codes = self.encode_waveform(samples)?;
        log::debug!("Encoded reference {} into {} codes", audio_path.display(), codes.len());
        Ok(ReferenceCodes(codes))
    }

    fn infer(
        &mut self,
        text: &str,
        reference: &ReferenceCodes,
        reference_text: &str,
    ) -> Result<SynthesisResult, BoxError> {
        let samples = self.synthesize(text, reference, reference_text)?;
        Ok(SynthesisResult {
            samples,
            sample_rate: OUTPUT_SAMPLE_RATE,
        })
    }
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf, NeuTtsError> {
    let path = dir.join(name);
    if !path.exists() {
        return Err(NeuTtsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{name} not found in {}", dir.display()),
        )));
    }
    Ok(path)
}

/// Initialize an ONNX session on the selected device.
fn init_session(
    onnx_path: &Path,
    device: Device,
    num_threads: Option<usize>,
) -> Result<Session, NeuTtsError> {
    let providers = match device {
        Device::Cuda => vec![
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
        Device::Cpu => vec![CPUExecutionProvider::default().build()],
    };

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    log::debug!("Loading ONNX graph {}", onnx_path.display());
    Ok(builder.commit_from_file(onnx_path)?)
}

/// Detect the backbone's token input name and optional auxiliary inputs.
fn detect_backbone_inputs(session: &Session) -> BackboneInputs {
    let names: Vec<&str> = session.inputs().iter().map(|input| input.name()).collect();
    let ids = names
        .iter()
        .find(|name| **name == "input_ids" || **name == "tokens")
        .map(|name| name.to_string())
        // Default to "input_ids" if neither is found
        .unwrap_or_else(|| "input_ids".to_string());
    BackboneInputs {
        ids,
        attention_mask: names.contains(&"attention_mask"),
        position_ids: names.contains(&"position_ids"),
    }
}

/// Detect whether the first input expects int32 (true) or int64 (false).
fn detect_int32_input(session: &Session) -> bool {
    session
        .inputs()
        .first()
        .map(|input| {
            let type_str = format!("{:?}", input.dtype());
            type_str.contains("Int32") || type_str.contains("int32")
        })
        .unwrap_or(false)
}
