use derive_builder::Builder;
use rand::Rng;

/// Autoregressive generation settings for the backbone.
#[derive(Debug, Clone, Builder)]
pub struct GenerationParams {
    /// Softmax temperature; `0.0` means greedy decoding.
    #[builder(default = "1.0")]
    pub temperature: f32,
    /// Sample only among the `top_k` most likely tokens.
    #[builder(default = "50")]
    pub top_k: usize,
    /// Upper bound on prompt plus generated tokens.
    #[builder(default = "2048")]
    pub max_context: usize,
    /// The end-of-speech token is suppressed until this many tokens exist.
    #[builder(default = "0")]
    pub min_new_tokens: usize,
    /// Fixed RNG seed, for reproducible output.
    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 50,
            max_context: 2048,
            min_new_tokens: 0,
            seed: None,
        }
    }
}

/// Pick the next token id from `logits`.
pub fn sample_top_k<R: Rng + ?Sized>(
    logits: &[f32],
    params: &GenerationParams,
    rng: &mut R,
) -> usize {
    if params.temperature <= 0.0 || params.top_k <= 1 {
        return argmax(logits);
    }

    let mut candidates: Vec<(usize, f32)> = logits
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .collect();
    if candidates.is_empty() {
        return argmax(logits);
    }
    let k = params.top_k.min(candidates.len());
    candidates.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
    candidates.truncate(k);

    let max = candidates.iter().map(|&(_, l)| l).fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = candidates
        .iter()
        .map(|&(_, l)| ((l - max) / params.temperature).exp())
        .collect();
    let total: f32 = weights.iter().sum();

    let mut threshold = rng.random::<f32>() * total;
    for (&(id, _), &w) in candidates.iter().zip(&weights) {
        if threshold < w {
            return id;
        }
        threshold -= w;
    }
    candidates[k - 1].0
}

fn argmax(logits: &[f32]) -> usize {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
