//! Backbone prompt layout and speech token naming.

pub const TEXT_PROMPT_START: &str = "<|TEXT_PROMPT_START|>";
pub const TEXT_PROMPT_END: &str = "<|TEXT_PROMPT_END|>";
pub const SPEECH_GENERATION_START: &str = "<|SPEECH_GENERATION_START|>";
pub const SPEECH_GENERATION_END: &str = "<|SPEECH_GENERATION_END|>";

/// Chat prompt preceding the reference speech tokens.
///
/// Both transcripts are given as phonemes; the reference transcript comes
/// first so the model continues speaking after the reference audio.
pub fn chat_prompt(reference_phones: &str, input_phones: &str) -> String {
    format!(
        "user: Convert the text to speech:{TEXT_PROMPT_START}{reference_phones} {input_phones}\
         {TEXT_PROMPT_END}\nassistant:{SPEECH_GENERATION_START}"
    )
}

/// Vocabulary entry for codec code `code`.
pub fn speech_token(code: i64) -> String {
    format!("<|speech_{code}|>")
}

/// All codec codes in a decoded token string, skipping anything else.
pub fn parse_speech_codes(decoded: &str) -> Vec<i64> {
    decoded
        .split("<|")
        .filter_map(|piece| {
            let end = piece.find("|>")?;
            piece[..end].strip_prefix("speech_")?.parse().ok()
        })
        .collect()
}
