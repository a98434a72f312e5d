//! Text-to-phoneme conversion.
//!
//! The [`Phonemizer`] trait is what models consume; [`EspeakBackend`] is the
//! espeak-ng implementation. espeak-ng must be installed on the host:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`

use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use derive_builder::Builder;

use crate::language::Language;

#[derive(thiserror::Error, Debug)]
pub enum PhonemizerError {
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`"
    )]
    EspeakNotFound,
    #[error("espeak-ng has no voice for language '{0}'")]
    UnsupportedLanguage(String),
    #[error("Phonemization failed: {0}")]
    Failed(String),
    #[error("Invalid phonemizer options: {0}")]
    Options(#[from] EspeakOptionsBuilderError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts text into a space-separated phoneme string.
pub trait Phonemizer: Send {
    /// Language code this phonemizer was configured for.
    fn language(&self) -> &str;

    fn phonemize(&self, text: &str) -> Result<String, PhonemizerError>;
}

/// Builds phonemizers on demand, one per language.
pub trait PhonemizerProvider: Send + Sync {
    fn build(&self, language: Language) -> Result<Box<dyn Phonemizer>, PhonemizerError>;
}

/// Location of the espeak-ng binary and its voice data.
///
/// Either path can be `None` to fall back to the system default.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let mut cmd = match &self.bin_path {
            Some(bin) => Command::new(bin),
            None => Command::new("espeak-ng"),
        };
        if let Some(data) = &self.data_path {
            cmd.env("ESPEAK_DATA_PATH", data);
        }
        cmd
    }

    /// Language codes espeak-ng reports through `--voices`.
    pub fn supported_languages(&self) -> Result<Vec<String>, PhonemizerError> {
        let output = self
            .command()
            .arg("--voices")
            .output()
            .map_err(spawn_error)?;
        if !output.status.success() {
            return Err(PhonemizerError::Failed(format!(
                "espeak-ng --voices exited with code {:?}",
                output.status.code()
            )));
        }
        Ok(parse_voice_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct EspeakOptions {
    /// espeak-ng voice code, e.g. `"en-us"` or `"cmn"`.
    language: String,
    /// Keep punctuation marks in the phoneme string.
    #[builder(default = "true")]
    preserve_punctuation: bool,
    /// Keep primary/secondary stress marks.
    #[builder(default = "true")]
    with_stress: bool,
    #[builder(default)]
    config: EspeakConfig,
}

/// espeak-ng phonemizer for a single language.
#[derive(Debug, Clone)]
pub struct EspeakBackend {
    options: EspeakOptions,
}

impl EspeakBackend {
    /// Create a backend, verifying that espeak-ng is installed and has a
    /// voice for the requested language.
    pub fn new(options: EspeakOptions) -> Result<Self, PhonemizerError> {
        let languages = options.config.supported_languages()?;
        if !languages.iter().any(|l| l == &options.language) {
            return Err(PhonemizerError::UnsupportedLanguage(options.language));
        }
        log::debug!(
            "espeak-ng backend ready: language={} punctuation={} stress={}",
            options.language,
            options.preserve_punctuation,
            options.with_stress
        );
        Ok(Self { options })
    }

    fn run_espeak(&self, input: &str) -> Result<String, PhonemizerError> {
        let mut child = self
            .options
            .config
            .command()
            .args(["--ipa", "--stdin", "-q", "-v", &self.options.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            // espeak-ng reads stdin line by line; an unterminated last line
            // loses its final token.
            stdin.write_all(canonicalize_espeak_stdin_payload(input).as_bytes())?;
        }

        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PhonemizerError::Failed(format!(
                "espeak-ng exited with code {:?}: {stderr}",
                output.status.code()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn phonemize_segments_batch(&self, segments: &[&str]) -> Result<Vec<String>, PhonemizerError> {
        let output = self.run_espeak(&segments.join("\n"))?;
        let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();

        // One output line per input line is expected; fall back to
        // per-segment invocation when espeak-ng splits or merges lines.
        if lines.len() != segments.len() {
            return segments
                .iter()
                .map(|segment| {
                    let output = self.run_espeak(segment)?;
                    Ok(self.clean_ipa(&output))
                })
                .collect();
        }

        Ok(lines.iter().map(|line| self.clean_ipa(line)).collect())
    }

    fn clean_ipa(&self, ipa: &str) -> String {
        let words = ipa.split_whitespace().map(|word| {
            word.chars()
                .filter(|&ch| ch != '_')
                .filter(|&ch| self.options.with_stress || !matches!(ch, 'ˈ' | 'ˌ'))
                .collect::<String>()
        });
        words.filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ")
    }
}

impl Phonemizer for EspeakBackend {
    fn language(&self) -> &str {
        &self.options.language
    }

    fn phonemize(&self, text: &str) -> Result<String, PhonemizerError> {
        let parts = split_text_parts(text);
        if parts.is_empty() {
            return Ok(String::new());
        }

        let text_segments: Vec<&str> = parts
            .iter()
            .filter_map(|part| match part {
                TextPart::Text(segment) => Some(segment.as_str()),
                TextPart::Punct(_) => None,
            })
            .collect();

        let segment_phones = if text_segments.is_empty() {
            Vec::new()
        } else {
            self.phonemize_segments_batch(&text_segments)?
        };

        Ok(join_parts(
            &parts,
            &segment_phones,
            self.options.preserve_punctuation,
        ))
    }
}

/// Builds [`EspeakBackend`]s that keep punctuation and stress marks.
#[derive(Debug, Clone, Default)]
pub struct EspeakProvider {
    config: EspeakConfig,
}

impl EspeakProvider {
    pub fn new(config: EspeakConfig) -> Self {
        Self { config }
    }
}

impl PhonemizerProvider for EspeakProvider {
    fn build(&self, language: Language) -> Result<Box<dyn Phonemizer>, PhonemizerError> {
        let options = EspeakOptionsBuilder::default()
            .language(language.espeak_code())
            .preserve_punctuation(true)
            .with_stress(true)
            .config(self.config.clone())
            .build()?;
        Ok(Box::new(EspeakBackend::new(options)?))
    }
}

fn spawn_error(e: std::io::Error) -> PhonemizerError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PhonemizerError::EspeakNotFound
    } else {
        PhonemizerError::Io(e)
    }
}

/// Extract language codes from `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File          Other Languages
///  5  cmn             --/M      Chinese_(Mandarin) sit/cmn       (zh-cmn 5)(zh 5)
/// ```
fn parse_voice_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

fn join_parts(parts: &[TextPart], segment_phones: &[String], keep_punct: bool) -> String {
    let mut out = String::new();
    let mut segment_index = 0usize;
    for part in parts {
        match part {
            TextPart::Text(_) => {
                if let Some(phones) = segment_phones.get(segment_index) {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(phones);
                }
                segment_index += 1;
            }
            TextPart::Punct(ch) if keep_punct => out.push(*ch),
            TextPart::Punct(_) => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        let ch_len = ch.len_utf8();
        if let Some(punct) = map_boundary_punctuation(ch) {
            if !is_numeric_connector_between_digits(text, idx, ch_len, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    parts
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Text(trimmed.to_string()));
    }
    current.clear();
}

fn map_boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        // Full-width CJK punctuation folds onto its ASCII counterpart.
        '。' => Some('.'),
        '，' | '、' => Some(','),
        '！' => Some('!'),
        '？' => Some('?'),
        '；' => Some(';'),
        '：' => Some(':'),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

fn is_numeric_connector_between_digits(text: &str, idx: usize, ch_len: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch_len..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

fn canonicalize_espeak_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}
