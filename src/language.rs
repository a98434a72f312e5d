//! Request language tags and the espeak-ng codes they select.

use std::fmt;

/// Language the phonemizer is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Mandarin,
    English,
}

impl Language {
    /// Language the service starts with before any request arrives.
    pub const INITIAL: Language = Language::English;

    /// Map a request tag to a language.
    ///
    /// Only `"zh"` selects Mandarin. Every other tag, including unknown or
    /// empty ones, selects English.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "zh" => Language::Mandarin,
            "en" => Language::English,
            other => {
                log::debug!("Unrecognized language tag {other:?}, using English");
                Language::English
            }
        }
    }

    /// Whether `tag` is one of the tags the service documents (`zh`, `en`).
    pub fn is_recognized_tag(tag: &str) -> bool {
        matches!(tag, "zh" | "en")
    }

    /// espeak-ng voice code for this language.
    pub fn espeak_code(self) -> &'static str {
        match self {
            Language::Mandarin => "cmn",
            Language::English => "en-us",
        }
    }

    /// Inverse of [`Language::espeak_code`].
    pub fn from_espeak_code(code: &str) -> Option<Self> {
        match code {
            "cmn" => Some(Language::Mandarin),
            "en-us" => Some(Language::English),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.espeak_code())
    }
}
