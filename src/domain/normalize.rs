//! Canonical identity strings for fuzzy track matching

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Genre tag that some playlists append to every title.
pub const DEFAULT_NOISE_PHRASE: &str = "ukf drum and bass";

/// Lower-cased, alphanumeric-and-space token used as a fuzzy track identity.
///
/// Different inputs may collapse to the same key, e.g. `"Foo & Bar"` and `"foo bar"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for NormalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    noise_phrase: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_PHRASE)
    }
}

impl Normalizer {
    pub fn new(noise_phrase: &str) -> Self {
        Self {
            noise_phrase: noise_phrase.trim().to_lowercase(),
        }
    }

    /// Canonicalizes free text into a [`NormalizedKey`].
    ///
    /// The cleanup pass is repeated until the text stops changing, so that a noise
    /// phrase which only appears after whitespace collapsing is stripped as well and
    /// `normalize(normalize(x)) == normalize(x)` always holds.
    pub fn normalize(&self, text: &str) -> NormalizedKey {
        let mut current = self.clean_once(text);
        loop {
            let next = self.clean_once(&current);
            if next == current {
                return NormalizedKey(current);
            }
            current = next;
        }
    }

    fn clean_once(&self, text: &str) -> String {
        let mut text = text
            .to_lowercase()
            .replace(['&', '/', '(', ')'], " ");

        if !self.noise_phrase.is_empty() {
            text = text.replace(&self.noise_phrase, "");
        }

        let filtered = text
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
            .collect::<String>();

        filtered.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
