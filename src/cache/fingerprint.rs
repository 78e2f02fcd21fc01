//! Request fingerprints used as cache and single-flight keys.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::Request;

/// Deterministic hash of the fields of a [`Request`] that affect its output.
///
/// Covers the task, whitespace-normalized system prompt, prompt and input
/// texts, temperature and max-tokens. A request carrying a `cache_key`
/// hint is identified by (task, hint) alone.
///
/// Uses `DefaultHasher` (SipHash with fixed keys), which is stable within a
/// build. That is enough for an in-process cache; a shared backend would
/// need a hash that is stable across builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of(request: &Request) -> Self {
        let mut hasher = DefaultHasher::new();
        request.task.as_str().hash(&mut hasher);

        if let Some(hint) = &request.cache_key {
            "hint".hash(&mut hasher);
            hint.hash(&mut hasher);
            return Self(hasher.finish());
        }

        hash_text(&mut hasher, request.system.as_deref());
        hash_text(&mut hasher, request.prompt.as_deref());
        request.texts.len().hash(&mut hasher);
        for text in &request.texts {
            hash_text(&mut hasher, Some(text));
        }
        request.temperature.map(normalize_float).hash(&mut hasher);
        request.max_tokens.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash `text` with runs of whitespace collapsed and ends trimmed.
///
/// `None` and `Some("")` hash differently from each other only through the
/// presence marker, never through their (empty) content.
fn hash_text(hasher: &mut DefaultHasher, text: Option<&str>) {
    match text {
        None => 0u8.hash(hasher),
        Some(text) => {
            1u8.hash(hasher);
            for word in text.split_whitespace() {
                word.hash(hasher);
            }
        }
    }
}

/// `-0.0` and `0.0` are the same temperature.
fn normalize_float(value: f32) -> u32 {
    if value == 0.0 { 0 } else { value.to_bits() }
}
