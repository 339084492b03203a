//! Parameterized read queries and their content hash.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A parameterized statement: SQL text plus its bound parameters.
///
/// Two queries with the same text and the same parameters hash identically,
/// regardless of where they were constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next positional parameter.
    pub fn bind(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Hex-encoded SHA-256 over a canonical encoding of text and parameters.
    ///
    /// Text and each parameter are length-prefixed so `("ab", ["c"])` and
    /// `("a", ["bc"])` cannot produce the same digest. Parameter objects are
    /// serialized with sorted keys.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        write_segment(&mut hasher, self.text.as_bytes());
        hasher.update((self.params.len() as u64).to_be_bytes());
        for param in &self.params {
            let canonical = param.to_string();
            write_segment(&mut hasher, canonical.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn write_segment(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
