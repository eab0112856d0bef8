//! Request bodies accepted by the front end.

use serde::Deserialize;

/// Longest key the front end accepts, in bytes.
pub const MAX_KEY_LENGTH: usize = 256;

/// Body of `PUT /set`.
///
/// `ttl` is in seconds; when absent the server's default applies, and `0`
/// stores the entry without expiry.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Returns a message describing the first problem found, if any.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("key must not be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "key is {} bytes, limit is {}",
                self.key.len(),
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}
