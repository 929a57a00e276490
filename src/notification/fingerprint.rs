//! Content fingerprint used as the dedup key
//!
//! The fingerprint is a SHA-256 digest over the exact bytes of the rendered
//! alert text. Identity is what the user would read, not the upstream event id,
//! so a re-triggered event that renders identical text maps to the same key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a rendered alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash a rendered message
    pub fn of(rendered: &str) -> Self {
        let digest = Sha256::digest(rendered.as_bytes());
        Self(digest.into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// Fingerprint of a rendered alert message
pub fn fingerprint(rendered: &str) -> Fingerprint {
    Fingerprint::of(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_message_same_fingerprint() {
        let msg = "📁 octo/repo\n📝 Bug\n\n👤 alice mentioned you in a comment:\n\nping @bob";
        assert_eq!(fingerprint(msg), fingerprint(msg));
    }

    #[test]
    fn test_single_character_difference() {
        assert_ne!(fingerprint("ping @bob"), fingerprint("ping @bob."));
        assert_ne!(fingerprint("ping @bob"), fingerprint("ping @bob "));
        assert_ne!(fingerprint("ping\n@bob"), fingerprint("ping @bob"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint("").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hex_round_trip_via_serde() {
        let fp = fingerprint("hello");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let parsed: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fp);

        assert!(serde_json::from_str::<Fingerprint>("\"not-hex\"").is_err());
    }
}
