//! Error types for feedz-core.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding keys or snapshot records.
///
/// Content decode failures are normally absorbed by the lenient decoders in
/// [`crate::codec`]; these variants surface only from the strict entry points.
#[derive(Error, Debug)]
pub enum Error {
    /// A public key could not be decoded from bech32 or hex.
    #[error("invalid public key '{input}': {reason}")]
    InvalidKey {
        /// The rejected input.
        input: String,
        /// Why the key codec rejected it.
        reason: String,
    },

    /// The event content is not a valid snapshot document.
    #[error("invalid snapshot content: {0}")]
    InvalidContent(#[from] serde_json::Error),

    /// The event is not the record type the caller asked to decode.
    #[error("unexpected record: expected kind {expected_kind} with d tag '{expected_identifier}', got kind {kind}")]
    UnexpectedRecord {
        /// Kind the decoder handles.
        expected_kind: u16,
        /// Purpose tag the decoder handles.
        expected_identifier: &'static str,
        /// Kind of the event that was offered.
        kind: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_display() {
        let err = Error::InvalidKey {
            input: "npub1bogus".to_string(),
            reason: "invalid checksum".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid public key"));
        assert!(msg.contains("npub1bogus"));
        assert!(msg.contains("invalid checksum"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::InvalidContent(_)));
        assert!(err.to_string().contains("invalid snapshot content"));
    }

    #[test]
    fn test_unexpected_record_display() {
        let err = Error::UnexpectedRecord {
            expected_kind: 30404,
            expected_identifier: "nostr-feedz-subscriptions",
            kind: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("30404"));
        assert!(msg.contains("nostr-feedz-subscriptions"));
        assert!(msg.contains("got kind 1"));
    }
}
