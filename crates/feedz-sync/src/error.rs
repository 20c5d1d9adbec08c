//! Error types for relay sync.

use std::time::Duration;

use nostr::{PublicKey, RelayUrl};
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error produced by a [`RecordSigner`](crate::RecordSigner), passed through
/// untouched.
pub type SignError = Box<dyn std::error::Error + Send + Sync>;

/// Whole-operation failures of a fetch or publish.
///
/// Failures of a single relay never surface here; they are logged and the
/// relay is left out of the result.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed key, or a record that could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] feedz_core::Error),

    /// No relay answered at the connection level.
    #[error("all {attempted} relays unreachable")]
    AllEndpointsUnreachable {
        /// Number of relays tried.
        attempted: usize,
    },

    /// The signer declined or failed to sign.
    #[error("signer refused to sign: {0}")]
    SigningRefused(#[source] SignError),

    /// The signer would publish into a different user's slot than the one
    /// that was merged.
    #[error("signer {signer} is not the snapshot owner {owner}")]
    OwnerMismatch {
        /// Owner whose snapshot was fetched.
        owner: PublicKey,
        /// Key the signer signs with.
        signer: PublicKey,
    },

    /// No relay acknowledged the published record.
    #[error("publish failed: none of {attempted} relays accepted the event")]
    Publish {
        /// Number of relays tried.
        attempted: usize,
        /// Why each relay failed.
        failures: Vec<(RelayUrl, String)>,
    },

    /// The overall deadline expired before the operation settled.
    #[error("sync deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// Invalid relay list or environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error reading or writing local state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local state file is not valid JSON.
    #[error("invalid state file: {0}")]
    State(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllEndpointsUnreachable { .. } | Self::Publish { .. } | Self::Timeout(_)
        )
    }
}

/// Failure of one relay within a fetch or publish.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connecting to the relay failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The relay answered but refused the event.
    #[error("relay rejected event: {0}")]
    Rejected(String),

    /// The relay answered the query with an error.
    #[error("query failed: {0}")]
    Query(String),

    /// The relay did not answer within the per-relay timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// True when the relay could not be reached at all.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::AllEndpointsUnreachable { attempted: 5 }.is_retryable());
        assert!(
            SyncError::Publish {
                attempted: 2,
                failures: vec![]
            }
            .is_retryable()
        );
        assert!(SyncError::Timeout(Duration::from_secs(30)).is_retryable());

        assert!(!SyncError::SigningRefused("user declined".into()).is_retryable());
        assert!(!SyncError::Config("no relays".to_string()).is_retryable());
        let decode: SyncError = feedz_core::Error::InvalidKey {
            input: "x".to_string(),
            reason: "bad".to_string(),
        }
        .into();
        assert!(!decode.is_retryable());
    }

    #[test]
    fn test_signing_refused_keeps_source() {
        let inner: SignError = "user declined".into();
        let err = SyncError::SigningRefused(inner);
        assert!(err.to_string().contains("user declined"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("user declined"));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SyncError::AllEndpointsUnreachable { attempted: 3 }.to_string(),
            "all 3 relays unreachable"
        );
        assert!(
            SyncError::Timeout(Duration::from_secs(30))
                .to_string()
                .contains("30s")
        );
        assert_eq!(
            TransportError::Rejected("blocked: spam".to_string()).to_string(),
            "relay rejected event: blocked: spam"
        );
    }

    #[test]
    fn test_connection_level_errors() {
        assert!(TransportError::Connect("refused".to_string()).is_connection_level());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_connection_level());
        assert!(!TransportError::Query("bad filter".to_string()).is_connection_level());
        assert!(!TransportError::Rejected("no".to_string()).is_connection_level());
    }
}
