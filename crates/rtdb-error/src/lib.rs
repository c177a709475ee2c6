// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy for the realtime database streaming engine.
//!
//! Every error raised by this workspace carries an [`ErrorCode`] — a stable,
//! machine-matchable discriminant — alongside a human-readable message and an
//! optional boxed cause. Construct errors with [`RtdbError::new`] or
//! [`RtdbError::with_source`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller-supplied input failed a synchronous check.
    Validation,
    /// Service-account credential or signing failure.
    Credential,
    /// Upstream transport interruption, recovered via backoff.
    Transport,
    /// Malformed payload from an otherwise-healthy connection.
    Payload,
    /// Local filesystem I/O failure.
    Io,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Credential => "credential",
            Self::Transport => "transport",
            Self::Payload => "payload",
            Self::Io => "io",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
///
/// Each variant maps to exactly one [`ErrorCategory`] via [`ErrorCode::category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // -- Validation --
    /// A custom token was requested with an empty `uid`.
    EmptyUid,
    /// A custom token's `uid` exceeded 128 characters.
    UidTooLong,
    /// A service-account credential was missing a required field.
    MissingCredentialField,

    // -- Credential --
    /// The RS256 signer could not be constructed from the private key.
    SignerConstruction,
    /// JWT encoding failed after claims were assembled.
    TokenEncodingFailed,
    /// The identity service rejected or failed the custom-token exchange.
    TokenExchangeFailed,
    /// The `idToken` returned by the exchange could not be parsed for `exp`.
    TokenExpiryUnreadable,

    // -- Transport --
    /// The upstream subscription was cancelled by the server.
    UpstreamCancelled,
    /// The upstream stream closed.
    UpstreamClosed,
    /// The upstream connection's auth was revoked mid-stream.
    UpstreamAuthRevoked,
    /// The upstream event channel ended without a terminal event.
    UpstreamEnded,
    /// No event, including a keep-alive, arrived within the keep-alive window.
    KeepAliveLapsed,

    // -- Payload --
    /// An upstream event's payload was not valid JSON.
    MalformedPayload,
    /// An upstream event's payload was missing its `path` field.
    MissingPath,

    // -- Io --
    /// The watched file could not be read.
    FileReadFailed,
    /// The filesystem watcher failed to start or reported an error.
    WatchFailed,

    // -- Internal --
    /// A listener callback panicked during dispatch.
    CallbackPanic,
    /// An invariant was violated that should be unreachable in normal operation.
    Internal,
}

impl ErrorCode {
    /// The [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::EmptyUid | Self::UidTooLong | Self::MissingCredentialField => {
                ErrorCategory::Validation
            }
            Self::SignerConstruction
            | Self::TokenEncodingFailed
            | Self::TokenExchangeFailed
            | Self::TokenExpiryUnreadable => ErrorCategory::Credential,
            Self::UpstreamCancelled
            | Self::UpstreamClosed
            | Self::UpstreamAuthRevoked
            | Self::UpstreamEnded
            | Self::KeepAliveLapsed => ErrorCategory::Transport,
            Self::MalformedPayload | Self::MissingPath => ErrorCategory::Payload,
            Self::FileReadFailed | Self::WatchFailed => ErrorCategory::Io,
            Self::CallbackPanic | Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `SCREAMING_SNAKE_CASE` tag for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyUid => "EMPTY_UID",
            Self::UidTooLong => "UID_TOO_LONG",
            Self::MissingCredentialField => "MISSING_CREDENTIAL_FIELD",
            Self::SignerConstruction => "SIGNER_CONSTRUCTION",
            Self::TokenEncodingFailed => "TOKEN_ENCODING_FAILED",
            Self::TokenExchangeFailed => "TOKEN_EXCHANGE_FAILED",
            Self::TokenExpiryUnreadable => "TOKEN_EXPIRY_UNREADABLE",
            Self::UpstreamCancelled => "UPSTREAM_CANCELLED",
            Self::UpstreamClosed => "UPSTREAM_CLOSED",
            Self::UpstreamAuthRevoked => "UPSTREAM_AUTH_REVOKED",
            Self::UpstreamEnded => "UPSTREAM_ENDED",
            Self::KeepAliveLapsed => "KEEP_ALIVE_LAPSED",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::MissingPath => "MISSING_PATH",
            Self::FileReadFailed => "FILE_READ_FAILED",
            Self::WatchFailed => "WATCH_FAILED",
            Self::CallbackPanic => "CALLBACK_PANIC",
            Self::Internal => "INTERNAL",
        }
    }

    /// `true` if this code's category is recoverable by the upstream driver's
    /// backoff loop without tearing down the whole stream.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        matches!(self.category(), ErrorCategory::Transport | ErrorCategory::Payload)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate-wide error type.
///
/// Carries a stable [`ErrorCode`], a human-readable message, and an optional
/// boxed cause accessible through [`std::error::Error::source`].
#[derive(Debug)]
pub struct RtdbError {
    code: ErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RtdbError {
    /// Construct an error with no underlying cause.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Construct an error wrapping an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The stable error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl fmt::Display for RtdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RtdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience alias for `Result<T, RtdbError>`.
pub type Result<T> = std::result::Result<T, RtdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping_is_total() {
        assert_eq!(ErrorCode::EmptyUid.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::UpstreamClosed.category(), ErrorCategory::Transport);
        assert_eq!(ErrorCode::FileReadFailed.category(), ErrorCategory::Io);
    }

    #[test]
    fn transport_and_payload_are_recoverable() {
        assert!(ErrorCode::UpstreamCancelled.is_recoverable());
        assert!(ErrorCode::MalformedPayload.is_recoverable());
        assert!(!ErrorCode::EmptyUid.is_recoverable());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = RtdbError::new(ErrorCode::EmptyUid, "uid must not be empty");
        let rendered = err.to_string();
        assert!(rendered.contains("EMPTY_UID"));
        assert!(rendered.contains("uid must not be empty"));
    }

    #[test]
    fn source_chain_is_preserved() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = RtdbError::with_source(ErrorCode::FileReadFailed, "could not read file", io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
