//! Error types for the svgconv library.
//!
//! A single [`ConvertError`] enum covers every failure path; every variant
//! maps onto one of six coarse [`ErrorKind`]s that drive retry/fallback
//! behaviour and HTTP status codes:
//!
//! * `UnsupportedConverter`: the requested slug/pair is not registered.
//!   Never retried, surfaced immediately (HTTP 404).
//! * `Validation`: input failed a size, extension, or option constraint
//!   before any adapter ran. Never retried (HTTP 400).
//! * `AdapterUnavailable`: a conversion backend could not be constructed
//!   in this environment (e.g. no pdfium library). Advances the fallback
//!   plan if one exists.
//! * `ConversionFailure`: the backend ran but the decode/trace/encode step
//!   failed. Advances the fallback plan if one exists.
//! * `Network`: a remote fallback call never produced a usable response;
//!   possibly transient, the message suggests retrying.
//! * `Timeout`: an operation exceeded its allotted time. Kept distinct
//!   from `Network` for telemetry even though user handling is similar.
//!
//! No error escapes the orchestrator as a panic or unhandled rejection:
//! adapters return `Result` on every path and the orchestrator normalizes
//! whatever it receives.

use crate::format::Format;
use thiserror::Error;

/// Coarse failure classification used for fallback decisions, HTTP status
/// mapping, and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedConverter,
    Validation,
    AdapterUnavailable,
    ConversionFailure,
    Network,
    Timeout,
}

/// All errors returned by the svgconv library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Registry lookup ───────────────────────────────────────────────────
    /// The route slug does not name a registered converter.
    #[error("No converter registered for '{slug}'")]
    UnknownConverter { slug: String },

    /// The (from, to) pair is not a registered conversion.
    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedPair { from: Format, to: Format },

    // ── Validation ────────────────────────────────────────────────────────
    /// Input exceeds the descriptor's size limit.
    #[error("File size ({size} bytes) exceeds the {max} byte limit for {slug}")]
    FileTooLarge { size: u64, max: u64, slug: String },

    /// Input file extension is not in the descriptor's accepted set.
    #[error("File extension '.{extension}' is not accepted; expected one of: {expected}")]
    UnsupportedExtension { extension: String, expected: String },

    /// The input has no usable file extension at all.
    #[error("File name '{name}' has no extension; expected one of: {expected}")]
    MissingExtension { name: String, expected: String },

    /// An option value is outside its schema bounds.
    #[error("Invalid option '{option}': {reason}")]
    InvalidOption { option: &'static str, reason: String },

    // ── Adapter lifecycle ─────────────────────────────────────────────────
    /// The conversion backend could not be loaded in this environment.
    #[error("Converter backend '{adapter}' is unavailable: {reason}")]
    AdapterUnavailable { adapter: &'static str, reason: String },

    // ── Conversion ────────────────────────────────────────────────────────
    /// The backend ran but failed to decode, trace, or encode the input.
    #[error("{message}")]
    ConversionFailed { message: String },

    // ── Remote fallback ───────────────────────────────────────────────────
    /// A remote conversion request never reached a usable response.
    #[error("Conversion service request failed: {reason}\nCheck your connection and try again.")]
    Network { reason: String },

    /// A local or remote operation exceeded its allotted time.
    #[error("Operation timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, tempfile failure, ...).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// The taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnknownConverter { .. } | ConvertError::UnsupportedPair { .. } => {
                ErrorKind::UnsupportedConverter
            }
            ConvertError::FileTooLarge { .. }
            | ConvertError::UnsupportedExtension { .. }
            | ConvertError::MissingExtension { .. }
            | ConvertError::InvalidOption { .. } => ErrorKind::Validation,
            ConvertError::AdapterUnavailable { .. } => ErrorKind::AdapterUnavailable,
            ConvertError::ConversionFailed { .. } | ConvertError::Internal(_) => {
                ErrorKind::ConversionFailure
            }
            ConvertError::Network { .. } => ErrorKind::Network,
            ConvertError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// HTTP status code for the route layer's error envelope.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::UnsupportedConverter => 404,
            ErrorKind::Validation => 400,
            ErrorKind::AdapterUnavailable => 500,
            ErrorKind::ConversionFailure => 500,
            ErrorKind::Network => 502,
            ErrorKind::Timeout => 504,
        }
    }

    /// Whether a fallback plan should try its next candidate after this
    /// error. Validation and lookup errors are resolved before any adapter
    /// runs and never reach the fallback loop; this guards the invariant.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::UnsupportedConverter | ErrorKind::Validation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let e = ConvertError::UnknownConverter {
            slug: "xyz-to-svg".into(),
        };
        assert_eq!(e.kind(), ErrorKind::UnsupportedConverter);
        assert_eq!(e.status_code(), 404);

        let e = ConvertError::FileTooLarge {
            size: 100,
            max: 10,
            slug: "png-to-svg".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert_eq!(e.status_code(), 400);

        let e = ConvertError::Network {
            reason: "connection refused".into(),
        };
        assert_eq!(e.status_code(), 502);

        let e = ConvertError::Timeout { secs: 60 };
        assert_eq!(e.status_code(), 504);
    }

    #[test]
    fn validation_never_falls_back() {
        let e = ConvertError::UnsupportedExtension {
            extension: "txt".into(),
            expected: "png".into(),
        };
        assert!(!e.allows_fallback());

        let e = ConvertError::ConversionFailed {
            message: "corrupt header".into(),
        };
        assert!(e.allows_fallback());

        let e = ConvertError::AdapterUnavailable {
            adapter: "pdfium",
            reason: "library not found".into(),
        };
        assert!(e.allows_fallback());
    }

    #[test]
    fn file_too_large_display_names_constraint() {
        let e = ConvertError::FileTooLarge {
            size: 30_000_000,
            max: 20_971_520,
            slug: "png-to-svg".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("30000000"), "got: {msg}");
        assert!(msg.contains("20971520"), "got: {msg}");
    }
}
