//! Result packaging for a finished conversion.

use crate::format::Format;
use serde::Serialize;

/// Provenance and measurements for a successful conversion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetadata {
    /// Name of the adapter that produced the result.
    pub method: &'static str,
    /// Candidates that failed before the winning adapter ran.
    pub fallback_attempts: u32,
    pub duration_ms: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A completed conversion, ready to hand to the route layer or write to
/// disk.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub suggested_filename: String,
    pub size_bytes: u64,
    pub metadata: ConversionMetadata,
}

/// Derive the output filename: input stem plus the target format's
/// preferred extension.
pub fn suggested_filename(input_name: &str, to: Format) -> String {
    let stem = match input_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => input_name,
    };
    let stem = if stem.is_empty() { "converted" } else { stem };
    format!("{stem}.{}", to.extensions()[0])
}
