//! File format tags, extension mapping, and magic-byte sniffing.
//!
//! `Format` is a closed enum rather than a free-form string so that an
//! unsupported source/target pair is unrepresentable once it has passed
//! parsing: the registry can only be keyed by formats the crate knows
//! how to handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A file format this crate can read or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Svg,
    Pdf,
}

impl Format {
    /// Canonical lowercase tag, as used in route slugs (`png-to-svg`).
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpeg => "jpeg",
            Format::Gif => "gif",
            Format::Bmp => "bmp",
            Format::Tiff => "tiff",
            Format::Webp => "webp",
            Format::Svg => "svg",
            Format::Pdf => "pdf",
        }
    }

    /// MIME type for HTTP responses and result packaging.
    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
            Format::Gif => "image/gif",
            Format::Bmp => "image/bmp",
            Format::Tiff => "image/tiff",
            Format::Webp => "image/webp",
            Format::Svg => "image/svg+xml",
            Format::Pdf => "application/pdf",
        }
    }

    /// File-name extensions accepted as this format.
    ///
    /// The first entry is the preferred extension used when deriving an
    /// output filename.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Png => &["png"],
            Format::Jpeg => &["jpg", "jpeg"],
            Format::Gif => &["gif"],
            Format::Bmp => &["bmp"],
            Format::Tiff => &["tiff", "tif"],
            Format::Webp => &["webp"],
            Format::Svg => &["svg"],
            Format::Pdf => &["pdf"],
        }
    }

    /// Resolve a file-name extension (without dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Format> {
        let ext = ext.to_ascii_lowercase();
        [
            Format::Png,
            Format::Jpeg,
            Format::Gif,
            Format::Bmp,
            Format::Tiff,
            Format::Webp,
            Format::Svg,
            Format::Pdf,
        ]
        .into_iter()
        .find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// Detect the actual format from leading magic bytes.
    ///
    /// SVG has no magic number; it is recognised by an XML/`<svg` prefix
    /// within the first kilobyte. Returns `None` for anything unrecognised.
    pub fn sniff(bytes: &[u8]) -> Option<Format> {
        if bytes.len() < 4 {
            return None;
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            return Some(Format::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Format::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Format::Gif);
        }
        if bytes.starts_with(b"BM") {
            return Some(Format::Bmp);
        }
        if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
            return Some(Format::Tiff);
        }
        if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
            return Some(Format::Webp);
        }
        if bytes.starts_with(b"%PDF") {
            return Some(Format::Pdf);
        }
        // SVG: text document whose first non-whitespace content opens an
        // <svg> or <?xml ...> <svg> element.
        let head = &bytes[..bytes.len().min(1024)];
        if let Ok(text) = std::str::from_utf8(head) {
            let trimmed = text.trim_start();
            if trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && text.contains("<svg")) {
                return Some(Format::Svg);
            }
        }
        None
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    /// Accepts both canonical tags and extension aliases (`jpg`, `tif`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::from_extension(s).ok_or_else(|| format!("unsupported format '{s}'"))
    }
}
