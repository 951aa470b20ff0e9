//! Conversion options and their published schema.
//!
//! All tunables for a conversion live in one [`ConversionOptions`] struct
//! with serde defaults, so a partial JSON/form payload merges cleanly over
//! the documented defaults and a config can be logged or diffed as a unit.
//! [`OptionsSchema`] describes which subset of fields a given converter
//! actually honours; the HTTP GET endpoint serialises it as the converter's
//! parameter documentation.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// How the tracer resolves an ambiguous corner where two foreground pixels
/// meet diagonally (a 2×2 checkerboard). Matches standard raster-tracing
/// conventions: `black`/`white` connect that colour's components,
/// `left`/`right` always turn that way, `minority`/`majority` pick the
/// colour that is locally rarer/commoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPolicy {
    #[default]
    Minority,
    Majority,
    Left,
    Right,
    Black,
    White,
}

impl FromStr for TurnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minority" => Ok(TurnPolicy::Minority),
            "majority" => Ok(TurnPolicy::Majority),
            "left" => Ok(TurnPolicy::Left),
            "right" => Ok(TurnPolicy::Right),
            "black" => Ok(TurnPolicy::Black),
            "white" => Ok(TurnPolicy::White),
            other => Err(format!(
                "unknown turn policy '{other}' (expected minority, majority, left, right, black, or white)"
            )),
        }
    }
}

impl fmt::Display for TurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPolicy::Minority => "minority",
            TurnPolicy::Majority => "majority",
            TurnPolicy::Left => "left",
            TurnPolicy::Right => "right",
            TurnPolicy::Black => "black",
            TurnPolicy::White => "white",
        };
        f.write_str(s)
    }
}

/// Options for a single conversion, merged over defaults.
///
/// Field bounds are enforced by [`ConversionOptions::validate`], which the
/// orchestrator calls before any adapter runs; an out-of-range value is a
/// validation error naming the offending option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Luminance cut between foreground and background for monochrome
    /// tracing (0–255).
    pub threshold: u8,

    /// Palette-based multi-layer tracing instead of monochrome.
    pub color_mode: bool,

    /// Quantization buckets per channel in color mode (2–16).
    pub color_levels: u8,

    /// Path-simplification aggressiveness (1–10). Higher trades fidelity
    /// for fewer path points.
    pub optimization: u8,

    /// Corner disambiguation for the tracer.
    pub turn_policy: TurnPolicy,

    /// Output quality for lossy raster targets (1–100).
    pub quality: u8,

    /// Output width in pixels. When only one of width/height is set and
    /// `preserve_aspect_ratio` is true, the other is derived.
    pub width: Option<u32>,

    /// Output height in pixels.
    pub height: Option<u32>,

    /// Preserve aspect ratio when resizing (fit within bounds).
    pub preserve_aspect_ratio: bool,

    /// Background colour for raster targets without alpha, `#rrggbb`.
    pub background: Option<String>,

    /// Page number for multi-page sources (1-based).
    pub page: usize,

    /// Render scale for PDF pages (0.1–10.0).
    pub scale: f32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            threshold: 128,
            color_mode: false,
            color_levels: 4,
            optimization: 5,
            turn_policy: TurnPolicy::default(),
            quality: 85,
            width: None,
            height: None,
            preserve_aspect_ratio: true,
            background: None,
            page: 1,
            scale: 2.0,
        }
    }
}

impl ConversionOptions {
    /// Check every field against its schema bounds.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.color_levels < 2 || self.color_levels > 16 {
            return Err(ConvertError::InvalidOption {
                option: "colorLevels",
                reason: format!("must be 2–16, got {}", self.color_levels),
            });
        }
        if self.optimization < 1 || self.optimization > 10 {
            return Err(ConvertError::InvalidOption {
                option: "optimization",
                reason: format!("must be 1–10, got {}", self.optimization),
            });
        }
        if self.quality < 1 {
            return Err(ConvertError::InvalidOption {
                option: "quality",
                reason: "must be 1–100, got 0".into(),
            });
        }
        if self.quality > 100 {
            return Err(ConvertError::InvalidOption {
                option: "quality",
                reason: format!("must be 1–100, got {}", self.quality),
            });
        }
        if self.page < 1 {
            return Err(ConvertError::InvalidOption {
                option: "page",
                reason: "pages are 1-indexed, minimum is 1".into(),
            });
        }
        if !(0.1..=10.0).contains(&self.scale) {
            return Err(ConvertError::InvalidOption {
                option: "scale",
                reason: format!("must be 0.1–10.0, got {}", self.scale),
            });
        }
        if let Some(ref bg) = self.background {
            parse_hex_color(bg).ok_or_else(|| ConvertError::InvalidOption {
                option: "background",
                reason: format!("'{bg}' is not a #rrggbb colour"),
            })?;
        }
        if self.width == Some(0) {
            return Err(ConvertError::InvalidOption {
                option: "width",
                reason: "must be positive".into(),
            });
        }
        if self.height == Some(0) {
            return Err(ConvertError::InvalidOption {
                option: "height",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Parse a `#rrggbb` hex colour into RGB bytes.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

// ── Published schema ─────────────────────────────────────────────────────

/// Which option subset a converter honours, published via the HTTP GET
/// schema endpoint and the CLI `list` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsSchema {
    /// Raster → SVG tracing options.
    RasterTrace,
    /// SVG → raster rendering options.
    RasterEncode,
    /// PDF page rendering options.
    PdfRender,
}

/// One named, typed option with its default, for schema JSON.
#[derive(Debug, Clone, Serialize)]
pub struct OptionSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    pub default: Value,
    pub description: &'static str,
}

impl OptionsSchema {
    /// The option specs for this schema, in display order.
    pub fn specs(self) -> Vec<OptionSpec> {
        let common_resize = [
            OptionSpec {
                name: "width",
                kind: "number",
                required: false,
                default: Value::Null,
                description: "Output width in pixels",
            },
            OptionSpec {
                name: "height",
                kind: "number",
                required: false,
                default: Value::Null,
                description: "Output height in pixels",
            },
            OptionSpec {
                name: "preserveAspectRatio",
                kind: "boolean",
                required: false,
                default: json!(true),
                description: "Preserve aspect ratio when resizing",
            },
        ];
        match self {
            OptionsSchema::RasterTrace => {
                let mut specs = vec![
                    OptionSpec {
                        name: "threshold",
                        kind: "number",
                        required: false,
                        default: json!(128),
                        description: "Black/white luminance threshold (0-255)",
                    },
                    OptionSpec {
                        name: "colorMode",
                        kind: "boolean",
                        required: false,
                        default: json!(false),
                        description: "Palette-based multi-layer tracing",
                    },
                    OptionSpec {
                        name: "colorLevels",
                        kind: "number",
                        required: false,
                        default: json!(4),
                        description: "Quantization levels per channel in color mode (2-16)",
                    },
                    OptionSpec {
                        name: "optimization",
                        kind: "number",
                        required: false,
                        default: json!(5),
                        description: "Path simplification aggressiveness (1-10)",
                    },
                    OptionSpec {
                        name: "turnPolicy",
                        kind: "string",
                        required: false,
                        default: json!("minority"),
                        description: "Ambiguous corner resolution: minority, majority, left, right, black, white",
                    },
                ];
                specs.extend(common_resize);
                specs
            }
            OptionsSchema::RasterEncode => {
                let mut specs = vec![
                    OptionSpec {
                        name: "quality",
                        kind: "number",
                        required: false,
                        default: json!(85),
                        description: "Output quality for lossy formats (1-100)",
                    },
                    OptionSpec {
                        name: "background",
                        kind: "string",
                        required: false,
                        default: Value::Null,
                        description: "Background color in hex format (e.g., #ffffff)",
                    },
                ];
                specs.extend(common_resize);
                specs
            }
            OptionsSchema::PdfRender => {
                let mut specs = vec![
                    OptionSpec {
                        name: "page",
                        kind: "number",
                        required: false,
                        default: json!(1),
                        description: "Page number to convert (1-based)",
                    },
                    OptionSpec {
                        name: "scale",
                        kind: "number",
                        required: false,
                        default: json!(2.0),
                        description: "Render scale factor (0.1-10.0)",
                    },
                ];
                specs.extend(common_resize);
                specs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConversionOptions::default().validate().is_ok());
    }

    #[test]
    fn default_values_match_schema() {
        let o = ConversionOptions::default();
        assert_eq!(o.threshold, 128);
        assert!(!o.color_mode);
        assert_eq!(o.turn_policy, TurnPolicy::Minority);
        assert_eq!(o.optimization, 5);
        assert_eq!(o.quality, 85);
        assert!(o.preserve_aspect_ratio);
    }

    #[test]
    fn out_of_range_optimization_names_option() {
        let o = ConversionOptions {
            optimization: 11,
            ..Default::default()
        };
        let err = o.validate().unwrap_err();
        assert!(err.to_string().contains("optimization"), "got: {err}");
    }

    #[test]
    fn bad_background_rejected() {
        let o = ConversionOptions {
            background: Some("red".into()),
            ..Default::default()
        };
        assert!(o.validate().is_err());

        let o = ConversionOptions {
            background: Some("#a1b2c3".into()),
            ..Default::default()
        };
        assert!(o.validate().is_ok());
    }

    #[test]
    fn hex_color_parses() {
        assert_eq!(parse_hex_color("#ffffff"), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("#00FF7f"), Some([0, 255, 127]));
        assert_eq!(parse_hex_color("ffffff"), None);
        assert_eq!(parse_hex_color("#fff"), None);
    }

    #[test]
    fn partial_json_merges_over_defaults() {
        let o: ConversionOptions = serde_json::from_str(r#"{"threshold": 200, "colorMode": true}"#)
            .expect("deserialize");
        assert_eq!(o.threshold, 200);
        assert!(o.color_mode);
        assert_eq!(o.optimization, 5);
        assert_eq!(o.turn_policy, TurnPolicy::Minority);
    }

    #[test]
    fn turn_policy_parses_case_insensitive() {
        assert_eq!("Majority".parse::<TurnPolicy>(), Ok(TurnPolicy::Majority));
        assert!("diagonal".parse::<TurnPolicy>().is_err());
    }

    #[test]
    fn trace_schema_lists_turn_policy() {
        let specs = OptionsSchema::RasterTrace.specs();
        assert!(specs.iter().any(|s| s.name == "turnPolicy"));
        assert!(specs.iter().any(|s| s.name == "preserveAspectRatio"));
    }
}
