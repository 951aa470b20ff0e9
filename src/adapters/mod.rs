//! Conversion backends and the trait they implement.
//!
//! An [`Adapter`] turns input bytes into output bytes for one format pair,
//! reporting raw progress fractions as it goes. Adapters are constructed
//! lazily through [`LazyAdapter`] so that a backend whose native library
//! is missing (pdfium) or whose endpoint is unconfigured (remote) costs
//! nothing until a conversion actually needs it, and its construction
//! failure surfaces as `AdapterUnavailable` rather than a conversion
//! failure.

use crate::error::ConvertError;
use crate::options::ConversionOptions;
use async_trait::async_trait;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

pub mod pdf;
pub mod raster;
pub mod remote;
pub mod svg_raster;
pub mod trace;

/// Raw progress callback: fraction in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// A no-op progress callback for callers that do not track progress.
pub fn null_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Output of a successful adapter run.
#[derive(Debug, Clone)]
pub struct Converted {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

/// One conversion backend for one format pair.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable identifier recorded as `metadata.method` when this adapter
    /// produces the winning result.
    fn name(&self) -> &'static str;

    async fn convert(
        &self,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError>;
}

/// Deferred adapter construction with success memoization.
///
/// The constructor runs at most until it first succeeds; a failure is
/// returned to the caller (and retried on the next use, since transient
/// conditions like a missing env var may have changed).
pub struct LazyAdapter {
    name: &'static str,
    ctor: Box<dyn Fn() -> Result<Arc<dyn Adapter>, ConvertError> + Send + Sync>,
    cell: OnceCell<Arc<dyn Adapter>>,
}

impl LazyAdapter {
    pub fn new<F>(name: &'static str, ctor: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Adapter>, ConvertError> + Send + Sync + 'static,
    {
        Self {
            name,
            ctor: Box::new(ctor),
            cell: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Construct (or reuse) the adapter instance.
    pub fn get(&self) -> Result<Arc<dyn Adapter>, ConvertError> {
        self.cell.get_or_try_init(|| (self.ctor)()).cloned()
    }
}

impl fmt::Debug for LazyAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyAdapter")
            .field("name", &self.name)
            .field("constructed", &self.cell.get().is_some())
            .finish()
    }
}

// ── SVG resize post-processing ───────────────────────────────────────────

static SVG_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"width="([0-9]+(?:\.[0-9]+)?)""#).unwrap_or_else(|_| unreachable!()));
static SVG_HEIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"height="([0-9]+(?:\.[0-9]+)?)""#).unwrap_or_else(|_| unreachable!()));

/// Rewrite the root `width`/`height` of an SVG document per the resize
/// options. With `preserve_aspect_ratio` and both bounds given, the
/// document is fitted within them; with one bound, the other dimension is
/// derived. Returns the input unchanged when no resize is requested or
/// the root carries no numeric dimensions. The `viewBox` is untouched, so
/// content scales with the new dimensions.
pub fn resize_svg(svg: &str, options: &ConversionOptions) -> String {
    if options.width.is_none() && options.height.is_none() {
        return svg.to_owned();
    }
    let orig_w = SVG_WIDTH_RE
        .captures(svg)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let orig_h = SVG_HEIGHT_RE
        .captures(svg)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let (Some(orig_w), Some(orig_h)) = (orig_w, orig_h) else {
        return svg.to_owned();
    };
    if orig_w <= 0.0 || orig_h <= 0.0 {
        return svg.to_owned();
    }

    let (new_w, new_h) = target_dimensions(
        orig_w,
        orig_h,
        options.width.map(f64::from),
        options.height.map(f64::from),
        options.preserve_aspect_ratio,
    );

    let svg = SVG_WIDTH_RE.replace(svg, format!(r#"width="{}""#, format_dim(new_w)));
    SVG_HEIGHT_RE
        .replace(&svg, format!(r#"height="{}""#, format_dim(new_h)))
        .into_owned()
}

/// Resolve requested bounds against the source aspect ratio.
pub fn target_dimensions(
    orig_w: f64,
    orig_h: f64,
    want_w: Option<f64>,
    want_h: Option<f64>,
    preserve: bool,
) -> (f64, f64) {
    match (want_w, want_h) {
        (Some(w), Some(h)) if preserve => {
            let scale = (w / orig_w).min(h / orig_h);
            (orig_w * scale, orig_h * scale)
        }
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            if preserve {
                (w, orig_h * w / orig_w)
            } else {
                (w, orig_h)
            }
        }
        (None, Some(h)) => {
            if preserve {
                (orig_w * h / orig_h, h)
            } else {
                (orig_w, h)
            }
        }
        (None, None) => (orig_w, orig_h),
    }
}

/// Root `width`/`height` of an SVG document, when numeric.
pub(crate) fn svg_dimensions(svg: &str) -> Option<(f64, f64)> {
    let w = SVG_WIDTH_RE
        .captures(svg)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;
    let h = SVG_HEIGHT_RE
        .captures(svg)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;
    Some((w, h))
}

fn format_dim(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as u64)
    } else {
        format!("{v:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NopAdapter;

    #[async_trait]
    impl Adapter for NopAdapter {
        fn name(&self) -> &'static str {
            "nop"
        }

        async fn convert(
            &self,
            input: &[u8],
            _options: &ConversionOptions,
            _progress: &ProgressFn,
        ) -> Result<Converted, ConvertError> {
            Ok(Converted {
                data: input.to_vec(),
                mime_type: "application/octet-stream",
            })
        }
    }

    #[test]
    fn lazy_adapter_constructs_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let lazy = LazyAdapter::new("nop", || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NopAdapter) as Arc<dyn Adapter>)
        });
        assert!(lazy.get().is_ok());
        assert!(lazy.get().is_ok());
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_adapter_surfaces_construction_failure() {
        let lazy = LazyAdapter::new("broken", || {
            Err(ConvertError::AdapterUnavailable {
                adapter: "broken",
                reason: "library not found".into(),
            })
        });
        let err = lazy.get().err().expect("construction fails");
        assert!(matches!(err, ConvertError::AdapterUnavailable { .. }));
    }

    const DOC: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50" viewBox="0 0 100 50"></svg>"#;

    fn opts(width: Option<u32>, height: Option<u32>, preserve: bool) -> ConversionOptions {
        ConversionOptions {
            width,
            height,
            preserve_aspect_ratio: preserve,
            ..Default::default()
        }
    }

    #[test]
    fn resize_noop_without_bounds() {
        assert_eq!(resize_svg(DOC, &ConversionOptions::default()), DOC);
    }

    #[test]
    fn resize_fits_within_bounds() {
        // 100x50 into 60x60 with aspect preserved is 60x30.
        let out = resize_svg(DOC, &opts(Some(60), Some(60), true));
        assert!(out.contains(r#"width="60""#), "{out}");
        assert!(out.contains(r#"height="30""#), "{out}");
        assert!(out.contains(r#"viewBox="0 0 100 50""#));
    }

    #[test]
    fn resize_exact_when_not_preserving() {
        let out = resize_svg(DOC, &opts(Some(60), Some(60), false));
        assert!(out.contains(r#"width="60""#));
        assert!(out.contains(r#"height="60""#));
    }

    #[test]
    fn resize_derives_missing_dimension() {
        let out = resize_svg(DOC, &opts(Some(200), None, true));
        assert!(out.contains(r#"width="200""#));
        assert!(out.contains(r#"height="100""#));
    }

    #[test]
    fn resize_leaves_dimensionless_svg_alone() {
        let doc = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"></svg>"#;
        assert_eq!(resize_svg(doc, &opts(Some(60), None, true)), doc);
    }
}
