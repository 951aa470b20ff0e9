//! The conversion orchestrator: the one entry point that takes a request
//! from "slug + bytes + options" to a packaged result or a taxonomy error.
//!
//! Order of operations is fixed: resolve the descriptor, validate size,
//! extension, and options, then (and only then) drive the adapter chain.
//! No adapter is constructed for a request that fails validation. Each
//! call owns its own [`ProgressTracker`]; identical concurrent requests
//! run independently, there is no coalescing.

use crate::error::ConvertError;
use crate::fallback;
use crate::format::Format;
use crate::options::ConversionOptions;
use crate::output::{suggested_filename, Conversion, ConversionMetadata};
use crate::progress::ProgressTracker;
use crate::registry::{ConverterDescriptor, Registry};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// One conversion request.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub options: ConversionOptions,
}

/// Drives conversions against an immutable registry.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Convert with an internally owned progress tracker. For callers
    /// that do not surface progress.
    pub async fn convert_slug(
        &self,
        slug: &str,
        request: ConversionRequest,
    ) -> Result<Conversion, ConvertError> {
        let tracker = Arc::new(ProgressTracker::start(request.bytes.len() as u64));
        self.convert_with_tracker(slug, request, &tracker).await
    }

    /// Convert while reporting through a caller-supplied tracker, which
    /// is completed or failed (scheduling its auto-hide) before return.
    pub async fn convert_with_tracker(
        &self,
        slug: &str,
        request: ConversionRequest,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<Conversion, ConvertError> {
        let result = self.run(slug, request, tracker).await;
        match &result {
            Ok(_) => tracker.complete(),
            Err(err) => tracker.fail(err.to_string()),
        }
        result
    }

    async fn run(
        &self,
        slug: &str,
        request: ConversionRequest,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<Conversion, ConvertError> {
        let started = Instant::now();
        let descriptor: &ConverterDescriptor = self.registry.lookup_slug(slug)?;
        descriptor.validate_request(&request.file_name, request.bytes.len() as u64)?;
        request.options.validate()?;

        info!(
            slug = %descriptor.slug,
            file = %request.file_name,
            size = request.bytes.len(),
            "starting conversion"
        );

        let outcome = fallback::run(
            descriptor.candidates(),
            &request.bytes,
            &request.options,
            tracker,
        )
        .await?;

        let (width, height) = probe_dimensions(&outcome.data, descriptor.to);
        let conversion = Conversion {
            size_bytes: outcome.data.len() as u64,
            suggested_filename: suggested_filename(&request.file_name, descriptor.to),
            mime_type: outcome.mime_type,
            metadata: ConversionMetadata {
                method: outcome.method,
                fallback_attempts: outcome.failed_attempts,
                duration_ms: started.elapsed().as_millis() as u64,
                width,
                height,
            },
            data: outcome.data,
        };
        info!(
            slug = %descriptor.slug,
            method = conversion.metadata.method,
            out_bytes = conversion.size_bytes,
            duration_ms = conversion.metadata.duration_ms,
            "conversion finished"
        );
        Ok(conversion)
    }
}

/// Best-effort output dimensions for result metadata; absent when the
/// output cannot be probed cheaply.
fn probe_dimensions(data: &[u8], to: Format) -> (Option<u32>, Option<u32>) {
    if to == Format::Svg {
        let dims = std::str::from_utf8(data)
            .ok()
            .and_then(crate::adapters::svg_dimensions);
        return match dims {
            Some((w, h)) => (Some(w.round() as u32), Some(h.round() as u32)),
            None => (None, None),
        };
    }
    let dims = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()
        .and_then(|r| r.into_dimensions().ok());
    match dims {
        Some((w, h)) => (Some(w), Some(h)),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Adapter, Converted, LazyAdapter, ProgressFn};
    use crate::options::OptionsSchema;
    use crate::registry::RegistryConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Adapter for CountingAdapter {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn convert(
            &self,
            _input: &[u8],
            _options: &ConversionOptions,
            progress: &ProgressFn,
        ) -> Result<Converted, ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConvertError::ConversionFailed {
                    message: "stub failure".into(),
                });
            }
            progress(1.0);
            Ok(Converted {
                data: br#"<svg xmlns="http://www.w3.org/2000/svg" width="3" height="4"></svg>"#
                    .to_vec(),
                mime_type: "image/svg+xml",
            })
        }
    }

    fn stub_registry(calls: &Arc<AtomicUsize>, fail_first: bool) -> Arc<Registry> {
        let ok = {
            let calls = calls.clone();
            LazyAdapter::new("counting", move || {
                Ok(Arc::new(CountingAdapter {
                    calls: calls.clone(),
                    fail: false,
                }) as Arc<dyn Adapter>)
            })
        };
        let mut candidates = Vec::new();
        if fail_first {
            let calls = calls.clone();
            candidates.push(LazyAdapter::new("failing", move || {
                Ok(Arc::new(CountingAdapter {
                    calls: calls.clone(),
                    fail: true,
                }) as Arc<dyn Adapter>)
            }));
        }
        candidates.push(ok);

        Arc::new(Registry::from_descriptors(vec![ConverterDescriptor {
            slug: "png-to-svg".into(),
            from: Format::Png,
            to: Format::Svg,
            accepted_extensions: Format::Png.extensions(),
            max_input_size: 64,
            description: "stub".into(),
            schema: OptionsSchema::RasterTrace,
            candidates,
        }]))
    }

    fn request(name: &str, bytes: &[u8]) -> ConversionRequest {
        ConversionRequest {
            file_name: name.into(),
            bytes: bytes.to_vec(),
            options: ConversionOptions::default(),
        }
    }

    #[tokio::test]
    async fn validation_runs_before_any_adapter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(stub_registry(&calls, false));

        // Oversize input: rejected with zero adapter invocations.
        let err = orchestrator
            .convert_slug("png-to-svg", request("big.png", &[0u8; 65]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::FileTooLarge { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Wrong extension: same.
        let err = orchestrator
            .convert_slug("png-to-svg", request("file.txt", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedExtension { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Invalid option: same.
        let mut req = request("file.png", b"x");
        req.options.optimization = 99;
        let err = orchestrator.convert_slug("png-to-svg", req).await.unwrap_err();
        assert!(matches!(err, ConvertError::InvalidOption { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_slug_resolves_before_validation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(stub_registry(&calls, false));
        let err = orchestrator
            .convert_slug("gif-to-svg", request("a.gif", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnknownConverter { .. }));
    }

    #[tokio::test]
    async fn result_is_fully_packaged() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(stub_registry(&calls, false));
        let out = orchestrator
            .convert_slug("png-to-svg", request("photo.png", b"data"))
            .await
            .expect("convert");

        assert_eq!(out.mime_type, "image/svg+xml");
        assert_eq!(out.suggested_filename, "photo.svg");
        assert_eq!(out.size_bytes, out.data.len() as u64);
        assert_eq!(out.metadata.method, "counting");
        assert_eq!(out.metadata.fallback_attempts, 0);
        assert_eq!(out.metadata.width, Some(3));
        assert_eq!(out.metadata.height, Some(4));
    }

    #[tokio::test]
    async fn metadata_records_fallback_winner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(stub_registry(&calls, true));
        let out = orchestrator
            .convert_slug("png-to-svg", request("photo.png", b"data"))
            .await
            .expect("convert");
        assert_eq!(out.metadata.method, "counting");
        assert_eq!(out.metadata.fallback_attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tracker_finishes_on_both_paths() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(stub_registry(&calls, false));

        let tracker = Arc::new(ProgressTracker::start(4));
        orchestrator
            .convert_with_tracker("png-to-svg", request("a.png", b"data"), &tracker)
            .await
            .expect("convert");
        let snap = tracker.snapshot();
        assert_eq!(snap.progress, 100);
        assert!(!snap.has_error);

        let tracker = Arc::new(ProgressTracker::start(4));
        let _ = orchestrator
            .convert_with_tracker("png-to-svg", request("a.txt", b"data"), &tracker)
            .await
            .unwrap_err();
        let snap = tracker.snapshot();
        assert!(snap.has_error);
        assert!(
            snap.stage_label.contains("is not accepted"),
            "label: {}",
            snap.stage_label
        );
    }

    #[tokio::test]
    async fn end_to_end_against_builtin_registry() {
        use image::{Rgba, RgbaImage};
        use std::io::Cursor;

        let img = RgbaImage::from_pixel(6, 6, Rgba([0, 0, 0, 255]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).expect("encode");

        let registry = Arc::new(Registry::builtin(RegistryConfig {
            remote_endpoint: None,
            ..Default::default()
        }));
        let orchestrator = Orchestrator::new(registry);
        let out = orchestrator
            .convert_slug("png-to-svg", request("dot.png", &png.into_inner()))
            .await
            .expect("convert");
        let svg = String::from_utf8(out.data).expect("utf8");
        assert!(svg.starts_with("<svg"));
        assert_eq!(out.metadata.method, "trace");
    }
}
