//! # svgconv
//!
//! Convert raster images, PDFs, and SVGs between formats: an embeddable
//! conversion core with a CLI and HTTP API on top.
//!
//! The crate is organized around a small set of pieces:
//!
//! - [`registry::Registry`]: the immutable table of supported
//!   conversions, their input constraints, and their adapter candidates.
//! - [`adapters`]: the conversion backends. An in-crate bitmap tracer
//!   for raster to SVG, `resvg` for SVG to raster, pdfium for PDF pages,
//!   and a remote service client as the PDF fallback.
//! - [`convert::Orchestrator`]: the single entry point that validates a
//!   request, drives the fallback chain, and packages the result.
//! - [`progress::ProgressTracker`]: stage-based progress with ETA and
//!   timed auto-hide, pollable from any UI.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use svgconv::{ConversionOptions, ConversionRequest, Orchestrator, Registry, RegistryConfig};
//!
//! # async fn run() -> Result<(), svgconv::ConvertError> {
//! let registry = Arc::new(Registry::builtin(RegistryConfig::default()));
//! registry.validate()?;
//!
//! let orchestrator = Orchestrator::new(registry);
//! let result = orchestrator
//!     .convert_slug(
//!         "png-to-svg",
//!         ConversionRequest {
//!             file_name: "logo.png".into(),
//!             bytes: std::fs::read("logo.png").map_err(|e| svgconv::ConvertError::Internal(e.to_string()))?,
//!             options: ConversionOptions::default(),
//!         },
//!     )
//!     .await?;
//! std::fs::write(&result.suggested_filename, &result.data)
//!     .map_err(|e| svgconv::ConvertError::Internal(e.to_string()))?;
//! # Ok(())
//! # }
//! ```
//!
//! Every failure is a [`ConvertError`] with a coarse
//! [`ErrorKind`](error::ErrorKind) that callers can map to retry
//! behavior or HTTP statuses; the library never panics on bad input.

pub mod adapters;
pub mod convert;
pub mod error;
pub mod fallback;
pub mod format;
pub mod http;
pub mod options;
pub mod output;
pub mod progress;
pub mod registry;

pub use convert::{ConversionRequest, Orchestrator};
pub use error::{ConvertError, ErrorKind};
pub use format::Format;
pub use options::{ConversionOptions, TurnPolicy};
pub use output::{Conversion, ConversionMetadata};
pub use progress::{ProgressStage, ProgressState, ProgressTracker};
pub use registry::{ConverterDescriptor, Registry, RegistryConfig};
