//! The converter registry: which format pairs exist, what they accept,
//! and which adapter candidates serve them.
//!
//! The registry is built once at startup from a [`RegistryConfig`] and
//! never mutated. Descriptors carry everything the orchestrator needs to
//! validate a request before any adapter is constructed, plus the ordered
//! fallback candidates; the HTTP layer and CLI read the same descriptors
//! for schema introspection, so documentation cannot drift from behavior.

use crate::adapters::pdf::PdfiumAdapter;
use crate::adapters::raster::RasterTraceAdapter;
use crate::adapters::remote::RemoteAdapter;
use crate::adapters::svg_raster::SvgRasterAdapter;
use crate::adapters::{Adapter, LazyAdapter};
use crate::error::ConvertError;
use crate::format::Format;
use crate::options::OptionsSchema;
use serde_json::{json, Value};
use std::sync::Arc;

const MB: u64 = 1024 * 1024;

/// Environment-tunable registry settings, injected rather than read from
/// globals so tests can shrink limits or point the remote candidate at a
/// stub server.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hosted conversion service for the PDF fallback candidate. When
    /// unset, PDF conversion has only the local pdfium path.
    pub remote_endpoint: Option<String>,
    pub remote_timeout_secs: u64,
    pub max_raster_input_bytes: u64,
    pub max_svg_input_bytes: u64,
    pub max_pdf_input_bytes: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: std::env::var("SVGCONV_REMOTE_ENDPOINT").ok(),
            remote_timeout_secs: 60,
            max_raster_input_bytes: 20 * MB,
            max_svg_input_bytes: 10 * MB,
            max_pdf_input_bytes: 50 * MB,
        }
    }
}

/// One registered conversion: its identity, input constraints, published
/// option schema, and ordered adapter candidates.
#[derive(Debug)]
pub struct ConverterDescriptor {
    pub slug: String,
    pub from: Format,
    pub to: Format,
    pub accepted_extensions: &'static [&'static str],
    pub max_input_size: u64,
    pub description: String,
    pub schema: OptionsSchema,
    pub(crate) candidates: Vec<LazyAdapter>,
}

impl ConverterDescriptor {
    /// Ordered fallback candidates, first preferred.
    pub fn candidates(&self) -> &[LazyAdapter] {
        &self.candidates
    }

    /// Check a request's size and file extension against this descriptor.
    pub fn validate_request(&self, file_name: &str, size: u64) -> Result<(), ConvertError> {
        if size > self.max_input_size {
            return Err(ConvertError::FileTooLarge {
                size,
                max: self.max_input_size,
                slug: self.slug.clone(),
            });
        }
        let expected = self.accepted_extensions.join(", ");
        let extension = file_name
            .rsplit_once('.')
            .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty());
        match extension {
            None => Err(ConvertError::MissingExtension {
                name: file_name.to_owned(),
                expected,
            }),
            Some((_, ext)) if !self.accepted_extensions.contains(&ext.as_str()) => {
                Err(ConvertError::UnsupportedExtension {
                    extension: ext,
                    expected,
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Parameter documentation served by the HTTP GET endpoint.
    pub fn schema_json(&self) -> Value {
        json!({
            "converter": self.slug,
            "inputFormat": self.from.as_str(),
            "outputFormat": self.to.as_str(),
            "description": self.description,
            "maxFileSize": self.max_input_size,
            "acceptedExtensions": self.accepted_extensions,
            "parameters": self.schema.specs(),
        })
    }
}

/// All registered converters.
#[derive(Debug)]
pub struct Registry {
    converters: Vec<ConverterDescriptor>,
}

impl Registry {
    /// The built-in converter table.
    pub fn builtin(config: RegistryConfig) -> Self {
        let mut converters = Vec::new();

        for from in [
            Format::Png,
            Format::Jpeg,
            Format::Gif,
            Format::Bmp,
            Format::Tiff,
            Format::Webp,
        ] {
            converters.push(ConverterDescriptor {
                slug: format!("{from}-to-svg"),
                from,
                to: Format::Svg,
                accepted_extensions: from.extensions(),
                max_input_size: config.max_raster_input_bytes,
                description: format!(
                    "Convert {} images to scalable SVG vector graphics",
                    from.as_str().to_uppercase()
                ),
                schema: OptionsSchema::RasterTrace,
                candidates: vec![LazyAdapter::new("trace", move || {
                    Ok(Arc::new(RasterTraceAdapter::new(from)) as Arc<dyn Adapter>)
                })],
            });
        }

        for to in [Format::Png, Format::Jpeg, Format::Bmp, Format::Tiff] {
            converters.push(ConverterDescriptor {
                slug: format!("svg-to-{to}"),
                from: Format::Svg,
                to,
                accepted_extensions: Format::Svg.extensions(),
                max_input_size: config.max_svg_input_bytes,
                description: format!(
                    "Render SVG documents as {} images",
                    to.as_str().to_uppercase()
                ),
                schema: OptionsSchema::RasterEncode,
                candidates: vec![LazyAdapter::new("resvg", move || {
                    Ok(Arc::new(SvgRasterAdapter::new(to)) as Arc<dyn Adapter>)
                })],
            });
        }

        let mut pdf_candidates = vec![LazyAdapter::new("pdfium", || {
            Ok(Arc::new(PdfiumAdapter::new()?) as Arc<dyn Adapter>)
        })];
        if let Some(endpoint) = config.remote_endpoint.clone() {
            let timeout = config.remote_timeout_secs;
            pdf_candidates.push(LazyAdapter::new("remote", move || {
                Ok(Arc::new(RemoteAdapter::new(endpoint.clone(), timeout)?) as Arc<dyn Adapter>)
            }));
        }
        converters.push(ConverterDescriptor {
            slug: "pdf-to-svg".into(),
            from: Format::Pdf,
            to: Format::Svg,
            accepted_extensions: Format::Pdf.extensions(),
            max_input_size: config.max_pdf_input_bytes,
            description: "Convert PDF pages to SVG documents".into(),
            schema: OptionsSchema::PdfRender,
            candidates: pdf_candidates,
        });

        Self { converters }
    }

    /// Build a registry from explicit descriptors. Test seam.
    pub fn from_descriptors(converters: Vec<ConverterDescriptor>) -> Self {
        Self { converters }
    }

    pub fn descriptors(&self) -> &[ConverterDescriptor] {
        &self.converters
    }

    /// Resolve a route slug of the form `{from}-to-{to}`. Extension
    /// aliases are accepted (`jpg-to-svg` resolves the JPEG converter).
    pub fn lookup_slug(&self, slug: &str) -> Result<&ConverterDescriptor, ConvertError> {
        let unknown = || ConvertError::UnknownConverter {
            slug: slug.to_owned(),
        };
        let (from, to) = slug.split_once("-to-").ok_or_else(unknown)?;
        let from: Format = from.parse().map_err(|_| unknown())?;
        let to: Format = to.parse().map_err(|_| unknown())?;
        self.lookup_pair(from, to).map_err(|_| unknown())
    }

    pub fn lookup_pair(&self, from: Format, to: Format) -> Result<&ConverterDescriptor, ConvertError> {
        self.converters
            .iter()
            .find(|c| c.from == from && c.to == to)
            .ok_or(ConvertError::UnsupportedPair { from, to })
    }

    /// Startup invariant: every descriptor is fully specified. Run once
    /// when the process comes up; a failure here is a programming error,
    /// not a user error.
    pub fn validate(&self) -> Result<(), ConvertError> {
        for c in &self.converters {
            if c.candidates.is_empty() {
                return Err(ConvertError::Internal(format!(
                    "converter {} has no adapter candidates",
                    c.slug
                )));
            }
            if c.max_input_size == 0 {
                return Err(ConvertError::Internal(format!(
                    "converter {} has a zero size limit",
                    c.slug
                )));
            }
            if c.accepted_extensions.is_empty() {
                return Err(ConvertError::Internal(format!(
                    "converter {} accepts no extensions",
                    c.slug
                )));
            }
            let dupes = self.converters.iter().filter(|o| o.slug == c.slug).count();
            if dupes != 1 {
                return Err(ConvertError::Internal(format!(
                    "converter slug {} registered {dupes} times",
                    c.slug
                )));
            }
        }
        Ok(())
    }
}
