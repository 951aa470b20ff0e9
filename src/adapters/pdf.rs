//! PDF → SVG adapter backed by pdfium.
//!
//! The selected page is rasterized at the requested scale and embedded in
//! an SVG wrapper as a base64 PNG `<image>` element, the same shape the
//! browser-side renderer produces, so both fallback candidates yield
//! interchangeable documents.
//!
//! pdfium is a native library; binding to it can fail outright on hosts
//! without the shared object. That failure is surfaced at adapter
//! construction as `AdapterUnavailable` so the fallback plan can move on
//! to the remote candidate without treating it as a broken input.

use crate::adapters::{resize_svg, Adapter, Converted, ProgressFn};
use crate::error::ConvertError;
use crate::format::Format;
use crate::options::ConversionOptions;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::{Cursor, Write as _};
use tracing::debug;

/// Renders one PDF page into an SVG-wrapped raster.
pub struct PdfiumAdapter;

impl PdfiumAdapter {
    /// Verify the pdfium library is loadable before accepting work.
    pub fn new() -> Result<Self, ConvertError> {
        bind()?;
        Ok(Self)
    }

    fn render(
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        progress(0.05);
        validate_pdf_magic(input)?;
        progress(0.1);

        let pdfium = Pdfium::new(bind()?);

        // pdfium reads from a file handle; stage the upload in a tempfile
        // that cleans itself up when the render finishes.
        let mut tmp = tempfile::NamedTempFile::new()
            .map_err(|e| ConvertError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(input)
            .map_err(|e| ConvertError::Internal(format!("tempfile write: {e}")))?;

        let document = pdfium
            .load_pdf_from_file(tmp.path(), None)
            .map_err(|e| ConvertError::ConversionFailed {
                message: format!("Failed to open PDF: {e}"),
            })?;
        progress(0.3);

        let index = page_index(options.page, document.pages().len())?;
        let page = document
            .pages()
            .get(index)
            .map_err(|e| ConvertError::ConversionFailed {
                message: format!("Failed to load page {}: {e}", options.page),
            })?;

        let width_px = (page.width().value * options.scale).round().max(1.0) as i32;
        let config = PdfRenderConfig::new().set_target_width(width_px);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ConvertError::ConversionFailed {
                message: format!("Failed to render page {}: {e}", options.page),
            })?;
        let img = bitmap.as_image().to_rgba8();
        let (w, h) = img.dimensions();
        debug!(page = options.page, w, h, "pdf page rasterized");
        progress(0.6);

        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png)
            .map_err(|e| ConvertError::ConversionFailed {
                message: format!("Failed to encode page raster: {e}"),
            })?;
        progress(0.8);

        let svg = resize_svg(&raster_page_svg(&png.into_inner(), w, h), options);
        progress(1.0);
        Ok(Converted {
            data: svg.into_bytes(),
            mime_type: Format::Svg.mime_type(),
        })
    }
}

fn bind() -> Result<Box<dyn PdfiumLibraryBindings>, ConvertError> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ConvertError::AdapterUnavailable {
            adapter: "pdfium",
            reason: format!("pdfium library could not be loaded: {e}"),
        })
}

/// Resolve a 1-based page number against the document's page count.
/// Page 0 is out of range, not an underflow.
fn page_index(page: usize, page_count: u16) -> Result<u16, ConvertError> {
    match page.checked_sub(1) {
        Some(index) if index < usize::from(page_count) => Ok(index as u16),
        _ => Err(ConvertError::ConversionFailed {
            message: format!(
                "Page {page} does not exist (document has {page_count} page{})",
                if page_count == 1 { "" } else { "s" }
            ),
        }),
    }
}

/// Reject inputs that are structurally not PDFs before touching pdfium.
fn validate_pdf_magic(input: &[u8]) -> Result<(), ConvertError> {
    if !input.starts_with(b"%PDF") {
        return Err(ConvertError::ConversionFailed {
            message: "The file does not appear to be a valid PDF document".into(),
        });
    }
    Ok(())
}

/// SVG wrapper around a rendered page raster.
fn raster_page_svg(png: &[u8], width: u32, height: u32) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><image width="{width}" height="{height}" href="data:image/png;base64,{}"/></svg>"#,
        BASE64.encode(png)
    )
}

#[async_trait]
impl Adapter for PdfiumAdapter {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn convert(
        &self,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        let input = input.to_vec();
        let options = options.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || Self::render(&input, &options, &progress))
            .await
            .map_err(|e| ConvertError::Internal(format!("pdf render task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_pdf_bytes_rejected_before_pdfium() {
        let err = validate_pdf_magic(b"PNG pretending").unwrap_err();
        assert!(matches!(err, ConvertError::ConversionFailed { .. }));
        assert!(err.to_string().contains("valid PDF"));
        assert!(validate_pdf_magic(b"%PDF-1.4\n").is_ok());
    }

    #[test]
    fn page_index_is_one_based_and_bounded() {
        assert_eq!(page_index(1, 3).ok(), Some(0));
        assert_eq!(page_index(3, 3).ok(), Some(2));

        // Page 0 maps to the out-of-range error, never an underflow.
        let err = page_index(0, 3).err().expect("page 0 rejected");
        assert!(err.to_string().contains("Page 0 does not exist"), "{err}");

        let err = page_index(4, 3).err().expect("page 4 rejected");
        assert!(err.to_string().contains("3 pages"), "{err}");

        let err = page_index(2, 1).err().expect("page 2 of 1 rejected");
        assert!(err.to_string().contains("1 page)"), "{err}");
    }

    #[test]
    fn page_svg_embeds_base64_raster() {
        let svg = raster_page_svg(&[1, 2, 3], 612, 792);
        assert!(svg.contains(r#"width="612""#));
        assert!(svg.contains(r#"height="792""#));
        assert!(svg.contains("data:image/png;base64,AQID"));
        assert!(svg.contains("<image "));
    }
}
