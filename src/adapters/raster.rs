//! Raster → SVG adapter: decode, threshold or quantize, trace, assemble.
//!
//! Decoding and tracing are CPU-bound and run under `spawn_blocking`; the
//! async fn awaits the handle and normalizes a panicked task into an
//! internal error instead of propagating the panic.

use crate::adapters::trace::{
    bitmap_path_data, color_layers, hex_color, svg_document, threshold_bitmap, TraceLayer,
};
use crate::adapters::{resize_svg, Adapter, Converted, ProgressFn};
use crate::error::ConvertError;
use crate::format::Format;
use crate::options::ConversionOptions;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

/// Inputs above this pixel count are downscaled before tracing.
const MAX_PIXELS: u64 = 16_000_000;

pub(crate) fn image_format(f: Format) -> Option<ImageFormat> {
    match f {
        Format::Png => Some(ImageFormat::Png),
        Format::Jpeg => Some(ImageFormat::Jpeg),
        Format::Gif => Some(ImageFormat::Gif),
        Format::Bmp => Some(ImageFormat::Bmp),
        Format::Tiff => Some(ImageFormat::Tiff),
        Format::Webp => Some(ImageFormat::WebP),
        Format::Svg | Format::Pdf => None,
    }
}

/// Traces one raster format into SVG path data.
pub struct RasterTraceAdapter {
    from: Format,
}

impl RasterTraceAdapter {
    pub fn new(from: Format) -> Self {
        Self { from }
    }

    fn trace(
        from: Format,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        progress(0.05);

        // The extension was validated upstream; the content still has to
        // match the converter the caller picked.
        match Format::sniff(input) {
            Some(actual) if actual != from => {
                return Err(ConvertError::ConversionFailed {
                    message: format!(
                        "The file does not appear to be a valid {} image (content looks like {})",
                        from.as_str().to_uppercase(),
                        actual.as_str().to_uppercase()
                    ),
                });
            }
            _ => {}
        }
        progress(0.2);

        let format = image_format(from).ok_or_else(|| ConvertError::Internal(format!(
            "{from} is not a raster decode format"
        )))?;
        let decoded = image::load_from_memory_with_format(input, format).map_err(|e| {
            ConvertError::ConversionFailed {
                message: format!(
                    "Failed to decode {} image: {e}",
                    from.as_str().to_uppercase()
                ),
            }
        })?;
        let img = clamp_pixels(decoded).to_rgba8();
        let (width, height) = img.dimensions();
        progress(0.4);

        let layers: Vec<TraceLayer> = if options.color_mode {
            let color_maps = color_layers(&img, options.color_levels);
            let total = color_maps.len().max(1);
            let mut layers = Vec::with_capacity(color_maps.len());
            for (i, (color, bitmap)) in color_maps.into_iter().enumerate() {
                if let Some(d) =
                    bitmap_path_data(&bitmap, options.turn_policy, options.optimization)
                {
                    layers.push(TraceLayer {
                        fill: hex_color(color),
                        d,
                    });
                }
                progress(0.4 + 0.5 * (i + 1) as f64 / total as f64);
            }
            layers
        } else {
            let bitmap = threshold_bitmap(&img, options.threshold);
            progress(0.6);
            let layers = bitmap_path_data(&bitmap, options.turn_policy, options.optimization)
                .map(|d| TraceLayer {
                    fill: "#000000".into(),
                    d,
                })
                .into_iter()
                .collect();
            progress(0.9);
            layers
        };
        debug!(width, height, layers = layers.len(), "trace finished");

        let svg = resize_svg(&svg_document(width, height, &layers), options);
        progress(1.0);
        Ok(Converted {
            data: svg.into_bytes(),
            mime_type: Format::Svg.mime_type(),
        })
    }
}

/// Downscale images above [`MAX_PIXELS`], preserving aspect ratio.
fn clamp_pixels(img: DynamicImage) -> DynamicImage {
    let pixels = u64::from(img.width()) * u64::from(img.height());
    if pixels <= MAX_PIXELS {
        return img;
    }
    let scale = (MAX_PIXELS as f64 / pixels as f64).sqrt();
    let w = ((f64::from(img.width()) * scale) as u32).max(1);
    let h = ((f64::from(img.height()) * scale) as u32).max(1);
    debug!(
        from_w = img.width(),
        from_h = img.height(),
        to_w = w,
        to_h = h,
        "downscaling oversized input before trace"
    );
    img.resize(w, h, FilterType::Triangle)
}

#[async_trait]
impl Adapter for RasterTraceAdapter {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn convert(
        &self,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        let from = self.from;
        let input = input.to_vec();
        let options = options.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || Self::trace(from, &input, &options, &progress))
            .await
            .map_err(|e| ConvertError::Internal(format!("trace task failed: {e}")))?
    }
}
