//! SVG → raster adapter: parse with `usvg`, render with `resvg`, encode
//! with `image`.
//!
//! The pixmap comes back premultiplied; it is demultiplied before
//! encoding. Targets without an alpha channel (JPEG, BMP) are composited
//! over the background color option, white by default.

use crate::adapters::raster::image_format;
use crate::adapters::{target_dimensions, Adapter, Converted, ProgressFn};
use crate::error::ConvertError;
use crate::format::Format;
use crate::options::{parse_hex_color, ConversionOptions};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use std::io::Cursor;

/// Renders SVG documents into one raster format.
pub struct SvgRasterAdapter {
    to: Format,
}

impl SvgRasterAdapter {
    pub fn new(to: Format) -> Self {
        Self { to }
    }

    fn render(
        to: Format,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        progress(0.05);

        let tree = usvg::Tree::from_data(input, &usvg::Options::default()).map_err(|e| {
            ConvertError::ConversionFailed {
                message: format!("Failed to parse SVG: {e}"),
            }
        })?;
        progress(0.2);

        let size = tree.size();
        let (target_w, target_h) = target_dimensions(
            f64::from(size.width()),
            f64::from(size.height()),
            options.width.map(f64::from),
            options.height.map(f64::from),
            options.preserve_aspect_ratio,
        );
        let width = target_w.round().max(1.0) as u32;
        let height = target_h.round().max(1.0) as u32;

        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            ConvertError::ConversionFailed {
                message: "SVG has no renderable size".into(),
            }
        })?;
        let transform = Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        progress(0.6);

        let mut rgba = RgbaImage::new(width, height);
        for (px, out) in pixmap.pixels().iter().zip(rgba.pixels_mut()) {
            let c = px.demultiply();
            out.0 = [c.red(), c.green(), c.blue(), c.alpha()];
        }
        progress(0.8);

        let data = encode(&rgba, to, options)?;
        progress(1.0);
        Ok(Converted {
            data,
            mime_type: to.mime_type(),
        })
    }
}

fn encode(
    rgba: &RgbaImage,
    to: Format,
    options: &ConversionOptions,
) -> Result<Vec<u8>, ConvertError> {
    let background = options
        .background
        .as_deref()
        .and_then(parse_hex_color)
        .unwrap_or([255, 255, 255]);
    let encode_err = |e: image::ImageError| ConvertError::ConversionFailed {
        message: format!("Failed to encode {} output: {e}", to.as_str().to_uppercase()),
    };

    let mut out = Cursor::new(Vec::new());
    match to {
        Format::Jpeg => {
            let flat = flatten(rgba, background);
            let encoder = JpegEncoder::new_with_quality(&mut out, options.quality);
            flat.write_with_encoder(encoder).map_err(encode_err)?;
        }
        Format::Bmp => {
            let flat = flatten(rgba, background);
            flat.write_to(&mut out, ImageFormat::Bmp).map_err(encode_err)?;
        }
        Format::Png | Format::Tiff => {
            let format = image_format(to)
                .ok_or_else(|| ConvertError::Internal(format!("{to} has no raster encoder")))?;
            if options.background.is_some() {
                flatten(rgba, background)
                    .write_to(&mut out, format)
                    .map_err(encode_err)?;
            } else {
                rgba.write_to(&mut out, format).map_err(encode_err)?;
            }
        }
        other => {
            return Err(ConvertError::Internal(format!(
                "{other} is not a raster encode target"
            )));
        }
    }
    Ok(out.into_inner())
}

/// Composite over an opaque background, dropping the alpha channel.
fn flatten(rgba: &RgbaImage, bg: [u8; 3]) -> RgbImage {
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let [r, g, b, a] = src.0;
        let a = f32::from(a) / 255.0;
        dst.0 = [
            (f32::from(r) * a + f32::from(bg[0]) * (1.0 - a)).round() as u8,
            (f32::from(g) * a + f32::from(bg[1]) * (1.0 - a)).round() as u8,
            (f32::from(b) * a + f32::from(bg[2]) * (1.0 - a)).round() as u8,
        ];
    }
    out
}

#[async_trait]
impl Adapter for SvgRasterAdapter {
    fn name(&self) -> &'static str {
        "resvg"
    }

    async fn convert(
        &self,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        let to = self.to;
        let input = input.to_vec();
        let options = options.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || Self::render(to, &input, &options, &progress))
            .await
            .map_err(|e| ConvertError::Internal(format!("render task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::null_progress;
    use image::Rgba;

    const RED_SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="20" viewBox="0 0 20 20"><rect width="20" height="20" fill="#ff0000"/></svg>"##;

    #[tokio::test]
    async fn renders_svg_to_png() {
        let adapter = SvgRasterAdapter::new(Format::Png);
        let out = adapter
            .convert(
                RED_SQUARE.as_bytes(),
                &ConversionOptions::default(),
                &null_progress(),
            )
            .await
            .expect("convert");
        assert_eq!(out.mime_type, "image/png");
        let img = image::load_from_memory(&out.data).expect("decode").to_rgba8();
        assert_eq!(img.dimensions(), (20, 20));
        assert_eq!(*img.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn width_option_scales_output() {
        let adapter = SvgRasterAdapter::new(Format::Png);
        let options = ConversionOptions {
            width: Some(40),
            ..Default::default()
        };
        let out = adapter
            .convert(RED_SQUARE.as_bytes(), &options, &null_progress())
            .await
            .expect("convert");
        let img = image::load_from_memory(&out.data).expect("decode");
        assert_eq!((img.width(), img.height()), (40, 40));
    }

    #[tokio::test]
    async fn jpeg_output_is_opaque() {
        let transparent = r##"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"><rect x="0" y="0" width="4" height="8" fill="#000000"/></svg>"##;
        let adapter = SvgRasterAdapter::new(Format::Jpeg);
        let out = adapter
            .convert(
                transparent.as_bytes(),
                &ConversionOptions::default(),
                &null_progress(),
            )
            .await
            .expect("convert");
        assert_eq!(out.mime_type, "image/jpeg");
        let img = image::load_from_memory(&out.data).expect("decode").to_rgba8();
        // Uncovered half composited over the default white background.
        let px = img.get_pixel(6, 4).0;
        assert!(px[0] > 200 && px[1] > 200 && px[2] > 200, "{px:?}");
    }

    #[tokio::test]
    async fn background_option_composites_png() {
        let transparent = r#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"></svg>"#;
        let adapter = SvgRasterAdapter::new(Format::Png);
        let options = ConversionOptions {
            background: Some("#00ff00".into()),
            ..Default::default()
        };
        let out = adapter
            .convert(transparent.as_bytes(), &options, &null_progress())
            .await
            .expect("convert");
        let img = image::load_from_memory(&out.data).expect("decode").to_rgba8();
        assert_eq!(img.get_pixel(1, 1).0[..3], [0, 255, 0]);
    }

    #[tokio::test]
    async fn invalid_svg_is_conversion_failure() {
        let adapter = SvgRasterAdapter::new(Format::Png);
        let err = adapter
            .convert(b"<svg", &ConversionOptions::default(), &null_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ConversionFailed { .. }));
        assert!(err.to_string().contains("Failed to parse SVG"));
    }

    #[test]
    fn flatten_blends_alpha() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 128]));
        let flat = flatten(&img, [255, 255, 255]);
        let px = flat.get_pixel(0, 0).0;
        assert_eq!(px[0], 255);
        assert!(px[1] > 120 && px[1] < 135, "{px:?}");
    }
}
