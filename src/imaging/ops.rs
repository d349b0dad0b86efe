//! Image operations: compress, resize, convert, upscale

use super::{FitMode, OutputFormat, ProcessedImage, MAX_DIMENSION};
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Upper bound on upscale output
const MAX_UPSCALE_PIXELS: u64 = 100_000_000;

/// Settings for [`compress`]
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// 1-100
    pub quality: u8,
    pub format: OutputFormat,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: 80,
            format: OutputFormat::WebP,
            max_width: None,
            max_height: None,
        }
    }
}

/// Settings for [`resize`]
#[derive(Debug, Clone, Default)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
}

impl ResizeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.width.is_none() && self.height.is_none() {
            return Err(Error::validation("Width or height is required"));
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if let Some(v) = value {
                if !(1..=MAX_DIMENSION).contains(&v) {
                    return Err(Error::validation(format!(
                        "{} must be between 1 and {}",
                        name, MAX_DIMENSION
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_quality(quality: u8) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(Error::validation("quality must be between 1 and 100"));
    }
    Ok(())
}

fn decode(data: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let format = image::guess_format(data).ok();
    let img = image::load_from_memory(data).map_err(|e| Error::InvalidImage {
        reason: e.to_string(),
    })?;
    Ok((img, format))
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        // The bundled WebP encoder is lossless only
        OutputFormat::WebP => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            to_8bit(img).write_with_encoder(encoder)?;
        }
        OutputFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)?;
        }
        OutputFormat::Tiff => {
            to_8bit(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Tiff)?;
        }
    }
    Ok(buf)
}

fn to_8bit(img: &DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

fn finish(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<ProcessedImage> {
    let data = encode(img, format, quality)?;
    let (width, height) = img.dimensions();
    Ok(ProcessedImage {
        data,
        format,
        width,
        height,
    })
}

fn scaled(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}

/// Re-encode, optionally shrinking to fit `max_width` × `max_height`.
///
/// Keeps the source bytes, in their own format, when re-encoding at full
/// size would not make the file any smaller.
pub fn compress(data: &[u8], options: &CompressOptions) -> Result<ProcessedImage> {
    check_quality(options.quality)?;
    let (mut img, source_format) = decode(data)?;
    let (w, h) = img.dimensions();

    let factor = [
        options.max_width.map(|m| m as f64 / w as f64),
        options.max_height.map(|m| m as f64 / h as f64),
    ]
    .into_iter()
    .flatten()
    .fold(1.0f64, f64::min);
    if factor < 1.0 {
        img = img.resize_exact(scaled(w, factor), scaled(h, factor), FilterType::Lanczos3);
    }

    let output = finish(&img, options.format, options.quality)?;

    // Never hand back something bigger than what came in
    let source = source_format.and_then(OutputFormat::from_image_format);
    if let Some(source) = source.filter(|_| factor >= 1.0 && output.data.len() >= data.len()) {
        tracing::debug!(
            original = data.len(),
            encoded = output.data.len(),
            requested = options.format.name(),
            kept = source.name(),
            "re-encoded image not smaller, keeping source"
        );
        return Ok(ProcessedImage {
            data: data.to_vec(),
            format: source,
            width: w,
            height: h,
        });
    }

    Ok(output)
}

/// Resize to the requested box; the output keeps the source format
pub fn resize(data: &[u8], options: &ResizeOptions) -> Result<ProcessedImage> {
    options.validate()?;
    let (img, source_format) = decode(data)?;
    let (w, h) = img.dimensions();

    let resized = match (options.width, options.height) {
        (Some(tw), Some(th)) => fit_box(&img, tw, th, options.fit),
        (Some(tw), None) => img.resize_exact(tw, scaled(h, tw as f64 / w as f64), FilterType::Lanczos3),
        (None, Some(th)) => img.resize_exact(scaled(w, th as f64 / h as f64), th, FilterType::Lanczos3),
        (None, None) => return Err(Error::validation("Width or height is required")),
    };

    let format = source_format
        .and_then(OutputFormat::from_image_format)
        .unwrap_or(OutputFormat::Png);
    finish(&resized, format, 90)
}

fn fit_box(img: &DynamicImage, tw: u32, th: u32, fit: FitMode) -> DynamicImage {
    let (w, h) = img.dimensions();
    let (rx, ry) = (tw as f64 / w as f64, th as f64 / h as f64);

    match fit {
        FitMode::Cover => img.resize_to_fill(tw, th, FilterType::Lanczos3),
        FitMode::Fill => img.resize_exact(tw, th, FilterType::Lanczos3),
        FitMode::Inside => {
            let f = rx.min(ry);
            img.resize_exact(scaled(w, f), scaled(h, f), FilterType::Lanczos3)
        }
        FitMode::Outside => {
            let f = rx.max(ry);
            img.resize_exact(scaled(w, f), scaled(h, f), FilterType::Lanczos3)
        }
        FitMode::Contain => {
            let f = rx.min(ry);
            let inner = img
                .resize_exact(scaled(w, f).min(tw), scaled(h, f).min(th), FilterType::Lanczos3)
                .to_rgba8();
            let mut canvas = RgbaImage::new(tw, th);
            let x = (tw - inner.width()) / 2;
            let y = (th - inner.height()) / 2;
            imageops::overlay(&mut canvas, &inner, x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

/// Re-encode into another format
pub fn convert(data: &[u8], format: OutputFormat, quality: u8) -> Result<ProcessedImage> {
    check_quality(quality)?;
    let (img, _) = decode(data)?;
    finish(&img, format, quality)
}

/// Enlarge by 2× or 4× with Lanczos3 and a light unsharp mask; PNG output
pub fn upscale(data: &[u8], scale: u32) -> Result<ProcessedImage> {
    if !matches!(scale, 2 | 4) {
        return Err(Error::validation("Scale must be 2 or 4"));
    }
    let (img, _) = decode(data)?;
    let (w, h) = img.dimensions();
    let (nw, nh) = (w * scale, h * scale);
    if nw as u64 * nh as u64 > MAX_UPSCALE_PIXELS {
        return Err(Error::validation(format!(
            "Upscaled image would be {}x{}, which is too large",
            nw, nh
        )));
    }

    let upscaled = img
        .resize_exact(nw, nh, FilterType::Lanczos3)
        .unsharpen(0.5, 0);
    finish(&upscaled, OutputFormat::Png, 100)
}
