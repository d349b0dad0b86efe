//! Raster image processing
//!
//! Decoding, resampling and encoding use the `image` crate; every operation
//! takes encoded bytes and returns a [`ProcessedImage`].

mod ops;

pub use ops::{compress, convert, resize, upscale, CompressOptions, ResizeOptions};

use crate::error::{Error, Result};
use image::ImageFormat;

/// Largest accepted resize dimension
pub const MAX_DIMENSION: u32 = 10_000;

/// Encodable output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    WebP,
    Jpeg,
    Png,
    Gif,
    Tiff,
}

impl OutputFormat {
    /// Formats accepted by the compress action
    pub const COMPRESSIBLE: &'static [&'static str] = &["webp", "jpeg", "jpg", "png"];
    /// Formats accepted by the convert action
    pub const CONVERTIBLE: &'static [&'static str] = &["webp", "jpeg", "jpg", "png", "gif", "tiff"];

    /// Parse a format name against an allow-list
    pub fn parse(name: &str, allowed: &[&str]) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        if !allowed.contains(&lower.as_str()) {
            return Err(Error::validation(format!(
                "Invalid format '{}'. Use: {}",
                name,
                allowed.join(", ")
            )));
        }
        match lower.as_str() {
            "webp" => Ok(Self::WebP),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "tiff" => Ok(Self::Tiff),
            _ => Err(Error::validation(format!("Unsupported format '{}'", name))),
        }
    }

    /// Output format matching a decoded source format, if it can be encoded
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            other => other.name(),
        }
    }

    pub fn content_type(self) -> &'static str {
        crate::storage::content_type_for(self.extension())
    }
}

/// How `width` × `height` is reached when both are given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Fill the box, cropping the overflow
    #[default]
    Cover,
    /// Fit inside the box and pad to its exact size
    Contain,
    /// Stretch to the box ignoring aspect ratio
    Fill,
    /// Fit inside the box
    Inside,
    /// Cover the box without cropping
    Outside,
}

impl FitMode {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fill" => Ok(Self::Fill),
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            _ => Err(Error::validation(format!(
                "Invalid fit '{}'. Use: cover, contain, fill, inside, outside",
                name
            ))),
        }
    }
}

/// Encoded output of an image operation
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}
