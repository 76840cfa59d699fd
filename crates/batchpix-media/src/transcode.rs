//! Image transcoding.
//!
//! Images are shrunk to fit inside a square bounding box, never enlarged,
//! and re-encoded in the configured format. The output depends only on the
//! input bytes and the configuration.

use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageEncoder};

use crate::error::{MediaError, MediaResult};

/// Default bounding box edge in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 800;

/// Default JPEG quality.
pub const DEFAULT_QUALITY: u8 = 80;

/// Compress and resize an image buffer.
///
/// Implementations are CPU bound and are called from a blocking thread.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &[u8]) -> MediaResult<Vec<u8>>;

    /// File extension of the produced output, without the dot.
    fn extension(&self) -> &str;
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(MediaError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Transcode settings.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Maximum width and height of the output
    pub max_dimension: u32,
    /// JPEG quality (1-100); ignored for PNG
    pub quality: u8,
    pub format: OutputFormat,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: DEFAULT_QUALITY,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Transcoder built on the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct ImageTranscoder {
    config: TranscodeConfig,
}

impl ImageTranscoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Shrink to fit the bounding box, preserving aspect ratio.
    fn fit(&self, img: DynamicImage) -> DynamicImage {
        let max = self.config.max_dimension.max(1);
        if img.width() <= max && img.height() <= max {
            return img;
        }
        img.resize(max, max, FilterType::Lanczos3)
    }

    fn encode(&self, img: &DynamicImage) -> MediaResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());

        match self.config.format {
            OutputFormat::Jpeg => {
                let rgb = img.to_rgb8();
                let quality = self.config.quality.clamp(1, 100);
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                encoder
                    .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                    .map_err(|e| MediaError::encode_failed(e.to_string()))?;
            }
            OutputFormat::Png => {
                let rgba = img.to_rgba8();
                PngEncoder::new(&mut buf)
                    .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
                    .map_err(|e| MediaError::encode_failed(e.to_string()))?;
            }
        }

        Ok(buf.into_inner())
    }
}

impl Transcoder for ImageTranscoder {
    fn transcode(&self, input: &[u8]) -> MediaResult<Vec<u8>> {
        let img =
            image::load_from_memory(input).map_err(|e| MediaError::decode_failed(e.to_string()))?;
        let img = self.fit(img);
        self.encode(&img)
    }

    fn extension(&self) -> &str {
        self.config.format.extension()
    }
}
