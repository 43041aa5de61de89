#![warn(missing_docs)]
//! # staring-encoder
//!
//! ## Purpose
//! Turns sampled camera rasters into compact JPEG frames.
//!
//! ## Responsibilities
//! - Apply the fixed mirroring convention before encoding.
//! - Encode at a fixed lossy quality to bound link bandwidth.
//! - Stamp frames with their capture instant and sequence.
//!
//! ## Data flow
//! [`staring_core::Raster`] -> [`FrameEncoder::encode`] ->
//! [`staring_core::Frame`] copied into the replay buffer and sent on the link.
//!
//! ## Mirroring convention
//! When `mirrored` is `true` the raster is flipped horizontally (column `x`
//! becomes column `width - 1 - x`) so the transmitted frame matches the
//! selfie view the player sees. Rows are never flipped.
//!
//! ## Error model
//! Invalid quality settings and codec failures return [`EncodeError`].

use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use staring_core::{Frame, Raster};
use thiserror::Error;

/// Default JPEG quality (a 0.6 quality factor).
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

/// Encoder settings; constants for the lifetime of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// JPEG quality in `1..=100`.
    pub quality: u8,
    /// Whether frames are mirrored before encoding.
    pub mirror: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            mirror: true,
        }
    }
}

/// Stateless raster-to-frame encoder.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    config: EncoderConfig,
}

impl FrameEncoder {
    /// Creates a validated encoder.
    ///
    /// # Errors
    /// Returns [`EncodeError::InvalidQuality`] outside `1..=100`.
    pub fn new(config: EncoderConfig) -> Result<Self, EncodeError> {
        if !(1..=100).contains(&config.quality) {
            return Err(EncodeError::InvalidQuality(config.quality));
        }
        Ok(Self { config })
    }

    /// Returns encoder settings.
    pub fn config(&self) -> EncoderConfig {
        self.config
    }

    /// Encodes with the configured mirroring convention.
    ///
    /// # Errors
    /// See [`FrameEncoder::encode`].
    pub fn encode_frame(
        &self,
        raster: &Raster,
        captured_at: Instant,
        sequence: u64,
    ) -> Result<Frame, EncodeError> {
        self.encode(raster, self.config.mirror, captured_at, sequence)
    }

    /// Encodes one raster, flipping it horizontally first when `mirrored`.
    ///
    /// # Errors
    /// Returns [`EncodeError::Codec`] when the JPEG encoder fails.
    pub fn encode(
        &self,
        raster: &Raster,
        mirrored: bool,
        captured_at: Instant,
        sequence: u64,
    ) -> Result<Frame, EncodeError> {
        let mut payload = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut payload, self.config.quality);

        let encoded = if mirrored {
            let flipped = mirror_horizontally(raster)?;
            encoder.encode(
                flipped.as_raw(),
                raster.width,
                raster.height,
                ExtendedColorType::Rgb8,
            )
        } else {
            encoder.encode(
                &raster.rgb,
                raster.width,
                raster.height,
                ExtendedColorType::Rgb8,
            )
        };
        encoded.map_err(|error| EncodeError::Codec(error.to_string()))?;

        Ok(Frame::new(payload, captured_at, sequence))
    }
}

/// Returns a left-right flipped copy of `raster`.
///
/// # Errors
/// Returns [`EncodeError::Codec`] when the raster buffer does not match its
/// declared geometry.
pub fn mirror_horizontally(raster: &Raster) -> Result<RgbImage, EncodeError> {
    let image = RgbImage::from_raw(raster.width, raster.height, raster.rgb.clone())
        .ok_or_else(|| EncodeError::Codec("raster buffer does not match geometry".to_string()))?;
    Ok(image::imageops::flip_horizontal(&image))
}

/// Encoder error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// JPEG quality must be in `1..=100`.
    #[error("invalid jpeg quality {0}; expected 1..=100")]
    InvalidQuality(u8),
    /// Underlying codec failure.
    #[error("jpeg encoding failed: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for mirroring and JPEG output.

    use super::*;

    fn two_column_raster() -> Raster {
        // Left column red, right column blue.
        Raster::new(2, 1, vec![255, 0, 0, 0, 0, 255]).expect("raster should be valid")
    }

    #[test]
    fn mirroring_swaps_left_and_right_columns() {
        let flipped = mirror_horizontally(&two_column_raster()).expect("flip should work");
        assert_eq!(flipped.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(flipped.get_pixel(1, 0).0, [255, 0, 0]);
    }

    #[test]
    fn encoded_frames_are_jpeg() {
        let encoder = FrameEncoder::new(EncoderConfig::default()).expect("encoder should build");
        let raster = Raster::new(16, 8, vec![128; 16 * 8 * 3]).expect("raster should be valid");
        let frame = encoder
            .encode_frame(&raster, Instant::now(), 7)
            .expect("encoding should succeed");

        assert_eq!(&frame.payload()[..2], &[0xFF, 0xD8]);
        assert_eq!(frame.sequence(), 7);
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let config = EncoderConfig {
            quality: 0,
            mirror: false,
        };
        assert_eq!(
            FrameEncoder::new(config).err(),
            Some(EncodeError::InvalidQuality(0))
        );
    }
}
