//! Compression codecs for outgoing acquisition payloads
//!
//! Two independent codecs, selected by caller configuration and never
//! auto-detected: the always-available packed codec (quantizing bit-packer)
//! and the optional spectral codec (transform + deflate), compiled in only
//! with the `spectral` feature. Both produce self-contained serialized
//! buffers decompressible from their own bytes alone; the receiver learns
//! which family produced a buffer from a flag in the acquisition header.

pub mod packed;

#[cfg(feature = "spectral")]
pub mod spectral;

use crate::error::{ClientError, Result};
use crate::protocol::acquisition::{FLAG_COMPRESSION_PACKED, FLAG_COMPRESSION_SPECTRAL};

pub use packed::CompressedFloatBuffer;

/// Codec family applied to outgoing sample data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    /// Quantizing bit-packing codec, always available
    Packed,
    /// Frequency-domain codec, present only with the `spectral` feature
    Spectral,
}

impl CompressionCodec {
    /// Acquisition header flag bit announcing this codec to the receiver
    pub fn header_flag(self) -> u32 {
        match self {
            CompressionCodec::Packed => FLAG_COMPRESSION_PACKED,
            CompressionCodec::Spectral => FLAG_COMPRESSION_SPECTRAL,
        }
    }
}

/// Quantization target: exactly one of precision or tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressionMode {
    /// Target numeric precision in bits (1-32; 32 round-trips exactly)
    Precision(u32),
    /// Maximum absolute reconstruction error
    Tolerance(f32),
}

/// Validated compression selection for a client run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    pub mode: CompressionMode,
}

impl CompressionConfig {
    /// Build a configuration from raw CLI-style inputs
    ///
    /// Returns `Ok(None)` when neither precision nor tolerance is requested
    /// (uncompressed transmission). Requesting both simultaneously is a
    /// configuration error, rejected before any data is sent.
    pub fn from_options(
        precision: u32,
        tolerance: f32,
        codec: CompressionCodec,
    ) -> Result<Option<Self>> {
        if precision > 0 && tolerance > 0.0 {
            return Err(ClientError::CodecConfig(
                "compression precision and tolerance cannot both be set".into(),
            ));
        }
        if precision > 0 {
            if precision > 32 {
                return Err(ClientError::CodecConfig(format!(
                    "compression precision {precision} exceeds 32 bits"
                )));
            }
            Ok(Some(CompressionConfig {
                codec,
                mode: CompressionMode::Precision(precision),
            }))
        } else if tolerance > 0.0 {
            Ok(Some(CompressionConfig {
                codec,
                mode: CompressionMode::Tolerance(tolerance),
            }))
        } else {
            Ok(None)
        }
    }
}

/// Compress interleaved float pairs with the selected codec
///
/// `samples` is the number of floats per channel (twice the complex sample
/// count), `channels` the channel count; `samples * channels` must equal
/// `data.len()`. The returned buffer is the serialized, self-describing
/// form written to the wire behind a u32 length prefix.
pub fn compress(
    codec: CompressionCodec,
    data: &[f32],
    samples: usize,
    channels: usize,
    mode: CompressionMode,
) -> Result<Vec<u8>> {
    debug_assert_eq!(data.len(), samples * channels);
    match codec {
        CompressionCodec::Packed => {
            let buffer = match mode {
                CompressionMode::Precision(bits) => packed::compress_precision(data, bits)?,
                CompressionMode::Tolerance(tol) => packed::compress_tolerance(data, tol)?,
            };
            Ok(buffer.serialize())
        }
        CompressionCodec::Spectral => compress_spectral(data, samples, channels, mode),
    }
}

#[cfg(feature = "spectral")]
fn compress_spectral(
    data: &[f32],
    samples: usize,
    channels: usize,
    mode: CompressionMode,
) -> Result<Vec<u8>> {
    spectral::compress(data, samples, channels, mode)
}

#[cfg(not(feature = "spectral"))]
fn compress_spectral(
    _data: &[f32],
    _samples: usize,
    _channels: usize,
    _mode: CompressionMode,
) -> Result<Vec<u8>> {
    Err(ClientError::CodecUnavailable(
        "spectral codec not compiled in; rebuild with the `spectral` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_precision_and_tolerance_rejected() {
        let result = CompressionConfig::from_options(12, 0.01, CompressionCodec::Packed);
        assert!(matches!(result, Err(ClientError::CodecConfig(_))));
    }

    #[test]
    fn neither_yields_uncompressed() {
        let config = CompressionConfig::from_options(0, 0.0, CompressionCodec::Packed).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn precision_selected() {
        let config = CompressionConfig::from_options(16, 0.0, CompressionCodec::Packed)
            .unwrap()
            .unwrap();
        assert_eq!(config.mode, CompressionMode::Precision(16));
    }

    #[test]
    fn oversized_precision_rejected() {
        let result = CompressionConfig::from_options(33, 0.0, CompressionCodec::Packed);
        assert!(matches!(result, Err(ClientError::CodecConfig(_))));
    }

    #[test]
    fn codec_flags_differ() {
        assert_ne!(
            CompressionCodec::Packed.header_flag(),
            CompressionCodec::Spectral.header_flag()
        );
    }
}
