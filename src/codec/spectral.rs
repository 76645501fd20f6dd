//! Frequency-domain float codec (optional, `spectral` feature)
//!
//! Transforms each channel with an orthonormal DCT-II, quantizes the
//! coefficients uniformly and entropy-codes them with deflate. Like the
//! packed codec, the serialized buffer is self-describing; the receiver is
//! told this codec was used via the spectral flag bit in the acquisition
//! header.
//!
//! A tolerance finer than 32-bit quantization of the coefficient range can
//! honor switches to a verbatim mode that deflates the raw samples, which
//! round-trips exactly.

use std::io::{Read, Write};

use bytes::{Buf, BufMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::codec::CompressionMode;
use crate::error::{ClientError, Result};

const FORMAT_VERSION: u8 = 1;
const MODE_QUANTIZED: u8 = 0;
const MODE_VERBATIM: u8 = 1;

/// Compress interleaved floats, treating the data as `channels` rows of
/// `samples` floats and transforming along the sample dimension
pub fn compress(
    data: &[f32],
    samples: usize,
    channels: usize,
    mode: CompressionMode,
) -> Result<Vec<u8>> {
    if samples * channels != data.len() {
        return Err(ClientError::CodecConfig(format!(
            "spectral codec shape mismatch: {} floats for {}x{}",
            data.len(),
            samples,
            channels
        )));
    }

    let mut coefficients = Vec::with_capacity(data.len());
    for channel in data.chunks_exact(samples.max(1)) {
        coefficients.extend(dct_ii(channel));
    }

    let step = quantization_step(&coefficients, samples, mode)?;

    // A step this fine would saturate the i32 cast and corrupt the signal;
    // store the raw samples instead, which round-trips exactly.
    let max_c = coefficients.iter().fold(0.0f64, |a, c| a.max(c.abs()));
    if max_c / step as f64 >= i32::MAX as f64 {
        let mut raw = Vec::with_capacity(4 * data.len());
        for v in data {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        return serialize(MODE_VERBATIM, samples, channels, 1.0, &raw);
    }

    let mut quantized = Vec::with_capacity(4 * coefficients.len());
    for c in &coefficients {
        let q = (c / step as f64).round() as i32;
        quantized.extend_from_slice(&q.to_le_bytes());
    }
    serialize(MODE_QUANTIZED, samples, channels, step, &quantized)
}

fn serialize(mode: u8, samples: usize, channels: usize, step: f32, plain: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain)?;
    let deflated = encoder.finish()?;

    let mut buf = Vec::with_capacity(20 + deflated.len());
    buf.put_u8(FORMAT_VERSION);
    buf.put_u8(mode);
    buf.put_u16_le(0);
    buf.put_u32_le(samples as u32);
    buf.put_u32_le(channels as u32);
    buf.put_f32_le(step);
    buf.put_u32_le(deflated.len() as u32);
    buf.extend_from_slice(&deflated);
    Ok(buf)
}

/// Expand a serialized spectral buffer back into interleaved floats
pub fn decompress(mut buf: &[u8]) -> Result<Vec<f32>> {
    if buf.len() < 20 {
        return Err(ClientError::Decode(format!(
            "spectral buffer truncated: {} of 20 header bytes",
            buf.len()
        )));
    }
    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(ClientError::Decode(format!(
            "unsupported spectral buffer version {version}"
        )));
    }
    let mode = buf.get_u8();
    let _reserved16 = buf.get_u16_le();
    let samples = buf.get_u32_le() as usize;
    let channels = buf.get_u32_le() as usize;
    let step = buf.get_f32_le();
    let deflated_len = buf.get_u32_le() as usize;
    if buf.len() < deflated_len {
        return Err(ClientError::Decode(format!(
            "spectral buffer payload truncated: {} of {} bytes",
            buf.len(),
            deflated_len
        )));
    }

    let mut inflated = Vec::new();
    ZlibDecoder::new(&buf[..deflated_len]).read_to_end(&mut inflated)?;
    let expected = 4 * samples * channels;
    if inflated.len() != expected {
        return Err(ClientError::Decode(format!(
            "spectral buffer inflated to {} bytes, expected {expected}",
            inflated.len()
        )));
    }

    let mut cursor = &inflated[..];
    match mode {
        MODE_VERBATIM => {
            let mut out = Vec::with_capacity(samples * channels);
            for _ in 0..samples * channels {
                out.push(cursor.get_f32_le());
            }
            Ok(out)
        }
        MODE_QUANTIZED => {
            let mut coefficients = Vec::with_capacity(samples * channels);
            for _ in 0..samples * channels {
                coefficients.push(cursor.get_i32_le() as f64 * step as f64);
            }

            let mut out = Vec::with_capacity(samples * channels);
            for channel in coefficients.chunks_exact(samples.max(1)) {
                out.extend(dct_iii(channel));
            }
            Ok(out)
        }
        other => Err(ClientError::Decode(format!(
            "unknown spectral buffer mode {other}"
        ))),
    }
}

fn quantization_step(coefficients: &[f64], samples: usize, mode: CompressionMode) -> Result<f32> {
    let step = match mode {
        CompressionMode::Tolerance(tolerance) => {
            if !(tolerance > 0.0) {
                return Err(ClientError::CodecConfig(format!(
                    "spectral codec tolerance must be positive, got {tolerance}"
                )));
            }
            // Worst-case sample error from coefficient rounding is
            // step/2 * sqrt(2/N) * N; choose step so it stays within tolerance.
            let n = samples.max(1) as f32;
            2.0 * tolerance / (n * (2.0 / n).sqrt())
        }
        CompressionMode::Precision(bits) => {
            if !(1..=32).contains(&bits) {
                return Err(ClientError::CodecConfig(format!(
                    "spectral codec precision must be 1-32 bits, got {bits}"
                )));
            }
            let max_c = coefficients.iter().fold(0.0f64, |a, c| a.max(c.abs()));
            if max_c == 0.0 {
                1.0
            } else {
                let levels = ((1u64 << (bits.min(31) - 1)) - 1).max(1) as f64;
                (max_c / levels) as f32
            }
        }
    };
    if step <= 0.0 || !step.is_finite() {
        return Err(ClientError::CodecConfig(format!(
            "spectral codec derived an unusable quantization step {step}"
        )));
    }
    Ok(step)
}

/// Orthonormal DCT-II along one channel
fn dct_ii(x: &[f32]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n);
    let norm0 = (1.0 / n as f64).sqrt();
    let norm = (2.0 / n as f64).sqrt();
    for k in 0..n {
        let mut acc = 0.0f64;
        for (i, &v) in x.iter().enumerate() {
            acc += v as f64
                * (std::f64::consts::PI * (i as f64 + 0.5) * k as f64 / n as f64).cos();
        }
        out.push(acc * if k == 0 { norm0 } else { norm });
    }
    out
}

/// Orthonormal DCT-III (inverse of [`dct_ii`])
fn dct_iii(c: &[f64]) -> Vec<f32> {
    let n = c.len();
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n);
    let norm0 = (1.0 / n as f64).sqrt();
    let norm = (2.0 / n as f64).sqrt();
    for i in 0..n {
        let mut acc = c[0] * norm0;
        for (k, &v) in c.iter().enumerate().skip(1) {
            acc += v
                * norm
                * (std::f64::consts::PI * (i as f64 + 0.5) * k as f64 / n as f64).cos();
        }
        out.push(acc as f32);
    }
    out
}
