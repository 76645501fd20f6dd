//! Quantizing bit-packing float codec
//!
//! Compresses a flat sequence of interleaved real/imaginary floats by
//! uniform quantization against the buffer's own dynamic range, packing the
//! signed quantized values at an arbitrary bit width. The serialized buffer
//! is self-describing: element count, bit width and scale are embedded, so
//! decompression needs no external parameters.
//!
//! A requested precision of 32 bits (or a tolerance finer than 31 bits can
//! honor) stores the floats verbatim and round-trips exactly.

use crate::error::{ClientError, Result};
use bytes::{Buf, BufMut};

const FORMAT_VERSION: u8 = 1;
const MODE_PACKED: u8 = 0;
const MODE_VERBATIM: u8 = 1;

/// A compressed, self-describing float buffer
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedFloatBuffer {
    mode: u8,
    bits: u8,
    count: u32,
    scale: f32,
    payload: Vec<u8>,
}

/// Compress at an explicit bit precision (1-32)
pub fn compress_precision(data: &[f32], precision: u32) -> Result<CompressedFloatBuffer> {
    if !(1..=32).contains(&precision) {
        return Err(ClientError::CodecConfig(format!(
            "packed codec precision must be 1-32 bits, got {precision}"
        )));
    }
    if precision == 32 {
        return Ok(verbatim(data));
    }

    // Two bits is the packing floor: one sign bit plus one magnitude bit.
    let bits = precision.max(2);
    let max_abs = max_abs(data);
    if max_abs == 0.0 {
        return Ok(pack(data, bits, 1.0));
    }
    let scale = ((1u64 << (bits - 1)) - 1) as f32 / max_abs;
    Ok(pack(data, bits, scale))
}

/// Compress to a maximum absolute reconstruction error
pub fn compress_tolerance(data: &[f32], tolerance: f32) -> Result<CompressedFloatBuffer> {
    if !(tolerance > 0.0) {
        return Err(ClientError::CodecConfig(format!(
            "packed codec tolerance must be positive, got {tolerance}"
        )));
    }

    // Quantization step 2*tolerance bounds the rounding error by tolerance.
    let scale = 1.0 / (2.0 * tolerance);
    let max_abs = max_abs(data);
    let max_q = (max_abs * scale).round() as u64;
    let bits = 64 - max_q.leading_zeros() + 1; // magnitude + sign
    if bits > 31 {
        // The requested tolerance is below what 31-bit quantization of this
        // range can honor; store verbatim instead of violating the bound.
        return Ok(verbatim(data));
    }
    Ok(pack(data, bits.max(2), scale))
}

fn max_abs(data: &[f32]) -> f32 {
    data.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
}

fn verbatim(data: &[f32]) -> CompressedFloatBuffer {
    let mut payload = Vec::with_capacity(4 * data.len());
    for v in data {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    CompressedFloatBuffer {
        mode: MODE_VERBATIM,
        bits: 32,
        count: data.len() as u32,
        scale: 1.0,
        payload,
    }
}

fn pack(data: &[f32], bits: u32, scale: f32) -> CompressedFloatBuffer {
    debug_assert!((2..=31).contains(&bits) || data.is_empty());
    let mask = (1u64 << bits) - 1;
    let mut payload = Vec::with_capacity((data.len() * bits as usize).div_ceil(8));
    let mut accum: u64 = 0;
    let mut filled: u32 = 0;

    for &v in data {
        let q = (v * scale).round() as i64;
        accum |= ((q as u64) & mask) << filled;
        filled += bits;
        while filled >= 8 {
            payload.push((accum & 0xFF) as u8);
            accum >>= 8;
            filled -= 8;
        }
    }
    if filled > 0 {
        payload.push((accum & 0xFF) as u8);
    }

    CompressedFloatBuffer {
        mode: MODE_PACKED,
        bits: bits as u8,
        count: data.len() as u32,
        scale,
        payload,
    }
}

impl CompressedFloatBuffer {
    /// Serialized byte length, as accounted by the compressed-bytes counter
    pub fn serialized_len(&self) -> usize {
        12 + self.payload.len()
    }

    /// Serialize into the self-contained wire form
    ///
    /// Layout: version u8, mode u8, bits u8, reserved u8, count u32,
    /// scale f32, payload bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_len());
        buf.put_u8(FORMAT_VERSION);
        buf.put_u8(self.mode);
        buf.put_u8(self.bits);
        buf.put_u8(0);
        buf.put_u32_le(self.count);
        buf.put_f32_le(self.scale);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Rebuild a buffer from its serialized form
    pub fn deserialize(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < 12 {
            return Err(ClientError::Decode(format!(
                "compressed buffer truncated: {} of 12 header bytes",
                buf.len()
            )));
        }
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(ClientError::Decode(format!(
                "unsupported compressed buffer version {version}"
            )));
        }
        let mode = buf.get_u8();
        let bits = buf.get_u8();
        let _reserved = buf.get_u8();
        let count = buf.get_u32_le();
        let scale = buf.get_f32_le();

        let expected = match mode {
            MODE_VERBATIM => 4 * count as usize,
            MODE_PACKED => (count as usize * bits as usize).div_ceil(8),
            other => {
                return Err(ClientError::Decode(format!(
                    "unknown compressed buffer mode {other}"
                )))
            }
        };
        if buf.len() < expected {
            return Err(ClientError::Decode(format!(
                "compressed buffer payload truncated: {} of {} bytes",
                buf.len(),
                expected
            )));
        }

        Ok(CompressedFloatBuffer {
            mode,
            bits,
            count,
            scale,
            payload: buf[..expected].to_vec(),
        })
    }

    /// Expand back into the original float sequence
    pub fn decompress(&self) -> Vec<f32> {
        let count = self.count as usize;
        let mut out = Vec::with_capacity(count);

        if self.mode == MODE_VERBATIM {
            let mut cursor = &self.payload[..];
            for _ in 0..count {
                out.push(cursor.get_f32_le());
            }
            return out;
        }

        let bits = self.bits as u32;
        let mask = (1u64 << bits) - 1;
        let sign_bit = 1u64 << (bits - 1);
        let mut accum: u64 = 0;
        let mut filled: u32 = 0;
        let mut bytes = self.payload.iter();

        for _ in 0..count {
            while filled < bits {
                accum |= (*bytes.next().unwrap_or(&0) as u64) << filled;
                filled += 8;
            }
            let raw = accum & mask;
            accum >>= bits;
            filled -= bits;

            let q = if raw & sign_bit != 0 {
                (raw | !mask) as i64
            } else {
                raw as i64
            };
            out.push(q as f32 / self.scale);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 * 0.1;
                t.sin() * 100.0 + (t * 3.7).cos() * 12.5
            })
            .collect()
    }

    #[test]
    fn full_precision_roundtrip_is_exact() {
        let data = waveform(256);
        let buffer = compress_precision(&data, 32).unwrap();
        let restored = CompressedFloatBuffer::deserialize(&buffer.serialize())
            .unwrap()
            .decompress();
        assert_eq!(restored, data);
    }

    #[test]
    fn precision_roundtrip_bounded_error() {
        let data = waveform(512);
        let max_abs = data.iter().fold(0.0f32, |a, v| a.max(v.abs()));
        for precision in [8u32, 12, 16, 24] {
            let buffer = compress_precision(&data, precision).unwrap();
            let restored = buffer.decompress();
            assert_eq!(restored.len(), data.len());
            // Quantization step for this precision, rounding adds half a step.
            let step = max_abs / ((1u64 << (precision - 1)) - 1) as f32;
            for (a, b) in data.iter().zip(&restored) {
                assert!((a - b).abs() <= step, "precision {precision}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn tolerance_roundtrip_bounded_error() {
        let data = waveform(512);
        for tolerance in [0.5f32, 0.05, 0.005] {
            let buffer = compress_tolerance(&data, tolerance).unwrap();
            let restored = CompressedFloatBuffer::deserialize(&buffer.serialize())
                .unwrap()
                .decompress();
            for (a, b) in data.iter().zip(&restored) {
                assert!(
                    (a - b).abs() <= tolerance,
                    "tolerance {tolerance}: {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn low_precision_actually_compresses() {
        let data = waveform(1024);
        let buffer = compress_precision(&data, 8).unwrap();
        assert!(buffer.serialized_len() < 4 * data.len() / 2);
    }

    #[test]
    fn zero_buffer() {
        let data = vec![0.0f32; 64];
        let buffer = compress_precision(&data, 12).unwrap();
        assert_eq!(buffer.decompress(), data);
    }

    #[test]
    fn empty_buffer() {
        let buffer = compress_tolerance(&[], 0.1).unwrap();
        let restored = CompressedFloatBuffer::deserialize(&buffer.serialize())
            .unwrap()
            .decompress();
        assert!(restored.is_empty());
    }

    #[test]
    fn invalid_precision_rejected() {
        assert!(compress_precision(&[1.0], 0).is_err());
        assert!(compress_precision(&[1.0], 33).is_err());
    }

    #[test]
    fn invalid_tolerance_rejected() {
        assert!(compress_tolerance(&[1.0], 0.0).is_err());
        assert!(compress_tolerance(&[1.0], -0.5).is_err());
    }

    #[test]
    fn deserialize_truncated() {
        let buffer = compress_precision(&waveform(32), 10).unwrap();
        let bytes = buffer.serialize();
        let result = CompressedFloatBuffer::deserialize(&bytes[..bytes.len() - 4]);
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[test]
    fn extreme_tolerance_falls_back_to_verbatim() {
        let data = waveform(64);
        let buffer = compress_tolerance(&data, 1e-12).unwrap();
        assert_eq!(buffer.decompress(), data);
    }
}
