//! Waveform record wire layout
//!
//! Auxiliary time-series records (e.g. physiological signals) interleaved
//! with acquisitions by timestamp. Fixed 32-byte header plus an optional
//! payload of u32 samples whose count is determined by the header.

use crate::error::{ClientError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Fixed waveform header (32 bytes, little-endian, padding-free)
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformHeader {
    pub version: u16,
    pub flags: u64,
    pub measurement_uid: u32,
    pub scan_counter: u32,
    pub time_stamp: u32,
    pub number_of_samples: u16,
    pub channels: u16,
    pub sample_time_us: f32,
    /// Waveform-type tag (ECG, respiratory, trigger, ...)
    pub waveform_id: u16,
}

impl Default for WaveformHeader {
    fn default() -> Self {
        WaveformHeader {
            version: 1,
            flags: 0,
            measurement_uid: 0,
            scan_counter: 0,
            time_stamp: 0,
            number_of_samples: 0,
            channels: 1,
            sample_time_us: 0.0,
            waveform_id: 0,
        }
    }
}

impl WaveformHeader {
    /// Header size in bytes
    pub const SIZE: usize = 32;

    /// Number of u32 samples promised by this header
    pub fn data_elements(&self) -> usize {
        self.channels as usize * self.number_of_samples as usize
    }

    /// Encode the header into exactly [`WaveformHeader::SIZE`] bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(self.version);
        buf.put_u64_le(self.flags);
        buf.put_u32_le(self.measurement_uid);
        buf.put_u32_le(self.scan_counter);
        buf.put_u32_le(self.time_stamp);
        buf.put_u16_le(self.number_of_samples);
        buf.put_u16_le(self.channels);
        buf.put_f32_le(self.sample_time_us);
        buf.put_u16_le(self.waveform_id);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.to_vec()
    }

    /// Decode a header from a byte slice of at least [`WaveformHeader::SIZE`] bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ClientError::Decode(format!(
                "waveform header truncated: {} of {} bytes",
                buf.len(),
                Self::SIZE
            )));
        }

        let mut cursor = &buf[..Self::SIZE];
        Ok(WaveformHeader {
            version: cursor.get_u16_le(),
            flags: cursor.get_u64_le(),
            measurement_uid: cursor.get_u32_le(),
            scan_counter: cursor.get_u32_le(),
            time_stamp: cursor.get_u32_le(),
            number_of_samples: cursor.get_u16_le(),
            channels: cursor.get_u16_le(),
            sample_time_us: cursor.get_f32_le(),
            waveform_id: cursor.get_u16_le(),
        })
    }
}

/// One waveform record: header plus raw u32 samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Waveform {
    pub head: WaveformHeader,
    pub data: Vec<u32>,
}

impl Waveform {
    /// Encode header and samples as one contiguous record
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.head.encode();
        buf.reserve(4 * self.data.len());
        for v in &self.data {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Decode a full record; the sample count is taken from the header
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let head = WaveformHeader::decode(buf)?;
        let data_len = head.data_elements();
        let expected = WaveformHeader::SIZE + 4 * data_len;
        if buf.len() < expected {
            return Err(ClientError::Decode(format!(
                "waveform record truncated: {} of {} bytes",
                buf.len(),
                expected
            )));
        }

        let mut cursor = &buf[WaveformHeader::SIZE..expected];
        let mut data = Vec::with_capacity(data_len);
        for _ in 0..data_len {
            data.push(cursor.get_u32_le());
        }

        Ok(Waveform { head, data })
    }
}
