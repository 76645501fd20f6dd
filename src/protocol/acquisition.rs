//! Acquisition record wire layout
//!
//! One acquisition is a fixed 340-byte header followed by optional
//! trajectory floats and optional interleaved complex sample data. The
//! sizes of both variable parts are fully determined by header fields;
//! readers must trust the header and never infer lengths independently.

use crate::error::{ClientError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Flag bit marking the sample payload as compressed with the spectral codec
pub const FLAG_COMPRESSION_SPECTRAL: u32 = 53;
/// Flag bit marking the sample payload as compressed with the packed codec
pub const FLAG_COMPRESSION_PACKED: u32 = 54;

/// Encoding loop counters embedded in the acquisition header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingCounters {
    pub kspace_encode_step_1: u16,
    pub kspace_encode_step_2: u16,
    pub average: u16,
    pub slice: u16,
    pub contrast: u16,
    pub phase: u16,
    pub repetition: u16,
    pub set: u16,
    pub segment: u16,
    pub user: [u16; 8],
}

/// Fixed acquisition header (340 bytes, little-endian, padding-free)
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionHeader {
    pub version: u16,
    /// Bit field; bits are addressed 1-64, see [`AcquisitionHeader::set_flag`]
    pub flags: u64,
    pub measurement_uid: u32,
    pub scan_counter: u32,
    pub acquisition_time_stamp: u32,
    pub physiology_time_stamp: [u32; 3],
    pub number_of_samples: u16,
    pub available_channels: u16,
    pub active_channels: u16,
    pub channel_mask: [u64; 16],
    pub discard_pre: u16,
    pub discard_post: u16,
    pub center_sample: u16,
    pub encoding_space_ref: u16,
    pub trajectory_dimensions: u16,
    pub sample_time_us: f32,
    pub position: [f32; 3],
    pub read_dir: [f32; 3],
    pub phase_dir: [f32; 3],
    pub slice_dir: [f32; 3],
    pub patient_table_position: [f32; 3],
    pub idx: EncodingCounters,
    pub user_int: [i32; 8],
    pub user_float: [f32; 8],
}

impl Default for AcquisitionHeader {
    fn default() -> Self {
        AcquisitionHeader {
            version: 1,
            flags: 0,
            measurement_uid: 0,
            scan_counter: 0,
            acquisition_time_stamp: 0,
            physiology_time_stamp: [0; 3],
            number_of_samples: 0,
            available_channels: 1,
            active_channels: 1,
            channel_mask: [0; 16],
            discard_pre: 0,
            discard_post: 0,
            center_sample: 0,
            encoding_space_ref: 0,
            trajectory_dimensions: 0,
            sample_time_us: 0.0,
            position: [0.0; 3],
            read_dir: [0.0; 3],
            phase_dir: [0.0; 3],
            slice_dir: [0.0; 3],
            patient_table_position: [0.0; 3],
            idx: EncodingCounters::default(),
            user_int: [0; 8],
            user_float: [0.0; 8],
        }
    }
}

impl AcquisitionHeader {
    /// Header size in bytes
    pub const SIZE: usize = 340;

    /// Set a flag bit (1-64)
    pub fn set_flag(&mut self, bit: u32) {
        debug_assert!((1..=64).contains(&bit));
        self.flags |= 1u64 << (bit - 1);
    }

    /// Test a flag bit (1-64)
    pub fn is_flag_set(&self, bit: u32) -> bool {
        debug_assert!((1..=64).contains(&bit));
        self.flags & (1u64 << (bit - 1)) != 0
    }

    /// Number of trajectory floats promised by this header
    pub fn trajectory_elements(&self) -> usize {
        self.trajectory_dimensions as usize * self.number_of_samples as usize
    }

    /// Number of complex samples promised by this header
    pub fn data_elements(&self) -> usize {
        self.active_channels as usize * self.number_of_samples as usize
    }

    /// Encode the header into exactly [`AcquisitionHeader::SIZE`] bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);

        buf.put_u16_le(self.version);
        buf.put_u64_le(self.flags);
        buf.put_u32_le(self.measurement_uid);
        buf.put_u32_le(self.scan_counter);
        buf.put_u32_le(self.acquisition_time_stamp);
        for v in self.physiology_time_stamp {
            buf.put_u32_le(v);
        }
        buf.put_u16_le(self.number_of_samples);
        buf.put_u16_le(self.available_channels);
        buf.put_u16_le(self.active_channels);
        for v in self.channel_mask {
            buf.put_u64_le(v);
        }
        buf.put_u16_le(self.discard_pre);
        buf.put_u16_le(self.discard_post);
        buf.put_u16_le(self.center_sample);
        buf.put_u16_le(self.encoding_space_ref);
        buf.put_u16_le(self.trajectory_dimensions);
        buf.put_f32_le(self.sample_time_us);
        for v in self.position {
            buf.put_f32_le(v);
        }
        for v in self.read_dir {
            buf.put_f32_le(v);
        }
        for v in self.phase_dir {
            buf.put_f32_le(v);
        }
        for v in self.slice_dir {
            buf.put_f32_le(v);
        }
        for v in self.patient_table_position {
            buf.put_f32_le(v);
        }
        buf.put_u16_le(self.idx.kspace_encode_step_1);
        buf.put_u16_le(self.idx.kspace_encode_step_2);
        buf.put_u16_le(self.idx.average);
        buf.put_u16_le(self.idx.slice);
        buf.put_u16_le(self.idx.contrast);
        buf.put_u16_le(self.idx.phase);
        buf.put_u16_le(self.idx.repetition);
        buf.put_u16_le(self.idx.set);
        buf.put_u16_le(self.idx.segment);
        for v in self.idx.user {
            buf.put_u16_le(v);
        }
        for v in self.user_int {
            buf.put_i32_le(v);
        }
        for v in self.user_float {
            buf.put_f32_le(v);
        }

        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.to_vec()
    }

    /// Decode a header from a byte slice of at least [`AcquisitionHeader::SIZE`] bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ClientError::Decode(format!(
                "acquisition header truncated: {} of {} bytes",
                buf.len(),
                Self::SIZE
            )));
        }

        let mut cursor = &buf[..Self::SIZE];
        let version = cursor.get_u16_le();
        let flags = cursor.get_u64_le();
        let measurement_uid = cursor.get_u32_le();
        let scan_counter = cursor.get_u32_le();
        let acquisition_time_stamp = cursor.get_u32_le();
        let mut physiology_time_stamp = [0u32; 3];
        for v in &mut physiology_time_stamp {
            *v = cursor.get_u32_le();
        }
        let number_of_samples = cursor.get_u16_le();
        let available_channels = cursor.get_u16_le();
        let active_channels = cursor.get_u16_le();
        let mut channel_mask = [0u64; 16];
        for v in &mut channel_mask {
            *v = cursor.get_u64_le();
        }
        let discard_pre = cursor.get_u16_le();
        let discard_post = cursor.get_u16_le();
        let center_sample = cursor.get_u16_le();
        let encoding_space_ref = cursor.get_u16_le();
        let trajectory_dimensions = cursor.get_u16_le();
        let sample_time_us = cursor.get_f32_le();
        let mut position = [0f32; 3];
        for v in &mut position {
            *v = cursor.get_f32_le();
        }
        let mut read_dir = [0f32; 3];
        for v in &mut read_dir {
            *v = cursor.get_f32_le();
        }
        let mut phase_dir = [0f32; 3];
        for v in &mut phase_dir {
            *v = cursor.get_f32_le();
        }
        let mut slice_dir = [0f32; 3];
        for v in &mut slice_dir {
            *v = cursor.get_f32_le();
        }
        let mut patient_table_position = [0f32; 3];
        for v in &mut patient_table_position {
            *v = cursor.get_f32_le();
        }
        let mut idx = EncodingCounters {
            kspace_encode_step_1: cursor.get_u16_le(),
            kspace_encode_step_2: cursor.get_u16_le(),
            average: cursor.get_u16_le(),
            slice: cursor.get_u16_le(),
            contrast: cursor.get_u16_le(),
            phase: cursor.get_u16_le(),
            repetition: cursor.get_u16_le(),
            set: cursor.get_u16_le(),
            segment: cursor.get_u16_le(),
            user: [0; 8],
        };
        for v in &mut idx.user {
            *v = cursor.get_u16_le();
        }
        let mut user_int = [0i32; 8];
        for v in &mut user_int {
            *v = cursor.get_i32_le();
        }
        let mut user_float = [0f32; 8];
        for v in &mut user_float {
            *v = cursor.get_f32_le();
        }

        Ok(AcquisitionHeader {
            version,
            flags,
            measurement_uid,
            scan_counter,
            acquisition_time_stamp,
            physiology_time_stamp,
            number_of_samples,
            available_channels,
            active_channels,
            channel_mask,
            discard_pre,
            discard_post,
            center_sample,
            encoding_space_ref,
            trajectory_dimensions,
            sample_time_us,
            position,
            read_dir,
            phase_dir,
            slice_dir,
            patient_table_position,
            idx,
            user_int,
            user_float,
        })
    }
}

/// One sampled readout record: header, optional trajectory, optional data
///
/// `data` holds interleaved (real, imaginary) float pairs, channel-major.
/// Ownership ends at the socket write; the core never persists acquisitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Acquisition {
    pub head: AcquisitionHeader,
    pub trajectory: Vec<f32>,
    pub data: Vec<f32>,
}

impl Acquisition {
    /// Encode header, trajectory and data as one contiguous record
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.head.encode();
        buf.reserve(4 * (self.trajectory.len() + self.data.len()));
        for v in &self.trajectory {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.data {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Decode a full record; variable part lengths are taken from the header
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let head = AcquisitionHeader::decode(buf)?;
        let traj_len = head.trajectory_elements();
        let data_len = 2 * head.data_elements();
        let expected = AcquisitionHeader::SIZE + 4 * (traj_len + data_len);
        if buf.len() < expected {
            return Err(ClientError::Decode(format!(
                "acquisition record truncated: {} of {} bytes",
                buf.len(),
                expected
            )));
        }

        let mut cursor = &buf[AcquisitionHeader::SIZE..expected];
        let mut trajectory = Vec::with_capacity(traj_len);
        for _ in 0..traj_len {
            trajectory.push(cursor.get_f32_le());
        }
        let mut data = Vec::with_capacity(data_len);
        for _ in 0..data_len {
            data.push(cursor.get_f32_le());
        }

        Ok(Acquisition {
            head,
            trajectory,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> AcquisitionHeader {
        let mut head = AcquisitionHeader {
            scan_counter: 7,
            acquisition_time_stamp: 1234,
            number_of_samples: 16,
            active_channels: 2,
            trajectory_dimensions: 2,
            sample_time_us: 5.0,
            ..AcquisitionHeader::default()
        };
        head.idx.slice = 3;
        head
    }

    #[test]
    fn header_encodes_to_fixed_size() {
        assert_eq!(sample_header().encode().len(), AcquisitionHeader::SIZE);
    }

    #[test]
    fn header_roundtrip() {
        let head = sample_header();
        let decoded = AcquisitionHeader::decode(&head.encode()).unwrap();
        assert_eq!(decoded, head);
    }

    #[test]
    fn header_decode_truncated() {
        let result = AcquisitionHeader::decode(&[0u8; 100]);
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[test]
    fn flag_bits() {
        let mut head = AcquisitionHeader::default();
        head.set_flag(FLAG_COMPRESSION_PACKED);
        assert!(head.is_flag_set(FLAG_COMPRESSION_PACKED));
        assert!(!head.is_flag_set(FLAG_COMPRESSION_SPECTRAL));
        assert_eq!(head.flags, 1u64 << 53);
    }

    #[test]
    fn record_roundtrip() {
        let head = sample_header();
        let traj: Vec<f32> = (0..head.trajectory_elements()).map(|i| i as f32).collect();
        let data: Vec<f32> = (0..2 * head.data_elements())
            .map(|i| i as f32 * 0.5)
            .collect();
        let acq = Acquisition {
            head,
            trajectory: traj,
            data,
        };
        let decoded = Acquisition::decode(&acq.encode()).unwrap();
        assert_eq!(decoded, acq);
    }

    #[test]
    fn record_decode_honours_header_counts() {
        // Header promises more data than the buffer holds.
        let acq = Acquisition {
            head: sample_header(),
            trajectory: Vec::new(),
            data: Vec::new(),
        };
        let result = Acquisition::decode(&acq.encode());
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[test]
    fn little_endian_layout() {
        let mut head = AcquisitionHeader::default();
        head.version = 0x0102;
        let bytes = head.encode();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x01);
    }
}
