//! Image record wire layout
//!
//! Images arrive as a fixed header, an optional u64-length-prefixed
//! metadata blob, and a raw element payload whose byte length is
//! `element_size(data_type) x matrix dims x channels`. The data-type tag in
//! the header selects the decode path; anything outside the eight supported
//! element types is a decode error.
//!
//! Image decoding is two-stage by design: the connector reads the message
//! identifier, then the image code path reads the fixed header itself
//! before it can even select a decode path for the remainder.

use crate::error::{ClientError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Element type tag carried in [`ImageHeader::data_type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDataType {
    Ushort = 1,
    Short = 2,
    Uint = 3,
    Int = 4,
    Float = 5,
    Double = 6,
    ComplexFloat = 7,
    ComplexDouble = 8,
}

impl ImageDataType {
    /// All supported tags, in tag order
    pub const ALL: [ImageDataType; 8] = [
        ImageDataType::Ushort,
        ImageDataType::Short,
        ImageDataType::Uint,
        ImageDataType::Int,
        ImageDataType::Float,
        ImageDataType::Double,
        ImageDataType::ComplexFloat,
        ImageDataType::ComplexDouble,
    ];

    /// Map a wire tag to an element type; unknown tags are a decode error
    pub fn from_tag(tag: u16) -> Result<Self> {
        match tag {
            1 => Ok(ImageDataType::Ushort),
            2 => Ok(ImageDataType::Short),
            3 => Ok(ImageDataType::Uint),
            4 => Ok(ImageDataType::Int),
            5 => Ok(ImageDataType::Float),
            6 => Ok(ImageDataType::Double),
            7 => Ok(ImageDataType::ComplexFloat),
            8 => Ok(ImageDataType::ComplexDouble),
            other => Err(ClientError::Decode(format!(
                "unsupported image data type tag: {other}"
            ))),
        }
    }

    /// Size of one element in bytes
    pub fn element_size(self) -> usize {
        match self {
            ImageDataType::Ushort | ImageDataType::Short => 2,
            ImageDataType::Uint | ImageDataType::Int | ImageDataType::Float => 4,
            ImageDataType::Double | ImageDataType::ComplexFloat => 8,
            ImageDataType::ComplexDouble => 16,
        }
    }

    /// Bits per element, as recorded in Analyze headers
    pub fn bits_per_element(self) -> u16 {
        (self.element_size() * 8) as u16
    }
}

/// Fixed image header (194 bytes, little-endian, padding-free)
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    pub version: u16,
    /// Element type tag; see [`ImageDataType::from_tag`]
    pub data_type: u16,
    pub flags: u64,
    pub measurement_uid: u32,
    pub matrix_size: [u16; 3],
    pub field_of_view: [f32; 3],
    pub channels: u16,
    pub position: [f32; 3],
    pub read_dir: [f32; 3],
    pub phase_dir: [f32; 3],
    pub slice_dir: [f32; 3],
    pub patient_table_position: [f32; 3],
    pub average: u16,
    pub slice: u16,
    pub contrast: u16,
    pub phase: u16,
    pub repetition: u16,
    pub set: u16,
    pub acquisition_time_stamp: u32,
    pub physiology_time_stamp: [u32; 3],
    pub image_type: u16,
    pub image_index: u16,
    pub image_series_index: u16,
    pub user_int: [i32; 8],
    pub user_float: [f32; 8],
}

impl Default for ImageHeader {
    fn default() -> Self {
        ImageHeader {
            version: 1,
            data_type: ImageDataType::Float as u16,
            flags: 0,
            measurement_uid: 0,
            matrix_size: [1, 1, 1],
            field_of_view: [1.0, 1.0, 1.0],
            channels: 1,
            position: [0.0; 3],
            read_dir: [0.0; 3],
            phase_dir: [0.0; 3],
            slice_dir: [0.0; 3],
            patient_table_position: [0.0; 3],
            average: 0,
            slice: 0,
            contrast: 0,
            phase: 0,
            repetition: 0,
            set: 0,
            acquisition_time_stamp: 0,
            physiology_time_stamp: [0; 3],
            image_type: 0,
            image_index: 0,
            image_series_index: 0,
            user_int: [0; 8],
            user_float: [0.0; 8],
        }
    }
}

impl ImageHeader {
    /// Header size in bytes
    pub const SIZE: usize = 194;

    /// Element type decoded from the embedded tag
    pub fn element_type(&self) -> Result<ImageDataType> {
        ImageDataType::from_tag(self.data_type)
    }

    /// Total element count: matrix dims x channels
    pub fn element_count(&self) -> usize {
        self.matrix_size[0] as usize
            * self.matrix_size[1] as usize
            * self.matrix_size[2] as usize
            * self.channels as usize
    }

    /// Exact payload byte length promised by this header
    pub fn data_size(&self) -> Result<usize> {
        Ok(self.element_type()?.element_size() * self.element_count())
    }

    /// Encode the header into exactly [`ImageHeader::SIZE`] bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.data_type);
        buf.put_u64_le(self.flags);
        buf.put_u32_le(self.measurement_uid);
        for v in self.matrix_size {
            buf.put_u16_le(v);
        }
        for v in self.field_of_view {
            buf.put_f32_le(v);
        }
        buf.put_u16_le(self.channels);
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
        buf.put_u16_le(self.average);
        buf.put_u16_le(self.slice);
        buf.put_u16_le(self.contrast);
        buf.put_u16_le(self.phase);
        buf.put_u16_le(self.repetition);
        buf.put_u16_le(self.set);
        buf.put_u32_le(self.acquisition_time_stamp);
        for v in self.physiology_time_stamp {
            buf.put_u32_le(v);
        }
        buf.put_u16_le(self.image_type);
        buf.put_u16_le(self.image_index);
        buf.put_u16_le(self.image_series_index);
        for v in self.user_int {
            buf.put_i32_le(v);
        }
        for v in self.user_float {
            buf.put_f32_le(v);
        }
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.to_vec()
    }

    /// Decode a header from a byte slice of at least [`ImageHeader::SIZE`] bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ClientError::Decode(format!(
                "image header truncated: {} of {} bytes",
                buf.len(),
                Self::SIZE
            )));
        }

        let mut cursor = &buf[..Self::SIZE];
        let version = cursor.get_u16_le();
        let data_type = cursor.get_u16_le();
        let flags = cursor.get_u64_le();
        let measurement_uid = cursor.get_u32_le();
        let mut matrix_size = [0u16; 3];
        for v in &mut matrix_size {
            *v = cursor.get_u16_le();
        }
        let mut field_of_view = [0f32; 3];
        for v in &mut field_of_view {
            *v = cursor.get_f32_le();
        }
        let channels = cursor.get_u16_le();
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
        let average = cursor.get_u16_le();
        let slice = cursor.get_u16_le();
        let contrast = cursor.get_u16_le();
        let phase = cursor.get_u16_le();
        let repetition = cursor.get_u16_le();
        let set = cursor.get_u16_le();
        let acquisition_time_stamp = cursor.get_u32_le();
        let mut physiology_time_stamp = [0u32; 3];
        for v in &mut physiology_time_stamp {
            *v = cursor.get_u32_le();
        }
        let image_type = cursor.get_u16_le();
        let image_index = cursor.get_u16_le();
        let image_series_index = cursor.get_u16_le();
        let mut user_int = [0i32; 8];
        for v in &mut user_int {
            *v = cursor.get_i32_le();
        }
        let mut user_float = [0f32; 8];
        for v in &mut user_float {
            *v = cursor.get_f32_le();
        }

        Ok(ImageHeader {
            version,
            data_type,
            flags,
            measurement_uid,
            matrix_size,
            field_of_view,
            channels,
            position,
            read_dir,
            phase_dir,
            slice_dir,
            patient_table_position,
            average,
            slice,
            contrast,
            phase,
            repetition,
            set,
            acquisition_time_stamp,
            physiology_time_stamp,
            image_type,
            image_index,
            image_series_index,
            user_int,
            user_float,
        })
    }
}

/// A decoded image: header, optional metadata blob, raw element payload
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub head: ImageHeader,
    /// Serialized attribute document, absent when the wire length was zero
    pub meta: Option<Vec<u8>>,
    /// Raw element bytes, exactly [`ImageHeader::data_size`] long
    pub data: Vec<u8>,
}
