//! Analyze 7.5 header encoding
//!
//! The legacy fixed-header image format written by the Analyze image
//! reader: a 348-byte header (.hdr) alongside a raw binary payload (.img).
//! Only the fields the format requires are populated; everything else is
//! zeroed, matching common Analyze writers.

use bytes::{BufMut, BytesMut};

use crate::protocol::ImageDataType;

/// Total header size in bytes
pub const HEADER_SIZE: usize = 348;

/// Analyze data-type codes for the supported element types
fn analyze_datatype(dt: ImageDataType) -> i16 {
    match dt {
        ImageDataType::Ushort => 512,        // DT_UINT16
        ImageDataType::Short => 4,           // DT_SIGNED_SHORT
        ImageDataType::Uint => 768,          // DT_UINT32
        ImageDataType::Int => 8,             // DT_SIGNED_INT
        ImageDataType::Float => 16,          // DT_FLOAT
        ImageDataType::Double => 64,         // DT_DOUBLE
        ImageDataType::ComplexFloat => 32,   // DT_COMPLEX
        ImageDataType::ComplexDouble => 1792 // DT_COMPLEX128
    }
}

/// Encode a 348-byte Analyze 7.5 header for an image volume
///
/// `dims` are the matrix dimensions (up to 7 used), `pixel_size` the voxel
/// spacing per dimension.
pub fn encode_header(dims: &[usize], pixel_size: &[f32], data_type: ImageDataType) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);

    // header_key (40 bytes)
    buf.put_i32_le(HEADER_SIZE as i32); // sizeof_hdr
    buf.put_bytes(0, 10); // data_type
    buf.put_bytes(0, 18); // db_name
    buf.put_i32_le(16384); // extents
    buf.put_i16_le(0); // session_error
    buf.put_u8(b'r'); // regular
    buf.put_u8(0); // hkey_un0

    // image_dimension (108 bytes)
    buf.put_i16_le(dims.len().min(7) as i16); // dim[0]: dimension count
    for i in 0..7 {
        buf.put_i16_le(dims.get(i).copied().unwrap_or(1) as i16);
    }
    for _ in 0..7 {
        buf.put_i16_le(0); // unused8..unused14
    }
    buf.put_i16_le(analyze_datatype(data_type)); // datatype
    buf.put_i16_le(data_type.bits_per_element() as i16); // bitpix
    buf.put_i16_le(0); // dim_un0
    buf.put_f32_le(0.0); // pixdim[0]
    for i in 0..7 {
        buf.put_f32_le(pixel_size.get(i).copied().unwrap_or(1.0));
    }
    buf.put_f32_le(0.0); // vox_offset
    for _ in 0..3 {
        buf.put_f32_le(0.0); // funused1..3
    }
    buf.put_f32_le(0.0); // cal_max
    buf.put_f32_le(0.0); // cal_min
    buf.put_f32_le(0.0); // compressed
    buf.put_f32_le(0.0); // verified
    buf.put_i32_le(0); // glmax
    buf.put_i32_le(0); // glmin

    // data_history (200 bytes)
    buf.put_bytes(0, 80 + 24 + 1 + 10 + 10 + 10 + 10 + 10 + 10 + 3);
    for _ in 0..8 {
        buf.put_i32_le(0); // views .. smin
    }

    debug_assert_eq!(buf.len(), HEADER_SIZE);
    buf.to_vec()
}
