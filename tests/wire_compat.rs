//! Wire-format compatibility tests
//!
//! Byte-level assertions pinning the protocol layouts: message identifier
//! values, fixed header sizes and field offsets, and the two length-prefix
//! conventions. A change that breaks any of these breaks interoperability
//! with existing reconstruction servers.

use recon_client::codec::packed::{compress_precision, CompressedFloatBuffer};
use recon_client::protocol::control::{encode_query, encode_script, ConfigurationFile};
use recon_client::protocol::ids::*;
use recon_client::protocol::{AcquisitionHeader, ImageHeader, WaveformHeader};

#[test]
fn message_identifier_values_are_frozen() {
    assert_eq!(ID_CONFIG_FILE, 1);
    assert_eq!(ID_CONFIG_SCRIPT, 2);
    assert_eq!(ID_PARAMETER_SCRIPT, 3);
    assert_eq!(ID_CLOSE, 4);
    assert_eq!(ID_TEXT, 5);
    assert_eq!(ID_QUERY, 6);
    assert_eq!(ID_RESPONSE, 7);
    assert_eq!(ID_ACQUISITION, 1008);
    assert_eq!(ID_BLOB_WITH_NAME, 1018);
    assert_eq!(ID_DEPENDENCY_QUERY, 1019);
    assert_eq!(ID_IMAGE, 1022);
    assert_eq!(ID_WAVEFORM, 1026);
}

#[test]
fn fixed_header_sizes_are_frozen() {
    assert_eq!(MESSAGE_ID_SIZE, 2);
    assert_eq!(AcquisitionHeader::SIZE, 340);
    assert_eq!(WaveformHeader::SIZE, 32);
    assert_eq!(ImageHeader::SIZE, 194);
    assert_eq!(ConfigurationFile::SIZE, 1024);
}

#[test]
fn identifiers_encode_little_endian() {
    assert_eq!(ID_ACQUISITION.to_le_bytes(), [0xF0, 0x03]);
    assert_eq!(ID_WAVEFORM.to_le_bytes(), [0x02, 0x04]);
}

#[test]
fn configuration_file_block_layout() {
    let block = ConfigurationFile::new("grappa.xml").unwrap();
    let bytes = block.as_bytes();
    assert_eq!(bytes.len(), 1024);
    assert_eq!(&bytes[..10], b"grappa.xml");
    assert!(bytes[10..].iter().all(|&b| b == 0));
}

#[test]
fn script_body_uses_four_byte_length() {
    let body = encode_script("<config/>");
    assert_eq!(body.len(), 4 + 9);
    assert_eq!(&body[..4], &9u32.to_le_bytes());
    assert_eq!(&body[4..], b"<config/>");
}

#[test]
fn query_body_uses_eight_byte_lengths() {
    let body = encode_query("server::version", 0xDEAD_BEEF);
    assert_eq!(&body[..8], &0u64.to_le_bytes()); // reserved
    assert_eq!(&body[8..16], &0xDEAD_BEEFu64.to_le_bytes());
    assert_eq!(&body[16..24], &15u64.to_le_bytes());
    assert_eq!(&body[24..], b"server::version");
}

#[test]
fn acquisition_header_field_offsets() {
    let head = AcquisitionHeader {
        version: 0x0102,
        flags: 0x1122_3344_5566_7788,
        acquisition_time_stamp: 0xCAFE_F00D,
        number_of_samples: 0x0A0B,
        ..AcquisitionHeader::default()
    };
    let bytes = head.encode();

    // version at 0, flags at 2, timestamps follow uid and counter.
    assert_eq!(&bytes[0..2], &0x0102u16.to_le_bytes());
    assert_eq!(&bytes[2..10], &0x1122_3344_5566_7788u64.to_le_bytes());
    assert_eq!(&bytes[18..22], &0xCAFE_F00Du32.to_le_bytes());
    // number_of_samples after three physiology timestamps: 18 + 4 + 12 = 34.
    assert_eq!(&bytes[34..36], &0x0A0Bu16.to_le_bytes());
}

#[test]
fn waveform_header_field_offsets() {
    let head = WaveformHeader {
        time_stamp: 0x0102_0304,
        number_of_samples: 0x0506,
        channels: 0x0708,
        waveform_id: 0x0910,
        ..WaveformHeader::default()
    };
    let bytes = head.encode();

    assert_eq!(&bytes[18..22], &0x0102_0304u32.to_le_bytes());
    assert_eq!(&bytes[22..24], &0x0506u16.to_le_bytes());
    assert_eq!(&bytes[24..26], &0x0708u16.to_le_bytes());
    assert_eq!(&bytes[30..32], &0x0910u16.to_le_bytes());
}

#[test]
fn image_header_tag_sits_after_version() {
    let head = ImageHeader {
        version: 1,
        data_type: 7,
        ..ImageHeader::default()
    };
    let bytes = head.encode();
    assert_eq!(&bytes[0..2], &1u16.to_le_bytes());
    assert_eq!(&bytes[2..4], &7u16.to_le_bytes());
}

#[test]
fn compressed_buffer_framing() {
    let data = [1.0f32, -2.0, 3.0, -4.0];
    let buffer = compress_precision(&data, 32).unwrap();
    let bytes = buffer.serialize();

    assert_eq!(bytes[0], 1); // format version
    assert_eq!(bytes[1], 1); // verbatim mode
    assert_eq!(bytes[2], 32); // bits
    assert_eq!(bytes[3], 0); // reserved
    assert_eq!(&bytes[4..8], &4u32.to_le_bytes()); // element count
    assert_eq!(bytes.len(), 12 + 4 * data.len());
    // Verbatim payload is the raw little-endian floats.
    assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());

    let restored = CompressedFloatBuffer::deserialize(&bytes).unwrap();
    assert_eq!(restored.decompress(), data);
}

#[cfg(feature = "spectral")]
#[test]
fn spectral_buffer_is_self_describing() {
    use recon_client::codec::{compress, CompressionCodec, CompressionMode};

    let samples = 32;
    let channels = 2;
    let data: Vec<f32> = (0..samples * channels)
        .map(|i| (i as f32 * 0.3).sin())
        .collect();
    let bytes = compress(
        CompressionCodec::Spectral,
        &data,
        samples,
        channels,
        CompressionMode::Precision(16),
    )
    .unwrap();

    assert_eq!(bytes[0], 1); // format version
    assert_eq!(&bytes[4..8], &(samples as u32).to_le_bytes());
    assert_eq!(&bytes[8..12], &(channels as u32).to_le_bytes());

    let restored = recon_client::codec::spectral::decompress(&bytes).unwrap();
    assert_eq!(restored.len(), data.len());
}
