//! Control message wire layouts
//!
//! Configuration, script and query bodies. The configuration filename is a
//! fixed-width zero-padded block, not length-prefixed; scripts use the
//! 4-byte length convention; queries use the 8-byte convention.

use crate::error::{ClientError, Result};
use bytes::BufMut;

/// Fixed-width configuration filename block (1024 bytes, zero-padded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationFile([u8; Self::SIZE]);

impl ConfigurationFile {
    /// Block size in bytes
    pub const SIZE: usize = 1024;

    /// Build a block from a configuration name
    pub fn new(name: &str) -> Result<Self> {
        if name.len() >= Self::SIZE {
            return Err(ClientError::Decode(format!(
                "configuration name too long: {} bytes (max {})",
                name.len(),
                Self::SIZE - 1
            )));
        }
        let mut block = [0u8; Self::SIZE];
        block[..name.len()].copy_from_slice(name.as_bytes());
        Ok(ConfigurationFile(block))
    }

    /// The raw zero-padded block as written to the wire
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    /// The configuration name with padding trimmed
    pub fn name(&self) -> Result<&str> {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(Self::SIZE);
        std::str::from_utf8(&self.0[..len])
            .map_err(|_| ClientError::Decode("invalid UTF-8 in configuration name".into()))
    }
}

/// Encode a script body: u32 length followed by the XML text
pub fn encode_script(xml: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + xml.len());
    buf.put_u32_le(xml.len() as u32);
    buf.extend_from_slice(xml.as_bytes());
    buf
}

/// Encode an information-query body:
/// u64 reserved (always 0), u64 correlation id, u64 length, query bytes
pub fn encode_query(query: &str, correlation_id: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + query.len());
    buf.put_u64_le(0); // reserved
    buf.put_u64_le(correlation_id);
    buf.put_u64_le(query.len() as u64);
    buf.extend_from_slice(query.as_bytes());
    buf
}
