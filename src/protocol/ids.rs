//! Message identifiers
//!
//! Every wire message begins with exactly one 16-bit identifier. The value
//! is the sole dispatch key: identifiers in the core range carry control and
//! query traffic, identifiers in the extended range carry record payloads.
//! The message set is closed; there is no runtime negotiation.

/// Lower bound of the core identifier range (control/query messages)
pub const ID_CORE_MIN: u16 = 0;
/// Upper bound of the core identifier range
pub const ID_CORE_MAX: u16 = 999;
/// Lower bound of the extended identifier range (record payloads)
pub const ID_EXT_MIN: u16 = 1000;
/// Upper bound of the extended identifier range
pub const ID_EXT_MAX: u16 = 4096;

/// Remote configuration by name (fixed 1024-byte filename block)
pub const ID_CONFIG_FILE: u16 = 1;
/// Inline configuration script (u32 length + XML bytes)
pub const ID_CONFIG_SCRIPT: u16 = 2;
/// Session parameter document (u32 length + XML bytes)
pub const ID_PARAMETER_SCRIPT: u16 = 3;
/// Cooperative shutdown signal; no body
pub const ID_CLOSE: u16 = 4;
/// Free-form text from the server (u32 length + bytes)
pub const ID_TEXT: u16 = 5;
/// Information query (u64 reserved, u64 correlation id, u64 length + bytes)
pub const ID_QUERY: u16 = 6;
/// Query response (u64 correlation id, u64 length + bytes)
pub const ID_RESPONSE: u16 = 7;

/// Acquisition record (fixed header + optional trajectory + sample data)
pub const ID_ACQUISITION: u16 = 1008;
/// Named binary blob (e.g. DICOM) with attribute sidecar
pub const ID_BLOB_WITH_NAME: u16 = 1018;
/// Dependency-query artifact (u64 length + opaque bytes)
pub const ID_DEPENDENCY_QUERY: u16 = 1019;
/// Image record (fixed header + optional meta blob + element payload)
pub const ID_IMAGE: u16 = 1022;
/// Waveform record (fixed header + optional u32 sample payload)
pub const ID_WAVEFORM: u16 = 1026;

/// Byte size of a message identifier on the wire
pub const MESSAGE_ID_SIZE: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_ids_within_core_range() {
        for id in [
            ID_CONFIG_FILE,
            ID_CONFIG_SCRIPT,
            ID_PARAMETER_SCRIPT,
            ID_CLOSE,
            ID_TEXT,
            ID_QUERY,
            ID_RESPONSE,
        ] {
            assert!(id >= ID_CORE_MIN && id <= ID_CORE_MAX);
        }
    }

    #[test]
    fn record_ids_within_extended_range() {
        for id in [
            ID_ACQUISITION,
            ID_BLOB_WITH_NAME,
            ID_DEPENDENCY_QUERY,
            ID_IMAGE,
            ID_WAVEFORM,
        ] {
            assert!(id >= ID_EXT_MIN && id <= ID_EXT_MAX);
        }
    }
}
