//! Wire protocol implementation
//!
//! Fixed binary layouts for every structure crossing the wire, plus the
//! message-identifier space. Two length-prefix conventions coexist: an
//! 8-byte unsigned length for strings, attribute blobs and dependency
//! payloads, and a 4-byte unsigned length for script bodies and compressed
//! payload records. Which convention a field uses is a fixed property of
//! the message kind, never negotiated at runtime.

pub mod acquisition;
pub mod control;
pub mod ids;
pub mod image;
pub mod meta;
pub mod waveform;

pub use acquisition::{Acquisition, AcquisitionHeader, EncodingCounters};
pub use control::ConfigurationFile;
pub use image::{Image, ImageDataType, ImageHeader};
pub use meta::NoiseStatistics;
pub use waveform::{Waveform, WaveformHeader};
