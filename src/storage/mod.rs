//! On-disk collaborators: input record container, output image dataset,
//! legacy Analyze header encoding
//!
//! The protocol core never touches these formats directly; readers receive
//! capabilities into this module and the driver consumes [`RecordSource`].

pub mod analyze;
pub mod image_dataset;
pub mod record_file;

use crate::error::Result;
use crate::protocol::{Acquisition, Waveform};

pub use image_dataset::ImageDataset;
pub use record_file::{RecordFile, RecordFileWriter};

/// Ordered random-access reads of acquisition and waveform records
///
/// The driver interleaves records from a source by timestamp; sources are
/// read on the sending thread only.
pub trait RecordSource {
    /// Number of acquisition records available
    fn acquisition_count(&self) -> usize;
    /// Number of waveform records available
    fn waveform_count(&self) -> usize;
    /// Read one acquisition by index
    fn read_acquisition(&mut self, index: usize) -> Result<Acquisition>;
    /// Read one waveform by index
    fn read_waveform(&mut self, index: usize) -> Result<Waveform>;
}
