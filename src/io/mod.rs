//! Network session layer: connector, message readers, streaming driver

pub mod connector;
pub mod driver;
pub mod readers;

pub use connector::{fetch_noise_statistics, ByteCounters, Connector, DEFAULT_TIMEOUT};
pub use driver::{stream_records, Record, StreamSummary, TimestampMerge};
pub use readers::{
    AnalyzeImageReader, BlobReader, DependencyQueryReader, ImageDatasetReader, MessageReader,
    QueryResult,
};
