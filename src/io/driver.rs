//! Streaming driver
//!
//! Pulls records out of a [`RecordSource`] and sends them through a
//! connected [`Connector`] in timestamp order. The merge rule is the
//! session contract: a waveform goes out while its timestamp is strictly
//! below the next acquisition's, an acquisition goes out while its
//! timestamp is less than or equal to the next waveform's, and whichever
//! stream remains is drained in index order.

use tracing::{debug, info};

use crate::codec::CompressionConfig;
use crate::error::Result;
use crate::io::connector::Connector;
use crate::protocol::{Acquisition, NoiseStatistics, Waveform};
use crate::storage::RecordSource;

/// One record in merged send order
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Acquisition(Acquisition),
    Waveform(Waveform),
}

/// Timestamp-ordered merge over a record source
///
/// Reads lazily: each stream is at most one record ahead of what has been
/// yielded.
pub struct TimestampMerge<'a, S: RecordSource> {
    source: &'a mut S,
    next_acquisition: usize,
    next_waveform: usize,
    pending_acquisition: Option<Acquisition>,
    pending_waveform: Option<Waveform>,
}

impl<'a, S: RecordSource> TimestampMerge<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        TimestampMerge {
            source,
            next_acquisition: 0,
            next_waveform: 0,
            pending_acquisition: None,
            pending_waveform: None,
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.pending_acquisition.is_none()
            && self.next_acquisition < self.source.acquisition_count()
        {
            self.pending_acquisition = Some(self.source.read_acquisition(self.next_acquisition)?);
            self.next_acquisition += 1;
        }
        if self.pending_waveform.is_none() && self.next_waveform < self.source.waveform_count() {
            self.pending_waveform = Some(self.source.read_waveform(self.next_waveform)?);
            self.next_waveform += 1;
        }
        Ok(())
    }

    /// The next record in send order, or `None` when both streams are drained
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        self.fill()?;
        match (&self.pending_acquisition, &self.pending_waveform) {
            (Some(acq), Some(wav)) => {
                if wav.head.time_stamp < acq.head.acquisition_time_stamp {
                    Ok(self.pending_waveform.take().map(Record::Waveform))
                } else {
                    Ok(self.pending_acquisition.take().map(Record::Acquisition))
                }
            }
            (Some(_), None) => Ok(self.pending_acquisition.take().map(Record::Acquisition)),
            (None, Some(_)) => Ok(self.pending_waveform.take().map(Record::Waveform)),
            (None, None) => Ok(None),
        }
    }
}

/// Counts of records sent by one [`stream_records`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub acquisitions_sent: u64,
    pub waveforms_sent: u64,
}

/// Send every record from the source through the connector in merged order
///
/// Waveforms are never compressed. Acquisitions use the compression
/// configuration when one is given; tolerance modes are scaled per record
/// using the supplied noise statistics.
pub async fn stream_records<S: RecordSource>(
    connector: &mut Connector,
    source: &mut S,
    compression: Option<CompressionConfig>,
    stats: &NoiseStatistics,
) -> Result<StreamSummary> {
    let mut merge = TimestampMerge::new(source);
    let mut summary = StreamSummary::default();

    while let Some(record) = merge.next_record()? {
        match record {
            Record::Acquisition(acq) => {
                match compression {
                    Some(config) => {
                        connector
                            .send_acquisition_compressed(&acq, config, stats)
                            .await?
                    }
                    None => connector.send_acquisition(&acq).await?,
                }
                summary.acquisitions_sent += 1;
                if summary.acquisitions_sent % 1000 == 0 {
                    debug!(sent = summary.acquisitions_sent, "acquisitions in flight");
                }
            }
            Record::Waveform(wav) => {
                connector.send_waveform(&wav).await?;
                summary.waveforms_sent += 1;
            }
        }
    }

    info!(
        acquisitions = summary.acquisitions_sent,
        waveforms = summary.waveforms_sent,
        "input streamed"
    );
    Ok(summary)
}
