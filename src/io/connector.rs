//! Session connector
//!
//! Owns the write half of the connection and a background receive task.
//! Readers are registered before `connect`; at connect time the whole
//! registry moves into the spawned task together with the read half, so
//! dispatch needs no locking. The send path stays with the caller.
//!
//! Lifecycle: register readers, `connect`, send messages, `send_close`,
//! `wait`. The receive task exits cleanly on a close message from the
//! server and fatally on an unregistered identifier, since an unknown
//! message has an unknown body length and the stream position is lost.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{compress, CompressionConfig, CompressionMode};
use crate::error::{ClientError, Result};
use crate::io::readers::MessageReader;
use crate::protocol::control::{encode_query, encode_script, ConfigurationFile};
use crate::protocol::ids::{
    ID_ACQUISITION, ID_CLOSE, ID_CONFIG_FILE, ID_CONFIG_SCRIPT, ID_PARAMETER_SCRIPT, ID_QUERY,
    ID_WAVEFORM, MESSAGE_ID_SIZE,
};
use crate::protocol::{Acquisition, NoiseStatistics, Waveform};

/// Default connect timeout when the caller does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Send-path byte accounting
///
/// Counts what the sender hands to the socket. The uncompressed and
/// compressed counters cover acquisition sample payloads only, the data a
/// codec can act on; everything else, waveform samples included, counts as
/// header bytes. Received bytes are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    /// Message identifiers, fixed headers, trajectory floats and waveform
    /// samples
    pub header_bytes: u64,
    /// Acquisition sample bytes before compression
    pub uncompressed_bytes: u64,
    /// Acquisition sample bytes after compression
    pub compressed_bytes: u64,
}

impl ByteCounters {
    /// Ratio of uncompressed to transmitted sample bytes; 1.0 when nothing
    /// was compressed
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_bytes > 0 {
            self.uncompressed_bytes as f64 / self.compressed_bytes as f64
        } else {
            1.0
        }
    }

    /// Total bytes handed to the socket
    pub fn bytes_transmitted(&self) -> u64 {
        if self.compressed_bytes > 0 {
            self.header_bytes + self.compressed_bytes
        } else {
            self.header_bytes + self.uncompressed_bytes
        }
    }
}

/// Client endpoint of one streaming session
pub struct Connector {
    timeout: Duration,
    readers: HashMap<u16, MessageReader>,
    writer: Option<OwnedWriteHalf>,
    receive_task: Option<JoinHandle<Result<()>>>,
    counters: ByteCounters,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    pub fn new() -> Self {
        Connector {
            timeout: DEFAULT_TIMEOUT,
            readers: HashMap::new(),
            writer: None,
            receive_task: None,
            counters: ByteCounters::default(),
        }
    }

    /// Connect timeout covering name resolution and every candidate address
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Register a reader for a message identifier
    ///
    /// Re-registering an identifier replaces the previous reader. Must be
    /// called before [`Connector::connect`]; registrations made afterwards
    /// are never seen by the running receive task.
    pub fn register(&mut self, id: u16, reader: MessageReader) {
        if self.readers.insert(id, reader).is_some() {
            debug!(id, "replacing registered reader");
        }
    }

    /// Resolve the address, connect and start the receive task
    ///
    /// All candidate addresses share the single timeout; the first
    /// successful connection wins.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let attempt = async {
            let addrs = lookup_host((host, port)).await.map_err(|e| {
                ClientError::Connection(format!("cannot resolve {host}:{port}: {e}"))
            })?;
            let mut last_err = None;
            for addr in addrs {
                match TcpStream::connect(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        debug!(%addr, "connect failed: {e}");
                        last_err = Some(e);
                    }
                }
            }
            Err(match last_err {
                Some(e) => ClientError::Connection(format!("connect to {host}:{port}: {e}")),
                None => ClientError::Connection(format!("{host}:{port} resolved to no addresses")),
            })
        };
        let stream = tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connect to {host}:{port} timed out after {:?}",
                    self.timeout
                ))
            })??;
        stream.set_nodelay(true)?;
        info!(host, port, "connected");

        let (read_half, write_half) = stream.into_split();
        self.writer = Some(write_half);

        let readers = std::mem::take(&mut self.readers);
        self.receive_task = Some(tokio::spawn(receive_loop(read_half, readers)));
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut OwnedWriteHalf> {
        self.writer
            .as_mut()
            .ok_or_else(|| ClientError::Connection("not connected".into()))
    }

    /// Write a message identifier, counting it as header bytes
    async fn write_id(&mut self, id: u16) -> Result<()> {
        self.writer()?.write_all(&id.to_le_bytes()).await?;
        self.counters.header_bytes += MESSAGE_ID_SIZE as u64;
        Ok(())
    }

    async fn write_header_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer()?.write_all(bytes).await?;
        self.counters.header_bytes += bytes.len() as u64;
        Ok(())
    }

    /// Request a server-side configuration by name
    pub async fn send_configuration_file(&mut self, name: &str) -> Result<()> {
        let block = ConfigurationFile::new(name)?;
        self.write_id(ID_CONFIG_FILE).await?;
        self.write_header_bytes(&block.as_bytes()[..]).await?;
        debug!(name, "configuration file requested");
        Ok(())
    }

    /// Send an inline configuration script
    pub async fn send_configuration_script(&mut self, xml: &str) -> Result<()> {
        self.write_id(ID_CONFIG_SCRIPT).await?;
        let body = encode_script(xml);
        self.write_header_bytes(&body).await?;
        debug!(bytes = xml.len(), "configuration script sent");
        Ok(())
    }

    /// Send the session parameter document
    pub async fn send_parameters(&mut self, xml: &str) -> Result<()> {
        self.write_id(ID_PARAMETER_SCRIPT).await?;
        let body = encode_script(xml);
        self.write_header_bytes(&body).await?;
        debug!(bytes = xml.len(), "parameters sent");
        Ok(())
    }

    /// Send an information query; the response arrives through the reader
    /// registered for the response identifier
    pub async fn send_info_query(&mut self, query: &str, correlation_id: u64) -> Result<()> {
        self.write_id(ID_QUERY).await?;
        let body = encode_query(query, correlation_id);
        self.write_header_bytes(&body).await?;
        Ok(())
    }

    /// Send one acquisition uncompressed
    pub async fn send_acquisition(&mut self, acq: &Acquisition) -> Result<()> {
        self.write_id(ID_ACQUISITION).await?;
        self.write_header_bytes(&acq.head.encode()).await?;

        if !acq.trajectory.is_empty() {
            let mut traj = Vec::with_capacity(4 * acq.trajectory.len());
            for v in &acq.trajectory {
                traj.extend_from_slice(&v.to_le_bytes());
            }
            self.write_header_bytes(&traj).await?;
        }

        if !acq.data.is_empty() {
            let mut data = Vec::with_capacity(4 * acq.data.len());
            for v in &acq.data {
                data.extend_from_slice(&v.to_le_bytes());
            }
            self.writer()?.write_all(&data).await?;
            self.counters.uncompressed_bytes += data.len() as u64;
        }
        Ok(())
    }

    /// Send one acquisition with the sample payload compressed
    ///
    /// The payload is compressed before anything is written, so a codec
    /// failure leaves the stream position intact. A tolerance mode is scaled
    /// by the noise statistics and the header's sample time; the codec flag
    /// is set on the transmitted header only.
    pub async fn send_acquisition_compressed(
        &mut self,
        acq: &Acquisition,
        config: CompressionConfig,
        stats: &NoiseStatistics,
    ) -> Result<()> {
        let mode = match config.mode {
            CompressionMode::Precision(bits) => CompressionMode::Precision(bits),
            CompressionMode::Tolerance(tolerance) => {
                CompressionMode::Tolerance(stats.scale_tolerance(tolerance, acq.head.sample_time_us))
            }
        };
        let compressed = if acq.data.is_empty() {
            None
        } else {
            Some(compress(
                config.codec,
                &acq.data,
                2 * acq.head.number_of_samples as usize,
                acq.head.active_channels as usize,
                mode,
            )?)
        };

        let mut head = acq.head.clone();
        head.set_flag(config.codec.header_flag());

        self.write_id(ID_ACQUISITION).await?;
        self.write_header_bytes(&head.encode()).await?;

        if !acq.trajectory.is_empty() {
            let mut traj = Vec::with_capacity(4 * acq.trajectory.len());
            for v in &acq.trajectory {
                traj.extend_from_slice(&v.to_le_bytes());
            }
            self.write_header_bytes(&traj).await?;
        }

        if let Some(compressed) = compressed {
            let writer = self.writer()?;
            writer.write_all(&(compressed.len() as u32).to_le_bytes()).await?;
            writer.write_all(&compressed).await?;
            self.counters.compressed_bytes += compressed.len() as u64;
            self.counters.uncompressed_bytes += 4 * acq.data.len() as u64;
        }
        Ok(())
    }

    /// Send one waveform
    ///
    /// Waveform samples are never compression candidates, so the payload
    /// counts toward header bytes rather than the codec counters.
    pub async fn send_waveform(&mut self, wav: &Waveform) -> Result<()> {
        self.write_id(ID_WAVEFORM).await?;
        self.write_header_bytes(&wav.head.encode()).await?;

        if !wav.data.is_empty() {
            let mut data = Vec::with_capacity(4 * wav.data.len());
            for v in &wav.data {
                data.extend_from_slice(&v.to_le_bytes());
            }
            self.write_header_bytes(&data).await?;
        }
        Ok(())
    }

    /// Signal end of input; the server will finish and close in turn
    pub async fn send_close(&mut self) -> Result<()> {
        self.write_id(ID_CLOSE).await?;
        self.writer()?.flush().await?;
        debug!("close sent");
        Ok(())
    }

    /// Wait for the receive task to finish
    ///
    /// Returns the task's result: `Ok` after a clean server close, the
    /// dispatch or reader error otherwise.
    pub async fn wait(&mut self) -> Result<()> {
        let task = self
            .receive_task
            .take()
            .ok_or_else(|| ClientError::Connection("not connected".into()))?;
        task.await
            .map_err(|e| ClientError::Connection(format!("receive task panicked: {e}")))?
    }

    pub fn counters(&self) -> &ByteCounters {
        &self.counters
    }

    pub fn compression_ratio(&self) -> f64 {
        self.counters.compression_ratio()
    }

    pub fn bytes_transmitted(&self) -> u64 {
        self.counters.bytes_transmitted()
    }
}

impl Drop for Connector {
    /// Abort the receive task if the connector is discarded without `wait`
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
    }
}

/// Background dispatch loop: one identifier, one reader, repeat
async fn receive_loop(
    mut stream: OwnedReadHalf,
    mut readers: HashMap<u16, MessageReader>,
) -> Result<()> {
    loop {
        let mut id_buf = [0u8; MESSAGE_ID_SIZE];
        stream.read_exact(&mut id_buf).await?;
        let id = u16::from_le_bytes(id_buf);

        if id == ID_CLOSE {
            info!("server closed the session");
            return Ok(());
        }

        match readers.get_mut(&id) {
            Some(reader) => reader.read(&mut stream).await?,
            None => {
                error!(id, "no reader registered; stream position lost");
                return Err(ClientError::ProtocolDesync { id });
            }
        }
    }
}

/// Side exchange fetching noise statistics for a calibration dependency
///
/// Opens a short-lived session that asks the server to summarize the named
/// dependency measurement and reads the summary document back. Any failure
/// is reported as invalid statistics rather than an error, since a missing
/// summary only disables tolerance scaling.
pub async fn fetch_noise_statistics(
    dependency: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> NoiseStatistics {
    match try_fetch_noise_statistics(dependency, host, port, timeout).await {
        Ok(stats) => stats,
        Err(e) => {
            warn!("noise statistics unavailable for {dependency}: {e}");
            NoiseStatistics::invalid()
        }
    }
}

async fn try_fetch_noise_statistics(
    dependency: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<NoiseStatistics> {
    use crate::io::readers::QueryResult;
    use crate::protocol::ids::ID_DEPENDENCY_QUERY;
    use std::sync::{Arc, Mutex};

    let slot: QueryResult = Arc::new(Mutex::new(String::new()));

    let mut connector = Connector::new();
    connector.set_timeout(timeout);
    connector.register(ID_DEPENDENCY_QUERY, MessageReader::QueryToString(slot.clone()));
    connector.connect(host, port).await?;

    let script = format!(
        "<configuration>\
         <stream name=\"noise_summary\">\
         <parameter name=\"noise_dependency\" value=\"{dependency}\"/>\
         </stream>\
         </configuration>"
    );
    connector.send_configuration_script(&script).await?;
    connector.send_close().await?;
    connector.wait().await?;

    let document = slot.lock().expect("query result lock poisoned").clone();
    NoiseStatistics::from_document(&document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_one_without_compression() {
        let counters = ByteCounters {
            header_bytes: 100,
            uncompressed_bytes: 4000,
            compressed_bytes: 0,
        };
        assert_eq!(counters.compression_ratio(), 1.0);
        assert_eq!(counters.bytes_transmitted(), 4100);
    }

    #[test]
    fn ratio_and_transmitted_with_compression() {
        let counters = ByteCounters {
            header_bytes: 100,
            uncompressed_bytes: 4000,
            compressed_bytes: 1000,
        };
        assert_eq!(counters.compression_ratio(), 4.0);
        assert_eq!(counters.bytes_transmitted(), 1100);
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let mut connector = Connector::new();
        let result = connector.send_close().await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn wait_before_connect_fails() {
        let mut connector = Connector::new();
        assert!(matches!(
            connector.wait().await,
            Err(ClientError::Connection(_))
        ));
    }
}
