//! Command-line driver: stream a record container to a reconstruction
//! server and persist the results.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use recon_client::codec::{CompressionCodec, CompressionConfig};
use recon_client::io::{
    fetch_noise_statistics, stream_records, AnalyzeImageReader, BlobReader, Connector,
    DependencyQueryReader, ImageDatasetReader, MessageReader, StreamSummary,
};
use recon_client::protocol::ids::{
    ID_BLOB_WITH_NAME, ID_DEPENDENCY_QUERY, ID_IMAGE, ID_RESPONSE, ID_TEXT,
};
use recon_client::protocol::NoiseStatistics;
use recon_client::storage::{ImageDataset, RecordFile};
use recon_client::{ClientError, Result};

/// Server-side configuration that answers dependency queries
const DEPENDENCY_QUERY_CONFIG: &str = "measurement_dependencies.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Append images into a structured dataset file
    Dataset,
    /// Write each image as Analyze .hdr/.img siblings
    Analyze,
}

#[derive(Debug, Parser)]
#[command(name = "recon-client", version, about = "Stream raw records to a reconstruction server")]
struct Args {
    /// Server hostname or address
    #[arg(short = 'a', long, default_value = "localhost")]
    address: String,

    /// Server port
    #[arg(short = 'p', long, default_value_t = 9002)]
    port: u16,

    /// Input record container
    #[arg(short = 'f', long)]
    filename: Option<String>,

    /// Output file for images (dataset format) or prefix (analyze format)
    #[arg(short = 'o', long, default_value = "out.imgd")]
    outfile: String,

    /// Output group recorded in the dataset; defaults to a timestamp
    #[arg(short = 'G', long)]
    out_group: Option<String>,

    /// Remote configuration name
    #[arg(short = 'c', long, default_value = "default.xml")]
    config: String,

    /// Local configuration file, sent inline; takes precedence over --config
    #[arg(short = 'C', long)]
    config_local: Option<String>,

    /// Send an information query and print the response instead of streaming
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// Fetch the server's dependency inventory into this file and exit
    #[arg(short = 'Q', long)]
    query_dependencies: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(short = 't', long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Compression precision in bits (1-32; 32 is lossless)
    #[arg(short = 'P', long, default_value_t = 0)]
    compression_precision: u32,

    /// Compression tolerance as a fraction of the noise level
    #[arg(short = 'T', long, default_value_t = 0.0)]
    compression_tolerance: f32,

    /// Use the spectral codec instead of the packed codec
    #[arg(long)]
    spectral: bool,

    /// Noise calibration dependency used to scale the tolerance
    #[arg(short = 'N', long)]
    noise_dependency: Option<String>,

    /// Number of times to stream the input
    #[arg(short = 'l', long, default_value_t = 1)]
    loops: u32,

    /// How received images are persisted
    #[arg(short = 'F', long, value_enum, default_value_t = OutputFormat::Dataset)]
    out_format: OutputFormat,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn default_group() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("run_{secs}")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let timeout = Duration::from_millis(args.timeout_ms);

    if let Some(query) = &args.query {
        return run_query(&args, query, timeout).await;
    }
    if let Some(out) = &args.query_dependencies {
        return run_dependency_query(&args, out, timeout).await;
    }

    run_stream(&args, timeout).await
}

/// Query mode: the response is logged by the response reader
async fn run_query(args: &Args, query: &str, timeout: Duration) -> Result<()> {
    let mut connector = Connector::new();
    connector.set_timeout(timeout);
    connector.register(ID_TEXT, MessageReader::Text);
    connector.register(ID_RESPONSE, MessageReader::Response);

    connector.connect(&args.address, args.port).await?;
    connector.send_info_query(query, 0).await?;
    connector.send_close().await?;
    connector.wait().await
}

/// Dependency-inventory mode: the artifact lands in the given file
async fn run_dependency_query(args: &Args, out: &str, timeout: Duration) -> Result<()> {
    let mut connector = Connector::new();
    connector.set_timeout(timeout);
    connector.register(ID_TEXT, MessageReader::Text);
    connector.register(
        ID_DEPENDENCY_QUERY,
        MessageReader::DependencyQuery(DependencyQueryReader::new(out)),
    );

    connector.connect(&args.address, args.port).await?;
    connector
        .send_configuration_file(DEPENDENCY_QUERY_CONFIG)
        .await?;
    connector.send_close().await?;
    connector.wait().await?;
    info!(file = out, "dependency inventory written");
    Ok(())
}

async fn run_stream(args: &Args, timeout: Duration) -> Result<()> {
    let filename = args.filename.as_deref().ok_or_else(|| {
        ClientError::Connection("an input file is required unless querying".into())
    })?;
    let mut source = RecordFile::open(filename)?;
    let header_xml = source.header_xml().to_string();

    let codec = if args.spectral {
        CompressionCodec::Spectral
    } else {
        CompressionCodec::Packed
    };
    let compression = CompressionConfig::from_options(
        args.compression_precision,
        args.compression_tolerance,
        codec,
    )?;

    // Tolerance is expressed relative to the measured noise level; without
    // a calibration dependency it is applied unscaled.
    let stats = match (&args.noise_dependency, args.compression_tolerance > 0.0) {
        (Some(dependency), true) => {
            fetch_noise_statistics(dependency, &args.address, args.port, timeout).await
        }
        (None, true) => {
            warn!("no noise dependency given; compression tolerance is unscaled");
            NoiseStatistics::invalid()
        }
        _ => NoiseStatistics::invalid(),
    };

    let group = args.out_group.clone().unwrap_or_else(default_group);

    let mut connector = Connector::new();
    connector.set_timeout(timeout);
    connector.register(ID_TEXT, MessageReader::Text);
    connector.register(ID_RESPONSE, MessageReader::Response);
    connector.register(
        ID_BLOB_WITH_NAME,
        MessageReader::Blob(BlobReader::new("dicom", "dcm")),
    );
    match args.out_format {
        OutputFormat::Dataset => {
            let dataset = std::sync::Arc::new(ImageDataset::new(&args.outfile, &group));
            connector.register(
                ID_IMAGE,
                MessageReader::ImageDataset(ImageDatasetReader::new(dataset)),
            );
        }
        OutputFormat::Analyze => {
            let prefix = args.outfile.trim_end_matches(".imgd");
            connector.register(
                ID_IMAGE,
                MessageReader::ImageAnalyze(AnalyzeImageReader::new(prefix)),
            );
        }
    }

    connector.connect(&args.address, args.port).await?;

    match &args.config_local {
        Some(path) => {
            let xml = std::fs::read_to_string(path)?;
            connector.send_configuration_script(&xml).await?;
        }
        None => connector.send_configuration_file(&args.config).await?,
    }
    connector.send_parameters(&header_xml).await?;

    let mut totals = StreamSummary::default();
    for pass in 1..=args.loops.max(1) {
        let summary = stream_records(&mut connector, &mut source, compression, &stats).await?;
        totals.acquisitions_sent += summary.acquisitions_sent;
        totals.waveforms_sent += summary.waveforms_sent;
        if args.loops > 1 {
            debug!(pass, of = args.loops, "input pass complete");
        }
    }

    connector.send_close().await?;
    connector.wait().await?;

    let counters = connector.counters();
    info!(
        acquisitions = totals.acquisitions_sent,
        waveforms = totals.waveforms_sent,
        "session complete"
    );
    info!(
        "transmitted {:.2} MB (compression ratio {:.2})",
        counters.bytes_transmitted() as f64 / (1024.0 * 1024.0),
        counters.compression_ratio()
    );
    Ok(())
}
