//! Streaming client for a reconstruction service speaking a typed,
//! length-delimited binary protocol.
//!
//! The client reads raw acquisition and waveform records from an on-disk
//! container, streams them to a remote reconstruction server in timestamp
//! order, and persists whatever the server sends back (images, named
//! blobs, dependency artifacts, query responses). Outgoing sample data can
//! optionally be compressed with a quantizing bit-packing codec or, behind
//! the `spectral` feature, a transform codec.
//!
//! # Architecture
//!
//! - [`protocol`]: message identifiers and wire layouts. Every message is a
//!   little-endian u16 identifier followed by a body whose framing is fixed
//!   per message kind.
//! - [`io`]: the [`Connector`](io::Connector) owning the send path and a
//!   background receive task, the message readers, and the streaming driver.
//! - [`codec`]: lossy/lossless compression of acquisition sample payloads.
//! - [`storage`]: input record container, output image dataset, and the
//!   legacy Analyze image format.
//!
//! # Example
//!
//! ```no_run
//! use recon_client::io::{Connector, MessageReader};
//! use recon_client::protocol::ids::ID_TEXT;
//!
//! #[tokio::main]
//! async fn main() -> recon_client::Result<()> {
//!     let mut connector = Connector::new();
//!     connector.register(ID_TEXT, MessageReader::Text);
//!     connector.connect("localhost", 9002).await?;
//!     connector.send_configuration_file("default.xml").await?;
//!     connector.send_close().await?;
//!     connector.wait().await
//! }
//! ```

pub mod codec;
pub mod error;
pub mod io;
pub mod protocol;
pub mod storage;

pub use error::{ClientError, Result};
