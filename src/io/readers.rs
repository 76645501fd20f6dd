//! Message readers
//!
//! One reader per result-message kind, expressed as a closed set of tagged
//! variants dispatched through a single `read` operation. A reader's `read`
//! is invoked with the stream positioned immediately after the message
//! identifier and must consume exactly the bytes of one logical message:
//! over- or under-reading desynchronizes every subsequent message on the
//! connection, so lengths always come from the wire, never from guesses.
//!
//! Image messages are decoded in two stages: the reader consumes the fixed
//! image header itself, because the header's data-type tag determines how
//! the remainder is decoded.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::protocol::image::Image;
use crate::protocol::ImageHeader;
use crate::storage::analyze;
use crate::storage::ImageDataset;

/// Width of the zero-padded sequence number in blob filenames
const BLOB_SEQUENCE_DIGITS: usize = 6;

pub(crate) async fn read_u32_le<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) async fn read_u64_le<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) async fn read_vec<S: AsyncRead + Unpin>(stream: &mut S, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Shared slot a [`MessageReader::QueryToString`] delivers into
///
/// The caller keeps a clone and reads the result after `wait()` returns.
pub type QueryResult = Arc<Mutex<String>>;

/// A registered handler for one message identifier
///
/// The message set is closed, so readers are a tagged union rather than an
/// open trait-object hierarchy.
pub enum MessageReader {
    /// u32 length + text; logged
    Text,
    /// u64 correlation id, u64 length + text; logged (zero length is valid)
    Response,
    /// u64 length + text, delivered synchronously into a shared slot
    QueryToString(QueryResult),
    /// u64 length + opaque bytes persisted byte-for-byte to a fixed path
    DependencyQuery(DependencyQueryReader),
    /// u32 blob + u64 filename + u64 meta; persisted under a counter-derived name
    Blob(BlobReader),
    /// Image appended to a structured dataset
    ImageDataset(ImageDatasetReader),
    /// Image materialized as Analyze header + raw sibling files
    ImageAnalyze(AnalyzeImageReader),
}

impl MessageReader {
    /// Consume exactly one message from the stream and perform the side effect
    pub async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<()> {
        match self {
            MessageReader::Text => {
                let len = read_u32_le(stream).await? as usize;
                let text = String::from_utf8(read_vec(stream, len).await?)?;
                info!("server: {}", text);
                Ok(())
            }
            MessageReader::Response => {
                let correlation_id = read_u64_le(stream).await?;
                let len = read_u64_le(stream).await? as usize;
                let text = String::from_utf8(read_vec(stream, len).await?)?;
                info!(correlation_id, "response: {}", text);
                Ok(())
            }
            MessageReader::QueryToString(slot) => {
                let len = read_u64_le(stream).await? as usize;
                let text = String::from_utf8(read_vec(stream, len).await?)?;
                *slot.lock().expect("query result lock poisoned") = text;
                Ok(())
            }
            MessageReader::DependencyQuery(reader) => reader.read(stream).await,
            MessageReader::Blob(reader) => reader.read(stream).await,
            MessageReader::ImageDataset(reader) => reader.read(stream).await,
            MessageReader::ImageAnalyze(reader) => reader.read(stream).await,
        }
    }
}

/// Decode one image message body: fixed header, optional meta, exact payload
///
/// The data-type tag is validated before any further read so an unsupported
/// tag fails without producing output artifacts.
pub(crate) async fn read_image<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Image> {
    let head_buf = read_vec(stream, ImageHeader::SIZE).await?;
    let head = ImageHeader::decode(&head_buf)?;
    let data_size = head.data_size()?;

    let meta_len = read_u64_le(stream).await? as usize;
    let meta = if meta_len > 0 {
        Some(read_vec(stream, meta_len).await?)
    } else {
        None
    };

    let data = read_vec(stream, data_size).await?;
    Ok(Image { head, meta, data })
}

/// Persists dependency-query payloads to a fixed output path
pub struct DependencyQueryReader {
    path: PathBuf,
    calls: u64,
}

impl DependencyQueryReader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        DependencyQueryReader {
            path: path.into(),
            calls: 0,
        }
    }

    /// Number of artifacts persisted so far
    pub fn calls(&self) -> u64 {
        self.calls
    }

    async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<()> {
        let len = read_u64_le(stream).await? as usize;
        let payload = read_vec(stream, len).await?;

        tokio::fs::write(&self.path, &payload).await.map_err(|e| {
            ClientError::Persist(format!(
                "unable to write dependency query to {}: {e}",
                self.path.display()
            ))
        })?;
        self.calls += 1;
        debug!(path = %self.path.display(), bytes = len, "dependency query persisted");
        Ok(())
    }
}

/// Persists named blobs (e.g. DICOM) plus optional attribute sidecars
///
/// The wire carries a filename, but output names are derived from an
/// internal sequence counter; the wire filename is latent protocol data and
/// is read only to keep the framing correct.
pub struct BlobReader {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    sequence: u64,
}

impl BlobReader {
    /// Writes into the current working directory
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self::in_directory(".", prefix, suffix)
    }

    pub fn in_directory<P: Into<PathBuf>>(dir: P, prefix: &str, suffix: &str) -> Self {
        BlobReader {
            dir: dir.into(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            sequence: 0,
        }
    }

    /// Number of blobs persisted so far
    pub fn blobs_written(&self) -> u64 {
        self.sequence
    }

    async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<()> {
        let blob_len = read_u32_le(stream).await? as usize;
        let blob = read_vec(stream, blob_len).await?;

        let name_len = read_u64_le(stream).await? as usize;
        let _wire_name = read_vec(stream, name_len).await?;

        let meta_len = read_u64_le(stream).await? as usize;
        let meta = if meta_len > 0 {
            Some(read_vec(stream, meta_len).await?)
        } else {
            None
        };

        let stem = format!(
            "{}_{:0width$}",
            self.prefix,
            self.sequence,
            width = BLOB_SEQUENCE_DIGITS
        );
        let blob_path = self.dir.join(format!("{}.{}", stem, self.suffix));

        tokio::fs::write(&blob_path, &blob).await.map_err(|e| {
            ClientError::Persist(format!("unable to write blob {}: {e}", blob_path.display()))
        })?;
        if let Some(meta) = meta {
            let meta_path = self.dir.join(format!("{stem}_attrib.xml"));
            tokio::fs::write(&meta_path, &meta).await.map_err(|e| {
                ClientError::Persist(format!(
                    "unable to write blob meta {}: {e}",
                    meta_path.display()
                ))
            })?;
        }

        self.sequence += 1;
        info!(file = %blob_path.display(), bytes = blob_len, "blob written");
        Ok(())
    }
}

/// Appends received images into a structured dataset
pub struct ImageDatasetReader {
    dataset: Arc<ImageDataset>,
}

impl ImageDatasetReader {
    /// The dataset handle is internally synchronized and may be shared
    pub fn new(dataset: Arc<ImageDataset>) -> Self {
        ImageDatasetReader { dataset }
    }

    async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<()> {
        let image = read_image(stream).await?;
        debug!(
            series = image.head.image_series_index,
            index = image.head.image_index,
            "appending image to dataset"
        );
        self.dataset
            .append_image(&image.head, image.meta.as_deref(), &image.data)
    }
}

/// Materializes each received image as Analyze .hdr/.img files
pub struct AnalyzeImageReader {
    prefix: String,
}

impl AnalyzeImageReader {
    pub fn new(prefix: &str) -> Self {
        AnalyzeImageReader {
            prefix: prefix.to_string(),
        }
    }

    /// Deterministic stem from the header's loop indices
    fn stem(&self, head: &ImageHeader) -> String {
        let mut stem = String::new();
        if !self.prefix.is_empty() {
            stem.push_str(&self.prefix);
            stem.push('_');
        }
        stem.push_str(&format!(
            "SLC{}_CON{}_PHS{}_REP{}_SET{}_AVE{}_{}_{}",
            head.slice,
            head.contrast,
            head.phase,
            head.repetition,
            head.set,
            head.average,
            head.image_index,
            head.image_series_index
        ));
        stem
    }

    async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<()> {
        let image = read_image(stream).await?;
        let head = &image.head;
        let stem = self.stem(head);
        info!(
            series = head.image_series_index,
            index = head.image_index,
            "receiving image {stem}"
        );

        if let Some(meta) = &image.meta {
            let path = format!("{stem}.attrib");
            tokio::fs::write(&path, meta).await.map_err(|e| {
                ClientError::Persist(format!("unable to write image meta {path}: {e}"))
            })?;
        }

        let dims = [
            head.matrix_size[0] as usize,
            head.matrix_size[1] as usize,
            head.matrix_size[2] as usize,
            head.channels as usize,
        ];
        let mut pixel_size = [1.0f32; 4];
        for i in 0..3 {
            if head.matrix_size[i] > 0 {
                pixel_size[i] = head.field_of_view[i] / head.matrix_size[i] as f32;
            }
        }
        let header_bytes = analyze::encode_header(&dims, &pixel_size, head.element_type()?);

        let hdr_path = format!("{stem}.hdr");
        tokio::fs::write(&hdr_path, &header_bytes).await.map_err(|e| {
            ClientError::Persist(format!("unable to write Analyze header {hdr_path}: {e}"))
        })?;

        let img_path = format!("{stem}.img");
        tokio::fs::write(&img_path, &image.data).await.map_err(|e| {
            ClientError::Persist(format!("unable to write Analyze image {img_path}: {e}"))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ImageDataType;
    use bytes::BufMut;
    use std::io::Cursor;

    /// Serialize an image message body exactly as the server frames it
    fn image_message(head: &ImageHeader, meta: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
        let mut buf = head.encode();
        let meta = meta.unwrap_or(&[]);
        buf.put_u64_le(meta.len() as u64);
        buf.extend_from_slice(meta);
        buf.extend_from_slice(data);
        buf
    }

    fn header_for(dt: ImageDataType) -> ImageHeader {
        ImageHeader {
            data_type: dt as u16,
            matrix_size: [4, 2, 1],
            channels: 2,
            ..ImageHeader::default()
        }
    }

    #[tokio::test]
    async fn image_roundtrip_all_data_types() {
        for dt in ImageDataType::ALL {
            let head = header_for(dt);
            let expected_size = head.data_size().unwrap();
            let data: Vec<u8> = (0..expected_size).map(|i| i as u8).collect();
            let wire = image_message(&head, Some(b"<meta/>"), &data);

            let mut cursor = Cursor::new(wire);
            let image = read_image(&mut cursor).await.unwrap();
            assert_eq!(image.head, head);
            assert_eq!(image.meta.as_deref(), Some(b"<meta/>".as_slice()));
            assert_eq!(image.data, data);
            assert_eq!(image.data.len(), dt.element_size() * head.element_count());
            // The reader consumed exactly one message.
            assert_eq!(cursor.position() as usize, cursor.get_ref().len());
        }
    }

    #[tokio::test]
    async fn image_zero_meta_means_absent() {
        let head = header_for(ImageDataType::Float);
        let data = vec![0u8; head.data_size().unwrap()];
        let wire = image_message(&head, None, &data);
        let image = read_image(&mut Cursor::new(wire)).await.unwrap();
        assert!(image.meta.is_none());
    }

    #[tokio::test]
    async fn image_unsupported_tag_is_decode_error() {
        let mut head = header_for(ImageDataType::Float);
        head.data_type = 99;
        // Payload bytes follow, but the tag must fail before they are used.
        let wire = image_message(&head, None, &[0u8; 16]);
        let result = read_image(&mut Cursor::new(wire)).await;
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn image_truncated_payload_fails() {
        let head = header_for(ImageDataType::Double);
        let short = vec![0u8; head.data_size().unwrap() - 1];
        let wire = image_message(&head, None, &short);
        let result = read_image(&mut Cursor::new(wire)).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }

    #[tokio::test]
    async fn query_to_string_delivers_into_slot() {
        let slot: QueryResult = Arc::new(Mutex::new(String::new()));
        let mut reader = MessageReader::QueryToString(slot.clone());

        let mut wire = Vec::new();
        wire.put_u64_le(5);
        wire.extend_from_slice(b"hello");
        reader.read(&mut Cursor::new(wire)).await.unwrap();
        assert_eq!(*slot.lock().unwrap(), "hello");
    }

    #[tokio::test]
    async fn response_accepts_empty_body() {
        let mut reader = MessageReader::Response;
        let mut wire = Vec::new();
        wire.put_u64_le(42); // correlation id
        wire.put_u64_le(0); // empty body
        reader.read(&mut Cursor::new(wire)).await.unwrap();
    }

    #[tokio::test]
    async fn text_truncated_stream_fails() {
        let mut reader = MessageReader::Text;
        let mut wire = Vec::new();
        wire.put_u32_le(100);
        wire.extend_from_slice(b"short");
        let result = reader.read(&mut Cursor::new(wire)).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }

    #[tokio::test]
    async fn blob_reader_ignores_wire_filename() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = BlobReader::in_directory(dir.path(), "series", "dcm");
        let mut wire = Vec::new();
        wire.put_u32_le(3);
        wire.extend_from_slice(b"\x01\x02\x03");
        wire.put_u64_le(9);
        wire.extend_from_slice(b"wire.name");
        wire.put_u64_le(6);
        wire.extend_from_slice(b"<meta>");
        reader.read(&mut Cursor::new(wire)).await.unwrap();

        assert_eq!(reader.blobs_written(), 1);
        assert_eq!(
            std::fs::read(dir.path().join("series_000000.dcm")).unwrap(),
            b"\x01\x02\x03"
        );
        assert_eq!(
            std::fs::read(dir.path().join("series_000000_attrib.xml")).unwrap(),
            b"<meta>"
        );
        assert!(!dir.path().join("wire.name").exists());
    }

    #[tokio::test]
    async fn dependency_query_persists_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.dat");
        let mut reader = DependencyQueryReader::new(&path);

        let payload = [0u8, 255, 7, 42];
        let mut wire = Vec::new();
        wire.put_u64_le(payload.len() as u64);
        wire.extend_from_slice(&payload);
        reader.read(&mut Cursor::new(wire)).await.unwrap();

        assert_eq!(reader.calls(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[tokio::test]
    async fn dependency_query_persist_failure_is_fatal() {
        let mut reader = DependencyQueryReader::new("/nonexistent/dir/noise.dat");
        let mut wire = Vec::new();
        wire.put_u64_le(1);
        wire.push(0);
        let result = reader.read(&mut Cursor::new(wire)).await;
        assert!(matches!(result, Err(ClientError::Persist(_))));
        assert_eq!(reader.calls(), 0);
    }

    #[test]
    fn analyze_stem_is_deterministic() {
        let reader = AnalyzeImageReader::new("out");
        let head = ImageHeader {
            slice: 1,
            contrast: 2,
            phase: 3,
            repetition: 4,
            set: 5,
            average: 6,
            image_index: 7,
            image_series_index: 8,
            ..ImageHeader::default()
        };
        assert_eq!(
            reader.stem(&head),
            "out_SLC1_CON2_PHS3_REP4_SET5_AVE6_7_8"
        );
    }
}
