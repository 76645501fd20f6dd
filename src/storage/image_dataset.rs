//! Append-only image dataset
//!
//! The structured output container the dataset image reader appends into.
//! The handle enforces its own mutual exclusion: the file is guarded by an
//! internal mutex held only for the duration of each discrete append, so it
//! can be shared across tasks without an external lock. The underlying file
//! is created lazily on the first append.
//!
//! Layout: magic `IMGD`, u32 format version, u64 group-name length + bytes,
//! then per image a u64 record length followed by the encoded image header,
//! u64 meta length + meta bytes and the raw element payload.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ClientError, Result};
use crate::protocol::{Image, ImageHeader};

const MAGIC: &[u8; 4] = b"IMGD";
const FORMAT_VERSION: u32 = 1;

struct Inner {
    file: Option<File>,
    images_appended: u64,
}

/// Internally synchronized image container handle
pub struct ImageDataset {
    path: PathBuf,
    group: String,
    inner: Mutex<Inner>,
}

impl ImageDataset {
    /// Create a handle; the file itself is created on first append
    pub fn new<P: AsRef<Path>>(path: P, group: &str) -> Self {
        ImageDataset {
            path: path.as_ref().to_path_buf(),
            group: group.to_string(),
            inner: Mutex::new(Inner {
                file: None,
                images_appended: 0,
            }),
        }
    }

    /// Output group name recorded in the container
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Number of images appended through this handle
    pub fn images_appended(&self) -> u64 {
        self.inner.lock().expect("image dataset lock poisoned").images_appended
    }

    /// Append one image record
    ///
    /// The lock is held only for this append; callers must not rely on any
    /// ordering between concurrent appenders.
    pub fn append_image(&self, head: &ImageHeader, meta: Option<&[u8]>, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().expect("image dataset lock poisoned");

        if inner.file.is_none() {
            let mut file = File::create(&self.path).map_err(|e| {
                ClientError::Persist(format!(
                    "unable to create image dataset {}: {e}",
                    self.path.display()
                ))
            })?;
            file.write_all(MAGIC)?;
            file.write_all(&FORMAT_VERSION.to_le_bytes())?;
            file.write_all(&(self.group.len() as u64).to_le_bytes())?;
            file.write_all(self.group.as_bytes())?;
            inner.file = Some(file);
        }

        let header_bytes = head.encode();
        let meta_bytes = meta.unwrap_or(&[]);
        let record_len = header_bytes.len() + 8 + meta_bytes.len() + data.len();

        let file = inner.file.as_mut().expect("dataset file just created");
        let write = |file: &mut File| -> std::io::Result<()> {
            file.write_all(&(record_len as u64).to_le_bytes())?;
            file.write_all(&header_bytes)?;
            file.write_all(&(meta_bytes.len() as u64).to_le_bytes())?;
            file.write_all(meta_bytes)?;
            file.write_all(data)?;
            file.flush()
        };
        write(file).map_err(|e| {
            ClientError::Persist(format!(
                "unable to append image to {}: {e}",
                self.path.display()
            ))
        })?;

        inner.images_appended += 1;
        Ok(())
    }

    /// Read back every image in a container (group name, images)
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<(String, Vec<Image>)> {
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ClientError::Decode(format!(
                "{} is not an image dataset",
                path.as_ref().display()
            )));
        }
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        if u32::from_le_bytes(word) != FORMAT_VERSION {
            return Err(ClientError::Decode("unsupported image dataset version".into()));
        }
        let mut len = [0u8; 8];
        reader.read_exact(&mut len)?;
        let mut group = vec![0u8; u64::from_le_bytes(len) as usize];
        reader.read_exact(&mut group)?;
        let group = String::from_utf8(group)?;

        let mut images = Vec::new();
        loop {
            match reader.read_exact(&mut len) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let mut record = vec![0u8; u64::from_le_bytes(len) as usize];
            reader.read_exact(&mut record)?;

            let head = ImageHeader::decode(&record)?;
            let mut rest = &record[ImageHeader::SIZE..];
            if rest.len() < 8 {
                return Err(ClientError::Decode("image record truncated".into()));
            }
            let meta_len = u64::from_le_bytes(rest[..8].try_into().expect("8 bytes")) as usize;
            rest = &rest[8..];
            if rest.len() < meta_len {
                return Err(ClientError::Decode("image meta truncated".into()));
            }
            let meta = if meta_len > 0 {
                Some(rest[..meta_len].to_vec())
            } else {
                None
            };
            let data = rest[meta_len..].to_vec();
            if data.len() != head.data_size()? {
                return Err(ClientError::Decode(format!(
                    "image payload is {} bytes, header promises {}",
                    data.len(),
                    head.data_size()?
                )));
            }
            images.push(Image { head, meta, data });
        }

        Ok((group, images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ImageDataType;

    fn image_header(index: u16) -> ImageHeader {
        ImageHeader {
            data_type: ImageDataType::Ushort as u16,
            matrix_size: [4, 4, 1],
            channels: 1,
            image_index: index,
            image_series_index: 1,
            ..ImageHeader::default()
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.imgd");
        let dataset = ImageDataset::new(&path, "2026-08-23");

        let head = image_header(1);
        let data = vec![0xABu8; head.data_size().unwrap()];
        dataset.append_image(&head, Some(b"{\"a\":1}"), &data).unwrap();
        dataset.append_image(&image_header(2), None, &data).unwrap();
        assert_eq!(dataset.images_appended(), 2);

        let (group, images) = ImageDataset::read_all(&path).unwrap();
        assert_eq!(group, "2026-08-23");
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].head, head);
        assert_eq!(images[0].meta.as_deref(), Some(b"{\"a\":1}".as_slice()));
        assert_eq!(images[0].data, data);
        assert!(images[1].meta.is_none());
    }

    #[test]
    fn lazy_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.imgd");
        let _dataset = ImageDataset::new(&path, "g");
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.imgd");
        let dataset = std::sync::Arc::new(ImageDataset::new(&path, "g"));

        let mut handles = Vec::new();
        for t in 0..4u16 {
            let dataset = dataset.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..8 {
                    let head = image_header(t * 8 + i);
                    let data = vec![0u8; head.data_size().unwrap()];
                    dataset.append_image(&head, None, &data).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let (_, images) = ImageDataset::read_all(&path).unwrap();
        assert_eq!(images.len(), 32);
    }
}
