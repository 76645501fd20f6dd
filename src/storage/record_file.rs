//! Indexed acquisition/waveform container
//!
//! The on-disk input format consumed by the client driver: a header XML
//! document followed by a sequence of tagged, length-delimited records.
//! Records are indexed on open so acquisitions and waveforms can be read
//! in any order by index.
//!
//! Layout: magic `MRDR`, u32 format version, u64 header length + XML bytes,
//! then per record a u8 kind tag, u64 length and the encoded record.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{ClientError, Result};
use crate::protocol::{Acquisition, Waveform};
use crate::storage::RecordSource;

const MAGIC: &[u8; 4] = b"MRDR";
const FORMAT_VERSION: u32 = 1;

const KIND_ACQUISITION: u8 = 1;
const KIND_WAVEFORM: u8 = 2;

/// Read side of the record container
pub struct RecordFile {
    reader: BufReader<File>,
    header_xml: String,
    acquisition_offsets: Vec<(u64, u64)>,
    waveform_offsets: Vec<(u64, u64)>,
}

impl RecordFile {
    /// Open a container and index its records
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ClientError::Decode(format!(
                "{} is not a record container",
                path.as_ref().display()
            )));
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(ClientError::Decode(format!(
                "unsupported record container version {version}"
            )));
        }

        let mut len = [0u8; 8];
        reader.read_exact(&mut len)?;
        let header_len = u64::from_le_bytes(len);
        let mut header = vec![0u8; header_len as usize];
        reader.read_exact(&mut header)?;
        let header_xml = String::from_utf8(header)?;

        let mut acquisition_offsets = Vec::new();
        let mut waveform_offsets = Vec::new();
        loop {
            let mut kind = [0u8; 1];
            match reader.read_exact(&mut kind) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            reader.read_exact(&mut len)?;
            let record_len = u64::from_le_bytes(len);
            let offset = reader.stream_position()?;
            match kind[0] {
                KIND_ACQUISITION => acquisition_offsets.push((offset, record_len)),
                KIND_WAVEFORM => waveform_offsets.push((offset, record_len)),
                other => {
                    return Err(ClientError::Decode(format!(
                        "unknown record kind {other} at offset {offset}"
                    )))
                }
            }
            reader.seek(SeekFrom::Current(record_len as i64))?;
        }

        Ok(RecordFile {
            reader,
            header_xml,
            acquisition_offsets,
            waveform_offsets,
        })
    }

    /// The container's header XML document
    pub fn header_xml(&self) -> &str {
        &self.header_xml
    }

    fn read_record(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl RecordSource for RecordFile {
    fn acquisition_count(&self) -> usize {
        self.acquisition_offsets.len()
    }

    fn waveform_count(&self) -> usize {
        self.waveform_offsets.len()
    }

    fn read_acquisition(&mut self, index: usize) -> Result<Acquisition> {
        let (offset, len) = *self.acquisition_offsets.get(index).ok_or_else(|| {
            ClientError::Decode(format!("acquisition index {index} out of range"))
        })?;
        let buf = self.read_record(offset, len)?;
        Acquisition::decode(&buf)
    }

    fn read_waveform(&mut self, index: usize) -> Result<Waveform> {
        let (offset, len) = *self
            .waveform_offsets
            .get(index)
            .ok_or_else(|| ClientError::Decode(format!("waveform index {index} out of range")))?;
        let buf = self.read_record(offset, len)?;
        Waveform::decode(&buf)
    }
}

/// Write side of the record container
pub struct RecordFileWriter {
    writer: BufWriter<File>,
}

impl RecordFileWriter {
    /// Create a container with the given header XML
    pub fn create<P: AsRef<Path>>(path: P, header_xml: &str) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(header_xml.len() as u64).to_le_bytes())?;
        writer.write_all(header_xml.as_bytes())?;
        Ok(RecordFileWriter { writer })
    }

    /// Append one acquisition record
    pub fn append_acquisition(&mut self, acq: &Acquisition) -> Result<()> {
        self.append(KIND_ACQUISITION, &acq.encode())
    }

    /// Append one waveform record
    pub fn append_waveform(&mut self, wav: &Waveform) -> Result<()> {
        self.append(KIND_WAVEFORM, &wav.encode())
    }

    fn append(&mut self, kind: u8, record: &[u8]) -> Result<()> {
        self.writer.write_all(&[kind])?;
        self.writer.write_all(&(record.len() as u64).to_le_bytes())?;
        self.writer.write_all(record)?;
        Ok(())
    }

    /// Flush and close the container
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AcquisitionHeader, WaveformHeader};

    fn acq(time_stamp: u32, samples: u16) -> Acquisition {
        let head = AcquisitionHeader {
            acquisition_time_stamp: time_stamp,
            number_of_samples: samples,
            active_channels: 1,
            ..AcquisitionHeader::default()
        };
        Acquisition {
            data: (0..2 * head.data_elements()).map(|i| i as f32).collect(),
            trajectory: Vec::new(),
            head,
        }
    }

    fn wav(time_stamp: u32) -> Waveform {
        let head = WaveformHeader {
            time_stamp,
            number_of_samples: 4,
            channels: 1,
            ..WaveformHeader::default()
        };
        Waveform {
            data: vec![7; head.data_elements()],
            head,
        }
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.mrd");

        let mut writer = RecordFileWriter::create(&path, "<header/>").unwrap();
        writer.append_acquisition(&acq(10, 8)).unwrap();
        writer.append_waveform(&wav(20)).unwrap();
        writer.append_acquisition(&acq(30, 16)).unwrap();
        writer.finish().unwrap();

        let mut file = RecordFile::open(&path).unwrap();
        assert_eq!(file.header_xml(), "<header/>");
        assert_eq!(file.acquisition_count(), 2);
        assert_eq!(file.waveform_count(), 1);

        // Out-of-order access works against the index.
        assert_eq!(
            file.read_acquisition(1).unwrap().head.acquisition_time_stamp,
            30
        );
        assert_eq!(file.read_acquisition(0).unwrap(), acq(10, 8));
        assert_eq!(file.read_waveform(0).unwrap(), wav(20));
        assert!(file.read_acquisition(2).is_err());
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"definitely not a container").unwrap();
        assert!(matches!(
            RecordFile::open(&path),
            Err(ClientError::Decode(_))
        ));
    }
}
