//! Alignment file handles.
//!
//! An [`AlignmentFile`] owns one open BAM stream, its header, and a single
//! reusable native-record buffer. The same type serves both directions: the
//! [`Mode`] chosen at open time decides whether the handle reads or writes,
//! and it never changes afterwards. Decoded bytes land in the handle's
//! internal [`bam::Record`]; anything a caller wants to keep across reads
//! must be copied out into an [`AlignedRead`](crate::record::AlignedRead)
//! first.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use noodles::sam::alignment::io::Write as _;

use crate::errors::{AlignmentFileError, Result};
use crate::io::{RawSink, RawSource};
use crate::query::RegionScan;
use crate::record::AlignedRead;

/// Direction a handle was opened in, fixed for the handle's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read an existing alignment file; the header is read eagerly at open.
    Read,
    /// Write a new BGZF-compressed binary alignment file.
    WriteBinary,
}

impl Mode {
    pub fn is_read(&self) -> bool {
        matches!(self, Mode::Read)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "r" => Ok(Mode::Read),
            "wb" => Ok(Mode::WriteBinary),
            _ => Err(format!("Invalid file mode: {}", s)),
        }
    }
}

pub(crate) enum Stream {
    Reader(bam::io::Reader<bgzf::Reader<RawSource>>),
    Writer(bam::io::Writer<bgzf::Writer<RawSink>>),
}

/// One open alignment file.
///
/// # Example
/// ```no_run
/// use alignio::AlignmentFile;
///
/// # fn main() -> alignio::Result<()> {
/// let mut file = AlignmentFile::reader("sample.bam")?;
/// let mut read = Default::default();
/// while file.read_record_into(&mut read)? {
///     // read is an owned copy; keeping it past the next call is fine
/// }
/// # Ok(())
/// # }
/// ```
pub struct AlignmentFile {
    pub(crate) path: PathBuf,
    pub(crate) mode: Mode,
    pub(crate) stream: Stream,
    pub(crate) header: Option<sam::Header>,
    /// Reusable decode buffer; overwritten by every read.
    pub(crate) record: bam::Record,
    pub(crate) index: Option<Box<dyn noodles::csi::BinningIndex + Send + Sync>>,
    pub(crate) scan: Option<RegionScan>,
    pub(crate) at_end: bool,
    pub(crate) finished: bool,
}

impl std::fmt::Debug for AlignmentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentFile")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("header", &self.header)
            .field("has_index", &self.index.is_some())
            .field("has_scan", &self.scan.is_some())
            .field("at_end", &self.at_end)
            .field("finished", &self.finished)
            .finish()
    }
}

impl AlignmentFile {
    /// Opens `path` in the given mode.
    ///
    /// In read mode the header is read immediately; a file whose header
    /// can't be decoded fails here rather than on the first record. The
    /// filename `-` binds standard input or output instead of a file.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let stream = match mode {
            Mode::Read => {
                let source = RawSource::open(&path).map_err(|e| AlignmentFileError::Open {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Stream::Reader(bam::io::Reader::new(source))
            }
            Mode::WriteBinary => {
                let sink = RawSink::create(&path).map_err(|e| AlignmentFileError::Open {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Stream::Writer(bam::io::Writer::new(sink))
            }
        };

        let mut file = Self {
            path,
            mode,
            stream,
            header: None,
            record: bam::Record::default(),
            index: None,
            scan: None,
            at_end: false,
            finished: false,
        };

        if mode.is_read() {
            let header = match &mut file.stream {
                Stream::Reader(reader) => {
                    reader
                        .read_header()
                        .map_err(|e| AlignmentFileError::ReadHeader {
                            path: file.path.display().to_string(),
                            source: e,
                        })?
                }
                Stream::Writer(_) => unreachable!(),
            };
            file.header = Some(header);
        }

        Ok(file)
    }

    /// Opens `path` for reading. Shorthand for [`AlignmentFile::open`] with
    /// [`Mode::Read`].
    pub fn reader<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, Mode::Read)
    }

    /// Opens `path` for writing. Shorthand for [`AlignmentFile::open`] with
    /// [`Mode::WriteBinary`].
    pub fn writer<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, Mode::WriteBinary)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn header(&self) -> Option<&sam::Header> {
        self.header.as_ref()
    }

    /// Replaces this handle's header.
    ///
    /// Write-mode handles have no header until one is installed here or via
    /// [`AlignmentFile::copy_header_from`].
    pub fn set_header(&mut self, header: sam::Header) {
        self.header = Some(header);
    }

    /// Deep-copies `source`'s header into this handle, replacing any header
    /// it previously held.
    pub fn copy_header_from(&mut self, source: &AlignmentFile) -> Result<()> {
        let header = source
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        self.header = Some(header.clone());
        Ok(())
    }

    /// Writes the handle's header to the output stream.
    ///
    /// Must be called once, before any record is written.
    pub fn write_header(&mut self) -> Result<()> {
        if self.finished {
            return Err(AlignmentFileError::Closed);
        }
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        let writer = match &mut self.stream {
            Stream::Writer(w) => w,
            Stream::Reader(_) => return Err(AlignmentFileError::NotWritable),
        };
        writer.write_header(header)?;
        Ok(())
    }

    /// Reads the next record from the stream into the handle's native
    /// buffer.
    ///
    /// Returns `Ok(false)` on end of stream, after which every further call
    /// returns `Ok(false)` as well. A decode or I/O failure is returned as
    /// an error and also ends the stream for this handle.
    pub fn read_record(&mut self) -> Result<bool> {
        if self.finished {
            return Err(AlignmentFileError::Closed);
        }
        if self.at_end {
            return Ok(false);
        }
        let reader = match &mut self.stream {
            Stream::Reader(r) => r,
            Stream::Writer(_) => return Err(AlignmentFileError::NotReadable),
        };
        match reader.read_record(&mut self.record) {
            Ok(0) => {
                self.at_end = true;
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(e) => {
                self.at_end = true;
                Err(e.into())
            }
        }
    }

    /// Reads the next record and copies it out into `read`.
    ///
    /// On end of stream, `read` is left untouched and `Ok(false)` is
    /// returned.
    pub fn read_record_into(&mut self, read: &mut AlignedRead) -> Result<bool> {
        if !self.read_record()? {
            return Ok(false);
        }
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        *read = AlignedRead::from_record(header, &self.record)?;
        Ok(true)
    }

    /// Borrows the handle's native-record buffer.
    ///
    /// The borrow is tied to the handle, so the buffer can't be held across
    /// the next read; copy it out with
    /// [`AlignedRead::from_record`](crate::record::AlignedRead::from_record)
    /// to keep it.
    pub fn record(&self) -> &bam::Record {
        &self.record
    }

    /// Duplicates `source`'s native-record buffer into this handle.
    pub fn copy_record_from(&mut self, source: &AlignmentFile) {
        self.record = source.record.clone();
    }

    /// Translates `read` into the native representation and writes it.
    ///
    /// Reference names are resolved against this handle's header before
    /// anything is written; an unknown name fails the whole call.
    pub fn write_record(&mut self, read: &AlignedRead) -> Result<()> {
        if self.finished {
            return Err(AlignmentFileError::Closed);
        }
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        let record = read.to_record_buf(header)?;
        let writer = match &mut self.stream {
            Stream::Writer(w) => w,
            Stream::Reader(_) => return Err(AlignmentFileError::NotWritable),
        };
        writer.write_alignment_record(header, &record)?;
        Ok(())
    }

    /// Writes the handle's native-record buffer as-is.
    ///
    /// Together with [`AlignmentFile::copy_record_from`] this moves records
    /// between handles without a decode/encode round trip.
    pub fn write_current_record(&mut self) -> Result<()> {
        if self.finished {
            return Err(AlignmentFileError::Closed);
        }
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        let writer = match &mut self.stream {
            Stream::Writer(w) => w,
            Stream::Reader(_) => return Err(AlignmentFileError::NotWritable),
        };
        writer.write_record(header, &self.record)?;
        Ok(())
    }

    /// True once a sequential read has hit the end of the stream.
    pub fn is_at_end(&self) -> bool {
        self.at_end
    }

    /// Releases the region iterator and index and, for write handles,
    /// finalizes the compressed stream.
    ///
    /// Calling this more than once is a no-op. Dropping the handle calls it
    /// implicitly, discarding any error; call it explicitly when the error
    /// matters.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.scan = None;
        self.index = None;
        if let Stream::Writer(w) = &mut self.stream {
            w.try_finish()?;
        }
        self.finished = true;
        Ok(())
    }
}

impl Drop for AlignmentFile {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
