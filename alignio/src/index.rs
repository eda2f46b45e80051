//! Loading and building region indexes.
//!
//! Indexes are sidecar files next to the alignment file: a `.bai` (the
//! codec's default linear-binning layout) or a `.csi` (configurable bin
//! granularity). Loading is recoverable: a handle without an index still
//! reads sequentially, it just can't answer region queries. Building streams
//! the source file once and requires it to be coordinate-sorted; unsorted
//! input is rejected by the indexer, not silently mis-indexed.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use noodles::bam;
use noodles::core::Position;
use noodles::csi;
use noodles::csi::binning_index::Indexer;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::csi::binning_index::index::reference_sequence::index::{BinnedIndex, LinearIndex};
use noodles::sam::alignment::Record as SamRecord;

use crate::errors::{AlignmentFileError, Result};
use crate::file::AlignmentFile;

/// Bin depth used for `.csi` output; the conventional value for the format.
const CSI_DEPTH: u8 = 5;

/// Default sidecar path for an alignment file: `<file>.bai`.
pub fn default_index_path<P: AsRef<Path>>(path: P) -> PathBuf {
    appended_extension(path.as_ref(), "bai")
}

fn csi_index_path(path: &Path) -> PathBuf {
    appended_extension(path, "csi")
}

fn appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

impl AlignmentFile {
    /// Loads the index associated with this handle's filename.
    ///
    /// Tries `<file>.bai` first, then `<file>.csi`. Failure is recoverable:
    /// the handle keeps working for sequential reads and no index is
    /// retained.
    pub fn load_index(&mut self) -> Result<()> {
        let bai = default_index_path(&self.path);
        if bai.exists() {
            return self.load_index_from(bai);
        }
        self.load_index_from(csi_index_path(&self.path))
    }

    /// Loads an index from an explicit sidecar path, picked apart by
    /// extension (`.csi` or `.bai`).
    pub fn load_index_from<P: AsRef<Path>>(&mut self, index_path: P) -> Result<()> {
        let index_path = index_path.as_ref();
        let load_error = |e: io::Error| AlignmentFileError::IndexLoad {
            path: index_path.display().to_string(),
            source: e,
        };

        let is_csi = index_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csi"));

        if is_csi {
            let index = csi::read(index_path).map_err(load_error)?;
            self.index = Some(Box::new(index));
        } else {
            let index = bam::bai::read(index_path).map_err(load_error)?;
            self.index = Some(Box::new(index));
        }

        Ok(())
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Builds the default index sidecar for this handle's file.
    ///
    /// The file on disk must be complete and coordinate-sorted, so for a
    /// write handle this only makes sense after
    /// [`finish`](AlignmentFile::finish). The built index is not loaded;
    /// call [`load_index`](AlignmentFile::load_index) to attach it.
    pub fn build_index(&self, min_shift: u8) -> Result<PathBuf> {
        build_index(&self.path, min_shift)
    }
}

/// Builds an index sidecar for the alignment file at `src`.
///
/// A `min_shift` of zero selects the codec's default: a `.bai` next to the
/// source file. A nonzero `min_shift` produces a `.csi` with that
/// interval-bucket granularity instead. Returns the path of the sidecar that
/// was written. The source must already be coordinate-sorted.
pub fn build_index<P: AsRef<Path>>(src: P, min_shift: u8) -> Result<PathBuf> {
    let src = src.as_ref();
    let dst = if min_shift == 0 {
        default_index_path(src)
    } else {
        csi_index_path(src)
    };
    build_index_to(src, &dst, min_shift)?;
    Ok(dst)
}

/// Builds an index for `src` and writes it to an explicit `dst` path.
pub fn build_index_to<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dst: Q,
    min_shift: u8,
) -> Result<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    let build_error = |e: io::Error| AlignmentFileError::IndexBuild {
        path: src.display().to_string(),
        source: e,
    };

    let file = File::open(src).map_err(|e| AlignmentFileError::Open {
        path: src.display().to_string(),
        source: e,
    })?;
    let mut reader = bam::io::Reader::new(file);
    let header = reader.read_header().map_err(|e| AlignmentFileError::ReadHeader {
        path: src.display().to_string(),
        source: e,
    })?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg} ({pos} records)")
            .unwrap(),
    );
    pb.set_message(format!(
        "Indexing {:?}",
        src.file_name().unwrap_or_default()
    ));

    let mut indexer = match min_shift {
        0 => IndexerKind::Linear(Indexer::default()),
        n => IndexerKind::Binned(Indexer::new(n, CSI_DEPTH)),
    };

    let mut record = bam::Record::default();
    let mut record_count: u64 = 0;
    let mut start_position = reader.get_ref().virtual_position();

    loop {
        match reader.read_record(&mut record).map_err(build_error)? {
            0 => break,
            _ => {}
        }

        let end_position = reader.get_ref().virtual_position();
        let chunk = Chunk::new(start_position, end_position);
        let context = alignment_context(&record).map_err(build_error)?;
        indexer.add_record(context, chunk).map_err(build_error)?;
        start_position = end_position;

        record_count += 1;
        if record_count % 100_000 == 0 {
            pb.set_position(record_count);
        }
    }

    let reference_sequence_count = header.reference_sequences().len();
    indexer
        .build_and_write(reference_sequence_count, dst)
        .map_err(build_error)?;

    pb.finish_with_message(format!("Indexed {} records", record_count));

    Ok(())
}

/// The two index layouts we can emit, wrapped so one record loop serves
/// both.
enum IndexerKind {
    Linear(Indexer<LinearIndex>),
    Binned(Indexer<BinnedIndex>),
}

impl IndexerKind {
    fn add_record(
        &mut self,
        context: Option<(usize, Position, Position, bool)>,
        chunk: Chunk,
    ) -> io::Result<()> {
        match self {
            Self::Linear(indexer) => indexer.add_record(context, chunk).map_err(io::Error::other),
            Self::Binned(indexer) => indexer.add_record(context, chunk).map_err(io::Error::other),
        }
    }

    fn build_and_write(self, reference_sequence_count: usize, dst: &Path) -> io::Result<()> {
        match self {
            Self::Linear(indexer) => {
                let index = indexer.build(reference_sequence_count);
                bam::bai::write(dst, &index)
            }
            Self::Binned(indexer) => {
                let index = indexer.build(reference_sequence_count);
                csi::write(dst, &index)
            }
        }
    }
}

/// Positional context the indexer needs for one record, or `None` for
/// unplaced records.
fn alignment_context(
    record: &bam::Record,
) -> io::Result<Option<(usize, Position, Position, bool)>> {
    let id = match record.reference_sequence_id().transpose()? {
        Some(id) => id,
        None => return Ok(None),
    };
    let start = match record.alignment_start().transpose()? {
        Some(position) => position,
        None => return Ok(None),
    };
    let end = match SamRecord::alignment_end(record).transpose()? {
        Some(position) => position,
        None => return Ok(None),
    };
    let is_mapped = !record.flags().is_unmapped();

    Ok(Some((id, start, end, is_mapped)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::path::PathBuf;

    use super::*;

    #[rstest]
    fn test_default_index_path_appends_bai() {
        assert_eq!(
            default_index_path("data/sample.bam"),
            PathBuf::from("data/sample.bam.bai")
        );
    }

    #[rstest]
    fn test_csi_index_path_appends_csi() {
        assert_eq!(
            csi_index_path(Path::new("sample.bam")),
            PathBuf::from("sample.bam.csi")
        );
    }
}
