//! Region queries over an indexed file.
//!
//! A query resolves a region against the handle's header, asks the loaded
//! index for the chunks that may contain overlapping records, and installs a
//! [`RegionScan`] on the handle. The scan owns all of its state (chunk list,
//! cursor, query interval), so it lives inside the handle alongside the
//! reader it drives; each [`AlignmentFile::set_region`] replaces the
//! previous scan wholesale. Scans are lazy, finite, and not restartable;
//! re-querying means calling `set_region` again.

use std::io;

use noodles::bam;
use noodles::bgzf;
use noodles::core::region::Interval;
use noodles::core::{Position, Region};
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::sam::alignment::Record as SamRecord;

use crate::errors::{AlignmentFileError, Result};
use crate::file::{AlignmentFile, Stream};
use crate::io::RawSource;
use crate::record::{AlignedRead, reference_sequence_index};

impl AlignmentFile {
    /// Starts a region query from a textual region.
    ///
    /// Accepts the conventional forms `"chr"`, `"chr:start"`, and
    /// `"chr:start-end"` with 1-based inclusive coordinates. Requires a
    /// loaded index; the previous query, if any, is destroyed first. On
    /// failure the handle's sequential-read state is left untouched.
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        let region: Region = region
            .parse()
            .map_err(|e| AlignmentFileError::RegionParse(format!("{}: {}", region, e)))?;
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        let reference_sequence_id = reference_sequence_index(header, region.name())
            .ok_or_else(|| {
                AlignmentFileError::UnknownReferenceSequence(region.name().to_string())
            })?;
        self.query_region(reference_sequence_id, region.interval())
    }

    /// Starts a region query from a reference name and 1-based inclusive
    /// coordinates.
    pub fn set_region_parts(&mut self, name: &str, start: usize, end: usize) -> Result<()> {
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        let reference_sequence_id = reference_sequence_index(header, name.as_bytes())
            .ok_or_else(|| AlignmentFileError::UnknownReferenceSequence(name.to_string()))?;
        let interval = parse_interval(start, end)?;
        self.query_region(reference_sequence_id, interval)
    }

    /// Starts a region query from a numeric reference sequence id.
    pub fn set_region_id(
        &mut self,
        reference_sequence_id: usize,
        start: usize,
        end: usize,
    ) -> Result<()> {
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        if reference_sequence_id >= header.reference_sequences().len() {
            return Err(AlignmentFileError::InvalidReferenceSequenceId(
                reference_sequence_id,
            ));
        }
        let interval = parse_interval(start, end)?;
        self.query_region(reference_sequence_id, interval)
    }

    fn query_region(&mut self, reference_sequence_id: usize, interval: Interval) -> Result<()> {
        // Drop the previous iterator before anything can fail.
        self.scan = None;

        if self.finished {
            return Err(AlignmentFileError::Closed);
        }
        if !matches!(self.stream, Stream::Reader(_)) {
            return Err(AlignmentFileError::NotReadable);
        }
        let index = self.index.as_ref().ok_or(AlignmentFileError::IndexNotLoaded)?;
        let chunks = index.query(reference_sequence_id, interval)?;
        self.scan = Some(RegionScan::new(chunks, reference_sequence_id, interval));
        Ok(())
    }

    /// True while a region query is active on this handle.
    pub fn has_active_region(&self) -> bool {
        self.scan.is_some()
    }

    /// Advances the active region query one record.
    ///
    /// On success the matching record is in the handle's native buffer.
    /// Returns `Ok(false)` once the region is exhausted. Calling this with
    /// no active query is a usage error.
    pub fn read_region(&mut self) -> Result<bool> {
        if self.finished {
            return Err(AlignmentFileError::Closed);
        }
        let scan = self.scan.as_mut().ok_or(AlignmentFileError::NoActiveRegion)?;
        let reader = match &mut self.stream {
            Stream::Reader(r) => r,
            Stream::Writer(_) => return Err(AlignmentFileError::NotReadable),
        };
        scan.advance(reader, &mut self.record)
    }

    /// Advances the active region query and copies the record out into
    /// `read`.
    ///
    /// On exhaustion, `read` is left untouched and `Ok(false)` is returned.
    pub fn read_region_into(&mut self, read: &mut AlignedRead) -> Result<bool> {
        if !self.read_region()? {
            return Ok(false);
        }
        let header = self
            .header
            .as_ref()
            .ok_or(AlignmentFileError::MissingHeader)?;
        *read = AlignedRead::from_record(header, &self.record)?;
        Ok(true)
    }
}

fn parse_interval(start: usize, end: usize) -> Result<Interval> {
    let start = Position::new(start).ok_or_else(|| {
        AlignmentFileError::RegionParse(format!("invalid start position: {}", start))
    })?;
    let end = Position::new(end).ok_or_else(|| {
        AlignmentFileError::RegionParse(format!("invalid end position: {}", end))
    })?;
    Ok(Interval::from(start..=end))
}

enum ScanState {
    Seek,
    Read,
    Done,
}

/// Owned state of one in-flight region query.
///
/// Walks the chunk list the index returned for the query interval: seek to
/// the chunk start, decode records until the reader's virtual position
/// passes the chunk end, move to the next chunk. Records are filtered by
/// coordinate overlap on the way out, so callers only ever see records
/// touching the query interval, in on-disk order.
pub(crate) struct RegionScan {
    chunks: Vec<Chunk>,
    current: usize,
    state: ScanState,
    reference_sequence_id: usize,
    interval: Interval,
}

impl RegionScan {
    pub(crate) fn new(
        chunks: Vec<Chunk>,
        reference_sequence_id: usize,
        interval: Interval,
    ) -> Self {
        Self {
            chunks,
            current: 0,
            state: ScanState::Seek,
            reference_sequence_id,
            interval,
        }
    }

    pub(crate) fn advance(
        &mut self,
        reader: &mut bam::io::Reader<bgzf::Reader<RawSource>>,
        record: &mut bam::Record,
    ) -> Result<bool> {
        loop {
            match self.state {
                ScanState::Seek => {
                    let Some(chunk) = self.chunks.get(self.current) else {
                        self.state = ScanState::Done;
                        return Ok(false);
                    };
                    reader.get_mut().seek(chunk.start())?;
                    self.state = ScanState::Read;
                }
                ScanState::Read => {
                    let chunk = self.chunks[self.current];
                    if reader.get_ref().virtual_position() >= chunk.end() {
                        self.current += 1;
                        self.state = ScanState::Seek;
                        continue;
                    }
                    if reader.read_record(record)? == 0 {
                        self.state = ScanState::Done;
                        return Ok(false);
                    }
                    if intersects(record, self.reference_sequence_id, self.interval)? {
                        return Ok(true);
                    }
                }
                ScanState::Done => return Ok(false),
            }
        }
    }
}

/// Does the record's alignment overlap the queried interval?
fn intersects(
    record: &bam::Record,
    reference_sequence_id: usize,
    interval: Interval,
) -> io::Result<bool> {
    let id = match record.reference_sequence_id().transpose()? {
        Some(id) => id,
        None => return Ok(false),
    };
    if id != reference_sequence_id {
        return Ok(false);
    }
    let start = match record.alignment_start().transpose()? {
        Some(position) => position,
        None => return Ok(false),
    };
    let end = match SamRecord::alignment_end(record).transpose()? {
        Some(position) => position,
        None => return Ok(false),
    };
    Ok(interval.intersects(Interval::from(start..=end)))
}
