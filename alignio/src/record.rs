//! Owned alignment records and the bridge to the native representation.
//!
//! [`AlignedRead`] is the value callers keep: every field is copied out of
//! the handle's native buffer, nothing borrows from it, and reference
//! sequences are carried by name so a record can be re-targeted at another
//! handle's header. Translation in both directions lives here.

use bstr::BString;
use noodles::bam;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::cigar::op::Op;
use noodles::sam::alignment::record::{Flags, MappingQuality};
use noodles::sam::alignment::record_buf::{Cigar, Data, QualityScores, Sequence};

use crate::errors::{AlignmentFileError, Result};

/// A single read-to-reference mapping, fully owned by the caller.
///
/// # Example
/// ```
/// use alignio::AlignedRead;
/// use noodles::core::Position;
///
/// let read = AlignedRead::new()
///     .with_name("read001")
///     .with_reference("chr1", Position::new(100).unwrap())
///     .with_sequence(b"ACGT".to_vec(), vec![30, 30, 30, 30]);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignedRead {
    /// Read (query template) name.
    pub name: Option<String>,
    /// SAM flags.
    pub flags: Flags,
    /// Name of the reference sequence this read maps to.
    pub reference_name: Option<String>,
    /// 1-based leftmost mapping position.
    pub alignment_start: Option<Position>,
    pub mapping_quality: Option<MappingQuality>,
    /// CIGAR operations, empty for unmapped reads.
    pub cigar: Vec<Op>,
    /// Name of the mate's reference sequence.
    pub mate_reference_name: Option<String>,
    /// 1-based leftmost mapping position of the mate.
    pub mate_alignment_start: Option<Position>,
    pub template_length: i32,
    /// Read bases.
    pub sequence: Vec<u8>,
    /// Per-base quality scores, without the ASCII offset.
    pub quality_scores: Vec<u8>,
    /// Auxiliary tag fields, owned.
    pub data: Data,
}

impl AlignedRead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_reference<S: Into<String>>(mut self, name: S, start: Position) -> Self {
        self.reference_name = Some(name.into());
        self.alignment_start = Some(start);
        self
    }

    pub fn with_mapping_quality(mut self, mapping_quality: MappingQuality) -> Self {
        self.mapping_quality = Some(mapping_quality);
        self
    }

    pub fn with_cigar(mut self, cigar: Vec<Op>) -> Self {
        self.cigar = cigar;
        self
    }

    pub fn with_mate<S: Into<String>>(mut self, name: S, start: Position) -> Self {
        self.mate_reference_name = Some(name.into());
        self.mate_alignment_start = Some(start);
        self
    }

    pub fn with_template_length(mut self, template_length: i32) -> Self {
        self.template_length = template_length;
        self
    }

    pub fn with_sequence(mut self, sequence: Vec<u8>, quality_scores: Vec<u8>) -> Self {
        self.sequence = sequence;
        self.quality_scores = quality_scores;
        self
    }

    /// Copies a native record out into an owned value.
    ///
    /// The header is consulted to turn reference ids back into names. No
    /// part of the result borrows from `record`, so it stays valid after
    /// the buffer is overwritten by the next read.
    pub fn from_record(header: &sam::Header, record: &bam::Record) -> Result<Self> {
        let buf = RecordBuf::try_from_alignment_record(header, record)?;
        Self::from_record_buf(header, &buf)
    }

    pub(crate) fn from_record_buf(header: &sam::Header, buf: &RecordBuf) -> Result<Self> {
        let reference_name = buf
            .reference_sequence_id()
            .map(|id| reference_sequence_name(header, id))
            .transpose()?;
        let mate_reference_name = buf
            .mate_reference_sequence_id()
            .map(|id| reference_sequence_name(header, id))
            .transpose()?;

        Ok(Self {
            name: buf.name().map(|name| name.to_string()),
            flags: buf.flags(),
            reference_name,
            alignment_start: buf.alignment_start(),
            mapping_quality: buf.mapping_quality(),
            cigar: buf.cigar().as_ref().to_vec(),
            mate_reference_name,
            mate_alignment_start: buf.mate_alignment_start(),
            template_length: buf.template_length(),
            sequence: buf.sequence().as_ref().to_vec(),
            quality_scores: buf.quality_scores().as_ref().to_vec(),
            data: buf.data().clone(),
        })
    }

    /// Builds the native representation of this read under `header`.
    ///
    /// Reference and mate reference names are resolved against the header's
    /// reference table; a name the header doesn't know fails the call, so
    /// nothing half-translated ever reaches a writer.
    pub fn to_record_buf(&self, header: &sam::Header) -> Result<RecordBuf> {
        let mut builder = RecordBuf::builder()
            .set_flags(self.flags)
            .set_template_length(self.template_length);

        if let Some(name) = &self.name {
            builder = builder.set_name(BString::from(name.as_str()));
        }

        if let Some(reference_name) = &self.reference_name {
            let id = resolve_reference_name(header, reference_name)?;
            builder = builder.set_reference_sequence_id(id);
        }

        if let Some(start) = self.alignment_start {
            builder = builder.set_alignment_start(start);
        }

        if let Some(mapping_quality) = self.mapping_quality {
            builder = builder.set_mapping_quality(mapping_quality);
        }

        if !self.cigar.is_empty() {
            builder = builder.set_cigar(Cigar::from(self.cigar.clone()));
        }

        if let Some(mate_reference_name) = &self.mate_reference_name {
            let id = resolve_reference_name(header, mate_reference_name)?;
            builder = builder.set_mate_reference_sequence_id(id);
        }

        if let Some(mate_start) = self.mate_alignment_start {
            builder = builder.set_mate_alignment_start(mate_start);
        }

        if !self.sequence.is_empty() {
            builder = builder.set_sequence(Sequence::from(self.sequence.clone()));
        }

        if !self.quality_scores.is_empty() {
            builder = builder.set_quality_scores(QualityScores::from(self.quality_scores.clone()));
        }

        builder = builder.set_data(self.data.clone());

        Ok(builder.build())
    }
}

/// Looks up the positional index of `name` in the header's reference table.
pub(crate) fn reference_sequence_index(header: &sam::Header, name: &[u8]) -> Option<usize> {
    header
        .reference_sequences()
        .keys()
        .position(|n| n.as_slice() == name)
}

fn resolve_reference_name(header: &sam::Header, name: &str) -> Result<usize> {
    reference_sequence_index(header, name.as_bytes())
        .ok_or_else(|| AlignmentFileError::UnknownReferenceSequence(name.to_string()))
}

fn reference_sequence_name(header: &sam::Header, id: usize) -> Result<String> {
    header
        .reference_sequences()
        .get_index(id)
        .map(|(name, _)| String::from_utf8_lossy(name.as_slice()).into_owned())
        .ok_or(AlignmentFileError::InvalidReferenceSequenceId(id))
}
