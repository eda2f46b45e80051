use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Result;
use bstr::BString;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record::{Flags, MappingQuality};
use noodles::sam::header::record::value::{Map, map::ReferenceSequence};
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::errors::AlignmentFileError;
use crate::{AlignedRead, AlignmentFile, build_index};

// ============================================================================
// Fixtures
// ============================================================================

#[fixture]
fn scratch() -> TempDir {
    tempfile::tempdir().unwrap()
}

fn two_reference_header() -> sam::Header {
    sam::Header::builder()
        .add_reference_sequence(
            BString::from("chr1"),
            Map::<ReferenceSequence>::new(NonZeroUsize::new(1000).unwrap()),
        )
        .add_reference_sequence(
            BString::from("chr2"),
            Map::<ReferenceSequence>::new(NonZeroUsize::new(500).unwrap()),
        )
        .build()
}

/// A mapped 4-base read; every record in the fixtures spans 4 reference
/// positions.
fn read_at(name: &str, reference: &str, start: usize) -> AlignedRead {
    AlignedRead::new()
        .with_name(name)
        .with_flags(Flags::empty())
        .with_reference(reference, Position::new(start).unwrap())
        .with_mapping_quality(MappingQuality::new(40).unwrap())
        .with_cigar(vec![Op::new(Kind::Match, 4)])
        .with_sequence(b"ACGT".to_vec(), vec![30, 30, 30, 30])
}

/// Writes a small coordinate-sorted file and returns the records it holds.
fn write_sorted_fixture(path: &Path) -> Vec<AlignedRead> {
    let reads = vec![
        read_at("r1", "chr1", 100),
        read_at("r2", "chr1", 500),
        read_at("r3", "chr2", 50),
    ];

    let mut out = AlignmentFile::writer(path).unwrap();
    out.set_header(two_reference_header());
    out.write_header().unwrap();
    for read in &reads {
        out.write_record(read).unwrap();
    }
    out.finish().unwrap();

    reads
}

fn collect_region(file: &mut AlignmentFile) -> Vec<AlignedRead> {
    let mut out = Vec::new();
    let mut read = AlignedRead::default();
    while file.read_region_into(&mut read).unwrap() {
        out.push(read.clone());
    }
    out
}

fn names(reads: &[AlignedRead]) -> Vec<String> {
    reads.iter().filter_map(|r| r.name.clone()).collect()
}

// ============================================================================
// Sequential read/write
// ============================================================================

#[rstest]
fn test_write_then_reopen_and_read(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");

    let written = read_at("r1", "chr1", 100);
    let mut out = AlignmentFile::writer(&path)?;
    out.set_header(two_reference_header());
    out.write_header()?;
    out.write_record(&written)?;
    out.finish()?;

    let mut file = AlignmentFile::reader(&path)?;
    // Read-mode handles always have a header immediately after open.
    let header = file.header().expect("header after open");
    assert_eq!(header.reference_sequences().len(), 2);

    let mut read = AlignedRead::default();
    assert!(file.read_record_into(&mut read)?);
    assert_eq!(read, written);
    assert_eq!(read.reference_name.as_deref(), Some("chr1"));
    assert_eq!(read.alignment_start, Position::new(100));

    Ok(())
}

#[rstest]
fn test_end_of_stream_is_sticky(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);

    let mut file = AlignmentFile::reader(&path).unwrap();
    while file.read_record().unwrap() {}

    assert!(file.is_at_end());
    // Once the stream has ended, every further read keeps failing the same
    // way.
    assert!(!file.read_record().unwrap());
    assert!(!file.read_record().unwrap());
    assert!(file.is_at_end());
}

#[rstest]
fn test_read_on_write_handle_fails(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    let mut out = AlignmentFile::writer(&path).unwrap();
    out.set_header(two_reference_header());

    assert!(matches!(
        out.read_record(),
        Err(AlignmentFileError::NotReadable)
    ));
}

#[rstest]
fn test_write_header_requires_header(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    let mut out = AlignmentFile::writer(&path).unwrap();

    assert!(matches!(
        out.write_header(),
        Err(AlignmentFileError::MissingHeader)
    ));
}

#[rstest]
fn test_finish_is_idempotent(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    let mut out = AlignmentFile::writer(&path).unwrap();
    out.set_header(two_reference_header());
    out.write_header().unwrap();

    out.finish().unwrap();
    out.finish().unwrap();

    assert!(matches!(
        out.write_record(&read_at("r1", "chr1", 100)),
        Err(AlignmentFileError::Closed)
    ));
}

// ============================================================================
// Header propagation
// ============================================================================

#[rstest]
fn test_copy_header_between_handles(scratch: TempDir) -> Result<()> {
    let src_path = scratch.path().join("src.bam");
    let dst_path = scratch.path().join("dst.bam");
    write_sorted_fixture(&src_path);

    let source = AlignmentFile::reader(&src_path)?;
    let mut out = AlignmentFile::writer(&dst_path)?;
    out.copy_header_from(&source)?;
    out.write_header()?;

    // Every reference name the source knows is writable through the copy.
    out.write_record(&read_at("c1", "chr1", 10))?;
    out.write_record(&read_at("c2", "chr2", 20))?;

    // Names absent from the copied header are rejected before writing.
    let err = out.write_record(&read_at("c3", "chrX", 30)).unwrap_err();
    assert!(matches!(
        err,
        AlignmentFileError::UnknownReferenceSequence(name) if name == "chrX"
    ));

    out.finish()?;

    let mut file = AlignmentFile::reader(&dst_path)?;
    let mut read = AlignedRead::default();
    let mut seen = Vec::new();
    while file.read_record_into(&mut read)? {
        seen.push(read.name.clone().unwrap());
    }
    assert_eq!(seen, vec!["c1", "c2"]);

    Ok(())
}

#[rstest]
fn test_native_record_passthrough(scratch: TempDir) -> Result<()> {
    let src_path = scratch.path().join("src.bam");
    let dst_path = scratch.path().join("dst.bam");
    let written = write_sorted_fixture(&src_path);

    let mut source = AlignmentFile::reader(&src_path)?;
    let mut out = AlignmentFile::writer(&dst_path)?;
    out.copy_header_from(&source)?;
    out.write_header()?;

    // Copy records across without a decode/encode round trip.
    while source.read_record()? {
        out.copy_record_from(&source);
        out.write_current_record()?;
    }
    out.finish()?;

    let mut file = AlignmentFile::reader(&dst_path)?;
    let mut read = AlignedRead::default();
    let mut copied = Vec::new();
    while file.read_record_into(&mut read)? {
        copied.push(read.clone());
    }
    assert_eq!(copied, written);

    Ok(())
}

// ============================================================================
// Index build/load and region queries
// ============================================================================

#[rstest]
fn test_build_index_writes_default_sidecar(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);

    let sidecar = build_index(&path, 0).unwrap();
    assert_eq!(sidecar, PathBuf::from(format!("{}.bai", path.display())));
    assert!(sidecar.exists());
}

#[rstest]
fn test_region_query_hit_and_miss(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);
    build_index(&path, 0)?;

    let mut file = AlignmentFile::reader(&path)?;
    file.load_index()?;
    assert!(file.has_index());

    file.set_region("chr1:50-150")?;
    assert_eq!(names(&collect_region(&mut file)), vec!["r1"]);

    file.set_region("chr1:200-300")?;
    assert!(collect_region(&mut file).is_empty());

    file.set_region("chr2:40-60")?;
    assert_eq!(names(&collect_region(&mut file)), vec!["r3"]);

    Ok(())
}

#[rstest]
fn test_region_query_matches_sequential_scan(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);
    build_index(&path, 0)?;

    let (region_name, start, end) = ("chr1", 1, 1000);

    let mut indexed = AlignmentFile::reader(&path)?;
    indexed.load_index()?;
    indexed.set_region_parts(region_name, start, end)?;
    let from_index = collect_region(&mut indexed);

    // Ground truth: full scan with manual overlap filtering. Every fixture
    // read spans 4 positions.
    let mut sequential = AlignmentFile::reader(&path)?;
    let mut read = AlignedRead::default();
    let mut from_scan = Vec::new();
    while sequential.read_record_into(&mut read)? {
        if read.reference_name.as_deref() != Some(region_name) {
            continue;
        }
        let record_start = read.alignment_start.unwrap().get();
        let record_end = record_start + 3;
        if record_start <= end && record_end >= start {
            from_scan.push(read.clone());
        }
    }

    assert_eq!(from_index, from_scan);
    assert_eq!(names(&from_index), vec!["r1", "r2"]);

    Ok(())
}

#[rstest]
fn test_set_region_replaces_previous_query(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);
    build_index(&path, 0)?;

    let mut file = AlignmentFile::reader(&path)?;
    file.load_index()?;

    // Abandon the first query halfway through; the second must fully
    // supersede it.
    file.set_region("chr1")?;
    assert!(file.read_region()?);

    file.set_region("chr2")?;
    assert_eq!(names(&collect_region(&mut file)), vec!["r3"]);
    assert!(!file.read_region()?);

    Ok(())
}

#[rstest]
fn test_set_region_without_index_fails(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);

    let mut file = AlignmentFile::reader(&path)?;
    let err = file.set_region("chr1:50-150").unwrap_err();
    assert!(matches!(err, AlignmentFileError::IndexNotLoaded));
    assert!(!file.has_active_region());

    // The handle is still good for sequential reading, from the start.
    let mut read = AlignedRead::default();
    assert!(file.read_record_into(&mut read)?);
    assert_eq!(read.name.as_deref(), Some("r1"));

    Ok(())
}

#[rstest]
fn test_unknown_reference_region_is_recoverable(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);
    build_index(&path, 0)?;

    let mut file = AlignmentFile::reader(&path)?;
    file.load_index()?;

    let err = file.set_region("chrX:1-10").unwrap_err();
    assert!(matches!(
        err,
        AlignmentFileError::UnknownReferenceSequence(name) if name == "chrX"
    ));

    // Header and sequential-read position are untouched.
    assert_eq!(file.header().unwrap().reference_sequences().len(), 2);
    let mut read = AlignedRead::default();
    assert!(file.read_record_into(&mut read)?);
    assert_eq!(read.name.as_deref(), Some("r1"));

    Ok(())
}

#[rstest]
fn test_malformed_region_text_is_rejected(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);
    build_index(&path, 0).unwrap();

    let mut file = AlignmentFile::reader(&path).unwrap();
    file.load_index().unwrap();

    assert!(file.set_region("").is_err());
    assert!(file.set_region("chr1:x-y").is_err());
}

#[rstest]
fn test_read_region_without_query_is_a_usage_error(scratch: TempDir) {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);

    let mut file = AlignmentFile::reader(&path).unwrap();
    assert!(matches!(
        file.read_region(),
        Err(AlignmentFileError::NoActiveRegion)
    ));
}

#[rstest]
fn test_region_query_by_reference_id(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);
    build_index(&path, 0)?;

    let mut file = AlignmentFile::reader(&path)?;
    file.load_index()?;

    file.set_region_id(1, 1, 500)?;
    assert_eq!(names(&collect_region(&mut file)), vec!["r3"]);

    let err = file.set_region_id(9, 1, 10).unwrap_err();
    assert!(matches!(
        err,
        AlignmentFileError::InvalidReferenceSequenceId(9)
    ));

    Ok(())
}

#[rstest]
fn test_csi_index_with_custom_shift(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);

    let sidecar = build_index(&path, 12)?;
    assert_eq!(sidecar, PathBuf::from(format!("{}.csi", path.display())));
    assert!(sidecar.exists());

    let mut file = AlignmentFile::reader(&path)?;
    file.load_index_from(&sidecar)?;
    file.set_region("chr1:450-550")?;
    assert_eq!(names(&collect_region(&mut file)), vec!["r2"]);

    Ok(())
}

#[rstest]
fn test_load_index_failure_leaves_handle_usable(scratch: TempDir) -> Result<()> {
    let path = scratch.path().join("a.bam");
    write_sorted_fixture(&path);

    let mut file = AlignmentFile::reader(&path)?;
    let err = file.load_index().unwrap_err();
    assert!(matches!(err, AlignmentFileError::IndexLoad { .. }));
    assert!(!file.has_index());

    let mut read = AlignedRead::default();
    assert!(file.read_record_into(&mut read)?);

    Ok(())
}
