//! # alignio: streaming and indexed access to BAM alignment files
//!
//! ## Overview
//!
//! alignio gives downstream genomics tooling one uniform handle over an
//! alignment file: open it for reading or writing, move the header around,
//! stream records one at a time, and, when an index sidecar is present,
//! jump straight to the records overlapping a genomic region. All encoding,
//! compression, and index-format details are delegated to the
//! [`noodles`] codec crates; this crate owns the resource lifecycle and the
//! region-query machinery on top of them.
//!
//! ## Key pieces
//!
//! - [`AlignmentFile`] - one open file: mode-fixed handle, owned header,
//!   reusable native-record buffer, optional index and region scan
//! - [`AlignedRead`] - the owned, typed record callers keep; reference
//!   sequences are carried by name so records move cleanly between handles
//! - [`build_index`] / [`AlignmentFile::load_index`] - create or attach the
//!   `.bai`/`.csi` sidecar that makes region queries possible
//!
//! ## Example Workflow
//!
//! ```no_run
//! use alignio::{build_index, AlignedRead, AlignmentFile};
//!
//! # fn main() -> alignio::Result<()> {
//! // Stream every record
//! let mut bam = AlignmentFile::reader("sample.bam")?;
//! let mut read = AlignedRead::default();
//! while bam.read_record_into(&mut read)? {
//!     // read is fully owned; keep it as long as you like
//! }
//!
//! // Or only the records touching a region
//! build_index("sample.bam", 0)?;
//! let mut bam = AlignmentFile::reader("sample.bam")?;
//! bam.load_index()?;
//! bam.set_region("chr1:10000-20000")?;
//! while bam.read_region_into(&mut read)? {
//!     // records overlapping chr1:10000-20000, in on-disk order
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A handle is single-threaded by construction: every I/O call takes
//! `&mut self` and decoded bytes land in one reusable buffer inside the
//! handle. Parallel region scans mean opening independent handles; index
//! sidecars are safely shared read-only.

pub mod errors;
pub mod file;
pub mod index;
mod io;
pub mod query;
pub mod record;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use errors::{AlignmentFileError, Result};
pub use file::{AlignmentFile, Mode};
pub use index::{build_index, build_index_to, default_index_path};
pub use io::STDIO_PATH;
pub use record::AlignedRead;
