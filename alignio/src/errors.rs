use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlignmentFileError {
    #[error("Can't open alignment file {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("Can't read header from {path}: {source}")]
    ReadHeader { path: String, source: io::Error },

    #[error("Handle was opened for writing; operation needs read mode")]
    NotReadable,

    #[error("Handle was opened for reading; operation needs write mode")]
    NotWritable,

    #[error("Handle has already been closed")]
    Closed,

    #[error("No header present on this handle")]
    MissingHeader,

    #[error("No index loaded; call load_index or load_index_from first")]
    IndexNotLoaded,

    #[error("Can't load index from {path}: {source}")]
    IndexLoad { path: String, source: io::Error },

    #[error("Error building index for {path}: {source}")]
    IndexBuild { path: String, source: io::Error },

    #[error("Error parsing region: {0}")]
    RegionParse(String),

    #[error("Unknown reference sequence: {0}")]
    UnknownReferenceSequence(String),

    #[error("Invalid reference sequence id: {0}")]
    InvalidReferenceSequenceId(usize),

    #[error("No active region query; call set_region first")]
    NoActiveRegion,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AlignmentFileError>;
