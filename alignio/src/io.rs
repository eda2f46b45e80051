use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Filename that binds a handle to the process's standard streams.
pub const STDIO_PATH: &str = "-";

pub(crate) fn is_stdio_path(path: &Path) -> bool {
    path == Path::new(STDIO_PATH)
}

/// Raw byte source under the BGZF reader: a regular file or standard input.
pub(crate) enum RawSource {
    File(File),
    Stdin(io::Stdin),
}

impl RawSource {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        if is_stdio_path(path) {
            Ok(Self::Stdin(io::stdin()))
        } else {
            File::open(path).map(Self::File)
        }
    }
}

impl Read for RawSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(f) => f.read(buf),
            Self::Stdin(s) => s.read(buf),
        }
    }
}

impl Seek for RawSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::File(f) => f.seek(pos),
            Self::Stdin(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "can't seek on standard input",
            )),
        }
    }
}

/// Raw byte sink under the BGZF writer: a regular file or standard output.
pub(crate) enum RawSink {
    File(File),
    Stdout(io::Stdout),
}

impl RawSink {
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        if is_stdio_path(path) {
            Ok(Self::Stdout(io::stdout()))
        } else {
            File::create(path).map(Self::File)
        }
    }
}

impl Write for RawSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::File(f) => f.write(buf),
            Self::Stdout(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(f) => f.flush(),
            Self::Stdout(s) => s.flush(),
        }
    }
}
