use std::io;
use thiserror::Error;

/// Every way interpreting or producing an SF3 buffer can fail.
#[derive(Error, Debug)]
pub enum Sf3Error {
    #[error("Buffer too short for an SF3 identifier ({len} bytes)")]
    TooShort { len: usize },
    #[error("Invalid magic number")]
    BadMagic,
    #[error("Identifier terminator is {0:#04x}, expected 0x00")]
    BadTerminator(u8),
    #[error("Unknown format id: {0:#04x}")]
    UnknownFormat(u8),
    #[error("Truncated field at offset {offset}: needs {needed} bytes, buffer has {len}")]
    Truncated { offset: usize, needed: usize, len: usize },
    #[error("Record at offset {offset} reaches {end}, past the end of the buffer ({len} bytes)")]
    OutOfBounds { offset: usize, end: u64, len: usize },
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("Size mismatch: structure describes {expected} bytes, buffer has {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("String of {len} bytes does not fit a {width}-bit length prefix")]
    LengthOverflow { len: usize, width: u8 },
    #[error("Invalid {what} discriminant {value:#04x}")]
    InvalidDiscriminant { what: &'static str, value: u8 },
    #[error("Malformed string at offset {offset}: {reason}")]
    InvalidString { offset: usize, reason: &'static str },
    #[error("String at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("Layout mismatch for {what}: declared {declared}, found {actual}")]
    LayoutMismatch { what: &'static str, declared: u64, actual: u64 },
    #[error("Log chunk is full (capacity {capacity})")]
    ChunkFull { capacity: u32 },
    #[error("File not found")]
    NotFound,
    #[error("Access denied")]
    AccessDenied,
    #[error("Handle is read-only")]
    ReadOnly,
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Sf3Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound         => Sf3Error::NotFound,
            io::ErrorKind::PermissionDenied => Sf3Error::AccessDenied,
            _                               => Sf3Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Sf3Error>;
