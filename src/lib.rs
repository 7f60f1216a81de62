pub mod bytes;
pub mod error;
pub mod format;
pub mod identifier;
pub mod io;
pub mod string;
pub mod verify;

pub use error::{Result, Sf3Error};
pub use format::{compute_size, decode, FormatId, View};
pub use identifier::{validate, Identifier, IDENTIFIER_SIZE, MAGIC};
pub use io::{OpenMode, Sf3File};
pub use string::StrWidth;
pub use verify::{check_checksum, crc32, finalize, verify, verify_with, VerifyOptions};
