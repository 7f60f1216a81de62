//! File handles: load an SF3 file into memory, edit it, write it back.
//!
//! ```no_run
//! use sf3::io::{OpenMode, Sf3File};
//! use sf3::format::View;
//!
//! let file = Sf3File::open("scene.mod.sf3", OpenMode::Read)?;
//! if let View::Model(model) = file.view()? {
//!     println!("{} vertices", model.vertex_count());
//! }
//! # Ok::<(), sf3::Sf3Error>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Result, Sf3Error};
use crate::format::{self, FormatId, View};
use crate::identifier::{self, IDENTIFIER_SIZE};
use crate::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Read,
    ReadWrite,
}

/// An SF3 file held in memory.  Dropping it releases the buffer; nothing
/// is written back unless [`Sf3File::persist`] is called.
#[derive(Debug)]
pub struct Sf3File {
    path:   Option<PathBuf>,
    mode:   OpenMode,
    format: FormatId,
    data:   Vec<u8>,
}

fn read_only() -> Sf3Error {
    Sf3Error::ReadOnly
}

impl Sf3File {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Load `path`.  Fails if the file does not start with an SF3 identifier
    /// of a known format; structural or checksum problems are only logged.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let mut file = match mode {
            OpenMode::Read      => File::open(&path)?,
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(&path)?,
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let format = FormatId::from_u8(identifier::validate(&data)?)?;
        if let Err(e) = verify::verify(&data) {
            warn!("{}: {}", path.display(), e);
        }
        debug!("opened {} ({}, {} bytes)", path.display(), format.name(), data.len());
        Ok(Self { path: Some(path), mode, format, data })
    }

    /// Wrap an in-memory buffer.  The handle is writable but has no path,
    /// so it can only be persisted to an explicit target.
    pub fn create(data: Vec<u8>) -> Result<Self> {
        let format = FormatId::from_u8(identifier::validate(&data)?)?;
        Ok(Self { path: None, mode: OpenMode::ReadWrite, format, data })
    }

    // ── Access ───────────────────────────────────────────────────────────────

    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }
    pub fn mode(&self) -> OpenMode { self.mode }
    pub fn format_id(&self) -> FormatId { self.format }
    pub fn data(&self) -> &[u8] { &self.data }

    pub fn data_mut(&mut self) -> Result<&mut Vec<u8>> {
        match self.mode {
            OpenMode::ReadWrite => Ok(&mut self.data),
            OpenMode::Read      => Err(read_only()),
        }
    }

    pub fn view(&self) -> Result<View<'_>> {
        format::decode(&self.data)
    }

    pub fn verify(&self) -> Result<FormatId> {
        verify::verify(&self.data)
    }

    // ── Persist ──────────────────────────────────────────────────────────────

    /// Finalize and write the file.
    ///
    /// `None` rewrites the file this handle was opened from and needs
    /// [`OpenMode::ReadWrite`]; `Some(target)` writes a finalized copy to
    /// `target` and leaves the handle untouched.  Either way the target is
    /// truncated to the file's size, which is returned.
    pub fn persist(&mut self, target: Option<&Path>) -> Result<usize> {
        match target {
            None => {
                if self.mode == OpenMode::Read {
                    return Err(read_only());
                }
                let path = self.path.clone().ok_or(Sf3Error::NotFound)?;
                let size = verify::finalize(&mut self.data, self.format)?;
                self.data.truncate(size);
                write_all(&path, &self.data)?;
                Ok(size)
            }
            Some(path) => {
                let mut copy = self.data.clone();
                let size = verify::finalize(&mut copy, self.format)?;
                write_all(path, &copy[..size])?;
                Ok(size)
            }
        }
    }
}

fn write_all(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    debug!("wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Format of the file at `path`, from its identifier alone.
pub fn tell<P: AsRef<Path>>(path: P) -> Result<FormatId> {
    let mut head = Vec::with_capacity(IDENTIFIER_SIZE);
    File::open(path.as_ref())?
        .take(IDENTIFIER_SIZE as u64)
        .read_to_end(&mut head)?;
    FormatId::from_u8(identifier::validate(&head)?)
}

/// Read and fully verify `path`.
pub fn verify_path<P: AsRef<Path>>(path: P) -> Result<FormatId> {
    verify::verify(&fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::text::TextBuilder;

    #[test]
    fn test_create_rejects_non_sf3() {
        assert!(matches!(Sf3File::create(vec![0u8; 32]), Err(Sf3Error::BadMagic)));
        assert!(matches!(Sf3File::create(vec![1, 2, 3]), Err(Sf3Error::TooShort { len: 3 })));
    }

    #[test]
    fn test_in_memory_handle_needs_explicit_target() {
        let buf = TextBuilder::new().finish("hi").unwrap();
        let mut file = Sf3File::create(buf).unwrap();
        assert_eq!(file.format_id(), FormatId::Text);
        assert!(matches!(file.persist(None), Err(Sf3Error::NotFound)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            Sf3File::open("/nonexistent/file.txt.sf3", OpenMode::Read),
            Err(Sf3Error::NotFound)
        ));
    }
}
