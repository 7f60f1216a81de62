//! Multi-file archive.
//!
//! Layout after the identifier:
//!
//! ```text
//! count u64 | metadata_size u64
//! ┌ metadata block (metadata_size bytes) ───────────────────────┐
//! │ entry_offset u64[count] | Meta{modtime, checksum, mime, path}… │
//! └──────────────────────────────────────────────────────────────┘
//! file_offset u64[count] | File{length u64, data}…
//! ```
//!
//! Entry offsets are relative to the end of the `entry_offset` table, file
//! offsets to the end of the `file_offset` table.

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, trace};

use super::{expect_format, FormatId, View};
use crate::bytes::{self, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::string::{self, StrWidth};
use crate::verify;

pub const HEADER_SIZE: usize = 32;

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveMeta<'a> {
    /// Seconds since the UNIX epoch.
    pub modtime:   i64,
    /// CRC32 of the file payload.
    pub checksum:  u32,
    pub mime_type: &'a str,
    pub path:      &'a str,
}

impl<'a> ArchiveMeta<'a> {
    pub fn read(data: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let mut r = Reader::at(data, offset);
        let modtime   = r.i64()?;
        let checksum  = r.u32()?;
        let mime_type = r.str(StrWidth::W8)?;
        let path      = r.str(StrWidth::W16)?;
        Ok((Self { modtime, checksum, mime_type, path }, r.position()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveFile<'a> {
    /// Absolute offset of the file record.
    pub offset: usize,
    pub data:   &'a [u8],
}

impl<'a> ArchiveFile<'a> {
    pub fn read(data: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let length = bytes::u64_at(data, offset)?;
        let start = offset + 8;
        let end = bytes::record_end(data, start, length)?;
        Ok((Self { offset, data: &data[start..end] }, end))
    }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

/// End of the file record at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    ArchiveFile::read(data, offset).map(|(_, end)| end)
}

// ── ArchiveView ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ArchiveView<'a> {
    data:          &'a [u8],
    count:         u64,
    metadata_size: u64,
    /// End of the metadata block, i.e. start of the file offset table.
    meta_end:      usize,
    size:          usize,
}

fn table_len(count: u64, offset: usize, len: usize) -> Result<u64> {
    bytes::checked_product(offset, len, &[count, 8])
}

impl<'a> ArchiveView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let count         = r.u64()?;
        let metadata_size = r.u64()?;

        let meta_end = bytes::record_end(data, HEADER_SIZE, metadata_size)?;
        let entry_table = table_len(count, HEADER_SIZE, data.len())?;
        if entry_table > metadata_size {
            return Err(Sf3Error::LayoutMismatch {
                what:     "archive metadata size",
                declared: metadata_size,
                actual:   entry_table,
            });
        }
        let meta_base = HEADER_SIZE + entry_table as usize;
        let table_end = bytes::record_end(data, meta_end, table_len(count, meta_end, data.len())?)?;

        let meta_block = &data[..meta_end];
        let mut size = table_end;
        for i in 0..count as usize {
            let rel = bytes::u64_at(data, HEADER_SIZE + 8 * i)?;
            let at = bytes::record_end(meta_block, meta_base, rel)?;
            ArchiveMeta::read(meta_block, at)?;

            let rel = bytes::u64_at(data, meta_end + 8 * i)?;
            let at = bytes::record_end(data, table_end, rel)?;
            size = size.max(advance(data, at)?);
        }
        trace!("archive: {count} files, metadata {metadata_size} bytes, {size} bytes total");
        Ok(Self { data, count, metadata_size, meta_end, size })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Archive)?;
        Self::new(data)
    }

    pub fn count(&self) -> u64 { self.count }
    pub fn metadata_size(&self) -> u64 { self.metadata_size }
    pub fn size(&self) -> usize { self.size }

    /// Offset of the first file record.
    pub fn first(&self) -> usize { self.table_end() }

    fn meta_base(&self) -> usize { HEADER_SIZE + 8 * self.count as usize }

    fn table_end(&self) -> usize { self.meta_end + 8 * self.count as usize }

    pub fn meta(&self, index: u64) -> Option<ArchiveMeta<'a>> {
        if index >= self.count {
            return None;
        }
        let rel = bytes::u64_at(self.data, HEADER_SIZE + 8 * index as usize).ok()?;
        let at = self.meta_base().checked_add(usize::try_from(rel).ok()?)?;
        ArchiveMeta::read(&self.data[..self.meta_end], at).ok().map(|(m, _)| m)
    }

    pub fn file(&self, index: u64) -> Option<ArchiveFile<'a>> {
        if index >= self.count {
            return None;
        }
        let rel = bytes::u64_at(self.data, self.meta_end + 8 * index as usize).ok()?;
        let at = self.table_end().checked_add(usize::try_from(rel).ok()?)?;
        ArchiveFile::read(self.data, at).ok().map(|(f, _)| f)
    }

    /// `(meta, file)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (ArchiveMeta<'a>, ArchiveFile<'a>)> + '_ {
        (0..self.count).filter_map(move |i| Some((self.meta(i)?, self.file(i)?)))
    }

    /// Index of the entry stored under `path`.
    pub fn find(&self, path: &str) -> Option<u64> {
        (0..self.count).find(|&i| self.meta(i).map(|m| m.path == path).unwrap_or(false))
    }

    /// Check every file payload against the checksum in its metadata.
    pub fn verify_files(&self) -> Result<()> {
        for (meta, file) in self.entries() {
            let actual = verify::crc32(file.data);
            if actual != meta.checksum {
                debug!("archive member {} failed its checksum", meta.path);
                return Err(Sf3Error::ChecksumMismatch { expected: meta.checksum, actual });
            }
        }
        Ok(())
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    ArchiveView::new(data).map(View::Archive)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    ArchiveView::new(data).map(|v| v.size())
}

// ── ArchiveBuilder ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PendingFile {
    modtime:   i64,
    mime_type: String,
    path:      String,
    data:      Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    files: Vec<PendingFile>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&mut self, path: &str, mime_type: &str, modtime: i64, data: &[u8]) -> Result<&mut Self> {
        if mime_type.len() as u64 + 1 > StrWidth::W8.max_len() {
            return Err(Sf3Error::LengthOverflow { len: mime_type.len(), width: 8 });
        }
        if path.len() as u64 + 1 > StrWidth::W16.max_len() {
            return Err(Sf3Error::LengthOverflow { len: path.len(), width: 16 });
        }
        self.files.push(PendingFile {
            modtime,
            mime_type: mime_type.to_string(),
            path:      path.to_string(),
            data:      data.to_vec(),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize { self.files.len() }

    pub fn is_empty(&self) -> bool { self.files.is_empty() }

    pub fn finish(&self) -> Result<Vec<u8>> {
        let count = self.files.len();

        let mut metas = Vec::new();
        let mut meta_offsets = Vec::with_capacity(count);
        for f in &self.files {
            meta_offsets.push(metas.len() as u64);
            metas.write_i64::<LittleEndian>(f.modtime)?;
            metas.write_u32::<LittleEndian>(verify::crc32(&f.data))?;
            string::write(&mut metas, &f.mime_type, StrWidth::W8)?;
            string::write(&mut metas, &f.path, StrWidth::W16)?;
        }
        let metadata_size = 8 * count + metas.len();

        let mut buf = Vec::with_capacity(HEADER_SIZE + metadata_size + 16 * count);
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u64::<LittleEndian>(count as u64)?;
        buf.write_u64::<LittleEndian>(metadata_size as u64)?;
        for off in &meta_offsets {
            buf.write_u64::<LittleEndian>(*off)?;
        }
        buf.extend_from_slice(&metas);

        let mut rel = 0u64;
        for f in &self.files {
            buf.write_u64::<LittleEndian>(rel)?;
            rel += 8 + f.data.len() as u64;
        }
        for f in &self.files {
            buf.write_u64::<LittleEndian>(f.data.len() as u64)?;
            buf.extend_from_slice(&f.data);
        }

        let size = verify::finalize(&mut buf, FormatId::Archive)?;
        buf.truncate(size);
        Ok(buf)
    }
}
