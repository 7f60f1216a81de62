//! Append-friendly log: a sequence of chunks, each holding up to `capacity`
//! entries.
//!
//! A chunk starts with a 12-byte header (`size u64`, `entry_count u32`)
//! followed by `capacity` chunk-relative entry offsets.  The capacity is not
//! stored; it is recovered from `entry_offset[0]`, which always points just
//! past the offset table, even in an empty chunk.  Entries can be reached
//! either through the offset table or by walking each entry's `size`; a
//! valid log agrees on both.

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, trace};

use super::{expect_format, FormatId, View};
use crate::bytes::{self, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::string::{self, StrWidth};
use crate::verify;

pub const HEADER_SIZE: usize = 34;
pub const CHUNK_HEADER_SIZE: usize = 12;
/// Fixed part of an entry before its strings.
pub const ENTRY_HEADER_SIZE: usize = 13;
pub const DEFAULT_CHUNK_CAPACITY: u32 = 64;
/// `end` value of a log that is still being written.
pub const OPEN_END: i64 = i64::MAX;

const CHUNK_COUNT_OFFSET: usize = 32;

// ── Entries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry<'a> {
    pub size:     u32,
    /// Milliseconds since the log's start.
    pub time:     u64,
    /// Positive is more severe, negative more detailed.
    pub severity: i8,
    pub source:   &'a str,
    pub category: &'a str,
    pub message:  &'a str,
}

impl<'a> LogEntry<'a> {
    /// Decode the entry at `offset`; its fields must fit in its `size`.
    pub fn read(data: &'a [u8], offset: usize) -> Result<Self> {
        let size = bytes::u32_at(data, offset)?;
        let end = bytes::record_end(data, offset, size as u64)?;
        let mut r = Reader::at(&data[..end], offset + 4);
        let time     = r.u64()?;
        let severity = r.i8()?;
        let source   = r.str(StrWidth::W8)?;
        let category = r.str(StrWidth::W8)?;
        let message  = r.str(StrWidth::W16)?;
        Ok(Self { size, time, severity, source, category, message })
    }
}

/// Entry contents for the write side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'s> {
    pub time:     u64,
    pub severity: i8,
    pub source:   &'s str,
    pub category: &'s str,
    pub message:  &'s str,
}

impl<'s> LogRecord<'s> {
    pub fn new(time: u64, severity: i8, source: &'s str, category: &'s str, message: &'s str) -> Self {
        Self { time, severity, source, category, message }
    }

    /// Encode as an entry, `size` field included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = ENTRY_HEADER_SIZE
            + string::encoded_len(self.source, StrWidth::W8)
            + string::encoded_len(self.category, StrWidth::W8)
            + string::encoded_len(self.message, StrWidth::W16);
        let mut out = Vec::with_capacity(size);
        out.write_u32::<LittleEndian>(size as u32)?;
        out.write_u64::<LittleEndian>(self.time)?;
        out.write_i8(self.severity)?;
        string::write(&mut out, self.source, StrWidth::W8)?;
        string::write(&mut out, self.category, StrWidth::W8)?;
        string::write(&mut out, self.message, StrWidth::W16)?;
        Ok(out)
    }
}

// ── Chunk ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    data:        &'a [u8],
    offset:      usize,
    size:        u64,
    entry_count: u32,
    capacity:    u32,
}

impl<'a> Chunk<'a> {
    /// Validate the chunk at `offset`, including every entry in it.
    pub fn read(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut r = Reader::at(data, offset);
        let size        = r.u64()?;
        let entry_count = r.u32()?;
        let first       = r.u64()?;
        let end = bytes::record_end(data, offset, size)?;

        let capacity = first.saturating_sub(CHUNK_HEADER_SIZE as u64) / 8;
        if capacity == 0 || capacity < entry_count as u64 || capacity > u32::MAX as u64 {
            return Err(Sf3Error::LayoutMismatch {
                what:     "log chunk capacity",
                declared: capacity,
                actual:   entry_count as u64,
            });
        }
        let entries_start = bytes::record_end(data, offset, first)?;
        if entries_start > end {
            return Err(Sf3Error::OutOfBounds { offset, end: entries_start as u64, len: end });
        }

        let chunk = Self { data, offset, size, entry_count, capacity: capacity as u32 };
        let mut pos = entries_start;
        for i in 0..entry_count {
            let declared = chunk.entry_offset(i)?;
            if (offset as u64).checked_add(declared) != Some(pos as u64) {
                return Err(Sf3Error::LayoutMismatch {
                    what:     "log entry offset",
                    declared,
                    actual:   (pos - offset) as u64,
                });
            }
            let entry = LogEntry::read(&data[..end], pos)?;
            trace!("log entry at {pos}: {} bytes", entry.size);
            pos += entry.size as usize;
        }
        Ok(chunk)
    }

    pub fn offset(&self) -> usize { self.offset }
    pub fn size(&self) -> u64 { self.size }
    pub fn entry_count(&self) -> u32 { self.entry_count }
    pub fn capacity(&self) -> u32 { self.capacity }

    /// Entries that can still be added.
    pub fn remaining(&self) -> u32 { self.capacity - self.entry_count }

    fn entry_offset(&self, index: u32) -> Result<u64> {
        bytes::u64_at(self.data, self.offset + CHUNK_HEADER_SIZE + 8 * index as usize)
    }

    fn end(&self) -> usize { self.offset + self.size as usize }

    /// Random access through the offset table.
    pub fn entry(&self, index: u32) -> Option<LogEntry<'a>> {
        if index >= self.entry_count {
            return None;
        }
        let rel = self.entry_offset(index).ok()?;
        LogEntry::read(&self.data[..self.end()], self.offset + rel as usize).ok()
    }

    /// Sequential access by entry size.
    pub fn entries(&self) -> Entries<'a> {
        let first = self.entry_offset(0).unwrap_or(0) as usize;
        Entries {
            data:      &self.data[..self.end()],
            offset:    self.offset + first,
            remaining: self.entry_count,
        }
    }

    /// Offset just past the last entry.
    fn used_end(&self) -> Result<usize> {
        let mut pos = self.offset + self.entry_offset(0)? as usize;
        for entry in self.entries() {
            pos += entry?.size as usize;
        }
        Ok(pos)
    }
}

pub struct Entries<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: u32,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<LogEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match LogEntry::read(self.data, self.offset) {
            Ok(entry) => {
                self.offset += entry.size as usize;
                Some(Ok(entry))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

/// Offset of the chunk after the one at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    let size = bytes::u64_at(data, offset)?;
    bytes::record_end(data, offset, size)
}

// ── LogView ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct LogView<'a> {
    data:        &'a [u8],
    start:       i64,
    end:         i64,
    chunk_count: u16,
    size:        usize,
}

impl<'a> LogView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let start       = r.i64()?;
        let end         = r.i64()?;
        let chunk_count = r.u16()?;

        let mut offset = HEADER_SIZE;
        for _ in 0..chunk_count {
            let chunk = Chunk::read(data, offset)?;
            offset = chunk.end();
        }
        trace!("log: {chunk_count} chunks, {offset} bytes");
        Ok(Self { data, start, end, chunk_count, size: offset })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Log)?;
        Self::new(data)
    }

    /// Seconds since the UNIX epoch.
    pub fn start(&self) -> i64 { self.start }
    pub fn end(&self) -> i64 { self.end }
    pub fn chunk_count(&self) -> u16 { self.chunk_count }
    pub fn size(&self) -> usize { self.size }

    pub fn is_open(&self) -> bool { self.end == OPEN_END }

    pub fn first(&self) -> usize { HEADER_SIZE }

    pub fn chunks(&self) -> Chunks<'a> {
        Chunks { data: self.data, offset: HEADER_SIZE, remaining: self.chunk_count }
    }

    pub fn chunk(&self, index: u16) -> Option<Chunk<'a>> {
        if index >= self.chunk_count {
            return None;
        }
        self.chunks().nth(index as usize)?.ok()
    }

    pub fn entry_count(&self) -> u64 {
        self.chunks().filter_map(|c| c.ok()).map(|c| c.entry_count() as u64).sum()
    }

    /// Every entry of every chunk, in order.
    pub fn entries(&self) -> impl Iterator<Item = Result<LogEntry<'a>>> + 'a {
        self.chunks().flat_map(|chunk| -> Box<dyn Iterator<Item = Result<LogEntry<'a>>> + 'a> {
            match chunk {
                Ok(c) => Box::new(c.entries()),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        })
    }
}

pub struct Chunks<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: u16,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match Chunk::read(self.data, self.offset) {
            Ok(chunk) => {
                self.offset = chunk.end();
                Some(Ok(chunk))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    LogView::new(data).map(View::Log)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    LogView::new(data).map(|v| v.size())
}

// ── LogBuilder ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PendingChunk {
    capacity: u32,
    entries:  Vec<Vec<u8>>,
}

impl PendingChunk {
    fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        let table = CHUNK_HEADER_SIZE + 8 * self.capacity as usize;
        let body: usize = self.entries.iter().map(Vec::len).sum();
        buf.write_u64::<LittleEndian>((table + body) as u64)?;
        buf.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        let mut rel = table;
        for i in 0..self.capacity as usize {
            match self.entries.get(i) {
                Some(entry) => {
                    buf.write_u64::<LittleEndian>(rel as u64)?;
                    rel += entry.len();
                }
                None if i == 0 => buf.write_u64::<LittleEndian>(table as u64)?,
                None => buf.write_u64::<LittleEndian>(0)?,
            }
        }
        for entry in &self.entries {
            buf.extend_from_slice(entry);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LogBuilder {
    start:            i64,
    end:              i64,
    default_capacity: u32,
    chunks:           Vec<PendingChunk>,
}

impl LogBuilder {
    /// A new open log starting at `start` (seconds since the UNIX epoch).
    pub fn new(start: i64) -> Self {
        Self { start, end: OPEN_END, default_capacity: DEFAULT_CHUNK_CAPACITY, chunks: Vec::new() }
    }

    /// Capacity used for the implicit first chunk.  A capacity of 0 makes
    /// the first [`LogBuilder::entry`] fail with `ChunkFull`.
    pub fn chunk_capacity(mut self, capacity: u32) -> Self {
        self.default_capacity = capacity;
        self
    }

    pub fn end(&mut self, end: i64) -> &mut Self {
        self.end = end;
        self
    }

    /// Start a new chunk; later entries go into it.
    pub fn begin_chunk(&mut self, capacity: u32) -> Result<&mut Self> {
        if capacity == 0 {
            return Err(Sf3Error::ChunkFull { capacity });
        }
        if self.chunks.len() == u16::MAX as usize {
            return Err(Sf3Error::LengthOverflow { len: self.chunks.len() + 1, width: 16 });
        }
        self.chunks.push(PendingChunk { capacity, entries: Vec::new() });
        Ok(self)
    }

    /// Add an entry to the current chunk; fails with `ChunkFull` at capacity.
    pub fn entry(&mut self, record: &LogRecord<'_>) -> Result<&mut Self> {
        if self.chunks.is_empty() {
            self.begin_chunk(self.default_capacity)?;
        }
        let encoded = record.encode()?;
        if let Some(chunk) = self.chunks.last_mut() {
            if chunk.entries.len() >= chunk.capacity as usize {
                return Err(Sf3Error::ChunkFull { capacity: chunk.capacity });
            }
            chunk.entries.push(encoded);
        }
        Ok(self)
    }

    pub fn finish(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_i64::<LittleEndian>(self.start)?;
        buf.write_i64::<LittleEndian>(self.end)?;
        buf.write_u16::<LittleEndian>(self.chunks.len() as u16)?;
        for chunk in &self.chunks {
            chunk.write(&mut buf)?;
        }

        let size = verify::finalize(&mut buf, FormatId::Log)?;
        buf.truncate(size);
        Ok(buf)
    }
}

// ── In-place updates ─────────────────────────────────────────────────────────

fn ensure_exact(buf: &[u8]) -> Result<LogView<'_>> {
    let log = LogView::new(buf)?;
    if log.size() != buf.len() {
        return Err(Sf3Error::SizeMismatch { expected: log.size(), actual: buf.len() });
    }
    Ok(log)
}

/// Append one entry to a finalized log without rewriting earlier chunks.
///
/// The entry goes into the last chunk while it has room; otherwise a new
/// chunk with the same capacity is added.  The buffer is re-finalized.
pub fn append_entry(buf: &mut Vec<u8>, record: &LogRecord<'_>) -> Result<()> {
    let encoded = record.encode()?;
    let log = ensure_exact(buf)?;

    let last = match log.chunk_count() {
        0 => None,
        n => log.chunk(n - 1),
    };
    let chunk_count = log.chunk_count();

    match last {
        Some(chunk) if chunk.remaining() > 0 => {
            let offset = chunk.offset();
            let index = chunk.entry_count();
            let pos = chunk.used_end()?;
            let new_end = pos + encoded.len();
            let new_size = (new_end - offset).max(chunk.size() as usize);
            if new_end > buf.len() {
                buf.resize(new_end, 0);
            }
            buf[pos..new_end].copy_from_slice(&encoded);
            bytes::put_u64(buf, offset, new_size as u64)?;
            bytes::put_u32(buf, offset + 8, index + 1)?;
            bytes::put_u64(buf, offset + CHUNK_HEADER_SIZE + 8 * index as usize, (pos - offset) as u64)?;
            debug!("appended log entry {index} to chunk at {offset}");
        }
        last => {
            if chunk_count == u16::MAX {
                return Err(Sf3Error::LengthOverflow { len: chunk_count as usize + 1, width: 16 });
            }
            let capacity = last.map(|c| c.capacity()).unwrap_or(DEFAULT_CHUNK_CAPACITY);
            let chunk = PendingChunk { capacity, entries: vec![encoded] };
            let offset = buf.len();
            chunk.write(buf)?;
            bytes::put_u16(buf, CHUNK_COUNT_OFFSET, chunk_count + 1)?;
            debug!("opened log chunk {} at {offset} (capacity {capacity})", chunk_count);
        }
    }

    let size = verify::finalize(buf, FormatId::Log)?;
    buf.truncate(size);
    Ok(())
}

/// Set the log's end time and re-finalize.
pub fn close(buf: &mut [u8], end: i64) -> Result<()> {
    ensure_exact(buf)?;
    bytes::put_u64(buf, IDENTIFIER_SIZE + 8, end as u64)?;
    verify::finalize(buf, FormatId::Log)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: u64) -> LogRecord<'static> {
        LogRecord::new(i * 10, (i % 3) as i8 - 1, "core", "test", "something happened")
    }

    #[test]
    fn test_chunk_header_size_is_pinned() {
        assert_eq!(CHUNK_HEADER_SIZE, 12);
        assert_eq!(CHUNK_HEADER_SIZE, std::mem::size_of::<u64>() + std::mem::size_of::<u32>());
    }

    #[test]
    fn test_capacity_from_first_offset() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(5).unwrap().entry(&record(0)).unwrap();
        let buf = b.finish().unwrap();
        assert_eq!(bytes::u64_at(&buf, HEADER_SIZE + CHUNK_HEADER_SIZE).unwrap(), 52);

        let log = LogView::decode(&buf).unwrap();
        let chunk = log.chunk(0).unwrap();
        assert_eq!(chunk.capacity(), 5);
        assert_eq!(chunk.remaining(), 4);
    }

    #[test]
    fn test_sixth_entry_is_chunk_full() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(5).unwrap();
        for i in 0..5 {
            b.entry(&record(i)).unwrap();
        }
        assert!(matches!(b.entry(&record(5)), Err(Sf3Error::ChunkFull { capacity: 5 })));
    }

    #[test]
    fn test_log_round_trip() {
        let mut b = LogBuilder::new(1_700_000_000).chunk_capacity(2);
        b.entry(&record(0)).unwrap().entry(&record(1)).unwrap();
        b.begin_chunk(3).unwrap().entry(&LogRecord::new(99, -4, "net", "io", "timeout")).unwrap();
        b.end(1_700_000_060);
        let buf = b.finish().unwrap();

        let log = LogView::decode(&buf).unwrap();
        assert_eq!(log.start(), 1_700_000_000);
        assert!(!log.is_open());
        assert_eq!(log.chunk_count(), 2);
        assert_eq!(log.entry_count(), 3);
        assert_eq!(log.size(), buf.len());

        let all: Vec<_> = log.entries().collect::<Result<_>>().unwrap();
        assert_eq!(all[1].time, 10);
        assert_eq!(all[2].severity, -4);
        assert_eq!(all[2].message, "timeout");

        let chunk = log.chunk(1).unwrap();
        assert_eq!(chunk.capacity(), 3);
        assert_eq!(chunk.entry(0), Some(all[2]));
        assert!(chunk.entry(1).is_none());
    }

    #[test]
    fn test_total_size_is_header_plus_chunks() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(1).unwrap().begin_chunk(4).unwrap().entry(&record(1)).unwrap();
        let buf = b.finish().unwrap();
        let log = LogView::decode(&buf).unwrap();
        let sum: u64 = log.chunks().map(|c| c.unwrap().size()).sum();
        assert_eq!(log.size() as u64, HEADER_SIZE as u64 + sum);
        assert!(log.is_open());
    }

    #[test]
    fn test_append_fills_chunk_then_opens_new_one() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(2).unwrap().entry(&record(0)).unwrap();
        let mut buf = b.finish().unwrap();

        append_entry(&mut buf, &record(1)).unwrap();
        verify::verify(&buf).unwrap();
        let log = LogView::decode(&buf).unwrap();
        assert_eq!(log.chunk_count(), 1);
        assert_eq!(log.chunk(0).unwrap().entry_count(), 2);

        append_entry(&mut buf, &record(2)).unwrap();
        verify::verify(&buf).unwrap();
        let log = LogView::decode(&buf).unwrap();
        assert_eq!(log.chunk_count(), 2);
        assert_eq!(log.chunk(1).unwrap().capacity(), 2);
        let times: Vec<u64> = log.entries().map(|e| e.unwrap().time).collect();
        assert_eq!(times, vec![0, 10, 20]);
    }

    #[test]
    fn test_append_to_empty_log() {
        let mut buf = LogBuilder::new(0).finish().unwrap();
        append_entry(&mut buf, &record(0)).unwrap();
        let log = LogView::decode(&buf).unwrap();
        assert_eq!(log.chunk(0).unwrap().capacity(), DEFAULT_CHUNK_CAPACITY);
        assert_eq!(log.entry_count(), 1);
    }

    #[test]
    fn test_close_sets_end() {
        let mut buf = LogBuilder::new(5).finish().unwrap();
        close(&mut buf, 10).unwrap();
        let log = LogView::decode(&buf).unwrap();
        assert_eq!(log.end(), 10);
        verify::verify(&buf).unwrap();
    }

    #[test]
    fn test_entry_offset_disagreeing_with_sizes() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(2).unwrap().entry(&record(0)).unwrap().entry(&record(1)).unwrap();
        let mut buf = b.finish().unwrap();
        let slot = HEADER_SIZE + CHUNK_HEADER_SIZE + 8;
        let rel = bytes::u64_at(&buf, slot).unwrap();
        bytes::put_u64(&mut buf, slot, rel + 1).unwrap();
        assert!(matches!(
            LogView::new(&buf),
            Err(Sf3Error::LayoutMismatch { what: "log entry offset", .. })
        ));
    }

    #[test]
    fn test_entry_offset_overflow_is_rejected() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(2).unwrap().entry(&record(0)).unwrap().entry(&record(1)).unwrap();
        let mut buf = b.finish().unwrap();
        bytes::put_u64(&mut buf, HEADER_SIZE + CHUNK_HEADER_SIZE + 8, u64::MAX).unwrap();
        assert!(matches!(
            LogView::new(&buf),
            Err(Sf3Error::LayoutMismatch { what: "log entry offset", .. })
        ));
        assert!(verify::verify(&buf).is_err());
    }

    #[test]
    fn test_zero_default_capacity_is_chunk_full() {
        let mut b = LogBuilder::new(0).chunk_capacity(0);
        assert!(matches!(b.entry(&record(0)), Err(Sf3Error::ChunkFull { capacity: 0 })));
    }

    #[test]
    fn test_zero_capacity_chunk_rejected() {
        let mut b = LogBuilder::new(0);
        b.begin_chunk(1).unwrap();
        let mut buf = b.finish().unwrap();
        bytes::put_u64(&mut buf, HEADER_SIZE + CHUNK_HEADER_SIZE, 12).unwrap();
        assert!(matches!(
            LogView::new(&buf),
            Err(Sf3Error::LayoutMismatch { what: "log chunk capacity", .. })
        ));
    }
}
