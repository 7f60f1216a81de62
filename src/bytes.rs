//! Bounds-checked little-endian field access over a borrowed buffer.
//!
//! Every view in this crate reads through [`Reader`] or the free functions
//! below.  Positions are plain `usize` offsets from the start of the buffer
//! (identifier included); every read and every computed record end is checked
//! against `data.len()` before any slicing happens.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, Sf3Error};
use crate::string::{self, StrWidth};

/// Borrow `len` bytes at `offset`, or fail with `Truncated`.
#[inline]
pub fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(Sf3Error::Truncated { offset, needed: len, len: data.len() }),
    }
}

/// Compute `offset + size` for a record starting at `offset`, failing with
/// `OutOfBounds` if the end lies past the buffer or overflows.
#[inline]
pub fn record_end(data: &[u8], offset: usize, size: u64) -> Result<usize> {
    let end = (offset as u64).checked_add(size);
    match end {
        Some(end) if end <= data.len() as u64 => Ok(end as usize),
        _ => Err(Sf3Error::OutOfBounds {
            offset,
            end: end.unwrap_or(u64::MAX),
            len: data.len(),
        }),
    }
}

/// Multiply declared geometry, treating overflow as an out-of-bounds record.
#[inline]
pub fn checked_product(offset: usize, len: usize, factors: &[u64]) -> Result<u64> {
    factors
        .iter()
        .try_fold(1u64, |acc, &f| acc.checked_mul(f))
        .ok_or(Sf3Error::OutOfBounds { offset, end: u64::MAX, len })
}

pub fn u8_at(data: &[u8], offset: usize) -> Result<u8> {
    Ok(slice(data, offset, 1)?[0])
}

pub fn u16_at(data: &[u8], offset: usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(slice(data, offset, 2)?))
}

pub fn u32_at(data: &[u8], offset: usize) -> Result<u32> {
    Ok(LittleEndian::read_u32(slice(data, offset, 4)?))
}

pub fn u64_at(data: &[u8], offset: usize) -> Result<u64> {
    Ok(LittleEndian::read_u64(slice(data, offset, 8)?))
}

pub fn f32_at(data: &[u8], offset: usize) -> Result<f32> {
    Ok(LittleEndian::read_f32(slice(data, offset, 4)?))
}

/// Overwrite a little-endian `u64` in place.  Used by the append paths.
pub fn put_u64(data: &mut [u8], offset: usize, value: u64) -> Result<()> {
    let len = data.len();
    match offset.checked_add(8) {
        Some(end) if end <= len => {
            LittleEndian::write_u64(&mut data[offset..end], value);
            Ok(())
        }
        _ => Err(Sf3Error::Truncated { offset, needed: 8, len }),
    }
}

pub fn put_u32(data: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let len = data.len();
    match offset.checked_add(4) {
        Some(end) if end <= len => {
            LittleEndian::write_u32(&mut data[offset..end], value);
            Ok(())
        }
        _ => Err(Sf3Error::Truncated { offset, needed: 4, len }),
    }
}

pub fn put_u16(data: &mut [u8], offset: usize, value: u16) -> Result<()> {
    let len = data.len();
    match offset.checked_add(2) {
        Some(end) if end <= len => {
            LittleEndian::write_u16(&mut data[offset..end], value);
            Ok(())
        }
        _ => Err(Sf3Error::Truncated { offset, needed: 2, len }),
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Sequential field reader.  Copyable, so a caller can peek ahead by reading
/// from a copy.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos:  usize,
}

impl<'a> Reader<'a> {
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn position(&self) -> usize { self.pos }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let s = slice(self.data, self.pos, n)?;
        self.pos += n;
        Ok(s)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes(2)?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes(4)?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.bytes(8)?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.bytes(8)?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.bytes(4)?))
    }

    pub fn f32_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let raw = self.bytes(4 * N)?;
        let mut out = [0f32; N];
        LittleEndian::read_f32_into(raw, &mut out);
        Ok(out)
    }

    /// Borrow `count` packed `f32` values.
    pub fn f32s(&mut self, count: usize) -> Result<F32Array<'a>> {
        let n = count.checked_mul(4).ok_or(Sf3Error::Truncated {
            offset: self.pos,
            needed: usize::MAX,
            len:    self.data.len(),
        })?;
        Ok(F32Array { raw: self.bytes(n)? })
    }

    /// Borrow `count` packed `u32` values.
    pub fn u32s(&mut self, count: usize) -> Result<U32Array<'a>> {
        let n = count.checked_mul(4).ok_or(Sf3Error::Truncated {
            offset: self.pos,
            needed: usize::MAX,
            len:    self.data.len(),
        })?;
        Ok(U32Array { raw: self.bytes(n)? })
    }

    /// Read a length-prefixed string and move past its terminator.
    pub fn str(&mut self, width: StrWidth) -> Result<&'a str> {
        let (s, end) = string::read(self.data, self.pos, width)?;
        self.pos = end;
        Ok(s)
    }
}

// ── Typed arrays ─────────────────────────────────────────────────────────────

/// Zero-copy view of a packed little-endian `f32` array.
#[derive(Debug, Clone, Copy)]
pub struct F32Array<'a> {
    raw: &'a [u8],
}

impl<'a> F32Array<'a> {
    pub fn len(&self) -> usize { self.raw.len() / 4 }

    pub fn is_empty(&self) -> bool { self.raw.len() < 4 }

    pub fn get(&self, index: usize) -> Option<f32> {
        let start = index.checked_mul(4)?;
        self.raw.get(start..start.checked_add(4)?).map(LittleEndian::read_f32)
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.raw.chunks_exact(4).map(LittleEndian::read_f32)
    }

    /// `count` values starting at element `start`.
    pub fn sub(&self, start: usize, count: usize) -> Option<F32Array<'a>> {
        let from = start.checked_mul(4)?;
        let to = from.checked_add(count.checked_mul(4)?)?;
        self.raw.get(from..to).map(|raw| F32Array { raw })
    }

    pub fn as_bytes(&self) -> &'a [u8] { self.raw }

    pub fn to_vec(&self) -> Vec<f32> { self.iter().collect() }
}

/// Zero-copy view of a packed little-endian `u32` array.
#[derive(Debug, Clone, Copy)]
pub struct U32Array<'a> {
    raw: &'a [u8],
}

impl<'a> U32Array<'a> {
    pub fn len(&self) -> usize { self.raw.len() / 4 }

    pub fn is_empty(&self) -> bool { self.raw.len() < 4 }

    pub fn get(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(4)?;
        self.raw.get(start..start.checked_add(4)?).map(LittleEndian::read_u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        self.raw.chunks_exact(4).map(LittleEndian::read_u32)
    }

    pub fn as_bytes(&self) -> &'a [u8] { self.raw }

    pub fn to_vec(&self) -> Vec<u32> { self.iter().collect() }
}
