//! Length-prefixed, null-terminated strings.
//!
//! Layout: `length` (8/16/32/64-bit, little-endian) followed by `length`
//! bytes, the last of which is the null terminator.  The terminator is part
//! of the encoded length, so the smallest valid string has `length == 1`.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::bytes;
use crate::error::{Result, Sf3Error};

/// Width class of a string's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrWidth {
    W8,
    W16,
    W32,
    W64,
}

impl StrWidth {
    /// Bytes taken by the length prefix.
    #[inline]
    pub fn prefix_len(self) -> usize {
        match self {
            StrWidth::W8  => 1,
            StrWidth::W16 => 2,
            StrWidth::W32 => 4,
            StrWidth::W64 => 8,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        (self.prefix_len() * 8) as u8
    }

    /// Largest encodable `length`, terminator included.
    #[inline]
    pub fn max_len(self) -> u64 {
        match self {
            StrWidth::W8  => u8::MAX as u64,
            StrWidth::W16 => u16::MAX as u64,
            StrWidth::W32 => u32::MAX as u64,
            StrWidth::W64 => u64::MAX,
        }
    }
}

/// Decode the string starting at `offset`.
///
/// Returns the text without its terminator and the offset just past the
/// encoded string.
pub fn read(data: &[u8], offset: usize, width: StrWidth) -> Result<(&str, usize)> {
    let length = match width {
        StrWidth::W8  => bytes::u8_at(data, offset)? as u64,
        StrWidth::W16 => bytes::u16_at(data, offset)? as u64,
        StrWidth::W32 => bytes::u32_at(data, offset)? as u64,
        StrWidth::W64 => bytes::u64_at(data, offset)?,
    };
    if length == 0 {
        return Err(Sf3Error::InvalidString { offset, reason: "zero length, terminator missing" });
    }
    let start = offset + width.prefix_len();
    let needed = usize::try_from(length).map_err(|_| Sf3Error::Truncated {
        offset,
        needed: usize::MAX,
        len: data.len(),
    })?;
    let raw = bytes::slice(data, start, needed).map_err(|_| Sf3Error::Truncated {
        offset,
        needed: width.prefix_len().saturating_add(needed),
        len: data.len(),
    })?;
    let (text, terminator) = raw.split_at(needed - 1);
    if terminator[0] != 0 {
        return Err(Sf3Error::InvalidString { offset, reason: "missing null terminator" });
    }
    let text = std::str::from_utf8(text).map_err(|_| Sf3Error::InvalidUtf8 { offset })?;
    Ok((text, start + needed))
}

/// Number of bytes [`write`] produces for `text`.
#[inline]
pub fn encoded_len(text: &str, width: StrWidth) -> usize {
    width.prefix_len() + text.len() + 1
}

/// Append `text` with its length prefix and null terminator.
pub fn write(buf: &mut Vec<u8>, text: &str, width: StrWidth) -> Result<()> {
    let length = text.len() as u64 + 1;
    if length > width.max_len() {
        return Err(Sf3Error::LengthOverflow { len: text.len(), width: width.bits() });
    }
    match width {
        StrWidth::W8  => buf.write_u8(length as u8)?,
        StrWidth::W16 => buf.write_u16::<LittleEndian>(length as u16)?,
        StrWidth::W32 => buf.write_u32::<LittleEndian>(length as u32)?,
        StrWidth::W64 => buf.write_u64::<LittleEndian>(length)?,
    }
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_every_width() {
        for width in [StrWidth::W8, StrWidth::W16, StrWidth::W32, StrWidth::W64] {
            let mut buf = vec![0xEE];
            write(&mut buf, "hello", width).unwrap();
            assert_eq!(buf.len(), 1 + encoded_len("hello", width));
            let (s, end) = read(&buf, 1, width).unwrap();
            assert_eq!(s, "hello");
            assert_eq!(end, buf.len());
        }
    }

    #[test]
    fn test_length_counts_terminator() {
        let mut buf = Vec::new();
        write(&mut buf, "http://x", StrWidth::W16).unwrap();
        assert_eq!(&buf[..2], &[9, 0]);
        assert_eq!(*buf.last().unwrap(), 0);
    }

    #[test]
    fn test_empty_string_is_just_terminator() {
        let mut buf = Vec::new();
        write(&mut buf, "", StrWidth::W8).unwrap();
        assert_eq!(buf, vec![1, 0]);
        assert_eq!(read(&buf, 0, StrWidth::W8).unwrap(), ("", 2));
    }

    #[test]
    fn test_str8_overflow() {
        let long = "x".repeat(255);
        let mut buf = Vec::new();
        assert!(matches!(
            write(&mut buf, &long, StrWidth::W8),
            Err(Sf3Error::LengthOverflow { len: 255, width: 8 })
        ));
        assert!(buf.is_empty());
        write(&mut buf, &long[..254], StrWidth::W8).unwrap();
    }

    #[test]
    fn test_read_rejects_truncated_and_unterminated() {
        // length 5 but only 3 bytes follow
        let data = [5u8, b'a', b'b', 0];
        assert!(matches!(read(&data, 0, StrWidth::W8), Err(Sf3Error::Truncated { .. })));

        let data = [3u8, b'a', b'b', b'c'];
        assert!(matches!(read(&data, 0, StrWidth::W8), Err(Sf3Error::InvalidString { .. })));

        let data = [0u8];
        assert!(matches!(read(&data, 0, StrWidth::W8), Err(Sf3Error::InvalidString { .. })));
    }

    #[test]
    fn test_read_rejects_invalid_utf8() {
        let data = [3u8, 0xFF, 0xFE, 0];
        assert!(matches!(read(&data, 0, StrWidth::W8), Err(Sf3Error::InvalidUtf8 { offset: 0 })));
    }
}
