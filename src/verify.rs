//! Checksum, finalization and whole-buffer validation.

use crc32fast::Hasher;
use log::{debug, trace};

use crate::bytes;
use crate::error::{Result, Sf3Error};
use crate::format::{self, FormatId};
use crate::identifier::{self, Identifier, IDENTIFIER_SIZE};

/// CRC32 (IEEE) of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Which checks [`verify_with`] runs beyond the identifier and the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    pub check_checksum: bool,
    /// Require the walked size to equal the buffer length.
    pub check_size:     bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { check_checksum: true, check_size: true }
    }
}

impl VerifyOptions {
    /// Structure only: identifier and record walk.
    pub fn structural() -> Self {
        Self { check_checksum: false, check_size: false }
    }
}

/// Compute the size of `buf`, checksum `buf[16..size]` and write the
/// identifier.  Returns the size; bytes past it are left untouched.
pub fn finalize(buf: &mut [u8], format: FormatId) -> Result<usize> {
    if buf.len() < IDENTIFIER_SIZE {
        return Err(Sf3Error::TooShort { len: buf.len() });
    }
    let size = format::compute_size(format, buf)?;
    let checksum = crc32(bytes::slice(buf, IDENTIFIER_SIZE, size.saturating_sub(IDENTIFIER_SIZE))?);
    Identifier::new(format as u8, checksum).write_into(buf)?;
    debug!("finalized {} buffer: {} bytes, crc {:#010x}", format.name(), size, checksum);
    Ok(size)
}

/// Compare the stored checksum against `buf[16..]`.
pub fn check_checksum(buf: &[u8]) -> Result<()> {
    let stored = Identifier::read(buf)?.checksum;
    let actual = crc32(&buf[IDENTIFIER_SIZE..]);
    if stored != actual {
        return Err(Sf3Error::ChecksumMismatch { expected: stored, actual });
    }
    Ok(())
}

/// Full validation: identifier, structure, size and checksum.
pub fn verify(buf: &[u8]) -> Result<FormatId> {
    verify_with(buf, &VerifyOptions::default())
}

pub fn verify_with(buf: &[u8], options: &VerifyOptions) -> Result<FormatId> {
    let id = identifier::validate(buf)?;
    let format = FormatId::from_u8(id)?;
    let stored = Identifier::read(buf)?.checksum;
    trace!("verifying {} buffer of {} bytes", format.name(), buf.len());

    let size = match format::compute_size(format, buf) {
        Ok(size) => size,
        Err(walk_err) => {
            // A broken walk over a payload whose checksum is also wrong is
            // reported as corruption.
            if options.check_checksum {
                let actual = crc32(&buf[IDENTIFIER_SIZE..]);
                if actual != stored {
                    debug!("walk failed ({walk_err}) on a buffer with a bad checksum");
                    return Err(Sf3Error::ChecksumMismatch { expected: stored, actual });
                }
            }
            return Err(walk_err);
        }
    };

    if options.check_size && size != buf.len() {
        if !options.check_checksum {
            return Err(Sf3Error::SizeMismatch { expected: size, actual: buf.len() });
        }
        // Trailing bytes after an intact payload are a size problem; anything
        // else means the payload itself changed.
        if size < buf.len() && crc32(&buf[IDENTIFIER_SIZE..size]) == stored {
            return Err(Sf3Error::SizeMismatch { expected: size, actual: buf.len() });
        }
        let actual = crc32(&buf[IDENTIFIER_SIZE..]);
        if actual != stored {
            return Err(Sf3Error::ChecksumMismatch { expected: stored, actual });
        }
        return Err(Sf3Error::SizeMismatch { expected: size, actual: buf.len() });
    }

    if options.check_checksum {
        let end = if options.check_size { buf.len() } else { size };
        let actual = crc32(&buf[IDENTIFIER_SIZE..end]);
        if actual != stored {
            return Err(Sf3Error::ChecksumMismatch { expected: stored, actual });
        }
    }
    debug!("{} buffer verified ({} bytes)", format.name(), size);
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::audio::{AudioBuilder, SampleFormat};

    fn audio_fixture() -> Vec<u8> {
        let mut b = AudioBuilder::new(8000, 1, SampleFormat::Int16);
        b.push_samples(&[1, 0, 2, 0, 3, 0]);
        b.finish().unwrap()
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_finalize_then_verify() {
        let buf = audio_fixture();
        assert_eq!(buf.len(), 36);
        assert_eq!(verify(&buf).unwrap(), FormatId::Audio);
        check_checksum(&buf).unwrap();
    }

    #[test]
    fn test_finalize_ignores_tail_of_overallocated_buffer() {
        let mut buf = audio_fixture();
        buf.extend_from_slice(&[0xAA; 10]);
        buf[..IDENTIFIER_SIZE].fill(0);
        assert_eq!(finalize(&mut buf, FormatId::Audio).unwrap(), 36);
        buf.truncate(36);
        verify(&buf).unwrap();
    }

    #[test]
    fn test_appended_byte_is_size_mismatch() {
        let mut buf = audio_fixture();
        buf.push(0);
        assert!(matches!(verify(&buf), Err(Sf3Error::SizeMismatch { expected: 36, actual: 37 })));
    }

    #[test]
    fn test_flipped_payload_byte_is_checksum_mismatch() {
        let orig = audio_fixture();
        for i in IDENTIFIER_SIZE..orig.len() {
            let mut buf = orig.clone();
            buf[i] ^= 0x01;
            assert!(
                matches!(verify(&buf), Err(Sf3Error::ChecksumMismatch { .. })),
                "flip at {i}"
            );
        }
    }

    #[test]
    fn test_structural_options_skip_checksum() {
        let mut buf = audio_fixture();
        buf[IDENTIFIER_SIZE + 16] ^= 0xFF;
        assert!(verify(&buf).is_err());
        assert_eq!(verify_with(&buf, &VerifyOptions::structural()).unwrap(), FormatId::Audio);
    }
}
