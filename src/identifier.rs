use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

use crate::error::{Result, Sf3Error};

pub const MAGIC: [u8; 10] = [0x81, 0x53, 0x46, 0x33, 0x00, 0xE0, 0xD0, 0x0D, 0x0A, 0x0A];
/// Size of the identifier that starts every SF3 file; the payload follows it.
pub const IDENTIFIER_SIZE: usize = 16;

pub const FORMAT_ID_OFFSET: usize = 10;
pub const CHECKSUM_OFFSET:  usize = 11;
pub const TERMINATOR_OFFSET: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identifier {
    pub format_id: u8,
    /// CRC32 of the payload following the identifier.
    pub checksum:  u32,
}

impl Identifier {
    pub fn new(format_id: u8, checksum: u32) -> Self {
        Self { format_id, checksum }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u8(self.format_id)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        writer.write_u8(0)?;
        Ok(())
    }

    /// Encode into the first [`IDENTIFIER_SIZE`] bytes of `data`.
    pub fn write_into(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < IDENTIFIER_SIZE {
            return Err(Sf3Error::TooShort { len: data.len() });
        }
        self.write(&mut data[..IDENTIFIER_SIZE])?;
        Ok(())
    }

    pub fn read(data: &[u8]) -> Result<Self> {
        let format_id = validate(data)?;
        let checksum = LittleEndian::read_u32(&data[CHECKSUM_OFFSET..TERMINATOR_OFFSET]);
        Ok(Self { format_id, checksum })
    }
}

/// Check the magic and terminator and return the raw format id.
///
/// The payload is not looked at, and the id is not checked against the
/// registry: a well-formed identifier may still carry an unknown format.
pub fn validate(data: &[u8]) -> Result<u8> {
    if data.len() < IDENTIFIER_SIZE {
        return Err(Sf3Error::TooShort { len: data.len() });
    }
    if data[..MAGIC.len()] != MAGIC {
        return Err(Sf3Error::BadMagic);
    }
    let terminator = data[TERMINATOR_OFFSET];
    if terminator != 0 {
        return Err(Sf3Error::BadTerminator(terminator));
    }
    Ok(data[FORMAT_ID_OFFSET])
}
