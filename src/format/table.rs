//! Tabular data: column specs followed by fixed-length, row-major rows.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{self, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::string::{self, StrWidth};
use crate::verify;

pub const HEADER_SIZE: usize = 38;

// ── ColumnType ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Int8                    = 0x01,
    Int16                   = 0x02,
    Int32                   = 0x04,
    Int64                   = 0x08,
    Uint8                   = 0x11,
    Uint16                  = 0x12,
    Uint32                  = 0x14,
    Uint64                  = 0x18,
    Float16                 = 0x22,
    Float32                 = 0x24,
    Float64                 = 0x28,
    String                  = 0x31,
    Timestamp               = 0x48,
    HighResolutionTimestamp = 0x58,
    Boolean                 = 0x61,
}

impl ColumnType {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0x01 => ColumnType::Int8,
            0x02 => ColumnType::Int16,
            0x04 => ColumnType::Int32,
            0x08 => ColumnType::Int64,
            0x11 => ColumnType::Uint8,
            0x12 => ColumnType::Uint16,
            0x14 => ColumnType::Uint32,
            0x18 => ColumnType::Uint64,
            0x22 => ColumnType::Float16,
            0x24 => ColumnType::Float32,
            0x28 => ColumnType::Float64,
            0x31 => ColumnType::String,
            0x48 => ColumnType::Timestamp,
            0x58 => ColumnType::HighResolutionTimestamp,
            0x61 => ColumnType::Boolean,
            other => return Err(Sf3Error::InvalidDiscriminant { what: "table column type", value: other }),
        })
    }

    /// Bytes per element.
    #[inline]
    pub fn element_size(self) -> usize {
        (self as u8 & 0x0F) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int8                    => "int8",
            ColumnType::Int16                   => "int16",
            ColumnType::Int32                   => "int32",
            ColumnType::Int64                   => "int64",
            ColumnType::Uint8                   => "uint8",
            ColumnType::Uint16                  => "uint16",
            ColumnType::Uint32                  => "uint32",
            ColumnType::Uint64                  => "uint64",
            ColumnType::Float16                 => "float16",
            ColumnType::Float32                 => "float32",
            ColumnType::Float64                 => "float64",
            ColumnType::String                  => "string",
            ColumnType::Timestamp               => "timestamp",
            ColumnType::HighResolutionTimestamp => "high resolution timestamp",
            ColumnType::Boolean                 => "boolean",
        }
    }
}

// ── ColumnSpec ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec<'a> {
    /// Bytes reserved for this column in every row.
    pub length:      u32,
    pub column_type: ColumnType,
    pub name:        &'a str,
}

impl<'a> ColumnSpec<'a> {
    pub fn read(data: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let mut r = Reader::at(data, offset);
        let length      = r.u32()?;
        let column_type = ColumnType::from_u8(r.u8()?)?;
        let name        = r.str(StrWidth::W16)?;
        Ok((Self { length, column_type, name }, r.position()))
    }

    pub fn element_size(&self) -> usize { self.column_type.element_size() }

    /// Elements per cell; a string column holds exactly one.
    pub fn element_count(&self) -> usize {
        match self.column_type {
            ColumnType::String => 1,
            t => self.length as usize / t.element_size(),
        }
    }
}

/// Offset of the column spec after the one at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    ColumnSpec::read(data, offset).map(|(_, next)| next)
}

// ── Cell values ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Int(i64),
    Uint(u64),
    /// Raw IEEE half-precision bits.
    Float16(u16),
    Float32(f32),
    Float64(f64),
    /// Bytes up to the first null of the reservation.
    String(&'a [u8]),
    /// Seconds since the UNIX epoch.
    Timestamp(i64),
    /// Nanoseconds since the UNIX epoch.
    HighResolutionTimestamp(i64),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
    pub spec:   ColumnSpec<'a>,
    /// Absolute offset of the cell in the buffer.
    pub offset: usize,
    pub bytes:  &'a [u8],
}

impl<'a> Cell<'a> {
    pub fn len(&self) -> usize { self.spec.element_count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn get(&self, index: usize) -> Option<Value<'a>> {
        if index >= self.len() {
            return None;
        }
        let size = self.spec.element_size();
        let start = index * size;
        let raw = self.bytes.get(start..start + size)?;
        Some(match self.spec.column_type {
            ColumnType::Int8    => Value::Int(raw[0] as i8 as i64),
            ColumnType::Int16   => Value::Int(LittleEndian::read_i16(raw) as i64),
            ColumnType::Int32   => Value::Int(LittleEndian::read_i32(raw) as i64),
            ColumnType::Int64   => Value::Int(LittleEndian::read_i64(raw)),
            ColumnType::Uint8   => Value::Uint(raw[0] as u64),
            ColumnType::Uint16  => Value::Uint(LittleEndian::read_u16(raw) as u64),
            ColumnType::Uint32  => Value::Uint(LittleEndian::read_u32(raw) as u64),
            ColumnType::Uint64  => Value::Uint(LittleEndian::read_u64(raw)),
            ColumnType::Float16 => Value::Float16(LittleEndian::read_u16(raw)),
            ColumnType::Float32 => Value::Float32(LittleEndian::read_f32(raw)),
            ColumnType::Float64 => Value::Float64(LittleEndian::read_f64(raw)),
            ColumnType::String  => Value::String(self.string_bytes()),
            ColumnType::Timestamp => Value::Timestamp(LittleEndian::read_i64(raw)),
            ColumnType::HighResolutionTimestamp => {
                Value::HighResolutionTimestamp(LittleEndian::read_i64(raw))
            }
            ColumnType::Boolean => Value::Boolean(raw[0] != 0),
        })
    }

    pub fn values(&self) -> impl Iterator<Item = Value<'a>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    fn string_bytes(&self) -> &'a [u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(self.bytes.len());
        &self.bytes[..end]
    }

    /// Contents of a string cell, up to the first null.
    pub fn text(&self) -> Result<&'a str> {
        std::str::from_utf8(self.string_bytes()).map_err(|_| Sf3Error::InvalidUtf8 { offset: self.offset })
    }
}

// ── TableView ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    data:         &'a [u8],
    column_count: u16,
    row_length:   u64,
    row_count:    u64,
    spec_length:  u32,
    size:         usize,
}

impl<'a> TableView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let column_count = r.u16()?;
        let row_length   = r.u64()?;
        let row_count    = r.u64()?;
        let spec_length  = r.u32()?;

        let mut offset = HEADER_SIZE;
        let mut columns_length = 0u64;
        for _ in 0..column_count {
            let (spec, next) = ColumnSpec::read(data, offset)?;
            columns_length += spec.length as u64;
            offset = next;
        }
        if offset - HEADER_SIZE != spec_length as usize {
            return Err(Sf3Error::LayoutMismatch {
                what:     "table spec length",
                declared: spec_length as u64,
                actual:   (offset - HEADER_SIZE) as u64,
            });
        }
        if columns_length > row_length {
            return Err(Sf3Error::LayoutMismatch {
                what:     "table row length",
                declared: row_length,
                actual:   columns_length,
            });
        }

        let rows = bytes::checked_product(offset, data.len(), &[row_length, row_count])?;
        let size = bytes::record_end(data, offset, rows)?;
        trace!("table: {column_count} columns, {row_count} rows of {row_length} bytes");
        Ok(Self { data, column_count, row_length, row_count, spec_length, size })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Table)?;
        Self::new(data)
    }

    pub fn column_count(&self) -> u16 { self.column_count }
    pub fn row_length(&self) -> u64 { self.row_length }
    pub fn row_count(&self) -> u64 { self.row_count }
    pub fn spec_length(&self) -> u32 { self.spec_length }
    pub fn size(&self) -> usize { self.size }

    /// Offset of the first column spec.
    pub fn first(&self) -> usize { HEADER_SIZE }

    /// Offset of the first row.
    pub fn data_offset(&self) -> usize { HEADER_SIZE + self.spec_length as usize }

    pub fn columns(&self) -> Columns<'a> {
        Columns { data: self.data, offset: HEADER_SIZE, remaining: self.column_count }
    }

    pub fn column(&self, index: u16) -> Option<ColumnSpec<'a>> {
        if index >= self.column_count {
            return None;
        }
        self.columns().nth(index as usize)?.ok()
    }

    pub fn row(&self, index: u64) -> Option<&'a [u8]> {
        if index >= self.row_count {
            return None;
        }
        let start = self.data_offset() + (index * self.row_length) as usize;
        self.data.get(start..start + self.row_length as usize)
    }

    /// Cell at `(row, column)`, found by summing the preceding column lengths.
    pub fn cell(&self, row: u64, column: u16) -> Option<Cell<'a>> {
        if row >= self.row_count || column >= self.column_count {
            return None;
        }
        let mut within = 0usize;
        let mut columns = self.columns();
        for _ in 0..column {
            within += columns.next()?.ok()?.length as usize;
        }
        let spec = columns.next()?.ok()?;
        self.cell_at(row, within, spec)
    }

    /// Per-column `(offset within row, spec)` pairs, for scanning many rows.
    pub fn column_offsets(&self) -> Result<Vec<(usize, ColumnSpec<'a>)>> {
        let mut within = 0usize;
        let mut out = Vec::with_capacity(self.column_count as usize);
        for spec in self.columns() {
            let spec = spec?;
            out.push((within, spec));
            within += spec.length as usize;
        }
        Ok(out)
    }

    /// Cell using an offset from [`TableView::column_offsets`].
    pub fn cell_at(&self, row: u64, within: usize, spec: ColumnSpec<'a>) -> Option<Cell<'a>> {
        let cell_end = (within as u64).checked_add(spec.length as u64)?;
        if row >= self.row_count || cell_end > self.row_length {
            return None;
        }
        let offset = self.data_offset() + (row * self.row_length) as usize + within;
        let bytes = self.data.get(offset..offset + spec.length as usize)?;
        Some(Cell { spec, offset, bytes })
    }
}

pub struct Columns<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: u16,
}

impl<'a> Iterator for Columns<'a> {
    type Item = Result<ColumnSpec<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match ColumnSpec::read(self.data, self.offset) {
            Ok((spec, next)) => {
                self.offset = next;
                Some(Ok(spec))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    TableView::new(data).map(View::Table)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    TableView::new(data).map(|v| v.size())
}

// ── TableBuilder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
    column_count: u16,
    row_length:   u64,
    row_count:    u64,
    specs:        Vec<u8>,
    rows:         Vec<u8>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a column.  All columns come before the first row.
    pub fn column(&mut self, name: &str, column_type: ColumnType, length: u32) -> Result<&mut Self> {
        if self.row_count > 0 {
            return Err(Sf3Error::LayoutMismatch {
                what:     "table columns declared after rows",
                declared: self.column_count as u64,
                actual:   self.column_count as u64 + 1,
            });
        }
        if self.column_count == u16::MAX {
            return Err(Sf3Error::LengthOverflow { len: self.column_count as usize + 1, width: 16 });
        }
        let mark = self.specs.len();
        self.specs.write_u32::<LittleEndian>(length)?;
        self.specs.write_u8(column_type as u8)?;
        if let Err(e) = string::write(&mut self.specs, name, StrWidth::W16) {
            self.specs.truncate(mark);
            return Err(e);
        }
        self.column_count += 1;
        self.row_length += length as u64;
        Ok(self)
    }

    pub fn row_length(&self) -> u64 { self.row_length }

    /// Append one row of exactly `row_length` bytes.
    pub fn row(&mut self, row: &[u8]) -> Result<&mut Self> {
        if row.len() as u64 != self.row_length {
            return Err(Sf3Error::LayoutMismatch {
                what:     "table row length",
                declared: self.row_length,
                actual:   row.len() as u64,
            });
        }
        self.rows.extend_from_slice(row);
        self.row_count += 1;
        Ok(self)
    }

    pub fn finish(&self) -> Result<Vec<u8>> {
        let spec_length = u32::try_from(self.specs.len())
            .map_err(|_| Sf3Error::LengthOverflow { len: self.specs.len(), width: 32 })?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.specs.len() + self.rows.len());
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u16::<LittleEndian>(self.column_count)?;
        buf.write_u64::<LittleEndian>(self.row_length)?;
        buf.write_u64::<LittleEndian>(self.row_count)?;
        buf.write_u32::<LittleEndian>(spec_length)?;
        buf.extend_from_slice(&self.specs);
        buf.extend_from_slice(&self.rows);

        let size = verify::finalize(&mut buf, FormatId::Table)?;
        buf.truncate(size);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_row(id: u8, name: &str) -> Vec<u8> {
        let mut row = vec![id];
        let mut field = [0u8; 16];
        field[..name.len()].copy_from_slice(name.as_bytes());
        row.extend_from_slice(&field);
        row
    }

    fn people() -> Vec<u8> {
        let mut b = TableBuilder::new();
        b.column("id", ColumnType::Uint8, 1).unwrap()
            .column("name", ColumnType::String, 16).unwrap();
        b.row(&string_row(1, "alice")).unwrap()
            .row(&string_row(2, "bob")).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_cell_offset_and_string_stop_at_null() {
        let buf = people();
        let v = TableView::decode(&buf).unwrap();
        assert_eq!(v.row_length(), 17);
        assert_eq!(v.row_count(), 2);

        let row_start = v.data_offset() + 17;
        let cell = v.cell(1, 1).unwrap();
        assert_eq!(cell.offset, row_start + 1);
        assert_eq!(cell.len(), 1);
        assert_eq!(cell.text().unwrap(), "bob");
        assert_eq!(cell.get(0), Some(Value::String(b"bob")));

        assert_eq!(v.cell(0, 0).unwrap().get(0), Some(Value::Uint(1)));
        assert!(v.cell(2, 0).is_none());
        assert!(v.cell(0, 2).is_none());
        assert_eq!(v.size(), buf.len());
    }

    #[test]
    fn test_column_offsets_match_cell() {
        let buf = people();
        let v = TableView::new(&buf).unwrap();
        let offsets = v.column_offsets().unwrap();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[1].0, 1);
        assert_eq!(offsets[1].1.name, "name");
        let (within, spec) = offsets[1];
        assert_eq!(v.cell_at(0, within, spec).unwrap().text().unwrap(), "alice");
        assert!(v.cell_at(0, usize::MAX, spec).is_none());
        assert_eq!(v.column(0).unwrap().column_type, ColumnType::Uint8);
        assert!(v.column(2).is_none());
    }

    #[test]
    fn test_element_count_and_typed_values() {
        let mut b = TableBuilder::new();
        b.column("xyz", ColumnType::Int16, 6).unwrap()
            .column("at", ColumnType::Timestamp, 8).unwrap()
            .column("ok", ColumnType::Boolean, 1).unwrap();
        let mut row = Vec::new();
        for v in [-1i16, 2, 300] {
            row.extend_from_slice(&v.to_le_bytes());
        }
        row.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        row.push(7);
        b.row(&row).unwrap();
        let buf = b.finish().unwrap();

        let v = TableView::decode(&buf).unwrap();
        let xyz = v.cell(0, 0).unwrap();
        assert_eq!(xyz.len(), 3);
        assert_eq!(xyz.values().collect::<Vec<_>>(), vec![Value::Int(-1), Value::Int(2), Value::Int(300)]);
        assert!(xyz.get(3).is_none());
        assert_eq!(v.cell(0, 1).unwrap().get(0), Some(Value::Timestamp(1_700_000_000)));
        assert_eq!(v.cell(0, 2).unwrap().get(0), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_row_length_enforced_by_builder() {
        let mut b = TableBuilder::new();
        b.column("a", ColumnType::Uint32, 4).unwrap();
        assert!(matches!(b.row(&[0; 3]), Err(Sf3Error::LayoutMismatch { declared: 4, actual: 3, .. })));
    }

    #[test]
    fn test_spec_length_must_match_walk() {
        let mut buf = people();
        buf[34] += 1;
        assert!(matches!(
            TableView::new(&buf),
            Err(Sf3Error::LayoutMismatch { what: "table spec length", .. })
        ));
    }

    #[test]
    fn test_columns_wider_than_row() {
        let mut buf = people();
        // shrink row_length below the 17 bytes the columns need
        buf[18] = 16;
        assert!(matches!(
            TableView::new(&buf),
            Err(Sf3Error::LayoutMismatch { what: "table row length", declared: 16, actual: 17 })
        ));
    }
}
