//! Vector graphic: an ordered list of drawing instructions.

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{F32Array, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::string::{self, StrWidth};
use crate::verify;

pub const HEADER_SIZE: usize = 28;

// ── Geometry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Fill and outline style shared by closed shapes.  36 bytes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fill {
    pub fill_color:        Color,
    pub outline_color:     Color,
    pub outline_thickness: f32,
}

/// Borrowed list of outline points.
#[derive(Debug, Clone, Copy)]
pub struct Outline<'a> {
    coords: F32Array<'a>,
}

impl<'a> Outline<'a> {
    pub fn len(&self) -> usize { self.coords.len() / 2 }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn point(&self, index: usize) -> Option<Point> {
        let i = index.checked_mul(2)?;
        Some(Point { x: self.coords.get(i)?, y: self.coords.get(i + 1)? })
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + 'a {
        let coords = self.coords;
        (0..coords.len() / 2).filter_map(move |i| {
            Some(Point { x: coords.get(2 * i)?, y: coords.get(2 * i + 1)? })
        })
    }
}

impl PartialEq for Outline<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.coords.as_bytes() == other.coords.as_bytes()
    }
}

// ── Instruction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstructionType {
    Line      = 0x01,
    Rectangle = 0x02,
    Circle    = 0x03,
    Polygon   = 0x04,
    Curve     = 0x05,
    Text      = 0x06,
    Identity  = 0x11,
    Matrix    = 0x12,
}

impl InstructionType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(InstructionType::Line),
            0x02 => Ok(InstructionType::Rectangle),
            0x03 => Ok(InstructionType::Circle),
            0x04 => Ok(InstructionType::Polygon),
            0x05 => Ok(InstructionType::Curve),
            0x06 => Ok(InstructionType::Text),
            0x11 => Ok(InstructionType::Identity),
            0x12 => Ok(InstructionType::Matrix),
            other => Err(Sf3Error::InvalidDiscriminant { what: "vector instruction", value: other }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction<'a> {
    Line { color: Color, thickness: f32, outline: Outline<'a> },
    Rectangle { fill: Fill, bounds: Bounds },
    Circle { fill: Fill, bounds: Bounds },
    Polygon { fill: Fill, outline: Outline<'a> },
    Curve { fill: Fill, outline: Outline<'a> },
    Text { point: Point, color: Color, font_size: f32, font: &'a str, text: &'a str },
    Identity,
    /// Affine transform for the instructions that follow.  Not applied here.
    Matrix([f32; 6]),
}

impl<'a> Instruction<'a> {
    pub fn kind(&self) -> InstructionType {
        match self {
            Instruction::Line { .. }      => InstructionType::Line,
            Instruction::Rectangle { .. } => InstructionType::Rectangle,
            Instruction::Circle { .. }    => InstructionType::Circle,
            Instruction::Polygon { .. }   => InstructionType::Polygon,
            Instruction::Curve { .. }     => InstructionType::Curve,
            Instruction::Text { .. }      => InstructionType::Text,
            Instruction::Identity         => InstructionType::Identity,
            Instruction::Matrix(_)        => InstructionType::Matrix,
        }
    }

    /// Decode the instruction at `offset` and return it with the next offset.
    pub fn read(data: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let mut r = Reader::at(data, offset);
        let kind = InstructionType::from_u8(r.u8()?)?;
        let instruction = match kind {
            InstructionType::Line => {
                let color = read_color(&mut r)?;
                let thickness = r.f32()?;
                Instruction::Line { color, thickness, outline: read_outline(&mut r)? }
            }
            InstructionType::Rectangle => {
                Instruction::Rectangle { fill: read_fill(&mut r)?, bounds: read_bounds(&mut r)? }
            }
            InstructionType::Circle => {
                Instruction::Circle { fill: read_fill(&mut r)?, bounds: read_bounds(&mut r)? }
            }
            InstructionType::Polygon => {
                Instruction::Polygon { fill: read_fill(&mut r)?, outline: read_outline(&mut r)? }
            }
            InstructionType::Curve => {
                Instruction::Curve { fill: read_fill(&mut r)?, outline: read_outline(&mut r)? }
            }
            InstructionType::Text => {
                let [x, y] = r.f32_array::<2>()?;
                let color = read_color(&mut r)?;
                let font_size = r.f32()?;
                let font = r.str(StrWidth::W16)?;
                let text = r.str(StrWidth::W16)?;
                Instruction::Text { point: Point { x, y }, color, font_size, font, text }
            }
            InstructionType::Identity => Instruction::Identity,
            InstructionType::Matrix => Instruction::Matrix(r.f32_array::<6>()?),
        };
        Ok((instruction, r.position()))
    }
}

fn read_color(r: &mut Reader<'_>) -> Result<Color> {
    let [cr, cg, cb, ca] = r.f32_array::<4>()?;
    Ok(Color::rgba(cr, cg, cb, ca))
}

fn read_bounds(r: &mut Reader<'_>) -> Result<Bounds> {
    let [x, y, w, h] = r.f32_array::<4>()?;
    Ok(Bounds { x, y, w, h })
}

fn read_fill(r: &mut Reader<'_>) -> Result<Fill> {
    Ok(Fill {
        fill_color:        read_color(r)?,
        outline_color:     read_color(r)?,
        outline_thickness: r.f32()?,
    })
}

fn read_outline<'a>(r: &mut Reader<'a>) -> Result<Outline<'a>> {
    let count = r.u16()? as usize;
    Ok(Outline { coords: r.f32s(count * 2)? })
}

/// Offset of the instruction after the one at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    Instruction::read(data, offset).map(|(_, next)| next)
}

// ── VectorGraphicView ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct VectorGraphicView<'a> {
    data:   &'a [u8],
    width:  u32,
    height: u32,
    count:  u32,
    size:   usize,
}

impl<'a> VectorGraphicView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let width  = r.u32()?;
        let height = r.u32()?;
        let count  = r.u32()?;

        let mut offset = HEADER_SIZE;
        for _ in 0..count {
            offset = advance(data, offset)?;
        }
        trace!("vector graphic {width}x{height}: {count} instructions, {offset} bytes");
        Ok(Self { data, width, height, count, size: offset })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::VectorGraphic)?;
        Self::new(data)
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn count(&self) -> u32 { self.count }
    pub fn size(&self) -> usize { self.size }

    pub fn first(&self) -> usize { HEADER_SIZE }

    pub fn instructions(&self) -> Instructions<'a> {
        Instructions { data: self.data, offset: HEADER_SIZE, remaining: self.count }
    }
}

pub struct Instructions<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: u32,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = Instruction::read(self.data, self.offset).map(|(ins, next)| {
            self.offset = next;
            ins
        });
        if item.is_err() {
            self.remaining = 0;
        }
        Some(item)
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    VectorGraphicView::new(data).map(View::VectorGraphic)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    VectorGraphicView::new(data).map(|v| v.size())
}

// ── VectorGraphicBuilder ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VectorGraphicBuilder {
    width:  u32,
    height: u32,
    count:  u32,
    body:   Vec<u8>,
}

impl VectorGraphicBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, count: 0, body: Vec::new() }
    }

    fn begin(&mut self, kind: InstructionType) -> Result<()> {
        self.body.write_u8(kind as u8)?;
        self.count += 1;
        Ok(())
    }

    fn color(&mut self, c: Color) -> Result<()> {
        for v in [c.r, c.g, c.b, c.a] {
            self.body.write_f32::<LittleEndian>(v)?;
        }
        Ok(())
    }

    fn fill(&mut self, f: &Fill) -> Result<()> {
        self.color(f.fill_color)?;
        self.color(f.outline_color)?;
        self.body.write_f32::<LittleEndian>(f.outline_thickness)?;
        Ok(())
    }

    fn outline(&mut self, points: &[Point]) -> Result<()> {
        let count = u16::try_from(points.len())
            .map_err(|_| Sf3Error::LengthOverflow { len: points.len(), width: 16 })?;
        self.body.write_u16::<LittleEndian>(count)?;
        for p in points {
            self.body.write_f32::<LittleEndian>(p.x)?;
            self.body.write_f32::<LittleEndian>(p.y)?;
        }
        Ok(())
    }

    fn bounds(&mut self, b: &Bounds) -> Result<()> {
        for v in [b.x, b.y, b.w, b.h] {
            self.body.write_f32::<LittleEndian>(v)?;
        }
        Ok(())
    }

    pub fn line(&mut self, color: Color, thickness: f32, points: &[Point]) -> Result<&mut Self> {
        if points.len() > u16::MAX as usize {
            return Err(Sf3Error::LengthOverflow { len: points.len(), width: 16 });
        }
        self.begin(InstructionType::Line)?;
        self.color(color)?;
        self.body.write_f32::<LittleEndian>(thickness)?;
        self.outline(points)?;
        Ok(self)
    }

    pub fn rectangle(&mut self, fill: &Fill, bounds: &Bounds) -> Result<&mut Self> {
        self.begin(InstructionType::Rectangle)?;
        self.fill(fill)?;
        self.bounds(bounds)?;
        Ok(self)
    }

    pub fn circle(&mut self, fill: &Fill, bounds: &Bounds) -> Result<&mut Self> {
        self.begin(InstructionType::Circle)?;
        self.fill(fill)?;
        self.bounds(bounds)?;
        Ok(self)
    }

    pub fn polygon(&mut self, fill: &Fill, points: &[Point]) -> Result<&mut Self> {
        if points.len() > u16::MAX as usize {
            return Err(Sf3Error::LengthOverflow { len: points.len(), width: 16 });
        }
        self.begin(InstructionType::Polygon)?;
        self.fill(fill)?;
        self.outline(points)?;
        Ok(self)
    }

    pub fn curve(&mut self, fill: &Fill, points: &[Point]) -> Result<&mut Self> {
        if points.len() > u16::MAX as usize {
            return Err(Sf3Error::LengthOverflow { len: points.len(), width: 16 });
        }
        self.begin(InstructionType::Curve)?;
        self.fill(fill)?;
        self.outline(points)?;
        Ok(self)
    }

    pub fn text(
        &mut self,
        point: Point,
        color: Color,
        font_size: f32,
        font: &str,
        text: &str,
    ) -> Result<&mut Self> {
        // Encode strings first so a failure leaves the body untouched.
        let mut strings = Vec::with_capacity(
            string::encoded_len(font, StrWidth::W16) + string::encoded_len(text, StrWidth::W16),
        );
        string::write(&mut strings, font, StrWidth::W16)?;
        string::write(&mut strings, text, StrWidth::W16)?;

        self.begin(InstructionType::Text)?;
        self.body.write_f32::<LittleEndian>(point.x)?;
        self.body.write_f32::<LittleEndian>(point.y)?;
        self.color(color)?;
        self.body.write_f32::<LittleEndian>(font_size)?;
        self.body.extend_from_slice(&strings);
        Ok(self)
    }

    pub fn identity(&mut self) -> Result<&mut Self> {
        self.begin(InstructionType::Identity)?;
        Ok(self)
    }

    pub fn matrix(&mut self, elements: [f32; 6]) -> Result<&mut Self> {
        self.begin(InstructionType::Matrix)?;
        for v in elements {
            self.body.write_f32::<LittleEndian>(v)?;
        }
        Ok(self)
    }

    pub fn finish(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.body.len());
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u32::<LittleEndian>(self.width)?;
        buf.write_u32::<LittleEndian>(self.height)?;
        buf.write_u32::<LittleEndian>(self.count)?;
        buf.extend_from_slice(&self.body);

        let size = verify::finalize(&mut buf, FormatId::VectorGraphic)?;
        buf.truncate(size);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);

    fn fill() -> Fill {
        Fill { fill_color: RED, outline_color: Color::rgba(0.0, 0.0, 0.0, 1.0), outline_thickness: 2.0 }
    }

    #[test]
    fn test_instruction_sizes() {
        let tri = [Point { x: 0.0, y: 0.0 }, Point { x: 1.0, y: 0.0 }, Point { x: 0.0, y: 1.0 }];
        let bounds = Bounds { x: 1.0, y: 2.0, w: 3.0, h: 4.0 };

        let mut b = VectorGraphicBuilder::new(100, 50);
        b.line(RED, 1.5, &tri).unwrap()
            .rectangle(&fill(), &bounds).unwrap()
            .circle(&fill(), &bounds).unwrap()
            .polygon(&fill(), &tri).unwrap()
            .curve(&fill(), &tri[..2]).unwrap()
            .text(Point { x: 5.0, y: 6.0 }, RED, 12.0, "Sans", "hi").unwrap()
            .identity().unwrap()
            .matrix([1.0, 0.0, 0.0, 1.0, 10.0, 20.0]).unwrap();
        let buf = b.finish().unwrap();

        let mut offset = HEADER_SIZE;
        let mut sizes = Vec::new();
        for _ in 0..8 {
            let next = advance(&buf, offset).unwrap();
            sizes.push(next - offset);
            offset = next;
        }
        assert_eq!(sizes, vec![
            1 + 16 + 4 + 2 + 24,
            53,
            53,
            1 + 36 + 2 + 24,
            1 + 36 + 2 + 16,
            1 + 8 + 16 + 4 + 7 + 5,
            1,
            25,
        ]);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_instructions_round_trip() {
        let tri = [Point { x: 0.0, y: 0.0 }, Point { x: 1.0, y: 0.0 }, Point { x: 0.0, y: 1.0 }];
        let mut b = VectorGraphicBuilder::new(64, 64);
        b.polygon(&fill(), &tri).unwrap()
            .text(Point { x: 1.0, y: 2.0 }, RED, 9.5, "Serif", "label").unwrap()
            .matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]).unwrap();
        let buf = b.finish().unwrap();

        let v = VectorGraphicView::decode(&buf).unwrap();
        assert_eq!((v.width(), v.height(), v.count()), (64, 64, 3));
        let ins: Vec<_> = v.instructions().collect::<Result<_>>().unwrap();

        match ins[0] {
            Instruction::Polygon { fill: f, outline } => {
                assert_eq!(f, fill());
                assert_eq!(outline.len(), 3);
                assert_eq!(outline.point(2), Some(Point { x: 0.0, y: 1.0 }));
                assert_eq!(outline.point(3), None);
                assert_eq!(outline.points().count(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ins[1], Instruction::Text {
            point:     Point { x: 1.0, y: 2.0 },
            color:     RED,
            font_size: 9.5,
            font:      "Serif",
            text:      "label",
        });
        assert_eq!(ins[2], Instruction::Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]));
        assert_eq!(ins[2].kind(), InstructionType::Matrix);
    }

    #[test]
    fn test_unknown_instruction_is_rejected() {
        let mut b = VectorGraphicBuilder::new(1, 1);
        b.identity().unwrap();
        let mut buf = b.finish().unwrap();
        buf[HEADER_SIZE] = 0x07;
        assert!(matches!(
            VectorGraphicView::new(&buf),
            Err(Sf3Error::InvalidDiscriminant { what: "vector instruction", value: 0x07 })
        ));
    }

    #[test]
    fn test_outline_count_past_end() {
        let mut b = VectorGraphicBuilder::new(1, 1);
        b.line(RED, 1.0, &[Point::default()]).unwrap();
        let mut buf = b.finish().unwrap();
        buf[HEADER_SIZE + 21] = 2;
        assert!(matches!(VectorGraphicView::new(&buf), Err(Sf3Error::Truncated { .. })));
    }

    #[test]
    fn test_count_bounds_iteration() {
        let mut b = VectorGraphicBuilder::new(1, 1);
        b.identity().unwrap().identity().unwrap();
        let mut buf = b.finish().unwrap();
        buf[24] = 1;
        // the second instruction is trailing data, not part of the graphic
        let v = VectorGraphicView::new(&buf).unwrap();
        assert_eq!(v.instructions().count(), 1);
        assert_eq!(v.size(), HEADER_SIZE + 1);
    }
}
