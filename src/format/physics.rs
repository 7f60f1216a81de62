//! Physics model: mass properties plus a list of collision shapes.

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{F32Array, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::verify;

pub const HEADER_SIZE: usize = 58;
/// Transform matrix plus type byte, common to every shape.
pub const SHAPE_PREFIX_SIZE: usize = 65;

pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShapeType {
    Ellipsoid = 0x01,
    Box       = 0x02,
    Cylinder  = 0x03,
    Pill      = 0x04,
    Mesh      = 0x05,
}

impl ShapeType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(ShapeType::Ellipsoid),
            0x02 => Ok(ShapeType::Box),
            0x03 => Ok(ShapeType::Cylinder),
            0x04 => Ok(ShapeType::Pill),
            0x05 => Ok(ShapeType::Mesh),
            other => Err(Sf3Error::InvalidDiscriminant { what: "physics shape", value: other }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeType::Ellipsoid => "ellipsoid",
            ShapeType::Box       => "box",
            ShapeType::Cylinder  => "cylinder",
            ShapeType::Pill      => "pill",
            ShapeType::Mesh      => "mesh",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ShapeKind<'a> {
    Ellipsoid { w: f32, h: f32, d: f32 },
    Box { w: f32, h: f32, d: f32 },
    Cylinder { bottom_radius: f32, top_radius: f32, height: f32 },
    Pill { bottom_radius: f32, top_radius: f32, height: f32 },
    /// Convex hull vertices as packed `x, y, z` triples.
    Mesh { vertices: F32Array<'a> },
}

impl ShapeKind<'_> {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeKind::Ellipsoid { .. } => ShapeType::Ellipsoid,
            ShapeKind::Box { .. }       => ShapeType::Box,
            ShapeKind::Cylinder { .. }  => ShapeType::Cylinder,
            ShapeKind::Pill { .. }      => ShapeType::Pill,
            ShapeKind::Mesh { .. }      => ShapeType::Mesh,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Shape<'a> {
    pub transform: [f32; 16],
    pub kind:      ShapeKind<'a>,
}

impl<'a> Shape<'a> {
    pub fn read(data: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let mut r = Reader::at(data, offset);
        let transform = r.f32_array::<16>()?;
        let kind = match ShapeType::from_u8(r.u8()?)? {
            ShapeType::Ellipsoid => {
                let [w, h, d] = r.f32_array::<3>()?;
                ShapeKind::Ellipsoid { w, h, d }
            }
            ShapeType::Box => {
                let [w, h, d] = r.f32_array::<3>()?;
                ShapeKind::Box { w, h, d }
            }
            ShapeType::Cylinder => {
                let [bottom_radius, top_radius, height] = r.f32_array::<3>()?;
                ShapeKind::Cylinder { bottom_radius, top_radius, height }
            }
            ShapeType::Pill => {
                let [bottom_radius, top_radius, height] = r.f32_array::<3>()?;
                ShapeKind::Pill { bottom_radius, top_radius, height }
            }
            ShapeType::Mesh => {
                let count = r.u16()? as usize;
                ShapeKind::Mesh { vertices: r.f32s(count * 3)? }
            }
        };
        Ok((Self { transform, kind }, r.position()))
    }
}

/// Offset of the shape after the one at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    Shape::read(data, offset).map(|(_, next)| next)
}

// ── PhysicsModelView ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PhysicsModelView<'a> {
    data:        &'a [u8],
    mass:        f32,
    tensor:      [f32; 9],
    shape_count: u16,
    size:        usize,
}

impl<'a> PhysicsModelView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let mass        = r.f32()?;
        let tensor      = r.f32_array::<9>()?;
        let shape_count = r.u16()?;

        let mut offset = HEADER_SIZE;
        for _ in 0..shape_count {
            offset = advance(data, offset)?;
        }
        trace!("physics model: {shape_count} shapes, {offset} bytes");
        Ok(Self { data, mass, tensor, shape_count, size: offset })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::PhysicsModel)?;
        Self::new(data)
    }

    pub fn mass(&self) -> f32 { self.mass }
    /// Row-major 3x3 inertia tensor.
    pub fn tensor(&self) -> [f32; 9] { self.tensor }
    pub fn shape_count(&self) -> u16 { self.shape_count }
    pub fn size(&self) -> usize { self.size }

    pub fn first(&self) -> usize { HEADER_SIZE }

    pub fn shapes(&self) -> Shapes<'a> {
        Shapes { data: self.data, offset: HEADER_SIZE, remaining: self.shape_count }
    }
}

pub struct Shapes<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: u16,
}

impl<'a> Iterator for Shapes<'a> {
    type Item = Result<Shape<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match Shape::read(self.data, self.offset) {
            Ok((shape, next)) => {
                self.offset = next;
                Some(Ok(shape))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    PhysicsModelView::new(data).map(View::PhysicsModel)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    PhysicsModelView::new(data).map(|v| v.size())
}

// ── PhysicsModelBuilder ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PhysicsModelBuilder {
    mass:   f32,
    tensor: [f32; 9],
    count:  u16,
    shapes: Vec<u8>,
}

impl PhysicsModelBuilder {
    pub fn new(mass: f32, tensor: [f32; 9]) -> Self {
        Self { mass, tensor, count: 0, shapes: Vec::new() }
    }

    fn push(&mut self, transform: &[f32; 16], kind: ShapeType, body: &[f32], mesh_count: Option<u16>) -> Result<&mut Self> {
        if self.count == u16::MAX {
            return Err(Sf3Error::LengthOverflow { len: self.count as usize + 1, width: 16 });
        }
        for v in transform {
            self.shapes.write_f32::<LittleEndian>(*v)?;
        }
        self.shapes.write_u8(kind as u8)?;
        if let Some(n) = mesh_count {
            self.shapes.write_u16::<LittleEndian>(n)?;
        }
        for v in body {
            self.shapes.write_f32::<LittleEndian>(*v)?;
        }
        self.count += 1;
        Ok(self)
    }

    pub fn ellipsoid(&mut self, transform: &[f32; 16], w: f32, h: f32, d: f32) -> Result<&mut Self> {
        self.push(transform, ShapeType::Ellipsoid, &[w, h, d], None)
    }

    pub fn cuboid(&mut self, transform: &[f32; 16], w: f32, h: f32, d: f32) -> Result<&mut Self> {
        self.push(transform, ShapeType::Box, &[w, h, d], None)
    }

    pub fn cylinder(&mut self, transform: &[f32; 16], bottom_radius: f32, top_radius: f32, height: f32) -> Result<&mut Self> {
        self.push(transform, ShapeType::Cylinder, &[bottom_radius, top_radius, height], None)
    }

    pub fn pill(&mut self, transform: &[f32; 16], bottom_radius: f32, top_radius: f32, height: f32) -> Result<&mut Self> {
        self.push(transform, ShapeType::Pill, &[bottom_radius, top_radius, height], None)
    }

    /// `vertices` holds `x, y, z` triples.
    pub fn mesh(&mut self, transform: &[f32; 16], vertices: &[f32]) -> Result<&mut Self> {
        if vertices.len() % 3 != 0 {
            return Err(Sf3Error::LayoutMismatch {
                what:     "mesh vertex floats",
                declared: (vertices.len() / 3 * 3) as u64,
                actual:   vertices.len() as u64,
            });
        }
        let count = u16::try_from(vertices.len() / 3)
            .map_err(|_| Sf3Error::LengthOverflow { len: vertices.len() / 3, width: 16 })?;
        self.push(transform, ShapeType::Mesh, vertices, Some(count))
    }

    pub fn finish(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.shapes.len());
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_f32::<LittleEndian>(self.mass)?;
        for v in self.tensor {
            buf.write_f32::<LittleEndian>(v)?;
        }
        buf.write_u16::<LittleEndian>(self.count)?;
        buf.extend_from_slice(&self.shapes);

        let size = verify::finalize(&mut buf, FormatId::PhysicsModel)?;
        buf.truncate(size);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TENSOR: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0];

    #[test]
    fn test_shape_sizes() {
        let mut b = PhysicsModelBuilder::new(5.0, TENSOR);
        b.ellipsoid(&IDENTITY, 1.0, 2.0, 3.0).unwrap()
            .cuboid(&IDENTITY, 1.0, 1.0, 1.0).unwrap()
            .cylinder(&IDENTITY, 0.5, 0.25, 2.0).unwrap()
            .pill(&IDENTITY, 0.5, 0.5, 1.0).unwrap()
            .mesh(&IDENTITY, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let buf = b.finish().unwrap();

        let mut offset = HEADER_SIZE;
        let mut sizes = Vec::new();
        for _ in 0..5 {
            let next = advance(&buf, offset).unwrap();
            sizes.push(next - offset);
            offset = next;
        }
        assert_eq!(sizes, vec![77, 77, 77, 77, 67 + 12 * 4]);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_physics_round_trip() {
        let mut shifted = IDENTITY;
        shifted[12] = 4.0;
        let mut b = PhysicsModelBuilder::new(12.5, TENSOR);
        b.cylinder(&shifted, 0.5, 0.25, 2.0).unwrap()
            .mesh(&IDENTITY, &[1.0, 2.0, 3.0]).unwrap();
        let buf = b.finish().unwrap();

        let v = PhysicsModelView::decode(&buf).unwrap();
        assert_eq!(v.mass(), 12.5);
        assert_eq!(v.tensor(), TENSOR);
        assert_eq!(v.shape_count(), 2);

        let shapes: Vec<_> = v.shapes().collect::<Result<_>>().unwrap();
        assert_eq!(shapes[0].transform[12], 4.0);
        assert!(matches!(
            shapes[0].kind,
            ShapeKind::Cylinder { bottom_radius, top_radius, height }
                if bottom_radius == 0.5 && top_radius == 0.25 && height == 2.0
        ));
        match shapes[1].kind {
            ShapeKind::Mesh { vertices } => assert_eq!(vertices.to_vec(), vec![1.0, 2.0, 3.0]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(shapes[1].kind.shape_type().name(), "mesh");
    }

    #[test]
    fn test_unknown_shape_type() {
        let mut b = PhysicsModelBuilder::new(1.0, TENSOR);
        b.cuboid(&IDENTITY, 1.0, 1.0, 1.0).unwrap();
        let mut buf = b.finish().unwrap();
        buf[HEADER_SIZE + 64] = 6;
        assert!(matches!(
            PhysicsModelView::new(&buf),
            Err(Sf3Error::InvalidDiscriminant { what: "physics shape", value: 6 })
        ));
    }

    #[test]
    fn test_mesh_vertex_floats_must_be_triples() {
        let mut b = PhysicsModelBuilder::new(1.0, TENSOR);
        assert!(b.mesh(&IDENTITY, &[1.0, 2.0]).is_err());
    }
}
