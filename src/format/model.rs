//! 3D model: texture paths, a face index list and packed vertex floats.

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{self, F32Array, Reader, U32Array};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::string::{self, StrWidth};
use crate::verify;

pub const HEADER_SIZE: usize = 22;

// ── Vertex format ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VertexAttribute {
    Position = 0x01,
    Uv       = 0x02,
    Color    = 0x04,
    Normal   = 0x08,
    Tangent  = 0x10,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 5] = [
        VertexAttribute::Position,
        VertexAttribute::Uv,
        VertexAttribute::Color,
        VertexAttribute::Normal,
        VertexAttribute::Tangent,
    ];

    /// Floats this attribute contributes to each vertex.
    pub fn float_count(self) -> usize {
        match self {
            VertexAttribute::Uv => 2,
            _ => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VertexAttribute::Position => "position",
            VertexAttribute::Uv       => "uv",
            VertexAttribute::Color    => "color",
            VertexAttribute::Normal   => "normal",
            VertexAttribute::Tangent  => "tangent",
        }
    }
}

/// Set of vertex attributes, in on-disk bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexFormat(u8);

impl VertexFormat {
    const VALID: u8 = 0x1F;

    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::VALID != 0 {
            return Err(Sf3Error::InvalidDiscriminant { what: "model vertex format", value: bits });
        }
        Ok(Self(bits))
    }

    pub fn of(attributes: &[VertexAttribute]) -> Self {
        Self(attributes.iter().fold(0, |acc, a| acc | *a as u8))
    }

    pub fn bits(self) -> u8 { self.0 }

    pub fn contains(self, attribute: VertexAttribute) -> bool {
        self.0 & attribute as u8 != 0
    }

    pub fn attributes(self) -> impl Iterator<Item = VertexAttribute> {
        VertexAttribute::ALL.into_iter().filter(move |a| self.contains(*a))
    }

    /// Floats per vertex.
    pub fn stride(self) -> usize {
        self.attributes().map(VertexAttribute::float_count).sum()
    }
}

// ── Materials ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MaterialType {
    Albedo    = 0x01,
    Normal    = 0x02,
    Metallic  = 0x04,
    Metalness = 0x08,
    Roughness = 0x10,
    Occlusion = 0x20,
    Specular  = 0x40,
    Emission  = 0x80,
}

impl MaterialType {
    pub const ALL: [MaterialType; 8] = [
        MaterialType::Albedo,
        MaterialType::Normal,
        MaterialType::Metallic,
        MaterialType::Metalness,
        MaterialType::Roughness,
        MaterialType::Occlusion,
        MaterialType::Specular,
        MaterialType::Emission,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaterialType::Albedo    => "albedo",
            MaterialType::Normal    => "normal",
            MaterialType::Metallic  => "metallic",
            MaterialType::Metalness => "metalness",
            MaterialType::Roughness => "roughness",
            MaterialType::Occlusion => "occlusion",
            MaterialType::Specular  => "specular",
            MaterialType::Emission  => "emission",
        }
    }
}

/// Set of materials carried by the model.  Every bit is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Materials(u8);

impl Materials {
    pub fn from_bits(bits: u8) -> Self { Self(bits) }

    pub fn bits(self) -> u8 { self.0 }

    /// Number of textures stored.
    pub fn count(self) -> usize { self.0.count_ones() as usize }

    pub fn contains(self, material: MaterialType) -> bool {
        self.0 & material as u8 != 0
    }

    /// Material of the `index`-th texture: the `index`-th set bit.
    pub fn nth(self, index: usize) -> Option<MaterialType> {
        MaterialType::ALL.into_iter().filter(|m| self.contains(*m)).nth(index)
    }
}

// ── ModelView ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ModelView<'a> {
    data:          &'a [u8],
    vertex_format: VertexFormat,
    materials:     Materials,
    material_size: u32,
    faces:         U32Array<'a>,
    vertices:      F32Array<'a>,
    size:          usize,
}

impl<'a> ModelView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let vertex_format = VertexFormat::from_bits(r.u8()?)?;
        let materials     = Materials::from_bits(r.u8()?);
        let material_size = r.u32()?;

        let textures_end = bytes::record_end(data, HEADER_SIZE, material_size as u64)?;
        let mut offset = HEADER_SIZE;
        for _ in 0..materials.count() {
            offset = advance(data, offset)?;
            if offset > textures_end {
                break;
            }
        }
        if offset != textures_end {
            return Err(Sf3Error::LayoutMismatch {
                what:     "model material size",
                declared: material_size as u64,
                actual:   (offset - HEADER_SIZE) as u64,
            });
        }

        let mut r = Reader::at(data, textures_end);
        let face_count = r.u32()?;
        let faces = r.u32s(face_count as usize)?;
        let float_count = r.u32()?;
        let vertices = r.f32s(float_count as usize)?;
        let size = r.position();
        trace!(
            "model: {} textures, {} indices, {} floats",
            materials.count(),
            face_count,
            float_count
        );
        Ok(Self { data, vertex_format, materials, material_size, faces, vertices, size })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Model)?;
        Self::new(data)
    }

    pub fn vertex_format(&self) -> VertexFormat { self.vertex_format }
    pub fn materials(&self) -> Materials { self.materials }
    pub fn material_size(&self) -> u32 { self.material_size }
    pub fn size(&self) -> usize { self.size }

    pub fn texture_count(&self) -> usize { self.materials.count() }

    pub fn texture_material(&self, index: usize) -> Option<MaterialType> {
        self.materials.nth(index)
    }

    pub fn textures(&self) -> Textures<'a> {
        Textures { data: self.data, offset: HEADER_SIZE, remaining: self.materials.count() }
    }

    pub fn texture(&self, index: usize) -> Option<&'a str> {
        self.textures().nth(index)?.ok()
    }

    /// Vertex indices, three per face.
    pub fn faces(&self) -> U32Array<'a> { self.faces }

    pub fn index(&self, i: usize) -> Option<u32> { self.faces.get(i) }

    pub fn vertices(&self) -> F32Array<'a> { self.vertices }

    pub fn float(&self, i: usize) -> Option<f32> { self.vertices.get(i) }

    pub fn vertex_stride(&self) -> usize { self.vertex_format.stride() }

    /// Whole vertices stored; 0 when the format has no attributes.
    pub fn vertex_count(&self) -> usize {
        match self.vertex_stride() {
            0 => 0,
            stride => self.vertices.len() / stride,
        }
    }

    /// The floats of vertex `i`.
    pub fn vertex(&self, i: usize) -> Option<F32Array<'a>> {
        if i >= self.vertex_count() {
            return None;
        }
        let stride = self.vertex_stride();
        self.vertices.sub(i * stride, stride)
    }
}

/// Offset of the texture string after the one at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    string::read(data, offset, StrWidth::W16).map(|(_, next)| next)
}

pub struct Textures<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: usize,
}

impl<'a> Iterator for Textures<'a> {
    type Item = Result<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match string::read(self.data, self.offset, StrWidth::W16) {
            Ok((s, next)) => {
                self.offset = next;
                Some(Ok(s))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    ModelView::new(data).map(View::Model)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    ModelView::new(data).map(|v| v.size())
}

// ── ModelBuilder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModelBuilder {
    vertex_format: VertexFormat,
    textures:      Vec<(MaterialType, String)>,
    faces:         Vec<u32>,
    vertices:      Vec<f32>,
}

impl ModelBuilder {
    pub fn new(vertex_format: VertexFormat) -> Self {
        Self { vertex_format, textures: Vec::new(), faces: Vec::new(), vertices: Vec::new() }
    }

    /// Attach the texture for `material`.  Textures are written in material
    /// bit order regardless of the order they are added in.
    pub fn texture(&mut self, material: MaterialType, path: &str) -> Result<&mut Self> {
        if path.len() as u64 + 1 > StrWidth::W16.max_len() {
            return Err(Sf3Error::LengthOverflow { len: path.len(), width: 16 });
        }
        match self.textures.iter_mut().find(|(m, _)| *m == material) {
            Some(existing) => existing.1 = path.to_string(),
            None => self.textures.push((material, path.to_string())),
        }
        Ok(self)
    }

    pub fn faces(&mut self, indices: &[u32]) -> &mut Self {
        self.faces.extend_from_slice(indices);
        self
    }

    /// Append vertex floats packed according to the vertex format.
    pub fn vertices(&mut self, floats: &[f32]) -> &mut Self {
        self.vertices.extend_from_slice(floats);
        self
    }

    pub fn finish(&self) -> Result<Vec<u8>> {
        let stride = self.vertex_format.stride();
        if stride != 0 && self.vertices.len() % stride != 0 {
            return Err(Sf3Error::LayoutMismatch {
                what:     "model vertex floats",
                declared: (self.vertices.len() / stride * stride) as u64,
                actual:   self.vertices.len() as u64,
            });
        }

        let mut textures = self.textures.clone();
        textures.sort_by_key(|(m, _)| *m);
        let mut materials = Vec::new();
        for (_, path) in &textures {
            string::write(&mut materials, path, StrWidth::W16)?;
        }
        let material_bits = textures.iter().fold(0u8, |acc, (m, _)| acc | *m as u8);
        let material_size = u32::try_from(materials.len())
            .map_err(|_| Sf3Error::LengthOverflow { len: materials.len(), width: 32 })?;
        let face_count = u32::try_from(self.faces.len())
            .map_err(|_| Sf3Error::LengthOverflow { len: self.faces.len(), width: 32 })?;
        let float_count = u32::try_from(self.vertices.len())
            .map_err(|_| Sf3Error::LengthOverflow { len: self.vertices.len(), width: 32 })?;

        let mut buf = Vec::with_capacity(
            HEADER_SIZE + materials.len() + 8 + 4 * (self.faces.len() + self.vertices.len()),
        );
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u8(self.vertex_format.bits())?;
        buf.write_u8(material_bits)?;
        buf.write_u32::<LittleEndian>(material_size)?;
        buf.extend_from_slice(&materials);
        buf.write_u32::<LittleEndian>(face_count)?;
        for i in &self.faces {
            buf.write_u32::<LittleEndian>(*i)?;
        }
        buf.write_u32::<LittleEndian>(float_count)?;
        for f in &self.vertices {
            buf.write_f32::<LittleEndian>(*f)?;
        }

        let size = verify::finalize(&mut buf, FormatId::Model)?;
        buf.truncate(size);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured_quad() -> Vec<u8> {
        let format = VertexFormat::of(&[VertexAttribute::Position, VertexAttribute::Uv]);
        let mut b = ModelBuilder::new(format);
        b.texture(MaterialType::Roughness, "rough.png").unwrap()
            .texture(MaterialType::Albedo, "albedo.png").unwrap();
        b.faces(&[0, 1, 2, 2, 3, 0]).vertices(&[
            0.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 0.0, 0.0, 1.0, 0.0,
            1.0, 1.0, 0.0, 1.0, 1.0,
            0.0, 1.0, 0.0, 0.0, 1.0,
        ]);
        b.finish().unwrap()
    }

    #[test]
    fn test_stride_weights() {
        assert_eq!(VertexFormat::from_bits(0x1F).unwrap().stride(), 14);
        assert_eq!(VertexFormat::from_bits(0x03).unwrap().stride(), 5);
        assert_eq!(VertexFormat::from_bits(0).unwrap().stride(), 0);
        assert!(matches!(
            VertexFormat::from_bits(0x20),
            Err(Sf3Error::InvalidDiscriminant { what: "model vertex format", value: 0x20 })
        ));
    }

    #[test]
    fn test_texture_material_is_nth_set_bit() {
        let m = Materials::from_bits(0b1001_0010);
        assert_eq!(m.count(), 3);
        assert_eq!(m.nth(0), Some(MaterialType::Normal));
        assert_eq!(m.nth(1), Some(MaterialType::Roughness));
        assert_eq!(m.nth(2), Some(MaterialType::Emission));
        assert_eq!(m.nth(3), None);
    }

    #[test]
    fn test_model_round_trip() {
        let buf = textured_quad();
        let v = ModelView::decode(&buf).unwrap();
        assert_eq!(v.size(), buf.len());
        assert_eq!(v.texture_count(), 2);
        assert_eq!(v.texture(0), Some("albedo.png"));
        assert_eq!(v.texture_material(0), Some(MaterialType::Albedo));
        assert_eq!(v.texture(1), Some("rough.png"));
        assert_eq!(v.texture_material(1), Some(MaterialType::Roughness));
        assert_eq!(v.material_size() as usize, (2 + 11) + (2 + 10));

        assert_eq!(v.faces().len(), 6);
        assert_eq!(v.index(4), Some(3));
        assert_eq!(v.index(6), None);
        assert_eq!(v.vertex_stride(), 5);
        assert_eq!(v.vertex_count(), 4);
        assert_eq!(v.vertex(2).unwrap().to_vec(), vec![1.0, 1.0, 0.0, 1.0, 1.0]);
        assert!(v.vertex(4).is_none());
        assert_eq!(v.float(19), Some(1.0));
        assert_eq!(v.float(20), None);
    }

    #[test]
    fn test_material_size_must_match_textures() {
        let mut buf = textured_quad();
        buf[18] += 1;
        assert!(ModelView::new(&buf).is_err());
    }

    #[test]
    fn test_partial_vertex_rejected_by_builder() {
        let mut b = ModelBuilder::new(VertexFormat::of(&[VertexAttribute::Position]));
        b.vertices(&[1.0, 2.0]);
        assert!(matches!(b.finish(), Err(Sf3Error::LayoutMismatch { .. })));
    }

    #[test]
    fn test_no_stride_means_no_vertices() {
        let mut b = ModelBuilder::new(VertexFormat::default());
        b.vertices(&[1.0, 2.0, 3.0]);
        let buf = b.finish().unwrap();
        let v = ModelView::decode(&buf).unwrap();
        assert_eq!(v.vertex_count(), 0);
        assert_eq!(v.vertices().len(), 3);
    }
}
