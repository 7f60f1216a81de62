//! Raster image: up to three dimensions of packed pixels.

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{self, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::verify;

pub const HEADER_SIZE: usize = 30;

/// Per-channel encoding.  The low nibble is the channel size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    Int8    = 0x01,
    Int16   = 0x02,
    Int32   = 0x04,
    Int64   = 0x08,
    Uint8   = 0x11,
    Uint16  = 0x12,
    Uint32  = 0x14,
    Uint64  = 0x18,
    Float16 = 0x22,
    Float32 = 0x24,
    Float64 = 0x28,
}

impl PixelFormat {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(PixelFormat::Int8),
            0x02 => Ok(PixelFormat::Int16),
            0x04 => Ok(PixelFormat::Int32),
            0x08 => Ok(PixelFormat::Int64),
            0x11 => Ok(PixelFormat::Uint8),
            0x12 => Ok(PixelFormat::Uint16),
            0x14 => Ok(PixelFormat::Uint32),
            0x18 => Ok(PixelFormat::Uint64),
            0x22 => Ok(PixelFormat::Float16),
            0x24 => Ok(PixelFormat::Float32),
            0x28 => Ok(PixelFormat::Float64),
            other => Err(Sf3Error::InvalidDiscriminant { what: "image pixel format", value: other }),
        }
    }

    #[inline]
    pub fn channel_size(self) -> usize {
        (self as u8 & 0x0F) as usize
    }
}

/// Channel order.  The low nibble is the channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelLayout {
    V    = 0x01,
    Va   = 0x02,
    Rgb  = 0x03,
    Rgba = 0x04,
    Av   = 0x12,
    Bgr  = 0x13,
    Abgr = 0x14,
    Argb = 0x24,
    Bgra = 0x34,
    Cmyk = 0x44,
    Kymc = 0x54,
}

impl ChannelLayout {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(ChannelLayout::V),
            0x02 => Ok(ChannelLayout::Va),
            0x03 => Ok(ChannelLayout::Rgb),
            0x04 => Ok(ChannelLayout::Rgba),
            0x12 => Ok(ChannelLayout::Av),
            0x13 => Ok(ChannelLayout::Bgr),
            0x14 => Ok(ChannelLayout::Abgr),
            0x24 => Ok(ChannelLayout::Argb),
            0x34 => Ok(ChannelLayout::Bgra),
            0x44 => Ok(ChannelLayout::Cmyk),
            0x54 => Ok(ChannelLayout::Kymc),
            other => Err(Sf3Error::InvalidDiscriminant { what: "image channel layout", value: other }),
        }
    }

    #[inline]
    pub fn channel_count(self) -> usize {
        (self as u8 & 0x0F) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelLayout::V    => "V",
            ChannelLayout::Va   => "VA",
            ChannelLayout::Rgb  => "RGB",
            ChannelLayout::Rgba => "RGBA",
            ChannelLayout::Av   => "AV",
            ChannelLayout::Bgr  => "BGR",
            ChannelLayout::Abgr => "ABGR",
            ChannelLayout::Argb => "ARGB",
            ChannelLayout::Bgra => "BGRA",
            ChannelLayout::Cmyk => "CMYK",
            ChannelLayout::Kymc => "KYMC",
        }
    }
}

// ── ImageView ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data:     &'a [u8],
    width:    u32,
    height:   u32,
    depth:    u32,
    channels: ChannelLayout,
    format:   PixelFormat,
    size:     usize,
}

impl<'a> ImageView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let width    = r.u32()?;
        let height   = r.u32()?;
        let depth    = r.u32()?;
        let channels = ChannelLayout::from_u8(r.u8()?)?;
        let format   = PixelFormat::from_u8(r.u8()?)?;

        let payload = bytes::checked_product(
            HEADER_SIZE,
            data.len(),
            &[
                width as u64,
                height as u64,
                depth as u64,
                channels.channel_count() as u64,
                format.channel_size() as u64,
            ],
        )?;
        let size = bytes::record_end(data, HEADER_SIZE, payload)?;
        trace!("image: {width}x{height}x{depth} {}, {size} bytes", channels.name());
        Ok(Self { data, width, height, depth, channels, format, size })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Image)?;
        Self::new(data)
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn depth(&self) -> u32 { self.depth }
    pub fn channels(&self) -> ChannelLayout { self.channels }
    pub fn format(&self) -> PixelFormat { self.format }
    pub fn size(&self) -> usize { self.size }

    pub fn channel_count(&self) -> usize { self.channels.channel_count() }

    /// Bytes per pixel.
    pub fn pixel_stride(&self) -> usize {
        self.channels.channel_count() * self.format.channel_size()
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    pub fn pixels(&self) -> &'a [u8] {
        &self.data[HEADER_SIZE..self.size]
    }

    /// Pixel at `(x, y, z)`; rows are `width` pixels, layers `height` rows.
    pub fn pixel(&self, x: u32, y: u32, z: u32) -> Option<&'a [u8]> {
        if x >= self.width || y >= self.height || z >= self.depth {
            return None;
        }
        let index = (z as usize * self.height as usize + y as usize) * self.width as usize + x as usize;
        let stride = self.pixel_stride();
        let start = HEADER_SIZE + index * stride;
        self.data.get(start..start + stride)
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    ImageView::new(data).map(View::Image)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    ImageView::new(data).map(|v| v.size())
}

// ── ImageBuilder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ImageBuilder {
    width:    u32,
    height:   u32,
    depth:    u32,
    channels: ChannelLayout,
    format:   PixelFormat,
    pixels:   Vec<u8>,
}

impl ImageBuilder {
    pub fn new(width: u32, height: u32, channels: ChannelLayout, format: PixelFormat) -> Self {
        Self { width, height, depth: 1, channels, format, pixels: Vec::new() }
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn push_pixels(&mut self, pixels: &[u8]) -> &mut Self {
        self.pixels.extend_from_slice(pixels);
        self
    }

    /// Fails with `LayoutMismatch` unless the pixel bytes fill the geometry.
    pub fn finish(&self) -> Result<Vec<u8>> {
        let expected = bytes::checked_product(HEADER_SIZE, self.pixels.len(), &[
            self.width as u64,
            self.height as u64,
            self.depth as u64,
            (self.channels.channel_count() * self.format.channel_size()) as u64,
        ])?;
        if expected != self.pixels.len() as u64 {
            return Err(Sf3Error::LayoutMismatch {
                what:     "image pixel bytes",
                declared: expected,
                actual:   self.pixels.len() as u64,
            });
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.pixels.len());
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u32::<LittleEndian>(self.width)?;
        buf.write_u32::<LittleEndian>(self.height)?;
        buf.write_u32::<LittleEndian>(self.depth)?;
        buf.write_u8(self.channels as u8)?;
        buf.write_u8(self.format as u8)?;
        buf.extend_from_slice(&self.pixels);

        let size = verify::finalize(&mut buf, FormatId::Image)?;
        buf.truncate(size);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_2x2() -> Vec<u8> {
        let mut b = ImageBuilder::new(2, 2, ChannelLayout::Rgb, PixelFormat::Uint8);
        b.push_pixels(&[
            255, 0, 0,   0, 255, 0,
            0, 0, 255,   9, 9, 9,
        ]);
        b.finish().unwrap()
    }

    #[test]
    fn test_rgb_round_trip() {
        let buf = rgb_2x2();
        assert_eq!(buf.len(), 30 + 12);
        let v = ImageView::decode(&buf).unwrap();
        assert_eq!((v.width(), v.height(), v.depth()), (2, 2, 1));
        assert_eq!(v.channels(), ChannelLayout::Rgb);
        assert_eq!(v.format(), PixelFormat::Uint8);
        assert_eq!(v.pixel_stride(), 3);
        assert_eq!(v.pixel_count(), 4);
        assert_eq!(v.pixel(0, 1, 0), Some(&[0u8, 0, 255][..]));
        assert_eq!(v.pixel(1, 1, 0), Some(&[9u8, 9, 9][..]));
        assert!(v.pixel(2, 0, 0).is_none());
        assert!(v.pixel(0, 0, 1).is_none());
    }

    #[test]
    fn test_size_uses_layout_and_format_nibbles() {
        let mut b = ImageBuilder::new(3, 1, ChannelLayout::Bgra, PixelFormat::Float16);
        b.push_pixels(&[0; 3 * 4 * 2]);
        let buf = b.finish().unwrap();
        assert_eq!(compute_size(&buf).unwrap(), 30 + 24);
    }

    #[test]
    fn test_wrong_pixel_count_rejected() {
        let mut b = ImageBuilder::new(2, 2, ChannelLayout::Rgba, PixelFormat::Uint8);
        b.push_pixels(&[0; 15]);
        assert!(matches!(b.finish(), Err(Sf3Error::LayoutMismatch { declared: 16, actual: 15, .. })));
    }

    #[test]
    fn test_truncated_pixels_out_of_bounds() {
        let buf = rgb_2x2();
        assert!(matches!(ImageView::new(&buf[..buf.len() - 1]), Err(Sf3Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_invalid_channel_layout() {
        let mut buf = rgb_2x2();
        buf[28] = 0x05;
        assert!(matches!(
            ImageView::new(&buf),
            Err(Sf3Error::InvalidDiscriminant { what: "image channel layout", value: 0x05 })
        ));
    }
}
