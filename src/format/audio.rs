//! Audio: a fixed header followed by interleaved raw samples.

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{self, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::verify;

pub const HEADER_SIZE: usize = 30;

// ── SampleFormat ─────────────────────────────────────────────────────────────

/// Sample encoding.  The low nibble is the sample size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleFormat {
    Alaw    = 0x01,
    Int16   = 0x02,
    Int32   = 0x04,
    Int64   = 0x08,
    Ulaw    = 0x11,
    Uint16  = 0x12,
    Uint32  = 0x14,
    Uint64  = 0x18,
    Float16 = 0x22,
    Float32 = 0x24,
    Float64 = 0x28,
}

impl SampleFormat {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(SampleFormat::Alaw),
            0x02 => Ok(SampleFormat::Int16),
            0x04 => Ok(SampleFormat::Int32),
            0x08 => Ok(SampleFormat::Int64),
            0x11 => Ok(SampleFormat::Ulaw),
            0x12 => Ok(SampleFormat::Uint16),
            0x14 => Ok(SampleFormat::Uint32),
            0x18 => Ok(SampleFormat::Uint64),
            0x22 => Ok(SampleFormat::Float16),
            0x24 => Ok(SampleFormat::Float32),
            0x28 => Ok(SampleFormat::Float64),
            other => Err(Sf3Error::InvalidDiscriminant { what: "audio sample format", value: other }),
        }
    }

    #[inline]
    pub fn sample_size(self) -> usize {
        (self as u8 & 0x0F) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Alaw    => "alaw",
            SampleFormat::Int16   => "int16",
            SampleFormat::Int32   => "int32",
            SampleFormat::Int64   => "int64",
            SampleFormat::Ulaw    => "ulaw",
            SampleFormat::Uint16  => "uint16",
            SampleFormat::Uint32  => "uint32",
            SampleFormat::Uint64  => "uint64",
            SampleFormat::Float16 => "float16",
            SampleFormat::Float32 => "float32",
            SampleFormat::Float64 => "float64",
        }
    }
}

// ── AudioView ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct AudioView<'a> {
    data:        &'a [u8],
    samplerate:  u32,
    channels:    u8,
    format:      SampleFormat,
    frame_count: u64,
    size:        usize,
}

impl<'a> AudioView<'a> {
    /// Parse the header and bounds-check the sample block.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, IDENTIFIER_SIZE);
        let samplerate  = r.u32()?;
        let channels    = r.u8()?;
        let format      = SampleFormat::from_u8(r.u8()?)?;
        let frame_count = r.u64()?;

        let payload = bytes::checked_product(
            HEADER_SIZE,
            data.len(),
            &[frame_count, channels as u64, format.sample_size() as u64],
        )?;
        let size = bytes::record_end(data, HEADER_SIZE, payload)?;
        trace!("audio: {frame_count} frames, {channels} channels, {}", format.name());
        Ok(Self { data, samplerate, channels, format, frame_count, size })
    }

    /// Like [`AudioView::new`], but also checks the identifier.
    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Audio)?;
        Self::new(data)
    }

    pub fn samplerate(&self) -> u32 { self.samplerate }
    pub fn channels(&self) -> u8 { self.channels }
    pub fn format(&self) -> SampleFormat { self.format }
    pub fn frame_count(&self) -> u64 { self.frame_count }
    pub fn size(&self) -> usize { self.size }

    pub fn sample_size(&self) -> usize { self.format.sample_size() }

    /// Bytes per frame: one sample for every channel.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.format.sample_size()
    }

    /// Playback length in seconds; 0 for a zero sample rate.
    pub fn duration(&self) -> f64 {
        if self.samplerate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.samplerate as f64
    }

    /// All sample bytes, interleaved by frame.
    pub fn samples(&self) -> &'a [u8] {
        &self.data[HEADER_SIZE..self.size]
    }

    pub fn frame(&self, index: u64) -> Option<&'a [u8]> {
        if index >= self.frame_count {
            return None;
        }
        let fs = self.frame_size();
        let start = HEADER_SIZE + (index as usize).checked_mul(fs)?;
        self.data.get(start..start + fs)
    }

    pub fn frames(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let fs = self.frame_size().max(1);
        self.samples().chunks_exact(fs)
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    AudioView::new(data).map(View::Audio)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    AudioView::new(data).map(|v| v.size())
}

// ── AudioBuilder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AudioBuilder {
    samplerate: u32,
    channels:   u8,
    format:     SampleFormat,
    samples:    Vec<u8>,
}

impl AudioBuilder {
    pub fn new(samplerate: u32, channels: u8, format: SampleFormat) -> Self {
        Self { samplerate, channels, format, samples: Vec::new() }
    }

    /// Append raw interleaved sample bytes.
    pub fn push_samples(&mut self, samples: &[u8]) -> &mut Self {
        self.samples.extend_from_slice(samples);
        self
    }

    /// Fails with `LayoutMismatch` unless the samples form whole frames.
    pub fn finish(&self) -> Result<Vec<u8>> {
        let frame_size = self.channels as usize * self.format.sample_size();
        let frame_count = if frame_size == 0 { 0 } else { self.samples.len() / frame_size };
        if frame_count * frame_size != self.samples.len() {
            return Err(Sf3Error::LayoutMismatch {
                what:     "audio sample bytes",
                declared: (frame_count * frame_size) as u64,
                actual:   self.samples.len() as u64,
            });
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.samples.len());
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u32::<LittleEndian>(self.samplerate)?;
        buf.write_u8(self.channels)?;
        buf.write_u8(self.format as u8)?;
        buf.write_u64::<LittleEndian>(frame_count as u64)?;
        buf.extend_from_slice(&self.samples);

        let size = verify::finalize(&mut buf, FormatId::Audio)?;
        buf.truncate(size);
        Ok(buf)
    }
}
