//! Rich text: a list of markup runs followed by one 64-bit-prefixed string.
//!
//! Each markup run is a 17-byte header (`start u64`, `end u64`, `type u8`)
//! and an option body whose shape depends on the type byte.  The runs occupy
//! exactly `markup_size` bytes; the text starts right after them.

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;

use super::{expect_format, FormatId, View};
use crate::bytes::{self, Reader};
use crate::error::{Result, Sf3Error};
use crate::identifier::IDENTIFIER_SIZE;
use crate::string::{self, StrWidth};
use crate::verify;

pub const HEADER_SIZE: usize = 28;
pub const MARKUP_HEADER_SIZE: usize = 17;

const MARKUP_SIZE_OFFSET: usize = IDENTIFIER_SIZE;

// ── Markup ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkupOption<'a> {
    Bold,
    Italic,
    Underline,
    Strike,
    Mono,
    Color { r: f32, g: f32, b: f32 },
    Size(f32),
    Heading(u8),
    Link(&'a str),
    Target(&'a str),
    Font(&'a str),
}

impl MarkupOption<'_> {
    pub fn type_byte(&self) -> u8 {
        match self {
            MarkupOption::Bold        => 1,
            MarkupOption::Italic      => 2,
            MarkupOption::Underline   => 3,
            MarkupOption::Strike      => 4,
            MarkupOption::Mono        => 5,
            MarkupOption::Color { .. } => 6,
            MarkupOption::Size(_)     => 7,
            MarkupOption::Heading(_)  => 8,
            MarkupOption::Link(_)     => 9,
            MarkupOption::Target(_)   => 10,
            MarkupOption::Font(_)     => 11,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarkupOption::Bold        => "bold",
            MarkupOption::Italic      => "italic",
            MarkupOption::Underline   => "underline",
            MarkupOption::Strike      => "strike",
            MarkupOption::Mono        => "mono",
            MarkupOption::Color { .. } => "color",
            MarkupOption::Size(_)     => "size",
            MarkupOption::Heading(_)  => "heading",
            MarkupOption::Link(_)     => "link",
            MarkupOption::Target(_)   => "target",
            MarkupOption::Font(_)     => "font",
        }
    }

    /// Encoded body length, excluding the 17-byte markup header.
    pub fn body_len(&self) -> usize {
        match self {
            MarkupOption::Color { .. } => 12,
            MarkupOption::Size(_)      => 4,
            MarkupOption::Heading(_)   => 1,
            MarkupOption::Link(s) | MarkupOption::Target(s) | MarkupOption::Font(s) => {
                string::encoded_len(s, StrWidth::W16)
            }
            _ => 0,
        }
    }

    fn write_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        match *self {
            MarkupOption::Color { r, g, b } => {
                buf.write_f32::<LittleEndian>(r)?;
                buf.write_f32::<LittleEndian>(g)?;
                buf.write_f32::<LittleEndian>(b)?;
            }
            MarkupOption::Size(s)    => buf.write_f32::<LittleEndian>(s)?,
            MarkupOption::Heading(l) => buf.write_u8(l)?,
            MarkupOption::Link(s) | MarkupOption::Target(s) | MarkupOption::Font(s) => {
                string::write(buf, s, StrWidth::W16)?
            }
            _ => {}
        }
        Ok(())
    }
}

/// One markup run over the character range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Markup<'a> {
    pub start:  u64,
    pub end:    u64,
    pub option: MarkupOption<'a>,
}

impl<'a> Markup<'a> {
    /// Decode the run at `offset`, returning it with the offset of the next one.
    pub fn read(data: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let mut r = Reader::at(data, offset);
        let start = r.u64()?;
        let end   = r.u64()?;
        let kind  = r.u8()?;
        let option = match kind {
            1  => MarkupOption::Bold,
            2  => MarkupOption::Italic,
            3  => MarkupOption::Underline,
            4  => MarkupOption::Strike,
            5  => MarkupOption::Mono,
            6  => {
                let [red, green, blue] = r.f32_array::<3>()?;
                MarkupOption::Color { r: red, g: green, b: blue }
            }
            7  => MarkupOption::Size(r.f32()?),
            8  => MarkupOption::Heading(r.u8()?),
            9  => MarkupOption::Link(r.str(StrWidth::W16)?),
            10 => MarkupOption::Target(r.str(StrWidth::W16)?),
            11 => MarkupOption::Font(r.str(StrWidth::W16)?),
            other => return Err(Sf3Error::InvalidDiscriminant { what: "text markup", value: other }),
        };
        Ok((Self { start, end, option }, r.position()))
    }
}

// ── TextView ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TextView<'a> {
    data:         &'a [u8],
    markup_size:  u64,
    markup_count: u32,
    text:         &'a str,
    size:         usize,
}

impl<'a> TextView<'a> {
    /// Walk all markup runs, check they end where the text begins, then
    /// read the text.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::at(data, MARKUP_SIZE_OFFSET);
        let markup_size  = r.u64()?;
        let markup_count = r.u32()?;
        let text_offset  = bytes::record_end(data, HEADER_SIZE, markup_size)?;

        let mut offset = HEADER_SIZE;
        for _ in 0..markup_count {
            offset = advance(data, offset)?;
            if offset > text_offset {
                break;
            }
        }
        if offset != text_offset {
            return Err(Sf3Error::LayoutMismatch {
                what:     "text markup size",
                declared: markup_size,
                actual:   (offset - HEADER_SIZE) as u64,
            });
        }

        let (text, size) = string::read(data, text_offset, StrWidth::W64)?;
        trace!("text: {markup_count} markup runs, {} text bytes", text.len());
        Ok(Self { data, markup_size, markup_count, text, size })
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        expect_format(data, FormatId::Text)?;
        Self::new(data)
    }

    pub fn markup_size(&self) -> u64 { self.markup_size }
    pub fn markup_count(&self) -> u32 { self.markup_count }
    pub fn text(&self) -> &'a str { self.text }
    pub fn size(&self) -> usize { self.size }

    /// Offset of the first markup run.
    pub fn first(&self) -> usize { HEADER_SIZE }

    pub fn markup(&self) -> MarkupIter<'a> {
        MarkupIter { data: self.data, offset: HEADER_SIZE, remaining: self.markup_count }
    }
}

/// Offset of the markup run after the one at `offset`.
pub fn advance(data: &[u8], offset: usize) -> Result<usize> {
    Markup::read(data, offset).map(|(_, next)| next)
}

pub struct MarkupIter<'a> {
    data:      &'a [u8],
    offset:    usize,
    remaining: u32,
}

impl<'a> Iterator for MarkupIter<'a> {
    type Item = Result<Markup<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match Markup::read(self.data, self.offset) {
            Ok((markup, next)) => {
                self.offset = next;
                Some(Ok(markup))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

pub fn view(data: &[u8]) -> Result<View<'_>> {
    TextView::new(data).map(View::Text)
}

pub fn compute_size(data: &[u8]) -> Result<usize> {
    TextView::new(data).map(|v| v.size())
}

// ── TextBuilder ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TextBuilder {
    markup: Vec<u8>,
    count:  u32,
}

impl TextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markup(&mut self, start: u64, end: u64, option: MarkupOption<'_>) -> Result<&mut Self> {
        let mark = self.markup.len();
        self.markup.write_u64::<LittleEndian>(start)?;
        self.markup.write_u64::<LittleEndian>(end)?;
        self.markup.write_u8(option.type_byte())?;
        if let Err(e) = option.write_body(&mut self.markup) {
            self.markup.truncate(mark);
            return Err(e);
        }
        self.count += 1;
        Ok(self)
    }

    pub fn finish(&self, text: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(
            HEADER_SIZE + self.markup.len() + string::encoded_len(text, StrWidth::W64),
        );
        buf.resize(IDENTIFIER_SIZE, 0);
        buf.write_u64::<LittleEndian>(self.markup.len() as u64)?;
        buf.write_u32::<LittleEndian>(self.count)?;
        buf.extend_from_slice(&self.markup);
        string::write(&mut buf, text, StrWidth::W64)?;

        let size = verify::finalize(&mut buf, FormatId::Text)?;
        buf.truncate(size);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_advances_past_header_prefix_and_string() {
        let mut b = TextBuilder::new();
        b.markup(0, 4, MarkupOption::Link("http://x")).unwrap();
        let buf = b.finish("link").unwrap();

        let next = advance(&buf, HEADER_SIZE).unwrap();
        assert_eq!(next - HEADER_SIZE, 17 + 2 + 9);
        assert_eq!(TextView::decode(&buf).unwrap().markup_size(), 28);
    }

    #[test]
    fn test_markup_round_trip() {
        let mut b = TextBuilder::new();
        b.markup(0, 5, MarkupOption::Bold).unwrap()
            .markup(6, 11, MarkupOption::Color { r: 1.0, g: 0.5, b: 0.0 }).unwrap()
            .markup(0, 11, MarkupOption::Size(14.0)).unwrap()
            .markup(0, 11, MarkupOption::Heading(2)).unwrap()
            .markup(6, 11, MarkupOption::Font("Mono")).unwrap();
        let buf = b.finish("hello world").unwrap();

        let v = TextView::decode(&buf).unwrap();
        assert_eq!(v.text(), "hello world");
        assert_eq!(v.markup_count(), 5);
        assert_eq!(v.size(), buf.len());

        let runs: Vec<_> = v.markup().collect::<Result<_>>().unwrap();
        assert_eq!(runs[0], Markup { start: 0, end: 5, option: MarkupOption::Bold });
        assert_eq!(runs[1].option, MarkupOption::Color { r: 1.0, g: 0.5, b: 0.0 });
        assert_eq!(runs[2].option, MarkupOption::Size(14.0));
        assert_eq!(runs[3].option, MarkupOption::Heading(2));
        assert_eq!(runs[4].option, MarkupOption::Font("Mono"));
        assert_eq!(runs[1].option.body_len() + MARKUP_HEADER_SIZE, 29);
    }

    #[test]
    fn test_no_markup() {
        let buf = TextBuilder::new().finish("").unwrap();
        let v = TextView::decode(&buf).unwrap();
        assert_eq!(v.text(), "");
        assert_eq!(v.markup().count(), 0);
        assert_eq!(buf.len(), 28 + 9);
    }

    #[test]
    fn test_markup_size_must_match_walk() {
        let mut b = TextBuilder::new();
        b.markup(0, 1, MarkupOption::Italic).unwrap();
        let mut buf = b.finish("x").unwrap();
        // claim two runs where only one was written
        buf[24] = 2;
        assert!(TextView::new(&buf).is_err());
    }

    #[test]
    fn test_unknown_markup_type() {
        let mut b = TextBuilder::new();
        b.markup(0, 1, MarkupOption::Mono).unwrap();
        let mut buf = b.finish("x").unwrap();
        buf[HEADER_SIZE + 16] = 12;
        assert!(matches!(
            TextView::new(&buf),
            Err(Sf3Error::InvalidDiscriminant { what: "text markup", value: 12 })
        ));
    }
}
