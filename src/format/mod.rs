//! Format registry: format ids, display metadata and per-format dispatch.
//!
//! Every SF3 file carries a one-byte format id in its identifier.  This
//! module maps that id to a human-readable name, a MIME type, the canonical
//! file suffix, and the decoder/size functions of the matching format module.
//! The table is a `static`; nothing here is ever mutated at runtime.

pub mod archive;
pub mod audio;
pub mod image;
pub mod log;
pub mod model;
pub mod physics;
pub mod table;
pub mod text;
pub mod vector;

use crate::error::{Result, Sf3Error};
use crate::identifier;

pub use archive::ArchiveView;
pub use audio::AudioView;
pub use image::ImageView;
pub use self::log::LogView;
pub use model::ModelView;
pub use physics::PhysicsModelView;
pub use table::TableView;
pub use text::TextView;
pub use vector::VectorGraphicView;

// ── FormatId ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FormatId {
    Archive       = 0x01,
    Audio         = 0x02,
    Image         = 0x03,
    Log           = 0x04,
    Model         = 0x05,
    PhysicsModel  = 0x06,
    Table         = 0x07,
    Text          = 0x08,
    VectorGraphic = 0x09,
}

impl FormatId {
    pub const ALL: [FormatId; 9] = [
        FormatId::Archive,
        FormatId::Audio,
        FormatId::Image,
        FormatId::Log,
        FormatId::Model,
        FormatId::PhysicsModel,
        FormatId::Table,
        FormatId::Text,
        FormatId::VectorGraphic,
    ];

    pub fn from_u8(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(FormatId::Archive),
            0x02 => Ok(FormatId::Audio),
            0x03 => Ok(FormatId::Image),
            0x04 => Ok(FormatId::Log),
            0x05 => Ok(FormatId::Model),
            0x06 => Ok(FormatId::PhysicsModel),
            0x07 => Ok(FormatId::Table),
            0x08 => Ok(FormatId::Text),
            0x09 => Ok(FormatId::VectorGraphic),
            other => Err(Sf3Error::UnknownFormat(other)),
        }
    }

    #[inline]
    pub fn entry(self) -> &'static FormatEntry {
        &REGISTRY[self as usize - 1]
    }

    pub fn name(self) -> &'static str { self.entry().name }

    pub fn mime_type(self) -> &'static str { self.entry().mime_type }

    /// Canonical file suffix, e.g. `"img.sf3"`.
    pub fn suffix(self) -> &'static str { self.entry().suffix }

    /// Resolve a path or suffix by its canonical SF3 suffix.
    pub fn from_suffix(path: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|e| path.ends_with(&format!(".{}", e.suffix)) || path == e.suffix)
            .map(|e| e.id)
    }
}

/// Display name for a raw format id, `"Unknown"` if unregistered.
pub fn kind_name(id: u8) -> &'static str {
    FormatId::from_u8(id).map(FormatId::name).unwrap_or("Unknown")
}

/// MIME type for a raw format id, falling back to the generic SF3 type.
pub fn mime_type(id: u8) -> &'static str {
    FormatId::from_u8(id).map(FormatId::mime_type).unwrap_or("application/x.sf3")
}

/// File suffix for a raw format id, falling back to `"sf3"`.
pub fn suffix(id: u8) -> &'static str {
    FormatId::from_u8(id).map(FormatId::suffix).unwrap_or("sf3")
}

// ── View ─────────────────────────────────────────────────────────────────────

/// A decoded, validated view over one SF3 buffer.
#[derive(Debug, Clone)]
pub enum View<'a> {
    Archive(ArchiveView<'a>),
    Audio(AudioView<'a>),
    Image(ImageView<'a>),
    Log(LogView<'a>),
    Model(ModelView<'a>),
    PhysicsModel(PhysicsModelView<'a>),
    Table(TableView<'a>),
    Text(TextView<'a>),
    VectorGraphic(VectorGraphicView<'a>),
}

impl<'a> View<'a> {
    pub fn format_id(&self) -> FormatId {
        match self {
            View::Archive(_)       => FormatId::Archive,
            View::Audio(_)         => FormatId::Audio,
            View::Image(_)         => FormatId::Image,
            View::Log(_)           => FormatId::Log,
            View::Model(_)         => FormatId::Model,
            View::PhysicsModel(_)  => FormatId::PhysicsModel,
            View::Table(_)         => FormatId::Table,
            View::Text(_)          => FormatId::Text,
            View::VectorGraphic(_) => FormatId::VectorGraphic,
        }
    }

    /// Total byte length described by the structure.
    pub fn size(&self) -> usize {
        match self {
            View::Archive(v)       => v.size(),
            View::Audio(v)         => v.size(),
            View::Image(v)         => v.size(),
            View::Log(v)           => v.size(),
            View::Model(v)         => v.size(),
            View::PhysicsModel(v)  => v.size(),
            View::Table(v)         => v.size(),
            View::Text(v)          => v.size(),
            View::VectorGraphic(v) => v.size(),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

pub type DecodeFn = for<'a> fn(&'a [u8]) -> Result<View<'a>>;
pub type SizeFn = fn(&[u8]) -> Result<usize>;

/// One registry row.
///
/// `decode` and `compute_size` do not look at the identifier bytes: the
/// finalizer runs `compute_size` on buffers whose identifier is not yet
/// written.
pub struct FormatEntry {
    pub id:           FormatId,
    pub name:         &'static str,
    pub mime_type:    &'static str,
    pub suffix:       &'static str,
    pub decode:       DecodeFn,
    pub compute_size: SizeFn,
}

impl std::fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("suffix", &self.suffix)
            .finish()
    }
}

pub static REGISTRY: [FormatEntry; 9] = [
    FormatEntry {
        id:           FormatId::Archive,
        name:         "Archive",
        mime_type:    "application/x.sf3-archive",
        suffix:       "ar.sf3",
        decode:       archive::view,
        compute_size: archive::compute_size,
    },
    FormatEntry {
        id:           FormatId::Audio,
        name:         "Audio",
        mime_type:    "audio/x.sf3",
        suffix:       "au.sf3",
        decode:       audio::view,
        compute_size: audio::compute_size,
    },
    FormatEntry {
        id:           FormatId::Image,
        name:         "Image",
        mime_type:    "image/x.sf3",
        suffix:       "img.sf3",
        decode:       image::view,
        compute_size: image::compute_size,
    },
    FormatEntry {
        id:           FormatId::Log,
        name:         "Log",
        mime_type:    "application/x.sf3-log",
        suffix:       "log.sf3",
        decode:       self::log::view,
        compute_size: self::log::compute_size,
    },
    FormatEntry {
        id:           FormatId::Model,
        name:         "Model",
        mime_type:    "model/x.sf3",
        suffix:       "mod.sf3",
        decode:       model::view,
        compute_size: model::compute_size,
    },
    FormatEntry {
        id:           FormatId::PhysicsModel,
        name:         "Physics Model",
        mime_type:    "model/x.sf3-physics",
        suffix:       "phys.sf3",
        decode:       physics::view,
        compute_size: physics::compute_size,
    },
    FormatEntry {
        id:           FormatId::Table,
        name:         "Table",
        mime_type:    "application/x.sf3-table",
        suffix:       "tab.sf3",
        decode:       table::view,
        compute_size: table::compute_size,
    },
    FormatEntry {
        id:           FormatId::Text,
        name:         "Text",
        mime_type:    "application/x.sf3-text",
        suffix:       "txt.sf3",
        decode:       text::view,
        compute_size: text::compute_size,
    },
    FormatEntry {
        id:           FormatId::VectorGraphic,
        name:         "Vector Graphic",
        mime_type:    "image/x.sf3-vector",
        suffix:       "vec.sf3",
        decode:       vector::view,
        compute_size: vector::compute_size,
    },
];

pub fn lookup(id: u8) -> Result<&'static FormatEntry> {
    Ok(FormatId::from_u8(id)?.entry())
}

/// Validate the identifier, dispatch on its format id and walk the payload.
///
/// The checksum is not checked here; see [`crate::verify`].
pub fn decode(data: &[u8]) -> Result<View<'_>> {
    let entry = lookup(identifier::validate(data)?)?;
    (entry.decode)(data)
}

/// Walk the records of a `format` buffer and return its total byte length.
pub fn compute_size(format: FormatId, data: &[u8]) -> Result<usize> {
    (format.entry().compute_size)(data)
}

/// Identifier check shared by the typed `XxxView::decode` constructors.
pub(crate) fn expect_format(data: &[u8], format: FormatId) -> Result<()> {
    let id = identifier::validate(data)?;
    let found = FormatId::from_u8(id)?;
    if found != format {
        return Err(Sf3Error::LayoutMismatch {
            what:     "format id",
            declared: format as u64,
            actual:   id as u64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rows_match_ids() {
        for (i, entry) in REGISTRY.iter().enumerate() {
            assert_eq!(entry.id as usize, i + 1);
            assert_eq!(FormatId::from_u8(i as u8 + 1).unwrap(), entry.id);
        }
    }

    #[test]
    fn test_names_and_mime_types() {
        assert_eq!(FormatId::PhysicsModel.name(), "Physics Model");
        assert_eq!(FormatId::VectorGraphic.mime_type(), "image/x.sf3-vector");
        assert_eq!(FormatId::Image.suffix(), "img.sf3");
        assert_eq!(kind_name(0), "Unknown");
        assert_eq!(mime_type(0x42), "application/x.sf3");
        assert_eq!(suffix(0x42), "sf3");
    }

    #[test]
    fn test_from_suffix() {
        assert_eq!(FormatId::from_suffix("song.au.sf3"), Some(FormatId::Audio));
        assert_eq!(FormatId::from_suffix("tab.sf3"), Some(FormatId::Table));
        assert_eq!(FormatId::from_suffix("plain.sf3"), None);
    }

    #[test]
    fn test_unknown_format_id() {
        assert!(matches!(FormatId::from_u8(0), Err(Sf3Error::UnknownFormat(0))));
        assert!(matches!(lookup(10), Err(Sf3Error::UnknownFormat(10))));
    }
}
