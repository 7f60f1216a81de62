use proptest::prelude::*;
use sf3::format::text::{MarkupOption, TextBuilder};
use sf3::identifier::{self, Identifier, CHECKSUM_OFFSET, IDENTIFIER_SIZE, MAGIC, TERMINATOR_OFFSET};
use sf3::string::{self, StrWidth};
use sf3::{verify, Sf3Error};

fn width() -> impl Strategy<Value = StrWidth> {
    prop_oneof![
        Just(StrWidth::W8),
        Just(StrWidth::W16),
        Just(StrWidth::W32),
        Just(StrWidth::W64),
    ]
}

proptest! {
    #[test]
    fn prop_identifier_write_validate(format_id: u8, checksum: u32, tail in proptest::collection::vec(any::<u8>(), 0..32)) {
        let mut buf = Vec::new();
        Identifier::new(format_id, checksum).write(&mut buf).unwrap();
        buf.extend_from_slice(&tail);

        prop_assert_eq!(identifier::validate(&buf).unwrap(), format_id);
        let read = Identifier::read(&buf).unwrap();
        prop_assert_eq!(read.checksum, checksum);
    }

    #[test]
    fn prop_short_buffers_are_rejected(data in proptest::collection::vec(any::<u8>(), 0..IDENTIFIER_SIZE)) {
        let rejected = matches!(identifier::validate(&data), Err(Sf3Error::TooShort { len }) if len == data.len());
        prop_assert!(rejected);
    }

    #[test]
    fn prop_magic_flip_is_bad_magic(index in 0..MAGIC.len(), mask in 1u8..=255) {
        let mut buf = Vec::new();
        Identifier::new(1, 0).write(&mut buf).unwrap();
        buf[index] ^= mask;
        prop_assert!(matches!(identifier::validate(&buf), Err(Sf3Error::BadMagic)));
    }

    #[test]
    fn prop_nonzero_terminator_is_rejected(terminator in 1u8..=255) {
        let mut buf = Vec::new();
        Identifier::new(1, 0).write(&mut buf).unwrap();
        buf[TERMINATOR_OFFSET] = terminator;
        let rejected = matches!(identifier::validate(&buf), Err(Sf3Error::BadTerminator(t)) if t == terminator);
        prop_assert!(rejected);
    }

    #[test]
    fn prop_string_codec(text in ".{0,200}", width in width(), lead in 0usize..8) {
        let mut buf = vec![0xAA; lead];
        if text.len() as u64 + 1 > width.max_len() {
            prop_assert!(string::write(&mut buf, &text, width).is_err());
            return Ok(());
        }
        string::write(&mut buf, &text, width).unwrap();
        prop_assert_eq!(buf.len(), lead + string::encoded_len(&text, width));

        let (decoded, next) = string::read(&buf, lead, width).unwrap();
        prop_assert_eq!(decoded, text.as_str());
        prop_assert_eq!(next, buf.len());
    }

    #[test]
    fn prop_payload_flip_is_checksum_mismatch(index in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let mut b = TextBuilder::new();
        b.markup(0, 4, MarkupOption::Size(12.0)).unwrap();
        b.markup(2, 9, MarkupOption::Font("serif")).unwrap();
        let mut buf = b.finish("property based").unwrap();
        verify(&buf).unwrap();

        // Any byte of the stored checksum or the payload.
        let covered = buf.len() - CHECKSUM_OFFSET;
        let mut i = CHECKSUM_OFFSET + index.index(covered);
        if i == TERMINATOR_OFFSET {
            i = IDENTIFIER_SIZE;
        }
        buf[i] ^= mask;
        let mismatch = matches!(verify(&buf), Err(Sf3Error::ChecksumMismatch { .. }));
        prop_assert!(mismatch, "flip at {} not reported as a checksum mismatch", i);
    }
}
