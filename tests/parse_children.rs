use mp4demux::{
    BoxReader, BoxValue, FileType, FourCC, MAX_DEPTH, Mp4Box, ParseContext, default_registry,
    parse_children, read_box_header,
};
use std::io::Cursor;

mod common;
use common::*;

fn parse(bytes: &[u8], file_type: &FileType) -> (Vec<Mp4Box>, u64) {
    let reg = default_registry();
    let ctx = ParseContext::new(&reg, file_type);
    let mut r = BoxReader::new(bytes);
    let kids = parse_children(&mut r, bytes.len() as u64, &ctx).expect("parse_children failed");
    (kids, r.position())
}

fn types(boxes: &[Mp4Box]) -> Vec<String> {
    boxes.iter().map(|b| b.typ().to_string()).collect()
}

#[test]
fn read_single_ftyp_header() {
    let data = ftyp(b"isom", 512, &[b"isom"]);
    let hdr = read_box_header(&mut Cursor::new(data)).expect("read_box_header failed");
    assert_eq!(hdr.start, 0);
    assert_eq!(hdr.size, 20);
    assert_eq!(hdr.typ, FourCC(*b"ftyp"));
    assert_eq!(hdr.header_size, 8);
}

#[test]
fn unknown_boxes_are_skipped() {
    let bytes = [bx(b"zzzz", &[1, 2, 3]), bx(b"free", &[0; 4])].concat();
    let (kids, pos) = parse(&bytes, &FileType::default());
    assert_eq!(types(&kids), vec!["free"]);
    assert!(matches!(kids[0].value, BoxValue::Padding(4)));
    assert_eq!(pos, bytes.len() as u64);
}

#[test]
fn terminator_ends_the_child_list() {
    let bytes = [
        bx(b"free", &[0; 4]),
        vec![0, 0, 0, 8, 0, 0, 0, 0],
        bx(b"skip", &[0; 4]),
    ]
    .concat();
    let (kids, pos) = parse(&bytes, &FileType::default());
    assert_eq!(types(&kids), vec!["free"]);
    assert_eq!(pos, bytes.len() as u64);
}

#[test]
fn child_overrunning_the_budget_stops_enumeration() {
    let mut bytes = bx(b"free", &[0; 4]);
    bytes.extend_from_slice(&100u32.to_be_bytes());
    bytes.extend_from_slice(b"skip");
    bytes.extend_from_slice(&[0; 8]);
    let (kids, pos) = parse(&bytes, &FileType::default());
    assert_eq!(types(&kids), vec!["free"]);
    assert_eq!(pos, bytes.len() as u64);
}

#[test]
fn trailing_zero_pad_is_tolerated() {
    let bytes = [bx(b"free", &[0; 4]), vec![0, 0, 0, 0]].concat();
    let (kids, pos) = parse(&bytes, &FileType::default());
    assert_eq!(types(&kids), vec!["free"]);
    assert_eq!(pos, 16);

    let udta = bx(b"udta", &bytes);
    let (kids, pos) = parse(&udta, &FileType::default());
    assert_eq!(types(&kids), vec!["udta"]);
    assert_eq!(types(kids[0].children()), vec!["free"]);
    assert_eq!(pos, udta.len() as u64);
}

#[test]
fn failed_child_decode_is_skipped() {
    // mvhd needs far more than four bytes
    let bytes = [full_bx(b"mvhd", 0, 0, &[0; 4]), bx(b"free", &[0; 2])].concat();
    let (kids, _) = parse(&bytes, &FileType::default());
    assert_eq!(types(&kids), vec!["free"]);
}

#[test]
fn nesting_is_bounded() {
    let mut nested = bx(b"free", &[0; 4]);
    for _ in 0..(MAX_DEPTH + 8) {
        nested = bx(b"moov", &nested);
    }
    let (kids, _) = parse(&nested, &FileType::default());

    let mut depth = 0;
    let mut cur = kids.first();
    while let Some(b) = cur {
        depth += 1;
        cur = b.children().first();
    }
    assert_eq!(depth, MAX_DEPTH);
}

#[test]
fn meta_is_full_in_iso_and_plain_in_quicktime() {
    let items = bx(b"ilst", &bx(b"\xa9nam", &full_bx(b"data", 0, 1, &[0, 0, 0, 0, b'h', b'i'])));
    let iso = bx(b"meta", &[vec![0, 0, 0, 0], hdlr(b"mdir"), items.clone()].concat());
    let qt = bx(b"meta", &[hdlr(b"mdir"), items].concat());

    let (kids, _) = parse(&iso, &FileType::default());
    assert_eq!(kids[0].version, Some(0));
    assert_eq!(types(kids[0].children()), vec!["hdlr", "ilst"]);

    let qt_type = FileType {
        major_brand: FileType::QUICKTIME,
        ..FileType::default()
    };
    let (kids, _) = parse(&qt, &qt_type);
    assert_eq!(kids[0].version, None);
    assert_eq!(types(kids[0].children()), vec!["hdlr", "ilst"]);

    let title = kids[0].find(&[b"ilst", b"\xa9nam", b"data"]).unwrap();
    match &title.value {
        BoxValue::ItunesValue(v) => assert_eq!(v.text.as_deref(), Some("hi")),
        other => panic!("expected item value, got {other:?}"),
    }
}

#[test]
fn genre_depends_on_its_parent() {
    let notice = bx(b"gnre", &[&[0u8, 0, 0, 0, 0x55, 0xC4][..], &b"Rock\0"[..]].concat());
    let udta = bx(b"udta", &notice);
    let (kids, _) = parse(&udta, &FileType::default());
    match &kids[0].children()[0].value {
        BoxValue::Notice(n) => {
            assert_eq!(n.language, "und");
            assert_eq!(n.text, "Rock");
        }
        other => panic!("expected notice, got {other:?}"),
    }

    let item = bx(b"gnre", &full_bx(b"data", 0, 0, &[0, 0, 0, 0, 0, 17]));
    let ilst = bx(b"ilst", &item);
    let (kids, _) = parse(&ilst, &FileType::default());
    let gnre = &kids[0].children()[0];
    assert!(matches!(gnre.value, BoxValue::Container(_)));
    assert_eq!(types(gnre.children()), vec!["data"]);
}

#[test]
fn nested_alac_is_the_decoder_cookie() {
    let cookie = full_bx(b"alac", 0, 0, &[0u8; 24]);
    let entry = audio_entry(b"alac", 2, 16, 44100, &[cookie]);
    let (kids, _) = parse(&entry, &FileType::default());
    assert!(matches!(kids[0].value, BoxValue::AudioSampleEntry(_)));
    match &kids[0].children()[0].value {
        BoxValue::CodecConfig(bytes) => assert_eq!(bytes.len(), 28),
        other => panic!("expected codec config, got {other:?}"),
    }
}

#[test]
fn mp4a_inside_wave_is_a_marker() {
    let wave = bx(b"wave", &[bx(b"frma", b"mp4a"), bx(b"mp4a", &[0; 4])].concat());
    let (kids, _) = parse(&wave, &FileType::default());
    let inner = kids[0].children();
    assert!(matches!(inner[0].value, BoxValue::OriginalFormat(f) if f == FourCC(*b"mp4a")));
    assert!(matches!(&inner[1].value, BoxValue::Blob(b) if b.len() == 4));
}

#[test]
fn sample_description_counts_entries() {
    let stsd = stsd(&[
        visual_entry(b"avc1", 640, 480, &[bx(b"pasp", &[0, 0, 0, 1, 0, 0, 0, 1])]),
    ]);
    let (kids, _) = parse(&stsd, &FileType::default());
    let BoxValue::CountedContainer { entry_count, children } = &kids[0].value else {
        panic!("expected counted container");
    };
    assert_eq!(*entry_count, 1);
    match &children[0].value {
        BoxValue::VisualSampleEntry(v) => {
            assert_eq!((v.width, v.height), (640, 480));
            assert_eq!(v.compressor_name, "test");
            assert_eq!(types(&v.children), vec!["pasp"]);
        }
        other => panic!("expected visual entry, got {other:?}"),
    }
}
