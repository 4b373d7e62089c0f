use mp4demux::{
    BoxDecoder, BoxHeader, BoxKey, BoxReader, BoxValue, FileType, FourCC, Layout, ParseContext,
    Registry, default_registry,
};

fn header(typ: &[u8; 4], body_len: u64) -> BoxHeader {
    BoxHeader {
        typ: FourCC(*typ),
        uuid: None,
        size: 8 + body_len,
        header_size: 8,
        start: 0,
    }
}

struct DummyDecoder;

impl BoxDecoder for DummyDecoder {
    fn decode(
        &self,
        r: &mut BoxReader<'_>,
        _hdr: &BoxHeader,
        _version: Option<u8>,
        _flags: Option<u32>,
        _ctx: &ParseContext<'_>,
    ) -> anyhow::Result<BoxValue> {
        Ok(BoxValue::Blob(r.rest().to_vec()))
    }
}

#[test]
fn registry_invokes_custom_decoder() {
    let reg = Registry::new().with_decoder(
        BoxKey::FourCC(FourCC(*b"test")),
        "test",
        Layout::Plain,
        Box::new(DummyDecoder),
    );
    let ft = FileType::default();
    let ctx = ParseContext::new(&reg, &ft);

    let payload = [1u8, 2, 3, 4];
    let res = reg
        .decode(&mut BoxReader::new(&payload), &header(b"test", 4), &ctx)
        .expect("decoder registered")
        .unwrap();
    assert_eq!(res.version, None);
    match res.value {
        BoxValue::Blob(b) => assert_eq!(b, payload),
        other => panic!("expected blob, got {other:?}"),
    }
    assert_eq!(reg.name(&BoxKey::FourCC(FourCC(*b"test"))), Some("test"));
}

#[test]
fn full_layout_strips_version_and_flags() {
    let reg = Registry::new().with_full_box(b"test", "test", DummyDecoder);
    let ft = FileType::default();
    let ctx = ParseContext::new(&reg, &ft);

    let body = [1u8, 0, 0, 3, 0xAA];
    let res = reg
        .decode(&mut BoxReader::new(&body), &header(b"test", 5), &ctx)
        .unwrap()
        .unwrap();
    assert_eq!(res.version, Some(1));
    assert_eq!(res.flags, Some(3));
    assert!(matches!(res.value, BoxValue::Blob(ref b) if b == &[0xAA]));
}

#[test]
fn unknown_key_yields_none() {
    let reg = default_registry();
    let ft = FileType::default();
    let ctx = ParseContext::new(&reg, &ft);
    assert!(reg
        .decode(&mut BoxReader::new(&[0u8; 4]), &header(b"zzzz", 4), &ctx)
        .is_none());
}

#[test]
fn stts_decoding() {
    let data = [
        0, 0, 0, 0, // version/flags
        0, 0, 0, 2, // entry_count = 2
        0, 0, 0, 100, // sample_count = 100
        0, 0, 4, 0, // sample_delta = 1024
        0, 0, 0, 1, // sample_count = 1
        0, 0, 2, 0, // sample_delta = 512
    ];
    let reg = default_registry();
    let ft = FileType::default();
    let ctx = ParseContext::new(&reg, &ft);
    let b = reg
        .decode(&mut BoxReader::new(&data), &header(b"stts", 24), &ctx)
        .unwrap()
        .unwrap();

    match b.value {
        BoxValue::TimeToSample(stts) => {
            assert_eq!(stts.entries.len(), 2);
            assert_eq!(stts.entries[0].sample_count, 100);
            assert_eq!(stts.entries[0].sample_delta, 1024);
            assert_eq!(stts.entries[1].sample_delta, 512);
            assert_eq!(stts.total_samples(), 101);
        }
        other => panic!("expected stts, got {other:?}"),
    }
}

#[test]
fn stsz_decoding() {
    let data = [
        0, 0, 0, 0, // version/flags
        0, 0, 0, 0, // sample_size = 0 (individual sizes)
        0, 0, 0, 3, // sample_count = 3
        0, 0, 3, 232, // 1000
        0, 0, 7, 208, // 2000
        0, 0, 11, 184, // 3000
    ];
    let reg = default_registry();
    let ft = FileType::default();
    let ctx = ParseContext::new(&reg, &ft);
    let b = reg
        .decode(&mut BoxReader::new(&data), &header(b"stsz", 24), &ctx)
        .unwrap()
        .unwrap();

    match b.value {
        BoxValue::SampleSize(stsz) => {
            assert_eq!(stsz.sample_count, 3);
            assert_eq!(stsz.size_of(0), Some(1000));
            assert_eq!(stsz.size_of(2), Some(3000));
            assert_eq!(stsz.size_of(3), None);
        }
        other => panic!("expected stsz, got {other:?}"),
    }
}

#[test]
fn default_registry_layouts_and_names() {
    let reg = default_registry();
    let key = |t: &[u8; 4]| BoxKey::FourCC(FourCC(*t));
    assert_eq!(reg.layout(&key(b"moov")), Some(Layout::Plain));
    assert_eq!(reg.layout(&key(b"mvhd")), Some(Layout::Full));
    assert_eq!(reg.layout(&key(b"meta")), Some(Layout::FullUnlessQuickTime));
    assert_eq!(reg.name(&key(b"ftyp")), Some("File Type Box"));
    assert!(reg.contains(&key(b"avc1")));
    assert!(reg.contains(&key(b"\xa9nam")));
    assert!(!reg.contains(&key(b"mdat")));
}
