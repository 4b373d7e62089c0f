//! Byte-level builders for synthetic MP4 files.
#![allow(dead_code)]

pub fn bx(typ: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + body.len());
    v.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(body);
    v
}

pub fn full_bx(typ: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut b = vec![version];
    b.extend_from_slice(&flags.to_be_bytes()[1..]);
    b.extend_from_slice(body);
    bx(typ, &b)
}

pub fn u32s(vals: &[u32]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn ftyp(major: &[u8; 4], minor: u32, compat: &[&[u8; 4]]) -> Vec<u8> {
    let mut b = major.to_vec();
    b.extend_from_slice(&minor.to_be_bytes());
    for c in compat {
        b.extend_from_slice(*c);
    }
    bx(b"ftyp", &b)
}

/// 20-byte `ftyp`; with it first, an `mdat` payload starts at [`DATA_START`].
pub fn iso_ftyp() -> Vec<u8> {
    ftyp(b"isom", 0, &[b"isom"])
}

pub fn qt_ftyp() -> Vec<u8> {
    ftyp(b"qt  ", 0, &[b"qt  "])
}

pub const DATA_START: u64 = 28;

pub fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut b = u32s(&[0, 0, timescale, duration, 0x0001_0000]);
    b.extend_from_slice(&0x0100u16.to_be_bytes());
    b.extend_from_slice(&[0u8; 70]);
    b.extend_from_slice(&2u32.to_be_bytes());
    full_bx(b"mvhd", 0, 0, &b)
}

pub fn tkhd(track_id: u32, width: u16, height: u16) -> Vec<u8> {
    let mut b = u32s(&[0, 0, track_id, 0, 0]);
    b.extend_from_slice(&[0u8; 8]);
    b.extend_from_slice(&[0u8; 2 + 2 + 2 + 2 + 36]);
    b.extend_from_slice(&u32s(&[(width as u32) << 16, (height as u32) << 16]));
    full_bx(b"tkhd", 0, 1, &b)
}

pub fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut b = u32s(&[0, 0, timescale, duration]);
    // "und"
    b.extend_from_slice(&0x55C4u16.to_be_bytes());
    b.extend_from_slice(&[0, 0]);
    full_bx(b"mdhd", 0, 0, &b)
}

pub fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut b = vec![0u8; 4];
    b.extend_from_slice(handler);
    b.extend_from_slice(&[0u8; 12]);
    b.extend_from_slice(b"test\0");
    full_bx(b"hdlr", 0, 0, &b)
}

pub fn dinf() -> Vec<u8> {
    let url = full_bx(b"url ", 0, 1, &[]);
    let mut dref = 1u32.to_be_bytes().to_vec();
    dref.extend_from_slice(&url);
    bx(b"dinf", &full_bx(b"dref", 0, 0, &dref))
}

pub fn stsd(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut b = (entries.len() as u32).to_be_bytes().to_vec();
    b.extend_from_slice(&entries.concat());
    full_bx(b"stsd", 0, 0, &b)
}

fn audio_fields(version: u16, channels: u16, sample_size: u16, rate: u32) -> Vec<u8> {
    let mut b = vec![0u8; 6];
    b.extend_from_slice(&1u16.to_be_bytes());
    b.extend_from_slice(&version.to_be_bytes());
    b.extend_from_slice(&[0u8; 2 + 4]);
    b.extend_from_slice(&channels.to_be_bytes());
    b.extend_from_slice(&sample_size.to_be_bytes());
    b.extend_from_slice(&[0u8; 4]);
    b.extend_from_slice(&(rate << 16).to_be_bytes());
    b
}

pub fn audio_entry(
    typ: &[u8; 4],
    channels: u16,
    sample_size: u16,
    rate: u32,
    children: &[Vec<u8>],
) -> Vec<u8> {
    let mut b = audio_fields(0, channels, sample_size, rate);
    b.extend_from_slice(&children.concat());
    bx(typ, &b)
}

/// QuickTime sound description v1: four extra u32 fields before the children.
pub fn qt_v1_audio_entry(typ: &[u8; 4], channels: u16, rate: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let mut b = audio_fields(1, channels, 16, rate);
    b.extend_from_slice(&u32s(&[1024, 1, 4, 2]));
    b.extend_from_slice(&children.concat());
    bx(typ, &b)
}

pub fn visual_entry(typ: &[u8; 4], width: u16, height: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let mut b = vec![0u8; 6];
    b.extend_from_slice(&1u16.to_be_bytes());
    b.extend_from_slice(&[0u8; 2 + 2 + 12]);
    b.extend_from_slice(&width.to_be_bytes());
    b.extend_from_slice(&height.to_be_bytes());
    b.extend_from_slice(&u32s(&[0x0048_0000, 0x0048_0000, 0]));
    b.extend_from_slice(&1u16.to_be_bytes());
    let mut name = [0u8; 32];
    name[0] = 4;
    name[1..5].copy_from_slice(b"test");
    b.extend_from_slice(&name);
    b.extend_from_slice(&0x18u16.to_be_bytes());
    b.extend_from_slice(&0xFFFFu16.to_be_bytes());
    b.extend_from_slice(&children.concat());
    bx(typ, &b)
}

pub fn stts(runs: &[(u32, u32)]) -> Vec<u8> {
    let mut b = (runs.len() as u32).to_be_bytes().to_vec();
    for &(count, delta) in runs {
        b.extend_from_slice(&u32s(&[count, delta]));
    }
    full_bx(b"stts", 0, 0, &b)
}

pub fn ctts(runs: &[(u32, i32)]) -> Vec<u8> {
    let mut b = (runs.len() as u32).to_be_bytes().to_vec();
    for &(count, offset) in runs {
        b.extend_from_slice(&count.to_be_bytes());
        b.extend_from_slice(&offset.to_be_bytes());
    }
    full_bx(b"ctts", 1, 0, &b)
}

pub fn stsc(runs: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut b = (runs.len() as u32).to_be_bytes().to_vec();
    for &(first, per_chunk, desc) in runs {
        b.extend_from_slice(&u32s(&[first, per_chunk, desc]));
    }
    full_bx(b"stsc", 0, 0, &b)
}

pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut b = (offsets.len() as u32).to_be_bytes().to_vec();
    b.extend_from_slice(&u32s(offsets));
    full_bx(b"stco", 0, 0, &b)
}

pub fn co64(offsets: &[u64]) -> Vec<u8> {
    let mut b = (offsets.len() as u32).to_be_bytes().to_vec();
    for o in offsets {
        b.extend_from_slice(&o.to_be_bytes());
    }
    full_bx(b"co64", 0, 0, &b)
}

pub fn stsz_fixed(size: u32, count: u32) -> Vec<u8> {
    full_bx(b"stsz", 0, 0, &u32s(&[size, count]))
}

pub fn stsz(sizes: &[u32]) -> Vec<u8> {
    let mut b = u32s(&[0, sizes.len() as u32]);
    b.extend_from_slice(&u32s(sizes));
    full_bx(b"stsz", 0, 0, &b)
}

pub fn stss(numbers: &[u32]) -> Vec<u8> {
    let mut b = (numbers.len() as u32).to_be_bytes().to_vec();
    b.extend_from_slice(&u32s(numbers));
    full_bx(b"stss", 0, 0, &b)
}

pub fn sdtp(entries: &[u8]) -> Vec<u8> {
    full_bx(b"sdtp", 0, 0, entries)
}

/// `edts` with one edit starting at `media_time`.
pub fn edts(media_time: i32) -> Vec<u8> {
    let mut b = 1u32.to_be_bytes().to_vec();
    b.extend_from_slice(&0u32.to_be_bytes());
    b.extend_from_slice(&media_time.to_be_bytes());
    b.extend_from_slice(&u32s(&[0x0001_0000]));
    bx(b"edts", &full_bx(b"elst", 0, 0, &b))
}

/// A `trak` whose `stbl` holds exactly `stbl_children`, in order.
pub fn trak(
    track_id: u32,
    handler: &[u8; 4],
    timescale: u32,
    duration: u32,
    stbl_children: &[Vec<u8>],
) -> Vec<u8> {
    trak_with(track_id, handler, timescale, duration, &[], stbl_children)
}

/// Like [`trak`], with extra boxes placed after `tkhd`.
pub fn trak_with(
    track_id: u32,
    handler: &[u8; 4],
    timescale: u32,
    duration: u32,
    extra: &[Vec<u8>],
    stbl_children: &[Vec<u8>],
) -> Vec<u8> {
    let media_header = match handler {
        b"vide" => full_bx(b"vmhd", 0, 1, &[0u8; 8]),
        b"soun" => full_bx(b"smhd", 0, 0, &[0u8; 4]),
        _ => full_bx(b"nmhd", 0, 0, &[]),
    };
    let stbl = bx(b"stbl", &stbl_children.concat());
    let minf = bx(b"minf", &[media_header, dinf(), stbl].concat());
    let mdia = bx(
        b"mdia",
        &[mdhd(timescale, duration), hdlr(handler), minf].concat(),
    );
    let mut parts = vec![tkhd(track_id, 0, 0)];
    parts.extend_from_slice(extra);
    parts.push(mdia);
    bx(b"trak", &parts.concat())
}

pub fn moov(timescale: u32, duration: u32, traks: &[Vec<u8>]) -> Vec<u8> {
    let mut b = mvhd(timescale, duration);
    b.extend_from_slice(&traks.concat());
    bx(b"moov", &b)
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Standard single-track AAC file: 10 samples of 192 bytes in one chunk at
/// offset 0, followed by 1920 bytes of `mdat` payload.
pub fn aac_stbl(chunk_offset: u32) -> Vec<Vec<u8>> {
    vec![
        stsd(&[audio_entry(b"mp4a", 2, 16, 44100, &[])]),
        stts(&[(10, 1024)]),
        stsc(&[(1, 10, 1)]),
        stco(&[chunk_offset]),
        stsz_fixed(192, 10),
    ]
}

pub fn audio_file() -> Vec<u8> {
    [
        ftyp(b"isom", 0, &[b"isom", b"iso2"]),
        moov(1000, 232, &[trak(1, b"soun", 44100, 10240, &aac_stbl(0))]),
        bx(b"mdat", &payload(1920)),
    ]
    .concat()
}

/// `ftyp`, `mdat` carrying `data`, then a `moov` with `traks`.
/// Chunk offsets inside `traks` should be relative to [`DATA_START`].
pub fn file_with(data: &[u8], traks: &[Vec<u8>]) -> Vec<u8> {
    [iso_ftyp(), bx(b"mdat", data), moov(1000, 0, traks)].concat()
}

/// Video track with `n` 100-byte samples, one per chunk, 1 tick apart.
pub fn video_stbl(n: u32, extra: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let offsets: Vec<u32> = (0..n).map(|i| DATA_START as u32 + i * 100).collect();
    let mut v = vec![
        stsd(&[visual_entry(b"avc1", 320, 240, &[bx(b"avcC", &[1, 0x64, 0, 0x1f])])]),
        stts(&[(n, 1)]),
        stsc(&[(1, 1, 1)]),
        stco(&offsets),
        stsz_fixed(100, n),
    ];
    v.extend_from_slice(extra);
    v
}
