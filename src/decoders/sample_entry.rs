use crate::boxes::{BoxHeader, BoxValue, Mp4Box};
use crate::parser::{ParseContext, parse_children};
use crate::reader::BoxReader;
use serde::Serialize;

pub const VISUAL_ENTRIES: [&[u8; 4]; 9] = [
    b"avc1", b"avc3", b"hvc1", b"hev1", b"mp4v", b"s263", b"vp09", b"av01", b"jpeg",
];

pub const AUDIO_ENTRIES: [&[u8; 4]; 12] = [
    b"samr", b"sawb", b"ac-3", b"ec-3", b"Opus", b"fLaC", b".mp3", b"lpcm", b"sowt", b"twos",
    b"ulaw", b"alaw",
];

#[derive(Debug, Clone, Serialize)]
pub struct VisualSampleEntry {
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    pub horiz_resolution: f64,
    pub vert_resolution: f64,
    pub frame_count: u16,
    pub compressor_name: String,
    pub depth: u16,
    #[serde(skip_serializing)]
    pub children: Vec<Mp4Box>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioSampleEntry {
    pub data_reference_index: u16,
    /// QuickTime sound description version; always 0 in ISO files.
    pub version: u16,
    pub channel_count: u16,
    pub sample_size: u16,
    pub sample_rate: f64,
    pub qt: Option<QtSoundFields>,
    #[serde(skip_serializing)]
    pub children: Vec<Mp4Box>,
}

/// Extra fields of QuickTime sound descriptions v1 and v2.
#[derive(Debug, Clone, Serialize)]
pub enum QtSoundFields {
    V1 {
        samples_per_packet: u32,
        bytes_per_packet: u32,
        bytes_per_frame: u32,
        bytes_per_sample: u32,
    },
    V2 {
        channels: u32,
        bits_per_channel: u32,
        format_flags: u32,
        bytes_per_packet: u32,
        frames_per_packet: u32,
    },
}

pub fn decode_visual(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    r.skip(6)?;
    let data_reference_index = r.u16()?;
    // pre_defined, reserved, pre_defined[3]
    r.skip(2 + 2 + 12)?;
    let width = r.u16()?;
    let height = r.u16()?;
    let horiz_resolution = r.fixed32()?;
    let vert_resolution = r.fixed32()?;
    r.skip(4)?;
    let frame_count = r.u16()?;
    let name = r.bytes(32)?;
    let name_len = (name[0] as usize).min(31);
    let compressor_name = String::from_utf8_lossy(&name[1..1 + name_len]).into_owned();
    let depth = r.u16()?;
    r.skip(2)?;
    let n = r.remaining();
    let children = parse_children(r, n, &ctx.within(hdr.typ))?;
    Ok(BoxValue::VisualSampleEntry(VisualSampleEntry {
        data_reference_index,
        width,
        height,
        horiz_resolution,
        vert_resolution,
        frame_count,
        compressor_name,
        depth,
        children,
    }))
}

pub fn decode_audio(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    r.skip(6)?;
    let data_reference_index = r.u16()?;
    let version = r.u16()?;
    // revision, vendor
    r.skip(2 + 4)?;
    let mut channel_count = r.u16()?;
    let sample_size = r.u16()?;
    // compression id, packet size
    r.skip(4)?;
    let mut sample_rate = (r.u32()? >> 16) as f64;

    let mut qt = None;
    if ctx.file_type.is_quicktime() {
        match version {
            1 => {
                qt = Some(QtSoundFields::V1 {
                    samples_per_packet: r.u32()?,
                    bytes_per_packet: r.u32()?,
                    bytes_per_frame: r.u32()?,
                    bytes_per_sample: r.u32()?,
                });
            }
            2 => {
                // size of struct only
                r.skip(4)?;
                sample_rate = f64::from_bits(r.u64()?);
                let channels = r.u32()?;
                // always 0x7F000000
                r.skip(4)?;
                let fields = QtSoundFields::V2 {
                    channels,
                    bits_per_channel: r.u32()?,
                    format_flags: r.u32()?,
                    bytes_per_packet: r.u32()?,
                    frames_per_packet: r.u32()?,
                };
                channel_count = u16::try_from(channels).unwrap_or(u16::MAX);
                qt = Some(fields);
            }
            _ => {}
        }
    }

    let n = r.remaining();
    let children = parse_children(r, n, &ctx.within(hdr.typ))?;
    Ok(BoxValue::AudioSampleEntry(AudioSampleEntry {
        data_reference_index,
        version,
        channel_count,
        sample_size,
        sample_rate,
        qt,
        children,
    }))
}

/// `mp4a` is a sample entry everywhere except inside `wave`, where it is a
/// short format marker.
pub fn decode_mp4a(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    version: Option<u8>,
    flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    if ctx.in_wave() {
        return Ok(BoxValue::Blob(r.rest().to_vec()));
    }
    decode_audio(r, hdr, version, flags, ctx)
}

/// `alac` names both the sample entry and, nested in it, the decoder cookie.
pub fn decode_alac(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    version: Option<u8>,
    flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    if ctx.parent_is(b"alac") || ctx.in_wave() {
        return Ok(BoxValue::CodecConfig(r.rest().to_vec()));
    }
    decode_audio(r, hdr, version, flags, ctx)
}
