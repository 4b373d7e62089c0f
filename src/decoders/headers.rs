use crate::boxes::{BoxHeader, BoxValue, FileType, FourCC};
use crate::parser::ParseContext;
use crate::reader::{BoxReader, decode_language};
use serde::Serialize;

/// Movie Header Box data
#[derive(Debug, Clone, Serialize)]
pub struct MvhdData {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: f64,
    pub volume: f64,
    pub next_track_id: u32,
}

/// Track Header Box data
#[derive(Debug, Clone, Serialize)]
pub struct TkhdData {
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: f64,
    pub width: f64,
    pub height: f64,
    pub enabled: bool,
}

/// Media Header Box data
#[derive(Debug, Clone, Serialize)]
pub struct MdhdData {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HdlrData {
    pub handler_type: FourCC,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VmhdData {
    pub graphics_mode: u16,
    pub opcolor: [u16; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct SmhdData {
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HmhdData {
    pub max_pdu_size: u16,
    pub avg_pdu_size: u16,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
}

/// `url ` / `urn ` entry of a `dref`.
#[derive(Debug, Clone, Serialize)]
pub struct DataEntryData {
    /// Flag bit 0: media lives in this file and `location` is absent.
    pub self_contained: bool,
    pub name: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElstData {
    pub entries: Vec<ElstEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElstEntry {
    pub segment_duration: u64,
    /// -1 marks an empty edit.
    pub media_time: i64,
    pub media_rate: f64,
}

impl ElstData {
    /// Media time of the first non-empty edit, in media timescale units.
    pub fn media_start(&self) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.media_time >= 0)
            .map(|e| e.media_time as u64)
    }
}

pub fn parse_ftyp(r: &mut BoxReader<'_>) -> anyhow::Result<FileType> {
    let major_brand = r.fourcc()?;
    let minor_version = r.u32()?;
    let mut compatible_brands = Vec::with_capacity((r.remaining() / 4) as usize);
    while r.remaining() >= 4 {
        compatible_brands.push(r.fourcc()?);
    }
    Ok(FileType {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

pub fn decode_ftyp(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::FileType(parse_ftyp(r)?))
}

pub fn decode_mvhd(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let v = version.unwrap_or(0);
    let creation_time = r.versioned_u64(v)?;
    let modification_time = r.versioned_u64(v)?;
    let timescale = r.u32()?;
    let duration = r.versioned_u64(v)?;
    let rate = r.fixed32()?;
    let volume = r.fixed16()?;
    // reserved(2) + reserved(8) + matrix(36) + pre_defined(24)
    r.skip(2 + 8 + 36 + 24)?;
    let next_track_id = r.u32()?;
    Ok(BoxValue::MovieHeader(MvhdData {
        creation_time,
        modification_time,
        timescale,
        duration,
        rate,
        volume,
        next_track_id,
    }))
}

pub fn decode_tkhd(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    version: Option<u8>,
    flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let v = version.unwrap_or(0);
    let creation_time = r.versioned_u64(v)?;
    let modification_time = r.versioned_u64(v)?;
    let track_id = r.u32()?;
    r.skip(4)?;
    let duration = r.versioned_u64(v)?;
    r.skip(8)?;
    let layer = r.i16()?;
    let alternate_group = r.i16()?;
    let volume = r.fixed16()?;
    r.skip(2 + 36)?;
    let width = r.fixed32()?;
    let height = r.fixed32()?;
    Ok(BoxValue::TrackHeader(TkhdData {
        creation_time,
        modification_time,
        track_id,
        duration,
        layer,
        alternate_group,
        volume,
        width,
        height,
        enabled: flags.unwrap_or(0) & 1 != 0,
    }))
}

pub fn decode_mdhd(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let v = version.unwrap_or(0);
    let creation_time = r.versioned_u64(v)?;
    let modification_time = r.versioned_u64(v)?;
    let timescale = r.u32()?;
    let duration = r.versioned_u64(v)?;
    let language = decode_language(r.u16()?);
    Ok(BoxValue::MediaHeader(MdhdData {
        creation_time,
        modification_time,
        timescale,
        duration,
        language,
    }))
}

pub fn decode_hdlr(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    // pre_defined holds the QuickTime component type ('mhlr'/'dhlr')
    r.skip(4)?;
    let handler_type = r.fourcc()?;
    r.skip(12)?;
    let rest = r.rest();
    // QuickTime stores a Pascal string here, ISO a C string
    let name = match rest.split_first() {
        Some((&len, tail)) if ctx.file_type.is_quicktime() && len as usize == tail.len() => {
            String::from_utf8_lossy(tail).into_owned()
        }
        _ => BoxReader::new(rest).string_to_end(),
    };
    Ok(BoxValue::Handler(HdlrData { handler_type, name }))
}

pub fn decode_vmhd(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let graphics_mode = r.u16()?;
    let opcolor = [r.u16()?, r.u16()?, r.u16()?];
    Ok(BoxValue::VideoMediaHeader(VmhdData {
        graphics_mode,
        opcolor,
    }))
}

pub fn decode_smhd(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let balance = r.i16()? as f64 / 256.0;
    r.skip(2)?;
    Ok(BoxValue::SoundMediaHeader(SmhdData { balance }))
}

pub fn decode_hmhd(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let data = HmhdData {
        max_pdu_size: r.u16()?,
        avg_pdu_size: r.u16()?,
        max_bitrate: r.u32()?,
        avg_bitrate: r.u32()?,
    };
    r.skip(4)?;
    Ok(BoxValue::HintMediaHeader(data))
}

pub fn decode_nmhd(
    _r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::NullMediaHeader)
}

fn cstring(r: &mut BoxReader<'_>) -> Option<String> {
    if r.is_empty() {
        return None;
    }
    let start = r.position();
    let data = r.rest();
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    r.seek_to(start + end as u64 + 1);
    Some(String::from_utf8_lossy(&data[..end]).into_owned())
}

pub fn decode_url(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let self_contained = flags.unwrap_or(0) & 1 != 0;
    let location = if self_contained { None } else { cstring(r) };
    Ok(BoxValue::DataEntry(DataEntryData {
        self_contained,
        name: None,
        location,
    }))
}

pub fn decode_urn(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let self_contained = flags.unwrap_or(0) & 1 != 0;
    let name = cstring(r);
    let location = cstring(r);
    Ok(BoxValue::DataEntry(DataEntryData {
        self_contained,
        name,
        location,
    }))
}

pub fn decode_elst(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let v = version.unwrap_or(0);
    let entry_size = if v == 1 { 20 } else { 12 };
    let entries = super::tables::read_entries(r, entry_size, |r| {
        let (segment_duration, media_time) = if v == 1 {
            (r.u64()?, r.i64()?)
        } else {
            (r.u32()? as u64, r.i32()? as i64)
        };
        let media_rate = r.i16()? as f64 + r.u16()? as f64 / 65536.0;
        Ok(ElstEntry {
            segment_duration,
            media_time,
            media_rate,
        })
    })?;
    Ok(BoxValue::EditList(ElstData { entries }))
}
