use crate::boxes::{BoxHeader, BoxValue, as_hex};
use crate::parser::ParseContext;
use crate::reader::{BoxReader, decode_language};
use serde::Serialize;

/// 3GPP user-data string (`cprt`, `titl`, `auth`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct NoticeData {
    pub language: String,
    pub text: String,
}

/// Payload of an iTunes `data` atom.
#[derive(Debug, Clone, Serialize)]
pub struct IlstValueData {
    /// Well-known type: 1 = UTF-8, 13 = JPEG, 14 = PNG, 21 = signed integer, 0 = implicit.
    pub type_code: u32,
    pub locale: u32,
    pub text: Option<String>,
    #[serde(serialize_with = "as_hex")]
    pub payload: Vec<u8>,
}

const TYPE_UTF8: u32 = 1;
const TYPE_UTF16: u32 = 2;

fn utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

pub fn decode_notice(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let language = decode_language(r.u16()?);
    let rest = r.rest();
    let text = match rest {
        [0xFE, 0xFF, utf16 @ ..] => utf16_be(utf16),
        _ => BoxReader::new(rest).string_to_end(),
    };
    Ok(BoxValue::Notice(NoticeData { language, text }))
}

/// `gnre` is an item container under `ilst` and a 3GPP notice elsewhere.
pub fn decode_gnre(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    version: Option<u8>,
    flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    if ctx.parent_is(b"ilst") {
        return super::decode_container(r, hdr, version, flags, ctx);
    }
    // 3GPP notices are full boxes; this tag is registered plain
    r.skip(4)?;
    decode_notice(r, hdr, version, flags, ctx)
}

pub fn decode_yrrc(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::RecordingYear(r.u16()?))
}

pub fn decode_data(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let type_code = flags.unwrap_or(0);
    let locale = r.u32()?;
    let payload = r.rest().to_vec();
    let text = match type_code {
        TYPE_UTF8 => Some(String::from_utf8_lossy(&payload).into_owned()),
        TYPE_UTF16 => Some(utf16_be(&payload)),
        _ => None,
    };
    Ok(BoxValue::ItunesValue(IlstValueData {
        type_code,
        locale,
        text,
        payload,
    }))
}

/// `mean` and `name` of a freeform `----` item.
pub fn decode_name(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::ItunesName(r.string_to_end()))
}
