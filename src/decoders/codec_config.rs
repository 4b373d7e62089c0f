use crate::boxes::{BoxHeader, BoxValue, FourCC, as_hex};
use crate::error::Result;
use crate::parser::ParseContext;
use crate::reader::BoxReader;
use serde::Serialize;
use tracing::debug;

const ES_DESCRIPTOR: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR: u8 = 0x04;
const DECODER_SPECIFIC_INFO: u8 = 0x05;

/// MPEG-4 object type indications that carry MPEG-1/2 layer III audio.
pub const OTI_MPEG2_AUDIO_PART3: u8 = 0x69;
pub const OTI_MPEG1_AUDIO: u8 = 0x6B;

/// Elementary stream descriptor, with the fields needed to pick a decoder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EsdsData {
    pub es_id: u16,
    pub object_type_indication: Option<u8>,
    pub stream_type: Option<u8>,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    #[serde(serialize_with = "as_hex")]
    pub decoder_specific_info: Vec<u8>,
    /// Descriptor bytes as stored, after the version/flags header.
    #[serde(serialize_with = "as_hex")]
    pub raw: Vec<u8>,
}

impl EsdsData {
    pub fn is_mp3(&self) -> bool {
        matches!(
            self.object_type_indication,
            Some(OTI_MPEG2_AUDIO_PART3 | OTI_MPEG1_AUDIO)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BtrtData {
    pub buffer_size_db: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaspData {
    pub h_spacing: u32,
    pub v_spacing: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColrData {
    pub colour_type: FourCC,
    pub nclx: Option<Nclx>,
    #[serde(serialize_with = "as_hex")]
    pub profile: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Nclx {
    pub colour_primaries: u16,
    pub transfer_characteristics: u16,
    pub matrix_coefficients: u16,
    pub full_range: Option<bool>,
}

/// Descriptor length: up to four bytes, 7 bits each, high bit = more.
fn descriptor_len(r: &mut BoxReader<'_>) -> Result<u64> {
    let mut len = 0u64;
    for _ in 0..4 {
        let b = r.u8()?;
        len = (len << 7) | (b & 0x7F) as u64;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok(len)
}

fn descriptor<'a>(r: &mut BoxReader<'a>) -> Result<(u8, BoxReader<'a>)> {
    let tag = r.u8()?;
    let len = descriptor_len(r)?.min(r.remaining());
    Ok((tag, r.sub_reader(len)?))
}

fn parse_es_descriptor(raw: &[u8], out: &mut EsdsData) -> Result<()> {
    let mut r = BoxReader::new(raw);
    let (tag, mut es) = descriptor(&mut r)?;
    if tag != ES_DESCRIPTOR {
        debug!(tag, "esds does not start with an ES descriptor");
        return Ok(());
    }
    out.es_id = es.u16()?;
    let es_flags = es.u8()?;
    if es_flags & 0x80 != 0 {
        // dependsOn_ES_ID
        es.skip(2)?;
    }
    if es_flags & 0x40 != 0 {
        let url_len = es.u8()? as u64;
        es.skip(url_len)?;
    }
    if es_flags & 0x20 != 0 {
        // OCR_ES_Id
        es.skip(2)?;
    }

    while es.remaining() >= 2 {
        let (tag, mut body) = descriptor(&mut es)?;
        if tag != DECODER_CONFIG_DESCRIPTOR {
            continue;
        }
        out.object_type_indication = Some(body.u8()?);
        out.stream_type = Some(body.u8()? >> 2);
        // buffer size
        body.skip(3)?;
        out.max_bitrate = body.u32()?;
        out.avg_bitrate = body.u32()?;
        while body.remaining() >= 2 {
            let (tag, mut info) = descriptor(&mut body)?;
            if tag == DECODER_SPECIFIC_INFO {
                out.decoder_specific_info = info.rest().to_vec();
                break;
            }
        }
        break;
    }
    Ok(())
}

pub fn decode_esds(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let raw = r.rest();
    let mut data = EsdsData {
        raw: raw.to_vec(),
        ..Default::default()
    };
    // a mangled descriptor still leaves the raw bytes usable
    if let Err(e) = parse_es_descriptor(raw, &mut data) {
        debug!(offset = hdr.start, "esds descriptor walk failed: {e}");
    }
    Ok(BoxValue::EsDescriptor(data))
}

/// Configuration records handed to decoders verbatim (`avcC`, `hvcC`, `dOps`, ...).
pub fn decode_raw_config(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::CodecConfig(r.rest().to_vec()))
}

pub fn decode_btrt(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::BitRate(BtrtData {
        buffer_size_db: r.u32()?,
        max_bitrate: r.u32()?,
        avg_bitrate: r.u32()?,
    }))
}

pub fn decode_pasp(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::PixelAspect(PaspData {
        h_spacing: r.u32()?,
        v_spacing: r.u32()?,
    }))
}

pub fn decode_colr(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let colour_type = r.fourcc()?;
    let data = if colour_type == b"nclx" || colour_type == b"nclc" {
        let colour_primaries = r.u16()?;
        let transfer_characteristics = r.u16()?;
        let matrix_coefficients = r.u16()?;
        // QuickTime 'nclc' has no range byte
        let full_range = if colour_type == b"nclx" {
            Some(r.u8()? & 0x80 != 0)
        } else {
            None
        };
        ColrData {
            colour_type,
            nclx: Some(Nclx {
                colour_primaries,
                transfer_characteristics,
                matrix_coefficients,
                full_range,
            }),
            profile: Vec::new(),
        }
    } else {
        ColrData {
            colour_type,
            nclx: None,
            profile: r.rest().to_vec(),
        }
    };
    Ok(BoxValue::Colour(data))
}

pub fn decode_frma(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::OriginalFormat(r.fourcc()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_aac_descriptor_chain() {
        // ES(id 1) > DecoderConfig(OTI 0x40, audio) > DSI [0x12, 0x10]
        let raw = [
            0x03, 0x19, 0x00, 0x01, 0x00, //
            0x04, 0x11, 0x40, 0x15, 0x00, 0x00, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4,
            0x00, //
            0x05, 0x02, 0x12, 0x10, //
            0x06, 0x01, 0x02,
        ];
        let mut data = EsdsData::default();
        parse_es_descriptor(&raw, &mut data).unwrap();
        assert_eq!(data.es_id, 1);
        assert_eq!(data.object_type_indication, Some(0x40));
        assert_eq!(data.stream_type, Some(5));
        assert_eq!(data.max_bitrate, 128_000);
        assert_eq!(data.decoder_specific_info, vec![0x12, 0x10]);
        assert!(!data.is_mp3());
    }

    #[test]
    fn descriptor_length_uses_continuation_bits() {
        let raw = [0x80, 0x80, 0x80, 0x22];
        let mut r = BoxReader::new(&raw);
        assert_eq!(descriptor_len(&mut r).unwrap(), 0x22);
    }
}
