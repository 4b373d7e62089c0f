use crate::boxes::{BoxHeader, BoxValue};
use crate::parser::ParseContext;
use crate::reader::{BoxReader, read_bit_fields};
use anyhow::bail;
use serde::Serialize;

/// Decoding Time-to-Sample Box data
#[derive(Debug, Clone, Serialize)]
pub struct SttsData {
    pub entries: Vec<SttsEntry>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

impl SttsData {
    pub fn total_samples(&self) -> u64 {
        self.entries.iter().map(|e| e.sample_count as u64).sum()
    }
}

/// Composition Time-to-Sample Box data. Offsets are read as signed for both
/// versions; version 0 writers never set the high bit in practice.
#[derive(Debug, Clone, Serialize)]
pub struct CttsData {
    pub entries: Vec<CttsEntry>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CttsEntry {
    pub sample_count: u32,
    pub sample_offset: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CslgData {
    pub composition_to_dts_shift: i64,
    pub least_decode_to_display_delta: i64,
    pub greatest_decode_to_display_delta: i64,
    pub composition_start_time: i64,
    pub composition_end_time: i64,
}

/// Sample-to-Chunk Box data
#[derive(Debug, Clone, Serialize)]
pub struct StscData {
    pub entries: Vec<StscEntry>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// `stco` or `co64`, widened to 64 bits.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOffsetData {
    pub wide: bool,
    pub offsets: Vec<u64>,
}

/// `stsz` or `stz2`.
#[derive(Debug, Clone, Serialize)]
pub struct StszData {
    /// Non-zero means every sample has this size and `sizes` is empty.
    pub sample_size: u32,
    pub sample_count: u32,
    /// Bits per entry: 32 for `stsz`, 4/8/16 for `stz2`.
    pub field_size: u8,
    pub sizes: Vec<u32>,
}

impl StszData {
    pub fn size_of(&self, index: usize) -> Option<u32> {
        if self.sample_size != 0 {
            return (index < self.sample_count as usize).then_some(self.sample_size);
        }
        self.sizes.get(index).copied()
    }
}

/// Sync Sample Box data, 1-based sample numbers.
#[derive(Debug, Clone, Serialize)]
pub struct StssData {
    pub sample_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StshData {
    pub entries: Vec<StshEntry>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StshEntry {
    pub shadowed_sample_number: u32,
    pub sync_sample_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StdpData {
    pub priorities: Vec<u16>,
}

/// Padding bits, one 3-bit value per sample.
#[derive(Debug, Clone, Serialize)]
pub struct PadbData {
    pub pad: Vec<u8>,
}

/// One byte per sample; the count comes from the sample size table.
#[derive(Debug, Clone, Serialize)]
pub struct SdtpData {
    pub entries: Vec<u8>,
}

/// The four 2-bit fields of an `sdtp` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDependency {
    pub is_leading: u8,
    pub depends_on: u8,
    pub is_depended_on: u8,
    pub has_redundancy: u8,
}

impl SdtpData {
    pub fn get(&self, index: usize) -> Option<SampleDependency> {
        self.entries.get(index).map(|&b| SampleDependency {
            is_leading: b >> 6,
            depends_on: (b >> 4) & 3,
            is_depended_on: (b >> 2) & 3,
            has_redundancy: b & 3,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackReferenceData {
    pub track_ids: Vec<u32>,
}

/// Read a u32 entry count followed by that many fixed-size entries.
///
/// The count is checked against the bytes actually present before anything
/// is allocated.
pub(crate) fn read_entries<T>(
    r: &mut BoxReader<'_>,
    entry_size: u64,
    mut read: impl FnMut(&mut BoxReader<'_>) -> crate::error::Result<T>,
) -> anyhow::Result<Vec<T>> {
    let count = r.u32()? as u64;
    if count * entry_size > r.remaining() {
        bail!(
            "entry count {count} needs {} bytes, only {} left",
            count * entry_size,
            r.remaining()
        );
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read(r)?);
    }
    Ok(out)
}

pub fn decode_stts(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let entries = read_entries(r, 8, |r| {
        Ok(SttsEntry {
            sample_count: r.u32()?,
            sample_delta: r.u32()?,
        })
    })?;
    Ok(BoxValue::TimeToSample(SttsData { entries }))
}

pub fn decode_ctts(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let entries = read_entries(r, 8, |r| {
        Ok(CttsEntry {
            sample_count: r.u32()?,
            sample_offset: r.i32()?,
        })
    })?;
    Ok(BoxValue::CompositionOffset(CttsData { entries }))
}

pub fn decode_cslg(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let wide = version.unwrap_or(0) == 1;
    let mut field = || -> crate::error::Result<i64> {
        if wide {
            r.i64()
        } else {
            Ok(r.i32()? as i64)
        }
    };
    Ok(BoxValue::CompositionShift(CslgData {
        composition_to_dts_shift: field()?,
        least_decode_to_display_delta: field()?,
        greatest_decode_to_display_delta: field()?,
        composition_start_time: field()?,
        composition_end_time: field()?,
    }))
}

pub fn decode_stsc(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let entries = read_entries(r, 12, |r| {
        Ok(StscEntry {
            first_chunk: r.u32()?,
            samples_per_chunk: r.u32()?,
            sample_description_index: r.u32()?,
        })
    })?;
    Ok(BoxValue::SampleToChunk(StscData { entries }))
}

pub fn decode_stco(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let offsets = read_entries(r, 4, |r| Ok(r.u32()? as u64))?;
    Ok(BoxValue::ChunkOffset(ChunkOffsetData {
        wide: false,
        offsets,
    }))
}

pub fn decode_co64(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let offsets = read_entries(r, 8, |r| r.u64())?;
    Ok(BoxValue::ChunkOffset(ChunkOffsetData {
        wide: true,
        offsets,
    }))
}

pub fn decode_stsz(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let sample_size = r.u32()?;
    let (sample_count, sizes) = if sample_size == 0 {
        let sizes = read_entries(r, 4, |r| r.u32())?;
        (sizes.len() as u32, sizes)
    } else {
        (r.u32()?, Vec::new())
    };
    Ok(BoxValue::SampleSize(StszData {
        sample_size,
        sample_count,
        field_size: 32,
        sizes,
    }))
}

pub fn decode_stz2(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    r.skip(3)?;
    let field_size = r.u8()?;
    if !(1..=32).contains(&field_size) {
        bail!("stz2 field size {field_size} out of range");
    }
    let sample_count = r.u32()?;
    let needed = (sample_count as u64 * field_size as u64).div_ceil(8);
    if needed > r.remaining() {
        bail!(
            "stz2 with {sample_count} {field_size}-bit entries needs {needed} bytes, only {} left",
            r.remaining()
        );
    }
    let sizes = read_bit_fields(r.bytes(needed)?, field_size, sample_count)?;
    Ok(BoxValue::SampleSize(StszData {
        sample_size: 0,
        sample_count,
        field_size,
        sizes,
    }))
}

pub fn decode_stss(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let sample_numbers = read_entries(r, 4, |r| r.u32())?;
    Ok(BoxValue::SyncSample(StssData { sample_numbers }))
}

pub fn decode_stsh(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let entries = read_entries(r, 8, |r| {
        Ok(StshEntry {
            shadowed_sample_number: r.u32()?,
            sync_sample_number: r.u32()?,
        })
    })?;
    Ok(BoxValue::ShadowSync(StshData { entries }))
}

pub fn decode_stdp(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let mut priorities = Vec::with_capacity((r.remaining() / 2) as usize);
    while r.remaining() >= 2 {
        priorities.push(r.u16()?);
    }
    Ok(BoxValue::DegradationPriority(StdpData { priorities }))
}

pub fn decode_padb(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let sample_count = r.u32()? as usize;
    let packed = r.bytes(sample_count.div_ceil(2) as u64)?;
    let pad = packed
        .iter()
        .flat_map(|&b| [(b >> 4) & 7, b & 7])
        .take(sample_count)
        .collect();
    Ok(BoxValue::PaddingBits(PadbData { pad }))
}

pub fn decode_sdtp(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::SampleDependency(SdtpData {
        entries: r.rest().to_vec(),
    }))
}

pub fn decode_track_reference(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let mut track_ids = Vec::with_capacity((r.remaining() / 4) as usize);
    while r.remaining() >= 4 {
        track_ids.push(r.u32()?);
    }
    Ok(BoxValue::TrackReference(TrackReferenceData { track_ids }))
}
