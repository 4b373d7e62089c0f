//! Track validation, sample-table resolution and the per-track read cursor.
//!
//! A `trak` subtree is first checked for its mandatory spine ([`validate`]),
//! then flattened into one [`Sample`] per access unit ([`resolve`]). The
//! resulting array is ordered by decode time, which the seek logic relies on.

use crate::boxes::{BoxValue, FourCC, Mp4Box};
use crate::decoders::tables::{
    ChunkOffsetData, CttsData, SdtpData, StscData, StssData, StszData, SttsData,
};
use crate::error::{Error, Result};
use bitflags::bitflags;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace, warn};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct SampleFlags: u32 {
        /// Decoding can start here.
        const SYNC = 1;
        const LEADING = 1 << 1;
        /// Nothing else references this sample.
        const DISPOSAL = 1 << 2;
        /// Decode for prediction state only; it precedes the seek target.
        const REFERENCE = 1 << 3;
        const REDUNDANT = 1 << 4;
    }
}

/// A time value and the ticks-per-second it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MediaTime {
    pub value: u64,
    pub timescale: u32,
}

impl MediaTime {
    pub fn new(value: u64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub fn from_secs_f64(secs: f64, timescale: u32) -> Self {
        Self::new((secs.max(0.0) * timescale as f64).round() as u64, timescale)
    }

    /// Convert to `timescale` ticks, rounding down. A zero source timescale
    /// means the value is already in the target units.
    pub fn rescale(&self, timescale: u32) -> u64 {
        if self.timescale == 0 || self.timescale == timescale {
            return self.value;
        }
        let v = self.value as u128 * timescale as u128 / self.timescale as u128;
        u64::try_from(v).unwrap_or(u64::MAX)
    }

    pub fn as_secs_f64(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Codec {
    H264,
    Hevc,
    Mpeg4Visual,
    H263,
    Vp9,
    Av1,
    Mjpeg,
    Aac,
    Mp3,
    AmrNb,
    AmrWb,
    Ac3,
    Eac3,
    Alac,
    Opus,
    Flac,
    Pcm,
    Ulaw,
    Alaw,
}

impl Codec {
    pub fn from_sample_entry(tag: FourCC) -> Option<Self> {
        let codec = match &tag.0 {
            b"avc1" | b"avc3" => Codec::H264,
            b"hvc1" | b"hev1" => Codec::Hevc,
            b"mp4v" => Codec::Mpeg4Visual,
            b"s263" => Codec::H263,
            b"vp09" => Codec::Vp9,
            b"av01" => Codec::Av1,
            b"jpeg" => Codec::Mjpeg,
            b"mp4a" => Codec::Aac,
            b".mp3" => Codec::Mp3,
            b"samr" => Codec::AmrNb,
            b"sawb" => Codec::AmrWb,
            b"ac-3" => Codec::Ac3,
            b"ec-3" => Codec::Eac3,
            b"alac" => Codec::Alac,
            b"Opus" => Codec::Opus,
            b"fLaC" => Codec::Flac,
            b"lpcm" | b"sowt" | b"twos" => Codec::Pcm,
            b"ulaw" => Codec::Ulaw,
            b"alaw" => Codec::Alaw,
            _ => return None,
        };
        Some(codec)
    }

    pub fn is_video(self) -> bool {
        matches!(
            self,
            Codec::H264
                | Codec::Hevc
                | Codec::Mpeg4Visual
                | Codec::H263
                | Codec::Vp9
                | Codec::Av1
                | Codec::Mjpeg
        )
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrackKind {
    Audio {
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    },
    Video {
        width: u16,
        height: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub offset: u64,
    pub size: u32,
    pub dts: u64,
    /// `None` when the file gives no way to derive it (video without `ctts`).
    pub pts: Option<u64>,
    pub flags: SampleFlags,
}

impl Sample {
    pub fn is_sync(&self) -> bool {
        self.flags.contains(SampleFlags::SYNC)
    }
}

/// How a read picks its sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    First,
    Next,
    Last,
    /// The most recently delivered sample again.
    Current,
    /// The sample `Next` would deliver, without moving the cursor.
    Peek,
    SeekClosest(MediaTime),
    SeekNextSync(MediaTime),
    SeekLastSync(MediaTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSearch {
    Closest,
    Next,
    Last,
}

/// Pick the sync sample to start decoding from for `target` (track ticks).
///
/// The bracketing index is the last sample with `dts <= target` (or 0). Sync
/// samples are searched backward and forward from it; `Closest` compares
/// index distances and prefers the backward one on a tie. Missing backward
/// sync falls back to the forward one and vice versa; with no sync sample at
/// all the bracketing index itself is returned.
pub fn seek_index(samples: &[Sample], target: u64, search: SyncSearch) -> Option<usize> {
    if samples.is_empty() {
        return None;
    }
    let mid = samples
        .partition_point(|s| s.dts <= target)
        .saturating_sub(1);
    let back = samples[..=mid].iter().rposition(Sample::is_sync);
    let fwd = samples[mid..].iter().position(Sample::is_sync).map(|i| mid + i);
    let index = match (back, fwd) {
        (None, None) => mid,
        (None, Some(f)) => f,
        (Some(b), None) => b,
        (Some(b), Some(f)) => match search {
            SyncSearch::Last => b,
            SyncSearch::Next => f,
            SyncSearch::Closest => {
                if mid - b <= f - mid {
                    b
                } else {
                    f
                }
            }
        },
    };
    Some(index)
}

/// A resolved track: stream description plus its flat sample table.
#[derive(Debug, Clone)]
pub struct Track {
    /// 1-based position of the `trak` box in `moov`.
    pub index: usize,
    pub track_id: u32,
    pub handler: FourCC,
    pub codec: Codec,
    pub sample_entry: FourCC,
    pub kind: TrackKind,
    pub duration: MediaTime,
    pub language: String,
    /// Raw configuration records keyed by box name (`esds`, `avcC`, ...).
    pub codec_config: BTreeMap<String, Vec<u8>>,
    /// Media time where presentation starts, from the edit list.
    pub edit_start: u64,
    samples: Vec<Sample>,
    cursor: usize,
    last: Option<usize>,
    start_time: u64,
}

impl Track {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn timescale(&self) -> u32 {
        self.duration.timescale
    }

    /// Index of the sample the next `Next` read delivers.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Average bits per second over the track duration; 0 if unknown.
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        let bytes: u64 = self.samples.iter().map(|s| s.size as u64).sum();
        (bytes as f64 * 8.0 / secs).round() as u64
    }

    /// Run the read state machine for `mode`.
    ///
    /// Returns the index of the sample to deliver and its flags as delivered,
    /// or `None` at either end of the table. Samples decoding before the
    /// current start time are skipped when disposable and otherwise marked
    /// [`SampleFlags::REFERENCE`]. The start time begins at the edit list
    /// start, is moved by seeks and is restored by `First`.
    pub fn locate(&mut self, mode: ReadMode) -> Option<(usize, SampleFlags)> {
        let (start, moves) = match mode {
            ReadMode::First => {
                self.start_time = self.edit_start;
                (0, true)
            }
            ReadMode::Next => (self.cursor, true),
            ReadMode::Last => (self.samples.len().checked_sub(1)?, true),
            ReadMode::Current => (self.last.unwrap_or(self.cursor), false),
            ReadMode::Peek => (self.cursor, false),
            ReadMode::SeekClosest(t) => (self.seek(t, SyncSearch::Closest)?, true),
            ReadMode::SeekNextSync(t) => (self.seek(t, SyncSearch::Next)?, true),
            ReadMode::SeekLastSync(t) => (self.seek(t, SyncSearch::Last)?, true),
        };

        let mut index = start;
        let flags = loop {
            let s = self.samples.get(index)?;
            if s.dts >= self.start_time {
                break s.flags;
            }
            if !s.flags.contains(SampleFlags::DISPOSAL) {
                break s.flags | SampleFlags::REFERENCE;
            }
            trace!(track = self.index, index, "dropping disposable sample before start time");
            index += 1;
        };

        if moves {
            self.cursor = index + 1;
            self.last = Some(index);
        }
        Some((index, flags))
    }

    fn seek(&mut self, target: MediaTime, search: SyncSearch) -> Option<usize> {
        let ticks = target.rescale(self.timescale());
        self.start_time = ticks;
        let index = seek_index(&self.samples, ticks, search)?;
        debug!(track = self.index, ticks, index, ?search, "seek");
        Some(index)
    }
}

/// Upper bound on samples per track.
pub const MAX_SAMPLES: u64 = 1 << 25;

/// The sample tables of one `stbl`, borrowed from the box tree.
#[derive(Debug, Clone, Copy)]
pub struct SampleTables<'a> {
    pub time_to_sample: &'a SttsData,
    pub composition_offsets: Option<&'a CttsData>,
    pub sample_to_chunk: &'a StscData,
    pub chunk_offsets: &'a ChunkOffsetData,
    pub sample_sizes: &'a StszData,
    pub sync_samples: Option<&'a StssData>,
    pub dependencies: Option<&'a SdtpData>,
}

macro_rules! typed {
    ($parent:expr, $tag:expr, $variant:ident) => {
        $parent.children_of($tag).find_map(|b| match &b.value {
            BoxValue::$variant(v) => Some(v),
            _ => None,
        })
    };
}

impl<'a> SampleTables<'a> {
    pub fn from_stbl(stbl: &'a Mp4Box) -> Result<Self> {
        Ok(SampleTables {
            time_to_sample: typed!(stbl, b"stts", TimeToSample).ok_or(Error::MissingBox("stts"))?,
            composition_offsets: typed!(stbl, b"ctts", CompositionOffset),
            sample_to_chunk: typed!(stbl, b"stsc", SampleToChunk)
                .ok_or(Error::MissingBox("stsc"))?,
            chunk_offsets: typed!(stbl, b"stco", ChunkOffset)
                .or_else(|| typed!(stbl, b"co64", ChunkOffset))
                .ok_or(Error::MissingBox("stco"))?,
            sample_sizes: typed!(stbl, b"stsz", SampleSize)
                .or_else(|| typed!(stbl, b"stz2", SampleSize))
                .ok_or(Error::MissingBox("stsz"))?,
            sync_samples: typed!(stbl, b"stss", SyncSample),
            dependencies: typed!(stbl, b"sdtp", SampleDependency),
        })
    }

    /// (base offset, sample count) for every chunk, following the sparse
    /// sample-to-chunk runs.
    fn chunks(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        let runs = &self.sample_to_chunk.entries;
        let mut run = 0;
        self.chunk_offsets
            .offsets
            .iter()
            .enumerate()
            .map(move |(i, &base)| {
                let chunk = i as u64 + 1;
                while run + 1 < runs.len() && runs[run + 1].first_chunk as u64 <= chunk {
                    run += 1;
                }
                (base, runs.get(run).map_or(0, |r| r.samples_per_chunk))
            })
    }

    /// Flatten the tables into one record per sample, ordered by decode time.
    pub fn expand(&self, audio: bool) -> Result<Vec<Sample>> {
        let first = self
            .sample_to_chunk
            .entries
            .first()
            .ok_or_else(|| Error::SampleTable("empty sample-to-chunk table".into()))?;
        if first.first_chunk != 1 {
            return Err(Error::BadChunkTable(first.first_chunk));
        }

        let timed = self.time_to_sample.total_samples();
        let sized = self.sample_sizes.sample_count as u64;
        if timed != sized {
            warn!(timed, sized, "time-to-sample and sample-size counts disagree");
        }
        let laid_out: u64 = self.chunks().map(|(_, n)| n as u64).sum();
        if laid_out < timed.min(sized) {
            warn!(laid_out, "chunk layout covers fewer samples than declared");
        }
        let count = timed.min(sized).min(laid_out);
        if count > MAX_SAMPLES {
            return Err(Error::SampleTable(format!(
                "{count} samples exceeds limit of {MAX_SAMPLES}"
            )));
        }
        let count = count as usize;

        let default_flags = if self.sync_samples.is_some() {
            SampleFlags::empty()
        } else {
            SampleFlags::SYNC
        };

        let mut samples = Vec::with_capacity(count);
        let mut dts = 0u64;
        'stts: for run in &self.time_to_sample.entries {
            for _ in 0..run.sample_count {
                if samples.len() == count {
                    break 'stts;
                }
                samples.push(Sample {
                    offset: 0,
                    size: 0,
                    dts,
                    pts: None,
                    flags: default_flags,
                });
                dts = dts.saturating_add(run.sample_delta as u64);
            }
        }

        match self.composition_offsets {
            Some(ctts) => {
                let mut i = 0;
                'ctts: for run in &ctts.entries {
                    for _ in 0..run.sample_count {
                        let Some(s) = samples.get_mut(i) else {
                            break 'ctts;
                        };
                        s.pts = Some(s.dts.saturating_add_signed(run.sample_offset as i64));
                        i += 1;
                    }
                }
                if i < samples.len() {
                    debug!(covered = i, total = samples.len(), "composition offsets end early");
                }
            }
            None if audio => {
                for s in &mut samples {
                    s.pts = Some(s.dts);
                }
            }
            None => warn!("no composition offsets, presentation times unavailable"),
        }

        let mut next = 0;
        'chunks: for (base, per_chunk) in self.chunks() {
            let mut offset = base;
            for _ in 0..per_chunk {
                let Some(s) = samples.get_mut(next) else {
                    break 'chunks;
                };
                let size = self
                    .sample_sizes
                    .size_of(next)
                    .ok_or_else(|| Error::SampleTable(format!("no size for sample {next}")))?;
                s.offset = offset;
                s.size = size;
                offset = offset.saturating_add(size as u64);
                next += 1;
            }
        }
        debug_assert_eq!(next, samples.len());

        if let Some(stss) = self.sync_samples {
            for &number in &stss.sample_numbers {
                match (number as usize).checked_sub(1).and_then(|i| samples.get_mut(i)) {
                    Some(s) => s.flags |= SampleFlags::SYNC,
                    None => debug!(number, "sync sample number out of range"),
                }
            }
        }

        if let Some(sdtp) = self.dependencies {
            for (i, s) in samples.iter_mut().enumerate() {
                let Some(dep) = sdtp.get(i) else { break };
                if matches!(dep.is_leading, 1 | 3) {
                    s.flags |= SampleFlags::LEADING;
                }
                match dep.depends_on {
                    1 => s.flags.remove(SampleFlags::SYNC),
                    2 => s.flags.insert(SampleFlags::SYNC),
                    _ => {}
                }
                if dep.is_depended_on == 2 {
                    s.flags |= SampleFlags::DISPOSAL;
                }
                if dep.has_redundancy == 1 {
                    s.flags |= SampleFlags::REDUNDANT;
                }
            }
        }

        debug_assert!(samples.windows(2).all(|w| w[0].dts <= w[1].dts));
        Ok(samples)
    }
}

fn need<'a>(parent: &'a Mp4Box, tag: &'static str) -> std::result::Result<&'a Mp4Box, &'static str> {
    parent
        .children()
        .iter()
        .find(|c| c.typ().0.as_slice() == tag.as_bytes())
        .ok_or(tag)
}

fn spine(trak: &Mp4Box) -> std::result::Result<(), &'static str> {
    need(trak, "tkhd")?;
    let mdia = need(trak, "mdia")?;
    need(mdia, "mdhd")?;
    need(mdia, "hdlr")?;
    let minf = need(mdia, "minf")?;
    need(need(minf, "dinf")?, "dref")?;
    let stbl = need(minf, "stbl")?;
    for tag in ["stsd", "stts", "stsc"] {
        need(stbl, tag)?;
    }
    need(stbl, "stco")
        .or_else(|_| need(stbl, "co64"))
        .map_err(|_| "stco")?;
    need(stbl, "stsz")
        .or_else(|_| need(stbl, "stz2"))
        .map_err(|_| "stsz")?;
    Ok(())
}

/// Check that a `trak` carries every box the resolver needs.
pub fn validate(trak: &Mp4Box) -> Result<()> {
    spine(trak).map_err(Error::MissingBox)
}

/// Children that may hold codec configuration: the entry's own, then those
/// of a QuickTime `wave` wrapper.
fn config_boxes(entry: &Mp4Box) -> impl Iterator<Item = &Mp4Box> {
    let wave = entry.child(b"wave").map_or(&[][..], Mp4Box::children);
    entry.children().iter().chain(wave)
}

fn codec_config(entry: &Mp4Box) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    for b in config_boxes(entry) {
        let raw = match &b.value {
            BoxValue::EsDescriptor(esds) => &esds.raw,
            BoxValue::CodecConfig(bytes) => bytes,
            _ => continue,
        };
        out.entry(b.typ().as_str_lossy())
            .or_insert_with(|| raw.clone());
    }
    out
}

fn carries_mp3(entry: &Mp4Box) -> bool {
    config_boxes(entry).any(|b| matches!(&b.value, BoxValue::EsDescriptor(e) if e.is_mp3()))
}

/// Build a [`Track`] from a validated `trak` subtree; `index` is 1-based.
pub fn resolve(trak: &Mp4Box, index: usize) -> Result<Track> {
    validate(trak)?;
    let tkhd = typed!(trak, b"tkhd", TrackHeader).ok_or(Error::MissingBox("tkhd"))?;
    let mdia = trak.child(b"mdia").ok_or(Error::MissingBox("mdia"))?;
    let mdhd = typed!(mdia, b"mdhd", MediaHeader).ok_or(Error::MissingBox("mdhd"))?;
    let hdlr = typed!(mdia, b"hdlr", Handler).ok_or(Error::MissingBox("hdlr"))?;
    let stbl = mdia
        .find(&[b"minf", b"stbl"])
        .ok_or(Error::MissingBox("stbl"))?;
    let stsd = stbl.child(b"stsd").ok_or(Error::MissingBox("stsd"))?;

    let entries = stsd.children();
    let entry = entries
        .first()
        .ok_or_else(|| Error::SampleTable("sample description has no entries".into()))?;
    if entries.len() > 1 {
        warn!(track = index, count = entries.len(), "multiple sample entries, using the first");
    }
    let config = codec_config(entry);

    let kind = match (&hdlr.handler_type.0, &entry.value) {
        (b"soun", BoxValue::AudioSampleEntry(a)) => {
            let mut sample_rate = a.sample_rate.round() as u32;
            if sample_rate == 0 {
                warn!(
                    track = index,
                    timescale = mdhd.timescale,
                    "sample entry has no sample rate, using media timescale"
                );
                sample_rate = mdhd.timescale;
            }
            TrackKind::Audio {
                sample_rate,
                channels: a.channel_count,
                bits_per_sample: a.sample_size,
            }
        }
        (b"vide", BoxValue::VisualSampleEntry(v)) => TrackKind::Video {
            width: v.width,
            height: v.height,
        },
        (b"soun" | b"vide", _) => return Err(Error::UnsupportedCodec(entry.typ())),
        _ => {
            debug!(
                track = index,
                handler = %hdlr.handler_type,
                configs = ?config.keys().collect::<Vec<_>>(),
                "handler not demuxed"
            );
            return Err(Error::UnsupportedHandler(hdlr.handler_type));
        }
    };

    let mut codec =
        Codec::from_sample_entry(entry.typ()).ok_or(Error::UnsupportedCodec(entry.typ()))?;
    if codec == Codec::Aac && carries_mp3(entry) {
        codec = Codec::Mp3;
    }

    let tables = SampleTables::from_stbl(stbl)?;
    let samples = tables.expand(matches!(kind, TrackKind::Audio { .. }))?;

    let edit_start = trak
        .find(&[b"edts"])
        .and_then(|edts| typed!(edts, b"elst", EditList))
        .and_then(|elst| elst.media_start())
        .unwrap_or(0);

    debug!(
        track = index,
        %codec,
        samples = samples.len(),
        timescale = mdhd.timescale,
        "track resolved"
    );

    Ok(Track {
        index,
        track_id: tkhd.track_id,
        handler: hdlr.handler_type,
        codec,
        sample_entry: entry.typ(),
        kind,
        duration: MediaTime::new(mdhd.duration, mdhd.timescale),
        language: mdhd.language.clone(),
        codec_config: config,
        edit_start,
        samples,
        cursor: 0,
        last: None,
        start_time: edit_start,
    })
}
