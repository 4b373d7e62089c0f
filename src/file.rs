use crate::boxes::{BoxHeader, BoxValue, FileType, FourCC, Mp4Box, as_hex};
use crate::decoders::headers::parse_ftyp;
use crate::error::{Error, Result};
use crate::parser::{ParseContext, read_box_header};
use crate::reader::BoxReader;
use crate::registry::{Registry, default_registry};
use crate::track::{Codec, MediaTime, ReadMode, SampleFlags, Track, TrackKind, resolve};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, info, warn};

/// Most tracks a file exposes; later `trak` boxes are ignored.
pub const MAX_TRACKS: usize = 64;

/// Read-time options. Bit `i` of `track_mask` enables the track at position `i`,
/// so the mask covers all [`MAX_TRACKS`] positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxOptions {
    pub track_mask: u64,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        DemuxOptions {
            track_mask: u64::MAX,
        }
    }
}

impl DemuxOptions {
    pub fn only(track: usize) -> Self {
        DemuxOptions {
            track_mask: 1u64.checked_shl(track as u32).unwrap_or(0),
        }
    }

    pub fn is_active(&self, track: usize) -> bool {
        track < MAX_TRACKS && self.track_mask & (1 << track) != 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackFormat {
    pub index: usize,
    pub track_id: u32,
    pub codec: Codec,
    pub sample_entry: FourCC,
    pub handler: FourCC,
    #[serde(flatten)]
    pub kind: TrackKind,
    pub duration: MediaTime,
    pub start_time: MediaTime,
    pub language: String,
    pub sample_count: usize,
    pub bitrate: u64,
    #[serde(serialize_with = "config_as_hex")]
    pub codec_config: BTreeMap<String, Vec<u8>>,
}

fn config_as_hex<S: serde::Serializer>(
    map: &BTreeMap<String, Vec<u8>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_map(map.iter().map(|(k, v)| (k, hex::encode(v))))
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaFormats {
    pub major_brand: FourCC,
    pub timescale: u32,
    pub duration: MediaTime,
    pub tracks: Vec<TrackFormat>,
}

impl MediaFormats {
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

/// One sample's payload and timing.
#[derive(Debug, Clone, Serialize)]
pub struct Packet {
    /// 0-based track position as passed to [`Mp4File::read`].
    pub track: usize,
    pub index: usize,
    pub codec: Codec,
    pub flags: SampleFlags,
    pub pts: Option<u64>,
    pub dts: u64,
    pub timescale: u32,
    pub offset: u64,
    #[serde(serialize_with = "as_hex")]
    pub data: Vec<u8>,
}

impl Packet {
    pub fn is_sync(&self) -> bool {
        self.flags.contains(SampleFlags::SYNC)
    }
}

/// Pull-based MP4/QuickTime demuxer over a seekable byte source.
pub struct Mp4File<R> {
    source: R,
    file_type: FileType,
    top_level: Vec<BoxHeader>,
    moov: Mp4Box,
    meta_range: Option<(u64, u64)>,
    timescale: u32,
    duration: u64,
    tracks: Vec<Track>,
    options: DemuxOptions,
}

impl<R: Read + Seek> Mp4File<R> {
    /// Open and require at least one usable track.
    pub fn open(source: R) -> Result<Self> {
        let file = Self::init(source)?;
        if file.tracks.is_empty() {
            return Err(Error::NoTracks);
        }
        Ok(file)
    }

    /// Structural open: fails only on I/O errors or a missing `moov`/`mdat`.
    /// Tracks that fail validation or resolution are dropped, possibly all of them.
    pub fn init(source: R) -> Result<Self> {
        Self::init_with_registry(source, &default_registry())
    }

    pub fn init_with_registry(mut source: R, registry: &Registry) -> Result<Self> {
        let end = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut file_type = None;
        let mut moov_body: Option<(BoxHeader, Vec<u8>)> = None;
        let mut mdat_seen = false;
        let mut meta_range = None;
        let mut top_level = Vec::new();

        let mut pos = 0u64;
        while pos + 8 <= end {
            source.seek(SeekFrom::Start(pos))?;
            let hdr = match read_box_header(&mut source) {
                Ok(h) => h,
                Err(e) => {
                    warn!(offset = pos, "unreadable top-level box header, stopping scan: {e}");
                    break;
                }
            };
            let to_eof = hdr.size == 0;
            let box_end = if to_eof { end } else { pos.saturating_add(hdr.size) };
            let body_len = box_end.saturating_sub(pos + hdr.header_size);
            if box_end > end {
                warn!(typ = %hdr.typ, size = hdr.size, offset = pos, "top-level box runs past end of file");
            }

            match &hdr.typ.0 {
                b"ftyp" if file_type.is_none() => {
                    let body_start = pos + hdr.header_size;
                    let body = read_body(&mut source, body_start, body_len.min(end - body_start))?;
                    match parse_ftyp(&mut BoxReader::with_base(&body, pos + hdr.header_size)) {
                        Ok(ft) => file_type = Some(ft),
                        Err(e) => warn!(offset = pos, "unreadable ftyp, using defaults: {e:#}"),
                    }
                }
                b"moov" if moov_body.is_none() => {
                    if box_end > end {
                        return Err(Error::Truncated {
                            offset: pos,
                            needed: hdr.size,
                            available: end - pos,
                        });
                    }
                    let body = read_body(&mut source, pos + hdr.header_size, body_len)?;
                    moov_body = Some((hdr.clone(), body));
                }
                b"mdat" => mdat_seen = true,
                b"meta" => meta_range = Some((pos, box_end.min(end) - pos)),
                _ => debug!(typ = %hdr.typ, size = hdr.size, offset = pos, "top-level box skipped"),
            }
            top_level.push(hdr);

            if to_eof || box_end <= pos {
                break;
            }
            pos = box_end;
        }

        let file_type = file_type.unwrap_or_default();
        let (moov_hdr, moov_bytes) = moov_body.ok_or(Error::NoMovie)?;
        if !mdat_seen {
            return Err(Error::NoMediaData);
        }

        let ctx = ParseContext::new(registry, &file_type);
        let mut body = BoxReader::with_base(&moov_bytes, moov_hdr.start + moov_hdr.header_size);
        let moov = match registry.decode(&mut body, &moov_hdr, &ctx) {
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                warn!(offset = moov_hdr.start, "moov decode failed: {e:#}");
                return Err(Error::NoMovie);
            }
            None => return Err(Error::NoMovie),
        };

        let (timescale, duration) = match moov.child(b"mvhd").map(|b| &b.value) {
            Some(BoxValue::MovieHeader(mvhd)) => (mvhd.timescale, mvhd.duration),
            _ => {
                warn!("moov has no movie header");
                (0, 0)
            }
        };

        let mut tracks = Vec::new();
        for (i, trak) in moov.children_of(b"trak").enumerate() {
            if tracks.len() == MAX_TRACKS {
                warn!(limit = MAX_TRACKS, offset = trak.hdr.start, "track limit reached, ignoring the rest");
                break;
            }
            match resolve(trak, i + 1) {
                Ok(t) => tracks.push(t),
                Err(e) => warn!(track = i + 1, offset = trak.hdr.start, "track dropped: {e}"),
            }
        }
        info!(
            brand = %file_type.major_brand,
            tracks = tracks.len(),
            "movie opened"
        );

        Ok(Mp4File {
            source,
            file_type,
            top_level,
            moov,
            meta_range,
            timescale,
            duration,
            tracks,
            options: DemuxOptions::default(),
        })
    }

    /// Deliver one sample of the track at 0-based `track` position.
    ///
    /// `Ok(None)` is the end-of-table signal; a source that returns fewer
    /// bytes than the sample size is an error.
    pub fn read(&mut self, track: usize, mode: ReadMode) -> Result<Option<Packet>> {
        if track >= self.tracks.len() {
            return Err(Error::BadTrackIndex(track));
        }
        if !self.options.is_active(track) {
            return Err(Error::TrackInactive(track));
        }
        let t = &mut self.tracks[track];
        let Some((index, flags)) = t.locate(mode) else {
            return Ok(None);
        };
        let sample = t.samples()[index];
        let codec = t.codec;
        let timescale = t.timescale();

        self.source.seek(SeekFrom::Start(sample.offset))?;
        let mut data = Vec::with_capacity(sample.size as usize);
        (&mut self.source)
            .take(sample.size as u64)
            .read_to_end(&mut data)?;
        if data.len() < sample.size as usize {
            return Err(Error::ShortRead {
                offset: sample.offset,
                wanted: sample.size as usize,
                got: data.len(),
            });
        }

        Ok(Some(Packet {
            track,
            index,
            codec,
            flags,
            pts: sample.pts,
            dts: sample.dts,
            timescale,
            offset: sample.offset,
            data,
        }))
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R> Mp4File<R> {
    pub fn formats(&self) -> MediaFormats {
        let tracks = self
            .tracks
            .iter()
            .map(|t| TrackFormat {
                index: t.index,
                track_id: t.track_id,
                codec: t.codec,
                sample_entry: t.sample_entry,
                handler: t.handler,
                kind: t.kind.clone(),
                duration: t.duration,
                start_time: MediaTime::new(t.edit_start, t.timescale()),
                language: t.language.clone(),
                sample_count: t.samples().len(),
                bitrate: t.bitrate(),
                codec_config: t.codec_config.clone(),
            })
            .collect();
        MediaFormats {
            major_brand: self.file_type.major_brand,
            timescale: self.timescale,
            duration: MediaTime::new(self.duration, self.timescale),
            tracks,
        }
    }

    pub fn configure(&mut self, options: &DemuxOptions) {
        debug!(track_mask = options.track_mask, "demux options");
        self.options = *options;
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }

    pub fn file_type(&self) -> &FileType {
        &self.file_type
    }

    /// The parsed `moov` tree.
    pub fn boxes(&self) -> &Mp4Box {
        &self.moov
    }

    /// Headers of every top-level box, in file order.
    pub fn top_level(&self) -> &[BoxHeader] {
        &self.top_level
    }

    /// (offset, size) of a top-level `meta` box; not parsed further.
    pub fn meta_range(&self) -> Option<(u64, u64)> {
        self.meta_range
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track: usize) -> Option<&Track> {
        self.tracks.get(track)
    }
}

fn read_body<R: Read>(r: &mut R, offset: u64, len: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(Error::Truncated {
            offset,
            needed: len,
            available: buf.len() as u64,
        });
    }
    Ok(buf)
}
