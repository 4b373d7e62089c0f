use crate::boxes::{BoxHeader, BoxKey, BoxValue, FourCC, Mp4Box};
use crate::decoders::{codec_config, headers, metadata, sample_entry, tables};
use crate::decoders::{decode_container, decode_counted_container, decode_padding};
use crate::parser::ParseContext;
use crate::reader::BoxReader;
use std::collections::HashMap;

/// Trait for box decoders.
///
/// A decoder interprets the body of a specific box (identified by a
/// [`BoxKey`]) and returns a [`BoxValue`]. The reader is bounded to the body,
/// positioned after the version/flags sub-header for full boxes.
pub trait BoxDecoder: Send + Sync {
    fn decode(
        &self,
        r: &mut BoxReader<'_>,
        hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
        ctx: &ParseContext<'_>,
    ) -> anyhow::Result<BoxValue>;
}

impl<F> BoxDecoder for F
where
    F: Fn(
            &mut BoxReader<'_>,
            &BoxHeader,
            Option<u8>,
            Option<u32>,
            &ParseContext<'_>,
        ) -> anyhow::Result<BoxValue>
        + Send
        + Sync,
{
    fn decode(
        &self,
        r: &mut BoxReader<'_>,
        hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
        ctx: &ParseContext<'_>,
    ) -> anyhow::Result<BoxValue> {
        self(r, hdr, version, flags, ctx)
    }
}

/// Whether a body opens with the 4-byte version/flags sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Plain,
    Full,
    /// Full box in ISO files, plain in QuickTime files (`meta`).
    FullUnlessQuickTime,
}

/// Registry of decoders keyed by `BoxKey` (4CC or UUID).
///
/// The registry is immutable once constructed; use [`Registry::with_decoder`]
/// to build it fluently.
pub struct Registry {
    map: HashMap<BoxKey, BoxDecoderEntry>,
}

struct BoxDecoderEntry {
    inner: Box<dyn BoxDecoder>,
    name: String,
    layout: Layout,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used for dumps and logging.
    pub fn with_decoder(
        mut self,
        key: BoxKey,
        name: &str,
        layout: Layout,
        dec: Box<dyn BoxDecoder>,
    ) -> Self {
        self.map.insert(
            key,
            BoxDecoderEntry {
                inner: dec,
                name: name.to_string(),
                layout,
            },
        );
        self
    }

    pub fn with_box<D: BoxDecoder + 'static>(self, typ: &[u8; 4], name: &str, dec: D) -> Self {
        self.with_decoder(BoxKey::FourCC(FourCC(*typ)), name, Layout::Plain, Box::new(dec))
    }

    pub fn with_full_box<D: BoxDecoder + 'static>(self, typ: &[u8; 4], name: &str, dec: D) -> Self {
        self.with_decoder(BoxKey::FourCC(FourCC(*typ)), name, Layout::Full, Box::new(dec))
    }

    pub fn contains(&self, key: &BoxKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn name(&self, key: &BoxKey) -> Option<&str> {
        self.map.get(key).map(|e| e.name.as_str())
    }

    pub fn layout(&self, key: &BoxKey) -> Option<Layout> {
        self.map.get(key).map(|e| e.layout)
    }

    /// Decode one box body with its registered decoder.
    ///
    /// Returns `None` if no decoder exists for the box's key.
    pub fn decode(
        &self,
        r: &mut BoxReader<'_>,
        hdr: &BoxHeader,
        ctx: &ParseContext<'_>,
    ) -> Option<anyhow::Result<Mp4Box>> {
        let entry = self.map.get(&hdr.key())?;
        let full = match entry.layout {
            Layout::Plain => false,
            Layout::Full => true,
            Layout::FullUnlessQuickTime => !ctx.file_type.is_quicktime(),
        };
        Some((|| {
            let (version, flags) = if full {
                (Some(r.u8()?), Some(r.u24()?))
            } else {
                (None, None)
            };
            let value = entry.inner.decode(r, hdr, version, flags, ctx)?;
            Ok(Mp4Box {
                hdr: hdr.clone(),
                version,
                flags,
                value,
            })
        })())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

const ITUNES_ITEMS: [(&[u8; 4], &str); 16] = [
    (b"\xa9nam", "Title"),
    (b"\xa9ART", "Artist"),
    (b"\xa9alb", "Album"),
    (b"\xa9day", "Year"),
    (b"\xa9too", "Encoder"),
    (b"\xa9cmt", "Comment"),
    (b"\xa9gen", "Genre"),
    (b"\xa9wrt", "Composer"),
    (b"aART", "Album Artist"),
    (b"trkn", "Track Number"),
    (b"disk", "Disc Number"),
    (b"tmpo", "Tempo"),
    (b"cpil", "Compilation"),
    (b"covr", "Cover Art"),
    (b"----", "Freeform Item"),
    (b"desc", "Description"),
];

const TRACK_REFERENCES: [&[u8; 4]; 8] = [
    b"hint", b"cdsc", b"chap", b"sync", b"vdep", b"font", b"tmcd", b"subt",
];

const NOTICES: [(&[u8; 4], &str); 6] = [
    (b"cprt", "Copyright Box"),
    (b"titl", "Title Box"),
    (b"auth", "Author Box"),
    (b"dscp", "Description Box"),
    (b"perf", "Performer Box"),
    (b"albm", "Album Box"),
];

// ---------- Default registry ----------
pub fn default_registry() -> Registry {
    let mut reg = Registry::new()
        // containers
        .with_box(b"moov", "Movie Box", decode_container)
        .with_box(b"trak", "Track Box", decode_container)
        .with_box(b"mdia", "Media Box", decode_container)
        .with_box(b"minf", "Media Information Box", decode_container)
        .with_box(b"stbl", "Sample Table Box", decode_container)
        .with_box(b"dinf", "Data Information Box", decode_container)
        .with_box(b"edts", "Edit Box", decode_container)
        .with_box(b"udta", "User Data Box", decode_container)
        .with_box(b"tref", "Track Reference Box", decode_container)
        .with_box(b"ilst", "Item List Box", decode_container)
        .with_box(b"wave", "QuickTime Sound Extension", decode_container)
        .with_decoder(
            BoxKey::FourCC(FourCC(*b"meta")),
            "Meta Box",
            Layout::FullUnlessQuickTime,
            Box::new(decode_container),
        )
        .with_full_box(b"dref", "Data Reference Box", decode_counted_container)
        .with_full_box(b"stsd", "Sample Description Box", decode_counted_container)
        .with_box(b"free", "Free Space Box", decode_padding)
        .with_box(b"skip", "Skip Box", decode_padding)
        .with_box(b"wide", "Wide Box", decode_padding)
        // headers
        .with_box(b"ftyp", "File Type Box", headers::decode_ftyp)
        .with_full_box(b"mvhd", "Movie Header Box", headers::decode_mvhd)
        .with_full_box(b"tkhd", "Track Header Box", headers::decode_tkhd)
        .with_full_box(b"mdhd", "Media Header Box", headers::decode_mdhd)
        .with_full_box(b"hdlr", "Handler Reference Box", headers::decode_hdlr)
        .with_full_box(b"vmhd", "Video Media Header Box", headers::decode_vmhd)
        .with_full_box(b"smhd", "Sound Media Header Box", headers::decode_smhd)
        .with_full_box(b"hmhd", "Hint Media Header Box", headers::decode_hmhd)
        .with_full_box(b"nmhd", "Null Media Header Box", headers::decode_nmhd)
        .with_full_box(b"url ", "Data Entry URL Box", headers::decode_url)
        .with_full_box(b"urn ", "Data Entry URN Box", headers::decode_urn)
        .with_full_box(b"elst", "Edit List Box", headers::decode_elst)
        // sample tables
        .with_full_box(b"stts", "Decoding Time to Sample Box", tables::decode_stts)
        .with_full_box(b"ctts", "Composition Time to Sample Box", tables::decode_ctts)
        .with_full_box(b"cslg", "Composition to Decode Box", tables::decode_cslg)
        .with_full_box(b"stsc", "Sample to Chunk Box", tables::decode_stsc)
        .with_full_box(b"stco", "Chunk Offset Box", tables::decode_stco)
        .with_full_box(b"co64", "64-bit Chunk Offset Box", tables::decode_co64)
        .with_full_box(b"stsz", "Sample Size Box", tables::decode_stsz)
        .with_full_box(b"stz2", "Compact Sample Size Box", tables::decode_stz2)
        .with_full_box(b"stss", "Sync Sample Box", tables::decode_stss)
        .with_full_box(b"stsh", "Shadow Sync Sample Box", tables::decode_stsh)
        .with_full_box(b"stdp", "Degradation Priority Box", tables::decode_stdp)
        .with_full_box(b"padb", "Padding Bits Box", tables::decode_padb)
        .with_full_box(b"sdtp", "Independent and Disposable Samples Box", tables::decode_sdtp)
        // codec configuration
        .with_full_box(b"esds", "Elementary Stream Descriptor Box", codec_config::decode_esds)
        .with_box(b"avcC", "AVC Configuration Box", codec_config::decode_raw_config)
        .with_box(b"hvcC", "HEVC Configuration Box", codec_config::decode_raw_config)
        .with_box(b"av1C", "AV1 Configuration Box", codec_config::decode_raw_config)
        .with_box(b"vpcC", "VP Codec Configuration Box", codec_config::decode_raw_config)
        .with_box(b"dOps", "Opus Specific Box", codec_config::decode_raw_config)
        .with_box(b"dfLa", "FLAC Specific Box", codec_config::decode_raw_config)
        .with_box(b"dac3", "AC-3 Specific Box", codec_config::decode_raw_config)
        .with_box(b"dec3", "E-AC-3 Specific Box", codec_config::decode_raw_config)
        .with_box(b"damr", "AMR Specific Box", codec_config::decode_raw_config)
        .with_box(b"btrt", "Bit Rate Box", codec_config::decode_btrt)
        .with_box(b"pasp", "Pixel Aspect Ratio Box", codec_config::decode_pasp)
        .with_box(b"colr", "Colour Information Box", codec_config::decode_colr)
        .with_box(b"frma", "Original Format Box", codec_config::decode_frma)
        // sample entries
        .with_box(b"mp4a", "MPEG-4 Audio Sample Entry", sample_entry::decode_mp4a)
        .with_box(b"alac", "ALAC Sample Entry", sample_entry::decode_alac)
        // iTunes / 3GPP metadata
        .with_box(b"gnre", "Genre", metadata::decode_gnre)
        .with_full_box(b"yrrc", "Recording Year Box", metadata::decode_yrrc)
        .with_full_box(b"data", "Item Data Box", metadata::decode_data)
        .with_full_box(b"mean", "Item Mean Box", metadata::decode_name)
        .with_full_box(b"name", "Item Name Box", metadata::decode_name);

    for typ in sample_entry::VISUAL_ENTRIES {
        reg = reg.with_box(typ, "Visual Sample Entry", sample_entry::decode_visual);
    }
    for typ in sample_entry::AUDIO_ENTRIES {
        reg = reg.with_box(typ, "Audio Sample Entry", sample_entry::decode_audio);
    }
    for typ in TRACK_REFERENCES {
        reg = reg.with_box(typ, "Track Reference Type Box", tables::decode_track_reference);
    }
    for (typ, name) in NOTICES {
        reg = reg.with_full_box(typ, name, metadata::decode_notice);
    }
    for (typ, name) in ITUNES_ITEMS {
        reg = reg.with_box(typ, name, decode_container);
    }
    reg
}
