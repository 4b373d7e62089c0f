//! MP4 / QuickTime demuxing: box-tree parsing, sample-table resolution and
//! pull-based packet reads.
//!
//! ```no_run
//! use mp4demux::{Mp4File, ReadMode};
//! use std::fs::File;
//!
//! let mut mp4 = Mp4File::open(File::open("clip.mp4")?)?;
//! for t in &mp4.formats().tracks {
//!     println!("{} {:?}", t.index, t.codec);
//! }
//! while let Some(pkt) = mp4.read(0, ReadMode::Next)? {
//!     println!("{} bytes at dts {}", pkt.data.len(), pkt.dts);
//! }
//! # Ok::<(), mp4demux::Error>(())
//! ```

pub mod boxes;
pub mod decoders;
pub mod dump;
pub mod error;
pub mod file;
pub mod parser;
pub mod reader;
pub mod registry;
pub mod track;

pub use boxes::{BoxHeader, BoxKey, BoxValue, FileType, FourCC, Mp4Box};
pub use dump::{BoxNode, HexDump, box_tree, hex_range};
pub use error::{Error, MediaStatus, Result};
pub use file::{DemuxOptions, MAX_TRACKS, MediaFormats, Mp4File, Packet, TrackFormat};
pub use parser::{MAX_DEPTH, ParseContext, parse_children, read_box_header};
pub use reader::BoxReader;
pub use registry::{BoxDecoder, Layout, Registry, default_registry};
pub use track::{
    Codec, MAX_SAMPLES, MediaTime, ReadMode, Sample, SampleFlags, SyncSearch, Track, TrackKind,
    resolve, seek_index, validate,
};
