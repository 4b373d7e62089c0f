use crate::boxes::FourCC;
use serde::Serialize;

/// Coarse failure codes shared with the rest of the media stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaStatus {
    NoError,
    BadParameters,
    BadFormat,
    NotSupported,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid box size {size} for '{typ}' at offset {offset}")]
    InvalidSize { typ: FourCC, size: u64, offset: u64 },
    #[error("truncated data: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },
    #[error("box nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("no 'moov' box found")]
    NoMovie,
    #[error("no 'mdat' box found")]
    NoMediaData,
    #[error("no usable tracks")]
    NoTracks,
    #[error("mandatory box '{0}' missing")]
    MissingBox(&'static str),
    #[error("unsupported handler '{0}'")]
    UnsupportedHandler(FourCC),
    #[error("unsupported codec '{0}'")]
    UnsupportedCodec(FourCC),
    #[error("sample-to-chunk table must start at chunk 1, starts at {0}")]
    BadChunkTable(u32),
    #[error("inconsistent sample table: {0}")]
    SampleTable(String),
    #[error("track index {0} out of range")]
    BadTrackIndex(usize),
    #[error("track {0} is not active")]
    TrackInactive(usize),
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },
}

impl Error {
    pub fn status(&self) -> MediaStatus {
        match self {
            Error::BadTrackIndex(_) | Error::TrackInactive(_) => MediaStatus::BadParameters,
            Error::UnsupportedHandler(_) | Error::UnsupportedCodec(_) => MediaStatus::NotSupported,
            _ => MediaStatus::BadFormat,
        }
    }
}

impl From<bitreader::BitReaderError> for Error {
    fn from(e: bitreader::BitReaderError) -> Error {
        match e {
            bitreader::BitReaderError::NotEnoughData {
                position,
                length,
                requested,
            } => Error::Truncated {
                offset: position / 8,
                needed: requested.div_ceil(8),
                available: length.saturating_sub(position) / 8,
            },
            other => Error::SampleTable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
