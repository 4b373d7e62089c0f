use crate::decoders::codec_config::{BtrtData, ColrData, EsdsData, PaspData};
use crate::decoders::headers::{
    DataEntryData, ElstData, HdlrData, HmhdData, MdhdData, MvhdData, SmhdData, TkhdData, VmhdData,
};
use crate::decoders::metadata::{IlstValueData, NoticeData};
use crate::decoders::sample_entry::{AudioSampleEntry, VisualSampleEntry};
use crate::decoders::tables::{
    ChunkOffsetData, CslgData, CttsData, PadbData, SdtpData, StdpData, StscData, StshData,
    StssData, StszData, SttsData, TrackReferenceData,
};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }

    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            // iTunes atoms start with the Latin-1 copyright sign
            .map(|&c| if (32..=126).contains(&c) || c == 0xA9 { char::from(c) } else { '.' })
            .collect()
    }

    /// All-zero tag; with size 8 it terminates a child list.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxHeader {
    pub size: u64,        // total size including header, or 0=to parent end
    pub typ: FourCC,      // 4CC or b"uuid"
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64, // 8, 16, or 24
    pub start: u64,       // file offset of header start
}

impl BoxHeader {
    /// Declared body size, excluding the size/type header.
    pub fn body_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    pub fn key(&self) -> BoxKey {
        match self.uuid {
            Some(u) => BoxKey::Uuid(u),
            None => BoxKey::FourCC(self.typ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoxKey {
    FourCC(FourCC),
    Uuid([u8; 16]),
}

/// Contents of `ftyp`, threaded read-only through every parse call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileType {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl FileType {
    pub const QUICKTIME: FourCC = FourCC(*b"qt  ");

    pub fn is_quicktime(&self) -> bool {
        self.major_brand == Self::QUICKTIME || self.compatible_brands.contains(&Self::QUICKTIME)
    }
}

impl Default for FileType {
    fn default() -> Self {
        FileType {
            major_brand: FourCC(*b"isom"),
            minor_version: 0,
            compatible_brands: Vec::new(),
        }
    }
}

/// One parsed node of the box tree. Children live inside `value`.
#[derive(Debug, Clone, Serialize)]
pub struct Mp4Box {
    pub hdr: BoxHeader,
    pub version: Option<u8>,
    pub flags: Option<u32>,
    pub value: BoxValue,
}

impl Mp4Box {
    pub fn typ(&self) -> FourCC {
        self.hdr.typ
    }

    pub fn is_full(&self) -> bool {
        self.version.is_some()
    }

    /// Bytes of the body taken by the version/flags sub-header.
    pub fn full_header_size(&self) -> u64 {
        if self.is_full() { 4 } else { 0 }
    }

    pub fn children(&self) -> &[Mp4Box] {
        match &self.value {
            BoxValue::Container(kids) => kids,
            BoxValue::CountedContainer { children, .. } => children,
            BoxValue::VisualSampleEntry(e) => &e.children,
            BoxValue::AudioSampleEntry(e) => &e.children,
            _ => &[],
        }
    }

    pub fn child(&self, typ: &[u8; 4]) -> Option<&Mp4Box> {
        self.children().iter().find(|c| &c.hdr.typ.0 == typ)
    }

    pub fn children_of<'a>(&'a self, typ: &'a [u8; 4]) -> impl Iterator<Item = &'a Mp4Box> + 'a {
        self.children().iter().filter(move |c| &c.hdr.typ.0 == typ)
    }

    /// Walk a chain of child tags, taking the first match at each level.
    pub fn find(&self, path: &[&[u8; 4]]) -> Option<&Mp4Box> {
        path.iter().try_fold(self, |b, typ| b.child(typ))
    }
}

/// Every record shape the registry knows how to build.
#[derive(Debug, Clone, Serialize)]
pub enum BoxValue {
    Container(Vec<Mp4Box>),
    /// Body opens with a u32 entry count before the children (`stsd`, `dref`).
    CountedContainer {
        entry_count: u32,
        children: Vec<Mp4Box>,
    },
    FileType(FileType),
    MovieHeader(MvhdData),
    TrackHeader(TkhdData),
    MediaHeader(MdhdData),
    Handler(HdlrData),
    VideoMediaHeader(VmhdData),
    SoundMediaHeader(SmhdData),
    HintMediaHeader(HmhdData),
    NullMediaHeader,
    DataEntry(DataEntryData),
    EditList(ElstData),
    TimeToSample(SttsData),
    CompositionOffset(CttsData),
    CompositionShift(CslgData),
    SampleToChunk(StscData),
    ChunkOffset(ChunkOffsetData),
    SampleSize(StszData),
    SyncSample(StssData),
    ShadowSync(StshData),
    DegradationPriority(StdpData),
    PaddingBits(PadbData),
    SampleDependency(SdtpData),
    TrackReference(TrackReferenceData),
    VisualSampleEntry(VisualSampleEntry),
    AudioSampleEntry(AudioSampleEntry),
    EsDescriptor(EsdsData),
    CodecConfig(#[serde(serialize_with = "as_hex")] Vec<u8>),
    BitRate(BtrtData),
    PixelAspect(PaspData),
    Colour(ColrData),
    OriginalFormat(FourCC),
    Notice(NoticeData),
    RecordingYear(u16),
    ItunesValue(IlstValueData),
    ItunesName(String),
    Padding(u64),
    Blob(#[serde(serialize_with = "as_hex")] Vec<u8>),
}

pub(crate) fn as_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}
