use crate::boxes::{BoxHeader, FileType, FourCC, Mp4Box};
use crate::error::{Error, Result};
use crate::reader::BoxReader;
use crate::registry::Registry;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek};
use tracing::{debug, trace, warn};

/// Realistic files nest 6-8 levels; anything past this is treated as hostile.
pub const MAX_DEPTH: usize = 32;

/// Everything a decoder may consult besides its own bytes.
///
/// Some tags mean different things depending on where they sit: `mp4a` inside
/// a QuickTime `wave` atom is a bare marker rather than a sample entry, `alac`
/// inside an `alac` sample entry is its decoder config, and `gnre` inside
/// `ilst` is an iTunes item rather than a 3GPP notice. `parent` carries the
/// enclosing tag so decoders can pick the right layout.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    pub registry: &'a Registry,
    pub file_type: &'a FileType,
    pub parent: Option<FourCC>,
    pub depth: usize,
}

impl<'a> ParseContext<'a> {
    pub fn new(registry: &'a Registry, file_type: &'a FileType) -> Self {
        Self {
            registry,
            file_type,
            parent: None,
            depth: 0,
        }
    }

    /// Context for the children of a box of type `typ`.
    pub fn within(&self, typ: FourCC) -> Self {
        Self {
            parent: Some(typ),
            depth: self.depth + 1,
            ..*self
        }
    }

    pub fn parent_is(&self, typ: &[u8; 4]) -> bool {
        self.parent.is_some_and(|p| p == typ)
    }

    pub fn in_wave(&self) -> bool {
        self.parent_is(b"wave")
    }
}

fn read_header_at<R: Read>(r: &mut R, start: u64) -> Result<BoxHeader> {
    let size32 = r.read_u32::<BigEndian>()?;
    let mut typ = [0u8; 4];
    r.read_exact(&mut typ)?;
    let mut size = size32 as u64;

    if size32 == 1 {
        size = r.read_u64::<BigEndian>()?;
    }

    let mut uuid = None;
    if &typ == b"uuid" {
        let mut u = [0u8; 16];
        r.read_exact(&mut u)?;
        uuid = Some(u);
    }

    let header_size = match (size32 == 1, &typ == b"uuid") {
        (true, true) => 8 + 8 + 16,
        (true, false) => 8 + 8,
        (false, true) => 8 + 16,
        (false, false) => 8,
    } as u64;

    if size != 0 && size < header_size {
        return Err(Error::InvalidSize {
            typ: FourCC(typ),
            size,
            offset: start,
        });
    }

    Ok(BoxHeader {
        size,
        typ: FourCC(typ),
        uuid,
        header_size,
        start,
    })
}

/// Read a box header from a seekable stream (top-level scan).
pub fn read_box_header<R: Read + Seek>(r: &mut R) -> Result<BoxHeader> {
    let start = r.stream_position()?;
    read_header_at(r, start)
}

/// Read a box header from an in-memory body.
pub fn read_child_header(r: &mut BoxReader<'_>) -> Result<BoxHeader> {
    let start = r.offset();
    read_header_at(r, start)
}

/// Enumerate the size-prefixed child records filling `declared` bytes of `r`.
///
/// `ctx` is the context of the children (see [`ParseContext::within`]).
/// Children that fail to decode, or whose tag is unregistered, are logged and
/// skipped; the cursor always ends at `start + declared`.
pub fn parse_children(
    r: &mut BoxReader<'_>,
    declared: u64,
    ctx: &ParseContext<'_>,
) -> Result<Vec<Mp4Box>> {
    if ctx.depth > MAX_DEPTH {
        return Err(Error::NestingTooDeep(MAX_DEPTH));
    }

    let start = r.position();
    let declared = if declared > r.remaining() {
        warn!(
            offset = r.offset(),
            declared,
            available = r.remaining(),
            "child list overruns its parent, clipping"
        );
        r.remaining()
    } else {
        declared
    };

    let mut kids = Vec::new();
    let mut consumed = 0u64;

    while consumed + 8 <= declared {
        r.seek_to(start + consumed);
        let hdr = match read_child_header(r) {
            Ok(h) => h,
            Err(e) => {
                warn!(offset = r.offset(), error = %e, "unreadable child header, stopping");
                break;
            }
        };

        if hdr.size == 8 && hdr.typ.is_zero() {
            trace!(offset = hdr.start, "terminator box");
            consumed += 8;
            break;
        }

        let size = if hdr.size == 0 {
            declared - consumed
        } else {
            hdr.size
        };
        if size < hdr.header_size || consumed + size > declared {
            warn!(
                typ = %hdr.typ,
                size,
                offset = hdr.start,
                budget = declared - consumed,
                "child box exceeds container budget, stopping"
            );
            break;
        }
        consumed += size;

        let body_len = size - hdr.header_size;
        if body_len == 0 {
            trace!(typ = %hdr.typ, offset = hdr.start, "empty box");
            continue;
        }

        let mut body = r.sub_reader(body_len)?;
        match ctx.registry.decode(&mut body, &hdr, ctx) {
            None => {
                debug!(typ = %hdr.typ, size, offset = hdr.start, "unknown box, skipped");
            }
            Some(Ok(b)) => {
                if !body.is_empty() {
                    debug!(
                        typ = %hdr.typ,
                        offset = hdr.start,
                        left = body.remaining(),
                        "box body under-consumed"
                    );
                }
                kids.push(b);
            }
            Some(Err(e)) => {
                warn!(typ = %hdr.typ, size, offset = hdr.start, "box decode failed, skipped: {e:#}");
            }
        }
    }

    let residual = declared.saturating_sub(consumed);
    if residual > 0 {
        r.seek_to(start + consumed);
        let tail = r.bytes(residual)?;
        if residual <= 4 && tail.iter().all(|&b| b == 0) {
            trace!(residual, "trailing zero pad");
        } else {
            debug!(offset = r.offset() - residual, residual, "trailing bytes in container ignored");
        }
    }
    r.seek_to(start + declared);
    Ok(kids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_large_size_header() {
        let mut v = Vec::new();
        v.extend_from_slice(&1u32.to_be_bytes());
        v.extend_from_slice(b"mdat");
        v.extend_from_slice(&24u64.to_be_bytes());
        v.extend_from_slice(&[0u8; 8]);
        let h = read_box_header(&mut Cursor::new(v)).unwrap();
        assert_eq!(h.size, 24);
        assert_eq!(h.header_size, 16);
        assert_eq!(h.body_size(), 8);
    }

    #[test]
    fn rejects_size_smaller_than_header() {
        let mut v = Vec::new();
        v.extend_from_slice(&4u32.to_be_bytes());
        v.extend_from_slice(b"free");
        assert!(matches!(
            read_box_header(&mut Cursor::new(v)),
            Err(Error::InvalidSize { size: 4, .. })
        ));
    }
}
