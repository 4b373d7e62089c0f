//! Body decoders registered in [`crate::registry::default_registry`].
//!
//! Each decoder takes a reader bounded to one box body and returns the
//! matching [`BoxValue`]. Decoders for containers recurse through
//! [`parse_children`] with a context whose `parent` is their own tag.

pub mod codec_config;
pub mod headers;
pub mod metadata;
pub mod sample_entry;
pub mod tables;

use crate::boxes::{BoxHeader, BoxValue};
use crate::parser::{ParseContext, parse_children};
use crate::reader::BoxReader;
use tracing::debug;

/// Plain container: the whole body is a child list.
pub fn decode_container(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let n = r.remaining();
    let kids = parse_children(r, n, &ctx.within(hdr.typ))?;
    Ok(BoxValue::Container(kids))
}

/// `stsd` and `dref`: a u32 entry count, then the entries as child boxes.
pub fn decode_counted_container(
    r: &mut BoxReader<'_>,
    hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    let entry_count = r.u32()?;
    let n = r.remaining();
    let children = parse_children(r, n, &ctx.within(hdr.typ))?;
    if children.len() != entry_count as usize {
        debug!(
            typ = %hdr.typ,
            entry_count,
            decoded = children.len(),
            "entry count differs from decoded children"
        );
    }
    Ok(BoxValue::CountedContainer {
        entry_count,
        children,
    })
}

/// `free`, `skip`, `wide`: contents are ignored, only the length is kept.
pub fn decode_padding(
    r: &mut BoxReader<'_>,
    _hdr: &BoxHeader,
    _version: Option<u8>,
    _flags: Option<u32>,
    _ctx: &ParseContext<'_>,
) -> anyhow::Result<BoxValue> {
    Ok(BoxValue::Padding(r.rest().len() as u64))
}
