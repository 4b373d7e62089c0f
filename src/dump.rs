use crate::boxes::{BoxHeader, BoxValue, Mp4Box};
use crate::file::Mp4File;
use crate::registry::Registry;
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};

/// A JSON-serializable view of one box.
#[derive(Debug, Serialize)]
pub struct BoxNode {
    /// Absolute byte offset of this box in the file
    pub offset: u64,
    /// Total size including header; 0 means "to end of file"
    pub size: u64,
    pub header_size: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
    pub typ: String,
    pub uuid: Option<String>,
    pub version: Option<u8>,
    pub flags: Option<u32>,
    /// "container", "full", "leaf" or "unknown"
    pub kind: &'static str,
    pub full_name: String,
    /// Decoded fields, absent for containers and undecoded boxes
    pub value: Option<serde_json::Value>,
    pub children: Option<Vec<BoxNode>>,
}

impl BoxNode {
    /// Depth-first search by type.
    pub fn find(&self, typ: &str) -> Option<&BoxNode> {
        if self.typ == typ {
            return Some(self);
        }
        self.children
            .iter()
            .flatten()
            .find_map(|c| c.find(typ))
    }
}

fn is_container(v: &BoxValue) -> bool {
    matches!(v, BoxValue::Container(_) | BoxValue::CountedContainer { .. })
}

fn header_node(hdr: &BoxHeader, registry: &Registry, kind: &'static str) -> BoxNode {
    let payload_offset = hdr.start + hdr.header_size;
    BoxNode {
        offset: hdr.start,
        size: hdr.size,
        header_size: hdr.header_size,
        payload_offset,
        payload_size: hdr.body_size(),
        typ: hdr.typ.to_string(),
        uuid: hdr.uuid.map(hex::encode),
        version: None,
        flags: None,
        kind,
        full_name: registry.name(&hdr.key()).unwrap_or("").to_string(),
        value: None,
        children: None,
    }
}

/// Convert a parsed box and its subtree.
///
/// `max_depth` limits how many levels below `b` are included.
pub fn box_node(b: &Mp4Box, registry: &Registry, max_depth: usize) -> BoxNode {
    let kind = if is_container(&b.value) {
        "container"
    } else if b.is_full() {
        "full"
    } else {
        "leaf"
    };
    let mut node = header_node(&b.hdr, registry, kind);
    node.payload_offset += b.full_header_size();
    node.payload_size = node.payload_size.saturating_sub(b.full_header_size());
    node.version = b.version;
    node.flags = b.flags;
    if !is_container(&b.value) {
        node.value = serde_json::to_value(&b.value).ok();
    }
    if !b.children().is_empty() && max_depth > 0 {
        node.children = Some(
            b.children()
                .iter()
                .map(|c| box_node(c, registry, max_depth - 1))
                .collect(),
        );
    }
    node
}

/// Top-level boxes of an opened file, with `moov` expanded and `ftyp` decoded.
pub fn box_tree<R>(file: &Mp4File<R>, registry: &Registry, max_depth: usize) -> Vec<BoxNode> {
    file.top_level()
        .iter()
        .map(|hdr| match &hdr.typ.0 {
            b"moov" if hdr.start == file.boxes().hdr.start => {
                box_node(file.boxes(), registry, max_depth)
            }
            b"ftyp" => {
                let mut node = header_node(hdr, registry, "leaf");
                node.value = serde_json::to_value(file.file_type()).ok();
                node
            }
            _ => {
                let kind = if registry.contains(&hdr.key()) {
                    "leaf"
                } else {
                    "unknown"
                };
                header_node(hdr, registry, kind)
            }
        })
        .collect()
}

/// Result of a hex dump operation.
#[derive(Debug, Serialize)]
pub struct HexDump {
    pub offset: u64,
    /// Bytes actually dumped; less than requested at end of data
    pub length: u64,
    pub hex: String,
}

/// Hex-dump up to `max_len` bytes at `offset`, never past `size`.
pub fn hex_range<R: Read + Seek>(
    r: &mut R,
    size: u64,
    offset: u64,
    max_len: u64,
) -> anyhow::Result<HexDump> {
    let length = size.saturating_sub(offset).min(max_len);
    if length == 0 {
        return Ok(HexDump {
            offset,
            length: 0,
            hex: String::new(),
        });
    }
    r.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; length as usize];
    r.read_exact(&mut data)?;
    Ok(HexDump {
        offset,
        length,
        hex: hex_dump(&data, offset),
    })
}

/// Classic 16-bytes-per-line dump with an ASCII gutter.
pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let hexs = chunk
            .iter()
            .map(|b| hex::encode([*b]))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  |{}|\n",
            start_offset + i as u64 * 16,
            hexs,
            ascii
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hex_range_stops_at_end_of_data() {
        let mut c = Cursor::new((0u8..40).collect::<Vec<_>>());
        let d = hex_range(&mut c, 40, 32, 64).unwrap();
        assert_eq!(d.length, 8);
        assert!(d.hex.starts_with("00000020  20 21 22 23 24 25 26 27"));
        assert!(d.hex.trim_end().ends_with("| !\"#$%&'|"));
    }

    #[test]
    fn hex_range_past_end_is_empty() {
        let mut c = Cursor::new(vec![0u8; 4]);
        let d = hex_range(&mut c, 4, 10, 16).unwrap();
        assert_eq!(d.length, 0);
        assert!(d.hex.is_empty());
    }
}
