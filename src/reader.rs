use crate::boxes::FourCC;
use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Forward-only big-endian cursor over an in-memory box body.
///
/// `base` is the absolute file offset of the first byte of `data`; it only
/// feeds diagnostics.
#[derive(Debug, Clone)]
pub struct BoxReader<'a> {
    cur: Cursor<&'a [u8]>,
    base: u64,
}

impl<'a> BoxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self {
            cur: Cursor::new(data),
            base,
        }
    }

    fn data(&self) -> &'a [u8] {
        *self.cur.get_ref()
    }

    /// Position relative to the start of this reader.
    pub fn position(&self) -> u64 {
        self.cur.position()
    }

    /// Absolute file offset of the cursor.
    pub fn offset(&self) -> u64 {
        self.base + self.cur.position()
    }

    pub fn len(&self) -> u64 {
        self.data().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    fn ensure(&self, n: u64) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::Truncated {
                offset: self.offset(),
                needed: n,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.cur.read_u8()?)
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.cur.read_u16::<BigEndian>()?)
    }

    pub fn u24(&mut self) -> Result<u32> {
        self.ensure(3)?;
        Ok(self.cur.read_u24::<BigEndian>()?)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.cur.read_u32::<BigEndian>()?)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.cur.read_u64::<BigEndian>()?)
    }

    pub fn i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.cur.read_i16::<BigEndian>()?)
    }

    pub fn i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.cur.read_i32::<BigEndian>()?)
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.cur.read_i64::<BigEndian>()?)
    }

    pub fn fourcc(&mut self) -> Result<FourCC> {
        let b = self.bytes(4)?;
        Ok(FourCC([b[0], b[1], b[2], b[3]]))
    }

    /// 16.16 fixed point.
    pub fn fixed32(&mut self) -> Result<f64> {
        Ok(self.u32()? as f64 / 65536.0)
    }

    /// 8.8 fixed point.
    pub fn fixed16(&mut self) -> Result<f64> {
        Ok(self.u16()? as f64 / 256.0)
    }

    /// 32-bit field for version 0, 64-bit field for version 1.
    pub fn versioned_u64(&mut self, version: u8) -> Result<u64> {
        if version == 1 {
            self.u64()
        } else {
            Ok(self.u32()? as u64)
        }
    }

    pub fn bytes(&mut self, n: u64) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let start = self.position() as usize;
        let end = start + n as usize;
        self.cur.set_position(end as u64);
        Ok(&self.data()[start..end])
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.ensure(n)?;
        self.cur.set_position(self.position() + n);
        Ok(())
    }

    /// Move to `pos` (relative), clamped to the end of the buffer.
    pub fn seek_to(&mut self, pos: u64) {
        self.cur.set_position(pos.min(self.len()));
    }

    /// Consume and return everything left.
    pub fn rest(&mut self) -> &'a [u8] {
        let start = (self.position() as usize).min(self.data().len());
        self.cur.set_position(self.len());
        &self.data()[start..]
    }

    /// Carve the next `n` bytes off as an independent reader.
    pub fn sub_reader(&mut self, n: u64) -> Result<BoxReader<'a>> {
        let base = self.offset();
        let slice = self.bytes(n)?;
        Ok(BoxReader::with_base(slice, base))
    }

    /// Null-terminated (or unterminated) string filling the rest of the body.
    pub fn string_to_end(&mut self) -> String {
        let mut raw = self.rest();
        while let [head @ .., 0] = raw {
            raw = head;
        }
        if let Some(nul) = raw.iter().position(|&b| b == 0) {
            raw = &raw[..nul];
        }
        String::from_utf8_lossy(raw).into_owned()
    }
}

impl Read for BoxReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cur.read(buf)
    }
}

/// Read `count` big-endian fields of `width` bits each (1..=32).
pub fn read_bit_fields(data: &[u8], width: u8, count: u32) -> Result<Vec<u32>> {
    let mut bits = bitreader::BitReader::new(data);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(bits.read_u32(width)?);
    }
    Ok(out)
}

/// ISO-639-2/T packed language: 1 pad bit then three 5-bit letters offset by 0x60.
pub fn decode_language(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    [10, 5, 0]
        .iter()
        .map(|shift| (((code >> shift) & 0x1f) as u8 + 0x60) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_fields() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut r = BoxReader::new(&data);
        assert_eq!(r.u16().unwrap(), 0x0102);
        assert_eq!(r.u24().unwrap(), 0x030405);
        assert_eq!(r.remaining(), 2);
        assert!(r.u32().is_err());
        // failed read leaves the cursor alone
        assert_eq!(r.position(), 5);
    }

    #[test]
    fn sub_reader_tracks_absolute_offset() {
        let data = [0u8; 32];
        let mut r = BoxReader::with_base(&data, 100);
        r.skip(8).unwrap();
        let sub = r.sub_reader(16).unwrap();
        assert_eq!(sub.offset(), 108);
        assert_eq!(sub.len(), 16);
        assert_eq!(r.position(), 24);
    }

    #[test]
    fn string_to_end_stops_at_nul() {
        let data = b"Sound Handler\0\0junk";
        let mut r = BoxReader::new(data);
        assert_eq!(r.string_to_end(), "Sound Handler");
        assert!(r.is_empty());
    }

    #[test]
    fn bit_fields_cross_byte_boundaries() {
        let data = [0b1010_1100, 0b0101_0011];
        assert_eq!(
            read_bit_fields(&data, 4, 4).unwrap(),
            vec![0b1010, 0b1100, 0b0101, 0b0011]
        );
        assert_eq!(
            read_bit_fields(&data, 5, 3).unwrap(),
            vec![0b10101, 0b10001, 0b01001]
        );
    }

    #[test]
    fn bit_fields_past_end_are_truncated() {
        let data = [0xff, 0xff];
        let err = read_bit_fields(&data, 12, 2).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }), "{err}");
        let err = read_bit_fields(&data, 40, 1).unwrap_err();
        assert!(matches!(err, Error::SampleTable(_)), "{err}");
    }

    #[test]
    fn language_code() {
        // "eng" = (5, 14, 7)
        let code = (5u16 << 10) | (14 << 5) | 7;
        assert_eq!(decode_language(code), "eng");
        assert_eq!(decode_language(0), "und");
    }
}
