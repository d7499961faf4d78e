//! Reader for binary property lists (`bplist00`).
//!
//! Layout: 8-byte magic, objects, an offset table, and a 32-byte trailer
//! giving the offset/reference widths, object count, root object and
//! table position. All integers are big-endian.

use base64::{Engine as _, engine::general_purpose};
use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, SecondsFormat};

use super::PlistValue;
use crate::error::{Result, UnpackError};

pub(super) const MAGIC: &[u8; 8] = b"bplist00";
const TRAILER_SIZE: usize = 32;
/// Seconds between 1970-01-01 and the plist epoch 2001-01-01.
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;
/// Also bounds reference cycles.
const MAX_DEPTH: usize = 128;

fn malformed(reason: impl std::fmt::Display) -> UnpackError {
    UnpackError::descriptor(format!("malformed binary property list: {reason}"))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offsets: Vec<usize>,
    ref_size: usize,
}

pub(super) fn parse(bytes: &[u8]) -> Result<PlistValue> {
    if !bytes.starts_with(MAGIC) || bytes.len() < MAGIC.len() + TRAILER_SIZE {
        return Err(malformed("missing header or trailer"));
    }
    let trailer = &bytes[bytes.len() - TRAILER_SIZE..];
    let offset_size = trailer[6] as usize;
    let ref_size = trailer[7] as usize;
    let num_objects = BigEndian::read_u64(&trailer[8..16]);
    let top_object = BigEndian::read_u64(&trailer[16..24]);
    let table_offset = BigEndian::read_u64(&trailer[24..32]);

    if !(1..=8).contains(&offset_size) || !(1..=8).contains(&ref_size) {
        return Err(malformed(format!("bad integer widths {offset_size}/{ref_size}")));
    }
    let objects_end = bytes.len() - TRAILER_SIZE;
    let table_len = num_objects
        .checked_mul(offset_size as u64)
        .filter(|len| table_offset.checked_add(*len).is_some_and(|end| end <= objects_end as u64))
        .ok_or_else(|| malformed("offset table lies outside the file"))?;
    if num_objects == 0 || top_object >= num_objects {
        return Err(malformed(format!("root object {top_object} of {num_objects}")));
    }

    let table_start = table_offset as usize;
    let table = &bytes[table_start..table_start + table_len as usize];
    let offsets = table
        .chunks_exact(offset_size)
        .map(|c| {
            let off = BigEndian::read_uint(c, offset_size) as usize;
            if off < MAGIC.len() || off >= objects_end {
                Err(malformed(format!("object offset {off} out of range")))
            } else {
                Ok(off)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let reader = Reader {
        bytes: &bytes[..objects_end],
        offsets,
        ref_size,
    };
    reader.value(top_object as usize, 0)
}

impl<'a> Reader<'a> {
    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8]> {
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(|| malformed(format!("{len} bytes at {start} run past the object area")))
    }

    /// Object length from the marker's low nibble, or the integer that
    /// follows it when the nibble is 0xF. Returns (length, payload start).
    fn length(&self, info: u8, after_marker: usize) -> Result<(usize, usize)> {
        if info != 0x0F {
            return Ok((info as usize, after_marker));
        }
        let marker = self.slice(after_marker, 1)?[0];
        if marker >> 4 != 0x1 {
            return Err(malformed(format!("bad length marker {marker:#04x}")));
        }
        let width = 1usize << (marker & 0x0F);
        let len = self.uint(after_marker + 1, width)?;
        let len = usize::try_from(len).map_err(|_| malformed("length overflow"))?;
        Ok((len, after_marker + 1 + width))
    }

    fn uint(&self, start: usize, width: usize) -> Result<u64> {
        let raw = self.slice(start, width)?;
        // 16-byte integers: only the low half is representable.
        let raw = if width > 8 { &raw[width - 8..] } else { raw };
        Ok(BigEndian::read_uint(raw, raw.len()))
    }

    fn refs(&self, start: usize, count: usize) -> Result<Vec<usize>> {
        let len = count
            .checked_mul(self.ref_size)
            .ok_or_else(|| malformed("reference list overflow"))?;
        Ok(self
            .slice(start, len)?
            .chunks_exact(self.ref_size)
            .map(|c| BigEndian::read_uint(c, self.ref_size) as usize)
            .collect())
    }

    fn value(&self, index: usize, depth: usize) -> Result<PlistValue> {
        if depth > MAX_DEPTH {
            return Err(malformed("objects nested too deeply"));
        }
        let offset = *self
            .offsets
            .get(index)
            .ok_or_else(|| malformed(format!("reference to missing object {index}")))?;
        let marker = self.slice(offset, 1)?[0];
        let info = marker & 0x0F;
        let body = offset + 1;

        let value = match marker >> 4 {
            0x0 => match marker {
                0x08 => PlistValue::Bool(false),
                0x09 => PlistValue::Bool(true),
                _ => return Err(malformed(format!("unsupported marker {marker:#04x}"))),
            },
            0x1 => {
                let width = 1usize << info;
                let v = self.uint(body, width)?;
                // 1, 2 and 4-byte integers are unsigned; 8 and 16 are signed.
                PlistValue::Integer(v as i64)
            }
            0x2 => match info {
                2 => PlistValue::Real(BigEndian::read_f32(self.slice(body, 4)?) as f64),
                3 => PlistValue::Real(BigEndian::read_f64(self.slice(body, 8)?)),
                _ => return Err(malformed(format!("real of width {}", 1usize << info))),
            },
            0x3 if marker == 0x33 => {
                let secs = BigEndian::read_f64(self.slice(body, 8)?);
                PlistValue::Date(format_date(secs)?)
            }
            0x4 => {
                let (len, start) = self.length(info, body)?;
                PlistValue::Data(general_purpose::STANDARD.encode(self.slice(start, len)?))
            }
            0x5 => {
                let (len, start) = self.length(info, body)?;
                let raw = self.slice(start, len)?;
                PlistValue::String(String::from_utf8_lossy(raw).into_owned())
            }
            0x6 => {
                let (len, start) = self.length(info, body)?;
                let byte_len = len.checked_mul(2).ok_or_else(|| malformed("string length overflow"))?;
                let units: Vec<u16> = self
                    .slice(start, byte_len)?
                    .chunks_exact(2)
                    .map(BigEndian::read_u16)
                    .collect();
                PlistValue::String(String::from_utf16(&units).map_err(malformed)?)
            }
            0x8 => PlistValue::Integer(self.uint(body, info as usize + 1)? as i64),
            0xA | 0xC => {
                let (count, start) = self.length(info, body)?;
                let items = self
                    .refs(start, count)?
                    .into_iter()
                    .map(|r| self.value(r, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                PlistValue::Array(items)
            }
            0xD => {
                let (count, start) = self.length(info, body)?;
                let keys = self.refs(start, count)?;
                let values = self.refs(start + count * self.ref_size, count)?;
                let mut entries = Vec::with_capacity(count);
                for (k, v) in keys.into_iter().zip(values) {
                    let key = match self.value(k, depth + 1)? {
                        PlistValue::String(s) => s,
                        other => return Err(malformed(format!("dictionary key {other:?} is not a string"))),
                    };
                    entries.push((key, self.value(v, depth + 1)?));
                }
                PlistValue::Dict(entries)
            }
            _ => return Err(malformed(format!("unknown marker {marker:#04x}"))),
        };
        Ok(value)
    }
}

/// ISO 8601 text, matching what XML plists carry in `<date>`.
fn format_date(secs_since_2001: f64) -> Result<String> {
    if !secs_since_2001.is_finite() {
        return Err(malformed("date is not finite"));
    }
    let whole = secs_since_2001.floor();
    let nanos = ((secs_since_2001 - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64 + APPLE_EPOCH_OFFSET, nanos)
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| malformed("date out of range"))
}
