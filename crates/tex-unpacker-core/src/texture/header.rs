//! PVR texture headers: legacy v2 (52 bytes, `PVR!` tag at offset 44) and v3
//! (`PVR\x03` magic at offset 0 followed by a metadata block).

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::format::{CompressedKind, PixelFormat};
use crate::error::{Result, UnpackError};

pub const PVR2_HEADER_SIZE: usize = 52;
/// `PVR!` read as a little-endian u32.
pub const PVR2_TAG: u32 = 0x2152_5650;
pub const PVR3_HEADER_SIZE: usize = 52;
/// `PVR\x03` read as a little-endian u32.
pub const PVR3_MAGIC: u32 = 0x0352_5650;

const PVR2_FLAG_VERTICAL_FLIP: u32 = 0x0001_0000;
const PVR3_META_ORIENTATION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PvrVersion {
    V2,
    V3,
}

/// Level-0 description of a PVR texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureHeader {
    pub version: PvrVersion,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub surface_count: u32,
    /// Offset of level-0 pixel data in the (decompressed) file.
    pub pixel_data_offset: usize,
    /// Rows are stored bottom-to-top.
    pub flipped: bool,
}

impl TextureHeader {
    /// Bytes needed for level 0, or `None` for block-compressed formats.
    pub fn level0_len(&self) -> Option<u64> {
        self.format
            .bytes_per_pixel()
            .map(|bpp| self.width as u64 * self.height as u64 * bpp as u64)
    }
}

/// True if `data` starts with a v2 or v3 PVR header.
pub fn is_texture_header(data: &[u8]) -> bool {
    data.len() >= PVR2_HEADER_SIZE
        && (LittleEndian::read_u32(&data[44..48]) == PVR2_TAG
            || LittleEndian::read_u32(&data[0..4]) == PVR3_MAGIC)
}

/// Parse the header of a decompressed PVR file.
pub fn parse_header(data: &[u8]) -> Result<TextureHeader> {
    if data.len() < PVR2_HEADER_SIZE {
        return Err(UnpackError::header(format!(
            "{} bytes is too short for a PVR header",
            data.len()
        )));
    }
    let tag = LittleEndian::read_u32(&data[44..48]);
    let magic = LittleEndian::read_u32(&data[0..4]);
    let header = if tag == PVR2_TAG {
        parse_v2(data)?
    } else if magic == PVR3_MAGIC {
        parse_v3(data)?
    } else {
        return Err(UnpackError::header(format!(
            "neither PVR v2 tag at 44 ({tag:#010x}) nor v3 magic at 0 ({magic:#010x})"
        )));
    };
    if header.width == 0 || header.height == 0 {
        return Err(UnpackError::header(format!(
            "empty texture ({}x{})",
            header.width, header.height
        )));
    }
    debug!(
        version = ?header.version,
        format = %header.format,
        width = header.width,
        height = header.height,
        mips = header.mip_count,
        offset = header.pixel_data_offset,
        flipped = header.flipped,
        "texture header parsed"
    );
    Ok(header)
}

/// Legacy pixel-type codes (`flags & 0xFF`): MGL codes below 0x10, OGL codes above.
pub fn pvr2_format(code: u32) -> Option<PixelFormat> {
    use PixelFormat::*;
    let f = match code {
        0x00 => Argb4444,
        0x01 => Argb1555,
        0x02 => Rgb565,
        0x03 => Rgb555,
        0x04 => Rgb888,
        // MGL ARGB8888 is a little-endian 0xAARRGGBB word, i.e. BGRA in memory.
        0x05 => Bgra8888,
        0x07 => I8,
        0x08 => Ai88,
        0x0C => Compressed(CompressedKind::Pvrtc2Bpp),
        0x0D => Compressed(CompressedKind::Pvrtc4Bpp),
        0x10 => Rgba4444,
        0x11 => Rgba5551,
        0x12 => Rgba8888,
        0x13 => Rgb565,
        0x14 => Rgb555,
        0x15 => Rgb888,
        0x16 => I8,
        0x17 => Ai88,
        0x18 => Compressed(CompressedKind::Pvrtc2Bpp),
        0x19 => Compressed(CompressedKind::Pvrtc4Bpp),
        0x1A => Bgra8888,
        0x1B => A8,
        0x20 => Compressed(CompressedKind::Pvrtc2Bpp2),
        0x21 => Compressed(CompressedKind::Pvrtc4Bpp2),
        0x36 => Compressed(CompressedKind::Etc1),
        _ => return None,
    };
    Some(f)
}

fn parse_v2(data: &[u8]) -> Result<TextureHeader> {
    let word = |i: usize| LittleEndian::read_u32(&data[i * 4..i * 4 + 4]);
    let header_len = word(0) as usize;
    let height = word(1);
    let width = word(2);
    let mip_count = word(3);
    let flags = word(4);
    let surface_count = word(12);

    let code = flags & 0xFF;
    let format = pvr2_format(code)
        .ok_or_else(|| UnpackError::header(format!("unknown PVR v2 pixel type {code:#04x}")))?;

    let pixel_data_offset = if header_len < PVR2_HEADER_SIZE || header_len > data.len() {
        warn!(header_len, "implausible PVR v2 header length, assuming 52");
        PVR2_HEADER_SIZE
    } else {
        header_len
    };

    Ok(TextureHeader {
        version: PvrVersion::V2,
        format,
        width,
        height,
        mip_count,
        surface_count: surface_count.max(1),
        pixel_data_offset,
        flipped: flags & PVR2_FLAG_VERTICAL_FLIP != 0,
    })
}

fn parse_v3(data: &[u8]) -> Result<TextureHeader> {
    let word = |i: usize| LittleEndian::read_u32(&data[i * 4..i * 4 + 4]);
    let format_lo = word(2);
    let format_hi = word(3);
    let channel_type = word(5);
    let height = word(6);
    let width = word(7);
    let surface_count = word(9);
    let mip_count = word(11);
    let meta_len = word(12) as usize;

    let meta_end = PVR3_HEADER_SIZE
        .checked_add(meta_len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            UnpackError::header(format!("metadata block of {meta_len} bytes overruns the file"))
        })?;

    let format = if format_hi == 0 {
        PixelFormat::Compressed(CompressedKind::from_pvr3_code(format_lo))
    } else {
        pvr3_uncompressed_format(format_lo, format_hi, channel_type)?
    };

    Ok(TextureHeader {
        version: PvrVersion::V3,
        format,
        width,
        height,
        mip_count,
        surface_count: surface_count.max(1),
        pixel_data_offset: meta_end,
        flipped: v3_bottom_up(&data[PVR3_HEADER_SIZE..meta_end]),
    })
}

/// Channel names live in the low word (one ASCII letter per byte), bit widths
/// in the high word.
fn pvr3_uncompressed_format(lo: u32, hi: u32, channel_type: u32) -> Result<PixelFormat> {
    // Signed and floating-point channel types.
    if matches!(channel_type, 1 | 3 | 5 | 7 | 9 | 11 | 12) {
        return Err(UnpackError::header(format!(
            "unsupported PVR v3 channel type {channel_type}"
        )));
    }
    let names = lo.to_le_bytes();
    let bits = hi.to_le_bytes();
    let mut channels = String::new();
    let mut widths = Vec::new();
    for (n, b) in names.iter().zip(bits.iter()) {
        if *n == 0 {
            break;
        }
        channels.push(n.to_ascii_lowercase() as char);
        widths.push(*b);
    }
    use PixelFormat::*;
    let format = match (channels.as_str(), widths.as_slice()) {
        ("rgba", [8, 8, 8, 8]) => Rgba8888,
        ("bgra", [8, 8, 8, 8]) => Bgra8888,
        ("rgba", [4, 4, 4, 4]) => Rgba4444,
        ("argb", [4, 4, 4, 4]) => Argb4444,
        ("rgba", [5, 5, 5, 1]) => Rgba5551,
        ("argb", [1, 5, 5, 5]) => Argb1555,
        ("rgb", [5, 6, 5]) => Rgb565,
        ("rgb", [5, 5, 5]) => Rgb555,
        ("rgb", [8, 8, 8]) => Rgb888,
        ("l", [8]) | ("i", [8]) => I8,
        ("la", [8, 8]) => Ai88,
        ("a", [8]) => A8,
        _ => {
            return Err(UnpackError::header(format!(
                "unsupported PVR v3 pixel format '{channels}' {widths:?}"
            )));
        }
    };
    Ok(format)
}

/// Scan v3 metadata for the orientation entry; a non-zero y byte means the
/// rows run bottom-to-top.
fn v3_bottom_up(meta: &[u8]) -> bool {
    let mut off = 0usize;
    while off + 12 <= meta.len() {
        let fourcc = LittleEndian::read_u32(&meta[off..off + 4]);
        let key = LittleEndian::read_u32(&meta[off + 4..off + 8]);
        let len = LittleEndian::read_u32(&meta[off + 8..off + 12]) as usize;
        let start = off + 12;
        let Some(end) = start.checked_add(len).filter(|&e| e <= meta.len()) else {
            warn!(offset = off, len, "truncated PVR v3 metadata entry");
            return false;
        };
        if fourcc == PVR3_MAGIC && key == PVR3_META_ORIENTATION && len >= 2 {
            return meta[start + 1] != 0;
        }
        off = end;
    }
    false
}
