//! Compression envelopes around PVR textures (`.pvr.ccz`, `.pvr.gz`).

use std::borrow::Cow;
use std::io::Read;

use byteorder::{BigEndian, ByteOrder};
use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::debug;

use crate::error::{Result, UnpackError};
use crate::texture;

pub const CCZ_MAGIC: &[u8; 4] = b"CCZ!";
/// Encrypted variant written by TexturePacker's content protection.
pub const CCZ_ENCRYPTED_MAGIC: &[u8; 4] = b"CCZp";
pub const CCZ_HEADER_SIZE: usize = 16;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression method selected by the CCZ header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Zlib,
    Bzip2,
    Gzip,
    None,
}

impl CompressionMethod {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Zlib),
            1 => Some(Self::Bzip2),
            2 => Some(Self::Gzip),
            3 => Some(Self::None),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::Zlib => 0,
            Self::Bzip2 => 1,
            Self::Gzip => 2,
            Self::None => 3,
        }
    }
}

/// 16-byte big-endian CCZ header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CczHeader {
    pub method: CompressionMethod,
    pub version: u16,
    pub reserved: u32,
    pub uncompressed_len: u32,
}

impl CczHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CCZ_HEADER_SIZE {
            return Err(UnpackError::container(format!(
                "CCZ header truncated ({} bytes)",
                data.len()
            )));
        }
        if &data[..4] != CCZ_MAGIC {
            return Err(UnpackError::container(format!("bad CCZ magic {:?}", &data[..4])));
        }
        let code = BigEndian::read_u16(&data[4..6]);
        let method = CompressionMethod::from_code(code)
            .ok_or_else(|| UnpackError::container(format!("unknown CCZ compression type {code}")))?;
        Ok(Self {
            method,
            version: BigEndian::read_u16(&data[6..8]),
            reserved: BigEndian::read_u32(&data[8..12]),
            uncompressed_len: BigEndian::read_u32(&data[12..16]),
        })
    }

    /// Serialize back to the on-disk layout.
    pub fn to_bytes(&self) -> [u8; CCZ_HEADER_SIZE] {
        let mut out = [0u8; CCZ_HEADER_SIZE];
        out[..4].copy_from_slice(CCZ_MAGIC);
        BigEndian::write_u16(&mut out[4..6], self.method.code());
        BigEndian::write_u16(&mut out[6..8], self.version);
        BigEndian::write_u32(&mut out[8..12], self.reserved);
        BigEndian::write_u32(&mut out[12..16], self.uncompressed_len);
        out
    }
}

/// Envelope detected at the start of a texture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Ccz(CczHeader),
    Gzip,
    None,
}

/// Inspect the leading magic bytes.
pub fn detect(data: &[u8]) -> Result<Envelope> {
    if data.starts_with(CCZ_ENCRYPTED_MAGIC) {
        return Err(UnpackError::container(
            "encrypted CCZ (CCZp) textures are not supported",
        ));
    }
    if data.starts_with(CCZ_MAGIC) {
        return CczHeader::parse(data).map(Envelope::Ccz);
    }
    if data.starts_with(&GZIP_MAGIC) {
        return Ok(Envelope::Gzip);
    }
    Ok(Envelope::None)
}

/// Reverse the compression envelope, if any. Bytes without an envelope are
/// returned borrowed and unchanged.
pub fn decompress(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    match detect(data)? {
        Envelope::Ccz(header) => {
            let payload = &data[CCZ_HEADER_SIZE..];
            let out = decompress_ccz_payload(payload, &header)?;
            debug!(
                method = ?header.method,
                version = header.version,
                compressed = payload.len(),
                uncompressed = out.len(),
                "ccz envelope removed"
            );
            Ok(Cow::Owned(out))
        }
        Envelope::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| UnpackError::container(format!("gzip stream is corrupt: {e}")))?;
            debug!(compressed = data.len(), uncompressed = out.len(), "gzip envelope removed");
            Ok(Cow::Owned(out))
        }
        Envelope::None => Ok(Cow::Borrowed(data)),
    }
}

/// Like [`decompress`], but also requires the result to start with a PVR header.
pub fn unwrap(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let envelope = detect(data)?;
    let out = decompress(data)?;
    if !texture::is_texture_header(&out) {
        let reason = match envelope {
            Envelope::None => "no compression envelope and no PVR header",
            _ => "decompressed payload does not start with a PVR header",
        };
        return Err(UnpackError::container(reason));
    }
    Ok(out)
}

fn decompress_ccz_payload(payload: &[u8], header: &CczHeader) -> Result<Vec<u8>> {
    let expected = header.uncompressed_len as usize;
    let capacity = initial_capacity(expected, payload.len());
    let out = match header.method {
        CompressionMethod::None => payload.to_vec(),
        CompressionMethod::Zlib => {
            read_exact_len(ZlibDecoder::new(payload), expected, capacity, "zlib")?
        }
        CompressionMethod::Bzip2 => {
            read_exact_len(bzip2::read::BzDecoder::new(payload), expected, capacity, "bzip2")?
        }
        CompressionMethod::Gzip => {
            read_exact_len(GzDecoder::new(payload), expected, capacity, "gzip")?
        }
    };
    if out.len() != expected {
        return Err(UnpackError::container(format!(
            "CCZ declares {expected} bytes but payload yields {}",
            out.len()
        )));
    }
    Ok(out)
}

/// The declared length comes from an untrusted header; only trust it up to
/// a plausible compression ratio.
fn initial_capacity(expected: usize, compressed_len: usize) -> usize {
    expected.min(compressed_len.saturating_mul(8))
}

/// Reads at most `expected + 1` bytes so an oversized stream is detected
/// without inflating it completely.
fn read_exact_len<R: Read>(reader: R, expected: usize, capacity: usize, what: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity);
    reader
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| UnpackError::container(format!("{what} stream is corrupt: {e}")))?;
    Ok(out)
}
