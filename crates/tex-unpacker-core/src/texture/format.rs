use std::fmt;

use serde::{Deserialize, Serialize};

/// Block-compressed encodings that are never decoded in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressedKind {
    Pvrtc2Bpp,
    Pvrtc4Bpp,
    Pvrtc2Bpp2,
    Pvrtc4Bpp2,
    Etc1,
    Etc2,
    Eac,
    Dxt(u8),
    Bc(u8),
    Astc,
    /// Unlisted PVR v3 compressed format code.
    Other(u32),
}

impl CompressedKind {
    /// Map a PVR v3 compressed pixel-format code.
    pub fn from_pvr3_code(code: u32) -> Self {
        match code {
            0 | 1 => Self::Pvrtc2Bpp,
            2 | 3 => Self::Pvrtc4Bpp,
            4 => Self::Pvrtc2Bpp2,
            5 => Self::Pvrtc4Bpp2,
            6 => Self::Etc1,
            7..=11 => Self::Dxt((code - 6) as u8),
            12..=15 => Self::Bc((code - 8) as u8),
            22..=24 => Self::Etc2,
            25 | 26 => Self::Eac,
            27..=40 => Self::Astc,
            other => Self::Other(other),
        }
    }

    /// Nominal bits per pixel, used for size estimates only.
    pub fn nominal_bits_per_pixel(self) -> u32 {
        match self {
            Self::Pvrtc2Bpp | Self::Pvrtc2Bpp2 => 2,
            Self::Pvrtc4Bpp | Self::Pvrtc4Bpp2 | Self::Etc1 | Self::Etc2 | Self::Eac => 4,
            Self::Dxt(1) | Self::Bc(4) => 4,
            Self::Dxt(_) | Self::Bc(_) | Self::Astc | Self::Other(_) => 8,
        }
    }
}

impl fmt::Display for CompressedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pvrtc2Bpp => write!(f, "PVRTC 2bpp"),
            Self::Pvrtc4Bpp => write!(f, "PVRTC 4bpp"),
            Self::Pvrtc2Bpp2 => write!(f, "PVRTC-II 2bpp"),
            Self::Pvrtc4Bpp2 => write!(f, "PVRTC-II 4bpp"),
            Self::Etc1 => write!(f, "ETC1"),
            Self::Etc2 => write!(f, "ETC2"),
            Self::Eac => write!(f, "EAC"),
            Self::Dxt(n) => write!(f, "DXT{n}"),
            Self::Bc(n) => write!(f, "BC{n}"),
            Self::Astc => write!(f, "ASTC"),
            Self::Other(code) => write!(f, "compressed format #{code}"),
        }
    }
}

/// Pixel layouts found in PVR textures.
///
/// Packed 16-bit formats are little-endian words with the first-named
/// channel in the most significant bits; the others are byte-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8888,
    Bgra8888,
    Argb4444,
    Rgba4444,
    Argb1555,
    Rgba5551,
    Rgb565,
    Rgb555,
    Rgb888,
    /// Intensity: grey, opaque.
    I8,
    /// Intensity then alpha.
    Ai88,
    /// Alpha only; colour channels decode to black.
    A8,
    /// GPU block compression; handled by an external converter.
    Compressed(CompressedKind),
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Bgra8888 => 32,
            Self::Rgb888 => 24,
            Self::Argb4444
            | Self::Rgba4444
            | Self::Argb1555
            | Self::Rgba5551
            | Self::Rgb565
            | Self::Rgb555
            | Self::Ai88 => 16,
            Self::I8 | Self::A8 => 8,
            Self::Compressed(kind) => kind.nominal_bits_per_pixel(),
        }
    }

    /// Whole bytes per pixel; `None` for block-compressed formats.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Compressed(_) => None,
            other => Some(other.bits_per_pixel() as usize / 8),
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Compressed(_))
    }

    /// Decode one row of `src` pixels into RGBA8888 `dst`.
    ///
    /// `dst.len() / 4` pixels are written; `src` must hold at least that many
    /// pixels. Compressed formats leave `dst` untouched.
    pub fn decode_row(self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::Rgba8888 => dst.copy_from_slice(&src[..dst.len()]),
            Self::Bgra8888 => {
                for (px, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                    px.copy_from_slice(&[s[2], s[1], s[0], s[3]]);
                }
            }
            Self::Rgb888 => {
                for (px, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                    px.copy_from_slice(&[s[0], s[1], s[2], 255]);
                }
            }
            Self::I8 => {
                for (px, &i) in dst.chunks_exact_mut(4).zip(src.iter()) {
                    px.copy_from_slice(&[i, i, i, 255]);
                }
            }
            Self::A8 => {
                for (px, &a) in dst.chunks_exact_mut(4).zip(src.iter()) {
                    px.copy_from_slice(&[0, 0, 0, a]);
                }
            }
            Self::Ai88 => {
                for (px, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(2)) {
                    px.copy_from_slice(&[s[0], s[0], s[0], s[1]]);
                }
            }
            Self::Argb4444
            | Self::Rgba4444
            | Self::Argb1555
            | Self::Rgba5551
            | Self::Rgb565
            | Self::Rgb555 => {
                for (px, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(2)) {
                    let word = u16::from_le_bytes([s[0], s[1]]);
                    px.copy_from_slice(&self.unpack_word(word));
                }
            }
            Self::Compressed(_) => {}
        }
    }

    fn unpack_word(self, w: u16) -> [u8; 4] {
        let w = w as u32;
        let field = |shift: u32, bits: u32| expand_bits((w >> shift) & ((1 << bits) - 1), bits);
        match self {
            Self::Rgba4444 => [field(12, 4), field(8, 4), field(4, 4), field(0, 4)],
            Self::Argb4444 => [field(8, 4), field(4, 4), field(0, 4), field(12, 4)],
            Self::Rgba5551 => [field(11, 5), field(6, 5), field(1, 5), field(0, 1)],
            Self::Argb1555 => [field(10, 5), field(5, 5), field(0, 5), field(15, 1)],
            Self::Rgb565 => [field(11, 5), field(5, 6), field(0, 5), 255],
            Self::Rgb555 => [field(10, 5), field(5, 5), field(0, 5), 255],
            _ => unreachable!("unpack_word is only called for packed 16-bit formats"),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgba8888 => "RGBA8888",
            Self::Bgra8888 => "BGRA8888",
            Self::Argb4444 => "ARGB4444",
            Self::Rgba4444 => "RGBA4444",
            Self::Argb1555 => "ARGB1555",
            Self::Rgba5551 => "RGBA5551",
            Self::Rgb565 => "RGB565",
            Self::Rgb555 => "RGB555",
            Self::Rgb888 => "RGB888",
            Self::I8 => "I8",
            Self::Ai88 => "AI88",
            Self::A8 => "A8",
            Self::Compressed(kind) => return write!(f, "{kind}"),
        };
        f.write_str(name)
    }
}

/// Widen an n-bit channel value to 8 bits by repeating its bit pattern
/// (`v << (8 - n) | v >> (2n - 8)` for n >= 4; 1-bit maps to 0/255).
pub fn expand_bits(v: u32, bits: u32) -> u8 {
    debug_assert!((1..=8).contains(&bits));
    let mut acc = 0u32;
    let mut filled = 0;
    while filled < 8 {
        acc = (acc << bits) | v;
        filled += bits;
    }
    (acc >> (filled - 8)) as u8
}
