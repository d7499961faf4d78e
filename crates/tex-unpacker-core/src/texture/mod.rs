//! PVR texture headers and the uncompressed pixel decoder.

pub mod decode;
pub mod format;
pub mod header;

pub use decode::{decode, decode_pixels};
pub use format::{CompressedKind, PixelFormat, expand_bits};
pub use header::{PvrVersion, TextureHeader, is_texture_header, parse_header};
