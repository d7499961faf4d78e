//! Core library for unpacking texture atlases back into individual sprites.
//!
//! - Descriptors: Cocos2d / TexturePacker property lists, XML or binary (formats 0-3)
//! - Textures: PNG/JPEG, raw PVR v2/v3, `.pvr.ccz` (zlib/bzip2/gzip/none) and `.pvr.gz`
//! - Reconstruction: rotated frames are turned back, trimmed frames re-padded to their source size
//! - Block-compressed PVR data (PVRTC, ETC, ...) is delegated to PVRTexToolCLI when available
//!
//! Quick example:
//! ```ignore
//! use std::path::Path;
//! use tex_unpacker_core::{ExtractOptions, extract};
//! # fn main() -> anyhow::Result<()> {
//! let opts = ExtractOptions::builder().output_dir("sprites").suffix("@2x").build();
//! let summary = extract(Path::new("ui.plist"), &opts, |_| {})?;
//! println!("{}", summary.summary());
//! # Ok(()) }
//! ```

pub mod config;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod external;
pub mod extract;
pub mod model;
pub mod plist;
pub mod reconstruct;
pub mod report;
pub mod texture;

pub use config::*;
pub use error::*;
pub use extract::*;
pub use model::*;
pub use report::*;

/// Convenience prelude for common types and functions.
/// Importing `tex_unpacker_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{ExtractOptions, ExtractOptionsBuilder, OutputFormat};
    pub use crate::descriptor::{load_descriptor, parse_descriptor};
    pub use crate::error::{Result, UnpackError};
    pub use crate::model::{
        AtlasDescriptor, DecodedTexture, ExtractionSummary, FrameOutcome, FrameRecord,
        FrameStatus, ProbeReport, Rect,
    };
    pub use crate::reconstruct::{encode_sprite, reconstruct_sprite};
    pub use crate::texture::{PixelFormat, TextureHeader};
    pub use crate::{FrameProgress, extract, probe};
}
