use std::path::PathBuf;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Returns true if the rect is non-empty and lies inside a `width x height` surface.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.w > 0
            && self.h > 0
            && (self.x as u64 + self.w as u64) <= width as u64
            && (self.y as u64 + self.h as u64) <= height as u64
    }
}

/// Which per-frame key set a descriptor entry was written with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorFormat {
    /// Format 0: flat `x`/`y`/`width`/`height`/`offsetX`/`offsetY`/`originalWidth`/`originalHeight`.
    Legacy,
    /// Formats 1 and 2: `frame`/`offset`/`sourceSize`/`rotated`.
    Modern,
    /// Format 3: `textureRect`/`spriteOffset`/`spriteSourceSize`/`textureRotated`.
    Extended,
}

/// One sprite entry of an atlas descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameRecord {
    /// Frame key as written in the descriptor (e.g. `hero/idle_0.png`).
    pub name: String,
    /// Position in the texture and the sprite's natural (unrotated) size.
    pub frame_rect: Rect,
    /// True if the packer stored the sprite rotated 90° clockwise.
    pub rotated: bool,
    /// Centre offset of the trimmed content inside the untrimmed sprite
    /// (+x right, +y up). Packers write half pixels when the trimmed
    /// padding is odd, so it stays fractional.
    pub offset: (f32, f32),
    /// Untrimmed sprite size.
    pub source_size: (u32, u32),
    /// Schema the entry was read from.
    pub schema: DescriptorFormat,
}

impl FrameRecord {
    /// Region the sprite occupies inside the texture (post-rotation width/height).
    pub fn packed_rect(&self) -> Rect {
        let r = self.frame_rect;
        if self.rotated {
            Rect::new(r.x, r.y, r.h, r.w)
        } else {
            r
        }
    }

    /// True if trimming removed any border from the original sprite.
    pub fn is_trimmed(&self) -> bool {
        self.source_size != (self.frame_rect.w, self.frame_rect.h)
    }
}

/// Parsed descriptor: texture naming hints plus frames in descriptor order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasDescriptor {
    pub texture_name: String,
    pub real_texture_name: Option<String>,
    pub format_version: Option<i64>,
    pub size: Option<(u32, u32)>,
    pub frames: Vec<FrameRecord>,
}

impl AtlasDescriptor {
    pub fn frame_names(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.name.clone()).collect()
    }
}

/// Fully decoded texture: RGBA8888, row-major, top-left origin.
#[derive(Debug, Clone)]
pub struct DecodedTexture {
    rgba: RgbaImage,
}

impl DecodedTexture {
    pub fn new(rgba: RgbaImage) -> Self {
        Self { rgba }
    }

    /// Wraps a raw RGBA buffer; returns `None` if it is not `width * height * 4` bytes.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(Self::new)
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }
}

/// Per-frame result of an extraction run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameStatus {
    Written { width: u32, height: u32 },
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameOutcome {
    /// Position of the frame in the descriptor.
    pub index: usize,
    pub name: String,
    /// Output path; `None` when the frame name could not be mapped to a file.
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub status: FrameStatus,
}

/// Result of [`crate::extract`]: one outcome per frame, in descriptor order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub descriptor_path: PathBuf,
    pub texture_path: PathBuf,
    pub output_dir: PathBuf,
    pub frames: Vec<FrameOutcome>,
    /// True if the run stopped early because the cancel flag was raised.
    pub cancelled: bool,
}

impl ExtractionSummary {
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, FrameStatus::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FrameStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FrameStatus::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &FrameOutcome> {
        self.frames
            .iter()
            .filter(|f| matches!(f.status, FrameStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FrameStatus) -> bool) -> usize {
        self.frames.iter().filter(|f| pred(&f.status)).count()
    }

    /// Returns a human-readable one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Frames: {}, Written: {}, Skipped: {}, Failed: {}{}",
            self.frames.len(),
            self.written(),
            self.skipped(),
            self.failed(),
            if self.cancelled { " (cancelled)" } else { "" },
        )
    }
}

/// How the texture bytes were stored on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextureContainer {
    /// A plain image file (PNG, JPEG, ...).
    Image,
    /// Uncompressed PVR file.
    Pvr,
    /// PVR inside a `CCZ!` envelope.
    PvrCcz,
    /// PVR inside a gzip stream.
    PvrGzip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureMetadata {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub container: TextureContainer,
}

/// Dry-run result of [`crate::probe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub descriptor_path: PathBuf,
    /// `None` when no texture file could be found.
    pub texture_path: Option<PathBuf>,
    /// Texture file name recorded in the descriptor metadata.
    pub texture_name: String,
    pub format_version: Option<i64>,
    /// Atlas size recorded in the descriptor metadata.
    pub atlas_size: Option<(u32, u32)>,
    pub frame_count: usize,
    pub frame_names: Vec<String>,
    pub texture: Option<TextureMetadata>,
}
