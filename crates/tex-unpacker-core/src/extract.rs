//! Extraction orchestrator: descriptor + texture in, one image per frame out.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::ExtractOptions;
use crate::container::{self, Envelope};
use crate::descriptor::load_descriptor;
use crate::error::{Result, UnpackError};
use crate::external;
use crate::model::{
    AtlasDescriptor, DecodedTexture, ExtractionSummary, FrameOutcome, FrameRecord, FrameStatus,
    ProbeReport, TextureContainer, TextureMetadata,
};
use crate::reconstruct::{encode_sprite, reconstruct_sprite};
use crate::texture;

/// Texture suffixes tried, in order, next to the descriptor.
pub const TEXTURE_SUFFIXES: [&str; 4] = [".pvr.ccz", ".pvr.gz", ".pvr", ".png"];

/// Frame-name extensions removed before the suffix and output extension are appended.
const IMAGE_EXTENSIONS: [&str; 9] = [
    ".png", ".jpg", ".jpeg", ".bmp", ".tga", ".gif", ".webp", ".tif", ".tiff",
];

/// Reported to the progress callback after each frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameProgress<'a> {
    /// Position of the frame in the descriptor.
    pub index: usize,
    pub total: usize,
    pub name: &'a str,
    pub status: &'a FrameStatus,
}

/// Extract every frame of the atlas described by `descriptor_path`.
///
/// Container, header and pixel errors abort the run; a frame that cannot be
/// reconstructed or written is recorded as [`FrameStatus::Failed`] unless
/// `fail_fast` is set. Outcomes are returned in descriptor order.
#[instrument(skip_all, fields(descriptor = %descriptor_path.display()))]
pub fn extract<F>(descriptor_path: &Path, opts: &ExtractOptions, progress: F) -> Result<ExtractionSummary>
where
    F: Fn(&FrameProgress<'_>) + Sync,
{
    opts.validate()?;
    let descriptor = load_descriptor(descriptor_path)?;
    let texture_path = resolve_texture(descriptor_path, &descriptor, opts.texture.as_deref())?;
    let (texture, container) = load_texture(&texture_path, opts)?;
    info!(
        texture = %texture_path.display(),
        ?container,
        width = texture.width(),
        height = texture.height(),
        frames = descriptor.frames.len(),
        "texture loaded"
    );
    if let Some(size) = descriptor.size
        && size != (texture.width(), texture.height())
    {
        warn!(
            declared = ?size,
            actual = ?(texture.width(), texture.height()),
            "descriptor size does not match the texture"
        );
    }

    let output_dir = opts.output_dir_for(descriptor_path);
    fs::create_dir_all(&output_dir).map_err(|e| UnpackError::io(&output_dir, e))?;

    let planned: Vec<std::result::Result<PathBuf, String>> = descriptor
        .frames
        .iter()
        .map(|f| output_path_for(&output_dir, &f.name, &opts.suffix, opts.format.extension()))
        .collect();

    let job = FrameJob {
        texture: &texture,
        frames: &descriptor.frames,
        planned: &planned,
        opts,
    };

    #[cfg(feature = "parallel")]
    let (frames, cancelled) = if opts.parallel && !has_collisions(&planned) {
        job.run_parallel(&progress)?
    } else {
        if opts.parallel {
            warn!("frames share output paths; extracting sequentially");
        }
        job.run_sequential(&progress)?
    };
    #[cfg(not(feature = "parallel"))]
    let (frames, cancelled) = job.run_sequential(&progress)?;

    let summary = ExtractionSummary {
        descriptor_path: descriptor_path.to_path_buf(),
        texture_path,
        output_dir,
        frames,
        cancelled,
    };
    info!(
        written = summary.written(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        cancelled,
        "extraction finished"
    );
    Ok(summary)
}

/// Describe an atlas without decoding pixels or writing anything.
#[instrument(skip_all, fields(descriptor = %descriptor_path.display()))]
pub fn probe(descriptor_path: &Path, texture_override: Option<&Path>) -> Result<ProbeReport> {
    let descriptor = load_descriptor(descriptor_path)?;
    let texture_path = match resolve_texture(descriptor_path, &descriptor, texture_override) {
        Ok(p) => Some(p),
        Err(e) => {
            debug!(error = %e, "no texture for probe");
            None
        }
    };
    let texture = texture_path.as_deref().map(probe_texture).transpose()?;
    Ok(ProbeReport {
        descriptor_path: descriptor_path.to_path_buf(),
        texture_path,
        frame_count: descriptor.frames.len(),
        frame_names: descriptor.frame_names(),
        texture_name: descriptor.texture_name,
        format_version: descriptor.format_version,
        atlas_size: descriptor.size,
        texture,
    })
}

/// Find the texture for `descriptor_path`: the explicit override, then the
/// names recorded in the descriptor, then `<stem>` plus [`TEXTURE_SUFFIXES`].
pub fn resolve_texture(
    descriptor_path: &Path,
    descriptor: &AtlasDescriptor,
    texture_override: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = texture_override {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(UnpackError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "texture override does not exist"),
        ));
    }

    let dir = descriptor_path.parent().unwrap_or_else(|| Path::new(""));
    let mut tried = Vec::new();
    let named = descriptor
        .real_texture_name
        .iter()
        .chain(std::iter::once(&descriptor.texture_name));
    for name in named {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        tried.push(candidate);
    }
    if let Some(stem) = descriptor_path.file_stem() {
        for suffix in TEXTURE_SUFFIXES {
            let mut file = stem.to_os_string();
            file.push(suffix);
            let candidate = dir.join(file);
            if candidate.is_file() {
                return Ok(candidate);
            }
            tried.push(candidate);
        }
    }

    let tried: Vec<String> = tried.iter().map(|p| p.display().to_string()).collect();
    Err(UnpackError::descriptor(format!("no texture found; tried {}", tried.join(", ")))
        .with_path(descriptor_path))
}

/// Load and fully decode a texture. Block-compressed PVR data goes through the
/// external converter configured in `opts` (or `$PVRTEXTOOL`).
pub fn load_texture(path: &Path, opts: &ExtractOptions) -> Result<(DecodedTexture, TextureContainer)> {
    let bytes = fs::read(path).map_err(|e| UnpackError::io(path, e))?;
    let container = classify(path, &bytes).map_err(|e| e.with_path(path))?;
    if container == TextureContainer::Image {
        let image = image::load_from_memory(&bytes).map_err(|e| UnpackError::from(e).with_path(path))?;
        return Ok((DecodedTexture::new(image.to_rgba8()), container));
    }

    let decoded = decode_pvr(&bytes, opts).map_err(|e| e.with_path(path))?;
    Ok((decoded, container))
}

fn decode_pvr(bytes: &[u8], opts: &ExtractOptions) -> Result<DecodedTexture> {
    let pvr = container::unwrap(bytes)?;
    let header = texture::parse_header(&pvr)?;
    if !header.format.is_compressed() {
        return texture::decode(&header, &pvr);
    }
    let tool = opts.resolved_pvrtextool().ok_or_else(|| UnpackError::Compressed {
        path: None,
        format: header.format.to_string(),
    })?;
    info!(format = %header.format, tool = %tool.display(), "delegating to external converter");
    external::decode_with_tool(&tool, &pvr)
}

fn probe_texture(path: &Path) -> Result<TextureMetadata> {
    let bytes = fs::read(path).map_err(|e| UnpackError::io(path, e))?;
    let container = classify(path, &bytes).map_err(|e| e.with_path(path))?;
    if container == TextureContainer::Image {
        let reader = image::ImageReader::new(std::io::Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| UnpackError::io(path, e))?;
        let kind = reader
            .format()
            .map(|f| format!("{f:?}").to_ascii_uppercase())
            .unwrap_or_else(|| "unknown".into());
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| UnpackError::from(e).with_path(path))?;
        return Ok(TextureMetadata {
            width,
            height,
            pixel_format: kind,
            container,
        });
    }
    let pvr = container::unwrap(&bytes).map_err(|e| e.with_path(path))?;
    let header = texture::parse_header(&pvr).map_err(|e| e.with_path(path))?;
    Ok(TextureMetadata {
        width: header.width,
        height: header.height,
        pixel_format: header.format.to_string(),
        container,
    })
}

/// Decide how the texture bytes are stored. Files named `*.pvr*` must hold a
/// PVR; anything else without an envelope or PVR header is an ordinary image.
fn classify(path: &Path, bytes: &[u8]) -> Result<TextureContainer> {
    let kind = match container::detect(bytes)? {
        Envelope::Ccz(_) => TextureContainer::PvrCcz,
        Envelope::Gzip => TextureContainer::PvrGzip,
        Envelope::None if texture::is_texture_header(bytes) => TextureContainer::Pvr,
        Envelope::None if is_pvr_name(path) => {
            return Err(UnpackError::container("file has neither a compression envelope nor a PVR header"));
        }
        Envelope::None => TextureContainer::Image,
    };
    Ok(kind)
}

fn is_pvr_name(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase().contains(".pvr"))
        .unwrap_or(false)
}

/// Map a frame name to `<output_dir>/<name without image extension><suffix>.<ext>`.
/// Names that are empty, absolute, or climb out of `output_dir` are refused.
pub fn output_path_for(
    output_dir: &Path,
    name: &str,
    suffix: &str,
    extension: &str,
) -> std::result::Result<PathBuf, String> {
    let lower = name.to_ascii_lowercase();
    let stem = IMAGE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
        .map(|ext| &name[..name.len() - ext.len()])
        .unwrap_or(name);
    if stem.is_empty() {
        return Err("empty frame name".into());
    }
    let rel = Path::new(stem);
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(format!("frame name '{name}' escapes the output directory"));
    }
    Ok(output_dir.join(format!("{stem}{suffix}.{extension}")))
}

#[cfg(feature = "parallel")]
fn has_collisions(planned: &[std::result::Result<PathBuf, String>]) -> bool {
    let mut seen = HashSet::new();
    planned.iter().flatten().any(|p| !seen.insert(p))
}

/// Shared, read-only state for one extraction run.
struct FrameJob<'a> {
    texture: &'a DecodedTexture,
    frames: &'a [FrameRecord],
    planned: &'a [std::result::Result<PathBuf, String>],
    opts: &'a ExtractOptions,
}

impl FrameJob<'_> {
    fn run_sequential<F>(&self, progress: &F) -> Result<(Vec<FrameOutcome>, bool)>
    where
        F: Fn(&FrameProgress<'_>),
    {
        let total = self.frames.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut written = HashSet::new();
        for index in 0..total {
            if self.opts.is_cancelled() {
                info!(done = index, total, "extraction cancelled");
                return Ok((outcomes, true));
            }
            let (outcome, error) = self.run_frame(index);
            if let (Some(path), FrameStatus::Written { .. }) = (&outcome.path, &outcome.status)
                && !written.insert(path.clone())
            {
                warn!(frame = %outcome.name, path = %path.display(), "output overwrote an earlier frame");
            }
            progress(&FrameProgress {
                index,
                total,
                name: &outcome.name,
                status: &outcome.status,
            });
            if let Some(e) = error
                && self.opts.fail_fast
            {
                return Err(e);
            }
            outcomes.push(outcome);
        }
        Ok((outcomes, false))
    }

    #[cfg(feature = "parallel")]
    fn run_parallel<F>(&self, progress: &F) -> Result<(Vec<FrameOutcome>, bool)>
    where
        F: Fn(&FrameProgress<'_>) + Sync,
    {
        use std::sync::Mutex;
        use std::sync::atomic::{AtomicBool, Ordering};

        let total = self.frames.len();
        let report = Mutex::new(());
        let aborted = AtomicBool::new(false);
        let first_error: Mutex<Option<UnpackError>> = Mutex::new(None);

        let results: Vec<Option<FrameOutcome>> = (0..total)
            .into_par_iter()
            .map(|index| {
                if self.opts.is_cancelled() || aborted.load(Ordering::Relaxed) {
                    return None;
                }
                let (outcome, error) = self.run_frame(index);
                {
                    let _guard = report.lock().unwrap_or_else(|e| e.into_inner());
                    progress(&FrameProgress {
                        index,
                        total,
                        name: &outcome.name,
                        status: &outcome.status,
                    });
                }
                if let Some(e) = error
                    && self.opts.fail_fast
                {
                    aborted.store(true, Ordering::Relaxed);
                    first_error
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .get_or_insert(e);
                }
                Some(outcome)
            })
            .collect();

        let first_error = first_error.into_inner().unwrap_or_else(|p| p.into_inner());
        if let Some(e) = first_error {
            return Err(e);
        }
        let cancelled = results.iter().any(Option::is_none);
        if cancelled {
            info!(total, "extraction cancelled");
        }
        Ok((results.into_iter().flatten().collect(), cancelled))
    }

    /// Reconstruct and write one frame. The error, if any, is returned next to
    /// the recorded outcome so `fail_fast` can surface it.
    fn run_frame(&self, index: usize) -> (FrameOutcome, Option<UnpackError>) {
        let frame = &self.frames[index];
        let (path, result) = match &self.planned[index] {
            Ok(path) => (Some(path.clone()), self.write_frame(frame, path)),
            Err(reason) => (
                None,
                Err(UnpackError::reconstruction(&frame.name, reason.clone())),
            ),
        };
        let (status, error) = match result {
            Ok(status) => (status, None),
            Err(e) => {
                warn!(frame = %frame.name, error = %e, "frame failed");
                (
                    FrameStatus::Failed {
                        reason: e.to_string(),
                    },
                    Some(e),
                )
            }
        };
        let outcome = FrameOutcome {
            index,
            name: frame.name.clone(),
            path,
            status,
        };
        (outcome, error)
    }

    fn write_frame(&self, frame: &FrameRecord, path: &Path) -> Result<FrameStatus> {
        if self.opts.skip_existing && path.exists() {
            debug!(frame = %frame.name, "output exists, skipping");
            return Ok(FrameStatus::Skipped);
        }
        let sprite = reconstruct_sprite(self.texture, frame)?;
        let bytes = encode_sprite(&sprite, self.opts.format)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| UnpackError::io(parent, e))?;
        }
        fs::write(path, bytes).map_err(|e| UnpackError::io(path, e))?;
        debug!(frame = %frame.name, path = %path.display(), "frame written");
        Ok(FrameStatus::Written {
            width: sprite.width(),
            height: sprite.height(),
        })
    }
}
