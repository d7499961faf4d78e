use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Environment variable consulted for the PVRTexToolCLI path when none is configured.
pub const PVRTEXTOOL_ENV: &str = "PVRTEXTOOL";

/// Image format written for each extracted frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    /// Lossy; alpha is discarded.
    Jpeg,
    Bmp,
    Tiff,
}

impl FromStr for OutputFormat {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "bmp" => Ok(Self::Bmp),
            "tif" | "tiff" => Ok(Self::Tiff),
            _ => Err(()),
        }
    }
}

impl OutputFormat {
    /// File extension (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }
}

/// Options for [`crate::extract`].
///
/// Everything except the cancel flag can be loaded from a config file; unset
/// keys fall back to [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractOptions {
    /// Output directory. `None` means `unpacked/` next to the descriptor.
    pub output_dir: Option<PathBuf>,
    /// Appended to every output file stem (e.g. `@2x`).
    pub suffix: String,
    pub format: OutputFormat,
    /// Leave frames whose output file already exists untouched.
    pub skip_existing: bool,
    /// Use this texture instead of resolving it from the descriptor.
    pub texture: Option<PathBuf>,
    /// External converter for block-compressed textures. Falls back to `$PVRTEXTOOL`.
    pub pvrtextool: Option<PathBuf>,
    /// Reconstruct frames on the rayon pool (needs the `parallel` feature).
    pub parallel: bool,
    /// Abort on the first frame failure instead of recording it.
    pub fail_fast: bool,
    /// Checked between frames; raising it stops the run early.
    #[serde(skip)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ExtractOptions {
    /// Create a fluent builder for `ExtractOptions`.
    pub fn builder() -> ExtractOptionsBuilder {
        ExtractOptionsBuilder::new()
    }

    /// Validates the options.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::UnpackError;

        if self.suffix.contains(['/', '\\']) || self.suffix.contains("..") {
            return Err(UnpackError::InvalidOptions(format!(
                "suffix '{}' must not contain path separators",
                self.suffix
            )));
        }
        if let Some(dir) = &self.output_dir
            && dir.as_os_str().is_empty()
        {
            return Err(UnpackError::InvalidOptions(
                "output_dir is set but empty".into(),
            ));
        }
        if let Some(tool) = &self.pvrtextool
            && tool.as_os_str().is_empty()
        {
            return Err(UnpackError::InvalidOptions(
                "pvrtextool is set but empty".into(),
            ));
        }
        if self.parallel && !cfg!(feature = "parallel") {
            tracing::warn!("parallel extraction requested but the `parallel` feature is disabled");
        }
        Ok(())
    }

    /// Output directory for `descriptor`, applying the `unpacked/` default.
    pub fn output_dir_for(&self, descriptor: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => descriptor
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join("unpacked"),
        }
    }

    /// Configured converter path, else `$PVRTEXTOOL`.
    pub fn resolved_pvrtextool(&self) -> Option<PathBuf> {
        self.pvrtextool.clone().or_else(pvrtextool_from_env)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(std::sync::atomic::Ordering::Relaxed))
    }
}

/// Reads `$PVRTEXTOOL`, ignoring empty values.
pub fn pvrtextool_from_env() -> Option<PathBuf> {
    std::env::var_os(PVRTEXTOOL_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Builder for `ExtractOptions` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct ExtractOptionsBuilder {
    opts: ExtractOptions,
}

impl ExtractOptionsBuilder {
    pub fn new() -> Self {
        Self {
            opts: ExtractOptions::default(),
        }
    }
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.output_dir = Some(dir.into());
        self
    }
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.opts.suffix = suffix.into();
        self
    }
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.opts.format = format;
        self
    }
    pub fn skip_existing(mut self, v: bool) -> Self {
        self.opts.skip_existing = v;
        self
    }
    pub fn texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.texture = Some(path.into());
        self
    }
    pub fn pvrtextool(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.pvrtextool = Some(path.into());
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.opts.parallel = v;
        self
    }
    pub fn fail_fast(mut self, v: bool) -> Self {
        self.opts.fail_fast = v;
        self
    }
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.opts.cancel = Some(flag);
        self
    }
    pub fn build(self) -> ExtractOptions {
        self.opts
    }
}
