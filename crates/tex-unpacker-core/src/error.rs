use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures surfaced by the unpacker. Every variant carries the file it was
/// raised for once the orchestrator knows it (see [`UnpackError::with_path`]).
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("invalid descriptor{}: {reason}", at(.path))]
    Descriptor {
        path: Option<PathBuf>,
        reason: String,
    },
    #[error("invalid texture container{}: {reason}", at(.path))]
    Container {
        path: Option<PathBuf>,
        reason: String,
    },
    #[error("unrecognized texture header{}: {reason}", at(.path))]
    Header {
        path: Option<PathBuf>,
        reason: String,
    },
    #[error("pixel data error{}: {reason}", at(.path))]
    PixelFormat {
        path: Option<PathBuf>,
        reason: String,
    },
    #[error("cannot reconstruct frame '{frame}'{}: {reason}", at(.path))]
    Reconstruction {
        path: Option<PathBuf>,
        frame: String,
        reason: String,
    },
    #[error(
        "texture{} uses block-compressed format {format}; pass an external converter (--pvrtextool or PVRTEXTOOL)",
        at(.path)
    )]
    Compressed {
        path: Option<PathBuf>,
        format: String,
    },
    #[error("external converter failed{}: {reason}", at(.path))]
    ExternalTool {
        path: Option<PathBuf>,
        reason: String,
    },
    #[error("I/O error{}: {source}", at(.path))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
    #[error("image error{}: {source}", at(.path))]
    Image {
        path: Option<PathBuf>,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

fn at(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" in '{}'", p.display()),
        None => String::new(),
    }
}

impl UnpackError {
    pub fn descriptor(reason: impl Into<String>) -> Self {
        Self::Descriptor {
            path: None,
            reason: reason.into(),
        }
    }

    pub fn container(reason: impl Into<String>) -> Self {
        Self::Container {
            path: None,
            reason: reason.into(),
        }
    }

    pub fn header(reason: impl Into<String>) -> Self {
        Self::Header {
            path: None,
            reason: reason.into(),
        }
    }

    pub fn pixel_format(reason: impl Into<String>) -> Self {
        Self::PixelFormat {
            path: None,
            reason: reason.into(),
        }
    }

    pub fn reconstruction(frame: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reconstruction {
            path: None,
            frame: frame.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: Some(path.as_ref().to_path_buf()),
            source,
        }
    }

    /// Attach `path` unless the error already names a file.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        let slot = match &mut self {
            Self::Descriptor { path, .. }
            | Self::Container { path, .. }
            | Self::Header { path, .. }
            | Self::PixelFormat { path, .. }
            | Self::Reconstruction { path, .. }
            | Self::Compressed { path, .. }
            | Self::ExternalTool { path, .. }
            | Self::Io { path, .. }
            | Self::Image { path, .. } => path,
            Self::InvalidOptions(_) => return self,
        };
        if slot.is_none() {
            *slot = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// File the error was raised for, if known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Descriptor { path, .. }
            | Self::Container { path, .. }
            | Self::Header { path, .. }
            | Self::PixelFormat { path, .. }
            | Self::Reconstruction { path, .. }
            | Self::Compressed { path, .. }
            | Self::ExternalTool { path, .. }
            | Self::Io { path, .. }
            | Self::Image { path, .. } => path.as_deref(),
            Self::InvalidOptions(_) => None,
        }
    }
}

impl From<std::io::Error> for UnpackError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

impl From<image::ImageError> for UnpackError {
    fn from(source: image::ImageError) -> Self {
        Self::Image { path: None, source }
    }
}

pub type Result<T> = std::result::Result<T, UnpackError>;
