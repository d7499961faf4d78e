//! Delegation of block-compressed textures (PVRTC, ETC, ...) to PVRTexToolCLI.

use std::path::Path;
use std::process::Command;

use tracing::{debug, instrument};

use crate::error::{Result, UnpackError};
use crate::model::DecodedTexture;

/// Decode `pvr` (an unwrapped PVR file, header included) by running
/// `<tool> -i texture.pvr -o texture.png -d r8g8b8a8` in a scratch directory.
#[instrument(skip_all, fields(tool = %tool.display()))]
pub fn decode_with_tool(tool: &Path, pvr: &[u8]) -> Result<DecodedTexture> {
    let scratch = tempfile::tempdir()?;
    let in_path = scratch.path().join("texture.pvr");
    let out_path = scratch.path().join("texture.png");
    std::fs::write(&in_path, pvr).map_err(|e| UnpackError::io(&in_path, e))?;

    let output = Command::new(tool)
        .arg("-i")
        .arg(&in_path)
        .arg("-o")
        .arg(&out_path)
        .args(["-d", "r8g8b8a8"])
        .output()
        .map_err(|e| external_error(tool, format!("cannot run: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(external_error(
            tool,
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    let image = image::open(&out_path)
        .map_err(|e| external_error(tool, format!("unreadable output image: {e}")))?;
    let texture = DecodedTexture::new(image.to_rgba8());
    debug!(width = texture.width(), height = texture.height(), "external decode finished");
    Ok(texture)
}

fn external_error(tool: &Path, reason: String) -> UnpackError {
    UnpackError::ExternalTool {
        path: Some(tool.to_path_buf()),
        reason,
    }
}
