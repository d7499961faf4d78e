use serde_json::{Value, json};

use crate::model::{ExtractionSummary, FrameStatus, ProbeReport};

/// Serialize a probe as `{ plist, texture, frame_count, frame_names, metadata }`.
/// `texture` is `null` when no texture file was found.
pub fn probe_to_json(report: &ProbeReport) -> Value {
    let size = report.atlas_size.map(|(w, h)| json!({"w": w, "h": h}));
    let texture_info = report.texture.as_ref().map(|t| {
        json!({
            "width": t.width,
            "height": t.height,
            "pixelFormat": t.pixel_format,
            "container": t.container,
        })
    });
    json!({
        "plist": report.descriptor_path.display().to_string(),
        "texture": report.texture_path.as_ref().map(|p| p.display().to_string()),
        "frame_count": report.frame_count,
        "frame_names": report.frame_names,
        "metadata": {
            "textureFileName": report.texture_name,
            "format": report.format_version,
            "size": size,
            "texture": texture_info,
        },
    })
}

/// Serialize an extraction summary: totals plus one entry per frame.
pub fn summary_to_json(summary: &ExtractionSummary) -> Value {
    let frames: Vec<Value> = summary
        .frames
        .iter()
        .map(|f| {
            let mut entry = json!({
                "index": f.index,
                "name": f.name,
                "path": f.path.as_ref().map(|p| p.display().to_string()),
            });
            match &f.status {
                FrameStatus::Written { width, height } => {
                    entry["status"] = json!("written");
                    entry["width"] = json!(width);
                    entry["height"] = json!(height);
                }
                FrameStatus::Skipped => entry["status"] = json!("skipped"),
                FrameStatus::Failed { reason } => {
                    entry["status"] = json!("failed");
                    entry["reason"] = json!(reason);
                }
            }
            entry
        })
        .collect();
    json!({
        "plist": summary.descriptor_path.display().to_string(),
        "texture": summary.texture_path.display().to_string(),
        "output_dir": summary.output_dir.display().to_string(),
        "written": summary.written(),
        "skipped": summary.skipped(),
        "failed": summary.failed(),
        "cancelled": summary.cancelled,
        "frames": frames,
    })
}
