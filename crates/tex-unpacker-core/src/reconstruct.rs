//! Cut a frame out of a decoded texture and restore its original form:
//! undo the packer's rotation, then re-pad trimmed sprites to their source size.

use std::io::Cursor;

use image::{DynamicImage, RgbaImage};
use tracing::warn;

use crate::config::OutputFormat;
use crate::error::{Result, UnpackError};
use crate::model::{DecodedTexture, FrameRecord, Rect};

/// Rebuild the sprite described by `frame` from `texture`.
pub fn reconstruct_sprite(texture: &DecodedTexture, frame: &FrameRecord) -> Result<RgbaImage> {
    let src = texture.rgba();
    let packed = frame.packed_rect();
    if !packed.fits_within(src.width(), src.height()) {
        return Err(UnpackError::reconstruction(
            &frame.name,
            format!(
                "packed rect {}x{}+{}+{} lies outside the {}x{} texture",
                packed.w,
                packed.h,
                packed.x,
                packed.y,
                src.width(),
                src.height()
            ),
        ));
    }

    let (w, h) = (frame.frame_rect.w, frame.frame_rect.h);
    let (sw, sh) = frame.source_size;
    if (w, h) == (sw, sh) {
        let mut out = RgbaImage::new(w, h);
        blit_unrotated(src, &mut out, 0, 0, packed, frame.rotated);
        return Ok(out);
    }
    if sw < w || sh < h {
        return Err(UnpackError::reconstruction(
            &frame.name,
            format!("source size {sw}x{sh} is smaller than the {w}x{h} content"),
        ));
    }

    // Exact for packer output: odd padding comes with a half-pixel offset.
    let (ox, oy) = (frame.offset.0 as f64, frame.offset.1 as f64);
    let left = ((sw - w) as f64 / 2.0 + ox).floor() as i64;
    let top = ((sh - h) as f64 / 2.0 - oy).floor() as i64;
    if left < 0 || top < 0 || left + w as i64 > sw as i64 || top + h as i64 > sh as i64 {
        warn!(
            frame = %frame.name,
            left,
            top,
            "offset places content outside the source canvas; clipping"
        );
    }
    let mut canvas = RgbaImage::new(sw, sh);
    blit_unrotated(src, &mut canvas, left, top, packed, frame.rotated);
    Ok(canvas)
}

/// Copy `packed` from `src` into `canvas` with its top-left at (dx, dy),
/// rotating 90° counter-clockwise when `rotated` (the packer stored it
/// clockwise). Destination pixels outside the canvas are dropped.
fn blit_unrotated(src: &RgbaImage, canvas: &mut RgbaImage, dx: i64, dy: i64, packed: Rect, rotated: bool) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    // natural size of the content
    let (rw, rh) = if rotated { (packed.h, packed.w) } else { (packed.w, packed.h) };

    for yy in 0..rh {
        let ty = dy + yy as i64;
        if ty < 0 || ty >= ch {
            continue;
        }
        for xx in 0..rw {
            let tx = dx + xx as i64;
            if tx < 0 || tx >= cw {
                continue;
            }
            let (ix, iy) = if rotated {
                (packed.x + (packed.w - 1 - yy), packed.y + xx)
            } else {
                (packed.x + xx, packed.y + yy)
            };
            canvas.put_pixel(tx as u32, ty as u32, *src.get_pixel(ix, iy));
        }
    }
}

/// Encode a reconstructed sprite. JPEG has no alpha channel, so it is dropped.
pub fn encode_sprite(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => {
            DynamicImage::ImageRgba8(image.clone())
                .into_rgb8()
                .write_to(&mut out, format.image_format())?;
        }
        _ => image.write_to(&mut out, format.image_format())?,
    }
    Ok(out.into_inner())
}
