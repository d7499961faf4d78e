use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::header::TextureHeader;
use crate::error::{Result, UnpackError};
use crate::model::DecodedTexture;

/// Decode level 0 of a texture whose header was parsed from `file` (the
/// decompressed PVR bytes, header included).
pub fn decode(header: &TextureHeader, file: &[u8]) -> Result<DecodedTexture> {
    let pixels = file.get(header.pixel_data_offset..).ok_or_else(|| {
        UnpackError::pixel_format(format!(
            "pixel data offset {} is past the end of the file ({} bytes)",
            header.pixel_data_offset,
            file.len()
        ))
    })?;
    decode_pixels(header, pixels)
}

/// Decode level-0 pixel bytes (starting at `pixel_data_offset`) into RGBA8888.
/// Trailing mip levels and surfaces are ignored.
#[instrument(skip_all, fields(format = %header.format, w = header.width, h = header.height))]
pub fn decode_pixels(header: &TextureHeader, pixels: &[u8]) -> Result<DecodedTexture> {
    let format = header.format;
    let bpp = format.bytes_per_pixel().ok_or_else(|| UnpackError::Compressed {
        path: None,
        format: format.to_string(),
    })?;
    let (w, h) = (header.width as usize, header.height as usize);
    let needed = w as u64 * h as u64 * bpp as u64;
    if (pixels.len() as u64) < needed {
        return Err(UnpackError::pixel_format(format!(
            "{format} {}x{} needs {needed} bytes, only {} available",
            header.width,
            header.height,
            pixels.len()
        )));
    }

    let src_stride = w * bpp;
    let dst_stride = w * 4;
    let mut out = vec![0u8; dst_stride * h];
    let flipped = header.flipped;
    let decode_row = |y: usize, dst: &mut [u8]| {
        let src_y = if flipped { h - 1 - y } else { y };
        let src = &pixels[src_y * src_stride..(src_y + 1) * src_stride];
        format.decode_row(src, dst);
    };

    #[cfg(feature = "parallel")]
    {
        out.par_chunks_mut(dst_stride)
            .enumerate()
            .for_each(|(y, dst)| decode_row(y, dst));
    }
    #[cfg(not(feature = "parallel"))]
    {
        out.chunks_mut(dst_stride)
            .enumerate()
            .for_each(|(y, dst)| decode_row(y, dst));
    }

    debug!(bytes = needed, trailing = pixels.len() as u64 - needed, "pixels decoded");
    DecodedTexture::from_raw(header.width, header.height, out)
        .ok_or_else(|| UnpackError::pixel_format("decoded buffer size mismatch"))
}
