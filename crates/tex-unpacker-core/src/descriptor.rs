//! Cocos2d / TexturePacker atlas descriptors.
//!
//! Three per-frame key sets exist in the wild; each entry is classified on
//! its own and normalized into a [`FrameRecord`] by a dedicated adapter:
//!
//! - format 0: `x`, `y`, `width`, `height`, `offsetX`, `offsetY`, `originalWidth`, `originalHeight`
//! - formats 1/2: `frame`, `offset`, `sourceSize`, `rotated`
//! - format 3: `textureRect`, `spriteOffset`, `spriteSourceSize`, `textureRotated`

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{Result, UnpackError};
use crate::model::{AtlasDescriptor, DescriptorFormat, FrameRecord, Rect};
use crate::plist::{self, PlistValue};

/// Read and parse a descriptor file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_descriptor(path: &Path) -> Result<AtlasDescriptor> {
    let bytes = std::fs::read(path).map_err(|e| UnpackError::io(path, e))?;
    parse_descriptor(&bytes).map_err(|e| e.with_path(path))
}

/// Parse descriptor bytes (XML or binary property list).
pub fn parse_descriptor(bytes: &[u8]) -> Result<AtlasDescriptor> {
    let root = plist::parse(bytes)?;
    if root.as_dict().is_none() {
        return Err(UnpackError::descriptor("root of the property list is not a <dict>"));
    }

    let frames_val = root
        .get("frames")
        .ok_or_else(|| UnpackError::descriptor("missing 'frames' dictionary"))?;
    let entries = frames_val
        .as_dict()
        .ok_or_else(|| UnpackError::descriptor("'frames' is not a dictionary"))?;

    let mut frames = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let frame = normalize_entry(name, entry)?;
        frames.push(frame);
    }

    let metadata = root.get("metadata");
    let meta_str = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(PlistValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    // Format-0 files carry a top-level `texture` dict instead of metadata.
    let legacy_texture = root.get("texture");
    let texture_file = meta_str("textureFileName");
    let real_texture = meta_str("realTextureFileName");
    let texture_name = texture_file
        .clone()
        .or_else(|| real_texture.clone())
        .or_else(|| {
            legacy_texture
                .and_then(|t| t.get("name"))
                .and_then(PlistValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| {
            UnpackError::descriptor("no texture file name (metadata.textureFileName) in descriptor")
        })?;
    let format_version = metadata.and_then(|m| m.get("format")).and_then(PlistValue::as_i64);
    let legacy_size = legacy_texture
        .and_then(|t| Some((t.get("width")?.as_i64()?, t.get("height")?.as_i64()?)));
    let size = match meta_str("size") {
        Some(s) => Some(parse_size(&s)?),
        None => legacy_size.map(|(w, h)| size_from_ints(w, h)).transpose()?,
    };

    debug!(
        frames = frames.len(),
        texture = %texture_name,
        format = ?format_version,
        "descriptor parsed"
    );

    Ok(AtlasDescriptor {
        texture_name,
        real_texture_name: real_texture.filter(|r| Some(r) != texture_file.as_ref()),
        format_version,
        size,
        frames,
    })
}

/// Classify the entry's key set and normalize it.
fn normalize_entry(name: &str, entry: &PlistValue) -> Result<FrameRecord> {
    if entry.as_dict().is_none() {
        return Err(UnpackError::descriptor(format!("frame '{name}' is not a dictionary")));
    }
    let result = if entry.get("textureRect").is_some() {
        normalize_extended(name, entry)
    } else if entry.get("frame").is_some() {
        normalize_modern(name, entry)
    } else if entry.get("x").is_some() && entry.get("width").is_some() {
        normalize_legacy(name, entry)
    } else {
        Err(UnpackError::descriptor("no recognised geometry keys"))
    };
    result.map_err(|e| match e {
        UnpackError::Descriptor { path, reason } => UnpackError::Descriptor {
            path,
            reason: format!("frame '{name}': {reason}"),
        },
        other => other,
    })
}

fn normalize_legacy(name: &str, entry: &PlistValue) -> Result<FrameRecord> {
    let x = int_key(entry, "x")?;
    let y = int_key(entry, "y")?;
    let w = int_key(entry, "width")?;
    let h = int_key(entry, "height")?;
    let frame_rect = rect_from_ints(x, y, w, h)?;
    let ox = opt_real_key(entry, "offsetX")?.unwrap_or(0.0);
    let oy = opt_real_key(entry, "offsetY")?.unwrap_or(0.0);
    // Some old exporters wrote negative original sizes.
    let sw = opt_int_key(entry, "originalWidth")?.map(i64::abs).unwrap_or(w);
    let sh = opt_int_key(entry, "originalHeight")?.map(i64::abs).unwrap_or(h);
    Ok(FrameRecord {
        name: name.to_string(),
        frame_rect,
        rotated: bool_key(entry, "rotated"),
        offset: (ox as f32, oy as f32),
        source_size: size_from_ints(sw, sh)?,
        schema: DescriptorFormat::Legacy,
    })
}

fn normalize_modern(name: &str, entry: &PlistValue) -> Result<FrameRecord> {
    let frame_rect = parse_rect(str_key(entry, "frame")?)?;
    let offset = match opt_str_key(entry, "offset")? {
        Some(s) => parse_point(s)?,
        None => (0.0, 0.0),
    };
    let source_size = match opt_str_key(entry, "sourceSize")? {
        Some(s) => parse_size(s)?,
        None => (frame_rect.w, frame_rect.h),
    };
    Ok(FrameRecord {
        name: name.to_string(),
        frame_rect,
        rotated: bool_key(entry, "rotated"),
        offset,
        source_size,
        schema: DescriptorFormat::Modern,
    })
}

fn normalize_extended(name: &str, entry: &PlistValue) -> Result<FrameRecord> {
    let frame_rect = parse_rect(str_key(entry, "textureRect")?)?;
    let offset = match opt_str_key(entry, "spriteOffset")? {
        Some(s) => parse_point(s)?,
        None => (0.0, 0.0),
    };
    let source_size = match opt_str_key(entry, "spriteSourceSize")? {
        Some(s) => parse_size(s)?,
        None => (frame_rect.w, frame_rect.h),
    };
    Ok(FrameRecord {
        name: name.to_string(),
        frame_rect,
        rotated: bool_key(entry, "textureRotated"),
        offset,
        source_size,
        schema: DescriptorFormat::Extended,
    })
}

fn str_key<'a>(entry: &'a PlistValue, key: &str) -> Result<&'a str> {
    opt_str_key(entry, key)?.ok_or_else(|| UnpackError::descriptor(format!("missing '{key}'")))
}

fn opt_str_key<'a>(entry: &'a PlistValue, key: &str) -> Result<Option<&'a str>> {
    match entry.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| UnpackError::descriptor(format!("'{key}' is not a string"))),
    }
}

fn int_key(entry: &PlistValue, key: &str) -> Result<i64> {
    opt_int_key(entry, key)?.ok_or_else(|| UnpackError::descriptor(format!("missing '{key}'")))
}

fn opt_int_key(entry: &PlistValue, key: &str) -> Result<Option<i64>> {
    match entry.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| UnpackError::descriptor(format!("'{key}' is not a number"))),
    }
}

fn opt_real_key(entry: &PlistValue, key: &str) -> Result<Option<f64>> {
    match entry.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| UnpackError::descriptor(format!("'{key}' is not a number"))),
    }
}

fn bool_key(entry: &PlistValue, key: &str) -> bool {
    entry.get(key).and_then(PlistValue::as_bool).unwrap_or(false)
}

fn rect_from_ints(x: i64, y: i64, w: i64, h: i64) -> Result<Rect> {
    let conv = |v: i64, what: &str| {
        u32::try_from(v).map_err(|_| UnpackError::descriptor(format!("{what} {v} out of range")))
    };
    Ok(Rect::new(conv(x, "x")?, conv(y, "y")?, conv(w, "width")?, conv(h, "height")?))
}

fn size_from_ints(w: i64, h: i64) -> Result<(u32, u32)> {
    let conv = |v: i64| {
        u32::try_from(v).map_err(|_| UnpackError::descriptor(format!("size {v} out of range")))
    };
    Ok((conv(w)?, conv(h)?))
}

/// Extracts every number in a geometry string such as `{{1,2},{3,4}}`.
fn numbers(s: &str) -> Result<Vec<f64>> {
    s.split(|c: char| c == '{' || c == '}' || c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| UnpackError::descriptor(format!("bad number '{t}' in '{s}'")))
        })
        .collect()
}

fn whole(v: f64) -> i64 {
    v.round() as i64
}

/// Parse `{{x,y},{w,h}}` or `{x,y,w,h}`; fractional values are rounded.
pub fn parse_rect(s: &str) -> Result<Rect> {
    match numbers(s)?.as_slice() {
        &[x, y, w, h] => rect_from_ints(whole(x), whole(y), whole(w), whole(h)),
        other => Err(UnpackError::descriptor(format!(
            "cannot parse rect '{s}' (found {} numbers)",
            other.len()
        ))),
    }
}

/// Parse a signed point `{x,y}`, keeping half-pixel precision.
pub fn parse_point(s: &str) -> Result<(f32, f32)> {
    match numbers(s)?.as_slice() {
        &[x, y] => Ok((x as f32, y as f32)),
        other => Err(UnpackError::descriptor(format!(
            "cannot parse point '{s}' (found {} numbers)",
            other.len()
        ))),
    }
}

/// Parse an unsigned size `{w,h}`.
pub fn parse_size(s: &str) -> Result<(u32, u32)> {
    match numbers(s)?.as_slice() {
        &[w, h] => size_from_ints(whole(w), whole(h)),
        other => Err(UnpackError::descriptor(format!(
            "cannot parse size '{s}' (found {} numbers)",
            other.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(frames: &str, meta: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict>
<key>frames</key><dict>{frames}</dict>
<key>metadata</key><dict>{meta}</dict>
</dict></plist>"#
        )
    }

    #[test]
    fn geometry_strings() {
        assert_eq!(parse_rect("{{1,2},{30,40}}").unwrap(), Rect::new(1, 2, 30, 40));
        assert_eq!(parse_rect("{ 1, 2, 3, 4 }").unwrap(), Rect::new(1, 2, 3, 4));
        assert_eq!(parse_point("{-2,3.5}").unwrap(), (-2.0, 3.5));
        assert_eq!(parse_point("{ -0.5 , 0.5 }").unwrap(), (-0.5, 0.5));
        assert_eq!(parse_rect("{{0.4,1.6},{2,3}}").unwrap(), Rect::new(0, 2, 2, 3));
        assert_eq!(parse_size("{5,6}").unwrap(), (5, 6));
        assert!(parse_rect("{1,2}").is_err());
        assert!(parse_rect("{{-1,2},{3,4}}").is_err());
        assert!(parse_point("{a,b}").is_err());
    }

    #[test]
    fn mixed_schemas_normalize_to_frames() {
        let frames = r#"
<key>legacy.png</key><dict>
  <key>x</key><integer>1</integer><key>y</key><integer>2</integer>
  <key>width</key><integer>3</integer><key>height</key><integer>4</integer>
  <key>offsetX</key><real>1</real><key>offsetY</key><real>-1</real>
  <key>originalWidth</key><integer>-5</integer><key>originalHeight</key><integer>6</integer>
</dict>
<key>modern.png</key><dict>
  <key>frame</key><string>{{10,20},{30,40}}</string>
  <key>offset</key><string>{2,-3}</string>
  <key>rotated</key><true/>
  <key>sourceSize</key><string>{34,48}</string>
</dict>
<key>extended.png</key><dict>
  <key>textureRect</key><string>{{5,6},{7,8}}</string>
  <key>spriteOffset</key><string>{0,0}</string>
  <key>spriteSourceSize</key><string>{7,8}</string>
  <key>textureRotated</key><false/>
</dict>"#;
        let xml = wrap(frames, "<key>format</key><integer>2</integer><key>textureFileName</key><string>atlas.pvr.ccz</string><key>size</key><string>{64,64}</string>");
        let d = parse_descriptor(xml.as_bytes()).expect("descriptor");
        assert_eq!(d.texture_name, "atlas.pvr.ccz");
        assert_eq!(d.format_version, Some(2));
        assert_eq!(d.size, Some((64, 64)));
        assert_eq!(d.frame_names(), vec!["legacy.png", "modern.png", "extended.png"]);

        let legacy = &d.frames[0];
        assert_eq!(legacy.schema, DescriptorFormat::Legacy);
        assert_eq!(legacy.frame_rect, Rect::new(1, 2, 3, 4));
        assert_eq!(legacy.offset, (1.0, -1.0));
        assert_eq!(legacy.source_size, (5, 6));

        let modern = &d.frames[1];
        assert_eq!(modern.schema, DescriptorFormat::Modern);
        assert!(modern.rotated);
        assert_eq!(modern.offset, (2.0, -3.0));
        assert_eq!(modern.source_size, (34, 48));
        assert_eq!(modern.packed_rect(), Rect::new(10, 20, 40, 30));

        let ext = &d.frames[2];
        assert_eq!(ext.schema, DescriptorFormat::Extended);
        assert!(!ext.rotated);
        assert!(!ext.is_trimmed());
    }

    #[test]
    fn defaults_for_missing_optional_keys() {
        let frames = "<key>a</key><dict><key>frame</key><string>{{0,0},{4,2}}</string></dict>";
        let d = parse_descriptor(wrap(frames, "<key>realTextureFileName</key><string>a.png</string>").as_bytes())
            .expect("descriptor");
        assert_eq!(d.texture_name, "a.png");
        assert_eq!(d.real_texture_name, Some("a.png".to_string()));
        let f = &d.frames[0];
        assert_eq!(f.offset, (0.0, 0.0));
        assert_eq!(f.source_size, (4, 2));
        assert!(!f.rotated);
    }

    #[test]
    fn format_zero_names_texture_in_top_level_dict() {
        let xml = r#"<plist version="1.0"><dict>
<key>frames</key><dict>
  <key>coin.png</key><dict>
    <key>x</key><integer>0</integer><key>y</key><integer>0</integer>
    <key>width</key><integer>3</integer><key>height</key><integer>2</integer>
    <key>offsetX</key><real>0.5</real><key>offsetY</key><real>-0.5</real>
    <key>originalWidth</key><integer>4</integer><key>originalHeight</key><integer>3</integer>
  </dict>
</dict>
<key>texture</key><dict>
  <key>name</key><string>coins.png</string>
  <key>width</key><integer>32</integer><key>height</key><integer>16</integer>
</dict>
</dict></plist>"#;
        let d = parse_descriptor(xml.as_bytes()).expect("descriptor");
        assert_eq!(d.texture_name, "coins.png");
        assert_eq!(d.real_texture_name, None);
        assert_eq!(d.format_version, None);
        assert_eq!(d.size, Some((32, 16)));
        assert_eq!(d.frames[0].offset, (0.5, -0.5));
    }

    #[test]
    fn missing_texture_name_is_an_error() {
        let frames = "<key>a</key><dict><key>frame</key><string>{{0,0},{4,2}}</string></dict>";
        let err = parse_descriptor(wrap(frames, "").as_bytes()).unwrap_err();
        assert!(matches!(err, UnpackError::Descriptor { .. }));
        assert!(err.to_string().contains("texture"));
    }

    #[test]
    fn bad_frame_reports_its_name() {
        let frames = "<key>broken</key><dict><key>frame</key><string>{1,2}</string></dict>";
        let err = parse_descriptor(wrap(frames, "<key>textureFileName</key><string>t.png</string>").as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn missing_frames_is_an_error() {
        let xml = "<plist><dict><key>metadata</key><dict/></dict></plist>";
        assert!(matches!(
            parse_descriptor(xml.as_bytes()),
            Err(UnpackError::Descriptor { .. })
        ));
    }
}
