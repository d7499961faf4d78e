//! Fixture builders shared by the integration tests: synthetic atlases,
//! PVR files, CCZ envelopes and property lists.
#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::{Rgba, RgbaImage, imageops};
use rand::Rng;
use rand::rngs::StdRng;
use tex_unpacker_core::container::{CczHeader, CompressionMethod};
use tex_unpacker_core::plist::PlistValue;

/// One sprite of a synthetic atlas. `w`/`h` are the trimmed content size
/// (before rotation); `x`/`y` its packed position; `trim` the top-left of the
/// content inside the untrimmed `source` canvas.
#[derive(Debug, Clone)]
pub struct SpriteSpec {
    pub name: &'static str,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub rotated: bool,
    pub trim: (u32, u32),
    pub source: (u32, u32),
}

impl SpriteSpec {
    pub fn plain(name: &'static str, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            name,
            x,
            y,
            w,
            h,
            rotated: false,
            trim: (0, 0),
            source: (w, h),
        }
    }

    /// Offset as TexturePacker writes it: centre of the content relative to
    /// the centre of the source canvas, +y up. Halves appear for odd padding.
    pub fn offset(&self) -> (f32, f32) {
        let (sw, sh) = (self.source.0 as f32, self.source.1 as f32);
        let ox = self.trim.0 as f32 + self.w as f32 / 2.0 - sw / 2.0;
        let oy = sh / 2.0 - (self.trim.1 as f32 + self.h as f32 / 2.0);
        (ox, oy)
    }
}

/// Original sprites plus the atlas they were packed into.
pub struct SyntheticAtlas {
    pub atlas: RgbaImage,
    pub originals: Vec<RgbaImage>,
    pub specs: Vec<SpriteSpec>,
}

/// Build random sprites, trim and rotate them the way a packer does, and
/// paste them into a `width x height` atlas.
pub fn synthetic_atlas(rng: &mut StdRng, width: u32, height: u32, specs: &[SpriteSpec]) -> SyntheticAtlas {
    let mut atlas = RgbaImage::new(width, height);
    let mut originals = Vec::new();
    for s in specs {
        let content = RgbaImage::from_fn(s.w, s.h, |_, _| Rgba([rng.r#gen(), rng.r#gen(), rng.r#gen(), rng.gen_range(1..=255)]));
        let (sw, sh) = s.source;
        let mut original = RgbaImage::new(sw, sh);
        imageops::replace(&mut original, &content, s.trim.0 as i64, s.trim.1 as i64);
        originals.push(original);

        let packed = if s.rotated { imageops::rotate90(&content) } else { content };
        imageops::replace(&mut atlas, &packed, s.x as i64, s.y as i64);
    }
    SyntheticAtlas {
        atlas,
        originals,
        specs: specs.to_vec(),
    }
}

/// Format-2 descriptor (`frame`/`offset`/`rotated`/`sourceSize`).
pub fn modern_plist(texture: &str, size: (u32, u32), specs: &[SpriteSpec]) -> String {
    let mut frames = String::new();
    for s in specs {
        let (ox, oy) = s.offset();
        frames.push_str(&format!(
            "<key>{}</key><dict>\
             <key>frame</key><string>{{{{{},{}}},{{{},{}}}}}</string>\
             <key>offset</key><string>{{{},{}}}</string>\
             <key>rotated</key><{}/>\
             <key>sourceColorRect</key><string>{{{{0,0}},{{{},{}}}}}</string>\
             <key>sourceSize</key><string>{{{},{}}}</string>\
             </dict>\n",
            s.name, s.x, s.y, s.w, s.h, ox, oy, s.rotated, s.w, s.h, s.source.0, s.source.1
        ));
    }
    wrap_plist(&frames, texture, 2, size)
}

/// Format-3 descriptor (`textureRect`/`spriteOffset`/`textureRotated`/`spriteSourceSize`).
pub fn extended_plist(texture: &str, size: (u32, u32), specs: &[SpriteSpec]) -> String {
    let mut frames = String::new();
    for s in specs {
        let (ox, oy) = s.offset();
        frames.push_str(&format!(
            "<key>{}</key><dict>\
             <key>aliases</key><array/>\
             <key>spriteOffset</key><string>{{{},{}}}</string>\
             <key>spriteSize</key><string>{{{},{}}}</string>\
             <key>spriteSourceSize</key><string>{{{},{}}}</string>\
             <key>textureRect</key><string>{{{{{},{}}},{{{},{}}}}}</string>\
             <key>textureRotated</key><{}/>\
             </dict>\n",
            s.name, ox, oy, s.w, s.h, s.source.0, s.source.1, s.x, s.y, s.w, s.h, s.rotated
        ));
    }
    wrap_plist(&frames, texture, 3, size)
}

/// Format-0 descriptor (flat integer keys).
pub fn legacy_plist(texture: &str, size: (u32, u32), specs: &[SpriteSpec]) -> String {
    let mut frames = String::new();
    for s in specs {
        let (ox, oy) = s.offset();
        frames.push_str(&format!(
            "<key>{}</key><dict>\
             <key>x</key><integer>{}</integer><key>y</key><integer>{}</integer>\
             <key>width</key><integer>{}</integer><key>height</key><integer>{}</integer>\
             <key>offsetX</key><real>{}</real><key>offsetY</key><real>{}</real>\
             <key>originalWidth</key><integer>{}</integer><key>originalHeight</key><integer>-{}</integer>\
             <key>rotated</key><{}/>\
             </dict>\n",
            s.name, s.x, s.y, s.w, s.h, ox, oy, s.source.0, s.source.1, s.rotated
        ));
    }
    wrap_plist(&frames, texture, 0, size)
}

fn wrap_plist(frames: &str, texture: &str, format: i64, size: (u32, u32)) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple Computer//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
<key>frames</key>
<dict>
{frames}</dict>
<key>metadata</key>
<dict>
<key>format</key><integer>{format}</integer>
<key>realTextureFileName</key><string>{texture}</string>
<key>size</key><string>{{{},{}}}</string>
<key>textureFileName</key><string>{texture}</string>
</dict>
</dict>
</plist>
"#,
        size.0, size.1
    )
}

/// Encode `root` as a `bplist00` file (2-byte object refs, 4-byte offsets).
pub fn binary_plist(root: &PlistValue) -> Vec<u8> {
    fn sized(kind: u8, len: usize) -> Vec<u8> {
        if len < 15 {
            vec![kind << 4 | len as u8]
        } else {
            let mut out = vec![kind << 4 | 0x0F, 0x11];
            out.extend_from_slice(&(len as u16).to_be_bytes());
            out
        }
    }
    fn push_refs(out: &mut Vec<u8>, refs: &[usize]) {
        for r in refs {
            out.extend_from_slice(&(*r as u16).to_be_bytes());
        }
    }
    fn flatten(v: &PlistValue, objects: &mut Vec<Vec<u8>>) -> usize {
        let index = objects.len();
        objects.push(Vec::new());
        let encoded = match v {
            PlistValue::Dict(entries) => {
                let keys: Vec<usize> = entries
                    .iter()
                    .map(|(k, _)| flatten(&PlistValue::String(k.clone()), objects))
                    .collect();
                let values: Vec<usize> = entries.iter().map(|(_, v)| flatten(v, objects)).collect();
                let mut out = sized(0xD, entries.len());
                push_refs(&mut out, &keys);
                push_refs(&mut out, &values);
                out
            }
            PlistValue::Array(items) => {
                let refs: Vec<usize> = items.iter().map(|v| flatten(v, objects)).collect();
                let mut out = sized(0xA, items.len());
                push_refs(&mut out, &refs);
                out
            }
            PlistValue::String(s) if s.is_ascii() => {
                let mut out = sized(0x5, s.len());
                out.extend_from_slice(s.as_bytes());
                out
            }
            PlistValue::String(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let mut out = sized(0x6, units.len());
                out.extend(units.iter().flat_map(|u| u.to_be_bytes()));
                out
            }
            PlistValue::Integer(i) => [&[0x13u8][..], &i.to_be_bytes()[..]].concat(),
            PlistValue::Real(r) => [&[0x23u8][..], &r.to_be_bytes()[..]].concat(),
            PlistValue::Bool(b) => vec![if *b { 0x09 } else { 0x08 }],
            other => panic!("fixture encoder does not handle {other:?}"),
        };
        objects[index] = encoded;
        index
    }

    let mut objects = Vec::new();
    flatten(root, &mut objects);
    let mut out = b"bplist00".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for obj in &objects {
        offsets.push(out.len() as u32);
        out.extend_from_slice(obj);
    }
    let table = out.len() as u64;
    for off in offsets {
        out.extend_from_slice(&off.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 4, 2]);
    out.extend_from_slice(&(objects.len() as u64).to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&table.to_be_bytes());
    out
}

/// Legacy 52-byte PVR header followed by `pixels`.
pub fn pvr_v2(code: u32, flags: u32, width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let fields = [
        52,
        height,
        width,
        0,
        code | flags,
        pixels.len() as u32,
        0,
        0,
        0,
        0,
        0,
        u32::from_le_bytes(*b"PVR!"),
        1,
    ];
    let mut out: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    out.extend_from_slice(pixels);
    out
}

/// PVR v3 file with an uncompressed `channels`/`bits` pixel format.
pub fn pvr_v3(channels: [u8; 4], bits: [u8; 4], width: u32, height: u32, meta: &[u8], pixels: &[u8]) -> Vec<u8> {
    let fields = [
        0x0352_5650,
        0,
        u32::from_le_bytes(channels),
        u32::from_le_bytes(bits),
        0,
        0,
        height,
        width,
        1,
        1,
        1,
        1,
        meta.len() as u32,
    ];
    let mut out: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    out.extend_from_slice(meta);
    out.extend_from_slice(pixels);
    out
}

/// PVR v3 header declaring a block-compressed format (no pixel payload needed).
pub fn pvr_v3_compressed(code: u32, width: u32, height: u32) -> Vec<u8> {
    let mut out = pvr_v3([0; 4], [0; 4], width, height, &[], &vec![0u8; (width * height / 2) as usize]);
    out[8..12].copy_from_slice(&code.to_le_bytes());
    out
}

/// RGBA8888 PVR v2 file holding `image`.
pub fn pvr_rgba(image: &RgbaImage) -> Vec<u8> {
    pvr_v2(0x12, 0, image.width(), image.height(), image.as_raw())
}

pub fn ccz_zlib(payload: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(payload).expect("zlib write");
    let packed = enc.finish().expect("zlib finish");
    ccz(CompressionMethod::Zlib, payload.len() as u32, &packed)
}

pub fn ccz(method: CompressionMethod, declared: u32, body: &[u8]) -> Vec<u8> {
    let header = CczHeader {
        method,
        version: 2,
        reserved: 0,
        uncompressed_len: declared,
    };
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

pub fn write(path: &Path, bytes: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, bytes).expect("write fixture");
}

/// Every file below `dir`, relative, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for e in entries.flatten() {
            let p = e.path();
            if p.is_dir() {
                walk(base, &p, out);
            } else {
                out.push(p.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

/// Random opaque-ish pixel helper for small fixtures.
pub fn random_image(rng: &mut StdRng, w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |_, _| Rgba([rng.r#gen(), rng.r#gen(), rng.r#gen(), 255]))
}
