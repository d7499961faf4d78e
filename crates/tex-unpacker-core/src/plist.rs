//! Minimal reader for Apple property lists, XML or binary.
//!
//! Dictionaries keep their entries in document order so that frame
//! enumeration follows the descriptor.

mod binary;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Result, UnpackError};

/// A property-list value.
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    Dict(Vec<(String, PlistValue)>),
    Array(Vec<PlistValue>),
    String(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    /// Base64 payload with whitespace removed (not decoded).
    Data(String),
    Date(String),
}

impl PlistValue {
    /// Looks up `key` when `self` is a dictionary.
    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        match self {
            Self::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(String, PlistValue)]> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; reals are rounded and numeric strings are accepted since
    /// some exporters write `<string>12</string>`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(r) if r.is_finite() => Some(r.round() as i64),
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|r| r.is_finite()).map(|r| r.round() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) if r.is_finite() => Some(*r),
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|r| r.is_finite()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

enum Container {
    Dict {
        entries: Vec<(String, PlistValue)>,
        pending_key: Option<String>,
    },
    Array(Vec<PlistValue>),
}

struct TreeBuilder {
    stack: Vec<Container>,
    root: Option<PlistValue>,
}

impl TreeBuilder {
    fn insert(&mut self, value: PlistValue) -> Result<()> {
        match self.stack.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(UnpackError::descriptor("plist has more than one root value"));
                }
                self.root = Some(value);
            }
            Some(Container::Dict {
                entries,
                pending_key,
            }) => {
                let key = pending_key
                    .take()
                    .ok_or_else(|| UnpackError::descriptor("dict value without a preceding <key>"))?;
                entries.push((key, value));
            }
            Some(Container::Array(items)) => items.push(value),
        }
        Ok(())
    }

    fn set_key(&mut self, key: String) -> Result<()> {
        match self.stack.last_mut() {
            Some(Container::Dict { pending_key, .. }) => {
                if pending_key.is_some() {
                    return Err(UnpackError::descriptor(format!(
                        "<key>{key}</key> follows another key without a value"
                    )));
                }
                *pending_key = Some(key);
                Ok(())
            }
            _ => Err(UnpackError::descriptor("<key> outside of a <dict>")),
        }
    }

    fn close(&mut self) -> Result<()> {
        let value = match self.stack.pop() {
            Some(Container::Dict {
                entries,
                pending_key,
            }) => {
                if let Some(k) = pending_key {
                    return Err(UnpackError::descriptor(format!("key '{k}' has no value")));
                }
                PlistValue::Dict(entries)
            }
            Some(Container::Array(items)) => PlistValue::Array(items),
            None => return Err(UnpackError::descriptor("unbalanced closing tag")),
        };
        self.insert(value)
    }
}

/// Parse a property list (binary `bplist00` or XML) into a value tree.
pub fn parse(bytes: &[u8]) -> Result<PlistValue> {
    if bytes.starts_with(binary::MAGIC) {
        return binary::parse(bytes);
    }
    if bytes.starts_with(b"bplist") {
        return Err(UnpackError::descriptor(format!(
            "unsupported binary property list version '{}'",
            String::from_utf8_lossy(&bytes[6..bytes.len().min(8)])
        )));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| UnpackError::descriptor(format!("descriptor is not UTF-8: {e}")))?;
    parse_str(text.trim_start_matches('\u{feff}'))
}

/// Parse XML property-list text into a value tree.
pub fn parse_str(xml: &str) -> Result<PlistValue> {
    let mut reader = Reader::from_str(xml);

    let mut tree = TreeBuilder {
        stack: Vec::new(),
        root: None,
    };
    // Scalar element being read and its accumulated text.
    let mut scalar: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match tag.as_str() {
                    "plist" => {}
                    "dict" => tree.stack.push(Container::Dict {
                        entries: Vec::new(),
                        pending_key: None,
                    }),
                    "array" => tree.stack.push(Container::Array(Vec::new())),
                    "key" | "string" | "integer" | "real" | "data" | "date" | "true" | "false" => {
                        if scalar.is_some() {
                            return Err(UnpackError::descriptor(format!("<{tag}> nested inside a scalar")));
                        }
                        scalar = Some(tag);
                        text.clear();
                    }
                    other => {
                        return Err(UnpackError::descriptor(format!("unexpected element <{other}>")));
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match tag.as_str() {
                    "plist" => {}
                    "true" => tree.insert(PlistValue::Bool(true))?,
                    "false" => tree.insert(PlistValue::Bool(false))?,
                    "dict" => tree.insert(PlistValue::Dict(Vec::new()))?,
                    "array" => tree.insert(PlistValue::Array(Vec::new()))?,
                    "string" => tree.insert(PlistValue::String(String::new()))?,
                    "data" => tree.insert(PlistValue::Data(String::new()))?,
                    "key" => tree.set_key(String::new())?,
                    other => {
                        return Err(UnpackError::descriptor(format!("unexpected element <{other}/>")));
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if scalar.is_some() {
                    let t = e
                        .unescape()
                        .map_err(|e| UnpackError::descriptor(format!("bad XML text: {e}")))?;
                    text.push_str(&t);
                }
            }
            Ok(Event::CData(e)) => {
                if scalar.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match tag.as_str() {
                    "plist" => {}
                    "dict" | "array" => tree.close()?,
                    _ => {
                        if scalar.as_deref() != Some(tag.as_str()) {
                            return Err(UnpackError::descriptor(format!("unexpected </{tag}>")));
                        }
                        scalar = None;
                        let raw = std::mem::take(&mut text);
                        match tag.as_str() {
                            "key" => tree.set_key(raw)?,
                            "string" => tree.insert(PlistValue::String(raw))?,
                            "integer" => {
                                let v = parse_integer(raw.trim()).ok_or_else(|| {
                                    UnpackError::descriptor(format!("bad <integer> '{raw}'"))
                                })?;
                                tree.insert(PlistValue::Integer(v))?
                            }
                            "real" => {
                                let v = raw.trim().parse::<f64>().map_err(|_| {
                                    UnpackError::descriptor(format!("bad <real> '{raw}'"))
                                })?;
                                tree.insert(PlistValue::Real(v))?
                            }
                            "data" => tree.insert(PlistValue::Data(
                                raw.chars().filter(|c| !c.is_whitespace()).collect(),
                            ))?,
                            "date" => tree.insert(PlistValue::Date(raw.trim().to_string()))?,
                            "true" => tree.insert(PlistValue::Bool(true))?,
                            "false" => tree.insert(PlistValue::Bool(false))?,
                            _ => unreachable!("scalar tags are filtered on open"),
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, doctype, comments, processing instructions
            Err(e) => {
                return Err(UnpackError::descriptor(format!(
                    "XML parse error at byte {}: {e}",
                    reader.error_position()
                )));
            }
        }
    }

    if !tree.stack.is_empty() || scalar.is_some() {
        return Err(UnpackError::descriptor("unexpected end of document"));
    }
    tree.root
        .ok_or_else(|| UnpackError::descriptor("property list is empty"))
}

fn parse_integer(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
