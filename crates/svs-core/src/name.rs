//! Hierarchical NDN names.
//!
//! A [`Name`] is a sequence of typed [`Component`]s. Names order canonically:
//! component by component, where components compare by type, then value
//! length, then value bytes, and a proper prefix sorts before any longer
//! name that extends it.
//!
//! The URI form is `/a/b/seq=3`. Generic component values outside the
//! unreserved set `A-Z a-z 0-9 - . _ ~` are percent-escaped.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};
use crate::tlv::{self, types, TlvReader};

/// One typed name component.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Component {
    typ: u64,
    value: Bytes,
}

impl Component {
    /// Create a component of an arbitrary type.
    pub fn new(typ: u64, value: impl Into<Bytes>) -> Self {
        Self {
            typ,
            value: value.into(),
        }
    }

    /// Create a generic (type 0x08) component.
    pub fn generic(value: impl Into<Bytes>) -> Self {
        Self::new(types::GENERIC_COMPONENT, value)
    }

    /// Create a sequence-number (type 0x3A) component.
    pub fn sequence_number(seq: u64) -> Self {
        let mut value = Vec::with_capacity(tlv::nonneg_len(seq));
        tlv::write_nonneg(&mut value, seq);
        Self::new(types::SEQUENCE_NUM_COMPONENT, value)
    }

    pub fn typ(&self) -> u64 {
        self.typ
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The sequence number carried by this component, if it is one.
    ///
    /// Zero-padded values are not sequence numbers: they name a different
    /// component than [`sequence_number`](Self::sequence_number) would build.
    pub fn as_sequence_number(&self) -> Option<u64> {
        if self.typ != types::SEQUENCE_NUM_COMPONENT {
            return None;
        }
        tlv::read_nonneg_minimal(&self.value).ok()
    }

    /// Encoded size including type and length.
    pub fn encoded_len(&self) -> usize {
        tlv::tlv_len(self.typ, self.value.len())
    }

    /// Append the TLV encoding of this component.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        tlv::write_tlv(buf, self.typ, &self.value);
    }

    fn parse(segment: &str) -> Result<Self> {
        if let Some(rest) = segment.strip_prefix("seq=") {
            let seq = rest
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidName(format!("bad sequence number: {}", rest)))?;
            return Ok(Self::sequence_number(seq));
        }
        if let Some((typ, rest)) = segment.split_once('=') {
            if !typ.is_empty() && typ.bytes().all(|b| b.is_ascii_digit()) {
                let typ = typ
                    .parse::<u64>()
                    .map_err(|_| CoreError::InvalidName(format!("bad component type: {}", typ)))?;
                return Ok(Self::new(typ, unescape(rest)?));
            }
        }
        Ok(Self::generic(unescape(segment)?))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.typ
            .cmp(&other.typ)
            .then_with(|| self.value.len().cmp(&other.value.len()))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            types::GENERIC_COMPONENT => escape(f, &self.value),
            types::SEQUENCE_NUM_COMPONENT => match self.as_sequence_number() {
                Some(seq) => write!(f, "seq={}", seq),
                None => {
                    write!(f, "{}=", self.typ)?;
                    escape(f, &self.value)
                }
            },
            typ => {
                write!(f, "{}=", typ)?;
                escape(f, &self.value)
            }
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self)
    }
}

/// A hierarchical name.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Vec<Component>);

impl Name {
    /// The empty name `/`.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_components(components: Vec<Component>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.0.get(index)
    }

    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    pub fn push(&mut self, component: Component) {
        self.0.push(component);
    }

    /// A copy of this name with `component` appended.
    pub fn with(&self, component: Component) -> Self {
        let mut name = self.clone();
        name.push(component);
        name
    }

    /// A copy of this name with every component of `suffix` appended.
    pub fn join(&self, suffix: &Name) -> Self {
        let mut components = Vec::with_capacity(self.len() + suffix.len());
        components.extend_from_slice(&self.0);
        components.extend_from_slice(&suffix.0);
        Self(components)
    }

    /// Whether every component of `self` matches the start of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    fn value_len(&self) -> usize {
        self.0.iter().map(Component::encoded_len).sum()
    }

    /// Encoded size of the Name TLV.
    pub fn encoded_len(&self) -> usize {
        tlv::tlv_len(types::NAME, self.value_len())
    }

    /// Append the Name TLV (type 0x07) to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        tlv::write_header(buf, types::NAME, self.value_len());
        for component in &self.0 {
            component.encode_into(buf);
        }
    }

    /// The Name TLV as a standalone buffer.
    ///
    /// This is also the storage key for packets published under the name.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a complete Name TLV.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let value = tlv::expect_tlv(bytes, &mut pos, types::NAME)?;
        if pos != bytes.len() {
            return Err(CoreError::TrailingBytes(bytes.len() - pos));
        }
        Self::decode_value(value)
    }

    /// Decode the value portion of a Name TLV (the concatenated components).
    pub fn decode_value(value: &[u8]) -> Result<Self> {
        let components = TlvReader::new(value)
            .map(|item| item.map(|(typ, bytes)| Component::new(typ, Bytes::copy_from_slice(bytes))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(components))
    }
}

impl FromStr for Name {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix("ndn:").unwrap_or(s);
        let components = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(Component::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(components))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for component in &self.0 {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl From<Vec<Component>> for Name {
    fn from(components: Vec<Component>) -> Self {
        Self(components)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn escape(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    // Values made only of periods gain three extra periods so that "." and
    // ".." never appear as path segments.
    if value.iter().all(|&b| b == b'.') {
        for _ in 0..value.len() + 3 {
            f.write_str(".")?;
        }
        return Ok(());
    }
    for &b in value {
        if is_unreserved(b) {
            write!(f, "{}", b as char)?;
        } else {
            write!(f, "%{:02X}", b)?;
        }
    }
    Ok(())
}

fn unescape(segment: &str) -> Result<Vec<u8>> {
    if !segment.is_empty() && segment.bytes().all(|b| b == b'.') {
        if segment.len() < 3 {
            return Err(CoreError::InvalidName(format!(
                "relative segment not allowed: {}",
                segment
            )));
        }
        return Ok(vec![b'.'; segment.len() - 3]);
    }

    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex_digits = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| CoreError::InvalidName(format!("truncated escape in {}", segment)))?;
            let decoded = hex::decode(hex_digits)
                .map_err(|_| CoreError::InvalidName(format!("bad escape in {}", segment)))?;
            out.extend_from_slice(&decoded);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}
