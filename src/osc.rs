//! OSC 1.0 message codec.
//!
//! Only what PolyNodes speaks: one address, `i` (int32) and `f` (float32)
//! arguments, big-endian, every string NUL-terminated and padded to four
//! bytes. Bundles are not produced or accepted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OscError;
use crate::registry::NumericValue;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// Wire type of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscType {
    Int,
    Float,
}

impl OscType {
    pub fn tag(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Float => 'f',
        }
    }
}

/// One encoded argument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OscArg {
    Int(i32),
    Float(f32),
}

impl OscArg {
    pub fn osc_type(&self) -> OscType {
        match self {
            Self::Int(_) => OscType::Int,
            Self::Float(_) => OscType::Float,
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v:?}"),
        }
    }
}

/// Literal conversion used by the raw passthrough: the value keeps the kind
/// it was given.
impl TryFrom<NumericValue> for OscArg {
    type Error = OscError;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(value: NumericValue) -> Result<Self, Self::Error> {
        match value {
            NumericValue::Bool(b) => Ok(Self::Int(i32::from(b))),
            NumericValue::Integer(i) => i32::try_from(i)
                .map(Self::Int)
                .map_err(|_| OscError::IntegerOverflow { value: i }),
            NumericValue::Float(v) => {
                let narrowed = v as f32;
                if v.is_finite() && narrowed.is_finite() {
                    Ok(Self::Float(narrowed))
                } else {
                    Err(OscError::NonFiniteFloat { value: v })
                }
            }
        }
    }
}

/// An address plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Type tag string including the leading comma, e.g. `,iff`.
    pub fn type_tags(&self) -> String {
        std::iter::once(',')
            .chain(self.args.iter().map(|a| a.osc_type().tag()))
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, OscError> {
        validate_address(&self.address)?;

        let tags = self.type_tags();
        let size = padded_len(self.address.len()) + padded_len(tags.len()) + 4 * self.args.len();
        if size > MAX_DATAGRAM {
            return Err(OscError::TooLarge {
                size,
                max: MAX_DATAGRAM,
            });
        }

        let mut buf = Vec::with_capacity(size);
        write_padded(&mut buf, &self.address);
        write_padded(&mut buf, &tags);
        for arg in &self.args {
            match arg {
                OscArg::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
                OscArg::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            }
        }
        Ok(buf)
    }

    pub fn decode(packet: &[u8]) -> Result<Self, OscError> {
        let mut reader = Reader { buf: packet, pos: 0 };
        if packet.starts_with(b"#bundle") {
            return Err(OscError::Malformed {
                reason: "bundles are not supported",
            });
        }
        let address = reader.string()?;
        validate_address(&address)?;

        // A missing tag string is legal in old OSC and means "no arguments".
        if reader.is_done() {
            return Ok(Self::new(address, Vec::new()));
        }
        let tags = reader.string()?;
        let Some(tags) = tags.strip_prefix(',') else {
            return Err(OscError::Malformed {
                reason: "type tag string must start with ','",
            });
        };

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let word = reader.word()?;
            args.push(match tag {
                'i' => OscArg::Int(i32::from_be_bytes(word)),
                'f' => OscArg::Float(f32::from_be_bytes(word)),
                other => return Err(OscError::UnsupportedTag { tag: other }),
            });
        }
        if !reader.is_done() {
            return Err(OscError::Malformed {
                reason: "trailing bytes after arguments",
            });
        }
        Ok(Self::new(address, args))
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.type_tags())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Check that `address` is something an OSC receiver will route.
pub fn validate_address(address: &str) -> Result<(), OscError> {
    let reject = |reason| {
        Err(OscError::InvalidAddress {
            address: address.to_string(),
            reason,
        })
    };
    if address.is_empty() {
        return reject("empty");
    }
    if !address.starts_with('/') {
        return reject("must start with '/'");
    }
    if !address.is_ascii() {
        return reject("must be ASCII");
    }
    if address.bytes().any(|b| b == 0 || b.is_ascii_whitespace() || b.is_ascii_control()) {
        return reject("contains whitespace or control characters");
    }
    Ok(())
}

/// Length of a string once NUL-terminated and padded to a multiple of four.
fn padded_len(len: usize) -> usize {
    (len / 4 + 1) * 4
}

fn write_padded(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.resize(buf.len() + padded_len(s.len()) - s.len(), 0);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn string(&mut self) -> Result<String, OscError> {
        let rest = self.buf.get(self.pos..).unwrap_or_default();
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(OscError::Malformed {
                reason: "unterminated string",
            });
        };
        let end = self.pos + padded_len(nul);
        if end > self.buf.len() {
            return Err(OscError::Malformed {
                reason: "string padding runs past end of packet",
            });
        }
        let text = rest.get(..nul).unwrap_or_default();
        let s = std::str::from_utf8(text)
            .map_err(|_| OscError::Malformed {
                reason: "string is not UTF-8",
            })?
            .to_string();
        self.pos = end;
        Ok(s)
    }

    fn word(&mut self) -> Result<[u8; 4], OscError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .and_then(|s| <[u8; 4]>::try_from(s).ok())
            .ok_or(OscError::Malformed {
                reason: "argument runs past end of packet",
            })?;
        self.pos += 4;
        Ok(bytes)
    }
}
