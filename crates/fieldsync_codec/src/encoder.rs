//! Payload encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;
const FLOAT64: u8 = 0xfb;

/// Which rules the encoder applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    /// Keep the value exactly as given. Never fails.
    Faithful,
    /// Sort map keys and reject values without a single canonical form.
    Canonical,
}

/// Encodes `value` faithfully, preserving map order and any damage.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut encoder = Encoder::new(EncodingMode::Faithful);
    // Faithful mode has no failure paths.
    let _ = encoder.encode(value);
    encoder.into_bytes()
}

/// Encodes `value` in canonical form.
///
/// Two values that differ only in map insertion order produce identical
/// bytes.
///
/// # Errors
///
/// Returns [`CodecError::DuplicateKey`] if a map repeats a key, or
/// [`CodecError::NonFiniteFloat`] for NaN and infinities.
pub fn canonicalize(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = Encoder::new(EncodingMode::Canonical);
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A payload encoder writing into an owned buffer.
pub struct Encoder {
    buffer: Vec<u8>,
    mode: EncodingMode,
}

impl Encoder {
    /// Create a new encoder.
    pub fn new(mode: EncodingMode) -> Self {
        Self {
            buffer: Vec::new(),
            mode,
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(SIMPLE_NULL),
            Value::Bool(b) => self.buffer.push(if *b { SIMPLE_TRUE } else { SIMPLE_FALSE }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f)?,
            Value::Text(s) => {
                self.write_head(MAJOR_TEXT, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                self.write_head(MAJOR_BYTES, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Array(items) => {
                self.write_head(MAJOR_ARRAY, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(entries) => self.encode_map(entries)?,
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.write_head(MAJOR_UNSIGNED, n as u64);
        } else {
            // -1 is stored as 0, -2 as 1, ...
            self.write_head(MAJOR_NEGATIVE, (-(n + 1)) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        let f = match self.mode {
            EncodingMode::Faithful => f,
            EncodingMode::Canonical if !f.is_finite() => return Err(CodecError::NonFiniteFloat),
            // -0.0 == 0.0, so both must hash the same
            EncodingMode::Canonical if f == 0.0 => 0.0,
            EncodingMode::Canonical => f,
        };
        self.buffer.push(FLOAT64);
        self.buffer.extend_from_slice(&f.to_bits().to_be_bytes());
        Ok(())
    }

    fn encode_map(&mut self, entries: &[(String, Value)]) -> CodecResult<()> {
        self.write_head(MAJOR_MAP, entries.len() as u64);

        if self.mode == EncodingMode::Faithful {
            for (key, value) in entries {
                self.write_head(MAJOR_TEXT, key.len() as u64);
                self.buffer.extend_from_slice(key.as_bytes());
                self.encode(value)?;
            }
            return Ok(());
        }

        let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
        sorted.sort_by(|a, b| canonical_key_order(&a.0, &b.0));

        if let Some(pair) = sorted.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(CodecError::DuplicateKey {
                key: pair[0].0.clone(),
            });
        }

        for (key, value) in sorted {
            self.write_head(MAJOR_TEXT, key.len() as u64);
            self.buffer.extend_from_slice(key.as_bytes());
            self.encode(value)?;
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major: u8, arg: u64) {
        let mt = major << 5;
        if arg < 24 {
            self.buffer.push(mt | arg as u8);
        } else if arg <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(arg as u8);
        } else if arg <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(arg as u16).to_be_bytes());
        } else if arg <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(arg as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&arg.to_be_bytes());
        }
    }
}

/// Orders text keys the way their encodings sort: shorter first, then
/// bytewise.
fn canonical_key_order(a: &str, b: &str) -> Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.as_bytes().cmp(b.as_bytes()))
}
