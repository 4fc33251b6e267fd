//! Payload decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Largest byte or text length the decoder will allocate for.
const MAX_BYTES_LENGTH: u64 = 64 * 1024 * 1024;

/// Largest array or map element count the decoder will accept.
const MAX_CONTAINER_ELEMENTS: u64 = 1024 * 1024;

/// Deepest nesting of arrays and maps.
const MAX_DEPTH: usize = 128;

/// Decodes a single value occupying all of `bytes`.
///
/// Accepts both faithful and canonical encodings.
///
/// # Errors
///
/// Returns an error for truncated or malformed input, invalid UTF-8,
/// non-text map keys, or trailing bytes.
pub fn decode(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A decoder over a borrowed byte slice.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decode the next value.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::invalid_structure("integer out of range"))
            }
            1 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::invalid_structure("integer out of range"))
            }
            2 => {
                let len = self.read_length(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            3 => {
                let len = self.read_length(info, MAX_BYTES_LENGTH)?;
                self.read_text(len).map(Value::Text)
            }
            4 => {
                let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
                self.enter()?;
                let mut items = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                self.depth -= 1;
                Ok(Value::Array(items))
            }
            5 => {
                let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
                self.enter()?;
                let mut entries = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    let key = self.decode_key()?;
                    let value = self.decode()?;
                    entries.push((key, value));
                }
                self.depth -= 1;
                Ok(Value::Map(entries))
            }
            6 => Err(CodecError::invalid_structure("tags are not supported")),
            _ => self.decode_simple(info),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn enter(&mut self) -> CodecResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CodecError::TooDeep {
                max_depth: MAX_DEPTH,
            });
        }
        Ok(())
    }

    fn decode_key(&mut self) -> CodecResult<String> {
        let initial = self.read_byte()?;
        if initial >> 5 != 3 {
            return Err(CodecError::invalid_structure("map keys must be text"));
        }
        let len = self.read_length(initial & 0x1f, MAX_BYTES_LENGTH)?;
        self.read_text(len)
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            27 => {
                let bytes = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok(Value::Float(f64::from_bits(u64::from_be_bytes(raw))))
            }
            31 => Err(CodecError::IndefiniteLength),
            _ => Err(CodecError::invalid_structure(format!(
                "unsupported simple value {info}"
            ))),
        }
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_text(&mut self, len: usize) -> CodecResult<String> {
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_length(&mut self, info: u8, limit: u64) -> CodecResult<usize> {
        let len = self.read_argument(info)?;
        if len > limit {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: limit,
            });
        }
        Ok(len as usize)
    }

    /// Reads the argument that follows an initial byte, insisting on the
    /// shortest form so every value has exactly one encoding.
    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, floor) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_bytes(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_bytes(4)?;
                (
                    u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                    0x1_0000,
                )
            }
            27 => {
                let b = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (u64::from_be_bytes(raw), 0x1_0000_0000)
            }
            31 => return Err(CodecError::IndefiniteLength),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };

        if value < floor {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{canonicalize, encode};

    #[test]
    fn decodes_nested_payload() {
        let value = Value::map([
            ("name", Value::from("Dela Cruz")),
            ("members", Value::from(vec![Value::from(1), Value::from(-300)])),
            ("photo", Value::from(vec![0u8, 1, 2])),
            ("income", Value::from(1250.75)),
            ("verified", Value::Bool(true)),
            ("notes", Value::Null),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
        assert_eq!(
            decode(&canonicalize(&value).unwrap()).unwrap().get("income"),
            Some(&Value::Float(1250.75))
        );
    }

    #[test]
    fn duplicate_keys_survive_faithful_roundtrip() {
        let value = Value::Map(vec![
            ("k".into(), Value::Integer(1)),
            ("k".into(), Value::Integer(2)),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = encode(&Value::from("hello"));
        assert_eq!(
            decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::UnexpectedEof)
        );
        assert_eq!(decode(&[]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert_eq!(
            decode(&[0x01, 0x02]),
            Err(CodecError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn rejects_non_shortest_integer() {
        assert!(matches!(
            decode(&[0x18, 0x05]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn rejects_invalid_utf8_and_non_text_keys() {
        assert_eq!(decode(&[0x62, 0xff, 0xfe]), Err(CodecError::InvalidUtf8));
        assert!(matches!(
            decode(&[0xa1, 0x01, 0x01]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn rejects_oversized_length_claim() {
        assert!(matches!(
            decode(&[0x5b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn rejects_runaway_nesting() {
        let bytes = vec![0x81; MAX_DEPTH + 1];
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::TooDeep { .. })
        ));
    }
}
