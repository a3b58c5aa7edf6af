//! Primitive reads and modified UTF-8 text.
//!
//! All multi-byte values are big-endian. Strings use modified UTF-8: code
//! units are encoded as one, two or three byte groups, so the decoded form is
//! a sequence of UTF-16 code units that may contain unpaired surrogates.
//!
//! ## Encoding Overview
//!
//! - `0xxxxxxx`: one unit in `0x00..=0x7F`
//! - `110xxxxx 10xxxxxx`: one unit in `0x00..=0x7FF` (NUL is encoded this way)
//! - `1110xxxx 10xxxxxx 10xxxxxx`: one unit in `0x0000..=0xFFFF`

use super::ObjectInputStream;
use crate::error::{Error, Result};
use std::fmt;

/// Text decoded from modified UTF-8, kept as UTF-16 code units
///
/// Unpaired surrogates are preserved; [`Display`](fmt::Display) and
/// [`to_string_lossy`](JavaString::to_string_lossy) replace them with U+FFFD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JavaString {
    units: Vec<u16>,
}

impl JavaString {
    /// Wraps UTF-16 code units
    pub fn from_units(units: Vec<u16>) -> Self {
        Self { units }
    }

    /// The UTF-16 code units
    pub fn units(&self) -> &[u16] {
        &self.units
    }

    /// Number of UTF-16 code units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true for the empty string
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Converts to a `String`, failing on unpaired surrogates
    pub fn to_utf8(&self) -> Option<String> {
        String::from_utf16(&self.units).ok()
    }

    /// Converts to a `String`, replacing unpaired surrogates
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl fmt::Display for JavaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.units.iter().copied()) {
            fmt::Write::write_char(f, c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}

impl From<&str> for JavaString {
    fn from(s: &str) -> Self {
        Self::from_units(s.encode_utf16().collect())
    }
}

impl PartialEq<str> for JavaString {
    fn eq(&self, other: &str) -> bool {
        self.units.iter().copied().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for JavaString {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

/// Decode modified UTF-8 bytes into UTF-16 code units
///
/// On failure, the offset in the returned [`Error::MalformedUtf`] is the
/// position of the offending group within `bytes`.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let continuation = |i: usize| -> Result<u16> {
        match bytes.get(i) {
            Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
            _ => Err(Error::MalformedUtf { offset: i }),
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        let unit = match b >> 4 {
            0x0..=0x7 => {
                i += 1;
                b as u16
            }
            0xC | 0xD => {
                let low = continuation(i + 1).map_err(|_| Error::MalformedUtf { offset: i })?;
                i += 2;
                ((b & 0x1F) as u16) << 6 | low
            }
            0xE => {
                let mid = continuation(i + 1).map_err(|_| Error::MalformedUtf { offset: i })?;
                let low = continuation(i + 2).map_err(|_| Error::MalformedUtf { offset: i })?;
                i += 3;
                ((b & 0x0F) as u16) << 12 | mid << 6 | low
            }
            _ => return Err(Error::MalformedUtf { offset: i }),
        };
        units.push(unit);
    }
    Ok(units)
}

impl ObjectInputStream {
    /// Reads a `boolean`
    pub fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.read_fixed::<1>()?[0] != 0)
    }

    /// Reads a signed byte
    pub fn read_byte(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.read_fixed()?))
    }

    /// Reads an unsigned byte
    pub fn read_unsigned_byte(&mut self) -> Result<u8> {
        Ok(self.read_fixed::<1>()?[0])
    }

    /// Reads a UTF-16 code unit
    pub fn read_char(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_fixed()?))
    }

    /// Reads a signed 16-bit integer
    pub fn read_short(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_fixed()?))
    }

    /// Reads an unsigned 16-bit integer
    pub fn read_unsigned_short(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_fixed()?))
    }

    /// Reads a signed 32-bit integer
    pub fn read_int(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_fixed()?))
    }

    /// Reads a signed 64-bit integer
    pub fn read_long(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_fixed()?))
    }

    /// Reads an IEEE 754 single
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_fixed()?))
    }

    /// Reads an IEEE 754 double
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_fixed()?))
    }

    /// Reads a string with a 16-bit byte length
    pub fn read_utf(&mut self) -> Result<JavaString> {
        let len = self.read_unsigned_short()?;
        self.read_utf_body(len as usize)
    }

    /// Reads a string with a 64-bit byte length
    pub(crate) fn read_long_utf(&mut self) -> Result<JavaString> {
        let offset = self.offset;
        let len = self.read_long()?;
        let len = usize::try_from(len).map_err(|_| {
            Error::stream_corrupted(offset, format!("invalid long string length: {len}"))
        })?;
        self.read_utf_body(len)
    }

    fn read_utf_body(&mut self, len: usize) -> Result<JavaString> {
        let start = self.offset;
        let bytes = self.read_fully(len)?;
        let units = decode_modified_utf8(&bytes).map_err(|e| match e {
            Error::MalformedUtf { offset } => Error::MalformedUtf {
                offset: start + offset,
            },
            other => other,
        })?;
        Ok(JavaString::from_units(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_ascii_and_groups() {
        assert_eq!(decode_modified_utf8(b"AB").unwrap(), vec![0x41, 0x42]);
        // NUL in its two-byte form
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80]).unwrap(), vec![0]);
        // U+00E9 and U+20AC
        assert_eq!(
            decode_modified_utf8(&[0xC3, 0xA9, 0xE2, 0x82, 0xAC]).unwrap(),
            vec![0xE9, 0x20AC]
        );
    }

    #[test]
    fn test_decode_lone_surrogate() {
        let units = decode_modified_utf8(&[0xED, 0xA0, 0x80]).unwrap();
        assert_eq!(units, vec![0xD800]);
        let s = JavaString::from_units(units);
        assert_eq!(s.to_utf8(), None);
        assert_eq!(s.to_string(), "\u{FFFD}");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode_modified_utf8(&[b'A', 0xAA]),
            Err(Error::MalformedUtf { offset: 1 })
        ));
        assert!(matches!(
            decode_modified_utf8(&[0xE2, 0x82]),
            Err(Error::MalformedUtf { offset: 0 })
        ));
        assert!(matches!(
            decode_modified_utf8(&[0xC3, 0x41]),
            Err(Error::MalformedUtf { offset: 0 })
        ));
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        // Second byte of a three-byte group is not a continuation
        assert!(matches!(
            decode_modified_utf8(&[0xE2, 0x41, 0x80]),
            Err(Error::MalformedUtf { offset: 0 })
        ));
        assert!(matches!(
            decode_modified_utf8(&[b'x', 0xE2, 0x82, 0x41]),
            Err(Error::MalformedUtf { offset: 1 })
        ));
    }

    #[test]
    fn test_java_string_comparisons() {
        let s = JavaString::from("héllo");
        assert_eq!(s, "héllo");
        assert_eq!(s.len(), 5);
        assert_eq!(s.to_string_lossy(), "héllo");
    }

    #[test]
    fn test_read_primitives_raw() {
        let mut data = vec![0xAC, 0xED, 0x00, 0x05];
        data.extend_from_slice(&[0x77, 15, 0xFF, 0x00, 0x41, 0x3F, 0x80, 0x00, 0x00]);
        data.extend_from_slice(&[0x00, 0x02, b'h', b'i', 0x00, 0x00, 0x00, 0x07]);
        let mut s = ObjectInputStream::new(data).unwrap();

        assert_eq!(s.read_byte().unwrap(), -1);
        assert_eq!(s.read_char().unwrap(), 0x41);
        assert_eq!(s.read_float().unwrap(), 1.0);
        assert_eq!(s.read_utf().unwrap(), "hi");
        assert_eq!(s.read_int().unwrap(), 7);
        assert!(s.read_boolean().unwrap_err().is_eof());
    }

    #[test]
    fn test_read_primitive_boundaries() {
        let mut payload = Vec::new();
        for v in [0.0f64, -0.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        for v in [-0.0f32, f32::NEG_INFINITY, f32::NAN] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        for v in [i64::MIN, i64::MAX] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        for v in [i32::MIN, i32::MAX] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        for v in [i16::MIN, i16::MAX] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        payload.extend_from_slice(&[0xFF, 0xFF]);

        let mut data = vec![0xAC, 0xED, 0x00, 0x05, 0x77, payload.len() as u8];
        data.extend_from_slice(&payload);
        let mut s = ObjectInputStream::new(data).unwrap();

        let zero = s.read_double().unwrap();
        assert_eq!(zero, 0.0);
        assert!(zero.is_sign_positive());
        let negative_zero = s.read_double().unwrap();
        assert_eq!(negative_zero, 0.0);
        assert!(negative_zero.is_sign_negative());
        assert_eq!(s.read_double().unwrap(), f64::INFINITY);
        assert_eq!(s.read_double().unwrap(), f64::NEG_INFINITY);
        assert!(s.read_double().unwrap().is_nan());

        assert!(s.read_float().unwrap().is_sign_negative());
        assert_eq!(s.read_float().unwrap(), f32::NEG_INFINITY);
        assert!(s.read_float().unwrap().is_nan());

        assert_eq!(s.read_long().unwrap(), i64::MIN);
        assert_eq!(s.read_long().unwrap(), i64::MAX);
        assert_eq!(s.read_int().unwrap(), i32::MIN);
        assert_eq!(s.read_int().unwrap(), i32::MAX);
        assert_eq!(s.read_short().unwrap(), i16::MIN);
        assert_eq!(s.read_short().unwrap(), i16::MAX);
        assert_eq!(s.read_unsigned_short().unwrap(), u16::MAX);
        assert!(s.read_byte().unwrap_err().is_eof());
    }
}
