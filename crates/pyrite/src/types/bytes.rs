//! Heap-allocated bytes payload.

use std::fmt::{self, Write};

/// A Python bytes object.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct Bytes(Vec<u8>);

impl Bytes {
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

/// Writes the repr of a bytes value (`b'...'` form).
pub(crate) fn bytes_repr_fmt(data: &[u8], f: &mut impl Write) -> fmt::Result {
    f.write_str("b'")?;
    for &byte in data {
        match byte {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            0x20..=0x7e => f.write_char(char::from(byte))?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    f.write_char('\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_escapes_non_printable() {
        let mut out = String::new();
        bytes_repr_fmt(b"a\x00'\xff", &mut out).unwrap();
        assert_eq!(out, "b'a\\x00\\'\\xff'");
    }
}
