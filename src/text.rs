//! Fixed-width, always NUL-terminated text fields.
//!
//! Instruction records keep their mnemonic and operand text inline so that the
//! record layout stays fixed. A `BoundedStr<N>` holds at most `N - 1` bytes of
//! UTF-8 followed by a terminating NUL.

use std::fmt;

use serde::{Serialize, Serializer};

/// Inline text buffer of `N` bytes, the last of which is always a NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct BoundedStr<const N: usize> {
    buf: [u8; N],
    len: u16,
}

impl<const N: usize> BoundedStr<N> {
    /// Maximum number of text bytes this field can hold.
    pub const CAPACITY: usize = N - 1;

    /// An empty field.
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    /// Build a field from `s`, truncating at a character boundary if needed.
    pub fn from_str_truncated(s: &str) -> Self {
        let mut out = Self::new();
        out.set(s);
        out
    }

    /// Replace the contents with `s`, truncating at a character boundary.
    ///
    /// Returns `true` if the whole of `s` fit.
    pub fn set(&mut self, s: &str) -> bool {
        let cut = floor_char_boundary(s, Self::CAPACITY);
        self.buf[..cut].copy_from_slice(&s.as_bytes()[..cut]);
        self.buf[cut..].fill(0);
        self.len = cut as u16;
        cut == s.len()
    }

    /// Append `s` only if it fits entirely.
    ///
    /// Returns `false` and leaves the field untouched when it does not.
    pub fn try_push_str(&mut self, s: &str) -> bool {
        let len = self.len();
        if len + s.len() > Self::CAPACITY {
            return false;
        }
        self.buf[len..len + s.len()].copy_from_slice(s.as_bytes());
        self.len = (len + s.len()) as u16;
        true
    }

    /// Empty the field.
    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.len = 0;
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from `&str` cut at a char boundary.
        std::str::from_utf8(&self.buf[..self.len()]).unwrap_or_default()
    }

    /// The text followed by its terminating NUL, as laid out in memory.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len()]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for BoundedStr<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Display for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> PartialEq<&str> for BoundedStr<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> PartialEq<str> for BoundedStr<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> Serialize for BoundedStr<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Largest index `<= max` that lies on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_within_capacity() {
        let mut s = BoundedStr::<8>::new();
        assert!(s.set("mov"));
        assert_eq!(s, "mov");
        assert_eq!(s.as_bytes_with_nul(), b"mov\0");
    }

    #[test]
    fn test_truncation_keeps_terminator() {
        let s = BoundedStr::<4>::from_str_truncated("abcdef");
        assert_eq!(s.as_str(), "abc");
        assert_eq!(s.len(), BoundedStr::<4>::CAPACITY);
        assert_eq!(s.as_bytes_with_nul(), b"abc\0");
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 'é' is two bytes wide
        let s = BoundedStr::<4>::from_str_truncated("aéé");
        assert_eq!(s.as_str(), "aé");
        let s = BoundedStr::<3>::from_str_truncated("aéé");
        assert_eq!(s.as_str(), "a");
    }

    #[test]
    fn test_try_push_str_all_or_nothing() {
        let mut s = BoundedStr::<6>::new();
        assert!(s.try_push_str("0x1"));
        assert!(!s.try_push_str(", 0x2"));
        assert_eq!(s, "0x1");
        assert!(s.try_push_str("ab"));
        assert_eq!(s, "0x1ab");
    }

    #[test]
    fn test_set_shorter_clears_tail() {
        let mut s = BoundedStr::<8>::from_str_truncated("abcdef");
        s.set("xy");
        assert_eq!(s.as_bytes_with_nul(), b"xy\0");
        s.clear();
        assert!(s.is_empty());
    }
}
