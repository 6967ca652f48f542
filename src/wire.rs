//! Protocol Tag Framing
//!
//! Every outbound payload is prefixed with the sending multiplexer's tag so
//! the receiving fabric can demultiplex it. Receivers for different tags
//! are independent multiplexer instances.
//!
//! ## Frame Layout
//!
//! ```text
//! [tag: N bytes UTF-8][0x00][payload]
//! ```

use std::fmt;
use thiserror::Error;

/// Terminator between the tag and the payload.
pub const TAG_TERMINATOR: u8 = 0x00;

/// Maximum tag length in bytes, excluding the terminator.
pub const MAX_TAG_LEN: usize = 255;

/// Errors from constructing a protocol tag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("protocol tag is empty")]
    Empty,

    #[error("protocol tag too long: {0} bytes")]
    TooLong(usize),

    #[error("protocol tag contains a NUL byte")]
    ContainsNul,
}

/// A protocol tag identifying one multiplexed channel.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProtocolTag {
    name: String,
    /// Encoded prefix: name bytes plus terminator.
    prefix: Vec<u8>,
}

impl ProtocolTag {
    /// Create a tag from its name.
    pub fn new(name: impl Into<String>) -> Result<Self, TagError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TagError::Empty);
        }
        if name.len() > MAX_TAG_LEN {
            return Err(TagError::TooLong(name.len()));
        }
        if name.as_bytes().contains(&TAG_TERMINATOR) {
            return Err(TagError::ContainsNul);
        }
        let mut prefix = Vec::with_capacity(name.len() + 1);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(TAG_TERMINATOR);
        Ok(Self { name, prefix })
    }

    /// The tag's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encoded prefix length.
    pub fn prefix_len(&self) -> usize {
        self.prefix.len()
    }

    /// Prepend the tag to a payload.
    pub fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + payload.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(payload);
        out
    }

    /// Check whether a frame carries this tag.
    pub fn matches(&self, frame: &[u8]) -> bool {
        frame.starts_with(&self.prefix)
    }

    /// Strip the tag, returning the payload if the frame carries this tag.
    pub fn strip<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        frame.strip_prefix(self.prefix.as_slice())
    }
}

impl fmt::Debug for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolTag({:?})", self.name)
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let tag = ProtocolTag::new("ipop").unwrap();
        let frame = tag.frame(b"hello");
        assert_eq!(&frame[..5], b"ipop\0");
        assert_eq!(&frame[5..], b"hello");
        assert_eq!(tag.prefix_len(), 5);
    }

    #[test]
    fn test_strip() {
        let tag = ProtocolTag::new("ipop").unwrap();
        assert_eq!(tag.strip(&tag.frame(b"data")), Some(&b"data"[..]));
        assert_eq!(tag.strip(&tag.frame(b"")), Some(&b""[..]));
    }

    #[test]
    fn test_strip_rejects_other_tags() {
        let tag = ProtocolTag::new("ipop").unwrap();
        let other = ProtocolTag::new("ipopx").unwrap();
        assert!(!tag.matches(&other.frame(b"data")));
        assert_eq!(tag.strip(&other.frame(b"data")), None);
        assert_eq!(tag.strip(b"ipop"), None);
    }

    #[test]
    fn test_invalid_tags() {
        assert_eq!(ProtocolTag::new(""), Err(TagError::Empty));
        assert_eq!(ProtocolTag::new("a\0b"), Err(TagError::ContainsNul));
        assert_eq!(
            ProtocolTag::new("x".repeat(300)),
            Err(TagError::TooLong(300))
        );
    }
}
