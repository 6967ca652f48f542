//! Overlay Addresses
//!
//! 16-byte identifiers for a node's position in the overlay address space.
//! Addresses are opaque to this crate: they are compared, hashed, and
//! carried around, never interpreted.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Optional URI prefix accepted when parsing an address.
pub const ADDRESS_URI_PREFIX: &str = "overlay:";

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 16;

/// Errors produced when decoding an overlay address.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressError {
    #[error("invalid address length: expected 16, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A node identifier in the overlay address space.
///
/// Immutable once created. Ordering is bytewise, which makes addresses
/// usable as deterministic tie-breakers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayAddr([u8; ADDRESS_LEN]);

impl OverlayAddr {
    /// Create an address from a 16-byte array.
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Create an address from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        if slice.len() != ADDRESS_LEN {
            return Err(AddressError::InvalidLength(slice.len()));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derive an address from arbitrary identity material.
    ///
    /// Computes SHA-256(material) and keeps the first 16 bytes.
    pub fn derive(material: &[u8]) -> Self {
        let hash = Sha256::digest(material);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&hash[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Generate a uniformly random address.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Render as a URI (`overlay:<hex>`).
    pub fn to_uri(&self) -> String {
        format!("{}{}", ADDRESS_URI_PREFIX, self)
    }
}

impl FromStr for OverlayAddr {
    type Err = AddressError;

    /// Parse the bare hex form or the `overlay:` URI form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex_part = s.strip_prefix(ADDRESS_URI_PREFIX).unwrap_or(s);
        let bytes = hex::decode(hex_part)?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for OverlayAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverlayAddr({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for OverlayAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for OverlayAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
