//! Protocol versions and the handshake words that carry them.
//!
//! The handshake exchanges one `i32` in each direction that packs the
//! protocol version into the low 16 bits and the authentication mode into
//! the next nibble:
//!
//! ```text
//!  31            20 19    16 15                0
//! +----------------+--------+-------------------+
//! |   (reserved)   |  auth  |  protocol version |
//! +----------------+--------+-------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mask for the protocol version bits of a handshake word.
pub const VERSION_MASK: i32 = 0x0000_FFFF;

/// Mask for the authentication bits of a handshake word.
pub const AUTH_MASK: i32 = 0x000F_0000;

/// Mask for the transport encryption bits of a handshake word.
pub const CRYPT_MASK: i32 = 0x00F0_0000;

/// Negotiated protocol capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    pub const V1: ProtocolVersion = ProtocolVersion(0);
    pub const V2: ProtocolVersion = ProtocolVersion(1);
    /// Session-scoped prepared statements; CANCELED leaves the channel reusable.
    pub const V3: ProtocolVersion = ProtocolVersion(2);
    pub const V4: ProtocolVersion = ProtocolVersion(3);
    /// User management and authenticated sessions.
    pub const V5: ProtocolVersion = ProtocolVersion(4);
    pub const CURRENT: ProtocolVersion = ProtocolVersion::V5;

    /// Extracts the version from a handshake word.
    pub fn from_word(word: i32) -> Self {
        ProtocolVersion((word & VERSION_MASK) as u16)
    }

    pub fn at_least(self, other: ProtocolVersion) -> bool {
        self >= other
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", u32::from(self.0) + 1)
    }
}

/// Authentication mode carried in the handshake word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    None,
    Trust,
    #[default]
    Password,
}

impl AuthMode {
    pub fn bits(self) -> i32 {
        match self {
            AuthMode::None => 0,
            AuthMode::Trust => 0x0001_0000,
            AuthMode::Password => 0x0002_0000,
        }
    }

    /// Extracts the authentication mode from a handshake word. Unknown bit
    /// patterns read as [`AuthMode::None`].
    pub fn from_word(word: i32) -> Self {
        match word & AUTH_MASK {
            0x0001_0000 => AuthMode::Trust,
            0x0002_0000 => AuthMode::Password,
            _ => AuthMode::None,
        }
    }
}

/// Builds the handshake word a client sends on open.
pub fn handshake_word(version: ProtocolVersion, auth: AuthMode) -> i32 {
    (i32::from(version.0) & VERSION_MASK) | auth.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_word_packing() {
        let word = handshake_word(ProtocolVersion::V5, AuthMode::Password);
        assert_eq!(word, 0x0002_0004);
        assert_eq!(ProtocolVersion::from_word(word), ProtocolVersion::V5);
        assert_eq!(AuthMode::from_word(word), AuthMode::Password);
    }

    #[test]
    fn test_version_ordering() {
        assert!(ProtocolVersion::V5.at_least(ProtocolVersion::V3));
        assert!(!ProtocolVersion::V2.at_least(ProtocolVersion::V3));
        assert_eq!(ProtocolVersion::V3.to_string(), "v3");
    }

    #[test]
    fn test_auth_mode_from_unknown_bits() {
        assert_eq!(AuthMode::from_word(0x0007_0000), AuthMode::None);
        assert_eq!(AuthMode::from_word(0x0001_0003), AuthMode::Trust);
    }
}
