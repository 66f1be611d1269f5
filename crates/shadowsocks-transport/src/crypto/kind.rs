//! Cipher registry

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::CipherError;

const CIPHER_AES_128_GCM: &str = "aes-128-gcm";
const CIPHER_AES_256_GCM: &str = "aes-256-gcm";
const CIPHER_CHACHA20_IETF_POLY1305: &str = "chacha20-ietf-poly1305";
const CIPHER_XCHACHA20_IETF_POLY1305: &str = "xchacha20-ietf-poly1305";

/// AEAD cipher methods supported by the datagram transport
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CipherKind {
    AES_128_GCM,
    AES_256_GCM,
    CHACHA20_POLY1305,
    XCHACHA20_POLY1305,
}

impl CipherKind {
    /// All registered methods
    pub const ALL: [CipherKind; 4] = [
        CipherKind::AES_128_GCM,
        CipherKind::AES_256_GCM,
        CipherKind::CHACHA20_POLY1305,
        CipherKind::XCHACHA20_POLY1305,
    ];

    /// Method name used in configurations
    pub fn name(self) -> &'static str {
        match self {
            CipherKind::AES_128_GCM => CIPHER_AES_128_GCM,
            CipherKind::AES_256_GCM => CIPHER_AES_256_GCM,
            CipherKind::CHACHA20_POLY1305 => CIPHER_CHACHA20_IETF_POLY1305,
            CipherKind::XCHACHA20_POLY1305 => CIPHER_XCHACHA20_IETF_POLY1305,
        }
    }

    /// Length of the pre-shared master key
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::AES_128_GCM => 16,
            CipherKind::AES_256_GCM | CipherKind::CHACHA20_POLY1305 | CipherKind::XCHACHA20_POLY1305 => 32,
        }
    }

    /// Length of the per-packet salt
    ///
    /// SIP004: the salt is at least 128 bits and never shorter than the key.
    pub fn salt_len(self) -> usize {
        self.key_len().max(16)
    }

    /// Length of the AEAD nonce
    pub fn nonce_len(self) -> usize {
        match self {
            CipherKind::AES_128_GCM | CipherKind::AES_256_GCM | CipherKind::CHACHA20_POLY1305 => 12,
            CipherKind::XCHACHA20_POLY1305 => 24,
        }
    }

    /// Length of the authentication tag appended to every ciphertext
    pub fn tag_len(self) -> usize {
        16
    }
}

impl Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<CipherKind, CipherError> {
        match s {
            CIPHER_AES_128_GCM => Ok(CipherKind::AES_128_GCM),
            CIPHER_AES_256_GCM => Ok(CipherKind::AES_256_GCM),
            // Aliases from the go-shadowsocks2 flavored configurations
            CIPHER_CHACHA20_IETF_POLY1305 | "chacha20-poly1305" => Ok(CipherKind::CHACHA20_POLY1305),
            CIPHER_XCHACHA20_IETF_POLY1305 | "xchacha20-poly1305" => Ok(CipherKind::XCHACHA20_POLY1305),
            _ => Err(CipherError::UnknownMethod(s.to_owned())),
        }
    }
}

impl Serialize for CipherKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CipherKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}
