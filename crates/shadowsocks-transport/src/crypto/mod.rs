//! Crypto methods for shadowsocks' datagram transport
//!
//! A [`Cipher`] is a suite bound to a pre-shared master key. Every packet carries a random salt, and the suite
//! derives a fresh [`Aead`] for that salt. Because no two salts share a subkey, the packet codec is allowed to
//! seal every packet with the same all-zero nonce.

use std::sync::Arc;

pub use self::{
    aead::{AeadCipher, SaltedAead},
    kind::CipherKind,
};

mod aead;
mod kind;

/// Cipher error
#[derive(thiserror::Error, Debug)]
pub enum CipherError {
    #[error("unsupported cipher method \"{0}\"")]
    UnknownMethod(String),
    #[error("invalid key length, expecting {0} bytes, but found {1} bytes")]
    InvalidKeyLength(usize, usize),
    #[error("invalid salt length, expecting {0} bytes, but found {1} bytes")]
    InvalidSaltLength(usize, usize),
    #[error("invalid nonce length, expecting {0} bytes, but found {1} bytes")]
    InvalidNonceLength(usize, usize),
    #[error("encrypt failed")]
    EncryptFailed,
    #[error("decrypt failed")]
    DecryptFailed,
}

/// Cipher result
pub type CipherResult<T> = Result<T, CipherError>;

/// An authenticated encryption instance keyed for exactly one salt
pub trait Aead {
    /// Length of the nonce this instance expects
    fn nonce_size(&self) -> usize;

    /// Number of bytes a ciphertext is longer than its plaintext
    fn overhead(&self) -> usize;

    /// Encrypt `buf` in place.
    ///
    /// ```plain
    /// +----------------------------------------+-----------------------+
    /// | PLAINTEXT -> CIPHERTEXT                | TAG (overhead() bytes)|
    /// +----------------------------------------+-----------------------+
    /// ```
    ///
    /// The trailing `overhead()` bytes of `buf` receive the tag; their previous content is ignored.
    fn seal_in_place(&self, nonce: &[u8], aad: &[u8], buf: &mut [u8]) -> CipherResult<()>;

    /// Decrypt `buf` in place and verify it against `tag`.
    ///
    /// On failure the content of `buf` is unspecified and must not be used.
    fn open_in_place(&self, nonce: &[u8], aad: &[u8], buf: &mut [u8], tag: &[u8]) -> CipherResult<()>;
}

/// A cipher suite bound to a pre-shared key
///
/// Implementations must derive an independent subkey for every distinct salt.
pub trait Cipher: Send + Sync {
    /// AEAD instance created for one salt
    type Aead: Aead;

    /// Length of the salt prefixed to every packet
    fn salt_size(&self) -> usize;

    /// Create an instance for sealing packets with `salt`
    fn encrypter(&self, salt: &[u8]) -> CipherResult<Self::Aead>;

    /// Create an instance for opening packets with `salt`
    fn decrypter(&self, salt: &[u8]) -> CipherResult<Self::Aead>;
}

impl<C: Cipher + ?Sized> Cipher for Arc<C> {
    type Aead = C::Aead;

    fn salt_size(&self) -> usize {
        (**self).salt_size()
    }

    fn encrypter(&self, salt: &[u8]) -> CipherResult<Self::Aead> {
        (**self).encrypter(salt)
    }

    fn decrypter(&self, salt: &[u8]) -> CipherResult<Self::Aead> {
        (**self).decrypter(salt)
    }
}
