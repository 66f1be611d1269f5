//! AEAD ciphers keyed with per-salt session keys

use std::fmt;

use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes128Gcm, Aes256Gcm,
};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use hkdf::Hkdf;
use sha1::Sha1;

use super::{Aead, Cipher, CipherError, CipherKind, CipherResult};

const SUBKEY_INFO: &[u8] = b"ss-subkey";
const MAX_KEY_LEN: usize = 32;

/// Shadowsocks AEAD cipher suite
///
/// ## Session key (SIP007)
///
/// Every salt yields its own subkey derived from the pre-shared master key:
///
/// ```plain
/// subkey = HKDF_SHA1(key, salt, "ss-subkey")
/// ```
///
/// HKDF is a PRF, so distinct salts produce independent subkeys, which makes a fixed nonce safe.
#[derive(Clone)]
pub struct AeadCipher {
    kind: CipherKind,
    key: Box<[u8]>,
}

impl fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AeadCipher").field("kind", &self.kind).finish()
    }
}

impl AeadCipher {
    /// Create a suite from a raw pre-shared key
    pub fn new(kind: CipherKind, key: &[u8]) -> CipherResult<AeadCipher> {
        if key.len() != kind.key_len() {
            return Err(CipherError::InvalidKeyLength(kind.key_len(), key.len()));
        }

        Ok(AeadCipher {
            kind,
            key: key.to_vec().into_boxed_slice(),
        })
    }

    /// Method of this suite
    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    fn session(&self, salt: &[u8]) -> CipherResult<SaltedAead> {
        let salt_len = self.kind.salt_len();
        if salt.len() != salt_len {
            return Err(CipherError::InvalidSaltLength(salt_len, salt.len()));
        }

        let key_len = self.kind.key_len();
        let mut skey = [0u8; MAX_KEY_LEN];
        let skey = &mut skey[..key_len];

        let hkdf = Hkdf::<Sha1>::new(Some(salt), &self.key);
        hkdf.expand(SUBKEY_INFO, skey)
            .map_err(|_| CipherError::InvalidKeyLength(key_len, self.key.len()))?;

        let aead = SaltedAead::new(self.kind, skey);
        skey.fill(0);
        aead
    }
}

impl Cipher for AeadCipher {
    type Aead = SaltedAead;

    fn salt_size(&self) -> usize {
        self.kind.salt_len()
    }

    fn encrypter(&self, salt: &[u8]) -> CipherResult<SaltedAead> {
        self.session(salt)
    }

    fn decrypter(&self, salt: &[u8]) -> CipherResult<SaltedAead> {
        self.session(salt)
    }
}

/// AEAD instance holding one session subkey
pub enum SaltedAead {
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
    ChaCha20Poly1305(ChaCha20Poly1305),
    XChaCha20Poly1305(XChaCha20Poly1305),
}

impl SaltedAead {
    fn new(kind: CipherKind, skey: &[u8]) -> CipherResult<SaltedAead> {
        let invalid = |_| CipherError::InvalidKeyLength(kind.key_len(), skey.len());

        Ok(match kind {
            CipherKind::AES_128_GCM => SaltedAead::Aes128Gcm(Aes128Gcm::new_from_slice(skey).map_err(invalid)?),
            CipherKind::AES_256_GCM => SaltedAead::Aes256Gcm(Aes256Gcm::new_from_slice(skey).map_err(invalid)?),
            CipherKind::CHACHA20_POLY1305 => {
                SaltedAead::ChaCha20Poly1305(ChaCha20Poly1305::new_from_slice(skey).map_err(invalid)?)
            }
            CipherKind::XCHACHA20_POLY1305 => {
                SaltedAead::XChaCha20Poly1305(XChaCha20Poly1305::new_from_slice(skey).map_err(invalid)?)
            }
        })
    }

    fn kind(&self) -> CipherKind {
        match *self {
            SaltedAead::Aes128Gcm(..) => CipherKind::AES_128_GCM,
            SaltedAead::Aes256Gcm(..) => CipherKind::AES_256_GCM,
            SaltedAead::ChaCha20Poly1305(..) => CipherKind::CHACHA20_POLY1305,
            SaltedAead::XChaCha20Poly1305(..) => CipherKind::XCHACHA20_POLY1305,
        }
    }

    fn check_nonce(&self, nonce: &[u8]) -> CipherResult<()> {
        let nonce_len = self.nonce_size();
        if nonce.len() != nonce_len {
            return Err(CipherError::InvalidNonceLength(nonce_len, nonce.len()));
        }
        Ok(())
    }
}

macro_rules! dispatch_aead {
    ($aead:expr, $cipher:ident => $body:expr) => {
        match $aead {
            SaltedAead::Aes128Gcm($cipher) => $body,
            SaltedAead::Aes256Gcm($cipher) => $body,
            SaltedAead::ChaCha20Poly1305($cipher) => $body,
            SaltedAead::XChaCha20Poly1305($cipher) => $body,
        }
    };
}

impl Aead for SaltedAead {
    fn nonce_size(&self) -> usize {
        self.kind().nonce_len()
    }

    fn overhead(&self) -> usize {
        self.kind().tag_len()
    }

    fn seal_in_place(&self, nonce: &[u8], aad: &[u8], buf: &mut [u8]) -> CipherResult<()> {
        self.check_nonce(nonce)?;

        let tag_len = self.overhead();
        if buf.len() < tag_len {
            return Err(CipherError::EncryptFailed);
        }

        let (data, tag_out) = buf.split_at_mut(buf.len() - tag_len);
        let tag = dispatch_aead!(self, c => c
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, data)
            .map_err(|_| CipherError::EncryptFailed)?);
        tag_out.copy_from_slice(&tag);

        Ok(())
    }

    fn open_in_place(&self, nonce: &[u8], aad: &[u8], buf: &mut [u8], tag: &[u8]) -> CipherResult<()> {
        self.check_nonce(nonce)?;

        if tag.len() != self.overhead() {
            return Err(CipherError::DecryptFailed);
        }

        dispatch_aead!(self, c => c
            .decrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf, GenericArray::from_slice(tag))
            .map_err(|_| CipherError::DecryptFailed))
    }
}
