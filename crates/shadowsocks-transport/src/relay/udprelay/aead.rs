//! Shadowsocks UDP AEAD protocol
//!
//! Payload with AEAD cipher
//!
//! ```plain
//! UDP (after encryption, *ciphertext*)
//! +--------+-----------+-----------+
//! |  SALT  |  *Data*   |  Data_TAG |
//! +--------+-----------+-----------+
//! | Fixed  | Variable  |   Fixed   |
//! +--------+-----------+-----------+
//! ```
//!
//! Every packet is sealed with a subkey derived from its own random salt, so the nonce is fixed to all zeros
//! and never transmitted.

use byte_string::ByteStr;
use log::trace;
use rand::RngCore;

use crate::{
    crypto::{Aead, Cipher, CipherError},
    security::replay::ReplayProtector,
};

// Longest nonce of all supported methods (XChaCha20 uses 24 bytes)
static ZERO_NONCE: [u8; 32] = [0u8; 32];

/// AEAD protocol error
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("packet too short for salt, at least {0} bytes, but only {1} bytes")]
    PacketTooShortForSalt(usize, usize),
    #[error("packet too short for tag, at least {0} bytes, but only {1} bytes")]
    PacketTooShortForTag(usize, usize),
    #[error("buffer too short, at least {0} bytes, but only {1} bytes")]
    BufferTooShort(usize, usize),
    #[error("repeated salt")]
    RepeatedSalt,
    #[error("decrypt payload failed")]
    DecryptPayloadError,
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl ProtocolError {
    /// Input shorter than the smallest valid frame
    pub fn is_short_packet(&self) -> bool {
        matches!(
            *self,
            ProtocolError::PacketTooShortForSalt(..) | ProtocolError::PacketTooShortForTag(..)
        )
    }

    /// Output capacity insufficient
    pub fn is_short_buffer(&self) -> bool {
        matches!(*self, ProtocolError::BufferTooShort(..))
    }

    /// Salt was generated by this process, the packet was reflected back
    pub fn is_repeated_salt(&self) -> bool {
        matches!(*self, ProtocolError::RepeatedSalt)
    }

    /// Authentication of the ciphertext failed
    pub fn is_decrypt_failure(&self) -> bool {
        matches!(*self, ProtocolError::DecryptPayloadError)
    }
}

/// AEAD protocol result
pub type ProtocolResult<T> = Result<T, ProtocolError>;

fn zero_nonce<A: Aead>(aead: &A) -> ProtocolResult<&'static [u8]> {
    let nonce_len = aead.nonce_size();
    match ZERO_NONCE.get(..nonce_len) {
        Some(nonce) => Ok(nonce),
        None => Err(CipherError::InvalidNonceLength(ZERO_NONCE.len(), nonce_len).into()),
    }
}

/// Encrypt `plaintext` into `dst` as `SALT || CIPHERTEXT || TAG`
///
/// The generated salt is remembered by `replay` before sealing, so a reflected copy of this packet is
/// rejected by [`unpack`] in this process. Returns the encrypted part of `dst`.
pub fn pack<'a, C>(
    dst: &'a mut [u8],
    plaintext: &[u8],
    cipher: &C,
    replay: &ReplayProtector,
) -> ProtocolResult<&'a [u8]>
where
    C: Cipher + ?Sized,
{
    let salt_len = cipher.salt_size();
    if dst.len() < salt_len {
        return Err(ProtocolError::BufferTooShort(salt_len, dst.len()));
    }

    let (salt, data) = dst.split_at_mut(salt_len);
    rand::thread_rng().fill_bytes(salt);
    trace!("UDP packet generated aead salt {:?}", ByteStr::new(salt));

    let aead = cipher.encrypter(salt)?;
    replay.add_salt(salt);

    let data_len = plaintext.len() + aead.overhead();
    if data.len() < data_len {
        return Err(ProtocolError::BufferTooShort(salt_len + data_len, salt_len + data.len()));
    }

    let data = &mut data[..data_len];
    data[..plaintext.len()].copy_from_slice(plaintext);
    aead.seal_in_place(zero_nonce(&aead)?, &[], data)?;

    Ok(&dst[..salt_len + data_len])
}

// Checks common to both unpack flavors, returns the session AEAD and the plaintext length
fn open_header<C>(packet: &[u8], cipher: &C, replay: &ReplayProtector) -> ProtocolResult<(C::Aead, usize)>
where
    C: Cipher + ?Sized,
{
    let salt_len = cipher.salt_size();
    if packet.len() < salt_len {
        return Err(ProtocolError::PacketTooShortForSalt(salt_len, packet.len()));
    }

    let salt = &packet[..salt_len];
    trace!("UDP packet got AEAD salt {:?}", ByteStr::new(salt));

    let aead = cipher.decrypter(salt)?;

    if replay.contains_salt(salt) {
        return Err(ProtocolError::RepeatedSalt);
    }

    let tag_len = aead.overhead();
    if packet.len() < salt_len + tag_len {
        return Err(ProtocolError::PacketTooShortForTag(salt_len + tag_len, packet.len()));
    }

    Ok((aead, packet.len() - salt_len - tag_len))
}

/// Decrypt `packet` into `dst`, returns the plaintext part of `dst`
///
/// Nothing beyond the plaintext length is written into `dst`. When authentication fails, the written part is
/// zeroed before returning.
pub fn unpack<'a, C>(
    dst: &'a mut [u8],
    packet: &[u8],
    cipher: &C,
    replay: &ReplayProtector,
) -> ProtocolResult<&'a [u8]>
where
    C: Cipher + ?Sized,
{
    let (aead, data_len) = open_header(packet, cipher, replay)?;
    if dst.len() < data_len {
        return Err(ProtocolError::BufferTooShort(data_len, dst.len()));
    }

    let salt_len = cipher.salt_size();
    let (ciphertext, tag) = packet[salt_len..].split_at(data_len);

    let data = &mut dst[..data_len];
    data.copy_from_slice(ciphertext);

    if aead.open_in_place(zero_nonce(&aead)?, &[], data, tag).is_err() {
        data.fill(0);
        return Err(ProtocolError::DecryptPayloadError);
    }

    Ok(data)
}

/// Decrypt `buf` in place, the plaintext is moved to the front of `buf`
///
/// Returns the length of the plaintext.
pub fn unpack_in_place<C>(buf: &mut [u8], cipher: &C, replay: &ReplayProtector) -> ProtocolResult<usize>
where
    C: Cipher + ?Sized,
{
    let (aead, data_len) = open_header(buf, cipher, replay)?;

    let salt_len = cipher.salt_size();
    let (data, tag) = buf[salt_len..].split_at_mut(data_len);

    if aead.open_in_place(zero_nonce(&aead)?, &[], data, tag).is_err() {
        data.fill(0);
        return Err(ProtocolError::DecryptPayloadError);
    }

    buf.copy_within(salt_len..salt_len + data_len, 0);
    Ok(data_len)
}
