//! Relay for UDP implementation
//!
//! shadowsocks UDP Request and Response (after encrypted)
//! ```ignore
//! +-------+--------------+-------+
//! |  SALT |    PAYLOAD   |  TAG  |
//! +-------+--------------+-------+
//! | Fixed |   Variable   | Fixed |
//! +-------+--------------+-------+
//! ```
//!
//! The payload is opaque to this layer. Addressing headers, if any, are part of the plaintext.

pub use self::{
    aead::{pack, unpack, unpack_in_place, ProtocolError, ProtocolResult},
    proxy_socket::{ProxySocket, ProxySocketError, ProxySocketResult},
};

pub mod aead;
pub mod proxy_socket;

/// The maximum UDP payload size (defined in the original shadowsocks Python)
///
/// *I cannot find any references about why clowwindy used this value as the maximum
/// Socks5 UDP ASSOCIATE packet size. The only thing I can find is
/// [here](http://support.microsoft.com/kb/822061/)*
pub const MAXIMUM_UDP_PAYLOAD_SIZE: usize = 65536;
