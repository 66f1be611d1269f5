//! shadowsocks AEAD datagram transport
//!
//! Turns a plain UDP socket into an encrypted channel resistant to reflection attacks, and provides the socket
//! controls a transparent proxy needs: `IP_TRANSPARENT`, original destination recovery, don't fragment, port
//! reuse and outbound socket marks.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shadowsocks_transport::{
//!     crypto::{AeadCipher, CipherKind},
//!     net::{ListenOpts, UdpConn},
//!     security::replay::{ReplayConfig, ReplayProtector},
//!     ProxySocket,
//! };
//!
//! # async fn run() -> std::io::Result<()> {
//! let replay = Arc::new(ReplayProtector::new(&ReplayConfig::from_env())?);
//! let cipher = AeadCipher::new(CipherKind::AES_256_GCM, &[0u8; 32]).map_err(std::io::Error::other)?;
//!
//! let opts = ListenOpts {
//!     transparent: true,
//!     recv_orig_dst: true,
//!     ..Default::default()
//! };
//! let conn = UdpConn::listen("0.0.0.0:1080".parse().unwrap(), &opts).await?;
//! let socket = ProxySocket::new(conn, cipher, replay);
//!
//! let mut buf = vec![0u8; 65536];
//! let (n, peer, control) = socket.recv_msg(&mut buf).await?;
//! println!("{} bytes from {} to {}", n, peer, control.original_destination()?);
//! # Ok(())
//! # }
//! ```

#![crate_type = "lib"]

pub use self::{
    net::{ConnectOpts, DatagramConn, Dialer, ListenOpts, UdpConn},
    relay::udprelay::{proxy_socket::ProxySocket, MAXIMUM_UDP_PAYLOAD_SIZE},
    security::replay::{ReplayConfig, ReplayProtector},
};

pub mod crypto;
pub mod net;
pub mod relay;
pub mod security;
