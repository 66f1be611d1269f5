//! UDP socket encrypting every datagram with a shadowsocks AEAD cipher

use std::{fmt, io, net::SocketAddr, sync::Arc, time::Instant};

use async_trait::async_trait;
use log::{debug, trace};
use tokio::sync::Mutex;

use crate::{
    crypto::Cipher,
    net::{ControlMessages, DatagramConn},
    security::replay::ReplayProtector,
};

use super::{
    aead::{pack, unpack_in_place, ProtocolError},
    MAXIMUM_UDP_PAYLOAD_SIZE,
};

/// `ProxySocket` error type
#[derive(thiserror::Error, Debug)]
pub enum ProxySocketError {
    /// std::io::Error
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error(transparent)]
    ProtocolError(ProtocolError),
    #[error("peer: {0}, {1}")]
    ProtocolErrorWithPeer(SocketAddr, ProtocolError),
}

impl ProxySocketError {
    /// The protocol error of a single datagram, if this is one
    ///
    /// These errors only concern the datagram that caused them, the socket remains usable.
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match *self {
            ProxySocketError::IoError(..) => None,
            ProxySocketError::ProtocolError(ref err) | ProxySocketError::ProtocolErrorWithPeer(_, ref err) => Some(err),
        }
    }
}

impl From<ProxySocketError> for io::Error {
    fn from(e: ProxySocketError) -> Self {
        match e {
            ProxySocketError::IoError(e) => e,
            _ => Self::other(e),
        }
    }
}

/// `ProxySocket` result type
pub type ProxySocketResult<T> = Result<T, ProxySocketError>;

/// Datagram connection encrypting with cipher `C` over transport `S`
///
/// Sends are serialized on one scratch buffer of `MAXIMUM_UDP_PAYLOAD_SIZE` bytes, so concurrent senders never
/// interleave. Receives decrypt in the caller's buffer and don't contend with each other.
pub struct ProxySocket<S, C> {
    io: S,
    cipher: C,
    replay: Arc<ReplayProtector>,
    send_buf: Mutex<Box<[u8]>>,
}

impl<S, C> fmt::Debug for ProxySocket<S, C>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProxySocket").field("io", &self.io).finish()
    }
}

impl<S, C> ProxySocket<S, C>
where
    S: DatagramConn,
    C: Cipher,
{
    /// Wrap `io`. `replay` is shared by every socket of the process.
    pub fn new(io: S, cipher: C, replay: Arc<ReplayProtector>) -> ProxySocket<S, C> {
        ProxySocket {
            io,
            cipher,
            replay,
            send_buf: Mutex::new(vec![0u8; MAXIMUM_UDP_PAYLOAD_SIZE].into_boxed_slice()),
        }
    }

    /// Encrypt `payload` and send it to `target`
    ///
    /// Returns the length of `payload`, not the length on the wire.
    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> ProxySocketResult<usize> {
        let mut send_buf = self.send_buf.lock().await;

        let packet = pack(&mut send_buf[..], payload, &self.cipher, &self.replay)
            .map_err(ProxySocketError::ProtocolError)?;
        let packet_len = packet.len();

        let send_len = self.io.send_to(packet, target).await?;
        if send_len != packet_len {
            debug!(
                "UDP client send {} bytes to {}, but sent {} bytes",
                packet_len, target, send_len
            );
        }

        trace!(
            "UDP client send to {}, payload length {} bytes, packet length {} bytes",
            target,
            payload.len(),
            packet_len
        );

        Ok(payload.len())
    }

    fn decrypt_recv_buffer(&self, recv_buf: &mut [u8], peer_addr: SocketAddr) -> ProxySocketResult<usize> {
        match unpack_in_place(recv_buf, &self.cipher, &self.replay) {
            Ok(n) => Ok(n),
            Err(err) => {
                if err.is_repeated_salt() {
                    trace!("UDP packet from {} dropped, {}", peer_addr, err);
                } else {
                    debug!("UDP packet from {} dropped, {}", peer_addr, err);
                }
                Err(ProxySocketError::ProtocolErrorWithPeer(peer_addr, err))
            }
        }
    }

    /// Receive and decrypt one datagram into `recv_buf`
    ///
    /// A datagram that fails to decrypt yields `ProxySocketError::ProtocolErrorWithPeer`, callers should drop it
    /// and keep receiving.
    pub async fn recv_from(&self, recv_buf: &mut [u8]) -> ProxySocketResult<(usize, SocketAddr)> {
        let (recv_n, peer_addr) = self.io.recv_from(recv_buf).await?;
        let n = self.decrypt_recv_buffer(&mut recv_buf[..recv_n], peer_addr)?;

        trace!(
            "UDP server receive from {}, packet length {} bytes, payload length {} bytes",
            peer_addr,
            recv_n,
            n
        );

        Ok((n, peer_addr))
    }

    /// Receive and decrypt one datagram, along with its ancillary data
    pub async fn recv_msg(&self, recv_buf: &mut [u8]) -> ProxySocketResult<(usize, SocketAddr, ControlMessages)> {
        let (recv_n, peer_addr, control) = self.io.recv_msg(recv_buf).await?;
        let n = self.decrypt_recv_buffer(&mut recv_buf[..recv_n], peer_addr)?;

        trace!(
            "UDP server receive from {}, control: {:?}, packet length {} bytes, payload length {} bytes",
            peer_addr,
            control,
            recv_n,
            n
        );

        Ok((n, peer_addr, control))
    }

    /// Get a reference to the underlying transport
    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Consumes the `ProxySocket` and return the underlying transport
    pub fn into_inner(self) -> S {
        self.io
    }
}

#[async_trait]
impl<S, C> DatagramConn for ProxySocket<S, C>
where
    S: DatagramConn,
    C: Cipher,
{
    fn is_empty(&self) -> bool {
        self.io.is_empty()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.local_addr()
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.io.set_read_deadline(deadline)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        ProxySocket::recv_from(self, buf).await.map_err(Into::into)
    }

    async fn recv_msg(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr, ControlMessages)> {
        ProxySocket::recv_msg(self, buf).await.map_err(Into::into)
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        ProxySocket::send_to(self, buf, target).await.map_err(Into::into)
    }

    fn close(&self) -> io::Result<()> {
        self.io.close()
    }
}
