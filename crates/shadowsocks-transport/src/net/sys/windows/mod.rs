use std::{io, net::SocketAddr};

use socket2::Socket;
use tokio::net::UdpSocket;

use crate::net::sys::{unsupported, SocketControl, SocketOption};

/// Socket controls for Windows
///
/// None of the options are available, `SO_REUSEADDR` on Windows has different semantics than `SO_REUSEPORT`.
pub struct PlatformControl;

impl SocketControl for PlatformControl {
    fn apply(&self, _socket: &Socket, _addr: &SocketAddr, option: SocketOption) -> io::Result<()> {
        Err(unsupported(option.feature()))
    }
}

/// Original destination is not delivered as ancillary data
pub fn parse_original_destination(_: &[u8]) -> io::Result<SocketAddr> {
    Err(unsupported(SocketOption::RecvOrigDst.feature()))
}

/// Receive a datagram, no ancillary data is collected
pub async fn recv_msg(
    socket: &UdpSocket,
    buf: &mut [u8],
    _control: &mut [u8],
) -> io::Result<(usize, SocketAddr, usize)> {
    let (n, addr) = socket.recv_from(buf).await?;
    Ok((n, addr, 0))
}
