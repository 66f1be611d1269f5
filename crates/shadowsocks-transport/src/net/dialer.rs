//! Outbound sockets for the proxy's own traffic

use std::{
    io::{self, ErrorKind},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use log::{debug, log, warn, Level};
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use tokio::net::{TcpSocket, TcpStream, UdpSocket};

use super::{
    sys::{platform_control, socket_bind_dual_stack, SocketOption},
    AddrFamily, ConnectOpts,
};

// Platforms without the option would otherwise warn on every dial
fn fragmentation_failure_level(err: &io::Error) -> Level {
    if err.kind() == ErrorKind::Unsupported {
        Level::Debug
    } else {
        Level::Warn
    }
}

/// Creates outbound sockets with `ConnectOpts` applied
///
/// The socket mark is what lets policy routing tell the proxy's own packets apart from the traffic it intercepts.
/// Failing to set it is not fatal, the connection proceeds unmarked.
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    opts: ConnectOpts,
}

impl Dialer {
    /// Create a `Dialer`
    pub fn new(opts: ConnectOpts) -> Dialer {
        Dialer { opts }
    }

    /// Options of this dialer
    pub fn opts(&self) -> &ConnectOpts {
        &self.opts
    }

    fn apply_mark(&self, socket: &Socket, addr: &SocketAddr) {
        if let Some(mark) = self.opts.fwmark {
            match platform_control().apply(socket, addr, SocketOption::Mark(mark)) {
                Ok(..) => debug!("outbound socket for {} marked with {}", addr, mark),
                Err(err) => warn!("failed to set socket mark {} for {}, error: {}", mark, addr, err),
            }
        }
    }

    /// Connect a TCP stream to `addr`
    pub async fn connect_tcp(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = match addr {
            SocketAddr::V4(..) => TcpSocket::new_v4()?,
            SocketAddr::V6(..) => TcpSocket::new_v6()?,
        };

        self.apply_mark(&SockRef::from(&socket), &addr);

        // Binds to IP address
        if let Some(local_addr) = self.opts.bind_local_addr {
            match (local_addr, addr) {
                (SocketAddr::V4(..), SocketAddr::V4(..)) | (SocketAddr::V6(..), SocketAddr::V6(..)) => {
                    socket.bind(local_addr)?;
                }
                _ => {}
            }
        }

        socket.connect(addr).await
    }

    /// Create a UDP socket connected to `addr`
    pub async fn connect_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        let socket = self.bind_udp(AddrFamily::from(&addr)).await?;
        socket.connect(addr).await?;
        Ok(socket)
    }

    /// Create an unconnected UDP socket of family `af`
    pub async fn bind_udp(&self, af: AddrFamily) -> io::Result<UdpSocket> {
        let bind_addr = match (af, self.opts.bind_local_addr) {
            (AddrFamily::Ipv4, Some(SocketAddr::V4(addr))) => addr.into(),
            (AddrFamily::Ipv4, Some(SocketAddr::V6(addr))) => {
                // Map IPv6 bind_local_addr to IPv4 if AF is IPv4
                match addr.ip().to_ipv4_mapped() {
                    Some(ip) => SocketAddr::new(ip.into(), 0),
                    None => return Err(io::Error::new(ErrorKind::InvalidInput, "Invalid IPv6 address")),
                }
            }
            (AddrFamily::Ipv6, Some(SocketAddr::V6(addr))) => addr.into(),
            (AddrFamily::Ipv6, Some(SocketAddr::V4(addr))) => {
                // Map IPv4 bind_local_addr to IPv6 if AF is IPv6
                SocketAddr::new(addr.ip().to_ipv6_mapped().into(), 0)
            }
            (AddrFamily::Ipv4, None) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
            (AddrFamily::Ipv6, None) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
        };

        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;

        self.apply_mark(&socket, &bind_addr);

        if !self.opts.allow_fragmentation {
            if let Err(err) = platform_control().apply(&socket, &bind_addr, SocketOption::DoNotFragment) {
                log!(
                    fragmentation_failure_level(&err),
                    "failed to disable IP fragmentation, error: {}",
                    err
                );
            }
        }

        if af == AddrFamily::Ipv6 {
            socket_bind_dual_stack(&socket, &bind_addr, false)?;
        } else {
            socket.bind(&SockAddr::from(bind_addr))?;
        }

        // UdpSocket::from_std requires socket to be non-blocked
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }
}
