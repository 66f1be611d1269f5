use std::{io, net::SocketAddr};

use socket2::Socket;

use crate::net::sys::{SocketControl, SocketOption};

use super::super::{find_destination_addr, set_reuse_port, setsockopt};

/// Socket controls for FreeBSD
pub struct PlatformControl;

impl SocketControl for PlatformControl {
    fn apply(&self, socket: &Socket, addr: &SocketAddr, option: SocketOption) -> io::Result<()> {
        let enable: libc::c_int = 1;

        // https://www.freebsd.org/cgi/man.cgi?query=ip&sektion=4&manpath=FreeBSD+9.0-RELEASE
        match (option, addr) {
            (SocketOption::Transparent, SocketAddr::V4(..)) => {
                setsockopt(socket, libc::IPPROTO_IP, libc::IP_BINDANY, enable)
            }
            (SocketOption::Transparent, SocketAddr::V6(..)) => {
                setsockopt(socket, libc::IPPROTO_IPV6, libc::IPV6_BINDANY, enable)
            }
            (SocketOption::RecvOrigDst, SocketAddr::V4(..)) => {
                setsockopt(socket, libc::IPPROTO_IP, libc::IP_ORIGDSTADDR, enable)
            }
            (SocketOption::RecvOrigDst, SocketAddr::V6(..)) => {
                setsockopt(socket, libc::IPPROTO_IPV6, libc::IPV6_ORIGDSTADDR, enable)
            }
            (SocketOption::DoNotFragment, SocketAddr::V4(..)) => {
                setsockopt(socket, libc::IPPROTO_IP, libc::IP_DONTFRAG, enable)
            }
            (SocketOption::DoNotFragment, SocketAddr::V6(..)) => {
                setsockopt(socket, libc::IPPROTO_IPV6, libc::IPV6_DONTFRAG, enable)
            }
            (SocketOption::ReusePort, _) => set_reuse_port(socket),
            (SocketOption::Mark(mark), _) => setsockopt(socket, libc::SOL_SOCKET, libc::SO_USER_COOKIE, mark),
        }
    }
}

/// Decode `IP_ORIGDSTADDR` or `IPV6_ORIGDSTADDR` from ancillary data
pub fn parse_original_destination(control: &[u8]) -> io::Result<SocketAddr> {
    find_destination_addr(
        control,
        (libc::IPPROTO_IP, libc::IP_ORIGDSTADDR),
        (libc::IPPROTO_IPV6, libc::IPV6_ORIGDSTADDR),
    )
}
