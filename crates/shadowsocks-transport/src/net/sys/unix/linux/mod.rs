use std::{io, net::SocketAddr};

use socket2::Socket;

use crate::net::{
    is_dual_stack_addr,
    sys::{SocketControl, SocketOption},
};

use super::{find_destination_addr, set_reuse_port, setsockopt};

/// Socket controls for Linux
///
/// IPv6 dual-stack sockets get the `SOL_IP` level option set as well, so IPv4-mapped traffic is covered.
pub struct PlatformControl;

impl PlatformControl {
    fn set_both_levels(
        socket: &Socket,
        addr: &SocketAddr,
        v4: (libc::c_int, libc::c_int),
        v6: (libc::c_int, libc::c_int),
        value: libc::c_int,
    ) -> io::Result<()> {
        match *addr {
            SocketAddr::V4(..) => setsockopt(socket, v4.0, v4.1, value),
            SocketAddr::V6(..) => {
                if is_dual_stack_addr(addr) {
                    setsockopt(socket, v4.0, v4.1, value)?;
                }
                setsockopt(socket, v6.0, v6.1, value)
            }
        }
    }
}

impl SocketControl for PlatformControl {
    fn apply(&self, socket: &Socket, addr: &SocketAddr, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::Transparent => Self::set_both_levels(
                socket,
                addr,
                (libc::SOL_IP, libc::IP_TRANSPARENT),
                (libc::SOL_IPV6, libc::IPV6_TRANSPARENT),
                1,
            ),
            SocketOption::RecvOrigDst => Self::set_both_levels(
                socket,
                addr,
                (libc::SOL_IP, libc::IP_RECVORIGDSTADDR),
                (libc::SOL_IPV6, libc::IPV6_RECVORIGDSTADDR),
                1,
            ),
            // For Linux, IP_MTU_DISCOVER should be enabled for both IPv4 and IPv6 sockets
            // https://man7.org/linux/man-pages/man7/ip.7.html
            SocketOption::DoNotFragment => Self::set_both_levels(
                socket,
                addr,
                (libc::IPPROTO_IP, libc::IP_MTU_DISCOVER),
                (libc::IPPROTO_IPV6, libc::IPV6_MTU_DISCOVER),
                libc::IP_PMTUDISC_DO,
            ),
            SocketOption::ReusePort => set_reuse_port(socket),
            // Set SO_MARK for mark-based routing on Linux (since 2.6.25)
            // NOTE: This will require CAP_NET_ADMIN capability (root in most cases)
            SocketOption::Mark(mark) => setsockopt(socket, libc::SOL_SOCKET, libc::SO_MARK, mark),
        }
    }
}

/// Decode `IP_ORIGDSTADDR` or `IPV6_ORIGDSTADDR` from ancillary data
pub fn parse_original_destination(control: &[u8]) -> io::Result<SocketAddr> {
    find_destination_addr(
        control,
        (libc::SOL_IP, libc::IP_ORIGDSTADDR),
        (libc::SOL_IPV6, libc::IPV6_ORIGDSTADDR),
    )
}
