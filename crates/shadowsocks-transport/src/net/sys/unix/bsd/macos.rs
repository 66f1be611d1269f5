use std::{io, net::SocketAddr};

use socket2::Socket;

use crate::net::sys::{unsupported, SocketControl, SocketOption};

use super::super::{set_reuse_port, setsockopt};

// netinet/in.h, netinet6/in6.h
const IP_DONTFRAG: libc::c_int = 28;
const IPV6_DONTFRAG: libc::c_int = 62;

/// Socket controls for macOS and the other Darwin systems
pub struct PlatformControl;

impl SocketControl for PlatformControl {
    fn apply(&self, socket: &Socket, addr: &SocketAddr, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::DoNotFragment => {
                let enable: libc::c_int = 1;
                match *addr {
                    SocketAddr::V4(..) => setsockopt(socket, libc::IPPROTO_IP, IP_DONTFRAG, enable),
                    SocketAddr::V6(..) => setsockopt(socket, libc::IPPROTO_IPV6, IPV6_DONTFRAG, enable),
                }
            }
            SocketOption::ReusePort => set_reuse_port(socket),
            SocketOption::Transparent | SocketOption::RecvOrigDst | SocketOption::Mark(..) => {
                Err(unsupported(option.feature()))
            }
        }
    }
}

/// Original destination is not delivered as ancillary data
pub fn parse_original_destination(_: &[u8]) -> io::Result<SocketAddr> {
    Err(unsupported(SocketOption::RecvOrigDst.feature()))
}
