use std::{io, net::SocketAddr};

use socket2::Socket;

use crate::net::sys::{unsupported, SocketControl, SocketOption};

use super::super::{set_reuse_port, setsockopt};

/// Socket controls for OpenBSD
pub struct PlatformControl;

impl SocketControl for PlatformControl {
    fn apply(&self, socket: &Socket, _addr: &SocketAddr, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::Transparent => {
                let enable: libc::c_int = 1;
                setsockopt(socket, libc::SOL_SOCKET, libc::SO_BINDANY, enable)
            }
            SocketOption::ReusePort => set_reuse_port(socket),
            SocketOption::RecvOrigDst | SocketOption::DoNotFragment | SocketOption::Mark(..) => {
                Err(unsupported(option.feature()))
            }
        }
    }
}

/// Original destination is not delivered as ancillary data
pub fn parse_original_destination(_: &[u8]) -> io::Result<SocketAddr> {
    Err(unsupported(SocketOption::RecvOrigDst.feature()))
}
