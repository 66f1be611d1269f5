use std::{io, net::SocketAddr};

use socket2::Socket;

use crate::net::sys::{unsupported, SocketControl, SocketOption};

use super::set_reuse_port;

/// Socket controls for the remaining Unix systems, only `SO_REUSEPORT` is provided
pub struct PlatformControl;

impl SocketControl for PlatformControl {
    fn apply(&self, socket: &Socket, _addr: &SocketAddr, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::ReusePort => set_reuse_port(socket),
            _ => Err(unsupported(option.feature())),
        }
    }
}

/// Original destination is not delivered as ancillary data
pub fn parse_original_destination(_: &[u8]) -> io::Result<SocketAddr> {
    Err(unsupported(SocketOption::RecvOrigDst.feature()))
}
