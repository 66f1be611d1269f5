//! Platform specific socket controls

use std::{
    env, fmt,
    io::{self, ErrorKind},
    net::SocketAddr,
};

use cfg_if::cfg_if;
use log::{debug, warn};
use socket2::{SockAddr, Socket};

cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use self::unix::*;
    } else if #[cfg(windows)] {
        mod windows;
        pub use self::windows::*;
    }
}

/// A kernel level option applied on a socket before it is handed to callers
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketOption {
    /// Send and receive for non-local addresses (TPROXY)
    Transparent,
    /// Attach the pre-redirection destination to every received datagram
    RecvOrigDst,
    /// Set the don't fragment bit, or its path MTU discovery equivalent
    DoNotFragment,
    /// Allow multiple sockets binding to the same address and port
    ReusePort,
    /// Tag the socket for policy routing
    Mark(u32),
}

impl SocketOption {
    /// Human readable name, used in errors
    pub fn feature(&self) -> &'static str {
        match *self {
            SocketOption::Transparent => "transparent proxying",
            SocketOption::RecvOrigDst => "original destination message",
            SocketOption::DoNotFragment => "setting don't fragment flag",
            SocketOption::ReusePort => "port reusage",
            SocketOption::Mark(..) => "socket mark",
        }
    }
}

impl fmt::Display for SocketOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SocketOption::Transparent => f.write_str("transparent"),
            SocketOption::RecvOrigDst => f.write_str("recv-orig-dst"),
            SocketOption::DoNotFragment => f.write_str("do-not-fragment"),
            SocketOption::ReusePort => f.write_str("reuse-port"),
            SocketOption::Mark(mark) => write!(f, "mark({})", mark),
        }
    }
}

/// Strategy for applying `SocketOption`s on the current platform
///
/// An option the platform cannot provide fails with `ErrorKind::Unsupported`, it is never skipped silently.
pub trait SocketControl: Send + Sync {
    /// Apply `option` on `socket`, which is going to be bound or connected to `addr`
    fn apply(&self, socket: &Socket, addr: &SocketAddr, option: SocketOption) -> io::Result<()>;
}

/// `SocketControl` of the platform this crate was built for
pub fn platform_control() -> &'static dyn SocketControl {
    &PlatformControl
}

/// Error for features that the current platform doesn't provide
pub fn unsupported(feature: &str) -> io::Error {
    io::Error::new(
        ErrorKind::Unsupported,
        format!("{} not supported on {}-{}", feature, env::consts::OS, env::consts::ARCH),
    )
}

/// Try to call `bind()` with dual-stack enabled.
///
/// Users have to ensure that `addr` is a dual-stack inbound address (`::`) when `ipv6_only` is `false`.
pub fn socket_bind_dual_stack(socket: &Socket, addr: &SocketAddr, ipv6_only: bool) -> io::Result<()> {
    let saddr = SockAddr::from(*addr);

    if ipv6_only {
        // Requested to set IPV6_V6ONLY
        socket.set_only_v6(true)?;
        socket.bind(&saddr)?;
    } else {
        if let Err(err) = socket.set_only_v6(false) {
            warn!("failed to set IPV6_V6ONLY: false for socket, error: {}", err);

            // This is not a fatal error, just warn and skip
        }

        match socket.bind(&saddr) {
            Ok(..) => {}
            Err(ref err) if err.kind() == ErrorKind::AddrInUse => {
                // This is probably 0.0.0.0 with the same port has already been occupied
                debug!(
                    "0.0.0.0:{} may have already been occupied, retry with IPV6_V6ONLY",
                    addr.port()
                );

                if let Err(err) = socket.set_only_v6(true) {
                    warn!("failed to set IPV6_V6ONLY: true for socket, error: {}", err);
                }
                socket.bind(&saddr)?;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}
