//! Options for listening and connecting sockets

use std::net::SocketAddr;

use serde::Deserialize;

use super::sys::SocketOption;

/// Options for inbound UDP sockets
///
/// Every enabled option is required: `UdpConn::listen` fails if one of them can't be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenOpts {
    /// Accept datagrams addressed to non-local addresses, `IP_TRANSPARENT` on Linux
    pub transparent: bool,

    /// Collect the original destination of every datagram, `IP_RECVORIGDSTADDR` on Linux
    pub recv_orig_dst: bool,

    /// Set the don't fragment flag for sent datagrams
    pub do_not_fragment: bool,

    /// `SO_REUSEPORT`
    pub reuse_port: bool,

    /// Linux mark based routing, going to set by `setsockopt` with `SO_MARK` option
    pub fwmark: Option<u32>,

    /// Set `IPV6_V6ONLY` when listening on a dual-stack address (`::`)
    pub ipv6_only: bool,
}

impl ListenOpts {
    /// Options to be applied, in the order they are applied
    pub fn requested_options(&self) -> Vec<SocketOption> {
        let mut options = Vec::with_capacity(5);
        if self.transparent {
            options.push(SocketOption::Transparent);
        }
        if self.recv_orig_dst {
            options.push(SocketOption::RecvOrigDst);
        }
        if self.do_not_fragment {
            options.push(SocketOption::DoNotFragment);
        }
        if self.reuse_port {
            options.push(SocketOption::ReusePort);
        }
        if let Some(mark) = self.fwmark {
            options.push(SocketOption::Mark(mark));
        }
        options
    }
}

/// Options for connecting to remote server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectOpts {
    /// Linux mark based routing, going to set by `setsockopt` with `SO_MARK` option
    ///
    /// Marks the proxy's own outbound traffic, so it can be exempted from the transparent redirect rules.
    pub fwmark: Option<u32>,

    /// Outbound socket binds to this address, mostly for choosing network interfaces
    ///
    /// It only affects sockets that trying to connect to addresses with the same family
    pub bind_local_addr: Option<SocketAddr>,

    /// Allow fragmentation of outbound UDP datagrams, the don't fragment flag is set otherwise
    pub allow_fragmentation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_in_order() {
        let opts = ListenOpts {
            transparent: true,
            recv_orig_dst: true,
            do_not_fragment: true,
            reuse_port: true,
            fwmark: Some(255),
            ipv6_only: false,
        };

        assert_eq!(
            opts.requested_options(),
            vec![
                SocketOption::Transparent,
                SocketOption::RecvOrigDst,
                SocketOption::DoNotFragment,
                SocketOption::ReusePort,
                SocketOption::Mark(255),
            ]
        );
        assert!(ListenOpts::default().requested_options().is_empty());
    }

    #[test]
    fn from_json() {
        let opts: ListenOpts = serde_json::from_str(r#"{ "transparent": true, "fwmark": 1 }"#).unwrap();
        assert!(opts.transparent);
        assert!(!opts.reuse_port);
        assert_eq!(opts.requested_options(), vec![SocketOption::Transparent, SocketOption::Mark(1)]);

        let opts: ConnectOpts = serde_json::from_str(r#"{ "bind_local_addr": "127.0.0.1:0" }"#).unwrap();
        assert_eq!(opts.bind_local_addr, Some("127.0.0.1:0".parse().unwrap()));
        assert_eq!(opts.fwmark, None);
    }
}
