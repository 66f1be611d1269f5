use std::{
    io::{self, ErrorKind},
    mem,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    os::unix::io::{AsRawFd, RawFd},
    ptr,
};

use cfg_if::cfg_if;
use log::trace;
use socket2::Socket;
use tokio::{io::Interest, net::UdpSocket};

cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        pub use self::linux::*;
    } else if #[cfg(any(target_os = "freebsd",
                        target_os = "openbsd",
                        target_os = "macos",
                        target_os = "ios",
                        target_os = "watchos",
                        target_os = "tvos"))] {
        mod bsd;
        pub use self::bsd::*;
    } else {
        mod others;
        pub use self::others::*;
    }
}

/// `setsockopt` with an `int` sized value
fn setsockopt<T>(socket: &Socket, level: libc::c_int, name: libc::c_int, value: T) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &value as *const _ as *const _,
            mem::size_of_val(&value) as libc::socklen_t,
        )
    };

    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(not(any(target_os = "solaris", target_os = "illumos")))]
fn set_reuse_port(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_port(true)
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
fn set_reuse_port(_: &Socket) -> io::Result<()> {
    Err(super::unsupported(super::SocketOption::ReusePort.feature()))
}

fn sockaddr_in_to_std(sin: &libc::sockaddr_in) -> SocketAddr {
    let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
    SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port)))
}

fn sockaddr_in6_to_std(sin6: &libc::sockaddr_in6) -> SocketAddr {
    let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
    SocketAddr::V6(SocketAddrV6::new(
        ip,
        u16::from_be(sin6.sin6_port),
        sin6.sin6_flowinfo,
        sin6.sin6_scope_id,
    ))
}

/// Convert `sockaddr_storage` filled by the kernel to `SocketAddr`
pub fn sockaddr_to_std(saddr: &libc::sockaddr_storage) -> io::Result<SocketAddr> {
    match saddr.ss_family as libc::c_int {
        libc::AF_INET => unsafe {
            let sin = ptr::read_unaligned(saddr as *const _ as *const libc::sockaddr_in);
            Ok(sockaddr_in_to_std(&sin))
        },
        libc::AF_INET6 => unsafe {
            let sin6 = ptr::read_unaligned(saddr as *const _ as *const libc::sockaddr_in6);
            Ok(sockaddr_in6_to_std(&sin6))
        },
        _ => {
            let err = io::Error::new(ErrorKind::InvalidData, "family must be either AF_INET or AF_INET6");
            Err(err)
        }
    }
}

/// Walk through ancillary data received by `recvmsg`, looking for an original destination address
///
/// `control` must start at an address aligned for `cmsghdr`.
#[allow(dead_code)]
fn find_destination_addr(
    control: &[u8],
    ipv4: (libc::c_int, libc::c_int),
    ipv6: (libc::c_int, libc::c_int),
) -> io::Result<SocketAddr> {
    if control.is_empty() {
        return Err(io::Error::new(ErrorKind::InvalidData, "missing destination address in msghdr"));
    }

    unsafe {
        let mut msg: libc::msghdr = mem::zeroed();
        msg.msg_control = control.as_ptr() as *mut _;
        msg.msg_controllen = control.len() as _;

        let mut cmsg: *mut libc::cmsghdr = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            // The header itself may be the last thing in `control`
            if cmsg as usize + mem::size_of::<libc::cmsghdr>() > control.as_ptr() as usize + control.len() {
                break;
            }

            let rcmsg = &*cmsg;
            let data = libc::CMSG_DATA(cmsg) as *const u8;
            let data_len = (rcmsg.cmsg_len as usize).saturating_sub(libc::CMSG_LEN(0) as usize);

            // Payload claimed by `cmsg_len` but lying beyond `control` is never read
            let offset = data as usize - control.as_ptr() as usize;
            let readable = data_len.min(control.len().saturating_sub(offset));

            let key = (rcmsg.cmsg_level, rcmsg.cmsg_type);
            if key == ipv4 && readable >= mem::size_of::<libc::sockaddr_in>() {
                let sin = ptr::read_unaligned(data as *const libc::sockaddr_in);
                return Ok(sockaddr_in_to_std(&sin));
            }
            if key == ipv6 && readable >= mem::size_of::<libc::sockaddr_in6>() {
                let sin6 = ptr::read_unaligned(data as *const libc::sockaddr_in6);
                return Ok(sockaddr_in6_to_std(&sin6));
            }

            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Err(io::Error::new(ErrorKind::InvalidData, "missing destination address in msghdr"))
}

fn recvmsg_raw(fd: RawFd, buf: &mut [u8], control: &mut [u8]) -> io::Result<(usize, SocketAddr, usize)> {
    unsafe {
        let mut src_addr: libc::sockaddr_storage = mem::zeroed();

        let mut msg: libc::msghdr = mem::zeroed();
        msg.msg_name = &mut src_addr as *mut _ as *mut _;
        msg.msg_namelen = mem::size_of_val(&src_addr) as libc::socklen_t;

        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut _,
            iov_len: buf.len() as libc::size_t,
        };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;

        msg.msg_control = control.as_mut_ptr() as *mut _;
        msg.msg_controllen = control.len() as _;

        let ret = libc::recvmsg(fd, &mut msg, 0);
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            trace!("recvmsg ancillary data truncated, control buffer {} bytes", control.len());
        }

        let control_len = (msg.msg_controllen as usize).min(control.len());
        Ok((ret as usize, sockaddr_to_std(&src_addr)?, control_len))
    }
}

/// Receive a datagram with its ancillary data
///
/// Returns the datagram length, the source address and the length of ancillary data written into `control`.
pub async fn recv_msg(
    socket: &UdpSocket,
    buf: &mut [u8],
    control: &mut [u8],
) -> io::Result<(usize, SocketAddr, usize)> {
    let fd = socket.as_raw_fd();
    socket
        .async_io(Interest::READABLE, || recvmsg_raw(fd, &mut *buf, &mut *control))
        .await
}
