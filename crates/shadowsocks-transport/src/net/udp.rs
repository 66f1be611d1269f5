//! UDP transport connection

use std::{
    fmt,
    future::{self, Future},
    io::{self, ErrorKind},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant as StdInstant,
};

use async_trait::async_trait;
use log::{debug, error};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::{
    net::UdpSocket,
    sync::Notify,
    time::{self, Instant},
};

use super::{
    is_dual_stack_addr,
    sys::{self, platform_control, socket_bind_dual_stack},
    ListenOpts,
};

/// Space for ancillary data of one datagram
pub const CONTROL_BUFFER_SIZE: usize = 128;

/// A datagram socket that relay logic reads from and writes to
///
/// All methods take `&self`, a connection can be shared by concurrent readers and writers.
#[async_trait]
pub trait DatagramConn: Send + Sync {
    /// Placeholder connection without a socket
    fn is_empty(&self) -> bool;

    /// Local address this connection is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Reads fail with `ErrorKind::TimedOut` once `deadline` passed, including those already waiting. `None`
    /// clears it.
    fn set_read_deadline(&self, deadline: Option<StdInstant>) -> io::Result<()>;

    /// Receive a datagram
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Receive a datagram with its ancillary data
    async fn recv_msg(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr, ControlMessages)>;

    /// Send a datagram to `target`
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Close the connection. Pending reads are woken up with an error.
    fn close(&self) -> io::Result<()>;
}

#[repr(C, align(8))]
#[derive(Clone, Copy)]
struct ControlBuffer([u8; CONTROL_BUFFER_SIZE]);

/// Ancillary data received along with a datagram
#[derive(Clone)]
pub struct ControlMessages {
    buf: ControlBuffer,
    len: usize,
}

impl ControlMessages {
    /// Copy raw ancillary data, as filled by `recvmsg`
    pub fn new(bytes: &[u8]) -> io::Result<ControlMessages> {
        if bytes.len() > CONTROL_BUFFER_SIZE {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("ancillary data {} bytes, at most {} bytes", bytes.len(), CONTROL_BUFFER_SIZE),
            ));
        }

        let mut control = ControlMessages::default();
        control.buf.0[..bytes.len()].copy_from_slice(bytes);
        control.len = bytes.len();
        Ok(control)
    }

    /// Raw ancillary data
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf.0[..self.len]
    }

    /// No ancillary data was received
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Destination of the datagram before it was redirected to this socket
    ///
    /// Requires `ListenOpts::recv_orig_dst`. Fails if the record is missing, or the platform doesn't deliver it.
    pub fn original_destination(&self) -> io::Result<SocketAddr> {
        sys::parse_original_destination(self.as_bytes())
    }
}

impl Default for ControlMessages {
    fn default() -> ControlMessages {
        ControlMessages {
            buf: ControlBuffer([0u8; CONTROL_BUFFER_SIZE]),
            len: 0,
        }
    }
}

impl fmt::Debug for ControlMessages {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ControlMessages").field("len", &self.len).finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(ErrorKind::ConnectionAborted, "use of closed connection")
}

fn empty_error() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "empty connection")
}

/// UDP socket implementing `DatagramConn`
///
/// `UdpConn::default()` is an empty placeholder, every I/O on it fails with `ErrorKind::NotConnected`.
pub struct UdpConn {
    socket: spin::Mutex<Option<Arc<UdpSocket>>>,
    empty: bool,
    closed: AtomicBool,
    close_notify: Notify,
    read_deadline: spin::Mutex<Option<Instant>>,
    deadline_notify: Notify,
}

impl UdpConn {
    /// Create a socket bound to `addr` with every option in `opts` applied
    ///
    /// Options are applied before `bind()`. The first one failing aborts, no socket is returned.
    pub async fn listen(addr: SocketAddr, opts: &ListenOpts) -> io::Result<UdpConn> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

        let control = platform_control();
        for option in opts.requested_options() {
            if let Err(err) = control.apply(&socket, &addr, option) {
                error!("failed to set {} for UDP socket {}, error: {}", option, addr, err);
                return Err(err);
            }
        }

        if is_dual_stack_addr(&addr) {
            socket_bind_dual_stack(&socket, &addr, opts.ipv6_only)?;
        } else {
            socket.bind(&SockAddr::from(addr))?;
        }

        // UdpSocket::from_std requires socket to be non-blocked
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket.into())?;

        debug!("UDP socket listening on {}, options: {:?}", addr, opts);

        Ok(UdpConn::from_socket(socket))
    }

    /// Create a plain socket bound to `addr`
    pub async fn bind(addr: SocketAddr) -> io::Result<UdpConn> {
        UdpConn::listen(addr, &ListenOpts::default()).await
    }

    /// Wrap a configured socket
    pub fn from_socket(socket: UdpSocket) -> UdpConn {
        UdpConn {
            socket: spin::Mutex::new(Some(Arc::new(socket))),
            empty: false,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            read_deadline: spin::Mutex::new(None),
            deadline_notify: Notify::new(),
        }
    }

    fn socket(&self) -> io::Result<Arc<UdpSocket>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }

        match *self.socket.lock() {
            Some(ref socket) => Ok(socket.clone()),
            None if self.empty => Err(empty_error()),
            None => Err(closed_error()),
        }
    }

    // Run a read operation until it completes, the deadline passes or the connection is closed
    async fn guard_read<F, R>(&self, fut: F) -> io::Result<R>
    where
        F: Future<Output = io::Result<R>>,
    {
        tokio::pin!(fut);

        let closed = self.close_notify.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }

        loop {
            // Registered before reading the deadline, so a concurrent update is never missed
            let changed = self.deadline_notify.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let deadline = *self.read_deadline.lock();
            let expired = async move {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = &mut closed => return Err(closed_error()),
                r = &mut fut => return r,
                _ = &mut changed => continue,
                _ = expired => return Err(io::Error::new(ErrorKind::TimedOut, "i/o timeout")),
            }
        }
    }
}

impl Default for UdpConn {
    fn default() -> UdpConn {
        UdpConn {
            socket: spin::Mutex::new(None),
            empty: true,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            read_deadline: spin::Mutex::new(None),
            deadline_notify: Notify::new(),
        }
    }
}

impl From<UdpSocket> for UdpConn {
    fn from(socket: UdpSocket) -> UdpConn {
        UdpConn::from_socket(socket)
    }
}

impl fmt::Debug for UdpConn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UdpConn")
            .field("socket", &*self.socket.lock())
            .field("empty", &self.empty)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl DatagramConn for UdpConn {
    fn is_empty(&self) -> bool {
        self.empty
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket()?.local_addr()
    }

    fn set_read_deadline(&self, deadline: Option<StdInstant>) -> io::Result<()> {
        self.socket()?;
        *self.read_deadline.lock() = deadline.map(Instant::from_std);
        self.deadline_notify.notify_waiters();
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let socket = self.socket()?;
        self.guard_read(socket.recv_from(buf)).await
    }

    async fn recv_msg(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr, ControlMessages)> {
        let socket = self.socket()?;

        let mut control = ControlMessages::default();
        let (n, addr, control_len) = self
            .guard_read(sys::recv_msg(&socket, buf, &mut control.buf.0))
            .await?;
        control.len = control_len;

        Ok((n, addr, control))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let socket = self.socket()?;
        socket.send_to(buf, target).await
    }

    fn close(&self) -> io::Result<()> {
        if self.empty {
            return Ok(());
        }

        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(closed_error());
        }
        self.close_notify.notify_waiters();

        // Pending reads hold their own reference, the descriptor is closed when the last one returns
        let socket = self.socket.lock().take();
        drop(socket);

        Ok(())
    }
}
