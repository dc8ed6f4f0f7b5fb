use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

/// Platform-independent failure reasons for datagram I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TransportError {
    #[error("operation would block")]
    WouldBlock,
    #[error("operation interrupted")]
    Interrupted,
    #[error("datagram too large for the socket")]
    MessageTooLong,
    #[error("network is down or unreachable")]
    NetworkDown,
    #[error("address unavailable or in use")]
    AddressUnavailable,
    #[error("permission denied")]
    PermissionDenied,
    #[error("out of buffer memory")]
    OutOfMemory,
    #[error("socket is not open")]
    NotOpen,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("unknown socket error")]
    Unknown,
}

impl TransportError {
    /// Errors after which the same call may succeed on retry.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::WouldBlock | Self::Interrupted)
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}

impl From<&io::Error> for TransportError {
    fn from(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            if is_message_too_long(code) {
                return Self::MessageTooLong;
            }
            if is_no_buffer_space(code) {
                return Self::OutOfMemory;
            }
        }

        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WouldBlock,
            io::ErrorKind::Interrupted => Self::Interrupted,
            io::ErrorKind::NetworkDown
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::ConnectionRefused => Self::NetworkDown,
            io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => {
                Self::AddressUnavailable
            }
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            io::ErrorKind::NotConnected => Self::NotOpen,
            io::ErrorKind::InvalidInput => Self::InvalidArgument,
            _ => Self::Unknown,
        }
    }
}

fn is_message_too_long(code: i32) -> bool {
    if cfg!(target_os = "linux") || cfg!(target_os = "android") {
        code == 90
    } else if cfg!(windows) {
        code == 10040
    } else if cfg!(unix) {
        code == 40
    } else {
        false
    }
}

fn is_no_buffer_space(code: i32) -> bool {
    if cfg!(target_os = "linux") || cfg!(target_os = "android") {
        code == 105
    } else if cfg!(windows) {
        code == 10055
    } else if cfg!(unix) {
        code == 55
    } else {
        false
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A connectionless datagram socket. Implementations are shared between the
/// sender thread and the receive path, so every operation takes `&self`.
pub trait DatagramSocket: Send + Sync {
    fn open(&self, bind: SocketAddr) -> TransportResult<()>;

    fn close(&self);

    fn is_open(&self) -> bool;

    fn set_nonblocking(&self, enabled: bool) -> TransportResult<()>;

    fn send_to(&self, data: &[u8], destination: SocketAddr) -> TransportResult<usize>;

    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)>;

    fn local_endpoint(&self) -> TransportResult<SocketAddr>;
}

/// [`DatagramSocket`] over the standard library UDP socket.
#[derive(Debug, Default)]
pub struct UdpEndpoint {
    socket: RwLock<Option<UdpSocket>>,
}

impl UdpEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a non-blocking endpoint bound to `addr`.
    pub fn bind(addr: SocketAddr) -> TransportResult<Self> {
        let endpoint = Self::new();
        endpoint.open(addr)?;
        endpoint.set_nonblocking(true)?;
        Ok(endpoint)
    }

    fn with_socket<T>(&self, f: impl FnOnce(&UdpSocket) -> io::Result<T>) -> TransportResult<T> {
        let guard = self.socket.read().unwrap_or_else(PoisonError::into_inner);
        let socket = guard.as_ref().ok_or(TransportError::NotOpen)?;
        f(socket).map_err(TransportError::from)
    }

    /// Reads every datagram queued on a non-blocking socket, handing each to
    /// `on_datagram`. Returns how many were read.
    pub fn drain(
        &self,
        buf: &mut [u8],
        mut on_datagram: impl FnMut(&[u8], SocketAddr),
    ) -> TransportResult<usize> {
        let mut count = 0;
        loop {
            match self.recv_from(buf) {
                Ok((size, from)) => {
                    count += 1;
                    on_datagram(&buf[..size], from);
                }
                Err(TransportError::WouldBlock) => break,
                Err(TransportError::Interrupted) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }
}

impl DatagramSocket for UdpEndpoint {
    fn open(&self, bind: SocketAddr) -> TransportResult<()> {
        let mut guard = self.socket.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(bind)?;
        log::debug!("udp endpoint bound to {:?}", socket.local_addr().ok());
        *guard = Some(socket);
        Ok(())
    }

    fn close(&self) {
        let mut guard = self.socket.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            log::debug!("udp endpoint closed");
        }
    }

    fn is_open(&self) -> bool {
        self.socket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set_nonblocking(&self, enabled: bool) -> TransportResult<()> {
        self.with_socket(|s| s.set_nonblocking(enabled))
    }

    fn send_to(&self, data: &[u8], destination: SocketAddr) -> TransportResult<usize> {
        self.with_socket(|s| s.send_to(data, destination))
    }

    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        self.with_socket(|s| s.recv_from(buf))
    }

    fn local_endpoint(&self) -> TransportResult<SocketAddr> {
        self.with_socket(UdpSocket::local_addr)
    }
}
