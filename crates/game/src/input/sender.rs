use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::buffer::InputBuffer;
use super::command::InputCommand;
use crate::net::{DatagramSocket, NetworkStats, TransportError, UdpEndpoint};

pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("could not open input socket on {bind}: {source}")]
    SocketOpen {
        bind: SocketAddr,
        source: TransportError,
    },
    #[error("failed to send input to {remote}: {source}")]
    Send {
        remote: SocketAddr,
        source: TransportError,
    },
}

pub type ErrorHandler = Arc<dyn Fn(&SendError) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub remote: SocketAddr,
    pub bind: SocketAddr,
    pub player_id: u32,
    pub interval: Duration,
}

impl SenderConfig {
    pub fn new(remote: SocketAddr, player_id: u32) -> Self {
        Self {
            remote,
            player_id,
            ..Self::default()
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            remote: SocketAddr::from((Ipv4Addr::LOCALHOST, crate::net::DEFAULT_PORT)),
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            player_id: 0,
            interval: DEFAULT_SEND_INTERVAL,
        }
    }
}

/// Drains an [`InputBuffer`] on a dedicated thread, one command per
/// interval, turning each into an input packet.
pub struct NetworkSender {
    buffer: Arc<InputBuffer>,
    config: SenderConfig,
    socket: Arc<dyn DatagramSocket>,
    owns_socket: bool,
    player_id: Arc<AtomicU32>,
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<NetworkStats>>,
    on_error: Option<ErrorHandler>,
    thread: Option<JoinHandle<()>>,
}

impl NetworkSender {
    /// Sender with its own socket, opened on `start` and closed on `stop`.
    pub fn new(buffer: Arc<InputBuffer>, config: SenderConfig) -> Self {
        Self::build(buffer, config, Arc::new(UdpEndpoint::new()), true)
    }

    /// Sender sharing a socket the caller also receives on. The socket is
    /// left open on `stop`.
    pub fn with_socket(
        buffer: Arc<InputBuffer>,
        config: SenderConfig,
        socket: Arc<dyn DatagramSocket>,
    ) -> Self {
        Self::build(buffer, config, socket, false)
    }

    fn build(
        buffer: Arc<InputBuffer>,
        config: SenderConfig,
        socket: Arc<dyn DatagramSocket>,
        owns_socket: bool,
    ) -> Self {
        Self {
            player_id: Arc::new(AtomicU32::new(config.player_id)),
            buffer,
            config,
            socket,
            owns_socket,
            stop_requested: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(NetworkStats::default())),
            on_error: None,
            thread: None,
        }
    }

    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&SendError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Spawns the send loop. Returns false if already running or if the
    /// socket could not be prepared.
    pub fn start(&mut self) -> bool {
        if self.running.load(Ordering::Acquire) || self.thread.is_some() {
            return false;
        }

        if !self.socket.is_open() {
            if let Err(source) = self.socket.open(self.config.bind) {
                report(
                    self.on_error.as_ref(),
                    SendError::SocketOpen {
                        bind: self.config.bind,
                        source,
                    },
                );
                return false;
            }
        }
        if let Err(source) = self.socket.set_nonblocking(true) {
            report(
                self.on_error.as_ref(),
                SendError::SocketOpen {
                    bind: self.config.bind,
                    source,
                },
            );
            return false;
        }

        self.stop_requested.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);

        let worker = SendLoop {
            buffer: Arc::clone(&self.buffer),
            socket: Arc::clone(&self.socket),
            remote: self.config.remote,
            interval: self.config.interval,
            player_id: Arc::clone(&self.player_id),
            stop_requested: Arc::clone(&self.stop_requested),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            on_error: self.on_error.clone(),
        };

        match thread::Builder::new()
            .name("input-sender".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.thread = Some(handle);
                log::info!(
                    "input sender started: {:?} -> {} every {:?}",
                    self.endpoint(),
                    self.config.remote,
                    self.config.interval
                );
                true
            }
            Err(e) => {
                log::error!("failed to spawn input sender thread: {}", e);
                self.running.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Signals the loop, joins it, and closes an owned socket. Safe to call
    /// repeatedly.
    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        let Some(handle) = self.thread.take() else {
            return;
        };
        if handle.join().is_err() {
            log::error!("input sender thread panicked");
        }
        self.running.store(false, Ordering::Release);
        if self.owns_socket {
            self.socket.close();
        }
        log::info!("input sender stopped");
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_player_id(&self, player_id: u32) {
        self.player_id.store(player_id, Ordering::Relaxed);
    }

    pub fn player_id(&self) -> u32 {
        self.player_id.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.socket.local_endpoint().ok()
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Logs a sender failure and forwards it to the installed handler.
fn report(on_error: Option<&ErrorHandler>, error: SendError) {
    log::warn!("{}", error);
    if let Some(handler) = on_error {
        handler(&error);
    }
}

impl Drop for NetworkSender {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SendLoop {
    buffer: Arc<InputBuffer>,
    socket: Arc<dyn DatagramSocket>,
    remote: SocketAddr,
    interval: Duration,
    player_id: Arc<AtomicU32>,
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<NetworkStats>>,
    on_error: Option<ErrorHandler>,
}

impl SendLoop {
    fn run(self) {
        while !self.stop_requested.load(Ordering::Acquire) {
            let started = Instant::now();

            if let Some(command) = self.buffer.try_pop() {
                self.send(&command);
            }

            let elapsed = started.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.running.store(false, Ordering::Release);
    }

    fn send(&self, command: &InputCommand) {
        let packet = command.to_packet(self.player_id.load(Ordering::Relaxed));
        let data = packet.encode();

        match self.socket.send_to(&data, self.remote) {
            Ok(bytes) => {
                self.stats
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_sent(bytes);
            }
            Err(e) if e.is_transient() => {
                log::trace!("input {} not sent: {}", command.sequence, e);
            }
            Err(source) => {
                self.stats
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_send_error();
                report(
                    self.on_error.as_ref(),
                    SendError::Send {
                        remote: self.remote,
                        source,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TransportResult;
    use std::sync::atomic::AtomicUsize;

    /// Socket that accepts opens but fails every send.
    #[derive(Default)]
    struct FailingSocket {
        open: AtomicBool,
        sends: AtomicUsize,
    }

    impl DatagramSocket for FailingSocket {
        fn open(&self, _bind: SocketAddr) -> TransportResult<()> {
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn set_nonblocking(&self, _enabled: bool) -> TransportResult<()> {
            Ok(())
        }

        fn send_to(&self, _data: &[u8], _destination: SocketAddr) -> TransportResult<usize> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::NetworkDown)
        }

        fn recv_from(&self, _buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
            Err(TransportError::WouldBlock)
        }

        fn local_endpoint(&self) -> TransportResult<SocketAddr> {
            Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, 1)))
        }
    }

    /// Socket whose open always fails.
    struct UnopenableSocket;

    impl DatagramSocket for UnopenableSocket {
        fn open(&self, _bind: SocketAddr) -> TransportResult<()> {
            Err(TransportError::AddressUnavailable)
        }

        fn close(&self) {}

        fn is_open(&self) -> bool {
            false
        }

        fn set_nonblocking(&self, _enabled: bool) -> TransportResult<()> {
            Err(TransportError::NotOpen)
        }

        fn send_to(&self, _data: &[u8], _destination: SocketAddr) -> TransportResult<usize> {
            Err(TransportError::NotOpen)
        }

        fn recv_from(&self, _buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
            Err(TransportError::NotOpen)
        }

        fn local_endpoint(&self) -> TransportResult<SocketAddr> {
            Err(TransportError::NotOpen)
        }
    }

    fn fast_config() -> SenderConfig {
        SenderConfig {
            interval: Duration::from_millis(1),
            ..SenderConfig::default()
        }
    }

    #[test]
    fn test_send_failures_reach_handler_and_loop_survives() {
        let buffer = Arc::new(InputBuffer::new());
        let socket = Arc::new(FailingSocket::default());
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);

        let mut sender =
            NetworkSender::with_socket(Arc::clone(&buffer), fast_config(), socket.clone())
                .with_error_handler(move |e| {
                    assert!(matches!(
                        e,
                        SendError::Send {
                            source: TransportError::NetworkDown,
                            ..
                        }
                    ));
                    counter.fetch_add(1, Ordering::SeqCst);
                });

        for seq in 1..=3 {
            buffer.push(InputCommand::new(seq, crate::net::InputFlags::FIRE));
        }
        assert!(sender.start());

        let deadline = Instant::now() + Duration::from_secs(2);
        while failures.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(failures.load(Ordering::SeqCst), 3);
        assert!(sender.running());
        assert_eq!(sender.stats().send_errors, 3);

        sender.stop();
        assert!(!sender.running());
        assert!(socket.is_open());
    }

    #[test]
    fn test_start_fails_when_socket_cannot_open() {
        let buffer = Arc::new(InputBuffer::new());
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);

        let mut sender =
            NetworkSender::with_socket(buffer, fast_config(), Arc::new(UnopenableSocket))
                .with_error_handler(move |e| {
                    assert!(matches!(e, SendError::SocketOpen { .. }));
                    counter.fetch_add(1, Ordering::SeqCst);
                });

        assert!(!sender.start());
        assert!(!sender.running());
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_twice_and_stop_idempotent() {
        let buffer = Arc::new(InputBuffer::new());
        let socket = Arc::new(FailingSocket::default());
        let mut sender = NetworkSender::with_socket(buffer, fast_config(), socket);

        sender.stop();
        assert!(sender.start());
        assert!(!sender.start());
        sender.stop();
        sender.stop();
        assert!(!sender.running());
        assert!(sender.start());
    }

    #[test]
    fn test_player_id_can_change_while_running() {
        let buffer = Arc::new(InputBuffer::new());
        let mut sender =
            NetworkSender::with_socket(buffer, fast_config(), Arc::new(FailingSocket::default()));
        assert!(sender.start());
        sender.set_player_id(12);
        assert_eq!(sender.player_id(), 12);
    }
}
