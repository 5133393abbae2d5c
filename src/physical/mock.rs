use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Connector, SocketConfig, SocketPort};
use crate::types::PortNumber;

/// Time an empty mock receive waits before reporting the deadline
const MOCK_RX_DEADLINE: Duration = Duration::from_millis(1);

/// In-memory socket endpoint for testing
#[derive(Debug)]
pub struct MockPort {
    peer: SocketAddr,
    echo: bool,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    shut_down: AtomicBool,
    fail_send: AtomicBool,
    fail_recv: AtomicBool,
    short_send: AtomicBool,
    recv_calls: AtomicUsize,
}

impl MockPort {
    /// Creates a mock endpoint; with `echo` every sent buffer comes back
    pub fn new(peer: SocketAddr, echo: bool) -> Self {
        Self {
            peer,
            echo,
            inbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_recv: AtomicBool::new(false),
            short_send: AtomicBool::new(false),
            recv_calls: AtomicUsize::new(0),
        }
    }

    /// Queues raw bytes for the next receive
    pub fn push_inbound(&self, bytes: Vec<u8>) {
        self.inbound.lock().push_back(bytes);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_recv(&self, fail: bool) {
        self.fail_recv.store(fail, Ordering::SeqCst);
    }

    /// Makes every send accept one byte less than offered
    pub fn set_short_send(&self, short: bool) {
        self.short_send.store(short, Ordering::SeqCst);
    }

    pub fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }
}

impl SocketPort for MockPort {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.is_shut_down() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "mock send failure"));
        }

        self.sent.lock().push(buf.to_vec());
        if self.echo {
            self.push_inbound(buf.to_vec());
        }

        if self.short_send.load(Ordering::SeqCst) {
            Ok(buf.len().saturating_sub(1))
        } else {
            Ok(buf.len())
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_shut_down() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        if self.fail_recv.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "mock receive failure"));
        }

        let next = self.inbound.lock().pop_front();
        match next {
            Some(bytes) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            None => {
                thread::sleep(MOCK_RX_DEADLINE);
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn shutdown(&self) -> io::Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl SocketPort for Arc<MockPort> {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.as_ref().send(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.as_ref().recv(buf)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.as_ref().peer_addr()
    }

    fn shutdown(&self) -> io::Result<()> {
        self.as_ref().shutdown()
    }
}

/// Mock connector handing out [`MockPort`]s; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    echo: bool,
    ports: Arc<Mutex<HashMap<PortNumber, Arc<MockPort>>>>,
    refused: Arc<Mutex<HashSet<PortNumber>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector whose ports echo every sent frame back
    pub fn new_echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Makes future connects to `port` fail
    pub fn refuse(&self, port: PortNumber) {
        self.refused.lock().insert(port);
    }

    /// Most recently opened endpoint for `port`
    pub fn port(&self, port: PortNumber) -> Option<Arc<MockPort>> {
        self.ports.lock().get(&port).cloned()
    }

    /// Number of distinct ports ever connected
    pub fn opened_ports(&self) -> usize {
        self.ports.lock().len()
    }
}

impl Connector for MockConnector {
    fn connect(&self, port: PortNumber) -> io::Result<Box<dyn SocketPort>> {
        if self.refused.lock().contains(&port) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }

        let peer = SocketConfig::default().port_address(port)?;
        let mock = Arc::new(MockPort::new(peer, self.echo));
        self.ports.lock().insert(port, Arc::clone(&mock));
        Ok(Box::new(mock))
    }
}
