use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use super::{SocketConfig, SocketOptions, SocketPort};

/// Stream-mode endpoint: one TCP connection per logical port
#[derive(Debug)]
pub struct StreamPort {
    stream: TcpStream,
    peer: SocketAddr,
    rx_timeout: Duration,
}

impl StreamPort {
    pub fn connect(addr: SocketAddr, config: &SocketConfig) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout())?;
        stream.set_read_timeout(Some(config.rx_timeout()))?;
        if config.options.contains(SocketOptions::NODELAY) {
            stream.set_nodelay(true)?;
        }
        Ok(Self {
            stream,
            peer: addr,
            rx_timeout: config.rx_timeout(),
        })
    }
}

impl SocketPort for StreamPort {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.stream).write(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (&self.stream).read(buf)?;
        if n == 0 && !buf.is_empty() {
            // Peer hung up; EOF returns at once, so pace it like an expired deadline
            thread::sleep(self.rx_timeout);
        }
        Ok(n)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}
