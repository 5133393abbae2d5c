use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use super::{SocketConfig, SocketOptions, SocketPort};

/// Datagram-mode endpoint: a UDP socket bound on the wildcard address at the
/// port's network port, sending every frame to the configured peer
#[derive(Debug)]
pub struct DatagramPort {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl DatagramPort {
    pub fn bind(peer: SocketAddr, config: &SocketConfig) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        if config.options.contains(SocketOptions::REUSE_ADDRESS) {
            socket.set_reuse_address(true)?;
        }
        if config.options.contains(SocketOptions::BROADCAST) {
            socket.set_broadcast(true)?;
        }
        if config.options.contains(SocketOptions::MULTICAST) {
            socket.join_multicast_v4(&config.multicast_group, &Ipv4Addr::UNSPECIFIED)?;
        }

        let local = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), peer.port());
        socket.bind(&local.into())?;

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(config.rx_timeout()))?;
        Ok(Self { socket, peer })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl SocketPort for DatagramPort {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, self.peer)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv_from(buf).map(|(n, _)| n)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    // UDP has nothing to shut down; pending reads end at the receive deadline
    fn shutdown(&self) -> io::Result<()> {
        Ok(())
    }
}
