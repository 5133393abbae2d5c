use cansock::data_link::{PACKED_FRAME_SIZE, STRUCTURED_FRAME_SIZE};
use cansock::error::SocketCanError;
use cansock::types::{BusId, CanId, Frame, RxNotification};
use cansock::{
    CanDevice, FrameCodec, SocketCan, SocketCanConfig, SocketConfig, SocketMode, SocketOptions,
    WireFormat,
};
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Received = Arc<Mutex<Vec<(BusId, CanId, u8, Vec<u8>)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn recorder() -> (Received, RxNotification) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let callback: RxNotification =
        Box::new(move |bus_id: BusId, can_id: CanId, dlc: u8, data: &[u8]| {
            sink.lock()
                .unwrap()
                .push((bus_id, can_id, dlc, data.to_vec()));
        });
    (received, callback)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn stream_device(base_port: u16, wire_format: WireFormat) -> SocketCan {
    SocketCan::new(SocketCanConfig {
        socket: SocketConfig {
            base_port,
            ..Default::default()
        },
        wire_format,
    })
    .unwrap()
}

/// Accepts one connection and echoes every fixed-size frame back
fn spawn_echo_peer(listener: TcpListener, frame_size: usize) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = vec![0u8; frame_size];
        let mut echoed = 0;
        while stream.read_exact(&mut buf).is_ok() {
            if stream.write_all(&buf).is_err() {
                break;
            }
            echoed += 1;
        }
        echoed
    })
}

/// Accepts one connection and sends the given frames, then waits for EOF
fn spawn_sending_peer(listener: TcpListener, frames: Vec<Vec<u8>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for frame in frames {
            stream.write_all(&frame).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        let mut sink = [0u8; 1];
        let _ = stream.read(&mut sink);
    })
}

fn packed(id: CanId, data: &[u8]) -> Vec<u8> {
    let frame = Frame::new(id, data).unwrap();
    WireFormat::PackedTail.codec().encode_to_vec(&frame).unwrap()
}

#[test]
fn test_end_to_end_echo() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer_port = listener.local_addr().unwrap().port();
    let peer = spawn_echo_peer(listener, PACKED_FRAME_SIZE);

    // Logical port 1 maps onto the peer's port
    let can = stream_device(peer_port - 1, WireFormat::PackedTail);
    let (received, callback) = recorder();

    can.probe(3, 1, 500_000, callback).unwrap();
    assert!(can.is_running());
    assert_eq!(can.connection_info(1).unwrap().peer.port(), peer_port);

    can.write(3, 1, 0x123, 3, &[0xAA, 0xBB, 0xCC]).unwrap();

    assert!(wait_until(|| !received.lock().unwrap().is_empty()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        *received.lock().unwrap(),
        vec![(3, 0x123, 3, vec![0xAA, 0xBB, 0xCC])]
    );

    can.close(3, 1);
    assert!(!can.is_running());
    assert!(matches!(
        can.write(3, 1, 0x123, 3, &[0xAA, 0xBB, 0xCC]),
        Err(SocketCanError::NotOpen { port: 1 })
    ));

    assert_eq!(peer.join().unwrap(), 1);
}

#[test]
fn test_end_to_end_structured_echo() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer_port = listener.local_addr().unwrap().port();
    let peer = spawn_echo_peer(listener, STRUCTURED_FRAME_SIZE);

    let can = stream_device(peer_port - 2, WireFormat::Structured);
    let (received, callback) = recorder();

    can.probe(0, 2, 250_000, callback).unwrap();
    let payload: Vec<u8> = (0..64).collect();
    can.write(0, 2, 0x1FFF_FFFF, 64, &payload).unwrap();

    assert!(wait_until(|| !received.lock().unwrap().is_empty()));
    assert_eq!(
        received.lock().unwrap()[0],
        (0, 0x1FFF_FFFF, 64, payload.clone())
    );

    can.close(0, 2);
    assert_eq!(peer.join().unwrap(), 1);
}

#[test]
fn test_fan_out_over_two_peers() {
    init_tracing();
    let listener_a = TcpListener::bind("127.0.0.1:0").unwrap();
    let listener_b = TcpListener::bind("127.0.0.1:0").unwrap();
    let port_a = listener_a.local_addr().unwrap().port();
    let port_b = listener_b.local_addr().unwrap().port();

    // Logical ports are offsets from a shared base below both peers
    let base = port_a.min(port_b) - 1;
    let logical_a = u32::from(port_a - base);
    let logical_b = u32::from(port_b - base);

    let frames_a: Vec<Vec<u8>> = (0..5u8)
        .map(|i| packed(0x100 + u32::from(i), &[i]))
        .collect();
    let frames_b: Vec<Vec<u8>> = (0..5u8)
        .map(|i| packed(0x200 + u32::from(i), &[i, i]))
        .collect();
    let peer_a = spawn_sending_peer(listener_a, frames_a);
    let peer_b = spawn_sending_peer(listener_b, frames_b);

    let can = stream_device(base, WireFormat::PackedTail);
    let (rx_a, cb_a) = recorder();
    let (rx_b, cb_b) = recorder();
    can.probe(1, logical_a, 500_000, cb_a).unwrap();
    can.probe(2, logical_b, 500_000, cb_b).unwrap();

    assert!(wait_until(|| {
        rx_a.lock().unwrap().len() == 5 && rx_b.lock().unwrap().len() == 5
    }));

    let a = rx_a.lock().unwrap().clone();
    let b = rx_b.lock().unwrap().clone();
    assert!(a
        .iter()
        .all(|(bus, id, _, data)| *bus == 1 && (0x100..0x105).contains(id) && data.len() == 1));
    assert!(b
        .iter()
        .all(|(bus, id, _, data)| *bus == 2 && (0x200..0x205).contains(id) && data.len() == 2));

    can.close(1, logical_a);
    can.close(2, logical_b);
    peer_a.join().unwrap();
    peer_b.join().unwrap();
}

#[test]
fn test_connect_refused() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let free_port = listener.local_addr().unwrap().port();
    drop(listener);

    let can = stream_device(free_port, WireFormat::PackedTail);
    let (_received, callback) = recorder();

    assert!(matches!(
        can.probe(0, 0, 500_000, callback),
        Err(SocketCanError::ConnectFailed { port: 0, .. })
    ));
    assert!(!can.is_open(0));
    assert!(!can.is_running());
}

#[test]
fn test_datagram_loopback() {
    init_tracing();
    let probe_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let udp_port = probe_socket.local_addr().unwrap().port();
    drop(probe_socket);

    let can = SocketCan::new(SocketCanConfig {
        socket: SocketConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: udp_port - 1,
            mode: SocketMode::Datagram,
            options: SocketOptions::REUSE_ADDRESS,
            ..SocketConfig::datagram()
        },
        wire_format: WireFormat::PackedTail,
    })
    .unwrap();
    let (received, callback) = recorder();

    can.probe(9, 1, 500_000, callback).unwrap();
    // The bound socket also hears its own datagrams
    can.write(9, 1, 0x7E0, 2, &[0x02, 0x10]).unwrap();

    assert!(wait_until(|| !received.lock().unwrap().is_empty()));
    assert_eq!(received.lock().unwrap()[0], (9, 0x7E0, 2, vec![0x02, 0x10]));

    can.close(9, 1);
    assert!(!can.is_running());
}

/// Base port such that logical ports 1 and 2 both map to free UDP ports
fn free_udp_base() -> u16 {
    for _ in 0..32 {
        let first = UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = first.local_addr().unwrap().port();
        if port == u16::MAX {
            continue;
        }
        if UdpSocket::bind(("0.0.0.0", port + 1)).is_ok() {
            return port - 1;
        }
    }
    panic!("no pair of adjacent free UDP ports");
}

#[test]
fn test_datagram_close_releases_port() {
    init_tracing();
    let base = free_udp_base();
    let can = SocketCan::new(SocketCanConfig {
        socket: SocketConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: base,
            mode: SocketMode::Datagram,
            options: SocketOptions::NONE,
            ..SocketConfig::datagram()
        },
        wire_format: WireFormat::PackedTail,
    })
    .unwrap();

    can.probe(0, 1, 500_000, recorder().1).unwrap();
    can.probe(0, 2, 500_000, recorder().1).unwrap();

    for _ in 0..50 {
        thread::sleep(Duration::from_millis(7));
        can.close(0, 1);
        // Without SO_REUSEADDR this only binds once the socket is gone
        drop(UdpSocket::bind(("0.0.0.0", base + 1)).unwrap());
        can.probe(0, 1, 500_000, recorder().1).unwrap();
    }

    assert!(can.is_running());
    can.close(0, 1);
    can.close(0, 2);
    assert!(!can.is_running());
}

#[test]
fn test_global_device_is_shared() {
    let first = SocketCan::global();
    let second = SocketCan::global();
    assert!(std::ptr::eq(first, second));
    assert_eq!(first.name(), "socket");
    assert_eq!(first.config().socket.base_port, 80);
}
