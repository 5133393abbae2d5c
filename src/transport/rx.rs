use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::registry::{PortConnection, Registry};
use crate::data_link::FrameCodec;
use crate::error::SocketCanError;

const RX_THREAD_NAME: &str = "cansock-rx";

/// Handle to the background receive thread.
///
/// Every spawned loop owns its own stop flag, so a loop that is still
/// finishing its last sweep never picks up a restart meant for its successor.
#[derive(Debug)]
pub(crate) struct RxDaemon {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RxDaemon {
    pub(crate) fn spawn(
        registry: Arc<Mutex<Registry>>,
        codec: Arc<dyn FrameCodec>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(RX_THREAD_NAME.to_string())
            .spawn(move || rx_daemon(&registry, codec.as_ref(), &flag))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Asks the loop to exit after the connection it is currently visiting
    pub(crate) fn terminate(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Terminates and waits for the loop, unless called from the loop itself
    pub(crate) fn join(mut self) {
        self.terminate();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Closed from inside a receive callback; the loop exits on return
            return;
        }
        if handle.join().is_err() {
            warn!("CAN socket receive thread panicked");
        }
    }
}

fn rx_daemon(registry: &Mutex<Registry>, codec: &dyn FrameCodec, stop: &AtomicBool) {
    debug!("CAN socket receive loop started");
    let mut buf = vec![0u8; codec.frame_size()];

    while !stop.load(Ordering::Acquire) {
        let connections = registry.lock().snapshot();
        for connection in &connections {
            if stop.load(Ordering::Acquire) {
                break;
            }
            rx_notify(connection, codec, &mut buf);
        }
    }

    debug!("CAN socket receive loop stopped");
}

/// One receive attempt on one connection
fn rx_notify(connection: &PortConnection, codec: &dyn FrameCodec, buf: &mut [u8]) {
    if connection.is_closed() {
        return;
    }

    let port = connection.port();
    match connection.recv(buf) {
        Ok(n) if n == buf.len() => match codec.decode(buf) {
            Ok(frame) => {
                trace!(
                    port,
                    can_id = frame.id(),
                    dlc = frame.dlc(),
                    "CAN socket frame received"
                );
                connection.notify(&frame);
            }
            Err(err) => trace!(port, error = %err, "dropping undecodable CAN frame"),
        },
        // Partial read, or EOF from a peer that hung up; nothing to deliver
        Ok(n) => trace!(port, len = n, "ignoring CAN socket read of invalid length"),
        Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
        Err(source) => {
            if connection.is_closed() {
                return;
            }
            let err = SocketCanError::ReceiveError { port, source };
            warn!(port, error = %err, "CAN socket read message failed");
        }
    }
}
