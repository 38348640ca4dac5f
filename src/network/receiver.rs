//! UDP audio receiver
//!
//! Each datagram carries raw little-endian `f32` samples (512 per packet in
//! the usual configuration). Packets are decoded on a dedicated thread and
//! handed to the [`AudioBridge`] in arrival order.

use bytes::Buf;
use crossbeam_channel::{bounded, Receiver};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::audio::AudioBridge;
use crate::error::NetworkError;

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();
const MAX_DATAGRAM: usize = 65_507;

/// Decode one datagram into `out`, replacing its contents
///
/// Empty packets and packets whose length is not a whole number of
/// samples are rejected.
pub fn decode_packet(packet: &[u8], out: &mut Vec<f32>) -> Result<(), NetworkError> {
    if packet.is_empty() || packet.len() % SAMPLE_BYTES != 0 {
        return Err(NetworkError::InvalidPacket(packet.len()));
    }
    out.clear();
    let mut buf = packet;
    while buf.has_remaining() {
        out.push(buf.get_f32_le());
    }
    Ok(())
}

/// Receiver statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub samples_received: u64,
    pub invalid_packets: u64,
}

#[derive(Default)]
struct Counters {
    packets: AtomicU64,
    samples: AtomicU64,
    invalid: AtomicU64,
}

/// Receives audio datagrams and feeds them to a bridge
pub struct AudioReceiver {
    socket: Arc<UdpSocket>,
    bridge: Arc<AudioBridge>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<NetworkError>>,
}

impl AudioReceiver {
    pub fn new(socket: UdpSocket, bridge: Arc<AudioBridge>) -> Self {
        Self {
            socket: Arc::new(socket),
            bridge,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            thread_handle: None,
            error_rx: None,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))
    }

    /// Start the receive thread
    pub fn start(&mut self) -> Result<(), NetworkError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (error_tx, error_rx) = bounded::<NetworkError>(16);
        self.error_rx = Some(error_rx);

        let socket = self.socket.clone();
        let bridge = self.bridge.clone();
        let running = self.running.clone();
        let counters = self.counters.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("udp-audio-rx".into())
            .spawn(move || {
                let mut datagram = vec![0u8; MAX_DATAGRAM];
                let mut samples = Vec::with_capacity(MAX_DATAGRAM / SAMPLE_BYTES);

                while running.load(Ordering::Relaxed) {
                    let len = match socket.recv_from(&mut datagram) {
                        Ok((len, _from)) => len,
                        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                            continue;
                        }
                        Err(e) => {
                            let _ = error_tx.try_send(NetworkError::ReceiveFailed(e.to_string()));
                            continue;
                        }
                    };

                    match decode_packet(&datagram[..len], &mut samples) {
                        Ok(()) => {
                            counters.packets.fetch_add(1, Ordering::Relaxed);
                            counters.samples.fetch_add(samples.len() as u64, Ordering::Relaxed);
                            bridge.on_network_batch(&samples);
                        }
                        Err(e) => {
                            counters.invalid.fetch_add(1, Ordering::Relaxed);
                            debug!("Dropping datagram: {}", e);
                        }
                    }
                }
            })
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        self.thread_handle = Some(handle);
        info!("Audio receiver listening on {:?}", self.socket.local_addr().ok());
        Ok(())
    }

    /// Stop the receive thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drain socket errors reported by the receive thread
    pub fn check_errors(&self) -> Vec<NetworkError> {
        let errors: Vec<NetworkError> = self
            .error_rx
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for e in &errors {
            warn!("Receiver error: {}", e);
        }
        errors
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            packets_received: self.counters.packets.load(Ordering::Relaxed),
            samples_received: self.counters.samples.load(Ordering::Relaxed),
            invalid_packets: self.counters.invalid.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AudioReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
