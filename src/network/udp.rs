//! UDP socket setup for inbound audio

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::NetworkError;

/// Read timeout so receive threads can notice a stop request
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bind a UDP socket for audio ingress
///
/// The socket is blocking with a short read timeout. A receive buffer size
/// the OS refuses is logged and otherwise ignored.
pub fn create_socket(addr: SocketAddr, recv_buffer_size: usize) -> Result<UdpSocket, NetworkError> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
        warn!("Failed to set receive buffer to {} bytes: {}", recv_buffer_size, e);
    }
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    let socket: UdpSocket = socket.into();
    socket
        .set_read_timeout(Some(RECV_POLL_INTERVAL))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    debug!("UDP audio socket bound to {}", addr);
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let socket = create_socket("127.0.0.1:0".parse().unwrap(), 1 << 20).unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.port() > 0);
        assert_eq!(socket.read_timeout().unwrap(), Some(RECV_POLL_INTERVAL));
    }
}
