//! In-process data channel pair
//!
//! Messages written on one end arrive on the other end's inbox in send
//! order. Both ends share one open flag, mirroring a single negotiated
//! channel that opens and closes for both peers at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::sync::channel::DataChannel;

/// One end of an in-process data channel
pub struct LoopbackChannel {
    peer_inbox: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

/// A channel end together with the receiver of messages sent to it
pub type LoopbackEnd = (LoopbackChannel, mpsc::UnboundedReceiver<String>);

impl LoopbackChannel {
    /// Create two connected ends; the channel starts closed
    pub fn pair() -> (LoopbackEnd, LoopbackEnd) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        let a = LoopbackChannel {
            peer_inbox: b_tx,
            open: open.clone(),
        };
        let b = LoopbackChannel {
            peer_inbox: a_tx,
            open,
        };
        ((a, a_rx), (b, b_rx))
    }

    /// Mark the channel open on both ends
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }
}

impl DataChannel for LoopbackChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send_text(&self, text: String) -> Result<(), SyncError> {
        if !self.is_open() {
            return Err(SyncError::ChannelClosed);
        }
        self.peer_inbox
            .send(text)
            .map_err(|_| SyncError::ChannelClosed)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order_once_open() {
        let ((a, _a_rx), (b, mut b_rx)) = LoopbackChannel::pair();
        assert!(matches!(a.send_text("early".into()), Err(SyncError::ChannelClosed)));

        b.open();
        assert!(a.is_open());
        a.send_text("one".into()).unwrap();
        a.send_text("two".into()).unwrap();
        assert_eq!(b_rx.try_recv().unwrap(), "one");
        assert_eq!(b_rx.try_recv().unwrap(), "two");

        a.close();
        assert!(!b.is_open());
    }
}
