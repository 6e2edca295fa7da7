//! Ordered point-to-point frame transport
//!
//! Each [`Endpoint`] owns one direction's sender and the other direction's
//! receiver, so frames are FIFO per direction and the two sides never share
//! state beyond the channel itself.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecv {
    Empty,
    Closed,
}

#[derive(Debug)]
pub struct Endpoint {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Two connected endpoints: (editor side, render side)
pub fn duplex() -> (Endpoint, Endpoint) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Endpoint { tx: a_tx, rx: b_rx },
        Endpoint { tx: b_tx, rx: a_rx },
    )
}

impl Endpoint {
    /// Queue a frame for the peer. Returns false if the peer is gone.
    pub fn send_frame(&self, frame: String) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Non-blocking receive
    pub fn try_recv_frame(&mut self) -> Result<String, TryRecv> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(frame),
            Err(mpsc::error::TryRecvError::Empty) => Err(TryRecv::Empty),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TryRecv::Closed),
        }
    }

    /// Wait for the next frame; `None` once the peer has gone and every
    /// queued frame was received
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
