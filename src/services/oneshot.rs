//! Single-value reply channel for requests sent to worker threads

use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

pub struct Sender<T>(mpsc::SyncSender<T>);
pub struct Receiver<T>(mpsc::Receiver<T>);

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sender").finish()
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Receiver").finish()
    }
}

impl<T> Sender<T> {
    /// Deliver the reply. Fails with the value if the requester gave up.
    pub fn send(self, value: T) -> Result<(), T> {
        self.0.send(value).map_err(|e| e.0)
    }
}

impl<T> Receiver<T> {
    pub fn recv(self) -> Result<T, mpsc::RecvError> {
        self.0.recv()
    }

    pub fn recv_timeout(self, timeout: Duration) -> Result<T, mpsc::RecvTimeoutError> {
        self.0.recv_timeout(timeout)
    }
}

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Sender(tx), Receiver(rx))
}
