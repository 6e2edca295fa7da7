//! Isolated rendering context
//!
//! The surface runs on its own thread with a current-thread tokio runtime.
//! The only ways in are sync-channel frames from the editor and
//! [`HostRequest`]s from whoever drives the rendered view (a UI, or a test).

use super::surface::{PreviewSurface, SurfaceSnapshot, UserAction};
use crate::services::oneshot;
use crate::sync::protocol::{self, EditorMessage, PreviewMessage};
use crate::sync::transport::Endpoint;
use anyhow::{anyhow, Result};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug)]
enum HostRequest {
    Interact(UserAction),
    Snapshot(oneshot::Sender<SurfaceSnapshot>),
    /// Announce readiness again, as a reloaded view would
    Reload,
    Shutdown,
}

pub struct PreviewHost {
    requests: mpsc::UnboundedSender<HostRequest>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PreviewHost {
    /// Start the rendering context on `endpoint`. It announces
    /// `preview-ready` as soon as its surface exists.
    pub fn spawn(endpoint: Endpoint) -> Result<Self> {
        let (requests, request_rx) = mpsc::unbounded_channel();

        let thread_handle = thread::Builder::new()
            .name("preview-host".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("Failed to create preview runtime: {}", e);
                        return;
                    }
                };
                rt.block_on(host_loop(endpoint, request_rx));
                tracing::info!("Preview host shutting down");
            })?;

        tracing::info!("Preview host spawned");

        Ok(Self {
            requests,
            thread_handle: Some(thread_handle),
        })
    }

    /// Perform a user interaction on the rendered view (fire-and-forget)
    pub fn interact(&self, action: UserAction) {
        if self.requests.send(HostRequest::Interact(action)).is_err() {
            tracing::debug!("Preview host gone, interaction dropped");
        }
    }

    /// Make the rendering context announce `preview-ready` again
    pub fn reload(&self) {
        let _ = self.requests.send(HostRequest::Reload);
    }

    /// Current state of the surface
    pub fn snapshot(&self, timeout: Duration) -> Result<SurfaceSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(HostRequest::Snapshot(tx))
            .map_err(|_| anyhow!("Preview host not running"))?;
        rx.recv_timeout(timeout)
            .map_err(|_| anyhow!("Preview host did not answer within {:?}", timeout))
    }

    /// Poll snapshots until `predicate` holds or `timeout` passes
    pub fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&SurfaceSnapshot) -> bool,
    ) -> Result<SurfaceSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot(timeout)?;
            if predicate(&snapshot) {
                return Ok(snapshot);
            }
            if Instant::now() >= deadline {
                return Err(anyhow!("Preview surface did not reach expected state"));
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn shutdown(&mut self) {
        let _ = self.requests.send(HostRequest::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PreviewHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn host_loop(mut endpoint: Endpoint, mut requests: mpsc::UnboundedReceiver<HostRequest>) {
    let mut surface = PreviewSurface::new();
    let mut channel_open = true;
    send(&endpoint, &PreviewMessage::PreviewReady);

    loop {
        tokio::select! {
            frame = endpoint.recv_frame(), if channel_open => match frame {
                Some(frame) => match protocol::decode::<EditorMessage>(&frame) {
                    Ok(message) => {
                        tracing::trace!("Editor message: {:?}", message);
                        surface.handle(message);
                    }
                    Err(e) => tracing::warn!("Dropping malformed editor frame: {}", e),
                },
                None => {
                    tracing::info!("Editor side of the preview channel closed");
                    channel_open = false;
                }
            },
            request = requests.recv() => match request {
                Some(HostRequest::Interact(action)) => {
                    for message in surface.interact(action) {
                        send(&endpoint, &message);
                    }
                }
                Some(HostRequest::Snapshot(reply)) => {
                    let _ = reply.send(surface.snapshot());
                }
                Some(HostRequest::Reload) => send(&endpoint, &PreviewMessage::PreviewReady),
                Some(HostRequest::Shutdown) | None => break,
            },
        }
    }
}

fn send(endpoint: &Endpoint, message: &PreviewMessage) {
    match protocol::encode(message) {
        Ok(frame) => {
            if !endpoint.send_frame(frame) {
                tracing::debug!("Editor gone, dropping {:?}", message);
            }
        }
        Err(e) => tracing::warn!("Failed to encode preview message: {}", e),
    }
}
