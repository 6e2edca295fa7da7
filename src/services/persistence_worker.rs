//! Background persistence thread
//!
//! Store writes never run on the caller's thread unless the caller asks to
//! wait. Jobs are processed in submission order; within one drained batch an
//! unacknowledged shadow write is dropped when a later job for the same path
//! supersedes it, so each path has at most one write in flight and the
//! newest content wins.

use super::oneshot;
use crate::store::SharedDatabase;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowOp {
    Write { content: String, is_dirty: bool },
    Clear,
}

#[derive(Debug)]
pub enum PersistJob {
    Shadow {
        path: PathBuf,
        op: ShadowOp,
        /// Present when the submitter waits for the result
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    AppState {
        key: String,
        value: String,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub shadow_writes: usize,
    pub shadow_clears: usize,
    /// Shadow writes dropped in favour of a newer one for the same path
    pub superseded: usize,
    pub failures: usize,
}

pub struct PersistenceWorker {
    jobs: mpsc::Sender<PersistJob>,
    stats: Arc<Mutex<WorkerStats>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PersistenceWorker {
    pub fn spawn(db: SharedDatabase) -> Result<Self> {
        let (jobs, job_rx) = mpsc::channel();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let thread_stats = Arc::clone(&stats);

        let thread_handle = thread::Builder::new()
            .name("persistence".to_string())
            .spawn(move || {
                worker_loop(&db, &thread_stats, job_rx);
                tracing::info!("Persistence worker shutting down");
            })?;

        tracing::info!("Persistence worker spawned");
        Ok(Self {
            jobs,
            stats,
            thread_handle: Some(thread_handle),
        })
    }

    /// Queue a shadow write without waiting
    pub fn submit_shadow(&self, path: &Path, content: String, is_dirty: bool) {
        let job = PersistJob::Shadow {
            path: path.to_path_buf(),
            op: ShadowOp::Write { content, is_dirty },
            ack: None,
        };
        if self.jobs.send(job).is_err() {
            tracing::warn!("Persistence worker gone, shadow write for {:?} lost", path);
        }
    }

    /// Write a shadow record and wait until it is committed. Runs after
    /// every job queued before it.
    pub fn write_shadow_sync(&self, path: &Path, content: String, is_dirty: bool) -> Result<()> {
        self.run_acked(path, ShadowOp::Write { content, is_dirty })
    }

    pub fn clear_shadow_sync(&self, path: &Path) -> Result<()> {
        self.run_acked(path, ShadowOp::Clear)
    }

    fn run_acked(&self, path: &Path, op: ShadowOp) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(PersistJob::Shadow {
                path: path.to_path_buf(),
                op,
                ack: Some(tx),
            })
            .map_err(|_| anyhow!("Persistence worker not running"))?;
        rx.recv()
            .map_err(|_| anyhow!("Persistence worker stopped before committing"))?
    }

    pub fn set_app_state(&self, key: &str, value: String) {
        let job = PersistJob::AppState {
            key: key.to_string(),
            value,
        };
        if self.jobs.send(job).is_err() {
            tracing::warn!("Persistence worker gone, app state {:?} lost", key);
        }
    }

    pub fn stats(&self) -> WorkerStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Finish every queued job, then stop the thread
    pub fn shutdown(&mut self) {
        let _ = self.jobs.send(PersistJob::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(db: &SharedDatabase, stats: &Mutex<WorkerStats>, jobs: mpsc::Receiver<PersistJob>) {
    while let Ok(first) = jobs.recv() {
        let mut batch = vec![first];
        batch.extend(jobs.try_iter());

        // a later shadow job for the same path makes an unacked write moot
        let superseded: Vec<bool> = batch
            .iter()
            .enumerate()
            .map(|(i, job)| match job {
                PersistJob::Shadow {
                    path,
                    op: ShadowOp::Write { .. },
                    ack: None,
                } => batch[i + 1..].iter().any(
                    |later| matches!(later, PersistJob::Shadow { path: p, .. } if p == path),
                ),
                _ => false,
            })
            .collect();

        for (job, skip) in batch.into_iter().zip(superseded) {
            if skip {
                stats.lock().unwrap_or_else(|e| e.into_inner()).superseded += 1;
                continue;
            }
            if !run_job(db, stats, job) {
                return;
            }
        }
    }
}

/// Returns false on shutdown
fn run_job(db: &SharedDatabase, stats: &Mutex<WorkerStats>, job: PersistJob) -> bool {
    match job {
        PersistJob::Shadow { path, op, ack } => {
            let result = {
                let mut db = db.lock().unwrap_or_else(|e| e.into_inner());
                match &op {
                    ShadowOp::Write { content, is_dirty } => {
                        db.write_shadow(&path, content, *is_dirty)
                    }
                    ShadowOp::Clear => db.clear_shadow(&path).map(|_| ()),
                }
            };
            {
                let mut stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                match (&result, &op) {
                    (Err(_), _) => stats.failures += 1,
                    (Ok(()), ShadowOp::Write { .. }) => stats.shadow_writes += 1,
                    (Ok(()), ShadowOp::Clear) => stats.shadow_clears += 1,
                }
            }
            match &result {
                Ok(()) => tracing::trace!("Shadow {} committed for {:?}", op_name(&op), path),
                Err(e) => tracing::warn!("Shadow {} for {:?} failed: {}", op_name(&op), path, e),
            }
            if let Some(ack) = ack {
                let _ = ack.send(result.map_err(anyhow::Error::from));
            }
            true
        }
        PersistJob::AppState { key, value } => {
            let result = db
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .set_app_state(&key, &value);
            if let Err(e) = result {
                stats.lock().unwrap_or_else(|e| e.into_inner()).failures += 1;
                tracing::warn!("Failed to record app state {:?}: {}", key, e);
            }
            true
        }
        PersistJob::Shutdown => false,
    }
}

fn op_name(op: &ShadowOp) -> &'static str {
    match op {
        ShadowOp::Write { .. } => "write",
        ShadowOp::Clear => "clear",
    }
}
