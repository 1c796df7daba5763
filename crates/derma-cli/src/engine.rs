//! Bounded pool of analysis workers.
//!
//! Analyses are CPU bound, so they run on dedicated OS threads rather than on
//! the async runtime. All workers pull from one bounded queue; callers get
//! their report back over a oneshot channel.

use derma_core::{AnalysisReport, SkinAnalyzer};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analysis queue is full")]
    QueueFull,
    #[error("analysis workers exited")]
    ChannelClosed,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct AnalyzeRequest {
    image_data: String,
    reply: oneshot::Sender<AnalysisReport>,
}

/// Clone-safe handle to the worker pool. The queue closes once every clone
/// is dropped.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<AnalyzeRequest>,
    reject_when_full: bool,
}

impl EngineHandle {
    /// Queue one encoded image and wait for its report.
    ///
    /// When the queue is full this waits for room, or fails with
    /// `QueueFull` if the pool was started with `reject_when_full`.
    pub async fn analyze(&self, image_data: String) -> Result<AnalysisReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = AnalyzeRequest {
            image_data,
            reply: reply_tx,
        };

        if self.reject_when_full {
            self.tx.try_send(request).map_err(|err| match err {
                TrySendError::Full(_) => EngineError::QueueFull,
                TrySendError::Closed(_) => EngineError::ChannelClosed,
            })?;
        } else {
            self.tx
                .send(request)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
        }

        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// The worker threads behind an `EngineHandle`.
pub struct WorkerPool {
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Block until every worker has drained the queue and exited. Only
    /// returns after all `EngineHandle` clones are dropped.
    pub fn join(self) {
        for thread in self.threads {
            if thread.join().is_err() {
                tracing::warn!("analysis worker panicked");
            }
        }
    }
}

/// Start `workers` analysis threads sharing one queue of `queue_depth`
/// pending requests.
pub fn spawn_pool(
    analyzer: Arc<SkinAnalyzer>,
    workers: usize,
    queue_depth: usize,
    reject_when_full: bool,
) -> Result<(EngineHandle, WorkerPool), EngineError> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<AnalyzeRequest>(queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));

    let mut threads = Vec::with_capacity(workers);
    for id in 0..workers {
        let rx = Arc::clone(&rx);
        let analyzer = Arc::clone(&analyzer);
        let thread = std::thread::Builder::new()
            .name(format!("derma-worker-{id}"))
            .spawn(move || run_worker(id, &analyzer, &rx))?;
        threads.push(thread);
    }

    tracing::info!(workers, queue_depth, reject_when_full, "analysis pool started");
    Ok((
        EngineHandle {
            tx,
            reject_when_full,
        },
        WorkerPool { threads },
    ))
}

fn run_worker(id: usize, analyzer: &SkinAnalyzer, rx: &Mutex<mpsc::Receiver<AnalyzeRequest>>) {
    tracing::debug!(worker = id, "worker started");
    loop {
        // One idle worker waits on the queue while holding the lock; the
        // rest wait on the lock.
        let request = {
            let Ok(mut rx) = rx.lock() else { break };
            rx.blocking_recv()
        };
        let Some(request) = request else { break };

        let started = Instant::now();
        let report = analyzer.analyze(&request.image_data);
        tracing::debug!(
            worker = id,
            success = report.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        // Receiver gone means the caller gave up; nothing to do.
        let _ = request.reply.send(report);
    }
    tracing::debug!(worker = id, "worker exiting");
}
