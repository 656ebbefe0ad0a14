use std::time::Instant;

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::request::RequestTask;
use crate::core::session::SessionManager;

/// Fixed set of workers draining the task queue.
///
/// Every worker owns one [`SessionManager`]; sessions are moved into their
/// worker task and never shared.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start one worker per session
    pub fn start(sessions: Vec<SessionManager>, queue: Receiver<RequestTask>) -> Self {
        let workers = sessions
            .into_iter()
            .enumerate()
            .map(|(index, session)| tokio::spawn(run_worker(index + 1, session, queue.clone())))
            .collect();

        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// True while every worker is still running
    pub fn is_running(&self) -> bool {
        self.workers.iter().all(|worker| !worker.is_finished())
    }

    /// Wait for all workers to exit; they exit once the queue is closed and drained
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

async fn run_worker(worker_id: usize, mut session: SessionManager, queue: Receiver<RequestTask>) {
    info!(worker_id, "Worker started");

    while let Ok(task) = queue.recv().await {
        let started = Instant::now();
        let result = session.forward(task.body.clone(), &task.headers).await;

        match &result {
            Ok(response) => debug!(
                worker_id,
                request_id = %task.request_id,
                status = response.status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Task forwarded"
            ),
            Err(e) => error!(
                worker_id,
                request_id = %task.request_id,
                error = %e,
                "Forwarding failed"
            ),
        }

        let request_id = task.request_id.clone();
        if !task.complete(result) {
            debug!(worker_id, request_id = %request_id, "Dispatcher stopped waiting for the reply");
        }
    }

    info!(worker_id, "Task queue closed, worker exiting");
}
