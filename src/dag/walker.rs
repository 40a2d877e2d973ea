// src/dag/walker.rs

//! Concurrent, completion-driven DAG traversal.
//!
//! One coordinator (the task calling [`Dag::walk_down`] / [`Dag::walk_up`])
//! owns all scheduling state: the per-node count of unfinished predecessors
//! and the number of nodes in flight. It is the only writer to that state.
//! A fixed pool of workers pulls ready nodes from a shared queue, runs the
//! action, and reports completion back over a channel; the coordinator then
//! releases the node's successors.
//!
//! The first action error cancels a walk-local token observed by the
//! coordinator and every worker, so no new action starts afterwards.
//! Actions already running are left to finish (or to honour the token
//! themselves).

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::dag::Dag;
use crate::errors::{MakeError, Result};
use crate::target::TargetRef;

/// Number of workers used when the caller asks for `0`.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Dag {
    /// Visit every target after all of its prerequisites (build order).
    ///
    /// `concurrency == 0` uses [`default_concurrency`]. Returns the first
    /// error raised by `action`; on error no further action is started.
    pub async fn walk_up<F, Fut>(
        &self,
        concurrency: usize,
        cancel: &CancelToken,
        action: F,
    ) -> Result<()>
    where
        F: Fn(TargetRef, CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.reversed().walk_down(concurrency, cancel, action).await
    }

    /// Visit every target after all targets depending on it (teardown order).
    pub async fn walk_down<F, Fut>(
        &self,
        concurrency: usize,
        cancel: &CancelToken,
        action: F,
    ) -> Result<()>
    where
        F: Fn(TargetRef, CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (nodes, edges) = self.adjacency();
        walk(nodes, edges, concurrency, cancel, action).await
    }
}

/// Shared state handed to each worker.
struct WorkerCtx<F> {
    nodes: Arc<Vec<TargetRef>>,
    ready: Arc<AsyncMutex<mpsc::Receiver<usize>>>,
    done: mpsc::Sender<usize>,
    cancel: CancelToken,
    first_error: Arc<Mutex<Option<MakeError>>>,
    action: Arc<F>,
}

/// Walk a graph where `edges[u]` lists the nodes released when `u` completes.
async fn walk<F, Fut>(
    nodes: &[TargetRef],
    edges: &[Vec<usize>],
    concurrency: usize,
    cancel: &CancelToken,
    action: F,
) -> Result<()>
where
    F: Fn(TargetRef, CancelToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let total = nodes.len();
    if total == 0 {
        return Ok(());
    }

    let concurrency = match concurrency {
        0 => default_concurrency(),
        n => n,
    };
    let workers = concurrency.min(total);

    let mut in_degree = vec![0usize; total];
    for released in edges {
        for &v in released {
            in_degree[v] += 1;
        }
    }

    // Both channels can hold every node, so coordinator sends never block.
    let (ready_tx, ready_rx) = mpsc::channel::<usize>(total);
    let (done_tx, mut done_rx) = mpsc::channel::<usize>(total);

    let walk_cancel = cancel.child();
    let first_error: Arc<Mutex<Option<MakeError>>> = Arc::new(Mutex::new(None));

    let shared_nodes = Arc::new(nodes.to_vec());
    let ready_rx = Arc::new(AsyncMutex::new(ready_rx));
    let action = Arc::new(action);

    let mut pool = JoinSet::new();
    for worker in 0..workers {
        let ctx = WorkerCtx {
            nodes: Arc::clone(&shared_nodes),
            ready: Arc::clone(&ready_rx),
            done: done_tx.clone(),
            cancel: walk_cancel.clone(),
            first_error: Arc::clone(&first_error),
            action: Arc::clone(&action),
        };
        pool.spawn(run_worker(worker, ctx));
    }
    // Only workers hold completion senders now; `recv` yields `None` once
    // every worker has exited.
    drop(done_tx);

    let mut in_flight = 0usize;
    for (idx, degree) in in_degree.iter().enumerate() {
        if *degree == 0 {
            debug!(target = %nodes[idx].name(), "queuing initial target");
            let _ = ready_tx.send(idx).await;
            in_flight += 1;
        }
    }
    debug!(queued = in_flight, total, "initial targets queued");

    let mut completed = 0usize;
    while completed < total {
        if in_flight == 0 {
            // Nothing queued or running, yet nodes remain: they wait on each other.
            let stuck = in_degree
                .iter()
                .position(|d| *d > 0)
                .map(|i| nodes[i].name().to_string())
                .unwrap_or_default();
            warn!(target = %stuck, "walk stalled; dependency cycle");
            record_error(&first_error, MakeError::Cycle(stuck));
            walk_cancel.cancel();
            break;
        }

        tokio::select! {
            _ = walk_cancel.cancelled() => break,
            finished = done_rx.recv() => {
                let Some(u) = finished else { break };
                completed += 1;
                in_flight -= 1;
                debug!(target = %nodes[u].name(), completed, total, "target complete");

                for &v in &edges[u] {
                    in_degree[v] -= 1;
                    debug!(
                        prev_target = %nodes[u].name(),
                        target = %nodes[v].name(),
                        degree = in_degree[v],
                        "reduce degree"
                    );
                    if in_degree[v] == 0 {
                        let _ = ready_tx.send(v).await;
                        in_flight += 1;
                        debug!(target = %nodes[v].name(), "queuing next");
                    }
                }
            }
        }
    }

    // Closing the queue lets idle workers exit.
    drop(ready_tx);
    if completed < total {
        walk_cancel.cancel();
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            record_error(
                &first_error,
                MakeError::Other(anyhow::anyhow!("dag worker failed: {e}")),
            );
        }
    }
    debug!("all workers done");

    let err = first_error
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    match err {
        Some(err) => Err(err),
        None if completed < total => {
            warn!(completed, total, "walk cancelled before completion");
            Err(MakeError::Cancelled)
        }
        None => Ok(()),
    }
}

async fn run_worker<F, Fut>(worker: usize, ctx: WorkerCtx<F>)
where
    F: Fn(TargetRef, CancelToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            idx = async { ctx.ready.lock().await.recv().await } => idx,
        };

        let Some(idx) = next else {
            debug!(worker, "worker exiting");
            return;
        };
        if ctx.cancel.is_cancelled() {
            debug!(worker, "worker exiting (cancelled)");
            return;
        }

        let target = TargetRef::clone(&ctx.nodes[idx]);
        debug!(worker, target = %target.name(), "processing target");

        if let Err(err) = (ctx.action)(TargetRef::clone(&target), ctx.cancel.clone()).await {
            debug!(worker, target = %target.name(), error = %err, "dag walk function error");
            record_error(&ctx.first_error, err);
            ctx.cancel.cancel();
            return;
        }

        debug!(worker, target = %target.name(), "target completed");
        if ctx.done.send(idx).await.is_err() {
            // Coordinator has stopped listening.
            return;
        }
    }
}

/// Keep only the first error; later ones are consequences of cancellation.
fn record_error(slot: &Mutex<Option<MakeError>>, err: MakeError) {
    let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_none() {
        *slot = Some(err);
    }
}
