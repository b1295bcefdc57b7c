//! The Dispatcher (Component E, §4.5): webhook intake plus the job lifecycle
//! observer, wired together through `AppState`.

pub mod error;
pub mod intake;
pub mod observer;

pub use error::Error;

use std::sync::Arc;

use orchestrator_client::WatchHandle;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state::{AppState, DispatchTask};

/// Spawns `pool_size` workers draining the dispatch queue. Several tasks
/// share one receiver behind a mutex — the queue, not per-worker channels, is
/// the thing that needs to be bounded (§5's "worker pool is a bounded
/// `tokio::sync::mpsc` channel drained by a fixed number of spawned tasks").
///
/// Workers select against `shutdown` rather than waiting for the channel to
/// close: every worker holds an `Arc<AppState>`, which itself embeds the
/// sending half, so the channel can never close while a worker is alive to
/// notice it.
pub fn spawn_workers(
    state: Arc<AppState>,
    dispatch_rx: mpsc::Receiver<DispatchTask>,
    pool_size: usize,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(dispatch_rx));
    (0..pool_size.max(1))
        .map(|worker_id| {
            let state = state.clone();
            let rx = rx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let task = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        task = async { rx.lock().await.recv().await } => task,
                    };
                    match task {
                        Some(task) => intake::process(&state, task).await,
                        None => {
                            // Cancellation fired or the queue is genuinely
                            // empty and closed; finish whatever is already
                            // buffered before exiting so a shutdown mid-burst
                            // doesn't silently drop accepted work.
                            while let Ok(task) = rx.lock().await.try_recv() {
                                intake::process(&state, task).await;
                            }
                            info!(worker_id, "dispatch worker exiting");
                            break;
                        }
                    }
                }
            })
        })
        .collect()
}

/// Spawns the job lifecycle observer as a background task.
pub fn spawn_observer(
    state: Arc<AppState>,
    handle: WatchHandle,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(observer::run(state, handle, shutdown))
}
