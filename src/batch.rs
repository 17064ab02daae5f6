use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::client::PdnsClient;
use crate::config::{BatchOptions, EnginePolicy, MigrationMode, OnError};
use crate::engine::ReconciliationEngine;

/// Running totals for a batch run, shared across workers behind a
/// single [`tokio::sync::Mutex`] (spec.md §9: "a port should guard the
/// shared counters with one mutex rather than per-field atomics, to
/// keep increment+compare operations atomic together").
///
/// Mirrors spec.md §3's `BatchStats` shape exactly — `stop_requested`
/// lives here too (not in a separate lock) so one mutex guards every
/// field the spec models as shared state.
#[derive(Debug, Clone, Copy)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub start_time: Instant,
    pub stop_requested: bool,
}

impl BatchStats {
    fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            start_time: Instant::now(),
            stop_requested: false,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Outcome of a full batch run.
#[derive(Debug, Clone, Copy)]
pub struct BatchOutcome {
    pub stats: BatchStats,
    pub interrupted: bool,
}

impl BatchOutcome {
    /// Exit code convention from spec.md §4.3: 0 clean, 1 any zone
    /// failed, 130 interrupted (matching the Python CLI's SIGINT code).
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            130
        } else if self.stats.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Bounded-concurrency batch executor.
///
/// Grounded on `original_source/powerdns_migrator/cli.py::_run_batch`:
/// a producer feeding a bounded queue, N worker tasks, a progress
/// logger, and graceful-shutdown handling. The Python source uses
/// `asyncio.Queue` plus `None` sentinels to end each worker; this port
/// uses a bounded `tokio::sync::mpsc` channel and ends workers by
/// dropping the sender, per spec.md §9's guidance for a channel-based
/// runtime.
pub struct BatchExecutor<'a> {
    source: &'a PdnsClient,
    target: &'a PdnsClient,
    engine_policy: EnginePolicy,
    mode: MigrationMode,
    options: BatchOptions,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        source: &'a PdnsClient,
        target: &'a PdnsClient,
        engine_policy: EnginePolicy,
        mode: MigrationMode,
        options: BatchOptions,
    ) -> Self {
        Self {
            source,
            target,
            engine_policy,
            mode,
            options,
        }
    }

    pub async fn run(&self, zones: Vec<String>) -> BatchOutcome {
        let total = zones.len();
        let stats = Arc::new(Mutex::new(BatchStats::new(total)));

        let capacity = self.options.concurrency.max(1) * 2;
        let (tx, rx) = mpsc::channel::<String>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.options.concurrency.max(1) {
            let rx = rx.clone();
            let stats = stats.clone();
            let source = self.source.clone();
            let target = self.target.clone();
            let engine_policy = self.engine_policy;
            let mode = self.mode;
            let on_error = self.options.on_error;

            workers.spawn(async move {
                loop {
                    let zone = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(zone) = zone else { break };

                    {
                        let mut s = stats.lock().await;
                        if s.stop_requested {
                            s.skipped += 1;
                            continue;
                        }
                    }

                    let engine = ReconciliationEngine::new(&source, &target, engine_policy);
                    match engine.migrate(&zone, mode).await {
                        Ok(result) => {
                            info!(worker = worker_id, zone = %zone, action = ?result.action, "migrated zone");
                            let mut s = stats.lock().await;
                            s.succeeded += 1;
                        }
                        Err(e) => {
                            error!(worker = worker_id, zone = %zone, error = %e, kind = e.kind(), "zone migration failed");
                            let mut s = stats.lock().await;
                            s.failed += 1;
                            if on_error == OnError::Stop {
                                s.stop_requested = true;
                            }
                        }
                    }
                }
            });
        }

        let producer = {
            let tx = tx.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                for zone in zones {
                    if stats.lock().await.stop_requested {
                        break;
                    }
                    if tx.send(zone).await.is_err() {
                        break;
                    }
                }
            })
        };
        drop(tx);

        let progress_interval = self.options.progress_interval;
        let progress_stats = stats.clone();
        let progress_handle = tokio::spawn(async move {
            if progress_interval.is_zero() {
                return;
            }
            loop {
                tokio::time::sleep(progress_interval).await;
                let s = *progress_stats.lock().await;
                if s.processed() >= s.total {
                    break;
                }
                let elapsed = s.start_time.elapsed();
                let rate = s.processed() as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
                let eta = if rate > 0.0 {
                    Some((s.total - s.processed()) as f64 / rate)
                } else {
                    None
                };
                info!(
                    processed = s.processed(),
                    total = s.total,
                    success = s.succeeded,
                    failed = s.failed,
                    elapsed_s = elapsed.as_secs_f64(),
                    rate = rate,
                    eta_s = ?eta,
                    "batch progress"
                );
            }
        });

        // Only the first branch borrows `workers`; once `select!` picks a
        // winner the losing future (and any borrow it held) is dropped,
        // so the follow-up join below can safely reborrow it.
        let interrupted = tokio::select! {
            _ = wait_for_workers(&mut workers, producer) => false,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, stopping after in-flight zones finish");
                stats.lock().await.stop_requested = true;
                true
            }
        };

        if interrupted {
            let timeout = self.options.graceful_timeout;
            if timeout.is_zero() && self.options.on_error == OnError::Stop {
                warn!("graceful_timeout is 0 and on_error=stop, cancelling in-flight workers immediately");
                workers.abort_all();
                while workers.join_next().await.is_some() {}
            } else if timeout.is_zero() {
                while workers.join_next().await.is_some() {}
            } else if tokio::time::timeout(timeout, async {
                while workers.join_next().await.is_some() {}
            })
            .await
            .is_err()
            {
                warn!(
                    timeout_s = timeout.as_secs_f64(),
                    "graceful shutdown timed out, abandoning remaining workers"
                );
                workers.abort_all();
            }
        }

        progress_handle.abort();

        let final_stats = *stats.lock().await;
        BatchOutcome {
            stats: final_stats,
            interrupted,
        }
    }
}

async fn wait_for_workers(workers: &mut JoinSet<()>, producer: tokio::task::JoinHandle<()>) {
    let _ = producer.await;
    while workers.join_next().await.is_some() {}
}
