//! Bounded worker pool with a silent-drop admission policy.

use super::{WorkerPoolConfig, WorkerPoolMetrics};
use crate::errors::ConfigError;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

type Job = BoxFuture<'static, ()>;

struct PoolShared {
    config: WorkerPoolConfig,
    metrics: Arc<WorkerPoolMetrics>,
    /// `None` once shut down.
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    live: AtomicUsize,
    idle: AtomicUsize,
    next_id: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    runtime: Handle,
}

/// A pool of tokio worker tasks for running requests.
///
/// Submission never blocks and never fails visibly. A task goes to an idle
/// worker if there is one, otherwise to a newly started worker while fewer
/// than `max_workers` are live, otherwise into the bounded queue. When the
/// queue is full too the task is dropped; the only traces are a warning and
/// [`WorkerPoolMetrics::dropped`].
///
/// Workers above `min_workers` retire after `keep_alive` without work. Call
/// [`Self::shutdown`] to drain the queue and stop all workers.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Creates a pool on the current tokio runtime. No workers are started
    /// until the first submission or [`Self::prewarm`].
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid or no tokio
    /// runtime is running.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current()
            .map_err(|e| ConfigError::new("runtime", format!("no tokio runtime available: {e}")))?;
        Self::with_handle(config, runtime)
    }

    /// Creates a pool that spawns its workers on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid.
    pub fn with_handle(config: WorkerPoolConfig, runtime: Handle) -> Result<Self, ConfigError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                metrics: Arc::new(WorkerPoolMetrics::default()),
                tx: Mutex::new(Some(tx)),
                rx: tokio::sync::Mutex::new(rx),
                live: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
                handles: Mutex::new(Vec::new()),
                runtime,
            }),
        })
    }

    /// Submits a task. Fire-and-forget: a saturated pool drops it silently.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shared = &self.shared;
        shared.metrics.record_submitted();

        let Some(tx) = shared.tx.lock().clone() else {
            shared.metrics.record_dropped();
            warn!(pool = %shared.config.thread_name_prefix, "Task dropped: worker pool is shut down");
            return;
        };

        let mut job: Job = Box::pin(task);

        if shared.idle.load(Ordering::SeqCst) > 0 {
            match tx.try_send(job) {
                Ok(()) => {
                    shared.metrics.record_accepted();
                    ensure_worker(shared);
                    return;
                }
                Err(err) => job = err.into_inner(),
            }
        }

        if shared.reserve_worker() {
            shared.metrics.record_accepted();
            spawn_worker(shared, Some(job));
            return;
        }

        match tx.try_send(job) {
            Ok(()) => {
                shared.metrics.record_accepted();
                ensure_worker(shared);
            }
            Err(_) => {
                shared.metrics.record_dropped();
                warn!(
                    pool = %shared.config.thread_name_prefix,
                    live_workers = shared.live.load(Ordering::SeqCst),
                    queue_capacity = shared.config.queue_capacity,
                    dropped_total = shared.metrics.dropped(),
                    "Task dropped: worker pool saturated"
                );
            }
        }
    }

    /// Starts workers until `min_workers` are live. Returns how many were
    /// started.
    pub fn prewarm(&self) -> usize {
        let shared = &self.shared;
        if shared.tx.lock().is_none() {
            return 0;
        }

        let mut started = 0;
        while shared
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < shared.config.min_workers).then_some(n + 1)
            })
            .is_ok()
        {
            spawn_worker(shared, None);
            started += 1;
        }

        debug!(pool = %shared.config.thread_name_prefix, started, "Prewarmed worker pool");
        started
    }

    /// Closes the queue and waits for every worker to finish.
    ///
    /// Tasks already accepted still run. Later submissions are dropped.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        if shared.tx.lock().take().is_none() {
            return;
        }

        let handles = std::mem::take(&mut *shared.handles.lock());
        debug!(
            pool = %shared.config.thread_name_prefix,
            workers = handles.len(),
            "Shutting down worker pool"
        );
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Worker task ended abnormally");
            }
        }
    }

    /// Returns the number of live workers.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Returns the number of workers waiting for work.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.shared.idle.load(Ordering::SeqCst)
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared
            .tx
            .lock()
            .as_ref()
            .map_or(0, |tx| self.shared.config.queue_capacity - tx.capacity())
    }

    /// Returns true once shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.tx.lock().is_none()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.shared.metrics
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("live_workers", &self.live_workers())
            .field("idle_workers", &self.idle_workers())
            .field("queued", &self.queued())
            .finish()
    }
}

impl PoolShared {
    fn reserve_worker(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.config.max_workers).then_some(n + 1)
            })
            .is_ok()
    }

    fn try_retire(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > self.config.min_workers).then(|| n - 1)
            })
            .is_ok()
    }

    /// Takes back a worker slot just given up when a task is still queued.
    ///
    /// A submitter that enqueued while this worker was timing out may have
    /// seen it as live and started nobody. If another worker holds the
    /// receiver it is receiving, and will see the task itself.
    fn reclaim_for_pending(&self) -> bool {
        let pending = self.rx.try_lock().is_ok_and(|rx| !rx.is_empty());
        pending && self.reserve_worker()
    }

    async fn run_job(&self, job: Job) {
        match AssertUnwindSafe(job).catch_unwind().await {
            Ok(()) => self.metrics.record_completed(),
            Err(_) => {
                self.metrics.record_panicked();
                warn!("Task panicked; worker continues");
            }
        }
    }
}

/// Starts a worker for a task just enqueued when no worker is live.
///
/// Pairs with [`PoolShared::reclaim_for_pending`]: a worker retiring after
/// the enqueue either is seen here as gone, or sees the queued task.
fn ensure_worker(shared: &Arc<PoolShared>) {
    let reserved = shared
        .live
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n == 0).then_some(1))
        .is_ok();
    if reserved {
        debug!(pool = %shared.config.thread_name_prefix, "Started worker for queued task");
        spawn_worker(shared, None);
    }
}

/// Spawns a worker whose slot in `live` is already reserved.
fn spawn_worker(shared: &Arc<PoolShared>, first: Option<Job>) {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-{id}", shared.config.thread_name_prefix);
    shared.metrics.record_spawned();

    let span = tracing::debug_span!("worker", name = %name);
    let handle = shared
        .runtime
        .spawn(run_worker(Arc::clone(shared), first).instrument(span));

    let mut handles = shared.handles.lock();
    handles.retain(|h| !h.is_finished());
    handles.push(handle);
}

async fn run_worker(shared: Arc<PoolShared>, first: Option<Job>) {
    debug!("Worker started");
    if let Some(job) = first {
        shared.run_job(job).await;
    }

    let keep_alive = shared.config.keep_alive();
    loop {
        shared.idle.fetch_add(1, Ordering::SeqCst);
        let next = tokio::time::timeout(keep_alive, async {
            shared.rx.lock().await.recv().await
        })
        .await;
        shared.idle.fetch_sub(1, Ordering::SeqCst);

        match next {
            Ok(Some(job)) => shared.run_job(job).await,
            Ok(None) => break,
            Err(_) => {
                if shared.try_retire() {
                    if shared.reclaim_for_pending() {
                        debug!("Worker kept for queued task");
                        continue;
                    }
                    shared.metrics.record_retired();
                    debug!("Worker retired after keep-alive");
                    return;
                }
            }
        }
    }

    shared.live.fetch_sub(1, Ordering::SeqCst);
    debug!("Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn config(min: usize, max: usize, queue: usize) -> WorkerPoolConfig {
        WorkerPoolConfig::new()
            .with_min_workers(min)
            .with_max_workers(max)
            .with_queue_capacity(queue)
            .with_name_prefix("test-worker")
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_new_requires_runtime() {
        let err = WorkerPool::new(config(1, 1, 1)).unwrap_err();
        assert_eq!(err.field, "runtime");
    }

    #[tokio::test]
    async fn test_new_validates_config() {
        let err = WorkerPool::new(config(3, 2, 1)).unwrap_err();
        assert_eq!(err.field, "min_workers");
    }

    #[tokio::test]
    async fn test_saturation_drops_excess() {
        let (max, queue, excess) = (2, 3, 4);
        let pool = WorkerPool::new(config(1, max, queue)).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..(max + queue + excess) {
            let gate = Arc::clone(&gate);
            let done = Arc::clone(&done);
            pool.submit(async move {
                let _permit = gate.acquire().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        let metrics = Arc::clone(pool.metrics());
        assert_eq!(metrics.dropped(), excess as u64);
        assert_eq!(metrics.accepted(), (max + queue) as u64);
        assert_eq!(pool.live_workers(), max);
        assert_eq!(pool.queued(), queue);

        gate.add_permits(max + queue);
        wait_for(|| done.load(Ordering::SeqCst) == max + queue).await;
        pool.shutdown().await;

        assert_eq!(metrics.completed(), (max + queue) as u64);
        assert_eq!(done.load(Ordering::SeqCst), max + queue);
    }

    #[tokio::test]
    async fn test_idle_worker_takes_task() {
        let pool = WorkerPool::new(config(2, 4, 2)).unwrap();
        assert_eq!(pool.prewarm(), 2);
        assert_eq!(pool.prewarm(), 0);
        wait_for(|| pool.idle_workers() == 2).await;

        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        pool.submit(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        wait_for(|| done.load(Ordering::SeqCst) == 1).await;

        assert_eq!(pool.metrics().spawned(), 2);
        assert_eq!(pool.live_workers(), 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_workers_above_min_retire() {
        let pool = WorkerPool::new(
            config(1, 3, 1).with_keep_alive(Duration::from_millis(50)),
        )
        .unwrap();
        let gate = Arc::new(Semaphore::new(0));

        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            pool.submit(async move {
                let _permit = gate.acquire().await;
            });
        }
        assert_eq!(pool.live_workers(), 3);

        gate.add_permits(3);
        wait_for(|| pool.live_workers() == 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(pool.live_workers(), 1);
        assert_eq!(pool.metrics().retired(), 2);
        pool.shutdown().await;
        assert_eq!(pool.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_queued_task_with_no_live_worker_starts_one() {
        let pool = WorkerPool::new(config(0, 1, 4)).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);

        let tx = pool.shared.tx.lock().clone().unwrap();
        let job: Job = Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tx.try_send(job).ok().unwrap();
        drop(tx);
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.queued(), 1);

        ensure_worker(&pool.shared);
        wait_for(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(pool.metrics().spawned(), 1);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_min_zero_runs_every_task_near_keep_alive() {
        let pool = WorkerPool::new(
            config(0, 1, 4).with_keep_alive(Duration::from_millis(1)),
        )
        .unwrap();

        for round in 0..400u64 {
            let (tx, rx) = tokio::sync::oneshot::channel();
            pool.submit(async move {
                let _ = tx.send(());
            });
            let ran = tokio::time::timeout(Duration::from_secs(2), rx).await;
            assert!(
                matches!(ran, Ok(Ok(()))),
                "round {round}: accepted task never ran; live={} queued={}",
                pool.live_workers(),
                pool.queued()
            );
            std::thread::sleep(Duration::from_micros(500 + (round % 4) * 300));
        }

        pool.shutdown().await;
        assert_eq!(pool.metrics().dropped(), 0);
        assert_eq!(pool.metrics().completed(), 400);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let pool = WorkerPool::new(config(1, 1, 2)).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        pool.submit(async {
            panic!("model blew up");
        });
        let counter = Arc::clone(&done);
        pool.submit(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        wait_for(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(pool.metrics().panicked(), 1);
        assert_eq!(pool.metrics().completed(), 1);
        assert_eq!(pool.live_workers(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_drops() {
        let pool = WorkerPool::new(config(1, 1, 1)).unwrap();
        pool.prewarm();
        pool.shutdown().await;

        assert!(pool.is_shutdown());
        assert_eq!(pool.live_workers(), 0);

        pool.submit(async {});
        assert_eq!(pool.metrics().dropped(), 1);
        assert_eq!(pool.prewarm(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = WorkerPool::new(config(1, 1, 4)).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown().await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.metrics().dropped(), 0);
    }
}
