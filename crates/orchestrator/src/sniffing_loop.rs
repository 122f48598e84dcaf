//! Scheduling core: ingestion, per-file fan-out/fan-in, per-domain workers
//!
//! ```text
//!  add_file / run_file ──► pending runs ──► ingest queue ──► file worker
//!                                                             │ file lock
//!                             ┌───────────────────────────────┤
//!                             ▼                               ▼
//!                      domain queue (security)  ...  domain queue (unit)
//!                             │ semaphore + spawn_blocking + timeout
//!                             ▼
//!                      AnalysisResult ──► barrier ──► cache, reports, audit
//! ```
//!
//! Requests for a file that is queued but not yet claimed merge into one
//! pending run, so a burst of identical requests costs one analyzer call per
//! domain. The per-file lock keeps runs of the same file strictly serial.

use crate::audit::AuditLog;
use crate::cache::ResultsCache;
use crate::reports::{ReportWriter, RUN_REPORT_DIR};
use chrono::Utc;
use common::{OperationTimer, SniffConfig};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use sniff_core::{
    AggregatedResult, AnalysisResult, AnalysisTask, Analyzer, AnalyzerRegistry, AuditEntry,
    SniffError, SniffResult,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Upper bound on concurrently running analyzer calls
    pub max_workers: usize,
    pub per_domain_timeout: Duration,
    /// Capacity of the ingest queue and of each domain queue
    pub queue_capacity: usize,
}

impl LoopSettings {
    pub fn from_config(config: &SniffConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            per_domain_timeout: config.per_domain_timeout(),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            per_domain_timeout: Duration::from_secs(60),
            queue_capacity: 256,
        }
    }
}

type Waiter = oneshot::Sender<Arc<AggregatedResult>>;

/// Every task queued for one file but not yet claimed by a file worker
struct PendingRun {
    tasks: Vec<AnalysisTask>,
    waiters: Vec<Waiter>,
    /// Set once a fire-and-forget request joins; such runs survive a stop
    held: bool,
}

struct Ingest {
    path: PathBuf,
    _token: TaskTrackerToken,
}

struct DomainJob {
    file: PathBuf,
    reply: oneshot::Sender<AnalysisResult>,
}

#[derive(Default)]
struct LoopState {
    running: bool,
    deferred: Vec<PathBuf>,
}

enum Admission {
    Merged,
    Deferred,
    Enqueue,
}

/// Holds the per-file lock; the lock entry is dropped from the map once
/// nobody else is waiting on it.
pub struct FileLease {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    locks: Arc<DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl Drop for FileLease {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.path, |_, lock| Arc::strong_count(lock) == 1);
    }
}

struct LoopShared {
    registry: AnalyzerRegistry,
    cache: Arc<ResultsCache>,
    audit: AuditLog,
    reports: ReportWriter,
    state: Mutex<LoopState>,
    pending: Mutex<HashMap<PathBuf, PendingRun>>,
    file_locks: Arc<DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    domain_queues: HashMap<String, mpsc::Sender<DomainJob>>,
    ingest: mpsc::Sender<Ingest>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

/// Handle to the sniffing loop; cheap to clone
#[derive(Clone)]
pub struct SniffingLoop {
    shared: Arc<LoopShared>,
    dispatchers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SniffingLoop {
    /// Spawns one dispatcher per registered domain plus the ingest
    /// dispatcher. The loop starts stopped; requests are deferred until
    /// [`SniffingLoop::start`].
    pub fn new(
        registry: AnalyzerRegistry,
        cache: Arc<ResultsCache>,
        audit: AuditLog,
        reports: ReportWriter,
        settings: LoopSettings,
    ) -> Self {
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let workers = Arc::new(Semaphore::new(settings.max_workers.max(1)));
        let capacity = settings.queue_capacity.max(1);
        let mut handles = Vec::new();

        let mut domain_queues = HashMap::new();
        for domain in registry.domains() {
            let Some(analyzer) = registry.get(&domain) else {
                continue;
            };
            let (tx, rx) = mpsc::channel(capacity);
            let worker = DomainWorker {
                analyzer,
                workers: Arc::clone(&workers),
                call_timeout: settings.per_domain_timeout,
                tracker: tracker.clone(),
                cancel: cancel.clone(),
            };
            handles.push(tokio::spawn(worker.run(rx)));
            domain_queues.insert(domain, tx);
        }

        let (ingest, ingest_rx) = mpsc::channel(capacity);
        let shared = Arc::new(LoopShared {
            registry,
            cache,
            audit,
            reports,
            state: Mutex::new(LoopState::default()),
            pending: Mutex::new(HashMap::new()),
            file_locks: Arc::new(DashMap::new()),
            domain_queues,
            ingest,
            tracker,
            cancel,
        });
        handles.push(tokio::spawn(Arc::clone(&shared).dispatch_files(ingest_rx)));

        info!(
            domains = shared.domain_queues.len(),
            max_workers = settings.max_workers,
            timeout_ms = settings.per_domain_timeout.as_millis() as u64,
            queue_capacity = capacity,
            "Sniffing loop initialized"
        );

        Self {
            shared,
            dispatchers: Arc::new(Mutex::new(handles)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Resumes processing and releases every deferred request
    pub async fn start(&self) {
        let deferred = {
            let mut state = self.shared.state.lock();
            if state.running {
                debug!("Sniffing loop already running");
                return;
            }
            state.running = true;
            std::mem::take(&mut state.deferred)
        };
        info!(deferred = deferred.len(), "Sniffing loop started");
        for path in deferred {
            self.shared.send_ingest(path).await;
        }
    }

    /// Stops taking new work; anything already claimed by a file worker runs
    /// to completion. Callers still waiting on an unclaimed run are answered
    /// with [`SniffError::Stopped`] right away.
    pub fn stop(&self) {
        let rejected = {
            // lock order: state, then pending
            let mut state = self.shared.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            let mut pending = self.shared.pending.lock();
            reject_waiters(&mut pending)
        };
        info!(rejected, "Sniffing loop stopped");
    }

    /// Fire-and-forget request. Accepted while stopped and held until the
    /// next start.
    pub async fn add_file(&self, path: PathBuf, domains: &[String]) -> SniffResult<()> {
        let domains = self.shared.registry.resolve(domains)?;
        self.shared.submit(path, domains, None, false).await
    }

    /// Request that resolves once the aggregated result is cached.
    /// Refused with [`SniffError::Stopped`] while the loop is stopped.
    pub async fn run_file(
        &self,
        path: PathBuf,
        domains: &[String],
    ) -> SniffResult<Arc<AggregatedResult>> {
        let domains = self.shared.registry.resolve(domains)?;
        let (tx, rx) = oneshot::channel();
        self.shared.submit(path, domains, Some(tx), true).await?;
        rx.await.map_err(|_| SniffError::Stopped)
    }

    /// Waits for the per-file lock, e.g. before fixing the file in place
    pub async fn lock_file(&self, path: &Path) -> FileLease {
        self.shared.lease(path).await
    }

    /// Waits until every queued and in-flight run has finished. Work that is
    /// deferred because the loop is stopped does not count.
    pub async fn wait_idle(&self) {
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        self.shared.tracker.reopen();
    }

    /// Stops, drains in-flight work, and terminates the dispatchers.
    /// Requests still deferred are dropped.
    pub async fn shutdown(&self) {
        self.stop();
        self.wait_idle().await;
        self.shared.cancel.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.dispatchers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher task failed during shutdown");
            }
        }
        let dropped = {
            let mut pending = self.shared.pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        self.shared.state.lock().deferred.clear();
        info!(dropped, "Sniffing loop shut down");
    }

    pub fn pending_runs(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn deferred_runs(&self) -> usize {
        self.shared.state.lock().deferred.len()
    }
}

impl LoopShared {
    async fn submit(
        &self,
        path: PathBuf,
        domains: Vec<String>,
        waiter: Option<Waiter>,
        require_running: bool,
    ) -> SniffResult<()> {
        let admission = {
            // lock order: state, then pending
            let mut state = self.state.lock();
            if require_running && !state.running {
                return Err(SniffError::Stopped);
            }
            let task = AnalysisTask::new(path.clone(), domains);
            let held = waiter.is_none();
            let mut pending = self.pending.lock();
            if let Some(run) = pending.get_mut(&path) {
                run.tasks.push(task);
                run.waiters.extend(waiter);
                run.held |= held;
                Admission::Merged
            } else {
                pending.insert(
                    path.clone(),
                    PendingRun {
                        tasks: vec![task],
                        waiters: waiter.into_iter().collect(),
                        held,
                    },
                );
                if state.running {
                    Admission::Enqueue
                } else {
                    state.deferred.push(path.clone());
                    Admission::Deferred
                }
            }
        };

        match admission {
            Admission::Merged => {
                debug!(file = %path.display(), "Request merged into pending run");
                Ok(())
            }
            Admission::Deferred => {
                debug!(file = %path.display(), "Loop stopped, request deferred");
                Ok(())
            }
            Admission::Enqueue => {
                if self.send_ingest(path.clone()).await {
                    Ok(())
                } else {
                    self.pending.lock().remove(&path);
                    Err(SniffError::Stopped)
                }
            }
        }
    }

    /// Blocks while the ingest queue is full
    async fn send_ingest(&self, path: PathBuf) -> bool {
        let item = Ingest {
            path,
            _token: self.tracker.token(),
        };
        match self.ingest.send(item).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(item)) => {
                warn!(file = %item.path.display(), "Ingest queue closed, request dropped");
                false
            }
        }
    }

    async fn dispatch_files(self: Arc<Self>, mut rx: mpsc::Receiver<Ingest>) {
        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            {
                let mut state = self.state.lock();
                if !state.running {
                    let mut pending = self.pending.lock();
                    let keep = match pending.get_mut(&item.path) {
                        Some(run) => {
                            run.waiters.clear();
                            run.held
                        }
                        None => false,
                    };
                    if keep {
                        debug!(file = %item.path.display(), "Loop stopped, deferring dequeued file");
                        state.deferred.push(item.path);
                    } else {
                        pending.remove(&item.path);
                        debug!(file = %item.path.display(), "Loop stopped, dropping dequeued request");
                    }
                    continue;
                }
            }

            let shared = Arc::clone(&self);
            self.tracker.spawn(async move {
                shared.run_file(item.path).await;
                drop(item._token);
            });
        }
        debug!("File dispatcher exited");
    }

    async fn lease(&self, path: &Path) -> FileLease {
        let lock = Arc::clone(self.file_locks.entry(path.to_path_buf()).or_default().value());
        let guard = lock.lock_owned().await;
        FileLease {
            guard: Some(guard),
            path: path.to_path_buf(),
            locks: Arc::clone(&self.file_locks),
        }
    }

    async fn run_file(&self, path: PathBuf) {
        let lease = self.lease(&path).await;
        let claimed = self.pending.lock().remove(&path);
        let Some(run) = claimed else {
            debug!(file = %path.display(), "No pending run left for file");
            return;
        };

        let domains = AnalysisTask::merged_domains(&run.tasks);
        let queued_ms = run
            .tasks
            .iter()
            .map(|task| task.enqueued_at)
            .min()
            .map_or(0, |first| (Utc::now() - first).num_milliseconds().max(0));
        let mut timer = OperationTimer::new("sniff_file");
        timer.add_field("file", path.display().to_string());
        timer.add_field("domains", &domains);
        timer.add_field("coalesced_requests", run.tasks.len());
        timer.add_field("queued_ms", queued_ms);

        // barrier: every domain reports back, whatever its outcome
        let results = join_all(domains.iter().map(|domain| self.fan_out(&path, domain))).await;
        let aggregated = Arc::new(AggregatedResult::from_results(&path, &domains, results));

        self.cache.insert(Arc::clone(&aggregated));
        let report_path = self
            .reports
            .write_all(&aggregated)
            .await
            .unwrap_or_else(|| self.reports.root().join(RUN_REPORT_DIR));
        if let Err(e) = self
            .audit
            .append(AuditEntry::for_run(&aggregated, report_path))
            .await
        {
            warn!(file = %path.display(), error = %e, "Audit entry not persisted");
        }

        timer.add_field("status", aggregated.status.as_str());
        timer.add_field("issues", aggregated.issue_count);
        timer.finish();

        for waiter in run.waiters {
            let _ = waiter.send(Arc::clone(&aggregated));
        }
        drop(lease);
    }

    async fn fan_out(&self, path: &Path, domain: &str) -> AnalysisResult {
        let Some(queue) = self.domain_queues.get(domain) else {
            return AnalysisResult::errored(path, domain, "no worker registered for domain");
        };
        let (reply, response) = oneshot::channel();
        let job = DomainJob {
            file: path.to_path_buf(),
            reply,
        };
        if queue.send(job).await.is_err() {
            return AnalysisResult::errored(path, domain, "domain worker is shut down");
        }
        match response.await {
            Ok(result) => result,
            Err(_) => AnalysisResult::errored(path, domain, "domain worker dropped the request"),
        }
    }
}

/// Drops the reply channel of every unclaimed run, so each waiting caller
/// sees [`SniffError::Stopped`]. Runs nobody else asked for are discarded.
fn reject_waiters(pending: &mut HashMap<PathBuf, PendingRun>) -> usize {
    let mut rejected = 0;
    pending.retain(|_, run| {
        rejected += run.waiters.len();
        run.waiters.clear();
        run.held
    });
    rejected
}

struct DomainWorker {
    analyzer: Arc<dyn Analyzer>,
    workers: Arc<Semaphore>,
    call_timeout: Duration,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl DomainWorker {
    async fn run(self, mut rx: mpsc::Receiver<DomainJob>) {
        let domain = self.analyzer.domain().to_string();
        loop {
            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            // waiting here lets the domain queue fill up and push back on file workers
            let permit = match Arc::clone(&self.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = job.reply.send(AnalysisResult::errored(
                        &job.file,
                        &domain,
                        "worker pool closed",
                    ));
                    break;
                }
            };

            let analyzer = Arc::clone(&self.analyzer);
            let call_timeout = self.call_timeout;
            self.tracker.spawn(async move {
                let file = job.file.clone();
                let domain = analyzer.domain().to_string();
                let task = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    analyzer.sniff(&file)
                });
                let result = match timeout(call_timeout, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!(domain = %domain, file = %job.file.display(), error = %e, "Analyzer panicked");
                        AnalysisResult::errored(&job.file, &domain, format!("analyzer panicked: {}", e))
                    }
                    Err(_) => {
                        warn!(domain = %domain, file = %job.file.display(), timeout_ms = call_timeout.as_millis() as u64, "Analyzer timed out");
                        AnalysisResult::errored(
                            &job.file,
                            &domain,
                            format!("analysis timed out after {:?}", call_timeout),
                        )
                    }
                };
                let _ = job.reply.send(result);
            });
        }
        debug!(domain = %domain, "Domain dispatcher exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::DegradationTracker;
    use sniff_core::{AnalysisPayload, AnalysisStatus, AnalyzerError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct SlowAnalyzer {
        domain: &'static str,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Analyzer for SlowAnalyzer {
        fn domain(&self) -> &str {
            self.domain
        }

        fn analyze(&self, _file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(AnalysisPayload::new().metric("lines", 1.0))
        }
    }

    async fn loop_with(
        dir: &TempDir,
        analyzers: Vec<Arc<dyn Analyzer>>,
        settings: LoopSettings,
    ) -> SniffingLoop {
        let tracker = DegradationTracker::new();
        let registry = AnalyzerRegistry::from_analyzers(analyzers).unwrap();
        let audit = AuditLog::open(dir.path().join("reports/mcp/audit_trail.json"), tracker.clone())
            .await
            .unwrap();
        let reports = ReportWriter::new(dir.path().join("reports"), tracker);
        SniffingLoop::new(registry, Arc::new(ResultsCache::new()), audit, reports, settings)
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_result() {
        let dir = TempDir::new().unwrap();
        let slow: Arc<dyn Analyzer> = Arc::new(SlowAnalyzer {
            domain: "performance",
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let settings = LoopSettings {
            max_workers: 2,
            per_domain_timeout: Duration::from_millis(50),
            queue_capacity: 8,
        };
        let sniffing = loop_with(&dir, vec![slow], settings).await;
        sniffing.start().await;

        let result = sniffing
            .run_file(dir.path().join("a.py"), &[])
            .await
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::Error);
        let error = result.results["performance"].error.clone().unwrap();
        assert!(error.contains("timed out"), "{}", error);
        sniffing.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_file_refused_while_stopped() {
        let dir = TempDir::new().unwrap();
        let fast: Arc<dyn Analyzer> = Arc::new(SlowAnalyzer {
            domain: "unit",
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let sniffing = loop_with(&dir, vec![fast], LoopSettings::default()).await;

        let err = sniffing
            .run_file(dir.path().join("a.py"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "stopped");
        assert_eq!(sniffing.pending_runs(), 0);
    }

    #[tokio::test]
    async fn test_unknown_domain_never_enqueued() {
        let dir = TempDir::new().unwrap();
        let fast: Arc<dyn Analyzer> = Arc::new(SlowAnalyzer {
            domain: "unit",
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let sniffing = loop_with(&dir, vec![fast], LoopSettings::default()).await;
        sniffing.start().await;

        let err = sniffing
            .add_file(dir.path().join("a.py"), &["bogus".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(sniffing.pending_runs(), 0);
        sniffing.shutdown().await;
    }

    #[tokio::test]
    async fn test_file_lease_entry_is_released() {
        let dir = TempDir::new().unwrap();
        let sniffing = loop_with(&dir, Vec::new(), LoopSettings::default()).await;
        let path = dir.path().join("a.py");
        {
            let _lease = sniffing.lock_file(&path).await;
            assert_eq!(sniffing.shared.file_locks.len(), 1);
        }
        assert!(sniffing.shared.file_locks.is_empty());
    }
}
