//! The check pipeline: one queue, one background worker.
//!
//! Every file runs through settle delay → existence/readability checks →
//! analyzer → comparator → cache → logger on a single worker thread, so at
//! most one external tool runs at any time regardless of how many downloads
//! finish at once.

use std::fs::File;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::analyzer::{is_audio_file, Analyzer};
use crate::cache::ResultCache;
use crate::comparator;
use crate::config::{Settings, Timings, ToolPaths};
use crate::error::{self, CheckError};
use crate::format::display_name;
use crate::logger::ResultLogger;
use crate::models::{CheckEvent, CheckResult, CheckStatus, Measurement};
use crate::queue::CheckQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Stopped,
    Running,
    Draining,
}

/// Everything the worker needs, built once at startup.
pub struct PipelineContext {
    pub settings: Settings,
    pub timings: Timings,
    pub analyzer: Analyzer,
    pub queue: CheckQueue,
    pub logger: ResultLogger,
    cache: Mutex<ResultCache>,
    subscribers: Mutex<Vec<Sender<CheckEvent>>>,
}

impl PipelineContext {
    pub fn new(settings: Settings, tools: &ToolPaths, timings: Timings, cache: ResultCache) -> Self {
        let analyzer = Analyzer::new(settings.analysis_strategy, tools, &timings);
        let logger = ResultLogger::new(settings.music_root_directory.clone(), settings.enable_logging);
        Self {
            settings,
            timings,
            analyzer,
            queue: CheckQueue::new(),
            logger,
            cache: Mutex::new(cache),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Build a context whose cache lives at `cache_path`. With logging
    /// disabled, or no usable location, results are kept in memory only.
    pub fn with_cache_file(
        settings: Settings,
        tools: &ToolPaths,
        timings: Timings,
        cache_path: Option<&Path>,
    ) -> Self {
        let cache = match (settings.enable_logging, cache_path) {
            (true, Some(path)) => ResultCache::open(path),
            (true, None) => {
                warn!("Could not initialize cache file: no config directory; results will not be persisted");
                ResultCache::in_memory()
            }
            (false, _) => ResultCache::in_memory(),
        };
        Self::new(settings, tools, timings, cache)
    }

    pub fn cache(&self) -> MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check one file right now, without settle delay. Never fails: every
    /// problem becomes an Error or Skipped result.
    pub fn check_file(&self, path: &Path) -> CheckResult {
        match self.evaluate(path) {
            Ok(result) => result,
            Err(CheckError::UnsupportedType) => CheckError::UnsupportedType.into_result(),
            Err(e) => {
                warn!(
                    "Error checking {} with {}: {}",
                    display_name(path),
                    self.analyzer.tool_name(),
                    e
                );
                e.into_result()
            }
        }
    }

    fn evaluate(&self, path: &Path) -> error::Result<CheckResult> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CheckError::NotFound,
            io::ErrorKind::PermissionDenied => CheckError::Unreadable(e.to_string()),
            _ => CheckError::Io(e),
        })?;
        if !metadata.is_file() || !is_audio_file(path) {
            return Err(CheckError::UnsupportedType);
        }
        File::open(path).map_err(|e| CheckError::Unreadable(e.to_string()))?;

        let result = match self.analyzer.measure(path)? {
            Measurement::Bitrates {
                declared_kbps,
                measured_kbps,
            } => comparator::compare(
                declared_kbps,
                measured_kbps,
                self.settings.bitrate_tolerance_percent,
            ),
            Measurement::Verdict {
                status,
                reason,
                claimed_kbps,
                cutoff_hz,
            } => CheckResult::new(status, reason)
                .with_bitrates(claimed_kbps, None)
                .with_cutoff(cutoff_hz),
        };
        Ok(result)
    }

    /// Store and report a finished check. Skipped results are reported but
    /// not cached.
    pub fn record(&self, path: &Path, result: &CheckResult) {
        if result.status != CheckStatus::Skipped {
            let mut cache = self.cache();
            cache.insert(path, result.clone());
            if let Err(e) = cache.save() {
                warn!("Error saving cache: {}", e);
            }
        }
        self.logger.emit(path, result);
    }

    fn publish(&self, event: CheckEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[derive(Default)]
struct WorkerSlot {
    state: WorkerState,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: Option<Receiver<()>>,
}

/// Owns the context and the single background worker.
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    worker: Mutex<WorkerSlot>,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        info!(
            "Upscale detector initialized ({}, {}% tolerance)",
            ctx.settings.analysis_strategy, ctx.settings.bitrate_tolerance_percent
        );
        Self {
            ctx: Arc::new(ctx),
            worker: Mutex::new(WorkerSlot::default()),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    fn slot(&self) -> MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> WorkerState {
        self.slot().state
    }

    /// Receive an event for every file the worker starts and completes.
    pub fn subscribe(&self) -> Receiver<CheckEvent> {
        let (tx, rx) = mpsc::channel();
        self.ctx
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Host hook for a completed download. Queues the file when automatic
    /// checking is on; safe to call repeatedly for the same path.
    pub fn on_download_finished(&self, path: &Path) -> bool {
        if !self.ctx.settings.auto_check_on_download {
            debug!("Auto check disabled, ignoring {}", path.display());
            return false;
        }
        self.enqueue(path)
    }

    /// Queue a file for checking and make sure the worker is running.
    /// Returns false if the file was already pending or the pipeline is stopping.
    pub fn enqueue(&self, path: &Path) -> bool {
        let path = absolutize(path);
        let mut slot = self.slot();
        if slot.state == WorkerState::Draining {
            warn!("Pipeline is stopping, not queueing {}", path.display());
            return false;
        }
        if !self.ctx.queue.push(path.clone()) {
            debug!("Already pending: {}", path.display());
            return false;
        }
        info!("Checking with {}: {}", self.ctx.analyzer.tool_name(), path.display());

        if slot.state == WorkerState::Stopped {
            self.spawn_worker(&mut slot);
        }
        true
    }

    fn spawn_worker(&self, slot: &mut WorkerSlot) {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel::<()>();
        // A worker that outlived its stop timeout must finish before the new one starts.
        let previous = slot.handle.take();
        let ctx = Arc::clone(&self.ctx);
        let worker_stop = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let _done = done_tx;
            if let Some(previous) = previous {
                let _ = previous.join();
            }
            run_worker(&ctx, &worker_stop);
        });

        slot.state = WorkerState::Running;
        slot.stop = stop;
        slot.handle = Some(handle);
        slot.done = Some(done_rx);
    }

    /// Ask the worker to stop. The file in flight is finished; files still
    /// queued are abandoned. Returns false if the worker did not exit within
    /// the join timeout (it is left to finish on its own).
    pub fn stop(&self) -> bool {
        let (handle, done, stop) = {
            let mut slot = self.slot();
            if slot.state != WorkerState::Running {
                return true;
            }
            slot.state = WorkerState::Draining;
            (slot.handle.take(), slot.done.take(), Arc::clone(&slot.stop))
        };

        // Draining refuses new pushes, so once the queue is cleared the worker
        // can only finish what it already popped. Every accepted path is
        // either completed or counted here.
        let abandoned = self.ctx.queue.clear();
        stop.store(true, Ordering::SeqCst);
        if abandoned > 0 {
            info!("Abandoned {} queued file(s)", abandoned);
            self.ctx.publish(CheckEvent::Abandoned { count: abandoned });
        }

        let finished = match done {
            Some(done) => !matches!(
                done.recv_timeout(self.ctx.timings.join_timeout),
                Err(RecvTimeoutError::Timeout)
            ),
            None => true,
        };

        let mut slot = self.slot();
        if finished {
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        } else {
            warn!(
                "Worker did not stop within {}s; letting the current check finish",
                self.ctx.timings.join_timeout.as_secs()
            );
            slot.handle = handle;
        }
        slot.state = WorkerState::Stopped;
        finished
    }

    /// Block until nothing is queued or in flight, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.ctx.queue.wait_idle(timeout)
    }

    pub fn cached(&self, path: &Path) -> Option<CheckResult> {
        self.ctx.cache().get(&absolutize(path)).cloned()
    }

    /// Stop the worker and flush the cache. Results another instance wrote to
    /// the same cache file meanwhile are kept unless ours are newer.
    pub fn shutdown(&self) {
        self.stop();
        let mut cache = self.ctx.cache();
        if let Some(path) = cache.path().map(Path::to_path_buf) {
            cache.merge(ResultCache::load(&path));
        }
        if let Err(e) = cache.save() {
            warn!("Error saving cache: {}", e);
        }
        info!("Upscale detector stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.slot().stop.store(true, Ordering::SeqCst);
    }
}

fn run_worker(ctx: &PipelineContext, stop: &AtomicBool) {
    debug!("Check worker started");
    while !stop.load(Ordering::SeqCst) {
        let Some(path) = ctx.queue.pop_timeout(ctx.timings.poll_interval) else {
            continue;
        };

        ctx.publish(CheckEvent::Started { path: path.clone() });
        thread::sleep(ctx.timings.settle_delay);

        let result = panic::catch_unwind(AssertUnwindSafe(|| ctx.check_file(&path)))
            .unwrap_or_else(|_| CheckResult::error("Internal error while checking file"));
        ctx.record(&path, &result);
        ctx.queue.finish(&path);
        ctx.publish(CheckEvent::Completed { path, result });
    }
    debug!("Check worker stopped");
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
