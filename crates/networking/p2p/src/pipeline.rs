//! Lifecycle owner: wires [`crate::queue::SyncQueue`], a [`crate::peer::PeerPool`]
//! and a [`crate::sinks::PipelineSinks`] together and drives the header and
//! body loops as independently cancellable background tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    body_loop::run_body_loop,
    config::PipelineConfig,
    error::PipelineError,
    header_loop::run_header_loop,
    metrics::Metrics,
    peer::PeerPool,
    queue::SyncQueue,
    sinks::PipelineSinks,
    validator::HeaderValidator,
};

/// Which loops a [`Pipeline`] should run. Headers-only mode (bodies
/// disabled) is how a light client or a header-only sync uses this crate.
#[derive(Clone, Copy, Debug)]
pub struct PipelineMode {
    pub headers: bool,
    pub bodies: bool,
}

impl PipelineMode {
    pub const FULL: PipelineMode = PipelineMode {
        headers: true,
        bodies: true,
    };
    pub const HEADERS_ONLY: PipelineMode = PipelineMode {
        headers: true,
        bodies: false,
    };
}

/// Owns the running download. Constructed once per sync attempt; `start`
/// spawns the loop tasks, `stop` cancels them, `wait_for_stop` joins them.
pub struct Pipeline<P, V, M, S>
where
    P: PeerPool + 'static,
    V: HeaderValidator + 'static,
    M: Metrics + 'static,
    S: PipelineSinks + 'static,
{
    pool: Arc<P>,
    queue: Arc<Mutex<SyncQueue>>,
    validator: Arc<V>,
    metrics: Arc<M>,
    sinks: Arc<S>,
    config: PipelineConfig,
    mode: PipelineMode,
    cancel: CancellationToken,
    headers_download_complete: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<P, V, M, S> Pipeline<P, V, M, S>
where
    P: PeerPool + 'static,
    V: HeaderValidator + 'static,
    M: Metrics + 'static,
    S: PipelineSinks + 'static,
{
    pub fn new(
        pool: Arc<P>,
        queue: SyncQueue,
        validator: Arc<V>,
        metrics: Arc<M>,
        sinks: Arc<S>,
        config: PipelineConfig,
        mode: PipelineMode,
    ) -> Self {
        Pipeline {
            pool,
            queue: Arc::new(Mutex::new(queue)),
            validator,
            metrics,
            sinks,
            config,
            mode,
            cancel: CancellationToken::new(),
            headers_download_complete: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    /// Spawns the enabled loops. Returns [`PipelineError::AlreadyStarted`] if
    /// called twice, and [`PipelineError::NothingToRun`] if neither loop is
    /// enabled.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if !self.tasks.is_empty() {
            return Err(PipelineError::AlreadyStarted);
        }
        if !self.mode.headers && !self.mode.bodies {
            return Err(PipelineError::NothingToRun);
        }

        info!(headers = self.mode.headers, bodies = self.mode.bodies, "pipeline starting");

        if self.mode.headers {
            let handle = tokio::spawn(run_header_loop(
                self.pool.clone(),
                self.queue.clone(),
                self.validator.clone(),
                self.metrics.clone(),
                self.sinks.clone(),
                self.config.clone(),
                self.cancel.clone(),
                self.mode.bodies,
                self.headers_download_complete.clone(),
            ));
            self.tasks.push(handle);
        } else {
            // Bodies-only mode (resuming a sync whose headers are already
            // present) treats the header side as trivially complete.
            self.headers_download_complete.store(true, Ordering::Release);
        }

        if self.mode.bodies {
            let handle = tokio::spawn(run_body_loop(
                self.pool.clone(),
                self.queue.clone(),
                self.metrics.clone(),
                self.sinks.clone(),
                self.config.clone(),
                self.cancel.clone(),
                self.headers_download_complete.clone(),
            ));
            self.tasks.push(handle);
        }

        Ok(())
    }

    /// Requests that all running loops stop at their next cancellation
    /// check point. Does not wait for them to actually exit; call
    /// [`Pipeline::wait_for_stop`] for that.
    pub fn stop(&self) {
        info!("pipeline stop requested");
        self.cancel.cancel();
    }

    /// Awaits every spawned loop task. A task that panicked is surfaced as
    /// [`PipelineError::WorkerPanicked`] rather than propagated as a panic
    /// here.
    pub async fn wait_for_stop(&mut self) -> Result<(), PipelineError> {
        for task in self.tasks.drain(..) {
            if let Err(join_err) = task.await {
                return Err(PipelineError::WorkerPanicked(join_err.to_string()));
            }
        }
        Ok(())
    }

    /// Stops the pipeline, waits for its loops to exit, and releases the
    /// peer pool handle. Idempotent in the sense that calling it on an
    /// already-stopped pipeline just joins already-finished tasks.
    pub async fn close(&mut self) -> Result<(), PipelineError> {
        self.stop();
        self.wait_for_stop().await?;
        self.pool.close().await;
        Ok(())
    }

    pub fn queue(&self) -> Arc<Mutex<SyncQueue>> {
        self.queue.clone()
    }
}
