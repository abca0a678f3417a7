//! Single-slot sample generation worker.
//!
//! Each round owns at most one worker. A worker renders paired samples one
//! remote call at a time and checks its cancellation flag after every call;
//! a superseding worker waits for its predecessor to wind down before making
//! its own first call, so the backend never sees two requests from one session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AnnealError, Result};
use crate::sample::{Sample, SamplePair};
use crate::traits::SampleGenerator;
use crate::weights::WeightVector;

/// What one worker should render.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub current: WeightVector,
    pub candidate: WeightVector,
    /// Current-lineage samples carried over from the previous round; each gets
    /// a candidate rendered with its seed.
    pub carried: Vec<Sample>,
    /// Fresh pairs to render after the carried samples are used up.
    pub fresh_pairs: usize,
}

pub struct GenerationWorker {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<Result<usize>>,
}

impl GenerationWorker {
    /// Spawn a worker on `runtime`. `previous` is cancelled and awaited before
    /// the first remote call.
    pub fn spawn(
        runtime: &Handle,
        generator: Arc<dyn SampleGenerator>,
        job: GenerationJob,
        tx: mpsc::UnboundedSender<SamplePair>,
        previous: Option<GenerationWorker>,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let handle = runtime.spawn(async move {
            if let Some(previous) = previous {
                previous.cancel();
                if let Err(e) = previous.join().await {
                    debug!(error = %e, "Superseded generation batch ended with an error");
                }
            }
            run(generator, job, tx, flag).await
        });

        Self { cancelled, handle }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to end. Returns the number of pairs it delivered.
    pub async fn join(self) -> Result<usize> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(AnnealError::Runtime(format!("generation task failed: {e}"))),
        }
    }
}

async fn run(
    generator: Arc<dyn SampleGenerator>,
    job: GenerationJob,
    tx: mpsc::UnboundedSender<SamplePair>,
    cancelled: Arc<AtomicBool>,
) -> Result<usize> {
    let live = || !cancelled.load(Ordering::Acquire) && !tx.is_closed();
    let mut delivered = 0usize;

    if !live() {
        return Ok(delivered);
    }

    info!(
        carried = job.carried.len(),
        fresh = job.fresh_pairs,
        candidate = %job.candidate.content_key(),
        "Generation batch started"
    );

    for current in job.carried {
        let candidate = render(generator.as_ref(), &job.candidate, Some(current.seed)).await?;
        if !live() {
            return Ok(delivered);
        }
        if tx.send(SamplePair { current, candidate }).is_err() {
            return Ok(delivered);
        }
        delivered += 1;
    }

    for _ in 0..job.fresh_pairs {
        let current = render(generator.as_ref(), &job.current, None).await?;
        if !live() {
            return Ok(delivered);
        }

        let candidate = render(generator.as_ref(), &job.candidate, Some(current.seed)).await?;
        if !live() {
            return Ok(delivered);
        }

        debug!(seed = current.seed, "Sample pair ready");
        if tx.send(SamplePair { current, candidate }).is_err() {
            return Ok(delivered);
        }
        delivered += 1;
    }

    info!(delivered, "Generation batch complete");
    Ok(delivered)
}

async fn render(
    generator: &dyn SampleGenerator,
    weights: &WeightVector,
    seed: Option<u64>,
) -> Result<Sample> {
    generator.generate(weights, seed).await.map_err(|e| {
        warn!(error = %e, seed = ?seed, "Generation call failed, aborting batch");
        AnnealError::Generation(e)
    })
}
