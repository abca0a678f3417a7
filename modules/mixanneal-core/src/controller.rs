//! AnnealingController: drives propose → generate → judge → accept rounds.
//!
//! All session state (temperature, iteration, current/candidate vectors,
//! proposer interest) changes only inside [`AnnealingController::next`]. The
//! generation worker runs concurrently but only ever writes into the sample
//! channel, and [`AnnealingController::stop`] only flips its cancellation flag.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::acceptance::{accept_chance, round_budget, stop_reason, win_fraction, StopReason};
use crate::config::AnnealingConfig;
use crate::error::{AnnealError, Result};
use crate::proposer::{Mutation, MutationProposer};
use crate::sample::{Sample, SamplePair};
use crate::traits::{SampleGenerator, SettingsSink};
use crate::weights::WeightVector;
use crate::worker::{GenerationJob, GenerationWorker};

/// What happened in one call to [`AnnealingController::next`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Iteration counter after the round.
    pub iteration: u32,
    /// False when `next` was called with no judged comparisons.
    pub judged: bool,
    pub score: f64,
    pub accept_chance: f64,
    pub accepted: bool,
    /// The mutation that was under evaluation, if any.
    pub tested: Option<Mutation>,
    /// The mutation applied to the new candidate.
    pub next: Mutation,
    /// Temperature after the round.
    pub temperature: f64,
    pub decided_at: DateTime<Utc>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnealingStatus {
    pub iteration: u32,
    pub steps: u32,
    pub temperature: f64,
    pub current: WeightVector,
    pub candidate: WeightVector,
    pub mutation: Option<Mutation>,
    pub queued_pairs: usize,
    pub generating: bool,
}

pub struct AnnealingController {
    config: AnnealingConfig,
    generator: Arc<dyn SampleGenerator>,
    sink: Arc<dyn SettingsSink>,
    runtime: Handle,
    rng: StdRng,
    proposer: MutationProposer,

    current: WeightVector,
    candidate: WeightVector,
    mutation: Option<Mutation>,

    temperature: f64,
    temperature_factor: f64,
    steps: u32,
    iteration: u32,

    queue: Vec<SamplePair>,
    samples_rx: mpsc::UnboundedReceiver<SamplePair>,
    worker: Option<GenerationWorker>,
}

impl AnnealingController {
    /// Validate the schedule, normalise `initial` so its largest weight is 10,
    /// and run the bootstrap round, which always accepts and starts generation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        initial: &WeightVector,
        config: AnnealingConfig,
        generator: Arc<dyn SampleGenerator>,
        sink: Arc<dyn SettingsSink>,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = Handle::try_current().map_err(|_| {
            AnnealError::Runtime("controller must be created inside a tokio runtime".to_string())
        })?;

        let normalized = initial.normalized()?;
        let model_count = normalized.active_models().len() as u32;
        let steps = config
            .steps_per_model
            .checked_mul(model_count)
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                AnnealError::Config(format!(
                    "cannot schedule {} steps for {} models",
                    config.steps_per_model, model_count
                ))
            })?;

        let temperature_factor =
            (config.start_temperature / config.end_temperature).powf(1.0 / steps as f64);
        if !temperature_factor.is_finite() || temperature_factor <= 1.0 {
            return Err(AnnealError::Config(format!(
                "temperature ratio {} / {} does not give a decaying schedule",
                config.start_temperature, config.end_temperature
            )));
        }

        let proposer = MutationProposer::initialize(&normalized, config.start_temperature)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        info!(
            models = model_count,
            steps,
            start_temperature = config.start_temperature,
            end_temperature = config.end_temperature,
            temperature_factor,
            initial = %normalized,
            "Annealing session created"
        );

        // Replaced by the bootstrap round's worker channel.
        let (_, samples_rx) = mpsc::unbounded_channel();

        let mut controller = Self {
            temperature: config.start_temperature,
            config,
            generator,
            sink,
            runtime,
            rng,
            proposer,
            current: normalized.clone(),
            candidate: normalized,
            mutation: None,
            temperature_factor,
            steps,
            iteration: 0,
            queue: Vec::new(),
            samples_rx,
            worker: None,
        };

        controller.next(0.0, 1.0);
        Ok(controller)
    }

    /// Decide the round from cumulative judge scores and start the next one.
    ///
    /// Returns `None` without touching any state once the schedule is spent.
    pub fn next(&mut self, current_score: f64, candidate_score: f64) -> Option<RoundOutcome> {
        self.stop();
        if self.iteration > self.steps {
            return None;
        }

        self.seal_samples();
        let consumed = (current_score + candidate_score).max(0.0).ceil() as usize;
        let leftover: Vec<SamplePair> = self
            .queue
            .drain(..)
            .skip(consumed)
            .collect();

        // Nothing judged means no evidence: reject and leave the proposer alone.
        let judged = win_fraction(current_score, candidate_score);
        let (score, chance, accepted) = match judged {
            Some(score) => {
                let chance = accept_chance(score, self.temperature);
                (score, chance, score >= 0.5 || self.rng.random::<f64>() <= chance)
            }
            None => (0.0, 0.0, false),
        };

        let tested = self.mutation.take();
        if let (Some(mutation), Some(_)) = (&tested, judged) {
            let current_weight = self.current.get(&mutation.model).unwrap_or(0.0);
            let candidate_weight = self.candidate.get(&mutation.model).unwrap_or(0.0);
            if let Err(e) = self.proposer.adjust(
                &mutation.model,
                current_weight,
                candidate_weight,
                score,
                accepted,
                self.temperature,
            ) {
                warn!(error = %e, "Skipped interest update");
            }
        }

        if accepted {
            self.current = self.candidate.clone();
            self.sink.write(&self.current);
        } else {
            self.candidate = self.current.clone();
        }

        let next = self.proposer.propose(&mut self.rng);
        self.candidate.set(&next.model, next.weight);

        info!(
            iteration = self.iteration,
            judged = judged.is_some(),
            score,
            accept_chance = chance,
            accepted,
            model = next.model.as_str(),
            from = self.current.get(&next.model).unwrap_or(0.0),
            to = next.weight,
            "Round decided"
        );

        // Queued pairs the judge never saw move into the new lineage.
        let carried = leftover
            .into_iter()
            .map(|pair| if accepted { pair.candidate } else { pair.current })
            .collect();

        self.mutation = Some(next.clone());
        self.iteration += 1;
        self.temperature /= self.temperature_factor;

        self.start_generation(carried);

        Some(RoundOutcome {
            iteration: self.iteration,
            judged: judged.is_some(),
            score,
            accept_chance: chance,
            accepted,
            tested,
            next,
            temperature: self.temperature,
            decided_at: Utc::now(),
        })
    }

    /// True when judging can stop for the current round.
    pub fn should_stop(&self, current_score: f64, candidate_score: f64) -> bool {
        self.stop_reason(current_score, candidate_score).is_some()
    }

    pub fn stop_reason(&self, current_score: f64, candidate_score: f64) -> Option<StopReason> {
        stop_reason(
            current_score,
            candidate_score,
            self.temperature,
            self.config.round_budget_scale,
            self.config.round_budget_decay,
        )
    }

    /// Cancel in-flight generation. The worker exits at its next suspension
    /// point without queueing anything further.
    pub fn stop(&self) {
        if let Some(worker) = &self.worker {
            worker.cancel();
        }
    }

    /// Relaunch generation for the current/candidate pair, e.g. after a failed batch.
    pub fn restart_generation(&mut self) {
        self.seal_samples();
        self.start_generation(Vec::new());
    }

    /// Wait for the active worker to finish and return how many pairs it delivered.
    pub async fn wait_generation(&mut self) -> Result<usize> {
        let result = match self.worker.take() {
            Some(worker) => worker.join().await,
            None => Ok(0),
        };
        self.drain_samples();
        result
    }

    /// Wait until the queue holds pair `index`, or `None` once generation has
    /// ended without producing it.
    pub async fn sample_at(&mut self, index: usize) -> Option<SamplePair> {
        loop {
            self.drain_samples();
            if let Some(pair) = self.queue.get(index) {
                return Some(pair.clone());
            }
            match self.samples_rx.recv().await {
                Some(pair) => self.queue.push(pair),
                None => return None,
            }
        }
    }

    /// Pairs queued for judging, oldest first.
    pub fn samples(&mut self) -> &[SamplePair] {
        self.drain_samples();
        &self.queue
    }

    pub fn is_generating(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.is_cancelled() && !w.is_finished())
    }

    pub fn is_finished(&self) -> bool {
        self.iteration > self.steps
    }

    pub fn round_budget(&self) -> f64 {
        round_budget(
            self.temperature,
            self.config.round_budget_scale,
            self.config.round_budget_decay,
        )
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn temperature_factor(&self) -> f64 {
        self.temperature_factor
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn current(&self) -> &WeightVector {
        &self.current
    }

    pub fn candidate(&self) -> &WeightVector {
        &self.candidate
    }

    pub fn mutation(&self) -> Option<&Mutation> {
        self.mutation.as_ref()
    }

    pub fn proposer(&self) -> &MutationProposer {
        &self.proposer
    }

    pub fn status(&mut self) -> AnnealingStatus {
        self.drain_samples();
        AnnealingStatus {
            iteration: self.iteration,
            steps: self.steps,
            temperature: self.temperature,
            current: self.current.clone(),
            candidate: self.candidate.clone(),
            mutation: self.mutation.clone(),
            queued_pairs: self.queue.len(),
            generating: self.is_generating(),
        }
    }

    /// Cancel the worker and close its channel, then collect what it already
    /// sent. A send racing the cancellation fails instead of landing in a
    /// receiver that is about to be replaced.
    fn seal_samples(&mut self) {
        self.stop();
        self.samples_rx.close();
        self.drain_samples();
    }

    fn drain_samples(&mut self) {
        while let Ok(pair) = self.samples_rx.try_recv() {
            self.queue.push(pair);
        }
    }

    fn start_generation(&mut self, carried: Vec<Sample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.samples_rx = rx;

        let fresh_pairs = (self.config.pipeline_multiplier * self.round_budget()).ceil() as usize;
        let job = GenerationJob {
            current: self.current.clone(),
            candidate: self.candidate.clone(),
            carried,
            fresh_pairs,
        };

        let previous = self.worker.take();
        self.worker = Some(GenerationWorker::spawn(
            &self.runtime,
            self.generator.clone(),
            job,
            tx,
            previous,
        ));
    }
}

impl Drop for AnnealingController {
    fn drop(&mut self) {
        self.stop();
    }
}
