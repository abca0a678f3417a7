//! End-to-end sessions against the simulated generator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use mixanneal_core::{
    AnnealingConfig, AnnealingController, ChannelSink, Judge, NoopSink, Sample, SampleGenerator,
    SamplePair, Verdict, WeightVector, MAX_WEIGHT,
};
use mixanneal_sim::{run_session, SimulatedGenerator, SimulatedJudge};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn three_models() -> WeightVector {
    WeightVector::from_pairs([("anything-v3", 10.0), ("dreamlike", 6.0), ("openjourney", 3.0)])
}

fn target() -> WeightVector {
    WeightVector::from_pairs([("anything-v3", 3.0), ("dreamlike", 10.0), ("openjourney", 1.0)])
}

fn short_config() -> AnnealingConfig {
    AnnealingConfig::new(5.0, 0.1, 3).with_seed(41)
}

fn cold_config() -> AnnealingConfig {
    AnnealingConfig::new(0.5, 0.01, 3).with_seed(43)
}

struct FixedJudge(Verdict);

#[async_trait]
impl Judge for FixedJudge {
    async fn judge(&self, _pair: &SamplePair) -> Result<Verdict> {
        Ok(self.0)
    }
}

/// Fails its first call, then delegates.
struct FailOnce {
    failed: AtomicBool,
    inner: SimulatedGenerator,
}

#[async_trait]
impl SampleGenerator for FailOnce {
    async fn generate(&self, weights: &WeightVector, seed: Option<u64>) -> Result<Sample> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("GPU out of memory"));
        }
        self.inner.generate(weights, seed).await
    }
}

struct AlwaysFails;

#[async_trait]
impl SampleGenerator for AlwaysFails {
    async fn generate(&self, _weights: &WeightVector, _seed: Option<u64>) -> Result<Sample> {
        Err(anyhow!("service unreachable"))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simulated_session_runs_full_schedule() {
    let mut controller = AnnealingController::new(
        &three_models(),
        short_config(),
        Arc::new(SimulatedGenerator::new(7)),
        Arc::new(NoopSink),
    )
    .unwrap();
    let steps = controller.steps();
    let judge = SimulatedJudge::new(target(), 0.0, 1);

    let report = run_session(&mut controller, &judge, 3).await.unwrap();

    assert_eq!(report.rounds, steps);
    assert_eq!(report.outcomes.len(), steps as usize);
    assert_eq!(
        report.acceptances as usize,
        report.outcomes.iter().filter(|o| o.accepted).count()
    );
    assert!(report.judged_pairs > 0);
    assert_eq!(report.generation_failures, 0);
    assert!(controller.is_finished());

    for pair in report.outcomes.windows(2) {
        assert!(pair[1].temperature < pair[0].temperature);
        assert_eq!(pair[1].iteration, pair[0].iteration + 1);
    }
    for (_, weight) in report.final_weights.iter() {
        assert!((0.0..=MAX_WEIGHT).contains(&weight));
    }
    assert_eq!(&report.final_weights, controller.current());
}

#[tokio::test]
async fn favoured_candidate_is_accepted_every_round() {
    let (sink, mut accepted) = ChannelSink::new();
    let mut controller = AnnealingController::new(
        &three_models(),
        short_config(),
        Arc::new(SimulatedGenerator::new(8)),
        Arc::new(sink),
    )
    .unwrap();
    let steps = controller.steps();

    let report = run_session(&mut controller, &FixedJudge(Verdict::Candidate), 3)
        .await
        .unwrap();
    assert_eq!(report.acceptances, steps);
    assert!(report.outcomes.iter().all(|o| o.score == 1.0));

    drop(controller);
    let mut published = 0;
    while accepted.recv().await.is_some() {
        published += 1;
    }
    // Bootstrap plus every decided round.
    assert_eq!(published, steps + 1);
}

#[tokio::test]
async fn rejected_candidates_leave_weights_untouched() {
    let initial = three_models().normalized().unwrap();
    let mut controller = AnnealingController::new(
        &three_models(),
        cold_config(),
        Arc::new(SimulatedGenerator::new(9)),
        Arc::new(NoopSink),
    )
    .unwrap();

    let report = run_session(&mut controller, &FixedJudge(Verdict::Current), 3)
        .await
        .unwrap();

    assert_eq!(report.acceptances, 0);
    assert_eq!(report.final_weights, initial);
    assert!(report.outcomes.iter().all(|o| o.score == 0.0));
}

#[tokio::test]
async fn distance_is_reported_by_caller() {
    let judge = SimulatedJudge::new(target(), 0.0, 2);
    let mut controller = AnnealingController::new(
        &three_models(),
        short_config(),
        Arc::new(SimulatedGenerator::new(10)),
        Arc::new(NoopSink),
    )
    .unwrap();

    let report = run_session(&mut controller, &judge, 3).await.unwrap();
    assert!(report.distance.is_none());

    let distance = judge.distance(&report.final_weights);
    let report = report.with_distance(distance);
    assert_eq!(report.distance, Some(distance));
}

// ---------------------------------------------------------------------------
// Generation failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_generation_failure_is_retried() {
    let generator = Arc::new(FailOnce {
        failed: AtomicBool::new(false),
        inner: SimulatedGenerator::new(11),
    });
    let mut controller = AnnealingController::new(
        &three_models(),
        short_config(),
        generator,
        Arc::new(NoopSink),
    )
    .unwrap();
    let steps = controller.steps();

    let report = run_session(&mut controller, &FixedJudge(Verdict::Draw), 3)
        .await
        .unwrap();
    assert_eq!(report.generation_failures, 1);
    assert_eq!(report.rounds, steps);
}

#[tokio::test]
async fn persistent_generation_failure_aborts_session() {
    let mut controller = AnnealingController::new(
        &three_models(),
        short_config(),
        Arc::new(AlwaysFails),
        Arc::new(NoopSink),
    )
    .unwrap();

    let err = run_session(&mut controller, &FixedJudge(Verdict::Draw), 2)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("3 times"), "{err}");
    assert_eq!(controller.iteration(), 1);
}
