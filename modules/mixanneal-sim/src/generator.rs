use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use uuid::Uuid;

use mixanneal_core::{Sample, SampleGenerator, WeightVector};

/// In-process stand-in for the image service. Assigns seeds from a counter
/// that starts at a seeded random offset.
pub struct SimulatedGenerator {
    next_seed: AtomicU64,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl SimulatedGenerator {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            next_seed: AtomicU64::new(rng.random_range(0..1u64 << 48)),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SampleGenerator for SimulatedGenerator {
    async fn generate(&self, weights: &WeightVector, seed: Option<u64>) -> anyhow::Result<Sample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let seed = seed.unwrap_or_else(|| self.next_seed.fetch_add(1, Ordering::SeqCst));
        let id = Uuid::new_v4().to_string();
        debug!(id = id.as_str(), seed, "Simulated sample");

        Ok(Sample {
            id,
            seed,
            weights: weights.clone(),
        })
    }
}
