use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::sample::{Sample, SamplePair, Verdict};
use crate::weights::WeightVector;

/// Produces a comparable artifact for a weight vector.
#[async_trait]
pub trait SampleGenerator: Send + Sync {
    /// Render `weights`. When `seed` is `None` the backend picks one and
    /// reports it in the returned sample.
    async fn generate(&self, weights: &WeightVector, seed: Option<u64>) -> anyhow::Result<Sample>;
}

/// Scores one pair of samples.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, pair: &SamplePair) -> anyhow::Result<Verdict>;
}

/// Receives the accepted weight vector after every acceptance.
pub trait SettingsSink: Send + Sync {
    fn write(&self, weights: &WeightVector);
}

/// Sink that discards notifications.
pub struct NoopSink;

impl SettingsSink for NoopSink {
    fn write(&self, _weights: &WeightVector) {}
}

/// Sink that forwards accepted vectors over a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WeightVector>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WeightVector>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SettingsSink for ChannelSink {
    fn write(&self, weights: &WeightVector) {
        if self.tx.send(weights.clone()).is_err() {
            debug!("Settings receiver dropped, notification discarded");
        }
    }
}
