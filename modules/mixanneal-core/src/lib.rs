//! mixanneal-core: feedback-driven simulated annealing over model mixture weights.
//!
//! A judge compares samples rendered from the accepted mixture against a
//! candidate mixture; the controller turns the win fraction into an
//! accept/reject decision, cools the temperature, and asks a learned proposer
//! for the next perturbation while a single background worker keeps rendering
//! sample pairs ahead of the judge.

pub mod acceptance;
pub mod config;
pub mod controller;
pub mod error;
pub mod kernel;
pub mod proposer;
pub mod roulette;
pub mod sample;
pub mod traits;
pub mod weights;
pub mod worker;

pub use acceptance::{accept_chance, round_budget, StopReason};
pub use config::AnnealingConfig;
pub use controller::{AnnealingController, AnnealingStatus, RoundOutcome};
pub use error::{AnnealError, Result};
pub use proposer::{Mutation, MutationProposer};
pub use sample::{Sample, SamplePair, Tally, Verdict};
pub use traits::{ChannelSink, Judge, NoopSink, SampleGenerator, SettingsSink};
pub use weights::{WeightVector, BUCKET_COUNT, MAX_WEIGHT};
pub use worker::{GenerationJob, GenerationWorker};
