//! Simulated generator and judge for running annealing sessions without a
//! GPU or a human in the loop.

pub mod config;
pub mod generator;
pub mod judge;
pub mod session;

pub use config::SimConfig;
pub use generator::SimulatedGenerator;
pub use judge::{share_distance, SimulatedJudge};
pub use session::{run_session, SessionReport};
