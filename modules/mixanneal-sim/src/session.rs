//! Headless driver: judges queued pairs in order and hands cumulative scores
//! back to the controller whenever a round can be decided.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mixanneal_core::{AnnealingController, Judge, RoundOutcome, Tally, WeightVector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub rounds: u32,
    pub acceptances: u32,
    pub judged_pairs: usize,
    pub generation_failures: u32,
    pub final_weights: WeightVector,
    /// Share distance to the judge's target, when the judge has one.
    pub distance: Option<f64>,
    pub outcomes: Vec<RoundOutcome>,
}

impl SessionReport {
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// Run the controller's schedule to completion. Gives up after
/// `max_failures` consecutive failed generation batches.
pub async fn run_session<J>(
    controller: &mut AnnealingController,
    judge: &J,
    max_failures: u32,
) -> Result<SessionReport>
where
    J: Judge + ?Sized,
{
    let mut tally = Tally::default();
    let mut index = 0usize;
    let mut consecutive_failures = 0u32;
    let mut report = SessionReport {
        rounds: 0,
        acceptances: 0,
        judged_pairs: 0,
        generation_failures: 0,
        final_weights: controller.current().clone(),
        distance: None,
        outcomes: Vec::new(),
    };

    while !controller.is_finished() {
        if let Some(reason) = controller.stop_reason(tally.current, tally.candidate) {
            debug!(%reason, judged = tally.judged(), "Deciding round");
            decide(controller, &mut tally, &mut report);
            index = 0;
            continue;
        }

        match controller.sample_at(index).await {
            Some(pair) => {
                let verdict = judge.judge(&pair).await?;
                tally.record(verdict);
                report.judged_pairs += 1;
                consecutive_failures = 0;
                index += 1;
            }
            None => match controller.wait_generation().await {
                Err(e) => {
                    report.generation_failures += 1;
                    consecutive_failures += 1;
                    if consecutive_failures > max_failures {
                        controller.stop();
                        return Err(anyhow!(e).context(format!(
                            "generation failed {consecutive_failures} times in a row"
                        )));
                    }
                    warn!(error = %e, attempt = consecutive_failures, "Restarting generation");
                    controller.restart_generation();
                }
                Ok(delivered) => {
                    // Worker ran dry before the round could be decided.
                    warn!(delivered, judged = tally.judged(), "Sample queue exhausted");
                    decide(controller, &mut tally, &mut report);
                    index = 0;
                }
            },
        }
    }

    controller.stop();
    report.final_weights = controller.current().clone();
    info!(
        rounds = report.rounds,
        acceptances = report.acceptances,
        judged = report.judged_pairs,
        final_weights = %report.final_weights,
        "Session finished"
    );
    Ok(report)
}

fn decide(controller: &mut AnnealingController, tally: &mut Tally, report: &mut SessionReport) {
    if let Some(outcome) = controller.next(tally.current, tally.candidate) {
        report.rounds += 1;
        if outcome.accepted {
            report.acceptances += 1;
        }
        report.outcomes.push(outcome);
    }
    tally.reset();
}
