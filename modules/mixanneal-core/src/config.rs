use serde::{Deserialize, Serialize};

use crate::error::{AnnealError, Result};

/// Parameters of one annealing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealingConfig {
    pub start_temperature: f64,
    pub end_temperature: f64,
    /// Rounds per active model; the schedule runs `steps_per_model * models` rounds.
    pub steps_per_model: u32,
    /// Seed for acceptance and proposal draws. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Round budget at zero temperature.
    pub round_budget_scale: f64,
    /// Temperature over which the round budget shrinks by a factor of e.
    pub round_budget_decay: f64,
    /// Pairs pre-rendered per budgeted round while the judge is busy.
    pub pipeline_multiplier: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            start_temperature: 5.0,
            end_temperature: 0.1,
            steps_per_model: 10,
            seed: None,
            round_budget_scale: 20.0,
            round_budget_decay: 2.0,
            pipeline_multiplier: 2.0,
        }
    }
}

impl AnnealingConfig {
    pub fn new(start_temperature: f64, end_temperature: f64, steps_per_model: u32) -> Self {
        Self {
            start_temperature,
            end_temperature,
            steps_per_model,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(AnnealError::Config(format!(
                    "{name} must be a positive finite number, got {value}"
                )))
            }
        };

        positive("start_temperature", self.start_temperature)?;
        positive("end_temperature", self.end_temperature)?;
        positive("round_budget_scale", self.round_budget_scale)?;
        positive("round_budget_decay", self.round_budget_decay)?;

        if self.start_temperature <= self.end_temperature {
            return Err(AnnealError::Config(format!(
                "start_temperature ({}) must exceed end_temperature ({})",
                self.start_temperature, self.end_temperature
            )));
        }
        if self.steps_per_model == 0 {
            return Err(AnnealError::Config(
                "steps_per_model must be at least 1".to_string(),
            ));
        }
        if !self.pipeline_multiplier.is_finite() || self.pipeline_multiplier < 0.0 {
            return Err(AnnealError::Config(format!(
                "pipeline_multiplier must be a non-negative finite number, got {}",
                self.pipeline_multiplier
            )));
        }
        Ok(())
    }
}
