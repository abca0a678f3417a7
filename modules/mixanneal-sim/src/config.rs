use std::env;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use mixanneal_core::{AnnealingConfig, WeightVector};

const DEFAULT_MODELS: &str = "anything-v3=10,dreamlike=6,openjourney=3";
const DEFAULT_TARGET: &str = "anything-v3=3,dreamlike=10,openjourney=1";

/// Settings for a headless annealing session.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub models: WeightVector,
    pub target: WeightVector,
    pub annealing: AnnealingConfig,
    /// Logistic noise scale of the simulated judge. Zero makes it deterministic.
    pub judge_noise: f64,
    pub judge_seed: u64,
    pub latency_ms: u64,
    pub max_generation_failures: u32,
    /// When set, samples are rendered by the HTTP service instead of the simulator.
    pub generator_url: Option<String>,
    pub generator_save: String,
    pub generator_prompt: String,
}

impl SimConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let models = parse_weights(
            &lookup("MIXANNEAL_MODELS").unwrap_or_else(|| DEFAULT_MODELS.to_string()),
        )
        .context("MIXANNEAL_MODELS")?;
        let target = parse_weights(
            &lookup("MIXANNEAL_TARGET").unwrap_or_else(|| DEFAULT_TARGET.to_string()),
        )
        .context("MIXANNEAL_TARGET")?;

        let defaults = AnnealingConfig::default();
        let mut annealing = AnnealingConfig::new(
            parse_or(&lookup, "MIXANNEAL_START_TEMP", defaults.start_temperature)?,
            parse_or(&lookup, "MIXANNEAL_END_TEMP", defaults.end_temperature)?,
            parse_or(&lookup, "MIXANNEAL_STEPS_PER_MODEL", defaults.steps_per_model)?,
        );
        let seed: Option<u64> = parse_opt(&lookup, "MIXANNEAL_SEED")?;
        annealing.seed = seed;
        annealing.validate()?;

        Ok(Self {
            models,
            target,
            annealing,
            judge_noise: parse_or(&lookup, "MIXANNEAL_JUDGE_NOISE", 0.05)?,
            judge_seed: seed.map(|s| s.wrapping_add(1)).unwrap_or_else(rand::random),
            latency_ms: parse_or(&lookup, "MIXANNEAL_LATENCY_MS", 0)?,
            max_generation_failures: parse_or(&lookup, "MIXANNEAL_MAX_FAILURES", 3)?,
            generator_url: lookup("GENERATOR_URL").filter(|url| !url.trim().is_empty()),
            generator_save: lookup("GENERATOR_SAVE").unwrap_or_else(|| "default".to_string()),
            generator_prompt: lookup("GENERATOR_PROMPT").unwrap_or_default(),
        })
    }

    pub fn log_summary(&self) {
        info!(
            models = %self.models,
            target = %self.target,
            start_temperature = self.annealing.start_temperature,
            end_temperature = self.annealing.end_temperature,
            steps_per_model = self.annealing.steps_per_model,
            seed = ?self.annealing.seed,
            judge_noise = self.judge_noise,
            latency_ms = self.latency_ms,
            generator = self.generator_url.as_deref().unwrap_or("simulated"),
            "Loaded config"
        );
    }
}

/// Parse `name=weight` pairs separated by commas.
pub fn parse_weights(raw: &str) -> Result<WeightVector> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (model, weight) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected name=weight, got '{entry}'"))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .with_context(|| format!("weight for '{}'", model.trim()))?;
        pairs.push((model.trim().to_string(), weight));
    }
    if pairs.is_empty() {
        return Err(anyhow!("no models listed"));
    }
    Ok(WeightVector::from_pairs(pairs))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} has invalid value '{raw}'")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = SimConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.annealing.start_temperature, 5.0);
        assert_eq!(config.annealing.steps_per_model, 10);
        assert!(config.annealing.seed.is_none());
        assert!(config.generator_url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = SimConfig::from_lookup(lookup(&[
            ("MIXANNEAL_MODELS", "a=1, b=0.5"),
            ("MIXANNEAL_START_TEMP", "2.5"),
            ("MIXANNEAL_SEED", "9"),
            ("GENERATOR_URL", "http://localhost:5001"),
        ]))
        .unwrap();
        assert_eq!(config.models.get("b"), Some(0.5));
        assert_eq!(config.annealing.start_temperature, 2.5);
        assert_eq!(config.annealing.seed, Some(9));
        assert_eq!(config.generator_url.as_deref(), Some("http://localhost:5001"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(SimConfig::from_lookup(lookup(&[("MIXANNEAL_MODELS", "a:1")])).is_err());
        assert!(SimConfig::from_lookup(lookup(&[("MIXANNEAL_SEED", "soon")])).is_err());
        assert!(SimConfig::from_lookup(lookup(&[("MIXANNEAL_END_TEMP", "9")])).is_err());
    }
}
