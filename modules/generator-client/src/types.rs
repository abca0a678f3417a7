use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use mixanneal_core::WeightVector;

/// Fixed generation settings shared by every sample in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub scale: f64,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            width: 512,
            height: 512,
            steps: 50,
            scale: 7.0,
        }
    }
}

impl GenerationRequest {
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Body of `POST /{save}/txtimg`.
#[derive(Debug, Serialize)]
pub(crate) struct TxtImgBody<'a> {
    pub models: BTreeMap<&'a str, f64>,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl<'a> TxtImgBody<'a> {
    pub fn new(request: &'a GenerationRequest, weights: &'a WeightVector, seed: Option<u64>) -> Self {
        Self {
            // The service rejects zero-weight models.
            models: weights.iter().filter(|(_, w)| *w != 0.0).collect(),
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            width: request.width,
            height: request.height,
            steps: request.steps,
            scale: request.scale,
            seed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxtImgResult {
    pub run_id: String,
    pub seed: SeedInfo,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SeedInfo {
    pub random: bool,
    #[serde(deserialize_with = "seed_from_number")]
    pub actual: u64,
}

/// Seeds may arrive as floats; keep the integral part.
fn seed_from_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(seed) = value.as_u64() {
        return Ok(seed);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Ok(f.trunc() as u64),
        _ => Err(serde::de::Error::custom(format!("invalid seed {value}"))),
    }
}
