//! HTTP client for the local image generation service.

pub mod error;
pub mod types;

pub use error::{GeneratorError, Result};
pub use types::{GenerationRequest, SeedInfo, TxtImgResult};

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use mixanneal_core::{Sample, SampleGenerator, WeightVector};
use types::TxtImgBody;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";

pub struct GeneratorClient {
    client: reqwest::Client,
    base_url: String,
    save_name: String,
    request: GenerationRequest,
}

impl GeneratorClient {
    pub fn new(base_url: &str, save_name: &str, request: GenerationRequest) -> Result<Self> {
        // Diffusion runs can take minutes on a busy GPU.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            save_name: save_name.to_string(),
            request,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}/txtimg", self.base_url, self.save_name)
    }

    /// Render one text-to-image sample for `weights`.
    pub async fn txt_img(&self, weights: &WeightVector, seed: Option<u64>) -> Result<TxtImgResult> {
        let body = TxtImgBody::new(&self.request, weights, seed);

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(GeneratorError::Busy);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        let result: TxtImgResult = serde_json::from_str(&text)?;
        debug!(
            run_id = result.run_id.as_str(),
            seed = result.seed.actual,
            "Generated sample"
        );
        Ok(result)
    }
}

#[async_trait]
impl SampleGenerator for GeneratorClient {
    async fn generate(&self, weights: &WeightVector, seed: Option<u64>) -> anyhow::Result<Sample> {
        let result = self.txt_img(weights, seed).await?;
        Ok(Sample {
            id: result.run_id,
            seed: result.seed.actual,
            weights: weights.clone(),
        })
    }
}
