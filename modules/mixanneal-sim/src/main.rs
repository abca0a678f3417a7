use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use generator_client::{GenerationRequest, GeneratorClient};
use mixanneal_core::{AnnealingController, ChannelSink, SampleGenerator};
use mixanneal_sim::{run_session, SimConfig, SimulatedGenerator, SimulatedJudge};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mixanneal=info".parse()?)
                .add_directive("mixanneal_core=info".parse()?)
                .add_directive("mixanneal_sim=info".parse()?)
                .add_directive("generator_client=info".parse()?),
        )
        .init();

    info!("mixanneal simulation starting...");

    let config = SimConfig::from_env()?;
    config.log_summary();

    let generator: Arc<dyn SampleGenerator> = match &config.generator_url {
        Some(url) => Arc::new(GeneratorClient::new(
            url,
            &config.generator_save,
            GenerationRequest::with_prompt(config.generator_prompt.clone()),
        )?),
        None => {
            let seed = config.annealing.seed.unwrap_or_else(rand::random);
            let mut simulated = SimulatedGenerator::new(seed);
            if config.latency_ms > 0 {
                simulated = simulated.with_latency(Duration::from_millis(config.latency_ms));
            }
            Arc::new(simulated)
        }
    };

    let (sink, mut accepted) = ChannelSink::new();
    let listener = tokio::spawn(async move {
        while let Some(weights) = accepted.recv().await {
            info!(weights = %weights, "Settings updated");
        }
    });

    let judge = SimulatedJudge::new(config.target.clone(), config.judge_noise, config.judge_seed);
    let mut controller =
        AnnealingController::new(&config.models, config.annealing.clone(), generator, Arc::new(sink))?;

    let initial_distance = judge.distance(controller.current());
    let report = run_session(&mut controller, &judge, config.max_generation_failures).await?;
    let final_distance = judge.distance(&report.final_weights);
    let report = report.with_distance(final_distance);

    drop(controller);
    listener.await?;

    info!(
        initial_distance,
        final_distance,
        "Distance to target"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
