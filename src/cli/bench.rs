//! The `bench` subcommand.

use std::error::Error;
use std::sync::Arc;

use crate::api::OllamaClient;
use crate::cli::model_list::offline_error;
use crate::core::bench::run_benchmark;
use crate::core::config::Config;

pub async fn run_bench(
    client: Arc<OllamaClient>,
    config: &Config,
    model: Option<String>,
    iterations: usize,
    prompt: &str,
) -> Result<(), Box<dyn Error>> {
    if !client.is_available().await {
        return Err(offline_error(client.base_url()));
    }

    let model = resolve_model(&client, config, model).await?;

    println!("Benchmarking {model} ({iterations} iterations)...");
    let report = run_benchmark(client.as_ref(), &model, prompt, iterations).await?;

    println!();
    println!("Benchmark results for {}", report.model);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Successful iterations: {}", report.iterations);
    println!("Avg response time:     {:.2} s", report.avg_response_time_secs);
    println!("Avg throughput:        {:.1} tokens/s", report.avg_tokens_per_second);
    println!("Avg total duration:    {:.2} s", report.avg_total_duration_secs);
    println!("Avg eval duration:     {:.2} s", report.avg_eval_duration_secs);
    Ok(())
}

/// Flag beats config beats the first installed model.
pub(crate) async fn resolve_model(
    client: &OllamaClient,
    config: &Config,
    flag: Option<String>,
) -> Result<String, Box<dyn Error>> {
    if let Some(model) = flag {
        return Ok(model);
    }
    if let Some(model) = &config.default_model {
        return Ok(model.clone());
    }
    client
        .list_models()
        .await
        .into_iter()
        .next()
        .ok_or_else(|| "No models installed. Pull one with: ollama pull <model>".into())
}
