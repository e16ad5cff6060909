//! Model benchmarking.
//!
//! Iterations run sequentially so latency numbers are not skewed by the
//! calls contending for the same GPU/CPU. Failed iterations are dropped;
//! averages cover the successful ones only.

use std::error::Error as StdError;
use std::fmt;

use tracing::debug;

use crate::api::{ChatMessage, ChatMetrics, SamplingOptions};
use crate::core::backend::ChatBackend;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    pub model: String,
    /// Count of successful iterations, not the requested count.
    pub iterations: usize,
    pub avg_response_time_secs: f64,
    pub avg_tokens_per_second: f64,
    pub avg_total_duration_secs: f64,
    pub avg_eval_duration_secs: f64,
}

#[derive(Debug)]
pub enum BenchmarkError {
    AllAttemptsFailed,
}

impl fmt::Display for BenchmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchmarkError::AllAttemptsFailed => write!(f, "All benchmark attempts failed"),
        }
    }
}

impl StdError for BenchmarkError {}

/// Fixed low-variance sampling for comparable timings across runs.
fn benchmark_options() -> SamplingOptions {
    SamplingOptions {
        temperature: 0.7,
        num_predict: 100,
        ..SamplingOptions::default()
    }
}

pub async fn run_benchmark(
    backend: &dyn ChatBackend,
    model: &str,
    test_prompt: &str,
    iterations: usize,
) -> Result<BenchmarkReport, BenchmarkError> {
    let messages = vec![ChatMessage::new("user", test_prompt)];
    let options = benchmark_options();

    let mut samples: Vec<ChatMetrics> = Vec::with_capacity(iterations);
    for attempt in 0..iterations {
        match backend.chat_with_metrics(model, &messages, &options).await {
            Ok((_, metrics)) => samples.push(metrics),
            Err(err) => debug!(%err, model, attempt, "benchmark iteration failed"),
        }
    }

    if samples.is_empty() {
        return Err(BenchmarkError::AllAttemptsFailed);
    }

    let count = samples.len() as f64;
    let avg = |pick: fn(&ChatMetrics) -> f64| samples.iter().map(pick).sum::<f64>() / count;

    Ok(BenchmarkReport {
        model: model.to_string(),
        iterations: samples.len(),
        avg_response_time_secs: avg(|m| m.response_time_secs),
        avg_tokens_per_second: avg(|m| m.tokens_per_second),
        avg_total_duration_secs: avg(|m| m.total_duration_secs),
        avg_eval_duration_secs: avg(|m| m.eval_duration_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::testing::ScriptedBackend;

    fn metrics(response_time: f64, tokens_per_second: f64) -> ChatMetrics {
        ChatMetrics {
            response_time_secs: response_time,
            tokens_per_second,
            total_duration_secs: response_time,
            eval_duration_secs: response_time / 2.0,
            ..ChatMetrics::default()
        }
    }

    #[tokio::test]
    async fn averages_cover_successful_iterations_only() {
        let backend = ScriptedBackend::new();
        backend.push_chat("m", Ok(("ok".to_string(), metrics(2.0, 30.0))));
        backend.push_chat_error("m", "connection refused");
        backend.push_chat("m", Ok(("ok".to_string(), metrics(4.0, 50.0))));

        let report = run_benchmark(&backend, "m", "Hello, how are you?", 3)
            .await
            .expect("benchmark");

        // 1 of 3 failed: averages are over the 2 successes, and the report
        // says 2, not 3.
        assert_eq!(report.iterations, 2);
        assert_eq!(report.avg_response_time_secs, 3.0);
        assert_eq!(report.avg_tokens_per_second, 40.0);
        assert_eq!(report.avg_total_duration_secs, 3.0);
        assert_eq!(report.avg_eval_duration_secs, 1.5);
    }

    #[tokio::test]
    async fn all_failed_iterations_return_error_result() {
        let backend = ScriptedBackend::new();
        backend.push_chat_error("m", "refused");
        backend.push_chat_error("m", "refused");
        backend.push_chat_error("m", "refused");

        let result = run_benchmark(&backend, "m", "Hello", 3).await;
        let err = result.expect_err("should fail");
        assert_eq!(err.to_string(), "All benchmark attempts failed");
    }

    #[tokio::test]
    async fn single_success_reports_its_own_numbers() {
        let backend = ScriptedBackend::new();
        backend.push_chat("m", Ok(("ok".to_string(), metrics(1.5, 80.0))));

        let report = run_benchmark(&backend, "m", "Hello", 1).await.expect("benchmark");
        assert_eq!(report.iterations, 1);
        assert_eq!(report.avg_tokens_per_second, 80.0);
        assert_eq!(report.model, "m");
    }
}
