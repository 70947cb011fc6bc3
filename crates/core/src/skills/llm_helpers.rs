//! # LLM Helpers
//!
//! Shared plumbing for the stage skills: the per-run call context and the
//! bounded, order-preserving join used for per-agent calls.

use futures::stream::{self, Stream, StreamExt};
use std::future::Future;

use super::personas::PersonaTable;
use super::prompts::Prompts;
use crate::config::PipelineConfig;
use crate::error::ProviderError;
use crate::gateway::{generate_with_timeout, CompletionGateway, CompletionRequest};

/// Everything a stage needs besides the state it reads
pub struct StageContext<'a> {
    pub gateway: &'a dyn CompletionGateway,
    pub config: &'a PipelineConfig,
    pub prompts: &'a Prompts,
    pub personas: &'a PersonaTable,
}

impl<'a> StageContext<'a> {
    pub fn new(
        gateway: &'a dyn CompletionGateway,
        config: &'a PipelineConfig,
        prompts: &'a Prompts,
        personas: &'a PersonaTable,
    ) -> Self {
        Self {
            gateway,
            config,
            prompts,
            personas,
        }
    }

    /// One gateway call under the configured per-call timeout
    pub async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        generate_with_timeout(self.gateway, request, self.config.call_timeout()).await
    }
}

/// Drive `calls` with at most `concurrency` in flight, yielding results in input order.
///
/// With `concurrency == 1` this is plain sequential execution.
pub fn ordered_join<Fut>(calls: Vec<Fut>, concurrency: usize) -> impl Stream<Item = Fut::Output>
where
    Fut: Future,
{
    stream::iter(calls).buffered(concurrency.max(1))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn collect(concurrency: usize, peak: Arc<AtomicUsize>) -> Vec<u64> {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let calls: Vec<_> = [30u64, 10, 20]
            .into_iter()
            .map(|delay| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    delay
                }
            })
            .collect();

        ordered_join(calls, concurrency).collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_keeps_order() {
        let peak = Arc::new(AtomicUsize::new(0));
        assert_eq!(collect(1, Arc::clone(&peak)).await, vec![30, 10, 20]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_keeps_order() {
        let peak = Arc::new(AtomicUsize::new(0));
        assert_eq!(collect(3, Arc::clone(&peak)).await, vec![30, 10, 20]);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_sequential() {
        let calls: Vec<_> = [1u8, 2].into_iter().map(|n| async move { n }).collect();
        let results: Vec<u8> = ordered_join(calls, 0).collect().await;
        assert_eq!(results, vec![1, 2]);
    }
}
