use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{Result, StepwiseError};
use crate::llm::{LanguageModel, ResponseFormat};
use crate::message::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Run `f` until it succeeds, `max_retries` is exhausted, or it fails with
    /// an error that is not worth retrying. Backoff grows linearly.
    pub async fn retry<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    tracing::warn!(attempt, error = %err, "retrying model call");
                    attempt += 1;
                    sleep(self.backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_transient(err: &StepwiseError) -> bool {
    matches!(err, StepwiseError::LanguageModel(_))
}

/// Retries transport failures of the wrapped model. Parsing and protocol
/// handling stay with the agent loop.
pub struct RetryingModel<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M: LanguageModel> RetryingModel<M> {
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for RetryingModel<M> {
    async fn complete_chat(&self, messages: &[Message], format: ResponseFormat) -> Result<String> {
        self.policy
            .retry(|_| self.inner.complete_chat(messages, format))
            .await
    }
}
