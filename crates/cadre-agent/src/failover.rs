use crate::backends::LlmBackend;
use crate::llm::LlmResponse;
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, Message};
use cadre_tools::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Retry settings for one model chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts per backend after the first.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each retry.
    pub backoff_base_ms: u64,
    /// Ceiling on any single delay.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        Duration::from_millis(ms.min(self.backoff_max_ms))
    }
}

/// Status codes worth retrying against the same backend.
const TRANSIENT_STATUS: [u16; 6] = [429, 500, 502, 503, 504, 529];

/// First three-digit number in an HTTP error message.
fn status_in(msg: &str) -> Option<u16> {
    msg.split(|c: char| !c.is_ascii_digit())
        .find(|s| s.len() == 3)
        .and_then(|s| s.parse().ok())
}

/// Rate limits, overloads and timeouts are transient. Everything else,
/// a bad key or a malformed reply included, skips to the next backend.
fn is_transient(err: &CadreError) -> bool {
    match err {
        CadreError::Timeout(_) => true,
        CadreError::Http(msg) => {
            msg.to_lowercase().contains("timed out")
                || status_in(msg).is_some_and(|s| TRANSIENT_STATUS.contains(&s))
        }
        _ => false,
    }
}

/// A chain of backends tried in order.
///
/// Transient errors are retried on the same backend with exponential backoff;
/// other errors move to the next backend at once. When the chain is exhausted
/// the last error is returned.
pub struct FailoverBackend {
    chain: Vec<Box<dyn LlmBackend>>,
    policy: RetryPolicy,
}

impl FailoverBackend {
    /// A chain over `backends`, primary first.
    pub fn new(backends: Vec<Box<dyn LlmBackend>>, policy: RetryPolicy) -> CadreResult<Self> {
        if backends.is_empty() {
            return Err(CadreError::Config(
                "Failover requires at least one backend".into(),
            ));
        }
        Ok(Self {
            chain: backends,
            policy,
        })
    }

    async fn attempt(
        &self,
        index: usize,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        let backend = &self.chain[index];
        let mut retry = 0;
        loop {
            let err = match backend.chat(system_prompt, messages, tools).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            if !is_transient(&err) || retry >= self.policy.max_retries {
                return Err(err);
            }
            let delay = self.policy.delay(retry);
            info!(backend = index, retry, delay_ms = delay.as_millis() as u64, error = %err, "Retrying model call");
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[async_trait]
impl LlmBackend for FailoverBackend {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        let mut last = None;
        for index in 0..self.chain.len() {
            match self.attempt(index, system_prompt, messages, tools).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!(backend = index, error = %e, "Model backend failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| CadreError::Agent("Failover chain is empty".into())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    struct Scripted {
        replies: Mutex<VecDeque<CadreResult<LlmResponse>>>,
        calls: Arc<AtomicU32>,
    }

    fn scripted(replies: Vec<CadreResult<LlmResponse>>) -> (Box<dyn LlmBackend>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = Scripted {
            replies: Mutex::new(replies.into()),
            calls: calls.clone(),
        };
        (Box::new(backend), calls)
    }

    #[async_trait]
    impl LlmBackend for Scripted {
        async fn chat(
            &self,
            _: Option<&str>,
            _: &[Message],
            _: &[ToolDescriptor],
        ) -> CadreResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CadreError::Agent("script exhausted".into())))
        }
    }

    fn no_wait(retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries: retries,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    fn http(msg: &str) -> CadreResult<LlmResponse> {
        Err(CadreError::Http(msg.into()))
    }

    fn done(text: &str) -> CadreResult<LlmResponse> {
        Ok(LlmResponse::Done(text.into()))
    }

    #[tokio::test]
    async fn rate_limit_is_retried_on_same_backend() {
        let (primary, calls) = scripted(vec![http("OpenAI API error 429 Too Many Requests: {}"), done("ok")]);
        let chain = FailoverBackend::new(vec![primary], no_wait(3)).unwrap();

        assert!(matches!(chain.chat(None, &[], &[]).await.unwrap(), LlmResponse::Done(t) if t == "ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded_then_chain_moves_on() {
        let (primary, primary_calls) = scripted((0..5).map(|_| http("503 Service Unavailable")).collect());
        let (backup, _) = scripted(vec![done("backup")]);
        let chain = FailoverBackend::new(vec![primary, backup], no_wait(2)).unwrap();

        assert!(matches!(chain.chat(None, &[], &[]).await.unwrap(), LlmResponse::Done(t) if t == "backup"));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn bad_request_skips_retries() {
        let (primary, primary_calls) = scripted(vec![http("400 Bad Request"), done("unreachable")]);
        let (backup, _) = scripted(vec![done("backup")]);
        let chain = FailoverBackend::new(vec![primary, backup], no_wait(3)).unwrap();

        assert!(matches!(chain.chat(None, &[], &[]).await.unwrap(), LlmResponse::Done(t) if t == "backup"));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_last_error() {
        let (a, _) = scripted(vec![http("500 Internal Server Error")]);
        let (b, _) = scripted(vec![http("401 Unauthorized")]);
        let chain = FailoverBackend::new(vec![a, b], no_wait(0)).unwrap();

        let err = chain.chat(None, &[], &[]).await.unwrap_err().to_string();
        assert!(err.contains("401"), "got {err}");
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_retries: 8,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        };
        let ms = |r| policy.delay(r).as_millis();
        assert_eq!(ms(0), 500);
        assert_eq!(ms(1), 1000);
        assert_eq!(ms(3), 4000);
        assert_eq!(ms(5), 16_000);
        assert_eq!(ms(6), 30_000);
        assert_eq!(ms(70), 30_000);
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient(&CadreError::Http("Claude API error 529 <unknown status code>: {}".into())));
        assert!(is_transient(&CadreError::Http("operation timed out".into())));
        assert!(is_transient(&CadreError::Timeout("model call".into())));
        assert!(!is_transient(&CadreError::Http("OpenAI API error 401 Unauthorized: {}".into())));
        assert!(!is_transient(&CadreError::Agent("Unexpected reply".into())));
        assert_eq!(status_in("error 503 Service Unavailable"), Some(503));
        assert_eq!(status_in("no code here"), None);
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert!(FailoverBackend::new(Vec::new(), RetryPolicy::default()).is_err());
    }
}
