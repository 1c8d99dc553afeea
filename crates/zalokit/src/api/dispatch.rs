//! Partial-failure-aware batch dispatch
//!
//! Fans a single logical operation out across many independent recipients,
//! capturing success or failure per recipient. One recipient's error never
//! short-circuits the rest, and the result order always matches the input
//! order regardless of completion order. This is the only place in the SDK
//! where multi-recipient semantics live.

use std::future::Future;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, ErrorDescriptor};

/// Default number of recipient operations in flight at once
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Outcome of one unit of work within a batch
///
/// Produced once per input recipient and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    /// The recipient this outcome belongs to
    pub recipient_id: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Message id reported by the platform, when the operation produced one
    pub message_id: Option<String>,
    /// Captured error for failed operations
    pub error: Option<ErrorDescriptor>,
}

impl RequestOutcome {
    fn succeeded(recipient_id: String, message_id: Option<String>) -> Self {
        Self { recipient_id, success: true, message_id, error: None }
    }

    fn failed(recipient_id: String, error: &Error) -> Self {
        Self { recipient_id, success: false, message_id: None, error: Some(error.descriptor()) }
    }
}

/// Ordered, index-aligned outcomes of a batch dispatch
///
/// Length always equals the input length; `outcomes[i]` belongs to
/// `recipient_ids[i]`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchResult {
    outcomes: Vec<RequestOutcome>,
}

impl BatchResult {
    /// The per-recipient outcomes, in input order
    #[must_use]
    pub fn outcomes(&self) -> &[RequestOutcome] {
        &self.outcomes
    }

    /// Number of outcomes (equals the number of input recipients)
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch was empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of successful outcomes
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success).count()
    }

    /// Number of failed outcomes
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether every outcome succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.success)
    }

    /// Consume the result, yielding the outcomes vector
    #[must_use]
    pub fn into_outcomes(self) -> Vec<RequestOutcome> {
        self.outcomes
    }
}

impl IntoIterator for BatchResult {
    type Item = RequestOutcome;
    type IntoIter = std::vec::IntoIter<RequestOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// Drives per-recipient operations with bounded concurrency
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    concurrency: usize,
}

impl Default for BatchDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CONCURRENCY)
    }
}

impl BatchDispatcher {
    /// Create a dispatcher with the given concurrency bound (minimum 1)
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency: concurrency.max(1) }
    }

    /// Run `operation` for every recipient, collecting index-aligned
    /// outcomes
    ///
    /// The operation returns the platform message id (if any) on success.
    /// Errors are captured into the matching [`RequestOutcome`] instead of
    /// propagating, so sibling operations always run to completion.
    pub async fn dispatch<F, Fut>(&self, recipient_ids: &[String], operation: F) -> BatchResult
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = crate::error::Result<Option<String>>>,
    {
        debug!(recipients = recipient_ids.len(), concurrency = self.concurrency, "dispatching batch");

        let units = recipient_ids.iter().cloned().map(|recipient_id| {
            let unit = operation(recipient_id.clone());
            async move {
                match unit.await {
                    Ok(message_id) => RequestOutcome::succeeded(recipient_id, message_id),
                    Err(err) => {
                        debug!(recipient = %recipient_id, error = %err, "batch unit failed");
                        RequestOutcome::failed(recipient_id, &err)
                    }
                }
            }
        });

        // `buffered` preserves input order while running up to
        // `concurrency` units at once.
        let outcomes = stream::iter(units).buffered(self.concurrency).collect().await;

        BatchResult { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    fn recipients(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    #[tokio::test]
    async fn one_failure_does_not_poison_the_batch() {
        let dispatcher = BatchDispatcher::default();
        let ids = recipients(&["a", "b", "c"]);

        let result = dispatcher
            .dispatch(&ids, |recipient| async move {
                if recipient == "b" {
                    Err(Error::Api {
                        message: "delivery failed".into(),
                        code: Some(-201),
                        http_status: Some(500),
                    })
                } else {
                    Ok(Some(format!("msg-{recipient}")))
                }
            })
            .await;

        assert_eq!(result.len(), 3);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 1);
        assert!(!result.all_succeeded());

        let outcomes = result.outcomes();
        assert_eq!(outcomes[0].recipient_id, "a");
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].message_id.as_deref(), Some("msg-a"));

        assert_eq!(outcomes[1].recipient_id, "b");
        assert!(!outcomes[1].success);
        let error = outcomes[1].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Api);
        assert!(error.message.contains("delivery failed"));

        assert_eq!(outcomes[2].recipient_id, "c");
        assert!(outcomes[2].success);
    }

    #[tokio::test]
    async fn order_matches_input_regardless_of_completion_order() {
        let dispatcher = BatchDispatcher::new(4);
        let ids = recipients(&["slow", "fast", "medium"]);

        let result = dispatcher
            .dispatch(&ids, |recipient| async move {
                let delay = match recipient.as_str() {
                    "slow" => 40,
                    "medium" => 20,
                    _ => 1,
                };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Some(recipient))
            })
            .await;

        let order: Vec<&str> =
            result.outcomes().iter().map(|o| o.recipient_id.as_str()).collect();
        assert_eq!(order, ["slow", "fast", "medium"]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let dispatcher = BatchDispatcher::new(2);
        let ids: Vec<String> = (0..6).map(|i| format!("r{i}")).collect();

        let in_flight = AtomicUsize::new(0);
        let max_in_flight = AtomicUsize::new(0);

        let result = dispatcher
            .dispatch(&ids, |_recipient| {
                let in_flight = &in_flight;
                let max_in_flight = &max_in_flight;
                async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await;

        assert_eq!(result.len(), 6);
        assert!(max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_result() {
        let dispatcher = BatchDispatcher::default();
        let result = dispatcher.dispatch(&[], |_recipient| async move { Ok(None) }).await;

        assert!(result.is_empty());
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn outcomes_serialize_for_callers() {
        let dispatcher = BatchDispatcher::default();
        let ids = recipients(&["a"]);

        let result = dispatcher
            .dispatch(&ids, |_recipient| async move {
                Err(Error::RateLimit { retry_after: Some(30), message: "slow down".into() })
            })
            .await;

        let json = serde_json::to_value(&result).unwrap();
        let outcome = &json["outcomes"][0];
        assert_eq!(outcome["success"], false);
        assert_eq!(outcome["error"]["kind"], "rate_limit");
        assert_eq!(outcome["error"]["retry_after"], 30);
    }
}
