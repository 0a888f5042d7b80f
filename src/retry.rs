//! Retry orchestration.
//!
//! Every attempt runs on its own task. The orchestrating future races that
//! task against the per-attempt time window and the call context; the loser
//! is aborted, so at most one attempt is ever in flight for a call and no
//! attempt outlives the call that started it.

use std::fmt;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use bytes::Bytes;
use rand::{rngs::StdRng, SeedableRng};
use reqwest::StatusCode;
use tokio::task::JoinHandle;

use crate::{BackoffPolicy, CallContext, ResolvedRequest, RestCallError, Result, Transport};

/// Bytes read from a discarded response before it is dropped, so small
/// bodies leave the connection reusable.
pub const DRAIN_LIMIT: usize = 4 << 10;

/// Count of attempts issued through a [`Retry`].
///
/// Clones observe the same counter. Calls started from a
/// [`Client`](crate::Client) get a fresh counter each, unless one was
/// attached with [`Retry::with_counter`].
#[derive(Clone, Debug, Default)]
pub struct AttemptCounter(Arc<AtomicUsize>);

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both handles observe the same counter.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out a fresh request body per attempt from the retained bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BodySupplier {
    bytes: Option<Bytes>,
}

impl BodySupplier {
    pub fn new(bytes: Option<Bytes>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    pub fn supply(&self) -> Option<reqwest::Body> {
        self.bytes.clone().map(reqwest::Body::from)
    }
}

/// Final outcome of a retried call.
#[derive(Debug)]
pub struct Delivery {
    pub response: reqwest::Response,
    /// Attempts issued for this call, the successful one included.
    pub attempts: usize,
}

/// Issues a request and re-issues it on transient failures.
#[derive(Clone)]
pub struct Retry {
    policy: BackoffPolicy,
    attempt_timeout: Option<Duration>,
    counter: AttemptCounter,
    shared_counter: bool,
    rng: Option<Arc<Mutex<StdRng>>>,
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("policy", &self.policy)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("attempts", &self.counter.get())
            .field("shared_counter", &self.shared_counter)
            .field("seeded", &self.rng.is_some())
            .finish()
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(BackoffPolicy::disabled())
    }
}

impl Retry {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt_timeout: None,
            counter: AttemptCounter::new(),
            shared_counter: false,
            rng: None,
        }
    }

    /// Bounds each attempt; an attempt still running when the window closes
    /// is aborted and counts as a retryable failure.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Uses `rng` as the jitter source instead of the thread-local generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(Arc::new(Mutex::new(rng)));
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Attaches a caller-owned counter that every call made with this
    /// configuration adds to.
    pub fn with_counter(mut self, counter: AttemptCounter) -> Self {
        self.counter = counter;
        self.shared_counter = true;
        self
    }

    /// Copy for one logical call: same policy, own counter unless one was
    /// attached with [`with_counter`](Self::with_counter).
    pub(crate) fn for_call(&self) -> Self {
        let mut retry = self.clone();
        if !self.shared_counter {
            retry.counter = AttemptCounter::new();
        }
        retry
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn counter(&self) -> &AttemptCounter {
        &self.counter
    }

    /// Sends `request` through `transport`, retrying transient failures.
    ///
    /// The last response is returned even when its status is still
    /// retryable; only a transport-level failure on the final attempt
    /// becomes an error.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        request: &ResolvedRequest,
        context: &CallContext,
    ) -> Result<Delivery> {
        let outcome = self.run(transport, request, context).await;

        #[cfg(feature = "tracing")]
        log_cancellation(&outcome);

        outcome
    }

    async fn run(
        &self,
        transport: &dyn Transport,
        request: &ResolvedRequest,
        context: &CallContext,
    ) -> Result<Delivery> {
        context.check()?;

        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0usize;
        let mut previous_sleep = Duration::ZERO;

        loop {
            let result = self.attempt(transport, request, context).await;
            attempts += 1;
            self.counter.increment();

            let result = match result {
                Err(err) if err.is_cancellation() => return Err(err),
                other => other,
            };

            if !should_retry(&result) || attempts >= max_attempts {
                return finish(result, attempts);
            }

            #[cfg(feature = "tracing")]
            log_retryable(&result, attempts);

            if let Ok(response) = result {
                tokio::select! {
                    biased;
                    err = context.done() => return Err(err),
                    _ = drain_and_discard(response) => {}
                }
            }

            let sleep = self.next_sleep(attempts - 1, previous_sleep);
            previous_sleep = sleep;

            #[cfg(feature = "tracing")]
            tracing::debug!("retrying request after {} ms", sleep.as_millis());

            tokio::select! {
                biased;
                err = context.done() => return Err(err),
                () = tokio::time::sleep(sleep) => {}
            }
        }
    }

    async fn attempt(
        &self,
        transport: &dyn Transport,
        request: &ResolvedRequest,
        context: &CallContext,
    ) -> Result<reqwest::Response> {
        let mut task = AttemptTask(tokio::spawn(transport.send(request.to_wire())));

        let window = self.attempt_timeout;
        let expired = async move {
            match window {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            err = context.done() => Err(err),
            joined = &mut task.0 => match joined {
                Ok(sent) => sent.map_err(RestCallError::Transport),
                Err(err) => Err(RestCallError::Task(err.to_string())),
            },
            limit = expired => Err(RestCallError::AttemptTimeout(limit)),
        }
    }

    fn next_sleep(&self, retry: usize, previous: Duration) -> Duration {
        match &self.rng {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                self.policy.next_sleep_with(retry, previous, &mut *rng)
            }
            None => self.policy.next_sleep(retry, previous),
        }
    }
}

/// In-flight attempt; aborted when the orchestrating future moves on or is dropped.
struct AttemptTask(JoinHandle<reqwest::Result<reqwest::Response>>);

impl Drop for AttemptTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 5xx and 429 responses are worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn should_retry(result: &Result<reqwest::Response>) -> bool {
    match result {
        Ok(response) => is_retryable_status(response.status()),
        Err(err) => err.is_retryable(),
    }
}

fn finish(result: Result<reqwest::Response>, attempts: usize) -> Result<Delivery> {
    match result {
        Ok(response) => Ok(Delivery { response, attempts }),
        Err(err) if attempts > 1 && err.is_retryable() => Err(RestCallError::RetriesExhausted {
            attempts,
            last: Box::new(err),
        }),
        Err(err) => Err(err),
    }
}

#[cfg(feature = "tracing")]
fn log_retryable(result: &Result<reqwest::Response>, attempt: usize) {
    match result {
        Ok(response) => tracing::debug!(
            attempt,
            status = response.status().as_u16(),
            "retryable status"
        ),
        Err(err) => tracing::debug!(attempt, error = %err, "retryable error"),
    }
}

#[cfg(feature = "tracing")]
fn log_cancellation(outcome: &Result<Delivery>) {
    if let Err(err) = outcome {
        if err.is_cancellation() {
            tracing::debug!(error = %err, "call context fired, attempts stopped");
        }
    }
}

/// Reads up to [`DRAIN_LIMIT`] bytes of a discarded response, then drops it.
/// Returns the bytes read.
pub(crate) async fn drain_and_discard(mut response: reqwest::Response) -> usize {
    let mut drained = 0usize;
    while drained < DRAIN_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len(),
            _ => break,
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(drained, "discarded response body");

    drained
}
