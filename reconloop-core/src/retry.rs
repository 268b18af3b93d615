//! Retry policy (C4): differentiated backoff classified by error shape.
//!
//! Classification is explicit rather than inferred from an opaque exception
//! type — callers' errors only need to expose a status code (if any) and a
//! message, which `ClassifiableError` captures, mirroring the substring
//! checks the teacher's `llm::batch::BatchExecutor::is_retryable_message`
//! performs, but split into the three semantically distinct branches this
//! crate needs instead of a single retryable/non-retryable bit.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Anything a retried call can fail with must expose enough to classify it.
pub trait ClassifiableError {
    /// HTTP-like status code, if the failure carries one.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Human-readable failure message, inspected for known substrings.
    fn message(&self) -> String;
}

/// The three retry classes spec.md §4.4 / §9 require to be visible in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Status 400, or a message containing "too long" / "prompt is too
    /// long", or starting with "400". Retrying is guaranteed to fail.
    ContextTooLong,
    /// Status 429, or a message matching `rate_limit` / `rate limit`, or
    /// starting with "429".
    RateLimited,
    /// Anything else.
    Other,
}

pub fn classify(status_code: Option<u16>, message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if status_code == Some(400) || lower.contains("too long") || lower.contains("prompt is too long") || lower.starts_with("400") {
        return ErrorClass::ContextTooLong;
    }
    if status_code == Some(429) || lower.contains("rate_limit") || lower.contains("rate limit") || lower.starts_with("429") {
        return ErrorClass::RateLimited;
    }
    ErrorClass::Other
}

fn classify_error(error: &impl ClassifiableError) -> ErrorClass {
    classify(error.status_code(), &error.message())
}

/// A generic error shape for any retried agent call (Reasoner, Profiler,
/// VulnLookup) — carries just enough for `classify` to work.
#[derive(Debug, Clone)]
pub struct AgentCallError {
    pub status_code: Option<u16>,
    pub message: String,
}

impl AgentCallError {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

impl ClassifiableError for AgentCallError {
    fn status_code(&self) -> Option<u16> {
        self.status_code
    }
    fn message(&self) -> String {
        self.message.clone()
    }
}

impl std::fmt::Display for AgentCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent call error: {}", self.message)
    }
}
impl std::error::Error for AgentCallError {}

/// Outcome of `retry_with_backoff`: `(result, ok)` per spec.md §4.4.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub ok: bool,
    pub attempts: u32,
    pub last_class: Option<ErrorClass>,
}

impl<T> RetryOutcome<T> {
    fn success(value: T, attempts: u32) -> Self {
        Self {
            value: Some(value),
            ok: true,
            attempts,
            last_class: None,
        }
    }

    fn failed(attempts: u32, class: ErrorClass) -> Self {
        Self {
            value: None,
            ok: false,
            attempts,
            last_class: Some(class),
        }
    }
}

const RATE_LIMITED_BASE_DELAY: Duration = Duration::from_secs(30);

/// `RetryWithBackoff(fn, maxRetries=2, initialDelay=1s)`.
///
/// `f` is called until it succeeds, a context-too-long failure is seen (no
/// further retries), or `max_retries` retries are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(mut f: F, max_retries: u32, initial_delay: Duration) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ClassifiableError,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(value) => return RetryOutcome::success(value, attempt + 1),
            Err(error) => {
                let class = classify_error(&error);
                if class == ErrorClass::ContextTooLong {
                    return RetryOutcome::failed(attempt + 1, class);
                }
                if attempt >= max_retries {
                    return RetryOutcome::failed(attempt + 1, class);
                }
                let base = match class {
                    ErrorClass::RateLimited => RATE_LIMITED_BASE_DELAY,
                    _ => initial_delay,
                };
                let delay = base * 2u32.pow(attempt);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct TestError {
        status: Option<u16>,
        message: String,
    }

    impl ClassifiableError for TestError {
        fn status_code(&self) -> Option<u16> {
            self.status
        }
        fn message(&self) -> String {
            self.message.clone()
        }
    }

    fn rate_limited() -> TestError {
        TestError {
            status: Some(429),
            message: "429 rate limit exceeded".into(),
        }
    }

    fn too_long() -> TestError {
        TestError {
            status: Some(400),
            message: "prompt is too long".into(),
        }
    }

    fn other() -> TestError {
        TestError {
            status: Some(500),
            message: "internal server error".into(),
        }
    }

    #[test]
    fn classifies_context_too_long() {
        assert_eq!(classify(Some(400), "prompt is too long"), ErrorClass::ContextTooLong);
        assert_eq!(classify(None, "400 bad request"), ErrorClass::ContextTooLong);
    }

    #[test]
    fn classifies_rate_limited() {
        assert_eq!(classify(Some(429), "whatever"), ErrorClass::RateLimited);
        assert_eq!(classify(None, "Rate Limit exceeded"), ErrorClass::RateLimited);
    }

    #[test]
    fn classifies_other() {
        assert_eq!(classify(Some(500), "internal server error"), ErrorClass::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately_without_delay() {
        let outcome = retry_with_backoff(|| async { Ok::<_, TestError>(42) }, 2, Duration::from_secs(1)).await;
        assert!(outcome.ok);
        assert_eq!(outcome.value, Some(42));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn context_too_long_aborts_after_exactly_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let outcome = retry_with_backoff(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(too_long()) }
            },
            2,
            Duration::from_secs(1),
        )
        .await;
        assert!(!outcome.ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_retries_with_30_60_second_delays() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let start = tokio::time::Instant::now();
        let outcome = retry_with_backoff(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(rate_limited()) }
            },
            2,
            Duration::from_secs(1),
        )
        .await;
        assert!(!outcome.ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_retry_with_1_2_second_delays_then_degrade() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let outcome = retry_with_backoff(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(other()) }
            },
            2,
            Duration::from_secs(1),
        )
        .await;
        assert!(!outcome.ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_recovers_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let outcome = retry_with_backoff(
            move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok(7)
                    }
                }
            },
            2,
            Duration::from_secs(1),
        )
        .await;
        assert!(outcome.ok);
        assert_eq!(outcome.value, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
