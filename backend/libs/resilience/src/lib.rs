/// Resilience helpers for calls that leave the process
///
/// - **Timeout**: every collaborator call is bounded; an elapsed deadline is a
///   distinct, retryable error category
/// - **Retry**: exponential backoff with jitter, opt-in per call site and
///   gated by a caller-supplied predicate so permanent failures return at once
///
/// # Example: bounded call to an external API
///
/// ```rust,no_run
/// use resilience::with_timeout;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_timeout(Duration::from_secs(10), async {
///         // Your HTTP call here
///         42
///     })
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutError};
