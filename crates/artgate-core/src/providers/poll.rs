//! Bounded exponential backoff polling for async job vendors
//!
//! Replicate, fal.ai, Stable Horde, Prodia and ComfyUI all submit a job and
//! then poll a status endpoint. They share this loop and differ only in the
//! fetch closure that maps a vendor status to [`PollStatus`].

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::routing::ProviderName;

/// Backoff schedule and deadline for one poll loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Wait before the second status check
    pub initial_delay: Duration,
    /// Growth factor applied after every pending check
    pub multiplier: f64,
    /// Upper bound on a single wait
    pub max_delay: Duration,
    /// Overall budget measured from the first status check
    pub deadline: Duration,
}

impl PollPolicy {
    pub const fn new(
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            initial_delay,
            multiplier,
            max_delay,
            deadline,
        }
    }

    /// Vendor default schedule
    pub fn for_provider(provider: ProviderName) -> Self {
        let ms = Duration::from_millis;
        let secs = Duration::from_secs;
        match provider {
            ProviderName::Replicate => Self::new(ms(2000), 1.3, ms(8000), secs(180)),
            ProviderName::Fal => Self::new(ms(1500), 1.3, ms(6000), secs(180)),
            ProviderName::StableHorde => Self::new(ms(3000), 1.3, ms(8000), secs(300)),
            ProviderName::Prodia => Self::new(ms(2000), 1.3, ms(6000), secs(120)),
            ProviderName::ComfyUi => Self::new(ms(1500), 1.3, ms(6000), secs(300)),
            ProviderName::Together | ProviderName::HuggingFace | ProviderName::Pollinations => {
                Self::new(ms(1000), 1.3, ms(6000), secs(120))
            }
        }
    }

    /// Shrink the deadline to fit an overall budget
    pub fn capped_at(mut self, budget: Duration) -> Self {
        self.deadline = self.deadline.min(budget);
        self
    }

    /// Delay that follows `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = current.mul_f64(self.multiplier.max(1.0));
        next.min(self.max_delay)
    }

    /// The sequence of waits, ignoring the deadline
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_delay.min(self.max_delay)), |d| {
            Some(self.next_delay(*d))
        })
    }
}

/// Outcome of one status check
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Not terminal yet
    Pending,
    /// Succeeded with output
    Done(T),
    /// The vendor reported failure
    Failed(String),
}

/// Check a job until it reaches a terminal state or the deadline passes
///
/// Cancellation is checked at the top of each iteration; the vendor-side job
/// is abandoned, not cancelled. Errors returned by `fetch` propagate with the
/// job id attached.
pub async fn poll_until<T, F, Fut>(
    provider: ProviderName,
    job_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let start = Instant::now();
    let mut delay = policy.initial_delay.min(policy.max_delay);
    let mut checks: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::cancelled(provider).with_job_id(job_id).into());
        }

        checks += 1;
        match fetch().await.map_err(|e| e.with_job_id(job_id))? {
            PollStatus::Done(output) => {
                debug!(%provider, job_id, checks, elapsed_ms = start.elapsed().as_millis() as u64, "Job finished");
                return Ok(output);
            }
            PollStatus::Failed(message) => {
                return Err(ProviderError::job_failed(provider, message)
                    .with_job_id(job_id)
                    .into());
            }
            PollStatus::Pending => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.deadline {
            return Err(ProviderError::timeout(provider, elapsed)
                .with_job_id(job_id)
                .into());
        }

        let wait = delay.min(policy.deadline - elapsed);
        debug!(%provider, job_id, checks, delay_ms = wait.as_millis() as u64, "Job pending");
        tokio::time::sleep(wait).await;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(deadline_ms: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(5),
            1.3,
            Duration::from_millis(20),
            Duration::from_millis(deadline_ms),
        )
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = PollPolicy::new(
            Duration::from_millis(2000),
            1.3,
            Duration::from_millis(8000),
            Duration::from_secs(180),
        );
        let delays: Vec<u128> = policy.delays().take(8).map(|d| d.as_millis()).collect();
        assert_eq!(delays[0], 2000);
        assert!((2599..=2600).contains(&delays[1]));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), 8000);
    }

    #[test]
    fn test_vendor_defaults_are_bounded() {
        for provider in ProviderName::ALL {
            let policy = PollPolicy::for_provider(provider);
            assert!(policy.initial_delay <= policy.max_delay);
            assert!(policy.multiplier >= 1.0);
            assert!(policy.deadline >= Duration::from_secs(120));
            assert!(policy.deadline <= Duration::from_secs(300));
        }
    }

    #[test]
    fn test_capped_at_only_shrinks() {
        let policy = PollPolicy::for_provider(ProviderName::StableHorde);
        assert_eq!(policy.capped_at(Duration::from_secs(60)).deadline, Duration::from_secs(60));
        assert_eq!(policy.capped_at(Duration::from_secs(900)).deadline, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_returns_output_when_done() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let out = poll_until(
            ProviderName::Replicate,
            "job-1",
            &fast_policy(1000),
            &CancellationToken::new(),
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Ok(PollStatus::Pending)
                    } else {
                        Ok(PollStatus::Done("https://cdn.example/out.png"))
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(out, "https://cdn.example/out.png");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_terminal_times_out_with_skip() {
        let err = poll_until::<(), _, _>(
            ProviderName::Fal,
            "req-9",
            &fast_policy(60),
            &CancellationToken::new(),
            || async { Ok(PollStatus::Pending) },
        )
        .await
        .unwrap_err();

        let provider_err = err.as_provider_error().unwrap();
        assert_eq!(provider_err.kind, ProviderErrorKind::Timeout);
        assert!(provider_err.skip_provider);
        assert_eq!(provider_err.provider_job_id.as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn test_failed_status_is_job_failure() {
        let err = poll_until::<(), _, _>(
            ProviderName::Prodia,
            "j",
            &fast_policy(1000),
            &CancellationToken::new(),
            || async { Ok(PollStatus::Failed("nsfw filter".to_string())) },
        )
        .await
        .unwrap_err();

        let provider_err = err.as_provider_error().unwrap();
        assert_eq!(provider_err.kind, ProviderErrorKind::JobFailed);
        assert!(provider_err.skip_provider);
        assert!(provider_err.message.contains("nsfw filter"));
    }

    #[tokio::test]
    async fn test_cancellation_checked_before_fetch() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poll_until::<(), _, _>(ProviderName::ComfyUi, "p", &fast_policy(1000), &token, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollStatus::Pending) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.as_provider_error().unwrap().kind, ProviderErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_errors_carry_job_id() {
        let err = poll_until::<(), _, _>(
            ProviderName::StableHorde,
            "horde-1",
            &fast_policy(1000),
            &CancellationToken::new(),
            || async { Err(ProviderError::http(ProviderName::StableHorde, 503, "down").into()) },
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.as_provider_error().unwrap().provider_job_id.as_deref(),
            Some("horde-1")
        );
    }
}
