//! Rate/retry control: per-provider call pacing, HTTP failure classification,
//! and the cooldown schedule used when a provider reports a rate limit.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use crate::config::RetryConfig;
use crate::error::ProviderError;

const MAX_JITTER_FRACTION: f64 = 0.1;

/// Blocking pause used for rate-limit cooldowns.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Enforces a fixed minimum delay between successive calls to one provider.
pub struct Pacer {
    label: &'static str,
    limiter: Option<
        RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
    >,
    clock: DefaultClock,
}

impl Pacer {
    /// A zero `delay` disables pacing.
    pub fn new(label: &'static str, delay: Duration) -> Self {
        let limiter = Quota::with_period(delay)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            label,
            limiter,
            clock: DefaultClock::default(),
        }
    }

    #[cfg(test)]
    pub fn unpaced(label: &'static str) -> Self {
        Self::new(label, Duration::ZERO)
    }

    /// Blocks until the next call to this provider is allowed.
    pub fn wait(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            let wait = not_until.wait_time_from(self.clock.now());
            debug!("{}: pacing next call by {:?}", self.label, wait);
            std::thread::sleep(wait);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpFailureKind {
    RateLimited,
    Timeout,
    Hard,
}

fn classify_status(code: u16) -> HttpFailureKind {
    match code {
        429 => HttpFailureKind::RateLimited,
        408 | 500 | 502 | 503 | 504 => HttpFailureKind::Timeout,
        _ => HttpFailureKind::Hard,
    }
}

/// Maps a `ureq` failure onto the provider error taxonomy.
///
/// HTTP 429 is the rate-limit signal; everything else is transient for this
/// run, including non-retryable client errors, which are simply skipped.
pub fn classify_ureq_failure(provider: &'static str, error: ureq::Error) -> ProviderError {
    match error {
        ureq::Error::Status(code, response) => {
            let retry_after = response.header("Retry-After").map(str::to_string);
            let body: String = response
                .into_string()
                .unwrap_or_default()
                .chars()
                .take(160)
                .collect();
            match classify_status(code) {
                HttpFailureKind::RateLimited => ProviderError::rate_limited(
                    provider,
                    match retry_after {
                        Some(after) => format!("HTTP 429 (retry after {after}s)"),
                        None => "HTTP 429".to_string(),
                    },
                ),
                HttpFailureKind::Timeout => {
                    ProviderError::transient(provider, format!("timeout: HTTP {code} {body}"))
                }
                HttpFailureKind::Hard => {
                    ProviderError::transient(provider, format!("HTTP {code} {body}"))
                }
            }
        }
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                ProviderError::transient(provider, format!("timeout: {message}"))
            } else {
                ProviderError::transient(provider, message)
            }
        }
    }
}

/// Runs a prepared request and decodes a JSON body.
pub fn call_json(
    provider: &'static str,
    result: Result<ureq::Response, ureq::Error>,
) -> Result<Value, ProviderError> {
    let response = result.map_err(|error| classify_ureq_failure(provider, error))?;
    response.into_json::<Value>().map_err(|error| {
        ProviderError::transient(provider, format!("failed to read response: {error}"))
    })
}

/// Shared blocking HTTP agent with the same timeouts for every provider.
pub fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

/// Cooldown schedule for rate-limited units of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub cooldown: Duration,
    pub max_cooldown: Duration,
    /// Total attempts per unit while the provider keeps rate limiting.
    pub max_rate_limit_attempts: u32,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(config.cooldown_secs),
            max_cooldown: Duration::from_secs(config.max_cooldown_secs.max(config.cooldown_secs)),
            max_rate_limit_attempts: config.max_rate_limit_attempts.max(1),
            jitter: config.jitter,
        }
    }

    /// Returns `true` when a unit that has failed `attempts_made` times may run again.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_rate_limit_attempts
    }

    /// Cooldown after the `attempt`-th rate-limited attempt (1-based):
    /// doubles each time, capped at `max_cooldown`.
    pub fn cooldown_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let multiplier = 1u32 << exponent;
        let base = self
            .cooldown
            .checked_mul(multiplier)
            .unwrap_or(self.max_cooldown)
            .min(self.max_cooldown);
        if self.jitter {
            base + jitter_for(base)
        } else {
            base
        }
    }
}

fn jitter_for(base: Duration) -> Duration {
    let mut bytes = [0u8; 2];
    if getrandom::fill(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    let unit = f64::from(u16::from_le_bytes(bytes)) / f64::from(u16::MAX);
    base.mul_f64(unit * MAX_JITTER_FRACTION)
}
