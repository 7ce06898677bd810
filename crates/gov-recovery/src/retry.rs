// retry.rs — Retry policy and the attempt schedule it produces.
//
// The schedule is explicit state: the caller asks for the next attempt and
// gets either an attempt number with the delay to wait first, or None once
// `max_attempts` have been handed out. Delay before retry n (n ≥ 1) is
//
//   min(max_delay, base_delay · 2^(n-1)) · (1 + jitter)
//
// with jitter drawn uniformly from [0, jitter_ratio].

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Extra random delay as a fraction of the computed delay, in [0, 1].
    #[serde(default)]
    pub jitter_ratio: f64,
    /// Wall-clock limit for a single attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_attempt_timeout_secs() -> u64 {
    300
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: 0.0,
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1 = the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(retry.saturating_sub(1)));
        let capped = exp.min(self.max_delay_ms);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio <= 0.0 || capped == 0 {
            return Duration::from_millis(capped);
        }
        let jitter = rand::thread_rng().gen_range(0.0..=ratio);
        Duration::from_millis((capped as f64 * (1.0 + jitter)) as u64)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// One scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// How long to wait before starting it.
    pub delay: Duration,
}

/// Iterator-style attempt schedule for one execution.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    issued: u32,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, issued: 0 }
    }

    /// The next attempt, or None when the attempt budget is spent.
    /// The first attempt has no delay. At least one attempt is always issued.
    pub fn next_attempt(&mut self) -> Option<Attempt> {
        let limit = self.policy.max_attempts.max(1);
        if self.issued >= limit {
            return None;
        }
        let delay = match self.issued {
            0 => Duration::ZERO,
            n => self.policy.backoff(n),
        };
        self.issued += 1;
        Some(Attempt {
            number: self.issued,
            delay,
        })
    }

    /// Attempts handed out so far.
    pub fn attempts(&self) -> u32 {
        self.issued
    }
}

impl Iterator for RetrySchedule {
    type Item = Attempt;

    fn next(&mut self) -> Option<Attempt> {
        self.next_attempt()
    }
}
