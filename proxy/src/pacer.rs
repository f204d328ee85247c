//! Token-bucket pacer for upstream dispatch
//!
//! Grants one token per period with a bounded burst reserve. The
//! dispatcher acquires a token per message, after dequeueing it; retries
//! of the same message do not acquire again, they are delayed by the
//! retry backoff instead.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket granting one token per `period`, holding at most `burst`
/// tokens during idle stretches. The bucket starts full.
pub struct Pacer {
    period: Duration,
    burst: u32,
    state: Mutex<State>,
}

struct State {
    tokens: u32,
    /// Refill anchor; tokens owed are whole periods elapsed since here
    last_refill: Instant,
}

impl Pacer {
    /// Create a pacer. A zero `period` grants tokens without pacing; a
    /// zero `burst` never grants a token.
    pub fn new(period: Duration, burst: u32) -> Self {
        Self {
            period,
            burst,
            state: Mutex::new(State {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available and consume it.
    pub async fn acquire(&self) {
        if self.period.is_zero() {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);

                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }

                // Next token materializes one period after the anchor
                (state.last_refill + self.period).saturating_duration_since(Instant::now())
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently held, for tests
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        let periods = (elapsed.as_nanos() / self.period.as_nanos().max(1))
            .min(u128::from(u32::MAX)) as u32;
        if periods == 0 {
            return;
        }

        state.tokens = state.tokens.saturating_add(periods).min(self.burst);
        if state.tokens == self.burst {
            // Full bucket; re-anchor so idle time does not accumulate
            state.last_refill = now;
        } else {
            state.last_refill += self.period * periods;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_granted_immediately() {
        let pacer = Pacer::new(Duration::from_secs(1), 3);

        let start = Instant::now();
        for _ in 0..3 {
            pacer.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_token_waits_one_period() {
        let pacer = Pacer::new(Duration::from_secs(1), 3);

        for _ in 0..3 {
            pacer.acquire().await;
        }

        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_rate() {
        let pacer = Pacer::new(Duration::from_millis(250), 1);

        let start = Instant::now();
        for _ in 0..5 {
            pacer.acquire().await;
        }
        // First token from the burst, then four paced periods
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_accumulates_up_to_burst_only() {
        let pacer = Pacer::new(Duration::from_secs(1), 3);

        for _ in 0..3 {
            pacer.acquire().await;
        }

        // A long idle stretch refills to the burst cap, not beyond
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(pacer.available(), 3);

        let start = Instant::now();
        for _ in 0..4 {
            pacer.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_does_not_pace() {
        let pacer = Pacer::new(Duration::ZERO, 1);

        let start = Instant::now();
        for _ in 0..100 {
            pacer.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
