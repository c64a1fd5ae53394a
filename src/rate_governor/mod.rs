//! Rate governor for outbound probe traffic.
//!
//! This module implements the single point of backpressure of the scan core:
//! - A token bucket bounds the request rate
//! - A counting semaphore bounds in-flight requests
//!
//! Every probe HTTP call acquires the shared governor directly, whichever scan,
//! endpoint or probe issued it, so the concurrency bound holds globally.

mod bucket;
mod governor;

pub use bucket::TokenBucket;
pub use governor::{GovernorPermit, RateGovernor, RateGovernorState};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{Duration, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_sequential_acquires_at_one_rps_are_a_second_apart() {
        let governor = RateGovernor::new(1, 1);

        let first = governor.acquire().await;
        let after_first = Instant::now();
        first.release();

        let second = governor.acquire().await;
        let gap = after_first.elapsed();
        second.release();

        assert!(gap >= Duration::from_millis(990), "gap was {:?}", gap);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_capacity() {
        let capacity = 3;
        let governor = Arc::new(RateGovernor::new(1000, capacity));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let governor = Arc::clone(&governor);
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let permit = governor.acquire().await;
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert!(governor.in_flight() <= capacity);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    permit.release();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= capacity);
        assert_eq!(governor.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_frees_slot_but_not_token() {
        let governor = RateGovernor::new(5, 2);
        let a = governor.acquire().await;
        let b = governor.acquire().await;
        assert_eq!(governor.in_flight(), 2);

        drop(a);
        assert_eq!(governor.in_flight(), 1);
        b.release();

        let state = governor.snapshot();
        assert_eq!(state.slots_in_use, 0);
        assert_eq!(state.slots_total, 2);
        // Two tokens were consumed and do not come back on release
        assert_eq!(state.current_tokens, 3.0);
        assert_eq!(state.max_tokens, 5.0);
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let governor = RateGovernor::new(0, 0);
        let state = governor.snapshot();
        assert_eq!(state.slots_total, 5);
        assert_eq!(state.refill_rate_per_second, 10.0);
    }
}
