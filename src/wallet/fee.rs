// Platform fee bookkeeping
//
// The fee is split off every contribution before the publisher transfer and
// delivered later by a per-obligation timer. Timers are detached tokio tasks;
// the map below holds at most one per obligation id.

use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::RetryJitter;
use crate::error::{LedgerError, LedgerResult};

/// Memo attached to every fee transfer
pub const FEE_MESSAGE: &str = "5% transaction fee collected by the rewards platform";

/// Surcharge multiplier the fee is derived from
const FEE_MULTIPLIER: Decimal = dec!(1.05);

/// Split of a requested amount into the publisher part and the platform fee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee: Decimal,
    pub reconcile_amount: Decimal,
}

impl FeeSplit {
    /// Fails when the surcharge does not fit in a `Decimal`
    pub fn for_amount(amount: Decimal) -> LedgerResult<Self> {
        let overflow = || LedgerError::Failed(format!("amount {} is too large to settle", amount));

        let fee = amount
            .checked_mul(FEE_MULTIPLIER)
            .and_then(|total| total.checked_sub(amount))
            .ok_or_else(overflow)?;
        let reconcile_amount = amount.checked_sub(fee).ok_or_else(overflow)?;

        Ok(Self {
            fee,
            reconcile_amount,
        })
    }
}

/// Delay before the next fee attempt
pub fn randomized_delay(base: Duration, jitter: RetryJitter) -> Duration {
    match jitter {
        RetryJitter::None => base,
        RetryJitter::Geometric => {
            let uniform: f64 = rand::rng().random();
            let factor = (1.0 - uniform).ln().abs();
            Duration::from_secs_f64(base.as_secs_f64() * factor)
        }
    }
}

struct FeeTimer {
    generation: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

/// Live retry timers keyed by obligation id
///
/// Once `cancel_all` ran, further `arm` calls are refused. A timer that
/// already fired and released its entry may still be mid-transfer then.
pub struct FeeTimers {
    timers: Mutex<HashMap<String, FeeTimer>>,
    next_generation: AtomicU64,
    shut_down: AtomicBool,
}

impl FeeTimers {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Runs `on_elapsed` after `delay`, replacing any timer already armed
    /// for `fee_id`. The callback receives the timer's generation, which it
    /// must hand back to [`FeeTimers::release`]. Returns false after
    /// `cancel_all`, in which case nothing is scheduled.
    pub fn arm<F, Fut>(&self, fee_id: &str, delay: Duration, on_elapsed: F) -> bool
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Held while spawning so a zero delay cannot fire before the entry exists
        let mut timers = self.timers.lock();
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_elapsed(generation).await;
        });

        let previous = timers.insert(
            fee_id.to_string(),
            FeeTimer {
                generation,
                delay,
                handle,
            },
        );

        if let Some(previous) = previous {
            previous.handle.abort();
        }
        true
    }

    /// Forgets the timer for `fee_id` if it is still the one identified by
    /// `generation`. Returns false when it was replaced in the meantime.
    pub fn release(&self, fee_id: &str, generation: u64) -> bool {
        let mut timers = self.timers.lock();
        match timers.get(fee_id) {
            Some(timer) if timer.generation == generation => {
                timers.remove(fee_id);
                true
            }
            _ => false,
        }
    }

    pub fn delay(&self, fee_id: &str) -> Option<Duration> {
        self.timers.lock().get(fee_id).map(|timer| timer.delay)
    }

    pub fn is_armed(&self, fee_id: &str) -> bool {
        self.timers.lock().contains_key(fee_id)
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Aborts every armed timer and refuses new ones
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock();
        self.shut_down.store(true, Ordering::SeqCst);
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Default for FeeTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FeeTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_fee_split() {
        let split = FeeSplit::for_amount(dec!(10.0)).unwrap();
        assert_eq!(split.fee, dec!(0.5));
        assert_eq!(split.reconcile_amount, dec!(9.5));

        let split = FeeSplit::for_amount(dec!(20.0)).unwrap();
        assert_eq!(split.fee, dec!(1.0));
        assert_eq!(split.reconcile_amount, dec!(19.0));
    }

    #[test]
    fn test_fee_split_adds_back_up() {
        for amount in [dec!(0.25), dec!(1), dec!(3.333), dec!(7.77), dec!(1000000)] {
            let split = FeeSplit::for_amount(amount).unwrap();
            assert_eq!(split.fee, amount * dec!(0.05));
            assert_eq!(split.reconcile_amount + split.fee, amount);
        }
    }

    #[test]
    fn test_fee_split_rejects_overflowing_amount() {
        let result = FeeSplit::for_amount(Decimal::MAX / dec!(1.01));
        assert!(matches!(result, Err(LedgerError::Failed(_))));

        // still fine just below the surcharge limit
        assert!(FeeSplit::for_amount(Decimal::MAX / dec!(1.06)).is_ok());
    }

    #[test]
    fn test_randomized_delay_mean() {
        let base = Duration::from_secs(45);
        assert_eq!(randomized_delay(base, RetryJitter::None), base);

        let samples = 10_000;
        let total: f64 = (0..samples)
            .map(|_| randomized_delay(base, RetryJitter::Geometric).as_secs_f64())
            .sum();
        let mean = total / samples as f64;
        assert!(mean > 40.0 && mean < 50.0, "mean delay was {}", mean);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let timers = FeeTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for delay in [10, 20] {
            let fired = fired.clone();
            timers.arm("c1", Duration::from_secs(delay), move |_| async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(timers.len(), 1);
        assert_eq!(timers.delay("c1"), Some(Duration::from_secs(20)));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_not_released() {
        let timers = FeeTimers::new();
        timers.arm("c1", Duration::from_secs(60), |_| async {});
        timers.arm("c1", Duration::from_secs(60), |_| async {});

        // the first arm used generation 1
        assert!(!timers.release("c1", 1));
        assert!(timers.is_armed("c1"));
        assert!(timers.release("c1", 2));
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_arming_after_cancel_all() {
        let timers = FeeTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        assert!(timers.arm("c1", Duration::from_secs(10), |_| async {}));

        timers.cancel_all();

        let counter = fired.clone();
        let armed = timers.arm("c2", Duration::from_secs(10), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!armed);
        assert!(timers.is_shut_down());
        assert!(timers.is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
