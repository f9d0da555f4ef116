use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use embedded_time::{Clock, Instant};
use rand::{Rng, SeedableRng};

use crate::time::{self, Millis};

/// A non-blocking timer that decides whether a failed transport exchange
/// should be attempted again, and when.
///
/// It does not _contain_ the work to be done; it lives alongside it.
/// After every failure, poll [`RetryTimer::what_should_i_do`] until it stops
/// returning `WouldBlock`.
///
/// ```
/// use embedded_time::clock::Clock;
/// use embedded_time::duration::Milliseconds;
/// use toad_gateway::retry;
///
/// let mut failures = 0;
/// let mut fails_twice = || -> Result<(), ()> {
///   if failures < 2 {
///     failures += 1;
///     Err(())
///   } else {
///     Ok(())
///   }
/// };
///
/// let clock = toad_gateway::time::Clock::new();
/// let now = || clock.try_now().unwrap();
/// let strategy = retry::Strategy::Delay { min: Milliseconds(1),
///                                         max: Milliseconds(2) };
/// let mut retry = retry::RetryTimer::new(now(), strategy, retry::Attempts(4));
///
/// while let Err(_) = fails_twice() {
///   match nb::block!(retry.what_should_i_do(now())) {
///     | Ok(retry::YouShould::Retry) => continue,
///     | Ok(retry::YouShould::Cry) => panic!("out of attempts"),
///     | Err(never) => match never {},
///   }
/// }
///
/// assert_eq!(retry.attempts(), retry::Attempts(3));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer<C: Clock<T = u64>> {
  failed_at: Option<Instant<C>>,
  init: Millis,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

impl core::ops::Sub for Attempts {
  type Output = Attempts;

  fn sub(self, rhs: Self) -> Self::Output {
    Attempts(self.0.saturating_sub(rhs.0))
  }
}

/// Result of [`RetryTimer::what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the last
  /// failure should be reported.
  Cry,
  /// Another attempt should be performed
  Retry,
}

impl<C: Clock<T = u64>> RetryTimer<C> {
  /// Create a new retrier.
  ///
  /// `max_attempts` counts the first attempt, so a retry limit of 3
  /// means `Attempts(4)`.
  pub fn new(start: Instant<C>, strategy: Strategy, max_attempts: Attempts) -> Self {
    let init = if strategy.has_jitter() {
      let seed = Millis::try_from(start.duration_since_epoch()).map(|Milliseconds(ms)| ms)
                                                               .unwrap_or_default();
      let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
      Milliseconds(rand.gen_range(strategy.range()))
    } else {
      Milliseconds(*strategy.range().start())
    };

    Self { failed_at: None,
           init,
           strategy,
           max_attempts,
           attempts: Attempts(1) }
  }

  /// The number of attempts made so far (including the one in progress)
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// When the thing we keep trying fails, invoke this to
  /// tell the retrytimer "it failed again! what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` while the strategy says we
  /// have not yet waited long enough since the failure.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if self.attempts >= self.max_attempts {
      return Ok(YouShould::Cry);
    }

    let failed_at = *self.failed_at.get_or_insert(now);

    if self.is_ready(time::elapsed(failed_at, now), self.attempts.0) {
      self.failed_at = None;
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    } else {
      Err(nb::Error::WouldBlock)
    }
  }

  /// Check if the strategy says an appropriate time has passed since
  /// attempt number `attempts` failed
  pub fn is_ready(&self, Milliseconds(time_passed): Millis, attempts: u16) -> bool {
    if attempts == 0 {
      return true;
    }

    match self.strategy {
      | Strategy::Delay { .. } => time_passed >= self.init.0,
      | Strategy::Exponential { .. } => {
        time_passed >= Strategy::delay_exp(self.init, attempts)
      },
    }
  }
}

/// Strategy to employ when backing off between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
  /// Pick a random delay between `init_min` and `init_max`
  /// to wait after the first failure.
  ///
  /// After each failed attempt, double the delay.
  Exponential {
    /// Minimum (inclusive) delay after the first failure
    init_min: Millis,
    /// Maximum (inclusive) delay after the first failure
    init_max: Millis,
  },
  /// Pick a random delay between `min` and `max`,
  /// and wait that long after every failure.
  ///
  /// `Delay { min: Milliseconds(0), max: Milliseconds(0) }`
  /// resends immediately.
  Delay {
    /// Minimum (inclusive) delay
    min: Millis,
    /// Maximum (inclusive) delay
    max: Millis,
  },
}

impl Strategy {
  /// Resend immediately after a failure
  pub const IMMEDIATE: Strategy = Strategy::Delay { min: Milliseconds(0),
                                                    max: Milliseconds(0) };

  /// Are min & max delays the same? if so, skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min..=max.max(min)),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => (min..=max.max(min)),
    }
  }

  /// Get the longest amount of time this strategy will spend
  /// waiting if every attempt fails
  pub fn max_time(&self, max_attempts: Attempts) -> Millis {
    let waits = (max_attempts - Attempts(1)).0;

    Milliseconds(match self {
                   | Self::Exponential { init_max, .. } => {
                     (1..=waits).map(|n| Self::delay_exp(*init_max, n))
                                .fold(0u64, u64::saturating_add)
                   },
                   | Self::Delay { max: Milliseconds(max),
                                   .. } => max.saturating_mul(waits as u64),
                 })
  }

  /// Given the initial delay and the number of the attempt that just failed,
  /// yields the delay to wait before the next one.
  const fn delay_exp(Milliseconds(init): Millis, attempt: u16) -> u64 {
    // | attempt | delay        |
    // | 1       | init         |
    // | 2       | init * 2     |
    // | 3       | init * 4     |
    // | n       | init * 2^n-1 |
    //
    // saturates at u64::MAX
    match 2u64.checked_pow(attempt.saturating_sub(1) as u32) {
      | Some(factor) => init.saturating_mul(factor),
      | None if init == 0 => 0,
      | None => u64::MAX,
    }
  }
}
