use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_time::duration::Milliseconds;
use embedded_time::rate::Fraction;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Convert a [`Millis`] into a [`std::time::Duration`]
pub fn to_duration(Milliseconds(ms): Millis) -> std::time::Duration {
  std::time::Duration::from_millis(ms)
}

/// How much time has passed between `since` and `now`.
///
/// Clocks that run backwards (or instants from the future) yield zero.
pub fn elapsed<C: embedded_time::Clock<T = u64>>(since: Instant<C>, now: Instant<C>) -> Millis {
  now.checked_duration_since(&since)
     .and_then(|dur| Millis::try_from(dur).ok())
     .unwrap_or(Milliseconds(0))
}

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    let elapsed = std::time::Instant::now().duration_since(self.0);
    Ok(Instant::new(elapsed.as_micros() as u64))
  }
}

/// A cancellation flag shared between whoever waits on a request
/// and the thread doing the request.
///
/// Cloning yields a handle to the same flag.
///
/// ```
/// use toad_gateway::time::Cancel;
///
/// let cancel = Cancel::new();
/// let worker = cancel.clone();
///
/// assert!(!worker.is_cancelled());
/// cancel.cancel();
/// assert!(worker.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
  /// Create a flag that has not fired yet
  pub fn new() -> Self {
    Self::default()
  }

  /// Fire the flag. Every clone observes it.
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  /// Has [`Cancel::cancel`] been invoked on any clone?
  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn elapsed_saturates_at_zero() {
    let later = Instant::<Clock>::new(5_000);
    let earlier = Instant::<Clock>::new(1_000);

    assert_eq!(elapsed(earlier, later), Milliseconds(4u64));
    assert_eq!(elapsed(later, earlier), Milliseconds(0u64));
  }

  #[test]
  fn std_clock_moves_forward() {
    use embedded_time::Clock as _;

    let clock = Clock::new();
    let a = clock.try_now().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = clock.try_now().unwrap();

    assert!(elapsed(a, b) >= Milliseconds(1u64));
  }

  #[test]
  fn cancel_is_shared() {
    let a = Cancel::new();
    let b = a.clone();
    b.cancel();
    assert!(a.is_cancelled());
    assert!(!Cancel::new().is_cancelled());
  }
}
