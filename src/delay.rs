use std::time::{Duration, Instant};

/// Options controlling an exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct DelayOptions {
  pub base: Duration,
  pub max: Duration,
  pub multiplier: u32,
}

impl Default for DelayOptions {
  fn default() -> Self {
    Self {
      base: Duration::from_secs(60),
      max: Duration::from_secs(7200),
      multiplier: 2,
    }
  }
}

/// A time-aware exponential backoff primitive.
///
/// Holds the current backoff length and the instant it was armed. Mutated
/// only through `start`/`update`/`increase`/`reset`; never mutated from
/// outside the owning [`crate::Scrobbler`].
#[derive(Debug, Clone)]
pub struct Delay {
  seconds: Duration,
  start_time: Option<Instant>,
  options: DelayOptions,
}

impl Delay {
  pub fn new(options: DelayOptions) -> Self {
    Self {
      seconds: Duration::ZERO,
      start_time: None,
      options,
    }
  }

  /// Current backoff length, in whole seconds. Exposed for logging/tests.
  pub fn seconds(&self) -> Duration {
    self.seconds
  }

  /// Resets both the start time and the backoff length.
  pub fn reset(&mut self) {
    self.seconds = Duration::ZERO;
    self.start_time = None;
  }

  /// Re-arms the timer at the current instant without changing the
  /// backoff length.
  pub fn update(&mut self) {
    self.start_time = Some(Instant::now());
  }

  /// Grows the backoff length: doubles (up to the policy multiplier) the
  /// current length, or jumps to `base` if the delay was previously idle.
  pub fn increase(&mut self) {
    self.seconds = if self.seconds.is_zero() {
      self.options.base
    } else {
      self.seconds.saturating_mul(self.options.multiplier)
    };
    if self.seconds > self.options.max {
      self.seconds = self.options.max;
    }
  }

  /// `reset(); update(); increase()` in one call.
  pub fn start(&mut self) {
    self.reset();
    self.update();
    self.increase();
  }

  /// Time remaining until the currently-armed delay elapses, as a full
  /// `Duration`, never truncated to a sub-day component.
  pub fn remaining(&self) -> Duration {
    if self.seconds.is_zero() {
      return Duration::ZERO;
    }
    let Some(start) = self.start_time else {
      return Duration::ZERO;
    };
    let delay_end = start + self.seconds;
    let now = Instant::now();
    if delay_end <= now {
      Duration::ZERO
    } else {
      delay_end - now
    }
  }

  /// Whether a delay is currently in effect.
  pub fn is_active(&self) -> bool {
    self.remaining() > Duration::ZERO
  }

  /// Test-only: pushes `start_time` far enough into the past that
  /// `is_active()` becomes false, without touching `seconds` (unlike
  /// `reset()`, which would also zero the armed backoff length).
  #[cfg(test)]
  pub(crate) fn force_expire(&mut self) {
    let overshoot = self.seconds + Duration::from_secs(1);
    self.start_time = Some(
      Instant::now()
        .checked_sub(overshoot)
        .unwrap_or_else(Instant::now),
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn delay() -> Delay {
    Delay::new(DelayOptions::default())
  }

  #[test]
  fn starts_idle() {
    let d = delay();
    assert_eq!(d.seconds(), Duration::ZERO);
    assert!(!d.is_active());
  }

  #[test]
  fn increase_from_zero_jumps_to_base() {
    let mut d = delay();
    d.increase();
    assert_eq!(d.seconds(), Duration::from_secs(60));
  }

  #[test]
  fn increase_doubles_repeatedly() {
    let mut d = delay();
    d.increase();
    d.increase();
    d.increase();
    assert_eq!(d.seconds(), Duration::from_secs(240));
  }

  #[test]
  fn increase_saturates_at_max() {
    let mut d = delay();
    for _ in 0..20 {
      d.increase();
    }
    assert_eq!(d.seconds(), Duration::from_secs(7200));
  }

  #[test]
  fn reset_then_increase_yields_base_regardless_of_prior_state() {
    let mut d = delay();
    for _ in 0..5 {
      d.increase();
    }
    d.reset();
    d.increase();
    assert_eq!(d.seconds(), Duration::from_secs(60));
  }

  #[test]
  fn is_active_after_start() {
    let mut d = delay();
    d.start();
    assert!(d.is_active());
    assert!(d.remaining() <= Duration::from_secs(60));
    assert!(d.remaining() > Duration::from_secs(59));
  }

  #[test]
  fn reset_clears_activity() {
    let mut d = delay();
    d.start();
    assert!(d.is_active());
    d.reset();
    assert!(!d.is_active());
    assert_eq!(d.remaining(), Duration::ZERO);
  }

  #[test]
  fn update_without_increase_keeps_seconds_at_zero_and_inactive() {
    let mut d = delay();
    d.update();
    assert_eq!(d.seconds(), Duration::ZERO);
    assert!(!d.is_active());
  }
}
