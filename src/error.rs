use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Closed error taxonomy for the Audioscrobbler 1.2 engine.
///
/// Every variant is partitioned by recovery policy: some are recoverable
/// by the [`crate::Scrobbler`] state machine itself, others are fatal and
/// must be surfaced to the host.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
  /// A `Listen` was constructed from a naive (non-timezone-aware) instant.
  ///
  /// Unreachable through the public `Listen` constructor, which only
  /// accepts `chrono::DateTime<Tz>` values (always timezone-aware at the
  /// type level). Retained so the taxonomy documents the protocol's own
  /// rule even though this crate's type system makes it unconstructable.
  #[error("Listen constructor received a date without timezone info")]
  DateWithoutTimezone,

  /// Non-2xx HTTP status or a server response body outside the protocol
  /// (`OK`/`BANNED`/`BADAUTH`/`BADTIME`/`BADSESSION`).
  #[error("hard failure from scrobbler service: {0}")]
  HardFailure(String),

  /// The injected `Transport` failed to complete the exchange (connection
  /// error, timeout, TLS failure, ...).
  #[error("transport error: {0}")]
  RequestsError(String),

  /// Raised by `nowplaying`/`scrobble` when no session exists, or when the
  /// server responds `BADSESSION`.
  #[error("bad session: {0}")]
  BadSession(String),

  /// The scrobbler client is banned from this network. Fatal.
  #[error("the scrobbler client is banned from this network")]
  ClientBanned,

  /// Authentication failed; the password hash is wrong for the given user. Fatal.
  #[error("authentication failed, check credentials and try again")]
  BadAuth,

  /// The timestamp sent in the handshake is too far off from the server's
  /// clock. Fatal.
  #[error("reported timestamp is off, check your system clock")]
  BadTime,

  /// `scrobble()` was called without any `Listen`s. Indicates a bug in the
  /// calling code, not a protocol or network failure.
  #[error("scrobble() was called without any listens to submit")]
  SubmissionWithoutListens,

  /// `tick()` was called again after the engine already entered the
  /// terminal `Poisoned` state following a fatal handshake error.
  #[error("engine is poisoned after a fatal handshake error, reconstruct it")]
  EnginePoisoned,
}

impl Error {
  /// True for the `ClientBanned`/`BadAuth`/`BadTime` handshake family:
  /// fatal conditions that poison the engine rather than being retried.
  pub fn is_handshake_fatal(&self) -> bool {
    matches!(self, Error::ClientBanned | Error::BadAuth | Error::BadTime)
  }

  /// True for the two variants that the scrobbler's failure handler
  /// treats identically: increment `hard_fails`, increase the backoff.
  pub fn is_recoverable_hard_failure(&self) -> bool {
    matches!(self, Error::HardFailure(_) | Error::RequestsError(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn handshake_fatal_family() {
    assert!(Error::ClientBanned.is_handshake_fatal());
    assert!(Error::BadAuth.is_handshake_fatal());
    assert!(Error::BadTime.is_handshake_fatal());
    assert!(!Error::HardFailure("x".into()).is_handshake_fatal());
    assert!(!Error::BadSession("x".into()).is_handshake_fatal());
  }

  #[test]
  fn recoverable_hard_failure_family() {
    assert!(Error::HardFailure("x".into()).is_recoverable_hard_failure());
    assert!(Error::RequestsError("x".into()).is_recoverable_hard_failure());
    assert!(!Error::BadSession("x".into()).is_recoverable_hard_failure());
    assert!(!Error::ClientBanned.is_recoverable_hard_failure());
  }
}
