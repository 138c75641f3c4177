use std::collections::VecDeque;
use std::sync::Arc;

use log::{error, info, warn};

use crate::delay::{Delay, DelayOptions};
use crate::error::{Error, Result};
use crate::listen::Listen;
use crate::network::Network;
use crate::transport::{ReqwestTransport, Transport};

/// Hard-fail count at which the engine falls back to the handshake phase.
const HARD_FAIL_THRESHOLD: u32 = 3;
/// Listens submitted per scrobble batch.
const BATCH_SIZE: usize = 50;

/// Engine state label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  /// No session; a handshake attempt is needed (and permitted once the
  /// backoff delay clears).
  NoSession,
  /// Session established; ready to send nowplaying or scrobble.
  Idle,
  /// A fatal handshake error occurred. The engine refuses further work
  /// until reconstructed.
  Poisoned,
}

/// What, if anything, a single `tick()` call did. An additive
/// observability surface: the protocol itself doesn't require a return
/// value here, but it lets hosts (and tests) avoid re-deriving behavior
/// from getters after every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
  /// Nothing was eligible to run this tick (idle, no nowplaying, empty queue).
  Idle,
  /// A handshake backoff delay is still in effect.
  Waiting,
  HandshakeSucceeded,
  NowPlayingSucceeded,
  ScrobbleSucceeded { submitted: usize },
  /// A `HardFailure`/`RequestsError` was recorded; engine may or may not
  /// have fallen back to `NoSession` depending on the hard-fail count.
  RecoverableFailure,
  /// A submission's session was rejected; engine fell back to `NoSession`.
  SessionInvalidated,
}

/// The tick-driven Audioscrobbler 1.2 client engine.
///
/// Coordinates a [`Delay`], a [`Network`], an ordered queue of pending
/// [`Listen`]s and an optional "now playing" slot. The host feeds listens
/// via [`Scrobbler::add_listens`]/[`Scrobbler::send_nowplaying`] and
/// drives the engine by calling [`Scrobbler::tick`] on its own cadence;
/// at most one HTTP exchange happens per call.
pub struct Scrobbler {
  network: Network,
  delay: Delay,
  state: State,
  queue: VecDeque<Listen>,
  np: Option<Listen>,
  hard_fails: u32,
}

impl Scrobbler {
  /// Creates a new engine using the default `reqwest`-backed transport.
  ///
  /// ```no_run
  /// use legacy_scrobbler::Scrobbler;
  ///
  /// # async fn example() {
  /// let mut scrobbler = Scrobbler::new(
  ///   "my-network",
  ///   "myuser",
  ///   "3858f62230ac3c915f300c664312c63f",
  ///   "https://post.example.com/",
  /// );
  /// scrobbler.tick().await.ok();
  /// # }
  /// ```
  pub fn new(
    name: impl Into<String>,
    username: impl Into<String>,
    password_md5_hex: impl Into<String>,
    handshake_url: impl Into<String>,
  ) -> Self {
    Self::with_transport(
      name,
      username,
      password_md5_hex,
      handshake_url,
      Arc::new(ReqwestTransport::new()),
    )
  }

  /// Creates a new engine with an injected [`Transport`], e.g. a fake for
  /// tests or an alternative HTTP stack.
  pub fn with_transport(
    name: impl Into<String>,
    username: impl Into<String>,
    password_md5_hex: impl Into<String>,
    handshake_url: impl Into<String>,
    transport: Arc<dyn Transport>,
  ) -> Self {
    let _name = name.into();
    Self {
      network: Network::new(username, password_md5_hex, handshake_url, transport),
      delay: Delay::new(DelayOptions::default()),
      state: State::NoSession,
      queue: VecDeque::new(),
      np: None,
      hard_fails: 0,
    }
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn hard_fails(&self) -> u32 {
    self.hard_fails
  }

  pub fn queue_len(&self) -> usize {
    self.queue.len()
  }

  pub fn delay(&self) -> &Delay {
    &self.delay
  }

  /// Sets the given listen as "now playing". Sent on the next tick in
  /// which the engine is `Idle`.
  pub fn send_nowplaying(&mut self, listen: Listen) {
    self.np = Some(listen);
  }

  /// Queues listens for scrobbling. The queue is kept sorted ascending by
  /// listen date after every call, so scrobble batches always submit the
  /// oldest pending plays first.
  pub fn add_listens(&mut self, listens: impl IntoIterator<Item = Listen>) {
    self.queue.extend(listens);
    self
      .queue
      .make_contiguous()
      .sort_by_key(|listen| listen.date());
  }

  /// Performs at most one protocol action: a handshake attempt if there's
  /// no session and no backoff in effect, otherwise a nowplaying send (if
  /// pending) or a scrobble batch (if the queue is non-empty).
  pub async fn tick(&mut self) -> Result<TickOutcome> {
    match self.state {
      State::Poisoned => Err(Error::EnginePoisoned),
      State::NoSession => self.tick_no_session().await,
      State::Idle => self.tick_idle().await,
    }
  }

  async fn tick_no_session(&mut self) -> Result<TickOutcome> {
    if self.delay.is_active() {
      return Ok(TickOutcome::Waiting);
    }

    info!("executing handshake attempt");
    let result = self.network.handshake().await;
    // finally-callback: must run after both success and failure, and
    // before the next tick evaluates delay.is_active().
    let outcome = self.handle_handshake_result(result);
    self.delay.update();
    outcome
  }

  fn handle_handshake_result(&mut self, result: Result<()>) -> Result<TickOutcome> {
    match result {
      Ok(()) => {
        self.hard_fails = 0;
        self.delay.reset();
        self.state = State::Idle;
        info!("handshake successful");
        Ok(TickOutcome::HandshakeSucceeded)
      }
      Err(err) if err.is_handshake_fatal() => {
        error!("fatal error during handshake attempt: {err}");
        self.state = State::Poisoned;
        Err(err)
      }
      Err(err) => {
        self.record_failure(&err, "handshake");
        Ok(TickOutcome::RecoverableFailure)
      }
    }
  }

  async fn tick_idle(&mut self) -> Result<TickOutcome> {
    if let Some(listen) = self.np.clone() {
      info!("executing nowplaying attempt");
      let result = self.network.nowplaying(&listen).await;
      return self.handle_submission_result(result, "nowplaying", |this| {
        this.np = None;
        TickOutcome::NowPlayingSucceeded
      });
    }

    if !self.queue.is_empty() {
      let batch: Vec<Listen> = self.queue.iter().take(BATCH_SIZE).cloned().collect();
      let submitted = batch.len();
      info!("executing scrobbling attempt of {submitted} listens");
      let result = self.network.scrobble(&batch).await;
      return self.handle_submission_result(result, "scrobble", move |this| {
        this.queue.drain(..submitted.min(this.queue.len()));
        info!(
          "scrobbling successful, length of remaining queue is now {}",
          this.queue.len()
        );
        TickOutcome::ScrobbleSucceeded { submitted }
      });
    }

    Ok(TickOutcome::Idle)
  }

  fn handle_submission_result(
    &mut self,
    result: Result<()>,
    request_type: &str,
    on_success: impl FnOnce(&mut Self) -> TickOutcome,
  ) -> Result<TickOutcome> {
    match result {
      Ok(()) => Ok(on_success(self)),
      Err(Error::BadSession(detail)) => {
        warn!(
          "{detail}, falling back to handshake phase after {request_type} attempt"
        );
        self.state = State::NoSession;
        self.network.clear_session();
        Ok(TickOutcome::SessionInvalidated)
      }
      Err(Error::SubmissionWithoutListens) => {
        error!("{request_type} was attempted without any listens, this is a caller bug");
        Err(Error::SubmissionWithoutListens)
      }
      Err(err) => {
        self.record_failure(&err, request_type);
        Ok(TickOutcome::RecoverableFailure)
      }
    }
  }

  fn record_failure(&mut self, err: &Error, request_type: &str) {
    warn!("hard failure during {request_type} attempt: {err}");
    self.hard_fails += 1;
    self.delay.increase();
    info!("number of hard failures is now {}", self.hard_fails);
    info!("delay is now {:?}", self.delay.seconds());

    if self.state != State::NoSession && self.hard_fails >= HARD_FAIL_THRESHOLD {
      self.state = State::NoSession;
      info!("falling back to handshake phase");
    }
  }
}
