//! Audioscrobbler 1.2 (legacy scrobbling) client engine.
//!
//! A host process (media player, log importer, daemon) constructs a
//! [`Scrobbler`], feeds it [`Listen`]s via [`Scrobbler::add_listens`] and
//! [`Scrobbler::send_nowplaying`], and drives it by calling
//! [`Scrobbler::tick`] on its own cadence. The engine performs at most one
//! HTTP exchange per tick: handshaking, sending a nowplaying notification,
//! or submitting a batch of queued scrobbles, with bounded exponential
//! backoff between handshake attempts.
mod delay;
mod error;
mod listen;
mod network;
mod scrobbler;
mod transport;

pub use delay::{Delay, DelayOptions};
pub use error::{Error, Result};
pub use listen::Listen;
pub use scrobbler::{Scrobbler, State, TickOutcome};
pub use transport::{ReqwestTransport, Transport, TransportError};
