//! Building blocks shared by the controller and the nodes.
//!
//! # Actors
//! State that many tasks read and write (the node registry, user accounts) is owned by an
//! [`Actor`] running on its own tokio task. Other tasks hold a [`LocalRef`] and talk to it with
//! messages, so nobody keeps a reference into shared structures across an `.await`. Requests that
//! need an answer carry a `oneshot` sender, see [`LocalRef::ask`].
//!
//! # Cancellation
//! Every long-running loop owns a [`StopSignal`] and selects on it next to its blocking socket
//! call. When the loop returns, its socket is dropped and closed.
//!
//! # Wire format
//! All protocol messages are single lines of UTF-8 text: a keyword followed by whitespace
//! separated fields. Types implementing [`WireMessage`] are usually derived:
//!
//! ```ignore
//! #[derive(WireMessage)]
//! pub enum ShareReply {
//!   #[wire("ok")]
//!   Accept,
//!   #[wire("nok")]
//!   Reject,
//! }
//! ```
//!
//! Decoding is strict about the token count and accepts a leading `!` on the keyword. Lines that
//! do not decode are dropped by the datagram listeners.

use crate::testkit::LogLevel;

mod actor;
mod channel;
mod error;
mod operator;
mod remoting;
mod shutdown;
mod wire;

pub const LOG_LEVEL: LogLevel = LogLevel::Error;

#[rustfmt::skip]
pub use {
  actor::spawn,
  actor::Actor,
  actor::ActorContext,
  actor::ActorSignal,
  actor::LocalActorMsg,
  actor::LocalRef,
  channel::Channel,
  channel::LineChannel,
  channel::MeteredChannel,
  error::ClusterError,
  error::Result,
  operator::ComputeReply,
  operator::Operator,
  operator::OperatorSet,
  operator::DIVISION_BY_ZERO,
  remoting::Host,
  remoting::Socket,
  shutdown::stop_pair,
  shutdown::StopSignal,
  shutdown::Stopper,
  wire::ClusterSnapshot,
  wire::ControllerDatagram,
  wire::NodeRequest,
  wire::ShareReply,
  wire::Tokens,
  wire::WireField,
  wire::WireMessage,
};

/// Milliseconds since the UNIX epoch, the clock used for liveness and history timestamps.
pub fn now_millis() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}
