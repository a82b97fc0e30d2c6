use std::io;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors surfaced by the components of a cluster. None of these are fatal to the whole process;
/// each component decides how far to propagate them.
#[derive(Debug, Error)]
pub enum ClusterError {
  /// Socket or stream failure: refused, reset, unreachable.
  #[error("transport error: {0}")]
  Io(#[from] io::Error),
  /// A configuration struct failed validation.
  #[error("invalid configuration: {0}")]
  Config(#[from] ValidationErrors),
  /// A peer answered with something that is not part of the protocol.
  #[error("protocol violation: {0}")]
  Protocol(String),
  /// The actor owning some piece of state has stopped.
  #[error("actor {0} is no longer running")]
  ActorGone(&'static str),
  /// A bounded wait expired.
  #[error("timed out after {0:?}")]
  Timeout(std::time::Duration),
  /// The byte channel failed its integrity checks or was closed mid-message.
  #[error("channel error: {0}")]
  Channel(String),
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, ClusterError>;
