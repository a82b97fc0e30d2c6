//! Logging and failure injection.
//!
//! Every module that logs declares its own `LOG_LEVEL` constant and passes it as the first
//! argument of the crate's logging macros. A message is emitted only when its level is at or
//! above the module's level. The remaining arguments are handed to [`tracing`] unchanged.
//!
//! ```ignore
//! const LEVEL: LogLevel = LogLevel::Debug;
//! // Not logged, Trace is below Debug
//! trace!(LEVEL, "kelp");
//! // Logged, Warn is above Debug
//! warn!(LEVEL, "sharks {}", 3);
//! ```
//!
//! Datagrams sent by the node agent go through [`udp_select`](crate::udp_select), which drops or
//! delays them according to a [`FailureConfigMap`] when the [`FailureMode`] is `Packet`.

mod failure_config;
mod logging;
mod unreliable_remoting;

#[rustfmt::skip]
pub use {
  failure_config::FailureConfig,
  failure_config::FailureConfigMap,
  failure_config::FailureMode,
  logging::init_logging,
  logging::LogLevel,
  unreliable_remoting::udp_send_unreliable,
};
