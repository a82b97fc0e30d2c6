//! The node agent: a stream listener answering `share`, `commit`, `rollback` and `compute`, a
//! negotiator that joins the cluster through a two-phase commit with the online peers, and a
//! heartbeat sender that runs only after a successful join.
//!
//! ```ignore
//! let mut config = NodeConfig::default();
//! config.controller = Socket::localhost(14000, 0);
//! config.rmin = 100;
//! let agent = NodeAgent::start(config).await?;
//! if let JoinState::Joined(share) = agent.wait_joined().await {
//!   println!("joined with {}", share);
//! }
//! ```

use crate::testkit::LogLevel;

mod agent;
mod config;
mod heartbeat;
mod history;
mod listener;
mod messenger;
mod negotiator;
mod resources;

pub const LOG_LEVEL: LogLevel = LogLevel::Info;

#[rustfmt::skip]
pub(in crate::node) use {
  heartbeat::heartbeat_sender,
  listener::node_listener,
};

#[rustfmt::skip]
pub use {
  agent::JoinState,
  agent::NodeAgent,
  config::NodeConfig,
  heartbeat::Heartbeat,
  history::ComputeHistory,
  history::ComputeRecord,
  messenger::PeerMessenger,
  negotiator::JoinOutcome,
  negotiator::JoinRound,
  negotiator::Negotiator,
  resources::ResourceLevels,
  resources::ResourceState,
};
