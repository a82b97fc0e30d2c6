#![warn(missing_docs)]

//! `calc_cluster` coordinates a dynamic pool of arithmetic compute nodes behind a central
//! controller. Nodes join through a two-phase share negotiation with their peers, announce
//! liveness over UDP, and receive single-operator sub-operations from the controller, which
//! picks the least-used capable node for each one and bills the requesting client.
//!
//! - [`core`]: the actor runtime, cancellation, the line-oriented wire codec, operators and the
//!   byte-message [`Channel`](crate::core::Channel).
//! - [`controller`]: the node registry, user accounts, membership listener, liveness checker,
//!   task dispatcher and client sessions.
//! - [`node`]: the node agent, its negotiator, peer messenger, heartbeat sender and TCP listener.
//! - [`testkit`]: level-gated logging and failure injection for datagrams.

pub mod controller;
pub mod core;
pub mod node;
pub mod testkit;

#[doc(hidden)]
pub use tracing as __tracing;

pub use calc_cluster_macros::WireMessage;
