//! The controller: the node registry and user accounts, the membership listener answering
//! `hello` and folding `alive` datagrams into the registry, the liveness checker, and client
//! sessions whose `!compute` requests are split into sub-operations by the [`Dispatcher`].
//!
//! [`Controller::start`] binds both sockets and spawns every task on the current runtime.

use crate::testkit::LogLevel;

mod accounts;
mod config;
#[allow(clippy::module_inception)]
mod controller;
mod dispatcher;
mod liveness;
mod logs;
mod membership;
mod notify;
mod registry;
mod server;
mod session;
mod statistics;

pub const LOG_LEVEL: LogLevel = LogLevel::Info;

#[rustfmt::skip]
pub(in crate::controller) use {
  liveness::liveness_checker,
  membership::membership_listener,
  server::client_listener,
};

#[rustfmt::skip]
pub use {
  accounts::Accounts,
  accounts::LoginOutcome,
  accounts::SubscribeError,
  accounts::Subscription,
  accounts::UserView,
  config::ControllerConfig,
  config::UserConfig,
  controller::Controller,
  dispatcher::Dispatcher,
  dispatcher::Evaluation,
  dispatcher::Expression,
  dispatcher::NodeLink,
  dispatcher::TcpNodeLink,
  dispatcher::COST_PER_OPERATION,
  dispatcher::NOT_ENOUGH_CREDITS,
  dispatcher::NO_NODES,
  logs::collect_logs,
  logs::fetch_logs,
  logs::NodeLog,
  notify::CallbackHandle,
  notify::ChannelNotifier,
  notify::Notification,
  notify::Notifier,
  registry::NodeRecord,
  registry::NodeRegistry,
  session::ClientSession,
  session::SessionServices,
  session::MISSING_PARAMETERS,
  session::NOT_LOGGED_IN,
  session::NO_PARAMETERS_ALLOWED,
  session::TOO_MANY_PARAMETERS,
  statistics::Statistics,
};

pub(crate) use config::positive_duration;
