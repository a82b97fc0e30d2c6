use crate::controller::{
  client_listener, collect_logs, liveness_checker, membership_listener, Accounts, CallbackHandle,
  ControllerConfig, Dispatcher, NodeLink, NodeLog, NodeRegistry, Notifier, SessionServices,
  Statistics, SubscribeError, TcpNodeLink, LOG_LEVEL,
};
use crate::core::{stop_pair, Result, Stopper};
use crate::info;
use itertools::Itertools;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use validator::Validate;

/// A running controller. Dropping it stops every task it started, like [`Controller::stop`].
pub struct Controller {
  config: ControllerConfig,
  registry: NodeRegistry,
  accounts: Accounts,
  statistics: Arc<Statistics>,
  stopper: Stopper,
  udp_addr: SocketAddr,
  tcp_addr: SocketAddr,
}
impl Controller {
  /// Binds the membership and client sockets and starts the registry, the accounts, the
  /// membership listener, the liveness checker and the client listener on the current runtime.
  pub async fn start(config: ControllerConfig, notifier: Arc<dyn Notifier>) -> Result<Controller> {
    Controller::start_with_link(config, notifier, Arc::new(TcpNodeLink)).await
  }

  /// Like [`Controller::start`], with a custom transport for sub-operations.
  pub async fn start_with_link(
    config: ControllerConfig,
    notifier: Arc<dyn Notifier>,
    link: Arc<dyn NodeLink>,
  ) -> Result<Controller> {
    config.validate()?;
    let udp = UdpSocket::bind(config.socket.udp_addr().await?).await?;
    let tcp = TcpListener::bind(config.socket.tcp_addr().await?).await?;
    let udp_addr = udp.local_addr()?;
    let tcp_addr = tcp.local_addr()?;

    let registry = NodeRegistry::new();
    let accounts = Accounts::new(&config.users, notifier);
    let statistics = Arc::new(Statistics::new());
    let services = SessionServices {
      registry: registry.clone(),
      accounts: accounts.clone(),
      dispatcher: Arc::new(Dispatcher::new(registry.clone(), accounts.clone(), link)),
      statistics: statistics.clone(),
    };
    let (stopper, signal) = stop_pair();
    tokio::spawn(membership_listener(udp, registry.clone(), config.rmax, signal.clone()));
    tokio::spawn(liveness_checker(
      registry.clone(),
      config.check_period,
      config.node_timeout,
      signal.clone(),
    ));
    tokio::spawn(client_listener(tcp, services, config.max_sessions, signal));
    info!(LOG_LEVEL, "controller up, udp {} tcp {}", udp_addr, tcp_addr);

    Ok(Controller {
      config: config,
      registry: registry,
      accounts: accounts,
      statistics: statistics,
      stopper: stopper,
      udp_addr: udp_addr,
      tcp_addr: tcp_addr,
    })
  }

  pub fn config(&self) -> &ControllerConfig {
    &self.config
  }

  /// Where nodes send `hello` and `alive`.
  pub fn udp_addr(&self) -> SocketAddr {
    self.udp_addr
  }

  /// Where clients connect.
  pub fn tcp_addr(&self) -> SocketAddr {
    self.tcp_addr
  }

  pub fn registry(&self) -> &NodeRegistry {
    &self.registry
  }

  pub fn accounts(&self) -> &Accounts {
    &self.accounts
  }

  pub fn statistics(&self) -> Arc<Statistics> {
    self.statistics.clone()
  }

  /// Every known node, numbered from 1, one per line.
  pub async fn nodes(&self) -> Result<String> {
    let records = self.registry.records().await?;
    if records.is_empty() {
      return Ok("No nodes found".to_string());
    }
    Ok(records.iter().enumerate().map(|(i, r)| format!("{}. {}", i + 1, r)).join("\n"))
  }

  /// Every user, numbered from 1, one per line.
  pub async fn users(&self) -> Result<String> {
    let users = self.accounts.users().await?;
    if users.is_empty() {
      return Ok("No users found".to_string());
    }
    Ok(users.iter().enumerate().map(|(i, u)| format!("{}. {}", i + 1, u)).join("\n"))
  }

  /// The compute history of every online node, oldest first. Nodes that cannot be reached are
  /// left out.
  pub async fn logs(&self) -> Result<Vec<NodeLog>> {
    let records = self.registry.records().await?;
    let online = records.iter().filter(|r| r.online).map(|r| r.endpoint()).collect();
    Ok(collect_logs(online).await)
  }

  /// Registers a one-shot notification for when `user`'s balance falls below `threshold`.
  pub async fn subscribe(
    &self,
    user: &str,
    threshold: i64,
    handle: CallbackHandle,
  ) -> Result<std::result::Result<(), SubscribeError>> {
    self.accounts.subscribe(user, threshold, handle).await
  }

  /// Stops accepting new work. Sessions end after the request they are handling; one still
  /// waiting on the registry or the accounts gets an error instead of an answer.
  pub fn stop(&self) {
    info!(LOG_LEVEL, "controller stopping");
    self.stopper.stop();
    self.registry.stop();
    self.accounts.stop();
  }
}
impl Drop for Controller {
  fn drop(&mut self) {
    self.stopper.stop();
    self.registry.stop();
    self.accounts.stop();
  }
}
