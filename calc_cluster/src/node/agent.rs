use crate::core::{stop_pair, Result, StopSignal, Stopper};
use crate::node::{
  heartbeat_sender, node_listener, ComputeHistory, ComputeRecord, Heartbeat, JoinOutcome,
  Negotiator, NodeConfig, PeerMessenger, ResourceLevels, ResourceState, LOG_LEVEL,
};
use crate::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use validator::Validate;

/// Where a node agent is in joining the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinState {
  Pending,
  Joined(u64),
  /// The round was rolled back or could not be run; the agent does not heartbeat.
  Rejected,
}

/// A compute node: its stream listener, its join attempt and, once joined, its heartbeat.
/// Dropping it stops everything it started, like [`NodeAgent::stop`].
pub struct NodeAgent {
  config: NodeConfig,
  resources: Arc<ResourceState>,
  history: Arc<ComputeHistory>,
  tcp_addr: SocketAddr,
  join_state: watch::Receiver<JoinState>,
  stopper: Stopper,
}
impl NodeAgent {
  /// Binds the stream listener and the datagram socket, then joins in the background: one
  /// negotiation and, if it commits, the heartbeat.
  pub async fn start(config: NodeConfig) -> Result<NodeAgent> {
    config.validate()?;
    let listener = TcpListener::bind(config.socket.tcp_addr().await?).await?;
    let udp = Arc::new(UdpSocket::bind(config.socket.udp_addr().await?).await?);
    let controller = config.controller.udp_addr().await?;
    let tcp_addr = listener.local_addr()?;

    let resources = Arc::new(ResourceState::new(config.rmin));
    let history = Arc::new(ComputeHistory::new(config.history_capacity));
    let (stopper, signal) = stop_pair();
    let (state_tx, state_rx) = watch::channel(JoinState::Pending);

    tokio::spawn(node_listener(listener, resources.clone(), history.clone(), signal.clone()));

    let negotiator = Negotiator::new(
      controller,
      config.hello_retry,
      config.rmin,
      PeerMessenger::new(config.share_timeout),
      resources.clone(),
    )
    .with_failures(config.failure_mode, config.fail_map.clone());
    let heartbeat = Heartbeat {
      controller: controller,
      tcp: tcp_addr.port(),
      operators: config.operators.clone(),
      period: config.alive_period,
      failure_mode: config.failure_mode,
      fail_map: config.fail_map.clone(),
    };
    tokio::spawn(join(negotiator, udp, heartbeat, state_tx, signal));
    info!(LOG_LEVEL, "node listening on {}", tcp_addr);

    Ok(NodeAgent {
      config: config,
      resources: resources,
      history: history,
      tcp_addr: tcp_addr,
      join_state: state_rx,
      stopper: stopper,
    })
  }

  pub fn config(&self) -> &NodeConfig {
    &self.config
  }

  /// Where peers and the controller connect.
  pub fn tcp_addr(&self) -> SocketAddr {
    self.tcp_addr
  }

  /// The committed resource share.
  pub fn resources(&self) -> u64 {
    self.resources.committed()
  }

  pub fn levels(&self) -> ResourceLevels {
    self.resources.levels()
  }

  /// The latest `n` evaluated sub-operations, oldest first.
  pub fn history(&self, n: usize) -> Vec<ComputeRecord> {
    self.history.latest(n)
  }

  pub fn join_state(&self) -> JoinState {
    *self.join_state.borrow()
  }

  pub fn joined(&self) -> bool {
    matches!(self.join_state(), JoinState::Joined(_))
  }

  /// Waits until the join attempt has concluded. Returns [`JoinState::Pending`] only if the
  /// agent was stopped first.
  pub async fn wait_joined(&self) -> JoinState {
    let mut rx = self.join_state.clone();
    loop {
      let state = *rx.borrow();
      if state != JoinState::Pending {
        return state;
      }
      if rx.changed().await.is_err() {
        return *rx.borrow();
      }
    }
  }

  pub fn stop(&self) {
    info!(LOG_LEVEL, "node {} stopping", self.tcp_addr);
    self.stopper.stop();
  }
}
impl Drop for NodeAgent {
  fn drop(&mut self) {
    self.stopper.stop();
  }
}

async fn join(
  negotiator: Negotiator,
  udp: Arc<UdpSocket>,
  heartbeat: Heartbeat,
  state: watch::Sender<JoinState>,
  mut stop: StopSignal,
) {
  let snapshot = tokio::select! {
    _ = stop.stopped() => return,
    snapshot = negotiator.request_snapshot(&udp) => snapshot,
  };
  // Once a share is out, peers hold a staged value until they hear commit or rollback, so the
  // round is not cancelled by a stop.
  let outcome = match snapshot {
    Ok(snapshot) => Ok(negotiator.run_round(negotiator.open_round(snapshot)).await),
    Err(e) => Err(e),
  };
  match outcome {
    Ok(JoinOutcome::Committed(share)) => {
      let _ = state.send(JoinState::Joined(share));
      if !stop.is_stopped() {
        heartbeat_sender(udp, heartbeat, stop).await;
      }
    }
    Ok(JoinOutcome::RolledBack(_)) => {
      let _ = state.send(JoinState::Rejected);
    }
    Err(e) => {
      error!(LOG_LEVEL, "join failed: {}", e);
      let _ = state.send(JoinState::Rejected);
    }
  }
}
