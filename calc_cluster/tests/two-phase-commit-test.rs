use calc_cluster::controller::{ChannelNotifier, Controller, ControllerConfig};
use calc_cluster::core::{
  Channel, ClusterSnapshot, ControllerDatagram, LineChannel, Socket, WireMessage,
};
use calc_cluster::node::{
  JoinOutcome, JoinRound, JoinState, Negotiator, NodeAgent, NodeConfig, PeerMessenger,
  ResourceLevels, ResourceState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, Notify};
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout, Instant};

fn rt() -> Runtime {
  tokio::runtime::Builder::new_multi_thread()
    .worker_threads(4)
    .enable_all()
    .build()
    .unwrap()
}

async fn eventually<F: Fn() -> bool>(cond: F) {
  let deadline = Instant::now() + Duration::from_secs(5);
  while !cond() {
    assert!(Instant::now() < deadline, "condition not reached in time");
    sleep(Duration::from_millis(20)).await;
  }
}

async fn wait_for_online(controller: &Controller, n: usize) {
  let deadline = Instant::now() + Duration::from_secs(5);
  loop {
    let records = controller.registry().records().await.unwrap();
    if records.iter().filter(|r| r.online).count() == n {
      return;
    }
    assert!(Instant::now() < deadline, "expected {} online nodes, have {:?}", n, records);
    sleep(Duration::from_millis(20)).await;
  }
}

async fn start_controller(rmax: u64) -> Controller {
  let mut config = ControllerConfig::default();
  config.socket = Socket::localhost(0, 0);
  config.rmax = rmax;
  Controller::start(config, Arc::new(ChannelNotifier::new())).await.unwrap()
}

fn node_config(controller: &Controller, rmin: u64) -> NodeConfig {
  let mut config = NodeConfig::default();
  config.controller = Socket::localhost(controller.udp_addr().port(), 0);
  config.rmin = rmin;
  config.alive_period = Duration::from_millis(100);
  config.hello_retry = Duration::from_millis(200);
  config.share_timeout = Some(Duration::from_secs(2));
  config
}

async fn join(controller: &Controller, rmin: u64, online_after: usize) -> NodeAgent {
  let agent = NodeAgent::start(node_config(controller, rmin)).await.unwrap();
  let state = timeout(Duration::from_secs(5), agent.wait_joined()).await.unwrap();
  if let JoinState::Joined(_) = state {
    wait_for_online(controller, online_after).await;
  }
  agent
}

/// Accepts connections and holds them open without ever answering.
async fn silent_peer() -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let mut held = Vec::new();
    while let Ok((stream, _)) = listener.accept().await {
      held.push(stream);
    }
  });
  addr
}

/// Forwards every line it receives. A `share` is answered `ok` only once `release` is notified.
async fn hesitant_peer(release: Arc<Notify>) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let (tx, rx) = mpsc::unbounded_channel();
  tokio::spawn(async move {
    while let Ok((stream, _)) = listener.accept().await {
      let tx = tx.clone();
      let release = release.clone();
      tokio::spawn(async move {
        let mut channel = LineChannel::new(stream);
        while let Ok(Some(line)) = channel.receive_line().await {
          let share = line.starts_with("share");
          let _ = tx.send(line);
          if share {
            release.notified().await;
            let _ = channel.send_line("ok").await;
          }
        }
      });
    }
  });
  (addr, rx)
}

/// Answers every datagram with the same `init`.
async fn fixed_controller(peers: Vec<SocketAddr>, rmax: u64) -> SocketAddr {
  let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
  let addr = udp.local_addr().unwrap();
  let init = ControllerDatagram::Init(peers, rmax).encode();
  tokio::spawn(async move {
    let mut buf = vec![0u8; 1024];
    while let Ok((_, src)) = udp.recv_from(&mut buf[..]).await {
      let _ = udp.send_to(init.as_bytes(), src).await;
    }
  });
  addr
}

fn negotiator(resources: Arc<ResourceState>, share_timeout: Option<Duration>) -> Negotiator {
  Negotiator::new(
    "127.0.0.1:1".parse().unwrap(),
    Duration::from_millis(100),
    resources.levels().rmin,
    PeerMessenger::new(share_timeout),
    resources,
  )
}

#[test]
fn unanimous_rounds_commit_everywhere() {
  rt().block_on(async {
    let controller = start_controller(300).await;
    let a = join(&controller, 0, 1).await;
    assert_eq!(a.join_state(), JoinState::Joined(300));

    let b = join(&controller, 0, 2).await;
    assert_eq!(b.join_state(), JoinState::Joined(150));
    eventually(|| a.resources() == 150).await;

    let c = join(&controller, 100, 3).await;
    assert_eq!(c.join_state(), JoinState::Joined(100));
    eventually(|| a.resources() == 100 && b.resources() == 100).await;
    for agent in [&a, &b, &c].iter() {
      let levels = agent.levels();
      assert_eq!(levels.committed, levels.proposed);
    }
  });
}

#[test]
fn one_refusal_rolls_back_every_participant() {
  rt().block_on(async {
    let controller = start_controller(300).await;
    let a = join(&controller, 0, 1).await;
    let b = join(&controller, 0, 2).await;
    let d = join(&controller, 100, 3).await;
    eventually(|| a.resources() == 100 && b.resources() == 100).await;

    // 300 / 4 = 75 is below d's rmin, so d answers nok while a and b accept.
    let e = join(&controller, 0, 3).await;
    assert_eq!(e.join_state(), JoinState::Rejected);
    assert_eq!(e.levels().committed, 0);
    eventually(|| a.levels().proposed == 100 && b.levels().proposed == 100).await;
    for agent in [&a, &b, &d].iter() {
      assert_eq!(
        agent.levels(),
        ResourceLevels {
          committed: 100,
          proposed: 100,
          rmin: agent.config().rmin,
        }
      );
    }

    sleep(Duration::from_millis(300)).await;
    let records = controller.registry().records().await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.endpoint().port() != e.tcp_addr().port()));
  });
}

#[test]
fn joiner_below_its_own_minimum_rolls_back() {
  rt().block_on(async {
    let controller = start_controller(300).await;
    let a = join(&controller, 0, 1).await;
    let b = join(&controller, 200, 1).await;
    assert_eq!(b.join_state(), JoinState::Rejected);
    eventually(|| a.levels().proposed == 300).await;
    assert_eq!(a.resources(), 300);
  });
}

#[test]
fn silent_peer_stalls_an_unbounded_round() {
  rt().block_on(async {
    let peer = silent_peer().await;
    let resources = Arc::new(ResourceState::new(0));
    let negotiator = negotiator(resources.clone(), None);
    let round = JoinRound::new(
      ClusterSnapshot {
        peers: vec![peer],
        rmax: 300,
      },
      0,
    );
    assert!(timeout(Duration::from_millis(500), negotiator.run_round(round)).await.is_err());
    assert_eq!(resources.committed(), 0);
  });
}

#[test]
fn silent_peer_times_out_into_a_rollback() {
  rt().block_on(async {
    let peer = silent_peer().await;
    let resources = Arc::new(ResourceState::new(0));
    let negotiator = negotiator(resources.clone(), Some(Duration::from_millis(200)));
    let round = JoinRound::new(
      ClusterSnapshot {
        peers: vec![peer],
        rmax: 300,
      },
      0,
    );
    let outcome = timeout(Duration::from_secs(5), negotiator.run_round(round)).await.unwrap();
    assert_eq!(outcome, JoinOutcome::RolledBack(0));
    assert_eq!(resources.levels().proposed, 0);
  });
}

#[test]
fn unreachable_peer_does_not_veto() {
  rt().block_on(async {
    let gone = {
      let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
      listener.local_addr().unwrap()
    };
    let resources = Arc::new(ResourceState::new(0));
    let negotiator = negotiator(resources.clone(), Some(Duration::from_secs(2)));
    let round = JoinRound::new(
      ClusterSnapshot {
        peers: vec![gone],
        rmax: 300,
      },
      0,
    );
    assert_eq!(negotiator.run_round(round).await, JoinOutcome::Committed(150));
    assert_eq!(resources.committed(), 150);
  });
}

#[test]
fn stop_during_a_round_still_settles_the_peers() {
  rt().block_on(async {
    let release = Arc::new(Notify::new());
    let (peer, mut seen) = hesitant_peer(release.clone()).await;
    let controller = fixed_controller(vec![peer], 200).await;
    let mut config = NodeConfig::default();
    config.socket = Socket::localhost(0, 0);
    config.controller = Socket::localhost(controller.port(), 0);
    config.hello_retry = Duration::from_millis(200);
    config.share_timeout = Some(Duration::from_secs(2));
    let agent = NodeAgent::start(config).await.unwrap();

    let first = timeout(Duration::from_secs(5), seen.recv()).await.unwrap().unwrap();
    assert_eq!(first, "share 100");
    agent.stop();
    release.notify_one();

    let second = timeout(Duration::from_secs(5), seen.recv()).await.unwrap().unwrap();
    assert_eq!(second, "commit 100");
    let state = timeout(Duration::from_secs(5), agent.wait_joined()).await.unwrap();
    assert_eq!(state, JoinState::Joined(100));
    assert_eq!(agent.levels().committed, 100);
  });
}
