use crate::core::{ClusterError, ClusterSnapshot, ControllerDatagram, Result, ShareReply, WireMessage};
use crate::node::{PeerMessenger, ResourceState, LOG_LEVEL};
use crate::testkit::{FailureConfigMap, FailureMode};
use crate::{debug, info, trace, udp_select, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

/// How a join attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
  /// Every peer accepted; the node now holds this share.
  Committed(u64),
  /// Someone refused; every participant kept its previous share, which for the joiner is this.
  RolledBack(u64),
}

/// One join attempt. `agreed` starts out true and is only ever cleared, possibly by several
/// reply tasks at once.
pub struct JoinRound {
  pub peers: Vec<SocketAddr>,
  pub proposed: u64,
  agreed: Arc<AtomicBool>,
}
impl JoinRound {
  pub fn new(snapshot: ClusterSnapshot, rmin: u64) -> JoinRound {
    let proposed = snapshot.proposed_share();
    JoinRound {
      peers: snapshot.peers,
      proposed: proposed,
      agreed: Arc::new(AtomicBool::new(proposed >= rmin)),
    }
  }

  pub fn agreed(&self) -> bool {
    self.agreed.load(Ordering::SeqCst)
  }
}

/// Drives the join handshake with the controller and the two-phase commit with the peers.
pub struct Negotiator {
  controller: SocketAddr,
  hello_retry: Duration,
  rmin: u64,
  messenger: PeerMessenger,
  resources: Arc<ResourceState>,
  failure_mode: FailureMode,
  fail_map: FailureConfigMap,
}
impl Negotiator {
  pub fn new(
    controller: SocketAddr,
    hello_retry: Duration,
    rmin: u64,
    messenger: PeerMessenger,
    resources: Arc<ResourceState>,
  ) -> Negotiator {
    Negotiator {
      controller: controller,
      hello_retry: hello_retry,
      rmin: rmin,
      messenger: messenger,
      resources: resources,
      failure_mode: FailureMode::None,
      fail_map: FailureConfigMap::default(),
    }
  }

  /// Routes `hello` through failure injection.
  pub fn with_failures(mut self, mode: FailureMode, fail_map: FailureConfigMap) -> Negotiator {
    self.failure_mode = mode;
    self.fail_map = fail_map;
    self
  }

  /// Sends `hello` every `hello_retry` until an `init` arrives and returns the first one.
  /// Datagrams that are not an `init` are ignored.
  pub async fn request_snapshot(&self, udp: &Arc<UdpSocket>) -> Result<ClusterSnapshot> {
    let mut buf = vec![0u8; 4096];
    loop {
      let hello = ControllerDatagram::Hello.encode();
      udp_select!(self.failure_mode, udp, self.controller, hello, &self.fail_map)?;
      trace!(LOG_LEVEL, "hello sent to {}", self.controller);
      let deadline = Instant::now() + self.hello_retry;
      loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (len, src) = match timeout(remaining, udp.recv_from(&mut buf[..])).await {
          Ok(res) => res?,
          Err(_) => break,
        };
        let snapshot = std::str::from_utf8(&buf[..len])
          .ok()
          .and_then(ControllerDatagram::decode)
          .and_then(ClusterSnapshot::from_datagram);
        match snapshot {
          Some(snapshot) => {
            debug!(LOG_LEVEL, "init from {}: {:?}", src, snapshot);
            return Ok(snapshot);
          }
          None => trace!(LOG_LEVEL, "ignoring datagram from {}", src),
        }
      }
    }
  }

  /// The round this node would run over `snapshot`.
  pub fn open_round(&self, snapshot: ClusterSnapshot) -> JoinRound {
    JoinRound::new(snapshot, self.rmin)
  }

  /// Phase one sends `share` to every peer concurrently and waits for all of them. Any `nok`, or
  /// a peer that does not answer within the share timeout, clears `agreed`. A peer that cannot be
  /// reached contributes nothing. Phase two sends `commit` or `rollback` to every peer and applies
  /// the same locally.
  pub async fn run_round(&self, round: JoinRound) -> JoinOutcome {
    if !round.agreed() {
      info!(LOG_LEVEL, "share {} is below rmin {}", round.proposed, self.rmin);
    }
    let mut replies = Vec::with_capacity(round.peers.len());
    for peer in round.peers.iter().copied() {
      let messenger = self.messenger;
      let agreed = round.agreed.clone();
      let proposed = round.proposed;
      replies.push(tokio::spawn(async move {
        match messenger.share(peer, proposed).await {
          Ok(ShareReply::Accept) => {}
          Ok(ShareReply::Reject) => agreed.store(false, Ordering::SeqCst),
          Err(ClusterError::Timeout(dur)) => {
            warn!(LOG_LEVEL, "{} did not answer share within {:?}", peer, dur);
            agreed.store(false, Ordering::SeqCst);
          }
          Err(e) => warn!(LOG_LEVEL, "share to {} failed: {}", peer, e),
        }
      }));
    }
    for reply in replies {
      let _ = reply.await;
    }
    self.resources.stage(round.proposed);

    let agreed = round.agreed();
    let mut notices = Vec::with_capacity(round.peers.len());
    for peer in round.peers.iter().copied() {
      let messenger = self.messenger;
      let proposed = round.proposed;
      notices.push(tokio::spawn(async move {
        let res = if agreed {
          messenger.commit(peer, proposed).await
        } else {
          messenger.rollback(peer).await
        };
        if let Err(e) = res {
          warn!(LOG_LEVEL, "could not notify {}: {}", peer, e);
        }
      }));
    }
    for notice in notices {
      let _ = notice.await;
    }

    if agreed {
      let share = self.resources.commit();
      info!(LOG_LEVEL, "joined with share {}", share);
      JoinOutcome::Committed(share)
    } else {
      let share = self.resources.rollback();
      info!(LOG_LEVEL, "join rolled back, keeping share {}", share);
      JoinOutcome::RolledBack(share)
    }
  }
}

#[test]
fn round_starts_disagreed_below_rmin() {
  let peers = vec!["10.0.0.1:7000".parse().unwrap(), "10.0.0.2:7000".parse().unwrap()];
  let snapshot = ClusterSnapshot {
    peers: peers,
    rmax: 300,
  };
  let round = JoinRound::new(snapshot.clone(), 100);
  assert_eq!(round.proposed, 100);
  assert!(round.agreed());
  let round = JoinRound::new(snapshot, 101);
  assert!(!round.agreed());
}

#[test]
fn lone_node_commits_the_whole_ceiling() {
  tokio_test::block_on(async {
    let resources = Arc::new(ResourceState::new(10));
    let negotiator = Negotiator::new(
      "127.0.0.1:1".parse().unwrap(),
      Duration::from_millis(100),
      10,
      PeerMessenger::new(None),
      resources.clone(),
    );
    let round = JoinRound::new(
      ClusterSnapshot {
        peers: vec![],
        rmax: 300,
      },
      10,
    );
    assert_eq!(negotiator.run_round(round).await, JoinOutcome::Committed(300));
    assert_eq!(resources.committed(), 300);
  });
}
