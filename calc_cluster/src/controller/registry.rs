use crate::controller::LOG_LEVEL;
use crate::core::{
  spawn, Actor, ActorContext, ActorSignal, ClusterError, ClusterSnapshot, LocalRef, Operator,
  OperatorSet, Result,
};
use crate::{debug, trace};
use async_trait::async_trait;
use linked_hash_map::LinkedHashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::oneshot;
use RegistryMsg::*;

/// What the controller knows about one compute node. Records are keyed by the node's address
/// and stream port and are never removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
  pub addr: IpAddr,
  pub tcp: u16,
  pub operators: OperatorSet,
  pub usage: u64,
  pub online: bool,
  pub last_seen: i64,
}
impl NodeRecord {
  pub fn endpoint(&self) -> SocketAddr {
    SocketAddr::new(self.addr, self.tcp)
  }
}
impl fmt::Display for NodeRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "IP: {} Port: {} {} Usage: {}",
      self.addr,
      self.tcp,
      if self.online { "online" } else { "offline" },
      self.usage
    )
  }
}

/// The records themselves, in first-seen order. Only the registry actor touches this.
#[derive(Default)]
pub(crate) struct RegistryState {
  nodes: LinkedHashMap<SocketAddr, NodeRecord>,
}
impl RegistryState {
  /// Returns `true` if the record is new.
  pub fn upsert(&mut self, addr: IpAddr, tcp: u16, operators: OperatorSet, now: i64) -> bool {
    let key = SocketAddr::new(addr, tcp);
    match self.nodes.get_mut(&key) {
      Some(record) => {
        record.last_seen = now;
        record.online = true;
        false
      }
      None => {
        self.nodes.insert(
          key,
          NodeRecord {
            addr: addr,
            tcp: tcp,
            operators: operators,
            usage: 0,
            online: true,
            last_seen: now,
          },
        );
        true
      }
    }
  }

  pub fn mark_offline(&mut self, endpoint: &SocketAddr) {
    if let Some(record) = self.nodes.get_mut(endpoint) {
      record.online = false;
    }
  }

  /// Flips every record not seen for more than `timeout` millis offline. Returns how many were
  /// flipped.
  pub fn sweep(&mut self, now: i64, timeout: i64) -> usize {
    let mut flipped = 0;
    for (_, record) in self.nodes.iter_mut() {
      if record.online && now - record.last_seen > timeout {
        record.online = false;
        flipped += 1;
      }
    }
    flipped
  }

  /// The online node supporting `op` with the lowest usage. Ties go to the first seen.
  pub fn pick_node(&self, op: Operator) -> Option<SocketAddr> {
    let mut best: Option<&NodeRecord> = None;
    for record in self.nodes.values() {
      if !record.online || !record.operators.contains(op) {
        continue;
      }
      match best {
        Some(b) if b.usage <= record.usage => {}
        _ => best = Some(record),
      }
    }
    best.map(|r| r.endpoint())
  }

  pub fn add_usage(&mut self, endpoint: &SocketAddr, amount: u64) {
    if let Some(record) = self.nodes.get_mut(endpoint) {
      record.usage = record.usage.saturating_add(amount);
    }
  }

  pub fn snapshot(&self, rmax: u64) -> ClusterSnapshot {
    ClusterSnapshot {
      peers: self.nodes.values().filter(|r| r.online).map(|r| r.endpoint()).collect(),
      rmax: rmax,
    }
  }

  pub fn records(&self) -> Vec<NodeRecord> {
    self.nodes.values().cloned().collect()
  }

  /// The union of the online nodes' operators, in `+ - * /` order.
  pub fn available_operators(&self) -> OperatorSet {
    Operator::ALL
      .iter()
      .copied()
      .filter(|op| self.nodes.values().any(|r| r.online && r.operators.contains(*op)))
      .collect()
  }
}

pub(crate) enum RegistryMsg {
  Upsert {
    addr: IpAddr,
    tcp: u16,
    operators: OperatorSet,
    now: i64,
  },
  MarkOffline(SocketAddr),
  Sweep {
    now: i64,
    timeout: i64,
    reply: oneshot::Sender<usize>,
  },
  PickNode(Operator, oneshot::Sender<Option<SocketAddr>>),
  AddUsage(SocketAddr, u64),
  Snapshot(u64, oneshot::Sender<ClusterSnapshot>),
  Records(oneshot::Sender<Vec<NodeRecord>>),
  AvailableOperators(oneshot::Sender<OperatorSet>),
}

struct RegistryActor {
  state: RegistryState,
}
#[async_trait]
impl Actor<RegistryMsg> for RegistryActor {
  async fn recv(&mut self, ctx: &ActorContext<RegistryMsg>, msg: RegistryMsg) {
    match msg {
      Upsert {
        addr,
        tcp,
        operators,
        now,
      } => {
        if self.state.upsert(addr, tcp, operators, now) {
          debug!(LOG_LEVEL, "{}: new node {}:{}", ctx.name, addr, tcp);
        }
      }
      MarkOffline(endpoint) => {
        debug!(LOG_LEVEL, "{}: marking {} offline", ctx.name, endpoint);
        self.state.mark_offline(&endpoint);
      }
      Sweep {
        now,
        timeout,
        reply,
      } => {
        let flipped = self.state.sweep(now, timeout);
        if flipped > 0 {
          debug!(LOG_LEVEL, "{}: {} node(s) timed out", ctx.name, flipped);
        }
        let _ = reply.send(flipped);
      }
      PickNode(op, reply) => {
        let _ = reply.send(self.state.pick_node(op));
      }
      AddUsage(endpoint, amount) => {
        trace!(LOG_LEVEL, "{}: usage of {} += {}", ctx.name, endpoint, amount);
        self.state.add_usage(&endpoint, amount);
      }
      Snapshot(rmax, reply) => {
        let _ = reply.send(self.state.snapshot(rmax));
      }
      Records(reply) => {
        let _ = reply.send(self.state.records());
      }
      AvailableOperators(reply) => {
        let _ = reply.send(self.state.available_operators());
      }
    }
  }
}

/// Handle to the actor owning every [`NodeRecord`]. Cloning it is cheap; all clones talk to the
/// same registry.
#[derive(Clone, Debug)]
pub struct NodeRegistry {
  actor: LocalRef<RegistryMsg>,
}
impl NodeRegistry {
  /// Spawns the registry on the current tokio runtime.
  pub fn new() -> NodeRegistry {
    let (actor, _) = spawn(
      RegistryActor {
        state: RegistryState::default(),
      },
      "node-registry",
    );
    NodeRegistry { actor: actor }
  }

  pub fn upsert(&self, addr: IpAddr, tcp: u16, operators: OperatorSet, now: i64) {
    self.actor.send(Upsert {
      addr: addr,
      tcp: tcp,
      operators: operators,
      now: now,
    });
  }

  pub fn mark_offline(&self, endpoint: SocketAddr) {
    self.actor.send(MarkOffline(endpoint));
  }

  pub async fn sweep(&self, now: i64, timeout: i64) -> Result<usize> {
    self
      .actor
      .ask(|reply| Sweep {
        now: now,
        timeout: timeout,
        reply: reply,
      })
      .await
      .ok_or(ClusterError::ActorGone("node-registry"))
  }

  pub async fn pick_node(&self, op: Operator) -> Result<Option<SocketAddr>> {
    self
      .actor
      .ask(|reply| PickNode(op, reply))
      .await
      .ok_or(ClusterError::ActorGone("node-registry"))
  }

  pub fn add_usage(&self, endpoint: SocketAddr, amount: u64) {
    self.actor.send(AddUsage(endpoint, amount));
  }

  pub async fn snapshot(&self, rmax: u64) -> Result<ClusterSnapshot> {
    self
      .actor
      .ask(|reply| Snapshot(rmax, reply))
      .await
      .ok_or(ClusterError::ActorGone("node-registry"))
  }

  pub async fn records(&self) -> Result<Vec<NodeRecord>> {
    self.actor.ask(Records).await.ok_or(ClusterError::ActorGone("node-registry"))
  }

  pub async fn available_operators(&self) -> Result<OperatorSet> {
    self
      .actor
      .ask(AvailableOperators)
      .await
      .ok_or(ClusterError::ActorGone("node-registry"))
  }

  pub fn stop(&self) {
    self.actor.signal(ActorSignal::Term);
  }
}

#[cfg(test)]
fn ip(s: &str) -> IpAddr {
  s.parse().unwrap()
}

#[cfg(test)]
fn ops(s: &str) -> OperatorSet {
  s.parse().unwrap()
}

#[test]
fn alive_upserts_by_address_and_port() {
  let mut state = RegistryState::default();
  assert!(state.upsert(ip("10.0.0.1"), 7000, ops("+-"), 1));
  assert!(!state.upsert(ip("10.0.0.1"), 7000, ops("*"), 2));
  assert!(state.upsert(ip("10.0.0.1"), 7001, ops("*"), 3));
  assert!(state.upsert(ip("10.0.0.2"), 7000, ops("/"), 4));
  let records = state.records();
  assert_eq!(records.len(), 3);
  assert_eq!(records[0].last_seen, 2);
  assert_eq!(records[0].operators, ops("+-"));
  assert_eq!(records[0].usage, 0);
}

#[test]
fn upsert_revives_offline_records() {
  let mut state = RegistryState::default();
  state.upsert(ip("10.0.0.1"), 7000, ops("+"), 0);
  state.mark_offline(&"10.0.0.1:7000".parse().unwrap());
  assert!(!state.records()[0].online);
  state.upsert(ip("10.0.0.1"), 7000, ops("+"), 10);
  assert!(state.records()[0].online);
}

#[test]
fn pick_prefers_lowest_usage_then_first_seen() {
  let mut state = RegistryState::default();
  let a: SocketAddr = "10.0.0.1:7000".parse().unwrap();
  let b: SocketAddr = "10.0.0.2:7000".parse().unwrap();
  state.upsert(a.ip(), a.port(), ops("+"), 0);
  state.upsert(b.ip(), b.port(), ops("+*"), 0);
  assert_eq!(state.pick_node(Operator::Add), Some(a));
  state.add_usage(&b, 50);
  assert_eq!(state.pick_node(Operator::Add), Some(a));
  state.add_usage(&a, 100);
  assert_eq!(state.pick_node(Operator::Add), Some(b));
  assert_eq!(state.pick_node(Operator::Mul), Some(b));
  assert_eq!(state.pick_node(Operator::Div), None);
  state.mark_offline(&b);
  assert_eq!(state.pick_node(Operator::Mul), None);
}

#[test]
fn sweep_flips_only_expired_records() {
  let mut state = RegistryState::default();
  let now = 1_000_000;
  let timeout = 3000;
  state.upsert(ip("10.0.0.1"), 7000, ops("+"), now - (timeout + 1));
  state.upsert(ip("10.0.0.2"), 7000, ops("+"), now - timeout);
  assert_eq!(state.sweep(now, timeout), 1);
  let records = state.records();
  assert!(!records[0].online);
  assert!(records[1].online);
  assert_eq!(state.pick_node(Operator::Add), Some(records[1].endpoint()));
  assert_eq!(state.sweep(now, timeout), 0);
}

#[test]
fn snapshot_lists_online_nodes_only() {
  let mut state = RegistryState::default();
  state.upsert(ip("10.0.0.1"), 7000, ops("+"), 0);
  state.upsert(ip("10.0.0.2"), 7001, ops("-"), 0);
  state.upsert(ip("10.0.0.3"), 7002, ops("/"), 0);
  state.mark_offline(&"10.0.0.2:7001".parse().unwrap());
  let snapshot = state.snapshot(300);
  assert_eq!(
    crate::core::WireMessage::encode(&crate::core::ControllerDatagram::from(snapshot)),
    "init 10.0.0.1:7000 10.0.0.3:7002 300"
  );
  assert_eq!(state.available_operators().to_string(), "+/");
}

#[test]
fn registry_actor_answers_asks() {
  tokio_test::block_on(async {
    let registry = NodeRegistry::new();
    registry.upsert(ip("127.0.0.1"), 7000, ops("+-*/"), 5);
    registry.upsert(ip("127.0.0.1"), 7000, ops("+-*/"), 6);
    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].last_seen, 6);
    assert_eq!(
      registry.pick_node(Operator::Div).await.unwrap(),
      Some("127.0.0.1:7000".parse().unwrap())
    );
    assert_eq!(registry.sweep(10_000, 3000).await.unwrap(), 1);
    assert_eq!(registry.pick_node(Operator::Div).await.unwrap(), None);
    registry.stop();
  });
}
