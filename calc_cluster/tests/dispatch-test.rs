use async_trait::async_trait;
use calc_cluster::controller::{
  Accounts, ChannelNotifier, Dispatcher, Expression, NodeLink, NodeRegistry, UserConfig,
  NOT_ENOUGH_CREDITS, NO_NODES,
};
use calc_cluster::core::{now_millis, ClusterError, ComputeReply, Operator, OperatorSet, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use maplit::hashset;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Evaluates in-process and reports every call. Nodes in `down` fail like a refused connection.
struct FakeLink {
  calls: Sender<(SocketAddr, i64, Operator, i64)>,
  down: Mutex<HashSet<SocketAddr>>,
}
#[async_trait]
impl NodeLink for FakeLink {
  async fn compute(&self, node: SocketAddr, a: i64, op: Operator, b: i64) -> Result<ComputeReply> {
    self.calls.send((node, a, op, b)).unwrap();
    if self.down.lock().contains(&node) {
      return Err(ClusterError::Io(std::io::ErrorKind::ConnectionRefused.into()));
    }
    Ok(op.apply(a, b))
  }
}

struct Fixture {
  registry: NodeRegistry,
  accounts: Accounts,
  dispatcher: Dispatcher,
  link: Arc<FakeLink>,
  calls: Receiver<(SocketAddr, i64, Operator, i64)>,
}
impl Fixture {
  fn new(credits: i64) -> Fixture {
    let (tx, rx) = unbounded();
    let link = Arc::new(FakeLink {
      calls: tx,
      down: Mutex::new(HashSet::new()),
    });
    let registry = NodeRegistry::new();
    let accounts = Accounts::new(
      &[UserConfig::new("alice", "12345", credits)],
      Arc::new(ChannelNotifier::new()),
    );
    let dispatcher = Dispatcher::new(registry.clone(), accounts.clone(), link.clone());
    Fixture {
      registry: registry,
      accounts: accounts,
      dispatcher: dispatcher,
      link: link,
      calls: rx,
    }
  }

  fn node(&self, port: u16, ops: &str) -> SocketAddr {
    let ip: IpAddr = "10.0.0.1".parse().unwrap();
    self.registry.upsert(ip, port, ops.parse::<OperatorSet>().unwrap(), now_millis());
    SocketAddr::new(ip, port)
  }

  async fn compute(&self, expr: &str) -> String {
    self.dispatcher.compute("alice", &expr.parse::<Expression>().unwrap()).await.unwrap()
  }

  async fn credits(&self) -> i64 {
    self.accounts.credits("alice").await.unwrap().unwrap()
  }

  fn calls(&self) -> Vec<(SocketAddr, i64, Operator, i64)> {
    self.calls.try_iter().collect()
  }
}

#[test]
fn left_to_right_fold_charges_every_sub_operation() {
  tokio_test::block_on(async {
    let f = Fixture::new(100);
    let n = f.node(7000, "+-*/");
    assert_eq!(f.compute("2 + 3 * 4").await, "20");
    assert_eq!(f.credits().await, 0);
    assert_eq!(
      f.calls(),
      vec![(n, 2, Operator::Add, 3), (n, 5, Operator::Mul, 4)]
    );
    assert_eq!(f.compute("1 + 1").await, NOT_ENOUGH_CREDITS);
    assert!(f.calls().is_empty());
  });
}

#[test]
fn admission_needs_credits_for_every_sub_operation() {
  tokio_test::block_on(async {
    let f = Fixture::new(99);
    f.node(7000, "+-*/");
    assert_eq!(f.compute("2 + 3 * 4").await, NOT_ENOUGH_CREDITS);
    assert_eq!(f.credits().await, 99);
    assert_eq!(f.compute("2 + 3").await, "5");
    assert_eq!(f.credits().await, 49);
  });
}

#[test]
fn single_operand_is_free() {
  tokio_test::block_on(async {
    let f = Fixture::new(0);
    assert_eq!(f.compute("-17").await, "-17");
    assert_eq!(f.credits().await, 0);
    assert!(f.calls().is_empty());
  });
}

#[test]
fn division_by_zero_stops_the_fold_and_is_charged() {
  tokio_test::block_on(async {
    let f = Fixture::new(1000);
    f.node(7000, "+-*/");
    assert_eq!(f.compute("10 / 0 + 5").await, "Error: division by 0");
    assert_eq!(f.credits().await, 950);
    assert_eq!(f.calls().len(), 1);
  });
}

#[test]
fn missing_operator_answers_no_nodes_and_charges_what_ran() {
  tokio_test::block_on(async {
    let f = Fixture::new(1000);
    f.node(7000, "+-");
    assert_eq!(f.compute("1 + 2 * 3").await, NO_NODES);
    assert_eq!(f.credits().await, 950);
    assert_eq!(f.compute("4 * 2").await, NO_NODES);
    assert_eq!(f.credits().await, 950);
  });
}

#[test]
fn least_used_node_gets_the_next_sub_operation() {
  tokio_test::block_on(async {
    let f = Fixture::new(1000);
    let a = f.node(7000, "+");
    let b = f.node(7001, "+");
    f.registry.add_usage(b, 50);
    assert_eq!(f.registry.pick_node(Operator::Add).await.unwrap(), Some(a));

    // Two digits at 50 each take a from 0 to 100, past b.
    assert_eq!(f.compute("5 + 5").await, "10");
    let records = f.registry.records().await.unwrap();
    assert_eq!(records[0].usage, 100);
    assert_eq!(records[1].usage, 50);
    assert_eq!(f.registry.pick_node(Operator::Add).await.unwrap(), Some(b));

    // The sign of a negative result is not a digit.
    assert_eq!(f.compute("0 + -7").await, "-7");
    let used = f.calls().into_iter().map(|(node, ..)| node).collect::<HashSet<_>>();
    assert_eq!(used, hashset! {a, b});
    assert_eq!(f.registry.records().await.unwrap()[1].usage, 100);
  });
}

#[test]
fn unreachable_node_is_marked_offline_without_retry() {
  tokio_test::block_on(async {
    let f = Fixture::new(1000);
    let a = f.node(7000, "+-*/");
    let b = f.node(7001, "+-*/");
    f.link.down.lock().insert(a);

    assert_eq!(f.compute("1 + 1").await, NO_NODES);
    assert_eq!(f.credits().await, 950);
    assert_eq!(f.calls(), vec![(a, 1, Operator::Add, 1)]);
    let records = f.registry.records().await.unwrap();
    assert!(!records[0].online);
    assert!(records[1].online);

    assert_eq!(f.compute("1 + 1").await, "2");
    assert_eq!(f.calls(), vec![(b, 1, Operator::Add, 1)]);
    assert_eq!(f.credits().await, 900);
  });
}

#[test]
fn failure_mid_expression_charges_every_attempt() {
  tokio_test::block_on(async {
    let f = Fixture::new(1000);
    let adder = f.node(7000, "+");
    let multiplier = f.node(7001, "*");
    f.link.down.lock().insert(multiplier);

    assert_eq!(f.compute("1 + 2 * 3 + 4").await, NO_NODES);
    assert_eq!(
      f.calls(),
      vec![(adder, 1, Operator::Add, 2), (multiplier, 3, Operator::Mul, 3)]
    );
    assert_eq!(f.credits().await, 900);
    let records = f.registry.records().await.unwrap();
    assert!(records[0].online);
    assert!(!records[1].online);
  });
}
