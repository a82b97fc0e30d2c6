use calc_cluster::controller::{ChannelNotifier, Controller, ControllerConfig, UserConfig, NO_NODES};
use calc_cluster::core::{Channel, LineChannel, Operator, Socket};
use calc_cluster::node::{JoinState, NodeAgent, NodeConfig};
use calc_cluster::testkit::{FailureConfig, FailureConfigMap, FailureMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout, Instant};

fn rt() -> Runtime {
  tokio::runtime::Builder::new_multi_thread()
    .worker_threads(4)
    .enable_all()
    .build()
    .unwrap()
}

async fn start_controller() -> Controller {
  let mut config = ControllerConfig::default();
  config.socket = Socket::localhost(0, 0);
  config.rmax = 1000;
  config.node_timeout = Duration::from_millis(500);
  config.check_period = Duration::from_millis(100);
  config.users = vec![UserConfig::new("alice", "12345", 500)];
  Controller::start(config, Arc::new(ChannelNotifier::new())).await.unwrap()
}

fn node_config(controller: &Controller, operators: &str) -> NodeConfig {
  let mut config = NodeConfig::default();
  config.controller = Socket::localhost(controller.udp_addr().port(), 0);
  config.operators = operators.parse().unwrap();
  config.alive_period = Duration::from_millis(100);
  config.hello_retry = Duration::from_millis(200);
  config
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

async fn start_node(controller: &Controller, config: NodeConfig, online_after: usize) -> NodeAgent {
  let agent = NodeAgent::start(config).await.unwrap();
  let state = timeout(Duration::from_secs(5), agent.wait_joined()).await.unwrap();
  assert!(matches!(state, JoinState::Joined(_)), "{:?}", state);
  wait_for_online(controller, online_after).await;
  agent
}

async fn client(controller: &Controller) -> LineChannel {
  LineChannel::new(TcpStream::connect(controller.tcp_addr()).await.unwrap())
}

async fn ask(channel: &mut LineChannel, line: &str) -> String {
  channel.send_line(line).await.unwrap();
  timeout(Duration::from_secs(5), channel.receive_line())
    .await
    .unwrap()
    .unwrap()
    .unwrap()
}

#[test]
fn expression_is_folded_across_the_cluster() {
  rt().block_on(async {
    let controller = start_controller().await;
    let adder = start_node(&controller, node_config(&controller, "+-"), 1).await;
    let multiplier = start_node(&controller, node_config(&controller, "*/"), 2).await;
    let deadline = Instant::now() + Duration::from_secs(5);
    while adder.resources() != 500 {
      assert!(Instant::now() < deadline, "commit never reached the first node");
      sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(multiplier.resources(), 500);

    let mut c = client(&controller).await;
    assert_eq!(ask(&mut c, "!login alice 12345").await, "Successfully logged in.");
    assert_eq!(ask(&mut c, "!list").await, "+-*/");
    assert_eq!(ask(&mut c, "!compute 2 + 3 * 4").await, "20");
    assert_eq!(ask(&mut c, "!compute 7 / 0 - 1").await, "Error: division by 0");
    assert_eq!(ask(&mut c, "!credits").await, "You have 350 credits left.");

    let added = adder.history(10);
    assert_eq!(added.len(), 1);
    assert_eq!((added[0].a, added[0].op, added[0].b), (2, Operator::Add, 3));
    let multiplied = multiplier.history(10);
    assert_eq!(multiplied.len(), 2);
    assert_eq!(multiplied[0].result.to_string(), "20");
    assert_eq!(multiplied[1].result.to_string(), "Error: division by 0");

    let nodes = controller.nodes().await.unwrap();
    assert!(nodes.starts_with("1. IP: 127.0.0.1 Port: "), "{}", nodes);
    assert!(nodes.contains(" online Usage: 50\n2. "), "{}", nodes);
    assert!(nodes.ends_with(" online Usage: 100"), "{}", nodes);
    assert_eq!(controller.users().await.unwrap(), "1. alice online Credits: 350");
    assert_eq!(controller.statistics().to_string(), "+ 1\n- 1\n* 1\n/ 1");
  });
}

#[test]
fn stopped_node_times_out_and_its_operators_disappear() {
  rt().block_on(async {
    let controller = start_controller().await;
    let adder = start_node(&controller, node_config(&controller, "+"), 1).await;
    let subtracter = start_node(&controller, node_config(&controller, "-"), 2).await;

    let mut c = client(&controller).await;
    ask(&mut c, "!login alice 12345").await;
    assert_eq!(ask(&mut c, "!list").await, "+-");

    subtracter.stop();
    wait_for_online(&controller, 1).await;
    assert_eq!(ask(&mut c, "!list").await, "+");
    assert_eq!(ask(&mut c, "!compute 5 - 2").await, NO_NODES);
    assert_eq!(ask(&mut c, "!compute 5 + 2").await, "7");
    assert_eq!(ask(&mut c, "!credits").await, "You have 450 credits left.");
    assert_eq!(adder.history(10).len(), 1);
  });
}

#[test]
fn lost_heartbeats_are_tolerated_until_the_timeout() {
  rt().block_on(async {
    let controller = start_controller().await;
    let mut config = node_config(&controller, "+-*/");
    config.failure_mode = FailureMode::Packet;
    config.fail_map = FailureConfigMap {
      cluster_wide: FailureConfig {
        drop_prob: 0.3,
        delay: Some((Duration::from_millis(0), Duration::from_millis(20))),
      },
      node_wide: im::HashMap::new(),
    };
    let agent = start_node(&controller, config, 1).await;
    assert!(agent.joined());

    sleep(Duration::from_millis(1000)).await;
    let records = controller.registry().records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].endpoint().port(), agent.tcp_addr().port());
  });
}

#[test]
fn logs_are_collected_from_every_online_node_oldest_first() {
  rt().block_on(async {
    let controller = start_controller().await;
    let adder = start_node(&controller, node_config(&controller, "+"), 1).await;
    let multiplier = start_node(&controller, node_config(&controller, "*/"), 2).await;
    assert!(controller.logs().await.unwrap().is_empty());

    let mut c = client(&controller).await;
    ask(&mut c, "!login alice 12345").await;
    assert_eq!(ask(&mut c, "!compute 2 + 3 * 4").await, "20");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(ask(&mut c, "!compute 1 + 1").await, "2");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(ask(&mut c, "!compute 9 / 0").await, "Error: division by 0");

    let logs = controller.logs().await.unwrap();
    let nodes = logs.iter().map(|l| l.node.port()).collect::<Vec<_>>();
    let (a, m) = (adder.tcp_addr().port(), multiplier.tcp_addr().port());
    assert_eq!(nodes, vec![a, m, a, m]);
    assert!(logs.windows(2).all(|w| w[0].record.timestamp <= w[1].record.timestamp));
    assert_eq!(logs[0].record, adder.history(10)[0]);
    let shown = logs.iter().map(|l| l.to_string()).collect::<Vec<_>>();
    assert!(shown[1].ends_with(&format!(":{}]: 5 * 4 = 20", m)), "{}", shown[1]);
    assert!(shown[3].ends_with("]: 9 / 0 = Error: division by 0"), "{}", shown[3]);

    adder.stop();
    wait_for_online(&controller, 1).await;
    let logs = controller.logs().await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.node.port() == m));
  });
}
