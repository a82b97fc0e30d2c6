use calc_cluster::controller::{ChannelNotifier, Controller, ControllerConfig};
use calc_cluster::core::{ClusterSnapshot, ControllerDatagram, Operator, Socket, WireMessage};
use calc_cluster::node::{Negotiator, PeerMessenger, ResourceState};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout, Instant};

fn rt() -> Runtime {
  tokio::runtime::Builder::new_multi_thread()
    .worker_threads(2)
    .enable_all()
    .build()
    .unwrap()
}

async fn start_controller(config: ControllerConfig) -> Controller {
  let mut config = config;
  config.socket = Socket::localhost(0, 0);
  Controller::start(config, Arc::new(ChannelNotifier::new())).await.unwrap()
}

async fn client() -> UdpSocket {
  UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn send(udp: &UdpSocket, to: SocketAddr, msg: &str) {
  udp.send_to(msg.as_bytes(), to).await.unwrap();
}

async fn recv_datagram(udp: &UdpSocket) -> ControllerDatagram {
  let mut buf = vec![0u8; 4096];
  let (len, _) = timeout(Duration::from_secs(2), udp.recv_from(&mut buf[..]))
    .await
    .expect("no reply")
    .unwrap();
  ControllerDatagram::decode(std::str::from_utf8(&buf[..len]).unwrap()).unwrap()
}

async fn records_settle(controller: &Controller, n: usize) {
  let deadline = Instant::now() + Duration::from_secs(5);
  while controller.registry().records().await.unwrap().len() != n {
    assert!(Instant::now() < deadline);
    sleep(Duration::from_millis(20)).await;
  }
}

#[test]
fn hello_is_answered_with_the_online_peers() {
  rt().block_on(async {
    let mut config = ControllerConfig::default();
    config.rmax = 300;
    let controller = start_controller(config).await;
    let ctrl = controller.udp_addr();
    let udp = client().await;

    send(&udp, ctrl, "hello").await;
    assert_eq!(recv_datagram(&udp).await, ControllerDatagram::Init(vec![], 300));

    send(&udp, ctrl, "alive 7000 +-").await;
    send(&udp, ctrl, "!alive 7001 */").await;
    records_settle(&controller, 2).await;
    send(&udp, ctrl, "!hello").await;
    let expected = vec![
      "127.0.0.1:7000".parse::<SocketAddr>().unwrap(),
      "127.0.0.1:7001".parse::<SocketAddr>().unwrap(),
    ];
    assert_eq!(recv_datagram(&udp).await, ControllerDatagram::Init(expected, 300));
  });
}

#[test]
fn repeated_datagrams_do_not_duplicate_records() {
  rt().block_on(async {
    let controller = start_controller(ControllerConfig::default()).await;
    let ctrl = controller.udp_addr();
    let udp = client().await;

    for _ in 0..3 {
      send(&udp, ctrl, "hello").await;
    }
    for _ in 0..3 {
      assert_eq!(recv_datagram(&udp).await, ControllerDatagram::Init(vec![], 1000));
    }
    assert!(controller.registry().records().await.unwrap().is_empty());

    for _ in 0..5 {
      send(&udp, ctrl, "alive 7000 +-*/").await;
    }
    send(&udp, ctrl, "alive 7002 +").await;
    records_settle(&controller, 2).await;
    sleep(Duration::from_millis(100)).await;
    let records = controller.registry().records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].tcp, 7000);
    assert_eq!(records[1].tcp, 7002);
    assert!(records.iter().all(|r| r.online && r.usage == 0));
    assert_eq!(
      controller.nodes().await.unwrap(),
      "1. IP: 127.0.0.1 Port: 7000 online Usage: 0\n2. IP: 127.0.0.1 Port: 7002 online Usage: 0"
    );
  });
}

#[test]
fn malformed_datagrams_are_dropped() {
  rt().block_on(async {
    let controller = start_controller(ControllerConfig::default()).await;
    let ctrl = controller.udp_addr();
    let udp = client().await;

    udp.send_to(&[0xff, 0xfe, 0x00], ctrl).await.unwrap();
    for junk in ["", "goodbye", "alive", "alive x +", "alive 7000 %", "init 300", "hello world"].iter() {
      send(&udp, ctrl, junk).await;
    }
    send(&udp, ctrl, "hello").await;
    assert_eq!(recv_datagram(&udp).await, ControllerDatagram::Init(vec![], 1000));
    assert_eq!(controller.nodes().await.unwrap(), "No nodes found");
  });
}

#[test]
fn silent_nodes_are_marked_offline_and_come_back() {
  rt().block_on(async {
    let mut config = ControllerConfig::default();
    config.node_timeout = Duration::from_millis(200);
    config.check_period = Duration::from_millis(50);
    let controller = start_controller(config).await;
    let ctrl = controller.udp_addr();
    let udp = client().await;

    send(&udp, ctrl, "alive 7000 +").await;
    records_settle(&controller, 1).await;
    let picked = controller.registry().pick_node(Operator::Add).await.unwrap();
    assert_eq!(picked, Some("127.0.0.1:7000".parse().unwrap()));

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.registry().records().await.unwrap()[0].online {
      assert!(Instant::now() < deadline, "node never timed out");
      sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(controller.registry().pick_node(Operator::Add).await.unwrap(), None);
    send(&udp, ctrl, "hello").await;
    assert_eq!(recv_datagram(&udp).await, ControllerDatagram::Init(vec![], 1000));

    send(&udp, ctrl, "alive 7000 +").await;
    let deadline = Instant::now() + Duration::from_secs(5);
    while !controller.registry().records().await.unwrap()[0].online {
      assert!(Instant::now() < deadline, "node never came back");
      sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(controller.registry().records().await.unwrap().len(), 1);
  });
}

#[test]
fn hello_is_retried_until_an_init_arrives() {
  rt().block_on(async {
    let fake = client().await;
    let fake_addr = fake.local_addr().unwrap();
    let hellos = Arc::new(AtomicUsize::new(0));
    let seen = hellos.clone();
    tokio::spawn(async move {
      let mut buf = vec![0u8; 4096];
      loop {
        let (len, src) = fake.recv_from(&mut buf[..]).await.unwrap();
        let line = std::str::from_utf8(&buf[..len]).unwrap().to_string();
        assert_eq!(line, "hello");
        // Ignore the first two, then answer twice, once with junk in between.
        if seen.fetch_add(1, Ordering::SeqCst) >= 2 {
          fake.send_to(b"alive 1 +", src).await.unwrap();
          fake.send_to(b"init 127.0.0.1:7000 300", src).await.unwrap();
          fake.send_to(b"init 300", src).await.unwrap();
        }
      }
    });

    let udp = Arc::new(client().await);
    let negotiator = Negotiator::new(
      fake_addr,
      Duration::from_millis(100),
      0,
      PeerMessenger::new(None),
      Arc::new(ResourceState::new(0)),
    );
    let snapshot = timeout(Duration::from_secs(5), negotiator.request_snapshot(&udp))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(
      snapshot,
      ClusterSnapshot {
        peers: vec!["127.0.0.1:7000".parse().unwrap()],
        rmax: 300,
      }
    );
    assert_eq!(hellos.load(Ordering::SeqCst), 3);
  });
}
