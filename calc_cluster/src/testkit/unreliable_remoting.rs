use crate::testkit::FailureConfigMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

/// Sends `msg` to `addr`, unless the [`FailureConfig`](crate::testkit::FailureConfig) for `addr`
/// decides to drop it. A delayed datagram is sent from a separate task, so the caller is never
/// held up and later datagrams may overtake it.
pub async fn udp_send_unreliable(
  udp: &Arc<UdpSocket>,
  addr: SocketAddr,
  msg: String,
  fail_map: &FailureConfigMap,
) -> std::io::Result<()> {
  let fail_cfg = fail_map.get(&addr);
  if rand::random::<f64>() < fail_cfg.drop_prob {
    return Ok(());
  }
  let dur = fail_cfg.delay.map(|(min, max)| {
    let range = min.as_millis()..=max.as_millis().max(min.as_millis());
    Duration::from_millis(SmallRng::from_entropy().gen_range(range) as u64)
  });
  match dur {
    Some(dur) => {
      let udp = udp.clone();
      tokio::spawn(async move {
        sleep(dur).await;
        let _ = udp.send_to(msg.as_bytes(), addr).await;
      });
      Ok(())
    }
    None => udp.send_to(msg.as_bytes(), addr).await.map(|_| ()),
  }
}

/// Sends a line over UDP, through [`udp_send_unreliable`] when the mode is
/// [`FailureMode::Packet`](crate::testkit::FailureMode). Evaluates to `std::io::Result<()>`.
#[macro_export]
macro_rules! udp_select {
  ($mode:expr, $udp:expr, $addr:expr, $msg:expr, $fail_map:expr) => {
    match $mode {
      $crate::testkit::FailureMode::None => {
        $udp.send_to($msg.as_bytes(), $addr).await.map(|_| ())
      }
      $crate::testkit::FailureMode::Packet => {
        $crate::testkit::udp_send_unreliable($udp, $addr, $msg, $fail_map).await
      }
    }
  };
}

#[test]
fn dropped_datagrams_never_arrive() {
  use crate::testkit::FailureConfig;
  tokio_test::block_on(async {
    let recv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = recv.local_addr().unwrap();
    let send = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let mut map = FailureConfigMap::default();
    map.node_wide.insert(
      addr,
      FailureConfig {
        drop_prob: 1.0,
        delay: None,
      },
    );
    for _ in 0..10 {
      udp_send_unreliable(&send, addr, "alive 1 +".to_string(), &map).await.unwrap();
    }
    udp_send_unreliable(&send, addr, "hello".to_string(), &FailureConfigMap::default())
      .await
      .unwrap();
    let mut buf = [0u8; 64];
    let len = recv.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..len], b"hello");
  });
}
