use im::HashMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Whether outgoing datagrams pass through failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
  /// Drop and delay individual datagrams.
  Packet,
  None,
}
impl Default for FailureMode {
  fn default() -> Self {
    FailureMode::None
  }
}

#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FailureConfig {
  /// Probability in `[0, 1]` that a datagram is never sent.
  pub drop_prob: f64,
  /// Uniformly random delay between the bounds, inclusive.
  pub delay: Option<(Duration, Duration)>,
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct FailureConfigMap {
  pub cluster_wide: FailureConfig,
  pub node_wide: HashMap<SocketAddr, FailureConfig>,
}
impl FailureConfigMap {
  pub fn get(&self, addr: &SocketAddr) -> &FailureConfig {
    self.node_wide.get(addr).unwrap_or(&self.cluster_wide)
  }
}

#[test]
fn node_wide_overrides_cluster_wide() {
  let lossy: SocketAddr = "127.0.0.1:9000".parse().unwrap();
  let other: SocketAddr = "127.0.0.1:9001".parse().unwrap();
  let mut map = FailureConfigMap::default();
  map.cluster_wide.drop_prob = 0.1;
  map.node_wide.insert(
    lossy,
    FailureConfig {
      drop_prob: 1.0,
      delay: None,
    },
  );
  assert_eq!(map.get(&lossy).drop_prob, 1.0);
  assert_eq!(map.get(&other).drop_prob, 0.1);
}
