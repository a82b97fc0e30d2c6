use crate::controller::positive_duration;
use crate::core::{OperatorSet, Socket};
use crate::testkit::{FailureConfigMap, FailureMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NodeConfig {
  /// Peers and the controller connect to `socket.tcp`; datagrams go out from `socket.udp`. Port
  /// `0` picks a free port. Default: `0.0.0.0`, both ports `0`.
  pub socket: Socket,
  /// Where the controller's membership listener receives datagrams. Only `host` and `udp` are
  /// used. Default: `127.0.0.1`, udp port `0`
  pub controller: Socket,
  /// Operators this node evaluates. Default: `+-*/`
  #[validate(custom = "non_empty_operators")]
  pub operators: OperatorSet,
  /// The smallest resource share this node accepts. Default: 0
  pub rmin: u64,
  /// How often `alive` is sent after a successful join. Default: 1000 ms
  #[validate(custom = "positive_duration")]
  pub alive_period: Duration,
  /// How long to wait for an `init` before sending `hello` again. Default: 2 s
  #[validate(custom = "positive_duration")]
  pub hello_retry: Duration,
  /// How long to wait for one peer's answer to `share`. A peer that does not answer in time
  /// counts as `nok`. `None` waits forever, so a silent peer stalls the round. Default: 5 s
  #[validate(custom = "positive_duration")]
  pub share_timeout: Option<Duration>,
  /// How many evaluated sub-operations are remembered. Default: 100
  #[validate(range(min = 1))]
  pub history_capacity: usize,
  /// Default: [`FailureMode::None`]
  #[serde(default)]
  pub failure_mode: FailureMode,
  #[serde(default)]
  pub fail_map: FailureConfigMap,
}
impl Default for NodeConfig {
  fn default() -> Self {
    NodeConfig {
      socket: Socket::default(),
      controller: Socket::localhost(0, 0),
      operators: OperatorSet::all(),
      rmin: 0,
      alive_period: Duration::from_millis(1000),
      hello_retry: Duration::from_secs(2),
      share_timeout: Some(Duration::from_secs(5)),
      history_capacity: 100,
      failure_mode: FailureMode::None,
      fail_map: FailureConfigMap::default(),
    }
  }
}

fn non_empty_operators(ops: &OperatorSet) -> Result<(), ValidationError> {
  if ops.is_empty() {
    Err(ValidationError::new("no_operators"))
  } else {
    Ok(())
  }
}

#[test]
fn node_config_validation() {
  assert!(NodeConfig::default().validate().is_ok());

  let mut config = NodeConfig::default();
  config.share_timeout = None;
  assert!(config.validate().is_ok());

  let mut config = NodeConfig::default();
  config.share_timeout = Some(Duration::from_millis(0));
  assert!(config.validate().is_err());

  let mut config = NodeConfig::default();
  config.operators = OperatorSet::new();
  assert!(config.validate().is_err());

  let mut config = NodeConfig::default();
  config.history_capacity = 0;
  assert!(config.validate().is_err());
}
