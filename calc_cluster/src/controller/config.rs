use crate::core::Socket;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// One account the controller accepts logins for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserConfig {
  #[validate(length(min = 1))]
  pub name: String,
  pub password: String,
  /// Starting balance.
  #[validate(range(min = 0))]
  pub credits: i64,
}
impl UserConfig {
  pub fn new(name: &str, password: &str, credits: i64) -> UserConfig {
    UserConfig {
      name: name.to_string(),
      password: password.to_string(),
      credits: credits,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "distinct_user_names"))]
pub struct ControllerConfig {
  /// The membership listener binds `socket.udp`, the client listener binds `socket.tcp`. Port `0`
  /// picks a free port. Default: `0.0.0.0`, both ports `0`.
  pub socket: Socket,
  /// The aggregate resource ceiling divided among the nodes. Default: 1000
  #[validate(range(min = 1))]
  pub rmax: u64,
  /// A node not heard from for longer than this is marked offline. Default: 3000 ms
  #[validate(custom = "positive_duration")]
  pub node_timeout: Duration,
  /// How often the liveness checker sweeps the registry. Default: 1000 ms
  #[validate(custom = "positive_duration")]
  pub check_period: Duration,
  /// Upper bound on concurrently served client connections. Default: 16 per logical CPU
  #[validate(range(min = 1))]
  pub max_sessions: usize,
  #[validate]
  pub users: Vec<UserConfig>,
}
impl Default for ControllerConfig {
  fn default() -> Self {
    ControllerConfig {
      socket: Socket::default(),
      rmax: 1000,
      node_timeout: Duration::from_millis(3000),
      check_period: Duration::from_millis(1000),
      max_sessions: num_cpus::get() * 16,
      users: vec![],
    }
  }
}

pub(crate) fn positive_duration(dur: &Duration) -> Result<(), ValidationError> {
  if *dur == Duration::from_millis(0) {
    Err(ValidationError::new("zero_duration"))
  } else {
    Ok(())
  }
}

fn distinct_user_names(config: &ControllerConfig) -> Result<(), ValidationError> {
  if config.users.iter().map(|u| u.name.as_str()).unique().count() == config.users.len() {
    Ok(())
  } else {
    Err(ValidationError::new("duplicate_user_name"))
  }
}

#[test]
fn default_config_is_valid() {
  let config = ControllerConfig::default();
  assert!(config.validate().is_ok());
  assert!(config.max_sessions >= 16);
}

#[test]
fn invalid_configs_are_rejected() {
  let mut config = ControllerConfig::default();
  config.check_period = Duration::from_millis(0);
  assert!(config.validate().is_err());

  let mut config = ControllerConfig::default();
  config.users = vec![UserConfig::new("alice", "a", 10), UserConfig::new("alice", "b", 20)];
  assert!(config.validate().is_err());

  let mut config = ControllerConfig::default();
  config.users = vec![UserConfig::new("", "a", 10)];
  assert!(config.validate().is_err());

  let mut config = ControllerConfig::default();
  config.rmax = 0;
  assert!(config.validate().is_err());
}
