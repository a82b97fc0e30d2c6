use crate::core::{ControllerDatagram, OperatorSet, StopSignal, WireMessage};
use crate::node::LOG_LEVEL;
use crate::testkit::{FailureConfigMap, FailureMode};
use crate::{debug, trace, udp_select};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

/// Settings of one heartbeat loop.
#[derive(Clone, Debug)]
pub struct Heartbeat {
  pub controller: SocketAddr,
  pub tcp: u16,
  pub operators: OperatorSet,
  pub period: Duration,
  pub failure_mode: FailureMode,
  pub fail_map: FailureConfigMap,
}

/// Sends `alive <tcp> <operators>` right away and then every `period` until stopped. Nothing is
/// expected back. The socket is closed when the loop ends.
pub(crate) async fn heartbeat_sender(udp: Arc<UdpSocket>, hb: Heartbeat, mut stop: StopSignal) {
  let alive = ControllerDatagram::Alive {
    tcp: hb.tcp,
    operators: hb.operators.clone(),
  }
  .encode();
  let mut ticks = interval(hb.period);
  ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    tokio::select! {
      _ = stop.stopped() => break,
      _ = ticks.tick() => {}
    }
    let res = udp_select!(hb.failure_mode, &udp, hb.controller, alive.clone(), &hb.fail_map);
    match res {
      Ok(()) => trace!(LOG_LEVEL, "`{}` sent to {}", alive, hb.controller),
      Err(e) => debug!(LOG_LEVEL, "alive to {} failed: {}", hb.controller, e),
    }
  }
  debug!(LOG_LEVEL, "heartbeat sender stopped");
}
