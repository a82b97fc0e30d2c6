use crate::controller::{NodeRegistry, LOG_LEVEL};
use crate::core::{now_millis, StopSignal};
use crate::{debug, error};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Every `period`, marks nodes not heard from for longer than `timeout` offline.
pub(crate) async fn liveness_checker(
  registry: NodeRegistry,
  period: Duration,
  timeout: Duration,
  mut stop: StopSignal,
) {
  let mut ticks = interval(period);
  ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let timeout = timeout.as_millis() as i64;
  loop {
    tokio::select! {
      _ = stop.stopped() => break,
      _ = ticks.tick() => {}
    }
    if let Err(e) = registry.sweep(now_millis(), timeout).await {
      error!(LOG_LEVEL, "liveness checker stopping: {}", e);
      break;
    }
  }
  debug!(LOG_LEVEL, "liveness checker stopped");
}
