use crate::controller::{ClientSession, SessionServices, LOG_LEVEL};
use crate::core::{LineChannel, MeteredChannel, StopSignal};
use crate::{debug, trace, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// Accepts client connections until stopped, running one [`ClientSession`] task per
/// connection. At most `max_sessions` sessions run at once; further connections wait in the
/// accept backlog.
pub(crate) async fn client_listener(
  listener: TcpListener,
  services: SessionServices,
  max_sessions: usize,
  mut stop: StopSignal,
) {
  let permits = Arc::new(Semaphore::new(max_sessions));
  loop {
    let permit = tokio::select! {
      _ = stop.stopped() => break,
      permit = permits.clone().acquire_owned() => match permit {
        Ok(p) => p,
        Err(_) => break,
      }
    };
    let (stream, peer) = tokio::select! {
      _ = stop.stopped() => break,
      res = listener.accept() => match res {
        Ok(x) => x,
        Err(e) => {
          warn!(LOG_LEVEL, "accept failed: {}", e);
          continue;
        }
      }
    };
    trace!(LOG_LEVEL, "client connected from {}", peer);
    let channel = MeteredChannel::new(LineChannel::new(stream));
    let mut session = ClientSession::new(channel, services.clone());
    let session_stop = stop.clone();
    tokio::spawn(async move {
      if let Err(e) = session.run(session_stop).await {
        debug!(LOG_LEVEL, "session with {} failed: {}", peer, e);
      }
      let channel = session.into_channel();
      trace!(
        LOG_LEVEL,
        "session with {} closed, {} bytes in, {} bytes out",
        peer,
        channel.bytes_received(),
        channel.bytes_sent()
      );
      drop(permit);
    });
  }
  debug!(LOG_LEVEL, "client listener stopped");
}
