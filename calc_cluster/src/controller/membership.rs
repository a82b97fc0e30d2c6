use crate::controller::{NodeRegistry, LOG_LEVEL};
use crate::core::{now_millis, ControllerDatagram, StopSignal, WireMessage};
use crate::{debug, error, trace};
use tokio::net::UdpSocket;

const MAX_DATAGRAM: usize = 4096;

/// Receives `hello` and `alive` datagrams until stopped. A `hello` is answered with the current
/// snapshot, sent back to the address it came from. An `alive` refreshes or creates the record of
/// `(sender address, advertised port)`. Anything else is dropped.
pub(crate) async fn membership_listener(
  udp: UdpSocket,
  registry: NodeRegistry,
  rmax: u64,
  mut stop: StopSignal,
) {
  let mut buf = vec![0u8; MAX_DATAGRAM];
  loop {
    let (len, src) = tokio::select! {
      _ = stop.stopped() => break,
      res = udp.recv_from(&mut buf[..]) => match res {
        Ok(x) => x,
        Err(e) => {
          trace!(LOG_LEVEL, "membership receive failed: {}", e);
          continue;
        }
      }
    };
    let line = match std::str::from_utf8(&buf[..len]) {
      Ok(line) => line,
      Err(_) => {
        trace!(LOG_LEVEL, "dropping non-UTF-8 datagram from {}", src);
        continue;
      }
    };
    match ControllerDatagram::decode(line) {
      Some(ControllerDatagram::Hello) => {
        let snapshot = match registry.snapshot(rmax).await {
          Ok(s) => s,
          Err(e) => {
            error!(LOG_LEVEL, "membership listener stopping: {}", e);
            break;
          }
        };
        debug!(LOG_LEVEL, "hello from {}, {} peer(s) online", src, snapshot.peers.len());
        let reply = ControllerDatagram::from(snapshot).encode();
        if let Err(e) = udp.send_to(reply.as_bytes(), src).await {
          debug!(LOG_LEVEL, "could not answer {}: {}", src, e);
        }
      }
      Some(ControllerDatagram::Alive { tcp, operators }) => {
        trace!(LOG_LEVEL, "alive from {}:{}", src.ip(), tcp);
        registry.upsert(src.ip(), tcp, operators, now_millis());
      }
      Some(ControllerDatagram::Init(..)) | None => {
        trace!(LOG_LEVEL, "dropping `{}` from {}", line.trim(), src);
      }
    }
  }
  debug!(LOG_LEVEL, "membership listener stopped");
}
