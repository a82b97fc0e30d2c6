use crate::core::{
  now_millis, Channel, LineChannel, NodeRequest, Result, StopSignal, WireMessage,
};
use crate::node::{ComputeHistory, ComputeRecord, ResourceState, LOG_LEVEL};
use crate::{debug, trace, warn};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Accepts connections from peers and from the controller until stopped, serving each on its
/// own task.
pub(crate) async fn node_listener(
  listener: TcpListener,
  resources: Arc<ResourceState>,
  history: Arc<ComputeHistory>,
  mut stop: StopSignal,
) {
  loop {
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
    trace!(LOG_LEVEL, "connection from {}", peer);
    let resources = resources.clone();
    let history = history.clone();
    tokio::spawn(async move {
      if let Err(e) = serve(stream, &resources, &history).await {
        debug!(LOG_LEVEL, "connection from {} failed: {}", peer, e);
      }
    });
  }
  debug!(LOG_LEVEL, "node listener stopped");
}

/// Answers requests until the other side closes the connection.
async fn serve(stream: TcpStream, resources: &ResourceState, history: &ComputeHistory) -> Result<()> {
  let mut channel = LineChannel::new(stream);
  while let Some(line) = channel.receive_line().await? {
    match NodeRequest::decode(&line) {
      Some(NodeRequest::Share(value)) => {
        let reply = resources.offer(value);
        debug!(LOG_LEVEL, "share {}: {:?}", value, reply);
        channel.send_line(&reply.encode()).await?;
      }
      Some(NodeRequest::Commit(_)) => {
        let share = resources.commit();
        debug!(LOG_LEVEL, "committed share {}", share);
      }
      Some(NodeRequest::Rollback) => {
        let share = resources.rollback();
        debug!(LOG_LEVEL, "rolled back to share {}", share);
      }
      Some(NodeRequest::Compute(a, op, b)) => {
        let result = op.apply(a, b);
        history.push(ComputeRecord {
          timestamp: now_millis(),
          a: a,
          op: op,
          b: b,
          result: result,
        });
        channel.send_line(&result.to_string()).await?;
      }
      Some(NodeRequest::GetLogs) => {
        let records = history.all();
        debug!(LOG_LEVEL, "sending {} log records", records.len());
        for record in records {
          channel.send_line(&record.to_string()).await?;
        }
        return Ok(());
      }
      None => trace!(LOG_LEVEL, "dropping `{}`", line),
    }
  }
  Ok(())
}
