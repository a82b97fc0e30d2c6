use crate::controller::LOG_LEVEL;
use crate::core::{Channel, ClusterError, LineChannel, NodeRequest, Result, WireMessage};
use crate::node::ComputeRecord;
use crate::{debug, warn};
use std::fmt;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// One sub-operation evaluated by `node`, as collected by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeLog {
  pub node: SocketAddr,
  pub record: ComputeRecord,
}
impl fmt::Display for NodeLog {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let r = &self.record;
    write!(f, "{} [{}]: {} {} {} = {}", r.timestamp, self.node, r.a, r.op, r.b, r.result)
  }
}

/// Sends `getlogs` over a fresh connection and reads records until the node closes it.
pub async fn fetch_logs(node: SocketAddr) -> Result<Vec<ComputeRecord>> {
  let mut channel = LineChannel::new(TcpStream::connect(node).await?);
  channel.send_line(&NodeRequest::GetLogs.encode()).await?;
  let mut records = Vec::new();
  while let Some(line) = channel.receive_line().await? {
    let record = line
      .parse::<ComputeRecord>()
      .map_err(|_| ClusterError::Protocol(format!("unexpected log record `{}`", line)))?;
    records.push(record);
  }
  debug!(LOG_LEVEL, "{} log records from {}", records.len(), node);
  Ok(records)
}

/// Asks every node concurrently and merges the answers oldest first. A node that cannot be
/// reached, or answers garbage, contributes nothing.
pub async fn collect_logs(nodes: Vec<SocketAddr>) -> Vec<NodeLog> {
  let tasks = nodes
    .into_iter()
    .map(|node| (node, tokio::spawn(fetch_logs(node))))
    .collect::<Vec<_>>();
  let mut logs = Vec::new();
  for (node, task) in tasks {
    match task.await {
      Ok(Ok(records)) => {
        logs.extend(records.into_iter().map(|record| NodeLog {
          node: node,
          record: record,
        }));
      }
      Ok(Err(e)) => warn!(LOG_LEVEL, "could not collect logs from {}: {}", node, e),
      Err(e) => warn!(LOG_LEVEL, "log collection from {} panicked: {}", node, e),
    }
  }
  logs.sort_by_key(|log| log.record.timestamp);
  logs
}

#[test]
fn collected_records_name_their_node() {
  use crate::core::{ComputeReply, Operator};
  let log = NodeLog {
    node: "10.0.0.1:7000".parse().unwrap(),
    record: ComputeRecord {
      timestamp: 1500,
      a: 2,
      op: Operator::Add,
      b: 3,
      result: ComputeReply::Value(5),
    },
  };
  assert_eq!(log.to_string(), "1500 [10.0.0.1:7000]: 2 + 3 = 5");
}

#[test]
fn unreachable_nodes_contribute_nothing() {
  tokio_test::block_on(async {
    let gone = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap()
    };
    assert!(collect_logs(vec![gone]).await.is_empty());
    assert!(collect_logs(vec![]).await.is_empty());
  });
}
