use crate::core::{Channel, ClusterError, LineChannel, NodeRequest, Result, ShareReply, WireMessage};
use crate::node::LOG_LEVEL;
use crate::{debug, trace};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Sends two-phase commit messages to one peer at a time, each over a fresh connection.
#[derive(Clone, Copy, Debug)]
pub struct PeerMessenger {
  share_timeout: Option<Duration>,
}
impl PeerMessenger {
  /// With `share_timeout` set, a peer that has not answered `share` in time fails with
  /// [`ClusterError::Timeout`]. Without it, [`PeerMessenger::share`] waits as long as the peer
  /// keeps the connection open.
  pub fn new(share_timeout: Option<Duration>) -> PeerMessenger {
    PeerMessenger {
      share_timeout: share_timeout,
    }
  }

  pub async fn share(&self, peer: SocketAddr, value: u64) -> Result<ShareReply> {
    let exchange = async {
      let mut channel = connect(peer).await?;
      channel.send_line(&NodeRequest::Share(value).encode()).await?;
      match channel.receive_line().await? {
        Some(line) => ShareReply::decode(&line)
          .ok_or_else(|| ClusterError::Protocol(format!("unexpected share reply `{}`", line))),
        None => Err(ClusterError::Channel(format!("{} closed before replying", peer))),
      }
    };
    let reply = match self.share_timeout {
      Some(dur) => timeout(dur, exchange).await.map_err(|_| ClusterError::Timeout(dur))?,
      None => exchange.await,
    };
    trace!(LOG_LEVEL, "share {} to {}: {:?}", value, peer, reply);
    reply
  }

  pub async fn commit(&self, peer: SocketAddr, value: u64) -> Result<()> {
    self.tell(peer, NodeRequest::Commit(value)).await
  }

  pub async fn rollback(&self, peer: SocketAddr) -> Result<()> {
    self.tell(peer, NodeRequest::Rollback).await
  }

  async fn tell(&self, peer: SocketAddr, request: NodeRequest) -> Result<()> {
    let mut channel = connect(peer).await?;
    channel.send_line(&request.encode()).await?;
    debug!(LOG_LEVEL, "sent `{}` to {}", request.encode(), peer);
    Ok(())
  }
}

async fn connect(peer: SocketAddr) -> Result<LineChannel> {
  Ok(LineChannel::new(TcpStream::connect(peer).await?))
}
