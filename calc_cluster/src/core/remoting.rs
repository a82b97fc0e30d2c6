use crate::core::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tokio::net::lookup_host;

/// The DNS name or IP address of a machine taking part in the cluster.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub enum Host {
  DNS(String),
  IP(IpAddr),
}
impl From<String> for Host {
  fn from(s: String) -> Self {
    match IpAddr::from_str(s.as_str()) {
      Ok(ip) => Host::IP(ip),
      Err(_) => Host::DNS(s),
    }
  }
}
impl From<&str> for Host {
  fn from(s: &str) -> Self {
    Host::from(s.to_string())
  }
}

/// Where a process can be reached: one host with a UDP port and a TCP port. A port of `0` means
/// the process does not listen on that transport (or, when binding, "pick any").
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, Ord, PartialOrd)]
pub struct Socket {
  /// The DNS name or IP address of the machine.
  pub host: Host,
  /// The port datagrams are received on.
  pub udp: u16,
  /// The port stream connections are accepted on.
  pub tcp: u16,
}
impl Socket {
  pub fn new(host: Host, udp: u16, tcp: u16) -> Socket {
    Socket {
      host: host,
      udp: udp,
      tcp: tcp,
    }
  }

  pub fn localhost(udp: u16, tcp: u16) -> Socket {
    Socket::new(Host::IP(IpAddr::V4(Ipv4Addr::LOCALHOST)), udp, tcp)
  }

  /// Resolves the UDP side of this [`Socket`]. If the [`Host`] is a DNS name, this performs a
  /// lookup and keeps IPv4 results only.
  pub async fn as_udp_addr(&self) -> std::io::Result<Vec<SocketAddr>> {
    self.resolve(self.udp).await
  }

  /// Resolves the TCP side of this [`Socket`], see [`Socket::as_udp_addr`].
  pub async fn as_tcp_addr(&self) -> std::io::Result<Vec<SocketAddr>> {
    self.resolve(self.tcp).await
  }

  pub async fn udp_addr(&self) -> Result<SocketAddr> {
    first(self, self.as_udp_addr().await?)
  }

  pub async fn tcp_addr(&self) -> Result<SocketAddr> {
    first(self, self.as_tcp_addr().await?)
  }

  async fn resolve(&self, port: u16) -> std::io::Result<Vec<SocketAddr>> {
    match &self.host {
      Host::IP(ip) => Ok(vec![SocketAddr::new(*ip, port)]),
      Host::DNS(s) => {
        lookup_host((s.as_str(), port)).await.map(|x| x.filter(|a| a.is_ipv4()).collect())
      }
    }
  }
}
impl fmt::Display for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.host {
      Host::DNS(s) => write!(f, "DNS({}):{}|{}", s, self.udp, self.tcp),
      Host::IP(ip) => write!(f, "IP({}):{}|{}", ip, self.udp, self.tcp),
    }
  }
}
impl Default for Socket {
  fn default() -> Self {
    Self {
      host: Host::IP(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
      udp: 0,
      tcp: 0,
    }
  }
}

fn first(socket: &Socket, addrs: Vec<SocketAddr>) -> Result<SocketAddr> {
  addrs.into_iter().next().ok_or_else(|| {
    ClusterError::Io(std::io::Error::new(
      std::io::ErrorKind::NotFound,
      format!("No resolution for {}", socket),
    ))
  })
}

#[test]
fn host_from_string_distinguishes_ips() {
  assert_eq!(Host::from("127.0.0.1"), Host::IP(IpAddr::V4(Ipv4Addr::LOCALHOST)));
  assert_eq!(Host::from("localhost"), Host::DNS("localhost".to_string()));
}

#[test]
fn ip_socket_resolves_without_lookup() {
  let socket = Socket::localhost(4000, 4001);
  let udp = tokio_test::block_on(socket.udp_addr()).unwrap();
  let tcp = tokio_test::block_on(socket.tcp_addr()).unwrap();
  assert_eq!(udp, "127.0.0.1:4000".parse::<SocketAddr>().unwrap());
  assert_eq!(tcp, "127.0.0.1:4001".parse::<SocketAddr>().unwrap());
}
