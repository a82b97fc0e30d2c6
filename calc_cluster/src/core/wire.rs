use crate as calc_cluster;
use crate::core::{Operator, OperatorSet};
use crate::WireMessage;
use std::iter::Peekable;
use std::net::SocketAddr;
use std::str::SplitWhitespace;

/// A protocol message with a line-oriented text form: a keyword followed by whitespace separated
/// fields. Usually derived with `#[derive(WireMessage)]`.
pub trait WireMessage: Sized {
  /// Every keyword this type can decode, in declaration order.
  const KEYWORDS: &'static [&'static str];

  fn encode(&self) -> String;

  /// Returns `None` for an unknown keyword, an unparsable field or a wrong token count.
  fn decode(line: &str) -> Option<Self>;
}

/// One field of a [`WireMessage`].
pub trait WireField: Sized {
  /// Appends a separating space and the token(s) of this field.
  fn put(&self, out: &mut String);
  fn take(tokens: &mut Tokens<'_>) -> Option<Self>;
}

/// Cursor over the whitespace separated tokens of one line.
#[derive(Clone, Debug)]
pub struct Tokens<'a> {
  iter: Peekable<SplitWhitespace<'a>>,
}
impl<'a> Tokens<'a> {
  pub fn new(line: &'a str) -> Tokens<'a> {
    Tokens {
      iter: line.split_whitespace().peekable(),
    }
  }

  /// The first token with one leading `!` removed, so `!hello` and `hello` decode alike.
  pub fn keyword(&mut self) -> Option<&'a str> {
    self.iter.next().map(|k| k.strip_prefix('!').unwrap_or(k))
  }

  pub fn next(&mut self) -> Option<&'a str> {
    self.iter.next()
  }

  pub fn peek(&mut self) -> Option<&'a str> {
    self.iter.peek().copied()
  }

  pub fn is_empty(&mut self) -> bool {
    self.iter.peek().is_none()
  }

  /// The number of tokens not consumed yet.
  pub fn remaining(&self) -> usize {
    self.iter.clone().count()
  }

  /// Parses the next token with [`std::str::FromStr`], consuming it only on success.
  pub fn parse<T: std::str::FromStr>(&mut self) -> Option<T> {
    let value = self.peek()?.parse::<T>().ok()?;
    self.iter.next();
    Some(value)
  }
}

macro_rules! wire_field_from_str {
  ($($t:ty),*) => {
    $(
      impl WireField for $t {
        fn put(&self, out: &mut String) {
          out.push(' ');
          out.push_str(&self.to_string());
        }

        fn take(tokens: &mut Tokens<'_>) -> Option<Self> {
          tokens.parse::<$t>()
        }
      }
    )*
  };
}
wire_field_from_str!(u16, u32, u64, i64, SocketAddr, Operator, OperatorSet, String);

/// Greedy: takes fields for as long as the next token parses as `T`.
impl<T: WireField> WireField for Vec<T> {
  fn put(&self, out: &mut String) {
    for item in self {
      item.put(out);
    }
  }

  fn take(tokens: &mut Tokens<'_>) -> Option<Self> {
    let mut items = Vec::new();
    loop {
      let mut ahead = tokens.clone();
      match T::take(&mut ahead) {
        Some(item) => {
          items.push(item);
          *tokens = ahead;
        }
        None => return Some(items),
      }
    }
  }
}

/// Datagrams exchanged between a node and the controller's membership listener.
#[derive(Clone, Debug, Eq, PartialEq, WireMessage)]
pub enum ControllerDatagram {
  /// A node asks for the current membership.
  Hello,
  /// The online peers' stream endpoints followed by the resource ceiling.
  Init(Vec<SocketAddr>, u64),
  /// Liveness of the node whose stream listener is on `tcp` of the sender's address.
  Alive { tcp: u16, operators: OperatorSet },
}

/// The membership reply to a `hello`: every online node's stream endpoint and the ceiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSnapshot {
  pub peers: Vec<SocketAddr>,
  pub rmax: u64,
}
impl ClusterSnapshot {
  pub fn from_datagram(datagram: ControllerDatagram) -> Option<ClusterSnapshot> {
    match datagram {
      ControllerDatagram::Init(peers, rmax) => Some(ClusterSnapshot {
        peers: peers,
        rmax: rmax,
      }),
      _ => None,
    }
  }

  /// The equal share of a node joining this cluster: the ceiling divided by the online peers
  /// plus the joiner, rounded down.
  pub fn proposed_share(&self) -> u64 {
    self.rmax / (self.peers.len() as u64 + 1)
  }
}
impl From<ClusterSnapshot> for ControllerDatagram {
  fn from(snapshot: ClusterSnapshot) -> Self {
    ControllerDatagram::Init(snapshot.peers, snapshot.rmax)
  }
}

/// Requests accepted by a node's stream listener.
#[derive(Clone, Debug, Eq, PartialEq, WireMessage)]
pub enum NodeRequest {
  Share(u64),
  Commit(u64),
  Rollback,
  Compute(i64, Operator, i64),
  /// Answered with every record of the node's compute history, one per line, after which the
  /// node closes the connection.
  GetLogs,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, WireMessage)]
pub enum ShareReply {
  #[wire("ok")]
  Accept,
  #[wire("nok")]
  Reject,
}

#[test]
fn datagrams_use_the_documented_layout() {
  let peers = vec![
    "10.0.0.1:7000".parse::<SocketAddr>().unwrap(),
    "10.0.0.2:7001".parse::<SocketAddr>().unwrap(),
  ];
  let init = ControllerDatagram::Init(peers.clone(), 300);
  assert_eq!(init.encode(), "init 10.0.0.1:7000 10.0.0.2:7001 300");
  assert_eq!(ControllerDatagram::decode("init 10.0.0.1:7000 10.0.0.2:7001 300"), Some(init));
  assert_eq!(
    ControllerDatagram::decode("init 300"),
    Some(ControllerDatagram::Init(vec![], 300))
  );
  let alive = ControllerDatagram::Alive {
    tcp: 7000,
    operators: "+-*/".parse().unwrap(),
  };
  assert_eq!(alive.encode(), "alive 7000 +-*/");
  assert_eq!(ControllerDatagram::decode("!alive 7000 +-*/"), Some(alive));
  assert_eq!(ControllerDatagram::Hello.encode(), "hello");
  assert_eq!(ControllerDatagram::KEYWORDS, &["hello", "init", "alive"]);
}

#[test]
fn malformed_lines_do_not_decode() {
  assert_eq!(ControllerDatagram::decode(""), None);
  assert_eq!(ControllerDatagram::decode("hello there"), None);
  assert_eq!(ControllerDatagram::decode("alive 7000"), None);
  assert_eq!(ControllerDatagram::decode("alive port +"), None);
  assert_eq!(ControllerDatagram::decode("alive 7000 +%"), None);
  assert_eq!(ControllerDatagram::decode("init 10.0.0.1:7000"), None);
  assert_eq!(ControllerDatagram::decode("goodbye"), None);
  assert_eq!(NodeRequest::decode("share"), None);
  assert_eq!(NodeRequest::decode("rollback now"), None);
}

#[test]
fn equal_share_counts_the_joiner() {
  let peers = vec![
    "10.0.0.1:7000".parse::<SocketAddr>().unwrap(),
    "10.0.0.2:7000".parse::<SocketAddr>().unwrap(),
  ];
  let snapshot = ClusterSnapshot::from_datagram(ControllerDatagram::Init(peers, 300)).unwrap();
  assert_eq!(snapshot.proposed_share(), 100);
  let alone = ClusterSnapshot::from_datagram(ControllerDatagram::Init(vec![], 300)).unwrap();
  assert_eq!(alone.proposed_share(), 300);
  assert_eq!(ClusterSnapshot::from_datagram(ControllerDatagram::Hello), None);
}

#[test]
fn node_requests_and_replies() {
  assert_eq!(NodeRequest::Share(100).encode(), "share 100");
  assert_eq!(NodeRequest::decode("commit 100"), Some(NodeRequest::Commit(100)));
  assert_eq!(NodeRequest::decode("rollback"), Some(NodeRequest::Rollback));
  assert_eq!(
    NodeRequest::decode("compute -7 / 2"),
    Some(NodeRequest::Compute(-7, Operator::Div, 2))
  );
  assert_eq!(NodeRequest::GetLogs.encode(), "getlogs");
  assert_eq!(NodeRequest::decode("!getlogs"), Some(NodeRequest::GetLogs));
  assert_eq!(ShareReply::Accept.encode(), "ok");
  assert_eq!(ShareReply::decode("nok"), Some(ShareReply::Reject));
  assert_eq!(ShareReply::decode("maybe"), None);
}
