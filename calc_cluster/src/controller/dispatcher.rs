use crate::controller::{Accounts, NodeRegistry, LOG_LEVEL};
use crate::core::{
  Channel, ClusterError, ComputeReply, LineChannel, NodeRequest, Operator, Result, Tokens,
  WireMessage,
};
use crate::{debug, trace, warn};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpStream;

/// Credits charged per sub-operation, and usage added per digit of a result.
pub const COST_PER_OPERATION: i64 = 50;

pub const NO_NODES: &str = "No nodes available for at least one operation.";
pub const NOT_ENOUGH_CREDITS: &str = "You don't have enough credits to perform this operation.";

/// Carries one sub-operation to one node and brings back its answer.
#[async_trait]
pub trait NodeLink: Send + Sync + 'static {
  async fn compute(&self, node: SocketAddr, a: i64, op: Operator, b: i64) -> Result<ComputeReply>;
}

/// Opens a fresh connection for every sub-operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpNodeLink;
#[async_trait]
impl NodeLink for TcpNodeLink {
  async fn compute(&self, node: SocketAddr, a: i64, op: Operator, b: i64) -> Result<ComputeReply> {
    let mut channel = LineChannel::new(TcpStream::connect(node).await?);
    channel.send_line(&NodeRequest::Compute(a, op, b).encode()).await?;
    match channel.receive_line().await? {
      Some(line) => line
        .parse::<ComputeReply>()
        .map_err(|_| ClusterError::Protocol(format!("unexpected compute reply `{}`", line))),
      None => Err(ClusterError::Channel(format!("{} closed before replying", node))),
    }
  }
}

/// `operand (operator operand)*`, evaluated strictly left to right.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
  pub first: i64,
  pub steps: Vec<(Operator, i64)>,
}
impl Expression {
  pub fn sub_operations(&self) -> usize {
    self.steps.len()
  }

  pub fn parse_tokens(tokens: &mut Tokens<'_>) -> Option<Expression> {
    let first = tokens.parse::<i64>()?;
    let mut steps = Vec::new();
    while !tokens.is_empty() {
      let op = tokens.parse::<Operator>()?;
      let operand = tokens.parse::<i64>()?;
      steps.push((op, operand));
    }
    Some(Expression {
      first: first,
      steps: steps,
    })
  }
}
impl FromStr for Expression {
  type Err = ();

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Expression::parse_tokens(&mut Tokens::new(s)).ok_or(())
  }
}
impl fmt::Display for Expression {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.first)?;
    for (op, operand) in &self.steps {
      write!(f, " {} {}", op, operand)?;
    }
    Ok(())
  }
}

/// The outcome of one fold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
  /// The final value, `Error: division by 0`, or the no-nodes message.
  pub result: String,
  /// Sub-operations handed to a node, whether it answered or failed. Only these are charged.
  pub attempted: u64,
}

/// Folds expressions over the cluster and bills the requesting user.
pub struct Dispatcher {
  registry: NodeRegistry,
  accounts: Accounts,
  link: Arc<dyn NodeLink>,
}
impl Dispatcher {
  pub fn new(registry: NodeRegistry, accounts: Accounts, link: Arc<dyn NodeLink>) -> Dispatcher {
    Dispatcher {
      registry: registry,
      accounts: accounts,
      link: link,
    }
  }

  /// Dispatches every sub-operation to the least-used capable node, one at a time. Stops at the
  /// first division by zero, the first operator nobody supports or the first node that cannot be
  /// reached. An unreachable node is marked offline and the sub-operation is not retried, but it
  /// still counts as attempted.
  pub async fn evaluate(&self, expr: &Expression) -> Result<Evaluation> {
    let mut acc = expr.first;
    let mut attempted = 0;
    for (op, operand) in expr.steps.iter().copied() {
      let node = match self.registry.pick_node(op).await? {
        Some(node) => node,
        None => {
          debug!(LOG_LEVEL, "no node supports {}", op);
          return Ok(Evaluation {
            result: NO_NODES.to_string(),
            attempted: attempted,
          });
        }
      };
      trace!(LOG_LEVEL, "dispatching {} {} {} to {}", acc, op, operand, node);
      match self.link.compute(node, acc, op, operand).await {
        Ok(ComputeReply::Value(v)) => {
          attempted += 1;
          let usage = COST_PER_OPERATION as u64 * ComputeReply::Value(v).digits() as u64;
          self.registry.add_usage(node, usage);
          acc = v;
        }
        Ok(reply @ ComputeReply::DivisionByZero) => {
          attempted += 1;
          return Ok(Evaluation {
            result: reply.to_string(),
            attempted: attempted,
          });
        }
        Err(e) => {
          attempted += 1;
          warn!(LOG_LEVEL, "node {} failed: {}", node, e);
          self.registry.mark_offline(node);
          return Ok(Evaluation {
            result: NO_NODES.to_string(),
            attempted: attempted,
          });
        }
      }
    }
    Ok(Evaluation {
      result: acc.to_string(),
      attempted: attempted,
    })
  }

  /// Admission check, fold and charge for one `!compute` of `user`. Returns the text sent back to
  /// the client.
  pub async fn compute(&self, user: &str, expr: &Expression) -> Result<String> {
    let credits = self.accounts.credits(user).await?.unwrap_or(0);
    if credits < COST_PER_OPERATION * expr.sub_operations() as i64 {
      return Ok(NOT_ENOUGH_CREDITS.to_string());
    }
    let eval = self.evaluate(expr).await?;
    if eval.attempted > 0 {
      self.accounts.adjust(user, -COST_PER_OPERATION * eval.attempted as i64).await?;
    }
    Ok(eval.result)
  }
}

#[test]
fn expressions_parse_strictly() {
  let expr = "2 + 3 * -4".parse::<Expression>().unwrap();
  assert_eq!(expr.first, 2);
  assert_eq!(expr.steps, vec![(Operator::Add, 3), (Operator::Mul, -4)]);
  assert_eq!(expr.sub_operations(), 2);
  assert_eq!(expr.to_string(), "2 + 3 * -4");
  assert_eq!("7".parse::<Expression>().unwrap().sub_operations(), 0);
  assert!("".parse::<Expression>().is_err());
  assert!("2 +".parse::<Expression>().is_err());
  assert!("2 + x".parse::<Expression>().is_err());
  assert!("2 % 3".parse::<Expression>().is_err());
  assert!("+ 2 3".parse::<Expression>().is_err());
}
