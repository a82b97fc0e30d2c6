use crate::core::{Operator, Tokens};
use itertools::Itertools;
use parking_lot::Mutex;
use std::fmt;

/// How often each operator appeared in `!compute` requests, valid or not. Shared by every client
/// session through an `Arc`.
#[derive(Debug, Default)]
pub struct Statistics {
  counts: Mutex<[u64; 4]>,
}
impl Statistics {
  pub fn new() -> Statistics {
    Statistics::default()
  }

  /// Counts the standalone operator tokens of `request` if it is a compute command.
  pub fn record(&self, request: &str) {
    let mut tokens = Tokens::new(request);
    if tokens.keyword() != Some("compute") {
      return;
    }
    let mut seen = [0u64; 4];
    while let Some(tok) = tokens.next() {
      if let Ok(op) = tok.parse::<Operator>() {
        seen[index(op)] += 1;
      }
    }
    let mut counts = self.counts.lock();
    for (count, n) in counts.iter_mut().zip(seen.iter()) {
      *count += n;
    }
  }

  pub fn get(&self, op: Operator) -> u64 {
    self.counts.lock()[index(op)]
  }

  /// Operators by descending occurrence; equal counts keep `+ - * /` order.
  pub fn sorted(&self) -> Vec<(Operator, u64)> {
    let counts = *self.counts.lock();
    Operator::ALL
      .iter()
      .map(|op| (*op, counts[index(*op)]))
      .sorted_by(|a, b| b.1.cmp(&a.1))
      .collect()
  }
}
impl fmt::Display for Statistics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let lines = self.sorted().into_iter().map(|(op, n)| format!("{} {}", op, n)).join("\n");
    write!(f, "{}", lines)
  }
}

fn index(op: Operator) -> usize {
  match op {
    Operator::Add => 0,
    Operator::Sub => 1,
    Operator::Mul => 2,
    Operator::Div => 3,
  }
}

#[test]
fn counts_operator_tokens_of_compute_requests() {
  let stats = Statistics::new();
  stats.record("!compute 1 + 2 * 3 + -4");
  stats.record("!compute 5 / 0");
  stats.record("!compute nonsense + +");
  stats.record("!credits");
  assert_eq!(stats.get(Operator::Add), 4);
  assert_eq!(stats.get(Operator::Sub), 0);
  assert_eq!(stats.get(Operator::Mul), 1);
  assert_eq!(stats.get(Operator::Div), 1);
  assert_eq!(
    stats.sorted(),
    vec![
      (Operator::Add, 4),
      (Operator::Mul, 1),
      (Operator::Div, 1),
      (Operator::Sub, 0)
    ]
  );
  assert_eq!(stats.to_string(), "+ 4\n* 1\n/ 1\n- 0");
}
