use crate::core::{ComputeReply, Operator};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// One sub-operation evaluated by this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputeRecord {
  pub timestamp: i64,
  pub a: i64,
  pub op: Operator,
  pub b: i64,
  pub result: ComputeReply,
}
impl fmt::Display for ComputeRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {} {} = {}", self.timestamp, self.a, self.op, self.b, self.result)
  }
}

/// Reads back the line written by `Display`: `<timestamp> <a> <op> <b> = <result>`.
impl FromStr for ComputeRecord {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.trim().splitn(6, ' ');
    let mut next = || parts.next().ok_or(());
    let timestamp = next()?.parse::<i64>().map_err(|_| ())?;
    let a = next()?.parse::<i64>().map_err(|_| ())?;
    let op = next()?.parse::<Operator>()?;
    let b = next()?.parse::<i64>().map_err(|_| ())?;
    if next()? != "=" {
      return Err(());
    }
    let result = next()?.parse::<ComputeReply>()?;
    Ok(ComputeRecord {
      timestamp: timestamp,
      a: a,
      op: op,
      b: b,
      result: result,
    })
  }
}

/// The most recent evaluations, oldest dropped first once `capacity` is reached.
#[derive(Debug)]
pub struct ComputeHistory {
  capacity: usize,
  entries: Mutex<VecDeque<ComputeRecord>>,
}
impl ComputeHistory {
  pub fn new(capacity: usize) -> ComputeHistory {
    ComputeHistory {
      capacity: capacity,
      entries: Mutex::new(VecDeque::with_capacity(capacity)),
    }
  }

  pub fn push(&self, record: ComputeRecord) {
    let mut entries = self.entries.lock();
    if entries.len() == self.capacity {
      entries.pop_front();
    }
    entries.push_back(record);
  }

  /// The latest `n` records, oldest first.
  pub fn latest(&self, n: usize) -> Vec<ComputeRecord> {
    let entries = self.entries.lock();
    let skip = entries.len().saturating_sub(n);
    entries.iter().skip(skip).cloned().collect()
  }

  /// Every record still held, oldest first.
  pub fn all(&self) -> Vec<ComputeRecord> {
    self.entries.lock().iter().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
fn record(a: i64) -> ComputeRecord {
  ComputeRecord {
    timestamp: a,
    a: a,
    op: Operator::Add,
    b: 1,
    result: ComputeReply::Value(a + 1),
  }
}

#[test]
fn history_keeps_the_latest_entries() {
  let history = ComputeHistory::new(3);
  assert!(history.is_empty());
  for a in 0..5 {
    history.push(record(a));
  }
  assert_eq!(history.len(), 3);
  let latest = history.latest(2);
  assert_eq!(latest, vec![record(3), record(4)]);
  assert_eq!(history.latest(10).len(), 3);
  assert_eq!(record(3).to_string(), "3 3 + 1 = 4");
}

#[test]
fn records_read_back_from_their_line() {
  let div = ComputeRecord {
    timestamp: 17,
    a: -7,
    op: Operator::Div,
    b: 0,
    result: ComputeReply::DivisionByZero,
  };
  assert_eq!(div.to_string(), "17 -7 / 0 = Error: division by 0");
  assert_eq!(div.to_string().parse::<ComputeRecord>(), Ok(div));
  assert_eq!("3 3 + 1 = 4".parse::<ComputeRecord>(), Ok(record(3)));
  assert!("3 3 + 1 4".parse::<ComputeRecord>().is_err());
  assert!("3 3 % 1 = 4".parse::<ComputeRecord>().is_err());
  assert!("3 3 +".parse::<ComputeRecord>().is_err());
}
