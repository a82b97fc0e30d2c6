use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// The literal result of a division whose divisor is zero. It is a well-formed result, not a
/// transport or protocol error.
pub const DIVISION_BY_ZERO: &str = "Error: division by 0";

/// One of the four binary operators a compute node can support. The discriminant is the ASCII
/// byte used on the wire.
#[derive(
  Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
  IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum Operator {
  Add = 43,
  Sub = 45,
  Mul = 42,
  Div = 47,
}
impl Operator {
  pub const ALL: [Operator; 4] = [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div];

  pub fn from_char(c: char) -> Option<Operator> {
    if !c.is_ascii() {
      return None;
    }
    Operator::try_from(c as u8).ok()
  }

  pub fn as_char(self) -> char {
    u8::from(self) as char
  }

  /// Evaluates `a <op> b`. Arithmetic wraps on overflow and division truncates toward zero.
  pub fn apply(self, a: i64, b: i64) -> ComputeReply {
    match self {
      Operator::Add => ComputeReply::Value(a.wrapping_add(b)),
      Operator::Sub => ComputeReply::Value(a.wrapping_sub(b)),
      Operator::Mul => ComputeReply::Value(a.wrapping_mul(b)),
      Operator::Div if b == 0 => ComputeReply::DivisionByZero,
      Operator::Div => ComputeReply::Value(a.wrapping_div(b)),
    }
  }
}
impl fmt::Display for Operator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_char())
  }
}
impl FromStr for Operator {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
      (Some(c), None) => Operator::from_char(c).ok_or(()),
      _ => Err(()),
    }
  }
}

/// The operators supported by one node, written on the wire as a contiguous string such as
/// `+-*/`. Keeps first-seen order and ignores duplicates.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct OperatorSet(SmallVec<[Operator; 4]>);
impl OperatorSet {
  pub fn new() -> OperatorSet {
    OperatorSet(SmallVec::new())
  }

  pub fn all() -> OperatorSet {
    Operator::ALL.iter().copied().collect()
  }

  pub fn insert(&mut self, op: Operator) -> bool {
    if self.contains(op) {
      false
    } else {
      self.0.push(op);
      true
    }
  }

  pub fn contains(&self, op: Operator) -> bool {
    self.0.contains(&op)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = Operator> + '_ {
    self.0.iter().copied()
  }
}
impl std::iter::FromIterator<Operator> for OperatorSet {
  fn from_iter<I: IntoIterator<Item = Operator>>(iter: I) -> Self {
    let mut set = OperatorSet::new();
    for op in iter {
      set.insert(op);
    }
    set
  }
}
impl fmt::Display for OperatorSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for op in self.iter() {
      write!(f, "{}", op)?;
    }
    Ok(())
  }
}
impl FromStr for OperatorSet {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.is_empty() {
      return Err(());
    }
    s.chars().map(|c| Operator::from_char(c).ok_or(())).collect()
  }
}

/// What a node answers to a single sub-operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ComputeReply {
  Value(i64),
  DivisionByZero,
}
impl ComputeReply {
  /// The number of digits in the textual result, sign excluded. This is what usage is charged on.
  pub fn digits(&self) -> usize {
    match self {
      ComputeReply::Value(v) => v.unsigned_abs().to_string().len(),
      ComputeReply::DivisionByZero => 0,
    }
  }
}
impl fmt::Display for ComputeReply {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ComputeReply::Value(v) => write!(f, "{}", v),
      ComputeReply::DivisionByZero => write!(f, "{}", DIVISION_BY_ZERO),
    }
  }
}
impl FromStr for ComputeReply {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s == DIVISION_BY_ZERO {
      Ok(ComputeReply::DivisionByZero)
    } else {
      s.parse::<i64>().map(ComputeReply::Value).map_err(|_| ())
    }
  }
}

#[test]
fn operators_round_trip_through_their_wire_byte() {
  for op in Operator::ALL.iter() {
    assert_eq!(Operator::from_char(op.as_char()), Some(*op));
  }
  assert_eq!(Operator::from_char('%'), None);
  assert_eq!(Operator::from_char('×'), None);
  assert_eq!("+-".parse::<Operator>(), Err(()));
  assert_eq!(u8::from(Operator::Mul), b'*');
}

#[test]
fn apply_truncates_and_reports_division_by_zero() {
  assert_eq!(Operator::Div.apply(7, 2), ComputeReply::Value(3));
  assert_eq!(Operator::Div.apply(-7, 2), ComputeReply::Value(-3));
  assert_eq!(Operator::Div.apply(7, -2), ComputeReply::Value(-3));
  assert_eq!(Operator::Div.apply(10, 0), ComputeReply::DivisionByZero);
  assert_eq!(Operator::Sub.apply(2, 5), ComputeReply::Value(-3));
  assert_eq!(Operator::Div.apply(10, 0).to_string(), DIVISION_BY_ZERO);
}

#[test]
fn operator_set_parses_contiguous_strings() {
  let set = "*+*".parse::<OperatorSet>().unwrap();
  assert_eq!(set.to_string(), "*+");
  assert!(set.contains(Operator::Mul));
  assert!(!set.contains(Operator::Div));
  assert!("".parse::<OperatorSet>().is_err());
  assert!("+x".parse::<OperatorSet>().is_err());
}

#[test]
fn digits_exclude_the_sign() {
  assert_eq!(ComputeReply::Value(-42).digits(), 2);
  assert_eq!(ComputeReply::Value(0).digits(), 1);
  assert_eq!(ComputeReply::Value(12345).digits(), 5);
}
