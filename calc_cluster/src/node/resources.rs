use crate::core::ShareReply;
use parking_lot::Mutex;

/// A snapshot of a node's resource levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceLevels {
  /// The share adopted by the last successful commit. `0` before the first join.
  pub committed: u64,
  /// The share staged by an in-flight round. Equal to `committed` outside of a round.
  pub proposed: u64,
  /// The smallest share this node accepts.
  pub rmin: u64,
}

/// A node's resource levels, shared between the listener's connection tasks and the negotiator.
#[derive(Debug)]
pub struct ResourceState {
  levels: Mutex<ResourceLevels>,
}
impl ResourceState {
  pub fn new(rmin: u64) -> ResourceState {
    ResourceState {
      levels: Mutex::new(ResourceLevels {
        committed: 0,
        proposed: 0,
        rmin: rmin,
      }),
    }
  }

  pub fn levels(&self) -> ResourceLevels {
    *self.levels.lock()
  }

  pub fn committed(&self) -> u64 {
    self.levels.lock().committed
  }

  /// A peer's answer to `share value`: stage it and accept if it is at least `rmin`, otherwise
  /// reject without staging.
  pub fn offer(&self, value: u64) -> ShareReply {
    let mut levels = self.levels.lock();
    if value >= levels.rmin {
      levels.proposed = value;
      ShareReply::Accept
    } else {
      ShareReply::Reject
    }
  }

  pub fn stage(&self, value: u64) {
    self.levels.lock().proposed = value;
  }

  /// Promotes whatever was staged last.
  pub fn commit(&self) -> u64 {
    let mut levels = self.levels.lock();
    levels.committed = levels.proposed;
    levels.committed
  }

  /// Discards the staged value.
  pub fn rollback(&self) -> u64 {
    let mut levels = self.levels.lock();
    levels.proposed = levels.committed;
    levels.committed
  }
}

#[test]
fn offer_stages_only_acceptable_shares() {
  let state = ResourceState::new(100);
  assert_eq!(state.offer(99), ShareReply::Reject);
  assert_eq!(state.levels().proposed, 0);
  assert_eq!(state.offer(150), ShareReply::Accept);
  assert_eq!(state.levels().proposed, 150);
  assert_eq!(state.committed(), 0);
}

#[test]
fn commit_promotes_and_rollback_discards() {
  let state = ResourceState::new(0);
  state.stage(300);
  assert_eq!(state.commit(), 300);
  state.offer(150);
  assert_eq!(state.rollback(), 300);
  assert_eq!(
    state.levels(),
    ResourceLevels {
      committed: 300,
      proposed: 300,
      rmin: 0
    }
  );
  state.offer(150);
  assert_eq!(state.commit(), 150);
}
