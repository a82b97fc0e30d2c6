use crossbeam::channel::{unbounded, Receiver, Sender};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Identifies one registered callback: a random id and a free-form description of where the
/// notification ends up.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackHandle {
  pub id: u64,
  pub endpoint: String,
}

/// A user's balance fell below the threshold they were subscribed with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
  pub handle: CallbackHandle,
  pub user: String,
  pub threshold: i64,
}

/// Resolves a [`CallbackHandle`] and delivers a notification to it. Returns `false` if the handle
/// cannot be resolved or the endpoint is gone.
pub trait Notifier: Send + Sync + 'static {
  fn notify(&self, notification: Notification) -> bool;
}

/// Delivers notifications in-process over crossbeam channels, one channel per registered handle.
#[derive(Default)]
pub struct ChannelNotifier {
  endpoints: Mutex<HashMap<u64, Sender<Notification>>>,
}
impl ChannelNotifier {
  pub fn new() -> ChannelNotifier {
    ChannelNotifier::default()
  }

  pub fn register(&self, endpoint: impl Into<String>) -> (CallbackHandle, Receiver<Notification>) {
    let (tx, rx) = unbounded();
    let mut endpoints = self.endpoints.lock();
    let mut id = rand::random::<u64>();
    while endpoints.contains_key(&id) {
      id = rand::random::<u64>();
    }
    endpoints.insert(id, tx);
    let handle = CallbackHandle {
      id: id,
      endpoint: endpoint.into(),
    };
    (handle, rx)
  }

  pub fn unregister(&self, handle: &CallbackHandle) -> bool {
    self.endpoints.lock().remove(&handle.id).is_some()
  }
}
impl Notifier for ChannelNotifier {
  fn notify(&self, notification: Notification) -> bool {
    let endpoints = self.endpoints.lock();
    match endpoints.get(&notification.handle.id) {
      Some(tx) => tx.send(notification).is_ok(),
      None => false,
    }
  }
}

#[test]
fn notifications_reach_the_registered_endpoint_only() {
  let notifier = ChannelNotifier::new();
  let (admin, admin_rx) = notifier.register("admin");
  let (other, other_rx) = notifier.register("other");
  assert_ne!(admin.id, other.id);
  assert!(notifier.notify(Notification {
    handle: admin.clone(),
    user: "alice".to_string(),
    threshold: 50,
  }));
  assert_eq!(admin_rx.try_recv().unwrap().user, "alice");
  assert!(other_rx.try_recv().is_err());
  assert!(notifier.unregister(&admin));
  assert!(!notifier.notify(Notification {
    handle: admin,
    user: "alice".to_string(),
    threshold: 50,
  }));
}
