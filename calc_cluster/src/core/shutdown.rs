use tokio::sync::watch;

/// Owning half of a cooperative stop signal. Dropping it also counts as a stop.
#[derive(Debug)]
pub struct Stopper {
  tx: watch::Sender<bool>,
}
impl Stopper {
  pub fn stop(&self) {
    let _ = self.tx.send(true);
  }

  pub fn signal(&self) -> StopSignal {
    StopSignal {
      rx: self.tx.subscribe(),
    }
  }
}

/// Observing half, cloned into every loop that must stop with its owner.
#[derive(Clone, Debug)]
pub struct StopSignal {
  rx: watch::Receiver<bool>,
}
impl StopSignal {
  pub fn is_stopped(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once the owner has called [`Stopper::stop`] or dropped the [`Stopper`].
  pub async fn stopped(&mut self) {
    loop {
      if self.is_stopped() {
        return;
      }
      if self.rx.changed().await.is_err() {
        return;
      }
    }
  }
}

pub fn stop_pair() -> (Stopper, StopSignal) {
  let (tx, rx) = watch::channel(false);
  (Stopper { tx: tx }, StopSignal { rx: rx })
}

#[test]
fn stop_signal_resolves_on_stop_and_on_drop() {
  tokio_test::block_on(async {
    let (stopper, mut signal) = stop_pair();
    let mut second = stopper.signal();
    assert!(!signal.is_stopped());
    stopper.stop();
    signal.stopped().await;
    second.stopped().await;
    assert!(signal.is_stopped());

    let (stopper, mut signal) = stop_pair();
    drop(stopper);
    signal.stopped().await;
  });
}
