use crate::core::LOG_LEVEL;
use crate::trace;
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Out-of-band instructions for an actor, delivered through the same mailbox as its messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActorSignal {
  /// Finish the current message, run `post_stop` and exit.
  Term,
}

/// What actually travels through an actor's mailbox.
pub enum LocalActorMsg<T> {
  Msg(T),
  Signal(ActorSignal),
}

/// A piece of state owned by exactly one task. All reads and writes arrive as messages and are
/// handled one at a time, so the state itself needs no locking.
#[async_trait]
pub trait Actor<Msg: Send + 'static>: Send + 'static {
  async fn pre_start(&mut self, _: &ActorContext<Msg>) {}
  async fn recv(&mut self, ctx: &ActorContext<Msg>, msg: Msg);
  async fn post_stop(&mut self, _: &ActorContext<Msg>) {}
}

pub struct ActorContext<Msg> {
  pub name: String,
  _msg: PhantomData<fn(Msg)>,
}

/// Cloneable address of a local actor. Sending returns `false` once the actor has stopped.
pub struct LocalRef<T> {
  func: Arc<dyn Fn(LocalActorMsg<T>) -> bool + Send + Sync>,
}
impl<T> Clone for LocalRef<T> {
  fn clone(&self) -> Self {
    LocalRef {
      func: self.func.clone(),
    }
  }
}
impl<T: Send + 'static> LocalRef<T> {
  fn from_sender(sender: UnboundedSender<LocalActorMsg<T>>) -> Self {
    LocalRef {
      func: Arc::new(move |x| sender.send(x).is_ok()),
    }
  }

  pub fn send(&self, item: T) -> bool {
    (&self.func)(LocalActorMsg::Msg(item))
  }

  pub fn signal(&self, sig: ActorSignal) -> bool {
    (&self.func)(LocalActorMsg::Signal(sig))
  }

  /// Sends a request carrying a reply slot and waits for the answer. `None` means the actor is
  /// gone or dropped the reply slot.
  pub async fn ask<R: Send>(&self, make: impl FnOnce(oneshot::Sender<R>) -> T) -> Option<R> {
    let (tx, rx) = oneshot::channel();
    if !self.send(make(tx)) {
      return None;
    }
    rx.await.ok()
  }
}
impl<T> fmt::Debug for LocalRef<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LocalRef")
      .field("Msg", &std::any::type_name::<T>())
      .finish()
  }
}

/// Starts `actor` on the current tokio runtime. Must be called from within a runtime context.
pub fn spawn<Msg, A>(actor: A, name: impl Into<String>) -> (LocalRef<Msg>, JoinHandle<()>)
where
  Msg: Send + 'static,
  A: Actor<Msg>,
{
  let (tx, rx) = unbounded_channel::<LocalActorMsg<Msg>>();
  let ctx = ActorContext {
    name: name.into(),
    _msg: PhantomData,
  };
  let handle = tokio::spawn(run_single(actor, ctx, rx));
  (LocalRef::from_sender(tx), handle)
}

async fn run_single<Msg, A>(
  mut actor: A,
  ctx: ActorContext<Msg>,
  mut rx: UnboundedReceiver<LocalActorMsg<Msg>>,
) where
  Msg: Send + 'static,
  A: Actor<Msg>,
{
  actor.pre_start(&ctx).await;
  trace!(LOG_LEVEL, "actor {} started", ctx.name);
  while let Some(msg) = rx.recv().await {
    match msg {
      LocalActorMsg::Msg(m) => actor.recv(&ctx, m).await,
      LocalActorMsg::Signal(ActorSignal::Term) => break,
    }
  }
  actor.post_stop(&ctx).await;
  trace!(LOG_LEVEL, "actor {} stopped", ctx.name);
}

#[cfg(test)]
struct Counter {
  total: u64,
}
#[cfg(test)]
enum CounterMsg {
  Add(u64),
  Get(oneshot::Sender<u64>),
}
#[cfg(test)]
#[async_trait]
impl Actor<CounterMsg> for Counter {
  async fn recv(&mut self, _: &ActorContext<CounterMsg>, msg: CounterMsg) {
    match msg {
      CounterMsg::Add(n) => self.total += n,
      CounterMsg::Get(reply) => {
        let _ = reply.send(self.total);
      }
    }
  }
}

#[test]
fn actor_processes_in_order_and_terminates() {
  tokio_test::block_on(async {
    let (counter, handle) = spawn(Counter { total: 0 }, "counter");
    for n in 1..=10 {
      assert!(counter.send(CounterMsg::Add(n)));
    }
    assert_eq!(counter.ask(CounterMsg::Get).await, Some(55));
    counter.signal(ActorSignal::Term);
    handle.await.unwrap();
    assert!(!counter.send(CounterMsg::Add(1)));
    assert_eq!(counter.ask(CounterMsg::Get).await, None);
  });
}
