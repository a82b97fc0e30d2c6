use crate::controller::{CallbackHandle, Notification, Notifier, UserConfig, LOG_LEVEL};
use crate::core::{spawn, Actor, ActorContext, ActorSignal, ClusterError, LocalRef, Result};
use crate::{debug, info, warn};
use async_trait::async_trait;
use linked_hash_map::LinkedHashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use AccountsMsg::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
  LoggedIn,
  AlreadyLoggedIn,
  WrongCredentials,
}
impl LoginOutcome {
  pub fn message(&self) -> &'static str {
    match self {
      LoginOutcome::LoggedIn => "Successfully logged in.",
      LoginOutcome::AlreadyLoggedIn => "You are already logged in!",
      LoginOutcome::WrongCredentials => "Wrong username or password.",
    }
  }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
  #[error("the threshold must be at least 1")]
  ThresholdBelowOne,
  #[error("user {0} already has an active subscription")]
  AlreadySubscribed(String),
  #[error("no user named {0}")]
  UnknownUser(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
  pub handle: CallbackHandle,
  pub threshold: i64,
}

/// Listing entry for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserView {
  pub name: String,
  pub online: bool,
  pub credits: i64,
}
impl fmt::Display for UserView {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let status = if self.online { "online" } else { "offline" };
    write!(f, "{} {} Credits: {}", self.name, status, self.credits)
  }
}

struct Account {
  password: String,
  credits: i64,
  online: bool,
  subscription: Option<Subscription>,
}

pub(crate) enum AccountsMsg {
  Login(String, String, oneshot::Sender<LoginOutcome>),
  Logout(String),
  Credits(String, oneshot::Sender<Option<i64>>),
  Adjust(String, i64, oneshot::Sender<Option<i64>>),
  Subscribe(
    String,
    i64,
    CallbackHandle,
    oneshot::Sender<std::result::Result<(), SubscribeError>>,
  ),
  Users(oneshot::Sender<Vec<UserView>>),
}

struct AccountsActor {
  accounts: LinkedHashMap<String, Account>,
  notifier: Arc<dyn Notifier>,
}
impl AccountsActor {
  fn adjust(&mut self, name: &str, delta: i64) -> Option<i64> {
    let account = self.accounts.get_mut(name)?;
    account.credits = account.credits.saturating_add(delta);
    let credits = account.credits;
    let fire = match &account.subscription {
      Some(sub) => credits < sub.threshold,
      None => false,
    };
    if fire {
      if let Some(sub) = account.subscription.take() {
        info!(LOG_LEVEL, "{} fell below {} credits, notifying {}", name, sub.threshold, sub.handle.endpoint);
        let delivered = self.notifier.notify(Notification {
          handle: sub.handle,
          user: name.to_string(),
          threshold: sub.threshold,
        });
        if !delivered {
          warn!(LOG_LEVEL, "notification for {} could not be delivered", name);
        }
      }
    }
    Some(credits)
  }

  fn subscribe(
    &mut self,
    name: String,
    threshold: i64,
    handle: CallbackHandle,
  ) -> std::result::Result<(), SubscribeError> {
    if threshold < 1 {
      return Err(SubscribeError::ThresholdBelowOne);
    }
    match self.accounts.get_mut(&name) {
      None => Err(SubscribeError::UnknownUser(name)),
      Some(account) if account.subscription.is_some() => Err(SubscribeError::AlreadySubscribed(name)),
      Some(account) => {
        account.subscription = Some(Subscription {
          handle: handle,
          threshold: threshold,
        });
        Ok(())
      }
    }
  }
}
#[async_trait]
impl Actor<AccountsMsg> for AccountsActor {
  async fn recv(&mut self, ctx: &ActorContext<AccountsMsg>, msg: AccountsMsg) {
    match msg {
      Login(name, password, reply) => {
        let outcome = match self.accounts.get_mut(&name) {
          Some(account) if account.password == password => {
            if account.online {
              LoginOutcome::AlreadyLoggedIn
            } else {
              account.online = true;
              LoginOutcome::LoggedIn
            }
          }
          _ => LoginOutcome::WrongCredentials,
        };
        debug!(LOG_LEVEL, "{}: login of {}: {:?}", ctx.name, name, outcome);
        let _ = reply.send(outcome);
      }
      Logout(name) => {
        if let Some(account) = self.accounts.get_mut(&name) {
          account.online = false;
        }
      }
      Credits(name, reply) => {
        let _ = reply.send(self.accounts.get(&name).map(|a| a.credits));
      }
      Adjust(name, delta, reply) => {
        let _ = reply.send(self.adjust(&name, delta));
      }
      Subscribe(name, threshold, handle, reply) => {
        let _ = reply.send(self.subscribe(name, threshold, handle));
      }
      Users(reply) => {
        let users = self
          .accounts
          .iter()
          .map(|(name, a)| UserView {
            name: name.clone(),
            online: a.online,
            credits: a.credits,
          })
          .collect();
        let _ = reply.send(users);
      }
    }
  }
}

/// Handle to the actor owning every user's balance, session flag and subscription. Credit reads
/// and writes for one user are serialized through it.
#[derive(Clone, Debug)]
pub struct Accounts {
  actor: LocalRef<AccountsMsg>,
}
impl Accounts {
  /// Spawns the accounts actor on the current tokio runtime.
  pub fn new(users: &[UserConfig], notifier: Arc<dyn Notifier>) -> Accounts {
    let accounts = users
      .iter()
      .map(|u| {
        let account = Account {
          password: u.password.clone(),
          credits: u.credits,
          online: false,
          subscription: None,
        };
        (u.name.clone(), account)
      })
      .collect();
    let actor = AccountsActor {
      accounts: accounts,
      notifier: notifier,
    };
    let (actor, _) = spawn(actor, "accounts");
    Accounts { actor: actor }
  }

  pub async fn login(&self, name: &str, password: &str) -> Result<LoginOutcome> {
    self
      .actor
      .ask(|reply| Login(name.to_string(), password.to_string(), reply))
      .await
      .ok_or(ClusterError::ActorGone("accounts"))
  }

  pub fn logout(&self, name: &str) {
    self.actor.send(Logout(name.to_string()));
  }

  pub async fn credits(&self, name: &str) -> Result<Option<i64>> {
    self
      .actor
      .ask(|reply| Credits(name.to_string(), reply))
      .await
      .ok_or(ClusterError::ActorGone("accounts"))
  }

  /// Adds `delta` (possibly negative) to the balance and returns the new balance, or `None` for
  /// an unknown user. May fire the user's subscription.
  pub async fn adjust(&self, name: &str, delta: i64) -> Result<Option<i64>> {
    self
      .actor
      .ask(|reply| Adjust(name.to_string(), delta, reply))
      .await
      .ok_or(ClusterError::ActorGone("accounts"))
  }

  pub async fn subscribe(
    &self,
    name: &str,
    threshold: i64,
    handle: CallbackHandle,
  ) -> Result<std::result::Result<(), SubscribeError>> {
    self
      .actor
      .ask(|reply| Subscribe(name.to_string(), threshold, handle, reply))
      .await
      .ok_or(ClusterError::ActorGone("accounts"))
  }

  pub async fn users(&self) -> Result<Vec<UserView>> {
    self.actor.ask(Users).await.ok_or(ClusterError::ActorGone("accounts"))
  }

  pub fn stop(&self) {
    self.actor.signal(ActorSignal::Term);
  }
}

#[cfg(test)]
fn test_accounts() -> (Accounts, Arc<crate::controller::ChannelNotifier>) {
  let notifier = Arc::new(crate::controller::ChannelNotifier::new());
  let users = vec![UserConfig::new("alice", "12345", 60), UserConfig::new("bill", "23456", 200)];
  (Accounts::new(&users, notifier.clone()), notifier)
}

#[test]
fn one_session_per_user() {
  tokio_test::block_on(async {
    let (accounts, _) = test_accounts();
    assert_eq!(accounts.login("alice", "wrong").await.unwrap(), LoginOutcome::WrongCredentials);
    assert_eq!(accounts.login("nobody", "12345").await.unwrap(), LoginOutcome::WrongCredentials);
    assert_eq!(accounts.login("alice", "12345").await.unwrap(), LoginOutcome::LoggedIn);
    assert_eq!(accounts.login("alice", "12345").await.unwrap(), LoginOutcome::AlreadyLoggedIn);
    accounts.logout("alice");
    assert_eq!(accounts.login("alice", "12345").await.unwrap(), LoginOutcome::LoggedIn);
    let users = accounts.users().await.unwrap();
    assert_eq!(users[0].to_string(), "alice online Credits: 60");
    assert_eq!(users[1].to_string(), "bill offline Credits: 200");
  });
}

#[test]
fn subscription_fires_once_below_threshold() {
  tokio_test::block_on(async {
    let (accounts, notifier) = test_accounts();
    let (handle, rx) = notifier.register("admin");
    accounts.subscribe("alice", 50, handle.clone()).await.unwrap().unwrap();
    assert_eq!(
      accounts.subscribe("alice", 10, handle.clone()).await.unwrap(),
      Err(SubscribeError::AlreadySubscribed("alice".to_string()))
    );
    assert_eq!(accounts.adjust("alice", -5).await.unwrap(), Some(55));
    assert!(rx.try_recv().is_err());
    assert_eq!(accounts.adjust("alice", -20).await.unwrap(), Some(35));
    let note = rx.try_recv().unwrap();
    assert_eq!((note.user.as_str(), note.threshold), ("alice", 50));
    assert_eq!(accounts.adjust("alice", -20).await.unwrap(), Some(15));
    assert!(rx.try_recv().is_err());
    accounts.subscribe("alice", 10, handle).await.unwrap().unwrap();
  });
}

#[test]
fn subscribe_rejects_bad_requests() {
  tokio_test::block_on(async {
    let (accounts, notifier) = test_accounts();
    let (handle, _rx) = notifier.register("admin");
    assert_eq!(
      accounts.subscribe("bill", 0, handle.clone()).await.unwrap(),
      Err(SubscribeError::ThresholdBelowOne)
    );
    assert_eq!(
      accounts.subscribe("carol", 10, handle).await.unwrap(),
      Err(SubscribeError::UnknownUser("carol".to_string()))
    );
    assert_eq!(accounts.adjust("carol", 10).await.unwrap(), None);
  });
}
