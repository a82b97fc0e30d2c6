use async_trait::async_trait;
use calc_cluster::controller::{
  Accounts, ChannelNotifier, ClientSession, Dispatcher, NodeLink, NodeRegistry, SessionServices,
  Statistics, UserConfig, MISSING_PARAMETERS, NOT_ENOUGH_CREDITS, NOT_LOGGED_IN,
  NO_PARAMETERS_ALLOWED, TOO_MANY_PARAMETERS,
};
use calc_cluster::core::{
  now_millis, stop_pair, Channel, ComputeReply, LineChannel, Operator, Result, Stopper,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct LocalLink;
#[async_trait]
impl NodeLink for LocalLink {
  async fn compute(&self, _: SocketAddr, a: i64, op: Operator, b: i64) -> Result<ComputeReply> {
    Ok(op.apply(a, b))
  }
}

struct Client {
  channel: LineChannel<DuplexStream>,
  session: JoinHandle<Result<()>>,
  _stopper: Stopper,
}
impl Client {
  async fn ask(&mut self, line: &str) -> String {
    self.channel.send_line(line).await.unwrap();
    timeout(Duration::from_secs(2), self.channel.receive_line())
      .await
      .unwrap()
      .unwrap()
      .unwrap()
  }
}

fn services(users: &[UserConfig], notifier: Arc<ChannelNotifier>) -> SessionServices {
  let registry = NodeRegistry::new();
  let accounts = Accounts::new(users, notifier);
  SessionServices {
    dispatcher: Arc::new(Dispatcher::new(registry.clone(), accounts.clone(), Arc::new(LocalLink))),
    registry: registry,
    accounts: accounts,
    statistics: Arc::new(Statistics::new()),
  }
}

fn connect(services: &SessionServices) -> Client {
  let (client, server) = tokio::io::duplex(4096);
  let (stopper, signal) = stop_pair();
  let mut session = ClientSession::new(LineChannel::new(server), services.clone());
  Client {
    channel: LineChannel::new(client),
    session: tokio::spawn(async move { session.run(signal).await }),
    _stopper: stopper,
  }
}

fn users() -> Vec<UserConfig> {
  vec![UserConfig::new("alice", "12345", 500), UserConfig::new("bill", "23456", 60)]
}

#[test]
fn commands_require_a_login_and_the_right_arity() {
  tokio_test::block_on(async {
    let services = services(&users(), Arc::new(ChannelNotifier::new()));
    let mut c = connect(&services);
    assert_eq!(c.ask("!credits").await, NOT_LOGGED_IN);
    assert_eq!(c.ask("!list").await, NOT_LOGGED_IN);
    assert_eq!(c.ask("!buy 10").await, NOT_LOGGED_IN);
    assert_eq!(c.ask("!logout").await, NOT_LOGGED_IN);
    assert_eq!(c.ask("!compute 1 + 1").await, NOT_LOGGED_IN);
    assert_eq!(c.ask("!login alice").await, MISSING_PARAMETERS);
    assert_eq!(c.ask("!login alice 12345 extra").await, TOO_MANY_PARAMETERS);
    assert_eq!(c.ask("!credits now").await, NO_PARAMETERS_ALLOWED);
    assert_eq!(c.ask("!login alice nope").await, "Wrong username or password.");
    assert_eq!(c.ask("!frobnicate").await, "Unknown command `!frobnicate`!");
    assert_eq!(c.ask("   ").await, "Empty request!");

    assert_eq!(c.ask("!login alice 12345").await, "Successfully logged in.");
    assert_eq!(c.ask("!login bill 23456").await, "You are already logged in!");
    assert_eq!(c.ask("!credits").await, "You have 500 credits left.");
    assert_eq!(c.ask("!buy ten").await, "The amount of credits should be a number!");
    assert_eq!(c.ask("!buy 0").await, "The amount of credits should be greater than 0!");
    assert_eq!(c.ask("!buy 25").await, "You now have 525 credits.");
    assert_eq!(c.ask("!logout").await, "Logged out successfully.");
    assert_eq!(c.ask("!credits").await, NOT_LOGGED_IN);
  });
}

#[test]
fn a_user_is_logged_in_at_most_once() {
  tokio_test::block_on(async {
    let services = services(&users(), Arc::new(ChannelNotifier::new()));
    let mut first = connect(&services);
    let mut second = connect(&services);
    assert_eq!(first.ask("!login alice 12345").await, "Successfully logged in.");
    assert_eq!(second.ask("!login alice 12345").await, "You are already logged in!");

    drop(first.channel);
    first.session.await.unwrap().unwrap();
    assert_eq!(second.ask("!login alice 12345").await, "Successfully logged in.");
    let listing = services.accounts.users().await.unwrap();
    assert_eq!(listing[0].to_string(), "alice online Credits: 500");
  });
}

#[test]
fn compute_lists_and_bills_through_the_registry() {
  tokio_test::block_on(async {
    let services = services(&users(), Arc::new(ChannelNotifier::new()));
    let mut c = connect(&services);
    c.ask("!login bill 23456").await;
    assert_eq!(c.ask("!list").await, "No operations available");
    services.registry.upsert("10.0.0.1".parse().unwrap(), 7000, "*+".parse().unwrap(), now_millis());
    assert_eq!(c.ask("!list").await, "+*");

    assert_eq!(c.ask("!compute 2 +").await, "Invalid expression!");
    assert_eq!(c.ask("!compute 2 + 3 * 4").await, NOT_ENOUGH_CREDITS);
    assert_eq!(c.ask("!compute 6 * 7").await, "42");
    assert_eq!(c.ask("!credits").await, "You have 10 credits left.");
    assert_eq!(c.ask("!compute 12").await, "12");

    assert_eq!(services.statistics.get(Operator::Add), 2);
    assert_eq!(services.statistics.get(Operator::Mul), 2);
    assert_eq!(services.statistics.get(Operator::Sub), 0);
    assert_eq!(services.statistics.to_string(), "+ 2\n* 2\n- 0\n/ 0");
  });
}

#[test]
fn subscription_fires_once_when_a_charge_crosses_it() {
  tokio_test::block_on(async {
    let notifier = Arc::new(ChannelNotifier::new());
    let services = services(&users(), notifier.clone());
    services.registry.upsert("10.0.0.1".parse().unwrap(), 7000, "+-*/".parse().unwrap(), now_millis());
    let (handle, rx) = notifier.register("billing");
    services.accounts.subscribe("bill", 20, handle).await.unwrap().unwrap();

    let mut c = connect(&services);
    c.ask("!login bill 23456").await;
    assert_eq!(c.ask("!compute 1 - 1").await, "0");
    let note = rx.try_recv().unwrap();
    assert_eq!(note.user, "bill");
    assert_eq!(note.threshold, 20);
    c.ask("!buy 100").await;
    c.ask("!compute 1 - 1").await;
    assert!(rx.try_recv().is_err());
  });
}
