use calc_cluster::controller::{ChannelNotifier, Controller, ControllerConfig, UserConfig};
use calc_cluster::core::{Host, Socket};
use calc_cluster::testkit::{init_logging, LogLevel};
use std::env::args;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "usage: controller <host> <udp-port> <tcp-port> <rmax> \
  [<timeout-ms> <check-period-ms>] [--user <name>:<password>:<credits>]...";

fn parse_user(s: &str) -> Option<UserConfig> {
  let mut parts = s.splitn(3, ':');
  let name = parts.next()?;
  let password = parts.next()?;
  let credits = parts.next()?.parse::<i64>().ok()?;
  Some(UserConfig::new(name, password, credits))
}

fn parse_args() -> Option<ControllerConfig> {
  let mut args = args().skip(1);
  let mut positional = Vec::new();
  let mut users = Vec::new();
  while let Some(arg) = args.next() {
    if arg == "--user" {
      users.push(parse_user(&args.next()?)?);
    } else {
      positional.push(arg);
    }
  }
  let mut config = ControllerConfig::default();
  match positional.as_slice() {
    [host, udp, tcp, rmax, rest @ ..] => {
      config.socket = Socket::new(Host::from(host.as_str()), udp.parse().ok()?, tcp.parse().ok()?);
      config.rmax = rmax.parse().ok()?;
      match rest {
        [] => {}
        [timeout, period] => {
          config.node_timeout = Duration::from_millis(timeout.parse().ok()?);
          config.check_period = Duration::from_millis(period.parse().ok()?);
        }
        _ => return None,
      }
    }
    _ => return None,
  }
  config.users = users;
  Some(config)
}

fn main() {
  let config = match parse_args() {
    Some(config) => config,
    None => {
      eprintln!("{}", USAGE);
      exit(2);
    }
  };
  init_logging(LogLevel::Info);
  let rt = match tokio::runtime::Builder::new_multi_thread()
    .worker_threads(num_cpus::get())
    .enable_all()
    .build()
  {
    Ok(rt) => rt,
    Err(e) => {
      eprintln!("could not start the runtime: {}", e);
      exit(1);
    }
  };
  let res = rt.block_on(async {
    let controller = Controller::start(config, Arc::new(ChannelNotifier::new())).await?;
    println!(
      "controller listening on udp {} and tcp {}",
      controller.udp_addr(),
      controller.tcp_addr()
    );
    tokio::signal::ctrl_c().await?;
    println!("{}", controller.nodes().await?);
    println!("{}", controller.users().await?);
    println!("{}", controller.statistics());
    let logs = controller.logs().await?;
    if logs.is_empty() {
      println!("No logs found");
    }
    for log in logs {
      println!("{}", log);
    }
    controller.stop();
    Ok::<(), calc_cluster::core::ClusterError>(())
  });
  if let Err(e) = res {
    eprintln!("controller failed: {}", e);
    exit(1);
  }
}
