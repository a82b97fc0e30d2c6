use calc_cluster::core::{Host, OperatorSet, Socket};
use calc_cluster::node::{JoinState, NodeAgent, NodeConfig};
use calc_cluster::testkit::{init_logging, LogLevel};
use std::env::args;
use std::process::exit;
use std::time::Duration;

const USAGE: &str = "usage: node <controller-host> <controller-udp-port> <tcp-port> <operators> \
  <rmin> [<alive-period-ms> [<share-timeout-ms>|none]]";

fn parse_args() -> Option<NodeConfig> {
  let args = args().skip(1).collect::<Vec<_>>();
  let mut config = NodeConfig::default();
  match args.as_slice() {
    [host, udp, tcp, operators, rmin, rest @ ..] => {
      config.controller = Socket::new(Host::from(host.as_str()), udp.parse().ok()?, 0);
      config.socket.tcp = tcp.parse().ok()?;
      config.operators = operators.parse::<OperatorSet>().ok()?;
      config.rmin = rmin.parse().ok()?;
      if let Some(period) = rest.get(0) {
        config.alive_period = Duration::from_millis(period.parse().ok()?);
      }
      match rest.get(1).map(|s| s.as_str()) {
        None => {}
        Some("none") => config.share_timeout = None,
        Some(ms) => config.share_timeout = Some(Duration::from_millis(ms.parse().ok()?)),
      }
      if rest.len() > 2 {
        return None;
      }
    }
    _ => return None,
  }
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
    let agent = NodeAgent::start(config).await?;
    println!("node listening on {}", agent.tcp_addr());
    match agent.wait_joined().await {
      JoinState::Joined(share) => println!("joined the cloud with {} resources", share),
      _ => println!("Can't join cloud!"),
    }
    tokio::signal::ctrl_c().await?;
    for record in agent.history(10) {
      println!("{}", record);
    }
    println!("resources: {}", agent.resources());
    agent.stop();
    Ok::<(), calc_cluster::core::ClusterError>(())
  });
  if let Err(e) = res {
    eprintln!("node failed: {}", e);
    exit(1);
  }
}
