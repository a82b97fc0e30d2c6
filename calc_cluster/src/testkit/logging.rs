use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
  Fatal,
  Off,
}
impl LogLevel {
  fn directive(self) -> &'static str {
    match self {
      LogLevel::Trace => "trace",
      LogLevel::Debug => "debug",
      LogLevel::Info => "info",
      LogLevel::Warn => "warn",
      LogLevel::Error | LogLevel::Fatal => "error",
      LogLevel::Off => "off",
    }
  }
}
impl std::str::FromStr for LogLevel {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "trace" => Ok(LogLevel::Trace),
      "debug" => Ok(LogLevel::Debug),
      "info" => Ok(LogLevel::Info),
      "warn" => Ok(LogLevel::Warn),
      "error" => Ok(LogLevel::Error),
      "fatal" => Ok(LogLevel::Fatal),
      "off" => Ok(LogLevel::Off),
      _ => Err(()),
    }
  }
}

/// Installs a formatting subscriber. `RUST_LOG` wins over `level` when it is set. Returns `false`
/// if a global subscriber was already installed.
pub fn init_logging(level: LogLevel) -> bool {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .try_init()
    .is_ok()
}

#[macro_export]
macro_rules! trace {
  ($level:expr, $($arg:tt)+) => {
    if $crate::testkit::LogLevel::Trace >= $level {
      $crate::__tracing::trace!($($arg)+);
    }
  };
}

#[macro_export]
macro_rules! debug {
  ($level:expr, $($arg:tt)+) => {
    if $crate::testkit::LogLevel::Debug >= $level {
      $crate::__tracing::debug!($($arg)+);
    }
  };
}

#[macro_export]
macro_rules! info {
  ($level:expr, $($arg:tt)+) => {
    if $crate::testkit::LogLevel::Info >= $level {
      $crate::__tracing::info!($($arg)+);
    }
  };
}

#[macro_export]
macro_rules! warn {
  ($level:expr, $($arg:tt)+) => {
    if $crate::testkit::LogLevel::Warn >= $level {
      $crate::__tracing::warn!($($arg)+);
    }
  };
}

#[macro_export]
macro_rules! error {
  ($level:expr, $($arg:tt)+) => {
    if $crate::testkit::LogLevel::Error >= $level {
      $crate::__tracing::error!($($arg)+);
    }
  };
}

#[test]
fn levels_are_ordered_and_parse() {
  assert!(LogLevel::Trace < LogLevel::Debug);
  assert!(LogLevel::Error < LogLevel::Off);
  assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
  assert!("loud".parse::<LogLevel>().is_err());
  assert_eq!(LogLevel::Fatal.directive(), "error");
}
