use crate::controller::{
  Accounts, Dispatcher, Expression, LoginOutcome, NodeRegistry, Statistics, LOG_LEVEL,
};
use crate::core::{Channel, Result, StopSignal, Tokens};
use crate::{debug, trace};
use std::sync::Arc;

pub const NOT_LOGGED_IN: &str = "You are not logged in!";
pub const TOO_MANY_PARAMETERS: &str = "Too many parameters!";
pub const MISSING_PARAMETERS: &str = "Missing parameters!";
pub const NO_PARAMETERS_ALLOWED: &str = "No parameters allowed!";

/// Everything a client session needs from the controller. Cloned into every session.
#[derive(Clone)]
pub struct SessionServices {
  pub registry: NodeRegistry,
  pub accounts: Accounts,
  pub dispatcher: Arc<Dispatcher>,
  pub statistics: Arc<Statistics>,
}

/// Interprets the commands of one client connection. At most one user is logged in per session;
/// the user is logged out when the session ends.
pub struct ClientSession<C> {
  channel: C,
  services: SessionServices,
  user: Option<String>,
}
impl<C: Channel> ClientSession<C> {
  pub fn new(channel: C, services: SessionServices) -> ClientSession<C> {
    ClientSession {
      channel: channel,
      services: services,
      user: None,
    }
  }

  pub fn user(&self) -> Option<&str> {
    self.user.as_deref()
  }

  pub fn into_channel(self) -> C {
    self.channel
  }

  /// Serves requests until the client disconnects, the channel fails or `stop` fires. A request
  /// already being handled is finished first.
  pub async fn run(&mut self, mut stop: StopSignal) -> Result<()> {
    let res = loop {
      let line = tokio::select! {
        _ = stop.stopped() => break Ok(()),
        line = self.channel.receive_line() => line,
      };
      let line = match line {
        Ok(Some(line)) => line,
        Ok(None) => break Ok(()),
        Err(e) => break Err(e),
      };
      let response = match self.handle(&line).await {
        Ok(r) => r,
        Err(e) => break Err(e),
      };
      if let Err(e) = self.channel.send_line(&response).await {
        break Err(e);
      }
    };
    if let Some(user) = self.user.take() {
      debug!(LOG_LEVEL, "session of {} ended", user);
      self.services.accounts.logout(&user);
    }
    res
  }

  /// Returns the response to one request line.
  pub async fn handle(&mut self, line: &str) -> Result<String> {
    trace!(LOG_LEVEL, "request `{}`", line);
    let mut tokens = Tokens::new(line);
    let command = match tokens.next() {
      Some(c) => c,
      None => return Ok("Empty request!".to_string()),
    };
    let args = tokens.remaining();
    let response = match command {
      "!login" => match arity(args, 2) {
        Some(e) => e.to_string(),
        None => {
          let name = tokens.next().unwrap_or_default();
          let password = tokens.next().unwrap_or_default();
          self.login(name, password).await?
        }
      },
      "!logout" => match (arity(args, 0), self.user.clone()) {
        (Some(e), _) => e.to_string(),
        (None, None) => NOT_LOGGED_IN.to_string(),
        (None, Some(user)) => {
          self.services.accounts.logout(&user);
          self.user = None;
          "Logged out successfully.".to_string()
        }
      },
      "!credits" => match (arity(args, 0), &self.user) {
        (Some(e), _) => e.to_string(),
        (None, None) => NOT_LOGGED_IN.to_string(),
        (None, Some(user)) => {
          let credits = self.services.accounts.credits(user).await?.unwrap_or(0);
          format!("You have {} credits left.", credits)
        }
      },
      "!buy" => match (arity(args, 1), &self.user) {
        (Some(e), _) => e.to_string(),
        (None, None) => NOT_LOGGED_IN.to_string(),
        (None, Some(user)) => match tokens.parse::<i64>() {
          Some(amount) if amount > 0 => {
            let credits = self.services.accounts.adjust(user, amount).await?.unwrap_or(0);
            format!("You now have {} credits.", credits)
          }
          Some(_) => "The amount of credits should be greater than 0!".to_string(),
          None => "The amount of credits should be a number!".to_string(),
        },
      },
      "!list" => match (arity(args, 0), &self.user) {
        (Some(e), _) => e.to_string(),
        (None, None) => NOT_LOGGED_IN.to_string(),
        (None, Some(_)) => {
          let ops = self.services.registry.available_operators().await?;
          if ops.is_empty() {
            "No operations available".to_string()
          } else {
            ops.to_string()
          }
        }
      },
      "!compute" => {
        self.services.statistics.record(line);
        match &self.user {
          None => NOT_LOGGED_IN.to_string(),
          Some(user) => match Expression::parse_tokens(&mut tokens) {
            Some(expr) => self.services.dispatcher.compute(user, &expr).await?,
            None => "Invalid expression!".to_string(),
          },
        }
      }
      _ => format!("Unknown command `{}`!", command),
    };
    Ok(response)
  }

  async fn login(&mut self, name: &str, password: &str) -> Result<String> {
    if self.user.is_some() {
      return Ok("You are already logged in!".to_string());
    }
    let outcome = self.services.accounts.login(name, password).await?;
    if outcome == LoginOutcome::LoggedIn {
      self.user = Some(name.to_string());
    }
    Ok(outcome.message().to_string())
  }
}

fn arity(given: usize, expected: usize) -> Option<&'static str> {
  if given == expected {
    None
  } else if expected == 0 {
    Some(NO_PARAMETERS_ALLOWED)
  } else if given > expected {
    Some(TOO_MANY_PARAMETERS)
  } else {
    Some(MISSING_PARAMETERS)
  }
}

#[test]
fn arity_messages() {
  assert_eq!(arity(0, 0), None);
  assert_eq!(arity(1, 0), Some(NO_PARAMETERS_ALLOWED));
  assert_eq!(arity(3, 2), Some(TOO_MANY_PARAMETERS));
  assert_eq!(arity(1, 2), Some(MISSING_PARAMETERS));
}
